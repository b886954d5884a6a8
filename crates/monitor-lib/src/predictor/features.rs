//! Feature encoding for ML inference
//!
//! Converts raw records into numeric vectors laid out exactly in the
//! artifact's feature order. Categorical columns go through the artifact's
//! frozen encoders, missing columns default to zero, and anything that is
//! not numeric after that is a schema mismatch.

use crate::artifact::ModelArtifact;
use crate::error::{LifecycleError, LifecycleResult};
use crate::ml::LabelEncoder;
use crate::models::{FeatureVector, FieldValue, RawRecord, RecordError};
use std::collections::BTreeMap;
use tracing::debug;

/// Value inserted for a contract column absent from a record.
///
/// Silently defaulting is tolerated but risk-bearing: callers relying on
/// correctness-sensitive features must check completeness beforehand.
pub const MISSING_FEATURE_DEFAULT: f64 = 0.0;

/// Feature order plus categorical encoders, borrowed from an artifact or a
/// training pass in progress
#[derive(Debug, Clone, Copy)]
pub struct FeatureContract<'a> {
    pub feature_names: &'a [String],
    pub encoders: &'a BTreeMap<String, LabelEncoder>,
}

impl<'a> From<&'a ModelArtifact> for FeatureContract<'a> {
    fn from(artifact: &'a ModelArtifact) -> Self {
        Self {
            feature_names: artifact.feature_names(),
            encoders: artifact.encoders(),
        }
    }
}

/// Encodes raw records against a feature contract
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureCodec;

impl FeatureCodec {
    pub fn new() -> Self {
        Self
    }

    /// Encode one record for `artifact`
    pub fn encode(&self, raw: &RawRecord, artifact: &ModelArtifact) -> LifecycleResult<FeatureVector> {
        self.encode_with(raw, FeatureContract::from(artifact))
    }

    /// Encode one record against an explicit contract
    pub fn encode_with(
        &self,
        raw: &RawRecord,
        contract: FeatureContract<'_>,
    ) -> LifecycleResult<FeatureVector> {
        let mut values = Vec::with_capacity(contract.feature_names.len());
        let mut defaulted: Vec<&str> = Vec::new();

        for name in contract.feature_names {
            let value = match raw.get(name) {
                None | Some(FieldValue::Null) => {
                    defaulted.push(name);
                    MISSING_FEATURE_DEFAULT
                }
                Some(field) => match contract.encoders.get(name) {
                    Some(encoder) => encode_category(raw, name, field, encoder)?,
                    None => field.as_number().ok_or_else(|| {
                        LifecycleError::schema(
                            name.as_str(),
                            format!("expected a number, got {:?}", field),
                        )
                    })?,
                },
            };
            if !value.is_finite() {
                return Err(LifecycleError::schema(name.as_str(), "non-finite value"));
            }
            values.push(value);
        }

        if !defaulted.is_empty() {
            debug!(
                record_id = %raw.record_id(),
                missing = ?defaulted,
                "Missing features defaulted to {}",
                MISSING_FEATURE_DEFAULT
            );
        }

        let vector = FeatureVector {
            columns: contract.feature_names.to_vec(),
            values,
        };
        verify_layout(&vector, contract.feature_names)?;
        Ok(vector)
    }

    /// Encode many records; failing records are returned separately
    pub fn encode_all(
        &self,
        records: &[RawRecord],
        contract: FeatureContract<'_>,
    ) -> (Vec<(usize, FeatureVector)>, Vec<RecordError>) {
        let mut encoded = Vec::with_capacity(records.len());
        let mut failed = Vec::new();
        for (i, raw) in records.iter().enumerate() {
            match self.encode_with(raw, contract) {
                Ok(v) => encoded.push((i, v)),
                Err(error) => failed.push(RecordError {
                    record_id: raw.record_id().to_string(),
                    error,
                }),
            }
        }
        (encoded, failed)
    }
}

fn encode_category(
    raw: &RawRecord,
    name: &str,
    field: &FieldValue,
    encoder: &LabelEncoder,
) -> LifecycleResult<f64> {
    let category = field
        .as_category()
        .ok_or_else(|| LifecycleError::schema(name, "categorical value is empty"))?;
    if !encoder.is_known(&category) {
        // Deterministic fallback policy: first known category
        debug!(
            record_id = %raw.record_id(),
            feature = %name,
            value = %category,
            fallback = %encoder.first_known(),
            "Unseen category replaced by first known category"
        );
    }
    Ok(encoder.encode_or_first(&category))
}

/// Check a vector is laid out exactly in `feature_names` order
pub fn verify_layout(vector: &FeatureVector, feature_names: &[String]) -> LifecycleResult<()> {
    if vector.columns.len() != feature_names.len() || vector.values.len() != feature_names.len() {
        return Err(LifecycleError::schema(
            "<layout>",
            format!(
                "vector has {} columns, contract has {}",
                vector.columns.len(),
                feature_names.len()
            ),
        ));
    }
    if let Some((got, want)) = vector
        .columns
        .iter()
        .zip(feature_names)
        .find(|(got, want)| got != want)
    {
        return Err(LifecycleError::schema(
            want.as_str(),
            format!("column order violated: found '{}'", got),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::test_support::trained_artifact;

    fn sample_student() -> RawRecord {
        RawRecord::new("STU00123")
            .with("gender", "M")
            .with("age", 18.0)
            .with("socioeconomic_status", "Middle")
            .with("previous_academic_score", 68.5)
            .with("distance_from_school_km", 3.2)
            .with("attendance_rate", 0.65)
            .with("avg_test_score", 48.7)
            .with("fee_default_rate", 0.9)
            .with("extracurricular_participation", "Low")
    }

    #[test]
    fn test_vector_follows_contract_order() {
        let artifact = trained_artifact();
        let v = FeatureCodec::new().encode(&sample_student(), &artifact).unwrap();
        assert_eq!(v.columns, artifact.feature_names());
        assert_eq!(v.get("age"), Some(18.0));
        assert_eq!(v.get("attendance_rate"), Some(0.65));
    }

    #[test]
    fn test_missing_feature_defaults_to_zero() {
        let artifact = trained_artifact();
        let mut record = sample_student();
        record.fields.remove("distance_from_school_km");

        let v = FeatureCodec::new().encode(&record, &artifact).unwrap();
        assert_eq!(v.get("distance_from_school_km"), Some(0.0));
    }

    #[test]
    fn test_null_feature_defaults_to_zero() {
        let artifact = trained_artifact();
        let mut record = sample_student();
        record
            .fields
            .insert("avg_test_score".to_string(), FieldValue::Null);
        let v = FeatureCodec::new().encode(&record, &artifact).unwrap();
        assert_eq!(v.get("avg_test_score"), Some(0.0));
    }

    #[test]
    fn test_unseen_category_uses_first_known() {
        let artifact = trained_artifact();
        let encoder = &artifact.encoders()["socioeconomic_status"];
        let first = encoder.first_known().to_string();

        let unseen = sample_student().with("socioeconomic_status", "Unknown-Tier");
        let known = sample_student().with("socioeconomic_status", first.as_str());

        let codec = FeatureCodec::new();
        let a = codec.encode(&unseen, &artifact).unwrap();
        let b = codec.encode(&known, &artifact).unwrap();
        assert_eq!(a.get("socioeconomic_status"), b.get("socioeconomic_status"));
    }

    #[test]
    fn test_non_numeric_value_is_schema_mismatch() {
        let artifact = trained_artifact();
        let record = sample_student().with("age", "eighteen");
        let err = FeatureCodec::new().encode(&record, &artifact).unwrap_err();
        match err {
            LifecycleError::SchemaMismatch { feature, .. } => assert_eq!(feature, "age"),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_extra_columns_ignored() {
        let artifact = trained_artifact();
        let record = sample_student().with("mentor_id", "MENT007");
        let v = FeatureCodec::new().encode(&record, &artifact).unwrap();
        assert_eq!(v.len(), artifact.feature_names().len());
    }

    #[test]
    fn test_reordered_vector_rejected() {
        let names = vec!["a".to_string(), "b".to_string()];
        let vector = FeatureVector {
            columns: vec!["b".to_string(), "a".to_string()],
            values: vec![1.0, 2.0],
        };
        assert!(verify_layout(&vector, &names).is_err());
    }

    #[test]
    fn test_encode_all_isolates_failures() {
        let artifact = trained_artifact();
        let records = vec![
            sample_student(),
            sample_student().with("fee_default_rate", "lots"),
            sample_student(),
        ];
        let (ok, failed) = FeatureCodec::new().encode_all(&records, (&artifact).into());
        assert_eq!(ok.len(), 2);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].record_id, "STU00123");
    }
}
