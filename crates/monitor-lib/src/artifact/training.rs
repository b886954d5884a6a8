//! Training pipeline shared by bootstrap training and retraining
//!
//! Both paths run encode → stratified split → fit scaler on the train side
//! → fit classifier → holdout accuracy. Retraining reuses the incumbent's
//! feature order and encoders so the candidate speaks the same contract.

use super::{next_version, ModelArtifact, DEFAULT_RISK_LABEL};
use crate::error::{LifecycleError, LifecycleResult};
use crate::ml::{
    stratified_split, ClassificationMetrics, Classifier, ClassifierSpec, LabelEncoder, Scaler,
    ScalerKind,
};
use crate::models::RawRecord;
use crate::predictor::{FeatureCodec, FeatureContract};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Fewest usable rows a training batch may have
pub const MIN_TRAINING_ROWS: usize = 10;

/// Version label of a bootstrap artifact
pub const INITIAL_VERSION: &str = "v1";

/// Training hyper-parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Classifier family for bootstrap training; retraining reuses the incumbent's
    pub classifier: ClassifierSpec,
    /// Scaler kind for bootstrap training; retraining reuses the incumbent's
    pub scaler: ScalerKind,
    pub test_fraction: f64,
    pub split_seed: u64,
    pub risk_label: u8,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            classifier: ClassifierSpec::default(),
            scaler: ScalerKind::Standard,
            test_fraction: 0.2,
            split_seed: 42,
            risk_label: DEFAULT_RISK_LABEL,
        }
    }
}

/// Ordered feature list for bootstrap training
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    /// Feature order of the resulting artifact
    pub features: Vec<String>,
    /// Subset of `features` that is label-encoded
    pub categorical: Vec<String>,
}

impl FeatureSchema {
    pub fn new(features: Vec<String>, categorical: Vec<String>) -> LifecycleResult<Self> {
        if features.is_empty() {
            return Err(LifecycleError::InvalidInput(
                "feature schema is empty".to_string(),
            ));
        }
        if let Some(c) = categorical.iter().find(|c| !features.contains(c)) {
            return Err(LifecycleError::schema(
                c.as_str(),
                "categorical column missing from feature list",
            ));
        }
        Ok(Self {
            features,
            categorical,
        })
    }

    /// The nine student attributes scored for dropout risk
    pub fn student_default() -> Self {
        let features = [
            "gender",
            "age",
            "socioeconomic_status",
            "previous_academic_score",
            "distance_from_school_km",
            "attendance_rate",
            "avg_test_score",
            "fee_default_rate",
            "extracurricular_participation",
        ];
        let categorical = ["gender", "socioeconomic_status", "extracurricular_participation"];
        Self {
            features: features.iter().map(|s| s.to_string()).collect(),
            categorical: categorical.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn is_categorical(&self, name: &str) -> bool {
        self.categorical.iter().any(|c| c == name)
    }
}

/// Output of a training pass
#[derive(Debug, Clone)]
pub struct TrainedArtifact {
    pub artifact: ModelArtifact,
    pub holdout_accuracy: f64,
    /// Raw records of the holdout split, reused for arbitration
    pub holdout: Vec<RawRecord>,
}

/// Cheap precondition check run before any side effect of a retrain
pub fn validate_training_batch(records: &[RawRecord], target: &str) -> LifecycleResult<()> {
    if records.is_empty() {
        return Err(LifecycleError::InsufficientData(
            "training batch is empty".to_string(),
        ));
    }
    if !records.iter().any(|r| r.get(target).is_some()) {
        return Err(LifecycleError::InsufficientData(format!(
            "training batch has no '{}' column",
            target
        )));
    }
    if records.len() < MIN_TRAINING_ROWS {
        return Err(LifecycleError::InsufficientData(format!(
            "{} rows, at least {} required",
            records.len(),
            MIN_TRAINING_ROWS
        )));
    }
    Ok(())
}

/// Train the first artifact of a deployment
pub fn train_initial(
    records: &[RawRecord],
    target: &str,
    schema: &FeatureSchema,
    config: &TrainingConfig,
) -> LifecycleResult<TrainedArtifact> {
    validate_training_batch(records, target)?;

    let mut encoders = BTreeMap::new();
    for column in &schema.categorical {
        let values = records
            .iter()
            .filter_map(|r| r.get(column).and_then(|v| v.as_category()));
        let encoder = LabelEncoder::fit(values).ok_or_else(|| {
            LifecycleError::InsufficientData(format!(
                "no values observed for categorical column '{}'",
                column
            ))
        })?;
        encoders.insert(column.clone(), encoder);
    }

    let contract = FeatureContract {
        feature_names: &schema.features,
        encoders: &encoders,
    };
    let fitted = fit_pipeline(records, target, contract, config.scaler, &config.classifier, config)?;

    let artifact = ModelArtifact::from_parts(
        INITIAL_VERSION,
        fitted.model,
        fitted.scaler,
        encoders,
        schema.features.clone(),
        config.risk_label,
        Utc::now(),
    )?
    .with_holdout_accuracy(fitted.holdout_accuracy);

    info!(
        version = %artifact.version(),
        family = artifact.model().spec().family(),
        rows = fitted.train_rows,
        holdout_accuracy = fitted.holdout_accuracy,
        "Initial model trained"
    );

    Ok(TrainedArtifact {
        artifact,
        holdout_accuracy: fitted.holdout_accuracy,
        holdout: fitted.holdout,
    })
}

/// Train a candidate that inherits the incumbent's contract.
///
/// A fresh scaler of the incumbent's kind and a fresh classifier of the
/// incumbent's family are fit on the train split only.
pub fn retrain_from(
    incumbent: &ModelArtifact,
    records: &[RawRecord],
    target: &str,
    config: &TrainingConfig,
    now: DateTime<Utc>,
) -> LifecycleResult<TrainedArtifact> {
    validate_training_batch(records, target)?;

    let spec = incumbent.model().spec();
    let fitted = fit_pipeline(
        records,
        target,
        FeatureContract::from(incumbent),
        incumbent.scaler().kind(),
        &spec,
        config,
    )?;

    let artifact = ModelArtifact::from_parts(
        next_version(incumbent.version()),
        fitted.model,
        fitted.scaler,
        incumbent.encoders().clone(),
        incumbent.feature_names().to_vec(),
        incumbent.risk_label(),
        now,
    )?
    .mark_retrained(now)
    .with_holdout_accuracy(fitted.holdout_accuracy);

    info!(
        incumbent = %incumbent.version(),
        candidate = %artifact.version(),
        rows = fitted.train_rows,
        holdout_accuracy = fitted.holdout_accuracy,
        "Candidate model trained"
    );

    Ok(TrainedArtifact {
        artifact,
        holdout_accuracy: fitted.holdout_accuracy,
        holdout: fitted.holdout,
    })
}

struct FittedPipeline {
    model: Classifier,
    scaler: Scaler,
    holdout_accuracy: f64,
    holdout: Vec<RawRecord>,
    train_rows: usize,
}

fn fit_pipeline(
    records: &[RawRecord],
    target: &str,
    contract: FeatureContract<'_>,
    scaler_kind: ScalerKind,
    spec: &ClassifierSpec,
    config: &TrainingConfig,
) -> LifecycleResult<FittedPipeline> {
    let codec = FeatureCodec::new();
    let mut rows = Vec::with_capacity(records.len());
    let mut labels = Vec::with_capacity(records.len());
    let mut sources = Vec::with_capacity(records.len());
    let mut unlabeled = 0usize;
    let mut rejected = 0usize;

    for (i, raw) in records.iter().enumerate() {
        let Some(label) = raw.label(target) else {
            unlabeled += 1;
            continue;
        };
        match codec.encode_with(raw, contract) {
            Ok(vector) => {
                rows.push(vector.values);
                labels.push(label);
                sources.push(i);
            }
            Err(e) => {
                rejected += 1;
                debug!(record_id = %raw.record_id(), error = %e, "Training row dropped");
            }
        }
    }

    if unlabeled > 0 || rejected > 0 {
        warn!(
            unlabeled,
            rejected,
            usable = rows.len(),
            "Training rows dropped"
        );
    }
    if rows.len() < MIN_TRAINING_ROWS {
        return Err(LifecycleError::InsufficientData(format!(
            "{} usable rows, at least {} required",
            rows.len(),
            MIN_TRAINING_ROWS
        )));
    }

    let split = stratified_split(&labels, config.test_fraction, config.split_seed)?;
    let pick = |idx: &[usize]| -> (Vec<Vec<f64>>, Vec<u8>) {
        (
            idx.iter().map(|&i| rows[i].clone()).collect(),
            idx.iter().map(|&i| labels[i]).collect(),
        )
    };
    let (train_x, train_y) = pick(&split.train);
    let (test_x, test_y) = pick(&split.test);

    // No leakage: the scaler only ever sees the train side
    let scaler = Scaler::fit(scaler_kind, &train_x)?;
    let train_x = scaler.transform_all(&train_x)?;
    let test_x = scaler.transform_all(&test_x)?;

    let model = spec.fit(&train_x, &train_y)?;
    let predicted = test_x
        .iter()
        .map(|x| model.predict(x))
        .collect::<LifecycleResult<Vec<u8>>>()?;
    let holdout_accuracy = ClassificationMetrics::compute(&test_y, &predicted).accuracy;

    let holdout = split
        .test
        .iter()
        .map(|&i| records[sources[i]].clone())
        .collect();

    Ok(FittedPipeline {
        model,
        scaler,
        holdout_accuracy,
        holdout,
        train_rows: train_y.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::test_support::{labeled_records, trained_artifact};

    #[test]
    fn test_student_default_schema() {
        let schema = FeatureSchema::student_default();
        assert_eq!(schema.features.len(), 9);
        assert!(schema.is_categorical("gender"));
        assert!(!schema.is_categorical("age"));
    }

    #[test]
    fn test_schema_rejects_unknown_categorical() {
        let err = FeatureSchema::new(vec!["age".into()], vec!["gender".into()]).unwrap_err();
        assert_eq!(err.kind(), "schema_mismatch");
    }

    #[test]
    fn test_train_initial_builds_consistent_artifact() {
        let records = labeled_records(300, 1);
        let trained = train_initial(
            &records,
            "is_active",
            &FeatureSchema::student_default(),
            &TrainingConfig::default(),
        )
        .unwrap();

        let artifact = &trained.artifact;
        assert_eq!(artifact.version(), "v1");
        assert_eq!(artifact.model().spec().family(), "gradient_boosting");
        assert_eq!(artifact.encoders().len(), 3);
        assert_eq!(artifact.retrained_at(), None);
        assert!((58..=62).contains(&trained.holdout.len()));
        assert!(trained.holdout_accuracy > 0.6);
    }

    #[test]
    fn test_training_is_reproducible() {
        let records = labeled_records(120, 4);
        let config = TrainingConfig {
            classifier: ClassifierSpec::logistic(),
            ..TrainingConfig::default()
        };
        let schema = FeatureSchema::student_default();
        let a = train_initial(&records, "is_active", &schema, &config).unwrap();
        let b = train_initial(&records, "is_active", &schema, &config).unwrap();
        assert_eq!(a.artifact.model(), b.artifact.model());
        assert_eq!(a.holdout, b.holdout);
    }

    #[test]
    fn test_retrain_inherits_contract() {
        let incumbent = trained_artifact();
        let records = labeled_records(150, 99);
        let now = Utc::now();
        let trained =
            retrain_from(&incumbent, &records, "is_active", &TrainingConfig::default(), now)
                .unwrap();

        let candidate = &trained.artifact;
        assert_eq!(candidate.version(), "v2");
        assert_eq!(candidate.feature_names(), incumbent.feature_names());
        assert_eq!(candidate.encoders(), incumbent.encoders());
        assert_eq!(candidate.scaler().kind(), incumbent.scaler().kind());
        assert_eq!(candidate.model().spec(), incumbent.model().spec());
        assert_eq!(candidate.retrained_at(), Some(now));
        assert_eq!(candidate.holdout_accuracy(), Some(trained.holdout_accuracy));
    }

    #[test]
    fn test_too_few_rows() {
        let incumbent = trained_artifact();
        let records = labeled_records(5, 2);
        let err = retrain_from(
            &incumbent,
            &records,
            "is_active",
            &TrainingConfig::default(),
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "insufficient_data");
    }

    #[test]
    fn test_missing_target_column() {
        let records: Vec<RawRecord> = labeled_records(20, 2)
            .into_iter()
            .map(|mut r| {
                r.fields.remove("is_active");
                r
            })
            .collect();
        let err = validate_training_batch(&records, "is_active").unwrap_err();
        assert!(err.to_string().contains("is_active"));
    }

    #[test]
    fn test_unusable_rows_count_against_minimum() {
        let incumbent = trained_artifact();
        let mut records = labeled_records(12, 8);
        for r in records.iter_mut().take(4) {
            r.fields
                .insert("age".into(), crate::models::FieldValue::Text("n/a".into()));
        }
        let err = retrain_from(
            &incumbent,
            &records,
            "is_active",
            &TrainingConfig::default(),
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "insufficient_data");
    }
}
