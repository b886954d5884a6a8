//! Core data models for the dropout risk monitor

use crate::error::LifecycleError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier used when a record carries no `student_id`
pub const UNKNOWN_RECORD_ID: &str = "unknown";

/// A single raw attribute value as delivered by the storage collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Flag(bool),
    Text(String),
    Null,
}

impl FieldValue {
    pub fn is_missing(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Numeric view of the value. Text is accepted only when it parses as a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Flag(b) => Some(if *b { 1.0 } else { 0.0 }),
            FieldValue::Text(s) => s.trim().parse::<f64>().ok(),
            FieldValue::Null => None,
        }
    }

    /// Categorical view of the value
    pub fn as_category(&self) -> Option<String> {
        match self {
            FieldValue::Text(s) => Some(s.clone()),
            FieldValue::Number(n) if n.fract() == 0.0 && n.is_finite() => {
                Some(format!("{}", *n as i64))
            }
            FieldValue::Number(n) => Some(n.to_string()),
            FieldValue::Flag(b) => Some(b.to_string()),
            FieldValue::Null => None,
        }
    }

    /// Binary label view (0 or 1)
    pub fn as_label(&self) -> Option<u8> {
        match self.as_number() {
            Some(v) if v == 0.0 => Some(0),
            Some(v) if v == 1.0 => Some(1),
            _ => None,
        }
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Number(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

/// One subject's raw attributes, keyed by column name.
///
/// Never mutated by the core; the feature codec reads it against the
/// artifact's contract. Columns outside the contract are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(rename = "student_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, FieldValue>,
}

impl RawRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field setter
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn record_id(&self) -> &str {
        self.id.as_deref().unwrap_or(UNKNOWN_RECORD_ID)
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Ground-truth label for `target`, if present and binary
    pub fn label(&self, target: &str) -> Option<u8> {
        self.fields.get(target).and_then(FieldValue::as_label)
    }
}

/// Typed student attributes, as produced by the synthetic generator and
/// the operator tooling. Converted to a `RawRecord` at the core boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentRecord {
    pub student_id: String,
    pub name: String,
    pub gender: String,
    pub age: u32,
    pub socioeconomic_status: String,
    pub previous_academic_score: f64,
    pub distance_from_school_km: f64,
    pub attendance_rate: f64,
    pub avg_test_score: f64,
    pub fee_default_rate: f64,
    pub extracurricular_participation: String,
    pub mentor_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl StudentRecord {
    pub fn to_raw(&self) -> RawRecord {
        let mut raw = RawRecord::new(self.student_id.clone())
            .with("name", self.name.as_str())
            .with("gender", self.gender.as_str())
            .with("age", self.age as f64)
            .with("socioeconomic_status", self.socioeconomic_status.as_str())
            .with("previous_academic_score", self.previous_academic_score)
            .with("distance_from_school_km", self.distance_from_school_km)
            .with("attendance_rate", self.attendance_rate)
            .with("avg_test_score", self.avg_test_score)
            .with("fee_default_rate", self.fee_default_rate)
            .with(
                "extracurricular_participation",
                self.extracurricular_participation.as_str(),
            )
            .with("mentor_id", self.mentor_id.as_str());
        if let Some(label) = self.is_active {
            raw = raw.with("is_active", label as f64);
        }
        raw
    }
}

/// Model-ready numeric vector laid out in the artifact's feature order
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    pub columns: Vec<String>,
    pub values: Vec<f64>,
}

impl FeatureVector {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, column: &str) -> Option<f64> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| self.values[i])
    }
}

/// Three-tier classification of a dropout probability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskBand {
    Low,
    Medium,
    High,
}

impl RiskBand {
    /// Traffic-light name used in operator-facing messages
    pub fn colour(&self) -> &'static str {
        match self {
            RiskBand::Low => "Green",
            RiskBand::Medium => "Amber",
            RiskBand::High => "Red",
        }
    }
}

impl fmt::Display for RiskBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskBand::Low => write!(f, "Low"),
            RiskBand::Medium => write!(f, "Medium"),
            RiskBand::High => write!(f, "High"),
        }
    }
}

/// Outcome of scoring one record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub record_id: String,
    pub prediction: u8,
    pub probability: f64,
    pub risk_band: RiskBand,
    pub model_version: String,
    pub timestamp: DateTime<Utc>,
}

/// A record that could not be scored inside a batch
#[derive(Debug, Clone, PartialEq)]
pub struct RecordError {
    pub record_id: String,
    pub error: LifecycleError,
}

/// One entry of a batch scoring result
pub type BatchEntry = std::result::Result<PredictionResult, RecordError>;

/// Model performance measured against one labeled batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub timestamp: DateTime<Utc>,
    pub accuracy: f64,
    pub f1_score: f64,
    pub sample_count: usize,
    pub model_version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_record_json_shape() {
        let json = r#"{"student_id":"STU00001","age":18,"gender":"M","is_active":1,"note":null}"#;
        let record: RawRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.record_id(), "STU00001");
        assert_eq!(record.get("age"), Some(&FieldValue::Number(18.0)));
        assert_eq!(record.get("gender"), Some(&FieldValue::Text("M".into())));
        assert_eq!(record.get("note"), Some(&FieldValue::Null));
        assert_eq!(record.label("is_active"), Some(1));
    }

    #[test]
    fn test_missing_id_falls_back_to_unknown() {
        let record: RawRecord = serde_json::from_str(r#"{"age":17}"#).unwrap();
        assert_eq!(record.record_id(), UNKNOWN_RECORD_ID);
    }

    #[test]
    fn test_field_value_views() {
        assert_eq!(FieldValue::Text(" 3.5 ".into()).as_number(), Some(3.5));
        assert_eq!(FieldValue::Text("eighteen".into()).as_number(), None);
        assert_eq!(FieldValue::Number(2.0).as_category(), Some("2".to_string()));
        assert_eq!(FieldValue::Flag(true).as_label(), Some(1));
        assert_eq!(FieldValue::Number(0.5).as_label(), None);
        assert!(FieldValue::Null.is_missing());
    }

    #[test]
    fn test_student_record_to_raw() {
        let student = StudentRecord {
            student_id: "STU00123".into(),
            name: "Student_123".into(),
            gender: "M".into(),
            age: 18,
            socioeconomic_status: "Middle".into(),
            previous_academic_score: 68.5,
            distance_from_school_km: 3.2,
            attendance_rate: 0.65,
            avg_test_score: 48.7,
            fee_default_rate: 0.9,
            extracurricular_participation: "Low".into(),
            mentor_id: "MENT001".into(),
            is_active: Some(0),
            last_updated: None,
        };
        let raw = student.to_raw();
        assert_eq!(raw.record_id(), "STU00123");
        assert_eq!(raw.get("attendance_rate"), Some(&FieldValue::Number(0.65)));
        assert_eq!(raw.label("is_active"), Some(0));
    }

    #[test]
    fn test_risk_band_display() {
        assert_eq!(RiskBand::High.to_string(), "High");
        assert_eq!(RiskBand::Medium.colour(), "Amber");
    }
}
