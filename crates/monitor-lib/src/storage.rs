//! Record source and prediction sink
//!
//! The core only needs two queries from storage: records updated since a
//! point in time, and records carrying a target label. Completeness
//! reporting backs the hourly data-quality check.

use crate::models::{PredictionResult, RawRecord, StudentRecord};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Column holding the RFC 3339 update time in record files
pub const LAST_UPDATED_COLUMN: &str = "last_updated";

/// Storage collaborator contract
pub trait RecordStore: Send + Sync {
    /// Records updated strictly after `since`
    fn fetch_updated_since(&self, since: DateTime<Utc>) -> Result<Vec<RawRecord>>;

    /// Records carrying a binary `target` label
    fn fetch_labeled(&self, target: &str) -> Result<Vec<RawRecord>>;

    /// Missing-value report over every stored record
    fn completeness(&self, required: &[String]) -> Result<CompletenessReport>;

    /// Persist prediction results, returning how many were written
    fn save_predictions(&self, results: &[PredictionResult]) -> Result<usize>;
}

/// Missing-data summary for a record population
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletenessReport {
    pub total_records: usize,
    pub missing_ids: usize,
    /// Records missing at least one required column
    pub incomplete_records: usize,
    pub missing_by_column: BTreeMap<String, usize>,
}

impl CompletenessReport {
    pub fn compute<'a>(records: impl IntoIterator<Item = &'a RawRecord>, required: &[String]) -> Self {
        let mut report = CompletenessReport::default();
        for record in records {
            report.total_records += 1;
            if record.id.as_deref().map_or(true, |id| id.trim().is_empty()) {
                report.missing_ids += 1;
            }
            let mut incomplete = false;
            for column in required {
                if record.get(column).map_or(true, |v| v.is_missing()) {
                    *report.missing_by_column.entry(column.clone()).or_default() += 1;
                    incomplete = true;
                }
            }
            if incomplete {
                report.incomplete_records += 1;
            }
        }
        report
    }

    pub fn is_clean(&self) -> bool {
        self.missing_ids == 0 && self.incomplete_records == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
struct StoredRecord {
    raw: RawRecord,
    last_updated: Option<DateTime<Utc>>,
}

impl StoredRecord {
    /// Split the update timestamp out of a raw row
    fn from_raw(mut raw: RawRecord) -> Self {
        let last_updated = raw
            .fields
            .remove(LAST_UPDATED_COLUMN)
            .and_then(|v| v.as_category())
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|t| t.with_timezone(&Utc));
        Self { raw, last_updated }
    }

    fn updated_after(&self, since: DateTime<Utc>) -> bool {
        self.last_updated.map_or(false, |t| t > since)
    }
}

fn select_updated(records: &[StoredRecord], since: DateTime<Utc>) -> Vec<RawRecord> {
    records
        .iter()
        .filter(|r| r.updated_after(since))
        .map(|r| r.raw.clone())
        .collect()
}

fn select_labeled(records: &[StoredRecord], target: &str) -> Vec<RawRecord> {
    records
        .iter()
        .filter(|r| r.raw.label(target).is_some())
        .map(|r| r.raw.clone())
        .collect()
}

/// In-process store for tests and replays
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: Mutex<Vec<StoredRecord>>,
    predictions: Mutex<Vec<PredictionResult>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, raw: RawRecord, last_updated: Option<DateTime<Utc>>) {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.push(StoredRecord { raw, last_updated });
    }

    pub fn insert_student(&self, student: &StudentRecord) {
        self.insert(student.to_raw(), student.last_updated);
    }

    /// Everything passed to `save_predictions` so far
    pub fn predictions(&self) -> Vec<PredictionResult> {
        self.predictions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl RecordStore for InMemoryRecordStore {
    fn fetch_updated_since(&self, since: DateTime<Utc>) -> Result<Vec<RawRecord>> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(select_updated(&records, since))
    }

    fn fetch_labeled(&self, target: &str) -> Result<Vec<RawRecord>> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(select_labeled(&records, target))
    }

    fn completeness(&self, required: &[String]) -> Result<CompletenessReport> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(CompletenessReport::compute(records.iter().map(|r| &r.raw), required))
    }

    fn save_predictions(&self, results: &[PredictionResult]) -> Result<usize> {
        let mut predictions = self.predictions.lock().unwrap_or_else(PoisonError::into_inner);
        predictions.extend_from_slice(results);
        Ok(results.len())
    }
}

/// Store reading a JSON array of records and appending predictions as JSON lines.
///
/// The records file is re-read on every query so external updates are
/// picked up by the next scheduled run.
#[derive(Debug, Clone)]
pub struct JsonFileRecordStore {
    records_path: PathBuf,
    predictions_path: PathBuf,
}

impl JsonFileRecordStore {
    pub fn new(records_path: impl Into<PathBuf>, predictions_path: impl Into<PathBuf>) -> Self {
        Self {
            records_path: records_path.into(),
            predictions_path: predictions_path.into(),
        }
    }

    pub fn records_path(&self) -> &Path {
        &self.records_path
    }

    fn load(&self) -> Result<Vec<StoredRecord>> {
        if !self.records_path.exists() {
            warn!(path = %self.records_path.display(), "Records file not found, treating as empty");
            return Ok(Vec::new());
        }
        let data = fs::read(&self.records_path)
            .with_context(|| format!("Failed to read records file {:?}", self.records_path))?;
        let rows: Vec<RawRecord> = serde_json::from_slice(&data)
            .with_context(|| format!("Failed to parse records file {:?}", self.records_path))?;
        debug!(path = %self.records_path.display(), rows = rows.len(), "Records loaded");
        Ok(rows.into_iter().map(StoredRecord::from_raw).collect())
    }

    /// Every stored record, whatever its update time or label
    pub fn fetch_all(&self) -> Result<Vec<RawRecord>> {
        Ok(self.load()?.into_iter().map(|r| r.raw).collect())
    }

    /// Write students as a records file
    pub fn write_students(path: &Path, students: &[StudentRecord]) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }
        let json = serde_json::to_vec_pretty(students).context("Failed to serialize students")?;
        fs::write(path, json).with_context(|| format!("Failed to write records file {:?}", path))
    }
}

impl RecordStore for JsonFileRecordStore {
    fn fetch_updated_since(&self, since: DateTime<Utc>) -> Result<Vec<RawRecord>> {
        Ok(select_updated(&self.load()?, since))
    }

    fn fetch_labeled(&self, target: &str) -> Result<Vec<RawRecord>> {
        Ok(select_labeled(&self.load()?, target))
    }

    fn completeness(&self, required: &[String]) -> Result<CompletenessReport> {
        let records = self.load()?;
        Ok(CompletenessReport::compute(records.iter().map(|r| &r.raw), required))
    }

    fn save_predictions(&self, results: &[PredictionResult]) -> Result<usize> {
        if results.is_empty() {
            return Ok(0);
        }
        if let Some(parent) = self
            .predictions_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }

        let mut buf = Vec::new();
        for result in results {
            serde_json::to_writer(&mut buf, result).context("Failed to serialize prediction")?;
            buf.push(b'\n');
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.predictions_path)
            .with_context(|| format!("Failed to open predictions file {:?}", self.predictions_path))?;
        file.write_all(&buf)
            .context("Failed to append predictions")?;
        file.sync_all().context("Failed to sync predictions file")?;

        info!(
            path = %self.predictions_path.display(),
            count = results.len(),
            "Predictions saved"
        );
        Ok(results.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldValue, RiskBand};
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn prediction(id: &str) -> PredictionResult {
        PredictionResult {
            record_id: id.to_string(),
            prediction: 0,
            probability: 0.82,
            risk_band: RiskBand::High,
            model_version: "v1".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 2, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_completeness_report() {
        let records = vec![
            RawRecord::new("STU00001").with("age", 17.0).with("gender", "F"),
            RawRecord::new("STU00002").with("age", 18.0),
            RawRecord {
                id: None,
                fields: [("age".to_string(), FieldValue::Null)].into_iter().collect(),
            },
        ];
        let report = CompletenessReport::compute(&records, &columns(&["age", "gender"]));
        assert_eq!(report.total_records, 3);
        assert_eq!(report.missing_ids, 1);
        assert_eq!(report.incomplete_records, 2);
        assert_eq!(report.missing_by_column["gender"], 2);
        assert_eq!(report.missing_by_column["age"], 1);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_in_memory_queries() {
        let store = InMemoryRecordStore::new();
        let now = Utc.with_ymd_and_hms(2024, 3, 2, 2, 0, 0).unwrap();
        store.insert(
            RawRecord::new("recent").with("is_active", 1.0),
            Some(now - Duration::hours(3)),
        );
        store.insert(RawRecord::new("stale"), Some(now - Duration::days(3)));
        store.insert(RawRecord::new("undated").with("is_active", 0.0), None);

        let updated = store.fetch_updated_since(now - Duration::hours(24)).unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].record_id(), "recent");

        let labeled = store.fetch_labeled("is_active").unwrap();
        assert_eq!(labeled.len(), 2);

        store.save_predictions(&[prediction("recent")]).unwrap();
        assert_eq!(store.predictions().len(), 1);
    }

    #[test]
    fn test_json_file_store() {
        let temp_dir = TempDir::new().unwrap();
        let records_path = temp_dir.path().join("records.json");
        fs::write(
            &records_path,
            r#"[
                {"student_id": "STU00001", "age": 17, "is_active": 1, "last_updated": "2024-03-01T12:00:00Z"},
                {"student_id": "STU00002", "age": 19, "last_updated": "2024-02-01T12:00:00Z"},
                {"age": 18}
            ]"#,
        )
        .unwrap();
        let store = JsonFileRecordStore::new(&records_path, temp_dir.path().join("out/predictions.jsonl"));

        let since = Utc.with_ymd_and_hms(2024, 2, 28, 0, 0, 0).unwrap();
        let updated = store.fetch_updated_since(since).unwrap();
        assert_eq!(updated.len(), 1);
        assert!(updated[0].get(LAST_UPDATED_COLUMN).is_none());

        assert_eq!(store.fetch_labeled("is_active").unwrap().len(), 1);
        assert_eq!(store.completeness(&columns(&["age"])).unwrap().missing_ids, 1);
        assert_eq!(store.fetch_all().unwrap().len(), 3);
    }

    #[test]
    fn test_predictions_appended_as_json_lines() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path().join("predictions.jsonl");
        let store = JsonFileRecordStore::new(temp_dir.path().join("none.json"), &out);

        store.save_predictions(&[prediction("a"), prediction("b")]).unwrap();
        store.save_predictions(&[prediction("c")]).unwrap();

        let text = fs::read_to_string(&out).unwrap();
        let lines: Vec<PredictionResult> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[2].record_id, "c");
    }

    #[test]
    fn test_missing_records_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonFileRecordStore::new(
            temp_dir.path().join("absent.json"),
            temp_dir.path().join("p.jsonl"),
        );
        assert!(store.fetch_labeled("is_active").unwrap().is_empty());
    }

    #[test]
    fn test_write_students_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("students.json");
        let mut students = crate::synthetic::generate(5, 1);
        students[0].last_updated = Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
        JsonFileRecordStore::write_students(&path, &students).unwrap();

        let store = JsonFileRecordStore::new(&path, temp_dir.path().join("p.jsonl"));
        assert_eq!(store.fetch_labeled("is_active").unwrap().len(), 5);
        let since = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        assert_eq!(store.fetch_updated_since(since).unwrap().len(), 1);
    }
}
