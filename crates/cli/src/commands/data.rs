//! Population and scoring commands

use anyhow::{Context, Result};
use chrono::Utc;
use colored::Colorize;
use monitor_lib::{
    artifact::ArtifactSlot,
    models::{PredictionResult, RiskBand},
    predictor::Predictor,
    storage::{JsonFileRecordStore, RecordStore},
    synthetic,
};
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;

use super::{read_records, Session};
use crate::output::{
    color_band, format_probability, print_header, print_info, print_json, print_success,
    print_table, print_warning, OutputFormat,
};

#[derive(Serialize)]
struct GenerateSummary {
    output: String,
    students: usize,
    active: usize,
    dropped_out: usize,
    seed: u64,
}

/// Write a synthetic population, stamped as updated now
pub fn generate(session: &Session, count: usize, seed: u64, output: &Path) -> Result<()> {
    let now = Utc::now();
    let mut students = synthetic::generate(count, seed);
    for student in &mut students {
        student.last_updated = Some(now);
    }
    JsonFileRecordStore::write_students(output, &students)?;

    let active = students.iter().filter(|s| s.is_active == Some(1)).count();
    let summary = GenerateSummary {
        output: output.display().to_string(),
        students: students.len(),
        active,
        dropped_out: students.len() - active,
        seed,
    };

    match session.format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Table => {
            print_success(&format!(
                "Wrote {} students to {}",
                summary.students, summary.output
            ));
            println!(
                "Active: {}  Dropped out: {}",
                summary.active.to_string().green(),
                summary.dropped_out.to_string().red()
            );
        }
    }
    Ok(())
}

#[derive(Tabled)]
struct PredictionRow {
    #[tabled(rename = "Student")]
    student: String,
    #[tabled(rename = "Prediction")]
    prediction: String,
    #[tabled(rename = "Risk")]
    probability: String,
    #[tabled(rename = "Band")]
    band: String,
    #[tabled(rename = "Model")]
    model: String,
}

#[derive(Serialize)]
struct ScoreFailure {
    record_id: String,
    error: String,
}

#[derive(Serialize)]
struct ScoreOutput<'a> {
    predictions: Vec<&'a PredictionResult>,
    failures: Vec<ScoreFailure>,
    high_risk: usize,
}

fn label_name(label: u8) -> &'static str {
    if label == 1 {
        "Active"
    } else {
        "Dropout"
    }
}

/// Score every record in `data` with the active artifact
pub fn score(session: &Session, data: &Path, high_only: bool, save: Option<&Path>) -> Result<()> {
    let artifact = session.load_artifact(&session.artifact_path)?;
    let predictor = Predictor::new(ArtifactSlot::with_artifact(artifact));
    let records = read_records(data)?;

    let entries = predictor.score_batch(&records)?;
    let mut results = Vec::with_capacity(entries.len());
    let mut failures = Vec::new();
    for entry in entries {
        match entry {
            Ok(result) => results.push(result),
            Err(e) => failures.push(ScoreFailure {
                record_id: e.record_id,
                error: e.error.to_string(),
            }),
        }
    }

    if let Some(path) = save {
        let written = JsonFileRecordStore::new(data, path)
            .save_predictions(&results)
            .with_context(|| format!("Failed to save predictions to {}", path.display()))?;
        if session.format == OutputFormat::Table {
            print_info(&format!("Appended {} predictions to {}", written, path.display()));
        }
    }

    let high_risk = results
        .iter()
        .filter(|r| r.risk_band == RiskBand::High)
        .count();
    let shown: Vec<&PredictionResult> = results
        .iter()
        .filter(|r| !high_only || r.risk_band == RiskBand::High)
        .collect();

    match session.format {
        OutputFormat::Json => print_json(&ScoreOutput {
            predictions: shown,
            failures,
            high_risk,
        })?,
        OutputFormat::Table => {
            print_header("Dropout Risk Predictions", 70);
            let rows: Vec<PredictionRow> = shown
                .iter()
                .map(|r| PredictionRow {
                    student: r.record_id.clone(),
                    prediction: label_name(r.prediction).to_string(),
                    probability: format_probability(r.probability),
                    band: color_band(r.risk_band),
                    model: r.model_version.clone(),
                })
                .collect();
            print_table(rows, "No predictions to show");

            for failure in &failures {
                print_warning(&format!("{}: {}", failure.record_id, failure.error));
            }
            println!(
                "\nScored: {}  Failed: {}  High risk: {}",
                results.len(),
                failures.len(),
                high_risk.to_string().red().bold()
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_stamps_update_time() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("students.json");
        let session = Session {
            artifact_path: dir.path().join("model.json"),
            backup_path: None,
            target: "is_active".to_string(),
            format: OutputFormat::Json,
            verbose: false,
        };

        generate(&session, 25, 9, &path).unwrap();

        let store = JsonFileRecordStore::new(&path, dir.path().join("p.jsonl"));
        let recent = store
            .fetch_updated_since(Utc::now() - chrono::Duration::hours(1))
            .unwrap();
        assert_eq!(recent.len(), 25);
    }
}
