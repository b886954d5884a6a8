//! Model training, evaluation and inspection commands

use anyhow::{Context, Result};
use chrono::Utc;
use clap::ValueEnum;
use colored::Colorize;
use monitor_lib::{
    artifact::{
        train_initial, ArtifactSlot, ArtifactStore, FeatureSchema, FsArtifactStore, ModelArtifact,
        TrainingConfig,
    },
    ml::{ClassifierSpec, ScalerKind},
    models::PerformanceSnapshot,
    predictor::Predictor,
    tracking::{PerformanceTracker, TrackerConfig},
};
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;

use super::{read_labeled, Session};
use crate::output::{
    color_delta, format_metric, format_timestamp, print_header, print_info, print_json,
    print_success, print_table, print_warning, OutputFormat,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ClassifierArg {
    Logistic,
    GradientBoosting,
}

impl From<ClassifierArg> for ClassifierSpec {
    fn from(arg: ClassifierArg) -> Self {
        match arg {
            ClassifierArg::Logistic => ClassifierSpec::logistic(),
            ClassifierArg::GradientBoosting => ClassifierSpec::gradient_boosting(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScalerArg {
    Standard,
    MinMax,
}

impl From<ScalerArg> for ScalerKind {
    fn from(arg: ScalerArg) -> Self {
        match arg {
            ScalerArg::Standard => ScalerKind::Standard,
            ScalerArg::MinMax => ScalerKind::MinMax,
        }
    }
}

#[derive(Serialize)]
struct TrainSummary {
    version: String,
    path: String,
    classifier: &'static str,
    training_rows: usize,
    holdout_accuracy: f64,
    holdout_rows: usize,
}

/// Bootstrap-train an artifact into the active slot
pub fn train(
    session: &Session,
    data: &Path,
    classifier: ClassifierArg,
    scaler: ScalerArg,
    force: bool,
) -> Result<()> {
    let store = FsArtifactStore::new();
    if store.exists(&session.artifact_path) && !force {
        anyhow::bail!(
            "Active artifact {} already exists; use --force to replace it or `retrain` to arbitrate",
            session.artifact_path.display()
        );
    }

    let records = read_labeled(data, &session.target)?;
    let config = TrainingConfig {
        classifier: classifier.into(),
        scaler: scaler.into(),
        ..TrainingConfig::default()
    };
    let trained = train_initial(
        &records,
        &session.target,
        &FeatureSchema::student_default(),
        &config,
    )
    .context("Training failed")?;
    store
        .save(&trained.artifact, &session.artifact_path)
        .with_context(|| format!("Failed to save artifact {}", session.artifact_path.display()))?;

    let summary = TrainSummary {
        version: trained.artifact.version().to_string(),
        path: session.artifact_path.display().to_string(),
        classifier: config.classifier.family(),
        training_rows: records.len(),
        holdout_accuracy: trained.holdout_accuracy,
        holdout_rows: trained.holdout.len(),
    };
    match session.format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Table => {
            print_success(&format!(
                "Trained {} ({}) on {} records",
                summary.version.cyan(),
                summary.classifier,
                summary.training_rows
            ));
            println!(
                "Holdout accuracy: {} over {} records",
                format_metric(summary.holdout_accuracy),
                summary.holdout_rows
            );
            println!("Saved to {}", summary.path);
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct EvaluationOutput {
    snapshot: PerformanceSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    drift: Option<DriftOutput>,
}

#[derive(Serialize)]
struct DriftOutput {
    previous_accuracy: f64,
    current_accuracy: f64,
    drop: f64,
    threshold: f64,
    drifting: bool,
}

/// Measure the active model against labeled records
pub fn evaluate(session: &Session, data: &Path, previous_accuracy: Option<f64>) -> Result<()> {
    let artifact = session.load_artifact(&session.artifact_path)?;
    let version = artifact.version().to_string();
    let predictor = Predictor::new(ArtifactSlot::with_artifact(artifact));
    let records = read_labeled(data, &session.target)?;

    let mut tracker = PerformanceTracker::new(TrackerConfig::default());
    if let Some(accuracy) = previous_accuracy {
        if !(0.0..=1.0).contains(&accuracy) {
            anyhow::bail!("--previous-accuracy must lie in [0, 1], got {}", accuracy);
        }
        tracker.push_snapshot(PerformanceSnapshot {
            timestamp: Utc::now(),
            accuracy,
            f1_score: 0.0,
            sample_count: 0,
            model_version: version,
        });
    }
    let snapshot = tracker
        .evaluate(&predictor, &records, &session.target)
        .context("Evaluation failed")?;
    let drift = tracker.drift_report().map(|r| DriftOutput {
        previous_accuracy: r.previous_accuracy,
        current_accuracy: r.current_accuracy,
        drop: r.drop,
        threshold: r.threshold,
        drifting: r.drifting,
    });

    match session.format {
        OutputFormat::Json => print_json(&EvaluationOutput { snapshot, drift })?,
        OutputFormat::Table => {
            print_header("Model Performance", 50);
            println!("Model:    {}", snapshot.model_version.cyan());
            println!("Accuracy: {}", format_metric(snapshot.accuracy));
            println!("F1:       {}", format_metric(snapshot.f1_score));
            println!("Samples:  {}", snapshot.sample_count);
            if let Some(drift) = drift {
                println!();
                println!(
                    "Accuracy change: {} (threshold {})",
                    color_delta(-drift.drop),
                    format_metric(drift.threshold)
                );
                if drift.drifting {
                    print_warning("Drift detected; run `riskctl retrain` to arbitrate a new model");
                } else {
                    print_success("No drift");
                }
            }
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct ArtifactInfo {
    slot: &'static str,
    path: String,
    version: String,
    classifier: &'static str,
    scaler: String,
    trained_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    retrained_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    holdout_accuracy: Option<f64>,
    risk_label: u8,
    fingerprint: String,
    features: Vec<FeatureInfo>,
}

#[derive(Serialize, Tabled)]
struct FeatureInfo {
    #[tabled(rename = "#")]
    position: usize,
    #[tabled(rename = "Feature")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: &'static str,
    #[tabled(rename = "Categories")]
    categories: String,
}

fn describe(
    artifact: &ModelArtifact,
    slot: &'static str,
    path: &Path,
    verbose: bool,
) -> Result<ArtifactInfo> {
    let features = artifact
        .feature_names()
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let encoder = artifact.encoders().get(name);
            let categories = match encoder {
                Some(e) if verbose => e.classes().join(", "),
                Some(e) => e.classes().len().to_string(),
                None => "-".to_string(),
            };
            FeatureInfo {
                position: i + 1,
                name: name.clone(),
                kind: if encoder.is_some() { "categorical" } else { "numeric" },
                categories,
            }
        })
        .collect();

    Ok(ArtifactInfo {
        slot,
        path: path.display().to_string(),
        version: artifact.version().to_string(),
        classifier: artifact.model().spec().family(),
        scaler: format!("{:?}", artifact.scaler().kind()),
        trained_at: format_timestamp(&artifact.trained_at()),
        retrained_at: artifact.retrained_at().map(|t| format_timestamp(&t)),
        holdout_accuracy: artifact.holdout_accuracy(),
        risk_label: artifact.risk_label(),
        fingerprint: artifact.fingerprint()?,
        features,
    })
}

/// Show the active or backup artifact
pub fn inspect(session: &Session, backup_slot: bool) -> Result<()> {
    let config = session.lifecycle_config();
    let (slot, path) = if backup_slot {
        ("backup", config.backup_path.clone())
    } else {
        ("active", config.active_path.clone())
    };
    let artifact = session.load_artifact(&path)?;
    let info = describe(&artifact, slot, &path, session.verbose)?;

    match session.format {
        OutputFormat::Json => print_json(&info)?,
        OutputFormat::Table => {
            print_header(&format!("Model Artifact ({})", info.slot), 60);
            println!("Path:        {}", info.path);
            println!("Version:     {}", info.version.cyan());
            println!("Classifier:  {}", info.classifier);
            println!("Scaler:      {}", info.scaler);
            println!("Trained:     {}", info.trained_at);
            if let Some(retrained) = &info.retrained_at {
                println!("Retrained:   {}", retrained);
            }
            if let Some(accuracy) = info.holdout_accuracy {
                println!("Holdout acc: {}", format_metric(accuracy));
            }
            println!("Risk label:  {}", info.risk_label);
            if session.verbose {
                println!("Fingerprint: {}", info.fingerprint);
            }
            println!();
            print_table(info.features, "Artifact has no features");

            if !backup_slot {
                match FsArtifactStore::new().load(&config.backup_path) {
                    Ok(backup) => print_info(&format!(
                        "Backup slot holds {} ({})",
                        backup.version(),
                        config.backup_path.display()
                    )),
                    Err(_) => print_warning("No usable backup artifact; rollback is unavailable"),
                }
            }
        }
    }
    Ok(())
}
