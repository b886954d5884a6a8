//! Retrain, arbitrate and rollback commands

use anyhow::{Context, Result};
use colored::Colorize;
use monitor_lib::lifecycle::{ArbitrationReport, CycleOutcome, Verdict};
use monitor_lib::ml::ClassificationMetrics;
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;

use super::{read_labeled, Session};
use crate::output::{
    color_branch, color_delta, format_metric, print_header, print_info, print_json, print_success,
    print_table, print_warning, OutputFormat,
};

#[derive(Tabled)]
struct ComparisonRow {
    #[tabled(rename = "Metric")]
    metric: &'static str,
    #[tabled(rename = "Incumbent")]
    incumbent: String,
    #[tabled(rename = "Candidate")]
    candidate: String,
    #[tabled(rename = "Change")]
    change: String,
}

fn comparison_rows(report: &ArbitrationReport) -> Vec<ComparisonRow> {
    let (Some(inc), Some(cand)) = (report.incumbent, report.candidate) else {
        return Vec::new();
    };
    let row = |metric, pick: fn(&ClassificationMetrics) -> f64| ComparisonRow {
        metric,
        incumbent: format_metric(pick(&inc)),
        candidate: format_metric(pick(&cand)),
        change: color_delta(pick(&cand) - pick(&inc)),
    };
    vec![row("Accuracy", |m| m.accuracy), row("F1", |m| m.f1)]
}

fn print_report(report: &ArbitrationReport) {
    print_table(comparison_rows(report), "No measurements available");
    println!(
        "Verdict: {} (margin {})",
        color_branch(&report.verdict.to_string()),
        format_metric(report.margin)
    );
    if let Some(reason) = &report.fallback_reason {
        print_warning(&format!("Incumbent kept by fallback: {}", reason));
    }
}

#[derive(Serialize)]
struct DryRunOutput<'a> {
    incumbent_version: String,
    candidate_version: String,
    candidate_holdout_accuracy: f64,
    report: &'a ArbitrationReport,
}

#[derive(Serialize)]
#[serde(tag = "branch", rename_all = "snake_case")]
enum CycleOutput<'a> {
    Skipped,
    Promoted {
        previous_version: &'a str,
        promoted_version: &'a str,
        report: &'a ArbitrationReport,
    },
    Retained {
        incumbent_version: &'a str,
        candidate_version: &'a str,
        report: &'a ArbitrationReport,
    },
    RetrainFailed {
        kind: &'static str,
        reason: &'a str,
    },
}

impl<'a> From<&'a CycleOutcome> for CycleOutput<'a> {
    fn from(outcome: &'a CycleOutcome) -> Self {
        match outcome {
            CycleOutcome::Skipped => CycleOutput::Skipped,
            CycleOutcome::Promoted {
                previous_version,
                promoted_version,
                report,
            } => CycleOutput::Promoted {
                previous_version,
                promoted_version,
                report,
            },
            CycleOutcome::Retained {
                incumbent_version,
                candidate_version,
                report,
            } => CycleOutput::Retained {
                incumbent_version,
                candidate_version,
                report,
            },
            CycleOutcome::RetrainFailed { kind, reason } => {
                CycleOutput::RetrainFailed { kind: *kind, reason }
            }
        }
    }
}

/// Retrain on `data`, arbitrate, and promote unless `dry_run`
pub fn retrain(session: &Session, data: &Path, dry_run: bool) -> Result<()> {
    let manager = session.loaded_manager()?;
    let records = read_labeled(data, &session.target)?;

    if dry_run {
        let incumbent_version = manager
            .slot()
            .current()
            .map(|a| a.version().to_string())
            .unwrap_or_default();
        let trained = manager
            .retrain(&records, &session.target)
            .context("Retrain failed")?;
        let report = manager
            .arbitrate(&trained.artifact, &trained.holdout, &session.target)
            .context("Arbitration failed")?;

        match session.format {
            OutputFormat::Json => print_json(&DryRunOutput {
                incumbent_version,
                candidate_version: trained.artifact.version().to_string(),
                candidate_holdout_accuracy: trained.holdout_accuracy,
                report: &report,
            })?,
            OutputFormat::Table => {
                print_header(
                    &format!(
                        "Arbitration {} vs {} (dry run)",
                        incumbent_version,
                        trained.artifact.version()
                    ),
                    60,
                );
                print_report(&report);
                if report.verdict == Verdict::Candidate {
                    print_info("Run without --dry-run to promote the candidate");
                }
            }
        }
        return Ok(());
    }

    let outcome = manager
        .run_cycle(&records, &session.target)
        .context("Lifecycle cycle failed")?;

    match session.format {
        OutputFormat::Json => print_json(&CycleOutput::from(&outcome))?,
        OutputFormat::Table => {
            print_header("Retrain Cycle", 60);
            match &outcome {
                CycleOutcome::Promoted {
                    previous_version,
                    promoted_version,
                    report,
                } => {
                    print_report(report);
                    print_success(&format!(
                        "Promoted {}; {} kept as backup",
                        promoted_version.cyan(),
                        previous_version
                    ));
                }
                CycleOutcome::Retained {
                    incumbent_version,
                    candidate_version,
                    report,
                } => {
                    print_report(report);
                    print_info(&format!(
                        "Kept {}; candidate {} discarded",
                        incumbent_version.cyan(),
                        candidate_version
                    ));
                }
                CycleOutcome::RetrainFailed { kind, reason } => {
                    print_warning(&format!("Retrain failed ({}): {}", kind, reason));
                    print_info("The active model is unchanged");
                }
                CycleOutcome::Skipped => print_info("Nothing to do"),
            }
            println!("Branch: {}", color_branch(outcome.branch()));
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct RollbackOutput {
    restored_version: String,
    active_path: String,
    backup_path: String,
}

/// Restore the backup slot as the active artifact
pub fn rollback(session: &Session) -> Result<()> {
    let manager = session.manager();
    let current = manager.load_active().ok().map(|a| a.version().to_string());
    let restored = manager.rollback().with_context(|| {
        format!(
            "Rollback from {} failed",
            manager.config().backup_path.display()
        )
    })?;

    let output = RollbackOutput {
        restored_version: restored.version().to_string(),
        active_path: manager.config().active_path.display().to_string(),
        backup_path: manager.config().backup_path.display().to_string(),
    };
    match session.format {
        OutputFormat::Json => print_json(&output)?,
        OutputFormat::Table => {
            let from = current.as_deref().unwrap_or("none");
            print_success(&format!(
                "Rolled back {} -> {}",
                from,
                output.restored_version.cyan()
            ));
            println!("Active: {}", output.active_path);
        }
    }
    Ok(())
}
