//! Dropout Risk Monitor CLI
//!
//! Operator tooling around the model artifact: generate synthetic
//! populations, bootstrap-train, score, evaluate, and drive the
//! retrain / arbitrate / promote / rollback lifecycle by hand.

mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{data, lifecycle, model, Session};
use std::path::PathBuf;

/// Dropout Risk Monitor CLI
#[derive(Parser)]
#[command(name = "riskctl")]
#[command(author, version, about = "CLI for the Dropout Risk Monitor", long_about = None)]
pub struct Cli {
    /// Active model artifact (can also be set via RISKCTL_ARTIFACT env var)
    #[arg(long, env = "RISKCTL_ARTIFACT", global = true)]
    pub artifact: Option<PathBuf>,

    /// Backup artifact slot (defaults to <artifact>.backup)
    #[arg(long, global = true)]
    pub backup: Option<PathBuf>,

    /// Target label column (can also be set via RISKCTL_TARGET env var)
    #[arg(long, env = "RISKCTL_TARGET", global = true)]
    pub target: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table", global = true)]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate a synthetic student population
    Generate {
        /// Number of students
        #[arg(long, short = 'n', default_value_t = 1000)]
        count: usize,

        /// Random seed
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Output records file
        #[arg(long, short, default_value = "data/students.json")]
        output: PathBuf,
    },

    /// Train a bootstrap model from a labeled records file
    Train {
        /// Labeled records file
        #[arg(long, short)]
        data: PathBuf,

        /// Classifier family
        #[arg(long, default_value = "gradient-boosting")]
        classifier: model::ClassifierArg,

        /// Feature scaler
        #[arg(long, default_value = "standard")]
        scaler: model::ScalerArg,

        /// Overwrite an existing active artifact
        #[arg(long)]
        force: bool,
    },

    /// Score records with the active model
    Score {
        /// Records file
        #[arg(long, short)]
        data: PathBuf,

        /// Only show high-risk students
        #[arg(long)]
        high_only: bool,

        /// Append predictions to this JSON lines file
        #[arg(long)]
        save: Option<PathBuf>,
    },

    /// Measure the active model against labeled records
    Evaluate {
        /// Labeled records file
        #[arg(long, short)]
        data: PathBuf,

        /// Accuracy of the previous evaluation, to check for drift
        #[arg(long)]
        previous_accuracy: Option<f64>,
    },

    /// Retrain on labeled records and arbitrate against the active model
    Retrain {
        /// Labeled records file
        #[arg(long, short)]
        data: PathBuf,

        /// Arbitrate but do not promote
        #[arg(long)]
        dry_run: bool,
    },

    /// Restore the backup artifact as the active model
    Rollback,

    /// Show details of the active (or backup) artifact
    Inspect {
        /// Inspect the backup slot instead
        #[arg(long)]
        backup_slot: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::Config::load()?;

    let session = Session {
        artifact_path: config.artifact_path(cli.artifact),
        backup_path: config.backup_path(cli.backup),
        target: config.target_column(cli.target),
        format: cli.format,
        verbose: cli.verbose,
    };

    let result = match cli.command {
        Commands::Generate {
            count,
            seed,
            output,
        } => data::generate(&session, count, seed, &output),
        Commands::Train {
            data,
            classifier,
            scaler,
            force,
        } => model::train(&session, &data, classifier, scaler, force),
        Commands::Score {
            data,
            high_only,
            save,
        } => data::score(&session, &data, high_only, save.as_deref()),
        Commands::Evaluate {
            data,
            previous_accuracy,
        } => model::evaluate(&session, &data, previous_accuracy),
        Commands::Retrain { data, dry_run } => lifecycle::retrain(&session, &data, dry_run),
        Commands::Rollback => lifecycle::rollback(&session),
        Commands::Inspect { backup_slot } => model::inspect(&session, backup_slot),
    };

    if let Err(e) = &result {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
    Ok(())
}
