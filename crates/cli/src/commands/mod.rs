//! CLI command implementations

pub mod data;
pub mod lifecycle;
pub mod model;

use crate::output::OutputFormat;
use anyhow::{Context, Result};
use monitor_lib::{
    artifact::{ArtifactSlot, ArtifactStore, FsArtifactStore, ModelArtifact},
    lifecycle::{LifecycleConfig, ModelLifecycleManager},
    models::RawRecord,
    storage::JsonFileRecordStore,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Resolved global options shared by every command
#[derive(Debug, Clone)]
pub struct Session {
    pub artifact_path: PathBuf,
    pub backup_path: Option<PathBuf>,
    pub target: String,
    pub format: OutputFormat,
    pub verbose: bool,
}

impl Session {
    pub fn lifecycle_config(&self) -> LifecycleConfig {
        let config = LifecycleConfig::new(&self.artifact_path);
        match &self.backup_path {
            Some(backup) => config.with_backup_path(backup),
            None => config,
        }
    }

    /// Lifecycle manager with an empty active slot
    pub fn manager(&self) -> ModelLifecycleManager {
        ModelLifecycleManager::new(
            self.lifecycle_config(),
            Arc::new(FsArtifactStore::new()),
            ArtifactSlot::new(),
        )
    }

    /// Lifecycle manager with the active artifact loaded
    pub fn loaded_manager(&self) -> Result<ModelLifecycleManager> {
        let manager = self.manager();
        manager.load_active().with_context(|| {
            format!(
                "Failed to load active artifact {}",
                self.artifact_path.display()
            )
        })?;
        Ok(manager)
    }

    pub fn load_artifact(&self, path: &Path) -> Result<ModelArtifact> {
        FsArtifactStore::new()
            .load(path)
            .with_context(|| format!("Failed to load artifact {}", path.display()))
    }
}

/// Every record in a JSON records file
pub fn read_records(path: &Path) -> Result<Vec<RawRecord>> {
    if !path.exists() {
        anyhow::bail!("Records file {} does not exist", path.display());
    }
    JsonFileRecordStore::new(path, PathBuf::new()).fetch_all()
}

/// Records carrying a binary `target` label; the rest are reported and dropped
pub fn read_labeled(path: &Path, target: &str) -> Result<Vec<RawRecord>> {
    let records = read_records(path)?;
    let total = records.len();
    let labeled: Vec<RawRecord> = records
        .into_iter()
        .filter(|r| r.label(target).is_some())
        .collect();
    if labeled.len() < total {
        crate::output::print_warning(&format!(
            "{} of {} records have no '{}' label and were ignored",
            total - labeled.len(),
            total,
            target
        ));
    }
    Ok(labeled)
}
