//! Artifact persistence for the active and backup slots
//!
//! Artifacts are written as a JSON envelope carrying a SHA-256 checksum of
//! the artifact's canonical encoding. Saves go to a temporary sibling file
//! that is synced and then renamed over the target, so a failed save never
//! truncates an existing slot.

use super::ModelArtifact;
use crate::error::{LifecycleError, LifecycleResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Envelope format written by this version
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// Load/save contract used for both the active slot and the backup slot
pub trait ArtifactStore: Send + Sync {
    fn load(&self, path: &Path) -> LifecycleResult<ModelArtifact>;

    fn save(&self, artifact: &ModelArtifact, path: &Path) -> LifecycleResult<()>;

    fn exists(&self, path: &Path) -> bool;
}

#[derive(Serialize, Deserialize)]
struct ArtifactEnvelope {
    format_version: u32,
    checksum: String,
    artifact: ModelArtifact,
}

/// Filesystem-backed artifact store
#[derive(Debug, Clone, Default)]
pub struct FsArtifactStore;

impl FsArtifactStore {
    pub fn new() -> Self {
        Self
    }

    fn temp_path(path: &Path) -> PathBuf {
        let mut name = OsString::from(path.as_os_str());
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl ArtifactStore for FsArtifactStore {
    fn load(&self, path: &Path) -> LifecycleResult<ModelArtifact> {
        let bytes = fs::read(path).map_err(|e| LifecycleError::persistence(path, e))?;
        let envelope: ArtifactEnvelope = serde_json::from_slice(&bytes)
            .map_err(|e| LifecycleError::persistence(path, format!("malformed artifact: {}", e)))?;

        if envelope.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(LifecycleError::persistence(
                path,
                format!(
                    "unsupported format version {} (expected {})",
                    envelope.format_version, ARTIFACT_FORMAT_VERSION
                ),
            ));
        }

        let computed = envelope.artifact.fingerprint()?;
        if computed != envelope.checksum {
            return Err(LifecycleError::persistence(
                path,
                format!(
                    "checksum mismatch: expected {}, got {}",
                    envelope.checksum, computed
                ),
            ));
        }

        envelope
            .artifact
            .validate()
            .map_err(|e| LifecycleError::persistence(path, format!("invalid artifact: {}", e)))?;

        debug!(
            path = %path.display(),
            version = %envelope.artifact.version(),
            checksum = %computed,
            "Artifact loaded"
        );
        Ok(envelope.artifact)
    }

    fn save(&self, artifact: &ModelArtifact, path: &Path) -> LifecycleResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| LifecycleError::persistence(parent, e))?;
        }

        let envelope = ArtifactEnvelope {
            format_version: ARTIFACT_FORMAT_VERSION,
            checksum: artifact.fingerprint()?,
            artifact: artifact.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&envelope)
            .map_err(|e| LifecycleError::persistence(path, format!("serialize: {}", e)))?;

        // Write to temp file first
        let temp_path = Self::temp_path(path);
        let written = File::create(&temp_path)
            .and_then(|mut file| {
                file.write_all(&bytes)?;
                file.sync_all()
            })
            .map_err(|e| LifecycleError::persistence(&temp_path, e))
            .and_then(|()| {
                fs::rename(&temp_path, path).map_err(|e| LifecycleError::persistence(path, e))
            });
        if let Err(e) = written {
            // Never leave a partial temp file next to the slot
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }

        info!(
            path = %path.display(),
            version = %artifact.version(),
            checksum = %envelope.checksum,
            "Artifact saved"
        );
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// Compute SHA256 checksum of data
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::test_support::trained_artifact;
    use tempfile::TempDir;

    #[test]
    fn test_compute_checksum() {
        let checksum = compute_checksum(b"artifact bytes");
        assert_eq!(checksum.len(), 64);
        assert_eq!(checksum, compute_checksum(b"artifact bytes"));
    }

    #[test]
    fn test_save_then_load_preserves_feature_order() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("models").join("active.json");
        let store = FsArtifactStore::new();
        let artifact = trained_artifact();

        store.save(&artifact, &path).unwrap();
        assert!(store.exists(&path));
        assert!(!FsArtifactStore::temp_path(&path).exists());

        let loaded = store.load(&path).unwrap();
        assert_eq!(loaded.feature_names(), artifact.feature_names());
        assert_eq!(loaded, artifact);
    }

    #[test]
    fn test_tampered_artifact_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("active.json");
        let store = FsArtifactStore::new();
        store.save(&trained_artifact(), &path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let tampered = text.replacen("\"v1\"", "\"v9\"", 1);
        assert_ne!(text, tampered);
        fs::write(&path, tampered).unwrap();

        let err = store.load(&path).unwrap_err();
        assert_eq!(err.kind(), "persistence_error");
        assert!(err.to_string().contains("checksum mismatch"));
    }

    #[test]
    fn test_empty_encoder_rejected_on_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("active.json");
        let artifact = trained_artifact();
        let column = artifact.encoders().keys().next().unwrap().clone();

        let mut value = serde_json::to_value(&artifact).unwrap();
        value["encoders"][column.as_str()]["classes"] = serde_json::json!([]);
        let broken: ModelArtifact = serde_json::from_value(value).unwrap();
        let envelope = ArtifactEnvelope {
            format_version: ARTIFACT_FORMAT_VERSION,
            checksum: broken.fingerprint().unwrap(),
            artifact: broken,
        };
        fs::write(&path, serde_json::to_vec(&envelope).unwrap()).unwrap();

        let err = FsArtifactStore::new().load(&path).unwrap_err();
        assert_eq!(err.kind(), "persistence_error");
        assert!(err.to_string().contains("no known categories"));
    }

    #[test]
    fn test_failed_save_removes_temp_file() {
        let temp_dir = TempDir::new().unwrap();
        // A non-empty directory at the target makes the final rename fail
        let path = temp_dir.path().join("active.json");
        fs::create_dir_all(path.join("occupied")).unwrap();

        let err = FsArtifactStore::new()
            .save(&trained_artifact(), &path)
            .unwrap_err();
        assert_eq!(err.kind(), "persistence_error");
        assert!(!FsArtifactStore::temp_path(&path).exists());
        assert!(path.join("occupied").is_dir());
    }

    #[test]
    fn test_missing_file_is_persistence_error() {
        let temp_dir = TempDir::new().unwrap();
        let err = FsArtifactStore::new()
            .load(&temp_dir.path().join("absent.json"))
            .unwrap_err();
        assert_eq!(err.kind(), "persistence_error");
    }
}
