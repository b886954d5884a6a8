//! Monitor configuration

use anyhow::{Context, Result};
use monitor_lib::lifecycle::default_backup_path;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable naming the optional config file
pub const CONFIG_PATH_ENV: &str = "RISK_MONITOR_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "risk-monitor.toml";

/// Monitor configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Instance name attached to every structured event
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Active artifact slot
    #[serde(default = "default_artifact_path")]
    pub artifact_path: PathBuf,

    /// Backup slot (default: `<artifact_path>.backup`)
    #[serde(default)]
    pub backup_path: Option<PathBuf>,

    /// JSON array of student records
    #[serde(default = "default_records_path")]
    pub records_path: PathBuf,

    /// JSON-lines prediction log
    #[serde(default = "default_predictions_path")]
    pub predictions_path: PathBuf,

    #[serde(default = "default_target_column")]
    pub target_column: String,

    /// UTC time of the daily prediction run
    #[serde(default = "default_daily_run_hour")]
    pub daily_run_hour: u32,
    #[serde(default)]
    pub daily_run_minute: u32,

    #[serde(default = "default_quality_check_interval")]
    pub quality_check_interval_secs: u64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Records updated within this many hours are scored
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: u64,

    #[serde(default = "default_mentor_recipient")]
    pub mentor_recipient: String,

    #[serde(default = "default_admin_recipient")]
    pub admin_recipient: String,

    /// High-risk alert deduplication window
    #[serde(default = "default_alert_dedup_minutes")]
    pub alert_dedup_minutes: u64,
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "risk-monitor".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_artifact_path() -> PathBuf {
    PathBuf::from("models/dropout_model.json")
}

fn default_records_path() -> PathBuf {
    PathBuf::from("data/students.json")
}

fn default_predictions_path() -> PathBuf {
    PathBuf::from("data/predictions.jsonl")
}

fn default_target_column() -> String {
    "is_active".to_string()
}

fn default_daily_run_hour() -> u32 {
    2
}

fn default_quality_check_interval() -> u64 {
    3600
}

fn default_poll_interval() -> u64 {
    60
}

fn default_lookback_hours() -> u64 {
    24
}

fn default_mentor_recipient() -> String {
    "mentor@school.edu".to_string()
}

fn default_admin_recipient() -> String {
    "admin@school.edu".to_string()
}

fn default_alert_dedup_minutes() -> u64 {
    60
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            instance_name: default_instance_name(),
            api_port: default_api_port(),
            artifact_path: default_artifact_path(),
            backup_path: None,
            records_path: default_records_path(),
            predictions_path: default_predictions_path(),
            target_column: default_target_column(),
            daily_run_hour: default_daily_run_hour(),
            daily_run_minute: 0,
            quality_check_interval_secs: default_quality_check_interval(),
            poll_interval_secs: default_poll_interval(),
            lookback_hours: default_lookback_hours(),
            mentor_recipient: default_mentor_recipient(),
            admin_recipient: default_admin_recipient(),
            alert_dedup_minutes: default_alert_dedup_minutes(),
        }
    }
}

impl MonitorConfig {
    /// Load configuration from an optional file, then `RISK_*` environment variables
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let config = config::Config::builder()
            .add_source(config::File::with_name(&path).required(false))
            .add_source(config::Environment::with_prefix("RISK").try_parsing(true))
            .build()
            .with_context(|| format!("reading configuration (file: {})", path))?;

        config
            .try_deserialize()
            .context("invalid monitor configuration")
    }

    pub fn backup_path(&self) -> PathBuf {
        self.backup_path
            .clone()
            .unwrap_or_else(|| default_backup_path(&self.artifact_path))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn quality_check_interval(&self) -> Duration {
        Duration::from_secs(self.quality_check_interval_secs)
    }

    pub fn lookback(&self) -> Duration {
        Duration::from_secs(self.lookback_hours * 60 * 60)
    }

    pub fn alert_dedup_window(&self) -> Duration {
        Duration::from_secs(self.alert_dedup_minutes * 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MonitorConfig::default();
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.target_column, "is_active");
        assert_eq!(config.daily_run_hour, 2);
        assert_eq!(config.poll_interval(), Duration::from_secs(60));
        assert_eq!(config.lookback(), Duration::from_secs(86_400));
        assert_eq!(
            config.backup_path(),
            PathBuf::from("models/dropout_model.json.backup")
        );
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.toml");
        std::fs::write(
            &path,
            "api_port = 9191\ndaily_run_hour = 5\nbackup_path = \"/var/backups/model.json\"\n",
        )
        .unwrap();

        let config: MonitorConfig = config::Config::builder()
            .add_source(config::File::from(path.as_path()))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(config.api_port, 9191);
        assert_eq!(config.daily_run_hour, 5);
        assert_eq!(config.alert_dedup_minutes, 60);
        assert_eq!(config.backup_path(), PathBuf::from("/var/backups/model.json"));
    }
}
