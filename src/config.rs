//! Configuration types for brain-mirror

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Identity of the mirrored workspace
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Workspace ("brain") id whose tree is mirrored
    #[serde(default)]
    pub brain_id: String,

    /// Application uid sent in the `app-uid` cookie
    #[serde(default)]
    pub app_id: String,

    /// Team name (informational, logged at session start)
    #[serde(default)]
    pub team: Option<String>,
}

/// Remote service endpoints
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// API base URL, used for the session refresh call
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// File export base URL (backup archive and per-cell exports)
    #[serde(default = "default_files_url")]
    pub files_url: String,

    /// Real-time sync WebSocket URL
    #[serde(default = "default_sync_url")]
    pub sync_url: String,

    /// Value of the `Origin` header sent with every request
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Timeout for individual HTTP requests (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            files_url: default_files_url(),
            sync_url: default_sync_url(),
            origin: default_origin(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// Export file settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Flattened export file (default: "./Export.md")
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,

    /// Maximum number of leaves whose content is inlined per session (default: 10)
    #[serde(default = "default_leaf_download_limit")]
    pub leaf_download_limit: usize,

    /// Format requested for inlined leaf content (default: "md")
    #[serde(default = "default_leaf_format")]
    pub leaf_format: String,

    /// Format for ad-hoc single cell exports (default: "pdf")
    #[serde(default = "default_cell_export_format")]
    pub cell_export_format: String,

    /// Directory for ad-hoc single cell exports (default: ".")
    #[serde(default = "default_cell_export_dir")]
    pub cell_export_dir: PathBuf,

    /// What to do when an ad-hoc export target already exists
    #[serde(default)]
    pub file_collision: FileCollisionAction,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_path: default_output_path(),
            leaf_download_limit: default_leaf_download_limit(),
            leaf_format: default_leaf_format(),
            cell_export_format: default_cell_export_format(),
            cell_export_dir: default_cell_export_dir(),
            file_collision: FileCollisionAction::default(),
        }
    }
}

/// Bulk backup archive settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Download and extract the backup archive before each session (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Where the archive is saved (default: "./backup.zip")
    #[serde(default = "default_archive_path")]
    pub archive_path: PathBuf,

    /// Where the archive is extracted (default: "./markdown")
    #[serde(default = "default_extract_dir")]
    pub extract_dir: PathBuf,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            archive_path: default_archive_path(),
            extract_dir: default_extract_dir(),
        }
    }
}

/// Tree resolution settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// How long a single node subscription may stay pending (default: 30 seconds)
    ///
    /// A node whose data does not arrive in time is skipped so that resolution
    /// can still complete.
    #[serde(default = "default_subscription_timeout", with = "duration_serde")]
    pub subscription_timeout: Duration,

    /// Maximum number of node subscriptions in flight at once (default: 32)
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            subscription_timeout: default_subscription_timeout(),
            max_in_flight: default_max_in_flight(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// File collision handling strategy
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCollisionAction {
    /// Append (1), (2), etc. to filename
    Rename,
    /// Overwrite existing file (default)
    #[default]
    Overwrite,
    /// Skip the file, keep existing
    Skip,
}

/// Main configuration for [`Mirror`](crate::Mirror)
///
/// Every field has a default, so a config file only needs the workspace
/// identity:
///
/// ```json
/// { "workspace": { "brain_id": "b-123", "app_id": "app-456" } }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Workspace identity
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    /// Remote endpoints
    #[serde(default)]
    pub endpoints: EndpointConfig,

    /// Plain-text bearer token file (default: "./token")
    #[serde(default = "default_token_path")]
    pub token_path: PathBuf,

    /// Export file settings
    #[serde(default)]
    pub export: ExportConfig,

    /// Bulk backup settings
    #[serde(default)]
    pub backup: BackupConfig,

    /// Tree resolution settings
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Retry policy for HTTP calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Pause before reconnecting after the sync channel drops (default: 5 seconds)
    #[serde(default = "default_reconnect_delay", with = "duration_serde")]
    pub reconnect_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: WorkspaceConfig::default(),
            endpoints: EndpointConfig::default(),
            token_path: default_token_path(),
            export: ExportConfig::default(),
            backup: BackupConfig::default(),
            resolver: ResolverConfig::default(),
            retry: RetryConfig::default(),
            reconnect_delay: default_reconnect_delay(),
        }
    }
}

impl Config {
    /// Load a JSON configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::config(
                "config",
                format!("failed to read {}: {}", path.display(), e),
            )
        })?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check settings that have no sensible default
    pub fn validate(&self) -> Result<()> {
        if self.workspace.brain_id.trim().is_empty() {
            return Err(Error::config(
                "workspace.brain_id",
                "a workspace id is required",
            ));
        }
        if self.resolver.max_in_flight == 0 {
            return Err(Error::config(
                "resolver.max_in_flight",
                "must be at least 1",
            ));
        }
        if self.resolver.subscription_timeout.is_zero() {
            return Err(Error::config(
                "resolver.subscription_timeout",
                "must be greater than zero",
            ));
        }

        check_url("endpoints.api_url", &self.endpoints.api_url, &["http", "https"])?;
        check_url(
            "endpoints.files_url",
            &self.endpoints.files_url,
            &["http", "https"],
        )?;
        check_url("endpoints.sync_url", &self.endpoints.sync_url, &["ws", "wss"])?;
        Ok(())
    }
}

fn check_url(key: &str, value: &str, schemes: &[&str]) -> Result<()> {
    let parsed = url::Url::parse(value)
        .map_err(|e| Error::config(key, format!("invalid URL '{}': {}", value, e)))?;
    if !schemes.contains(&parsed.scheme()) {
        return Err(Error::config(
            key,
            format!(
                "unsupported scheme '{}', expected one of {:?}",
                parsed.scheme(),
                schemes
            ),
        ));
    }
    Ok(())
}

fn default_api_url() -> String {
    "https://api.nuclino.com".to_string()
}

fn default_files_url() -> String {
    "https://files.nuclino.com".to_string()
}

fn default_sync_url() -> String {
    "wss://api.nuclino.com/syncing".to_string()
}

fn default_origin() -> String {
    "https://app.nuclino.com".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_output_path() -> PathBuf {
    PathBuf::from("./Export.md")
}

fn default_leaf_download_limit() -> usize {
    10
}

fn default_leaf_format() -> String {
    "md".to_string()
}

fn default_cell_export_format() -> String {
    "pdf".to_string()
}

fn default_cell_export_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_archive_path() -> PathBuf {
    PathBuf::from("./backup.zip")
}

fn default_extract_dir() -> PathBuf {
    PathBuf::from("./markdown")
}

fn default_subscription_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_in_flight() -> usize {
    32
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_token_path() -> PathBuf {
    PathBuf::from("./token")
}

fn default_reconnect_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_true() -> bool {
    true
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
