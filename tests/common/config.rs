//! Test configuration helpers

use brain_mirror::Config;
use std::time::Duration;
use tempfile::TempDir;

/// Configuration pointing every endpoint at local fakes, with all files
/// inside `dir`
///
/// The token file is created holding `initial-token`.
pub fn test_config(dir: &TempDir, http_url: &str, sync_url: &str) -> Config {
    let mut config = Config::default();
    config.workspace.brain_id = "brain-1".to_string();
    config.workspace.app_id = "app-1".to_string();
    config.endpoints.api_url = http_url.to_string();
    config.endpoints.files_url = http_url.to_string();
    config.endpoints.sync_url = sync_url.to_string();
    config.endpoints.origin = "https://app.test".to_string();
    config.token_path = dir.path().join("token");
    config.export.output_path = dir.path().join("Export.md");
    config.export.cell_export_dir = dir.path().join("cells");
    config.backup.enabled = false;
    config.backup.archive_path = dir.path().join("backup.zip");
    config.backup.extract_dir = dir.path().join("markdown");
    config.resolver.subscription_timeout = Duration::from_secs(5);
    config.retry.max_attempts = 0;
    config.retry.initial_delay = Duration::from_millis(1);
    config.reconnect_delay = Duration::from_millis(100);

    std::fs::write(&config.token_path, "initial-token\n").unwrap();
    config
}
