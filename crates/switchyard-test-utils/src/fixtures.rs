use std::path::PathBuf;

use tempfile::TempDir;

use switchyard_core::config::AppConfig;

/// Defaults with timers shortened for tests.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.model.api_key = Some("test-key".into());
    config.monitor.poll_interval_ms = 10;
    config.expense.approval_timeout_secs = 5;
    config
}

/// Write `content` to `switchyard.toml` in a fresh temp dir.
/// Keep the returned dir alive for as long as the file is needed.
pub fn write_config(content: &str) -> std::io::Result<(TempDir, PathBuf)> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("switchyard.toml");
    std::fs::write(&path, content)?;
    Ok((dir, path))
}
