//! Path utilities for the relocator data directory

use std::path::PathBuf;
use std::sync::OnceLock;

/// Global storage for custom data directory path
static DATA_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Initialize the data directory with an optional custom path.
/// Must be called before any other path functions are used.
/// If custom_path is None, uses the default ~/.relocator location.
pub fn init_data_dir(custom_path: Option<PathBuf>) {
    let path = custom_path.unwrap_or_else(default_data_dir);
    if DATA_DIR.set(path.clone()).is_err() {
        let existing = DATA_DIR
            .get()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<unknown>".to_string());
        tracing::debug!(
            path = %path.display(),
            existing = %existing,
            "Data directory already initialized"
        );
    }
}

/// Get the default data directory path (~/.relocator)
fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".relocator"))
        .unwrap_or_else(|| PathBuf::from(".relocator"))
}

/// Get the base data directory.
/// Returns the custom path if set via init_data_dir(), otherwise ~/.relocator
pub fn data_dir() -> PathBuf {
    DATA_DIR.get().cloned().unwrap_or_else(default_data_dir)
}

/// Get the logs directory (~/.relocator/logs)
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Get the default log file path (~/.relocator/logs/relocator.log)
pub fn log_file_path() -> PathBuf {
    logs_dir().join("relocator.log")
}

/// Get the default install root (~/.relocator/site)
pub fn default_install_root() -> PathBuf {
    data_dir().join("site")
}

/// Get the default bundle output directory (~/.relocator/bundles)
pub fn default_bundle_dir() -> PathBuf {
    data_dir().join("bundles")
}

/// Get the default uid counter file (~/.relocator/uid.counter)
pub fn default_counter_path() -> PathBuf {
    data_dir().join("uid.counter")
}

/// Get the config file path (~/.relocator/config.toml)
pub fn config_path() -> PathBuf {
    data_dir().join("config.toml")
}
