//! Log file setup for processes embedding the packager

use std::fs::{self, OpenOptions};

use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::error::{IoResultExt, Result};
use crate::util::paths::{log_file_path, logs_dir};

/// Install a global fmt subscriber writing to ~/.relocator/logs/relocator.log.
///
/// `RUST_LOG` takes precedence over the configured filter. Calling this twice
/// keeps the first subscriber.
pub fn init_logging(config: &Config) -> Result<()> {
    let dir = logs_dir();
    fs::create_dir_all(&dir).at_path(&dir)?;

    let path = log_file_path();
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .at_path(&path)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.filter.as_str()));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(log_file)
        .with_ansi(false)
        .try_init();
    if installed.is_err() {
        tracing::debug!("Global subscriber already installed");
    }
    Ok(())
}
