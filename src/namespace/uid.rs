//! Per-assembly unique identifiers.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use uuid::Uuid;

use crate::config::UidStrategy;
use crate::error::{Error, Result};

/// Source of uids. Every call must return a token never handed out before
/// on this host, and every token must be a valid identifier.
pub trait UidSource: Send + Sync {
    fn next_uid(&self) -> Result<String>;
}

/// `u` + UUID v7: millisecond timestamp plus 74 random bits.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeRandomUid;

impl UidSource for TimeRandomUid {
    fn next_uid(&self) -> Result<String> {
        Ok(format!("u{}", Uuid::now_v7().simple()))
    }
}

/// Monotonic counter persisted in a file outside any bundle.
///
/// A storage failure is reported, never papered over with a value that may
/// already have been issued.
#[derive(Debug)]
pub struct CounterUid {
    path: PathBuf,
    lock: Mutex<()>,
}

impl CounterUid {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn storage_error(&self, reason: impl Into<String>) -> Error {
        Error::UidStorage {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }

    fn read_counter(&self) -> Result<u64> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => contents
                .trim()
                .parse::<u64>()
                .map_err(|e| self.storage_error(format!("corrupt counter {contents:?}: {e}"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(self.storage_error(e.to_string())),
        }
    }

    fn write_counter(&self, value: u64) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(|e| self.storage_error(e.to_string()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| self.storage_error(e.to_string()))?;
        writeln!(tmp, "{value}").map_err(|e| self.storage_error(e.to_string()))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| self.storage_error(e.to_string()))?;
        tmp.persist(&self.path)
            .map_err(|e| self.storage_error(e.error.to_string()))?;
        Ok(())
    }
}

impl UidSource for CounterUid {
    fn next_uid(&self) -> Result<String> {
        let _guard = self.lock.lock();
        let current = self.read_counter()?;
        let next = current
            .checked_add(1)
            .ok_or_else(|| self.storage_error("counter exhausted"))?;
        self.write_counter(next)?;
        Ok(format!("n{next:010}"))
    }
}

/// Build the uid source selected by configuration.
pub fn uid_source(strategy: &UidStrategy) -> Box<dyn UidSource> {
    match strategy {
        UidStrategy::TimeRandom => Box::new(TimeRandomUid),
        UidStrategy::Counter { path } => Box::new(CounterUid::new(path.clone())),
    }
}
