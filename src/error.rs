//! Error types for packaging, installation and loading.

use std::path::PathBuf;

use thiserror::Error;

use crate::graph::TypeRef;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Every failure surfaced by the crate.
///
/// The first five variants are the packaging/loading taxonomy; callers are
/// expected to match on them (or on [`Error::kind`]). None of them is retried
/// internally.
#[derive(Error, Debug)]
pub enum Error {
    #[error(
        "non-relocatable dependency in payload '{logical_name}': type {reference} is defined outside the shared root '{root}'"
    )]
    NonRelocatableDependency {
        logical_name: String,
        reference: TypeRef,
        root: String,
    },

    #[error(
        "namespace collision: '{name}' version {version} is already installed with uid {installed_uid} (incoming uid {incoming_uid}); uninstall it first"
    )]
    NamespaceCollision {
        name: String,
        version: String,
        installed_uid: String,
        incoming_uid: String,
    },

    #[error("resource not found: '{logical_name}' is not part of bundle '{bundle}'")]
    ResourceNotFound {
        logical_name: String,
        bundle: String,
    },

    #[error("type not found under rewritten location: {reference} does not resolve in namespace '{namespace}'")]
    TypeResolution {
        reference: TypeRef,
        namespace: String,
    },

    #[error(
        "stale entry point: '{name}' generation {generation} has been replaced (current: {current})"
    )]
    StaleEntryPoint {
        name: String,
        generation: u64,
        current: String,
    },

    #[error("'{name}' is not installed under {}", root.display())]
    NotInstalled { name: String, root: PathBuf },

    #[error("invalid {what} '{value}': {reason}")]
    InvalidName {
        what: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("invalid payload '{logical_name}': {reason}")]
    InvalidPayload { logical_name: String, reason: String },

    #[error("invalid bundle {}: {reason}", path.display())]
    InvalidBundle { path: PathBuf, reason: String },

    #[error("uid storage failure at {}: {reason}", path.display())]
    UidStorage { path: PathBuf, reason: String },

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("payload codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Field-less discriminant of [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NonRelocatableDependency,
    NamespaceCollision,
    ResourceNotFound,
    TypeResolution,
    StaleEntryPoint,
    NotInstalled,
    InvalidName,
    InvalidPayload,
    InvalidBundle,
    UidStorage,
    Io,
    Archive,
    Codec,
    Config,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NonRelocatableDependency { .. } => ErrorKind::NonRelocatableDependency,
            Error::NamespaceCollision { .. } => ErrorKind::NamespaceCollision,
            Error::ResourceNotFound { .. } => ErrorKind::ResourceNotFound,
            Error::TypeResolution { .. } => ErrorKind::TypeResolution,
            Error::StaleEntryPoint { .. } => ErrorKind::StaleEntryPoint,
            Error::NotInstalled { .. } => ErrorKind::NotInstalled,
            Error::InvalidName { .. } => ErrorKind::InvalidName,
            Error::InvalidPayload { .. } => ErrorKind::InvalidPayload,
            Error::InvalidBundle { .. } => ErrorKind::InvalidBundle,
            Error::UidStorage { .. } => ErrorKind::UidStorage,
            Error::Io { .. } => ErrorKind::Io,
            Error::Archive(_) => ErrorKind::Archive,
            Error::Codec(_) => ErrorKind::Codec,
            Error::Config(_) => ErrorKind::Config,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid_bundle(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::InvalidBundle {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Attach a path to a bare `std::io::Error`.
pub(crate) trait IoResultExt<T> {
    fn at_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn at_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| Error::io(path, e))
    }
}
