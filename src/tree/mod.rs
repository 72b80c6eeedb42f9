//! Snapshots of the shared source tree.

pub mod index;

use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use crate::config::TreeConfig;
use crate::error::{Error, IoResultExt, Result};
use crate::util::names::validate_identifier;

pub use index::{DeclarationScanner, ModuleIndex};

/// Names and extensions never shipped (VCS metadata, bytecode caches).
#[derive(Debug, Clone, Default)]
pub struct IgnoreSet {
    names: Vec<String>,
    extensions: Vec<String>,
}

impl IgnoreSet {
    pub fn new(names: Vec<String>, extensions: Vec<String>) -> Self {
        Self { names, extensions }
    }

    pub fn from_config(config: &TreeConfig) -> Self {
        Self::new(
            config.ignore_names.clone(),
            config.ignore_extensions.clone(),
        )
    }

    pub fn is_ignored(&self, path: &Path) -> bool {
        let name_hit = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| self.names.iter().any(|ignored| ignored == n));
        let ext_hit = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| self.extensions.iter().any(|ignored| ignored == e));
        name_hit || ext_hit
    }
}

/// One file selected for shipping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeFile {
    /// `/`-separated path relative to the tree root.
    pub relative: String,
    pub absolute: PathBuf,
}

/// A source directory addressed by a logical name (the original prefix).
#[derive(Debug, Clone)]
pub struct SourceTree {
    root: PathBuf,
    logical_name: String,
}

impl SourceTree {
    /// Open a tree whose logical name is its directory name.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let logical_name = root
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| Error::InvalidName {
                what: "shared root name",
                value: root.display().to_string(),
                reason: "directory has no usable name",
            })?;
        Self::with_logical_name(root, logical_name)
    }

    pub fn with_logical_name(root: impl Into<PathBuf>, logical_name: impl Into<String>) -> Result<Self> {
        let root = root.into();
        let logical_name = logical_name.into();
        validate_identifier("shared root name", &logical_name)?;
        if !root.is_dir() {
            return Err(Error::io(
                &root,
                std::io::Error::new(std::io::ErrorKind::NotFound, "shared root is not a directory"),
            ));
        }
        let root = root.canonicalize().at_path(&root)?;
        Ok(Self { root, logical_name })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn logical_name(&self) -> &str {
        &self.logical_name
    }

    /// Every shippable file, sorted by relative path.
    ///
    /// Symlinks are followed only while they resolve inside the root.
    pub fn files(&self, ignore: &IgnoreSet) -> Result<Vec<TreeFile>> {
        let mut files = Vec::new();
        let walker = WalkDir::new(&self.root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || !(ignore.is_ignored(entry.path()) || link_escapes(&self.root, entry))
            });

        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| self.root.clone());
                Error::io(path, std::io::Error::other(e.to_string()))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&self.root)
                .map_err(|_| {
                    Error::io(
                        entry.path(),
                        std::io::Error::other("walked outside the shared root"),
                    )
                })?
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            files.push(TreeFile {
                relative,
                absolute: entry.path().to_path_buf(),
            });
        }

        tracing::debug!(
            root = %self.root.display(),
            files = files.len(),
            "Snapshotted shared root"
        );
        Ok(files)
    }

    /// Module index of this tree under its logical name.
    ///
    /// Walks exactly the files [`SourceTree::files`] would ship.
    pub fn index(&self, scanner: &DeclarationScanner, ignore: &IgnoreSet) -> Result<ModuleIndex> {
        ModuleIndex::scan(&self.root, &self.logical_name, scanner, ignore)
    }
}

/// True for a symlink that resolves outside `root` or does not resolve.
///
/// Walks prune these entries, so nothing reached through them is shipped or
/// indexed. `root` must be canonical.
pub(crate) fn link_escapes(root: &Path, entry: &DirEntry) -> bool {
    if !entry.path_is_symlink() {
        return false;
    }
    let escapes = entry
        .path()
        .canonicalize()
        .map_or(true, |target| !target.starts_with(root));
    if escapes {
        tracing::warn!(
            path = %entry.path().display(),
            root = %root.display(),
            "Skipping symlink leaving the shared root"
        );
    }
    escapes
}
