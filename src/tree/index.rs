//! Module index: which dotted modules exist in a tree and which types each declares.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use regex::Regex;
use walkdir::WalkDir;

use crate::config::TreeConfig;
use crate::error::{Error, IoResultExt, Result};
use crate::graph::TypeRef;
use crate::namespace::join_namespace;
use crate::tree::{link_escapes, IgnoreSet};

/// Recognises modules and the types they declare.
#[derive(Debug, Clone)]
pub struct DeclarationScanner {
    source_extensions: Vec<String>,
    package_markers: Vec<String>,
    patterns: Vec<Regex>,
}

impl DeclarationScanner {
    pub fn new(
        source_extensions: Vec<String>,
        package_markers: Vec<String>,
        patterns: Vec<Regex>,
    ) -> Self {
        Self {
            source_extensions,
            package_markers,
            patterns,
        }
    }

    pub fn from_config(config: &TreeConfig) -> Result<Self> {
        let patterns = config
            .declaration_patterns
            .iter()
            .map(|p| {
                Regex::new(p)
                    .map_err(|e| Error::Config(format!("invalid declaration pattern {p:?}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(
            config.source_extensions.clone(),
            config.package_markers.clone(),
            patterns,
        ))
    }

    /// Dotted module path (below the tree prefix) for a relative file path,
    /// or `None` if the file is not a module.
    ///
    /// `jobs.py` -> `jobs`, `features/__init__.py` -> `features`,
    /// a root-level marker -> `""`.
    pub fn module_path(&self, relative: &Path) -> Option<String> {
        let ext = relative.extension()?.to_str()?;
        if !self.source_extensions.iter().any(|e| e == ext) {
            return None;
        }
        let stem = relative.file_stem()?.to_str()?;

        let mut segments: Vec<String> = relative
            .parent()
            .into_iter()
            .flat_map(|p| p.components())
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        if !self.package_markers.iter().any(|m| m == stem) {
            segments.push(stem.to_string());
        }
        Some(segments.join("."))
    }

    pub fn declarations(&self, source: &str) -> BTreeSet<String> {
        self.patterns
            .iter()
            .flat_map(|re| re.captures_iter(source))
            .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
            .collect()
    }
}

/// `{dotted module -> declared type names}` for one tree under one prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleIndex {
    prefix: String,
    modules: BTreeMap<String, BTreeSet<String>>,
}

impl ModuleIndex {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            modules: BTreeMap::new(),
        }
    }

    /// Scan `dir` as the tree addressed by `prefix`.
    pub fn scan(
        dir: &Path,
        prefix: &str,
        scanner: &DeclarationScanner,
        ignore: &IgnoreSet,
    ) -> Result<Self> {
        let mut index = Self::new(prefix);
        let root = dir.canonicalize().at_path(dir)?;
        let walker = WalkDir::new(&root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || !(ignore.is_ignored(entry.path()) || link_escapes(&root, entry))
            });

        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf());
                Error::io(path, std::io::Error::other(e.to_string()))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&root) else {
                continue;
            };
            let Some(module) = scanner.module_path(relative) else {
                continue;
            };
            let bytes = fs::read(entry.path()).at_path(entry.path())?;
            let source = String::from_utf8_lossy(&bytes);
            index.insert(&join_namespace(prefix, &module), scanner.declarations(&source));
        }

        tracing::debug!(
            prefix,
            dir = %dir.display(),
            modules = index.modules.len(),
            "Indexed tree"
        );
        Ok(index)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn insert(&mut self, module: &str, types: impl IntoIterator<Item = String>) {
        self.modules
            .entry(module.to_string())
            .or_default()
            .extend(types);
    }

    pub fn contains_module(&self, module: &str) -> bool {
        self.modules.contains_key(module)
    }

    /// True if the referenced module exists and declares the type.
    pub fn resolves(&self, type_ref: &TypeRef) -> bool {
        self.modules
            .get(&type_ref.module)
            .is_some_and(|types| types.contains(&type_ref.name))
    }

    pub fn modules(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.modules.iter().map(|(m, t)| (m.as_str(), t))
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
