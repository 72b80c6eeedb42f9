//! Install registry: one active bundle per package name.
//!
//! Installing a bundle under a name that is already taken evicts the
//! previous installation (directory replaced, record replaced). A failed
//! swap restores the previous directory. Two versions of the same code stay
//! live only under two different names.
//!
//! The registry is a JSON file in the install root. Installs sharing a name
//! must not run concurrently; nothing here locks against that.

mod entry_point;

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bundle::{BundleArchive, BundleMeta, META_JSON, RESOURCES_DIR};
use crate::config::{Config, TreeConfig};
use crate::error::{Error, IoResultExt, Result};
use crate::tree::{DeclarationScanner, IgnoreSet, ModuleIndex};

pub use entry_point::{EntryPoint, LoadTarget};

pub const REGISTRY_JSON: &str = "registry.json";
const REGISTRY_SCHEMA_VERSION: u32 = 1;

/// Registry record of one installed bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledBundle {
    pub name: String,
    pub version: String,
    pub uid: String,
    pub original_prefix: String,
    pub renamed_prefix: String,
    /// Bumped on every install; entry points bound to an older value are stale.
    pub generation: u64,
    pub installed_at: DateTime<Utc>,
    pub codec: String,
    pub resources: BTreeMap<String, String>,
    pub external_modules: Vec<String>,
}

/// Result of [`InstallRegistry::install`].
#[derive(Debug)]
pub struct Installation {
    pub entry_point: EntryPoint,
    /// The installation this one replaced, if any.
    pub evicted: Option<InstalledBundle>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct RegistryFile {
    schema_version: u32,
    next_generation: u64,
    bundles: BTreeMap<String, InstalledBundle>,
}

impl Default for RegistryFile {
    fn default() -> Self {
        Self {
            schema_version: REGISTRY_SCHEMA_VERSION,
            next_generation: 1,
            bundles: BTreeMap::new(),
        }
    }
}

impl RegistryFile {
    pub(crate) fn load(path: &Path) -> Result<Self> {
        match fs::read(path) {
            Ok(bytes) => {
                let file: Self = serde_json::from_slice(&bytes)?;
                if file.schema_version > REGISTRY_SCHEMA_VERSION {
                    return Err(Error::Config(format!(
                        "unsupported registry schema_version {} in {}",
                        file.schema_version,
                        path.display()
                    )));
                }
                Ok(file)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(Error::io(path, e)),
        }
    }

    fn save(&self, path: &Path) -> Result<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir).at_path(dir)?;
        tmp.write_all(&serde_json::to_vec_pretty(self)?)
            .at_path(path)?;
        tmp.persist(path).map_err(|e| Error::io(path, e.error))?;
        Ok(())
    }

    pub(crate) fn get(&self, name: &str) -> Option<&InstalledBundle> {
        self.bundles.get(name)
    }
}

/// Keyed `{name -> active bundle}` registry rooted at one directory.
#[derive(Debug, Clone)]
pub struct InstallRegistry {
    root: PathBuf,
    ignore: IgnoreSet,
    scanner: DeclarationScanner,
}

impl InstallRegistry {
    pub fn open(root: impl Into<PathBuf>, tree: &TreeConfig) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).at_path(&root)?;
        Ok(Self {
            root,
            ignore: IgnoreSet::from_config(tree),
            scanner: DeclarationScanner::from_config(tree)?,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::open(config.install_root.clone(), &config.tree)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn registry_path(&self) -> PathBuf {
        self.root.join(REGISTRY_JSON)
    }

    /// Install a bundle, evicting whatever currently holds its name.
    ///
    /// Fails with `NamespaceCollision` if the same name and version are
    /// installed from a different assembly; uninstall that one first.
    pub fn install(&self, bundle_path: &Path) -> Result<Installation> {
        let mut archive = BundleArchive::open(bundle_path)?;
        let meta = archive.meta().clone();
        let mut state = RegistryFile::load(&self.registry_path())?;

        if let Some(existing) = state.get(&meta.name) {
            if existing.version == meta.version && existing.uid != meta.uid {
                return Err(Error::NamespaceCollision {
                    name: meta.name.clone(),
                    version: meta.version.clone(),
                    installed_uid: existing.uid.clone(),
                    incoming_uid: meta.uid.clone(),
                });
            }
        }

        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&self.root)
            .at_path(&self.root)?;
        archive.extract_to(staging.path())?;

        let staged = staging.path().join(&meta.name);
        let meta_path = staged.join(META_JSON);
        fs::write(&meta_path, serde_json::to_vec_pretty(&meta)?).at_path(&meta_path)?;
        discover_namespace(&staged, &meta, bundle_path)?;

        let evicted = state.bundles.get(&meta.name).cloned();
        let record = InstalledBundle {
            name: meta.name.clone(),
            version: meta.version.clone(),
            uid: meta.uid.clone(),
            original_prefix: meta.original_prefix.clone(),
            renamed_prefix: meta.renamed_prefix.clone(),
            generation: state.next_generation,
            installed_at: Utc::now(),
            codec: meta.codec.clone(),
            resources: meta.resources.clone(),
            external_modules: meta.external_modules.clone(),
        };
        state.next_generation += 1;
        state.bundles.insert(record.name.clone(), record.clone());

        let retired = tempfile::Builder::new()
            .prefix(".retired-")
            .tempdir_in(&self.root)
            .at_path(&self.root)?;
        swap_in(
            &staged,
            &self.root.join(&meta.name),
            &retired.path().join(&meta.name),
            || state.save(&self.registry_path()),
        )?;

        if let Some(old) = &evicted {
            tracing::info!(
                name = %old.name,
                evicted_version = %old.version,
                evicted_uid = %old.uid,
                version = %record.version,
                uid = %record.uid,
                "Evicted previous installation"
            );
        }
        tracing::info!(
            name = %record.name,
            version = %record.version,
            namespace = %record.renamed_prefix,
            generation = record.generation,
            bundle = %bundle_path.display(),
            "Installed bundle"
        );

        let entry_point = self.bind(&record)?;
        Ok(Installation {
            entry_point,
            evicted,
        })
    }

    /// Remove an installation. Entry points bound to it become stale.
    pub fn uninstall(&self, name: &str) -> Result<Option<InstalledBundle>> {
        let mut state = RegistryFile::load(&self.registry_path())?;
        let removed = state.bundles.remove(name);
        let dir = self.root.join(name);
        if removed.is_some() && dir.exists() {
            fs::remove_dir_all(&dir).at_path(&dir)?;
        }
        if let Some(record) = &removed {
            state.save(&self.registry_path())?;
            tracing::info!(
                name = %record.name,
                version = %record.version,
                uid = %record.uid,
                "Uninstalled bundle"
            );
        }
        Ok(removed)
    }

    pub fn get(&self, name: &str) -> Result<Option<InstalledBundle>> {
        Ok(RegistryFile::load(&self.registry_path())?.get(name).cloned())
    }

    pub fn list(&self) -> Result<Vec<InstalledBundle>> {
        Ok(RegistryFile::load(&self.registry_path())?
            .bundles
            .into_values()
            .collect())
    }

    /// Entry point for the current installation of `name`, indexed from
    /// what is on disk right now.
    pub fn entry_point(&self, name: &str) -> Result<EntryPoint> {
        let record = self.get(name)?.ok_or_else(|| Error::NotInstalled {
            name: name.to_string(),
            root: self.root.clone(),
        })?;
        self.bind(&record)
    }

    fn bind(&self, record: &InstalledBundle) -> Result<EntryPoint> {
        let package_dir = self.root.join(&record.name).join(&record.uid);
        let tree_dir = package_dir.join(&record.original_prefix);
        let index = ModuleIndex::scan(
            &tree_dir,
            &record.renamed_prefix,
            &self.scanner,
            &self.ignore,
        )?;
        Ok(EntryPoint::new(
            self.registry_path(),
            record,
            package_dir.join(RESOURCES_DIR),
            index,
        ))
    }
}

/// Move `staged` into `target` and run `commit`.
///
/// The previous `target` is parked at `parking` until `commit` succeeds; on
/// any failure it is moved back, so the directory and the registry keep
/// naming the same installation.
fn swap_in(
    staged: &Path,
    target: &Path,
    parking: &Path,
    commit: impl FnOnce() -> Result<()>,
) -> Result<()> {
    let parked = target.exists();
    if parked {
        fs::rename(target, parking).at_path(target)?;
    }
    let result = fs::rename(staged, target)
        .at_path(target)
        .and_then(|()| commit());
    if let Err(err) = result {
        if target.exists() {
            if let Err(e) = fs::remove_dir_all(target) {
                tracing::warn!(path = %target.display(), error = %e, "Failed to remove new installation");
            }
        }
        if parked {
            if let Err(e) = fs::rename(parking, target) {
                tracing::warn!(
                    path = %target.display(),
                    error = %e,
                    "Failed to restore previous installation"
                );
            }
        }
        return Err(err);
    }
    Ok(())
}

/// Read the namespace actually present in a staged package directory and
/// check it against the embedded metadata.
fn discover_namespace(package_dir: &Path, meta: &BundleMeta, bundle: &Path) -> Result<String> {
    let uid = single_subdir(package_dir, None)
        .ok_or_else(|| Error::invalid_bundle(bundle, "expected exactly one uid directory"))?;
    let original = single_subdir(&package_dir.join(&uid), Some(RESOURCES_DIR))
        .ok_or_else(|| Error::invalid_bundle(bundle, "expected exactly one source tree"))?;

    let on_disk = format!("{}.{}.{}", meta.name, uid, original);
    if on_disk != meta.renamed_prefix {
        return Err(Error::invalid_bundle(
            bundle,
            format!(
                "namespace on disk {on_disk} does not match declared {}",
                meta.renamed_prefix
            ),
        ));
    }
    Ok(on_disk)
}

fn single_subdir(dir: &Path, skip: Option<&str>) -> Option<String> {
    let mut dirs = fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .filter(|n| Some(n.as_str()) != skip);
    let first = dirs.next()?;
    match dirs.next() {
        Some(_) => None,
        None => Some(first),
    }
}
