use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use crate::error::{Error, IoResultExt, Result};
use crate::graph::codec::codec_by_name;
use crate::graph::{Node, TypeRef};
use crate::install::{InstalledBundle, RegistryFile};
use crate::namespace::{in_namespace, rewrite_on_read};
use crate::tree::{DeclarationScanner, IgnoreSet, ModuleIndex, SourceTree};

/// Handle to one installed bundle; the only way to materialize its payloads.
///
/// Bound to the installation generation it was created for. Once that
/// installation is replaced or uninstalled, `load*` fails with
/// `StaleEntryPoint`. Nodes already returned stay valid.
#[derive(Debug, Clone)]
pub struct EntryPoint {
    module_name: String,
    module_version: String,
    uid: String,
    original_prefix: String,
    renamed_prefix: String,
    resources_location: PathBuf,
    resources: BTreeMap<String, String>,
    external_modules: Vec<String>,
    codec: String,
    generation: u64,
    index: ModuleIndex,
    registry_path: PathBuf,
}

/// A tree to load payloads into, other than the one they were installed with.
#[derive(Debug, Clone)]
pub struct LoadTarget {
    prefix: String,
    index: ModuleIndex,
}

impl LoadTarget {
    pub fn new(index: ModuleIndex) -> Self {
        Self {
            prefix: index.prefix().to_string(),
            index,
        }
    }

    pub fn from_tree(tree: &SourceTree, scanner: &DeclarationScanner, ignore: &IgnoreSet) -> Result<Self> {
        Ok(Self::new(tree.index(scanner, ignore)?))
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl EntryPoint {
    pub(crate) fn new(
        registry_path: PathBuf,
        record: &InstalledBundle,
        resources_location: PathBuf,
        index: ModuleIndex,
    ) -> Self {
        Self {
            module_name: record.name.clone(),
            module_version: record.version.clone(),
            uid: record.uid.clone(),
            original_prefix: record.original_prefix.clone(),
            renamed_prefix: record.renamed_prefix.clone(),
            resources_location,
            resources: record.resources.clone(),
            external_modules: record.external_modules.clone(),
            codec: record.codec.clone(),
            generation: record.generation,
            index,
            registry_path,
        }
    }

    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    pub fn module_version(&self) -> &str {
        &self.module_version
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn original_prefix(&self) -> &str {
        &self.original_prefix
    }

    /// The namespace payload types resolve under, `{name}.{uid}.{original}`.
    pub fn renamed_prefix(&self) -> &str {
        &self.renamed_prefix
    }

    /// Host package name (the first segment of the namespace).
    pub fn package_name(&self) -> &str {
        &self.module_name
    }

    pub fn resources_location(&self) -> &Path {
        &self.resources_location
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn index(&self) -> &ModuleIndex {
        &self.index
    }

    /// Logical names available to [`EntryPoint::load`].
    pub fn resources(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    /// Decode a payload with every type resolved in the installed tree.
    pub fn load(&self, logical_name: &str) -> Result<Node> {
        let node = self.read(logical_name)?;
        self.resolve(&node, &self.index)?;
        tracing::debug!(
            name = %self.module_name,
            logical_name,
            namespace = %self.renamed_prefix,
            "Loaded resource"
        );
        Ok(node)
    }

    pub fn load_as<T: DeserializeOwned>(&self, logical_name: &str) -> Result<T> {
        self.load(logical_name)?.deserialize_into()
    }

    /// Decode a payload and move its references onto `target`.
    ///
    /// References under either the installed or the pristine prefix are
    /// rewritten, then every reference must resolve in the target tree.
    pub fn load_into(&self, logical_name: &str, target: &LoadTarget) -> Result<Node> {
        let mut node = self.read(logical_name)?;
        let rewritten = rewrite_on_read(
            &mut node,
            &[self.renamed_prefix.as_str(), self.original_prefix.as_str()],
            &target.prefix,
        );
        self.resolve(&node, &target.index)?;
        tracing::debug!(
            name = %self.module_name,
            logical_name,
            target = %target.prefix,
            rewritten,
            "Loaded resource into target tree"
        );
        Ok(node)
    }

    fn read(&self, logical_name: &str) -> Result<Node> {
        self.ensure_current()?;
        let file_name = self
            .resources
            .get(logical_name)
            .ok_or_else(|| Error::ResourceNotFound {
                logical_name: logical_name.to_string(),
                bundle: format!("{} {}", self.module_name, self.module_version),
            })?;
        let path = self.resources_location.join(file_name);
        let bytes = fs::read(&path).at_path(&path)?;
        let codec = codec_by_name(&self.codec)
            .ok_or_else(|| Error::Config(format!("unknown payload codec '{}'", self.codec)))?;
        codec.decode(&bytes)
    }

    fn ensure_current(&self) -> Result<()> {
        let registry = RegistryFile::load(&self.registry_path)?;
        let current = match registry.get(&self.module_name) {
            Some(record) if record.generation == self.generation && record.uid == self.uid => {
                return Ok(());
            }
            Some(record) => format!(
                "version {} uid {} generation {}",
                record.version, record.uid, record.generation
            ),
            None => "not installed".to_string(),
        };
        Err(Error::StaleEntryPoint {
            name: self.module_name.clone(),
            generation: self.generation,
            current,
        })
    }

    fn resolve(&self, node: &Node, index: &ModuleIndex) -> Result<()> {
        for reference in node.type_refs() {
            if index.resolves(&reference) || self.is_external(&reference) {
                continue;
            }
            return Err(Error::TypeResolution {
                reference,
                namespace: index.prefix().to_string(),
            });
        }
        Ok(())
    }

    fn is_external(&self, reference: &TypeRef) -> bool {
        self.external_modules
            .iter()
            .any(|prefix| in_namespace(&reference.module, prefix))
    }
}
