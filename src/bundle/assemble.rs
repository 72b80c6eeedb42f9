use std::collections::BTreeMap;
use std::fs;
use std::io::{Seek, Write};
use std::path::{Path, PathBuf};

use zip::write::FileOptions;

use crate::bundle::archive::reserved_root_name;
use crate::bundle::{
    bundle_file_name, resource_file_name, sha256_hex, tree_entry, BundleMeta,
    BUNDLE_SCHEMA_VERSION, META_JSON,
};
use crate::config::{Config, NonRelocatablePolicy};
use crate::error::{Error, IoResultExt, Result};
use crate::graph::codec::JsonCodec;
use crate::graph::{Node, PayloadCodec};
use crate::namespace::uid::uid_source;
use crate::namespace::{in_namespace, rewrite_on_write, NamespaceMapping, UidSource};
use crate::tree::{DeclarationScanner, IgnoreSet, ModuleIndex, SourceTree};
use crate::util::names::{validate_identifier, validate_logical_name, validate_version};

/// What to ship: package name, version and the named payload objects.
#[derive(Debug, Clone, PartialEq)]
pub struct PackagingTask {
    pub name: String,
    pub version: String,
    pub payload: BTreeMap<String, Node>,
}

impl PackagingTask {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            payload: BTreeMap::new(),
        }
    }

    pub fn with_payload(mut self, logical_name: impl Into<String>, node: Node) -> Self {
        self.payload.insert(logical_name.into(), node);
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_identifier("package name", &self.name)?;
        validate_version(&self.version)?;
        for (logical_name, node) in &self.payload {
            validate_logical_name(logical_name)?;
            if let Some(path) = node.non_finite_path() {
                return Err(Error::InvalidPayload {
                    logical_name: logical_name.clone(),
                    reason: format!("field {path} holds a NaN or infinite float"),
                });
            }
        }
        Ok(())
    }
}

/// Auditable record of one assembly.
#[derive(Debug, Clone)]
pub struct AssemblyRecord {
    pub task: PackagingTask,
    pub module_name: String,
    pub path: PathBuf,
    pub mapping: NamespaceMapping,
    pub meta: BundleMeta,
}

/// Builds bundles from one shared root.
pub struct BundleAssembler {
    tree: SourceTree,
    ignore: IgnoreSet,
    scanner: DeclarationScanner,
    uids: Box<dyn UidSource>,
    codec: Box<dyn PayloadCodec>,
    policy: NonRelocatablePolicy,
    external_modules: Vec<String>,
    out_dir: PathBuf,
}

impl BundleAssembler {
    pub fn new(tree: SourceTree, config: &Config) -> Result<Self> {
        if reserved_root_name(tree.logical_name()) {
            return Err(Error::InvalidName {
                what: "shared root name",
                value: tree.logical_name().to_string(),
                reason: "reserved for the resources directory",
            });
        }
        Ok(Self {
            tree,
            ignore: IgnoreSet::from_config(&config.tree),
            scanner: DeclarationScanner::from_config(&config.tree)?,
            uids: uid_source(&config.uid),
            codec: Box::new(JsonCodec),
            policy: config.packaging.non_relocatable,
            external_modules: config.packaging.external_modules.clone(),
            out_dir: config.bundle_dir.clone(),
        })
    }

    pub fn with_uid_source(mut self, uids: Box<dyn UidSource>) -> Self {
        self.uids = uids;
        self
    }

    pub fn with_codec(mut self, codec: Box<dyn PayloadCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_out_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.out_dir = dir.into();
        self
    }

    pub fn tree(&self) -> &SourceTree {
        &self.tree
    }

    /// Assemble `task` into a fresh bundle under the output directory.
    ///
    /// The archive only appears at its final path once complete.
    pub fn assemble(&self, task: &PackagingTask) -> Result<AssemblyRecord> {
        task.validate()?;

        let index = self.tree.index(&self.scanner, &self.ignore)?;
        self.preflight(task, &index)?;

        let files = self.tree.files(&self.ignore)?;
        if files.is_empty() {
            return Err(Error::io(
                self.tree.root(),
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "shared root contains no shippable files",
                ),
            ));
        }

        let uid = self.uids.next_uid()?;
        let mapping = NamespaceMapping::new(&task.name, &uid, self.tree.logical_name())?;

        fs::create_dir_all(&self.out_dir).at_path(&self.out_dir)?;
        let out_path = self
            .out_dir
            .join(bundle_file_name(&task.name, &task.version, &uid));
        let mut tmp = tempfile::NamedTempFile::new_in(&self.out_dir).at_path(&self.out_dir)?;
        let tmp_path = tmp.path().to_path_buf();

        let meta = {
            let mut zip = zip::ZipWriter::new(tmp.as_file_mut());
            let options =
                FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
            let mut digests = BTreeMap::new();

            for file in &files {
                let bytes = fs::read(&file.absolute).at_path(&file.absolute)?;
                let entry = tree_entry(&mapping, &file.relative);
                let digest = write_entry(&mut zip, &entry, &bytes, options, &tmp_path)?;
                digests.insert(entry, digest);
            }

            let mut resources = BTreeMap::new();
            for (logical_name, node) in &task.payload {
                let mut node = node.clone();
                rewrite_on_write(&mut node, &mapping);
                let bytes = self.codec.encode(&node)?;
                let file_name = resource_file_name(logical_name, self.codec.extension());
                let entry = format!(
                    "{}/{}",
                    crate::bundle::resources_dir(&mapping.module_name, &mapping.uid),
                    file_name
                );
                let digest = write_entry(&mut zip, &entry, &bytes, options, &tmp_path)?;
                digests.insert(entry, digest);
                resources.insert(logical_name.clone(), file_name);
            }

            let meta = BundleMeta {
                schema_version: BUNDLE_SCHEMA_VERSION,
                name: task.name.clone(),
                version: task.version.clone(),
                uid: mapping.uid.clone(),
                original_prefix: mapping.original_prefix.clone(),
                renamed_prefix: mapping.renamed_prefix.clone(),
                created_at_ms: chrono::Utc::now().timestamp_millis().max(0) as u64,
                tool_version: env!("CARGO_PKG_VERSION").to_string(),
                codec: self.codec.name().to_string(),
                resources,
                external_modules: self.external_modules.clone(),
                files: digests,
            };

            let meta_json = serde_json::to_vec_pretty(&meta)?;
            write_entry(&mut zip, META_JSON, &meta_json, options, &tmp_path)?;

            let file = zip.finish()?;
            file.flush().at_path(&tmp_path)?;
            meta
        };

        tmp.persist(&out_path)
            .map_err(|e| Error::io(&out_path, e.error))?;

        tracing::info!(
            name = %task.name,
            version = %task.version,
            uid = %mapping.uid,
            namespace = %mapping.renamed_prefix,
            files = files.len(),
            resources = meta.resources.len(),
            path = %out_path.display(),
            "Assembled bundle"
        );

        Ok(AssemblyRecord {
            task: task.clone(),
            module_name: task.name.clone(),
            path: out_path,
            mapping,
            meta,
        })
    }

    /// Every payload type must be shippable: inside the shared root and
    /// declared there, or provided by the host.
    fn preflight(&self, task: &PackagingTask, index: &ModuleIndex) -> Result<()> {
        let root = self.tree.logical_name();
        for (logical_name, node) in &task.payload {
            for reference in node.type_refs() {
                if in_namespace(&reference.module, root) {
                    if !index.resolves(&reference) {
                        return Err(Error::TypeResolution {
                            reference,
                            namespace: root.to_string(),
                        });
                    }
                    continue;
                }
                if self
                    .external_modules
                    .iter()
                    .any(|ext| in_namespace(&reference.module, ext))
                {
                    continue;
                }
                match self.policy {
                    NonRelocatablePolicy::Fail => {
                        return Err(Error::NonRelocatableDependency {
                            logical_name: logical_name.clone(),
                            reference,
                            root: root.to_string(),
                        });
                    }
                    NonRelocatablePolicy::Warn => {
                        tracing::warn!(
                            logical_name = %logical_name,
                            reference = %reference,
                            root,
                            "Payload references a type outside the shared root; it will not load after install"
                        );
                    }
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for BundleAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundleAssembler")
            .field("root", &self.tree.root())
            .field("logical_name", &self.tree.logical_name())
            .field("out_dir", &self.out_dir)
            .finish()
    }
}

/// Write one archive entry and return its sha256. I/O failures name
/// `scratch`, the file actually being written.
fn write_entry<W: Write + Seek>(
    zip: &mut zip::ZipWriter<W>,
    entry: &str,
    bytes: &[u8],
    options: FileOptions,
    scratch: &Path,
) -> Result<String> {
    zip.start_file(entry, options)?;
    zip.write_all(bytes).at_path(scratch)?;
    Ok(sha256_hex(bytes))
}

/// Assemble with the configured defaults in one call.
pub fn assemble_from(root: &Path, task: &PackagingTask, config: &Config) -> Result<AssemblyRecord> {
    BundleAssembler::new(SourceTree::open(root)?, config)?.assemble(task)
}
