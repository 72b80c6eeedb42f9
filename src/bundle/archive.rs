use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::bundle::{sha256_hex, BundleMeta, BUNDLE_SCHEMA_VERSION, META_JSON, RESOURCES_DIR};
use crate::error::{Error, IoResultExt, Result};
use crate::graph::codec::codec_by_name;
use crate::graph::Node;
use crate::util::names::{validate_identifier, validate_logical_name, validate_version};

/// A bundle opened for reading. Every entry read through it is checked
/// against the digest recorded at assembly time.
pub struct BundleArchive {
    path: PathBuf,
    meta: BundleMeta,
    archive: zip::ZipArchive<File>,
}

impl BundleArchive {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).at_path(path)?;
        let mut archive = zip::ZipArchive::new(file)?;

        let meta: BundleMeta = {
            let mut entry = archive
                .by_name(META_JSON)
                .map_err(|_| Error::invalid_bundle(path, format!("missing {META_JSON}")))?;
            let mut buf = Vec::new();
            entry.read_to_end(&mut buf).at_path(path)?;
            serde_json::from_slice(&buf)?
        };

        if meta.schema_version > BUNDLE_SCHEMA_VERSION {
            return Err(Error::invalid_bundle(
                path,
                format!(
                    "unsupported bundle schema_version {} (max supported: {})",
                    meta.schema_version, BUNDLE_SCHEMA_VERSION
                ),
            ));
        }

        validate_identifier("package name", &meta.name)?;
        validate_version(&meta.version)?;
        let mapping = meta.mapping()?;
        if mapping.renamed_prefix != meta.renamed_prefix {
            return Err(Error::invalid_bundle(
                path,
                format!(
                    "declared namespace {} does not match {}",
                    meta.renamed_prefix, mapping.renamed_prefix
                ),
            ));
        }
        if codec_by_name(&meta.codec).is_none() {
            return Err(Error::invalid_bundle(
                path,
                format!("unknown payload codec '{}'", meta.codec),
            ));
        }
        for (logical_name, file_name) in &meta.resources {
            validate_logical_name(logical_name)?;
            validate_logical_name(file_name)?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            meta,
            archive,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn meta(&self) -> &BundleMeta {
        &self.meta
    }

    pub fn resource_names(&self) -> impl Iterator<Item = &str> {
        self.meta.resources.keys().map(String::as_str)
    }

    /// Read one entry and verify its digest.
    pub fn read_entry(&mut self, name: &str) -> Result<Vec<u8>> {
        let expected = self.meta.files.get(name).ok_or_else(|| {
            Error::invalid_bundle(&self.path, format!("entry {name} is not listed in {META_JSON}"))
        })?;
        let mut entry = self
            .archive
            .by_name(name)
            .map_err(|_| Error::invalid_bundle(&self.path, format!("missing entry {name}")))?;
        let mut buf = Vec::new();
        entry.read_to_end(&mut buf).at_path(&self.path)?;
        if &sha256_hex(&buf) != expected {
            return Err(Error::invalid_bundle(
                &self.path,
                format!("digest mismatch for {name}"),
            ));
        }
        Ok(buf)
    }

    /// Decode a payload straight from the archive, without installing.
    /// Type references are returned exactly as shipped.
    pub fn read_resource(&mut self, logical_name: &str) -> Result<Node> {
        let file_name = self
            .meta
            .resources
            .get(logical_name)
            .ok_or_else(|| Error::ResourceNotFound {
                logical_name: logical_name.to_string(),
                bundle: self.path.display().to_string(),
            })?
            .clone();
        let entry = format!("{}/{}", self.meta.resources_dir(), file_name);
        let bytes = self.read_entry(&entry)?;
        let codec = codec_by_name(&self.meta.codec).ok_or_else(|| {
            Error::invalid_bundle(&self.path, format!("unknown payload codec '{}'", self.meta.codec))
        })?;
        codec.decode(&bytes)
    }

    /// Write every listed entry below `dest`, verifying digests.
    ///
    /// Entries must stay inside `{name}/`; unlisted or missing entries make
    /// the whole bundle invalid. `dest` should be a scratch directory: on
    /// error it holds a partial tree.
    pub fn extract_to(&mut self, dest: &Path) -> Result<()> {
        let package_prefix = format!("{}/", self.meta.name);
        let resources_prefix = format!("{}/", self.meta.resources_dir());
        let tree_prefix = format!("{}/", self.meta.tree_dir());
        let mut seen = BTreeSet::new();

        for i in 0..self.archive.len() {
            let mut entry = self.archive.by_index(i)?;
            let name = entry.name().to_string();
            if name == META_JSON || entry.is_dir() {
                continue;
            }
            let relative = entry
                .enclosed_name()
                .map(Path::to_path_buf)
                .filter(|_| name.starts_with(&package_prefix))
                .ok_or_else(|| {
                    Error::invalid_bundle(&self.path, format!("entry {name} escapes the package"))
                })?;
            if !name.starts_with(&tree_prefix) && !name.starts_with(&resources_prefix) {
                return Err(Error::invalid_bundle(
                    &self.path,
                    format!("entry {name} is outside {tree_prefix} and {resources_prefix}"),
                ));
            }
            let expected = self.meta.files.get(&name).ok_or_else(|| {
                Error::invalid_bundle(&self.path, format!("entry {name} is not listed in {META_JSON}"))
            })?;

            let mut buf = Vec::new();
            entry.read_to_end(&mut buf).at_path(&self.path)?;
            if &sha256_hex(&buf) != expected {
                return Err(Error::invalid_bundle(
                    &self.path,
                    format!("digest mismatch for {name}"),
                ));
            }

            let out = dest.join(relative);
            if let Some(parent) = out.parent() {
                fs::create_dir_all(parent).at_path(parent)?;
            }
            fs::write(&out, &buf).at_path(&out)?;
            seen.insert(name);
        }

        if let Some(missing) = self.meta.files.keys().find(|k| !seen.contains(*k)) {
            return Err(Error::invalid_bundle(
                &self.path,
                format!("missing entry {missing}"),
            ));
        }

        tracing::debug!(
            bundle = %self.path.display(),
            dest = %dest.display(),
            entries = seen.len(),
            "Extracted bundle"
        );
        Ok(())
    }
}

impl std::fmt::Debug for BundleArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundleArchive")
            .field("path", &self.path)
            .field("namespace", &self.meta.renamed_prefix)
            .finish()
    }
}

/// Name of the resources directory, which a shared root must not shadow.
pub(crate) fn reserved_root_name(name: &str) -> bool {
    name == RESOURCES_DIR
}
