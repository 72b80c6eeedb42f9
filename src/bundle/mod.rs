//! Relocatable bundles: a renamed source tree plus rewritten payloads in one zip.
//!
//! Archive layout:
//! - `bundle.json`: [`BundleMeta`]
//! - `{name}/{uid}/{original_prefix}/...`: the shared root, byte for byte
//! - `{name}/{uid}/_resources/{logical_name}.{ext}`: one encoded payload each
//!
//! The same layout is what the installer leaves on disk below the install
//! root, so `{name}.{uid}.{original_prefix}` is importable as-is.

pub mod archive;
pub mod assemble;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::namespace::NamespaceMapping;

pub use archive::BundleArchive;
pub use assemble::{AssemblyRecord, BundleAssembler, PackagingTask};

pub const BUNDLE_SCHEMA_VERSION: u32 = 1;

pub const META_JSON: &str = "bundle.json";
pub const RESOURCES_DIR: &str = "_resources";
pub const BUNDLE_EXTENSION: &str = "bundle.zip";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleMeta {
    pub schema_version: u32,
    pub name: String,
    pub version: String,
    pub uid: String,
    pub original_prefix: String,
    pub renamed_prefix: String,
    pub created_at_ms: u64,
    pub tool_version: String,
    /// Payload codec name (see [`crate::graph::codec::codec_by_name`]).
    pub codec: String,
    /// Logical name -> file name inside the resources directory.
    pub resources: BTreeMap<String, String>,
    /// Module prefixes every host provides; references to them are shipped as-is.
    #[serde(default)]
    pub external_modules: Vec<String>,
    /// Archive entry -> sha256 of its contents.
    pub files: BTreeMap<String, String>,
}

impl BundleMeta {
    pub fn mapping(&self) -> Result<NamespaceMapping> {
        NamespaceMapping::new(&self.name, &self.uid, &self.original_prefix)
    }

    /// Directory (relative to the install root) holding the renamed tree.
    pub fn tree_dir(&self) -> String {
        format!("{}/{}/{}", self.name, self.uid, self.original_prefix)
    }

    /// Directory (relative to the install root) holding the payloads.
    pub fn resources_dir(&self) -> String {
        resources_dir(&self.name, &self.uid)
    }
}

pub(crate) fn tree_entry(mapping: &NamespaceMapping, relative: &str) -> String {
    format!(
        "{}/{}/{}/{}",
        mapping.module_name, mapping.uid, mapping.original_prefix, relative
    )
}

pub(crate) fn resources_dir(name: &str, uid: &str) -> String {
    format!("{name}/{uid}/{RESOURCES_DIR}")
}

pub(crate) fn resource_file_name(logical_name: &str, extension: &str) -> String {
    format!("{logical_name}.{extension}")
}

pub(crate) fn bundle_file_name(name: &str, version: &str, uid: &str) -> String {
    format!("{name}-{version}-{uid}.{BUNDLE_EXTENSION}")
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}
