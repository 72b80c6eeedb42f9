//! Namespaces: where a code tree is addressed, and how bundles rename it.

pub mod rewrite;
pub mod uid;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::util::names::validate_identifier;

pub use rewrite::{rewrite_on_read, rewrite_on_write, PrefixRewriter};
pub use uid::{CounterUid, TimeRandomUid, UidSource};

/// The rename applied to one bundle.
///
/// `renamed_prefix` is always `{module_name}.{uid}.{original_prefix}`; since
/// uids never repeat on a host, neither do renamed prefixes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceMapping {
    pub module_name: String,
    pub uid: String,
    pub original_prefix: String,
    pub renamed_prefix: String,
}

impl NamespaceMapping {
    pub fn new(module_name: &str, uid: &str, original_prefix: &str) -> Result<Self> {
        validate_identifier("package name", module_name)?;
        validate_identifier("uid", uid)?;
        validate_identifier("shared root name", original_prefix)?;
        Ok(Self {
            module_name: module_name.to_string(),
            uid: uid.to_string(),
            original_prefix: original_prefix.to_string(),
            renamed_prefix: format!("{module_name}.{uid}.{original_prefix}"),
        })
    }
}

/// Remainder of `module` below `prefix`, respecting dotted segments.
///
/// `Some("")` when `module == prefix`, `Some("sub.mod")` for `prefix.sub.mod`,
/// `None` for anything else, including `prefix_extra.mod`.
pub fn strip_namespace<'a>(module: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = module.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some(rest)
    } else {
        rest.strip_prefix('.')
    }
}

pub fn in_namespace(module: &str, prefix: &str) -> bool {
    strip_namespace(module, prefix).is_some()
}

/// Join a prefix and a (possibly empty) dotted remainder.
pub fn join_namespace(prefix: &str, rest: &str) -> String {
    if rest.is_empty() {
        prefix.to_string()
    } else {
        format!("{prefix}.{rest}")
    }
}
