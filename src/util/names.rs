//! Validation of host identifiers, versions and resource names

use crate::error::{Error, Result};

/// True for `[A-Za-z_][A-Za-z0-9_]*`, the host's module-name grammar.
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub fn validate_identifier(what: &'static str, value: &str) -> Result<()> {
    if is_identifier(value) {
        Ok(())
    } else {
        Err(Error::InvalidName {
            what,
            value: value.to_string(),
            reason: "must match [A-Za-z_][A-Za-z0-9_]*",
        })
    }
}

/// Versions end up in file names, so no whitespace or path separators.
pub fn validate_version(version: &str) -> Result<()> {
    let reason = if version.is_empty() {
        Some("must not be empty")
    } else if version
        .chars()
        .any(|c| c.is_whitespace() || c == '/' || c == '\\')
    {
        Some("must not contain whitespace or path separators")
    } else if version.starts_with('.') {
        Some("must not start with '.'")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(Error::InvalidName {
            what: "version",
            value: version.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Logical payload names become archive entry names.
pub fn validate_logical_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if ok {
        Ok(())
    } else {
        Err(Error::InvalidName {
            what: "logical name",
            value: name.to_string(),
            reason: "must be non-empty [A-Za-z0-9_.-] without a leading '.'",
        })
    }
}
