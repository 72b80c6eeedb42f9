use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::util::paths::{
    config_path, default_bundle_dir, default_counter_path, default_install_root,
};

/// Example configuration file contents (bundled with the library)
pub const EXAMPLE_CONFIG: &str = include_str!("config.toml.example");

/// Matches `class X`, `struct X`, `pub enum X`, `pub(crate) trait X`, `type X`.
const DEFAULT_DECLARATION_PATTERN: &str = r"(?m)^[ \t]*(?:pub(?:\([^)]*\))?[ \t]+)?(?:class|struct|enum|trait|type)[ \t]+([A-Za-z_][A-Za-z0-9_]*)";

/// Packager configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the install registry (one directory per package name)
    pub install_root: PathBuf,
    /// Default output directory for assembled bundles
    pub bundle_dir: PathBuf,
    /// Source tree scanning rules
    pub tree: TreeConfig,
    /// Packaging policy
    pub packaging: PackagingConfig,
    /// Uid generation
    pub uid: UidStrategy,
    /// Logging
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone)]
pub struct TreeConfig {
    pub ignore_names: Vec<String>,
    pub ignore_extensions: Vec<String>,
    pub source_extensions: Vec<String>,
    pub package_markers: Vec<String>,
    pub declaration_patterns: Vec<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum NonRelocatablePolicy {
    /// Refuse to package.
    Fail,
    /// Log a warning and ship the bundle anyway; loading the affected
    /// payload will fail with a type resolution error.
    Warn,
}

#[derive(Debug, Clone)]
pub struct PackagingConfig {
    pub non_relocatable: NonRelocatablePolicy,
    pub external_modules: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UidStrategy {
    TimeRandom,
    Counter { path: PathBuf },
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            install_root: default_install_root(),
            bundle_dir: default_bundle_dir(),
            tree: TreeConfig::default(),
            packaging: PackagingConfig {
                non_relocatable: NonRelocatablePolicy::Fail,
                external_modules: Vec::new(),
            },
            uid: UidStrategy::TimeRandom,
            logging: LoggingConfig {
                filter: "relocator=info".to_string(),
            },
        }
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            ignore_names: [
                ".git",
                ".hg",
                ".svn",
                "__pycache__",
                ".mypy_cache",
                ".pytest_cache",
                ".DS_Store",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            ignore_extensions: vec!["pyc".into(), "pyo".into()],
            source_extensions: vec!["py".into(), "rs".into()],
            package_markers: vec!["__init__".into(), "mod".into(), "lib".into()],
            declaration_patterns: vec![DEFAULT_DECLARATION_PATTERN.to_string()],
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlPathsConfig {
    pub install_root: Option<PathBuf>,
    pub bundle_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlTreeConfig {
    pub ignore_names: Option<Vec<String>>,
    pub ignore_extensions: Option<Vec<String>>,
    pub source_extensions: Option<Vec<String>>,
    pub package_markers: Option<Vec<String>>,
    pub declaration_patterns: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlPackagingConfig {
    pub non_relocatable: Option<NonRelocatablePolicy>,
    pub external_modules: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TomlUidStrategy {
    TimeRandom,
    Counter,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlUidConfig {
    pub strategy: Option<TomlUidStrategy>,
    pub counter_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlLoggingConfig {
    pub filter: Option<String>,
}

/// TOML representation of the config file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TomlConfig {
    pub paths: Option<TomlPathsConfig>,
    pub tree: Option<TomlTreeConfig>,
    pub packaging: Option<TomlPackagingConfig>,
    pub uid: Option<TomlUidConfig>,
    pub logging: Option<TomlLoggingConfig>,
}

impl Config {
    /// Load configuration from ~/.relocator/config.toml, merging with defaults.
    ///
    /// A commented example is written on first run. A file that exists but
    /// does not parse is an error rather than a silent fallback.
    pub fn load() -> Result<Self> {
        let config_file = config_path();

        if !config_file.exists() {
            Self::create_default_config(&config_file);
        }

        if !config_file.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&config_file).map_err(|e| {
            Error::Config(format!("failed to read {}: {e}", config_file.display()))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parse a config document and merge it over the defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let toml_config: TomlConfig =
            toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))?;
        let mut config = Self::default();
        config.merge(toml_config)?;
        Ok(config)
    }

    fn merge(&mut self, toml_config: TomlConfig) -> Result<()> {
        if let Some(paths) = toml_config.paths {
            if let Some(install_root) = paths.install_root {
                self.install_root = expand_home(&install_root);
            }
            if let Some(bundle_dir) = paths.bundle_dir {
                self.bundle_dir = expand_home(&bundle_dir);
            }
        }

        if let Some(tree) = toml_config.tree {
            if let Some(names) = tree.ignore_names {
                self.tree.ignore_names = names;
            }
            if let Some(exts) = tree.ignore_extensions {
                self.tree.ignore_extensions = exts;
            }
            if let Some(exts) = tree.source_extensions {
                self.tree.source_extensions = exts;
            }
            if let Some(markers) = tree.package_markers {
                self.tree.package_markers = markers;
            }
            if let Some(patterns) = tree.declaration_patterns {
                for pattern in &patterns {
                    regex::Regex::new(pattern).map_err(|e| {
                        Error::Config(format!("invalid declaration pattern {pattern:?}: {e}"))
                    })?;
                }
                self.tree.declaration_patterns = patterns;
            }
        }

        if let Some(packaging) = toml_config.packaging {
            if let Some(policy) = packaging.non_relocatable {
                self.packaging.non_relocatable = policy;
            }
            if let Some(modules) = packaging.external_modules {
                self.packaging.external_modules = modules;
            }
        }

        if let Some(uid) = toml_config.uid {
            let counter_path = uid
                .counter_path
                .map(|p| expand_home(&p))
                .unwrap_or_else(default_counter_path);
            match uid.strategy {
                Some(TomlUidStrategy::Counter) => {
                    self.uid = UidStrategy::Counter { path: counter_path };
                }
                Some(TomlUidStrategy::TimeRandom) => self.uid = UidStrategy::TimeRandom,
                None => {}
            }
        }

        if let Some(logging) = toml_config.logging {
            if let Some(filter) = logging.filter {
                self.logging.filter = filter;
            }
        }

        Ok(())
    }

    /// Create the default config file from the bundled example
    fn create_default_config(path: &Path) {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                if let Err(e) = fs::create_dir_all(parent) {
                    tracing::warn!(error = %e, "Failed to create config directory");
                    return;
                }
            }
        }

        if let Err(e) = fs::write(path, EXAMPLE_CONFIG) {
            tracing::warn!(error = %e, "Failed to write default config");
        }
    }

    pub fn with_install_root(mut self, dir: PathBuf) -> Self {
        self.install_root = dir;
        self
    }

    pub fn with_bundle_dir(mut self, dir: PathBuf) -> Self {
        self.bundle_dir = dir;
        self
    }

    pub fn with_non_relocatable(mut self, policy: NonRelocatablePolicy) -> Self {
        self.packaging.non_relocatable = policy;
        self
    }

    pub fn with_external_modules(mut self, modules: Vec<String>) -> Self {
        self.packaging.external_modules = modules;
        self
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|h| h.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}
