pub mod bundle;
pub mod config;
pub mod error;
pub mod graph;
pub mod install;
pub mod namespace;
pub mod tree;
pub mod util;

pub use bundle::{AssemblyRecord, BundleArchive, BundleAssembler, BundleMeta, PackagingTask};
pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use graph::{Node, ObjectNode, Relocatable, TypeRef};
pub use install::{EntryPoint, InstallRegistry, InstalledBundle, Installation, LoadTarget};
pub use namespace::{rewrite_on_read, rewrite_on_write, NamespaceMapping, UidSource};
pub use tree::{ModuleIndex, SourceTree};
pub use util::init_logging;
