//! Temporary shared trees, output dirs and install roots.

use std::fs;
use std::path::{Path, PathBuf};

use relocator::bundle::BundleAssembler;
use relocator::config::TreeConfig;
use relocator::graph::{Node, TypeRef};
use relocator::{Config, InstallRegistry, SourceTree};
use tempfile::TempDir;

use super::determinism::SequentialUid;

/// A `tg` shared root plus scratch directories, removed on drop.
///
/// Layout:
/// - `tg/__init__.py`: `Settings`
/// - `tg/jobs.py`: `Job`, `Step`
/// - `tg/features/__init__.py`
/// - `tg/features/morph.py`: `Featurizer`
pub struct Workspace {
    _dir: TempDir,
    pub root: PathBuf,
    pub out: PathBuf,
    pub site: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let root = dir.path().join("tg");
        fs::create_dir_all(root.join("features")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join("__init__.py"), "class Settings:\n    pass\n").unwrap();
        fs::write(
            root.join("jobs.py"),
            "class Job:\n    pass\n\nclass Step:\n    pass\n",
        )
        .unwrap();
        fs::write(root.join("features/__init__.py"), "").unwrap();
        fs::write(
            root.join("features/morph.py"),
            "class Featurizer:\n    pass\n",
        )
        .unwrap();
        fs::write(root.join(".git/HEAD"), "ref: refs/heads/main\n").unwrap();

        let out = dir.path().join("bundles");
        let site = dir.path().join("site");
        Self {
            _dir: dir,
            root,
            out,
            site,
        }
    }

    pub fn assembler(&self, config: &Config) -> BundleAssembler {
        self.assembler_with_uids(config, SequentialUid::new())
    }

    pub fn assembler_with_uids(&self, config: &Config, uids: SequentialUid) -> BundleAssembler {
        BundleAssembler::new(SourceTree::open(&self.root).unwrap(), config)
            .unwrap()
            .with_uid_source(Box::new(uids))
            .with_out_dir(&self.out)
    }

    pub fn registry(&self) -> InstallRegistry {
        InstallRegistry::open(&self.site, &TreeConfig::default()).unwrap()
    }

    /// A second, unrelated directory next to the shared root.
    pub fn sibling(&self, name: &str) -> PathBuf {
        let path = self.root.parent().unwrap_or(Path::new("/")).join(name);
        fs::create_dir_all(&path).unwrap();
        path
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

/// `tg.jobs.Job` holding a featurizer and a couple of plain fields.
pub fn job_payload() -> Node {
    Node::object(
        TypeRef::new("tg.jobs", "Job"),
        [
            ("name".to_string(), Node::Str("nightly".to_string())),
            ("retries".to_string(), Node::Int(3)),
            (
                "featurizer".to_string(),
                Node::object(
                    TypeRef::new("tg.features.morph", "Featurizer"),
                    [("window".to_string(), Node::Float(0.5))],
                ),
            ),
            (
                "steps".to_string(),
                Node::List(vec![
                    Node::object(TypeRef::new("tg.jobs", "Step"), []),
                    Node::object(TypeRef::new("tg", "Settings"), []),
                ]),
            ),
        ],
    )
}
