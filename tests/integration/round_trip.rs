//! Package -> install -> load round trips.

use relocator::graph::{Node, Relocatable, TypeRef};
use relocator::{rewrite_on_read, Config, ErrorKind, PackagingTask};
use serde::{Deserialize, Serialize};

use super::common::fixtures::{job_payload, Workspace};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Job {
    name: String,
    retries: i64,
    tags: Vec<String>,
}

impl Relocatable for Job {
    fn type_ref() -> TypeRef {
        TypeRef::new("tg.jobs", "Job")
    }
}

/// The `job_pkg` scenario: the loaded object lives under `job_pkg.<uid>.`
/// and keeps its field values.
#[test]
fn test_job_pkg_scenario() {
    let ws = Workspace::new();
    let task = PackagingTask::new("job_pkg", "1").with_payload("job", job_payload());
    let record = ws.assembler(&Config::default()).assemble(&task).unwrap();

    let installation = ws.registry().install(&record.path).unwrap();
    assert!(installation.evicted.is_none());
    let ep = installation.entry_point;

    assert_eq!(ep.module_name(), "job_pkg");
    assert_eq!(ep.module_version(), "1");
    assert_eq!(ep.original_prefix(), "tg");
    assert_eq!(ep.uid(), record.mapping.uid);
    assert_eq!(ep.renamed_prefix(), format!("job_pkg.{}.tg", ep.uid()));
    assert!(ep.resources_location().is_dir());

    let loaded = ep.load("job").unwrap();
    let object = loaded.as_object().unwrap();
    assert!(object
        .type_ref
        .module
        .starts_with(&format!("job_pkg.{}.", ep.uid())));
    assert_eq!(object.type_ref.name, "Job");

    // Same graph as shipped once the namespace is mapped back, nested
    // featurizer and steps included.
    let mut mapped_back = loaded.clone();
    let rewritten = rewrite_on_read(&mut mapped_back, &[ep.renamed_prefix()], "tg");
    assert_eq!(rewritten, job_payload().type_refs().len());
    assert_eq!(mapped_back, job_payload());
    assert_ne!(loaded, job_payload());
}

/// Every nested reference resolves under the new namespace, none under `tg`.
#[test]
fn test_nested_types_resolve_in_installed_tree() {
    let ws = Workspace::new();
    let task = PackagingTask::new("job_pkg", "1").with_payload("job", job_payload());
    let record = ws.assembler(&Config::default()).assemble(&task).unwrap();
    let ep = ws.registry().install(&record.path).unwrap().entry_point;

    let loaded = ep.load("job").unwrap();
    let refs = loaded.type_refs();
    assert_eq!(refs.len(), job_payload().type_refs().len());
    for reference in refs {
        assert!(
            reference.module == ep.renamed_prefix()
                || reference.module.starts_with(&format!("{}.", ep.renamed_prefix())),
            "{reference} escaped the installed namespace"
        );
        assert!(ep.index().resolves(&reference));
    }
}

#[test]
fn test_typed_value_round_trip() -> anyhow::Result<()> {
    let ws = Workspace::new();
    let job = Job {
        name: "nightly".to_string(),
        retries: 2,
        tags: vec!["a".to_string(), "b".to_string()],
    };
    let task = PackagingTask::new("job_pkg", "1").with_payload("job", Node::typed(&job)?);
    let record = ws.assembler(&Config::default()).assemble(&task)?;
    let ep = ws.registry().install(&record.path)?.entry_point;

    let back: Job = ep.load_as("job")?;
    assert_eq!(back, job);
    assert_eq!(
        ep.load("job")?.as_object().map(|o| o.type_ref.name.clone()),
        Some("Job".to_string())
    );
    Ok(())
}

#[test]
fn test_missing_resource_names_the_key() {
    let ws = Workspace::new();
    let task = PackagingTask::new("job_pkg", "1").with_payload("job", job_payload());
    let record = ws.assembler(&Config::default()).assemble(&task).unwrap();
    let ep = ws.registry().install(&record.path).unwrap().entry_point;

    let err = ep.load("missing").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceNotFound);
    assert!(err.to_string().contains("missing"));
    assert!(err.to_string().contains("job_pkg"));
}

#[test]
fn test_installed_tree_mirrors_shared_root() {
    let ws = Workspace::new();
    let task = PackagingTask::new("job_pkg", "1").with_payload("job", job_payload());
    let record = ws.assembler(&Config::default()).assemble(&task).unwrap();
    let registry = ws.registry();
    let ep = registry.install(&record.path).unwrap().entry_point;

    let tree = registry.root().join("job_pkg").join(ep.uid()).join("tg");
    assert!(tree.join("jobs.py").is_file());
    assert!(tree.join("features/morph.py").is_file());
    assert!(!tree.join(".git").exists());
    assert!(registry.root().join("job_pkg/bundle.json").is_file());
    assert_eq!(
        ep.resources().collect::<Vec<_>>(),
        vec!["job"],
        "only the packaged payloads are listed"
    );
}

#[test]
fn test_large_unsigned_fields_round_trip() {
    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Seeded {
        seed: u64,
        offset: i64,
    }
    impl Relocatable for Seeded {
        fn type_ref() -> TypeRef {
            TypeRef::new("tg.jobs", "Step")
        }
    }

    let ws = Workspace::new();
    let value = Seeded {
        seed: u64::MAX,
        offset: -1,
    };
    let task =
        PackagingTask::new("job_pkg", "1").with_payload("step", Node::typed(&value).unwrap());
    let record = ws.assembler(&Config::default()).assemble(&task).unwrap();
    let ep = ws.registry().install(&record.path).unwrap().entry_point;

    let back: Seeded = ep.load_as("step").unwrap();
    assert_eq!(back, value);
}

#[test]
fn test_non_finite_floats_fail_at_packaging_not_at_load() {
    let ws = Workspace::new();
    let task = PackagingTask::new("job_pkg", "1").with_payload(
        "job",
        Node::object(
            TypeRef::new("tg.jobs", "Job"),
            [("threshold".to_string(), Node::Float(f64::INFINITY))],
        ),
    );
    let err = ws.assembler(&Config::default()).assemble(&task).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidPayload);
    assert!(err.to_string().contains("threshold"));
}
