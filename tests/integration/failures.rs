//! Non-relocatable payloads, partial trees and loading into other trees.

use std::fs;

use relocator::config::{NonRelocatablePolicy, TreeConfig};
use relocator::graph::{Node, TypeRef};
use relocator::tree::{DeclarationScanner, IgnoreSet};
use relocator::{Config, ErrorKind, LoadTarget, PackagingTask, SourceTree};

use super::common::fixtures::{job_payload, Workspace};

#[test]
fn test_outside_type_is_rejected_at_packaging() {
    let ws = Workspace::new();
    let task = PackagingTask::new("job_pkg", "1").with_payload(
        "job",
        Node::object(
            TypeRef::new("tg.jobs", "Job"),
            [(
                "model".to_string(),
                Node::object(TypeRef::new("tg_extra.models", "Model"), []),
            )],
        ),
    );
    let err = ws.assembler(&Config::default()).assemble(&task).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NonRelocatableDependency);
    assert!(err.to_string().contains("tg_extra.models.Model"));
    assert!(!ws.out.exists() || fs::read_dir(&ws.out).unwrap().next().is_none());
}

#[test]
fn test_warn_policy_ships_but_does_not_load() {
    let ws = Workspace::new();
    let config = Config::default().with_non_relocatable(NonRelocatablePolicy::Warn);
    let task = PackagingTask::new("job_pkg", "1").with_payload(
        "job",
        Node::object(TypeRef::new("elsewhere", "Thing"), []),
    );
    let record = ws.assembler(&config).assemble(&task).unwrap();
    let ep = ws.registry().install(&record.path).unwrap().entry_point;

    let err = ep.load("job").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeResolution);
}

#[test]
fn test_external_modules_load_untouched() {
    let ws = Workspace::new();
    let config = Config::default().with_external_modules(vec!["builtins".to_string()]);
    let task = PackagingTask::new("job_pkg", "1").with_payload(
        "job",
        Node::object(
            TypeRef::new("tg.jobs", "Job"),
            [(
                "opts".to_string(),
                Node::object(TypeRef::new("builtins", "dict"), []),
            )],
        ),
    );
    let record = ws.assembler(&config).assemble(&task).unwrap();
    let ep = ws.registry().install(&record.path).unwrap().entry_point;

    let loaded = ep.load("job").unwrap();
    let opts = loaded.as_object().unwrap().field("opts").unwrap();
    assert_eq!(opts.as_object().unwrap().type_ref, TypeRef::new("builtins", "dict"));
}

#[test]
fn test_partial_tree_fails_type_resolution() {
    let ws = Workspace::new();
    let task = PackagingTask::new("job_pkg", "1").with_payload("job", job_payload());
    let record = ws.assembler(&Config::default()).assemble(&task).unwrap();
    let registry = ws.registry();
    let ep = registry.install(&record.path).unwrap().entry_point;

    let morph = registry
        .root()
        .join("job_pkg")
        .join(ep.uid())
        .join("tg/features/morph.py");
    fs::remove_file(morph).unwrap();

    let err = registry.entry_point("job_pkg").unwrap().load("job").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeResolution);
    assert!(err.to_string().contains("features.morph.Featurizer"));
    assert!(err.to_string().contains(ep.renamed_prefix()));
}

#[test]
fn test_prefix_lookalike_modules_are_never_rewritten() {
    let ws = Workspace::new();
    let config = Config::default().with_external_modules(vec!["tg_extra".to_string()]);
    let task = PackagingTask::new("job_pkg", "1").with_payload(
        "job",
        Node::object(
            TypeRef::new("tg.jobs", "Job"),
            [(
                "helper".to_string(),
                Node::object(TypeRef::new("tg_extra.util", "Helper"), []),
            )],
        ),
    );
    let record = ws.assembler(&config).assemble(&task).unwrap();
    let ep = ws.registry().install(&record.path).unwrap().entry_point;

    let modules: Vec<String> = ep
        .load("job")
        .unwrap()
        .type_refs()
        .into_iter()
        .map(|t| t.module)
        .collect();
    assert!(modules.contains(&"tg_extra.util".to_string()));
    assert!(modules.contains(&format!("{}.jobs", ep.renamed_prefix())));
}

#[test]
fn test_load_into_compatible_tree() {
    let ws = Workspace::new();
    let task = PackagingTask::new("job_pkg", "1").with_payload("job", job_payload());
    let record = ws.assembler(&Config::default()).assemble(&task).unwrap();
    let ep = ws.registry().install(&record.path).unwrap().entry_point;

    let tree_config = TreeConfig::default();
    let scanner = DeclarationScanner::from_config(&tree_config).unwrap();
    let ignore = IgnoreSet::from_config(&tree_config);

    // Load back into the pristine tree it was packaged from.
    let target = LoadTarget::from_tree(&SourceTree::open(&ws.root).unwrap(), &scanner, &ignore)
        .unwrap();
    let loaded = ep.load_into("job", &target).unwrap();
    assert_eq!(loaded, job_payload());

    // A tree without the featurizer module cannot host the payload.
    let other = ws.sibling("tg2");
    fs::write(other.join("jobs.py"), "class Job:\n    pass\n\nclass Step:\n    pass\n").unwrap();
    fs::write(other.join("__init__.py"), "class Settings:\n    pass\n").unwrap();
    let target = LoadTarget::from_tree(&SourceTree::open(&other).unwrap(), &scanner, &ignore)
        .unwrap();
    assert_eq!(target.prefix(), "tg2");
    let err = ep.load_into("job", &target).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeResolution);
    assert!(err.to_string().contains("tg2.features.morph.Featurizer"));
}
