//! Two assemblies of the same payload live side by side under distinct names.

use relocator::{Config, PackagingTask};

use super::common::determinism::SequentialUid;
use super::common::fixtures::{job_payload, Workspace};

#[test]
fn test_repeated_assembly_gets_distinct_uids() {
    let ws = Workspace::new();
    let assembler = ws.assembler(&Config::default());
    let task = PackagingTask::new("job_pkg", "1").with_payload("job", job_payload());

    let first = assembler.assemble(&task).unwrap();
    let second = assembler.assemble(&task).unwrap();
    assert_ne!(first.mapping.uid, second.mapping.uid);
    assert_ne!(first.mapping.renamed_prefix, second.mapping.renamed_prefix);
    assert_eq!(first.meta.resources, second.meta.resources);
}

#[test]
fn test_distinct_names_load_independently() {
    let ws = Workspace::new();
    let registry = ws.registry();

    let a = ws
        .assembler_with_uids(&Config::default(), SequentialUid::starting_at(1))
        .assemble(&PackagingTask::new("job_a", "1").with_payload("job", job_payload()))
        .unwrap();
    let b = ws
        .assembler_with_uids(&Config::default(), SequentialUid::starting_at(50))
        .assemble(&PackagingTask::new("job_b", "1").with_payload("job", job_payload()))
        .unwrap();

    let ep_a = registry.install(&a.path).unwrap().entry_point;
    let ep_b = registry.install(&b.path).unwrap().entry_point;
    assert_ne!(ep_a.renamed_prefix(), ep_b.renamed_prefix());

    let mut job_a = ep_a.load("job").unwrap();
    let job_b = ep_b.load("job").unwrap();
    assert!(job_a.type_refs()[0].module.starts_with("job_a.t0001.tg"));
    assert!(job_b.type_refs()[0].module.starts_with("job_b.t0050.tg"));

    // Mutating one loaded graph leaves the other and a fresh load untouched.
    if let relocator::Node::Object(obj) = &mut job_a {
        obj.fields
            .insert("retries".to_string(), relocator::Node::Int(99));
    }
    assert_eq!(
        job_b.as_object().unwrap().field("retries"),
        Some(&relocator::Node::Int(3))
    );
    assert_eq!(
        ep_a.load("job").unwrap().as_object().unwrap().field("retries"),
        Some(&relocator::Node::Int(3))
    );

    let names: Vec<String> = registry.list().unwrap().into_iter().map(|b| b.name).collect();
    assert_eq!(names, vec!["job_a".to_string(), "job_b".to_string()]);
}
