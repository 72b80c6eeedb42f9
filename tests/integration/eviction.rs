//! Single-slot installs: eviction, collisions and stale entry points.

use relocator::{Config, ErrorKind, PackagingTask};

use super::common::determinism::SequentialUid;
use super::common::fixtures::{job_payload, Workspace};

fn task(version: &str) -> PackagingTask {
    PackagingTask::new("job_pkg", version).with_payload("job", job_payload())
}

#[test]
fn test_newer_version_evicts_older() {
    let ws = Workspace::new();
    let registry = ws.registry();
    let assembler = ws.assembler(&Config::default());

    let v1 = assembler.assemble(&task("1")).unwrap();
    let v2 = assembler.assemble(&task("2")).unwrap();

    let old = registry.install(&v1.path).unwrap().entry_point;
    let installation = registry.install(&v2.path).unwrap();

    let evicted = installation.evicted.expect("v1 should have been evicted");
    assert_eq!(evicted.version, "1");
    assert_eq!(evicted.uid, v1.mapping.uid);

    let current = registry.get("job_pkg").unwrap().unwrap();
    assert_eq!(current.version, "2");
    assert_eq!(registry.list().unwrap().len(), 1);
    assert!(!registry.root().join("job_pkg").join(&v1.mapping.uid).exists());

    let ep = registry.entry_point("job_pkg").unwrap();
    assert_eq!(ep.module_version(), "2");
    assert!(ep.load("job").is_ok());

    let err = old.load("job").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StaleEntryPoint);
    assert!(err.to_string().contains("job_pkg"));
}

#[test]
fn test_same_version_different_uid_collides() {
    let ws = Workspace::new();
    let registry = ws.registry();
    let assembler = ws.assembler(&Config::default());

    let first = assembler.assemble(&task("1")).unwrap();
    let second = assembler.assemble(&task("1")).unwrap();

    registry.install(&first.path).unwrap();
    let err = registry.install(&second.path).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NamespaceCollision);
    assert!(err.to_string().contains(&first.mapping.uid));
    assert!(err.to_string().contains(&second.mapping.uid));

    // The first installation is untouched.
    let current = registry.get("job_pkg").unwrap().unwrap();
    assert_eq!(current.uid, first.mapping.uid);

    registry.uninstall("job_pkg").unwrap();
    let ep = registry.install(&second.path).unwrap().entry_point;
    assert_eq!(ep.uid(), second.mapping.uid);
}

#[test]
fn test_reinstalling_same_bundle_replaces_it() {
    let ws = Workspace::new();
    let registry = ws.registry();
    let record = ws.assembler(&Config::default()).assemble(&task("1")).unwrap();

    let first = registry.install(&record.path).unwrap().entry_point;
    let second = registry.install(&record.path).unwrap();

    assert_eq!(second.evicted.map(|e| e.uid), Some(record.mapping.uid.clone()));
    assert!(second.entry_point.generation() > first.generation());
    assert!(second.entry_point.load("job").is_ok());
    assert_eq!(
        first.load("job").unwrap_err().kind(),
        ErrorKind::StaleEntryPoint
    );
}

#[test]
fn test_uninstall_makes_entry_points_stale() {
    let ws = Workspace::new();
    let registry = ws.registry();
    let record = ws
        .assembler_with_uids(&Config::default(), SequentialUid::starting_at(7))
        .assemble(&task("1"))
        .unwrap();
    let ep = registry.install(&record.path).unwrap().entry_point;

    let removed = registry.uninstall("job_pkg").unwrap().unwrap();
    assert_eq!(removed.uid, "t0007");
    assert!(!registry.root().join("job_pkg").exists());
    assert!(registry.uninstall("job_pkg").unwrap().is_none());

    let err = ep.load("job").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StaleEntryPoint);
    assert!(err.to_string().contains("not installed"));

    let err = registry.entry_point("job_pkg").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotInstalled);
}
