//! Integration tests for access checks between layered modules
//!
//! Each test builds its modules the way a class-loading collaborator would:
//! descriptors, resolution on top of the boot configuration, then a layer.

use modgate_core::{
    check_access, AccessDecision, DenyReason, Layer, Loader, ModuleDescriptor, ModuleLibrary,
    ModuleRef, ModuleSystem,
};
use std::collections::HashMap;
use std::sync::Arc;

fn descriptor_m1() -> ModuleDescriptor {
    ModuleDescriptor::builder("m1")
        .requires("java.base")
        .requires("m2")
        .exports("p1")
        .build()
        .unwrap()
}

fn descriptor_m2_qualified() -> ModuleDescriptor {
    ModuleDescriptor::builder("m2")
        .requires("java.base")
        .exports_to("p2", ["m1"])
        .build()
        .unwrap()
}

fn layer_of(system: &ModuleSystem, descriptors: Vec<ModuleDescriptor>, roots: &[&str]) -> Arc<Layer> {
    let library = ModuleLibrary::of(descriptors).unwrap();
    let cf = system
        .resolve(&library, system.boot_configuration(), &[], roots)
        .unwrap();
    let loaders: HashMap<String, Loader> = cf
        .module_names()
        .map(|name| (name.to_string(), Loader::custom()))
        .collect();
    system
        .create_layer_with_map(&cf, system.boot_layer(), &loaders)
        .unwrap()
}

fn module(layer: &Layer, name: &str) -> ModuleRef {
    layer.module(name).cloned().unwrap()
}

#[test]
fn test_unqualified_export_readable() {
    let system = ModuleSystem::new().unwrap();
    let m2 = ModuleDescriptor::builder("m2")
        .requires("java.base")
        .exports("p2")
        .build()
        .unwrap();
    let layer = layer_of(&system, vec![descriptor_m1(), m2], &["m1"]);

    let m1 = module(&layer, "m1");
    let m2 = module(&layer, "m2");
    assert_ne!(m1.loader(), m2.loader());
    assert_eq!(check_access(&m1, &m2, "p2"), AccessDecision::Allow);
    assert_eq!(
        system.find_loader(layer.id(), "java.base"),
        Some(Loader::Platform)
    );
}

#[test]
fn test_qualified_export_only_to_listed_module() {
    let system = ModuleSystem::new().unwrap();
    let m3 = ModuleDescriptor::builder("m3")
        .requires("java.base")
        .requires("m2")
        .build()
        .unwrap();
    let layer = layer_of(
        &system,
        vec![descriptor_m1(), descriptor_m2_qualified(), m3],
        &["m1", "m3"],
    );

    let m1 = module(&layer, "m1");
    let m2 = module(&layer, "m2");
    let m3 = module(&layer, "m3");
    assert_eq!(check_access(&m1, &m2, "p2"), AccessDecision::Allow);
    assert_eq!(
        check_access(&m3, &m2, "p2"),
        AccessDecision::Deny(DenyReason::PackageNotExportedToModule)
    );
}

#[test]
fn test_not_readable_regardless_of_exports() {
    let system = ModuleSystem::new().unwrap();
    let m1 = ModuleDescriptor::builder("m1")
        .requires("java.base")
        .build()
        .unwrap();
    let m2 = ModuleDescriptor::builder("m2")
        .requires("java.base")
        .exports("p2")
        .build()
        .unwrap();
    let layer = layer_of(&system, vec![m1, m2], &["m1", "m2"]);

    let m1 = module(&layer, "m1");
    let m2 = module(&layer, "m2");
    assert_eq!(
        check_access(&m1, &m2, "p2"),
        AccessDecision::Deny(DenyReason::NotReadable)
    );
}

#[test]
fn test_add_reads_takes_effect_without_new_layer() {
    let system = ModuleSystem::new().unwrap();
    let m1 = ModuleDescriptor::builder("m1")
        .requires("java.base")
        .build()
        .unwrap();
    let layer = layer_of(&system, vec![m1, descriptor_m2_qualified()], &["m1", "m2"]);

    let m1 = module(&layer, "m1");
    let m2 = module(&layer, "m2");
    assert_eq!(
        check_access(&m1, &m2, "p2"),
        AccessDecision::Deny(DenyReason::NotReadable)
    );

    m1.add_reads(Some(&m2));
    assert_eq!(check_access(&m1, &m2, "p2"), AccessDecision::Allow);
}

#[test]
fn test_loose_module_reads_everything() {
    let system = ModuleSystem::new().unwrap();
    let m1 = ModuleDescriptor::builder("m1")
        .requires("java.base")
        .build()
        .unwrap();
    let m2 = ModuleDescriptor::builder("m2")
        .requires("java.base")
        .exports("p2")
        .build()
        .unwrap();
    let layer = layer_of(&system, vec![m1, m2], &["m1", "m2"]);

    let m1 = module(&layer, "m1");
    let m2 = module(&layer, "m2");
    let unnamed = system.unnamed_module(Loader::custom());
    assert!(!check_access(&m1, &m2, "p2").is_allowed());
    assert!(!check_access(&m1, &unnamed, "q").is_allowed());

    m1.add_reads(None);
    assert!(m1.is_loose());
    assert_eq!(check_access(&m1, &m2, "p2"), AccessDecision::Allow);
    assert_eq!(check_access(&m1, &unnamed, "q"), AccessDecision::Allow);

    // looseness does not bypass exports
    assert_eq!(
        check_access(&m1, &m2, "p9"),
        AccessDecision::Deny(DenyReason::PackageNotExported)
    );
    // and is never revoked by later calls
    m1.add_reads(Some(&m2));
    assert!(m1.is_loose());
}

#[test]
fn test_same_module_access_ignores_exports() {
    let system = ModuleSystem::new().unwrap();
    let m1 = ModuleDescriptor::builder("m1")
        .requires("java.base")
        .contains("p1.internal")
        .build()
        .unwrap();
    let layer = layer_of(&system, vec![m1], &["m1"]);

    let m1 = module(&layer, "m1");
    assert_eq!(check_access(&m1, &m1, "p1.internal"), AccessDecision::Allow);
}

#[test]
fn test_base_module_always_readable() {
    let system = ModuleSystem::new().unwrap();
    let m1 = ModuleDescriptor::builder("m1").build().unwrap();
    let layer = layer_of(&system, vec![m1], &["m1"]);

    let m1 = module(&layer, "m1");
    assert!(m1.reads().is_empty());
    assert_eq!(
        check_access(&m1, system.base_module(), "java.lang"),
        AccessDecision::Allow
    );
    assert_eq!(
        check_access(&m1, system.base_module(), "jdk.internal"),
        AccessDecision::Deny(DenyReason::PackageNotExported)
    );
}

#[test]
fn test_add_exports_widens_qualified_export() {
    let system = ModuleSystem::new().unwrap();
    let m3 = ModuleDescriptor::builder("m3")
        .requires("java.base")
        .requires("m2")
        .build()
        .unwrap();
    let layer = layer_of(
        &system,
        vec![descriptor_m1(), descriptor_m2_qualified(), m3],
        &["m1", "m3"],
    );

    let m2 = module(&layer, "m2");
    let m3 = module(&layer, "m3");
    assert!(!check_access(&m3, &m2, "p2").is_allowed());

    m2.add_exports("p2", Some(&m3)).unwrap();
    assert!(check_access(&m3, &m2, "p2").is_allowed());
    assert!(check_access(&module(&layer, "m1"), &m2, "p2").is_allowed());
}

#[test]
fn test_add_exports_unowned_package_fails() {
    let system = ModuleSystem::new().unwrap();
    let layer = layer_of(&system, vec![descriptor_m1(), descriptor_m2_qualified()], &["m1"]);

    let m2 = module(&layer, "m2");
    let err = m2.add_exports("p1", None).unwrap_err();
    assert_eq!(err.package, "p1");
    assert!(!check_access(&module(&layer, "m1"), &m2, "p1").is_allowed());
}

#[test]
fn test_unnamed_module_exports_everything() {
    let system = ModuleSystem::new().unwrap();
    let m1 = ModuleDescriptor::builder("m1")
        .requires("java.base")
        .exports("p1")
        .build()
        .unwrap();
    let layer = layer_of(&system, vec![m1], &["m1"]);

    let m1 = module(&layer, "m1");
    let unnamed = system.unnamed_module(m1.loader());
    assert_eq!(check_access(&unnamed, &m1, "p1"), AccessDecision::Allow);
    assert_eq!(
        check_access(&m1, &unnamed, "anything"),
        AccessDecision::Deny(DenyReason::NotReadable)
    );
}

#[test]
fn test_system_check_access_by_identity() {
    let system = ModuleSystem::new().unwrap();
    let layer = layer_of(&system, vec![descriptor_m1(), descriptor_m2_qualified()], &["m1"]);

    let m1 = module(&layer, "m1");
    let m2 = module(&layer, "m2");
    let decision = system
        .check_access(m1.identity(), m2.identity(), "p2")
        .unwrap();
    assert_eq!(decision, AccessDecision::Allow);
}
