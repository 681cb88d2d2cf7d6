//! Registry behavior through the public API.

use std::sync::Arc;

use scan_source::drivers::{FileDriver, StdinDriver, ToneGenDriver};
use scan_source::{RegistryError, SourceCapabilities, SourceParams, SourceRegistry};

#[test]
fn file_stdin_tonegen_scenario() {
    let mut registry = SourceRegistry::new();
    assert_eq!(registry.register(Arc::new(FileDriver)).unwrap(), 0);
    assert_eq!(registry.register(Arc::new(StdinDriver)).unwrap(), 1);
    assert_eq!(registry.register(Arc::new(ToneGenDriver)).unwrap(), 2);

    assert_eq!(registry.lookup_by_name("stdin").unwrap().index(), 1);
    assert_eq!(registry.lookup_by_index(1).unwrap().name(), "stdin");

    let err = registry.register(Arc::new(FileDriver)).unwrap_err();
    assert_eq!(err, RegistryError::DuplicateName("file".to_string()));
    assert_eq!(registry.len(), 3);
    assert!(registry.lookup_by_index(3).is_none());
}

#[test]
fn builtin_sources_registered_in_fixed_order() {
    let registry = SourceRegistry::with_builtin_sources().unwrap();
    let names: Vec<_> = registry.iter().map(|d| (d.index(), d.name())).collect();
    assert_eq!(
        names,
        vec![(0, "file"), (1, "radio"), (2, "stdin"), (3, "tonegen")]
    );

    let radio = registry.lookup_by_name("radio").unwrap();
    assert!(radio.capabilities().contains(SourceCapabilities::REAL_TIME));
    assert!(registry.lookup_by_name("hackrf").is_none());
}

#[test]
fn descriptor_opens_through_driver() {
    let registry = SourceRegistry::with_builtin_sources().unwrap();
    let params = SourceParams {
        seed: Some(1),
        ..SourceParams::default()
    };

    let mut source = registry.lookup_by_name("tonegen").unwrap().open(&params).unwrap();
    let mut dst = vec![scan_core::Sample::default(); 128];
    assert_eq!(source.read(&mut dst).unwrap(), 128);
    assert_eq!(source.sample_rate(), params.sample_rate);

    assert!(registry.lookup_by_name("radio").unwrap().open(&params).is_err());
}

#[test]
fn walk_lists_every_builtin() {
    let registry = SourceRegistry::with_builtin_sources().unwrap();
    let mut lines = Vec::new();
    registry
        .walk(|d| {
            lines.push(format!("{} {} {}", d.index(), d.name(), d.capabilities()));
            Ok::<_, std::fmt::Error>(())
        })
        .unwrap();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[3], "3 tonegen infinite|throttle");
}
