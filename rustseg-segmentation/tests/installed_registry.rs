//! The process-wide registry can be installed once, before first use.
//!
//! Kept in its own test binary so no other test initialises the global
//! registry first.

use rustseg_segmentation::{registry, CartesianGridXY, Error, RegistryBuilder, SegmentationCreator};

#[test]
fn test_install_custom_registry() {
    let mut builder = RegistryBuilder::new();
    builder.register::<CartesianGridXY>();
    assert!(registry::install(builder.freeze()).is_ok());

    let names: Vec<_> = registry::global().types().map(SegmentationCreator::type_name).collect();
    assert_eq!(names, vec!["CartesianGridXY"]);
    assert!(registry::create("CartesianGridXY", "x:-8,y:-8").is_ok());
    assert!(matches!(
        registry::create("ProjectiveCylinder", "theta:8,phi:8"),
        Err(Error::UnknownType(_))
    ));

    // a second install is refused and handed back
    let rejected = registry::install(RegistryBuilder::with_builtins().freeze());
    let returned = rejected.expect_err("registry already installed");
    assert!(returned.contains("ProjectiveCylinder"));
    assert!(!registry::global().contains("ProjectiveCylinder"));
}
