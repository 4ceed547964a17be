//! Creation of segmentations by type name.
//!
//! A [`RegistryBuilder`] collects creators and is frozen into an immutable
//! [`SegmentationRegistry`]. The process-wide registry returned by
//! [`global`] is frozen on first use with the built-in variants unless a
//! custom one was installed before.
#![allow(clippy::missing_errors_doc)]

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use log::{debug, warn};
use rustseg_core::BitFieldCoder;

use crate::cartesian::{CartesianGridXY, CartesianGridXYZ, CartesianGridXZ, CartesianGridYZ};
use crate::error::{Error, Result};
use crate::megatile::MegatileLayerGridXY;
use crate::phi_eta::{GridPhiEta, GridRPhiEta};
use crate::polar::PolarGridRPhi2;
use crate::projective::ProjectiveCylinder;
use crate::segmentation::{Segmentation, SegmentationType};
use crate::wafer::WaferGridXY;

type FromDescriptor = fn(&str) -> Result<Box<dyn Segmentation>>;
type FromCoder = fn(Arc<BitFieldCoder>) -> Result<Box<dyn Segmentation>>;

fn create_from_descriptor<T: SegmentationType>(descriptor: &str) -> Result<Box<dyn Segmentation>> {
    Ok(Box::new(T::new(descriptor)?))
}

fn create_from_coder<T: SegmentationType>(coder: Arc<BitFieldCoder>) -> Result<Box<dyn Segmentation>> {
    Ok(Box::new(T::with_coder(coder)?))
}

/// Constructors of one segmentation type.
#[derive(Clone, Copy)]
pub struct SegmentationCreator {
    type_name: &'static str,
    description: &'static str,
    from_descriptor: FromDescriptor,
    from_coder: FromCoder,
}

impl fmt::Debug for SegmentationCreator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentationCreator")
            .field("type_name", &self.type_name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl SegmentationCreator {
    /// Creator for `T`.
    pub fn of<T: SegmentationType>() -> Self {
        Self {
            type_name: T::TYPE_NAME,
            description: T::DESCRIPTION,
            from_descriptor: create_from_descriptor::<T>,
            from_coder: create_from_coder::<T>,
        }
    }

    /// Registered type name.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// One-line description of the type.
    pub fn description(&self) -> &'static str {
        self.description
    }

    /// New instance owning a coder built from `descriptor`.
    pub fn create(&self, descriptor: &str) -> Result<Box<dyn Segmentation>> {
        (self.from_descriptor)(descriptor)
    }

    /// New instance on a shared coder.
    pub fn create_with_coder(&self, coder: Arc<BitFieldCoder>) -> Result<Box<dyn Segmentation>> {
        (self.from_coder)(coder)
    }
}

/// Mutable collection of creators.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    creators: BTreeMap<&'static str, SegmentationCreator>,
}

impl RegistryBuilder {
    /// Empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder holding every built-in segmentation type.
    pub fn with_builtins() -> Self {
        let mut builder = Self::new();
        builder
            .register::<CartesianGridXY>()
            .register::<CartesianGridXZ>()
            .register::<CartesianGridYZ>()
            .register::<CartesianGridXYZ>()
            .register::<ProjectiveCylinder>()
            .register::<GridPhiEta>()
            .register::<GridRPhiEta>()
            .register::<PolarGridRPhi2>()
            .register::<WaferGridXY>()
            .register::<MegatileLayerGridXY>();
        builder
    }

    /// Adds `T`, replacing an earlier creator of the same name.
    pub fn register<T: SegmentationType>(&mut self) -> &mut Self {
        self.insert(SegmentationCreator::of::<T>())
    }

    /// Adds a creator, replacing an earlier one of the same name.
    pub fn insert(&mut self, creator: SegmentationCreator) -> &mut Self {
        if self.creators.insert(creator.type_name, creator).is_some() {
            warn!("segmentation type {} registered twice, keeping the last", creator.type_name);
        }
        self
    }

    /// Immutable registry of the collected creators.
    pub fn freeze(self) -> SegmentationRegistry {
        debug!(
            "segmentation registry frozen with {} types: {}",
            self.creators.len(),
            self.creators.keys().copied().collect::<Vec<_>>().join(", ")
        );
        SegmentationRegistry {
            creators: self.creators,
        }
    }
}

/// Immutable map from type name to creator.
#[derive(Debug)]
pub struct SegmentationRegistry {
    creators: BTreeMap<&'static str, SegmentationCreator>,
}

impl SegmentationRegistry {
    /// Creator registered as `type_name`.
    pub fn get(&self, type_name: &str) -> Result<&SegmentationCreator> {
        self.creators
            .get(type_name)
            .ok_or_else(|| Error::UnknownType(type_name.to_string()))
    }

    /// True if `type_name` is registered.
    pub fn contains(&self, type_name: &str) -> bool {
        self.creators.contains_key(type_name)
    }

    /// Registered creators ordered by type name.
    pub fn types(&self) -> impl Iterator<Item = &SegmentationCreator> {
        self.creators.values()
    }

    /// Instance of `type_name` owning a coder built from `descriptor`.
    pub fn create(&self, type_name: &str, descriptor: &str) -> Result<Box<dyn Segmentation>> {
        self.get(type_name)?.create(descriptor)
    }

    /// Instance of `type_name` on a shared coder.
    pub fn create_with_coder(
        &self,
        type_name: &str,
        coder: Arc<BitFieldCoder>,
    ) -> Result<Box<dyn Segmentation>> {
        self.get(type_name)?.create_with_coder(coder)
    }
}

static REGISTRY: OnceLock<SegmentationRegistry> = OnceLock::new();

/// The process-wide registry.
pub fn global() -> &'static SegmentationRegistry {
    REGISTRY.get_or_init(|| RegistryBuilder::with_builtins().freeze())
}

/// Installs `registry` as the process-wide registry.
///
/// Returns the registry back if one is already in place.
pub fn install(registry: SegmentationRegistry) -> std::result::Result<(), SegmentationRegistry> {
    REGISTRY.set(registry)
}

/// Creates `type_name` from the process-wide registry.
pub fn create(type_name: &str, descriptor: &str) -> Result<Box<dyn Segmentation>> {
    global().create(type_name, descriptor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins() {
        let registry = RegistryBuilder::with_builtins().freeze();
        let names: Vec<_> = registry.types().map(SegmentationCreator::type_name).collect();
        assert_eq!(names.len(), 10);
        assert!(registry.contains("PolarGridRPhi2"));
        assert!(registry.contains("CartesianGridXY"));
        assert!(registry.contains("MegatileLayerGridXY"));

        let seg = registry.create("ProjectiveCylinder", "system:8,theta:8,phi:8").unwrap();
        assert_eq!(seg.type_name(), "ProjectiveCylinder");
        assert_eq!(seg.name(), "ProjectiveCylinder");
    }

    #[test]
    fn test_unknown_type() {
        let registry = RegistryBuilder::new().freeze();
        let err = registry.create("NoSuchGrid", "x:8").unwrap_err();
        assert!(matches!(err, Error::UnknownType(name) if name == "NoSuchGrid"));
    }

    #[test]
    fn test_shared_coder() {
        let coder = Arc::new(BitFieldCoder::new("system:8,x:-8,y:-8").unwrap());
        let a = global().create_with_coder("CartesianGridXY", Arc::clone(&coder)).unwrap();
        let b = global().create_with_coder("WaferGridXY", Arc::clone(&coder));
        assert!(!a.base().owns_decoder());
        // WaferGridXY only fails once a hit needs the wafer fields
        assert!(b.is_ok());
        assert_eq!(Arc::strong_count(&coder), 3);
    }

    #[test]
    fn test_duplicate_registration_replaces() {
        let mut builder = RegistryBuilder::new();
        builder.register::<CartesianGridXY>().register::<CartesianGridXY>();
        assert_eq!(builder.freeze().types().count(), 1);
    }

    #[test]
    fn test_bad_descriptor_propagates() {
        assert!(matches!(
            create("CartesianGridXY", "x:8,x:8"),
            Err(Error::Codec(_))
        ));
    }
}
