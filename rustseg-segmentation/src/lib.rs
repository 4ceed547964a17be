//! rustseg-segmentation: Readout segmentations for detector cell identifiers.
//!
//! A segmentation maps a hit position inside a sensitive volume to the
//! cell address bits of a 64-bit identifier and back:
//! - **Cartesian** - uniform grids in XY, XZ, YZ or XYZ
//! - **ProjectiveCylinder** - equal bins in theta and phi
//! - **GridPhiEta / GridRPhiEta** - bins in eta, phi and radius
//! - **PolarGridRPhi2** - rings of variable width split into phi sectors
//! - **WaferGridXY** - XY grid displaced per wafer
//! - **MegatileLayerGridXY** - strip and square megatile layers
//!
//! Variants are created by type name through a [`SegmentationRegistry`]
//! and configured from a [`ParameterTable`] or a JSON
//! [`SegmentationConfig`].

pub mod batch;
pub mod binning;
pub mod cartesian;
pub mod config;
pub mod error;
pub mod megatile;
pub mod parameter;
pub mod phi_eta;
pub mod polar;
pub mod projective;
pub mod region;
pub mod registry;
pub mod segmentation;
pub mod wafer;

pub use batch::{cell_ids_par, positions_par, HitPosition};
pub use binning::{
    bin_to_position, bin_to_position_boundaries, position_to_bin, position_to_bin_boundaries,
};
pub use cartesian::{
    Axis, CartesianGrid, CartesianGridXY, CartesianGridXYZ, CartesianGridXZ, CartesianGridYZ,
};
pub use config::{ConfigValue, SegmentationConfig};
pub use error::{Error, Result};
pub use megatile::{LayerKind, MegatileLayerGridXY, MegatileWafer};
pub use parameter::{Parameter, ParameterTable, ParameterValue, UnitKind};
pub use phi_eta::{GridPhiEta, GridRPhiEta};
pub use polar::PolarGridRPhi2;
pub use projective::ProjectiveCylinder;
pub use registry::{RegistryBuilder, SegmentationCreator, SegmentationRegistry};
pub use segmentation::{Segmentation, SegmentationBase, SegmentationType};
pub use wafer::{WaferGridXY, WaferOffset};

// Re-export the codec so callers need a single dependency
pub use rustseg_core::{BitFieldCoder, BitFieldElement, CellId, Vector3D, VolumeId};
