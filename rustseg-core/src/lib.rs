//! rustseg-core: Cell identifier codec and core types.
//!
//! This crate provides the bit-exact 64-bit key encoding shared by every
//! readout segmentation, plus the point type used for hit positions.
//!

pub mod bitfield;
pub mod error;
pub mod vector;

pub use bitfield::{BitFieldCoder, BitFieldElement};
pub use error::{Error, Result};
pub use vector::{normalize_phi, wrap_phi, Vector3D};

/// Full 64-bit cell identifier: placement bits plus the in-volume cell address.
pub type CellId = u64;

/// Identifier of the placed volume a hit belongs to; a [`CellId`] with the
/// cell address fields cleared.
pub type VolumeId = u64;
