//! Parallel evaluation of a configured segmentation over many hits.

use rayon::prelude::*;
use rustseg_core::{CellId, Vector3D, VolumeId};

use crate::error::Result;
use crate::segmentation::Segmentation;

/// Input of a cell identifier lookup.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HitPosition {
    /// Position in the coordinates of the sensitive volume.
    pub local: Vector3D,
    /// Position in the global frame.
    pub global: Vector3D,
    /// Placement bits of the sensitive volume.
    pub volume_id: VolumeId,
}

impl HitPosition {
    /// Hit whose local and global positions coincide.
    pub fn new(position: Vector3D, volume_id: VolumeId) -> Self {
        Self {
            local: position,
            global: position,
            volume_id,
        }
    }
}

/// Cell identifiers of `hits`, in input order.
///
/// # Errors
/// Returns the first error encountered by any worker.
pub fn cell_ids_par<S>(segmentation: &S, hits: &[HitPosition]) -> Result<Vec<CellId>>
where
    S: Segmentation + ?Sized,
{
    hits.par_iter()
        .map(|hit| segmentation.cell_id(&hit.local, &hit.global, hit.volume_id))
        .collect()
}

/// Cell centres of `cell_ids`, in input order.
///
/// # Errors
/// Returns the first error encountered by any worker.
pub fn positions_par<S>(segmentation: &S, cell_ids: &[CellId]) -> Result<Vec<Vector3D>>
where
    S: Segmentation + ?Sized,
{
    cell_ids
        .par_iter()
        .map(|&id| segmentation.position(id))
        .collect()
}
