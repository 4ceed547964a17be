//! Polar grid in the transverse plane with rings of variable width.
//!
//! Ring `i` spans `[grid_r_values[i], grid_r_values[i + 1])` and is split
//! into phi sectors of `grid_phi_values[i]`, starting at `offset_phi`.

use std::any::Any;
use std::f64::consts::TAU;

use rustseg_core::{CellId, Vector3D, VolumeId};

use crate::binning::{
    bin_to_position, bin_to_position_boundaries, position_to_bin, position_to_bin_boundaries,
    MIN_CELL_SIZE,
};
use crate::error::{Error, Result};
use crate::parameter::UnitKind;
use crate::segmentation::{Segmentation, SegmentationBase, SegmentationType};

/// Ring and sector binning of the global XY position.
///
/// `position` returns the cell centre in the plane `z = 0`.
#[derive(Debug)]
pub struct PolarGridRPhi2 {
    base: SegmentationBase,
    r_values: Vec<f64>,
    phi_values: Vec<f64>,
    offset_r: f64,
    offset_phi: f64,
    r_id: String,
    phi_id: String,
}

impl PolarGridRPhi2 {
    /// Ring edges in ascending order.
    pub fn grid_r_values(&self) -> &[f64] {
        &self.r_values
    }

    /// Sector width of each ring.
    pub fn grid_phi_values(&self) -> &[f64] {
        &self.phi_values
    }

    /// Lower edge of the first phi sector.
    pub fn offset_phi(&self) -> f64 {
        self.offset_phi
    }

    /// Sector width of `ring`.
    fn phi_size(&self, ring: i64) -> Result<f64> {
        usize::try_from(ring)
            .ok()
            .and_then(|i| self.phi_values.get(i))
            .copied()
            .ok_or_else(|| Error::InvalidParameter {
                name: "grid_phi_values".to_string(),
                reason: format!(
                    "no phi width for ring {ring}, {} configured",
                    self.phi_values.len()
                ),
            })
    }

    /// Transverse radius of the cell centre.
    ///
    /// # Errors
    /// Fails if the r field is missing or the ring is not configured.
    pub fn r(&self, cell_id: CellId) -> Result<f64> {
        let ring = self.base.get(cell_id, &self.r_id)?;
        bin_to_position_boundaries(ring, &self.r_values, self.offset_r)
    }

    /// Azimuth of the cell centre.
    ///
    /// # Errors
    /// Fails if a field is missing or the ring has no phi width.
    pub fn phi(&self, cell_id: CellId) -> Result<f64> {
        let ring = self.base.get(cell_id, &self.r_id)?;
        let sector = self.base.get(cell_id, &self.phi_id)?;
        let size = self.phi_size(ring)?;
        let phi = bin_to_position(sector, size, self.offset_phi + 0.5 * size);
        Ok(if phi < self.offset_phi { phi + TAU } else { phi })
    }
}

fn validate_edges(edges: &[f64]) -> Result<()> {
    // empty means not configured yet
    if edges.is_empty() {
        return Ok(());
    }
    let reason = if edges.len() < 2 {
        Some("at least two ring edges are needed".to_string())
    } else if edges.iter().any(|e| !e.is_finite()) {
        Some("ring edges must be finite".to_string())
    } else {
        edges
            .windows(2)
            .find(|w| w[1] <= w[0])
            .map(|w| format!("ring edges must ascend, got {} then {}", w[0], w[1]))
    };
    match reason {
        Some(reason) => Err(Error::InvalidParameter {
            name: "grid_r_values".to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

fn validate_widths(widths: &[f64]) -> Result<()> {
    match widths.iter().find(|w| !(w.is_finite() && **w > MIN_CELL_SIZE)) {
        Some(w) => Err(Error::InvalidParameter {
            name: "grid_phi_values".to_string(),
            reason: format!("phi width must be > {MIN_CELL_SIZE}, got {w}"),
        }),
        None => Ok(()),
    }
}

impl SegmentationType for PolarGridRPhi2 {
    const TYPE_NAME: &'static str = "PolarGridRPhi2";
    const DESCRIPTION: &'static str =
        "Polar RPhi segmentation with variable ring widths in the global coordinates";

    fn from_base(mut base: SegmentationBase) -> Result<Self> {
        base.register_parameter(
            "grid_r_values",
            "Ring edges in R",
            Vec::<f64>::new(),
            UnitKind::Length,
            false,
        );
        base.register_parameter(
            "grid_phi_values",
            "Phi cell size per ring",
            Vec::<f64>::new(),
            UnitKind::Angle,
            false,
        );
        base.register_parameter("offset_r", "Offset in R", 0.0, UnitKind::Length, true);
        base.register_parameter("offset_phi", "Angular offset in phi", 0.0, UnitKind::Angle, true);
        base.register_identifier("identifier_r", "Cell ID identifier for R", "r");
        base.register_identifier("identifier_phi", "Cell ID identifier for phi", "phi");

        let mut grid = Self {
            base,
            r_values: Vec::new(),
            phi_values: Vec::new(),
            offset_r: 0.0,
            offset_phi: 0.0,
            r_id: String::new(),
            phi_id: String::new(),
        };
        grid.refresh()?;
        Ok(grid)
    }
}

impl Segmentation for PolarGridRPhi2 {
    fn base(&self) -> &SegmentationBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut SegmentationBase {
        &mut self.base
    }

    fn refresh(&mut self) -> Result<()> {
        let params = self.base.parameters();
        let r_values = params.doubles("grid_r_values")?.to_vec();
        validate_edges(&r_values)?;
        let phi_values = params.doubles("grid_phi_values")?.to_vec();
        validate_widths(&phi_values)?;
        let offset_r = params.double("offset_r")?;
        let offset_phi = params.double("offset_phi")?;
        let r_id = params.text("identifier_r")?.to_string();
        let phi_id = params.text("identifier_phi")?.to_string();

        self.r_values = r_values;
        self.phi_values = phi_values;
        self.offset_r = offset_r;
        self.offset_phi = offset_phi;
        self.r_id = r_id;
        self.phi_id = phi_id;
        Ok(())
    }

    fn position(&self, cell_id: CellId) -> Result<Vector3D> {
        let r = self.r(cell_id)?;
        let phi = self.phi(cell_id)?;
        Ok(Vector3D::new(r * phi.cos(), r * phi.sin(), 0.0))
    }

    fn cell_id(&self, _local: &Vector3D, global: &Vector3D, volume_id: VolumeId) -> Result<CellId> {
        let mut phi = global.phi();
        if phi < self.offset_phi {
            phi += TAU;
        }
        let r = (global.x * global.x + global.y * global.y).sqrt();

        let ring = position_to_bin_boundaries(r, &self.r_values, self.offset_r)?;
        let size = self.phi_size(ring)?;
        let sector = position_to_bin(phi, size, self.offset_phi + 0.5 * size)?;

        let mut cell_id = volume_id;
        self.base.set(&mut cell_id, &self.r_id, ring)?;
        self.base.set(&mut cell_id, &self.phi_id, sector)?;
        Ok(cell_id)
    }

    /// Ring width and arc length of the sector at the ring centre.
    fn cell_dimensions(&self, cell_id: CellId) -> Result<Vec<f64>> {
        let ring = self.base.get(cell_id, &self.r_id)?;
        let edges = usize::try_from(ring)
            .ok()
            .and_then(|i| self.r_values.get(i..i + 2));
        let Some(&[low, high]) = edges else {
            return Err(Error::InvalidParameter {
                name: "grid_r_values".to_string(),
                reason: format!("ring {ring} outside {} edges", self.r_values.len()),
            });
        };
        let centre = (low + high) * 0.5 + self.offset_r;
        Ok(vec![high - low, centre * self.phi_size(ring)?])
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
