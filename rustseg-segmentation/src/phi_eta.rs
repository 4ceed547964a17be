//! Segmentations in pseudorapidity and azimuth, optionally binned in radius.
//!
//! Both variants bin the global position: eta in uniform steps of
//! `grid_size_eta`, phi in `phi_bins` equal sectors starting at `offset_phi`.
//! Decoded azimuths are normalized to `[-pi, pi)`.
#![allow(clippy::cast_precision_loss)]

use std::any::Any;
use std::f64::consts::TAU;

use rustseg_core::{normalize_phi, CellId, Vector3D, VolumeId};

use crate::binning::{bin_to_position, position_to_bin, validate_cell_size};
use crate::error::{Error, Result};
use crate::parameter::{ParameterTable, UnitKind};
use crate::segmentation::{Segmentation, SegmentationBase, SegmentationType};

/// Eta and phi binning shared by [`GridPhiEta`] and [`GridRPhiEta`].
#[derive(Debug, Clone, Default)]
struct EtaPhiBinning {
    grid_size_eta: f64,
    phi_bins: i64,
    offset_eta: f64,
    offset_phi: f64,
    eta_id: String,
    phi_id: String,
}

impl EtaPhiBinning {
    fn register(base: &mut SegmentationBase) {
        base.register_parameter("grid_size_eta", "Cell size in Eta", 1.0, UnitKind::None, false);
        base.register_parameter("phi_bins", "Number of bins phi", 1i64, UnitKind::None, false);
        base.register_parameter("offset_eta", "Angular offset in eta", 0.0, UnitKind::None, true);
        base.register_parameter("offset_phi", "Angular offset in phi", 0.0, UnitKind::Angle, true);
        base.register_identifier("identifier_eta", "Cell ID identifier for eta", "eta");
        base.register_identifier("identifier_phi", "Cell ID identifier for phi", "phi");
    }

    fn from_table(params: &ParameterTable) -> Result<Self> {
        let grid_size_eta = params.double("grid_size_eta")?;
        validate_cell_size("grid_size_eta", grid_size_eta)?;
        let phi_bins = params.int("phi_bins")?;
        if phi_bins <= 0 {
            return Err(Error::InvalidParameter {
                name: "phi_bins".to_string(),
                reason: format!("number of bins must be positive, got {phi_bins}"),
            });
        }
        Ok(Self {
            grid_size_eta,
            phi_bins,
            offset_eta: params.double("offset_eta")?,
            offset_phi: params.double("offset_phi")?,
            eta_id: params.text("identifier_eta")?.to_string(),
            phi_id: params.text("identifier_phi")?.to_string(),
        })
    }

    fn phi_width(&self) -> f64 {
        TAU / self.phi_bins as f64
    }

    fn eta(&self, base: &SegmentationBase, cell_id: CellId) -> Result<f64> {
        let bin = base.get(cell_id, &self.eta_id)?;
        Ok(bin_to_position(bin, self.grid_size_eta, self.offset_eta))
    }

    fn phi(&self, base: &SegmentationBase, cell_id: CellId) -> Result<f64> {
        let bin = base.get(cell_id, &self.phi_id)?;
        Ok(normalize_phi(bin_to_position(bin, self.phi_width(), self.offset_phi)))
    }

    fn encode(&self, base: &SegmentationBase, cell_id: &mut CellId, global: &Vector3D) -> Result<()> {
        let eta_bin = position_to_bin(global.eta(), self.grid_size_eta, self.offset_eta)?;
        let phi_bin =
            position_to_bin(global.phi(), self.phi_width(), self.offset_phi)?.rem_euclid(self.phi_bins);
        base.set(cell_id, &self.eta_id, eta_bin)?;
        base.set(cell_id, &self.phi_id, phi_bin)
    }
}

/// Segmentation in eta and phi of the global position.
///
/// `position` returns the direction of the cell centre at unit transverse
/// radius.
#[derive(Debug)]
pub struct GridPhiEta {
    base: SegmentationBase,
    binning: EtaPhiBinning,
}

impl GridPhiEta {
    /// Cell size in eta.
    pub fn grid_size_eta(&self) -> f64 {
        self.binning.grid_size_eta
    }

    /// Number of sectors in phi.
    pub fn phi_bins(&self) -> i64 {
        self.binning.phi_bins
    }

    /// Eta of bin zero.
    pub fn offset_eta(&self) -> f64 {
        self.binning.offset_eta
    }

    /// Phi of bin zero.
    pub fn offset_phi(&self) -> f64 {
        self.binning.offset_phi
    }

    /// Pseudorapidity of the cell centre.
    ///
    /// # Errors
    /// Fails if the eta field is not part of the coder.
    pub fn eta(&self, cell_id: CellId) -> Result<f64> {
        self.binning.eta(&self.base, cell_id)
    }

    /// Azimuth of the cell centre in `[-pi, pi)`.
    ///
    /// # Errors
    /// Fails if the phi field is not part of the coder.
    pub fn phi(&self, cell_id: CellId) -> Result<f64> {
        self.binning.phi(&self.base, cell_id)
    }
}

impl SegmentationType for GridPhiEta {
    const TYPE_NAME: &'static str = "GridPhiEta";
    const DESCRIPTION: &'static str = "Phi-eta segmentation in the global coordinates";

    fn from_base(mut base: SegmentationBase) -> Result<Self> {
        EtaPhiBinning::register(&mut base);
        let binning = EtaPhiBinning::from_table(base.parameters())?;
        Ok(Self { base, binning })
    }
}

impl Segmentation for GridPhiEta {
    fn base(&self) -> &SegmentationBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut SegmentationBase {
        &mut self.base
    }

    fn refresh(&mut self) -> Result<()> {
        self.binning = EtaPhiBinning::from_table(self.base.parameters())?;
        Ok(())
    }

    fn position(&self, cell_id: CellId) -> Result<Vector3D> {
        Ok(Vector3D::from_r_eta_phi(1.0, self.eta(cell_id)?, self.phi(cell_id)?))
    }

    fn cell_id(&self, _local: &Vector3D, global: &Vector3D, volume_id: VolumeId) -> Result<CellId> {
        let mut cell_id = volume_id;
        self.binning.encode(&self.base, &mut cell_id, global)?;
        Ok(cell_id)
    }

    fn cell_dimensions(&self, _cell_id: CellId) -> Result<Vec<f64>> {
        Ok(vec![self.binning.grid_size_eta, self.binning.phi_width()])
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Segmentation in transverse radius, eta and phi of the global position.
#[derive(Debug)]
pub struct GridRPhiEta {
    base: SegmentationBase,
    binning: EtaPhiBinning,
    grid_size_r: f64,
    offset_r: f64,
    r_id: String,
}

impl GridRPhiEta {
    /// Cell size in transverse radius.
    pub fn grid_size_r(&self) -> f64 {
        self.grid_size_r
    }

    /// Radius of bin zero.
    pub fn offset_r(&self) -> f64 {
        self.offset_r
    }

    /// Cell size in eta.
    pub fn grid_size_eta(&self) -> f64 {
        self.binning.grid_size_eta
    }

    /// Number of sectors in phi.
    pub fn phi_bins(&self) -> i64 {
        self.binning.phi_bins
    }

    /// Pseudorapidity of the cell centre.
    ///
    /// # Errors
    /// Fails if the eta field is not part of the coder.
    pub fn eta(&self, cell_id: CellId) -> Result<f64> {
        self.binning.eta(&self.base, cell_id)
    }

    /// Azimuth of the cell centre in `[-pi, pi)`.
    ///
    /// # Errors
    /// Fails if the phi field is not part of the coder.
    pub fn phi(&self, cell_id: CellId) -> Result<f64> {
        self.binning.phi(&self.base, cell_id)
    }

    /// Transverse radius of the cell centre.
    ///
    /// # Errors
    /// Fails if the r field is not part of the coder.
    pub fn r(&self, cell_id: CellId) -> Result<f64> {
        let bin = self.base.get(cell_id, &self.r_id)?;
        Ok(bin_to_position(bin, self.grid_size_r, self.offset_r))
    }
}

impl SegmentationType for GridRPhiEta {
    const TYPE_NAME: &'static str = "GridRPhiEta";
    const DESCRIPTION: &'static str = "R-phi-eta segmentation in the global coordinates";

    fn from_base(mut base: SegmentationBase) -> Result<Self> {
        EtaPhiBinning::register(&mut base);
        base.register_parameter("grid_size_r", "Cell size in R", 1.0, UnitKind::Length, false);
        base.register_parameter("offset_r", "Offset in R", 0.0, UnitKind::Length, true);
        base.register_identifier("identifier_r", "Cell ID identifier for R", "r");

        let mut grid = Self {
            base,
            binning: EtaPhiBinning::default(),
            grid_size_r: 1.0,
            offset_r: 0.0,
            r_id: String::new(),
        };
        grid.refresh()?;
        Ok(grid)
    }
}

impl Segmentation for GridRPhiEta {
    fn base(&self) -> &SegmentationBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut SegmentationBase {
        &mut self.base
    }

    fn refresh(&mut self) -> Result<()> {
        let params = self.base.parameters();
        let binning = EtaPhiBinning::from_table(params)?;
        let grid_size_r = params.double("grid_size_r")?;
        validate_cell_size("grid_size_r", grid_size_r)?;
        let offset_r = params.double("offset_r")?;
        let r_id = params.text("identifier_r")?.to_string();

        self.binning = binning;
        self.grid_size_r = grid_size_r;
        self.offset_r = offset_r;
        self.r_id = r_id;
        Ok(())
    }

    fn position(&self, cell_id: CellId) -> Result<Vector3D> {
        Ok(Vector3D::from_r_eta_phi(
            self.r(cell_id)?,
            self.eta(cell_id)?,
            self.phi(cell_id)?,
        ))
    }

    fn cell_id(&self, _local: &Vector3D, global: &Vector3D, volume_id: VolumeId) -> Result<CellId> {
        let mut cell_id = volume_id;
        self.binning.encode(&self.base, &mut cell_id, global)?;
        let r_bin = position_to_bin(global.radius_xy(), self.grid_size_r, self.offset_r)?;
        self.base.set(&mut cell_id, &self.r_id, r_bin)?;
        Ok(cell_id)
    }

    fn cell_dimensions(&self, _cell_id: CellId) -> Result<Vec<f64>> {
        Ok(vec![
            self.grid_size_r,
            self.binning.grid_size_eta,
            self.binning.phi_width(),
        ])
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
