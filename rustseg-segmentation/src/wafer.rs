//! Cartesian XY grid displaced per `(group, wafer)`.
#![allow(clippy::similar_names)]

use std::any::Any;
use std::collections::BTreeSet;

use log::debug;
use rustseg_core::{CellId, Vector3D, VolumeId};

use crate::binning::{bin_to_position, position_to_bin, validate_cell_size};
use crate::error::Result;
use crate::parameter::UnitKind;
use crate::region::RegionTable;
use crate::segmentation::{identifier_neighbours, Segmentation, SegmentationBase, SegmentationType};

/// Origin displacement of one wafer.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WaferOffset {
    /// Displacement along local X.
    pub x: f64,
    /// Displacement along local Y.
    pub y: f64,
}

/// XY grid whose origin moves with the wafer a hit belongs to.
///
/// The group and wafer indices are read from the volume bits of the
/// identifier. A pair without a configured offset is not displaced.
#[derive(Debug)]
pub struct WaferGridXY {
    base: SegmentationBase,
    grid_size_x: f64,
    grid_size_y: f64,
    offset_x: f64,
    offset_y: f64,
    x_id: String,
    y_id: String,
    group_id: String,
    wafer_id: String,
    wafer_offsets: RegionTable<WaferOffset>,
}

impl WaferGridXY {
    /// Cell size in X.
    pub fn grid_size_x(&self) -> f64 {
        self.grid_size_x
    }

    /// Cell size in Y.
    pub fn grid_size_y(&self) -> f64 {
        self.grid_size_y
    }

    /// Base offset in X, before the wafer displacement.
    pub fn offset_x(&self) -> f64 {
        self.offset_x
    }

    /// Base offset in Y, before the wafer displacement.
    pub fn offset_y(&self) -> f64 {
        self.offset_y
    }

    /// Sets the X displacement of `(group, wafer)`.
    ///
    /// # Errors
    /// Fails if either index lies outside the offset table.
    pub fn set_wafer_offset_x(&mut self, group: i64, wafer: i64, offset: f64) -> Result<()> {
        self.wafer_offsets.entry(group, wafer)?.x = offset;
        Ok(())
    }

    /// Sets the Y displacement of `(group, wafer)`.
    ///
    /// # Errors
    /// Fails if either index lies outside the offset table.
    pub fn set_wafer_offset_y(&mut self, group: i64, wafer: i64, offset: f64) -> Result<()> {
        self.wafer_offsets.entry(group, wafer)?.y = offset;
        Ok(())
    }

    /// Configured displacement of `(group, wafer)`, if any.
    ///
    /// # Errors
    /// Fails if either index lies outside the offset table.
    pub fn wafer_offset(&self, group: i64, wafer: i64) -> Result<Option<WaferOffset>> {
        Ok(self.wafer_offsets.get(group, wafer)?.copied())
    }

    fn displacement(&self, id: u64) -> Result<WaferOffset> {
        let group = self.base.get(id, &self.group_id)?;
        let wafer = self.base.get(id, &self.wafer_id)?;
        Ok(self.wafer_offset(group, wafer)?.unwrap_or_default())
    }
}

impl SegmentationType for WaferGridXY {
    const TYPE_NAME: &'static str = "WaferGridXY";
    const DESCRIPTION: &'static str = "Cartesian segmentation in the local XY-plane for wafers";

    fn from_base(mut base: SegmentationBase) -> Result<Self> {
        base.register_parameter("grid_size_x", "Cell size in X", 1.0, UnitKind::Length, false);
        base.register_parameter("grid_size_y", "Cell size in Y", 1.0, UnitKind::Length, false);
        base.register_parameter("offset_x", "Cell offset in X", 0.0, UnitKind::Length, true);
        base.register_parameter("offset_y", "Cell offset in Y", 0.0, UnitKind::Length, true);
        base.register_identifier("identifier_x", "Cell ID identifier for X", "x");
        base.register_identifier("identifier_y", "Cell ID identifier for Y", "y");
        base.register_parameter(
            "identifier_groupMGWafer",
            "Cell encoding identifier for Magic Wafer group",
            "layer",
            UnitKind::None,
            true,
        );
        base.register_parameter(
            "identifier_wafer",
            "Cell encoding identifier for Magic Wafer",
            "wafer",
            UnitKind::None,
            true,
        );

        let mut grid = Self {
            base,
            grid_size_x: 1.0,
            grid_size_y: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
            x_id: String::new(),
            y_id: String::new(),
            group_id: String::new(),
            wafer_id: String::new(),
            wafer_offsets: RegionTable::new(),
        };
        grid.refresh()?;
        Ok(grid)
    }
}

impl Segmentation for WaferGridXY {
    fn base(&self) -> &SegmentationBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut SegmentationBase {
        &mut self.base
    }

    fn refresh(&mut self) -> Result<()> {
        let params = self.base.parameters();
        let grid_size_x = params.double("grid_size_x")?;
        validate_cell_size("grid_size_x", grid_size_x)?;
        let grid_size_y = params.double("grid_size_y")?;
        validate_cell_size("grid_size_y", grid_size_y)?;
        let offset_x = params.double("offset_x")?;
        let offset_y = params.double("offset_y")?;
        let x_id = params.text("identifier_x")?.to_string();
        let y_id = params.text("identifier_y")?.to_string();
        let group_id = params.text("identifier_groupMGWafer")?.to_string();
        let wafer_id = params.text("identifier_wafer")?.to_string();

        self.grid_size_x = grid_size_x;
        self.grid_size_y = grid_size_y;
        self.offset_x = offset_x;
        self.offset_y = offset_y;
        self.x_id = x_id;
        self.y_id = y_id;
        self.group_id = group_id;
        self.wafer_id = wafer_id;
        debug!(
            "{}: grid {} x {}, wafers keyed by ({}, {})",
            self.base.name(),
            self.grid_size_x,
            self.grid_size_y,
            self.group_id,
            self.wafer_id
        );
        Ok(())
    }

    fn position(&self, cell_id: CellId) -> Result<Vector3D> {
        let wafer = self.displacement(cell_id)?;
        let x = self.base.get(cell_id, &self.x_id)?;
        let y = self.base.get(cell_id, &self.y_id)?;
        Ok(Vector3D::new(
            bin_to_position(x, self.grid_size_x, self.offset_x + wafer.x),
            bin_to_position(y, self.grid_size_y, self.offset_y + wafer.y),
            0.0,
        ))
    }

    fn cell_id(&self, local: &Vector3D, _global: &Vector3D, volume_id: VolumeId) -> Result<CellId> {
        let wafer = self.displacement(volume_id)?;
        let mut cell_id = volume_id;
        let x = position_to_bin(local.x, self.grid_size_x, self.offset_x + wafer.x)?;
        let y = position_to_bin(local.y, self.grid_size_y, self.offset_y + wafer.y)?;
        self.base.set(&mut cell_id, &self.x_id, x)?;
        self.base.set(&mut cell_id, &self.y_id, y)?;
        Ok(cell_id)
    }

    fn cell_dimensions(&self, _cell_id: CellId) -> Result<Vec<f64>> {
        Ok(vec![self.grid_size_x, self.grid_size_y])
    }

    fn neighbours(&self, cell_id: CellId) -> Result<BTreeSet<CellId>> {
        identifier_neighbours(&self.base, cell_id)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
