//! Layers of megatiles divided into square cells or strips.
//!
//! Each layer uses one topology picked cyclically from
//! `layer_configuration`:
//!
//! - `S`: square cells of `(megatile - 2 * deadWidth) / layer_nCells`
//! - `T`: transverse strips, narrow in X
//! - `L`: longitudinal strips, narrow in Y
//!
//! Positions are local to the wafer, whose half-sizes come from a
//! `(layer, wafer)` table. On a regulating wafer the width is not a whole
//! number of strips; the incomplete last strip is merged into its
//! neighbour. Endcap modules swap the roles of X and Y.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::similar_names
)]

use std::any::Any;

use log::{debug, warn};
use rustseg_core::{CellId, Vector3D, VolumeId};

use crate::binning::{floor_to_bin, MIN_CELL_SIZE};
use crate::error::{Error, Result};
use crate::parameter::UnitKind;
use crate::region::RegionTable;
use crate::segmentation::{Segmentation, SegmentationBase, SegmentationType};

/// Positions beyond this distance from the wafer centre are reported.
const IMPLAUSIBLE_POSITION: f64 = 10_000.0;

/// Relative tolerance for a cell starting on the upper wafer edge.
const UPPER_EDGE_TOLERANCE: f64 = 1e-12;

/// Strips this much longer than wide are subject to regulation.
const STRIP_ASPECT: f64 = 1.5;

/// Index encoded for hits in the dead area around a wafer.
pub const DEAD_AREA_INDEX: i64 = -1;

/// Cell topology of a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    /// Square cells.
    Square,
    /// Strips narrow in X.
    Transverse,
    /// Strips narrow in Y.
    Longitudinal,
}

impl LayerKind {
    fn from_char(c: char) -> Option<Self> {
        match c {
            'S' => Some(LayerKind::Square),
            'T' => Some(LayerKind::Transverse),
            'L' => Some(LayerKind::Longitudinal),
            _ => None,
        }
    }
}

/// Active extent of one wafer.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MegatileWafer {
    /// Half of the active width along X.
    pub half_x: f64,
    /// Half of the active width along Y.
    pub half_y: f64,
    /// Width along the strip direction is not a whole number of strips.
    pub regulating: bool,
}

/// Cell sizes derived from the megatile parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
struct CellSizes {
    strip_length: f64,
    strip_width: f64,
    square: f64,
}

/// Megatile strip/square layer segmentation in the local XY-plane.
#[derive(Debug)]
pub struct MegatileLayerGridXY {
    base: SegmentationBase,
    layers: Vec<LayerKind>,
    sizes: Option<CellSizes>,
    endcap_threshold: i64,
    x_id: String,
    y_id: String,
    layer_id: String,
    wafer_id: String,
    module_id: String,
    wafers: RegionTable<MegatileWafer>,
}

/// Cell geometry resolved for one `(module, layer, wafer)`.
#[derive(Debug, Clone, Copy)]
struct Tile {
    wafer: MegatileWafer,
    cell_x: f64,
    cell_y: f64,
    endcap: bool,
}

impl Tile {
    /// Number of strips fitting along `half` when the axis is regulated.
    fn regulated_strips(&self, half: f64, along: f64, across: f64) -> Option<i64> {
        (self.wafer.regulating && along > across * STRIP_ASPECT).then(|| (2.0 * half / along) as i64)
    }

    /// Strip count of the merged axis, `(count, is_x_axis)`.
    fn regulation(&self) -> Option<(i64, bool)> {
        if self.endcap {
            self.regulated_strips(self.wafer.half_y, self.cell_y, self.cell_x)
                .map(|n| (n, false))
        } else {
            self.regulated_strips(self.wafer.half_x, self.cell_x, self.cell_y)
                .map(|n| (n, true))
        }
    }
}

/// Cell index at `distance` from the lower wafer edge of a wafer `width` wide.
///
/// A hit on the upper edge belongs to the last cell that starts inside
/// the wafer.
fn bin_from_edge(distance: f64, width: f64, size: f64) -> Result<i64> {
    let bin = floor_to_bin(distance / size, distance)?;
    if bin > 0 && bin as f64 * size >= width * (1.0 - UPPER_EDGE_TOLERANCE) {
        Ok(bin - 1)
    } else {
        Ok(bin)
    }
}

fn centre_from_edge(index: i64, half: f64, size: f64, merged: Option<i64>) -> f64 {
    let from_edge = match merged {
        Some(n) if index == n - 1 => {
            let full = (n - 1) as f64 * size;
            full + (2.0 * half - full) / 2.0
        }
        _ => (index as f64 + 0.5) * size,
    };
    from_edge - half
}

impl MegatileLayerGridXY {
    /// Topology of `layer`.
    pub fn layer_kind(&self, layer: i64) -> LayerKind {
        let n = self.layers.len() as i64;
        self.layers[layer.rem_euclid(n) as usize]
    }

    /// Stores the active extent of `(layer, wafer)`.
    ///
    /// # Errors
    /// Fails if either index lies outside the wafer table.
    pub fn set_wafer(&mut self, layer: i64, wafer: i64, entry: MegatileWafer) -> Result<()> {
        self.wafers.insert(layer, wafer, entry)?;
        Ok(())
    }

    /// Active extent of `(layer, wafer)`, if configured.
    ///
    /// # Errors
    /// Fails if either index lies outside the wafer table.
    pub fn wafer(&self, layer: i64, wafer: i64) -> Result<Option<MegatileWafer>> {
        Ok(self.wafers.get(layer, wafer)?.copied())
    }

    /// True if `module` is an endcap module.
    pub fn is_endcap(&self, module: i64) -> bool {
        module >= self.endcap_threshold
    }

    fn sizes(&self) -> Result<CellSizes> {
        self.sizes.ok_or_else(|| Error::InvalidParameter {
            name: "total_size_y".to_string(),
            reason: "megatile size is not configured".to_string(),
        })
    }

    /// Cell size `(x, y)` of a barrel layer.
    ///
    /// # Errors
    /// Fails if `total_size_y` was never set.
    pub fn layer_cell_dimensions(&self, layer: i64) -> Result<(f64, f64)> {
        let s = self.sizes()?;
        Ok(match self.layer_kind(layer) {
            LayerKind::Square => (s.square, s.square),
            LayerKind::Transverse => (s.strip_width, s.strip_length),
            LayerKind::Longitudinal => (s.strip_length, s.strip_width),
        })
    }

    fn module(&self, id: u64) -> Result<i64> {
        if self.base.decoder().contains(&self.module_id) {
            self.base.get(id, &self.module_id)
        } else {
            Ok(0)
        }
    }

    fn tile(&self, id: u64) -> Result<(Tile, i64, i64)> {
        let layer = self.base.get(id, &self.layer_id)?;
        let wafer = self.base.get(id, &self.wafer_id)?;
        let endcap = self.is_endcap(self.module(id)?);

        let (mut cell_x, mut cell_y) = self.layer_cell_dimensions(layer)?;
        if endcap {
            std::mem::swap(&mut cell_x, &mut cell_y);
        }
        let tile = Tile {
            wafer: *self.wafers.require(layer, wafer)?,
            cell_x,
            cell_y,
            endcap,
        };
        Ok((tile, layer, wafer))
    }
}

impl SegmentationType for MegatileLayerGridXY {
    const TYPE_NAME: &'static str = "MegatileLayerGridXY";
    const DESCRIPTION: &'static str =
        "Cartesian segmentation in the local XY-plane: megatiles with dead areas; integer number of megatiles and cells";

    fn from_base(mut base: SegmentationBase) -> Result<Self> {
        base.register_parameter("nMegaY", "number of megatiles along Z", 1i64, UnitKind::None, true);
        base.register_parameter("layer_nCells", "division of megatile into square tiles", 36i64, UnitKind::None, true);
        base.register_parameter("layer_nStripsX", "division of megatile into strips (1)", 4i64, UnitKind::None, true);
        base.register_parameter("layer_nStripsY", "division of megatile into strips (2)", 36i64, UnitKind::None, true);
        base.register_parameter("deadWidth", "width of dead region at edge of megatile", 0.0, UnitKind::Length, true);
        base.register_parameter("total_size_y", "total size of the layer along Y", 0.0, UnitKind::Length, true);
        base.register_parameter("layer_configuration", "layer configuration (S, T, L)", "TLS", UnitKind::None, true);
        base.register_identifier("identifier_x", "Cell ID identifier for X", "cellX");
        base.register_identifier("identifier_y", "Cell ID identifier for Y", "cellY");
        base.register_parameter("identifier_wafer", "Cell encoding identifier for wafer", "wafer", UnitKind::None, true);
        base.register_parameter("identifier_layer", "Cell encoding identifier for layer", "layer", UnitKind::None, true);
        base.register_parameter("identifier_module", "Cell encoding identifier for module", "module", UnitKind::None, true);
        base.register_parameter(
            "endcap_module_threshold",
            "lowest module index of the endcaps",
            6i64,
            UnitKind::None,
            true,
        );

        let mut grid = Self {
            base,
            layers: Vec::new(),
            sizes: None,
            endcap_threshold: 6,
            x_id: String::new(),
            y_id: String::new(),
            layer_id: String::new(),
            wafer_id: String::new(),
            module_id: String::new(),
            wafers: RegionTable::new(),
        };
        grid.refresh()?;
        Ok(grid)
    }
}

fn positive_count(name: &str, value: i64) -> Result<f64> {
    if value > 0 {
        Ok(value as f64)
    } else {
        Err(Error::InvalidParameter {
            name: name.to_string(),
            reason: format!("must be positive, got {value}"),
        })
    }
}

impl Segmentation for MegatileLayerGridXY {
    fn base(&self) -> &SegmentationBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut SegmentationBase {
        &mut self.base
    }

    fn refresh(&mut self) -> Result<()> {
        let params = self.base.parameters();

        let config = params.text("layer_configuration")?;
        let layers = config
            .chars()
            .map(LayerKind::from_char)
            .collect::<Option<Vec<_>>>()
            .filter(|l| !l.is_empty())
            .ok_or_else(|| Error::InvalidParameter {
                name: "layer_configuration".to_string(),
                reason: format!("expected a non-empty string of S, T and L, got '{config}'"),
            })?;

        let n_mega = positive_count("nMegaY", params.int("nMegaY")?)?;
        let n_cells = positive_count("layer_nCells", params.int("layer_nCells")?)?;
        let n_strips_x = positive_count("layer_nStripsX", params.int("layer_nStripsX")?)?;
        let n_strips_y = positive_count("layer_nStripsY", params.int("layer_nStripsY")?)?;
        let dead_width = params.double("deadWidth")?;
        let total_size_y = params.double("total_size_y")?;
        if dead_width < 0.0 {
            return Err(Error::InvalidParameter {
                name: "deadWidth".to_string(),
                reason: format!("must not be negative, got {dead_width}"),
            });
        }

        // total_size_y == 0 means the layer size is not known yet
        let sizes = if total_size_y == 0.0 {
            None
        } else {
            let mega_size = total_size_y / n_mega;
            let active = mega_size - 2.0 * dead_width;
            if active <= MIN_CELL_SIZE {
                return Err(Error::InvalidParameter {
                    name: "total_size_y".to_string(),
                    reason: format!(
                        "megatile of {mega_size} leaves no active area with dead width {dead_width}"
                    ),
                });
            }
            let sizes = CellSizes {
                strip_length: active / n_strips_x,
                strip_width: active / n_strips_y,
                square: active / n_cells,
            };
            debug!(
                "{}: megatile {mega_size}, dead width {dead_width}, strips {} x {}, square {}",
                self.base.name(),
                sizes.strip_length,
                sizes.strip_width,
                sizes.square
            );
            Some(sizes)
        };

        let endcap_threshold = params.int("endcap_module_threshold")?;
        let x_id = params.text("identifier_x")?.to_string();
        let y_id = params.text("identifier_y")?.to_string();
        let layer_id = params.text("identifier_layer")?.to_string();
        let wafer_id = params.text("identifier_wafer")?.to_string();
        let module_id = params.text("identifier_module")?.to_string();

        self.layers = layers;
        self.sizes = sizes;
        self.endcap_threshold = endcap_threshold;
        self.x_id = x_id;
        self.y_id = y_id;
        self.layer_id = layer_id;
        self.wafer_id = wafer_id;
        self.module_id = module_id;
        Ok(())
    }

    fn position(&self, cell_id: CellId) -> Result<Vector3D> {
        let (tile, layer, wafer) = self.tile(cell_id)?;
        let ix = self.base.get(cell_id, &self.x_id)?;
        let iy = self.base.get(cell_id, &self.y_id)?;

        let (merge_x, merge_y) = match tile.regulation() {
            Some((n, true)) => (Some(n), None),
            Some((n, false)) => (None, Some(n)),
            None => (None, None),
        };
        let x = centre_from_edge(ix, tile.wafer.half_x, tile.cell_x, merge_x);
        let y = centre_from_edge(iy, tile.wafer.half_y, tile.cell_y, merge_y);

        if x.abs() > IMPLAUSIBLE_POSITION || y.abs() > IMPLAUSIBLE_POSITION {
            warn!(
                "{}: implausible cell position ({x}, {y}) for layer {layer}, wafer {wafer}, cell ({ix}, {iy})",
                self.base.name()
            );
        }
        Ok(Vector3D::new(x, y, 0.0))
    }

    fn cell_id(&self, local: &Vector3D, _global: &Vector3D, volume_id: VolumeId) -> Result<CellId> {
        let (tile, _, _) = self.tile(volume_id)?;
        let MegatileWafer { half_x, half_y, .. } = tile.wafer;

        let (ix, iy) = if local.x < -half_x || local.x > half_x || local.y < -half_y || local.y > half_y {
            (DEAD_AREA_INDEX, DEAD_AREA_INDEX)
        } else {
            let mut ix = bin_from_edge(local.x + half_x, 2.0 * half_x, tile.cell_x)?;
            let mut iy = bin_from_edge(local.y + half_y, 2.0 * half_y, tile.cell_y)?;
            match tile.regulation() {
                Some((n, true)) if ix > n - 1 => ix -= 1,
                Some((n, false)) if iy > n - 1 => iy -= 1,
                _ => {}
            }
            (ix, iy)
        };

        let mut cell_id = volume_id;
        self.base.set(&mut cell_id, &self.x_id, ix)?;
        self.base.set(&mut cell_id, &self.y_id, iy)?;
        Ok(cell_id)
    }

    fn cell_dimensions(&self, cell_id: CellId) -> Result<Vec<f64>> {
        let layer = self.base.get(cell_id, &self.layer_id)?;
        let (x, y) = self.layer_cell_dimensions(layer)?;
        if self.is_endcap(self.module(cell_id)?) {
            Ok(vec![y, x])
        } else {
            Ok(vec![x, y])
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
