//! Cartesian grid segmentations (XY, XZ, YZ, XYZ).
//!
//! Each axis is binned independently with [`position_to_bin`] /
//! [`bin_to_position`] on the local position; orientation never matters.

use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::marker::PhantomData;

use rustseg_core::{CellId, Vector3D, VolumeId};

use crate::binning::{bin_to_position, position_to_bin, validate_cell_size};
use crate::error::Result;
use crate::parameter::UnitKind;
use crate::segmentation::{identifier_neighbours, Segmentation, SegmentationBase, SegmentationType};

/// A Cartesian axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// Parameter names `(grid_size, offset, identifier)` and default field name.
    fn keys(self) -> (&'static str, &'static str, &'static str, &'static str) {
        match self {
            Axis::X => ("grid_size_x", "offset_x", "identifier_x", "x"),
            Axis::Y => ("grid_size_y", "offset_y", "identifier_y", "y"),
            Axis::Z => ("grid_size_z", "offset_z", "identifier_z", "z"),
        }
    }

    fn label(self) -> &'static str {
        self.keys().3
    }

    /// Component of `v` along this axis.
    #[inline]
    pub fn component(self, v: &Vector3D) -> f64 {
        match self {
            Axis::X => v.x,
            Axis::Y => v.y,
            Axis::Z => v.z,
        }
    }

    #[inline]
    fn set_component(self, v: &mut Vector3D, value: f64) {
        match self {
            Axis::X => v.x = value,
            Axis::Y => v.y = value,
            Axis::Z => v.z = value,
        }
    }
}

/// Selects the binned axes of a [`CartesianGrid`].
pub trait GridLayout: Send + Sync + fmt::Debug + 'static {
    /// Registered type name.
    const TYPE_NAME: &'static str;
    /// One-line description.
    const DESCRIPTION: &'static str;
    /// Binned axes in encoding order.
    const AXES: &'static [Axis];
}

/// Layout binning local X and Y.
#[derive(Debug, Clone, Copy)]
pub struct Xy;

/// Layout binning local X and Z.
#[derive(Debug, Clone, Copy)]
pub struct Xz;

/// Layout binning local Y and Z.
#[derive(Debug, Clone, Copy)]
pub struct Yz;

/// Layout binning local X, Y and Z.
#[derive(Debug, Clone, Copy)]
pub struct Xyz;

impl GridLayout for Xy {
    const TYPE_NAME: &'static str = "CartesianGridXY";
    const DESCRIPTION: &'static str = "Cartesian segmentation in the local XY-plane";
    const AXES: &'static [Axis] = &[Axis::X, Axis::Y];
}

impl GridLayout for Xz {
    const TYPE_NAME: &'static str = "CartesianGridXZ";
    const DESCRIPTION: &'static str = "Cartesian segmentation in the local XZ-plane";
    const AXES: &'static [Axis] = &[Axis::X, Axis::Z];
}

impl GridLayout for Yz {
    const TYPE_NAME: &'static str = "CartesianGridYZ";
    const DESCRIPTION: &'static str = "Cartesian segmentation in the local YZ-plane";
    const AXES: &'static [Axis] = &[Axis::Y, Axis::Z];
}

impl GridLayout for Xyz {
    const TYPE_NAME: &'static str = "CartesianGridXYZ";
    const DESCRIPTION: &'static str = "Cartesian segmentation in the local coordinates";
    const AXES: &'static [Axis] = &[Axis::X, Axis::Y, Axis::Z];
}

/// Segmentation in the local XY-plane.
pub type CartesianGridXY = CartesianGrid<Xy>;
/// Segmentation in the local XZ-plane.
pub type CartesianGridXZ = CartesianGrid<Xz>;
/// Segmentation in the local YZ-plane.
pub type CartesianGridYZ = CartesianGrid<Yz>;
/// Segmentation in all three local coordinates.
pub type CartesianGridXYZ = CartesianGrid<Xyz>;

#[derive(Debug, Clone)]
struct AxisBinning {
    axis: Axis,
    grid_size: f64,
    offset: f64,
    field: String,
}

/// Uniform grid over the axes selected by `L`.
#[derive(Debug)]
pub struct CartesianGrid<L: GridLayout> {
    base: SegmentationBase,
    axes: Vec<AxisBinning>,
    _layout: PhantomData<L>,
}

impl<L: GridLayout> CartesianGrid<L> {
    fn binning(&self, axis: Axis) -> Option<&AxisBinning> {
        self.axes.iter().find(|b| b.axis == axis)
    }

    /// Cell size along `axis`, if binned.
    pub fn grid_size(&self, axis: Axis) -> Option<f64> {
        self.binning(axis).map(|b| b.grid_size)
    }

    /// Position of bin zero along `axis`, if binned.
    pub fn offset(&self, axis: Axis) -> Option<f64> {
        self.binning(axis).map(|b| b.offset)
    }

    /// Field encoding `axis`, if binned.
    pub fn field_name(&self, axis: Axis) -> Option<&str> {
        self.binning(axis).map(|b| b.field.as_str())
    }

    /// Sets the cell size along `axis`.
    ///
    /// # Errors
    /// Fails if the axis is not binned or the size is not positive.
    pub fn set_grid_size(&mut self, axis: Axis, size: f64) -> Result<()> {
        self.set_parameter(axis.keys().0, size.into())
    }

    /// Sets the offset along `axis`.
    ///
    /// # Errors
    /// Fails if the axis is not binned.
    pub fn set_offset(&mut self, axis: Axis, offset: f64) -> Result<()> {
        self.set_parameter(axis.keys().1, offset.into())
    }
}

impl<L: GridLayout> SegmentationType for CartesianGrid<L> {
    const TYPE_NAME: &'static str = L::TYPE_NAME;
    const DESCRIPTION: &'static str = L::DESCRIPTION;

    fn from_base(mut base: SegmentationBase) -> Result<Self> {
        for &axis in L::AXES {
            let (size_key, offset_key, id_key, field) = axis.keys();
            let label = axis.label().to_uppercase();
            base.register_parameter(
                size_key,
                &format!("Cell size in {label}"),
                1.0,
                UnitKind::Length,
                false,
            );
            base.register_parameter(
                offset_key,
                &format!("Cell offset in {label}"),
                0.0,
                UnitKind::Length,
                true,
            );
            base.register_identifier(id_key, &format!("Cell ID identifier for {label}"), field);
        }

        let mut grid = Self {
            base,
            axes: Vec::with_capacity(L::AXES.len()),
            _layout: PhantomData,
        };
        grid.refresh()?;
        Ok(grid)
    }
}

impl<L: GridLayout> Segmentation for CartesianGrid<L> {
    fn base(&self) -> &SegmentationBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut SegmentationBase {
        &mut self.base
    }

    fn refresh(&mut self) -> Result<()> {
        let params = self.base.parameters();
        let mut axes = Vec::with_capacity(L::AXES.len());
        for &axis in L::AXES {
            let (size_key, offset_key, id_key, _) = axis.keys();
            let grid_size = params.double(size_key)?;
            validate_cell_size(size_key, grid_size)?;
            axes.push(AxisBinning {
                axis,
                grid_size,
                offset: params.double(offset_key)?,
                field: params.text(id_key)?.to_string(),
            });
        }
        self.axes = axes;
        Ok(())
    }

    fn position(&self, cell_id: CellId) -> Result<Vector3D> {
        let mut position = Vector3D::default();
        for b in &self.axes {
            let bin = self.base.get(cell_id, &b.field)?;
            b.axis
                .set_component(&mut position, bin_to_position(bin, b.grid_size, b.offset));
        }
        Ok(position)
    }

    fn cell_id(&self, local: &Vector3D, _global: &Vector3D, volume_id: VolumeId) -> Result<CellId> {
        let mut cell_id = volume_id;
        for b in &self.axes {
            let bin = position_to_bin(b.axis.component(local), b.grid_size, b.offset)?;
            self.base.set(&mut cell_id, &b.field, bin)?;
        }
        Ok(cell_id)
    }

    fn cell_dimensions(&self, _cell_id: CellId) -> Result<Vec<f64>> {
        Ok(self.axes.iter().map(|b| b.grid_size).collect())
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::parameter::ParameterValue;
    use approx::assert_abs_diff_eq;

    const DESCRIPTOR: &str = "system:8,barrel:3,layer:8,slice:5,x:32:-16,y:-16";

    #[test]
    fn test_quantization_is_deterministic() {
        let mut grid = CartesianGridXY::new(DESCRIPTOR).unwrap();
        grid.set_grid_size(Axis::X, 10.0).unwrap();
        grid.set_grid_size(Axis::Y, 10.0).unwrap();

        let local = Vector3D::new(24.9, -24.9, 3.0);
        let id = grid.cell_id(&local, &local, 0).unwrap();
        assert_eq!(grid.decoder().get(id, "x").unwrap(), 2);
        assert_eq!(grid.decoder().get(id, "y").unwrap(), -2);

        let p = grid.position(id).unwrap();
        assert_eq!(p.x, 20.0);
        assert_eq!(p.y, -20.0);
        assert_eq!(p.z, 0.0);
    }

    #[test]
    fn test_non_finite_hit_rejected() {
        let grid = CartesianGridXY::new(DESCRIPTOR).unwrap();
        for local in [
            Vector3D::new(f64::NAN, f64::NAN, 0.0),
            Vector3D::new(1.0, f64::INFINITY, 0.0),
        ] {
            assert!(matches!(
                grid.cell_id(&local, &local, 0),
                Err(Error::InvalidPosition { .. })
            ));
        }
    }

    #[test]
    fn test_volume_bits_preserved() {
        let grid = CartesianGridXY::new(DESCRIPTOR).unwrap();
        let coder = grid.decoder();
        let vid = coder
            .encode(0, &[("system", 12), ("barrel", 2), ("layer", 30)])
            .unwrap();
        let id = grid
            .cell_id(&Vector3D::new(-3.2, 7.6, 0.0), &Vector3D::default(), vid)
            .unwrap();
        assert_eq!(coder.get(id, "layer").unwrap(), 30);
        assert_eq!(coder.get(id, "x").unwrap(), -3);
        assert_eq!(coder.get(id, "y").unwrap(), 8);
        assert_eq!(grid.volume_id(id).unwrap(), vid);
    }

    #[test]
    fn test_offsets_and_dimensions() {
        let mut grid = CartesianGridXYZ::new("x:-8,y:-8,z:-8").unwrap();
        grid.apply_parameters(vec![
            ("grid_size_x".into(), 2.0.into()),
            ("grid_size_y".into(), 3.0.into()),
            ("grid_size_z".into(), 4.0.into()),
            ("offset_z".into(), 1.0.into()),
        ])
        .unwrap();

        let local = Vector3D::new(1.1, -4.4, 9.2);
        let id = grid.cell_id(&local, &local, 0).unwrap();
        let p = grid.position(id).unwrap();
        assert_abs_diff_eq!(p.x, 2.0);
        assert_abs_diff_eq!(p.y, -3.0);
        assert_abs_diff_eq!(p.z, 9.0);
        assert_eq!(grid.cell_dimensions(id).unwrap(), vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_xz_leaves_y_untouched() {
        let grid = CartesianGridXZ::new("x:-8,z:-8").unwrap();
        let local = Vector3D::new(3.0, 99.0, -2.0);
        let id = grid.cell_id(&local, &local, 0).unwrap();
        let p = grid.position(id).unwrap();
        assert_eq!((p.x, p.y, p.z), (3.0, 0.0, -2.0));
        assert_eq!(grid.grid_size(Axis::Y), None);
        assert_eq!(grid.type_name(), "CartesianGridXZ");
    }

    #[test]
    fn test_invalid_grid_size_rolls_back() {
        let mut grid = CartesianGridYZ::new("y:-8,z:-8").unwrap();
        grid.set_grid_size(Axis::Y, 5.0).unwrap();
        let err = grid.set_grid_size(Axis::Y, 0.0).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { .. }));
        assert_eq!(grid.grid_size(Axis::Y), Some(5.0));
        assert_eq!(
            grid.parameter("grid_size_y").unwrap().value(),
            &ParameterValue::Double(5.0)
        );
    }

    #[test]
    fn test_unknown_parameter() {
        let mut grid = CartesianGridXY::new("x:-8,y:-8").unwrap();
        assert!(matches!(
            grid.set_parameter("grid_size_z", 1.0.into()),
            Err(Error::UnknownParameter { .. })
        ));
        assert!(grid.parameter("grid_size_z").is_err());
    }

    #[test]
    fn test_retargeted_identifier() {
        let mut grid = CartesianGridXY::new("layer:8,cellX:-8,cellY:-8").unwrap();
        assert!(grid
            .cell_id(&Vector3D::default(), &Vector3D::default(), 0)
            .is_err());
        grid.apply_parameters(vec![
            ("identifier_x".into(), "cellX".into()),
            ("identifier_y".into(), "cellY".into()),
        ])
        .unwrap();
        let local = Vector3D::new(2.0, -1.0, 0.0);
        let id = grid.cell_id(&local, &local, 0).unwrap();
        assert_eq!(grid.decoder().get(id, "cellX").unwrap(), 2);
        assert_eq!(grid.field_name(Axis::X), Some("cellX"));
    }

    #[test]
    fn test_out_of_range_bin_is_an_error() {
        let grid = CartesianGridXY::new("x:4,y:4").unwrap();
        let local = Vector3D::new(-1.0, 0.0, 0.0);
        assert!(matches!(
            grid.cell_id(&local, &local, 0),
            Err(Error::Codec(rustseg_core::Error::ValueOutOfRange { .. }))
        ));
    }

    #[test]
    fn test_neighbours() {
        let grid = CartesianGridXY::new("x:-8,y:-8").unwrap();
        let id = grid.decoder().encode(0, &[("x", 1), ("y", 1)]).unwrap();
        let n = grid.neighbours(id).unwrap();
        assert_eq!(n.len(), 4);
        for c in n {
            let p = grid.position(c).unwrap();
            assert_abs_diff_eq!((p.x - 1.0).abs() + (p.y - 1.0).abs(), 1.0);
        }
    }
}
