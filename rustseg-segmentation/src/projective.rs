//! Projective segmentation in polar angle theta and azimuth phi.
#![allow(clippy::cast_precision_loss)]

use std::any::Any;
use std::f64::consts::{PI, TAU};

use rustseg_core::{wrap_phi, CellId, Vector3D, VolumeId};

use crate::binning::floor_to_bin;
use crate::error::{Error, Result};
use crate::parameter::UnitKind;
use crate::segmentation::{Segmentation, SegmentationBase, SegmentationType};

/// Distance in radians from the upper theta edge still counted as inside.
const THETA_EDGE_TOLERANCE: f64 = 1e-12;

/// Bins the direction of the global position into `theta_bins` x `phi_bins`
/// equal angular cells.
///
/// `position` returns the cell centre direction on the unit sphere; the
/// caller places it at the right radius.
#[derive(Debug)]
pub struct ProjectiveCylinder {
    base: SegmentationBase,
    theta_bins: i64,
    phi_bins: i64,
    offset_theta: f64,
    offset_phi: f64,
    theta_id: String,
    phi_id: String,
}

impl ProjectiveCylinder {
    /// Number of bins in theta.
    pub fn theta_bins(&self) -> i64 {
        self.theta_bins
    }

    /// Number of bins in phi.
    pub fn phi_bins(&self) -> i64 {
        self.phi_bins
    }

    /// Lower edge of the theta range.
    pub fn offset_theta(&self) -> f64 {
        self.offset_theta
    }

    /// Lower edge of the phi range.
    pub fn offset_phi(&self) -> f64 {
        self.offset_phi
    }

    fn theta_width(&self) -> f64 {
        PI / self.theta_bins as f64
    }

    fn phi_width(&self) -> f64 {
        TAU / self.phi_bins as f64
    }

    /// Polar angle of the cell centre.
    ///
    /// # Errors
    /// Fails if the theta field is not part of the coder.
    pub fn theta(&self, cell_id: CellId) -> Result<f64> {
        let index = self.base.get(cell_id, &self.theta_id)?;
        Ok(self.offset_theta + (index as f64 + 0.5) * self.theta_width())
    }

    /// Azimuth of the cell centre.
    ///
    /// # Errors
    /// Fails if the phi field is not part of the coder.
    pub fn phi(&self, cell_id: CellId) -> Result<f64> {
        let index = self.base.get(cell_id, &self.phi_id)?;
        Ok(self.offset_phi + (index as f64 + 0.5) * self.phi_width())
    }
}

fn positive_bins(name: &str, bins: i64) -> Result<i64> {
    if bins > 0 {
        Ok(bins)
    } else {
        Err(Error::InvalidParameter {
            name: name.to_string(),
            reason: format!("number of bins must be positive, got {bins}"),
        })
    }
}

impl SegmentationType for ProjectiveCylinder {
    const TYPE_NAME: &'static str = "ProjectiveCylinder";
    const DESCRIPTION: &'static str = "Projective segmentation in the global coordinates";

    fn from_base(mut base: SegmentationBase) -> Result<Self> {
        base.register_parameter("theta_bins", "Number of bins theta", 1i64, UnitKind::None, false);
        base.register_parameter("phi_bins", "Number of bins phi", 1i64, UnitKind::None, false);
        base.register_parameter("offset_theta", "Angular offset in theta", 0.0, UnitKind::Angle, true);
        base.register_parameter("offset_phi", "Angular offset in phi", 0.0, UnitKind::Angle, true);
        base.register_identifier("identifier_theta", "Cell ID identifier for theta", "theta");
        base.register_identifier("identifier_phi", "Cell ID identifier for phi", "phi");

        let mut segmentation = Self {
            base,
            theta_bins: 1,
            phi_bins: 1,
            offset_theta: 0.0,
            offset_phi: 0.0,
            theta_id: String::new(),
            phi_id: String::new(),
        };
        segmentation.refresh()?;
        Ok(segmentation)
    }
}

impl Segmentation for ProjectiveCylinder {
    fn base(&self) -> &SegmentationBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut SegmentationBase {
        &mut self.base
    }

    fn refresh(&mut self) -> Result<()> {
        let params = self.base.parameters();
        let theta_bins = positive_bins("theta_bins", params.int("theta_bins")?)?;
        let phi_bins = positive_bins("phi_bins", params.int("phi_bins")?)?;
        let offset_theta = params.double("offset_theta")?;
        let offset_phi = params.double("offset_phi")?;
        let theta_id = params.text("identifier_theta")?.to_string();
        let phi_id = params.text("identifier_phi")?.to_string();

        self.theta_bins = theta_bins;
        self.phi_bins = phi_bins;
        self.offset_theta = offset_theta;
        self.offset_phi = offset_phi;
        self.theta_id = theta_id;
        self.phi_id = phi_id;
        Ok(())
    }

    fn position(&self, cell_id: CellId) -> Result<Vector3D> {
        Ok(Vector3D::from_r_theta_phi(
            1.0,
            self.theta(cell_id)?,
            self.phi(cell_id)?,
        ))
    }

    fn cell_id(&self, _local: &Vector3D, global: &Vector3D, volume_id: VolumeId) -> Result<CellId> {
        let theta = global.theta();
        let phi = wrap_phi(global.phi(), self.offset_phi);

        let mut theta_bin = floor_to_bin((theta - self.offset_theta) / self.theta_width(), theta)?;
        // the closed upper edge belongs to the last bin
        if theta_bin == self.theta_bins
            && (theta - (self.offset_theta + PI)).abs() <= THETA_EDGE_TOLERANCE
        {
            theta_bin -= 1;
        }
        if !(0..self.theta_bins).contains(&theta_bin) {
            return Err(Error::InvalidPosition { value: theta });
        }
        let phi_bin =
            floor_to_bin((phi - self.offset_phi) / self.phi_width(), phi)?.rem_euclid(self.phi_bins);

        let mut cell_id = volume_id;
        self.base.set(&mut cell_id, &self.theta_id, theta_bin)?;
        self.base.set(&mut cell_id, &self.phi_id, phi_bin)?;
        Ok(cell_id)
    }

    fn cell_dimensions(&self, _cell_id: CellId) -> Result<Vec<f64>> {
        Ok(vec![self.theta_width(), self.phi_width()])
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
    use approx::assert_abs_diff_eq;
    use std::f64::consts::FRAC_PI_2;

    fn cylinder(theta_bins: i64, phi_bins: i64) -> ProjectiveCylinder {
        let mut seg = ProjectiveCylinder::new("system:8,theta:16,phi:16").unwrap();
        seg.apply_parameters(vec![
            ("theta_bins".into(), theta_bins.into()),
            ("phi_bins".into(), phi_bins.into()),
        ])
        .unwrap();
        seg
    }

    #[test]
    fn test_equator_round_trip() {
        let seg = cylinder(180, 360);
        let global = Vector3D::from_r_theta_phi(1500.0, FRAC_PI_2, 0.0);
        let id = seg.cell_id(&Vector3D::default(), &global, 0).unwrap();

        let theta = seg.theta(id).unwrap();
        let phi = seg.phi(id).unwrap();
        assert!((theta - FRAC_PI_2).abs() <= PI / 180.0);
        assert!(phi.abs() <= TAU / 360.0);

        let dir = seg.position(id).unwrap();
        assert_abs_diff_eq!(dir.magnitude(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_phi_wraps() {
        let seg = cylinder(10, 4);
        // phi = -pi/4 lies in the last quadrant of [0, 2pi)
        let global = Vector3D::new(1.0, -1.0, 0.0);
        let id = seg.cell_id(&Vector3D::default(), &global, 0).unwrap();
        assert_eq!(seg.decoder().get(id, "phi").unwrap(), 3);
        assert_abs_diff_eq!(seg.phi(id).unwrap(), 7.0 * PI / 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_theta_edges() {
        let seg = cylinder(10, 4);
        let forward = Vector3D::new(0.0, 0.0, 10.0);
        let backward = Vector3D::new(0.0, 0.0, -10.0);
        let id_f = seg.cell_id(&Vector3D::default(), &forward, 0).unwrap();
        let id_b = seg.cell_id(&Vector3D::default(), &backward, 0).unwrap();
        assert_eq!(seg.decoder().get(id_f, "theta").unwrap(), 0);
        assert_eq!(seg.decoder().get(id_b, "theta").unwrap(), 9);
    }

    #[test]
    fn test_theta_outside_shifted_range() {
        let mut seg = cylinder(10, 4);
        seg.set_parameter("offset_theta", (-0.5).into()).unwrap();
        // theta = pi lies past the upper edge pi - 0.5
        let backward = Vector3D::new(0.0, 0.0, -10.0);
        assert!(matches!(
            seg.cell_id(&Vector3D::default(), &backward, 0),
            Err(Error::InvalidPosition { .. })
        ));

        // last bin still reachable just below the edge
        let inside = Vector3D::from_r_theta_phi(10.0, PI - 0.5 - 1e-6, 0.0);
        let id = seg.cell_id(&Vector3D::default(), &inside, 0).unwrap();
        assert_eq!(seg.decoder().get(id, "theta").unwrap(), 9);

        seg.set_parameter("offset_theta", 0.5.into()).unwrap();
        let forward = Vector3D::new(0.0, 0.0, 10.0);
        assert!(matches!(
            seg.cell_id(&Vector3D::default(), &forward, 0),
            Err(Error::InvalidPosition { .. })
        ));
    }

    #[test]
    fn test_nan_direction_rejected() {
        let seg = cylinder(10, 4);
        let global = Vector3D::new(f64::NAN, 1.0, 1.0);
        assert!(seg.cell_id(&Vector3D::default(), &global, 0).is_err());
    }

    #[test]
    fn test_uses_global_not_local() {
        let seg = cylinder(18, 36);
        let global = Vector3D::from_r_theta_phi(100.0, 1.0, 2.0);
        let a = seg.cell_id(&Vector3D::new(5.0, 5.0, 5.0), &global, 0).unwrap();
        let b = seg.cell_id(&Vector3D::new(-7.0, 1.0, 0.0), &global, 0).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_rejects_zero_bins() {
        let mut seg = cylinder(10, 10);
        assert!(seg.set_parameter("phi_bins", 0i64.into()).is_err());
        assert_eq!(seg.phi_bins(), 10);
    }
}
