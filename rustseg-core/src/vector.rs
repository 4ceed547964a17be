//! Three-dimensional points and the coordinate conversions used by
//! angular segmentations.

use std::f64::consts::{PI, TAU};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A point or direction in Cartesian coordinates (millimetres).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Vector3D {
    /// X component.
    pub x: f64,
    /// Y component.
    pub y: f64,
    /// Z component.
    pub z: f64,
}

impl Vector3D {
    /// Creates a new vector.
    #[inline]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Point at spherical coordinates `(r, theta, phi)`.
    #[inline]
    pub fn from_r_theta_phi(r: f64, theta: f64, phi: f64) -> Self {
        Self::new(
            r * theta.sin() * phi.cos(),
            r * theta.sin() * phi.sin(),
            r * theta.cos(),
        )
    }

    /// Point at cylindrical radius `r`, pseudorapidity `eta` and azimuth `phi`.
    #[inline]
    pub fn from_r_eta_phi(r: f64, eta: f64, phi: f64) -> Self {
        Self::new(r * phi.cos(), r * phi.sin(), r * eta.sinh())
    }

    /// Distance from the z axis.
    #[inline]
    pub fn radius_xy(&self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Distance from the origin.
    #[inline]
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Azimuthal angle in `(-pi, pi]`.
    #[inline]
    pub fn phi(&self) -> f64 {
        self.y.atan2(self.x)
    }

    /// Polar angle in `[0, pi]`.
    #[inline]
    pub fn theta(&self) -> f64 {
        self.radius_xy().atan2(self.z)
    }

    /// Pseudorapidity, `-ln(tan(theta / 2))`.
    ///
    /// Infinite on the z axis.
    #[inline]
    pub fn eta(&self) -> f64 {
        let rho = self.radius_xy();
        if rho == 0.0 {
            return if self.z >= 0.0 {
                f64::INFINITY
            } else {
                f64::NEG_INFINITY
            };
        }
        (self.z / rho).asinh()
    }
}

impl From<(f64, f64, f64)> for Vector3D {
    fn from((x, y, z): (f64, f64, f64)) -> Self {
        Self::new(x, y, z)
    }
}

impl From<[f64; 3]> for Vector3D {
    fn from([x, y, z]: [f64; 3]) -> Self {
        Self::new(x, y, z)
    }
}

/// Maps `phi` into `[lower, lower + 2 pi)`.
#[inline]
pub fn wrap_phi(phi: f64, lower: f64) -> f64 {
    let wrapped = (phi - lower).rem_euclid(TAU) + lower;
    // rem_euclid can round up to exactly TAU for tiny negative inputs
    if wrapped >= lower + TAU {
        lower
    } else {
        wrapped
    }
}

/// Maps `phi` into `[-pi, pi)`.
#[inline]
pub fn normalize_phi(phi: f64) -> f64 {
    wrap_phi(phi, -PI)
}
