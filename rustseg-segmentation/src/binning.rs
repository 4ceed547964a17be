//! Conversions between continuous coordinates and integer bins.
//!
//! Uniform bins are centred on `bin * cell_size + offset`, so
//! `bin_to_position(position_to_bin(v, s, o), s, o)` is always within
//! `s / 2` of `v`.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::missing_errors_doc
)]

use log::debug;

use crate::error::{Error, Result};

/// Cell sizes at or below this value are rejected.
pub const MIN_CELL_SIZE: f64 = 1e-10;

/// Relative tolerance used to attach positions to the outer edges of a
/// variable-width binning.
const EDGE_TOLERANCE: f64 = 3e-12;

/// Bin index of `position` for cells of `cell_size` centred on `offset`.
///
/// Fails for non-finite positions and for bins beyond the `i64` range.
#[inline]
pub fn position_to_bin(position: f64, cell_size: f64, offset: f64) -> Result<i64> {
    floor_to_bin((position + 0.5 * cell_size - offset) / cell_size, position)
}

/// Integer bin below `scaled`, where `scaled` was computed from `position`.
pub(crate) fn floor_to_bin(scaled: f64, position: f64) -> Result<i64> {
    let bin = scaled.floor();
    // i64::MAX as f64 rounds up to 2^63
    if bin.is_finite() && bin >= i64::MIN as f64 && bin < i64::MAX as f64 {
        Ok(bin as i64)
    } else {
        Err(Error::InvalidPosition { value: position })
    }
}

/// Centre of bin `bin`.
#[inline]
pub fn bin_to_position(bin: i64, cell_size: f64, offset: f64) -> f64 {
    bin as f64 * cell_size + offset
}

/// Checks that a uniform cell size can be used for binning.
pub fn validate_cell_size(name: &str, cell_size: f64) -> Result<()> {
    if cell_size.is_finite() && cell_size > MIN_CELL_SIZE {
        Ok(())
    } else {
        Err(Error::InvalidParameter {
            name: name.to_string(),
            reason: format!("cell size must be > {MIN_CELL_SIZE}, got {cell_size}"),
        })
    }
}

/// Bin index of `position` in a binning given by ascending edges.
///
/// Positions on the first or last edge (within a relative tolerance)
/// belong to the first or last bin; anything outside is an error.
pub fn position_to_bin_boundaries(position: f64, boundaries: &[f64], offset: f64) -> Result<i64> {
    let (Some(&first), Some(&last)) = (boundaries.first(), boundaries.last()) else {
        return Err(Error::Config("bin boundaries need at least two edges".to_string()));
    };
    if boundaries.len() < 2 {
        return Err(Error::Config("bin boundaries need at least two edges".to_string()));
    }

    let local = position - offset;
    if !local.is_finite() {
        return Err(Error::InvalidPosition { value: position });
    }
    if (local / first - 1.0).abs() < EDGE_TOLERANCE {
        return Ok(0);
    }
    if (local / last - 1.0).abs() < EDGE_TOLERANCE {
        return Ok(boundaries.len() as i64 - 2);
    }
    if local < first || local > last {
        debug!("hit position {local:.20e} outside the acceptance [{first:.20e}, {last:.20e}]");
        return Err(Error::InvalidPosition { value: position });
    }

    // index of the first edge strictly greater than the position, minus one
    let upper = boundaries.partition_point(|&edge| edge <= local);
    Ok(upper as i64 - 1)
}

/// Centre of bin `bin` in a binning given by ascending edges.
pub fn bin_to_position_boundaries(bin: i64, boundaries: &[f64], offset: f64) -> Result<f64> {
    let index = usize::try_from(bin).ok().filter(|&i| i + 1 < boundaries.len());
    match index {
        Some(i) => Ok((boundaries[i] + boundaries[i + 1]) * 0.5 + offset),
        None => Err(Error::InvalidParameter {
            name: "bin".to_string(),
            reason: format!("bin {bin} outside binning with {} edges", boundaries.len()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_quantization() {
        assert_eq!(position_to_bin(24.9, 10.0, 0.0).unwrap(), 2);
        assert_eq!(bin_to_position(2, 10.0, 0.0), 20.0);
        assert_eq!(position_to_bin(25.0, 10.0, 0.0).unwrap(), 3);
        assert_eq!(position_to_bin(-4.9, 10.0, 0.0).unwrap(), 0);
        assert_eq!(position_to_bin(-5.1, 10.0, 0.0).unwrap(), -1);
        assert_eq!(position_to_bin(7.0, 2.0, 1.0).unwrap(), 3);
        assert_eq!(bin_to_position(3, 2.0, 1.0), 7.0);
    }

    #[test]
    fn test_inverse_law() {
        let sizes = [0.1, 0.5, 1.0, 3.7, 10.0, 1234.5];
        let offsets = [-13.25, 0.0, 0.05, 2.5];
        let mut v = -1000.0;
        while v < 1000.0 {
            for &s in &sizes {
                for &o in &offsets {
                    let back = bin_to_position(position_to_bin(v, s, o).unwrap(), s, o);
                    assert!(
                        (back - v).abs() <= s / 2.0 + 1e-9,
                        "v={v} size={s} offset={o} back={back}"
                    );
                }
            }
            v += 7.31;
        }
    }

    #[test]
    fn test_non_finite_positions_rejected() {
        for v in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(matches!(
                position_to_bin(v, 1.0, 0.0),
                Err(Error::InvalidPosition { .. })
            ));
        }
        assert!(position_to_bin(1e300, 1.0, 0.0).is_err());
        assert!(position_to_bin_boundaries(f64::NAN, &[1.0, 2.0], 0.0).is_err());
    }

    #[test]
    fn test_validate_cell_size() {
        assert!(validate_cell_size("grid_size_x", 1.0).is_ok());
        assert!(validate_cell_size("grid_size_x", 0.0).is_err());
        assert!(validate_cell_size("grid_size_x", -1.0).is_err());
        assert!(validate_cell_size("grid_size_x", f64::NAN).is_err());
    }

    #[test]
    fn test_boundaries() {
        let edges = [1.0, 2.0, 4.0, 8.0];
        assert_eq!(position_to_bin_boundaries(1.0, &edges, 0.0).unwrap(), 0);
        assert_eq!(position_to_bin_boundaries(1.5, &edges, 0.0).unwrap(), 0);
        assert_eq!(position_to_bin_boundaries(2.0, &edges, 0.0).unwrap(), 1);
        assert_eq!(position_to_bin_boundaries(7.9, &edges, 0.0).unwrap(), 2);
        assert_eq!(position_to_bin_boundaries(8.0, &edges, 0.0).unwrap(), 2);
        assert_eq!(position_to_bin_boundaries(13.0, &edges, 10.0).unwrap(), 1);
        assert!(position_to_bin_boundaries(0.5, &edges, 0.0).is_err());
        assert!(position_to_bin_boundaries(8.5, &edges, 0.0).is_err());
        assert!(position_to_bin_boundaries(1.0, &[1.0], 0.0).is_err());

        assert_abs_diff_eq!(bin_to_position_boundaries(2, &edges, 0.0).unwrap(), 6.0);
        assert_abs_diff_eq!(bin_to_position_boundaries(0, &edges, 1.0).unwrap(), 2.5);
        assert!(bin_to_position_boundaries(3, &edges, 0.0).is_err());
        assert!(bin_to_position_boundaries(-1, &edges, 0.0).is_err());
    }
}
