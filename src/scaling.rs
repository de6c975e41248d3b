//! Affine map between stored 16-bit digital values and physical units.

use crate::error::{EdfError, Result};

/// Full signed 16-bit span used by every synthesized or re-quantized channel.
pub const DIGITAL_MIN: i32 = -32768;
pub const DIGITAL_MAX: i32 = 32767;

/// The `bitvalue`/`offset` pair of one channel.
///
/// `physical = bitvalue * (offset + digital)` and its inverse. The conversion
/// functions do not clamp; callers that can produce out-of-range physical
/// values clamp before converting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scaling {
    pub bitvalue: f64,
    pub offset: f64,
}

impl Scaling {
    /// Derives the coefficients from a physical and digital range.
    ///
    /// `digital_max > digital_min` is required; header parsing rejects files
    /// that violate it before any scaling is computed.
    pub fn from_ranges(physical_min: f64, physical_max: f64, digital_min: i32, digital_max: i32) -> Self {
        let bitvalue = (physical_max - physical_min) / (digital_max - digital_min) as f64;
        let offset = physical_max / bitvalue - digital_max as f64;
        Scaling { bitvalue, offset }
    }

    /// Scaling for an annotation channel; never used for conversion.
    pub fn identity() -> Self {
        Scaling { bitvalue: 1.0, offset: 0.0 }
    }

    #[inline]
    pub fn dig2phys(&self, digital: i16) -> f64 {
        self.bitvalue * (self.offset + digital as f64)
    }

    /// Converts a physical value to the nearest digital code, saturating at the
    /// bounds of `i16`.
    #[inline]
    pub fn phys2dig(&self, physical: f64) -> i16 {
        let digital = (physical / self.bitvalue - self.offset).round();
        digital.clamp(i16::MIN as f64, i16::MAX as f64) as i16
    }

    pub fn to_physical(&self, digital: &[i16]) -> Vec<f64> {
        digital.iter().map(|&d| self.dig2phys(d)).collect()
    }
}

/// Fails on the first NaN or infinite sample.
pub fn check_finite(data: &[f64]) -> Result<()> {
    match data.iter().position(|x| !x.is_finite()) {
        Some(i) => Err(EdfError::InvalidArgument(format!(
            "non-finite sample {} at index {}",
            data[i], i
        ))),
        None => Ok(()),
    }
}

/// Physical min/max of a buffer, widened when the buffer is constant so that
/// the derived bitvalue stays finite and non-zero.
///
/// # Errors
///
/// * `EdfError::InvalidArgument` - the buffer holds a NaN or infinite value
pub fn physical_range(data: &[f64]) -> Result<(f64, f64)> {
    check_finite(data)?;
    let mut pmin = data.first().copied().unwrap_or(0.0);
    let mut pmax = pmin;
    for &x in data.iter().skip(1) {
        if x < pmin {
            pmin = x;
        } else if x > pmax {
            pmax = x;
        }
    }
    if pmax <= pmin {
        pmax = pmin + 1.0;
    }
    Ok((pmin, pmax))
}

/// Symmetric `±max(|min|, |max|)` version of a range.
pub fn symmetric_range(pmin: f64, pmax: f64) -> (f64, f64) {
    let largest = pmin.abs().max(pmax.abs());
    if largest == 0.0 {
        (-1.0, 1.0)
    } else {
        (-largest, largest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_microvolt_channel_coefficients() {
        let scaling = Scaling::from_ranges(-200.0, 200.0, DIGITAL_MIN, DIGITAL_MAX);
        assert!((scaling.bitvalue - 0.0061037).abs() < 1e-6);
        assert!((scaling.offset - (-32767.18)).abs() < 0.01);

        let d = scaling.phys2dig(0.0);
        assert!(scaling.dig2phys(d).abs() < 1e-3);
    }

    #[test]
    fn test_round_trip_exact_in_digital_domain() {
        let ranges = [
            (-200.0, 200.0, DIGITAL_MIN, DIGITAL_MAX),
            (0.0, 5.0, -2048, 2047),
            (-1.5, 3.75, 0, 1000),
            (-12345.6, 98765.4, -32767, 32767),
        ];
        for (pmin, pmax, dmin, dmax) in ranges {
            let scaling = Scaling::from_ranges(pmin, pmax, dmin, dmax);
            for d in dmin..=dmax {
                let d = d as i16;
                assert_eq!(scaling.phys2dig(scaling.dig2phys(d)), d);
            }
        }
    }

    #[test]
    fn test_range_endpoints_map_to_digital_bounds() {
        let scaling = Scaling::from_ranges(-3.0, 7.0, DIGITAL_MIN, DIGITAL_MAX);
        assert_eq!(scaling.phys2dig(7.0), 32767);
        assert_eq!(scaling.phys2dig(-3.0), -32768);
        assert!((scaling.dig2phys(32767) - 7.0).abs() < 1e-9);
        assert!((scaling.dig2phys(-32768) + 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_phys2dig_saturates() {
        let scaling = Scaling::from_ranges(-1.0, 1.0, DIGITAL_MIN, DIGITAL_MAX);
        assert_eq!(scaling.phys2dig(10.0), i16::MAX);
        assert_eq!(scaling.phys2dig(-10.0), i16::MIN);
    }

    #[test]
    fn test_physical_range() {
        assert_eq!(physical_range(&[3.0, -1.0, 2.0]).unwrap(), (-1.0, 3.0));
        assert_eq!(physical_range(&[4.0, 4.0]).unwrap(), (4.0, 5.0));
        assert_eq!(symmetric_range(-3.0, 2.0), (-3.0, 3.0));
        assert_eq!(symmetric_range(0.0, 0.0), (-1.0, 1.0));
    }

    #[test]
    fn test_physical_range_rejects_non_finite() {
        let err = physical_range(&[1.0, f64::NAN, 2.0]).unwrap_err();
        assert!(matches!(err, EdfError::InvalidArgument(_)));
        assert!(physical_range(&[f64::INFINITY]).is_err());
        assert!(check_finite(&[0.0, -1.5]).is_ok());
    }
}
