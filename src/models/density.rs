//! Risk-neutral density samples and the resampled density surface
//!
//! Each processed expiration contributes a row of [`DensityPoint`]s. The
//! union of all rows is a scattered point cloud in (strike, day offset)
//! space which [`DensitySurface::resample`] turns into a regular grid.

use crate::error::{DensityError, Result};
use crate::utils::interpolation::LinearInterpolator2D;
use chrono::{Duration, NaiveDate};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// One density sample for one expiration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DensityPoint {
    pub strike: f64,
    /// Days between this sample's expiration and the reference expiration
    pub day_offset: i64,
    /// Non-negative density estimate
    pub density: f64,
}

/// Evenly spaced values over `[start, end]`, both endpoints exact
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n)
                .map(|i| if i == n - 1 { end } else { start + i as f64 * step })
                .collect()
        }
    }
}

/// Risk-neutral density on a regular (day offset x strike) grid
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DensitySurface {
    /// Expiration that day offsets are measured from
    pub reference_date: NaiveDate,
    /// Strike axis (columns)
    pub strike_axis: Vec<f64>,
    /// Day-offset axis (rows)
    pub day_offset_axis: Vec<f64>,
    /// Density values, shape `(day_offset_axis.len(), strike_axis.len())`
    pub density: Array2<f64>,
    /// Distinct day offsets that contributed samples
    pub expiration_offsets: Vec<i64>,
    /// Number of distinct input samples
    pub sample_count: usize,
}

impl DensitySurface {
    /// Resample scattered density points onto a regular grid.
    ///
    /// The grid spans the observed strike and day-offset ranges with
    /// `strike_resolution` and `day_resolution` points. Values come from
    /// linear interpolation over a Delaunay triangulation of the samples;
    /// cells outside their convex hull are zero.
    pub fn resample(
        points: &[DensityPoint],
        reference_date: NaiveDate,
        strike_resolution: usize,
        day_resolution: usize,
    ) -> Result<Self> {
        if strike_resolution < 2 || day_resolution < 2 {
            return Err(DensityError::ConfigError(format!(
                "surface resolution must be at least 2x2, got {}x{}",
                strike_resolution, day_resolution
            )));
        }

        // Duplicate sites are averaged; key orders by day offset then strike.
        let mut merged: BTreeMap<(i64, u64), (f64, f64, usize)> = BTreeMap::new();
        for p in points {
            if !p.strike.is_finite() || !p.density.is_finite() {
                warn!("Ignoring non-finite density sample {:?}", p);
                continue;
            }
            let entry = merged
                .entry((p.day_offset, p.strike.to_bits()))
                .or_insert((p.strike, 0.0, 0));
            entry.1 += p.density;
            entry.2 += 1;
        }

        let samples: Vec<(f64, i64, f64)> = merged
            .iter()
            .map(|(&(day, _), &(strike, sum, count))| (strike, day, sum / count as f64))
            .collect();

        if samples.len() < 3 {
            return Err(DensityError::InsufficientSurfaceData {
                points: samples.len(),
                reason: "at least 3 distinct points are required".to_string(),
            });
        }

        let strike_min = samples.iter().map(|s| s.0).fold(f64::INFINITY, f64::min);
        let strike_max = samples.iter().map(|s| s.0).fold(f64::NEG_INFINITY, f64::max);
        let day_min = samples.iter().map(|s| s.1).min().unwrap_or(0);
        let day_max = samples.iter().map(|s| s.1).max().unwrap_or(0);

        let strike_range = strike_max - strike_min;
        let day_range = (day_max - day_min) as f64;
        if strike_range <= 0.0 || day_range <= 0.0 {
            return Err(DensityError::InsufficientSurfaceData {
                points: samples.len(),
                reason: format!(
                    "points are collinear (strikes {}..{}, day offsets {}..{})",
                    strike_min, strike_max, day_min, day_max
                ),
            });
        }

        // Triangulate in the unit square so strike and day scales weigh equally.
        let unit: Vec<(f64, f64, f64)> = samples
            .iter()
            .map(|&(k, d, v)| {
                (
                    (k - strike_min) / strike_range,
                    (d - day_min) as f64 / day_range,
                    v,
                )
            })
            .collect();

        let interpolator =
            LinearInterpolator2D::new(&unit).ok_or_else(|| DensityError::InsufficientSurfaceData {
                points: samples.len(),
                reason: "points are collinear".to_string(),
            })?;

        let strike_axis = linspace(strike_min, strike_max, strike_resolution);
        let day_offset_axis = linspace(day_min as f64, day_max as f64, day_resolution);
        let unit_strikes = linspace(0.0, 1.0, strike_resolution);
        let unit_days = linspace(0.0, 1.0, day_resolution);

        let density = interpolator
            .grid(&unit_strikes, &unit_days, 0.0)
            .mapv(|v| if v.is_finite() { v.max(0.0) } else { 0.0 });

        let mut expiration_offsets: Vec<i64> = samples.iter().map(|s| s.1).collect();
        expiration_offsets.dedup();

        info!(
            "Resampled {} density points onto a {}x{} surface (strikes {}..{}, days {}..{})",
            samples.len(),
            day_resolution,
            strike_resolution,
            strike_min,
            strike_max,
            day_min,
            day_max
        );

        Ok(Self {
            reference_date,
            strike_axis,
            day_offset_axis,
            density,
            expiration_offsets,
            sample_count: samples.len(),
        })
    }

    /// `(rows, columns)` = `(day offsets, strikes)`
    pub fn shape(&self) -> (usize, usize) {
        self.density.dim()
    }

    pub fn max_density(&self) -> f64 {
        self.density.iter().copied().fold(0.0, f64::max)
    }

    /// Calendar date of each day-offset axis value, rounded to whole days
    pub fn day_labels(&self) -> Vec<NaiveDate> {
        self.day_offset_axis
            .iter()
            .map(|&d| self.reference_date + Duration::days(d.round() as i64))
            .collect()
    }

    /// Day offsets of the contributing expirations with their calendar dates
    pub fn expiration_ticks(&self) -> Vec<(i64, NaiveDate)> {
        self.expiration_offsets
            .iter()
            .map(|&d| (d, self.reference_date + Duration::days(d)))
            .collect()
    }

    /// Strikes and densities along one row of the day-offset axis
    pub fn slice_by_day(&self, row: usize) -> Result<(Array1<f64>, Array1<f64>)> {
        if row >= self.day_offset_axis.len() {
            return Err(DensityError::Other(format!(
                "day-offset row {} out of range (0..{})",
                row,
                self.day_offset_axis.len()
            )));
        }
        let strikes = Array1::from_vec(self.strike_axis.clone());
        let densities = self.density.slice(ndarray::s![row, ..]).to_owned();
        Ok((strikes, densities))
    }

    /// Bilinear lookup on the regular grid, `None` outside the axes
    pub fn value_at(&self, strike: f64, day_offset: f64) -> Option<f64> {
        let (j0, j1, u) = bracket(&self.strike_axis, strike)?;
        let (i0, i1, t) = bracket(&self.day_offset_axis, day_offset)?;

        let v00 = self.density[[i0, j0]];
        let v01 = self.density[[i0, j1]];
        let v10 = self.density[[i1, j0]];
        let v11 = self.density[[i1, j1]];

        Some((1.0 - t) * (1.0 - u) * v00 + (1.0 - t) * u * v01 + t * (1.0 - u) * v10 + t * u * v11)
    }
}

/// Neighbouring indices and the fractional position of `x` on an ascending axis
fn bracket(axis: &[f64], x: f64) -> Option<(usize, usize, f64)> {
    let first = *axis.first()?;
    let last = *axis.last()?;
    if !(first..=last).contains(&x) {
        return None;
    }
    if axis.len() == 1 {
        return Some((0, 0, 0.0));
    }
    let hi = axis.partition_point(|&a| a < x).clamp(1, axis.len() - 1);
    let lo = hi - 1;
    let width = axis[hi] - axis[lo];
    let frac = if width > 0.0 { (x - axis[lo]) / width } else { 0.0 };
    Some((lo, hi, frac))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn reference() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, 17).unwrap()
    }

    fn row(day: i64, strikes: &[f64], f: impl Fn(f64) -> f64) -> Vec<DensityPoint> {
        strikes
            .iter()
            .map(|&k| DensityPoint {
                strike: k,
                day_offset: day,
                density: f(k),
            })
            .collect()
    }

    #[test]
    fn linspace_hits_both_ends() {
        let xs = linspace(6000.0, 6020.0, 5);
        assert_eq!(xs, vec![6000.0, 6005.0, 6010.0, 6015.0, 6020.0]);
        assert_eq!(linspace(0.0, 0.3, 4)[3], 0.3);
    }

    #[test]
    fn surface_has_requested_shape() {
        let ks = [6000.0, 6005.0, 6010.0, 6015.0, 6020.0];
        let mut pts = row(0, &ks, |_| 0.01);
        pts.extend(row(7, &ks, |_| 0.02));
        let surface = DensitySurface::resample(&pts, reference(), 100, 50).unwrap();
        assert_eq!(surface.shape(), (50, 100));
        assert_eq!(surface.strike_axis[0], 6000.0);
        assert_eq!(surface.strike_axis[99], 6020.0);
        assert_eq!(surface.day_offset_axis[49], 7.0);
        assert_eq!(surface.expiration_offsets, vec![0, 7]);
        assert!(surface.density.iter().all(|v| v.is_finite() && *v >= 0.0));
    }

    #[test]
    fn interpolates_linearly_between_expirations() {
        let ks = [6000.0, 6010.0, 6020.0];
        let mut pts = row(0, &ks, |_| 0.01);
        pts.extend(row(10, &ks, |_| 0.03));
        let surface = DensitySurface::resample(&pts, reference(), 3, 11).unwrap();
        for (i, day) in surface.day_offset_axis.iter().enumerate() {
            for j in 0..3 {
                assert_abs_diff_eq!(surface.density[[i, j]], 0.01 + 0.002 * day, epsilon = 1e-12);
            }
        }
        assert_abs_diff_eq!(surface.value_at(6005.0, 5.0).unwrap(), 0.02, epsilon = 1e-12);
        assert!(surface.value_at(6030.0, 5.0).is_none());
    }

    #[test]
    fn cells_outside_hull_are_zero() {
        // Triangle of samples leaves the upper-right corner uncovered.
        let pts = vec![
            DensityPoint { strike: 0.0, day_offset: 0, density: 1.0 },
            DensityPoint { strike: 10.0, day_offset: 0, density: 1.0 },
            DensityPoint { strike: 0.0, day_offset: 10, density: 1.0 },
        ];
        let surface = DensitySurface::resample(&pts, reference(), 11, 11).unwrap();
        assert_eq!(surface.density[[0, 0]], 1.0);
        assert_eq!(surface.density[[10, 10]], 0.0);
        assert_eq!(surface.density[[5, 5]], 1.0);
        assert_eq!(surface.density[[6, 6]], 0.0);
    }

    #[test]
    fn single_expiration_is_collinear() {
        let pts = row(0, &[1.0, 2.0, 3.0, 4.0], |_| 1.0);
        let err = DensitySurface::resample(&pts, reference(), 10, 10).unwrap_err();
        assert!(matches!(err, DensityError::InsufficientSurfaceData { points: 4, .. }));
    }

    #[test]
    fn too_few_points_is_an_error() {
        let pts = vec![
            DensityPoint { strike: 1.0, day_offset: 0, density: 1.0 },
            DensityPoint { strike: 1.0, day_offset: 0, density: 3.0 },
            DensityPoint { strike: 2.0, day_offset: 5, density: 1.0 },
        ];
        let err = DensitySurface::resample(&pts, reference(), 10, 10).unwrap_err();
        assert!(matches!(err, DensityError::InsufficientSurfaceData { points: 2, .. }));
        assert!(DensitySurface::resample(&[], reference(), 10, 10).is_err());
    }

    #[test]
    fn resolution_below_two_is_rejected() {
        let ks = [1.0, 2.0];
        let mut pts = row(0, &ks, |_| 1.0);
        pts.extend(row(1, &ks, |_| 1.0));
        let err = DensitySurface::resample(&pts, reference(), 1, 10).unwrap_err();
        assert!(matches!(err, DensityError::ConfigError(_)));
    }

    #[test]
    fn labels_map_offsets_back_to_dates() {
        let ks = [1.0, 2.0, 3.0];
        let mut pts = row(0, &ks, |_| 1.0);
        pts.extend(row(7, &ks, |_| 1.0));
        let surface = DensitySurface::resample(&pts, reference(), 3, 8).unwrap();
        let labels = surface.day_labels();
        assert_eq!(labels[0], reference());
        assert_eq!(labels[7], NaiveDate::from_ymd_opt(2025, 10, 24).unwrap());
        assert_eq!(
            surface.expiration_ticks(),
            vec![(0, reference()), (7, NaiveDate::from_ymd_opt(2025, 10, 24).unwrap())]
        );
        let (strikes, row) = surface.slice_by_day(0).unwrap();
        assert_eq!(strikes.len(), 3);
        assert_eq!(row.len(), 3);
        assert!(surface.slice_by_day(8).is_err());
    }
}
