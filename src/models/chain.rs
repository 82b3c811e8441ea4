//! Canonical strike grid and per-expiration chain normalization
//!
//! Raw quotes are sparse and irregular: strikes are missing, one side of the
//! book is absent, or the same strike is listed twice. Normalization aligns
//! a batch onto the shared [`StrikeGrid`] and fills every gap so downstream
//! finite differences see a complete, evenly spaced price curve.

use crate::error::{DensityError, Result};
use crate::models::option::QuoteBatch;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Upper bound on grid nodes; finer grids are rejected as misconfigured
pub const MAX_GRID_STRIKES: usize = 1_000_000;

/// Evenly spaced strikes `[min, min + step, ..., max]` shared by every expiration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrikeGrid {
    min: f64,
    max: f64,
    step: f64,
    strikes: Vec<f64>,
}

impl StrikeGrid {
    pub fn new(min: f64, max: f64, step: f64) -> Result<Self> {
        if !min.is_finite() || !max.is_finite() || !step.is_finite() {
            return Err(DensityError::ConfigError(
                "strike grid bounds and step must be finite".to_string(),
            ));
        }
        if step <= 0.0 {
            return Err(DensityError::ConfigError(format!(
                "strike step must be positive, got {}",
                step
            )));
        }
        if max < min {
            return Err(DensityError::ConfigError(format!(
                "strike max {} is below strike min {}",
                max, min
            )));
        }

        let span = (max - min) / step;
        if span >= MAX_GRID_STRIKES as f64 {
            return Err(DensityError::ConfigError(format!(
                "strike grid [{}, {}] step {} exceeds {} strikes",
                min, max, step, MAX_GRID_STRIKES
            )));
        }

        let count = (span + 1e-9).floor() as usize + 1;
        let strikes = (0..count).map(|i| min + i as f64 * step).collect();

        Ok(Self {
            min,
            max,
            step,
            strikes,
        })
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn strikes(&self) -> &[f64] {
        &self.strikes
    }

    pub fn len(&self) -> usize {
        self.strikes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strikes.is_empty()
    }

    fn tolerance(&self) -> f64 {
        self.step * 1e-6
    }

    /// Whether a strike lies within the configured bounds
    pub fn contains(&self, strike: f64) -> bool {
        strike >= self.min - self.tolerance() && strike <= self.max + self.tolerance()
    }

    /// Grid index of a strike that sits on a node, `None` for off-grid strikes
    pub fn index_of(&self, strike: f64) -> Option<usize> {
        let position = ((strike - self.min) / self.step).round();
        if position < 0.0 || position >= self.strikes.len() as f64 {
            return None;
        }
        let idx = position as usize;
        if (self.strikes[idx] - strike).abs() <= self.tolerance() {
            Some(idx)
        } else {
            None
        }
    }
}

/// Grid slot after alignment and before gap filling
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MidQuote {
    Observed(f64),
    Missing,
}

impl MidQuote {
    pub fn value(&self) -> Option<f64> {
        match self {
            MidQuote::Observed(v) => Some(*v),
            MidQuote::Missing => None,
        }
    }
}

/// Where a normalized mid-price came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceSource {
    Observed,
    Interpolated,
    Extrapolated,
    /// Read back from a previously persisted record set
    Stored,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPoint {
    pub strike: f64,
    pub mid_price: f64,
    pub source: PriceSource,
}

/// Counters describing how a batch was aligned and filled
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizationStats {
    pub observed: usize,
    pub interpolated: usize,
    pub extrapolated: usize,
    /// Quotes rejected as malformed (out of bounds, bad prices, wrong expiration)
    pub malformed: usize,
    /// Quotes within bounds whose strike is not a grid node
    pub off_grid: usize,
    /// Quotes without a usable bid/ask pair
    pub missing_mid: usize,
    /// Extra quotes averaged into an already quoted strike
    pub duplicates: usize,
}

/// Complete mid-price curve for one expiration, strictly ascending in strike
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedChain {
    pub expiration: NaiveDate,
    pub points: Vec<NormalizedPoint>,
    pub stats: NormalizationStats,
}

impl NormalizedChain {
    /// Rebuild a chain from persisted `(strike, mid)` pairs.
    ///
    /// Pairs are sorted, non-finite values dropped and duplicate strikes
    /// averaged so the ascending-strike invariant holds for any input order.
    pub fn from_stored<I>(expiration: NaiveDate, pairs: I) -> Self
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let mut rows: Vec<(f64, f64)> = Vec::new();
        let mut stats = NormalizationStats::default();
        for (strike, mid) in pairs {
            if strike.is_finite() && mid.is_finite() {
                rows.push((strike, mid));
            } else {
                warn!(
                    "Dropping stored row for {}: strike={} mid={}",
                    expiration, strike, mid
                );
                stats.malformed += 1;
            }
        }
        rows.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut points: Vec<NormalizedPoint> = Vec::with_capacity(rows.len());
        let mut counts: Vec<usize> = Vec::with_capacity(rows.len());
        for (strike, mid) in rows {
            match (points.last_mut(), counts.last_mut()) {
                (Some(last), Some(count)) if last.strike == strike => {
                    last.mid_price = (last.mid_price * *count as f64 + mid) / (*count + 1) as f64;
                    *count += 1;
                    stats.duplicates += 1;
                }
                _ => {
                    points.push(NormalizedPoint {
                        strike,
                        mid_price: mid,
                        source: PriceSource::Stored,
                    });
                    counts.push(1);
                }
            }
        }

        Self {
            expiration,
            points,
            stats,
        }
    }

    pub fn strikes(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.strike).collect()
    }

    pub fn mid_prices(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.mid_price).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Align one expiration's quotes onto `grid` and fill every missing strike.
///
/// Interior gaps are interpolated linearly between the nearest observed
/// strikes; leading and trailing gaps continue the line through the two
/// nearest observed strikes. Fails with [`DensityError::InsufficientData`]
/// when fewer than two grid strikes carry a usable mid-price.
pub fn normalize_chain(batch: &QuoteBatch, grid: &StrikeGrid) -> Result<NormalizedChain> {
    let expiration = batch.expiration;
    let mut stats = NormalizationStats::default();
    let mut sums = vec![(0.0_f64, 0_usize); grid.len()];

    for quote in &batch.quotes {
        let rejection = if quote.expiration != expiration {
            Some(format!(
                "expiration {} does not match batch {}",
                quote.expiration, expiration
            ))
        } else if let Some(defect) = quote.defect() {
            Some(defect)
        } else if !grid.contains(quote.strike) {
            Some(format!(
                "outside strike bounds [{}, {}]",
                grid.min(),
                grid.max()
            ))
        } else {
            None
        };

        if let Some(reason) = rejection {
            let err = DensityError::MalformedQuote {
                strike: quote.strike,
                reason,
            };
            warn!("{}: {}", expiration, err);
            stats.malformed += 1;
            continue;
        }

        let Some(idx) = grid.index_of(quote.strike) else {
            debug!("{}: strike {} is not on the grid", expiration, quote.strike);
            stats.off_grid += 1;
            continue;
        };

        let Some(mid) = quote.mid_price() else {
            stats.missing_mid += 1;
            continue;
        };

        if sums[idx].1 > 0 {
            stats.duplicates += 1;
        }
        sums[idx].0 += mid;
        sums[idx].1 += 1;
    }

    let slots: Vec<MidQuote> = sums
        .iter()
        .map(|&(sum, count)| {
            if count > 0 {
                MidQuote::Observed(sum / count as f64)
            } else {
                MidQuote::Missing
            }
        })
        .collect();

    let known = slots.iter().filter(|s| s.value().is_some()).count();
    let filled = fill_gaps(&slots).ok_or(DensityError::InsufficientData { expiration, known })?;

    let points: Vec<NormalizedPoint> = grid
        .strikes()
        .iter()
        .zip(filled)
        .map(|(&strike, (mid_price, source))| {
            match source {
                PriceSource::Observed => stats.observed += 1,
                PriceSource::Interpolated => stats.interpolated += 1,
                PriceSource::Extrapolated => stats.extrapolated += 1,
                PriceSource::Stored => {}
            }
            NormalizedPoint {
                strike,
                mid_price,
                source,
            }
        })
        .collect();

    info!(
        "Normalized {} onto {} strikes ({} observed, {} interpolated, {} extrapolated)",
        expiration,
        points.len(),
        stats.observed,
        stats.interpolated,
        stats.extrapolated
    );

    Ok(NormalizedChain {
        expiration,
        points,
        stats,
    })
}

/// Fill `Missing` slots on an evenly spaced axis, `None` with fewer than two observations
fn fill_gaps(slots: &[MidQuote]) -> Option<Vec<(f64, PriceSource)>> {
    let known: Vec<(usize, f64)> = slots
        .iter()
        .enumerate()
        .filter_map(|(i, s)| s.value().map(|v| (i, v)))
        .collect();

    if known.len() < 2 {
        return None;
    }

    let mut filled = vec![(0.0, PriceSource::Observed); slots.len()];

    for pair in known.windows(2) {
        let (a, va) = pair[0];
        let (b, vb) = pair[1];
        filled[a] = (va, PriceSource::Observed);
        for (i, slot) in filled.iter_mut().enumerate().take(b).skip(a + 1) {
            let t = (i - a) as f64 / (b - a) as f64;
            *slot = (va + (vb - va) * t, PriceSource::Interpolated);
        }
    }

    let (first, v_first) = known[0];
    let (second, v_second) = known[1];
    let lead_slope = (v_second - v_first) / (second - first) as f64;
    for (i, slot) in filled.iter_mut().enumerate().take(first) {
        *slot = (
            v_first - lead_slope * (first - i) as f64,
            PriceSource::Extrapolated,
        );
    }

    let (last, v_last) = known[known.len() - 1];
    let (prev, v_prev) = known[known.len() - 2];
    filled[last] = (v_last, PriceSource::Observed);
    let trail_slope = (v_last - v_prev) / (last - prev) as f64;
    for (i, slot) in filled.iter_mut().enumerate().skip(last + 1) {
        *slot = (
            v_last + trail_slope * (i - last) as f64,
            PriceSource::Extrapolated,
        );
    }

    Some(filled)
}
