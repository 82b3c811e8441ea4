//! Normalize, estimate and resample across expirations
//!
//! Each scheduled expiration is normalized onto the strike grid and turned
//! into density samples independently of the others. A failure in one
//! expiration is recorded in its [`ExpirationReport`] and the run carries
//! on. Resampling starts only once every expiration has been handled.

use crate::api::FetchOutcome;
use crate::config::AnalysisConfig;
use crate::error::{DensityError, Result};
use crate::models::{
    normalize_chain, DensityPoint, DensitySurface, NormalizationStats, NormalizedChain,
    OptionRecord, StrikeGrid,
};
use crate::utils::{check_probability_mass, risk_neutral_density};
use chrono::NaiveDate;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, warn};

/// Outcome of one stage for one expiration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageStatus {
    Succeeded,
    Failed(String),
    /// The stage did not run because an earlier step failed
    Skipped(String),
}

impl StageStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, StageStatus::Succeeded)
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageStatus::Succeeded => write!(f, "ok"),
            StageStatus::Failed(reason) => write!(f, "failed ({})", reason),
            StageStatus::Skipped(reason) => write!(f, "skipped ({})", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExpirationReport {
    pub expiration: NaiveDate,
    pub normalization: StageStatus,
    pub density: StageStatus,
    pub density_points: usize,
    /// Trapezoid integral of the density slice over strike
    pub probability_mass: Option<f64>,
    pub stats: Option<NormalizationStats>,
}

/// Everything a run produced, including per-expiration status
#[derive(Debug)]
pub struct RunReport {
    /// Earliest scheduled expiration; day offsets are measured from it
    pub reference_date: NaiveDate,
    pub expirations: Vec<ExpirationReport>,
    pub chains: Vec<NormalizedChain>,
    /// Flat `(strike, midPrice, optionType, expirationDate, dataDate)` rows
    pub records: Vec<OptionRecord>,
    pub density_points: Vec<DensityPoint>,
    pub surface: Result<DensitySurface>,
}

impl RunReport {
    pub fn succeeded_expirations(&self) -> usize {
        self.expirations
            .iter()
            .filter(|r| r.density.is_success())
            .count()
    }

    /// No expiration produced density samples, so there is nothing to resample.
    /// Reports and records are still populated for whatever did succeed.
    pub fn is_fatal(&self) -> bool {
        self.density_points.is_empty()
    }

    pub fn log_summary(&self) {
        for report in &self.expirations {
            info!(
                "{}: normalization {}, density {}, {} point(s){}",
                report.expiration,
                report.normalization,
                report.density,
                report.density_points,
                report
                    .probability_mass
                    .map(|m| format!(", mass {:.4}", m))
                    .unwrap_or_default()
            );
        }
        match &self.surface {
            Ok(surface) => {
                let (rows, cols) = surface.shape();
                info!(
                    "Surface built from {}/{} expiration(s): {}x{}, peak density {:.3e}",
                    self.succeeded_expirations(),
                    self.expirations.len(),
                    rows,
                    cols,
                    surface.max_density()
                );
            }
            Err(e) => warn!("Surface build failed: {}", e),
        }
    }
}

struct Processed {
    report: ExpirationReport,
    chain: Option<NormalizedChain>,
    points: Vec<DensityPoint>,
}

/// Density stage for one expiration whose normalization already ran
fn estimate(
    expiration: NaiveDate,
    normalized: std::result::Result<NormalizedChain, StageStatus>,
    reference_date: NaiveDate,
) -> Processed {
    let chain = match normalized {
        Ok(chain) => chain,
        Err(status) => {
            let reason = match &status {
                StageStatus::Failed(_) => "normalization failed".to_string(),
                StageStatus::Skipped(reason) => reason.clone(),
                StageStatus::Succeeded => String::new(),
            };
            return Processed {
                report: ExpirationReport {
                    expiration,
                    normalization: status,
                    density: StageStatus::Skipped(reason),
                    density_points: 0,
                    probability_mass: None,
                    stats: None,
                },
                chain: None,
                points: Vec::new(),
            };
        }
    };

    let points = risk_neutral_density(&chain, reference_date);
    let (density, probability_mass) = if points.is_empty() {
        (
            StageStatus::Failed(format!("{} strike(s), need at least 3", chain.len())),
            None,
        )
    } else {
        (StageStatus::Succeeded, Some(check_probability_mass(&points)))
    };

    Processed {
        report: ExpirationReport {
            expiration,
            normalization: StageStatus::Succeeded,
            density,
            density_points: points.len(),
            probability_mass,
            stats: Some(chain.stats.clone()),
        },
        chain: Some(chain),
        points,
    }
}

fn normalize_outcome(
    outcome: &FetchOutcome,
    grid: &StrikeGrid,
) -> std::result::Result<NormalizedChain, StageStatus> {
    match outcome {
        FetchOutcome::Failed { reason, .. } => {
            Err(StageStatus::Skipped(format!("fetch failed: {}", reason)))
        }
        FetchOutcome::Fetched(batch) => normalize_chain(batch, grid).map_err(|e| {
            warn!("Skipping {}: {}", batch.expiration, e);
            StageStatus::Failed(e.to_string())
        }),
    }
}

/// Sort by expiration, merge repeated expirations, keep the first `limit`
fn schedule(outcomes: Vec<FetchOutcome>, limit: usize) -> Vec<FetchOutcome> {
    let mut by_expiration: BTreeMap<NaiveDate, FetchOutcome> = BTreeMap::new();
    for outcome in outcomes {
        let expiration = outcome.expiration();
        let merged = match (by_expiration.remove(&expiration), outcome) {
            (None, next) => next,
            (Some(FetchOutcome::Fetched(mut kept)), FetchOutcome::Fetched(more)) => {
                kept.quotes.extend(more.quotes);
                FetchOutcome::Fetched(kept)
            }
            (Some(fetched @ FetchOutcome::Fetched(_)), FetchOutcome::Failed { .. }) => fetched,
            (Some(FetchOutcome::Failed { .. }), next) => next,
        };
        by_expiration.insert(expiration, merged);
    }
    by_expiration.into_values().take(limit).collect()
}

/// Run the full pipeline over fetched quote batches.
///
/// Returns `Err` only when the grid configuration is invalid or nothing was
/// scheduled. A failed surface build, including the fatal case where no
/// expiration produced density samples (see [`RunReport::is_fatal`]), is
/// reported in [`RunReport::surface`] alongside the per-expiration reports.
pub fn run_pipeline(
    outcomes: Vec<FetchOutcome>,
    config: &AnalysisConfig,
    data_date: NaiveDate,
) -> Result<RunReport> {
    let grid = StrikeGrid::new(config.strike_min, config.strike_max, config.strike_step)?;
    let scheduled = schedule(outcomes, config.num_expirations);
    let reference_date = scheduled
        .first()
        .map(FetchOutcome::expiration)
        .ok_or_else(|| DensityError::InsufficientSurfaceData {
            points: 0,
            reason: "no expirations scheduled".to_string(),
        })?;

    info!(
        "Processing {} expiration(s) on a {}-strike grid [{}, {}] step {}, reference {}",
        scheduled.len(),
        grid.len(),
        grid.min(),
        grid.max(),
        grid.step(),
        reference_date
    );

    let process = |outcome: &FetchOutcome| {
        estimate(
            outcome.expiration(),
            normalize_outcome(outcome, &grid),
            reference_date,
        )
    };
    let processed: Vec<Processed> = if config.parallel {
        scheduled.par_iter().map(process).collect()
    } else {
        scheduled.iter().map(process).collect()
    };

    Ok(assemble(reference_date, processed, config, data_date))
}

/// Run density estimation and resampling over chains that are already normalized
pub fn run_from_chains(
    chains: Vec<NormalizedChain>,
    config: &AnalysisConfig,
    data_date: NaiveDate,
) -> Result<RunReport> {
    let mut chains = chains;
    chains.sort_by_key(|c| c.expiration);
    chains.truncate(config.num_expirations);

    let reference_date = chains
        .first()
        .map(|c| c.expiration)
        .ok_or_else(|| DensityError::InsufficientSurfaceData {
            points: 0,
            reason: "no stored expirations".to_string(),
        })?;

    let process = |chain: NormalizedChain| estimate(chain.expiration, Ok(chain), reference_date);
    let processed: Vec<Processed> = if config.parallel {
        chains.into_par_iter().map(process).collect()
    } else {
        chains.into_iter().map(process).collect()
    };

    Ok(assemble(reference_date, processed, config, data_date))
}

fn assemble(
    reference_date: NaiveDate,
    processed: Vec<Processed>,
    config: &AnalysisConfig,
    data_date: NaiveDate,
) -> RunReport {
    let mut expirations = Vec::with_capacity(processed.len());
    let mut chains = Vec::new();
    let mut density_points = Vec::new();
    for item in processed {
        expirations.push(item.report);
        chains.extend(item.chain);
        density_points.extend(item.points);
    }

    let records: Vec<OptionRecord> = chains
        .iter()
        .flat_map(|chain| OptionRecord::from_chain(chain, data_date))
        .collect();

    let surface = if density_points.is_empty() {
        Err(DensityError::InsufficientSurfaceData {
            points: 0,
            reason: format!(
                "none of {} expiration(s) produced density points",
                expirations.len()
            ),
        })
    } else {
        DensitySurface::resample(
            &density_points,
            reference_date,
            config.strike_axis_resolution,
            config.day_offset_axis_resolution,
        )
    };
    if let Err(e) = &surface {
        warn!("Could not resample density surface: {}", e);
    }

    RunReport {
        reference_date,
        expirations,
        chains,
        records,
        density_points,
        surface,
    }
}

/// Group stored records into chains, one per expiration, earliest first
pub fn chains_from_records(records: &[OptionRecord], limit: usize) -> Vec<NormalizedChain> {
    let mut grouped: BTreeMap<NaiveDate, Vec<(f64, f64)>> = BTreeMap::new();
    for record in records {
        grouped
            .entry(record.expiration_date)
            .or_default()
            .push((record.strike, record.mid_price));
    }
    grouped
        .into_iter()
        .take(limit)
        .map(|(expiration, pairs)| NormalizedChain::from_stored(expiration, pairs))
        .collect()
}
