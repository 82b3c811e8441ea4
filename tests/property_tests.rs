//! Property-based tests using proptest.
//!
//! Normalization, density estimation and resampling are checked against
//! randomly generated quote sets and density clouds.

use chrono::NaiveDate;
use proptest::prelude::*;
use rnd_surface::models::{normalize_chain, DensityPoint, DensitySurface, QuoteBatch, StrikeGrid};
use rnd_surface::utils::risk_neutral_density;

fn expiry() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 12, 19).unwrap()
}

/// Grid size, which grid slots are quoted, and a mid-price per slot
fn sparse_chain() -> impl Strategy<Value = (usize, Vec<bool>, Vec<f64>)> {
    (3usize..60).prop_flat_map(|n| {
        (
            Just(n),
            prop::collection::vec(any::<bool>(), n),
            prop::collection::vec(0.0_f64..500.0, n),
        )
    })
}

fn grid_of(n: usize) -> StrikeGrid {
    StrikeGrid::new(6000.0, 6000.0 + 5.0 * (n - 1) as f64, 5.0).unwrap()
}

fn batch_from(grid: &StrikeGrid, quoted: &[bool], mids: &[f64]) -> QuoteBatch {
    let triples: Vec<(f64, f64, f64)> = grid
        .strikes()
        .iter()
        .zip(quoted.iter().zip(mids))
        .filter(|(_, (&q, _))| q)
        .map(|(&k, (_, &m))| (k, m, m))
        .collect();
    QuoteBatch::from_triples(expiry(), &triples)
}

proptest! {
    /// The normalized chain covers the grid exactly, with no gaps
    #[test]
    fn normalized_chain_matches_grid((n, quoted, mids) in sparse_chain()) {
        prop_assume!(quoted.iter().filter(|&&q| q).count() >= 2);
        let grid = grid_of(n);
        let chain = normalize_chain(&batch_from(&grid, &quoted, &mids), &grid).unwrap();

        prop_assert_eq!(chain.len(), grid.len());
        prop_assert_eq!(chain.strikes(), grid.strikes().to_vec());
        prop_assert!(chain.mid_prices().iter().all(|m| m.is_finite()));
        prop_assert!(chain.strikes().windows(2).all(|w| w[0] < w[1]));
    }

    /// Quoted strikes keep their observed mid-price
    #[test]
    fn observed_mids_are_preserved((n, quoted, mids) in sparse_chain()) {
        prop_assume!(quoted.iter().filter(|&&q| q).count() >= 2);
        let grid = grid_of(n);
        let chain = normalize_chain(&batch_from(&grid, &quoted, &mids), &grid).unwrap();
        for (i, point) in chain.points.iter().enumerate() {
            if quoted[i] {
                prop_assert_eq!(point.mid_price, mids[i]);
            }
        }
    }

    /// Normalizing an already complete chain changes nothing
    #[test]
    fn normalization_is_idempotent((n, quoted, mids) in sparse_chain()) {
        prop_assume!(quoted.iter().filter(|&&q| q).count() >= 2);
        let grid = grid_of(n);
        let first = normalize_chain(&batch_from(&grid, &quoted, &mids), &grid).unwrap();

        let complete: Vec<(f64, f64, f64)> = first
            .points
            .iter()
            .map(|p| (p.strike, p.mid_price, p.mid_price))
            .collect();
        let second = normalize_chain(&QuoteBatch::from_triples(expiry(), &complete), &grid);

        // Extrapolation may continue below zero, which is not a valid quote
        if complete.iter().all(|t| t.1 >= 0.0) {
            let second = second.unwrap();
            prop_assert_eq!(second.mid_prices(), first.mid_prices());
            prop_assert_eq!(second.stats.observed, grid.len());
        }
    }

    /// Density estimates are never negative
    #[test]
    fn density_is_non_negative((n, quoted, mids) in sparse_chain()) {
        prop_assume!(quoted.iter().filter(|&&q| q).count() >= 2);
        let grid = grid_of(n);
        let chain = normalize_chain(&batch_from(&grid, &quoted, &mids), &grid).unwrap();
        let points = risk_neutral_density(&chain, expiry());
        prop_assert_eq!(points.len(), grid.len());
        prop_assert!(points.iter().all(|p| p.density >= 0.0 && p.density.is_finite()));
    }

    /// The resampled surface has the requested shape with finite non-negative values
    #[test]
    fn surface_is_finite_and_non_negative(
        offsets in prop::collection::btree_set(0_i64..120, 2..5),
        densities in prop::collection::vec(0.0_f64..0.01, 40),
        strike_res in 2usize..40,
        day_res in 2usize..20,
    ) {
        let points: Vec<DensityPoint> = offsets
            .iter()
            .enumerate()
            .flat_map(|(row, &day_offset)| {
                let densities = &densities;
                (0..8).map(move |j| DensityPoint {
                    strike: 6000.0 + 5.0 * j as f64,
                    day_offset,
                    density: densities[(row * 8 + j) % densities.len()],
                })
            })
            .collect();

        let surface = DensitySurface::resample(&points, expiry(), strike_res, day_res).unwrap();
        prop_assert_eq!(surface.shape(), (day_res, strike_res));
        prop_assert!(surface.density.iter().all(|v| v.is_finite() && *v >= 0.0));
        prop_assert!(surface.max_density() <= 0.01 + 1e-9);
    }
}
