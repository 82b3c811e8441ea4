use crate::models::{DensityPoint, NormalizedChain};
use chrono::NaiveDate;
use tracing::{debug, warn};

/// Derivative of `values` with respect to `xs`, matching `numpy.gradient`.
///
/// Interior nodes use the second-order central difference for possibly
/// uneven spacing; the two boundary nodes use first-order one-sided
/// differences. Requires at least two strictly increasing abscissae.
pub fn gradient(xs: &[f64], values: &[f64]) -> Vec<f64> {
    let n = xs.len().min(values.len());
    if n < 2 {
        return vec![0.0; n];
    }

    let mut out = vec![0.0; n];
    out[0] = (values[1] - values[0]) / (xs[1] - xs[0]);
    out[n - 1] = (values[n - 1] - values[n - 2]) / (xs[n - 1] - xs[n - 2]);

    for i in 1..n - 1 {
        let hs = xs[i] - xs[i - 1];
        let hd = xs[i + 1] - xs[i];
        out[i] = (hs * hs * values[i + 1] + (hd * hd - hs * hs) * values[i]
            - hd * hd * values[i - 1])
            / (hs * hd * (hd + hs));
    }

    out
}

/// Compute the Breeden-Litzenberger risk-neutral density from a normalized call curve.
///
/// The density is the second strike-derivative of the call price, clamped
/// at zero. Chains with fewer than three strikes carry no curvature
/// information and yield an empty vector.
pub fn risk_neutral_density(
    chain: &NormalizedChain,
    reference_date: NaiveDate,
) -> Vec<DensityPoint> {
    if chain.len() < 3 {
        debug!(
            "Skipping density for {}: {} strike(s), need 3",
            chain.expiration,
            chain.len()
        );
        return Vec::new();
    }

    let strikes = chain.strikes();
    let prices = chain.mid_prices();
    let day_offset = (chain.expiration - reference_date).num_days();

    let first = gradient(&strikes, &prices);
    let second = gradient(&strikes, &first);

    let mut negative = 0;
    let points: Vec<DensityPoint> = strikes
        .iter()
        .zip(second)
        .map(|(&strike, d2)| {
            if d2 < 0.0 {
                negative += 1;
            }
            let density = if d2.is_finite() { d2.max(0.0) } else { 0.0 };
            DensityPoint {
                strike,
                day_offset,
                density,
            }
        })
        .collect();

    if negative > 0 {
        debug!(
            "{}: clamped {} negative density sample(s) to zero",
            chain.expiration, negative
        );
    }

    points
}

/// Trapezoid integral of a density slice over strike.
///
/// A clean slice integrates to roughly one; large deviations point at
/// truncated strike bounds or noisy quotes.
pub fn probability_mass(points: &[DensityPoint]) -> f64 {
    points
        .windows(2)
        .map(|w| 0.5 * (w[0].density + w[1].density) * (w[1].strike - w[0].strike))
        .sum()
}

/// Log a warning when a slice's mass is far from one
pub fn check_probability_mass(points: &[DensityPoint]) -> f64 {
    let mass = probability_mass(points);
    if let Some(first) = points.first() {
        if !(0.5..=1.5).contains(&mass) {
            warn!(
                "Density slice at day offset {} integrates to {:.4}",
                first.day_offset, mass
            );
        } else {
            debug!(
                "Density slice at day offset {} integrates to {:.4}",
                first.day_offset, mass
            );
        }
    }
    mass
}
