//! End-to-end runs of the density pipeline over in-memory quote batches

use approx::assert_abs_diff_eq;
use chrono::NaiveDate;
use rnd_surface::api::FetchOutcome;
use rnd_surface::config::AnalysisConfig;
use rnd_surface::error::DensityError;
use rnd_surface::models::{normalize_chain, PriceSource, QuoteBatch, StrikeGrid};
use rnd_surface::pipeline::{chains_from_records, run_from_chains, run_pipeline, StageStatus};
use rnd_surface::utils::polars_utils::{read_records_csv, write_records_csv};
use rnd_surface::utils::{probability_mass, risk_neutral_density};
use statrs::distribution::{Continuous, ContinuousCDF, Normal};

fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 10, d).unwrap()
}

fn small_grid_config() -> AnalysisConfig {
    AnalysisConfig {
        strike_min: 6000.0,
        strike_max: 6020.0,
        strike_step: 5.0,
        num_expirations: 5,
        strike_axis_resolution: 10,
        day_offset_axis_resolution: 6,
        parallel: false,
    }
}

fn two_point_batch(expiration: NaiveDate) -> QuoteBatch {
    QuoteBatch::from_triples(expiration, &[(6000.0, 99.5, 100.5), (6020.0, 79.5, 80.5)])
}

#[test]
fn two_quotes_fill_the_grid_and_give_a_flat_surface() {
    let outcomes = vec![
        FetchOutcome::Fetched(two_point_batch(date(17))),
        FetchOutcome::Fetched(two_point_batch(date(24))),
    ];
    let report = run_pipeline(outcomes, &small_grid_config(), date(10)).unwrap();

    assert_eq!(report.reference_date, date(17));
    let mids: Vec<f64> = report.chains[0].mid_prices();
    for (got, want) in mids.iter().zip([100.0, 95.0, 90.0, 85.0, 80.0]) {
        assert_abs_diff_eq!(*got, want, epsilon = 1e-12);
    }
    assert_eq!(report.chains[0].points[1].source, PriceSource::Interpolated);

    for p in &report.density_points {
        assert_abs_diff_eq!(p.density, 0.0, epsilon = 1e-12);
    }
    let offsets: Vec<i64> = report.density_points.iter().map(|p| p.day_offset).collect();
    assert_eq!(&offsets[..5], &[0; 5]);
    assert_eq!(&offsets[5..], &[7; 5]);

    let surface = report.surface.unwrap();
    assert_eq!(surface.shape(), (6, 10));
    assert!(surface.density.iter().all(|v| v.abs() < 1e-12));
    assert_eq!(surface.day_labels()[5], date(24));

    assert_eq!(report.records.len(), 10);
    assert!(report.records.iter().all(|r| r.data_date == date(10)));
}

#[test]
fn one_usable_quote_is_insufficient_two_continue_the_line() {
    let grid = StrikeGrid::new(6000.0, 6020.0, 5.0).unwrap();

    let one = QuoteBatch::from_triples(date(17), &[(6010.0, 89.0, 91.0)]);
    assert!(matches!(
        normalize_chain(&one, &grid),
        Err(DensityError::InsufficientData { known: 1, .. })
    ));

    let two = QuoteBatch::from_triples(date(17), &[(6005.0, 94.0, 96.0), (6010.0, 89.0, 91.0)]);
    let chain = normalize_chain(&two, &grid).unwrap();
    let mids = chain.mid_prices();
    for (got, want) in mids.iter().zip([100.0, 95.0, 90.0, 85.0, 80.0]) {
        assert_abs_diff_eq!(*got, want, epsilon = 1e-12);
    }
    assert_eq!(chain.points[0].source, PriceSource::Extrapolated);
    assert_eq!(chain.points[4].source, PriceSource::Extrapolated);
}

#[test]
fn bachelier_prices_recover_the_normal_density() {
    let forward = 6500.0;
    let sd = 100.0;
    let normal = Normal::new(forward, sd).unwrap();
    let standard = Normal::new(0.0, 1.0).unwrap();
    let call = |k: f64| {
        let d = (forward - k) / sd;
        (forward - k) * standard.cdf(d) + sd * standard.pdf(d)
    };

    let grid = StrikeGrid::new(6000.0, 7000.0, 5.0).unwrap();
    let triples: Vec<(f64, f64, f64)> = grid
        .strikes()
        .iter()
        .map(|&k| {
            let c = call(k);
            (k, c, c)
        })
        .collect();
    let chain = normalize_chain(&QuoteBatch::from_triples(date(17), &triples), &grid).unwrap();
    let points = risk_neutral_density(&chain, date(17));
    assert_eq!(points.len(), grid.len());

    for p in &points[2..points.len() - 2] {
        assert_abs_diff_eq!(p.density, normal.pdf(p.strike), epsilon = 1e-5);
    }
    assert_abs_diff_eq!(probability_mass(&points), 1.0, epsilon = 1e-2);
}

#[test]
fn every_expiration_is_reported() {
    let outcomes = vec![
        FetchOutcome::Fetched(two_point_batch(date(17))),
        FetchOutcome::Fetched(QuoteBatch::from_triples(date(21), &[(6005.0, 1.0, 2.0)])),
        FetchOutcome::Failed {
            expiration: date(24),
            reason: "HTTP 429".to_string(),
        },
        FetchOutcome::Fetched(two_point_batch(date(31))),
    ];
    let report = run_pipeline(outcomes, &small_grid_config(), date(10)).unwrap();

    let statuses: Vec<(NaiveDate, bool, bool)> = report
        .expirations
        .iter()
        .map(|r| (r.expiration, r.normalization.is_success(), r.density.is_success()))
        .collect();
    assert_eq!(
        statuses,
        vec![
            (date(17), true, true),
            (date(21), false, false),
            (date(24), false, false),
            (date(31), true, true),
        ]
    );
    assert!(matches!(report.expirations[1].normalization, StageStatus::Failed(_)));
    assert!(matches!(report.expirations[2].normalization, StageStatus::Skipped(_)));

    let surface = report.surface.unwrap();
    assert_eq!(surface.reference_date, date(17));
    assert_eq!(surface.expiration_offsets, vec![0, 14]);
}

#[test]
fn stored_records_reproduce_the_surface() {
    let outcomes: Vec<FetchOutcome> = [17, 24, 31]
        .iter()
        .map(|&d| {
            FetchOutcome::Fetched(QuoteBatch::from_triples(
                date(d),
                &[
                    (6000.0, 30.0, 31.0),
                    (6005.0, 26.0, 27.0),
                    (6010.0, 23.0, 24.0),
                    (6015.0, 20.5, 21.5),
                    (6020.0, 18.0, 19.0),
                ],
            ))
        })
        .collect();
    let config = small_grid_config();
    let live = run_pipeline(outcomes, &config, date(10)).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("SPX_options.csv");
    write_records_csv(&live.records, &path).unwrap();
    let records = read_records_csv(&path).unwrap();
    assert_eq!(records, live.records);

    let chains = chains_from_records(&records, config.num_expirations);
    let replay = run_from_chains(chains, &config, date(10)).unwrap();

    let a = live.surface.unwrap();
    let b = replay.surface.unwrap();
    assert_eq!(a.shape(), b.shape());
    for (x, y) in a.density.iter().zip(b.density.iter()) {
        assert_abs_diff_eq!(*x, *y, epsilon = 1e-12);
    }
}

#[test]
fn records_survive_a_run_without_density_points() {
    let config = AnalysisConfig {
        strike_max: 6005.0,
        ..small_grid_config()
    };
    let outcomes: Vec<FetchOutcome> = [17, 24]
        .iter()
        .map(|&d| {
            FetchOutcome::Fetched(QuoteBatch::from_triples(
                date(d),
                &[(6000.0, 99.0, 101.0), (6005.0, 94.0, 96.0)],
            ))
        })
        .collect();

    let report = run_pipeline(outcomes, &config, date(10)).unwrap();
    assert!(report.is_fatal());
    assert_eq!(report.succeeded_expirations(), 0);
    assert!(report
        .expirations
        .iter()
        .all(|r| r.normalization == StageStatus::Succeeded));
    assert!(matches!(
        report.surface,
        Err(DensityError::InsufficientSurfaceData { points: 0, .. })
    ));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("SPX_options.csv");
    write_records_csv(&report.records, &path).unwrap();
    assert_eq!(read_records_csv(&path).unwrap(), report.records);
    assert_eq!(report.records.len(), 4);
}
