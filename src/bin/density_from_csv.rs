//! Rebuild the density surface from a previously written record CSV.
//!
//! Usage: `density_from_csv [path/to/records.csv]`. Without an argument the
//! file name derived from the current configuration is read from
//! `OUTPUT_DIR`.

use rnd_surface::config::Config;
use rnd_surface::error::{DensityError, Result};
use rnd_surface::models::SurfaceExport;
use rnd_surface::pipeline::{chains_from_records, run_from_chains};
use rnd_surface::utils::plot_density_surface;
use rnd_surface::utils::polars_utils::read_records_csv;
use std::path::PathBuf;
use tracing::info;

fn main() -> Result<()> {
    let config = Config::from_env()?;
    config.init_logging()?;
    config.validate()?;

    let csv_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| config.output_dir.join(config.records_file_name()));

    let records = read_records_csv(&csv_path)?;
    let data_date = records.first().map(|r| r.data_date).ok_or_else(|| {
        DensityError::StoreError(format!("{} holds no call records", csv_path.display()))
    })?;

    let chains = chains_from_records(&records, config.analysis.num_expirations);
    info!("Loaded {} expiration(s) from {}", chains.len(), csv_path.display());

    let report = run_from_chains(chains, &config.analysis, data_date)?;
    report.log_summary();
    let surface = report.surface?;

    std::fs::create_dir_all(&config.output_dir)?;
    let stem = csv_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("records");
    let png_path = config.output_dir.join(format!("{}_surface.png", stem));
    plot_density_surface(&surface, &config.ticker, &png_path)?;

    let json_path = config.output_dir.join(format!("{}_surface.json", stem));
    SurfaceExport::from(&surface).write_json(&json_path)?;
    info!("Wrote surface export to {}", json_path.display());

    Ok(())
}
