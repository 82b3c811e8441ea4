//! Fetch the next few expirations, build the density surface and write
//! the record CSV, a heatmap PNG and a JSON export to `OUTPUT_DIR`.

use rnd_surface::api::{fetch_batches, YahooClient};
use rnd_surface::config::Config;
use rnd_surface::error::Result;
use rnd_surface::models::SurfaceExport;
use rnd_surface::pipeline::run_pipeline;
use rnd_surface::utils::polars_utils::write_records_csv;
use rnd_surface::utils::{plot_density_slice, plot_density_surface};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    config.init_logging()?;
    config.validate()?;

    info!(
        "Starting rnd-surface for {} (strikes {}..{} step {}, {} expirations)",
        config.ticker,
        config.analysis.strike_min,
        config.analysis.strike_max,
        config.analysis.strike_step,
        config.analysis.num_expirations
    );

    let client = YahooClient::new(&config.fetch)?;
    let outcomes = fetch_batches(
        &client,
        &config.ticker,
        &config.fetch,
        config.analysis.num_expirations,
    )
    .await?;

    let data_date = chrono::Local::now().date_naive();
    let report = run_pipeline(outcomes, &config.analysis, data_date)?;
    report.log_summary();

    std::fs::create_dir_all(&config.output_dir)?;
    let csv_path = config.output_dir.join(config.records_file_name());
    if report.records.is_empty() {
        warn!("No normalized records to write");
    } else {
        write_records_csv(&report.records, &csv_path)?;
    }

    if report.is_fatal() {
        error!("No expiration produced density points; nothing to render");
        return report.surface.map(|_| ());
    }

    let symbol = config.ticker.trim_start_matches('^');
    for chain in &report.chains {
        let slice: Vec<f64> = report
            .density_points
            .iter()
            .filter(|p| p.day_offset == (chain.expiration - report.reference_date).num_days())
            .map(|p| p.density)
            .collect();
        let path = config
            .output_dir
            .join(format!("{}_density_{}.png", symbol, chain.expiration.format("%Y%m%d")));
        let plotted =
            plot_density_slice(&chain.strikes(), &slice, &config.ticker, chain.expiration, &path);
        if let Err(e) = plotted {
            warn!("Skipping slice plot for {}: {}", chain.expiration, e);
        }
    }

    match &report.surface {
        Ok(surface) => {
            let png_path = config.output_dir.join(format!("{}_density_surface.png", symbol));
            plot_density_surface(surface, &config.ticker, &png_path)?;

            let json_path = config.output_dir.join(format!("{}_density_surface.json", symbol));
            SurfaceExport::from(surface).write_json(&json_path)?;
            info!("Wrote surface export to {}", json_path.display());
        }
        Err(e) => warn!("No surface to render: {}", e),
    }

    info!("Done");
    Ok(())
}
