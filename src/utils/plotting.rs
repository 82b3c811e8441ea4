use crate::error::{DensityError, Result};
use crate::models::DensitySurface;
use chrono::{Duration, NaiveDate};
use image::{ImageFormat, RgbImage};
use plotters::backend::BitMapBackend;
use plotters::prelude::*;
use std::path::Path;
use tracing::info;

const WIDTH: u32 = 1200;
const HEIGHT: u32 = 900;

fn plot_err<E: std::fmt::Display>(e: E) -> DensityError {
    DensityError::PlotError(e.to_string())
}

fn save_png(img: &RgbImage, output_path: &Path) -> Result<()> {
    img.save_with_format(output_path, ImageFormat::Png)
        .map_err(plot_err)?;
    info!("Saved plot to {}", output_path.display());
    Ok(())
}

/// Heatmap of the density surface: strike on x, expiration date on y
pub fn plot_density_surface<P: AsRef<Path>>(
    surface: &DensitySurface,
    symbol: &str,
    output_path: P,
) -> Result<()> {
    let img = plot_density_surface_in_memory(surface, symbol)?;
    save_png(&img, output_path.as_ref())
}

pub fn plot_density_surface_in_memory(surface: &DensitySurface, symbol: &str) -> Result<RgbImage> {
    let (rows, cols) = surface.shape();
    if rows < 2 || cols < 2 {
        return Err(DensityError::PlotError(format!(
            "surface too small to plot: {}x{}",
            rows, cols
        )));
    }

    let strikes = &surface.strike_axis;
    let days = &surface.day_offset_axis;
    let strike_min = strikes[0];
    let strike_max = strikes[cols - 1];
    let day_min = days[0];
    let day_max = days[rows - 1];
    let half_strike = 0.5 * (strike_max - strike_min) / (cols - 1) as f64;
    let half_day = 0.5 * (day_max - day_min) / (rows - 1) as f64;

    let max_density = surface.max_density();
    let scale = if max_density > 0.0 { max_density } else { 1.0 };
    let reference = surface.reference_date;
    let format_day = move |d: &f64| {
        (reference + Duration::days(d.round() as i64))
            .format("%Y-%m-%d")
            .to_string()
    };

    let mut buffer = vec![0u8; (WIDTH * HEIGHT * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (WIDTH, HEIGHT)).into_drawing_area();
        root.fill(&WHITE).map_err(plot_err)?;
        let (plot_area, legend_area) = root.split_horizontally((WIDTH - 140) as i32);

        let mut chart = ChartBuilder::on(&plot_area)
            .caption(
                format!("{} Risk-Neutral Density Surface", symbol),
                ("sans-serif", 30).into_font(),
            )
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(100)
            .build_cartesian_2d(
                (strike_min - half_strike)..(strike_max + half_strike),
                (day_min - half_day)..(day_max + half_day),
            )
            .map_err(plot_err)?;

        chart
            .configure_mesh()
            .disable_mesh()
            .x_desc("Strike Price")
            .y_desc("Expiration")
            .y_label_formatter(&format_day)
            .axis_desc_style(("sans-serif", 15))
            .draw()
            .map_err(plot_err)?;

        let color_gradient = colorous::VIRIDIS;
        chart
            .draw_series(surface.density.indexed_iter().map(|((i, j), &value)| {
                let color = color_gradient.eval_continuous((value / scale).clamp(0.0, 1.0));
                Rectangle::new(
                    [
                        (strikes[j] - half_strike, days[i] - half_day),
                        (strikes[j] + half_strike, days[i] + half_day),
                    ],
                    RGBColor(color.r, color.g, color.b).filled(),
                )
            }))
            .map_err(plot_err)?;

        // Mark the expirations that actually contributed samples
        chart
            .draw_series(surface.expiration_offsets.iter().map(|&d| {
                PathElement::new(
                    vec![(strike_min, d as f64), (strike_max, d as f64)],
                    WHITE.mix(0.4),
                )
            }))
            .map_err(plot_err)?;

        let color_bar_width = 20;
        let color_bar_height = 600;
        let color_bar_x = 20;
        let color_bar_y = 120;

        for i in 0..color_bar_height {
            let normalized_pos = 1.0 - (i as f64 / color_bar_height as f64);
            let color = color_gradient.eval_continuous(normalized_pos);
            legend_area
                .draw(&Rectangle::new(
                    [
                        (color_bar_x, color_bar_y + i),
                        (color_bar_x + color_bar_width, color_bar_y + i + 1),
                    ],
                    RGBColor(color.r, color.g, color.b).filled(),
                ))
                .map_err(plot_err)?;
        }

        let label_style = TextStyle::from(("sans-serif", 12)).color(&BLACK);
        legend_area
            .draw_text(
                &format!("{:.2e}", max_density),
                &label_style,
                (color_bar_x + color_bar_width + 5, color_bar_y),
            )
            .map_err(plot_err)?;
        legend_area
            .draw_text(
                "0",
                &label_style,
                (color_bar_x + color_bar_width + 5, color_bar_y + color_bar_height - 12),
            )
            .map_err(plot_err)?;
        legend_area
            .draw_text("Density", &label_style, (color_bar_x, color_bar_y - 20))
            .map_err(plot_err)?;

        root.present().map_err(plot_err)?;
    }

    RgbImage::from_raw(WIDTH, HEIGHT, buffer)
        .ok_or_else(|| DensityError::PlotError("image buffer size mismatch".to_string()))
}

/// Density against strike for a single expiration
pub fn plot_density_slice<P: AsRef<Path>>(
    strikes: &[f64],
    densities: &[f64],
    symbol: &str,
    expiration: NaiveDate,
    output_path: P,
) -> Result<()> {
    let valid_points: Vec<(f64, f64)> = strikes
        .iter()
        .zip(densities)
        .filter(|(_, d)| d.is_finite())
        .map(|(&k, &d)| (k, d))
        .collect();

    if valid_points.len() < 2 {
        return Err(DensityError::PlotError(
            "Not enough data points for density slice plot".to_string(),
        ));
    }

    let min_strike = valid_points.iter().map(|(k, _)| *k).fold(f64::INFINITY, f64::min);
    let max_strike = valid_points
        .iter()
        .map(|(k, _)| *k)
        .fold(f64::NEG_INFINITY, f64::max);
    let max_density = valid_points.iter().map(|(_, d)| *d).fold(0.0, f64::max);
    let density_max = if max_density > 0.0 { max_density * 1.1 } else { 1.0 };

    let mut buffer = vec![0u8; (WIDTH * HEIGHT * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (WIDTH, HEIGHT)).into_drawing_area();
        root.fill(&WHITE).map_err(plot_err)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(
                format!("{} Risk-Neutral Density - {}", symbol, expiration.format("%Y-%m-%d")),
                ("sans-serif", 30).into_font(),
            )
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(80)
            .build_cartesian_2d(min_strike..max_strike, 0.0..density_max)
            .map_err(plot_err)?;

        chart
            .configure_mesh()
            .x_desc("Strike Price")
            .y_desc("Density")
            .y_label_formatter(&|d: &f64| format!("{:.1e}", d))
            .axis_desc_style(("sans-serif", 15))
            .draw()
            .map_err(plot_err)?;

        chart
            .draw_series(
                AreaSeries::new(valid_points.iter().copied(), 0.0, BLUE.mix(0.2))
                    .border_style(BLUE),
            )
            .map_err(plot_err)?;

        root.present().map_err(plot_err)?;
    }

    let img = RgbImage::from_raw(WIDTH, HEIGHT, buffer)
        .ok_or_else(|| DensityError::PlotError("image buffer size mismatch".to_string()))?;
    save_png(&img, output_path.as_ref())
}
