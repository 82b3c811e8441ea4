use crate::error::Result;
use crate::models::density::DensitySurface;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Renderer-facing snapshot of a density surface with calendar labels
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SurfaceExport {
    pub reference_date: NaiveDate,
    pub strikes: Vec<f64>,
    pub day_offsets: Vec<f64>,
    /// Calendar date for each entry of `day_offsets`
    pub dates: Vec<NaiveDate>,
    /// Contributing expirations as `(day offset, date)` tick marks
    pub expiration_ticks: Vec<(i64, NaiveDate)>,
    /// Row-major density, one row per day offset
    pub density: Vec<Vec<f64>>,
}

impl From<&DensitySurface> for SurfaceExport {
    fn from(surface: &DensitySurface) -> Self {
        Self {
            reference_date: surface.reference_date,
            strikes: surface.strike_axis.clone(),
            day_offsets: surface.day_offset_axis.clone(),
            dates: surface.day_labels(),
            expiration_ticks: surface.expiration_ticks(),
            density: surface
                .density
                .outer_iter()
                .map(|row| row.to_vec())
                .collect(),
        }
    }
}

impl SurfaceExport {
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }
}
