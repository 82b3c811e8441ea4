use crate::error::{DensityError, Result};
use crate::models::{OptionRecord, OptionType};
use chrono::NaiveDate;
use polars::prelude::*;
use std::path::Path;
use tracing::{info, warn};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Convert flat option records to a Polars DataFrame
pub fn records_to_dataframe(records: &[OptionRecord]) -> Result<DataFrame> {
    if records.is_empty() {
        return Err(DensityError::StoreError(
            "Cannot create DataFrame from empty records".to_string(),
        ));
    }

    let mut strikes = Vec::with_capacity(records.len());
    let mut mid_prices = Vec::with_capacity(records.len());
    let mut option_types = Vec::with_capacity(records.len());
    let mut expiration_dates = Vec::with_capacity(records.len());
    let mut data_dates = Vec::with_capacity(records.len());

    for record in records {
        strikes.push(record.strike);
        mid_prices.push(record.mid_price);
        option_types.push(record.option_type.to_string());
        expiration_dates.push(record.expiration_date.format(DATE_FORMAT).to_string());
        data_dates.push(record.data_date.format(DATE_FORMAT).to_string());
    }

    let df = DataFrame::new(vec![
        Series::new("strike", strikes),
        Series::new("midPrice", mid_prices),
        Series::new("optionType", option_types),
        Series::new("expirationDate", expiration_dates),
        Series::new("dataDate", data_dates),
    ])
    .map_err(|e| DensityError::StoreError(format!("Failed to create DataFrame: {}", e)))?;

    Ok(df)
}

fn parse_date(raw: Option<&str>) -> Option<NaiveDate> {
    let raw = raw?.trim();
    // Tolerate timestamps such as "2025-10-17 00:00:00"
    let day = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(day, DATE_FORMAT).ok()
}

/// Convert a Polars DataFrame back to call records, skipping unusable rows
pub fn dataframe_to_records(df: &DataFrame) -> Result<Vec<OptionRecord>> {
    let calls = df
        .clone()
        .lazy()
        .filter(col("optionType").eq(lit("call")))
        .sort_by_exprs(
            vec![col("expirationDate"), col("strike")],
            vec![false, false],
            false,
            true,
        )
        .collect()
        .map_err(|e| DensityError::StoreError(format!("Failed to filter calls: {}", e)))?;

    let strikes = calls.column("strike")?.cast(&DataType::Float64)?;
    let mid_prices = calls.column("midPrice")?.cast(&DataType::Float64)?;
    let expirations = calls.column("expirationDate")?.cast(&DataType::Utf8)?;
    let data_dates = calls.column("dataDate")?.cast(&DataType::Utf8)?;

    let strikes = strikes.f64()?;
    let mid_prices = mid_prices.f64()?;
    let expirations = expirations.utf8()?;
    let data_dates = data_dates.utf8()?;

    let mut records = Vec::with_capacity(calls.height());
    let mut skipped = 0;
    for i in 0..calls.height() {
        let row = (
            strikes.get(i),
            mid_prices.get(i),
            parse_date(expirations.get(i)),
            parse_date(data_dates.get(i)),
        );
        match row {
            (Some(strike), Some(mid_price), Some(expiration_date), Some(data_date)) => {
                records.push(OptionRecord {
                    strike,
                    mid_price,
                    option_type: OptionType::Call,
                    expiration_date,
                    data_date,
                });
            }
            _ => skipped += 1,
        }
    }

    if skipped > 0 {
        warn!("Skipped {} stored row(s) with missing or invalid fields", skipped);
    }

    Ok(records)
}

/// Write records as CSV with a header row
pub fn write_records_csv<P: AsRef<Path>>(records: &[OptionRecord], path: P) -> Result<()> {
    let path = path.as_ref();
    let mut df = records_to_dataframe(records)?;

    let mut file = std::fs::File::create(path)
        .map_err(|e| DensityError::StoreError(format!("Failed to create file: {}", e)))?;

    CsvWriter::new(&mut file)
        .finish(&mut df)
        .map_err(|e| DensityError::StoreError(format!("Failed to write CSV file: {}", e)))?;

    info!("Saved {} records to {}", records.len(), path.display());
    Ok(())
}

/// Load call records from a CSV previously written by [`write_records_csv`]
pub fn read_records_csv<P: AsRef<Path>>(path: P) -> Result<Vec<OptionRecord>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(DensityError::StoreError(format!(
            "CSV file not found: {}",
            path.display()
        )));
    }

    let df = CsvReader::from_path(path)
        .map_err(|e| DensityError::StoreError(format!("Failed to open CSV file: {}", e)))?
        .has_header(true)
        .finish()
        .map_err(|e| DensityError::StoreError(format!("Failed to read CSV file: {}", e)))?;

    info!("Loaded {} rows from {}", df.height(), path.display());
    dataframe_to_records(&df)
}
