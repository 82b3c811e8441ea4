use chrono::NaiveDate;
use thiserror::Error;

/// Custom error types for the rnd-surface library
#[derive(Error, Debug)]
pub enum DensityError {
    /// Normalization could not fill the strike grid (fewer than two usable mid-prices).
    #[error("Insufficient data for {expiration}: {known} usable mid-price(s), need at least 2")]
    InsufficientData { expiration: NaiveDate, known: usize },

    /// Resampling could not build a triangulated surface.
    #[error("Insufficient surface data ({points} point(s)): {reason}")]
    InsufficientSurfaceData { points: usize, reason: String },

    /// A quote outside the configured bounds or missing a required field.
    #[error("Malformed quote at strike {strike}: {reason}")]
    MalformedQuote { strike: f64, reason: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Fetch error: {0}")]
    FetchError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Plot error: {0}")]
    PlotError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serde error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("Polars error: {0}")]
    PolarsError(#[from] polars::prelude::PolarsError),

    #[error("{0}")]
    Other(String),
}

impl DensityError {
    /// Whether retrying the failed operation could succeed.
    ///
    /// Only network-level failures are worth another attempt; everything
    /// else is a property of the data or the configuration.
    pub fn is_transient(&self) -> bool {
        matches!(self, DensityError::FetchError(_) | DensityError::IoError(_))
    }
}

pub type Result<T> = std::result::Result<T, DensityError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_data_display_names_expiration() {
        let err = DensityError::InsufficientData {
            expiration: NaiveDate::from_ymd_opt(2025, 10, 17).unwrap(),
            known: 1,
        };
        let msg = err.to_string();
        assert!(msg.contains("2025-10-17"));
        assert!(msg.contains("1 usable"));
    }

    #[test]
    fn only_fetch_and_io_errors_are_transient() {
        assert!(DensityError::FetchError("timeout".into()).is_transient());
        assert!(!DensityError::ParseError("bad json".into()).is_transient());
        assert!(!DensityError::InsufficientSurfaceData {
            points: 0,
            reason: "empty".into()
        }
        .is_transient());
    }

    #[test]
    fn error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<DensityError>();
    }
}
