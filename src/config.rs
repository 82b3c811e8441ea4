use crate::error::{DensityError, Result};
use crate::models::MAX_GRID_STRIKES;
use dotenv::dotenv;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Inputs to the numeric pipeline
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    /// Lowest strike on the canonical grid
    pub strike_min: f64,
    /// Highest strike on the canonical grid
    pub strike_max: f64,
    /// Spacing between grid strikes
    pub strike_step: f64,
    /// Number of nearest expirations to analyze
    pub num_expirations: usize,
    /// Points on the resampled strike axis
    pub strike_axis_resolution: usize,
    /// Points on the resampled day-offset axis
    pub day_offset_axis_resolution: usize,
    /// Process expirations on the rayon pool
    pub parallel: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            strike_min: 6000.0,
            strike_max: 7000.0,
            strike_step: 5.0,
            num_expirations: 5,
            strike_axis_resolution: 100,
            day_offset_axis_resolution: 50,
            parallel: false,
        }
    }
}

/// Configuration for the quote fetch collaborator
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// Yahoo Finance options endpoint
    pub base_url: String,
    /// Pause between consecutive expirations
    pub request_delay: Duration,
    /// First retry delay after a failed request
    pub retry_delay: Duration,
    /// Upper bound on the exponential retry delay
    pub max_retry_delay: Duration,
    /// Attempts per expiration before giving up on it
    pub max_attempts: u32,
    /// Request quota enforced by the rate limiter
    pub requests_per_minute: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://query2.finance.yahoo.com/v7/finance/options".to_string(),
            request_delay: Duration::from_secs(3),
            retry_delay: Duration::from_secs(20),
            max_retry_delay: Duration::from_secs(120),
            max_attempts: 5,
            requests_per_minute: 20,
        }
    }
}

/// Configuration for the application
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Underlying ticker, e.g. `^SPX`
    pub ticker: String,
    pub analysis: AnalysisConfig,
    pub fetch: FetchConfig,
    /// Directory receiving the CSV, PNG and JSON artifacts
    pub output_dir: PathBuf,
    /// Log level
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ticker: "^SPX".to_string(),
            analysis: AnalysisConfig::default(),
            fetch: FetchConfig::default(),
            output_dir: PathBuf::from("output"),
            log_level: "info".to_string(),
        }
    }
}

fn parse_var<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse::<T>().map_err(|e| {
            DensityError::ConfigError(format!("{} has invalid value '{}': {}", key, raw, e))
        }),
        None => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let analysis_defaults = defaults.analysis;
        let fetch_defaults = defaults.fetch;

        let analysis = AnalysisConfig {
            strike_min: parse_var(&lookup, "STRIKE_MIN", analysis_defaults.strike_min)?,
            strike_max: parse_var(&lookup, "STRIKE_MAX", analysis_defaults.strike_max)?,
            strike_step: parse_var(&lookup, "STRIKE_STEP", analysis_defaults.strike_step)?,
            num_expirations: parse_var(
                &lookup,
                "NUM_EXPIRATIONS",
                analysis_defaults.num_expirations,
            )?,
            strike_axis_resolution: parse_var(
                &lookup,
                "STRIKE_AXIS_RESOLUTION",
                analysis_defaults.strike_axis_resolution,
            )?,
            day_offset_axis_resolution: parse_var(
                &lookup,
                "DAY_OFFSET_AXIS_RESOLUTION",
                analysis_defaults.day_offset_axis_resolution,
            )?,
            parallel: lookup("PARALLEL")
                .map(|v| v.to_lowercase() == "true")
                .unwrap_or(analysis_defaults.parallel),
        };

        let fetch = FetchConfig {
            base_url: lookup("YAHOO_BASE_URL").unwrap_or(fetch_defaults.base_url),
            request_delay: Duration::from_secs(parse_var(
                &lookup,
                "FETCH_DELAY_SECS",
                fetch_defaults.request_delay.as_secs(),
            )?),
            retry_delay: Duration::from_secs(parse_var(
                &lookup,
                "RETRY_DELAY_SECS",
                fetch_defaults.retry_delay.as_secs(),
            )?),
            max_retry_delay: Duration::from_secs(parse_var(
                &lookup,
                "RETRY_MAX_DELAY_SECS",
                fetch_defaults.max_retry_delay.as_secs(),
            )?),
            max_attempts: parse_var(&lookup, "FETCH_MAX_ATTEMPTS", fetch_defaults.max_attempts)?,
            requests_per_minute: parse_var(
                &lookup,
                "REQUESTS_PER_MINUTE",
                fetch_defaults.requests_per_minute,
            )?,
        };

        let config = Config {
            ticker: lookup("TICKER").unwrap_or(defaults.ticker),
            analysis,
            fetch,
            output_dir: lookup("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            log_level: lookup("LOG_LEVEL").unwrap_or(defaults.log_level),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let a = &self.analysis;
        if !a.strike_min.is_finite() || !a.strike_max.is_finite() || !a.strike_step.is_finite() {
            return Err(DensityError::ConfigError(
                "strike bounds and step must be finite".to_string(),
            ));
        }
        if a.strike_step <= 0.0 {
            return Err(DensityError::ConfigError(format!(
                "STRIKE_STEP must be positive, got {}",
                a.strike_step
            )));
        }
        if a.strike_max < a.strike_min {
            return Err(DensityError::ConfigError(format!(
                "STRIKE_MAX ({}) is below STRIKE_MIN ({})",
                a.strike_max, a.strike_min
            )));
        }
        if (a.strike_max - a.strike_min) / a.strike_step >= MAX_GRID_STRIKES as f64 {
            return Err(DensityError::ConfigError(format!(
                "STRIKE_STEP {} gives more than {} strikes between {} and {}",
                a.strike_step, MAX_GRID_STRIKES, a.strike_min, a.strike_max
            )));
        }
        if a.num_expirations == 0 {
            return Err(DensityError::ConfigError(
                "NUM_EXPIRATIONS must be at least 1".to_string(),
            ));
        }
        if a.strike_axis_resolution < 2 || a.day_offset_axis_resolution < 2 {
            return Err(DensityError::ConfigError(
                "axis resolutions must be at least 2".to_string(),
            ));
        }
        if self.fetch.max_attempts == 0 || self.fetch.requests_per_minute == 0 {
            return Err(DensityError::ConfigError(
                "FETCH_MAX_ATTEMPTS and REQUESTS_PER_MINUTE must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// File name of the flat record set, e.g.
    /// `SPX_options_next5_6000_7000_mid_actual_interpolated.csv`
    pub fn records_file_name(&self) -> String {
        format!(
            "{}_options_next{}_{}_{}_mid_actual_interpolated.csv",
            self.ticker.trim_start_matches('^'),
            self.analysis.num_expirations,
            self.analysis.strike_min,
            self.analysis.strike_max
        )
    }

    /// Initialize logging based on configuration
    pub fn init_logging(&self) -> Result<()> {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.log_level));

        fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
            .map_err(|e| DensityError::ConfigError(format!("Failed to install logger: {}", e)))?;

        Ok(())
    }
}
