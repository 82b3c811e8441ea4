//! # rnd-surface
//!
//! Turns sparse call quotes across strikes and expirations into a
//! risk-neutral density surface.
//!
//! ## Features
//!
//! - Normalization of irregular quote sets onto an evenly spaced strike grid
//! - Breeden-Litzenberger density estimation per expiration
//! - Resampling of scattered density samples onto a regular surface
//! - Yahoo Finance fetching with retry, backoff and rate limiting
//! - CSV persistence, PNG heatmaps and JSON export
//! - Environment-based configuration
//!
//! ## Example
//!
//! ```rust,no_run
//! use rnd_surface::api::{fetch_batches, YahooClient};
//! use rnd_surface::config::Config;
//! use rnd_surface::pipeline::run_pipeline;
//! use rnd_surface::utils::plot_density_surface;
//!
//! #[tokio::main]
//! async fn main() -> rnd_surface::Result<()> {
//!     let config = Config::from_env()?;
//!     config.init_logging()?;
//!
//!     let client = YahooClient::new(&config.fetch)?;
//!     let outcomes = fetch_batches(
//!         &client,
//!         &config.ticker,
//!         &config.fetch,
//!         config.analysis.num_expirations,
//!     )
//!     .await?;
//!
//!     let today = chrono::Local::now().date_naive();
//!     let report = run_pipeline(outcomes, &config.analysis, today)?;
//!     if let Ok(surface) = &report.surface {
//!         plot_density_surface(surface, &config.ticker, "density_surface.png")?;
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod utils;

// Re-export commonly used types
pub use api::{QuoteSource, YahooClient};
pub use config::Config;
pub use error::{DensityError, Result};
pub use pipeline::{run_pipeline, RunReport};
