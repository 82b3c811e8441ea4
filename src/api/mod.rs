//! Market-data collaborators
//!
//! [`QuoteSource`] is the seam between the density pipeline and wherever
//! call quotes come from. [`yahoo::YahooClient`] is the live
//! implementation; [`fetch::fetch_batches`] drives any source with retry,
//! rate limiting and pacing between expirations.

pub mod fetch;
pub mod rate_limit;
pub mod retry;
pub mod yahoo;

use crate::error::Result;
use crate::models::QuoteBatch;
use chrono::NaiveDate;
use std::future::Future;

pub use fetch::{fetch_batches, FetchOutcome};
pub use rate_limit::RequestLimiter;
pub use retry::{retry_with_backoff, RetryPolicy};
pub use yahoo::YahooClient;

/// Anything that can list expirations and deliver a call chain for one of them
pub trait QuoteSource {
    /// Listed expirations for `symbol`, ascending
    fn expirations(&self, symbol: &str) -> impl Future<Output = Result<Vec<NaiveDate>>> + Send;

    /// Call quotes for one expiration
    fn option_chain(
        &self,
        symbol: &str,
        expiration: NaiveDate,
    ) -> impl Future<Output = Result<QuoteBatch>> + Send;
}
