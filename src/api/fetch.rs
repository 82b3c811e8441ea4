use crate::api::retry::{retry_with_backoff, RetryPolicy};
use crate::api::QuoteSource;
use crate::config::FetchConfig;
use crate::error::{DensityError, Result};
use crate::models::QuoteBatch;
use chrono::NaiveDate;
use tracing::{info, warn};

/// Result of fetching one scheduled expiration
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Fetched(QuoteBatch),
    /// Retries were exhausted or the failure was permanent
    Failed { expiration: NaiveDate, reason: String },
}

impl FetchOutcome {
    pub fn expiration(&self) -> NaiveDate {
        match self {
            FetchOutcome::Fetched(batch) => batch.expiration,
            FetchOutcome::Failed { expiration, .. } => *expiration,
        }
    }

    pub fn is_fetched(&self) -> bool {
        matches!(self, FetchOutcome::Fetched(_))
    }
}

/// Fetch call chains for the next `num_expirations` listed expirations.
///
/// Failing to list expirations aborts the run. A chain that still fails
/// after retries becomes [`FetchOutcome::Failed`] so the remaining
/// expirations are still processed. Consecutive chain requests are spaced
/// by `config.request_delay`.
pub async fn fetch_batches<S: QuoteSource>(
    source: &S,
    symbol: &str,
    config: &FetchConfig,
    num_expirations: usize,
) -> Result<Vec<FetchOutcome>> {
    let policy = RetryPolicy::from_config(config);

    let listed =
        retry_with_backoff(&policy, "list expirations", || source.expirations(symbol)).await?;
    if listed.is_empty() {
        return Err(DensityError::Other(format!("{} lists no expirations", symbol)));
    }

    let scheduled: Vec<NaiveDate> = listed.into_iter().take(num_expirations).collect();
    info!("Fetching {} expiration(s) for {}: {:?}", scheduled.len(), symbol, scheduled);

    let mut outcomes = Vec::with_capacity(scheduled.len());
    for (i, &expiration) in scheduled.iter().enumerate() {
        if i > 0 && !config.request_delay.is_zero() {
            tokio::time::sleep(config.request_delay).await;
        }

        let label = format!("{} chain {}", symbol, expiration);
        let fetched =
            retry_with_backoff(&policy, &label, || source.option_chain(symbol, expiration)).await;
        match fetched {
            Ok(batch) => {
                info!("Fetched {} call quote(s) for {}", batch.len(), expiration);
                outcomes.push(FetchOutcome::Fetched(batch));
            }
            Err(e) => {
                warn!("Giving up on {}: {}", expiration, e);
                outcomes.push(FetchOutcome::Failed {
                    expiration,
                    reason: e.to_string(),
                });
            }
        }
    }

    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, d).unwrap()
    }

    /// In-memory source; `flaky` expirations fail transiently that many times first
    struct MockSource {
        expirations: Vec<NaiveDate>,
        flaky: HashMap<NaiveDate, u32>,
        broken: Vec<NaiveDate>,
        calls: AtomicU32,
    }

    impl MockSource {
        fn new(expirations: Vec<NaiveDate>) -> Self {
            Self {
                expirations,
                flaky: HashMap::new(),
                broken: Vec::new(),
                calls: AtomicU32::new(0),
            }
        }
    }

    impl QuoteSource for MockSource {
        async fn expirations(&self, _symbol: &str) -> Result<Vec<NaiveDate>> {
            Ok(self.expirations.clone())
        }

        async fn option_chain(&self, _symbol: &str, expiration: NaiveDate) -> Result<QuoteBatch> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.broken.contains(&expiration) {
                return Err(DensityError::ParseError("garbled".into()));
            }
            if let Some(&failures) = self.flaky.get(&expiration) {
                if n < failures {
                    return Err(DensityError::FetchError("429".into()));
                }
            }
            Ok(QuoteBatch::from_triples(
                expiration,
                &[(6000.0, 99.0, 101.0), (6005.0, 94.0, 96.0)],
            ))
        }
    }

    fn fast_config() -> FetchConfig {
        FetchConfig {
            request_delay: Duration::ZERO,
            retry_delay: Duration::ZERO,
            max_retry_delay: Duration::ZERO,
            max_attempts: 3,
            ..FetchConfig::default()
        }
    }

    #[tokio::test]
    async fn takes_the_first_n_expirations() {
        let source = MockSource::new(vec![date(17), date(24), date(31)]);
        let outcomes = fetch_batches(&source, "^SPX", &fast_config(), 2).await.unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].expiration(), date(17));
        assert_eq!(outcomes[1].expiration(), date(24));
        assert!(outcomes.iter().all(FetchOutcome::is_fetched));
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let mut source = MockSource::new(vec![date(17)]);
        source.flaky.insert(date(17), 2);
        let outcomes = fetch_batches(&source, "^SPX", &fast_config(), 5).await.unwrap();
        assert!(outcomes[0].is_fetched());
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failure_is_recorded_and_run_continues() {
        let mut source = MockSource::new(vec![date(17), date(24)]);
        source.broken.push(date(17));
        let outcomes = fetch_batches(&source, "^SPX", &fast_config(), 5).await.unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(matches!(
            &outcomes[0],
            FetchOutcome::Failed { expiration, reason }
                if *expiration == date(17) && reason.contains("garbled")
        ));
        assert!(outcomes[1].is_fetched());
    }

    #[tokio::test]
    async fn no_listed_expirations_is_an_error() {
        let source = MockSource::new(Vec::new());
        assert!(fetch_batches(&source, "^SPX", &fast_config(), 5).await.is_err());
    }
}
