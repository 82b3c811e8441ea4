use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorRateLimiter,
};
use nonzero_ext::nonzero;
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::trace;

type Limiter = GovernorRateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Requests-per-minute gate shared by every call a client makes
#[derive(Clone)]
pub struct RequestLimiter {
    limiter: Option<Arc<Limiter>>,
}

impl RequestLimiter {
    /// A quota of zero disables limiting
    pub fn per_minute(requests: u32) -> Self {
        let limiter = NonZeroU32::new(requests)
            .map(|rate| Arc::new(GovernorRateLimiter::direct(Quota::per_minute(rate))));
        Self { limiter }
    }

    pub fn is_limited(&self) -> bool {
        self.limiter.is_some()
    }

    /// Wait until the quota admits one more request
    pub async fn acquire(&self) {
        if let Some(limiter) = &self.limiter {
            if limiter.check().is_err() {
                trace!("Request quota exhausted, waiting");
                limiter.until_ready().await;
            }
        }
    }

    /// Non-blocking variant of [`acquire`](Self::acquire)
    pub fn try_acquire(&self) -> bool {
        self.limiter
            .as_ref()
            .map_or(true, |limiter| limiter.check().is_ok())
    }
}

impl Default for RequestLimiter {
    fn default() -> Self {
        let rate: NonZeroU32 = nonzero!(20u32);
        Self::per_minute(rate.get())
    }
}

impl std::fmt::Debug for RequestLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestLimiter")
            .field("limited", &self.is_limited())
            .finish()
    }
}
