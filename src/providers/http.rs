use governor::{DefaultDirectRateLimiter, Jitter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Rate-limited outbound HTTP client shared by the provider integrations.
///
/// Both providers meter API keys per second; we stay under their limits
/// locally instead of burning the budget on 429 responses.
#[derive(Debug, Clone)]
pub struct RateLimitedHttpClient {
    inner: reqwest::Client,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
}

impl RateLimitedHttpClient {
    pub fn new(requests_per_second: u32) -> Self {
        let per_second = NonZeroU32::new(requests_per_second.max(1)).unwrap();
        let quota = Quota::per_second(per_second).allow_burst(per_second);

        Self {
            inner: reqwest::Client::new(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Wait for rate limit clearance, then hand out the underlying client.
    pub async fn ready(&self) -> &reqwest::Client {
        self.rate_limiter
            .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(100)))
            .await;
        debug!("Outbound provider request cleared rate limiter");
        &self.inner
    }
}
