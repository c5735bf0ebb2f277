//! Aggregate request-rate cap shared by all workers of a run

use std::num::NonZeroU32;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Token bucket (governor) capping the combined request rate
///
/// The engine builds one and hands every worker an `Arc` to it, so the cap
/// applies to the run as a whole, not per virtual user.
pub struct RequestRateLimiter {
    bucket: Option<DirectLimiter>,
    rps: Option<f64>,
}

/// Quota for `rps` requests per second, `None` when the rate disables limiting
///
/// At one request per second or more the bucket holds a full second of
/// permits. Slower rates release a single permit per period.
fn quota_for(rps: f64) -> Option<Quota> {
    if !rps.is_finite() || rps <= 0.0 {
        return None;
    }
    if rps >= 1.0 {
        let per_second = u32::try_from(rps.round() as u64).unwrap_or(u32::MAX);
        NonZeroU32::new(per_second).map(Quota::per_second)
    } else {
        Quota::with_period(Duration::from_secs_f64(1.0 / rps))
    }
}

impl RequestRateLimiter {
    /// Limiter for `rps` requests per second; `None` leaves the run uncapped
    ///
    /// ```
    /// use tsunami_core::worker::RequestRateLimiter;
    ///
    /// assert!(RequestRateLimiter::new(Some(250.0)).is_enabled());
    /// assert!(!RequestRateLimiter::new(None).is_enabled());
    /// ```
    pub fn new(rps: Option<f64>) -> Self {
        let bucket = rps.and_then(quota_for).map(RateLimiter::direct);
        if let (Some(rps), None) = (rps, &bucket) {
            tracing::warn!(rps, "Ignoring unusable rate limit");
        }
        Self { bucket, rps }
    }

    /// Limiter that never waits
    pub fn unlimited() -> Self {
        Self {
            bucket: None,
            rps: None,
        }
    }

    /// Block until the bucket grants a permit
    pub async fn wait(&self) {
        if let Some(bucket) = &self.bucket {
            bucket.until_ready().await;
        }
    }

    /// Take a permit if one is available right now
    pub fn try_acquire(&self) -> bool {
        self.bucket
            .as_ref()
            .map_or(true, |bucket| bucket.check().is_ok())
    }

    /// Whether a cap is in force
    pub fn is_enabled(&self) -> bool {
        self.bucket.is_some()
    }

    /// Configured rate, as given
    pub fn rate_limit(&self) -> Option<f64> {
        self.rps
    }
}

impl Default for RequestRateLimiter {
    fn default() -> Self {
        Self::unlimited()
    }
}

impl std::fmt::Debug for RequestRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestRateLimiter")
            .field("rps", &self.rps)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_for_rates() {
        assert!(quota_for(0.0).is_none());
        assert!(quota_for(-3.0).is_none());
        assert!(quota_for(f64::NAN).is_none());
        assert!(quota_for(f64::INFINITY).is_none());

        let quota = quota_for(20.0).unwrap();
        assert_eq!(quota.burst_size().get(), 20);
        assert_eq!(quota.replenish_interval(), Duration::from_millis(50));

        let slow = quota_for(0.25).unwrap();
        assert_eq!(slow.burst_size().get(), 1);
        assert_eq!(slow.replenish_interval(), Duration::from_secs(4));
    }

    #[test]
    fn test_unlimited_always_grants() {
        let limiter = RequestRateLimiter::unlimited();
        assert!(!limiter.is_enabled());
        assert_eq!(limiter.rate_limit(), None);
        for _ in 0..1000 {
            assert!(limiter.try_acquire());
        }
    }

    #[test]
    fn test_unusable_rate_disables_cap() {
        let limiter = RequestRateLimiter::new(Some(0.0));
        assert!(!limiter.is_enabled());
        assert_eq!(limiter.rate_limit(), Some(0.0));
    }

    #[test]
    fn test_burst_is_one_second_of_permits() {
        let limiter = RequestRateLimiter::new(Some(3.0));
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn test_slow_rate_grants_single_permit() {
        let limiter = RequestRateLimiter::new(Some(0.5));
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[tokio::test]
    async fn test_wait_returns_within_burst() {
        RequestRateLimiter::unlimited().wait().await;

        let limiter = RequestRateLimiter::new(Some(1000.0));
        for _ in 0..10 {
            limiter.wait().await;
        }
    }
}
