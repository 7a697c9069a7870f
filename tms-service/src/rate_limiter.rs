//! Per-principal rate limiting across the service's four fixed classes:
//! general API, send-message, inbound WebSocket events, and upload-URL
//! issuance. Each class gets its own in-memory token bucket per principal,
//! built the same way [`crate::middleware::governor::GovernorRateLimit`]
//! builds its per-key limiters, but scoped to `RateLimitConfig`'s fixed
//! fields instead of an open route-pattern map -- this service only ever
//! needs these four classes, not arbitrary per-route configuration.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use governor::{clock::DefaultClock, state::{InMemoryState, NotKeyed}, Quota, RateLimiter as GovernorLimiter};

use crate::config::{RateLimitConfig, RouteRateLimitConfig};
use crate::error::{Error, Result};

type Limiter = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Which of the service's four rate-limit classes a call falls under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitClass {
    General,
    SendMessage,
    WsEvents,
    UploadUrl,
}

impl RateLimitClass {
    fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::SendMessage => "send_message",
            Self::WsEvents => "ws_events",
            Self::UploadUrl => "upload_url",
        }
    }
}

/// Per-principal, per-class rate limiting.
///
/// Limiters are created lazily, one per (class, principal) pair, and kept
/// for the life of the process -- the same approach the governor
/// middleware uses, minus the open route-pattern map this service has no
/// use for.
pub struct RateLimiter {
    config: RateLimitConfig,
    limiters: DashMap<(RateLimitClass, String), Arc<Limiter>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            limiters: DashMap::new(),
        }
    }

    /// Check whether `principal_id` may proceed under `class`. Returns
    /// `Err(Error::RateLimitExceeded)` on rejection, distinct from any
    /// other error this call can't otherwise produce.
    pub fn check(&self, class: RateLimitClass, principal_id: &str) -> Result<()> {
        let route = self.route_config(class);
        let key = (class, principal_id.to_string());

        let limiter = self
            .limiters
            .entry(key)
            .or_insert_with(|| Arc::new(Self::build_limiter(route)))
            .clone();

        limiter.check().map_err(|_| Error::RateLimitExceeded)
    }

    /// How long a caller rejected under `class` should wait before retrying,
    /// for a `Retry-After` header. This is the class's period, not an exact
    /// remaining-capacity estimate -- `governor` doesn't expose one for a
    /// `check()`-only caller.
    pub fn retry_after(&self, class: RateLimitClass) -> Duration {
        self.route_config(class).period()
    }

    fn route_config(&self, class: RateLimitClass) -> &RouteRateLimitConfig {
        match class {
            RateLimitClass::General => &self.config.general,
            RateLimitClass::SendMessage => &self.config.send_message,
            RateLimitClass::WsEvents => &self.config.ws_events,
            RateLimitClass::UploadUrl => &self.config.upload_url,
        }
    }

    fn build_limiter(route: &RouteRateLimitConfig) -> Limiter {
        let period_ms = route.period_secs.max(1) * 1000;
        let replenish_interval_ms = period_ms / (route.requests_per_period as u64).max(1);
        let burst = NonZeroU32::new(route.burst_size.max(1)).unwrap();
        let quota = Quota::with_period(Duration::from_millis(replenish_interval_ms.max(1)))
            .expect("replenish interval is non-zero")
            .allow_burst(burst);
        GovernorLimiter::direct(quota)
    }

    /// Drop limiters for principals that haven't been seen recently. Call
    /// this periodically so a long-running process doesn't accumulate one
    /// limiter per historical caller forever.
    pub fn cleanup(&self, max_entries: usize) {
        if self.limiters.len() <= max_entries {
            return;
        }
        let overflow = self.limiters.len() - max_entries;
        let keys: Vec<_> = self.limiters.iter().take(overflow).map(|e| e.key().clone()).collect();
        for key in keys {
            self.limiters.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn general_class_allows_burst_then_rejects() {
        let mut config = RateLimitConfig::default();
        config.general = RouteRateLimitConfig {
            requests_per_period: 60,
            period_secs: 60,
            burst_size: 2,
            per_user: true,
        };
        let limiter = RateLimiter::new(config);

        assert!(limiter.check(RateLimitClass::General, "user-1").is_ok());
        assert!(limiter.check(RateLimitClass::General, "user-1").is_ok());
        assert!(limiter.check(RateLimitClass::General, "user-1").is_err());
    }

    #[test]
    fn classes_and_principals_are_independent() {
        let mut config = RateLimitConfig::default();
        config.send_message = RouteRateLimitConfig {
            requests_per_period: 30,
            period_secs: 60,
            burst_size: 1,
            per_user: true,
        };
        let limiter = RateLimiter::new(config);

        assert!(limiter.check(RateLimitClass::SendMessage, "user-1").is_ok());
        assert!(limiter.check(RateLimitClass::SendMessage, "user-1").is_err());
        // A different principal has its own bucket.
        assert!(limiter.check(RateLimitClass::SendMessage, "user-2").is_ok());
        // A different class for the same principal has its own bucket too.
        assert!(limiter.check(RateLimitClass::General, "user-1").is_ok());
    }

    #[test]
    fn retry_after_matches_class_period() {
        let config = RateLimitConfig::default();
        let limiter = RateLimiter::new(config);
        assert_eq!(limiter.retry_after(RateLimitClass::WsEvents), Duration::from_secs(1));
        assert_eq!(limiter.retry_after(RateLimitClass::UploadUrl), Duration::from_secs(60));
    }
}
