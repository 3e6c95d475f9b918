use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use governor::clock::{Clock, DefaultClock};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};

use crate::config::Config;
use crate::error::AppError;
use crate::middleware::client_info::ClientInfo;
use crate::AppState;

/// Paths that go through the stricter processing limiter.
const PROCESSING_PATHS: &[&str] = &["/process-transcript", "/process-text"];

/// Per-client-IP request limiters
pub struct RateLimits {
    general: DefaultKeyedRateLimiter<String>,
    processing: DefaultKeyedRateLimiter<String>,
    clock: DefaultClock,
}

impl RateLimits {
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            quota(
                config.rate_limit_max_requests,
                Duration::from_secs(config.rate_limit_window_secs),
            ),
            quota(
                config.processing_rate_limit_max_requests,
                Duration::from_secs(config.processing_rate_limit_window_secs),
            ),
        )
    }

    pub fn new(general: Quota, processing: Quota) -> Self {
        Self {
            general: RateLimiter::keyed(general),
            processing: RateLimiter::keyed(processing),
            clock: DefaultClock::default(),
        }
    }

    /// Seconds until `key` may retry, or `None` when the request is allowed.
    fn check(&self, limiter: &DefaultKeyedRateLimiter<String>, key: &str) -> Option<u64> {
        match limiter.check_key(&key.to_owned()) {
            Ok(()) => None,
            Err(not_until) => {
                let wait = not_until.wait_time_from(self.clock.now());
                // Round up so clients never retry early
                let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
                Some(secs.max(1))
            }
        }
    }

    pub fn check_general(&self, key: &str) -> Option<u64> {
        self.check(&self.general, key)
    }

    pub fn check_processing(&self, key: &str) -> Option<u64> {
        self.check(&self.processing, key)
    }

    /// Drop state for keys whose limits have fully replenished.
    pub fn prune(&self) {
        self.general.retain_recent();
        self.processing.retain_recent();
    }
}

/// `max_requests` per `window`, all of which may arrive at once.
pub fn quota(max_requests: u32, window: Duration) -> Quota {
    let burst = NonZeroU32::new(max_requests).unwrap_or(NonZeroU32::MIN);
    let period = window
        .checked_div(burst.get())
        .filter(|p| !p.is_zero())
        .unwrap_or(Duration::from_millis(1));

    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst)
}

pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let limits = &state.rate_limits;

    let mut retry_after = limits.check_general(&client.ip);
    if retry_after.is_none() && PROCESSING_PATHS.contains(&request.uri().path()) {
        retry_after = limits.check_processing(&client.ip);
    }

    if let Some(retry_after_secs) = retry_after {
        client.security_event("rate_limited", request.uri().path());
        return Err(AppError::RateLimited { retry_after_secs });
    }

    Ok(next.run(request).await)
}
