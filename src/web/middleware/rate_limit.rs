//! Per-client request rate limiting for the API.

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    clock::{Clock, DefaultClock},
    DefaultKeyedRateLimiter, Quota, RateLimiter,
};
use std::{net::SocketAddr, num::NonZeroU32, sync::Arc, time::Duration};

use crate::web::error::ApiError;

/// Requests-per-minute limiter keyed by client IP.
pub struct RateLimitState {
    limiter: DefaultKeyedRateLimiter<String>,
    clock: DefaultClock,
    requests_per_minute: u32,
}

impl RateLimitState {
    /// Create a limiter allowing `requests_per_minute` per client.
    pub fn new(requests_per_minute: u32) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN));
        Self {
            limiter: RateLimiter::keyed(quota),
            clock: DefaultClock::default(),
            requests_per_minute,
        }
    }

    /// Configured requests per minute.
    pub fn requests_per_minute(&self) -> u32 {
        self.requests_per_minute
    }

    /// `Ok` if `ip` may proceed, otherwise the time until it may.
    pub fn check(&self, ip: &str) -> Result<(), Duration> {
        self.limiter
            .check_key(&ip.to_string())
            .map_err(|not_until| not_until.wait_time_from(self.clock.now()))
    }

    /// Drop state for clients that are back under quota.
    pub fn cleanup(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
    }

    /// Periodically call [`cleanup`](Self::cleanup).
    pub fn start_cleanup_task(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(300));
            loop {
                ticker.tick().await;
                self.cleanup();
            }
        });
    }
}

/// Extract client IP from request.
fn client_ip(req: &Request<Body>) -> String {
    let headers = req.headers();
    if let Some(ip) = headers
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
    {
        return ip.trim().to_string();
    }
    if let Some(ip) = headers.get("X-Real-IP").and_then(|v| v.to_str().ok()) {
        return ip.trim().to_string();
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Rate limiting middleware for the API routes.
pub async fn api_rate_limit(
    state: Arc<RateLimitState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let ip = client_ip(&req);

    if let Err(wait) = state.check(&ip) {
        tracing::warn!(ip = %ip, "API rate limit exceeded");
        let retry_after = wait.as_secs_f64().ceil().max(1.0) as u64;
        return ApiError::too_many_requests("Too many requests. Please try again later.", retry_after)
            .into_response();
    }

    next.run(req).await
}
