//! Per-IP token buckets guarding the generation routes. Every generation
//! request costs a paid model call, so these limits are much tighter than
//! what the read-only routes would need.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::warn;

/// Sustained rate and burst size shared by every client.
#[derive(Debug, Clone, Copy)]
struct Quota {
    per_sec: f64,
    burst: f64,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    seen: Instant,
}

impl Bucket {
    fn full(quota: Quota, now: Instant) -> Self {
        Self {
            tokens: quota.burst,
            seen: now,
        }
    }

    /// Refill for the time since the last visit, then spend one token. On
    /// refusal, returns how long until a whole token is back.
    fn spend(&mut self, quota: Quota, now: Instant) -> Result<(), Duration> {
        let idle = now.saturating_duration_since(self.seen).as_secs_f64();
        self.seen = now;
        self.tokens = (self.tokens + idle * quota.per_sec).min(quota.burst);

        if self.tokens < 1.0 {
            let wait = (1.0 - self.tokens) / quota.per_sec;
            return Err(Duration::try_from_secs_f64(wait).unwrap_or(Duration::MAX));
        }
        self.tokens -= 1.0;
        Ok(())
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    quota: Quota,
    buckets: Arc<Mutex<HashMap<IpAddr, Bucket>>>,
}

impl RateLimiter {
    pub fn new(per_sec: f64, burst: f64) -> Self {
        Self {
            quota: Quota { per_sec, burst },
            buckets: Arc::default(),
        }
    }

    /// `Err` carries the suggested wait in whole seconds, at least one.
    pub async fn check(&self, ip: IpAddr) -> Result<(), u64> {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().await;
        buckets
            .entry(ip)
            .or_insert_with(|| Bucket::full(self.quota, now))
            .spend(self.quota, now)
            .map_err(|wait| wait.as_secs_f64().ceil().max(1.0) as u64)
    }

    /// Forget clients that have not been seen for `max_idle`.
    pub async fn purge_stale(&self, max_idle: Duration) {
        let now = Instant::now();
        self.buckets
            .lock()
            .await
            .retain(|_, bucket| now.saturating_duration_since(bucket.seen) < max_idle);
    }
}

pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    req: Request,
    next: Next,
) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    // Requests with no attributable address are let through.
    let Some(ip) = peer.or_else(|| forwarded_ip(req.headers())) else {
        return next.run(req).await;
    };

    match limiter.check(ip).await {
        Ok(()) => next.run(req).await,
        Err(retry_after) => {
            warn!(ip = %ip, path = %req.uri().path(), retry_after, "Generation rate limit exceeded");
            (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, HeaderValue::from(retry_after))],
                Json(serde_json::json!({ "error": "Too many generation requests" })),
            )
                .into_response()
        }
    }
}

/// First hop of `X-Forwarded-For`, else `X-Real-IP`.
fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    ["x-forwarded-for", "x-real-ip"].into_iter().find_map(|name| {
        headers
            .get(name)?
            .to_str()
            .ok()?
            .split(',')
            .next()?
            .trim()
            .parse()
            .ok()
    })
}
