//! Best-effort, in-process rate limiting
//!
//! A token bucket per caller identifier. Not durable and not distributed:
//! counters reset on process restart, which is acceptable for an
//! abuse-deterrence heuristic but never for correctness.

use axum::{
    body::Body,
    extract::Request,
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{collections::HashMap, sync::Arc, time::Instant};
use tokio::sync::RwLock;

/// Token bucket for one caller
#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(max_tokens: f64) -> Self {
        Self {
            tokens: max_tokens,
            last_update: Instant::now(),
        }
    }

    fn try_consume(&mut self, tokens_per_second: f64, max_tokens: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();

        self.tokens = (self.tokens + elapsed * tokens_per_second).min(max_tokens);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Rate limiter state, shared across requests
#[derive(Clone)]
pub struct RateLimiter {
    buckets: Arc<RwLock<HashMap<String, TokenBucket>>>,
    tokens_per_second: f64,
    max_tokens: f64,
}

impl RateLimiter {
    /// Create a limiter allowing `requests_per_second` sustained, with a 2x
    /// burst allowance.
    pub fn new(requests_per_second: u32) -> Self {
        Self {
            buckets: Arc::new(RwLock::new(HashMap::new())),
            tokens_per_second: requests_per_second as f64,
            max_tokens: (requests_per_second * 2) as f64,
        }
    }

    /// Check if a request from `key` is allowed
    pub async fn check(&self, key: &str) -> bool {
        let mut buckets = self.buckets.write().await;

        let bucket = buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::new(self.max_tokens));

        bucket.try_consume(self.tokens_per_second, self.max_tokens)
    }

    /// Drop buckets idle longer than `max_age` (call periodically)
    pub async fn cleanup(&self, max_age: std::time::Duration) {
        let mut buckets = self.buckets.write().await;
        let now = Instant::now();

        buckets.retain(|_, bucket| now.duration_since(bucket.last_update) < max_age);
    }
}

/// Create rate limiting middleware
pub fn rate_limit_layer(
    rate_limiter: RateLimiter,
) -> impl Fn(
    Request<Body>,
    Next,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Response> + Send>>
       + Clone
       + Send {
    move |request: Request<Body>, next: Next| {
        let rate_limiter = rate_limiter.clone();
        Box::pin(async move {
            let caller_key = extract_caller_key(&request);

            if !rate_limiter.check(&caller_key).await {
                tracing::warn!(caller = %caller_key, "Rate limit exceeded");
                return (
                    StatusCode::TOO_MANY_REQUESTS,
                    [(header::RETRY_AFTER, "1")],
                    "Too many requests. Please try again later.",
                )
                    .into_response();
            }

            next.run(request).await
        })
    }
}

/// Identify the caller for bucketing.
///
/// Authenticated callers are keyed by their bearer credential, so one user
/// behind a shared NAT cannot exhaust the budget of everyone else on it;
/// anonymous callers fall back to the client IP.
fn extract_caller_key(request: &Request<Body>) -> String {
    if let Some(authorization) = request.headers().get(header::AUTHORIZATION) {
        if let Ok(s) = authorization.to_str() {
            return format!("bearer:{s}");
        }
    }

    if let Some(forwarded) = request.headers().get("x-forwarded-for") {
        if let Ok(s) = forwarded.to_str() {
            if let Some(ip) = s.split(',').next() {
                return format!("ip:{}", ip.trim());
            }
        }
    }

    if let Some(real_ip) = request.headers().get("x-real-ip") {
        if let Ok(s) = real_ip.to_str() {
            return format!("ip:{s}");
        }
    }

    "anonymous".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rate_limiter_exhausts_burst() {
        let limiter = RateLimiter::new(5);

        // Burst capacity is 2x the sustained rate
        for _ in 0..10 {
            assert!(limiter.check("caller-1").await);
        }

        assert!(!limiter.check("caller-1").await);
    }

    #[tokio::test]
    async fn test_rate_limiter_separates_callers() {
        let limiter = RateLimiter::new(2);

        assert!(limiter.check("caller-a").await);
        assert!(limiter.check("caller-b").await);
        assert!(limiter.check("caller-a").await);
        assert!(limiter.check("caller-b").await);
    }

    #[tokio::test]
    async fn test_cleanup_retains_recent_buckets() {
        let limiter = RateLimiter::new(2);
        limiter.check("caller-a").await;

        limiter.cleanup(std::time::Duration::from_secs(60)).await;
        assert_eq!(limiter.buckets.read().await.len(), 1);

        limiter.cleanup(std::time::Duration::from_nanos(0)).await;
        assert!(limiter.buckets.read().await.is_empty());
    }
}
