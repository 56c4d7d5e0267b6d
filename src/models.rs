use std::sync::Arc;
use std::time::{Duration, Instant};
use http::{StatusCode, HeaderMap};
use bytes::Bytes;

use crate::config::GatewayConfig;
use crate::services::{RateLimiter, ResponseCache};

pub struct CacheEntry<T> {
    pub value: T,
    /// `None` when the TTL overflows `Instant`; such entries never expire.
    pub expires_at: Option<Instant>,
}

impl<T> CacheEntry<T> {
    pub fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |expires_at| now < expires_at)
    }
}

impl<T> std::fmt::Debug for CacheEntry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Counter for one key's current fixed window.
#[derive(Debug, Clone, Copy)]
pub struct RateWindow {
    pub count: u32,
    /// Calls turned away since the window opened.
    pub rejections: u32,
    pub window_start: Instant,
    /// Budget window from the most recent call, used only when purging.
    pub window: Duration,
}

impl RateWindow {
    pub fn open(now: Instant, window: Duration) -> Self {
        Self {
            count: 1,
            rejections: 0,
            window_start: now,
            window,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.window_start) >= self.window
    }
}

/// Upstream response kept by the gateway cache.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Budget and caching rule for one family of routes.
#[derive(Debug, Clone)]
pub struct RoutePolicy {
    pub prefix: &'static str,
    pub namespace: &'static str,
    /// Take the path segment after `prefix` as a sub-namespace.
    pub scoped: bool,
    pub limit: u32,
    pub window: Duration,
    pub cache_ttl: Option<Duration>,
}

#[derive(Clone)]
pub struct AppState {
    pub limiter: Arc<RateLimiter>,
    pub cache: Arc<ResponseCache<CachedResponse>>,
    pub config: Arc<GatewayConfig>,
}

impl AppState {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            limiter: Arc::new(RateLimiter::new()),
            cache: Arc::new(ResponseCache::new()),
            config: Arc::new(config),
        }
    }
}
