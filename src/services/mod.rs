use crate::errors::GatewayError;
use crate::models::{AppState, CachedResponse, RoutePolicy};
use std::net::SocketAddr;
use std::time::Duration;
use hyper::{Response, Body, Method, HeaderMap};
use tracing::debug;

mod rate_limiter;
mod response_cache;

pub use rate_limiter::{RateDecision, RateLimiter};
pub use response_cache::ResponseCache;


/// The socket peer, or the right-most `x-forwarded-for` hop when the
/// gateway sits behind a trusted proxy that appends it.
pub fn client_ip(headers: &HeaderMap, remote: Option<SocketAddr>, trust_forwarded: bool) -> String {
    let forwarded = if trust_forwarded {
        headers
            .get("x-forwarded-for")
            .and_then(|h| h.to_str().ok())
            .and_then(|v| v.rsplit(',').map(str::trim).find(|ip| !ip.is_empty()))
            .map(str::to_string)
    } else {
        None
    };

    forwarded
        .or_else(|| remote.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// `login`, or `external:github` for scoped policies.
pub fn namespace(policy: &RoutePolicy, path: &str) -> String {
    if policy.scoped {
        let scope = path
            .strip_prefix(policy.prefix)
            .and_then(|rest| rest.split('/').next())
            .filter(|segment| !segment.is_empty());
        if let Some(scope) = scope {
            return format!("{}:{}", policy.namespace, scope);
        }
    }
    policy.namespace.to_string()
}

pub fn limiter_key(policy: &RoutePolicy, path: &str, client: &str) -> String {
    format!("{}:{}", namespace(policy, path), client)
}

pub fn cache_key(policy: &RoutePolicy, method: &Method, path: &str, query: &str) -> String {
    if query.is_empty() {
        format!("{}:{}{}", namespace(policy, path), method, path)
    } else {
        format!("{}:{}{}?{}", namespace(policy, path), method, path, query)
    }
}

pub fn check_rate_limit(
    state: &AppState,
    key: &str,
    policy: &RoutePolicy,
) -> Result<RateDecision, GatewayError> {
    let decision = state.limiter.check(key, policy.limit, policy.window);
    if decision.allowed {
        Ok(decision)
    } else {
        Err(GatewayError::RateLimitExceeded {
            retry_after: decision.reset_after,
        })
    }
}

pub fn get_cached_response(state: &AppState, cache_key: &str) -> Option<Response<Body>> {
    let cached = state.cache.get(cache_key)?;
    debug!(key = cache_key, "cache hit");

    let mut response = Response::new(Body::from(cached.body));
    *response.status_mut() = cached.status;
    *response.headers_mut() = cached.headers;
    Some(response)
}

/// Only successful responses are kept.
pub fn cache_response(state: &AppState, cache_key: &str, cached: CachedResponse, ttl: Duration) -> bool {
    if !cached.status.is_success() {
        return false;
    }
    state.cache.set(cache_key, cached, ttl);
    true
}

/// Drop elapsed limiter windows and expired cache entries.
pub fn sweep(state: &AppState) -> (usize, usize) {
    (state.limiter.purge_expired(), state.cache.purge_expired())
}
