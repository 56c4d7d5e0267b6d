use std::time::Duration;
use hyper::{HeaderMap, header::{HeaderName, HeaderValue, RETRY_AFTER}};

use crate::services::RateDecision;


pub fn add_rate_limit_headers(headers: &mut HeaderMap, decision: &RateDecision) {
    headers.insert(
        HeaderName::from_static("x-ratelimit-limit"),
        HeaderValue::from(decision.limit),
    );
    headers.insert(
        HeaderName::from_static("x-ratelimit-remaining"),
        HeaderValue::from(decision.remaining),
    );
}

/// Whole seconds, rounded up so clients never retry early.
pub fn add_retry_after(headers: &mut HeaderMap, retry_after: Duration) {
    let mut secs = retry_after.as_secs();
    if retry_after.subsec_nanos() > 0 {
        secs += 1;
    }
    headers.insert(RETRY_AFTER, HeaderValue::from(secs.max(1)));
}

pub fn mark_cache(headers: &mut HeaderMap, hit: bool) {
    headers.insert(
        HeaderName::from_static("x-cache"),
        HeaderValue::from_static(if hit { "HIT" } else { "MISS" }),
    );
}
