use std::env;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;
use lazy_static::lazy_static;
use tracing::warn;

use crate::models::RoutePolicy;

pub const BACKEND_BASE: &str = "http://localhost:8081";
pub const BIND_ADDR: SocketAddr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 3030));
pub const REQUEST_TIMEOUT_SECS: u64 = 30;
pub const SWEEP_INTERVAL_SECS: u64 = 60;
pub const STRIP_PATH_PREFIX: &str = "/api"; // Strip this prefix before forwarding

pub const LOGIN_LIMIT: u32 = 10;
pub const EXTERNAL_LIMIT: u32 = 30;
pub const AI_LIMIT: u32 = 20;
pub const DEFAULT_LIMIT: u32 = 100;
pub const RATE_LIMIT_WINDOW_SECS: u64 = 60;
pub const EXTERNAL_CACHE_SECS: u64 = 300; // 5 minutes

lazy_static! {
    /// Checked in order; the last entry matches every path.
    pub static ref ROUTE_POLICIES: Vec<RoutePolicy> = vec![
        RoutePolicy {
            prefix: "/api/login",
            namespace: "login",
            scoped: false,
            limit: LOGIN_LIMIT,
            window: Duration::from_secs(RATE_LIMIT_WINDOW_SECS),
            cache_ttl: None,
        },
        RoutePolicy {
            prefix: "/api/external/",
            namespace: "external",
            scoped: true,
            limit: EXTERNAL_LIMIT,
            window: Duration::from_secs(RATE_LIMIT_WINDOW_SECS),
            cache_ttl: Some(Duration::from_secs(EXTERNAL_CACHE_SECS)),
        },
        RoutePolicy {
            prefix: "/api/ai/",
            namespace: "ai",
            scoped: false,
            limit: AI_LIMIT,
            window: Duration::from_secs(RATE_LIMIT_WINDOW_SECS),
            cache_ttl: None,
        },
        RoutePolicy {
            prefix: "/",
            namespace: "api",
            scoped: false,
            limit: DEFAULT_LIMIT,
            window: Duration::from_secs(RATE_LIMIT_WINDOW_SECS),
            cache_ttl: None,
        },
    ];
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub backend_base: String,
    pub bind_addr: SocketAddr,
    pub request_timeout: Duration,
    pub sweep_interval: Duration,
    /// Key clients on `x-forwarded-for` instead of the socket peer. Only
    /// safe behind a proxy that appends the peer it saw.
    pub trust_forwarded: bool,
    pub policies: Vec<RoutePolicy>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            backend_base: BACKEND_BASE.to_string(),
            bind_addr: BIND_ADDR,
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            sweep_interval: Duration::from_secs(SWEEP_INTERVAL_SECS),
            trust_forwarded: false,
            policies: ROUTE_POLICIES.clone(),
        }
    }
}

impl GatewayConfig {
    /// Defaults overridden by `PREP_GUARD_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(base) = lookup("PREP_GUARD_BACKEND") {
            config.backend_base = base.trim_end_matches('/').to_string();
        }
        if let Some(bind) = lookup("PREP_GUARD_BIND") {
            match bind.parse() {
                Ok(addr) => config.bind_addr = addr,
                Err(_) => warn!(value = %bind, default = %BIND_ADDR, "invalid PREP_GUARD_BIND, using default"),
            }
        }
        if let Some(flag) = lookup("PREP_GUARD_TRUST_FORWARDED") {
            match flag.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => config.trust_forwarded = true,
                "0" | "false" | "no" | "off" | "" => config.trust_forwarded = false,
                _ => warn!(value = %flag, "invalid PREP_GUARD_TRUST_FORWARDED, not trusting x-forwarded-for"),
            }
        }
        if let Some(secs) = parse_secs(&lookup, "PREP_GUARD_TIMEOUT_SECS") {
            config.request_timeout = secs;
        }
        if let Some(secs) = parse_secs(&lookup, "PREP_GUARD_SWEEP_SECS") {
            config.sweep_interval = secs;
        }

        config
    }

    /// First policy whose prefix matches `path`.
    pub fn policy_for(&self, path: &str) -> Option<&RoutePolicy> {
        self.policies.iter().find(|policy| path.starts_with(policy.prefix))
    }
}

fn parse_secs<F>(lookup: &F, name: &str) -> Option<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(name)?;
    match raw.parse::<u64>() {
        Ok(secs) if secs > 0 => Some(Duration::from_secs(secs)),
        _ => {
            warn!(name, value = %raw, "expected a positive number of seconds, using default");
            None
        }
    }
}
