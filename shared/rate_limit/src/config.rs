//! Rate limiting configuration: endpoint classes, base limits, and the
//! role multiplier, grounded on
//! `original_source/manushya/core/rate_limiter.py`'s `DEFAULT_LIMITS`/
//! `ROLE_LIMITS` tables.

use serde::{Deserialize, Serialize};

/// Endpoint class derived by prefix from the request path (§4.6).
/// `/v1/events` covers webhook delivery inspection endpoints; anything
/// else not named here (`/healthz`, `/metrics`, `/webhooks`, `/usage`)
/// falls through to `Default`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointClass {
    Identity,
    Memory,
    Policy,
    ApiKeys,
    Invitations,
    Sessions,
    Events,
    Default,
}

impl EndpointClass {
    /// `path` is expected to include the `/v1` prefix (or not — only the
    /// first non-empty, non-"v1" segment is consulted).
    pub fn from_path(path: &str) -> Self {
        let mut segments = path.trim_start_matches('/').split('/').filter(|s| !s.is_empty());
        let first = segments.next();
        let segment = if first == Some("v1") { segments.next() } else { first };

        match segment {
            Some("identity") => Self::Identity,
            Some("memory") => Self::Memory,
            Some("policy") => Self::Policy,
            Some("api-keys") | Some("api_keys") => Self::ApiKeys,
            Some("invitations") => Self::Invitations,
            Some("sessions") => Self::Sessions,
            Some("events") => Self::Events,
            _ => Self::Default,
        }
    }

    pub fn key_prefix(&self) -> &'static str {
        match self {
            Self::Identity => "rate_limit:identity",
            Self::Memory => "rate_limit:memory",
            Self::Policy => "rate_limit:policy",
            Self::ApiKeys => "rate_limit:api_keys",
            Self::Invitations => "rate_limit:invitations",
            Self::Sessions => "rate_limit:sessions",
            Self::Events => "rate_limit:events",
            Self::Default => "rate_limit:default",
        }
    }

    /// `(window_seconds, base_limit)` before the role multiplier.
    pub fn base_limit(&self) -> (u64, u32) {
        match self {
            Self::Identity => (60, 100),
            Self::Memory => (60, 200),
            Self::Policy => (60, 50),
            Self::ApiKeys => (60, 30),
            Self::Invitations => (60, 20),
            Self::Sessions => (60, 100),
            Self::Events => (60, 50),
            Self::Default => (60, 100),
        }
    }
}

/// `admin`×2, `system`×5, anything else (including `anonymous`)×1.
pub fn role_multiplier(role: &str) -> f64 {
    match role {
        "admin" => 2.0,
        "system" => 5.0,
        _ => 1.0,
    }
}

pub fn effective_limit(base_limit: u32, role: &str) -> u32 {
    (base_limit as f64 * role_multiplier(role)) as u32
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Redis URL for distributed rate limiting. Absent means the
    /// in-process fallback counter is used for every request.
    pub redis_url: Option<String>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Whether `X-Forwarded-For`/`X-Real-Ip` are trusted for client-IP
    /// extraction. Must stay off unless a reverse proxy strips/overwrites
    /// these headers on the way in — otherwise a client can forge its own
    /// rate-limit identity.
    #[serde(default)]
    pub trust_proxy_headers: bool,

    /// Number of trusted proxy hops in front of this service; used to pick
    /// the rightmost-trusted entry out of `X-Forwarded-For`.
    #[serde(default = "default_proxy_count")]
    pub proxy_count: u32,

    /// Comma-separated IPs that bypass rate limiting entirely (health
    /// checks, internal callers).
    #[serde(default)]
    pub trusted_ips: Option<String>,
}

fn default_enabled() -> bool {
    true
}

fn default_proxy_count() -> u32 {
    1
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            enabled: default_enabled(),
            trust_proxy_headers: false,
            proxy_count: default_proxy_count(),
            trusted_ips: None,
        }
    }
}

impl RateLimitConfig {
    pub fn get_trusted_ips(&self) -> Vec<String> {
        self.trusted_ips
            .as_ref()
            .map(|s| s.split(',').map(|ip| ip.trim().to_string()).filter(|ip| !ip.is_empty()).collect())
            .unwrap_or_default()
    }

    pub fn is_trusted_ip(&self, ip: &str) -> bool {
        self.get_trusted_ips().contains(&ip.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_class_from_path_strips_v1_prefix() {
        assert_eq!(EndpointClass::from_path("/v1/memory/search"), EndpointClass::Memory);
        assert_eq!(EndpointClass::from_path("/memory/search"), EndpointClass::Memory);
        assert_eq!(EndpointClass::from_path("/v1/api-keys"), EndpointClass::ApiKeys);
        assert_eq!(EndpointClass::from_path("/v1/unknown-thing"), EndpointClass::Default);
        assert_eq!(EndpointClass::from_path("/healthz"), EndpointClass::Default);
    }

    #[test]
    fn role_multiplier_matches_original_table() {
        assert_eq!(effective_limit(100, "admin"), 200);
        assert_eq!(effective_limit(100, "system"), 500);
        assert_eq!(effective_limit(100, "anonymous"), 100);
        assert_eq!(effective_limit(100, "agent"), 100);
    }

    #[test]
    fn trusted_ip_parsing() {
        let config =
            RateLimitConfig { trusted_ips: Some(" 127.0.0.1, 10.0.0.1 ".to_string()), ..Default::default() };
        assert!(config.is_trusted_ip("127.0.0.1"));
        assert!(config.is_trusted_ip("10.0.0.1"));
        assert!(!config.is_trusted_ip("8.8.8.8"));
    }
}
