//! Egress point models: one outbound network identity per point.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health status of an egress point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EgressStatus {
    Healthy,
    Degraded,
    Dead,
}

impl EgressStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Dead => "dead",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "healthy" => Some(Self::Healthy),
            "degraded" => Some(Self::Degraded),
            "dead" => Some(Self::Dead),
            _ => None,
        }
    }
}

/// Proxy scheme used to reach an egress point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EgressScheme {
    #[default]
    Http,
    Socks5,
}

impl EgressScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Socks5 => "socks5",
        }
    }
}

/// Static credentials for one egress point, as configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EgressCredentials {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub scheme: EgressScheme,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl EgressCredentials {
    /// Proxy URL without credentials (those are passed separately).
    pub fn proxy_url(&self) -> String {
        format!("{}://{}:{}", self.scheme.as_str(), self.host, self.port)
    }

    /// Stable identifier for this point.
    pub fn id(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// One outbound network identity plus its health-tracking state.
///
/// Created at pool initialization from the configured credential list and
/// mutated by the health tracker after every fetch attempt. Never deleted,
/// only marked dead and possibly recovered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EgressPoint {
    pub id: String,
    pub credentials: EgressCredentials,
    pub status: EgressStatus,
    pub requests_this_session: u32,
    pub consecutive_failures: u32,
    pub success_count: u64,
    pub total_count: u64,
    /// Trailing window of recent outcomes (true = success), newest last.
    #[serde(skip)]
    pub recent: VecDeque<bool>,
    pub last_rotated_at: Option<DateTime<Utc>>,
    pub session_started_at: DateTime<Utc>,
}

impl EgressPoint {
    pub fn new(credentials: EgressCredentials) -> Self {
        Self {
            id: credentials.id(),
            credentials,
            status: EgressStatus::Healthy,
            requests_this_session: 0,
            consecutive_failures: 0,
            success_count: 0,
            total_count: 0,
            recent: VecDeque::new(),
            last_rotated_at: None,
            session_started_at: Utc::now(),
        }
    }

    /// Success rate over the trailing window, or 1.0 with no samples.
    pub fn window_success_rate(&self) -> f64 {
        if self.recent.is_empty() {
            return 1.0;
        }
        let ok = self.recent.iter().filter(|s| **s).count();
        ok as f64 / self.recent.len() as f64
    }

    /// Lifetime success rate.
    pub fn success_rate(&self) -> f64 {
        if self.total_count == 0 {
            return 1.0;
        }
        self.success_count as f64 / self.total_count as f64
    }

    /// Reset per-session counters at a session boundary.
    pub fn reset_session(&mut self) {
        self.requests_this_session = 0;
        self.session_started_at = Utc::now();
    }

    /// Cheap snapshot handed to the fetch executor.
    pub fn handle(&self) -> EgressHandle {
        EgressHandle {
            id: self.id.clone(),
            proxy_url: self.credentials.proxy_url(),
            username: self.credentials.username.clone(),
            password: self.credentials.password.clone(),
        }
    }
}

/// Snapshot of an egress point's connection details.
///
/// All mutable state stays on the pool-owned [`EgressPoint`]; the executor
/// only ever sees this value.
#[derive(Debug, Clone, PartialEq)]
pub struct EgressHandle {
    pub id: String,
    pub proxy_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(host: &str) -> EgressCredentials {
        EgressCredentials {
            host: host.to_string(),
            port: 8080,
            scheme: EgressScheme::Http,
            username: Some("user".to_string()),
            password: Some("pass".to_string()),
        }
    }

    #[test]
    fn test_status_roundtrip() {
        for status in [
            EgressStatus::Healthy,
            EgressStatus::Degraded,
            EgressStatus::Dead,
        ] {
            assert_eq!(EgressStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(EgressStatus::from_str("unknown"), None);
    }

    #[test]
    fn test_proxy_url() {
        let c = creds("proxy.example.net");
        assert_eq!(c.proxy_url(), "http://proxy.example.net:8080");
        assert_eq!(c.id(), "proxy.example.net:8080");
    }

    #[test]
    fn test_new_point_is_healthy() {
        let point = EgressPoint::new(creds("a"));
        assert_eq!(point.status, EgressStatus::Healthy);
        assert_eq!(point.consecutive_failures, 0);
        assert_eq!(point.window_success_rate(), 1.0);
    }

    #[test]
    fn test_window_success_rate() {
        let mut point = EgressPoint::new(creds("a"));
        point.recent.extend([true, true, false, false]);
        assert_eq!(point.window_success_rate(), 0.5);
    }

    #[test]
    fn test_reset_session() {
        let mut point = EgressPoint::new(creds("a"));
        point.requests_this_session = 42;
        point.reset_session();
        assert_eq!(point.requests_this_session, 0);
    }
}
