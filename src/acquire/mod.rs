//! The acquisition core: egress pool, fetch executor, block detection,
//! retry/backoff, delta strategy and deduplication.

pub mod dedup;
pub mod delta;
pub mod detect;
mod error;
pub mod fetch;
pub mod pool;
pub mod retry;
pub mod throttle;

pub use error::AcquireError;

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Classification of a single fetch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchOutcome {
    Ok,
    Blocked,
    Challenged,
    NetworkError,
    Timeout,
}

impl FetchOutcome {
    /// Block-pressure outcomes feed the adaptive throttle.
    pub fn is_pressure(&self) -> bool {
        matches!(self, Self::Blocked | Self::Challenged)
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl fmt::Display for FetchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ok => "ok",
            Self::Blocked => "blocked",
            Self::Challenged => "challenged",
            Self::NetworkError => "network_error",
            Self::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

/// Ephemeral value describing one fetch attempt. Created per attempt and
/// consumed immediately by the retry controller; never persisted.
#[derive(Debug, Clone)]
pub struct FetchAttempt {
    pub url: String,
    pub egress_point_id: String,
    pub headers_used: HashMap<String, String>,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub http_status: Option<u16>,
    pub byte_length: usize,
    pub outcome: FetchOutcome,
}
