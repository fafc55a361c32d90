//! Error taxonomy for the acquisition pipeline.

use thiserror::Error;

use super::FetchOutcome;

#[derive(Debug, Error)]
pub enum AcquireError {
    /// Site refused service or served a decoy page.
    #[error("blocked by target site")]
    Blocked,

    /// Human-verification interstitial encountered.
    #[error("challenge interstitial encountered")]
    Challenged,

    /// Transport-level failure.
    #[error("network error: {0}")]
    Network(String),

    /// Per-call hard timeout elapsed.
    #[error("request timed out")]
    Timeout,

    /// No usable egress points remain. Hard stop for the current
    /// partition; retrying against an exhausted pool only burns time.
    #[error("egress pool exhausted: no usable points")]
    PoolExhausted,

    /// Record failed structural validation. Counted in the rejection
    /// report; never aborts a run.
    #[error("record validation failed: {0}")]
    Validation(String),

    /// Remote latest date could not be determined. Forces a no-op delta
    /// decision rather than a guessed range.
    #[error("remote freshness unknown")]
    FreshnessUnknown,

    /// Retry budget exhausted for a single page fetch.
    #[error("fetch failed after {attempts} attempts (last outcome: {last})")]
    FetchFailed { attempts: u32, last: FetchOutcome },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("state store error: {0}")]
    State(#[from] rusqlite::Error),
}

impl AcquireError {
    /// Whether the retry controller may recover from this locally.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Blocked | Self::Challenged | Self::Network(_) | Self::Timeout
        )
    }
}
