//! Data models for scoreacquire.

mod egress;
mod record;
mod report;

pub use egress::{EgressCredentials, EgressHandle, EgressPoint, EgressScheme, EgressStatus};
pub use record::{CandidateRecord, CanonicalRecord, CANONICAL_SCHEMA_VERSION};
pub use report::{
    CollapseCounters, PointHealth, PoolHealthSummary, RejectionReport, RunOutcome, RunReport,
};
