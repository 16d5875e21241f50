//! Audits a Slack workspace for channels created by support users and DMs
//! each of them a digest of their inactive channels.

pub mod activity;
pub mod auditor;
pub mod cache;
pub mod channels;
pub mod config;
pub mod delivery;
pub mod rate_limit;
pub mod report;
pub mod schedule;
pub mod slack;
pub mod users;

#[cfg(any(test, feature = "testing"))]
#[doc(hidden)]
pub mod testing;

pub use auditor::{AuditSettings, Auditor, PassOutcome, PassSummary};
pub use config::Config;
