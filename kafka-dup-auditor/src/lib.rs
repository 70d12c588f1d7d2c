//! Offline duplicate-payload auditor for Kafka topics.
//!
//! Scans a bounded window of every partition of a topic once, hashes each
//! payload and reports which payloads were seen more than once and where.
//!
//! ## Error logging (anyhow)
//!
//! When logging errors that carry a cause chain, use `{e:#}` inline or
//! `error = ?e` as a structured field so the root cause stays visible. Library
//! error `Display` impls describe only their own layer.

pub mod aggregator;
pub mod audit;
pub mod boundary;
pub mod config;
pub mod credentials;
pub mod error;
pub mod kafka;
pub mod metrics_consts;
pub mod result;
pub mod scanner;
pub mod transport;
pub mod types;

// Used in "mod tests" and tests/ directory (integration tests)
pub mod test_utils;

// Re-export commonly used types for convenience
pub use audit::{AuditSettings, Auditor, ExecutionStrategy};
pub use boundary::BoundaryPolicy;
pub use config::Config;
pub use error::{AuditError, ScanError, TransportError};
pub use result::{DuplicateGroup, ScanResult};
pub use types::{MessageRecord, Occurrence, PartitionRef};
