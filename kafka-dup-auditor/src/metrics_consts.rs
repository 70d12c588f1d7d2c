// ==== Audit run metrics ====
/// Gauge for number of partitions discovered for the audited topic
pub const AUDIT_PARTITIONS: &str = "kafka_dup_audit_partitions";

/// Gauge for messages read by the last completed audit
pub const AUDIT_MESSAGES_READ: &str = "kafka_dup_audit_messages_read";

/// Gauge for duplicate groups found by the last completed audit
pub const AUDIT_DUPLICATE_GROUPS: &str = "kafka_dup_audit_duplicate_groups";

/// Histogram for end-to-end audit duration
pub const AUDIT_DURATION_MS: &str = "kafka_dup_audit_duration_ms";

// ==== Partition scan metrics ====
/// Counter for messages forwarded to the aggregator, per partition
pub const SCAN_MESSAGES_EMITTED: &str = "kafka_dup_audit_scan_messages_total";

/// Counter for batches fetched from the broker
pub const SCAN_BATCHES_READ: &str = "kafka_dup_audit_scan_batches_total";

/// Counter for partitions whose window held no records
pub const SCAN_PARTITIONS_EMPTY: &str = "kafka_dup_audit_scan_empty_partitions_total";

/// Counter for failed partition scans, by error type
pub const SCAN_ERRORS: &str = "kafka_dup_audit_scan_errors_total";

/// Histogram for per-partition scan duration
pub const SCAN_DURATION_MS: &str = "kafka_dup_audit_scan_duration_ms";
