use rdkafka::error::KafkaError;
use rdkafka::types::RDKafkaErrorCode;
use thiserror::Error;
use tokio::task::JoinError;

/// Failures reported by a [`crate::transport::LogTransport`] or its cursors.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Kafka broker or client returned an error
    #[error("kafka error during {operation}")]
    Kafka {
        operation: &'static str,
        #[source]
        source: KafkaError,
    },

    /// Timeout occurred during a Kafka operation
    #[error("timeout during {operation}")]
    Timeout { operation: &'static str },

    /// The broker has no metadata for the topic
    #[error("topic {0} does not exist")]
    UnknownTopic(String),

    /// A blocking client call was aborted before it returned
    #[error("blocking kafka call did not complete")]
    Blocking(#[from] JoinError),
}

impl TransportError {
    /// Wrap a client error, folding timeout codes into [`TransportError::Timeout`].
    pub fn from_kafka(operation: &'static str, source: KafkaError) -> Self {
        if is_timeout_error(&source) {
            TransportError::Timeout { operation }
        } else {
            TransportError::Kafka { operation, source }
        }
    }

    /// Returns the error type tag for metrics
    pub fn error_type(&self) -> &'static str {
        match self {
            TransportError::Kafka { .. } => "kafka_error",
            TransportError::Timeout { .. } => "timeout",
            TransportError::UnknownTopic(_) => "unknown_topic",
            TransportError::Blocking(_) => "blocking_call",
        }
    }
}

/// Check if a KafkaError represents a timeout condition
fn is_timeout_error(e: &KafkaError) -> bool {
    match e {
        KafkaError::Global(code)
        | KafkaError::MessageConsumption(code)
        | KafkaError::MetadataFetch(code) => {
            matches!(
                code,
                RDKafkaErrorCode::RequestTimedOut | RDKafkaErrorCode::OperationTimedOut
            )
        }
        _ => false,
    }
}

/// Failure of a single partition scan.
///
/// Every variant carries the partition id; `Read` and `Cancelled` also carry
/// the number of messages forwarded before the scan stopped.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Could not open a reader against the partition leader
    #[error("failed to open a reader for the partition leader")]
    Connect {
        partition: i32,
        #[source]
        source: TransportError,
    },

    /// Could not resolve the high watermark or the start position
    #[error("failed to resolve {boundary} offset")]
    OffsetResolution {
        partition: i32,
        boundary: &'static str,
        #[source]
        source: TransportError,
    },

    /// A batch or record read failed mid-scan
    #[error("read failed after {messages_read} messages")]
    Read {
        partition: i32,
        messages_read: u64,
        #[source]
        source: TransportError,
    },

    #[error("scan cancelled after {messages_read} messages")]
    Cancelled { partition: i32, messages_read: u64 },
}

impl ScanError {
    /// Messages forwarded to the aggregator before the scan stopped.
    pub fn messages_read(&self) -> u64 {
        match self {
            ScanError::Connect { .. } | ScanError::OffsetResolution { .. } => 0,
            ScanError::Read { messages_read, .. } | ScanError::Cancelled { messages_read, .. } => {
                *messages_read
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ScanError::Cancelled { .. })
    }

    /// Returns the error type tag for metrics
    pub fn error_type(&self) -> &'static str {
        match self {
            ScanError::Connect { .. } => "connect",
            ScanError::OffsetResolution { .. } => "offset_resolution",
            ScanError::Read { .. } => "read",
            ScanError::Cancelled { .. } => "cancelled",
        }
    }
}

/// Failure of a whole audit run. A failed run never produces a result.
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("failed to discover partitions for topic {topic}")]
    Discovery {
        topic: String,
        #[source]
        source: TransportError,
    },

    #[error("failed to scan partition {partition}")]
    Partition {
        partition: i32,
        #[source]
        source: ScanError,
    },

    #[error("audit cancelled")]
    Cancelled,

    #[error("invalid audit state: {0}")]
    InvalidState(String),
}

impl AuditError {
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        AuditError::InvalidState(msg.into())
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            AuditError::Discovery { .. } => "discovery",
            AuditError::Partition { source, .. } => source.error_type(),
            AuditError::Cancelled => "cancelled",
            AuditError::InvalidState(_) => "invalid_state",
        }
    }
}

/// Configuration that cannot describe a valid audit.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{mode} boundary requires {field}")]
    Missing {
        mode: &'static str,
        field: &'static str,
    },

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
