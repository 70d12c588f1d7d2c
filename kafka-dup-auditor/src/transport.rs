//! Connection-provider seam between the scan core and the broker client.
//!
//! The scanner only needs four things from a partition: its watermarks, a
//! timestamp-to-offset lookup, a way to position the read cursor and batched
//! reads. [`crate::kafka::KafkaTransport`] implements these on rdkafka and
//! [`crate::test_utils::InMemoryTransport`] implements them over vectors.

use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::TransportError;
use crate::types::{MessageRecord, PartitionRef, Watermarks};

/// Byte bounds for one batch request. These tune throughput, not correctness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub min_bytes: usize,
    pub max_bytes: usize,
}

impl BatchLimits {
    pub fn new(min_bytes: usize, max_bytes: usize) -> Self {
        Self {
            min_bytes,
            max_bytes: max_bytes.max(min_bytes).max(1),
        }
    }
}

impl Default for BatchLimits {
    fn default() -> Self {
        // min 1 byte, max 5MB
        Self::new(1, 5_000_000)
    }
}

#[async_trait]
pub trait LogTransport: Send + Sync + 'static {
    type Cursor: PartitionCursor + 'static;

    /// List the current partitions of `topic`. Called once per run.
    async fn list_partitions(&self, topic: &str) -> Result<Vec<PartitionRef>, TransportError>;

    /// Open a read cursor on one partition, routed to its leader when needed.
    async fn open_cursor(
        &self,
        topic: &str,
        partition: &PartitionRef,
    ) -> Result<Self::Cursor, TransportError>;
}

#[async_trait]
pub trait PartitionCursor: Send {
    async fn watermarks(&mut self) -> Result<Watermarks, TransportError>;

    /// First offset whose timestamp is at or after `at`, or `None` when no
    /// such record exists yet.
    async fn offset_for_time(&mut self, at: DateTime<Utc>) -> Result<Option<i64>, TransportError>;

    async fn seek(&mut self, offset: i64) -> Result<(), TransportError>;

    async fn read_batch(&mut self, limits: BatchLimits) -> Result<RecordBatch, TransportError>;
}

/// Records fetched in one round-trip, drained one at a time.
///
/// A failure observed while the batch was being filled is reported by
/// [`RecordBatch::next_record`] only after the records that preceded it.
#[derive(Debug, Default)]
pub struct RecordBatch {
    records: VecDeque<MessageRecord>,
    failure: Option<TransportError>,
    partition_end: bool,
}

impl RecordBatch {
    pub fn new(records: Vec<MessageRecord>) -> Self {
        Self {
            records: records.into(),
            failure: None,
            partition_end: false,
        }
    }

    /// Mark that the broker reported no further records in the partition.
    pub fn with_partition_end(mut self) -> Self {
        self.partition_end = true;
        self
    }

    pub fn with_failure(mut self, failure: TransportError) -> Self {
        self.failure = Some(failure);
        self
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.failure.is_none()
    }

    pub fn reached_partition_end(&self) -> bool {
        self.partition_end
    }

    /// `Ok(None)` is the clean end-of-batch signal.
    pub fn next_record(&mut self) -> Result<Option<MessageRecord>, TransportError> {
        if let Some(record) = self.records.pop_front() {
            return Ok(Some(record));
        }
        match self.failure.take() {
            Some(failure) => Err(failure),
            None => Ok(None),
        }
    }
}
