//! In-memory transport for exercising scans without a broker.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use rdkafka::error::KafkaError;
use rdkafka::types::RDKafkaErrorCode;

use crate::error::TransportError;
use crate::transport::{BatchLimits, LogTransport, PartitionCursor, RecordBatch};
use crate::types::{MessageRecord, PartitionRef, Watermarks};

/// 2024-01-01T00:00:00Z
const BASE_EPOCH_SECS: i64 = 1_704_067_200;

/// Deterministic timestamp for test records: base time plus `seconds`.
pub fn test_timestamp(seconds: i64) -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH + TimeDelta::seconds(BASE_EPOCH_SECS + seconds)
}

fn broker_failure(operation: &'static str) -> TransportError {
    TransportError::Kafka {
        operation,
        source: KafkaError::MessageConsumption(RDKafkaErrorCode::BrokerTransportFailure),
    }
}

/// One partition held in memory, with optional fault injection.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPartition {
    id: i32,
    low: i64,
    high: Option<i64>,
    records: Vec<MessageRecord>,
    fail_reads_after: Option<usize>,
    fail_watermarks: bool,
    fail_open: bool,
    stalled: bool,
}

impl InMemoryPartition {
    pub fn new(id: i32) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// Consecutive records from `first_offset`, each timestamped
    /// `test_timestamp(offset)`.
    pub fn from_payloads<P: AsRef<[u8]>>(id: i32, first_offset: i64, payloads: &[P]) -> Self {
        let mut partition = Self::new(id);
        partition.low = first_offset;
        for (i, payload) in payloads.iter().enumerate() {
            let offset = first_offset + i as i64;
            partition = partition.with_record(offset, payload, test_timestamp(offset));
        }
        partition
    }

    /// Append a record. Offsets must be added in increasing order.
    pub fn with_record(
        mut self,
        offset: i64,
        payload: impl AsRef<[u8]>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        if self.records.is_empty() {
            self.low = offset;
        }
        self.records.push(MessageRecord::new(
            payload.as_ref().to_vec(),
            self.id,
            offset,
            timestamp,
        ));
        self
    }

    /// Report a high watermark below the last stored record, as if the
    /// records beyond it were appended after the scan looked.
    pub fn with_high_watermark(mut self, high: i64) -> Self {
        self.high = Some(high);
        self
    }

    /// Fail the batch read that would hand out record number `count + 1`.
    pub fn failing_reads_after(mut self, count: usize) -> Self {
        self.fail_reads_after = Some(count);
        self
    }

    pub fn failing_watermarks(mut self) -> Self {
        self.fail_watermarks = true;
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Batch reads never complete.
    pub fn stalled(mut self) -> Self {
        self.stalled = true;
        self
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn watermarks(&self) -> Watermarks {
        let high = self.high.unwrap_or_else(|| {
            self.records
                .last()
                .map_or(self.low, |record| record.offset + 1)
        });
        Watermarks::new(self.low, high)
    }

    pub fn cursor(&self, records_per_batch: usize) -> InMemoryCursor {
        InMemoryCursor {
            partition: self.clone(),
            records_per_batch: records_per_batch.max(1),
            position: 0,
            delivered: 0,
        }
    }
}

/// In-memory [`LogTransport`].
#[derive(Debug, Clone)]
pub struct InMemoryTransport {
    partitions: BTreeMap<i32, InMemoryPartition>,
    records_per_batch: usize,
    fail_discovery: bool,
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self {
            partitions: BTreeMap::new(),
            records_per_batch: 100,
            fail_discovery: false,
        }
    }
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a partition whose records start at offset 0.
    pub fn with_payloads<P: AsRef<[u8]>>(self, id: i32, payloads: &[P]) -> Self {
        self.with_partition(InMemoryPartition::from_payloads(id, 0, payloads))
    }

    pub fn with_partition(mut self, partition: InMemoryPartition) -> Self {
        self.partitions.insert(partition.id(), partition);
        self
    }

    pub fn with_records_per_batch(mut self, records_per_batch: usize) -> Self {
        self.records_per_batch = records_per_batch.max(1);
        self
    }

    pub fn failing_discovery(mut self) -> Self {
        self.fail_discovery = true;
        self
    }
}

#[async_trait]
impl LogTransport for InMemoryTransport {
    type Cursor = InMemoryCursor;

    async fn list_partitions(&self, topic: &str) -> Result<Vec<PartitionRef>, TransportError> {
        if self.fail_discovery {
            return Err(broker_failure("fetch_metadata"));
        }
        if self.partitions.is_empty() {
            return Err(TransportError::UnknownTopic(topic.to_string()));
        }
        Ok(self
            .partitions
            .keys()
            .map(|id| PartitionRef::new(*id).with_leader(1))
            .collect())
    }

    async fn open_cursor(
        &self,
        topic: &str,
        partition: &PartitionRef,
    ) -> Result<InMemoryCursor, TransportError> {
        let stored = self
            .partitions
            .get(&partition.id())
            .ok_or_else(|| TransportError::UnknownTopic(topic.to_string()))?;
        if stored.fail_open {
            return Err(broker_failure("create_consumer"));
        }
        Ok(stored.cursor(self.records_per_batch))
    }
}

pub struct InMemoryCursor {
    partition: InMemoryPartition,
    records_per_batch: usize,
    // index into partition.records of the next record to hand out
    position: usize,
    delivered: usize,
}

#[async_trait]
impl PartitionCursor for InMemoryCursor {
    async fn watermarks(&mut self) -> Result<Watermarks, TransportError> {
        if self.partition.fail_watermarks {
            return Err(broker_failure("fetch_watermarks"));
        }
        Ok(self.partition.watermarks())
    }

    async fn offset_for_time(&mut self, at: DateTime<Utc>) -> Result<Option<i64>, TransportError> {
        Ok(self
            .partition
            .records
            .iter()
            .find(|record| record.timestamp >= at)
            .map(|record| record.offset))
    }

    async fn seek(&mut self, offset: i64) -> Result<(), TransportError> {
        self.position = self
            .partition
            .records
            .iter()
            .position(|record| record.offset >= offset)
            .unwrap_or(self.partition.records.len());
        Ok(())
    }

    async fn read_batch(&mut self, limits: BatchLimits) -> Result<RecordBatch, TransportError> {
        if self.partition.stalled {
            std::future::pending::<()>().await;
        }

        let records = &self.partition.records;
        if self.position >= records.len() {
            return Ok(RecordBatch::default().with_partition_end());
        }

        let mut batch = Vec::new();
        let mut bytes = 0;
        while self.position < records.len()
            && batch.len() < self.records_per_batch
            && bytes < limits.max_bytes
        {
            if self.partition.fail_reads_after == Some(self.delivered) {
                let failure = broker_failure("recv");
                if batch.is_empty() {
                    return Err(failure);
                }
                return Ok(RecordBatch::new(batch).with_failure(failure));
            }
            let record = records[self.position].clone();
            bytes += record.payload.len().max(1);
            batch.push(record);
            self.position += 1;
            self.delivered += 1;
        }

        Ok(RecordBatch::new(batch))
    }
}
