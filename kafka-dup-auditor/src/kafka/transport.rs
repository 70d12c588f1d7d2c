use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::{Offset, TopicPartitionList};
use tokio::time::Instant;
use tracing::debug;

use crate::config::Config;
use crate::credentials::CredentialProvider;
use crate::error::{ConfigError, TransportError};
use crate::kafka::config::ReaderConfigBuilder;
use crate::transport::{BatchLimits, LogTransport, PartitionCursor, RecordBatch};
use crate::types::{MessageRecord, PartitionRef, Watermarks};

/// [`LogTransport`] over rdkafka.
///
/// Each partition gets its own assign-only `StreamConsumer`, so librdkafka
/// routes fetches straight to that partition's leader. Metadata, watermark
/// and offset lookups are blocking librdkafka calls and run on the blocking
/// pool.
#[derive(Clone)]
pub struct KafkaTransport {
    config: ClientConfig,
    timeout: Duration,
    batch_wait: Duration,
}

impl KafkaTransport {
    /// `timeout` applies to each metadata, watermark and offset lookup.
    /// `batch_wait` is how long a batch read waits for more records before
    /// returning what it has.
    pub fn new(config: ClientConfig, timeout: Duration, batch_wait: Duration) -> Self {
        Self {
            config,
            timeout,
            batch_wait,
        }
    }

    pub fn from_config(
        config: &Config,
        credentials: &dyn CredentialProvider,
    ) -> Result<Self, ConfigError> {
        let group_id = format!("kafka-dup-auditor-{}", uuid::Uuid::new_v4());
        let sasl = credentials.sasl_credentials();
        let client_config = ReaderConfigBuilder::new(&config.bootstrap_servers()?, &group_id)
            .with_tls(config.kafka_tls)
            .with_sasl(sasl.as_ref())
            .with_fetch_min_bytes(config.fetch_min_bytes)
            .with_fetch_max_bytes(config.fetch_max_bytes)
            .with_fetch_wait_max_ms(config.batch_wait_ms)
            .build();

        Ok(Self::new(
            client_config,
            config.kafka_timeout(),
            config.batch_wait(),
        ))
    }
}

#[async_trait]
impl LogTransport for KafkaTransport {
    type Cursor = KafkaCursor;

    async fn list_partitions(&self, topic: &str) -> Result<Vec<PartitionRef>, TransportError> {
        // Fresh consumer so we never read cached metadata from an earlier call
        let consumer: BaseConsumer = self
            .config
            .create()
            .map_err(|e| TransportError::from_kafka("create_consumer", e))?;
        let topic = topic.to_string();
        let timeout = self.timeout;

        tokio::task::spawn_blocking(move || -> Result<Vec<PartitionRef>, TransportError> {
            let metadata = consumer
                .fetch_metadata(Some(&topic), timeout)
                .map_err(|e| TransportError::from_kafka("fetch_metadata", e))?;

            let topic_metadata = metadata
                .topics()
                .iter()
                .find(|t| t.name() == topic)
                .ok_or_else(|| TransportError::UnknownTopic(topic.clone()))?;

            if let Some(err) = topic_metadata.error() {
                let code = RDKafkaErrorCode::from(err);
                return Err(match code {
                    RDKafkaErrorCode::UnknownTopicOrPartition | RDKafkaErrorCode::UnknownTopic => {
                        TransportError::UnknownTopic(topic.clone())
                    }
                    _ => TransportError::from_kafka("fetch_metadata", KafkaError::MetadataFetch(code)),
                });
            }
            if topic_metadata.partitions().is_empty() {
                return Err(TransportError::UnknownTopic(topic.clone()));
            }

            let partitions: Vec<PartitionRef> = topic_metadata
                .partitions()
                .iter()
                .map(|p| PartitionRef::new(p.id()).with_leader(p.leader()))
                .collect();
            Ok(partitions)
        })
        .await?
    }

    async fn open_cursor(
        &self,
        topic: &str,
        partition: &PartitionRef,
    ) -> Result<KafkaCursor, TransportError> {
        let consumer: StreamConsumer = self
            .config
            .create()
            .map_err(|e| TransportError::from_kafka("create_consumer", e))?;

        debug!(
            topic,
            partition = partition.id(),
            leader = ?partition.leader(),
            "Opened partition reader"
        );

        Ok(KafkaCursor {
            consumer: Arc::new(consumer),
            topic: topic.to_string(),
            partition: partition.id(),
            timeout: self.timeout,
            batch_wait: self.batch_wait,
        })
    }
}

/// Read cursor on a single partition. Positioned by [`PartitionCursor::seek`],
/// which assigns the partition at that offset.
pub struct KafkaCursor {
    consumer: Arc<StreamConsumer>,
    topic: String,
    partition: i32,
    timeout: Duration,
    batch_wait: Duration,
}

impl KafkaCursor {
    fn to_record(&self, message: &BorrowedMessage<'_>) -> MessageRecord {
        let timestamp = message
            .timestamp()
            .to_millis()
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        MessageRecord::new(
            message.payload().unwrap_or_default().to_vec(),
            self.partition,
            message.offset(),
            timestamp,
        )
    }
}

#[async_trait]
impl PartitionCursor for KafkaCursor {
    async fn watermarks(&mut self) -> Result<Watermarks, TransportError> {
        let consumer = Arc::clone(&self.consumer);
        let topic = self.topic.clone();
        let partition = self.partition;
        let timeout = self.timeout;

        // fetch_watermarks queries broker directly - gets true current high watermark
        let (low, high) = tokio::task::spawn_blocking(move || {
            consumer
                .fetch_watermarks(&topic, partition, timeout)
                .map_err(|e| TransportError::from_kafka("fetch_watermarks", e))
        })
        .await??;

        Ok(Watermarks::new(low, high))
    }

    async fn offset_for_time(&mut self, at: DateTime<Utc>) -> Result<Option<i64>, TransportError> {
        let consumer = Arc::clone(&self.consumer);
        let topic = self.topic.clone();
        let partition = self.partition;
        let timeout = self.timeout;

        tokio::task::spawn_blocking(move || -> Result<Option<i64>, TransportError> {
            let mut tpl = TopicPartitionList::new();
            tpl.add_partition_offset(&topic, partition, Offset::Offset(at.timestamp_millis()))
                .map_err(|e| TransportError::from_kafka("offsets_for_times", e))?;

            let offsets = consumer
                .offsets_for_times(tpl, timeout)
                .map_err(|e| TransportError::from_kafka("offsets_for_times", e))?;

            // Offset::End means no record at or after the timestamp
            Ok(offsets
                .find_partition(&topic, partition)
                .and_then(|elem| match elem.offset() {
                    Offset::Offset(offset) => Some(offset),
                    _ => None,
                }))
        })
        .await?
    }

    async fn seek(&mut self, offset: i64) -> Result<(), TransportError> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(&self.topic, self.partition, Offset::Offset(offset))
            .map_err(|e| TransportError::from_kafka("seek", e))?;
        self.consumer
            .assign(&tpl)
            .map_err(|e| TransportError::from_kafka("seek", e))
    }

    /// Waits until at least `min_bytes` arrived, `max_bytes` is reached or the
    /// partition end is seen. Callers bound the wait with cancellation.
    async fn read_batch(&mut self, limits: BatchLimits) -> Result<RecordBatch, TransportError> {
        let mut records = Vec::new();
        let mut bytes = 0;
        let mut deadline = Instant::now() + self.batch_wait;

        loop {
            let received = match tokio::time::timeout_at(deadline, self.consumer.recv()).await {
                Ok(received) => received,
                Err(_) if bytes >= limits.min_bytes => break,
                Err(_) => {
                    // nothing worth returning yet, keep waiting like a fetch
                    // that has not met fetch.min.bytes. Unbounded here: the
                    // scanner races this call against its cancellation token,
                    // and a configured run deadline cancels that token.
                    deadline = Instant::now() + self.batch_wait;
                    continue;
                }
            };

            match received {
                Ok(message) => {
                    let record = self.to_record(&message);
                    bytes += record.payload.len().max(1);
                    records.push(record);
                    if bytes >= limits.max_bytes {
                        break;
                    }
                }
                Err(KafkaError::PartitionEOF(_)) => {
                    return Ok(RecordBatch::new(records).with_partition_end());
                }
                Err(e) => {
                    let failure = TransportError::from_kafka("recv", e);
                    if records.is_empty() {
                        return Err(failure);
                    }
                    return Ok(RecordBatch::new(records).with_failure(failure));
                }
            }
        }

        Ok(RecordBatch::new(records))
    }
}
