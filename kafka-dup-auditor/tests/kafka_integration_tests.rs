//! Audits against a real broker.
//!
//! These tests require a running Kafka instance on localhost:9092 (typically
//! via docker-compose) and are ignored by default.

use std::sync::Arc;
use std::time::Duration;

use kafka_dup_auditor::kafka::{KafkaTransport, ReaderConfigBuilder};
use kafka_dup_auditor::transport::LogTransport;
use kafka_dup_auditor::{AuditError, AuditSettings, Auditor, BoundaryPolicy, TransportError};
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const KAFKA_BROKERS: &str = "localhost:9092";
const TEST_TOPIC_BASE: &str = "kafka-dup-auditor-integration-test";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

async fn create_topic_with_partitions(topic: &str, num_partitions: i32) -> anyhow::Result<()> {
    let admin_client: AdminClient<DefaultClientContext> = ClientConfig::new()
        .set("bootstrap.servers", KAFKA_BROKERS)
        .create()?;

    let new_topic = NewTopic::new(topic, num_partitions, TopicReplication::Fixed(1));
    let results = admin_client
        .create_topics(&[new_topic], &AdminOptions::new())
        .await?;
    for result in results {
        match result {
            Ok(_) => {}
            Err((_, rdkafka::types::RDKafkaErrorCode::TopicAlreadyExists)) => {}
            Err((topic, e)) => {
                return Err(anyhow::anyhow!("Failed to create topic {topic}: {e:?}"))
            }
        }
    }

    // Give Kafka time to create partitions and propagate metadata
    tokio::time::sleep(Duration::from_millis(200)).await;
    Ok(())
}

/// Produce `(partition, payload)` pairs in order.
async fn produce(topic: &str, messages: &[(i32, &str)]) -> anyhow::Result<()> {
    let producer: FutureProducer = ClientConfig::new()
        .set("bootstrap.servers", KAFKA_BROKERS)
        .set("message.timeout.ms", "5000")
        .create()?;

    for (partition, payload) in messages {
        let record = FutureRecord::<(), str>::to(topic)
            .partition(*partition)
            .payload(payload);
        producer
            .send(record, Timeout::After(DEFAULT_TIMEOUT))
            .await
            .map_err(|(e, _)| anyhow::anyhow!("Failed to send message: {e}"))?;
    }
    producer.flush(Timeout::After(DEFAULT_TIMEOUT))?;
    Ok(())
}

fn transport() -> KafkaTransport {
    let group_id = format!("{TEST_TOPIC_BASE}-{}", Uuid::new_v4());
    let config = ReaderConfigBuilder::new(KAFKA_BROKERS, &group_id).build();
    KafkaTransport::new(config, DEFAULT_TIMEOUT, Duration::from_millis(200))
}

#[tokio::test]
#[ignore = "requires a Kafka broker on localhost:9092"]
async fn test_full_scan_against_broker() -> anyhow::Result<()> {
    let topic = format!("{TEST_TOPIC_BASE}-full-{}", Uuid::new_v4());
    create_topic_with_partitions(&topic, 2).await?;
    produce(&topic, &[(0, "A"), (0, "B"), (0, "A"), (1, "B")]).await?;

    let settings = AuditSettings::new(topic.clone(), BoundaryPolicy::FullScan { limit: 0 });
    let result = Auditor::new(Arc::new(transport()), settings)
        .run(CancellationToken::new())
        .await?;

    assert_eq!(result.messages_read, 4);
    assert_eq!(result.unique_messages, 0);
    assert_eq!(result.duplicate_groups, 2);
    Ok(())
}

#[tokio::test]
#[ignore = "requires a Kafka broker on localhost:9092"]
async fn test_offset_range_against_broker() -> anyhow::Result<()> {
    let topic = format!("{TEST_TOPIC_BASE}-range-{}", Uuid::new_v4());
    create_topic_with_partitions(&topic, 1).await?;
    let payloads: Vec<String> = (0..20).map(|i| format!("message-{i}")).collect();
    let messages: Vec<(i32, &str)> = payloads.iter().map(|p| (0, p.as_str())).collect();
    produce(&topic, &messages).await?;

    let settings = AuditSettings::new(
        topic.clone(),
        BoundaryPolicy::OffsetRange { start: 5, end: 10 },
    );
    let result = Auditor::new(Arc::new(transport()), settings)
        .run(CancellationToken::new())
        .await?;

    assert_eq!(result.messages_read, 5);
    assert_eq!(result.unique_messages, 5);
    Ok(())
}

#[tokio::test]
#[ignore = "requires a Kafka broker on localhost:9092"]
async fn test_empty_topic_is_an_empty_report() -> anyhow::Result<()> {
    let topic = format!("{TEST_TOPIC_BASE}-empty-{}", Uuid::new_v4());
    create_topic_with_partitions(&topic, 3).await?;

    let partitions = transport().list_partitions(&topic).await?;
    assert_eq!(partitions.len(), 3);

    let settings = AuditSettings::new(topic.clone(), BoundaryPolicy::FullScan { limit: 0 });
    let result = Auditor::new(Arc::new(transport()), settings)
        .run(CancellationToken::new())
        .await?;

    assert_eq!(result.messages_read, 0);
    assert!(result.duplicates.is_empty());
    Ok(())
}

#[tokio::test]
#[ignore = "requires a Kafka broker on localhost:9092"]
async fn test_missing_topic_fails_discovery() {
    let topic = format!("{TEST_TOPIC_BASE}-missing-{}", Uuid::new_v4());
    // keep the broker from auto-creating the topic on the metadata request
    let config = ReaderConfigBuilder::new(KAFKA_BROKERS, "kafka-dup-auditor-missing")
        .set("allow.auto.create.topics", "false")
        .build();
    let transport = KafkaTransport::new(config, DEFAULT_TIMEOUT, Duration::from_millis(200));

    let settings = AuditSettings::new(topic, BoundaryPolicy::FullScan { limit: 0 });
    let err = Auditor::new(Arc::new(transport), settings)
        .run(CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AuditError::Discovery {
            source: TransportError::UnknownTopic(_) | TransportError::Kafka { .. },
            ..
        }
    ));
}
