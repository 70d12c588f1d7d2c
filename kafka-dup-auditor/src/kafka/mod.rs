// Kafka module - rdkafka-backed transport for partition scans
pub mod config;
pub mod transport;

// Public API
pub use config::ReaderConfigBuilder;
pub use transport::{KafkaCursor, KafkaTransport};
