use rdkafka::ClientConfig;

use crate::credentials::SaslCredentials;

/// Client configuration builder for assign-only partition readers.
///
/// Readers never join a consumer group and never commit offsets. `group.id`
/// is still set because rdkafka requires one for a consumer.
pub struct ReaderConfigBuilder {
    config: ClientConfig,
}

impl ReaderConfigBuilder {
    /// Sets bootstrap.servers, group.id, socket.timeout.ms, disables offset
    /// commits and store, and turns on partition EOF events.
    pub fn new(bootstrap_servers: &str, group_id: &str) -> Self {
        let mut config = ClientConfig::new();

        config
            .set("bootstrap.servers", bootstrap_servers)
            .set("group.id", group_id)
            .set("socket.timeout.ms", "10000");

        // Read-only: nothing about this run survives it
        config
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false")
            .set("enable.partition.eof", "true")
            .set("auto.offset.reset", "earliest");

        Self { config }
    }

    /// Enable TLS/SSL for Kafka connection
    pub fn with_tls(mut self, enabled: bool) -> Self {
        if enabled {
            self.config
                .set("security.protocol", "ssl")
                .set("enable.ssl.certificate.verification", "false");
        }
        self
    }

    /// Enable SASL authentication. Combined with TLS this selects SASL_SSL.
    pub fn with_sasl(mut self, credentials: Option<&SaslCredentials>) -> Self {
        if let Some(credentials) = credentials {
            let protocol = match self.config.get("security.protocol") {
                Some("ssl") => "sasl_ssl",
                _ => "sasl_plaintext",
            };
            self.config
                .set("security.protocol", protocol)
                .set("sasl.mechanism", &credentials.mechanism)
                .set("sasl.username", &credentials.username)
                .set("sasl.password", credentials.password());
        }
        self
    }

    /// Add any custom configuration
    pub fn set(mut self, key: &str, value: &str) -> Self {
        self.config.set(key, value);
        self
    }

    /// Set minimum bytes to fetch from broker (triggers fetch when buffer has less than this)
    pub fn with_fetch_min_bytes(mut self, bytes: usize) -> Self {
        self.config.set("fetch.min.bytes", bytes.to_string());
        self
    }

    /// Set maximum bytes to fetch from broker in a single request
    pub fn with_fetch_max_bytes(mut self, bytes: usize) -> Self {
        self.config.set("fetch.max.bytes", bytes.to_string());
        self.config
            .set("max.partition.fetch.bytes", bytes.to_string());
        self
    }

    /// Set maximum wait time when fetch.min.bytes is not satisfied
    pub fn with_fetch_wait_max_ms(mut self, ms: u64) -> Self {
        self.config.set("fetch.wait.max.ms", ms.to_string());
        self
    }

    /// Build the final configuration
    pub fn build(self) -> ClientConfig {
        self.config
    }
}
