use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use envconfig::Envconfig;

use crate::audit::{AuditSettings, ExecutionStrategy};
use crate::boundary::BoundaryPolicy;
use crate::credentials::{CredentialProvider, NoCredentials, SaslCredentials, StaticCredentials};
use crate::error::ConfigError;
use crate::transport::BatchLimits;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryMode {
    OffsetRange,
    TimeWindow,
    FullScan,
}

impl BoundaryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoundaryMode::OffsetRange => "offset-range",
            BoundaryMode::TimeWindow => "time-window",
            BoundaryMode::FullScan => "full-scan",
        }
    }
}

impl FromStr for BoundaryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "offset-range" | "offset" => Ok(BoundaryMode::OffsetRange),
            "time-window" | "time" => Ok(BoundaryMode::TimeWindow),
            "full-scan" | "full" => Ok(BoundaryMode::FullScan),
            other => Err(format!("unknown boundary mode: {other}")),
        }
    }
}

impl fmt::Display for BoundaryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Envconfig, Clone)]
pub struct Config {
    // Kafka configuration
    #[envconfig(default = "localhost:9092")]
    pub kafka_hosts: String, // comma separated

    pub kafka_topic: String,

    #[envconfig(default = "false")]
    pub kafka_tls: bool,

    pub kafka_sasl_mechanism: Option<String>, // e.g. SCRAM-SHA-256
    pub kafka_sasl_username: Option<String>,
    pub kafka_sasl_password: Option<String>,

    #[envconfig(default = "10000")]
    pub kafka_timeout_ms: u64, // metadata, watermark and offset lookups

    // Scan window
    #[envconfig(default = "full-scan")]
    pub boundary_mode: BoundaryMode,

    pub start_offset: Option<i64>,
    pub end_offset: Option<i64>,

    pub start_time: Option<String>, // RFC 3339
    pub end_time: Option<String>,   // RFC 3339

    #[envconfig(default = "0")]
    pub limit: u64, // 0 = no limit

    // Batch reads
    #[envconfig(default = "1")]
    pub fetch_min_bytes: usize,

    #[envconfig(default = "5000000")] // 5MB
    pub fetch_max_bytes: usize,

    #[envconfig(default = "500")]
    pub batch_wait_ms: u64,

    // Run
    #[envconfig(default = "concurrent")]
    pub scan_concurrency: ExecutionStrategy,

    #[envconfig(default = "0")]
    pub audit_timeout_secs: u64, // 0 = no deadline
}

impl Config {
    pub fn init_with_defaults() -> Result<Self, envconfig::Error> {
        Config::init_from_env()
    }

    pub fn brokers(&self) -> Vec<&str> {
        self.kafka_hosts
            .split(',')
            .map(str::trim)
            .filter(|host| !host.is_empty())
            .collect()
    }

    /// Broker list normalised for `bootstrap.servers`.
    pub fn bootstrap_servers(&self) -> Result<String, ConfigError> {
        let brokers = self.brokers();
        if brokers.is_empty() {
            return Err(ConfigError::Invalid {
                field: "KAFKA_HOSTS",
                reason: "no broker address given".to_string(),
            });
        }
        Ok(brokers.join(","))
    }

    /// Build the boundary policy for the configured mode. Only the fields the
    /// mode needs are read; the rest are ignored.
    pub fn boundary_policy(&self) -> Result<BoundaryPolicy, ConfigError> {
        let mode = self.boundary_mode.as_str();
        match self.boundary_mode {
            BoundaryMode::OffsetRange => {
                let start = self.start_offset.ok_or(ConfigError::Missing {
                    mode,
                    field: "START_OFFSET",
                })?;
                let end = self.end_offset.ok_or(ConfigError::Missing {
                    mode,
                    field: "END_OFFSET",
                })?;
                if start < 0 {
                    return Err(ConfigError::Invalid {
                        field: "START_OFFSET",
                        reason: format!("{start} is negative"),
                    });
                }
                if end < start {
                    return Err(ConfigError::Invalid {
                        field: "END_OFFSET",
                        reason: format!("{end} is before START_OFFSET {start}"),
                    });
                }
                Ok(BoundaryPolicy::OffsetRange { start, end })
            }
            BoundaryMode::TimeWindow => {
                let start = parse_time(mode, "START_TIME", self.start_time.as_deref())?;
                let end = parse_time(mode, "END_TIME", self.end_time.as_deref())?;
                if end < start {
                    return Err(ConfigError::Invalid {
                        field: "END_TIME",
                        reason: format!("{end} is before START_TIME {start}"),
                    });
                }
                Ok(BoundaryPolicy::TimeWindow {
                    start,
                    end,
                    limit: self.limit,
                })
            }
            BoundaryMode::FullScan => Ok(BoundaryPolicy::FullScan { limit: self.limit }),
        }
    }

    pub fn batch_limits(&self) -> BatchLimits {
        BatchLimits::new(self.fetch_min_bytes, self.fetch_max_bytes)
    }

    pub fn audit_settings(&self) -> Result<AuditSettings, ConfigError> {
        if self.kafka_topic.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "KAFKA_TOPIC",
                reason: "topic name is empty".to_string(),
            });
        }
        Ok(
            AuditSettings::new(self.kafka_topic.trim(), self.boundary_policy()?)
                .with_batch_limits(self.batch_limits())
                .with_strategy(self.scan_concurrency),
        )
    }

    /// SASL is enabled when a username is configured; mechanism and password
    /// are then required too.
    pub fn credential_provider(&self) -> Result<Box<dyn CredentialProvider>, ConfigError> {
        let Some(username) = self.kafka_sasl_username.as_deref() else {
            return Ok(Box::new(NoCredentials));
        };
        let mode = "sasl";
        let mechanism = self
            .kafka_sasl_mechanism
            .as_deref()
            .ok_or(ConfigError::Missing {
                mode,
                field: "KAFKA_SASL_MECHANISM",
            })?;
        let password = self
            .kafka_sasl_password
            .as_deref()
            .ok_or(ConfigError::Missing {
                mode,
                field: "KAFKA_SASL_PASSWORD",
            })?;
        Ok(Box::new(StaticCredentials::new(SaslCredentials::new(
            mechanism, username, password,
        ))))
    }

    pub fn kafka_timeout(&self) -> Duration {
        Duration::from_millis(self.kafka_timeout_ms)
    }

    pub fn batch_wait(&self) -> Duration {
        Duration::from_millis(self.batch_wait_ms)
    }

    pub fn audit_deadline(&self) -> Option<Duration> {
        (self.audit_timeout_secs > 0).then(|| Duration::from_secs(self.audit_timeout_secs))
    }
}

fn parse_time(
    mode: &'static str,
    field: &'static str,
    value: Option<&str>,
) -> Result<DateTime<Utc>, ConfigError> {
    let value = value.ok_or(ConfigError::Missing { mode, field })?;
    DateTime::parse_from_rfc3339(value.trim())
        .map(|time| time.with_timezone(&Utc))
        .map_err(|e| ConfigError::Invalid {
            field,
            reason: format!("{value:?} is not an RFC 3339 timestamp: {e}"),
        })
}
