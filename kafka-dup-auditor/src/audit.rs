use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{gauge, histogram};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::aggregator::DedupAggregator;
use crate::boundary::BoundaryPolicy;
use crate::error::{AuditError, ScanError};
use crate::metrics_consts::{
    AUDIT_DUPLICATE_GROUPS, AUDIT_DURATION_MS, AUDIT_MESSAGES_READ, AUDIT_PARTITIONS,
};
use crate::result::{self, ScanResult};
use crate::scanner::PartitionScanner;
use crate::transport::{BatchLimits, LogTransport};
use crate::types::PartitionRef;

/// How partition scans of one run are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionStrategy {
    /// One task per partition, all in flight at once.
    #[default]
    Concurrent,
    /// One partition after the other on the calling task.
    Sequential,
}

impl FromStr for ExecutionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "concurrent" | "parallel" => Ok(ExecutionStrategy::Concurrent),
            "sequential" => Ok(ExecutionStrategy::Sequential),
            other => Err(format!("unknown execution strategy: {other}")),
        }
    }
}

impl fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStrategy::Concurrent => write!(f, "concurrent"),
            ExecutionStrategy::Sequential => write!(f, "sequential"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuditSettings {
    pub topic: String,
    pub policy: BoundaryPolicy,
    pub batch_limits: BatchLimits,
    pub strategy: ExecutionStrategy,
}

impl AuditSettings {
    pub fn new(topic: impl Into<String>, policy: BoundaryPolicy) -> Self {
        Self {
            topic: topic.into(),
            policy,
            batch_limits: BatchLimits::default(),
            strategy: ExecutionStrategy::default(),
        }
    }

    pub fn with_batch_limits(mut self, batch_limits: BatchLimits) -> Self {
        self.batch_limits = batch_limits;
        self
    }

    pub fn with_strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

/// Runs one audit: discovers partitions, scans each one through the
/// configured boundary policy and reduces what was seen into a
/// [`ScanResult`].
pub struct Auditor<T: LogTransport> {
    transport: Arc<T>,
    settings: AuditSettings,
}

impl<T: LogTransport> Auditor<T> {
    pub fn new(transport: Arc<T>, settings: AuditSettings) -> Self {
        Self {
            transport,
            settings,
        }
    }

    /// Run the audit to completion.
    ///
    /// Cancelling `cancel` stops every scan at its next broker wait and fails
    /// the run with [`AuditError::Cancelled`]. A partition failure cancels the
    /// remaining scans; the first failure is returned once all have stopped.
    pub async fn run(&self, cancel: CancellationToken) -> Result<ScanResult, AuditError> {
        let started = Instant::now();
        let topic = self.settings.topic.as_str();

        let partitions = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AuditError::Cancelled),
            partitions = self.transport.list_partitions(topic) => partitions.map_err(|source| AuditError::Discovery {
                topic: topic.to_string(),
                source,
            })?,
        };

        gauge!(AUDIT_PARTITIONS, "topic" => topic.to_string()).set(partitions.len() as f64);
        info!(
            topic,
            partitions = partitions.len(),
            policy = self.settings.policy.kind(),
            strategy = %self.settings.strategy,
            "Discovered partitions, starting audit"
        );

        let aggregator = Arc::new(DedupAggregator::new());
        let scanner = Arc::new(PartitionScanner::new(
            self.settings.policy.clone(),
            self.settings.policy.budget(),
            self.settings.batch_limits,
        ));

        let scanned = match self.settings.strategy {
            ExecutionStrategy::Concurrent => {
                self.scan_concurrently(partitions, &scanner, &aggregator, &cancel)
                    .await
            }
            ExecutionStrategy::Sequential => {
                self.scan_sequentially(partitions, &scanner, &aggregator, &cancel)
                    .await
            }
        };

        let messages = match scanned {
            Ok(messages) => messages,
            Err(e) => {
                error!(topic, error = ?e, error_type = e.error_type(), "Audit failed");
                return Err(e);
            }
        };

        let aggregator = Arc::into_inner(aggregator).ok_or_else(|| {
            AuditError::invalid_state("aggregator still shared after every scan finished")
        })?;
        let result = result::build(topic, aggregator.into_snapshot());

        if result.messages_read != messages {
            warn!(
                topic,
                scanned = messages,
                aggregated = result.messages_read,
                "Scanned and aggregated message counts differ"
            );
        }

        histogram!(AUDIT_DURATION_MS).record(started.elapsed().as_millis() as f64);
        gauge!(AUDIT_MESSAGES_READ, "topic" => topic.to_string()).set(result.messages_read as f64);
        gauge!(AUDIT_DUPLICATE_GROUPS, "topic" => topic.to_string())
            .set(result.duplicate_groups as f64);
        info!(
            topic,
            messages_read = result.messages_read,
            unique_messages = result.unique_messages,
            duplicate_groups = result.duplicate_groups,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Audit complete"
        );

        Ok(result)
    }

    async fn scan_concurrently(
        &self,
        partitions: Vec<PartitionRef>,
        scanner: &Arc<PartitionScanner>,
        aggregator: &Arc<DedupAggregator>,
        cancel: &CancellationToken,
    ) -> Result<u64, AuditError> {
        // cancelled on the first partition failure without touching the caller's token
        let scans_cancel = cancel.child_token();
        let mut tasks = JoinSet::new();

        for partition in partitions {
            let transport = Arc::clone(&self.transport);
            let scanner = Arc::clone(scanner);
            let aggregator = Arc::clone(aggregator);
            let token = scans_cancel.clone();
            let topic = self.settings.topic.clone();
            tasks.spawn(async move {
                let result = scan_partition(
                    transport.as_ref(),
                    &topic,
                    &scanner,
                    &partition,
                    &aggregator,
                    &token,
                )
                .await;
                (partition.id(), result)
            });
        }

        let mut total: u64 = 0;
        let mut first_error: Option<AuditError> = None;
        let mut saw_cancellation = false;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(messages))) => total += messages,
                Ok((_, Err(e))) if e.is_cancelled() => saw_cancellation = true,
                Ok((partition, Err(source))) => {
                    if first_error.is_none() {
                        scans_cancel.cancel();
                        first_error = Some(AuditError::Partition { partition, source });
                    }
                }
                Err(e) => {
                    if first_error.is_none() {
                        scans_cancel.cancel();
                        first_error = Some(AuditError::invalid_state(format!(
                            "scan task panicked: {e}"
                        )));
                    }
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        if saw_cancellation || cancel.is_cancelled() {
            return Err(AuditError::Cancelled);
        }
        Ok(total)
    }

    async fn scan_sequentially(
        &self,
        partitions: Vec<PartitionRef>,
        scanner: &PartitionScanner,
        aggregator: &DedupAggregator,
        cancel: &CancellationToken,
    ) -> Result<u64, AuditError> {
        let mut total: u64 = 0;

        for partition in partitions {
            match scan_partition(
                self.transport.as_ref(),
                &self.settings.topic,
                scanner,
                &partition,
                aggregator,
                cancel,
            )
            .await
            {
                Ok(messages) => total += messages,
                Err(e) if e.is_cancelled() => return Err(AuditError::Cancelled),
                Err(source) => {
                    return Err(AuditError::Partition {
                        partition: partition.id(),
                        source,
                    })
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(AuditError::Cancelled);
        }
        Ok(total)
    }
}

/// Cancel `cancel` once `deadline` elapses. The watcher exits early when the
/// token is cancelled by anything else.
pub fn cancel_after(cancel: CancellationToken, deadline: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(deadline) => {
                warn!(?deadline, "Audit deadline reached, cancelling");
                cancel.cancel();
            }
        }
    })
}

async fn scan_partition<T: LogTransport>(
    transport: &T,
    topic: &str,
    scanner: &PartitionScanner,
    partition: &PartitionRef,
    aggregator: &DedupAggregator,
    cancel: &CancellationToken,
) -> Result<u64, ScanError> {
    let cursor = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(ScanError::Cancelled {
            partition: partition.id(),
            messages_read: 0,
        }),
        cursor = transport.open_cursor(topic, partition) => cursor.map_err(|source| ScanError::Connect {
            partition: partition.id(),
            source,
        })?,
    };

    scanner.scan(cursor, partition, aggregator, cancel).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_strategy_parsing() {
        assert_eq!(
            "concurrent".parse::<ExecutionStrategy>().unwrap(),
            ExecutionStrategy::Concurrent
        );
        assert_eq!(
            " Sequential ".parse::<ExecutionStrategy>().unwrap(),
            ExecutionStrategy::Sequential
        );
        assert!("round-robin".parse::<ExecutionStrategy>().is_err());
        assert_eq!(ExecutionStrategy::default().to_string(), "concurrent");
    }

    #[tokio::test]
    async fn test_deadline_cancels_token() {
        let cancel = CancellationToken::new();
        let watcher = cancel_after(cancel.clone(), Duration::from_millis(20));

        tokio::time::timeout(Duration::from_secs(5), cancel.cancelled())
            .await
            .expect("deadline did not cancel the token");
        watcher.await.unwrap();
    }

    #[tokio::test]
    async fn test_deadline_watcher_exits_when_cancelled_elsewhere() {
        let cancel = CancellationToken::new();
        let watcher = cancel_after(cancel.clone(), Duration::from_secs(3_600));
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(5), watcher)
            .await
            .expect("watcher outlived its token")
            .unwrap();
    }

    #[test]
    fn test_settings_builder() {
        let settings = AuditSettings::new("events", BoundaryPolicy::FullScan { limit: 0 })
            .with_strategy(ExecutionStrategy::Sequential)
            .with_batch_limits(BatchLimits::new(10, 1_000));

        assert_eq!(settings.topic, "events");
        assert_eq!(settings.strategy, ExecutionStrategy::Sequential);
        assert_eq!(settings.batch_limits, BatchLimits::new(10, 1_000));
    }
}
