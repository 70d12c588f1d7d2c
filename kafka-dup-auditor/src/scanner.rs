use std::time::Instant;

use metrics::{counter, histogram};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::aggregator::DedupAggregator;
use crate::boundary::{BoundaryPolicy, MessageBudget};
use crate::error::ScanError;
use crate::metrics_consts::{
    SCAN_BATCHES_READ, SCAN_DURATION_MS, SCAN_ERRORS, SCAN_MESSAGES_EMITTED,
    SCAN_PARTITIONS_EMPTY,
};
use crate::transport::{BatchLimits, PartitionCursor};
use crate::types::PartitionRef;

/// Reads one partition in batches between the bounds of a [`BoundaryPolicy`]
/// and forwards each in-window record to the aggregator as it is read.
///
/// The scanner keeps no per-partition state between calls to [`scan`], so a
/// single instance serves every partition of a run.
///
/// [`scan`]: PartitionScanner::scan
#[derive(Debug, Clone)]
pub struct PartitionScanner {
    policy: BoundaryPolicy,
    budget: MessageBudget,
    limits: BatchLimits,
}

/// How a scan that did not fail came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanEnd {
    EmptyWindow,
    PastEnd,
    BudgetExhausted,
    Exhausted,
}

impl ScanEnd {
    fn as_str(&self) -> &'static str {
        match self {
            ScanEnd::EmptyWindow => "empty_window",
            ScanEnd::PastEnd => "past_end",
            ScanEnd::BudgetExhausted => "budget_exhausted",
            ScanEnd::Exhausted => "exhausted",
        }
    }
}

impl PartitionScanner {
    pub fn new(policy: BoundaryPolicy, budget: MessageBudget, limits: BatchLimits) -> Self {
        Self {
            policy,
            budget,
            limits,
        }
    }

    /// Scan `partition` through `cursor`, returning how many records were
    /// forwarded to `sink`.
    ///
    /// Every wait on the broker also waits on `cancel`. A failed scan reports
    /// the records already forwarded through [`ScanError::messages_read`].
    pub async fn scan<C>(
        &self,
        mut cursor: C,
        partition: &PartitionRef,
        sink: &DedupAggregator,
        cancel: &CancellationToken,
    ) -> Result<u64, ScanError>
    where
        C: PartitionCursor,
    {
        let started = Instant::now();
        let partition_id = partition.id();

        let result = self
            .scan_inner(&mut cursor, partition_id, sink, cancel)
            .await;

        let partition_label = partition_id.to_string();
        histogram!(SCAN_DURATION_MS, "partition" => partition_label.clone())
            .record(started.elapsed().as_millis() as f64);

        match result {
            Ok((emitted, end)) => {
                counter!(SCAN_MESSAGES_EMITTED, "partition" => partition_label).increment(emitted);
                info!(
                    partition = partition_id,
                    messages = emitted,
                    end = end.as_str(),
                    "Finished scanning partition"
                );
                Ok(emitted)
            }
            Err(e) => {
                counter!(SCAN_MESSAGES_EMITTED, "partition" => partition_label)
                    .increment(e.messages_read());
                counter!(SCAN_ERRORS, "error_type" => e.error_type()).increment(1);
                if e.is_cancelled() {
                    debug!(partition = partition_id, error = ?e, "Partition scan cancelled");
                } else {
                    warn!(partition = partition_id, error = ?e, "Partition scan failed");
                }
                Err(e)
            }
        }
    }

    async fn scan_inner<C>(
        &self,
        cursor: &mut C,
        partition: i32,
        sink: &DedupAggregator,
        cancel: &CancellationToken,
    ) -> Result<(u64, ScanEnd), ScanError>
    where
        C: PartitionCursor,
    {
        let cancelled = |messages_read| ScanError::Cancelled {
            partition,
            messages_read,
        };

        let watermarks = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled(0)),
            watermarks = cursor.watermarks() => watermarks.map_err(|source| ScanError::OffsetResolution {
                partition,
                boundary: "high watermark",
                source,
            })?,
        };
        let high_water_mark = watermarks.high;

        let start = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled(0)),
            start = self.policy.resolve_start(&mut *cursor, watermarks) => start.map_err(|source| ScanError::OffsetResolution {
                partition,
                boundary: self.policy.start_boundary(),
                source,
            })?,
        };

        if watermarks.is_empty() || start >= high_water_mark || self.policy.is_empty_window(start)
        {
            counter!(SCAN_PARTITIONS_EMPTY).increment(1);
            debug!(
                partition,
                start,
                high_water_mark,
                "Nothing to scan in partition window"
            );
            return Ok((0, ScanEnd::EmptyWindow));
        }

        cursor
            .seek(start)
            .await
            .map_err(|source| ScanError::OffsetResolution {
                partition,
                boundary: "seek",
                source,
            })?;

        info!(
            partition,
            start,
            high_water_mark,
            policy = self.policy.kind(),
            "Scanning partition"
        );

        let mut emitted: u64 = 0;
        // offset of the last record taken off the wire, in window or not
        let mut position = start - 1;

        loop {
            if self.budget.is_exhausted() {
                return Ok((emitted, ScanEnd::BudgetExhausted));
            }

            let mut batch = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled(emitted)),
                batch = cursor.read_batch(self.limits) => batch.map_err(|source| ScanError::Read {
                    partition,
                    messages_read: emitted,
                    source,
                })?,
            };
            counter!(SCAN_BATCHES_READ).increment(1);
            debug!(partition, records = batch.len(), "Read batch");

            loop {
                let record = match batch.next_record() {
                    Ok(Some(record)) => record,
                    Ok(None) => break,
                    Err(source) => {
                        return Err(ScanError::Read {
                            partition,
                            messages_read: emitted,
                            source,
                        })
                    }
                };
                position = record.offset;

                if self.policy.is_past_end(&record, emitted, high_water_mark) {
                    return Ok((emitted, ScanEnd::PastEnd));
                }
                if !self.budget.try_claim() {
                    return Ok((emitted, ScanEnd::BudgetExhausted));
                }

                sink.record_message(&record);
                emitted += 1;
            }

            if position >= high_water_mark - 1 || batch.reached_partition_end() {
                return Ok((emitted, ScanEnd::Exhausted));
            }
        }
    }
}
