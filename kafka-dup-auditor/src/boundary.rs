//! Scan windows: where a partition scan starts and which record closes it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::TransportError;
use crate::transport::PartitionCursor;
use crate::types::{MessageRecord, Watermarks};

/// Boundary rule shared by every partition scan of a run.
///
/// The policy holds no per-partition state, so one value can drive any number
/// of scans, concurrent or sequential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundaryPolicy {
    /// Half-open offset range `[start, end)`.
    OffsetRange { start: i64, end: i64 },

    /// Records with `start <= timestamp <= end`. A non-zero `limit` caps the
    /// messages taken from each partition.
    TimeWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: u64,
    },

    /// Everything from the log start up to the high watermark. A non-zero
    /// `limit` caps the messages taken across all partitions.
    FullScan { limit: u64 },
}

impl BoundaryPolicy {
    pub fn kind(&self) -> &'static str {
        match self {
            BoundaryPolicy::OffsetRange { .. } => "offset-range",
            BoundaryPolicy::TimeWindow { .. } => "time-window",
            BoundaryPolicy::FullScan { .. } => "full-scan",
        }
    }

    /// Which start position `resolve_start` looks up, for error reporting.
    pub fn start_boundary(&self) -> &'static str {
        match self {
            BoundaryPolicy::OffsetRange { .. } => "start",
            BoundaryPolicy::TimeWindow { .. } => "start time",
            BoundaryPolicy::FullScan { .. } => "log start",
        }
    }

    /// Resolve the first offset to read.
    ///
    /// An offset-range start below the low watermark is clamped to it, since
    /// those records no longer exist. A time-window start with no record at
    /// or after it resolves to the high watermark, which is an empty window.
    pub async fn resolve_start<C>(
        &self,
        cursor: &mut C,
        watermarks: Watermarks,
    ) -> Result<i64, TransportError>
    where
        C: PartitionCursor + ?Sized,
    {
        match self {
            BoundaryPolicy::OffsetRange { start, .. } => Ok((*start).max(watermarks.low)),
            BoundaryPolicy::TimeWindow { start, .. } => Ok(cursor
                .offset_for_time(*start)
                .await?
                .map_or(watermarks.high, |offset| offset.max(watermarks.low))),
            BoundaryPolicy::FullScan { .. } => Ok(watermarks.low),
        }
    }

    /// True when the window cannot contain any record starting at `start`.
    pub fn is_empty_window(&self, start: i64) -> bool {
        match self {
            BoundaryPolicy::OffsetRange { end, .. } => start >= *end,
            BoundaryPolicy::TimeWindow { start: from, end, .. } => from > end,
            BoundaryPolicy::FullScan { .. } => false,
        }
    }

    /// True when `record` lies past the end of the window. `emitted` is the
    /// number of records this partition scan has already forwarded.
    pub fn is_past_end(&self, record: &MessageRecord, emitted: u64, high_water_mark: i64) -> bool {
        match self {
            BoundaryPolicy::OffsetRange { end, .. } => record.offset >= *end,
            BoundaryPolicy::TimeWindow { end, limit, .. } => {
                record.timestamp > *end
                    || record.offset >= high_water_mark
                    || (*limit > 0 && emitted >= *limit)
            }
            BoundaryPolicy::FullScan { .. } => record.offset >= high_water_mark,
        }
    }

    /// The run-wide message budget this policy implies.
    pub fn budget(&self) -> MessageBudget {
        match self {
            BoundaryPolicy::FullScan { limit } => MessageBudget::new(*limit),
            _ => MessageBudget::unlimited(),
        }
    }
}

/// Cross-partition message budget. Cloned into every scan of a run; all
/// clones draw from the same counter.
#[derive(Debug, Clone, Default)]
pub struct MessageBudget {
    limit: Option<u64>,
    claimed: Arc<AtomicU64>,
}

impl MessageBudget {
    /// A `limit` of zero means no limit.
    pub fn new(limit: u64) -> Self {
        Self {
            limit: (limit > 0).then_some(limit),
            claimed: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Claim room for one message. Returns false once the limit is reached.
    pub fn try_claim(&self) -> bool {
        match self.limit {
            None => true,
            Some(limit) => self
                .claimed
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |claimed| {
                    (claimed < limit).then_some(claimed + 1)
                })
                .is_ok(),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        match self.limit {
            None => false,
            Some(limit) => self.claimed.load(Ordering::Acquire) >= limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{test_timestamp, InMemoryPartition};
    use chrono::TimeDelta;
    use test_case::test_case;

    fn record_at(offset: i64, timestamp: DateTime<Utc>) -> MessageRecord {
        MessageRecord::new(b"payload".to_vec(), 0, offset, timestamp)
    }

    #[test_case(4, false ; "before window start is not past end")]
    #[test_case(5, false ; "window start")]
    #[test_case(9, false ; "last offset in window")]
    #[test_case(10, true ; "end offset is excluded")]
    #[test_case(11, true ; "beyond end offset")]
    fn test_offset_range_is_half_open(offset: i64, past_end: bool) {
        let policy = BoundaryPolicy::OffsetRange { start: 5, end: 10 };
        let record = record_at(offset, test_timestamp(offset));
        assert_eq!(policy.is_past_end(&record, 0, 100), past_end);
    }

    #[test]
    fn test_time_window_end_is_inclusive() {
        let end = test_timestamp(10);
        let policy = BoundaryPolicy::TimeWindow {
            start: test_timestamp(0),
            end,
            limit: 0,
        };

        assert!(!policy.is_past_end(&record_at(3, end), 0, 100));
        assert!(policy.is_past_end(&record_at(4, end + TimeDelta::nanoseconds(1)), 0, 100));
    }

    #[test]
    fn test_time_window_stops_at_high_watermark_and_limit() {
        let policy = BoundaryPolicy::TimeWindow {
            start: test_timestamp(0),
            end: test_timestamp(1_000),
            limit: 3,
        };

        assert!(policy.is_past_end(&record_at(20, test_timestamp(1)), 0, 20));
        assert!(!policy.is_past_end(&record_at(1, test_timestamp(1)), 2, 20));
        assert!(policy.is_past_end(&record_at(2, test_timestamp(2)), 3, 20));
    }

    #[test]
    fn test_full_scan_stops_at_high_watermark_only() {
        let policy = BoundaryPolicy::FullScan { limit: 0 };
        assert!(!policy.is_past_end(&record_at(99, test_timestamp(99)), 1_000_000, 100));
        assert!(policy.is_past_end(&record_at(100, test_timestamp(100)), 0, 100));
    }

    #[tokio::test]
    async fn test_resolve_start_per_policy() {
        let partition = InMemoryPartition::from_payloads(0, 10, &[b"a", b"b", b"c", b"d"]);
        let mut cursor = partition.cursor(10);
        let watermarks = Watermarks::new(10, 14);

        let offset_range = BoundaryPolicy::OffsetRange { start: 12, end: 20 };
        assert_eq!(
            offset_range.resolve_start(&mut cursor, watermarks).await.unwrap(),
            12
        );

        let below_log_start = BoundaryPolicy::OffsetRange { start: 0, end: 20 };
        assert_eq!(
            below_log_start
                .resolve_start(&mut cursor, watermarks)
                .await
                .unwrap(),
            10
        );

        let full_scan = BoundaryPolicy::FullScan { limit: 0 };
        assert_eq!(
            full_scan.resolve_start(&mut cursor, watermarks).await.unwrap(),
            10
        );

        let time_window = BoundaryPolicy::TimeWindow {
            start: test_timestamp(12),
            end: test_timestamp(20),
            limit: 0,
        };
        assert_eq!(
            time_window
                .resolve_start(&mut cursor, watermarks)
                .await
                .unwrap(),
            12
        );

        let after_last_record = BoundaryPolicy::TimeWindow {
            start: test_timestamp(500),
            end: test_timestamp(600),
            limit: 0,
        };
        assert_eq!(
            after_last_record
                .resolve_start(&mut cursor, watermarks)
                .await
                .unwrap(),
            14
        );
    }

    #[test]
    fn test_empty_windows() {
        assert!(BoundaryPolicy::OffsetRange { start: 0, end: 0 }.is_empty_window(0));
        assert!(!BoundaryPolicy::OffsetRange { start: 0, end: 1 }.is_empty_window(0));
        assert!(!BoundaryPolicy::FullScan { limit: 0 }.is_empty_window(0));
    }

    #[test]
    fn test_budget_is_shared_between_clones() {
        let budget = MessageBudget::new(3);
        let other = budget.clone();

        assert!(budget.try_claim());
        assert!(other.try_claim());
        assert!(!budget.is_exhausted());
        assert!(budget.try_claim());
        assert!(other.is_exhausted());
        assert!(!other.try_claim());
        assert!(!budget.try_claim());
    }

    #[test]
    fn test_zero_budget_is_unlimited() {
        let budget = MessageBudget::new(0);
        for _ in 0..1_000 {
            assert!(budget.try_claim());
        }
        assert!(!budget.is_exhausted());
        assert!(!BoundaryPolicy::OffsetRange { start: 0, end: 1 }
            .budget()
            .is_exhausted());
    }
}
