use chrono::{DateTime, Utc};
use serde::Serialize;

/// A partition discovered for the audited topic.
///
/// The leader is the broker id currently serving the partition, when the
/// transport reports one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartitionRef {
    id: i32,
    leader: Option<i32>,
}

impl PartitionRef {
    pub fn new(id: i32) -> Self {
        Self { id, leader: None }
    }

    pub fn with_leader(mut self, leader: i32) -> Self {
        self.leader = Some(leader);
        self
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn leader(&self) -> Option<i32> {
        self.leader
    }
}

/// A single record read from a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    pub payload: Vec<u8>,
    pub partition: i32,
    pub offset: i64,
    /// Timestamp embedded in the record, not the time we read it.
    pub timestamp: DateTime<Utc>,
}

impl MessageRecord {
    pub fn new(payload: Vec<u8>, partition: i32, offset: i64, timestamp: DateTime<Utc>) -> Self {
        Self {
            payload,
            partition,
            offset,
            timestamp,
        }
    }

    pub fn occurrence(&self) -> Occurrence {
        Occurrence {
            partition: self.partition,
            offset: self.offset,
            timestamp: self.timestamp,
        }
    }
}

/// Where a content hash was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Occurrence {
    pub partition: i32,
    pub offset: i64,
    pub timestamp: DateTime<Utc>,
}

/// Low and high watermarks of a partition. `high` is the first offset not yet
/// written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watermarks {
    pub low: i64,
    pub high: i64,
}

impl Watermarks {
    pub fn new(low: i64, high: i64) -> Self {
        Self { low, high }
    }

    pub fn is_empty(&self) -> bool {
        self.high <= self.low
    }
}
