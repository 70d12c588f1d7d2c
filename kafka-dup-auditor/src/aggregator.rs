use std::collections::HashMap;
use std::hash::Hasher as _;

use dashmap::DashMap;
use twox_hash::XxHash64;

use crate::types::{MessageRecord, Occurrence};

/// 64-bit content digest used as the deduplication key.
pub type ContentHash = u64;

/// XxHash64 of `payload` with seed 0. Deterministic across runs and hosts;
/// two payloads with equal hashes are counted as the same content.
pub fn content_hash(payload: &[u8]) -> ContentHash {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(payload);
    hasher.finish()
}

/// Concurrent hash -> occurrences accumulator shared by every partition scan
/// of one run.
///
/// Only `record` is available while scans run. The buckets are read by
/// consuming the aggregator with [`DedupAggregator::into_snapshot`], which
/// requires every scan to have released its handle first.
#[derive(Debug, Default)]
pub struct DedupAggregator {
    buckets: DashMap<ContentHash, Vec<Occurrence>>,
}

impl DedupAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `occurrence` to the bucket for `hash`, creating it if absent.
    pub fn record(&self, hash: ContentHash, occurrence: Occurrence) {
        // entry() holds the shard lock, so a racing first insert for the same
        // hash lands in one bucket
        self.buckets.entry(hash).or_default().push(occurrence);
    }

    pub fn record_message(&self, record: &MessageRecord) {
        self.record(content_hash(&record.payload), record.occurrence());
    }

    pub fn into_snapshot(self) -> Snapshot {
        Snapshot {
            buckets: self.buckets.into_iter().collect(),
        }
    }
}

/// Frozen aggregator state: every hash with its occurrences in observed order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Snapshot {
    buckets: HashMap<ContentHash, Vec<Occurrence>>,
}

impl Snapshot {
    /// Number of distinct hashes.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn get(&self, hash: ContentHash) -> Option<&[Occurrence]> {
        self.buckets.get(&hash).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ContentHash, &Vec<Occurrence>)> {
        self.buckets.iter()
    }

    pub fn total_occurrences(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn into_buckets(self) -> HashMap<ContentHash, Vec<Occurrence>> {
        self.buckets
    }
}

impl IntoIterator for Snapshot {
    type Item = (ContentHash, Vec<Occurrence>);
    type IntoIter = std::collections::hash_map::IntoIter<ContentHash, Vec<Occurrence>>;

    fn into_iter(self) -> Self::IntoIter {
        self.buckets.into_iter()
    }
}
