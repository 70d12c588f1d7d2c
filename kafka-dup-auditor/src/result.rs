use serde::Serialize;

use crate::aggregator::{ContentHash, Snapshot};
use crate::types::Occurrence;

/// All occurrences of one content hash seen at least twice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    pub hash: String,
    pub count: usize,
    pub occurrences: Vec<Occurrence>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanResult {
    pub topic: String,
    pub messages_read: u64,
    pub unique_messages: u64,
    pub duplicate_groups: u64,
    /// Not ordered.
    pub duplicates: Vec<DuplicateGroup>,
}

impl ScanResult {
    /// Messages that belong to some duplicate group.
    pub fn duplicated_messages(&self) -> u64 {
        self.duplicates.iter().map(|group| group.count as u64).sum()
    }
}

/// Lowercase, zero-padded 16 digit hex.
pub fn render_hash(hash: ContentHash) -> String {
    format!("{hash:016x}")
}

/// Reduce a frozen aggregator snapshot to the run report.
pub fn build(topic: &str, snapshot: Snapshot) -> ScanResult {
    let mut messages_read: u64 = 0;
    let mut unique_messages: u64 = 0;
    let mut duplicates = Vec::new();

    for (hash, occurrences) in snapshot {
        messages_read += occurrences.len() as u64;
        if occurrences.len() > 1 {
            duplicates.push(DuplicateGroup {
                hash: render_hash(hash),
                count: occurrences.len(),
                occurrences,
            });
        } else {
            unique_messages += 1;
        }
    }

    ScanResult {
        topic: topic.to_string(),
        messages_read,
        unique_messages,
        duplicate_groups: duplicates.len() as u64,
        duplicates,
    }
}
