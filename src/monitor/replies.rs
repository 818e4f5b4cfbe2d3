//! Reply tracking for forwarded threads
//!
//! Maps a discussion-group message to the thread whose replies are mirrored
//! under it, with the timestamp of the newest reply already posted.

use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct TrackedThread {
    pub url: String,
    pub max_timestamp: i64,
}

#[derive(Debug, Default)]
pub struct ReplyTracker {
    threads: BTreeMap<i64, TrackedThread>,
}

impl ReplyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) tracking `url` under `message_id`
    pub fn track(&mut self, message_id: i64, url: &str, since: i64) {
        self.threads.insert(
            message_id,
            TrackedThread {
                url: url.to_string(),
                max_timestamp: since,
            },
        );
    }

    /// Returns the ids that were tracked
    pub fn remove(&mut self, message_ids: &[i64]) -> Vec<i64> {
        message_ids
            .iter()
            .filter(|id| self.threads.remove(*id).is_some())
            .copied()
            .collect()
    }

    pub fn clear(&mut self) {
        self.threads.clear();
    }

    /// Move the high-water mark forward; older timestamps are ignored
    pub fn advance(&mut self, message_id: i64, timestamp: i64) {
        if let Some(thread) = self.threads.get_mut(&message_id) {
            thread.max_timestamp = thread.max_timestamp.max(timestamp);
        }
    }

    pub fn get(&self, message_id: i64) -> Option<&TrackedThread> {
        self.threads.get(&message_id)
    }

    pub fn snapshot(&self) -> Vec<(i64, TrackedThread)> {
        self.threads
            .iter()
            .map(|(id, thread)| (*id, thread.clone()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }
}
