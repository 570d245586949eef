use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_LOG_CAPACITY: usize = 200;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum EntryKind {
    Status,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub kind: EntryKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Status/error feed shown in the log panel. Newest entry first; once
/// `capacity` is reached the oldest entry is evicted.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }
}

impl ActivityLog {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, kind: EntryKind, message: impl Into<String>, at: DateTime<Utc>) {
        if self.entries.len() == self.capacity {
            self.entries.pop_back();
        }
        self.entries.push_front(LogEntry {
            kind,
            message: message.into(),
            at,
        });
    }

    /// Newest first.
    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&LogEntry> {
        self.entries.front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn newest_entry_comes_first() {
        let mut log = ActivityLog::default();
        log.push(EntryKind::Status, "Http starting", at(1));
        log.push(EntryKind::Error, "Model not found", at(2));

        let messages: Vec<_> = log.entries().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["Model not found", "Http starting"]);
        assert_eq!(log.latest().unwrap().kind, EntryKind::Error);
    }

    #[test]
    fn evicts_oldest_beyond_capacity() {
        let mut log = ActivityLog::with_capacity(3);
        for i in 0..5 {
            log.push(EntryKind::Status, format!("status {i}"), at(i));
        }
        assert_eq!(log.len(), 3);
        let messages: Vec<_> = log.entries().map(|e| e.message.clone()).collect();
        assert_eq!(messages, vec!["status 4", "status 3", "status 2"]);
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let mut log = ActivityLog::with_capacity(0);
        log.push(EntryKind::Status, "a", at(0));
        log.push(EntryKind::Status, "b", at(1));
        assert_eq!(log.capacity(), 1);
        assert_eq!(log.latest().unwrap().message, "b");
    }
}
