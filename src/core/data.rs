use crate::types::DataRecord;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Source of test data. One record is requested per iteration.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// `None` means the source is exhausted.
    async fn feed(&self, iteration: u32) -> Option<DataRecord>;
}

/// In-memory records handed out in order.
pub struct RecordFeed {
    records: Vec<DataRecord>,
    circular: bool,
    cursor: AtomicUsize,
}

impl RecordFeed {
    pub fn new(records: Vec<DataRecord>) -> Self {
        Self {
            records,
            circular: false,
            cursor: AtomicUsize::new(0),
        }
    }

    /// A feed that always yields one empty object.
    pub fn empty_record() -> Self {
        Self::new(vec![DataRecord::Object(Default::default())]).circular(true)
    }

    /// Wrap around when the records run out instead of reporting exhaustion.
    pub fn circular(mut self, circular: bool) -> Self {
        self.circular = circular;
        self
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl DataSource for RecordFeed {
    async fn feed(&self, _iteration: u32) -> Option<DataRecord> {
        if self.records.is_empty() {
            return None;
        }
        let index = self.cursor.fetch_add(1, Ordering::SeqCst);
        if self.circular {
            Some(self.records[index % self.records.len()].clone())
        } else {
            self.records.get(index).cloned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn linear_feed_runs_out() {
        let feed = RecordFeed::new(vec![json!({"user": "a"}), json!({"user": "b"})]);
        assert_eq!(feed.feed(1).await, Some(json!({"user": "a"})));
        assert_eq!(feed.feed(2).await, Some(json!({"user": "b"})));
        assert_eq!(feed.feed(3).await, None);
    }

    #[tokio::test]
    async fn circular_feed_wraps() {
        let feed = RecordFeed::new(vec![json!(1), json!(2)]).circular(true);
        let mut seen = Vec::new();
        for i in 1..=5 {
            seen.push(feed.feed(i).await.unwrap());
        }
        assert_eq!(seen, vec![json!(1), json!(2), json!(1), json!(2), json!(1)]);
    }

    #[tokio::test]
    async fn empty_feed_is_exhausted() {
        let feed = RecordFeed::new(Vec::new()).circular(true);
        assert!(feed.is_empty());
        assert_eq!(feed.feed(1).await, None);

        let feed = RecordFeed::empty_record();
        assert_eq!(feed.feed(9).await, Some(json!({})));
    }
}
