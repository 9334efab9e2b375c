//! User records and the handles that tie index slots to list nodes

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::list::NodeId;

/// A cached key/value pair with its bookkeeping
#[derive(Debug, Clone, PartialEq)]
pub struct Record<V> {
    /// Cache key
    pub key: String,
    /// User value
    pub value: V,
    /// Logically deleted, awaiting reclamation by the sweep
    pub expired: bool,
    /// Deadline after which the sweep may reclaim the record
    pub expire_at: Option<Instant>,
    /// Number of `get` hits since insertion
    pub frequency: u32,
}

impl<V> Record<V> {
    /// Create a live record without a deadline
    pub fn new(key: impl Into<String>, value: V) -> Self {
        Self {
            key: key.into(),
            value,
            expired: false,
            expire_at: None,
            frequency: 0,
        }
    }

    /// Give the record a time-to-live measured from now
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.expire_at = Some(Instant::now() + ttl);
        self
    }

    /// Overwrite value and lifetime from `other`, keeping the hit count
    pub(crate) fn assign(&mut self, other: Record<V>) {
        self.value = other.value;
        self.expired = other.expired;
        self.expire_at = other.expire_at;
    }

    /// Whether the sweep may reclaim this record at `now`
    pub fn is_reclaimable(&self, now: Instant) -> bool {
        self.expired || self.expire_at.is_some_and(|deadline| deadline <= now)
    }
}

/// Record storage shared between the index and the scheduler's list
pub(crate) type SharedRecord<V> = Arc<Mutex<Record<V>>>;

/// Value stored in the hash index for each key
///
/// `node` locates the record's list node for promotions and is
/// generation-checked by the list, so a stale handle can never reach a
/// recycled node.
#[derive(Debug)]
pub(crate) struct Handle<V> {
    pub(crate) node: NodeId,
    pub(crate) record: SharedRecord<V>,
}

impl<V> Handle<V> {
    pub(crate) fn new(node: NodeId, record: SharedRecord<V>) -> Self {
        Self { node, record }
    }
}

impl<V> Clone for Handle<V> {
    fn clone(&self) -> Self {
        Self {
            node: self.node,
            record: Arc::clone(&self.record),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_is_live() {
        let record = Record::new("k", 1);
        assert!(!record.expired);
        assert_eq!(record.frequency, 0);
        assert!(!record.is_reclaimable(Instant::now()));
    }

    #[test]
    fn test_expired_flag_is_reclaimable() {
        let mut record = Record::new("k", 1);
        record.expired = true;
        assert!(record.is_reclaimable(Instant::now()));
    }

    #[test]
    fn test_assign_keeps_frequency() {
        let mut record = Record::new("k", 1);
        record.frequency = 7;
        record.expired = true;

        record.assign(Record::new("k", 2));
        assert_eq!(record.value, 2);
        assert_eq!(record.frequency, 7);
        assert!(!record.expired);
    }

    #[test]
    fn test_ttl_deadline() {
        let record = Record::new("k", 1).with_ttl(Duration::from_secs(60));
        let now = Instant::now();
        assert!(!record.is_reclaimable(now));
        assert!(record.is_reclaimable(now + Duration::from_secs(61)));
    }
}
