//! Cache front end: Get/Set/Del over the hash index

use std::sync::Arc;

use tracing::debug;

use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::index::HashIndex;
use crate::list::{self, RequestQueue};
use crate::record::{Handle, Record};
use crate::scheduler::Scheduler;
use crate::stats::CacheStats;

/// Fixed-capacity LRU cache with approximate recency and lazy expiration
///
/// Lookups and in-place updates go straight to the lock-protected index.
/// New keys and promotions are queued for the [`Scheduler`], so a `set` of a
/// new key only becomes visible once the scheduler has processed it.
///
/// Every call that may enqueue (`get`, `set`, `flush`) blocks while the queue
/// is full and must not run on an async runtime thread.
pub struct Cache<V> {
    /// Key -> list handle
    index: Arc<HashIndex<Handle<V>>>,

    /// Producer side of the scheduler's queue
    queue: Arc<RequestQueue<V>>,

    /// Cache statistics
    stats: Arc<CacheStats>,

    /// Every n-th hit on a record requests a promotion
    promote_every: u32,
}

impl<V: Clone> Cache<V> {
    /// Create a cache sized for `capacity` items with default tuning
    ///
    /// # Returns
    /// * `(Cache, Scheduler)` - The scheduler must be driven by the host,
    ///   usually via `tokio::spawn(scheduler.run())`
    pub fn new(capacity: usize) -> (Self, Scheduler<V>) {
        let config = CacheConfig::new(capacity);
        Self::build(&config)
    }

    /// Create a cache from an explicit configuration
    ///
    /// # Returns
    /// * `Result<(Cache, Scheduler)>` - `InvalidConfig` if validation fails
    pub fn with_config(config: CacheConfig) -> Result<(Self, Scheduler<V>)> {
        config.validate()?;
        Ok(Self::build(&config))
    }

    fn build(config: &CacheConfig) -> (Self, Scheduler<V>) {
        let index = Arc::new(HashIndex::from_config(config));
        let stats = Arc::new(CacheStats::new());
        let (queue, requests) = list::request_channel(config.queue_capacity);

        let scheduler = Scheduler::new(
            Arc::clone(&index),
            Arc::clone(&stats),
            requests,
            config.sweep_batch,
            config.sweep_interval,
        );
        let cache = Self {
            index,
            queue,
            stats,
            promote_every: config.promote_every,
        };
        (cache, scheduler)
    }

    /// Look up a key
    ///
    /// Counts the hit on the record and, every `promote_every` hits, asks the
    /// scheduler to move it to the front. Logically deleted records are still
    /// returned (with `expired` set) until the sweep reclaims them.
    pub fn get(&self, key: &str) -> Option<Record<V>> {
        let Some(handle) = self.index.get(key).value else {
            self.stats.record_miss();
            return None;
        };

        let (record, promote) = {
            let mut record = handle.record.lock();
            record.frequency = record.frequency.wrapping_add(1);
            let promote = record.frequency % self.promote_every == 0;
            (record.clone(), promote)
        };

        if promote {
            if let Err(e) = self.queue.request_promote(handle.node) {
                debug!(key, error = %e, "Promotion dropped");
            }
        }

        self.stats.record_hit();
        Some(record)
    }

    /// Insert or update a record
    ///
    /// An existing key is updated in place and keeps its list position. A new
    /// key is queued for insertion and is invisible to `get` until the
    /// scheduler applies it.
    ///
    /// # Returns
    /// * `Result<()>` - `QueueClosed` after [`close`](Self::close)
    pub fn set(&self, record: Record<V>) -> Result<()> {
        if let Some(handle) = self.index.get(&record.key).value {
            handle.record.lock().assign(record);
            self.stats.record_update();
            return Ok(());
        }
        self.queue.request_insert(record)
    }

    /// Look up a record without counting a hit or requesting a promotion
    pub fn peek(&self, key: &str) -> Option<Record<V>> {
        let handle = self.index.get(key).value?;
        let record = handle.record.lock().clone();
        Some(record)
    }

    /// Mark a key as deleted
    ///
    /// The record stays indexed until a sweep finds it at the list tail.
    /// Deleting an absent key is a no-op.
    pub fn del(&self, key: &str) {
        if let Some(handle) = self.index.get(key).value {
            handle.record.lock().expired = true;
        }
    }

    /// Block until the scheduler has applied every request queued so far
    pub fn flush(&self) -> Result<()> {
        let done = self.queue.request_barrier()?;
        done.blocking_recv().map_err(|_| Error::QueueClosed)
    }

    /// Stop accepting inserts and promotions
    ///
    /// The scheduler applies what is already queued, resets its list and
    /// exits. Lookups keep working against the index.
    pub fn close(&self) {
        self.queue.close();
    }

    /// Whether [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }

    /// Number of indexed keys
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Check if no key is indexed
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Total index slots
    pub fn capacity(&self) -> usize {
        self.index.capacity()
    }

    /// Get cache statistics
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    /// One bucket of three slots: every key lands in the same row
    fn single_row() -> (Cache<String>, Scheduler<String>) {
        let config = CacheConfig::new(2).with_row_width(3);
        Cache::with_config(config).unwrap()
    }

    fn put(cache: &Cache<String>, key: &str, value: &str) {
        cache.set(Record::new(key, value.to_string())).unwrap();
    }

    #[test]
    fn test_set_is_invisible_until_processed() {
        let (cache, mut scheduler) = Cache::new(100);

        put(&cache, "x", "1");
        assert!(cache.get("x").is_none());

        scheduler.process_pending();
        let record = cache.get("x").unwrap();
        assert_eq!(record.key, "x");
        assert_eq!(record.value, "1");
    }

    #[test]
    fn test_update_in_place() {
        let (cache, mut scheduler) = Cache::new(100);

        put(&cache, "k", "v1");
        scheduler.process_pending();
        assert_eq!(cache.len(), 1);

        put(&cache, "k", "v2");
        // No scheduler round trip needed for an existing key
        assert_eq!(cache.get("k").unwrap().value, "v2");
        assert_eq!(cache.len(), 1);
        assert_eq!(scheduler.process_pending(), 0);
        assert_eq!(cache.stats().updates(), 1);
    }

    #[test]
    fn test_set_does_not_promote() {
        let (cache, mut scheduler) = Cache::new(100);

        put(&cache, "a", "1");
        put(&cache, "b", "2");
        scheduler.process_pending();

        put(&cache, "a", "3");
        scheduler.process_pending();
        assert_eq!(scheduler.keys(), vec!["b", "a"]);
    }

    #[test]
    fn test_get_missing() {
        let (cache, _scheduler) = Cache::<String>::new(100);

        assert!(cache.get("nope").is_none());
        assert_eq!(cache.stats().misses(), 1);
    }

    #[test]
    fn test_frequency_counts_hits() {
        let (cache, mut scheduler) = Cache::new(100);

        put(&cache, "k", "v");
        scheduler.process_pending();

        cache.get("k");
        cache.get("k");
        assert_eq!(cache.get("k").unwrap().frequency, 3);
        assert_eq!(cache.stats().hits(), 3);
    }

    #[test]
    fn test_peek_does_not_count() {
        let config = CacheConfig::new(100).with_promote_every(1);
        let (cache, mut scheduler) = Cache::with_config(config).unwrap();

        put(&cache, "k", "v");
        scheduler.process_pending();

        assert_eq!(cache.peek("k").unwrap().value, "v");
        assert!(cache.peek("missing").is_none());
        assert_eq!(cache.peek("k").unwrap().frequency, 0);
        assert_eq!(cache.stats().hits(), 0);
        assert_eq!(cache.stats().misses(), 0);

        // No promotion was queued
        scheduler.process_pending();
        assert_eq!(cache.stats().promotions(), 0);
    }

    #[test]
    fn test_row_overflow_evicts_oldest() {
        let (cache, mut scheduler) = single_row();
        assert_eq!(cache.capacity(), 3);

        for key in ["A", "B", "C"] {
            put(&cache, key, key);
        }
        scheduler.process_pending();
        for key in ["A", "B", "C"] {
            assert!(cache.get(key).is_some());
        }

        put(&cache, "D", "D");
        scheduler.process_pending();

        assert!(cache.get("A").is_none());
        for key in ["B", "C", "D"] {
            assert!(cache.get(key).is_some(), "{} should survive", key);
        }
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_del_is_lazy() {
        let (cache, mut scheduler) = Cache::new(100);

        put(&cache, "k", "v");
        scheduler.process_pending();
        cache.del("k");

        let record = cache.get("k").unwrap();
        assert!(record.expired);
        assert_eq!(cache.len(), 1);

        let report = scheduler.sweep();
        assert_eq!(report.expired, 1);
        assert!(cache.get("k").is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_del_missing_is_noop() {
        let (cache, _scheduler) = Cache::<String>::new(100);
        cache.del("missing");
        assert!(cache.is_empty());
    }

    #[test]
    fn test_set_after_del_revives() {
        let (cache, mut scheduler) = Cache::new(100);

        put(&cache, "k", "v1");
        scheduler.process_pending();
        cache.del("k");
        put(&cache, "k", "v2");

        assert_eq!(scheduler.sweep().expired, 0);
        let record = cache.get("k").unwrap();
        assert!(!record.expired);
        assert_eq!(record.value, "v2");
    }

    #[test]
    fn test_sampled_promotion() {
        let (cache, mut scheduler) = Cache::new(100);

        for key in ["a", "b", "c"] {
            put(&cache, key, key);
        }
        scheduler.process_pending();
        assert_eq!(scheduler.tail_key().as_deref(), Some("a"));

        for _ in 0..31 {
            cache.get("a");
        }
        scheduler.process_pending();
        assert_eq!(scheduler.tail_key().as_deref(), Some("a"));

        cache.get("a");
        scheduler.process_pending();
        assert_eq!(scheduler.keys(), vec!["a", "c", "b"]);
        assert_eq!(cache.stats().promotions(), 1);
    }

    #[test]
    fn test_promote_every_is_configurable() {
        let config = CacheConfig::new(100).with_promote_every(1);
        let (cache, mut scheduler) = Cache::with_config(config).unwrap();

        put(&cache, "a", "1");
        put(&cache, "b", "2");
        scheduler.process_pending();

        cache.get("a");
        scheduler.process_pending();
        assert_eq!(scheduler.keys(), vec!["a", "b"]);
    }

    #[test]
    fn test_close_rejects_inserts() {
        let (cache, _scheduler) = Cache::new(100);

        cache.close();
        assert!(cache.is_closed());
        assert_eq!(
            cache.set(Record::new("k", "v".to_string())),
            Err(Error::QueueClosed)
        );
        assert_eq!(cache.flush(), Err(Error::QueueClosed));
    }

    #[test]
    fn test_invalid_config() {
        let config = CacheConfig::new(100).with_queue_capacity(0);
        assert!(matches!(
            Cache::<String>::with_config(config),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_full_queue_blocks_producer() {
        let config = CacheConfig::new(100).with_queue_capacity(1);
        let (cache, mut scheduler) = Cache::with_config(config).unwrap();
        let cache = Arc::new(cache);

        put(&cache, "a", "1");
        let producer = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || put(&cache, "b", "2"))
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!producer.is_finished());

        scheduler.process_pending();
        producer.join().unwrap();
        scheduler.process_pending();

        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_some());
    }
}
