//! Single consumer of the recency list's request queue
//!
//! The scheduler is the only owner of the recency list. It applies queued
//! inserts and promotions in order and, on every tick, reclaims expired
//! records from the tail and enforces the index capacity.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::index::HashIndex;
use crate::list::{self, NodeId, RecencyList, Request};
use crate::record::{Handle, Record};
use crate::stats::CacheStats;

/// Outcome of one sweep tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Records reclaimed from the tail because they were expired
    pub expired: usize,
    /// Nodes removed by overflow GC
    pub evicted: usize,
}

/// Background task that owns the recency list
pub struct Scheduler<V> {
    list: RecencyList<V>,
    index: Arc<HashIndex<Handle<V>>>,
    stats: Arc<CacheStats>,
    requests: mpsc::Receiver<Request<V>>,
    sweep_batch: usize,
    sweep_interval: Duration,
}

impl<V> Scheduler<V> {
    pub(crate) fn new(
        index: Arc<HashIndex<Handle<V>>>,
        stats: Arc<CacheStats>,
        requests: mpsc::Receiver<Request<V>>,
        sweep_batch: usize,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            list: RecencyList::new(),
            index,
            stats,
            requests,
            sweep_batch,
            sweep_interval,
        }
    }

    /// Drive the scheduler until the request queue is closed
    ///
    /// Requests queued before the close are still applied, then the list is
    /// reset. The loop never restarts itself; hosts watch the task's exit.
    ///
    /// # Returns
    /// * `usize` - Number of nodes dropped by the final reset
    pub async fn run(mut self) -> usize {
        info!(
            interval_ms = self.sweep_interval.as_millis() as u64,
            capacity = self.index.capacity(),
            "Cache scheduler started"
        );

        let mut ticker = tokio::time::interval(self.sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                request = self.requests.recv() => match request {
                    Some(request) => self.apply(request),
                    None => break,
                },
                _ = ticker.tick() => {
                    self.sweep();
                }
            }
        }

        let dropped = self.list.len();
        self.list.clear();
        info!(dropped, "Request queue closed, cache scheduler stopped");
        dropped
    }

    /// Apply every request currently queued without waiting
    ///
    /// Returns the number of requests applied.
    pub fn process_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(request) = self.requests.try_recv() {
            self.apply(request);
            applied += 1;
        }
        applied
    }

    /// Run one tick: expiration sweep, then overflow GC
    pub fn sweep(&mut self) -> SweepReport {
        let now = Instant::now();
        let mut report = SweepReport::default();

        while report.expired < self.sweep_batch {
            let (node, key) = match self.list.back() {
                Some((node, record)) => {
                    let record = record.lock();
                    if !record.is_reclaimable(now) {
                        break;
                    }
                    (node, record.key.clone())
                }
                None => break,
            };
            self.list.remove(node);
            self.forget(node, &key);
            report.expired += 1;
        }

        let capacity = self.index.capacity();
        if self.list.len() > capacity {
            info!(
                len = self.list.len(),
                capacity, "Cache size overflow, start gc"
            );
            while self.list.len() > capacity {
                let Some((node, record)) = self.list.pop_back() else {
                    break;
                };
                let key = record.lock().key.clone();
                self.forget(node, &key);
                report.evicted += 1;
            }
            info!(evicted = report.evicted, "Cache size overflow, end gc");
        }

        if report != SweepReport::default() {
            debug!(
                expired = report.expired,
                evicted = report.evicted,
                remaining = self.list.len(),
                "Sweep finished"
            );
        }
        self.stats.record_expired(report.expired as u64);
        self.stats.record_evictions(report.evicted as u64);
        report
    }

    /// Number of nodes in the recency list
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// Check if the recency list is empty
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Keys in recency order, most recently used first
    #[cfg(test)]
    pub(crate) fn keys(&self) -> Vec<String> {
        self.list.iter().map(|record| record.lock().key.clone()).collect()
    }

    /// Key of the least recently used node
    #[cfg(test)]
    pub(crate) fn tail_key(&self) -> Option<String> {
        self.list.back().map(|(_, record)| record.lock().key.clone())
    }

    fn apply(&mut self, request: Request<V>) {
        match request {
            Request::Insert(record) => self.insert(record),
            Request::Promote(node) => {
                if self.list.move_to_front(node) {
                    self.stats.record_promotion();
                } else {
                    debug!("Dropping promotion for a reclaimed node");
                }
            }
            Request::Barrier(done) => {
                // The waiter may have given up
                let _ = done.send(());
            }
        }
    }

    fn insert(&mut self, record: Record<V>) {
        // A racing set may already have registered this key
        if let Some(handle) = self.index.get(&record.key).value {
            if self.list.contains(handle.node) {
                handle.record.lock().assign(record);
                self.stats.record_update();
                return;
            }
        }

        let key = record.key.clone();
        let shared = list::share(record);
        let node = self.list.push_front(Arc::clone(&shared));
        if !self.index.set(&key, Handle::new(node, shared)) {
            error!(key = %key, "Hash index has no usable slot, dropping insert");
            self.list.remove(node);
            return;
        }
        self.stats.record_insert();
    }

    /// Clear the key's index slot if it still points at `node`
    fn forget(&self, node: NodeId, key: &str) {
        self.index.delete_if(key, |handle| handle.node == node);
    }
}
