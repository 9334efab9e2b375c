//! # rowcache
//!
//! Fixed-capacity in-process LRU cache with approximate recency tracking and
//! lazy expiration.
//!
//! ## Architecture
//! - **HashIndex**: flat array of fixed-width rows behind a `RwLock`; a key is
//!   only ever stored in its bucket's row, and a full row overwrites its least
//!   recently written entry
//! - **Recency list**: arena-backed doubly-linked list owned by the
//!   [`Scheduler`]; producers only enqueue insert/promote requests on a
//!   bounded channel
//! - **Cache**: Get/Set/Del against the index; every `promote_every`-th hit
//!   requests a promotion
//! - **Scheduler**: applies queued requests and, on each tick, reclaims
//!   expired records from the tail and trims the list back to capacity
//!
//! ## Usage
//! ```no_run
//! use rowcache::{Cache, Record};
//!
//! let (cache, scheduler) = Cache::<String>::new(10_000);
//! let runtime = tokio::runtime::Runtime::new().unwrap();
//! runtime.spawn(scheduler.run());
//!
//! cache.set(Record::new("user:1", "alice".to_string())).unwrap();
//! cache.flush().unwrap();
//! assert_eq!(cache.get("user:1").unwrap().value, "alice");
//! ```

#![warn(missing_docs)]

mod cache;
mod config;
mod error;
mod index;
mod list;
mod record;
mod scheduler;
mod stats;

pub use cache::Cache;
pub use config::{
    CacheConfig, DEFAULT_CAPACITY, DEFAULT_PROMOTE_EVERY, DEFAULT_QUEUE_CAPACITY,
    DEFAULT_ROW_WIDTH, DEFAULT_SWEEP_BATCH, DEFAULT_SWEEP_INTERVAL,
};
pub use error::{Error, Result};
pub use index::{HashIndex, Lookup};
pub use record::Record;
pub use scheduler::{Scheduler, SweepReport};
pub use stats::CacheStats;
