//! Construction-time cache configuration

use std::time::Duration;

use crate::error::{Error, Result};

/// Target item count used when the configured capacity is zero
pub const DEFAULT_CAPACITY: usize = 65536;

/// Width of one hash index row
pub const DEFAULT_ROW_WIDTH: usize = 127;

/// Every n-th `get` of a record requests a promotion
pub const DEFAULT_PROMOTE_EVERY: u32 = 32;

/// Bounded request queue size
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Maximum expired records reclaimed per sweep tick
pub const DEFAULT_SWEEP_BATCH: usize = 128;

/// Interval between sweep ticks
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Over-provisioning applied to the target item count when sizing rows
const FIX_FACTOR: f64 = 1.2;

/// Cache configuration
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Target number of items (0 selects [`DEFAULT_CAPACITY`])
    pub capacity: usize,
    /// Slots per row
    pub row_width: usize,
    /// Promotion sampling interval
    pub promote_every: u32,
    /// Request queue capacity
    pub queue_capacity: usize,
    /// Expiration sweep batch size
    pub sweep_batch: usize,
    /// Sweep tick interval
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            row_width: DEFAULT_ROW_WIDTH,
            promote_every: DEFAULT_PROMOTE_EVERY,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            sweep_batch: DEFAULT_SWEEP_BATCH,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl CacheConfig {
    /// Create a config for the given target item count with default tuning
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    /// Set the row width
    pub fn with_row_width(mut self, row_width: usize) -> Self {
        self.row_width = row_width;
        self
    }

    /// Set the promotion sampling interval
    pub fn with_promote_every(mut self, promote_every: u32) -> Self {
        self.promote_every = promote_every;
        self
    }

    /// Set the request queue capacity
    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    /// Set the expiration sweep batch size
    pub fn with_sweep_batch(mut self, sweep_batch: usize) -> Self {
        self.sweep_batch = sweep_batch;
        self
    }

    /// Set the sweep tick interval
    pub fn with_sweep_interval(mut self, sweep_interval: Duration) -> Self {
        self.sweep_interval = sweep_interval;
        self
    }

    /// Number of rows (buckets) derived from the target item count
    ///
    /// `floor(capacity * 1.2) / row_width + 1`, or 0 for a zero row width.
    pub fn slot_count(&self) -> usize {
        let capacity = if self.capacity == 0 {
            DEFAULT_CAPACITY
        } else {
            self.capacity
        };
        if self.row_width == 0 {
            return 0;
        }
        (capacity as f64 * FIX_FACTOR) as usize / self.row_width + 1
    }

    /// Reject configurations the scheduler cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.row_width == 0 {
            return Err(Error::InvalidConfig("row_width must be non-zero".to_string()));
        }
        if self.promote_every == 0 {
            return Err(Error::InvalidConfig(
                "promote_every must be non-zero".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(Error::InvalidConfig(
                "queue_capacity must be non-zero".to_string(),
            ));
        }
        if self.sweep_interval.is_zero() {
            return Err(Error::InvalidConfig(
                "sweep_interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
