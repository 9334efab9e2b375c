//! Bounded row-scanned hash index
//!
//! The table is a flat array of `slot_count` rows, each `row_width` slots wide:
//!
//! ```text
//!          |<------ row_width ------>|
//!      -   |---|---|---|---|---|---|  bucket 0
//!      |   |---|---|---|---|---|---|  bucket 1
//! slot_count                ...
//!      -   |---|---|---|---|---|---|  bucket slot_count - 1
//! ```
//!
//! A key only ever lives in the row of its bucket. When that row is full the
//! least recently written entry is overwritten, even if the table as a whole
//! still has room.

use std::hash::BuildHasher;

use ahash::RandomState;
use parking_lot::RwLock;

use crate::config::CacheConfig;

/// One occupied slot
#[derive(Debug, Clone)]
struct Slot<V> {
    key: String,
    value: V,
    last_touched: u64,
}

/// Lock-protected table state
#[derive(Debug)]
struct Table<V> {
    slots: Vec<Option<Slot<V>>>,
    len: usize,
    /// Logical write clock, bumped on every write
    clock: u64,
}

/// Outcome of scanning a key's row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Probe {
    /// Key is stored at this slot
    Found(usize),
    /// Key is absent, this is the first free slot
    Vacant(usize),
    /// Key is absent and the row is full, this slot holds the oldest entry
    Evict(usize),
    /// No slot can be determined (empty table)
    Unusable,
}

impl Probe {
    fn pos(self) -> Option<usize> {
        match self {
            Probe::Found(pos) | Probe::Vacant(pos) | Probe::Evict(pos) => Some(pos),
            Probe::Unusable => None,
        }
    }
}

/// Result of [`HashIndex::get`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup<V> {
    /// Stored value, if the key was found
    pub value: Option<V>,
    /// Slot holding the key, or the slot a write would use
    pub pos: Option<usize>,
}

impl<V> Lookup<V> {
    /// Whether the key was found
    pub fn is_found(&self) -> bool {
        self.value.is_some()
    }
}

/// Fixed-capacity hash index guarded by a reader-writer lock
pub struct HashIndex<V, S = RandomState> {
    table: RwLock<Table<V>>,
    row_width: usize,
    slot_count: usize,
    hasher: S,
}

impl<V: Clone> HashIndex<V> {
    /// Create an index with `slot_count` rows of `row_width` slots
    pub fn new(row_width: usize, slot_count: usize) -> Self {
        Self::with_hasher(row_width, slot_count, RandomState::new())
    }

    /// Create an index sized from a cache configuration
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.row_width, config.slot_count())
    }
}

impl<V: Clone, S: BuildHasher> HashIndex<V, S> {
    /// Create an index using a custom bucket hasher
    pub fn with_hasher(row_width: usize, slot_count: usize, hasher: S) -> Self {
        let total = row_width * slot_count;
        let mut slots = Vec::with_capacity(total);
        slots.resize_with(total, || None);

        Self {
            table: RwLock::new(Table {
                slots,
                len: 0,
                clock: 0,
            }),
            row_width,
            slot_count,
            hasher,
        }
    }

    /// Total number of slots
    pub fn capacity(&self) -> usize {
        self.row_width * self.slot_count
    }

    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.table.read().len
    }

    /// Check if no slot is occupied
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a key
    ///
    /// On a miss `pos` still reports where a write would land: the first free
    /// slot of the row, or the row's oldest entry when the row is full.
    pub fn get(&self, key: &str) -> Lookup<V> {
        let table = self.table.read();
        let probe = self.probe(&table.slots, key);
        let value = match probe {
            Probe::Found(pos) => table.slots[pos].as_ref().map(|slot| slot.value.clone()),
            _ => None,
        };
        Lookup {
            value,
            pos: probe.pos(),
        }
    }

    /// Write a key
    ///
    /// Updates in place when the key is present, otherwise takes the first
    /// free slot of the row or overwrites the row's oldest entry. Returns
    /// `false` only when no slot can be determined.
    pub fn set(&self, key: &str, value: V) -> bool {
        let mut table = self.table.write();
        let probe = self.probe(&table.slots, key);
        table.clock += 1;
        let now = table.clock;

        match probe {
            Probe::Found(pos) => {
                if let Some(slot) = table.slots[pos].as_mut() {
                    slot.value = value;
                    slot.last_touched = now;
                }
            }
            Probe::Vacant(pos) => {
                table.slots[pos] = Some(Slot {
                    key: key.to_string(),
                    value,
                    last_touched: now,
                });
                table.len += 1;
            }
            Probe::Evict(pos) => {
                table.slots[pos] = Some(Slot {
                    key: key.to_string(),
                    value,
                    last_touched: now,
                });
            }
            Probe::Unusable => return false,
        }
        true
    }

    /// Remove a key, returning `false` if it was not present
    pub fn delete(&self, key: &str) -> bool {
        self.delete_if(key, |_| true)
    }

    /// Remove a key only if its stored value satisfies `pred`
    pub fn delete_if<F>(&self, key: &str, pred: F) -> bool
    where
        F: FnOnce(&V) -> bool,
    {
        let mut table = self.table.write();
        let Probe::Found(pos) = self.probe(&table.slots, key) else {
            return false;
        };
        let matches = table.slots[pos]
            .as_ref()
            .map(|slot| pred(&slot.value))
            .unwrap_or(false);
        if !matches {
            return false;
        }
        table.slots[pos] = None;
        table.len -= 1;
        true
    }

    fn bucket(&self, key: &str) -> usize {
        (self.hasher.hash_one(key) % self.slot_count as u64) as usize
    }

    /// Single pass over the key's row.
    ///
    /// A free slot always wins over eviction, so the oldest entry is only
    /// tracked until the first free slot is seen.
    fn probe(&self, slots: &[Option<Slot<V>>], key: &str) -> Probe {
        if self.slot_count == 0 || self.row_width == 0 {
            return Probe::Unusable;
        }

        let start = self.bucket(key) * self.row_width;
        let mut free: Option<usize> = None;
        let mut oldest: Option<(usize, u64)> = None;

        for pos in start..start + self.row_width {
            match &slots[pos] {
                None => {
                    if free.is_none() {
                        free = Some(pos);
                    }
                }
                Some(slot) if slot.key == key => return Probe::Found(pos),
                Some(slot) => {
                    if free.is_some() {
                        continue;
                    }
                    match oldest {
                        Some((_, touched)) if touched <= slot.last_touched => {}
                        _ => oldest = Some((pos, slot.last_touched)),
                    }
                }
            }
        }

        match (free, oldest) {
            (Some(pos), _) => Probe::Vacant(pos),
            (None, Some((pos, _))) => Probe::Evict(pos),
            (None, None) => Probe::Unusable,
        }
    }
}
