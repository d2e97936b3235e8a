//! Record pool: slab arena with free-list recycling.
//!
//! Every timer record is acquired from the pool on creation and released back
//! on retirement, along all exit paths. The arena keeps slot storage alive
//! across release/acquire cycles and hands out a fully reset record on every
//! acquire, so schedule state can never leak from one timer into the next.

use std::ops::{Index, IndexMut};

use slotmap::SlotMap;

use crate::record::{RecordKey, TimerRecord};

/// Arena of timer records with O(1) acquire, release, and lookup.
pub(crate) struct RecordPool {
    slots: SlotMap<RecordKey, TimerRecord>,
}

impl RecordPool {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: SlotMap::with_capacity_and_key(capacity),
        }
    }

    /// Take a freshly reset record out of the pool.
    pub fn acquire(&mut self) -> RecordKey {
        self.slots.insert(TimerRecord::default())
    }

    /// Return a record to the pool; its slot is retained for reuse.
    pub fn release(&mut self, key: RecordKey) {
        self.slots.remove(key);
    }

    pub fn get(&self, key: RecordKey) -> Option<&TimerRecord> {
        self.slots.get(key)
    }

    pub fn get_mut(&mut self, key: RecordKey) -> Option<&mut TimerRecord> {
        self.slots.get_mut(key)
    }

    /// Number of records currently out of the pool.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TimerRecord> {
        self.slots.values()
    }
}

impl Index<RecordKey> for RecordPool {
    type Output = TimerRecord;

    fn index(&self, key: RecordKey) -> &TimerRecord {
        &self.slots[key]
    }
}

impl IndexMut<RecordKey> for RecordPool {
    fn index_mut(&mut self, key: RecordKey) -> &mut TimerRecord {
        &mut self.slots[key]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::TimerId;

    #[test]
    fn acquire_hands_out_reset_records() {
        let mut pool = RecordPool::with_capacity(4);
        let key = pool.acquire();
        {
            let rec = &mut pool[key];
            rec.id = TimerId(7);
            rec.interval = 5;
            rec.expires = 100;
            rec.loops = 3;
            rec.bucket = Some(12);
        }
        pool.release(key);

        let fresh = pool.acquire();
        let rec = &pool[fresh];
        assert_eq!(rec.interval, 0);
        assert_eq!(rec.expires, 0);
        assert_eq!(rec.loops, -1);
        assert!(rec.bucket.is_none());
        assert!(rec.callback.is_none());
        assert!(!rec.cancelled);
    }

    #[test]
    fn stale_keys_do_not_resolve_after_release() {
        let mut pool = RecordPool::with_capacity(4);
        let key = pool.acquire();
        pool.release(key);
        // The slot is recycled but the generation moved on.
        let reused = pool.acquire();
        assert!(pool.get(key).is_none());
        assert!(pool.get(reused).is_some());
        assert_eq!(pool.len(), 1);
    }
}
