//! Wheel geometry, bucket index derivation, and the bucket array.
//!
//! The wheel is nine concentric levels of 64 buckets each. Level 0 holds the
//! next 64 jiffies at single-jiffy granularity; every further level is 8x
//! coarser and covers the range its finer neighbours cannot:
//!
//! - Level 0: granularity 1 jiffy, deltas `[0, 64)`
//! - Level 1: granularity 8 jiffies, deltas `[64, 512)`
//! - Level 2: granularity 64 jiffies, deltas `[512, 4096)`
//! - ...
//! - Level 8: granularity 2^24 jiffies, deltas `[2^27, 2^30)`
//!
//! All index math is shifts and masks, which is what makes insert and expiry
//! O(1) amortised across the whole dynamic range (Varghese & Lauck, 1996).
//! Buckets are doubly-linked lists threaded through the record arena by key,
//! so appending and unlinking a known node are both O(1) without any unsafe
//! pointer juggling.

use tracing::trace;

use crate::pool::RecordPool;
use crate::record::RecordKey;

/// Number of wheel levels
pub const DEPTH: usize = 9;

/// Bits of bucket index per level
pub const LEVEL_BITS: u32 = 6;

/// Buckets per level
pub const SLOTS: usize = 1 << LEVEL_BITS;

/// Mask extracting an in-level bucket index
pub const SLOT_MASK: u64 = SLOTS as u64 - 1;

/// Coarsening shift between adjacent levels (each level is 8x coarser)
pub const SHIFT: u32 = 3;

/// Total bucket count across all levels
pub const WHEEL_SIZE: usize = DEPTH * SLOTS;

/// Largest representable delta, in jiffies
pub const CUTOFF: u64 = ((SLOTS as u64) << ((DEPTH as u32 - 1) * SHIFT)) - 1;

/// Bucket granularity of the coarsest level, in jiffies
pub const LAST_GRANULARITY: u64 = 1 << ((DEPTH as u32 - 1) * SHIFT);

/// Deltas at or beyond [`CUTOFF`] are clamped to this value
pub const MAX_DELTA: u64 = CUTOFF - LAST_GRANULARITY;

/// Bucket granularity of a level, in jiffies.
pub(crate) const fn granularity(level: usize) -> u64 {
    1 << (level as u32 * SHIFT)
}

/// First delta covered by a level. Level 0 starts at zero; level `L >= 1`
/// picks up where level `L - 1`'s range ends.
pub(crate) const fn level_start(level: usize) -> u64 {
    if level == 0 {
        0
    } else {
        (SLOTS as u64) << ((level as u32 - 1) * SHIFT)
    }
}

/// One-past-the-last delta covered by a level.
pub(crate) const fn level_span(level: usize) -> u64 {
    (SLOTS as u64) << (level as u32 * SHIFT)
}

/// Derive the wheel bucket for a timer, given the live jiffy counter.
///
/// Returns the flat bucket index and the effective expiry: an over-range
/// delta is clamped to [`MAX_DELTA`] and the caller stores the clamped value.
/// An already-due expiry indexes the current bottom-level slot.
///
/// The right-shift discards the low bits a finer level accounts for; the
/// `level_start` subtraction removes the range the finer levels already
/// cover, so the remaining bits index cleanly into the level's 64 buckets.
pub(crate) fn calculate_position(expires: u64, jiffies: u64) -> (usize, u64) {
    if expires <= jiffies {
        return ((jiffies & SLOT_MASK) as usize, expires);
    }

    let mut expires = expires;
    let mut delta = expires - jiffies;
    if delta >= CUTOFF {
        expires = jiffies.saturating_add(MAX_DELTA);
        delta = MAX_DELTA;
    }

    let mut level = DEPTH - 1;
    for l in 0..DEPTH {
        if delta < level_span(l) {
            level = l;
            break;
        }
    }

    let index = ((expires - level_start(level)) >> (level as u32 * SHIFT)) & SLOT_MASK;
    (level * SLOTS + index as usize, expires)
}

/// The level-`L` bucket whose expiry window `[jiffies, jiffies + 8^L)` comes
/// due now. Only meaningful when `jiffies` sits on the level's granularity
/// boundary; this is the bucket the cascade drains.
///
/// The wrapping subtraction is exact modular arithmetic: `level_start` and
/// `jiffies` are both multiples of the level granularity here, so the masked
/// result matches the insertion-time index of every timer in the window.
pub(crate) fn cascade_bucket(level: usize, jiffies: u64) -> usize {
    debug_assert!(level >= 1 && level < DEPTH);
    debug_assert_eq!(jiffies & (granularity(level) - 1), 0);
    let index = (jiffies.wrapping_sub(level_start(level)) >> (level as u32 * SHIFT)) & SLOT_MASK;
    level * SLOTS + index as usize
}

/// One wheel bucket: head and tail of an intrusive record list.
#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    head: Option<RecordKey>,
    tail: Option<RecordKey>,
}

/// The flat bucket array. Sized once at construction; never reallocated.
pub(crate) struct Wheel {
    buckets: Vec<Bucket>,
}

impl Wheel {
    pub fn new() -> Self {
        Self {
            buckets: vec![Bucket::default(); WHEEL_SIZE],
        }
    }

    /// Append a record to a bucket's tail, preserving FIFO dispatch order.
    pub fn link(&mut self, pool: &mut RecordPool, key: RecordKey, bucket: usize) {
        let tail = self.buckets[bucket].tail;
        if let Some(rec) = pool.get_mut(key) {
            rec.bucket = Some(bucket as u16);
            rec.prev = tail;
            rec.next = None;
        }
        match tail {
            Some(prev_key) => {
                if let Some(prev) = pool.get_mut(prev_key) {
                    prev.next = Some(key);
                }
            }
            None => self.buckets[bucket].head = Some(key),
        }
        self.buckets[bucket].tail = Some(key);
    }

    /// Unlink a record from its bucket in O(1) via the stored back-pointer.
    pub fn unlink(&mut self, pool: &mut RecordPool, key: RecordKey) {
        let Some(rec) = pool.get(key) else { return };
        let Some(bucket) = rec.bucket else { return };
        let bucket = bucket as usize;
        let (prev, next) = (rec.prev, rec.next);

        match prev {
            Some(prev_key) => {
                if let Some(prev_rec) = pool.get_mut(prev_key) {
                    prev_rec.next = next;
                }
            }
            None => self.buckets[bucket].head = next,
        }
        match next {
            Some(next_key) => {
                if let Some(next_rec) = pool.get_mut(next_key) {
                    next_rec.prev = prev;
                }
            }
            None => self.buckets[bucket].tail = prev,
        }

        if let Some(rec) = pool.get_mut(key) {
            rec.bucket = None;
            rec.prev = None;
            rec.next = None;
        }
        trace!(bucket, "unlinked timer record");
    }

    /// Detach an entire bucket into `out`, clearing each record's links.
    ///
    /// Detaching before dispatch means re-entrant insertions during callback
    /// execution land in live buckets and can never extend the pass that is
    /// currently draining this one.
    pub fn detach(&mut self, pool: &mut RecordPool, bucket: usize, out: &mut Vec<RecordKey>) {
        let mut cursor = self.buckets[bucket].head;
        self.buckets[bucket].head = None;
        self.buckets[bucket].tail = None;
        while let Some(key) = cursor {
            match pool.get_mut(key) {
                Some(rec) => {
                    cursor = rec.next;
                    rec.bucket = None;
                    rec.prev = None;
                    rec.next = None;
                    out.push(key);
                }
                None => break,
            }
        }
    }

    #[cfg(test)]
    fn collect(&self, pool: &RecordPool, bucket: usize) -> Vec<RecordKey> {
        let mut keys = Vec::new();
        let mut cursor = self.buckets[bucket].head;
        while let Some(key) = cursor {
            keys.push(key);
            cursor = pool.get(key).and_then(|rec| rec.next);
        }
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_constants() {
        assert_eq!(WHEEL_SIZE, 576);
        assert_eq!(CUTOFF, (1 << 30) - 1);
        assert_eq!(LAST_GRANULARITY, 1 << 24);
        assert_eq!(MAX_DELTA, CUTOFF - LAST_GRANULARITY);
        assert_eq!(level_start(1), 64);
        assert_eq!(level_start(2), 512);
        assert_eq!(level_span(0), 64);
        assert_eq!(level_span(8), 1 << 30);
    }

    #[test]
    fn due_timers_index_the_current_slot() {
        assert_eq!(calculate_position(5, 5), (5, 5));
        assert_eq!(calculate_position(3, 70), (70 & 63, 3));
    }

    #[test]
    fn level_selection_follows_delta_ranges() {
        let jiffies = 0;
        for (delta, level) in [
            (1u64, 0usize),
            (63, 0),
            (64, 1),
            (511, 1),
            (512, 2),
            (4095, 2),
            (4096, 3),
            (level_start(8), 8),
            (CUTOFF - 1, 8),
        ] {
            let (bucket, _) = calculate_position(jiffies + delta, jiffies);
            assert_eq!(bucket / SLOTS, level, "delta = {delta}");
        }
    }

    #[test]
    fn position_is_stable_under_jiffy_offset() {
        // The same delta measured from a nonzero origin picks the same level.
        for origin in [0u64, 1, 63, 64, 1000, 123_456] {
            let (bucket, _) = calculate_position(origin + 300, origin);
            assert_eq!(bucket / SLOTS, 1, "origin = {origin}");
        }
    }

    #[test]
    fn over_range_deltas_clamp_to_max_delta() {
        let jiffies = 10;
        let (bucket, expires) = calculate_position(jiffies + CUTOFF, jiffies);
        assert_eq!(expires, jiffies + MAX_DELTA);
        assert_eq!(bucket / SLOTS, DEPTH - 1);

        let (_, expires) = calculate_position(u64::MAX, jiffies);
        assert_eq!(expires, jiffies + MAX_DELTA);
    }

    #[test]
    fn cascade_bucket_matches_insertion_index() {
        // Every timer inserted at level L must sit in the bucket the cascade
        // drains when its expiry window comes due.
        for level in 1..DEPTH {
            let gran = granularity(level);
            for window in [8u64, 9, 13, 63, 64, 100] {
                // A timer expiring inside window `w` of level L, inserted at
                // a jiffy where it targets level L.
                let expires = window * gran + gran / 2;
                let insert_at = expires.saturating_sub(level_start(level) + 1);
                let (bucket, _) = calculate_position(expires, insert_at);
                if bucket / SLOTS != level {
                    continue; // window too close for this level; covered by a finer one
                }
                let drain_jiffy = (expires / gran) * gran;
                assert_eq!(
                    bucket,
                    cascade_bucket(level, drain_jiffy),
                    "level {level} window {window}"
                );
            }
        }
    }

    #[test]
    fn link_unlink_detach_keep_fifo_order() {
        let mut pool = RecordPool::with_capacity(8);
        let mut wheel = Wheel::new();
        let a = pool.acquire();
        let b = pool.acquire();
        let c = pool.acquire();
        wheel.link(&mut pool, a, 10);
        wheel.link(&mut pool, b, 10);
        wheel.link(&mut pool, c, 10);
        assert_eq!(wheel.collect(&pool, 10), vec![a, b, c]);

        wheel.unlink(&mut pool, b);
        assert_eq!(wheel.collect(&pool, 10), vec![a, c]);
        assert!(pool[b].bucket.is_none());

        let mut out = Vec::new();
        wheel.detach(&mut pool, 10, &mut out);
        assert_eq!(out, vec![a, c]);
        assert!(wheel.collect(&pool, 10).is_empty());
        assert!(pool[a].bucket.is_none());
        assert!(pool[c].bucket.is_none());
    }

    #[test]
    fn unlink_head_and_tail_fix_bucket_ends() {
        let mut pool = RecordPool::with_capacity(8);
        let mut wheel = Wheel::new();
        let a = pool.acquire();
        let b = pool.acquire();
        wheel.link(&mut pool, a, 3);
        wheel.link(&mut pool, b, 3);

        wheel.unlink(&mut pool, a);
        assert_eq!(wheel.collect(&pool, 3), vec![b]);
        wheel.unlink(&mut pool, b);
        assert!(wheel.collect(&pool, 3).is_empty());

        // Re-linking into the emptied bucket must work from scratch.
        wheel.link(&mut pool, a, 3);
        assert_eq!(wheel.collect(&pool, 3), vec![a]);
    }
}
