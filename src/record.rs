//! Timer records and the callback contract.
//!
//! A [`TimerRecord`] is the per-timer state linked into the wheel: schedule
//! fields, the callback, and the intrusive list links that make bucket
//! insertion and removal O(1). Records live in the
//! [`RecordPool`](crate::pool::RecordPool) arena and are addressed by
//! generational [`RecordKey`]s, so a stale key can never reach a recycled
//! record.

use std::fmt;
use std::sync::Arc;

use slotmap::new_key_type;

use crate::error::Result;
use crate::timer::TimerWheel;

new_key_type! {
    /// Arena key addressing a [`TimerRecord`] in the pool.
    pub struct RecordKey;
}

/// Stable timer identity, unique for the lifetime of a wheel.
///
/// Ids are allocated monotonically and never reused while registered, which
/// is what makes lazy cancellation safe: a cancelled id simply stops
/// resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Arguments handed to a callback on every fire.
#[derive(Debug, Clone, Copy)]
pub struct CallbackArgs {
    /// Id of the firing timer
    pub id: TimerId,
    /// First opaque parameter slot installed at registration
    pub p1: i64,
    /// Second opaque parameter slot installed at registration
    pub p2: i64,
}

/// Timer callback trait for handling timer expirations.
///
/// The `&mut TimerWheel` parameter is what allows a callback to call any
/// public scheduler operation — register new timers, mutate others, or remove
/// itself. A callback must not call [`TimerWheel::tick`] (the wheel refuses
/// re-entry) and must not block indefinitely.
pub trait TimerCallback: Send + Sync {
    /// Called when the timer expires
    fn on_timer(&self, wheel: &mut TimerWheel, args: CallbackArgs) -> Result<()>;

    /// Get a name for debugging
    fn name(&self) -> &'static str {
        "timer"
    }
}

impl<F> TimerCallback for F
where
    F: Fn(&mut TimerWheel, CallbackArgs) -> Result<()> + Send + Sync,
{
    fn on_timer(&self, wheel: &mut TimerWheel, args: CallbackArgs) -> Result<()> {
        self(wheel, args)
    }
}

/// Internal per-timer state linked into a wheel bucket.
pub(crate) struct TimerRecord {
    /// Stable id assigned at creation
    pub id: TimerId,
    /// Period between repeats, in jiffies; 0 means "fire as soon as due"
    pub interval: u64,
    /// Absolute jiffy at which the timer fires next
    pub expires: u64,
    /// Remaining fires: positive count, or -1 for infinite
    pub loops: i32,
    /// Back-reference to the current wheel bucket; `None` while unscheduled
    /// (firing or queued for dispatch)
    pub bucket: Option<u16>,
    /// Lazy-cancel mark; the node is unlinked on next dispatch of its bucket
    pub cancelled: bool,
    /// The callback to invoke, shared so a fire can outlive a mid-flight swap
    pub callback: Option<Arc<dyn TimerCallback>>,
    /// First opaque parameter slot
    pub p1: i64,
    /// Second opaque parameter slot
    pub p2: i64,
    /// Previous record in the bucket list
    pub prev: Option<RecordKey>,
    /// Next record in the bucket list
    pub next: Option<RecordKey>,
}

impl Default for TimerRecord {
    /// The pool's reset state: no callback, infinite loops, nothing scheduled.
    fn default() -> Self {
        Self {
            id: TimerId(0),
            interval: 0,
            expires: 0,
            loops: -1,
            bucket: None,
            cancelled: false,
            callback: None,
            p1: 0,
            p2: 0,
            prev: None,
            next: None,
        }
    }
}

impl fmt::Debug for TimerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerRecord")
            .field("id", &self.id)
            .field("interval", &self.interval)
            .field("expires", &self.expires)
            .field("loops", &self.loops)
            .field("bucket", &self.bucket)
            .field("cancelled", &self.cancelled)
            .field("callback", &self.callback.as_ref().map(|cb| cb.name()))
            .finish()
    }
}
