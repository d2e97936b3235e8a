//! The timer wheel scheduler: registration, mutation, and the tick driver.
//!
//! [`TimerWheel`] owns all scheduler state — the jiffy counter, the record
//! pool, the id registry, and the bucket array — on a single logical thread.
//! The host samples real elapsed time and calls [`TimerWheel::tick`]; each
//! owed jiffy runs one dispatch pass: cascade coarser levels down, execute
//! the current bottom-level slot, advance the counter.
//!
//! Cascading runs *before* the slot executes so a timer whose expiry lands on
//! a granularity boundary still fires in exactly its own jiffy; see DESIGN.md
//! for the ordering argument.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::channel::{self, Receiver, Sender};
use tracing::{debug, error, trace, warn};

use crate::clock::{self, HZ};
use crate::config::WheelConfig;
use crate::error::{Error, Result};
use crate::handle::{TimerCommand, TimerHandle};
use crate::pool::RecordPool;
use crate::record::{CallbackArgs, RecordKey, TimerCallback, TimerId};
use crate::wheel::{self, Wheel, DEPTH, SLOTS, SLOT_MASK};

/// Dispatch totals since construction.
#[derive(Debug, Clone, Copy, Default)]
struct Counters {
    scheduled: u64,
    fired: u64,
    cancelled: u64,
    cascaded: u64,
    panicked: u64,
}

/// Snapshot of wheel occupancy and dispatch totals.
#[derive(Debug, Clone)]
pub struct TimerStats {
    /// Current jiffy counter
    pub jiffies: u64,
    /// Live (non-cancelled) timers
    pub active: usize,
    /// Registered records, including cancelled ones awaiting lazy unlink
    pub registered: usize,
    /// Linked records per wheel level
    pub level_counts: [usize; DEPTH],
    /// Registrations accepted since construction
    pub scheduled_total: u64,
    /// Callback invocations since construction
    pub fired_total: u64,
    /// Cancellations since construction
    pub cancelled_total: u64,
    /// Records moved to a finer level by the cascade since construction
    pub cascaded_total: u64,
    /// Callback panics isolated since construction
    pub panicked_total: u64,
}

/// Hierarchical timing-wheel scheduler for coarse-grained in-process timers.
///
/// Register one-shot and repeating callbacks with millisecond delays; drive
/// the wheel from the host loop with [`tick`](Self::tick). Insert, mutate,
/// cancel, and expire are all O(1) amortised from one jiffy out to several
/// days (Varghese & Lauck, 1996).
pub struct TimerWheel {
    config: WheelConfig,
    /// Monotonic jiffy counter; reset to zero when the wheel idles empty
    jiffies: u64,
    pool: RecordPool,
    registry: HashMap<TimerId, RecordKey>,
    wheel: Wheel,
    /// Shared with handles so cross-thread registration can allocate ids
    next_id: Arc<AtomicU64>,
    command_tx: Sender<TimerCommand>,
    command_rx: Receiver<TimerCommand>,
    /// Scratch queue for the slot being dispatched
    expired: Vec<RecordKey>,
    /// Scratch queue for the bucket being cascaded
    cascade_buf: Vec<RecordKey>,
    /// Non-cancelled registered timers
    live: usize,
    /// Guards against `tick` re-entry from a callback
    in_dispatch: bool,
    counters: Counters,
}

impl TimerWheel {
    /// Create a timer wheel with the default configuration.
    pub fn new() -> Self {
        Self::build(WheelConfig::default())
    }

    /// Create a timer wheel with a custom configuration.
    pub fn with_config(config: WheelConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: WheelConfig) -> Self {
        let (command_tx, command_rx) = channel::unbounded();
        Self {
            config,
            jiffies: 0,
            pool: RecordPool::with_capacity(256),
            registry: HashMap::new(),
            wheel: Wheel::new(),
            next_id: Arc::new(AtomicU64::new(0)),
            command_tx,
            command_rx,
            expired: Vec::new(),
            cascade_buf: Vec::new(),
            live: 0,
            in_dispatch: false,
            counters: Counters::default(),
        }
    }

    /// Current jiffy counter.
    pub fn jiffies(&self) -> u64 {
        self.jiffies
    }

    /// Number of live (non-cancelled) timers.
    pub fn active(&self) -> usize {
        self.live
    }

    /// Whether an id refers to a live timer.
    pub fn contains(&self, id: TimerId) -> bool {
        self.live_key(id).is_some()
    }

    /// Absolute jiffy at which a live timer fires next.
    pub fn expiry(&self, id: TimerId) -> Option<u64> {
        let key = self.live_key(id)?;
        self.pool.get(key).map(|rec| rec.expires)
    }

    /// A cloneable, thread-safe registration façade.
    ///
    /// Commands sent through the handle are queued on an MPSC channel and
    /// applied by the driver thread at the next [`tick`](Self::tick).
    pub fn handle(&self) -> TimerHandle {
        TimerHandle::new(self.command_tx.clone(), Arc::clone(&self.next_id))
    }

    /// Snapshot occupancy and dispatch totals.
    pub fn stats(&self) -> TimerStats {
        let mut level_counts = [0usize; DEPTH];
        for rec in self.pool.iter() {
            if let Some(bucket) = rec.bucket {
                level_counts[bucket as usize / SLOTS] += 1;
            }
        }
        TimerStats {
            jiffies: self.jiffies,
            active: self.live,
            registered: self.registry.len(),
            level_counts,
            scheduled_total: self.counters.scheduled,
            fired_total: self.counters.fired,
            cancelled_total: self.counters.cancelled,
            cascaded_total: self.counters.cascaded,
            panicked_total: self.counters.panicked,
        }
    }

    // ---- registration -----------------------------------------------------

    /// Register a one-shot timer firing `delay_ms` from now.
    ///
    /// A zero delay fires on the next tick boundary, never synchronously.
    /// Delays beyond the wheel range are silently clamped to
    /// [`MAX_DELTA`](crate::wheel::MAX_DELTA) jiffies.
    pub fn add_delay<C>(&mut self, delay_ms: u64, callback: C, p1: i64, p2: i64) -> Result<TimerId>
    where
        C: TimerCallback + 'static,
    {
        let id = self.allocate_id();
        self.register(id, 0, 1, clock::ms_to_jiffies(delay_ms), Arc::new(callback), p1, p2)
    }

    /// Register a repeating timer firing every `interval_ms`, forever.
    pub fn add_loop<C>(&mut self, interval_ms: u64, callback: C, p1: i64, p2: i64) -> Result<TimerId>
    where
        C: TimerCallback + 'static,
    {
        self.add_loop_with(interval_ms, 0, -1, callback, p1, p2)
    }

    /// Register a repeating timer with an explicit fire count and initial delay.
    ///
    /// `loops` is a positive count or `-1` for infinite. The first fire lands
    /// `interval_ms + delay_ms` from now; subsequent fires every `interval_ms`.
    pub fn add_loop_with<C>(
        &mut self,
        interval_ms: u64,
        delay_ms: u64,
        loops: i32,
        callback: C,
        p1: i64,
        p2: i64,
    ) -> Result<TimerId>
    where
        C: TimerCallback + 'static,
    {
        check_loop_args(interval_ms, loops)?;
        let id = self.allocate_id();
        let interval = clock::ms_to_jiffies(interval_ms);
        let delta = clock::ms_to_jiffies(interval_ms.saturating_add(delay_ms));
        self.register(id, interval, loops, delta, Arc::new(callback), p1, p2)
    }

    fn allocate_id(&self) -> TimerId {
        TimerId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Shared registration path for direct calls and queued handle commands.
    pub(crate) fn register(
        &mut self,
        id: TimerId,
        interval: u64,
        loops: i32,
        delta: u64,
        callback: Arc<dyn TimerCallback>,
        p1: i64,
        p2: i64,
    ) -> Result<TimerId> {
        if self.registry.len() >= self.config.max_timers {
            warn!(id = %id, max = self.config.max_timers, "timer registry is full");
            return Err(Error::resource_exhausted("timer registry"));
        }

        let expires = self.future_expiry(delta);
        let key = self.pool.acquire();
        if let Some(rec) = self.pool.get_mut(key) {
            rec.id = id;
            rec.interval = interval;
            rec.loops = loops;
            rec.expires = expires;
            rec.callback = Some(callback);
            rec.p1 = p1;
            rec.p2 = p2;
        }

        if self.registry.contains_key(&id) {
            self.pool.release(key);
            warn!(id = %id, "timer id already registered");
            return Err(Error::duplicate_timer(id));
        }
        self.registry.insert(id, key);
        self.live += 1;
        self.counters.scheduled += 1;
        self.place(key);
        debug!(id = %id, expires, interval, loops, "timer scheduled");
        Ok(id)
    }

    /// Target expiry for a fresh schedule: always at least one jiffy out, so
    /// a zero delay lands in the slot the very next pass executes.
    fn future_expiry(&self, delta: u64) -> u64 {
        self.jiffies.saturating_add(delta.max(1))
    }

    // ---- mutators ---------------------------------------------------------

    /// Replace a timer's interval and restart its period from now.
    pub fn modify_interval(&mut self, id: TimerId, interval_ms: u64) -> Result<()> {
        if interval_ms == 0 {
            warn!(id = %id, "modify_interval requires a positive interval");
            return Err(Error::invalid_argument("interval_ms must be positive"));
        }
        let Some(key) = self.live_key(id) else {
            warn!(id = %id, "modify_interval on unknown timer");
            return Err(Error::unknown_timer(id));
        };
        let interval = clock::ms_to_jiffies(interval_ms);
        let expires = self.future_expiry(interval);
        if let Some(rec) = self.pool.get_mut(key) {
            rec.interval = interval;
            rec.expires = expires;
        }
        self.reschedule(key);
        debug!(id = %id, interval, "timer interval modified");
        Ok(())
    }

    /// Push a timer's next fire out by `delay_ms` beyond its interval.
    pub fn modify_delay(&mut self, id: TimerId, delay_ms: u64) -> Result<()> {
        let Some(key) = self.live_key(id) else {
            warn!(id = %id, "modify_delay on unknown timer");
            return Err(Error::unknown_timer(id));
        };
        let delay = clock::ms_to_jiffies(delay_ms);
        let interval = self.pool.get(key).map_or(0, |rec| rec.interval);
        let expires = self.future_expiry(interval.saturating_add(delay));
        if let Some(rec) = self.pool.get_mut(key) {
            rec.expires = expires;
        }
        self.reschedule(key);
        debug!(id = %id, expires, "timer delay modified");
        Ok(())
    }

    /// Replace a timer's remaining fire count in place (`-1` for infinite).
    pub fn modify_loops(&mut self, id: TimerId, loops: i32) -> Result<()> {
        if loops < -1 {
            warn!(id = %id, loops, "modify_loops requires loops >= -1");
            return Err(Error::invalid_argument("loops must be -1 or non-negative"));
        }
        let Some(key) = self.live_key(id) else {
            warn!(id = %id, "modify_loops on unknown timer");
            return Err(Error::unknown_timer(id));
        };
        if let Some(rec) = self.pool.get_mut(key) {
            rec.loops = loops;
        }
        Ok(())
    }

    /// Replace a timer's callback in place. A fire already in flight keeps
    /// the callback it started with.
    pub fn modify_callback<C>(&mut self, id: TimerId, callback: C) -> Result<()>
    where
        C: TimerCallback + 'static,
    {
        let Some(key) = self.live_key(id) else {
            warn!(id = %id, "modify_callback on unknown timer");
            return Err(Error::unknown_timer(id));
        };
        if let Some(rec) = self.pool.get_mut(key) {
            rec.callback = Some(Arc::new(callback));
        }
        Ok(())
    }

    /// Replace a timer's opaque parameters in place.
    pub fn modify_params(&mut self, id: TimerId, p1: i64, p2: i64) -> Result<()> {
        let Some(key) = self.live_key(id) else {
            warn!(id = %id, "modify_params on unknown timer");
            return Err(Error::unknown_timer(id));
        };
        if let Some(rec) = self.pool.get_mut(key) {
            rec.p1 = p1;
            rec.p2 = p2;
        }
        Ok(())
    }

    /// Cancel a timer. Returns whether the id was live.
    ///
    /// O(1) and lazy: the record is marked invalid here and unlinked the next
    /// time the dispatcher or cascade encounters its bucket. Cancelling from
    /// inside the timer's own callback prevents all future fires.
    pub fn remove(&mut self, id: TimerId) -> bool {
        let Some(key) = self.registry.get(&id).copied() else {
            return false;
        };
        let Some(rec) = self.pool.get_mut(key) else {
            return false;
        };
        if rec.cancelled {
            return false;
        }
        rec.cancelled = true;
        rec.callback = None;
        self.live = self.live.saturating_sub(1);
        self.counters.cancelled += 1;
        debug!(id = %id, "timer cancelled");
        true
    }

    fn live_key(&self, id: TimerId) -> Option<RecordKey> {
        let key = *self.registry.get(&id)?;
        let rec = self.pool.get(key)?;
        if rec.cancelled {
            None
        } else {
            Some(key)
        }
    }

    /// Re-bucket after an expiry change. A record without a back-pointer is
    /// owned by the dispatcher (firing or queued); it re-places those itself.
    fn reschedule(&mut self, key: RecordKey) {
        if self.pool.get(key).and_then(|rec| rec.bucket).is_some() {
            self.wheel.unlink(&mut self.pool, key);
            self.place(key);
        }
    }

    /// Insert a record into the bucket the index calculator picks for it.
    fn place(&mut self, key: RecordKey) {
        let jiffies = self.jiffies;
        let Some(rec) = self.pool.get_mut(key) else {
            return;
        };
        let (bucket, effective) = wheel::calculate_position(rec.expires, jiffies);
        rec.expires = effective;
        self.wheel.link(&mut self.pool, key, bucket);
    }

    /// Unlink (if linked), unregister, and release a record.
    fn retire(&mut self, key: RecordKey) {
        if self.pool.get(key).and_then(|rec| rec.bucket).is_some() {
            self.wheel.unlink(&mut self.pool, key);
        }
        let Some(rec) = self.pool.get(key) else {
            return;
        };
        let id = rec.id;
        let was_cancelled = rec.cancelled;
        self.registry.remove(&id);
        if !was_cancelled {
            self.live = self.live.saturating_sub(1);
        }
        self.pool.release(key);
        trace!(id = %id, "timer retired");
    }

    // ---- dispatch ---------------------------------------------------------

    /// Advance the wheel by `delta_ms` of wall time and dispatch due timers.
    ///
    /// Negative and non-finite deltas count as zero. While the wheel is
    /// empty the jiffy counter resets to zero, so long idle periods cannot
    /// accumulate drift. Must not be called from a timer callback.
    pub fn tick(&mut self, delta_ms: f32) {
        if self.in_dispatch {
            warn!("tick re-entered from a timer callback; ignoring");
            return;
        }
        self.drain_commands();
        if self.registry.is_empty() {
            self.jiffies = 0;
            return;
        }

        let delta = if delta_ms.is_finite() && delta_ms > 0.0 {
            f64::from(delta_ms)
        } else {
            0.0
        };
        let mut steps = (delta * HZ as f64 / 1000.0) as u64;
        if self.config.smooth_catch_up {
            steps = (steps >> 1) + 1;
        }

        self.in_dispatch = true;
        for _ in 0..steps {
            self.jiffies += 1;
            self.cascade();
            self.run_current_slot();
        }
        self.in_dispatch = false;
    }

    /// Apply commands queued by [`TimerHandle`]s since the last tick.
    fn drain_commands(&mut self) {
        while let Ok(command) = self.command_rx.try_recv() {
            self.apply_command(command);
        }
    }

    fn apply_command(&mut self, command: TimerCommand) {
        let outcome = match command {
            TimerCommand::AddDelay { id, delay_ms, callback, p1, p2 } => self
                .register(id, 0, 1, clock::ms_to_jiffies(delay_ms), callback, p1, p2)
                .map(|_| ()),
            TimerCommand::AddLoop { id, interval_ms, delay_ms, loops, callback, p1, p2 } => {
                check_loop_args(interval_ms, loops).and_then(|()| {
                    let interval = clock::ms_to_jiffies(interval_ms);
                    let delta = clock::ms_to_jiffies(interval_ms.saturating_add(delay_ms));
                    self.register(id, interval, loops, delta, callback, p1, p2).map(|_| ())
                })
            }
            TimerCommand::ModifyInterval { id, interval_ms } => self.modify_interval(id, interval_ms),
            TimerCommand::ModifyDelay { id, delay_ms } => self.modify_delay(id, delay_ms),
            TimerCommand::ModifyLoops { id, loops } => self.modify_loops(id, loops),
            TimerCommand::ModifyParams { id, p1, p2 } => self.modify_params(id, p1, p2),
            TimerCommand::Remove { id } => {
                self.remove(id);
                Ok(())
            }
        };
        if let Err(err) = outcome {
            warn!(error = %err, category = err.category(), "queued timer command rejected");
        }
    }

    /// Move due coarse-level buckets down before the current slot executes.
    ///
    /// For each level whose granularity boundary the jiffy counter just
    /// crossed — coarsest first — drain the one bucket whose expiry window
    /// starts now and re-insert its records through the index calculator at
    /// the live jiffy value. Each record lands strictly finer (or in the
    /// current slot, which this pass still executes), so nothing is cascaded
    /// twice in one pass and nothing fires late.
    fn cascade(&mut self) {
        let jiffies = self.jiffies;
        if jiffies == 0 {
            return;
        }
        let mut top = 0;
        for level in 1..DEPTH {
            if jiffies & (wheel::granularity(level) - 1) != 0 {
                break;
            }
            top = level;
        }
        if top == 0 {
            return;
        }

        let mut buf = std::mem::take(&mut self.cascade_buf);
        for level in (1..=top).rev() {
            let bucket = wheel::cascade_bucket(level, jiffies);
            buf.clear();
            self.wheel.detach(&mut self.pool, bucket, &mut buf);
            if buf.is_empty() {
                continue;
            }
            trace!(level, bucket, count = buf.len(), "cascading bucket");
            for &key in &buf {
                if self.record_is_dead(key) {
                    self.retire(key);
                    continue;
                }
                self.place(key);
                self.counters.cascaded += 1;
            }
        }
        buf.clear();
        self.cascade_buf = buf;
    }

    /// Validity check from the dispatch path: cancelled, callback-less, or
    /// loop-exhausted records are retired instead of travelling further.
    fn record_is_dead(&self, key: RecordKey) -> bool {
        match self.pool.get(key) {
            Some(rec) => rec.cancelled || rec.callback.is_none() || rec.loops == 0,
            None => false,
        }
    }

    /// Execute every record in the current bottom-level slot, in FIFO order.
    fn run_current_slot(&mut self) {
        let slot = (self.jiffies & SLOT_MASK) as usize;
        let mut queue = std::mem::take(&mut self.expired);
        queue.clear();
        self.wheel.detach(&mut self.pool, slot, &mut queue);
        if !queue.is_empty() {
            trace!(jiffy = self.jiffies, slot, due = queue.len(), "dispatching slot");
        }
        for &key in &queue {
            self.execute(key);
        }
        queue.clear();
        self.expired = queue;
    }

    /// Fire one record popped from the dispatch queue and settle its fate.
    fn execute(&mut self, key: RecordKey) {
        enum Action {
            Retire,
            Replace,
            Fire(Arc<dyn TimerCallback>, CallbackArgs),
        }

        let jiffies = self.jiffies;
        let action = match self.pool.get(key) {
            None => return,
            Some(rec) if rec.cancelled || rec.loops == 0 => Action::Retire,
            // A mutator moved this record to the future while it sat in the
            // dispatch queue; put it back without firing.
            Some(rec) if rec.expires > jiffies => Action::Replace,
            Some(rec) => match rec.callback.clone() {
                Some(callback) => Action::Fire(
                    callback,
                    CallbackArgs { id: rec.id, p1: rec.p1, p2: rec.p2 },
                ),
                None => Action::Retire,
            },
        };

        let (callback, args) = match action {
            Action::Retire => return self.retire(key),
            Action::Replace => return self.place(key),
            Action::Fire(callback, args) => (callback, args),
        };

        self.counters.fired += 1;
        trace!(id = %args.id, jiffy = jiffies, "timer fired");
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback.on_timer(self, args)));
        match outcome {
            Err(_) => {
                error!(id = %args.id, callback = callback.name(), "timer callback panicked; retiring timer");
                self.counters.panicked += 1;
                self.retire(key);
                return;
            }
            Ok(Err(err)) => {
                warn!(id = %args.id, error = %err, "timer callback returned an error");
            }
            Ok(Ok(())) => {}
        }

        // Loop bookkeeping. The callback may have cancelled or mutated its
        // own record, so re-read it before deciding.
        let Some(rec) = self.pool.get_mut(key) else {
            return;
        };
        if rec.cancelled {
            self.retire(key);
            return;
        }
        if rec.loops > 0 {
            rec.loops -= 1;
        }
        if rec.loops != 0 {
            rec.expires = self.jiffies.saturating_add(rec.interval);
            self.place(key);
        } else {
            self.retire(key);
        }
    }
}

impl Default for TimerWheel {
    fn default() -> Self {
        Self::new()
    }
}

fn check_loop_args(interval_ms: u64, loops: i32) -> Result<()> {
    if interval_ms == 0 {
        warn!("loop timer requires a positive interval");
        return Err(Error::invalid_argument("interval_ms must be positive"));
    }
    if loops == 0 || loops < -1 {
        warn!(loops, "loop timer requires loops of -1 or positive");
        return Err(Error::invalid_argument("loops must be -1 or positive"));
    }
    Ok(())
}
