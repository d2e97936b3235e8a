//! Thread-safe registration façade.
//!
//! The wheel core is single-threaded by design; cross-thread callers get a
//! [`TimerHandle`] instead. A handle allocates ids from the wheel's shared
//! allocator and queues commands on an MPSC channel that the driver thread
//! drains at the top of every [`tick`](crate::timer::TimerWheel::tick), so
//! registration from other threads never blocks and never races the
//! dispatcher.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::channel::Sender;

use crate::error::{Error, Result};
use crate::record::{TimerCallback, TimerId};

/// A scheduler operation queued for the driver thread.
pub(crate) enum TimerCommand {
    AddDelay {
        id: TimerId,
        delay_ms: u64,
        callback: Arc<dyn TimerCallback>,
        p1: i64,
        p2: i64,
    },
    AddLoop {
        id: TimerId,
        interval_ms: u64,
        delay_ms: u64,
        loops: i32,
        callback: Arc<dyn TimerCallback>,
        p1: i64,
        p2: i64,
    },
    ModifyInterval { id: TimerId, interval_ms: u64 },
    ModifyDelay { id: TimerId, delay_ms: u64 },
    ModifyLoops { id: TimerId, loops: i32 },
    ModifyParams { id: TimerId, p1: i64, p2: i64 },
    Remove { id: TimerId },
}

/// Cloneable, `Send` registration handle for a [`TimerWheel`](crate::timer::TimerWheel).
///
/// Ids are allocated immediately on the calling thread; the operation itself
/// is applied by the driver at its next tick. Argument validation also runs
/// on the driver thread — a rejected command is logged there and its id never
/// becomes live.
#[derive(Clone)]
pub struct TimerHandle {
    commands: Sender<TimerCommand>,
    next_id: Arc<AtomicU64>,
}

impl TimerHandle {
    pub(crate) fn new(commands: Sender<TimerCommand>, next_id: Arc<AtomicU64>) -> Self {
        Self { commands, next_id }
    }

    fn allocate_id(&self) -> TimerId {
        TimerId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn send(&self, command: TimerCommand) -> Result<()> {
        self.commands.send(command).map_err(|_| Error::Disconnected)
    }

    /// Queue a one-shot timer firing `delay_ms` after the next tick sees it.
    pub fn add_delay<C>(&self, delay_ms: u64, callback: C, p1: i64, p2: i64) -> Result<TimerId>
    where
        C: TimerCallback + 'static,
    {
        let id = self.allocate_id();
        self.send(TimerCommand::AddDelay {
            id,
            delay_ms,
            callback: Arc::new(callback),
            p1,
            p2,
        })?;
        Ok(id)
    }

    /// Queue an infinite repeating timer.
    pub fn add_loop<C>(&self, interval_ms: u64, callback: C, p1: i64, p2: i64) -> Result<TimerId>
    where
        C: TimerCallback + 'static,
    {
        self.add_loop_with(interval_ms, 0, -1, callback, p1, p2)
    }

    /// Queue a repeating timer with an explicit fire count and initial delay.
    pub fn add_loop_with<C>(
        &self,
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
        let id = self.allocate_id();
        self.send(TimerCommand::AddLoop {
            id,
            interval_ms,
            delay_ms,
            loops,
            callback: Arc::new(callback),
            p1,
            p2,
        })?;
        Ok(id)
    }

    /// Queue an interval change.
    pub fn modify_interval(&self, id: TimerId, interval_ms: u64) -> Result<()> {
        self.send(TimerCommand::ModifyInterval { id, interval_ms })
    }

    /// Queue a delay change.
    pub fn modify_delay(&self, id: TimerId, delay_ms: u64) -> Result<()> {
        self.send(TimerCommand::ModifyDelay { id, delay_ms })
    }

    /// Queue a loop-count change.
    pub fn modify_loops(&self, id: TimerId, loops: i32) -> Result<()> {
        self.send(TimerCommand::ModifyLoops { id, loops })
    }

    /// Queue a parameter change.
    pub fn modify_params(&self, id: TimerId, p1: i64, p2: i64) -> Result<()> {
        self.send(TimerCommand::ModifyParams { id, p1, p2 })
    }

    /// Queue a cancellation.
    pub fn remove(&self, id: TimerId) -> Result<()> {
        self.send(TimerCommand::Remove { id })
    }
}
