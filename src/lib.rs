//! # Whirl: Hierarchical Timing-Wheel Scheduler
//!
//! Whirl schedules one-shot and repeating callbacks with millisecond delays
//! for cooperative, tick-driven hosts — game loops, simulations, embedded
//! event pumps. An external driver supplies elapsed wall time; the wheel
//! dispatches expired callbacks in increasing expiry order with O(1)
//! amortised insert and expiry from a single tick out to several days.
//!
//! ## Architecture
//!
//! ```text
//! Whirl Scheduler
//! ├── Tick clock      (jiffy counter + ms conversions)
//! ├── Record pool     (slab arena, acquire/release recycling)
//! ├── Registry        (id → record, monotonic id allocator)
//! ├── Wheel array     (9 levels × 64 buckets, intrusive lists)
//! ├── Index calculator (bitwise level/slot derivation)
//! ├── Cascade engine  (coarse → fine re-bucketing on boundaries)
//! └── Dispatcher      (tick: cascade, execute slot, advance)
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use whirl::{CallbackArgs, TimerWheel};
//!
//! let mut wheel = TimerWheel::new();
//! wheel.add_delay(250, |_: &mut TimerWheel, args: CallbackArgs| -> whirl::Result<()> {
//!     println!("timer {} fired", args.id);
//!     Ok(())
//! }, 0, 0)?;
//!
//! // The host samples elapsed wall time and drives the wheel:
//! wheel.tick(250.0);
//! # Ok::<(), whirl::Error>(())
//! ```
//!
//! ## Research Citations
//!
//! The wheel layout and cascade follow Varghese & Lauck (1996), "Hashed and
//! Hierarchical Timing Wheels", with a uniform 64-slot, shift-by-3 geometry
//! sized for game-scale timer populations (up to ~1M live timers).

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all)]

pub mod clock;
pub mod config;
pub mod error;
pub mod handle;
pub mod timer;
pub mod wheel;

mod pool;
mod record;

// Re-export main types
pub use clock::{jiffies_to_ms, ms_to_jiffies, HZ};
pub use config::WheelConfig;
pub use error::{Error, Result};
pub use handle::TimerHandle;
pub use record::{CallbackArgs, TimerCallback, TimerId};
pub use timer::{TimerStats, TimerWheel};
pub use wheel::{CUTOFF, DEPTH, LAST_GRANULARITY, LEVEL_BITS, MAX_DELTA, SHIFT, SLOTS};
