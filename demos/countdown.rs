//! Minimal driver loop: a heartbeat, a countdown, and a one-shot finale.
//!
//! Run with `RUST_LOG=whirl=debug cargo run --example countdown` to watch the
//! wheel's own tracing alongside the demo output.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing_subscriber::EnvFilter;
use whirl::{CallbackArgs, TimerWheel};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut wheel = TimerWheel::new();
    let done = Arc::new(AtomicBool::new(false));

    wheel.add_loop(500, |wheel: &mut TimerWheel, _: CallbackArgs| -> whirl::Result<()> {
        println!("  heartbeat at {} jiffies", wheel.jiffies());
        Ok(())
    }, 0, 0)?;

    // Three countdown beats, then a finale that stops the driver loop.
    wheel.add_loop_with(
        1000,
        0,
        3,
        |wheel: &mut TimerWheel, args: CallbackArgs| -> whirl::Result<()> {
            let remaining = 3 - args.p1 + 1;
            println!("countdown: {remaining}");
            wheel.modify_params(args.id, args.p1 + 1, 0)?;
            Ok(())
        },
        1,
        0,
    )?;

    let flag = Arc::clone(&done);
    wheel.add_delay(3500, move |_: &mut TimerWheel, _: CallbackArgs| -> whirl::Result<()> {
        println!("liftoff!");
        flag.store(true, Ordering::SeqCst);
        Ok(())
    }, 0, 0)?;

    let mut last = Instant::now();
    while !done.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(16));
        let now = Instant::now();
        let delta_ms = now.duration_since(last).as_secs_f32() * 1000.0;
        last = now;
        wheel.tick(delta_ms);
    }

    let stats = wheel.stats();
    println!(
        "done after {} jiffies: {} fired, {} still active",
        stats.jiffies, stats.fired_total, stats.active
    );
    Ok(())
}
