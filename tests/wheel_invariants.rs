//! Wheel-level invariants and dispatch-exactness laws, including the
//! large-population sweep and property tests over the conversion functions.
//!
//! All timings assume the default geometry (HZ = 1000).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use proptest::prelude::*;
use whirl::{jiffies_to_ms, ms_to_jiffies, CallbackArgs, TimerWheel};

/// A timer due at jiffy `delta` must fire in exactly that jiffy's pass.
fn assert_exact_dispatch(delta: u64) {
    let mut wheel = TimerWheel::new();
    let fired_at = Arc::new(AtomicU64::new(u64::MAX));
    let shared = Arc::clone(&fired_at);
    wheel
        .add_delay(delta, move |wheel: &mut TimerWheel, _: CallbackArgs| -> whirl::Result<()> {
            shared.store(wheel.jiffies(), Ordering::SeqCst);
            Ok(())
        }, 0, 0)
        .unwrap();

    if delta > 1 {
        wheel.tick((delta - 1) as f32);
        assert_eq!(
            fired_at.load(Ordering::SeqCst),
            u64::MAX,
            "delta {delta}: fired early"
        );
    }
    wheel.tick(if delta > 1 { 1.0 } else { delta as f32 });
    assert_eq!(fired_at.load(Ordering::SeqCst), delta, "delta {delta}");
}

#[test]
fn dispatch_is_exact_across_level_boundaries() {
    for delta in [
        1u64, 2, 7, 8, 9, 63, 64, 65, 127, 128, 511, 512, 513, 4095, 4096, 4097, 32_767, 32_768,
        32_769, 262_143, 262_144,
    ] {
        assert_exact_dispatch(delta);
    }
}

#[test]
fn large_population_fires_each_timer_in_its_own_jiffy() {
    const COUNT: u64 = 262_143;

    let mut wheel = TimerWheel::new();
    let fired = Arc::new(AtomicU64::new(0));
    let mismatches = Arc::new(AtomicU64::new(0));

    for delta in 1..=COUNT {
        let fired = Arc::clone(&fired);
        let mismatches = Arc::clone(&mismatches);
        wheel
            .add_delay(
                delta,
                move |wheel: &mut TimerWheel, args: CallbackArgs| -> whirl::Result<()> {
                    fired.fetch_add(1, Ordering::Relaxed);
                    if wheel.jiffies() != args.p1 as u64 {
                        mismatches.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(())
                },
                delta as i64,
                0,
            )
            .unwrap();
    }
    assert_eq!(wheel.active(), COUNT as usize);

    for _ in 0..COUNT {
        wheel.tick(1.0);
    }

    assert_eq!(fired.load(Ordering::Relaxed), COUNT);
    assert_eq!(mismatches.load(Ordering::Relaxed), 0);
    assert_eq!(wheel.active(), 0);
}

#[test]
fn registered_records_always_sit_in_exactly_one_bucket() {
    let mut wheel = TimerWheel::new();
    let noop = |_: &mut TimerWheel, _: CallbackArgs| -> whirl::Result<()> { Ok(()) };

    // Spread timers across every level of the wheel.
    let mut ids = Vec::new();
    for delta in [1u64, 10, 63, 64, 500, 512, 4000, 4096, 40_000, 300_000, 1 << 27, 1 << 29] {
        ids.push(wheel.add_delay(delta, noop, 0, 0).unwrap());
    }

    let stats = wheel.stats();
    assert_eq!(stats.registered, ids.len());
    assert_eq!(stats.active, ids.len());
    assert_eq!(stats.level_counts.iter().sum::<usize>(), ids.len());
    assert!(stats.level_counts[8] >= 2, "far deltas must land coarse");

    // Cancellation is lazy: the record stays linked until its bucket drains.
    assert!(wheel.remove(ids[0]));
    assert!(wheel.remove(ids[10]));
    let stats = wheel.stats();
    assert_eq!(stats.active, ids.len() - 2);
    assert_eq!(stats.registered, ids.len());
    assert_eq!(stats.level_counts.iter().sum::<usize>(), ids.len());

    // Advancing past both cancelled expiries unlinks and retires them.
    wheel.tick(600.0);
    let stats = wheel.stats();
    assert_eq!(stats.registered, stats.active + 1, "one cancelled straggler remains far out");
    assert_eq!(stats.level_counts.iter().sum::<usize>(), stats.registered);
}

#[test]
fn strict_jiffy_ordering_across_ticks() {
    let mut wheel = TimerWheel::new();
    let order = Arc::new(std::sync::Mutex::new(Vec::new()));

    // Register in shuffled delta order; fires must come out sorted.
    for delta in [40u64, 3, 64, 17, 65, 512, 100, 1, 513, 8] {
        let shared = Arc::clone(&order);
        wheel
            .add_delay(delta, move |wheel: &mut TimerWheel, _: CallbackArgs| -> whirl::Result<()> {
                shared.lock().unwrap().push(wheel.jiffies());
                Ok(())
            }, 0, 0)
            .unwrap();
    }

    wheel.tick(600.0);
    let order = order.lock().unwrap();
    assert_eq!(*order, vec![1, 3, 8, 17, 40, 64, 65, 100, 512, 513]);
}

#[test]
fn bounded_loops_fire_exactly_their_count() {
    for loops in [1i32, 2, 5, 9] {
        let mut wheel = TimerWheel::new();
        let fired = Arc::new(AtomicU64::new(0));
        let shared = Arc::clone(&fired);
        wheel
            .add_loop_with(4, 0, loops, move |_: &mut TimerWheel, _: CallbackArgs| -> whirl::Result<()> {
                shared.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }, 0, 0)
            .unwrap();

        wheel.tick(4.0 * loops as f32 + 100.0);
        assert_eq!(fired.load(Ordering::SeqCst), loops as u64);
        assert_eq!(wheel.active(), 0);
    }
}

proptest! {
    #[test]
    fn ms_to_jiffies_is_monotonic(a in 0u64..10_000_000, b in 0u64..10_000_000) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(ms_to_jiffies(lo) <= ms_to_jiffies(hi));
    }

    #[test]
    fn conversion_round_trip_never_shortens(ms in 0u64..10_000_000) {
        prop_assert!(jiffies_to_ms(ms_to_jiffies(ms)) >= ms);
    }

    #[test]
    fn sampled_deltas_dispatch_exactly(delta in 1u64..4096) {
        assert_exact_dispatch(delta);
    }

    #[test]
    fn paired_timers_fire_in_delta_order(a in 1u64..2000, b in 1u64..2000) {
        prop_assume!(a != b);
        let mut wheel = TimerWheel::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        for delta in [a, b] {
            let shared = Arc::clone(&order);
            wheel
                .add_delay(delta, move |_: &mut TimerWheel, args: CallbackArgs| -> whirl::Result<()> {
                    shared.lock().unwrap().push(args.p1 as u64);
                    Ok(())
                }, delta as i64, 0)
                .unwrap();
        }
        wheel.tick(2000.0);
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        prop_assert_eq!(&*order.lock().unwrap(), &vec![lo, hi]);
    }
}
