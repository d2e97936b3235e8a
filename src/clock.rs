//! Tick clock: jiffy units and millisecond conversions.
//!
//! The wheel measures time in *jiffies*. One jiffy is `1000 / HZ`
//! milliseconds; `HZ` is fixed at compile time so that the wheel geometry and
//! all bucket math reduce to shifts and masks. Public durations are expressed
//! in milliseconds and converted on entry.

#[cfg(all(feature = "hz-250", feature = "hz-60"))]
compile_error!("features `hz-250` and `hz-60` are mutually exclusive");

/// Tick frequency: jiffies per second.
#[cfg(not(any(feature = "hz-250", feature = "hz-60")))]
pub const HZ: u64 = 1000;

/// Tick frequency: jiffies per second.
#[cfg(all(feature = "hz-250", not(feature = "hz-60")))]
pub const HZ: u64 = 250;

/// Tick frequency: jiffies per second.
#[cfg(feature = "hz-60")]
pub const HZ: u64 = 60;

/// Convert a millisecond duration to jiffies, rounding up.
///
/// The ceiling guarantees that a requested delay never fires early: a delay
/// that falls inside a jiffy is pushed out to the next whole one.
pub const fn ms_to_jiffies(ms: u64) -> u64 {
    ms.saturating_mul(HZ).saturating_add(999) / 1000
}

/// Convert a jiffy count back to whole milliseconds.
///
/// Together with the ceiling in [`ms_to_jiffies`] this satisfies
/// `jiffies_to_ms(ms_to_jiffies(ms)) >= ms` for all `ms`.
pub const fn jiffies_to_ms(jiffies: u64) -> u64 {
    jiffies.saturating_mul(1000) / HZ
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_maps_to_zero() {
        assert_eq!(ms_to_jiffies(0), 0);
        assert_eq!(jiffies_to_ms(0), 0);
    }

    #[test]
    fn conversion_rounds_up() {
        // A sub-jiffy duration still costs one whole jiffy at every HZ.
        assert_eq!(ms_to_jiffies(1), 1);
        for ms in 1..=2000u64 {
            let jiffies = ms_to_jiffies(ms);
            assert!(jiffies * 1000 >= ms * HZ, "fired early at ms = {ms}");
        }
    }

    #[cfg(not(any(feature = "hz-250", feature = "hz-60")))]
    #[test]
    fn millisecond_granularity_at_default_hz() {
        assert_eq!(HZ, 1000);
        assert_eq!(ms_to_jiffies(1), 1);
        assert_eq!(ms_to_jiffies(16), 16);
        assert_eq!(jiffies_to_ms(16), 16);
    }

    #[test]
    fn round_trip_never_shrinks() {
        for ms in [0u64, 1, 2, 3, 15, 16, 17, 999, 1000, 1001, 123_456] {
            assert!(jiffies_to_ms(ms_to_jiffies(ms)) >= ms, "ms = {ms}");
        }
    }

    #[test]
    fn conversion_is_monotonic() {
        let mut prev = ms_to_jiffies(0);
        for ms in 1..=2000u64 {
            let next = ms_to_jiffies(ms);
            assert!(next >= prev, "ms_to_jiffies not monotonic at {ms}");
            prev = next;
        }
    }

    #[test]
    fn saturates_instead_of_overflowing() {
        let _ = ms_to_jiffies(u64::MAX);
        let _ = jiffies_to_ms(u64::MAX);
    }
}
