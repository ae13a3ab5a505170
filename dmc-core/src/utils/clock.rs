//! Millisecond time source used by the timed motions.

use embassy_time::{block_for, Duration, Instant};

/// Monotonic millisecond clock with a blocking sleep.
pub trait Clock {
    /// Milliseconds since an arbitrary fixed origin.
    fn now_ms(&self) -> u64;

    /// Block the caller for `ms` milliseconds.
    fn sleep_ms(
        &self,
        ms: u32,
    );
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }

    fn sleep_ms(
        &self,
        ms: u32,
    ) {
        (**self).sleep_ms(ms)
    }
}

/// `Clock` backed by the embassy time driver. Sleeping busy-waits.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbassyClock;

impl Clock for EmbassyClock {
    fn now_ms(&self) -> u64 {
        Instant::now().as_millis()
    }

    fn sleep_ms(
        &self,
        ms: u32,
    ) {
        block_for(Duration::from_millis(u64::from(ms)));
    }
}
