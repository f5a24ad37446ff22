//! Clocks, bounded waits and frame tokens
//!
//! Everything time-dependent takes a [`Clock`] so tests can drive it with a
//! [`ManualClock`] instead of sleeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Source of elapsed time since an arbitrary fixed origin
pub trait Clock: Send + Sync {
    fn elapsed(&self) -> Duration;
}

/// Wall-clock backed monotonic clock
///
/// Clones share the same origin.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    start: Arc<Instant>,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Arc::new(Instant::now()),
        }
    }

    /// Create a clock whose time zero is an existing instant
    pub fn from_instant(start: Instant) -> Self {
        Self {
            start: Arc::new(start),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Clock that only moves when told to
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.nanos.fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

/// Outcome of a bounded readiness wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Ready(Duration),
    TimedOut(Duration),
}

impl WaitOutcome {
    pub fn elapsed(&self) -> Duration {
        match self {
            WaitOutcome::Ready(d) | WaitOutcome::TimedOut(d) => *d,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, WaitOutcome::Ready(_))
    }
}

/// Poll `ready` until it returns true or `timeout` has passed on `clock`.
///
/// The condition is checked at least once. Between polls the thread yields
/// rather than sleeping, so the wait ends as soon as the condition flips.
pub fn wait_until<F>(clock: &dyn Clock, timeout: Duration, mut ready: F) -> WaitOutcome
where
    F: FnMut() -> bool,
{
    let start = clock.elapsed();
    loop {
        if ready() {
            return WaitOutcome::Ready(clock.elapsed().saturating_sub(start));
        }
        let waited = clock.elapsed().saturating_sub(start);
        if waited >= timeout {
            return WaitOutcome::TimedOut(waited);
        }
        std::thread::yield_now();
    }
}

/// Issues strictly increasing, non-zero frame tokens.
///
/// Tokens are microsecond timestamps from the clock, bumped by one whenever
/// the clock has not advanced since the previous token.
pub struct FrameTokens {
    clock: Arc<dyn Clock>,
    last: AtomicU64,
}

impl FrameTokens {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            last: AtomicU64::new(0),
        }
    }

    pub fn next(&self) -> u64 {
        let now = self.clock.elapsed().as_micros() as u64;
        let mut previous = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(previous + 1);
            match self.last.compare_exchange_weak(
                previous,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return candidate,
                Err(actual) => previous = actual,
            }
        }
    }
}
