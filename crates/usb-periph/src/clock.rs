//! Emulation time base used to stamp fake transfer completions.
//!
//! Every emulated transfer reports an "expected completion time" computed as `now + latency`.
//! `now` comes from an [`EmuClock`], which in production is a pause-aware host monotonic clock and
//! in tests is a [`FakeClock`] driven by hand.

use core::ops::{Add, AddAssign};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Monotonic timestamp in emulation time, with microsecond resolution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EmuInstant(u64);

impl EmuInstant {
    pub const ZERO: EmuInstant = EmuInstant(0);

    pub const fn from_micros(us: u64) -> Self {
        Self(us)
    }

    pub const fn from_millis(ms: u64) -> Self {
        Self(ms.saturating_mul(1_000))
    }

    pub const fn as_micros(self) -> u64 {
        self.0
    }

    /// Time elapsed since `earlier`, or zero if `earlier` is in the future.
    pub fn saturating_duration_since(self, earlier: EmuInstant) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }
}

impl Add<Duration> for EmuInstant {
    type Output = EmuInstant;

    fn add(self, rhs: Duration) -> EmuInstant {
        let us = u64::try_from(rhs.as_micros()).unwrap_or(u64::MAX);
        EmuInstant(self.0.saturating_add(us))
    }
}

impl AddAssign<Duration> for EmuInstant {
    fn add_assign(&mut self, rhs: Duration) {
        *self = *self + rhs;
    }
}

/// Source of "now" for device models.
pub trait EmuClock: Send + Sync {
    fn now(&self) -> EmuInstant;
}

#[derive(Debug)]
struct PauseState {
    paused_at: Option<Instant>,
    paused_total: Duration,
}

/// Host monotonic clock that stops advancing while the emulator is paused.
#[derive(Debug)]
pub struct StdClock {
    origin: Instant,
    state: Mutex<PauseState>,
}

impl StdClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            state: Mutex::new(PauseState {
                paused_at: None,
                paused_total: Duration::ZERO,
            }),
        }
    }

    pub fn pause(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.paused_at.is_none() {
            state.paused_at = Some(Instant::now());
        }
    }

    pub fn resume(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(at) = state.paused_at.take() {
            state.paused_total += at.elapsed();
        }
    }

    pub fn is_paused(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .paused_at
            .is_some()
    }
}

impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

impl EmuClock for StdClock {
    fn now(&self) -> EmuInstant {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let host_now = state.paused_at.unwrap_or_else(Instant::now);
        let running = host_now
            .saturating_duration_since(self.origin)
            .saturating_sub(state.paused_total);
        EmuInstant::ZERO + running
    }
}

/// Deterministic clock for tests; time only moves when told to.
#[derive(Debug, Default)]
pub struct FakeClock {
    now_us: AtomicU64,
}

impl FakeClock {
    pub fn new(start: EmuInstant) -> Self {
        Self {
            now_us: AtomicU64::new(start.as_micros()),
        }
    }

    pub fn set(&self, now: EmuInstant) {
        self.now_us.store(now.as_micros(), Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        let next = self.now() + by;
        self.set(next);
    }
}

impl EmuClock for FakeClock {
    fn now(&self) -> EmuInstant {
        EmuInstant::from_micros(self.now_us.load(Ordering::SeqCst))
    }
}
