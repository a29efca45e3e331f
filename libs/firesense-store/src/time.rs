//! Clock abstraction
//!
//! Separates wall-clock and monotonic time acquisition from the rule engine
//! so schedules, `delay()` statements and calendar conditions can be driven
//! deterministically in tests.

use parking_lot::Mutex;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Time source used by the rule engine and stores
pub trait Clock: Send + Sync + 'static {
    /// Seconds since Unix epoch (UTC)
    fn now_epoch_seconds(&self) -> i64;

    /// Monotonic milliseconds since an arbitrary origin
    fn monotonic_millis(&self) -> u64;

    /// Monotonic microseconds since the same origin
    fn monotonic_micros(&self) -> u64;
}

/// System clock: `SystemTime` for epoch, `Instant` for monotonic readings
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_epoch_seconds(&self) -> i64 {
        // A clock before 1970 reads as epoch rather than failing
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }

    fn monotonic_millis(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn monotonic_micros(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }
}

/// Manually driven clock for tests and simulation
///
/// Epoch and monotonic time advance together through `advance_millis`.
#[derive(Debug)]
pub struct ManualClock {
    state: Mutex<ManualState>,
}

#[derive(Debug, Clone, Copy)]
struct ManualState {
    epoch_millis: i64,
    monotonic_micros: u64,
}

impl ManualClock {
    /// Start at `epoch_seconds` with monotonic time at zero
    pub fn new(epoch_seconds: i64) -> Self {
        Self {
            state: Mutex::new(ManualState {
                epoch_millis: epoch_seconds * 1000,
                monotonic_micros: 0,
            }),
        }
    }

    pub fn advance_millis(&self, ms: u64) {
        let mut state = self.state.lock();
        state.epoch_millis += ms as i64;
        state.monotonic_micros += ms * 1000;
    }

    /// Jump the wall clock without touching monotonic time
    pub fn set_epoch_seconds(&self, epoch_seconds: i64) {
        self.state.lock().epoch_millis = epoch_seconds * 1000;
    }
}

impl Clock for ManualClock {
    fn now_epoch_seconds(&self) -> i64 {
        self.state.lock().epoch_millis.div_euclid(1000)
    }

    fn monotonic_millis(&self) -> u64 {
        self.state.lock().monotonic_micros / 1000
    }

    fn monotonic_micros(&self) -> u64 {
        self.state.lock().monotonic_micros
    }
}
