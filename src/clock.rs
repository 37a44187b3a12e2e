//! Clock abstraction for deterministic testing.
//!
//! The pipeline schedules calibration dwell deadlines in monotonic
//! milliseconds. Production code uses `SystemClock`; tests use `TestClock`
//! with manual time advancement so dwell windows close without real waits.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Trait abstracting a monotonic millisecond time source.
pub trait Clock: Send + Sync {
    /// Milliseconds elapsed since the clock was created.
    fn now_ms(&self) -> i64;
}

/// Production clock measuring real elapsed time from process start.
#[derive(Debug)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        self.start.elapsed().as_millis() as i64
    }
}

/// Test clock with manually controlled time.
pub struct TestClock {
    ms: Mutex<i64>,
}

impl TestClock {
    /// Create a test clock starting at zero.
    pub fn new() -> Self {
        Self { ms: Mutex::new(0) }
    }

    /// Advance time by the given duration.
    pub fn advance(&self, duration: Duration) {
        let mut ms = self.ms.lock().unwrap();
        *ms += duration.as_millis() as i64;
    }

    /// Advance time by whole milliseconds.
    pub fn advance_ms(&self, delta: i64) {
        let mut ms = self.ms.lock().unwrap();
        *ms += delta;
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TestClock {
    fn now_ms(&self) -> i64 {
        *self.ms.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_system_clock_monotonic() {
        let clock = SystemClock::new();
        let t0 = clock.now_ms();
        let t1 = clock.now_ms();
        assert!(t1 >= t0);
    }

    #[test]
    fn test_test_clock_advance() {
        let clock = TestClock::new();
        assert_eq!(clock.now_ms(), 0);
        clock.advance(Duration::from_millis(1500));
        assert_eq!(clock.now_ms(), 1500);
        clock.advance_ms(30);
        assert_eq!(clock.now_ms(), 1530);
    }

    #[test]
    fn test_clock_trait_object() {
        let clock: Arc<dyn Clock> = Arc::new(TestClock::new());
        assert_eq!(clock.now_ms(), 0);
    }
}
