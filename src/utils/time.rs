use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Source of wall-clock time for evaluation, expiry and persistence timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Real UTC clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Used to drive time conditions and
/// expiry deterministically.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: ChronoDuration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        // 2024-01-01T12:00:00Z, fixed so tests are reproducible
        Self::new(
            Utc.timestamp_opt(1_704_110_400, 0)
                .single()
                .unwrap_or_else(Utc::now),
        )
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Shortest period a repeating timer may use.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// `tokio::time::interval` that tolerates a zero period instead of panicking.
pub fn periodic(period: Duration) -> tokio::time::Interval {
    tokio::time::interval(period.max(MIN_PERIOD))
}

/// Timer for measuring operation latency
pub struct LatencyTimer {
    start: Instant,
}

impl LatencyTimer {
    /// Start a new timer
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Stop the timer and return elapsed duration
    pub fn stop(self) -> Duration {
        self.start.elapsed()
    }

    /// Get elapsed time without stopping the timer
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[tokio::test]
    async fn test_periodic_accepts_zero() {
        let mut ticker = periodic(Duration::ZERO);
        assert_eq!(ticker.period(), MIN_PERIOD);
        ticker.tick().await;
        ticker.tick().await;
    }

    #[test]
    fn test_latency_timer() {
        let timer = LatencyTimer::start();
        thread::sleep(Duration::from_millis(1));
        let elapsed = timer.stop();

        assert!(elapsed >= Duration::from_millis(1));
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::default();
        let start = clock.now();

        clock.advance(ChronoDuration::minutes(30));
        assert_eq!(clock.now() - start, ChronoDuration::minutes(30));

        clock.set(start);
        assert_eq!(clock.now(), start);
    }

    #[test]
    fn test_system_clock_moves_forward() {
        let t1 = SystemClock.now();
        thread::sleep(Duration::from_millis(1));
        assert!(SystemClock.now() > t1);
    }
}
