use chrono::{DateTime, Duration, Utc};

/// Wall-clock abstraction used wherever "now" feeds a computation.
///
/// - now(): current UTC time
/// - days_since(): whole days elapsed since `then`, saturating at 0
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;

    /// Whole days elapsed since `then`; negative spans clamp to 0.
    fn days_since(&self, then: DateTime<Utc>) -> i64 {
        days_between(then, self.now())
    }
}

/// Whole days from `from` to `to`, truncated; 0 when `to` is not later.
#[inline]
pub fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_days().max(0)
}

/// Default clock backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl SystemClock {
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to a fixed instant; can be advanced manually.
#[derive(Debug, Clone)]
pub struct FixedClock {
    at: std::sync::Arc<std::sync::Mutex<DateTime<Utc>>>,
}

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            at: std::sync::Arc::new(std::sync::Mutex::new(at)),
        }
    }

    /// Advance the clock by the given duration.
    pub fn advance(&self, d: Duration) {
        if let Ok(mut at) = self.at.lock() {
            *at += d;
        }
    }

    /// Pin the clock to an absolute instant.
    pub fn set(&self, at: DateTime<Utc>) {
        if let Ok(mut cur) = self.at.lock() {
            *cur = at;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.at.lock().map(|g| *g).unwrap_or_default()
    }
}
