//! Clock collaborator: supplies timestamps for transactions and audit entries.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Deterministic clock for tests and replays.
///
/// Returns the configured instant, optionally advancing by a fixed step after
/// every read so consecutive records stay strictly ordered.
#[derive(Debug)]
pub struct FixedClock {
    current: Mutex<DateTime<Utc>>,
    step: Duration,
}

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            current: Mutex::new(at),
            step: Duration::zero(),
        }
    }

    pub fn ticking(at: DateTime<Utc>, step: Duration) -> Self {
        Self {
            current: Mutex::new(at),
            step,
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        if let Ok(mut current) = self.current.lock() {
            *current = at;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.current.lock() {
            Ok(mut current) => {
                let now = *current;
                *current = now + self.step;
                now
            }
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

impl<C> Clock for std::sync::Arc<C>
where
    C: Clock + ?Sized,
{
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}
