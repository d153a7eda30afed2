use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Clock
///
/// Source of "now" for every time-dependent decision (registration window,
/// cancellation cut-off, registration date). Injected through `AppState` so the
/// eligibility rules can be exercised at fixed instants.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub type ClockState = Arc<dyn Clock>;

/// Wall-clock time. Used in production.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock pinned to one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
