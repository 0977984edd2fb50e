use std::time::Duration;

use quanta::Clock;
use quanta::Instant;

use crate::ThrottleError;

/// Clock readings as nanoseconds since a fixed anchor.
///
/// The anchor is captured at construction, so the first reading of a fresh timeline is 0.
#[derive(Debug, Clone)]
pub(crate) struct Timeline {
    clock: Clock,
    anchor: Instant,
}

impl Timeline {
    pub(crate) fn new(clock: Clock) -> Self {
        let anchor = clock.now();
        Self { clock, anchor }
    }

    #[inline]
    pub(crate) fn now(&self) -> u64 {
        self.clock.now().duration_since(self.anchor).as_nanos() as u64
    }
}

/// Converts a configured interval to nanoseconds, rejecting zero and anything past `u64`.
pub(crate) fn interval_nanos(name: &'static str, interval: Duration) -> Result<u64, ThrottleError> {
    let nanos = u64::try_from(interval.as_nanos())
        .map_err(|_| ThrottleError::invalid(name, "must be shorter than 2^64 nanoseconds"))?;
    if nanos == 0 {
        return Err(ThrottleError::invalid(name, "must be a positive duration"));
    }
    Ok(nanos)
}
