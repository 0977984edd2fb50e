use std::collections::VecDeque;
use std::iter;
use std::num::NonZeroU64;
use std::ops::ControlFlow;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::time::Duration;

use quanta::Clock;

use crate::Reason;
use crate::Strategy;
use crate::ThrottleError;
use crate::clock::Timeline;
use crate::clock::interval_nanos;

const NANOS_PER_MILLI: u64 = 1_000_000;

/// Every outstanding token holds a queue slot, so the quota is bounded.
const MAX_OCCURRENCES: u64 = u32::MAX as u64;

/// A Rolling Window implementation.
///
/// Every granted token is remembered with its expiry (`now + time_unit`) in a FIFO, and only
/// returns to the pool once that expiry has passed. No trailing window of `time_unit` ever
/// sees more than `occurrences` reservations, so there is no boundary burst.
#[derive(Debug)]
pub struct RollingWindowThrottler {
    occurrences: u64,
    time_unit: u64,
    state: Mutex<WindowState>,
    timeline: Timeline,
}

#[derive(Debug)]
struct WindowState {
    remaining: u64,
    /// Expiry instants, oldest first. Since `time_unit` is constant this is also ascending.
    expiries: VecDeque<u64>,
    /// The front expiry, or `None` when nothing is outstanding.
    next_check: Option<u64>,
}

impl WindowState {
    /// Returns every expired reservation to the pool.
    ///
    /// Nothing can have expired before `next_check`, so most calls return without looking at
    /// the queue.
    fn reconcile(&mut self, now: u64) {
        match self.next_check {
            Some(next_check) if now >= next_check => {}
            _ => return,
        }

        let before = self.remaining;
        while let Some(&expiry) = self.expiries.front() {
            if expiry > now {
                break;
            }
            self.expiries.pop_front();
            self.remaining += 1;
        }
        self.next_check = self.expiries.front().copied();
        tracing::trace!(
            now,
            released = self.remaining - before,
            outstanding = self.expiries.len(),
            "rolling window released expired reservations"
        );
    }

    /// Grows the queue for `tokens` more entries. Nothing is debited unless this succeeds.
    fn try_make_room(&mut self, tokens: u64) -> bool {
        let Ok(additional) = usize::try_from(tokens) else {
            return false;
        };
        match self.expiries.try_reserve(additional) {
            Ok(()) => true,
            Err(err) => {
                tracing::debug!(tokens, %err, "rolling window could not grow its queue");
                false
            }
        }
    }
}

impl RollingWindowThrottler {
    /// Creates a new `RollingWindowThrottler` reading the system clock.
    ///
    /// # Arguments
    ///
    /// * `occurrences` - The most reservations allowed in any window of `time_unit`.
    /// * `time_unit` - The length of the rolling window.
    pub fn new(occurrences: u64, time_unit: Duration) -> Result<Self, ThrottleError> {
        Self::with_clock(occurrences, time_unit, Clock::new())
    }

    pub fn with_clock(
        occurrences: u64,
        time_unit: Duration,
        clock: Clock,
    ) -> Result<Self, ThrottleError> {
        if occurrences == 0 {
            return Err(ThrottleError::invalid("occurrences", "must be a positive integer"));
        }
        if occurrences > MAX_OCCURRENCES {
            return Err(ThrottleError::invalid("occurrences", "must fit in 32 bits"));
        }
        let time_unit = interval_nanos("time_unit", time_unit)?;
        tracing::debug!(occurrences, time_unit, "creating rolling window throttler");

        Ok(Self {
            occurrences,
            time_unit,
            state: Mutex::new(WindowState {
                remaining: occurrences,
                expiries: VecDeque::with_capacity(occurrences.min(4096) as usize),
                next_check: None,
            }),
            timeline: Timeline::new(clock),
        })
    }

    /// The most reservations allowed per time unit.
    pub fn occurrences(&self) -> u64 {
        self.occurrences
    }

    /// The length of the rolling window.
    pub fn time_unit(&self) -> Duration {
        Duration::from_nanos(self.time_unit)
    }

    // Every mutation is a single critical section, so a poisoned state is still consistent.
    fn lock(&self) -> MutexGuard<'_, WindowState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn outstanding(&self) -> usize {
        self.lock().expiries.len()
    }
}

impl Strategy for RollingWindowThrottler {
    fn acquire(&self, tokens: NonZeroU64) -> ControlFlow<Reason> {
        let tokens = tokens.get();
        let mut state = self.lock();
        let now = self.timeline.now();
        state.reconcile(now);

        if state.remaining >= tokens && state.try_make_room(tokens) {
            state.remaining -= tokens;
            let expiry = now.saturating_add(self.time_unit);
            state.expiries.extend(iter::repeat_n(expiry, tokens as usize));
            if state.next_check.is_none() {
                state.next_check = Some(expiry);
            }
            return ControlFlow::Continue(());
        }

        // Only the next single expiry is known, so this may understate the wait for `tokens > 1`
        let wait = match state.next_check {
            Some(next_check) => next_check.saturating_sub(now),
            None => self.time_unit,
        };
        let retry_after = Duration::from_millis(wait / NANOS_PER_MILLI);
        tracing::debug!(
            requested = tokens,
            available = state.remaining,
            ?retry_after,
            "rolling window denied reservation"
        );
        ControlFlow::Break(Reason::Overloaded { retry_after })
    }

    fn available(&self) -> u64 {
        let mut state = self.lock();
        let now = self.timeline.now();
        state.reconcile(now);
        state.remaining
    }
}
