use std::fmt::Debug;
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

/// Mutable state of a token bucket. Only ever touched under the bucket's lock.
///
/// All instants are nanoseconds since the bucket was constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketState {
    /// Currently spendable tokens.
    pub tokens: u64,
    /// End of the current epoch.
    pub next_refill: u64,
    /// Instant of the last evaluation. Only the step-up policy uses this.
    pub last_activity: u64,
}

/// A refill policy: brings a bucket's state up to date for `now`.
///
/// The policy is invoked under the bucket's lock before every inspection or debit. It must
/// leave `state.next_refill > now`, so the wait reported to a denied caller is positive.
pub trait Refill: Debug {
    fn refill(&self, state: &mut BucketState, capacity: u64, now: u64);
}

/// The admission engine shared by every token bucket flavour.
///
/// Locking and reservation logic live here. The flavours differ only in their [`Refill`]
/// policy.
#[derive(Debug)]
pub struct TokenBucket<P> {
    capacity: u64,
    policy: P,
    state: Mutex<BucketState>,
    timeline: Timeline,
}

impl<P: Refill> TokenBucket<P> {
    /// Creates a bucket driven by an arbitrary refill policy.
    ///
    /// The bucket starts with an already expired epoch, so the first evaluation rolls it over.
    pub fn with_policy(capacity: u64, policy: P, clock: Clock) -> Result<Self, ThrottleError> {
        if capacity == 0 {
            return Err(ThrottleError::invalid("capacity", "must be a positive integer"));
        }
        tracing::debug!(capacity, ?policy, "creating token bucket");
        Ok(Self {
            capacity,
            policy,
            state: Mutex::new(BucketState {
                tokens: capacity,
                next_refill: 0,
                last_activity: 0,
            }),
            timeline: Timeline::new(clock),
        })
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    // Every mutation is a single critical section, so a poisoned state is still consistent.
    fn lock(&self) -> MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn refill(&self, state: &mut BucketState, now: u64) {
        self.policy.refill(state, self.capacity, now);
        if now >= state.next_refill {
            // A policy broke its contract. Re-run it once rather than report a negative wait.
            self.policy.refill(state, self.capacity, now);
        }
    }
}

impl<P: Refill> Strategy for TokenBucket<P> {
    fn acquire(&self, tokens: NonZeroU64) -> ControlFlow<Reason> {
        let tokens = tokens.get();
        let mut state = self.lock();
        let now = self.timeline.now();
        self.refill(&mut state, now);

        if state.tokens >= tokens {
            state.tokens -= tokens;
            ControlFlow::Continue(())
        } else {
            let retry_after = Duration::from_nanos(state.next_refill.saturating_sub(now));
            tracing::debug!(
                requested = tokens,
                available = state.tokens,
                ?retry_after,
                "token bucket denied reservation"
            );
            ControlFlow::Break(Reason::Overloaded { retry_after })
        }
    }

    fn available(&self) -> u64 {
        let mut state = self.lock();
        let now = self.timeline.now();
        self.refill(&mut state, now);
        state.tokens
    }
}

/// Moves an expired epoch forward by whole intervals, so it ends strictly after `now`.
pub(crate) fn advance_epoch(next_refill: u64, now: u64, interval: u64) -> u64 {
    let missed = now.saturating_sub(next_refill) / interval + 1;
    next_refill.saturating_add(missed.saturating_mul(interval))
}
