use std::time::Duration;

use quanta::Clock;

use crate::ThrottleError;
use crate::bucket::BucketState;
use crate::bucket::Refill;
use crate::bucket::TokenBucket;
use crate::bucket::advance_epoch;
use crate::clock::interval_nanos;

/// A token bucket whose capacity decays in steps as each interval runs out.
///
/// Unspent tokens evaporate step by step instead of rolling over into a burst at the
/// interval boundary.
pub type StepDownTokenBucket = TokenBucket<StepDown>;

/// A token bucket whose capacity grows in steps, from a small floor after every refill.
pub type StepUpLeakyTokenBucket = TokenBucket<StepUp>;

/// The staircase shared by the leaky buckets: a refill interval subdivided into steps of
/// `step_tokens` every `step_interval`.
#[derive(Debug, Clone)]
pub struct Steps {
    interval: u64,
    step_tokens: u64,
    step_interval: u64,
}

impl Steps {
    pub fn new(
        refill_interval: Duration,
        step_tokens: u64,
        step_interval: Duration,
    ) -> Result<Self, ThrottleError> {
        Ok(Self {
            interval: interval_nanos("refill_interval", refill_interval)?,
            step_tokens,
            step_interval: interval_nanos("step_interval", step_interval)?,
        })
    }

    pub fn refill_interval(&self) -> Duration {
        Duration::from_nanos(self.interval)
    }

    pub fn step_tokens(&self) -> u64 {
        self.step_tokens
    }

    pub fn step_interval(&self) -> Duration {
        Duration::from_nanos(self.step_interval)
    }

    fn roll_over(&self, state: &mut BucketState, now: u64) -> bool {
        if now < state.next_refill {
            return false;
        }
        state.next_refill = advance_epoch(state.next_refill, now, self.interval);
        true
    }
}

/// Caps the tokens at what the remaining steps of the interval could supply.
///
/// A partial step counts as a whole one. The cap never raises the token count; only the
/// refill at the end of the interval does.
#[derive(Debug, Clone)]
pub struct StepDown(Steps);

impl StepDown {
    pub fn new(steps: Steps) -> Self {
        Self(steps)
    }

    pub fn steps(&self) -> &Steps {
        &self.0
    }
}

impl Refill for StepDown {
    fn refill(&self, state: &mut BucketState, capacity: u64, now: u64) {
        let steps = &self.0;
        if steps.roll_over(state, now) {
            tracing::trace!(now, capacity, "step down bucket refilled");
            state.tokens = capacity;
            return;
        }

        let remaining = state.next_refill - now;
        let mut ceiling = (remaining / steps.step_interval).saturating_mul(steps.step_tokens);
        if remaining % steps.step_interval > 0 {
            ceiling = ceiling.saturating_add(steps.step_tokens);
        }
        if ceiling < state.tokens {
            state.tokens = ceiling;
        }
    }
}

/// Adds `step_tokens` for every whole step since the last evaluation, up to capacity.
///
/// Each evaluation restarts the step clock, so time short of a whole step is discarded
/// rather than carried into the next evaluation.
#[derive(Debug, Clone)]
pub struct StepUp(Steps);

impl StepUp {
    pub fn new(steps: Steps) -> Self {
        Self(steps)
    }

    pub fn steps(&self) -> &Steps {
        &self.0
    }
}

impl Refill for StepUp {
    fn refill(&self, state: &mut BucketState, capacity: u64, now: u64) {
        let steps = &self.0;
        if steps.roll_over(state, now) {
            tracing::trace!(now, floor = steps.step_tokens, "step up bucket refilled");
            state.tokens = steps.step_tokens.min(capacity);
            state.last_activity = now;
            return;
        }

        let elapsed_steps = now.saturating_sub(state.last_activity) / steps.step_interval;
        state.tokens = state
            .tokens
            .saturating_add(elapsed_steps.saturating_mul(steps.step_tokens))
            .min(capacity);
        state.last_activity = now;
    }
}

impl TokenBucket<StepDown> {
    /// Creates a new `StepDownTokenBucket` reading the system clock.
    ///
    /// # Arguments
    ///
    /// * `capacity` - The number of tokens available at the start of each interval.
    /// * `refill_interval` - How often the bucket is refilled.
    /// * `step_tokens` - Tokens lost per step as the interval runs out.
    /// * `step_interval` - The duration of one step.
    pub fn new(
        capacity: u64,
        refill_interval: Duration,
        step_tokens: u64,
        step_interval: Duration,
    ) -> Result<Self, ThrottleError> {
        Self::with_clock(
            capacity,
            refill_interval,
            step_tokens,
            step_interval,
            Clock::new(),
        )
    }

    pub fn with_clock(
        capacity: u64,
        refill_interval: Duration,
        step_tokens: u64,
        step_interval: Duration,
        clock: Clock,
    ) -> Result<Self, ThrottleError> {
        let steps = Steps::new(refill_interval, step_tokens, step_interval)?;
        Self::with_policy(capacity, StepDown::new(steps), clock)
    }
}

impl TokenBucket<StepUp> {
    /// Creates a new `StepUpLeakyTokenBucket` reading the system clock.
    ///
    /// # Arguments
    ///
    /// * `capacity` - The most tokens the bucket can accumulate.
    /// * `refill_interval` - How often the bucket drops back to its floor.
    /// * `step_tokens` - The floor after a refill, and the tokens gained per step.
    /// * `step_interval` - The duration of one step.
    pub fn new(
        capacity: u64,
        refill_interval: Duration,
        step_tokens: u64,
        step_interval: Duration,
    ) -> Result<Self, ThrottleError> {
        Self::with_clock(
            capacity,
            refill_interval,
            step_tokens,
            step_interval,
            Clock::new(),
        )
    }

    pub fn with_clock(
        capacity: u64,
        refill_interval: Duration,
        step_tokens: u64,
        step_interval: Duration,
        clock: Clock,
    ) -> Result<Self, ThrottleError> {
        let steps = Steps::new(refill_interval, step_tokens, step_interval)?;
        Self::with_policy(capacity, StepUp::new(steps), clock)
    }
}
