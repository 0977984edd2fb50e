//! # shot-throttle
//!
//! `shot-throttle` provides in-process admission control: given a request for `n` units of
//! capacity, a strategy decides whether the request may proceed now or must wait, and for how
//! long.
//!
//! ## Strategies
//!
//! * [`FixedTokenBucket`]: full capacity once per refill interval.
//! * [`StepDownTokenBucket`]: capacity decays in steps towards the end of each interval, so
//!   unspent tokens cannot pile up into a boundary burst.
//! * [`StepUpLeakyTokenBucket`]: capacity ramps up in steps from a small floor after every
//!   refill.
//! * [`RollingWindowThrottler`]: no more than `occurrences` reservations in any trailing
//!   window of `time_unit`.
//!
//! ## Key Concepts
//!
//! * **Per-instance locking**: every strategy serializes its own callers through a single
//!   `Mutex`. Unrelated instances never contend.
//! * **Lazy Evaluation**: state is reconciled against the clock at the moment of the request.
//!   There are no background threads or timers.
//! * **Injectable Clock**: every strategy reads time through a [`quanta::Clock`], so tests can
//!   substitute [`Clock::mock`].
//! * **No sleeping**: a denied request carries a `retry_after` hint. Waiting and retrying is
//!   up to the caller.
//!
//! ## Example
//!
//! ```rust
//! use shot_throttle::FixedTokenBucket;
//! use shot_throttle::Strategy;
//! use std::time::Duration;
//!
//! let bucket = FixedTokenBucket::new(100, Duration::from_secs(60)).unwrap();
//!
//! if bucket.process().is_continue() {
//!     // Request allowed
//! }
//! assert_eq!(bucket.available(), 99);
//! ```

use std::fmt::Debug;
use std::num::NonZeroU64;
use std::ops::ControlFlow;
use std::time::Duration;

mod bucket;
mod clock;
mod config;
mod error;
mod fixed_bucket;
mod leaky_bucket;
mod rolling_window;
mod throttler;

pub use bucket::BucketState;
pub use bucket::Refill;
pub use bucket::TokenBucket;
pub use config::StrategyConfig;
pub use error::ThrottleError;
pub use fixed_bucket::FixedRefill;
pub use fixed_bucket::FixedTokenBucket;
pub use leaky_bucket::StepDown;
pub use leaky_bucket::StepDownTokenBucket;
pub use leaky_bucket::StepUp;
pub use leaky_bucket::StepUpLeakyTokenBucket;
pub use leaky_bucket::Steps;
pub use quanta::Clock;
pub use quanta::Mock;
pub use rolling_window::RollingWindowThrottler;
pub use throttler::Throttler;

/// Reasons why a request might be rejected by a strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reason {
    Overloaded { retry_after: Duration },
}

/// The core trait for all admission strategies.
///
/// Every strategy in this crate is `Send` and `Sync`. Implementations must be too if they are
/// to be shared across threads via `Arc`.
pub trait Strategy: Debug {
    /// Attempts to reserve `tokens` units of capacity.
    ///
    /// On success the tokens are debited and `ControlFlow::Continue` is returned. Otherwise
    /// nothing is consumed and the returned `Reason` carries a suggested wait.
    fn acquire(&self, tokens: NonZeroU64) -> ControlFlow<Reason>;

    /// Returns the tokens currently available, after reconciling against the clock.
    fn available(&self) -> u64;

    /// Attempts to reserve `tokens` units of capacity.
    ///
    /// # Errors
    ///
    /// Returns [`ThrottleError::InvalidArgument`] if `tokens` is zero. State is left untouched.
    fn reserve(&self, tokens: u64) -> Result<ControlFlow<Reason>, ThrottleError> {
        let tokens = NonZeroU64::new(tokens).ok_or(ThrottleError::InvalidArgument {
            name: "tokens",
            reason: "must be a positive integer",
        })?;
        Ok(self.acquire(tokens))
    }

    /// Attempts to reserve a single token.
    fn process(&self) -> ControlFlow<Reason> {
        self.acquire(NonZeroU64::MIN)
    }
}
