use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use crate::Reason;
use crate::Strategy;
use crate::ThrottleError;

/// A boolean view over a shared [`Strategy`].
///
/// The throttler keeps no state of its own. Every call is forwarded to the strategy, and
/// clones share the same strategy.
#[derive(Debug)]
pub struct Throttler<S: ?Sized> {
    strategy: Arc<S>,
}

impl<S: ?Sized> Clone for Throttler<S> {
    fn clone(&self) -> Self {
        Self {
            strategy: Arc::clone(&self.strategy),
        }
    }
}

impl<S: Strategy + ?Sized> Throttler<S> {
    pub fn new(strategy: Arc<S>) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> &Arc<S> {
        &self.strategy
    }

    /// Reserves one token, returning `true` if the caller may proceed.
    pub fn can_consume(&self) -> bool {
        !self.should_throttle()
    }

    /// Reserves one token, returning `true` if the caller must wait.
    pub fn should_throttle(&self) -> bool {
        self.strategy.process().is_break()
    }

    /// Reserves `tokens`, returning `true` if the caller must wait.
    pub fn should_throttle_n(&self, tokens: u64) -> Result<bool, ThrottleError> {
        Ok(self.strategy.reserve(tokens)?.is_break())
    }

    /// Reserves one token, returning how long to wait if it was refused.
    pub fn retry_after(&self) -> Option<Duration> {
        wait_of(self.strategy.process())
    }

    /// Reserves `tokens`, returning how long to wait if they were refused.
    pub fn retry_after_n(&self, tokens: u64) -> Result<Option<Duration>, ThrottleError> {
        Ok(wait_of(self.strategy.reserve(tokens)?))
    }

    pub fn current_token_count(&self) -> u64 {
        self.strategy.available()
    }
}

fn wait_of(flow: ControlFlow<Reason>) -> Option<Duration> {
    match flow {
        ControlFlow::Continue(()) => None,
        ControlFlow::Break(Reason::Overloaded { retry_after }) => Some(retry_after),
    }
}
