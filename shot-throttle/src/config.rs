use std::sync::Arc;
use std::time::Duration;

use quanta::Clock;
use serde::Deserialize;
use serde::Deserializer;

use crate::FixedTokenBucket;
use crate::RollingWindowThrottler;
use crate::StepDownTokenBucket;
use crate::StepUpLeakyTokenBucket;
use crate::Strategy;
use crate::ThrottleError;

/// Construction parameters for any of the strategies, as read from configuration.
///
/// Durations are human readable, e.g. `"10s"` or `"1m 30s"`.
///
/// ```rust
/// use shot_throttle::Strategy;
/// use shot_throttle::StrategyConfig;
///
/// let config: StrategyConfig = serde_json::from_str(
///     r#"{ "kind": "rolling_window", "occurrences": 5, "time_unit": "1s" }"#,
/// )
/// .unwrap();
/// let strategy = config.build_default().unwrap();
/// assert_eq!(strategy.available(), 5);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyConfig {
    Fixed {
        capacity: u64,
        #[serde(deserialize_with = "human_duration")]
        refill_interval: Duration,
    },
    StepDown {
        capacity: u64,
        #[serde(deserialize_with = "human_duration")]
        refill_interval: Duration,
        step_tokens: u64,
        #[serde(deserialize_with = "human_duration")]
        step_interval: Duration,
    },
    StepUp {
        capacity: u64,
        #[serde(deserialize_with = "human_duration")]
        refill_interval: Duration,
        step_tokens: u64,
        #[serde(deserialize_with = "human_duration")]
        step_interval: Duration,
    },
    RollingWindow {
        occurrences: u64,
        #[serde(deserialize_with = "human_duration")]
        time_unit: Duration,
    },
}

impl StrategyConfig {
    /// Builds the configured strategy, reading time from `clock`.
    ///
    /// # Errors
    ///
    /// Returns [`ThrottleError::InvalidArgument`] if a parameter is out of range.
    pub fn build(&self, clock: Clock) -> Result<Arc<dyn Strategy + Send + Sync>, ThrottleError> {
        let strategy: Arc<dyn Strategy + Send + Sync> = match *self {
            Self::Fixed {
                capacity,
                refill_interval,
            } => Arc::new(FixedTokenBucket::with_clock(capacity, refill_interval, clock)?),
            Self::StepDown {
                capacity,
                refill_interval,
                step_tokens,
                step_interval,
            } => Arc::new(StepDownTokenBucket::with_clock(
                capacity,
                refill_interval,
                step_tokens,
                step_interval,
                clock,
            )?),
            Self::StepUp {
                capacity,
                refill_interval,
                step_tokens,
                step_interval,
            } => Arc::new(StepUpLeakyTokenBucket::with_clock(
                capacity,
                refill_interval,
                step_tokens,
                step_interval,
                clock,
            )?),
            Self::RollingWindow {
                occurrences,
                time_unit,
            } => Arc::new(RollingWindowThrottler::with_clock(occurrences, time_unit, clock)?),
        };
        Ok(strategy)
    }

    /// Builds the configured strategy against the system clock.
    pub fn build_default(&self) -> Result<Arc<dyn Strategy + Send + Sync>, ThrottleError> {
        self.build(Clock::new())
    }
}

fn human_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
}
