use std::time::Duration;

use quanta::Clock;

use crate::ThrottleError;
use crate::bucket::BucketState;
use crate::bucket::Refill;
use crate::bucket::TokenBucket;
use crate::clock::interval_nanos;

/// A token bucket that refills to full capacity once per fixed interval.
///
/// This is the simplest policy, and it permits "boundary bursts": one token spent just
/// before a refill, then `capacity` more immediately after.
pub type FixedTokenBucket = TokenBucket<FixedRefill>;

/// Resets the bucket to capacity when the current interval has ended.
///
/// The next interval starts at the moment of that evaluation, not at the previous boundary.
#[derive(Debug, Clone)]
pub struct FixedRefill {
    interval: u64,
}

impl FixedRefill {
    pub fn new(refill_interval: Duration) -> Result<Self, ThrottleError> {
        Ok(Self {
            interval: interval_nanos("refill_interval", refill_interval)?,
        })
    }

    pub fn refill_interval(&self) -> Duration {
        Duration::from_nanos(self.interval)
    }
}

impl Refill for FixedRefill {
    #[inline]
    fn refill(&self, state: &mut BucketState, capacity: u64, now: u64) {
        if now < state.next_refill {
            return;
        }
        tracing::trace!(now, capacity, "fixed token bucket refilled");
        state.tokens = capacity;
        state.next_refill = now.saturating_add(self.interval);
    }
}

impl TokenBucket<FixedRefill> {
    /// Creates a new `FixedTokenBucket` reading the system clock.
    ///
    /// # Arguments
    ///
    /// * `capacity` - The number of tokens available at the start of each interval.
    /// * `refill_interval` - How often the bucket is refilled.
    pub fn new(capacity: u64, refill_interval: Duration) -> Result<Self, ThrottleError> {
        Self::with_clock(capacity, refill_interval, Clock::new())
    }

    pub fn with_clock(
        capacity: u64,
        refill_interval: Duration,
        clock: Clock,
    ) -> Result<Self, ThrottleError> {
        Self::with_policy(capacity, FixedRefill::new(refill_interval)?, clock)
    }
}

#[cfg(test)]
mod tests {
    use std::ops::ControlFlow;
    use std::sync::Arc;

    use super::*;
    use crate::Reason;
    use crate::Strategy;

    const MAX_TOKENS: u64 = 10;
    const REFILL_INTERVAL: Duration = Duration::from_secs(10);
    const N_LESS_THAN_MAX: u64 = 2;
    const N_GREATER_THAN_MAX: u64 = 12;
    const CUMULATIVE: u64 = 2;

    fn mocked() -> (FixedTokenBucket, Arc<quanta::Mock>) {
        let (clock, mock) = Clock::mock();
        let bucket = FixedTokenBucket::with_clock(MAX_TOKENS, REFILL_INTERVAL, clock).unwrap();
        (bucket, mock)
    }

    fn denied(retry_after: Duration) -> Result<ControlFlow<Reason>, ThrottleError> {
        Ok(ControlFlow::Break(Reason::Overloaded { retry_after }))
    }

    #[test]
    fn it_validates_construction() {
        assert!(FixedTokenBucket::new(0, REFILL_INTERVAL).is_err());
        assert!(FixedTokenBucket::new(MAX_TOKENS, Duration::ZERO).is_err());

        let too_long = Duration::from_nanos(u64::MAX) + Duration::from_nanos(6);
        assert!(FixedTokenBucket::new(MAX_TOKENS, too_long).is_err());

        let bucket = FixedTokenBucket::new(MAX_TOKENS, REFILL_INTERVAL).unwrap();
        assert_eq!(bucket.capacity(), MAX_TOKENS);
        assert_eq!(bucket.policy().refill_interval(), REFILL_INTERVAL);
    }

    #[test]
    fn it_grants_less_than_capacity() {
        let (bucket, _mock) = mocked();

        assert_eq!(bucket.reserve(N_LESS_THAN_MAX), Ok(ControlFlow::Continue(())));
        assert_eq!(bucket.available(), MAX_TOKENS - N_LESS_THAN_MAX);
    }

    #[test]
    fn it_denies_more_than_capacity_without_consuming() {
        let (bucket, _mock) = mocked();

        assert_eq!(bucket.reserve(N_GREATER_THAN_MAX), denied(REFILL_INTERVAL));
        assert_eq!(bucket.available(), MAX_TOKENS);
    }

    #[test]
    fn it_accumulates_reservations() {
        let (bucket, _mock) = mocked();

        for _ in 0..CUMULATIVE {
            assert_eq!(bucket.reserve(N_LESS_THAN_MAX), Ok(ControlFlow::Continue(())));
        }
        assert_eq!(bucket.available(), MAX_TOKENS - CUMULATIVE * N_LESS_THAN_MAX);

        for _ in 0..CUMULATIVE {
            assert!(bucket.reserve(N_GREATER_THAN_MAX).unwrap().is_break());
        }
        assert_eq!(bucket.available(), MAX_TOKENS - CUMULATIVE * N_LESS_THAN_MAX);
    }

    #[test]
    fn it_refills_after_the_interval() {
        let (bucket, mock) = mocked();

        // Example walk-through: grant, deny, then refill.
        assert_eq!(bucket.reserve(N_LESS_THAN_MAX), Ok(ControlFlow::Continue(())));
        assert_eq!(bucket.available(), 8);
        assert_eq!(bucket.reserve(N_GREATER_THAN_MAX), denied(REFILL_INTERVAL));
        assert_eq!(bucket.available(), 8);

        mock.increment(REFILL_INTERVAL);

        assert_eq!(bucket.reserve(N_LESS_THAN_MAX), Ok(ControlFlow::Continue(())));
        assert_eq!(bucket.available(), MAX_TOKENS - N_LESS_THAN_MAX);
    }

    #[test]
    fn it_keeps_denying_oversized_requests_across_intervals() {
        let (bucket, mock) = mocked();

        assert_eq!(bucket.reserve(N_GREATER_THAN_MAX), denied(REFILL_INTERVAL));
        assert_eq!(bucket.available(), MAX_TOKENS);

        mock.increment(REFILL_INTERVAL + Duration::from_secs(1));

        // The refill happens on this call, so a whole interval remains
        assert_eq!(bucket.reserve(N_GREATER_THAN_MAX), denied(REFILL_INTERVAL));
        assert_eq!(bucket.available(), MAX_TOKENS);
    }

    #[test]
    fn it_calculates_wait_dynamically() {
        let (bucket, mock) = mocked();

        for i in 0..3 {
            assert_eq!(
                bucket.reserve(N_GREATER_THAN_MAX),
                denied(Duration::from_secs(10 - i * 3))
            );
            mock.increment(Duration::from_secs(3));
        }
    }

    #[test]
    fn it_exhausts_then_recovers() {
        let (bucket, mock) = mocked();

        for _ in 0..3 * CUMULATIVE {
            let _ = bucket.reserve(N_LESS_THAN_MAX);
        }
        assert!(bucket.reserve(N_LESS_THAN_MAX).unwrap().is_break());
        more_asserts::assert_lt!(bucket.available(), N_LESS_THAN_MAX);

        mock.increment(REFILL_INTERVAL);

        for _ in 0..CUMULATIVE {
            assert!(bucket.reserve(N_LESS_THAN_MAX).unwrap().is_continue());
        }
        assert_eq!(bucket.available(), MAX_TOKENS - CUMULATIVE * N_LESS_THAN_MAX);
    }

    #[test]
    fn it_permits_a_boundary_burst() {
        let (bucket, mock) = mocked();

        assert!(bucket.process().is_continue());
        mock.increment(REFILL_INTERVAL - Duration::from_nanos(1));
        assert_eq!(bucket.reserve(MAX_TOKENS - 1), Ok(ControlFlow::Continue(())));

        mock.increment(Duration::from_nanos(1));
        assert_eq!(bucket.reserve(MAX_TOKENS), Ok(ControlFlow::Continue(())));
    }

    #[test]
    fn test_concurrent_reservations() {
        use std::thread;

        let (bucket, _mock) = mocked();
        let bucket = Arc::new(bucket);

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let bucket = Arc::clone(&bucket);
                thread::spawn(move || bucket.reserve(N_LESS_THAN_MAX).unwrap())
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap().is_continue());
        }
        assert_eq!(bucket.available(), MAX_TOKENS - 2 * N_LESS_THAN_MAX);
    }

    #[test]
    fn test_concurrent_oversized_reservations() {
        use std::thread;

        let (bucket, _mock) = mocked();
        let bucket = Arc::new(bucket);
        assert!(bucket.reserve(N_GREATER_THAN_MAX).unwrap().is_break());

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let bucket = Arc::clone(&bucket);
                thread::spawn(move || bucket.reserve(N_GREATER_THAN_MAX).unwrap())
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap().is_break());
        }
        assert_eq!(bucket.available(), MAX_TOKENS);
    }

    #[tokio::test]
    async fn test_actual_concurrency() {
        let capacity = 100;
        let (clock, _mock) = Clock::mock();
        let rl = Arc::new(
            FixedTokenBucket::with_clock(capacity, Duration::from_secs(1), clock).unwrap(),
        );

        let mut handles = vec![];

        // 1 + 2 + ... + 13 = 91 tokens, within capacity
        for n in 1..=13u64 {
            let rl_clone = Arc::clone(&rl);
            handles.push(tokio::spawn(async move { rl_clone.reserve(n) }));
        }

        let results = futures::future::join_all(handles).await;
        let success_count = results
            .into_iter()
            .filter(|r| matches!(r, Ok(Ok(ControlFlow::Continue(())))))
            .count();

        assert_eq!(success_count, 13);
        assert_eq!(rl.available(), capacity - 91);
    }
}
