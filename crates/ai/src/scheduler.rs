//! Call pacing for the external generation endpoint.
//!
//! The scheduler does not sleep. It answers "how long must the caller wait
//! before this call", given the current instant, and records the reservation.
//! Callers own the clock, which keeps this module deterministic under test.

use std::num::NonZeroU32;
use std::time::{Duration, Instant};

use governor::clock::{Clock, FakeRelativeClock};
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

/// Declared pacing policy.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum ThrottlePolicy {
    /// No pacing.
    Unthrottled,
    /// At least this much time between the starts of consecutive calls.
    MinInterval(Duration),
    /// Token bucket refilled at `per_minute / 60` tokens per second, holding at
    /// most `burst` tokens.
    TokenBucket { per_minute: u32, burst: u32 },
}

impl ThrottlePolicy {
    pub fn min_interval_ms(ms: u64) -> Self {
        if ms == 0 {
            ThrottlePolicy::Unthrottled
        } else {
            ThrottlePolicy::MinInterval(Duration::from_millis(ms))
        }
    }
}

impl Default for ThrottlePolicy {
    /// 1.2s between calls.
    fn default() -> Self {
        ThrottlePolicy::MinInterval(Duration::from_millis(1200))
    }
}

type BucketLimiter = RateLimiter<
    NotKeyed,
    InMemoryState,
    FakeRelativeClock,
    NoOpMiddleware<<FakeRelativeClock as Clock>::Instant>,
>;

/// GCRA limiter driven by the caller's instants instead of the wall clock.
///
/// The limiter's clock counts time since the first reservation. It only moves
/// forward, so after a delayed reservation it runs ahead of the caller.
struct Bucket {
    limiter: BucketLimiter,
    clock: FakeRelativeClock,
    origin: Option<Instant>,
    clock_at: Duration,
}

impl Bucket {
    fn new(per_minute: NonZeroU32, burst: NonZeroU32) -> Self {
        let clock = FakeRelativeClock::default();
        let limiter = RateLimiter::direct_with_clock(Quota::per_minute(per_minute).allow_burst(burst), &clock);
        Self {
            limiter,
            clock,
            origin: None,
            clock_at: Duration::ZERO,
        }
    }

    fn advance(&mut self, by: Duration) {
        self.clock.advance(by);
        self.clock_at = self.clock_at.saturating_add(by);
    }

    fn reserve(&mut self, now: Instant) -> Duration {
        let origin = *self.origin.get_or_insert(now);
        let elapsed = now.saturating_duration_since(origin);
        if elapsed > self.clock_at {
            self.advance(elapsed - self.clock_at);
        }

        // Time the caller is behind earlier reservations.
        let mut delay = self.clock_at.saturating_sub(elapsed);
        loop {
            match self.limiter.check() {
                Ok(()) => return delay,
                Err(not_until) => {
                    let wait = not_until
                        .wait_time_from(self.clock.now())
                        .max(Duration::from_nanos(1));
                    self.advance(wait);
                    delay = delay.saturating_add(wait);
                }
            }
        }
    }
}

enum State {
    Unthrottled,
    MinInterval {
        interval: Duration,
        last: Option<Instant>,
    },
    Bucket(Box<Bucket>),
}

/// Stateful pacing for a single endpoint.
pub struct Throttle {
    policy: ThrottlePolicy,
    state: State,
}

impl std::fmt::Debug for Throttle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Throttle").field("policy", &self.policy).finish_non_exhaustive()
    }
}

impl Throttle {
    pub fn new(policy: ThrottlePolicy) -> Self {
        let state = match policy {
            ThrottlePolicy::Unthrottled => State::Unthrottled,
            ThrottlePolicy::MinInterval(interval) if interval.is_zero() => State::Unthrottled,
            ThrottlePolicy::MinInterval(interval) => State::MinInterval { interval, last: None },
            ThrottlePolicy::TokenBucket { per_minute, burst } => match NonZeroU32::new(per_minute) {
                Some(per_minute) => {
                    let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);
                    State::Bucket(Box::new(Bucket::new(per_minute, burst)))
                }
                None => State::Unthrottled,
            },
        };
        Self { policy, state }
    }

    pub fn policy(&self) -> ThrottlePolicy {
        self.policy
    }

    /// Reserve a slot for a call wanting to start at `now`.
    ///
    /// Returns the delay the caller must wait before starting. The reservation
    /// is recorded immediately, so back-to-back calls queue up behind each
    /// other.
    pub fn reserve(&mut self, now: Instant) -> Duration {
        match &mut self.state {
            State::Unthrottled => Duration::ZERO,

            State::MinInterval { interval, last } => {
                let delay = match *last {
                    Some(prev) => {
                        let ahead = prev.saturating_duration_since(now);
                        let idle = now.saturating_duration_since(prev);
                        interval.saturating_add(ahead).saturating_sub(idle)
                    }
                    None => Duration::ZERO,
                };
                // Past the platform's Instant range the slot pins to `now`.
                *last = Some(now.checked_add(delay).unwrap_or(now));
                delay
            }

            State::Bucket(bucket) => bucket.reserve(now),
        }
    }
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new(ThrottlePolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn unthrottled_never_waits() {
        let mut t = Throttle::new(ThrottlePolicy::Unthrottled);
        let now = Instant::now();
        for _ in 0..10 {
            assert_eq!(t.reserve(now), Duration::ZERO);
        }
    }

    #[test]
    fn zero_interval_is_unthrottled() {
        assert_eq!(ThrottlePolicy::min_interval_ms(0), ThrottlePolicy::Unthrottled);
        assert_eq!(ThrottlePolicy::min_interval_ms(1200), ThrottlePolicy::default());
    }

    #[test]
    fn min_interval_spaces_calls() {
        let mut t = Throttle::new(ThrottlePolicy::MinInterval(ms(1200)));
        let t0 = Instant::now();

        assert_eq!(t.reserve(t0), Duration::ZERO);
        assert_eq!(t.reserve(t0 + ms(200)), ms(1000));
        // Second call was pushed to t0+1200; third must start at t0+2400.
        assert_eq!(t.reserve(t0 + ms(1200)), ms(1200));
        // Long idle gap: no wait.
        assert_eq!(t.reserve(t0 + ms(10_000)), Duration::ZERO);
    }

    #[test]
    fn bucket_allows_burst_then_paces() {
        let mut t = Throttle::new(ThrottlePolicy::TokenBucket { per_minute: 60, burst: 2 });
        let t0 = Instant::now();

        assert_eq!(t.reserve(t0), Duration::ZERO);
        assert_eq!(t.reserve(t0), Duration::ZERO);
        // Empty; one token per second.
        assert_eq!(t.reserve(t0), ms(1000));
        // The previous reservation consumed the token that arrives at t0+1s.
        assert_eq!(t.reserve(t0 + ms(1000)), ms(1000));
    }

    #[test]
    fn bucket_refills_over_time() {
        let mut t = Throttle::new(ThrottlePolicy::TokenBucket { per_minute: 120, burst: 1 });
        let t0 = Instant::now();

        assert_eq!(t.reserve(t0), Duration::ZERO);
        assert_eq!(t.reserve(t0 + ms(500)), Duration::ZERO);
        assert_eq!(t.reserve(t0 + ms(750)), ms(250));
    }

    #[test]
    fn bucket_caller_behind_a_reservation_waits_for_it() {
        let mut t = Throttle::new(ThrottlePolicy::TokenBucket { per_minute: 60, burst: 1 });
        let t0 = Instant::now();

        assert_eq!(t.reserve(t0), Duration::ZERO);
        assert_eq!(t.reserve(t0), ms(1000));
        // Slot at t0+1s is taken; the next one is t0+2s.
        assert_eq!(t.reserve(t0 + ms(400)), ms(1600));
    }

    #[test]
    fn huge_interval_does_not_overflow() {
        let mut t = Throttle::new(ThrottlePolicy::MinInterval(Duration::MAX));
        let t0 = Instant::now();

        assert_eq!(t.reserve(t0), Duration::ZERO);
        assert_eq!(t.reserve(t0), Duration::MAX);
        assert_eq!(t.reserve(t0 + ms(5)), Duration::MAX.saturating_sub(ms(5)));
    }

    #[test]
    fn zero_rate_bucket_is_unthrottled() {
        let mut t = Throttle::new(ThrottlePolicy::TokenBucket { per_minute: 0, burst: 5 });
        assert_eq!(t.reserve(Instant::now()), Duration::ZERO);
    }
}
