use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as GovernorLimiter};
use tokio_util::sync::CancellationToken;

type Limiter = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Returned by [`RateLimiter::acquire`] when the wait for a token was cut
/// short by a `Stop` signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

/// Admits at most `hit_rate` fetches per second for one job.
///
/// Wraps a single-cell `governor` limiter — capacity 1, one cell replenished
/// every `1 / hit_rate` seconds — so bursts beyond the configured rate are
/// never admitted. `acquire` races the wait against a [`CancellationToken`]
/// so Pause/Stop never has to wait out a full tick.
pub struct RateLimiter {
    inner: Limiter,
}

impl RateLimiter {
    pub fn new(hit_rate: f64) -> Self {
        let hit_rate = if hit_rate > 0.0 { hit_rate } else { 1.0 };
        let period = Duration::from_secs_f64(1.0 / hit_rate);
        let quota = Quota::with_period(period).unwrap_or_else(|| {
            Quota::per_second(std::num::NonZeroU32::new(1).expect("1 is nonzero"))
        });
        Self {
            inner: Limiter::direct(quota),
        }
    }

    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), Cancelled> {
        tokio::select! {
            _ = self.inner.until_ready() => Ok(()),
            _ = cancel.cancelled() => Err(Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn admits_at_configured_rate() {
        let limiter = RateLimiter::new(20.0);
        let cancel = CancellationToken::new();
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire(&cancel).await.unwrap();
        }
        // 3 tokens at 20/s should take at least ~100ms (2 intervals of 50ms)
        assert!(start.elapsed() >= Duration::from_millis(80));
    }

    #[tokio::test]
    async fn cancellation_short_circuits_the_wait() {
        let limiter = RateLimiter::new(0.5); // one token per 2s
        let cancel = CancellationToken::new();
        limiter.acquire(&cancel).await.unwrap(); // drains the initial burst cell

        let cancel2 = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel2.cancel();
        });
        let start = Instant::now();
        let result = limiter.acquire(&cancel).await;
        assert_eq!(result, Err(Cancelled));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
