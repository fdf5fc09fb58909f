use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Token bucket refilled continuously at `max_calls` per `period`.
/// `acquire` suspends until a token is available.
pub struct RateLimiter {
    max_calls: f64,
    period: Duration,
    bucket: Mutex<Bucket>,
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// A zero `max_calls` or zero `period` disables limiting.
    pub fn new(max_calls: u32, period: Duration) -> Self {
        Self {
            max_calls: max_calls as f64,
            period,
            bucket: Mutex::new(Bucket {
                tokens: max_calls as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn per_second(max_calls: u32) -> Self {
        Self::new(max_calls, Duration::from_secs(1))
    }

    fn unlimited(&self) -> bool {
        self.max_calls <= 0.0 || self.period.is_zero()
    }

    pub async fn acquire(&self) {
        if self.unlimited() {
            return;
        }
        let rate = self.max_calls / self.period.as_secs_f64();
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
                bucket.tokens = (bucket.tokens + elapsed * rate).min(self.max_calls);
                bucket.last_refill = now;
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return;
                }
                Duration::from_secs_f64((1.0 - bucket.tokens) / rate)
            };
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn burst_up_to_capacity_then_waits_for_refill() {
        let limiter = RateLimiter::per_second(2);
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        limiter.acquire().await;
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(499), "waited {waited:?}");
        assert!(waited < Duration::from_secs(1), "waited {waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn idle_time_refills_but_never_beyond_capacity() {
        let limiter = RateLimiter::new(3, Duration::from_secs(3));
        for _ in 0..3 {
            limiter.acquire().await;
        }
        tokio::time::sleep(Duration::from_secs(60)).await;

        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(999));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_rate_means_unlimited() {
        let limiter = RateLimiter::per_second(0);
        let start = Instant::now();
        for _ in 0..100 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
