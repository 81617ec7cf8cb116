//! Token bucket rate limiter for upstream API requests.

use std::time::Instant;

use tokio::sync::Mutex;
use tokio::time::{sleep, Duration};

/// Token bucket: capacity equals the refill rate, so one second of burst is
/// allowed before callers start waiting.
pub struct TokenBucketRateLimiter {
    inner: Mutex<Bucket>,
    capacity: f64,
    refill_rate: f64,
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucketRateLimiter {
    pub fn new(requests_per_second: f64) -> Self {
        let rate = requests_per_second.max(0.1);
        Self {
            inner: Mutex::new(Bucket {
                tokens: rate,
                last_refill: Instant::now(),
            }),
            capacity: rate,
            refill_rate: rate,
        }
    }

    /// Acquire a token, waiting if necessary.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.inner.lock().await;
                let elapsed = bucket.last_refill.elapsed().as_secs_f64();
                bucket.tokens = (bucket.tokens + elapsed * self.refill_rate).min(self.capacity);
                bucket.last_refill = Instant::now();

                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return;
                }
                Duration::from_secs_f64((1.0 - bucket.tokens) / self.refill_rate)
            };
            sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_burst_then_throttle() {
        let limiter = TokenBucketRateLimiter::new(2.0);

        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        let elapsed = start.elapsed();

        // First 2 are burst, 3rd waits ~0.5s.
        assert!(
            elapsed >= Duration::from_millis(400),
            "rate limiting should enforce delays, got {elapsed:?}"
        );
    }
}
