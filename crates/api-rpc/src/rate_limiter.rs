//! Rate Limiter (Token Bucket Algorithm)
//!
//! Limits paper submissions. Fractional tokens are kept between calls so
//! slow refill rates still refill.

use std::sync::Mutex;
use std::time::Instant;

pub struct RateLimiter {
    bucket: Mutex<Bucket>,
    max_tokens: f64,
    refill_rate: f64, // tokens per second
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// Create a new rate limiter
    ///
    /// # Arguments
    /// * `max_tokens` - Maximum burst size
    /// * `refill_rate` - Tokens added per second
    pub fn new(max_tokens: u32, refill_rate: u32) -> Self {
        Self {
            bucket: Mutex::new(Bucket {
                tokens: f64::from(max_tokens),
                last_refill: Instant::now(),
            }),
            max_tokens: f64::from(max_tokens),
            refill_rate: f64::from(refill_rate),
        }
    }

    /// Consume one token; false when the caller is throttled
    pub fn check(&self) -> bool {
        let mut bucket = self.bucket.lock().unwrap_or_else(|e| e.into_inner());

        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Whole tokens currently available
    pub fn remaining(&self) -> u32 {
        let bucket = self.bucket.lock().unwrap_or_else(|e| e.into_inner());
        bucket.tokens.floor() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_rate_limiter_allows_within_limit() {
        let limiter = RateLimiter::new(10, 1);

        for _ in 0..10 {
            assert!(limiter.check());
        }

        assert!(!limiter.check());
    }

    #[tokio::test]
    async fn test_rate_limiter_refills() {
        let limiter = RateLimiter::new(5, 50);

        for _ in 0..5 {
            assert!(limiter.check());
        }
        assert!(!limiter.check());

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(limiter.check());
        assert!(limiter.remaining() <= 5);
    }

    #[test]
    fn test_zero_rate_never_refills() {
        let limiter = RateLimiter::new(1, 0);
        assert!(limiter.check());
        std::thread::sleep(Duration::from_millis(10));
        assert!(!limiter.check());
    }

    #[tokio::test]
    async fn test_rate_limiter_concurrent() {
        let limiter = Arc::new(RateLimiter::new(100, 1));

        let mut handles = vec![];
        for _ in 0..10 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                (0..20).filter(|_| limiter.check()).count()
            }));
        }

        let mut total_allowed = 0;
        for handle in handles {
            total_allowed += handle.await.unwrap();
        }

        // 200 requests against a burst of 100 (refill is negligible here)
        assert!(
            (100..=102).contains(&total_allowed),
            "Expected about 100 allowed, got {}",
            total_allowed
        );
    }
}
