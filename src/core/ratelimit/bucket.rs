//! Token bucket
//!
//! A bucket holds up to `capacity` tokens and refills continuously at
//! `capacity / period` tokens per second. Each admitted request consumes one
//! token; a request finding less than one token in the bucket is rejected.
//!
//! All time-dependent operations have an `_at` variant taking the current
//! [`Instant`] explicitly, so callers holding a clock reading (and tests)
//! never depend on wall time.
//!
//! # Usage Example
//!
//! ```rust
//! use gatekeeper::core::ratelimit::bucket::TokenBucket;
//! use std::time::{Duration, Instant};
//!
//! let start = Instant::now();
//! let mut bucket = TokenBucket::new_at(2, Duration::from_secs(8), start);
//!
//! assert!(bucket.try_consume_at(start));
//! assert!(bucket.try_consume_at(start));
//! assert!(!bucket.try_consume_at(start));
//!
//! // One token comes back every 4 seconds
//! assert!(bucket.try_consume_at(start + Duration::from_secs(4)));
//! ```

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct TokenBucket {
    /// Maximum number of tokens the bucket can hold
    capacity: u32,
    /// Current number of tokens in the bucket
    tokens: f64,
    /// Tokens added per second
    refill_rate: f64,
    /// Last time tokens were refilled
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a full bucket that refills `capacity` tokens over `period`.
    ///
    /// A zero capacity is treated as one, and a zero period as one second.
    pub fn new(capacity: u32, period: Duration) -> Self {
        Self::new_at(capacity, period, Instant::now())
    }

    pub fn new_at(capacity: u32, period: Duration, now: Instant) -> Self {
        let capacity = capacity.max(1);
        let period = if period.is_zero() {
            Duration::from_secs(1)
        } else {
            period
        };

        Self {
            capacity,
            tokens: capacity as f64,
            refill_rate: capacity as f64 / period.as_secs_f64(),
            last_refill: now,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    /// Refill tokens based on elapsed time, capped at capacity
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity as f64);
        if now > self.last_refill {
            self.last_refill = now;
        }
    }

    pub fn try_consume(&mut self) -> bool {
        self.try_consume_at(Instant::now())
    }

    /// Consume one token if available. Returns `false` without consuming
    /// anything when the bucket holds less than one token.
    pub fn try_consume_at(&mut self, now: Instant) -> bool {
        self.refill(now);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Whole tokens available at `now`
    #[cfg(test)]
    pub fn available_at(&mut self, now: Instant) -> u32 {
        self.refill(now);
        self.tokens.floor() as u32
    }
}
