//! Per-client request admission

pub mod bucket;
pub mod client;
pub mod limiter;
pub mod middleware;

pub use bucket::TokenBucket;
pub use client::{ClientIdentity, ProxyTrust};
pub use limiter::{ClientRateLimiter, RateLimitError, RateLimitExceeded};
pub use middleware::admission;
