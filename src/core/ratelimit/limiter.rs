//! Per-client admission control
//!
//! [`ClientRateLimiter`] keeps one [`TokenBucket`] per client identity,
//! created on first sight. Entries idle for more than
//! [`IDLE_EVICTION_FACTOR`] periods are dropped by a periodic sweep.
//!
//! The request path and the sweep both go through the map's shard locks:
//! `check_at` holds the entry's shard for its whole lookup-create-consume
//! sequence and `sweep_at` evaluates each entry under the same lock, so an
//! entry can never be evicted halfway through an admission decision.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::core::ratelimit::bucket::TokenBucket;
use crate::core::ratelimit::client::{ClientIdentity, ProxyTrust};

/// Idle entries are evicted after this many periods without traffic
pub const IDLE_EVICTION_FACTOR: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    #[error("rate limit must allow at least one request")]
    ZeroRequests,

    #[error("rate limit period must be positive")]
    ZeroPeriod,
}

/// A rejected admission
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("rate limit exceeded, retry after {retry_after:?}")]
pub struct RateLimitExceeded {
    pub retry_after: Duration,
}

#[derive(Debug)]
struct ClientEntry {
    bucket: TokenBucket,
    last_seen: Instant,
}

#[derive(Debug)]
pub struct ClientRateLimiter {
    clients: DashMap<ClientIdentity, ClientEntry>,
    requests: u32,
    period: Duration,
    idle_after: Duration,
    proxy_trust: ProxyTrust,
}

impl ClientRateLimiter {
    /// Allow `requests` per `period` for each client
    pub fn new(requests: u32, period: Duration) -> Result<Self, RateLimitError> {
        if requests == 0 {
            return Err(RateLimitError::ZeroRequests);
        }

        if period.is_zero() {
            return Err(RateLimitError::ZeroPeriod);
        }

        Ok(Self {
            clients: DashMap::new(),
            requests,
            period,
            idle_after: period * IDLE_EVICTION_FACTOR,
            proxy_trust: ProxyTrust::default(),
        })
    }

    pub fn with_proxy_trust(mut self, proxy_trust: ProxyTrust) -> Self {
        self.proxy_trust = proxy_trust;
        self
    }

    pub fn proxy_trust(&self) -> ProxyTrust {
        self.proxy_trust
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Number of clients currently tracked
    pub fn tracked_clients(&self) -> usize {
        self.clients.len()
    }

    pub fn check(&self, client: &ClientIdentity) -> Result<(), RateLimitExceeded> {
        self.check_at(client, Instant::now())
    }

    /// Admit or reject one request from `client` at `now`
    pub fn check_at(&self, client: &ClientIdentity, now: Instant) -> Result<(), RateLimitExceeded> {
        let mut entry = self
            .clients
            .entry(client.clone())
            .or_insert_with(|| ClientEntry {
                bucket: TokenBucket::new_at(self.requests, self.period, now),
                last_seen: now,
            });

        if now > entry.last_seen {
            entry.last_seen = now;
        }

        if entry.bucket.try_consume_at(now) {
            Ok(())
        } else {
            Err(RateLimitExceeded {
                retry_after: self.period,
            })
        }
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// Evict entries idle for longer than the eviction window, returning how
    /// many were removed
    pub fn sweep_at(&self, now: Instant) -> usize {
        let before = self.clients.len();
        self.clients
            .retain(|_, entry| now.saturating_duration_since(entry.last_seen) <= self.idle_after);
        before.saturating_sub(self.clients.len())
    }

    /// Run [`sweep`](Self::sweep) once per period until `shutdown` flips to
    /// `true` or its sender is dropped.
    pub fn spawn_sweeper(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.period);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = self.sweep();
                        if evicted > 0 {
                            debug!(evicted, remaining = self.tracked_clients(), "rate limiter sweep");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            debug!("rate limiter sweeper stopped");
        })
    }
}
