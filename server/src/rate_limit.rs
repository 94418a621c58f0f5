//! Login attempt throttling per client.
//!
//! Each client (the peer address, or the first `X-Forwarded-For` entry when
//! present) gets a small bucket of login attempts. Every attempt spends one;
//! attempts come back one at a time at a fixed interval. A successful login
//! refills the client's bucket.
//!
//! Only `POST /admin/login` is throttled. Session checks and logout are
//! cheap and reveal nothing about the password.
//!
//! # Example
//!
//! ```rust
//! use folio_gate::rate_limit::{LoginThrottle, RateLimitResult};
//!
//! #[tokio::main]
//! async fn main() {
//!     let throttle = LoginThrottle::default();
//!
//!     match throttle.check("203.0.113.7").await {
//!         RateLimitResult::Allowed => {
//!             // Run the login
//!         }
//!         RateLimitResult::Limited { retry_after_secs } => {
//!             // 429 Too Many Requests with Retry-After
//!         }
//!     }
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

/// Default number of attempts a client may make back to back.
pub const DEFAULT_BURST: u32 = 5;

/// Default time for one spent attempt to come back.
pub const DEFAULT_REFILL_INTERVAL: Duration = Duration::from_secs(12);

/// Entries idle for this long are dropped by the cleanup task.
pub const STALE_ENTRY_TIMEOUT: Duration = Duration::from_secs(600);

/// Result of a throttle check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitResult {
    /// The attempt may proceed.
    Allowed,

    /// The client must wait before trying again.
    Limited {
        /// Seconds until the next attempt is available, for `Retry-After`.
        retry_after_secs: u64,
    },
}

impl RateLimitResult {
    /// Returns `true` if the attempt is allowed.
    #[inline]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    /// Returns `true` if the attempt is throttled.
    #[inline]
    pub fn is_limited(&self) -> bool {
        matches!(self, Self::Limited { .. })
    }

    /// Returns the retry-after duration if throttled.
    #[inline]
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::Allowed => None,
            Self::Limited { retry_after_secs } => Some(*retry_after_secs),
        }
    }
}

/// Attempt bucket for a single client.
#[derive(Debug, Clone)]
struct AttemptBucket {
    /// Attempts currently available (fractional while refilling).
    available: f64,

    /// Last time the bucket was touched.
    last_seen: Instant,
}

impl AttemptBucket {
    fn full(burst: u32) -> Self {
        Self {
            available: f64::from(burst),
            last_seen: Instant::now(),
        }
    }

    fn try_spend(&mut self, burst: u32, per_second: f64) -> RateLimitResult {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_seen).as_secs_f64();
        self.available = (self.available + elapsed * per_second).min(f64::from(burst));
        self.last_seen = now;

        if self.available >= 1.0 {
            self.available -= 1.0;
            return RateLimitResult::Allowed;
        }

        let wait = (1.0 - self.available) / per_second;
        RateLimitResult::Limited {
            retry_after_secs: (wait.ceil() as u64).max(1),
        }
    }
}

/// Shared, cloneable login throttle.
///
/// Backed by a `tokio` `RwLock`, so clones handed to axum handlers all see
/// the same buckets.
#[derive(Debug, Clone)]
pub struct LoginThrottle {
    inner: Arc<RwLock<ThrottleInner>>,
}

#[derive(Debug)]
struct ThrottleInner {
    buckets: HashMap<String, AttemptBucket>,
    burst: u32,
    per_second: f64,
}

impl LoginThrottle {
    /// Creates a throttle allowing `burst` attempts, with one attempt
    /// returning every `refill_interval`.
    ///
    /// A zero interval is treated as one millisecond.
    pub fn new(burst: u32, refill_interval: Duration) -> Self {
        let interval = refill_interval.max(Duration::from_millis(1));
        Self {
            inner: Arc::new(RwLock::new(ThrottleInner {
                buckets: HashMap::new(),
                burst: burst.max(1),
                per_second: 1.0 / interval.as_secs_f64(),
            })),
        }
    }

    /// Spends one attempt for `client`.
    pub async fn check(&self, client: &str) -> RateLimitResult {
        let mut inner = self.inner.write().await;
        let burst = inner.burst;
        let per_second = inner.per_second;

        let result = inner
            .buckets
            .entry(client.to_string())
            .or_insert_with(|| AttemptBucket::full(burst))
            .try_spend(burst, per_second);

        if let RateLimitResult::Limited { retry_after_secs } = result {
            debug!(client, retry_after_secs, "Login attempt throttled");
        }
        result
    }

    /// Forgets `client`'s spent attempts, after a successful login.
    pub async fn reset(&self, client: &str) {
        self.inner.write().await.buckets.remove(client);
    }

    /// Drops entries idle for longer than [`STALE_ENTRY_TIMEOUT`].
    ///
    /// Returns the number of entries removed.
    pub async fn cleanup_stale(&self) -> usize {
        self.cleanup_stale_with_timeout(STALE_ENTRY_TIMEOUT).await
    }

    /// Drops entries idle for longer than `timeout`.
    pub async fn cleanup_stale_with_timeout(&self, timeout: Duration) -> usize {
        let mut inner = self.inner.write().await;
        let before = inner.buckets.len();
        inner
            .buckets
            .retain(|_, bucket| bucket.last_seen.elapsed() < timeout);
        before - inner.buckets.len()
    }

    /// Number of clients currently tracked.
    pub async fn client_count(&self) -> usize {
        self.inner.read().await.buckets.len()
    }

    /// Spawns a task that calls [`cleanup_stale`](Self::cleanup_stale) every
    /// `cleanup_interval`. The task runs until aborted.
    pub fn spawn_cleanup_task(&self, cleanup_interval: Duration) -> tokio::task::JoinHandle<()> {
        let throttle = self.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(cleanup_interval);

            loop {
                interval.tick().await;
                let removed = throttle.cleanup_stale().await;
                if removed > 0 {
                    debug!(removed_count = removed, "Cleaned up idle login throttle entries");
                }
            }
        })
    }
}

impl Default for LoginThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_BURST, DEFAULT_REFILL_INTERVAL)
    }
}
