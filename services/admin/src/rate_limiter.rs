//! Rate limiter for write-heavy and credential endpoints
//!
//! Counts hits per client token inside a window that starts with the
//! token's first hit. The table holds at most `max_tokens` distinct keys;
//! once full, expired keys are dropped first and then the least recently
//! seen one. State is per process, so limits are approximate when the
//! service is scaled horizontally.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Maximum number of requests per token and window
    pub max_requests: u32,
    /// Time window in seconds, also the lifetime of an idle entry
    pub window_seconds: u64,
    /// Maximum number of distinct tokens tracked
    pub max_tokens: usize,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window_seconds: 60,
            max_tokens: 500,
        }
    }
}

/// Outcome of a single check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Hits counted in the current window, including this one
    pub used: u32,
    pub limit: u32,
    pub remaining: u32,
}

#[derive(Debug)]
struct RateLimiterEntry {
    hits: u32,
    window_start: Instant,
    last_seen: Instant,
}

/// Rate limiter
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    entries: Arc<Mutex<HashMap<String, RateLimiterEntry>>>,
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Count a request for `token` and decide whether it may proceed
    pub async fn check(&self, token: &str) -> RateLimitDecision {
        self.check_at(token, Instant::now()).await
    }

    /// Shorthand for `check(token).await.allowed`
    pub async fn is_allowed(&self, token: &str) -> bool {
        self.check(token).await.allowed
    }

    async fn check_at(&self, token: &str, now: Instant) -> RateLimitDecision {
        let window = Duration::from_secs(self.config.window_seconds);
        let mut entries = self.entries.lock().await;

        if !entries.contains_key(token) && entries.len() >= self.config.max_tokens {
            self.evict(&mut entries, now, window);
        }

        let entry = entries
            .entry(token.to_string())
            .or_insert(RateLimiterEntry {
                hits: 0,
                window_start: now,
                last_seen: now,
            });

        if now.duration_since(entry.window_start) >= window {
            entry.hits = 0;
            entry.window_start = now;
        }

        entry.hits = entry.hits.saturating_add(1);
        entry.last_seen = now;

        let limit = self.config.max_requests;
        let allowed = entry.hits <= limit;
        if !allowed {
            info!("Rate limit exceeded for token {} ({} hits)", token, entry.hits);
        }

        RateLimitDecision {
            allowed,
            used: entry.hits,
            limit,
            remaining: limit.saturating_sub(entry.hits),
        }
    }

    fn evict(
        &self,
        entries: &mut HashMap<String, RateLimiterEntry>,
        now: Instant,
        window: Duration,
    ) {
        entries.retain(|_, e| now.duration_since(e.window_start) < window);

        while entries.len() >= self.config.max_tokens {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.last_seen)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(key) => {
                    debug!("Evicting rate limiter token {}", key);
                    entries.remove(&key);
                }
                None => break,
            }
        }
    }

    /// Number of tokens currently tracked
    pub async fn tracked_tokens(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Get the rate limiter configuration
    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }
}
