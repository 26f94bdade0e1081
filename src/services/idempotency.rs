//! Duplicate-submission protection keyed by client-supplied submission tokens.
//!
//! These tokens identify a form submission ("don't apply this twice"); they are
//! unrelated to the server-generated donation transaction token.

use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use crate::error::AppError;

const IDEMPOTENCY_PREFIX: &str = "idempotency:";

#[async_trait]
pub trait IdempotencyGuard: Send + Sync {
    /// Atomically records `token`. Returns `true` the first time a token is
    /// seen and `false` for every duplicate.
    async fn check_and_register(&self, token: &str) -> Result<bool, AppError>;

    /// Forgets `token` so the guarded operation can be retried after a failure.
    async fn release(&self, token: &str) -> Result<(), AppError>;
}

#[derive(Default)]
struct RecentTokens {
    seen: HashSet<String>,
    order: VecDeque<String>,
}

/// Process-local guard holding at most `capacity` tokens; the oldest are evicted first.
///
/// Only protects a single instance. Multi-instance deployments should use
/// [`RedisIdempotencyGuard`].
#[derive(Clone)]
pub struct BoundedIdempotencyGuard {
    capacity: usize,
    inner: Arc<Mutex<RecentTokens>>,
}

impl BoundedIdempotencyGuard {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Arc::new(Mutex::new(RecentTokens::default())),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RecentTokens> {
        // The set stays consistent even if a holder panicked mid-call.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn register(&self, token: &str) -> bool {
        let mut tokens = self.lock();
        if !tokens.seen.insert(token.to_string()) {
            return false;
        }
        tokens.order.push_back(token.to_string());

        while tokens.order.len() > self.capacity {
            if let Some(evicted) = tokens.order.pop_front() {
                tokens.seen.remove(&evicted);
                tracing::debug!(token = %evicted, "Evicted oldest submission token");
            }
        }
        true
    }

    fn forget(&self, token: &str) {
        let mut tokens = self.lock();
        if tokens.seen.remove(token) {
            tokens.order.retain(|t| t != token);
        }
    }
}

#[async_trait]
impl IdempotencyGuard for BoundedIdempotencyGuard {
    async fn check_and_register(&self, token: &str) -> Result<bool, AppError> {
        Ok(self.register(token))
    }

    async fn release(&self, token: &str) -> Result<(), AppError> {
        self.forget(token);
        Ok(())
    }
}

/// Redis-backed guard shared by every instance. Entries expire after `ttl_secs`.
#[derive(Clone)]
pub struct RedisIdempotencyGuard {
    redis_client: redis::Client,
    ttl_secs: u64,
}

impl RedisIdempotencyGuard {
    pub fn new(redis_url: &str, ttl_secs: u64) -> anyhow::Result<Self> {
        let redis_client = redis::Client::open(redis_url)?;
        Ok(Self {
            redis_client,
            ttl_secs: ttl_secs.max(1),
        })
    }

    fn key(token: &str) -> String {
        format!("{}{}", IDEMPOTENCY_PREFIX, token)
    }
}

#[async_trait]
impl IdempotencyGuard for RedisIdempotencyGuard {
    async fn check_and_register(&self, token: &str) -> Result<bool, AppError> {
        let outcome: redis::RedisResult<Option<String>> = async {
            let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
            // SET NX is the test-and-set: exactly one caller gets "OK".
            redis::cmd("SET")
                .arg(Self::key(token))
                .arg(1)
                .arg("NX")
                .arg("EX")
                .arg(self.ttl_secs)
                .query_async::<_, Option<String>>(&mut conn)
                .await
        }
        .await;

        match outcome {
            Ok(reply) => Ok(reply.is_some()),
            Err(e) => {
                // Fail open: an unreachable Redis must not block submissions.
                tracing::error!(error = %e, "Idempotency check failed, accepting submission");
                Ok(true)
            }
        }
    }

    async fn release(&self, token: &str) -> Result<(), AppError> {
        let result: redis::RedisResult<()> = async {
            let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
            redis::cmd("DEL")
                .arg(Self::key(token))
                .query_async::<_, ()>(&mut conn)
                .await
        }
        .await;

        if let Err(e) = result {
            tracing::error!(error = %e, "Failed to release submission token");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_submission_accepted_duplicate_rejected() {
        let guard = BoundedIdempotencyGuard::new(10);

        assert!(guard.check_and_register("form-1").await.unwrap());
        assert!(!guard.check_and_register("form-1").await.unwrap());
        assert!(guard.check_and_register("form-2").await.unwrap());
    }

    #[tokio::test]
    async fn test_oldest_tokens_evicted_past_capacity() {
        let guard = BoundedIdempotencyGuard::new(2);

        assert!(guard.check_and_register("a").await.unwrap());
        assert!(guard.check_and_register("b").await.unwrap());
        assert!(guard.check_and_register("c").await.unwrap());

        assert_eq!(guard.len(), 2);
        // "a" was evicted, so it is accepted again; "c" is still remembered.
        assert!(guard.check_and_register("a").await.unwrap());
        assert!(!guard.check_and_register("c").await.unwrap());
    }

    #[tokio::test]
    async fn test_release_allows_resubmission() {
        let guard = BoundedIdempotencyGuard::new(10);

        assert!(guard.check_and_register("form-1").await.unwrap());
        guard.release("form-1").await.unwrap();

        assert!(guard.is_empty());
        assert!(guard.check_and_register("form-1").await.unwrap());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        assert_eq!(BoundedIdempotencyGuard::new(0).capacity(), 1);
    }

    #[test]
    fn test_redis_key_prefix() {
        assert_eq!(RedisIdempotencyGuard::key("abc"), "idempotency:abc");
    }
}
