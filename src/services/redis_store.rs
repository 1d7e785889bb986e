use crate::{
    error::StoreError,
    models::{PaymentAttempt, ProcessedTransaction},
    services::PaymentStore,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use moka::future::Cache;
use redis::{AsyncCommands, Script};

const ATTEMPTS_KEY: &str = "payments:attempts";

// KEYS: processed row, balance, credit history. ARGV: row JSON, credits.
// Returns nil when the row already exists. Redis does not roll back a
// script that errors midway, so every write that can fail runs before the
// ledger row is created.
const COMMIT_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return false
end
local history = redis.call('TYPE', KEYS[3]).ok
if history ~= 'none' and history ~= 'list' then
    return redis.error_reply('ERR credit history is not a list')
end
local balance = redis.call('INCRBY', KEYS[2], ARGV[2])
redis.call('SET', KEYS[1], ARGV[1])
redis.call('RPUSH', KEYS[3], ARGV[1])
return balance
"#;

/// Redis-backed ledger. Uniqueness of a transaction hash is enforced inside
/// the commit script, which Redis runs atomically, not by the earlier
/// existence check.
pub struct RedisStore {
    redis: redis::aio::ConnectionManager,
    known: Cache<String, ()>,
    commit: Script,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("Invalid REDIS_URL")?;
        let redis = client
            .get_connection_manager()
            .await
            .context("Redis connection failed")?;

        tracing::info!("Redis connected successfully");

        Ok(Self {
            redis,
            known: Cache::builder().max_capacity(10_000).build(),
            commit: Script::new(COMMIT_SCRIPT),
        })
    }
}

fn processed_key(tx_hash: &str) -> String {
    format!("payments:processed:{}", tx_hash)
}

fn balance_key(user_id: &str) -> String {
    format!("payments:balance:{}", user_id)
}

fn credits_key(user_id: &str) -> String {
    format!("payments:credits:{}", user_id)
}

#[async_trait]
impl PaymentStore for RedisStore {
    async fn is_processed(&self, tx_hash: &str) -> Result<bool, StoreError> {
        // Ledger rows are never removed, so a positive answer can be memoized.
        if self.known.get(tx_hash).await.is_some() {
            tracing::debug!("Ledger cache hit for {}", tx_hash);
            return Ok(true);
        }

        let mut redis = self.redis.clone();
        let exists: bool = redis.exists(processed_key(tx_hash)).await?;
        if exists {
            self.known.insert(tx_hash.to_string(), ()).await;
        }
        Ok(exists)
    }

    async fn record_attempt(&self, attempt: &PaymentAttempt) -> Result<(), StoreError> {
        let row = serde_json::to_string(attempt)?;
        let mut redis = self.redis.clone();
        redis.rpush::<_, _, ()>(ATTEMPTS_KEY, row).await?;
        Ok(())
    }

    async fn commit_payment(&self, tx: &ProcessedTransaction) -> Result<u64, StoreError> {
        let row = serde_json::to_string(tx)?;
        let mut redis = self.redis.clone();

        let balance: Option<u64> = self
            .commit
            .key(processed_key(&tx.tx_hash))
            .key(balance_key(&tx.user_id))
            .key(credits_key(&tx.user_id))
            .arg(row)
            .arg(tx.credits_granted)
            .invoke_async(&mut redis)
            .await
            .map_err(|e| match e.detail() {
                Some(detail) if detail.contains("would overflow") => {
                    StoreError::BalanceOverflow(tx.user_id.clone())
                }
                _ => StoreError::Redis(e),
            })?;

        self.known.insert(tx.tx_hash.clone(), ()).await;

        balance.ok_or_else(|| StoreError::Duplicate(tx.tx_hash.clone()))
    }

    async fn ping(&self) -> bool {
        let mut redis = self.redis.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut redis)
            .await
            .is_ok()
    }
}
