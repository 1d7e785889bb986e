use crate::error::ChainError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use ethers::{
    providers::{Http, Middleware, Provider, ProviderError},
    types::{TransactionReceipt, H256},
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Read access to the chain the payments settle on.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// `Ok(None)` means the node does not know a mined receipt for the hash yet.
    async fn transaction_receipt(
        &self,
        tx_hash: H256,
    ) -> Result<Option<TransactionReceipt>, ChainError>;

    async fn block_number(&self) -> Result<u64, ChainError>;
}

pub struct ChainService {
    primary: Arc<Provider<Http>>,
    fallback: Option<Arc<Provider<Http>>>,
    timeout: Duration,
}

impl ChainService {
    pub fn new(rpc_url: &str, fallback_url: Option<&str>, timeout: Duration) -> Result<Self> {
        let primary = Arc::new(Self::provider(rpc_url, timeout)?);

        let fallback = if let Some(url) = fallback_url {
            Some(Arc::new(Self::provider(url, timeout)?))
        } else {
            None
        };

        Ok(Self {
            primary,
            fallback,
            timeout,
        })
    }

    fn provider(url: &str, timeout: Duration) -> Result<Provider<Http>> {
        let url = reqwest::Url::parse(url).with_context(|| format!("Invalid RPC URL: {}", url))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build RPC HTTP client")?;

        Ok(Provider::new(Http::new_with_client(url, client)))
    }

    /// Runs `op` against the primary provider, then once against the fallback
    /// if the primary errors or times out.
    async fn call<T, F, Fut>(&self, op: F) -> Result<T, ChainError>
    where
        F: Fn(Arc<Provider<Http>>) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        match self.with_timeout(op(self.primary.clone())).await {
            Ok(value) => Ok(value),
            Err(e) => match &self.fallback {
                Some(fallback) => {
                    tracing::warn!("Primary RPC failed ({}), trying fallback", e);
                    self.with_timeout(op(fallback.clone())).await
                }
                None => Err(e),
            },
        }
    }

    async fn with_timeout<T>(
        &self,
        fut: impl Future<Output = Result<T, ProviderError>>,
    ) -> Result<T, ChainError> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| ChainError::Timeout(self.timeout))?
            .map_err(ChainError::from)
    }
}

#[async_trait]
impl ChainClient for ChainService {
    async fn transaction_receipt(
        &self,
        tx_hash: H256,
    ) -> Result<Option<TransactionReceipt>, ChainError> {
        self.call(move |provider| async move { provider.get_transaction_receipt(tx_hash).await })
            .await
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        let head = self
            .call(|provider| async move { provider.get_block_number().await })
            .await?;
        Ok(head.as_u64())
    }
}
