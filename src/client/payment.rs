use crate::contracts::IERC20;
use anyhow::{Context, Result};
use ethers::{
    prelude::*,
    providers::{Http, Provider},
    types::{Address, U256},
    utils::{format_units, parse_units},
};
use std::sync::Arc;

/// Sends ERC-20 payments from a local wallet.
pub struct PaymentClient {
    provider: Arc<SignerMiddleware<Provider<Http>, LocalWallet>>,
    token_address: Address,
    decimals: u32,
}

impl PaymentClient {
    pub async fn new(
        rpc_url: &str,
        private_key: &str,
        chain_id: u64,
        token_address: Address,
    ) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)?;

        let wallet = private_key
            .parse::<LocalWallet>()?
            .with_chain_id(chain_id);

        let provider = Arc::new(SignerMiddleware::new(provider, wallet));

        let token = IERC20::new(token_address, provider.clone());
        let decimals = u32::from(
            token
                .decimals()
                .call()
                .await
                .context("Failed to read token decimals")?,
        );

        Ok(Self {
            provider,
            token_address,
            decimals,
        })
    }

    pub fn address(&self) -> Address {
        self.provider.address()
    }

    /// Transfers `amount` (decimal token units) to `recipient` and waits for
    /// the transaction to be mined.
    pub async fn send_payment(&self, amount: &str, recipient: Address) -> Result<H256> {
        let units: U256 = parse_units(amount.trim(), self.decimals)
            .with_context(|| format!("Invalid token amount: {}", amount))?
            .into();

        tracing::info!("Sending {} tokens ({} base units) to {:?}", amount, units, recipient);

        // Check balance first
        let token = IERC20::new(self.token_address, self.provider.clone());
        let balance = token.balance_of(self.provider.address()).call().await?;

        if balance < units {
            anyhow::bail!(
                "Insufficient token balance: {} < {}",
                self.format(balance),
                amount
            );
        }

        tracing::info!("Current token balance: {}", self.format(balance));

        let tx = token.transfer(recipient, units);
        let pending_tx = tx.send().await.context("Failed to send token transfer")?;

        tracing::info!("Transaction sent, waiting for it to be mined...");

        let receipt = pending_tx
            .await
            .context("Failed to get transaction receipt")?
            .ok_or_else(|| anyhow::anyhow!("Transaction dropped"))?;

        if receipt.status != Some(1.into()) {
            anyhow::bail!("Transaction failed onchain");
        }

        tracing::info!("Payment mined: {:?}", receipt.transaction_hash);

        Ok(receipt.transaction_hash)
    }

    pub async fn balance(&self) -> Result<String> {
        let token = IERC20::new(self.token_address, self.provider.clone());
        let balance = token.balance_of(self.provider.address()).call().await?;
        Ok(self.format(balance))
    }

    fn format(&self, amount: U256) -> String {
        format_units(amount, self.decimals).unwrap_or_else(|_| amount.to_string())
    }
}
