use crate::{models::TierTable, services::VerifierSettings};
use anyhow::{bail, Context, Result};
use ethers::{
    types::{Address, U256},
    utils::parse_units,
};
use std::str::FromStr;
use std::time::Duration;

/// DAI on Ethereum mainnet.
pub const DEFAULT_TOKEN_ADDRESS: &str = "0x6B175474E89094C44Da98b954EedeAC495271d0F";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Testnet,
    Production,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub host: String,
    pub port: u16,

    // Chain RPC
    pub chain_rpc_url: String,
    pub chain_rpc_fallback: Option<String>,
    pub rpc_timeout: Duration,

    // Payment rules
    pub merchant_address: Address,
    pub token_address: Address,
    pub token_decimals: u32,
    pub min_confirmations: u64,
    pub amount_tolerance: String,
    pub tiers: TierTable,

    // Ledger
    pub redis_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let environment = Self::parse_environment()?;
        let token_decimals: u32 = Self::parse_or("TOKEN_DECIMALS", "18")?;

        let tiers = match std::env::var("PAYMENT_TIERS") {
            Ok(json) => TierTable::from_json(&json, token_decimals)
                .context("Invalid PAYMENT_TIERS")?,
            Err(_) => TierTable::builtin(token_decimals)?,
        };

        let config = Self {
            environment,
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: Self::parse_or("PORT", "8080")?,

            chain_rpc_url: std::env::var("CHAIN_RPC_URL").context("CHAIN_RPC_URL required")?,
            chain_rpc_fallback: std::env::var("CHAIN_RPC_FALLBACK").ok(),
            rpc_timeout: Duration::from_secs(Self::parse_or("RPC_TIMEOUT_SECS", "10")?),

            merchant_address: Self::parse_address("MERCHANT_ADDRESS")?,
            token_address: match std::env::var("TOKEN_CONTRACT_ADDRESS") {
                Ok(_) => Self::parse_address("TOKEN_CONTRACT_ADDRESS")?,
                Err(_) => Address::from_str(DEFAULT_TOKEN_ADDRESS)?,
            },
            token_decimals,
            min_confirmations: Self::parse_or("MIN_CONFIRMATIONS", "3")?,
            amount_tolerance: std::env::var("AMOUNT_TOLERANCE")
                .unwrap_or_else(|_| "0.01".to_string()),
            tiers,

            redis_url: std::env::var("REDIS_URL").ok().filter(|url| !url.is_empty()),
        };

        config.validate()?;
        Ok(config)
    }

    fn parse_environment() -> Result<Environment> {
        let env = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        match env.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "testnet" | "test" => Ok(Environment::Testnet),
            "production" | "prod" => Ok(Environment::Production),
            _ => bail!("Unknown environment: {}", env),
        }
    }

    fn parse_or<T>(var: &str, default: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        std::env::var(var)
            .unwrap_or_else(|_| default.to_string())
            .parse()
            .with_context(|| format!("Invalid {}", var))
    }

    fn parse_address(var: &str) -> Result<Address> {
        let addr_str = std::env::var(var).with_context(|| format!("{} required", var))?;
        Address::from_str(&addr_str).with_context(|| format!("Invalid address for {}", var))
    }

    fn validate(&self) -> Result<()> {
        for url in std::iter::once(&self.chain_rpc_url).chain(self.chain_rpc_fallback.iter()) {
            if !url.starts_with("http") {
                bail!("Chain RPC URLs must be HTTP(S) URLs, got {}", url);
            }
        }

        if self.merchant_address.is_zero() {
            bail!("MERCHANT_ADDRESS must not be the zero address");
        }
        if self.min_confirmations == 0 {
            bail!("MIN_CONFIRMATIONS must be at least 1");
        }
        if self.rpc_timeout.is_zero() {
            bail!("RPC_TIMEOUT_SECS must be at least 1");
        }
        self.tolerance_units()?;

        if self.redis_url.is_none() && self.environment == Environment::Production {
            bail!("REDIS_URL required in production");
        }

        tracing::info!(
            "Configuration validated for {:?} environment ({} tiers, {} confirmations)",
            self.environment,
            self.tiers.names().count(),
            self.min_confirmations
        );

        Ok(())
    }

    fn tolerance_units(&self) -> Result<U256> {
        let raw = self.amount_tolerance.trim();
        if raw.starts_with('-') {
            bail!("AMOUNT_TOLERANCE must not be negative");
        }
        let units = parse_units(raw, self.token_decimals)
            .with_context(|| format!("Invalid AMOUNT_TOLERANCE: {}", raw))?;
        Ok(units.into())
    }

    pub fn verifier_settings(&self) -> Result<VerifierSettings> {
        Ok(VerifierSettings {
            merchant_address: self.merchant_address,
            token_address: self.token_address,
            token_decimals: self.token_decimals,
            min_confirmations: self.min_confirmations,
            amount_tolerance: self.tolerance_units()?,
            tiers: self.tiers.clone(),
        })
    }
}
