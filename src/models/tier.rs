use ethers::{types::U256, utils::parse_units};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Tier entry as written in configuration: a decimal token price and the
/// number of credits it buys.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TierEntry {
    pub price: String,
    pub credits: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tier {
    pub name: String,
    pub price: String,
    /// Price in token base units.
    pub required_amount: U256,
    pub credits_granted: u64,
}

#[derive(Error, Debug)]
pub enum TierError {
    #[error("Tier table is empty")]
    Empty,

    #[error("Invalid price {price:?} for tier {tier}")]
    InvalidPrice { tier: String, price: String },

    #[error("Credits {credits} for tier {tier} exceed the ledger's counter range")]
    InvalidCredits { tier: String, credits: u64 },

    #[error("Invalid tier table JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct TierTable {
    tiers: BTreeMap<String, Tier>,
}

impl TierTable {
    pub fn from_entries(
        entries: BTreeMap<String, TierEntry>,
        decimals: u32,
    ) -> Result<Self, TierError> {
        if entries.is_empty() {
            return Err(TierError::Empty);
        }

        let mut tiers = BTreeMap::new();
        for (name, entry) in entries {
            let required_amount = parse_price(&entry.price, decimals).ok_or_else(|| {
                TierError::InvalidPrice {
                    tier: name.clone(),
                    price: entry.price.clone(),
                }
            })?;

            // Balances are signed 64-bit counters in Redis.
            if entry.credits > i64::MAX as u64 {
                return Err(TierError::InvalidCredits {
                    tier: name,
                    credits: entry.credits,
                });
            }

            tiers.insert(
                name.clone(),
                Tier {
                    name,
                    price: entry.price,
                    required_amount,
                    credits_granted: entry.credits,
                },
            );
        }

        Ok(Self { tiers })
    }

    pub fn from_json(json: &str, decimals: u32) -> Result<Self, TierError> {
        let entries: BTreeMap<String, TierEntry> = serde_json::from_str(json)?;
        Self::from_entries(entries, decimals)
    }

    pub fn builtin(decimals: u32) -> Result<Self, TierError> {
        Self::from_entries(builtin_entries(), decimals)
    }

    /// Exact, case-sensitive lookup.
    pub fn get(&self, name: &str) -> Option<&Tier> {
        self.tiers.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tiers.keys().map(String::as_str)
    }
}

fn builtin_entries() -> BTreeMap<String, TierEntry> {
    [
        ("Starter", "5", 1_000_000),
        ("Pro", "20", 5_000_000),
        ("Enterprise", "100", 30_000_000),
    ]
    .into_iter()
    .map(|(name, price, credits)| {
        (
            name.to_string(),
            TierEntry {
                price: price.to_string(),
                credits,
            },
        )
    })
    .collect()
}

fn parse_price(price: &str, decimals: u32) -> Option<U256> {
    let trimmed = price.trim();
    if trimmed.is_empty() || trimmed.starts_with('-') {
        return None;
    }
    let amount: U256 = parse_units(trimmed, decimals).ok()?.into();
    (!amount.is_zero()).then_some(amount)
}
