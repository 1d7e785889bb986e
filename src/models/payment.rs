use crate::error::PaymentError;
use chrono::{DateTime, Utc};
use ethers::types::{H256, U256};
use serde::{Deserialize, Serialize};

/// Raw `POST /verify-payment` body. Every field is optional so that a
/// missing field surfaces as a validation error instead of a JSON rejection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentRequest {
    pub tx_hash: Option<String>,
    pub user_id: Option<String>,
    pub tier_name: Option<String>,
}

/// A request that passed shape validation at the HTTP boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    pub tx_hash: H256,
    pub user_id: String,
    pub tier_name: String,
}

impl PaymentRequest {
    pub fn new(tx_hash: H256, user_id: impl Into<String>, tier_name: impl Into<String>) -> Self {
        Self {
            tx_hash,
            user_id: user_id.into(),
            tier_name: tier_name.into(),
        }
    }

    /// Lowercase, 0x-prefixed hash used as the ledger key.
    pub fn tx_key(&self) -> String {
        tx_key(&self.tx_hash)
    }
}

pub fn tx_key(tx_hash: &H256) -> String {
    format!("{:?}", tx_hash)
}

impl TryFrom<VerifyPaymentRequest> for PaymentRequest {
    type Error = PaymentError;

    fn try_from(body: VerifyPaymentRequest) -> Result<Self, Self::Error> {
        let non_empty = |field: Option<String>| {
            field
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let (Some(tx_hash), Some(user_id), Some(tier_name)) = (
            non_empty(body.tx_hash),
            non_empty(body.user_id),
            non_empty(body.tier_name),
        ) else {
            return Err(PaymentError::InvalidRequest(
                "Missing required fields: txHash, userId, tierName".to_string(),
            ));
        };

        Ok(Self {
            tx_hash: parse_tx_hash(&tx_hash)?,
            user_id,
            tier_name,
        })
    }
}

/// Accepts exactly `0x` followed by 64 hex digits.
pub fn parse_tx_hash(raw: &str) -> Result<H256, PaymentError> {
    let invalid = || PaymentError::InvalidRequest("Invalid transaction hash format".to_string());

    let digits = raw.strip_prefix("0x").ok_or_else(invalid)?;
    if digits.len() != 64 {
        return Err(invalid());
    }
    let bytes = hex::decode(digits).map_err(|_| invalid())?;

    Ok(H256::from_slice(&bytes))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Duplicate,
    Failed,
    Pending,
    Verified,
}

/// Append-only audit row, one per verification outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentAttempt {
    pub tx_hash: String,
    pub user_id: String,
    pub tier_name: String,
    pub status: AttemptStatus,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl PaymentAttempt {
    pub fn new(
        request: &PaymentRequest,
        status: AttemptStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            tx_hash: request.tx_key(),
            user_id: request.user_id.clone(),
            tier_name: request.tier_name.clone(),
            status,
            message: message.into(),
            created_at: Utc::now(),
        }
    }
}

/// Ledger row written once per successfully verified transaction hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedTransaction {
    pub tx_hash: String,
    pub user_id: String,
    pub tier_name: String,
    /// Transferred amount in token base units, decimal string.
    pub amount: String,
    pub credits_granted: u64,
    pub block_number: u64,
    pub confirmations: u64,
    pub processed_at: DateTime<Utc>,
}

/// Outcome of a successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPayment {
    pub new_balance: u64,
    pub tx_hash: H256,
    pub tier: String,
    pub credits_granted: u64,
    pub confirmations: u64,
    pub amount: U256,
}
