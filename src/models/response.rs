use crate::models::{payment::tx_key, VerifiedPayment};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentResponse {
    pub success: bool,
    pub new_balance: u64,
    pub details: PaymentDetails,
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetails {
    pub tx_hash: String,
    pub tier: String,
    pub tokens_added: u64,
    pub confirmations: u64,
}

impl From<VerifiedPayment> for VerifyPaymentResponse {
    fn from(payment: VerifiedPayment) -> Self {
        Self {
            success: true,
            new_balance: payment.new_balance,
            details: PaymentDetails {
                tx_hash: tx_key(&payment.tx_hash),
                tier: payment.tier,
                tokens_added: payment.credits_granted,
                confirmations: payment.confirmations,
            },
            timestamp: Utc::now(),
            request_id: Uuid::new_v4().to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub store: bool,
    pub chain_rpc: bool,
    pub chain_head: Option<u64>,
    pub uptime_seconds: u64,
    pub timestamp: DateTime<Utc>,
}
