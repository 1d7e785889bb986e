use crate::{
    error::{PaymentError, StoreError},
    models::{
        AttemptStatus, PaymentAttempt, PaymentRequest, ProcessedTransaction, Tier, TierTable,
        VerifiedPayment,
    },
    services::{ChainClient, PaymentStore},
};
use chrono::Utc;
use ethers::{
    types::{Address, Log, TransactionReceipt, H256, U256, U64},
    utils::{format_units, keccak256, to_checksum},
};
use std::sync::Arc;

/// Everything the verifier needs to know about the deployment. Built once
/// from [`crate::config::Config`] and injected, never read from the
/// environment.
#[derive(Debug, Clone)]
pub struct VerifierSettings {
    pub merchant_address: Address,
    pub token_address: Address,
    pub token_decimals: u32,
    pub min_confirmations: u64,
    /// Absolute tolerance in token base units.
    pub amount_tolerance: U256,
    pub tiers: TierTable,
}

/// `Transfer(address,address,uint256)` topic.
pub fn transfer_event_signature() -> H256 {
    H256::from(keccak256("Transfer(address,address,uint256)"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenTransfer {
    pub from: Address,
    pub to: Address,
    pub amount: U256,
}

/// Returns the first `Transfer` log emitted by `token`. Logs with fewer than
/// three topics or a non-word data field are not standard ERC-20 transfers
/// and are skipped, as are logs a reorg has marked removed.
pub fn find_transfer(logs: &[Log], token: Address) -> Option<TokenTransfer> {
    let signature = transfer_event_signature();

    logs.iter()
        .filter(|log| log.removed != Some(true))
        .filter(|log| log.address == token)
        .filter(|log| log.topics.first() == Some(&signature))
        .find(|log| log.topics.len() >= 3 && log.data.len() == 32)
        .map(|log| TokenTransfer {
            from: Address::from(log.topics[1]),
            to: Address::from(log.topics[2]),
            amount: U256::from_big_endian(&log.data),
        })
}

/// `|actual - expected| <= tolerance`, in base units.
pub fn amount_within_tolerance(actual: U256, expected: U256, tolerance: U256) -> bool {
    let diff = if actual > expected {
        actual - expected
    } else {
        expected - actual
    };
    diff <= tolerance
}

pub struct PaymentVerifier {
    chain: Arc<dyn ChainClient>,
    store: Arc<dyn PaymentStore>,
    settings: VerifierSettings,
}

impl PaymentVerifier {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        store: Arc<dyn PaymentStore>,
        settings: VerifierSettings,
    ) -> Self {
        Self {
            chain,
            store,
            settings,
        }
    }

    /// Runs every gate in order and credits the user on success. Each
    /// outcome, success or failure, appends exactly one audit row.
    #[tracing::instrument(
        skip(self, request),
        fields(
            tx_hash = %request.tx_key(),
            user_id = %request.user_id,
            tier = %request.tier_name
        )
    )]
    pub async fn verify(&self, request: &PaymentRequest) -> Result<VerifiedPayment, PaymentError> {
        let tx_key = request.tx_key();

        // Tier validity does not depend on chain state, so it is settled
        // before any I/O.
        let Some(tier) = self.settings.tiers.get(&request.tier_name).cloned() else {
            let known: Vec<&str> = self.settings.tiers.names().collect();
            return Err(self
                .reject(
                    request,
                    AttemptStatus::Failed,
                    format!("Unknown tier {:?}, expected one of {:?}", request.tier_name, known),
                    PaymentError::InvalidTier(request.tier_name.clone()),
                )
                .await);
        };

        let already_processed = match self.store.is_processed(&tx_key).await {
            Ok(found) => found,
            Err(e) => {
                return Err(self
                    .reject(
                        request,
                        AttemptStatus::Failed,
                        format!("Ledger lookup failed: {}", e),
                        PaymentError::Internal(e.to_string()),
                    )
                    .await)
            }
        };
        if already_processed {
            return Err(self
                .reject(
                    request,
                    AttemptStatus::Duplicate,
                    "Transaction already processed",
                    PaymentError::AlreadyProcessed,
                )
                .await);
        }

        let receipt = match self.chain.transaction_receipt(request.tx_hash).await {
            Ok(receipt) => receipt,
            Err(e) => {
                return Err(self
                    .reject(
                        request,
                        AttemptStatus::Failed,
                        format!("Receipt lookup failed: {}", e),
                        PaymentError::TransactionNotFound,
                    )
                    .await)
            }
        };

        let Some((receipt, block_number)) =
            receipt.and_then(|r| r.block_number.map(|n| n.as_u64()).map(|n| (r, n)))
        else {
            return Err(self
                .reject(
                    request,
                    AttemptStatus::Failed,
                    "Transaction receipt is null",
                    PaymentError::NotConfirmed,
                )
                .await);
        };

        let transfer = self.check_receipt(request, &receipt).await?;
        self.check_amount(request, &tier, transfer.amount).await?;
        let confirmations = self.check_confirmations(request, block_number).await?;

        self.commit(request, &tier, transfer.amount, block_number, confirmations)
            .await
    }

    /// Execution status, transfer presence and recipient.
    async fn check_receipt(
        &self,
        request: &PaymentRequest,
        receipt: &TransactionReceipt,
    ) -> Result<TokenTransfer, PaymentError> {
        if receipt.status != Some(U64::from(1)) {
            return Err(self
                .reject(
                    request,
                    AttemptStatus::Failed,
                    format!("Transaction reverted (status {:?})", receipt.status),
                    PaymentError::TransactionFailed,
                )
                .await);
        }

        let Some(transfer) = find_transfer(&receipt.logs, self.settings.token_address) else {
            return Err(self
                .reject(
                    request,
                    AttemptStatus::Failed,
                    format!(
                        "No Transfer log from token {} among {} logs",
                        to_checksum(&self.settings.token_address, None),
                        receipt.logs.len()
                    ),
                    PaymentError::NoTransferFound,
                )
                .await);
        };

        if transfer.to != self.settings.merchant_address {
            return Err(self
                .reject(
                    request,
                    AttemptStatus::Failed,
                    format!(
                        "Transfer sent to {}, expected {}",
                        to_checksum(&transfer.to, None),
                        to_checksum(&self.settings.merchant_address, None)
                    ),
                    PaymentError::WrongRecipient,
                )
                .await);
        }

        Ok(transfer)
    }

    async fn check_amount(
        &self,
        request: &PaymentRequest,
        tier: &Tier,
        amount: U256,
    ) -> Result<(), PaymentError> {
        if amount_within_tolerance(amount, tier.required_amount, self.settings.amount_tolerance) {
            return Ok(());
        }

        let expected = self.display_amount(tier.required_amount);
        let received = self.display_amount(amount);
        Err(self
            .reject(
                request,
                AttemptStatus::Failed,
                format!(
                    "Incorrect amount for {} tier (price {}): expected {}, received {}",
                    tier.name, tier.price, expected, received
                ),
                PaymentError::IncorrectAmount { expected, received },
            )
            .await)
    }

    async fn check_confirmations(
        &self,
        request: &PaymentRequest,
        block_number: u64,
    ) -> Result<u64, PaymentError> {
        let head = match self.chain.block_number().await {
            Ok(head) => head,
            Err(e) => {
                return Err(self
                    .reject(
                        request,
                        AttemptStatus::Failed,
                        format!("Block number lookup failed: {}", e),
                        PaymentError::Internal(e.to_string()),
                    )
                    .await)
            }
        };

        let confirmations = head.saturating_sub(block_number);
        let required = self.settings.min_confirmations;
        if confirmations < required {
            return Err(self
                .reject(
                    request,
                    AttemptStatus::Pending,
                    format!("Waiting for confirmations: {}/{}", confirmations, required),
                    PaymentError::InsufficientConfirmations {
                        confirmations,
                        required,
                    },
                )
                .await);
        }

        Ok(confirmations)
    }

    async fn commit(
        &self,
        request: &PaymentRequest,
        tier: &Tier,
        amount: U256,
        block_number: u64,
        confirmations: u64,
    ) -> Result<VerifiedPayment, PaymentError> {
        let row = ProcessedTransaction {
            tx_hash: request.tx_key(),
            user_id: request.user_id.clone(),
            tier_name: tier.name.clone(),
            amount: amount.to_string(),
            credits_granted: tier.credits_granted,
            block_number,
            confirmations,
            processed_at: Utc::now(),
        };

        let new_balance = match self.store.commit_payment(&row).await {
            Ok(balance) => balance,
            Err(StoreError::Duplicate(_)) => {
                return Err(self
                    .reject(
                        request,
                        AttemptStatus::Duplicate,
                        "Concurrent duplicate: ledger row already exists",
                        PaymentError::AlreadyBeingProcessed,
                    )
                    .await)
            }
            Err(e) => {
                return Err(self
                    .reject(
                        request,
                        AttemptStatus::Failed,
                        format!("Failed to record transaction: {}", e),
                        PaymentError::RecordFailed,
                    )
                    .await)
            }
        };

        let received = self.display_amount(amount);
        self.audit(PaymentAttempt::new(
            request,
            AttemptStatus::Verified,
            format!(
                "Verified {} tokens with {} confirmations, credited {}",
                received, confirmations, tier.credits_granted
            ),
        ))
        .await;

        tracing::info!(
            amount = %received,
            confirmations,
            credits = tier.credits_granted,
            new_balance,
            "Payment verified"
        );

        Ok(VerifiedPayment {
            new_balance,
            tx_hash: request.tx_hash,
            tier: tier.name.clone(),
            credits_granted: tier.credits_granted,
            confirmations,
            amount,
        })
    }

    /// Records the failure and hands back `error` for returning.
    async fn reject(
        &self,
        request: &PaymentRequest,
        status: AttemptStatus,
        message: impl Into<String>,
        error: PaymentError,
    ) -> PaymentError {
        let message = message.into();
        tracing::warn!(status = ?status, reason = %message, "Payment rejected: {}", error);

        self.audit(PaymentAttempt::new(request, status, message)).await;
        error
    }

    /// Audit rows are best-effort; a failed write never changes the result.
    async fn audit(&self, attempt: PaymentAttempt) {
        if let Err(e) = self.store.record_attempt(&attempt).await {
            tracing::warn!(
                tx_hash = %attempt.tx_hash,
                status = ?attempt.status,
                "Failed to write payment attempt: {}",
                e
            );
        }
    }

    fn display_amount(&self, amount: U256) -> String {
        format_units(amount, self.settings.token_decimals).unwrap_or_else(|_| amount.to_string())
    }
}
