#![allow(dead_code)]

use async_trait::async_trait;
use ethers::{
    providers::ProviderError,
    types::{Address, Bytes, Log, TransactionReceipt, H256, U256},
    utils::parse_units,
};
use freedom_pay::{
    config::DEFAULT_TOKEN_ADDRESS,
    error::{ChainError, StoreError},
    models::{PaymentAttempt, PaymentRequest, ProcessedTransaction, TierTable},
    services::{
        verifier::transfer_event_signature, ChainClient, MemoryStore, PaymentStore,
        PaymentVerifier, VerifierSettings,
    },
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const MERCHANT: &str = "0x8ba1f109551bD432803012645Ac136ddd64DBA72";
pub const PAYER: &str = "0x71C7656EC7ab88b098defB751B7401B5f6d8976F";
pub const RECEIPT_BLOCK: u64 = 19_000_000;
pub const STARTER_CREDITS: u64 = 1_000_000;

pub fn merchant() -> Address {
    MERCHANT.parse().unwrap()
}

pub fn payer() -> Address {
    PAYER.parse().unwrap()
}

pub fn token() -> Address {
    DEFAULT_TOKEN_ADDRESS.parse().unwrap()
}

/// Decimal token amount in base units (18 decimals).
pub fn dai(amount: &str) -> U256 {
    parse_units(amount, 18).unwrap().into()
}

pub fn tx(n: u8) -> H256 {
    H256::repeat_byte(n)
}

pub fn request(tx_hash: H256, tier: &str) -> PaymentRequest {
    PaymentRequest::new(tx_hash, "user-42", tier)
}

pub fn transfer_log(token: Address, to: Address, amount: U256) -> Log {
    let mut data = [0u8; 32];
    amount.to_big_endian(&mut data);

    Log {
        address: token,
        topics: vec![transfer_event_signature(), H256::from(payer()), H256::from(to)],
        data: Bytes::from(data.to_vec()),
        ..Default::default()
    }
}

pub fn receipt(tx_hash: H256, status: u64, logs: Vec<Log>) -> TransactionReceipt {
    TransactionReceipt {
        transaction_hash: tx_hash,
        block_number: Some(RECEIPT_BLOCK.into()),
        status: Some(status.into()),
        logs,
        ..Default::default()
    }
}

/// Successful receipt paying `amount` to `to`.
pub fn paid_receipt(tx_hash: H256, to: Address, amount: U256) -> TransactionReceipt {
    receipt(tx_hash, 1, vec![transfer_log(token(), to, amount)])
}

pub fn settings(min_confirmations: u64) -> VerifierSettings {
    VerifierSettings {
        merchant_address: merchant(),
        token_address: token(),
        token_decimals: 18,
        min_confirmations,
        amount_tolerance: dai("0.01"),
        tiers: TierTable::builtin(18).unwrap(),
    }
}

/// Chain double answering from a fixed table of receipts.
#[derive(Default)]
pub struct ScriptedChain {
    receipts: Mutex<HashMap<H256, TransactionReceipt>>,
    head: AtomicU64,
    receipt_rpc_down: AtomicBool,
    head_rpc_down: AtomicBool,
    receipt_calls: AtomicUsize,
}

impl ScriptedChain {
    pub fn new(head: u64) -> Self {
        let chain = Self::default();
        chain.set_head(head);
        chain
    }

    pub fn add_receipt(&self, receipt: TransactionReceipt) {
        self.receipts
            .lock()
            .unwrap()
            .insert(receipt.transaction_hash, receipt);
    }

    pub fn set_head(&self, head: u64) {
        self.head.store(head, Ordering::SeqCst);
    }

    pub fn fail_receipts(&self) {
        self.receipt_rpc_down.store(true, Ordering::SeqCst);
    }

    pub fn fail_head(&self) {
        self.head_rpc_down.store(true, Ordering::SeqCst);
    }

    pub fn receipt_calls(&self) -> usize {
        self.receipt_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainClient for ScriptedChain {
    async fn transaction_receipt(
        &self,
        tx_hash: H256,
    ) -> Result<Option<TransactionReceipt>, ChainError> {
        self.receipt_calls.fetch_add(1, Ordering::SeqCst);
        // Let concurrent verifications interleave here, between the replay
        // check and the commit.
        tokio::task::yield_now().await;

        if self.receipt_rpc_down.load(Ordering::SeqCst) {
            return Err(ChainError::Rpc(ProviderError::CustomError(
                "connection refused".to_string(),
            )));
        }
        Ok(self.receipts.lock().unwrap().get(&tx_hash).cloned())
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        if self.head_rpc_down.load(Ordering::SeqCst) {
            return Err(ChainError::Rpc(ProviderError::CustomError(
                "service unavailable".to_string(),
            )));
        }
        Ok(self.head.load(Ordering::SeqCst))
    }
}

/// Store whose audit log is unavailable; ledger operations still work.
pub struct AuditDownStore {
    pub inner: MemoryStore,
}

#[async_trait]
impl PaymentStore for AuditDownStore {
    async fn is_processed(&self, tx_hash: &str) -> Result<bool, StoreError> {
        self.inner.is_processed(tx_hash).await
    }

    async fn record_attempt(&self, _attempt: &PaymentAttempt) -> Result<(), StoreError> {
        Err(StoreError::Redis(redis::RedisError::from((
            redis::ErrorKind::IoError,
            "audit log unavailable",
        ))))
    }

    async fn commit_payment(&self, tx: &ProcessedTransaction) -> Result<u64, StoreError> {
        self.inner.commit_payment(tx).await
    }

    async fn ping(&self) -> bool {
        false
    }
}

pub struct Harness {
    pub chain: Arc<ScriptedChain>,
    pub store: Arc<MemoryStore>,
    pub verifier: Arc<PaymentVerifier>,
}

impl Harness {
    /// Chain head sits exactly `min_confirmations` blocks past the receipt.
    pub fn new(min_confirmations: u64) -> Self {
        let chain = Arc::new(ScriptedChain::new(RECEIPT_BLOCK + min_confirmations));
        let store = Arc::new(MemoryStore::new());
        let verifier = Arc::new(PaymentVerifier::new(
            chain.clone(),
            store.clone(),
            settings(min_confirmations),
        ));

        Self {
            chain,
            store,
            verifier,
        }
    }
}
