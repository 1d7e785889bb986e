mod common;

use common::*;
use ethers::{types::Address, utils::to_checksum};
use freedom_pay::{
    error::{ErrorKind, PaymentError},
    models::AttemptStatus,
    services::{MemoryStore, PaymentVerifier},
};
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

fn statuses(attempts: &[freedom_pay::models::PaymentAttempt]) -> Vec<AttemptStatus> {
    attempts.iter().map(|a| a.status).collect()
}

#[tokio::test]
async fn starter_payment_with_exact_confirmations_credits_user() {
    let h = Harness::new(3);
    h.store.set_balance("user-42", 250).await;
    h.chain.add_receipt(paid_receipt(tx(1), merchant(), dai("5")));

    let verified = assert_ok!(h.verifier.verify(&request(tx(1), "Starter")).await);

    assert_eq!(verified.new_balance, 250 + STARTER_CREDITS);
    assert_eq!(verified.credits_granted, STARTER_CREDITS);
    assert_eq!(verified.confirmations, 3);
    assert_eq!(verified.tier, "Starter");
    assert_eq!(verified.amount, dai("5"));

    let row = h.store.processed(&format!("{:?}", tx(1))).await.unwrap();
    assert_eq!(row.user_id, "user-42");
    assert_eq!(row.block_number, RECEIPT_BLOCK);
    assert_eq!(row.amount, dai("5").to_string());

    let attempts = h.store.attempts().await;
    assert_eq!(statuses(&attempts), vec![AttemptStatus::Verified]);
    assert!(attempts[0].message.contains("3 confirmations"));
}

#[tokio::test]
async fn replayed_hash_is_rejected_without_chain_io() {
    let h = Harness::new(3);
    h.chain.add_receipt(paid_receipt(tx(2), merchant(), dai("5")));
    let req = request(tx(2), "Starter");

    assert_ok!(h.verifier.verify(&req).await);
    for _ in 0..2 {
        let err = assert_err!(h.verifier.verify(&req).await);
        assert!(matches!(err, PaymentError::AlreadyProcessed));
        assert_eq!(err.kind(), ErrorKind::Duplicate);
    }

    assert_eq!(h.chain.receipt_calls(), 1);
    assert_eq!(h.store.balance("user-42").await, STARTER_CREDITS);
    assert_eq!(
        statuses(&h.store.attempts().await),
        vec![
            AttemptStatus::Verified,
            AttemptStatus::Duplicate,
            AttemptStatus::Duplicate
        ]
    );
}

#[tokio::test]
async fn recipient_off_by_one_character_is_rejected() {
    let h = Harness::new(3);
    let wrong: Address = "0x8ba1f109551bD432803012645Ac136ddd64DBA73".parse().unwrap();
    h.chain.add_receipt(paid_receipt(tx(3), wrong, dai("5")));

    let err = assert_err!(h.verifier.verify(&request(tx(3), "Starter")).await);
    assert_eq!(err.to_string(), "Payment not sent to correct merchant address");
    assert_eq!(err.kind(), ErrorKind::Mismatch);

    assert_eq!(h.store.balance("user-42").await, 0);
    assert_eq!(h.store.processed_count().await, 0);

    let attempts = h.store.attempts().await;
    assert_eq!(statuses(&attempts), vec![AttemptStatus::Failed]);
    assert!(attempts[0].message.contains(&to_checksum(&wrong, None)));
}

#[tokio::test]
async fn merchant_comparison_ignores_address_case() {
    let h = Harness::new(3);
    let lowercase: Address = MERCHANT.to_lowercase().parse().unwrap();
    h.chain.add_receipt(paid_receipt(tx(4), lowercase, dai("5")));

    assert_ok!(h.verifier.verify(&request(tx(4), "Starter")).await);
}

#[tokio::test]
async fn amount_tolerance_boundary() {
    let h = Harness::new(3);

    let cases = [
        (10u8, "5.01", true),
        (11, "4.99", true),
        (12, "5.011", false),
        (13, "4.989", false),
        (14, "5", true),
        (15, "6", false),
    ];

    for (n, amount, accepted) in cases {
        h.chain.add_receipt(paid_receipt(tx(n), merchant(), dai(amount)));
        let result = h.verifier.verify(&request(tx(n), "Starter")).await;

        if accepted {
            assert!(result.is_ok(), "{} should be accepted: {:?}", amount, result);
        } else {
            match result {
                Err(PaymentError::IncorrectAmount { expected, received }) => {
                    assert_eq!(expected, "5.000000000000000000");
                    assert!(received.starts_with(amount), "received {}", received);
                }
                other => panic!("{} should be rejected, got {:?}", amount, other),
            }
        }
    }

    let attempts = h.store.attempts().await;
    let rejected = attempts
        .iter()
        .find(|a| a.status == AttemptStatus::Failed)
        .unwrap();
    assert!(
        rejected.message.starts_with("Incorrect amount for Starter tier (price 5)"),
        "{}",
        rejected.message
    );
}

#[tokio::test]
async fn confirmations_gate_and_later_retry_succeeds() {
    let h = Harness::new(3);
    h.chain.set_head(RECEIPT_BLOCK + 2);
    h.chain.add_receipt(paid_receipt(tx(5), merchant(), dai("5")));
    let req = request(tx(5), "Starter");

    let err = assert_err!(h.verifier.verify(&req).await);
    assert!(matches!(
        err,
        PaymentError::InsufficientConfirmations { confirmations: 2, required: 3 }
    ));
    assert!(err.retryable());
    assert_eq!(h.store.processed_count().await, 0);

    h.chain.set_head(RECEIPT_BLOCK + 3);
    let verified = assert_ok!(h.verifier.verify(&req).await);
    assert_eq!(verified.confirmations, 3);

    let attempts = h.store.attempts().await;
    assert_eq!(
        statuses(&attempts),
        vec![AttemptStatus::Pending, AttemptStatus::Verified]
    );
    assert!(attempts[0].message.contains("2/3"));
}

#[tokio::test]
async fn head_behind_receipt_counts_as_zero_confirmations() {
    let h = Harness::new(3);
    h.chain.set_head(RECEIPT_BLOCK - 1);
    h.chain.add_receipt(paid_receipt(tx(6), merchant(), dai("5")));

    let err = assert_err!(h.verifier.verify(&request(tx(6), "Starter")).await);
    assert!(matches!(
        err,
        PaymentError::InsufficientConfirmations { confirmations: 0, .. }
    ));
}

#[tokio::test]
async fn unknown_tier_fails_before_any_chain_call() {
    let h = Harness::new(3);
    h.chain.add_receipt(paid_receipt(tx(7), merchant(), dai("5")));

    let err = assert_err!(h.verifier.verify(&request(tx(7), "Gold")).await);
    assert!(matches!(err, PaymentError::InvalidTier(ref t) if t == "Gold"));
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(h.chain.receipt_calls(), 0);

    let attempts = h.store.attempts().await;
    assert_eq!(statuses(&attempts), vec![AttemptStatus::Failed]);
    assert_eq!(attempts[0].tier_name, "Gold");
}

#[tokio::test]
async fn unknown_tier_wins_over_bad_chain_data() {
    let h = Harness::new(3);
    h.chain.fail_receipts();

    let err = assert_err!(h.verifier.verify(&request(tx(8), "starter")).await);
    assert!(matches!(err, PaymentError::InvalidTier(_)));
    assert_eq!(h.store.attempts().await.len(), 1);
}

#[tokio::test]
async fn missing_receipt_is_not_confirmed() {
    let h = Harness::new(3);

    let err = assert_err!(h.verifier.verify(&request(tx(9), "Starter")).await);
    assert_eq!(err.to_string(), "Transaction not confirmed yet, please wait");
    assert_eq!(err.kind(), ErrorKind::Pending);

    let attempts = h.store.attempts().await;
    assert_eq!(attempts[0].status, AttemptStatus::Failed);
    assert!(attempts[0].message.contains("receipt is null"));
}

#[tokio::test]
async fn receipt_without_block_number_is_not_confirmed() {
    let h = Harness::new(3);
    let mut pending = paid_receipt(tx(20), merchant(), dai("5"));
    pending.block_number = None;
    h.chain.add_receipt(pending);

    let err = assert_err!(h.verifier.verify(&request(tx(20), "Starter")).await);
    assert!(matches!(err, PaymentError::NotConfirmed));
}

#[tokio::test]
async fn rpc_failure_reports_not_found_and_audits_cause() {
    let h = Harness::new(3);
    h.chain.fail_receipts();

    let err = assert_err!(h.verifier.verify(&request(tx(21), "Starter")).await);
    assert!(matches!(err, PaymentError::TransactionNotFound));
    assert!(err.retryable());

    let attempts = h.store.attempts().await;
    assert!(attempts[0].message.contains("connection refused"));
}

#[tokio::test]
async fn reverted_transaction_is_rejected() {
    let h = Harness::new(3);
    h.chain.add_receipt(receipt(
        tx(22),
        0,
        vec![transfer_log(token(), merchant(), dai("5"))],
    ));

    let err = assert_err!(h.verifier.verify(&request(tx(22), "Starter")).await);
    assert!(matches!(err, PaymentError::TransactionFailed));
}

#[tokio::test]
async fn transfer_of_another_token_is_not_a_payment() {
    let h = Harness::new(3);
    let other_token = Address::repeat_byte(0x77);
    h.chain.add_receipt(receipt(
        tx(23),
        1,
        vec![transfer_log(other_token, merchant(), dai("5"))],
    ));

    let err = assert_err!(h.verifier.verify(&request(tx(23), "Starter")).await);
    assert!(matches!(err, PaymentError::NoTransferFound));
    assert_eq!(err.kind(), ErrorKind::Mismatch);
}

#[tokio::test]
async fn head_lookup_failure_is_internal() {
    let h = Harness::new(3);
    h.chain.fail_head();
    h.chain.add_receipt(paid_receipt(tx(24), merchant(), dai("5")));

    let err = assert_err!(h.verifier.verify(&request(tx(24), "Starter")).await);
    assert!(matches!(err, PaymentError::Internal(_)));
    assert_eq!(h.store.processed_count().await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submissions_credit_exactly_once() {
    let h = Harness::new(3);
    h.chain.add_receipt(paid_receipt(tx(30), merchant(), dai("5")));
    let req = request(tx(30), "Starter");

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let verifier = h.verifier.clone();
            let req = req.clone();
            tokio::spawn(async move { verifier.verify(&req).await })
        })
        .collect();

    let results: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert_eq!(err.kind(), ErrorKind::Duplicate, "unexpected error {:?}", err);
    }

    assert_eq!(h.store.balance("user-42").await, STARTER_CREDITS);
    assert_eq!(h.store.processed_count().await, 1);
}

#[tokio::test]
async fn interleaved_pair_yields_one_success_and_one_duplicate() {
    let h = Harness::new(3);
    h.chain.add_receipt(paid_receipt(tx(31), merchant(), dai("5")));
    let req = request(tx(31), "Starter");

    let (first, second) = tokio::join!(h.verifier.verify(&req), h.verifier.verify(&req));

    let (ok, err) = match (first, second) {
        (Ok(ok), Err(err)) | (Err(err), Ok(ok)) => (ok, err),
        other => panic!("expected one success and one duplicate, got {:?}", other),
    };
    assert_eq!(ok.new_balance, STARTER_CREDITS);
    // Both passed the replay check before either committed.
    assert!(matches!(err, PaymentError::AlreadyBeingProcessed));

    let attempts = h.store.attempts().await;
    let duplicate = attempts
        .iter()
        .find(|a| a.status == AttemptStatus::Duplicate)
        .unwrap();
    assert!(duplicate.message.contains("Concurrent duplicate"));
}

#[tokio::test]
async fn audit_outage_does_not_change_results() {
    let chain = Arc::new(ScriptedChain::new(RECEIPT_BLOCK + 3));
    let store = Arc::new(AuditDownStore {
        inner: MemoryStore::new(),
    });
    let verifier = PaymentVerifier::new(chain.clone(), store.clone(), settings(3));

    chain.add_receipt(paid_receipt(tx(40), merchant(), dai("5")));
    let verified = assert_ok!(verifier.verify(&request(tx(40), "Starter")).await);
    assert_eq!(verified.new_balance, STARTER_CREDITS);

    let err = assert_err!(verifier.verify(&request(tx(40), "Starter")).await);
    assert!(matches!(err, PaymentError::AlreadyProcessed));

    chain.add_receipt(paid_receipt(tx(41), Address::repeat_byte(0x01), dai("5")));
    let err = assert_err!(verifier.verify(&request(tx(41), "Starter")).await);
    assert!(matches!(err, PaymentError::WrongRecipient));
}
