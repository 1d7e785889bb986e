use anyhow::Result;
use ethers::types::{Address, H256};
use freedom_pay::client::PaymentClient;
use reqwest::Client;
use serde_json::{json, Value};
use std::str::FromStr;
use std::time::Duration;

const MAX_ATTEMPTS: u32 = 20;
const RETRY_DELAY: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    // Load configuration
    dotenvy::dotenv().ok();

    let base_url = std::env::var("FREEDOM_PAY_URL")
        .unwrap_or_else(|_| "http://localhost:8080".to_string());
    let private_key = std::env::var("TEST_WALLET_PRIVATE_KEY")?;
    let merchant = Address::from_str(&std::env::var("MERCHANT_ADDRESS")?)?;
    let token = Address::from_str(&std::env::var("TOKEN_CONTRACT_ADDRESS")?)?;
    let rpc_url = std::env::var("CHAIN_RPC_URL")?;
    let chain_id: u64 = std::env::var("CHAIN_ID")
        .unwrap_or_else(|_| "1".to_string())
        .parse()?;
    let user_id = std::env::var("TEST_USER_ID").unwrap_or_else(|_| "test-user".to_string());
    let tier = std::env::var("TEST_TIER").unwrap_or_else(|_| "Starter".to_string());
    let amount = std::env::var("TEST_AMOUNT").unwrap_or_else(|_| "5".to_string());

    println!("Freedom Pay Test Payer");
    println!("======================");
    println!("Server:   {}", base_url);
    println!("Merchant: {:?}", merchant);
    println!("Tier:     {} ({} tokens)", tier, amount);
    println!();

    let payment_client = PaymentClient::new(&rpc_url, &private_key, chain_id, token).await?;

    println!("Payer:    {:?}", payment_client.address());
    println!("Balance:  {}", payment_client.balance().await?);
    println!();

    println!("Step 1: Sending token payment...");
    let tx_hash = payment_client.send_payment(&amount, merchant).await?;
    println!("   [OK] Payment mined: {:?}", tx_hash);
    println!();

    println!("Step 2: Submitting payment for verification...");
    match submit_until_settled(&base_url, tx_hash, &user_id, &tier).await {
        Ok(data) => {
            println!("[SUCCESS] Payment verified:");
            println!("{}", serde_json::to_string_pretty(&data)?);
        }
        Err(e) => {
            println!("[FAILED] {}", e);
        }
    }

    Ok(())
}

/// Posts the proof, re-submitting while the service reports a retryable
/// error (receipt not indexed yet, not enough confirmations).
async fn submit_until_settled(
    base_url: &str,
    tx_hash: H256,
    user_id: &str,
    tier: &str,
) -> Result<Value> {
    let client = Client::new();
    let url = format!("{}/verify-payment", base_url);
    let body = json!({
        "txHash": format!("{:?}", tx_hash),
        "userId": user_id,
        "tierName": tier,
    });

    for attempt in 1..=MAX_ATTEMPTS {
        let response = client.post(&url).json(&body).send().await?;
        let status = response.status();
        let data: Value = response.json().await?;

        if status.is_success() {
            return Ok(data);
        }

        let error = data["error"].as_str().unwrap_or("unknown error");
        if !data["retryable"].as_bool().unwrap_or(false) {
            anyhow::bail!("Verification rejected ({}): {}", status, error);
        }

        println!(
            "   [WAIT] Attempt {}/{}: {}, retrying in {}s",
            attempt,
            MAX_ATTEMPTS,
            error,
            RETRY_DELAY.as_secs()
        );
        tokio::time::sleep(RETRY_DELAY).await;
    }

    anyhow::bail!("Payment still unsettled after {} attempts", MAX_ATTEMPTS)
}
