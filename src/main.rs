use anyhow::Result;
use freedom_pay::{
    config::Config,
    handlers::{router, AppState},
    services::*,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    tracing::info!("Starting freedom-pay v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {:?}", config.environment);

    // Initialize services
    let chain: Arc<dyn ChainClient> = Arc::new(ChainService::new(
        &config.chain_rpc_url,
        config.chain_rpc_fallback.as_deref(),
        config.rpc_timeout,
    )?);

    match chain.block_number().await {
        Ok(head) => tracing::info!("Chain RPC connected, current block: {}", head),
        Err(e) => tracing::warn!("Chain RPC not reachable at startup: {}", e),
    }

    let store: Arc<dyn PaymentStore> = match &config.redis_url {
        Some(url) => Arc::new(RedisStore::connect(url).await?),
        None => {
            tracing::warn!("REDIS_URL not set, using in-memory ledger (not persisted)");
            Arc::new(MemoryStore::new())
        }
    };

    let verifier = Arc::new(PaymentVerifier::new(
        chain.clone(),
        store.clone(),
        config.verifier_settings()?,
    ));

    let app = router(AppState::new(verifier, chain, store));

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("Payment endpoint: http://{}/verify-payment", addr);
    tracing::info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for ctrl+c: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down gracefully...");
}
