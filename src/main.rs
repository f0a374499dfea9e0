use anyhow::Result;
use dotenv::dotenv;
use std::num::NonZeroU32;
use std::sync::Arc;
use solana_client::nonblocking::rpc_client::RpcClient;
use tokio::net::TcpListener;
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use solana_sdk::commitment_config::CommitmentConfig;
use reqwest::Client as ReqwestClient;
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod services;
mod types;

use crate::api::routes::create_router;
use crate::api::state::AppState;
use crate::config::Settings;
use crate::services::helius::HeliusHistorySource;
use crate::services::history::{HistoryFetcher, HistorySource};
use crate::services::portfolio::PortfolioService;
use crate::services::price_feeds::{CoinGeckoPriceFeed, DexScreenerPriceFeed, JupiterPriceFeed};
use crate::services::prices::{PriceProvider, PriceResolver};
use crate::services::report::ReportService;
use crate::services::rpc_history::RpcHistorySource;
use crate::services::volume::VolumeAggregator;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::from_env()?;

    let quota = NonZeroU32::new(settings.requests_per_second).unwrap_or(nonzero!(5u32));
    let rpc_limiter = Arc::new(RateLimiter::direct(Quota::per_second(quota)));
    let rpc_client = Arc::new(RpcClient::new_with_timeout_and_commitment(
        settings.rpc_url.clone(),
        std::time::Duration::from_secs(60),
        CommitmentConfig::confirmed(),
    ));

    // Test RPC connection at startup
    match rpc_client.get_version().await {
        Ok(version) => tracing::info!("Connected to Solana RPC (version: {})", version.solana_core),
        Err(e) => tracing::error!("Failed to connect to RPC: {:?}", e),
    };

    let http = ReqwestClient::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?;

    let providers: Vec<Arc<dyn PriceProvider>> = vec![
        Arc::new(JupiterPriceFeed::new(http.clone(), settings.jupiter_api_key.clone())),
        Arc::new(CoinGeckoPriceFeed::new(http.clone())),
        Arc::new(DexScreenerPriceFeed::new(http.clone())),
    ];
    let prices = Arc::new(PriceResolver::new(providers));

    let source: Arc<dyn HistorySource> = match &settings.helius_api_key {
        Some(key) => Arc::new(HeliusHistorySource::new(http.clone(), key.clone(), rpc_limiter.clone())),
        None => {
            tracing::warn!(
                "HELIUS_API_KEY not set; using RPC history capped at {} transactions",
                settings.rpc_max_transactions
            );
            Arc::new(RpcHistorySource::new(
                rpc_client.clone(),
                rpc_limiter.clone(),
                settings.rpc_max_transactions.min(100),
                settings.retry_policy(),
            ))
        }
    };
    tracing::info!("History source: {}", source.name());

    let reports = ReportService::new(
        HistoryFetcher::new(source, settings.fetch_policy()),
        VolumeAggregator::new(prices.clone()),
    );
    let portfolio = PortfolioService::new(rpc_client.clone(), rpc_limiter.clone(), prices);

    let state = AppState {
        reports: Arc::new(reports),
        portfolio: Arc::new(portfolio),
        default_wallet: settings.default_wallet.clone(),
        report_timeout: settings.report_timeout,
    };
    let app = create_router(state);

    tracing::info!("Listening on {}", settings.bind_addr);
    let listener = TcpListener::bind(settings.bind_addr).await?;

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
