use axum::{
    extract::{State, Query},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use tokio::time::timeout;
use crate::types::models::{PortfolioSnapshot, VolumeReport, WindowSpec};
use super::error::ApiError;
use super::state::AppState;

pub const DEFAULT_TOKEN_LIMIT: usize = 20;

#[derive(Deserialize)]
pub struct WalletParams {
    pub address: Option<String>,
}

#[derive(Deserialize)]
pub struct VolumeParams {
    pub address: Option<String>,
    pub windows: Option<String>,
    pub limit: Option<usize>,
}

/// Falls back to the configured wallet when the request names none.
pub fn resolve_address(requested: Option<&str>, default: Option<&str>) -> Result<Pubkey, ApiError> {
    let address = requested
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .or(default)
        .ok_or_else(|| ApiError::InvalidAddress("no address given".to_string()))?;
    Pubkey::from_str(address).map_err(|_| ApiError::InvalidAddress(address.to_string()))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn get_balance(
    State(state): State<AppState>,
    Query(params): Query<WalletParams>,
) -> Result<Json<PortfolioSnapshot>, ApiError> {
    let owner = resolve_address(params.address.as_deref(), state.default_wallet.as_deref())?;

    match timeout(state.report_timeout, state.portfolio.snapshot(&owner)).await {
        Ok(Ok(snapshot)) => Ok(Json(snapshot)),
        Ok(Err(e)) => Err(ApiError::Rpc(e.to_string())),
        Err(_) => Err(ApiError::Timeout(state.report_timeout.as_secs())),
    }
}

pub async fn get_volume(
    State(state): State<AppState>,
    Query(params): Query<VolumeParams>,
) -> Result<Json<VolumeReport>, ApiError> {
    let owner = resolve_address(params.address.as_deref(), state.default_wallet.as_deref())?;
    let windows = WindowSpec::parse_list(params.windows.as_deref().unwrap_or_default())
        .map_err(ApiError::InvalidWindow)?;
    let limit = params.limit.unwrap_or(DEFAULT_TOKEN_LIMIT);
    let address = owner.to_string();

    timeout(state.report_timeout, state.reports.volume_report(&address, &windows, Some(limit)))
        .await
        .map(Json)
        .map_err(|_| ApiError::Timeout(state.report_timeout.as_secs()))
}
