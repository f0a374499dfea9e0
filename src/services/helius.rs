use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::services::history::{HistorySource, Page};
use crate::services::RpcLimiter;
use crate::types::error::SourceError;
use crate::types::records::RawActivityRecord;

pub const HELIUS_API: &str = "https://api.helius.xyz/v0";
pub const HELIUS_PAGE_SIZE: usize = 100;

/// Helius enhanced-transactions API: parsed history, newest first, 100 per page.
pub struct HeliusHistorySource {
    client: Client,
    api_key: String,
    base_url: String,
    limiter: Arc<RpcLimiter>,
}

impl HeliusHistorySource {
    pub fn new(client: Client, api_key: String, limiter: Arc<RpcLimiter>) -> Self {
        Self::with_base_url(client, api_key, limiter, HELIUS_API)
    }

    pub fn with_base_url(client: Client, api_key: String, limiter: Arc<RpcLimiter>, base_url: &str) -> Self {
        Self {
            client,
            api_key,
            base_url: base_url.to_string(),
            limiter,
        }
    }
}

#[async_trait]
impl HistorySource for HeliusHistorySource {
    fn name(&self) -> &'static str {
        "helius"
    }

    fn page_size(&self) -> usize {
        HELIUS_PAGE_SIZE
    }

    async fn fetch_page(&self, address: &str, before: Option<&str>) -> Result<Page, SourceError> {
        self.limiter.until_ready().await;

        let url = format!("{}/addresses/{}/transactions", self.base_url, address);
        let limit = HELIUS_PAGE_SIZE.to_string();
        let mut query = vec![("api-key", self.api_key.as_str()), ("limit", limit.as_str())];
        if let Some(before) = before {
            query.push(("before", before));
        }

        let response = self.client.get(url).query(&query).send().await?;
        if !response.status().is_success() {
            tracing::warn!("Helius API error: {}", response.status());
            return Err(SourceError::Status(response.status().as_u16()));
        }

        let transactions: Vec<Value> = response.json().await?;
        let records = transactions.into_iter().map(RawActivityRecord::classify).collect();
        Ok(Page::from_records(records))
    }
}
