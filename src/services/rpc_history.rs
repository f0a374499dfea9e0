use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::{json, Value};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_client::GetConfirmedSignaturesForAddress2Config;
use solana_client::rpc_request::RpcRequest;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;

use crate::services::history::{HistorySource, Page};
use crate::services::retry::{with_backoff, RetryPolicy};
use crate::services::RpcLimiter;
use crate::types::error::SourceError;
use crate::types::records::RawActivityRecord;

const HYDRATE_CONCURRENCY: usize = 4;

/// Plain JSON-RPC history for when no indexing API key is configured:
/// `getSignaturesForAddress` pages, each signature hydrated with `getTransaction`.
pub struct RpcHistorySource {
    rpc: Arc<RpcClient>,
    limiter: Arc<RpcLimiter>,
    page_size: usize,
    tx_retry: RetryPolicy,
}

impl RpcHistorySource {
    pub fn new(rpc: Arc<RpcClient>, limiter: Arc<RpcLimiter>, page_size: usize, tx_retry: RetryPolicy) -> Self {
        Self {
            rpc,
            limiter,
            page_size: page_size.clamp(1, 1000),
            tx_retry,
        }
    }

    /// `None` when the node never returned the transaction.
    async fn hydrate(&self, signature: &str) -> Option<RawActivityRecord> {
        let label = format!("getTransaction {}", signature);
        let params = json!([
            signature,
            { "encoding": "jsonParsed", "maxSupportedTransactionVersion": 0 }
        ]);

        let result = with_backoff(&self.tx_retry, &label, |_| true, || {
            let params = params.clone();
            async move {
                self.limiter.until_ready().await;
                self.rpc.send::<Option<Value>>(RpcRequest::GetTransaction, params).await
            }
        })
        .await;

        match result {
            Ok(Some(tx)) => Some(RawActivityRecord::classify(tx)),
            Ok(None) => {
                tracing::debug!("Transaction {} not available", signature);
                None
            }
            Err(e) => {
                tracing::warn!("Dropping transaction {}: {}", signature, e);
                None
            }
        }
    }
}

#[async_trait]
impl HistorySource for RpcHistorySource {
    fn name(&self) -> &'static str {
        "rpc"
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    async fn fetch_page(&self, address: &str, before: Option<&str>) -> Result<Page, SourceError> {
        let pubkey = Pubkey::from_str(address).map_err(|e| SourceError::Decode(e.to_string()))?;
        let before = before
            .map(Signature::from_str)
            .transpose()
            .map_err(|e| SourceError::Decode(e.to_string()))?;
        let config = GetConfirmedSignaturesForAddress2Config {
            before,
            limit: Some(self.page_size),
            ..Default::default()
        };

        self.limiter.until_ready().await;
        let signatures = self.rpc.get_signatures_for_address_with_config(&pubkey, config).await?;
        let listed = signatures.len();
        let cursor = signatures.last().map(|status| status.signature.clone());
        let signatures: Vec<String> = signatures.into_iter().map(|status| status.signature).collect();

        let records: Vec<RawActivityRecord> = stream::iter(signatures)
            .map(|signature| async move { self.hydrate(&signature).await })
            .buffered(HYDRATE_CONCURRENCY)
            .filter_map(|record| async move { record })
            .collect()
            .await;

        if records.len() < listed {
            tracing::info!("Hydrated {}/{} transactions", records.len(), listed);
        }
        Ok(Page { records, listed, cursor })
    }
}
