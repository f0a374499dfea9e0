//! HTTP price feeds, tried in this order: Jupiter (aggregator), CoinGecko
//! (general market, only for tokens with a known CoinGecko id) and
//! DexScreener (by mint address).

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use rust_decimal::Decimal;
use serde_json::Value;

use crate::services::prices::PriceProvider;
use crate::types::error::PriceError;
use crate::types::models::PriceSource;
use crate::types::records::decimal_from_json;
use crate::types::tokens::market_id_for;

pub const JUPITER_PRICE_API: &str = "https://api.jup.ag/price/v3";
pub const COINGECKO_API: &str = "https://api.coingecko.com/api/v3";
pub const DEXSCREENER_API: &str = "https://api.dexscreener.com";

/// Jupiter accepts at most this many ids per request.
pub const JUPITER_MAX_IDS: usize = 100;
const DEXSCREENER_MAX_ADDRESSES: usize = 30;

async fn get_json(request: RequestBuilder) -> Result<Value, PriceError> {
    let response = request.send().await?;
    if !response.status().is_success() {
        return Err(PriceError::Status(response.status().as_u16()));
    }
    decode_body(&response.text().await?)
}

pub fn decode_body(body: &str) -> Result<Value, PriceError> {
    serde_json::from_str(body).map_err(|e| PriceError::Decode(e.to_string()))
}

pub struct JupiterPriceFeed {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl JupiterPriceFeed {
    pub fn new(client: Client, api_key: Option<String>) -> Self {
        Self::with_base_url(client, api_key, JUPITER_PRICE_API)
    }

    pub fn with_base_url(client: Client, api_key: Option<String>, base_url: &str) -> Self {
        Self { client, api_key, base_url: base_url.to_string() }
    }

    /// Ids past the first hundred are not asked for at all.
    pub fn request_ids(asset_ids: &[String]) -> &[String] {
        &asset_ids[..asset_ids.len().min(JUPITER_MAX_IDS)]
    }
}

/// Reads both the v3 shape (`{mint: {usdPrice}}`) and the v2 shape (`{data: {mint: {price}}}`).
pub fn parse_jupiter_prices(body: &Value) -> HashMap<String, Decimal> {
    let (entries, field) = match body.get("data").and_then(Value::as_object) {
        Some(data) => (data, "price"),
        None => match body.as_object() {
            Some(top) => (top, "usdPrice"),
            None => return HashMap::new(),
        },
    };
    entries
        .iter()
        .filter_map(|(mint, info)| {
            let price = decimal_from_json(info.get(field)?)?;
            Some((mint.clone(), price))
        })
        .collect()
}

#[async_trait]
impl PriceProvider for JupiterPriceFeed {
    fn source(&self) -> PriceSource {
        PriceSource::Jupiter
    }

    async fn prices(&self, asset_ids: &[String]) -> Result<HashMap<String, Decimal>, PriceError> {
        let ids = Self::request_ids(asset_ids);
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        if asset_ids.len() > ids.len() {
            tracing::debug!("Jupiter: {} ids over the limit left out", asset_ids.len() - ids.len());
        }

        let mut request = self.client.get(&self.base_url).query(&[("ids", ids.join(","))]);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }
        let body = get_json(request).await?;
        Ok(parse_jupiter_prices(&body))
    }
}

pub struct CoinGeckoPriceFeed {
    client: Client,
    base_url: String,
}

impl CoinGeckoPriceFeed {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, COINGECKO_API)
    }

    pub fn with_base_url(client: Client, base_url: &str) -> Self {
        Self { client, base_url: base_url.to_string() }
    }
}

/// market id -> mints that share it
pub fn market_ids(asset_ids: &[String]) -> HashMap<&'static str, Vec<String>> {
    let mut by_market: HashMap<&'static str, Vec<String>> = HashMap::new();
    for id in asset_ids {
        if let Some(market_id) = market_id_for(id) {
            by_market.entry(market_id).or_default().push(id.clone());
        }
    }
    by_market
}

/// `{"solana": {"usd": 150.1}}` mapped back onto mints.
pub fn parse_coingecko_prices(body: &Value, by_market: &HashMap<&'static str, Vec<String>>) -> HashMap<String, Decimal> {
    let mut prices = HashMap::new();
    for (market_id, mints) in by_market {
        let Some(price) = body.get(*market_id).and_then(|entry| entry.get("usd")).and_then(decimal_from_json) else {
            continue;
        };
        for mint in mints {
            prices.insert(mint.clone(), price);
        }
    }
    prices
}

#[async_trait]
impl PriceProvider for CoinGeckoPriceFeed {
    fn source(&self) -> PriceSource {
        PriceSource::CoinGecko
    }

    async fn prices(&self, asset_ids: &[String]) -> Result<HashMap<String, Decimal>, PriceError> {
        let by_market = market_ids(asset_ids);
        if by_market.is_empty() {
            return Ok(HashMap::new());
        }
        let mut ids: Vec<&str> = by_market.keys().copied().collect();
        ids.sort_unstable();

        let url = format!("{}/simple/price", self.base_url);
        let request = self
            .client
            .get(url)
            .query(&[("ids", ids.join(",")), ("vs_currencies", "usd".to_string())]);
        let body = get_json(request).await?;
        Ok(parse_coingecko_prices(&body, &by_market))
    }
}

pub struct DexScreenerPriceFeed {
    client: Client,
    base_url: String,
}

impl DexScreenerPriceFeed {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, DEXSCREENER_API)
    }

    pub fn with_base_url(client: Client, base_url: &str) -> Self {
        Self { client, base_url: base_url.to_string() }
    }
}

/// Picks, for each requested mint, the most liquid pair where it is the base token.
pub fn parse_dexscreener_prices(body: &Value, requested: &[String]) -> HashMap<String, Decimal> {
    let mut best: HashMap<String, (Decimal, Decimal)> = HashMap::new();
    let pairs = body.get("pairs").and_then(Value::as_array).map(Vec::as_slice).unwrap_or_default();

    for pair in pairs {
        let Some(base) = pair.get("baseToken").and_then(|t| t.get("address")).and_then(Value::as_str) else {
            continue;
        };
        if !requested.iter().any(|id| id == base) {
            continue;
        }
        let Some(price) = pair.get("priceUsd").and_then(decimal_from_json) else {
            continue;
        };
        let liquidity = pair
            .get("liquidity")
            .and_then(|l| l.get("usd"))
            .and_then(decimal_from_json)
            .unwrap_or(Decimal::ZERO);

        match best.get(base) {
            Some((_, current)) if *current >= liquidity => {}
            _ => {
                best.insert(base.to_string(), (price, liquidity));
            }
        }
    }

    best.into_iter().map(|(mint, (price, _))| (mint, price)).collect()
}

#[async_trait]
impl PriceProvider for DexScreenerPriceFeed {
    fn source(&self) -> PriceSource {
        PriceSource::DexScreener
    }

    async fn prices(&self, asset_ids: &[String]) -> Result<HashMap<String, Decimal>, PriceError> {
        let mut prices = HashMap::new();
        let mut last_error = None;
        let mut succeeded = false;

        for chunk in asset_ids.chunks(DEXSCREENER_MAX_ADDRESSES) {
            let url = format!("{}/latest/dex/tokens/{}", self.base_url, chunk.join(","));
            match get_json(self.client.get(url)).await {
                Ok(body) => {
                    succeeded = true;
                    prices.extend(parse_dexscreener_prices(&body, chunk));
                }
                Err(e) => {
                    tracing::warn!("DexScreener chunk of {} failed: {}", chunk.len(), e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if !succeeded => Err(e),
            _ => Ok(prices),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::tokens::NATIVE_MINT;
    use rust_decimal_macros::dec;
    use serde_json::json;

    const UNREACHABLE: &str = "http://127.0.0.1:1";

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_decode_body() {
        assert_eq!(decode_body(r#"{"a": 1}"#).unwrap(), json!({ "a": 1 }));
        assert!(matches!(decode_body("<html>rate limited</html>"), Err(PriceError::Decode(_))));
    }

    #[tokio::test]
    async fn test_unreachable_feeds_report_transport_errors() {
        let client = Client::new();
        let jupiter = JupiterPriceFeed::with_base_url(client.clone(), Some("key".to_string()), UNREACHABLE);
        let dexscreener = DexScreenerPriceFeed::with_base_url(client.clone(), UNREACHABLE);
        let coingecko = CoinGeckoPriceFeed::with_base_url(client, UNREACHABLE);

        assert!(matches!(jupiter.prices(&ids(&["MintA"])).await, Err(PriceError::Transport(_))));
        assert!(matches!(dexscreener.prices(&ids(&["MintA"])).await, Err(PriceError::Transport(_))));
        assert!(matches!(coingecko.prices(&ids(&[NATIVE_MINT])).await, Err(PriceError::Transport(_))));
        // nothing with a market id, so no request is made
        assert!(coingecko.prices(&ids(&["MintA"])).await.unwrap().is_empty());
    }

    #[test]
    fn test_parse_jupiter_v3() {
        let body = json!({
            "MintA": { "usdPrice": 1.25, "decimals": 6 },
            "MintB": { "decimals": 9 },
            "MintC": null
        });
        let prices = parse_jupiter_prices(&body);
        assert_eq!(prices.len(), 1);
        assert_eq!(prices["MintA"], dec!(1.25));
    }

    #[test]
    fn test_parse_jupiter_v2() {
        let body = json!({ "data": { "MintA": { "id": "MintA", "price": "0.0042" } }, "timeTaken": 0.01 });
        assert_eq!(parse_jupiter_prices(&body)["MintA"], dec!(0.0042));
        assert!(parse_jupiter_prices(&json!([1, 2])).is_empty());
    }

    #[test]
    fn test_jupiter_request_is_capped_not_chunked() {
        let ids: Vec<String> = (0..150).map(|i| format!("mint{}", i)).collect();
        let requested = JupiterPriceFeed::request_ids(&ids);
        assert_eq!(requested.len(), JUPITER_MAX_IDS);
        assert_eq!(requested.last().unwrap(), "mint99");
        assert_eq!(JupiterPriceFeed::request_ids(&ids[..3]).len(), 3);
    }

    #[test]
    fn test_coingecko_only_for_known_market_ids() {
        let ids = vec![NATIVE_MINT.to_string(), "UnknownMint".to_string()];
        let by_market = market_ids(&ids);
        assert_eq!(by_market.len(), 1);
        assert_eq!(by_market["solana"], vec![NATIVE_MINT.to_string()]);

        let body = json!({ "solana": { "usd": 151.37 } });
        let prices = parse_coingecko_prices(&body, &by_market);
        assert_eq!(prices[NATIVE_MINT], dec!(151.37));
        assert!(parse_coingecko_prices(&json!({}), &by_market).is_empty());
    }

    #[test]
    fn test_dexscreener_prefers_most_liquid_pair() {
        let body = json!({
            "schemaVersion": "1.0.0",
            "pairs": [
                { "baseToken": { "address": "MintA" }, "priceUsd": "0.10", "liquidity": { "usd": 500.0 } },
                { "baseToken": { "address": "MintA" }, "priceUsd": "0.12", "liquidity": { "usd": 90000.0 } },
                { "baseToken": { "address": "MintA" }, "priceUsd": "0.50" },
                { "baseToken": { "address": "Quote" }, "priceUsd": "1.0" },
                { "baseToken": { "address": "MintB" } }
            ]
        });
        let requested = vec!["MintA".to_string(), "MintB".to_string()];
        let prices = parse_dexscreener_prices(&body, &requested);
        assert_eq!(prices.len(), 1);
        assert_eq!(prices["MintA"], dec!(0.12));
        assert!(parse_dexscreener_prices(&json!({ "pairs": null }), &requested).is_empty());
    }
}
