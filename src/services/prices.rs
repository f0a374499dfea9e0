use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::types::error::PriceError;
use crate::types::models::{PriceQuote, PriceSource};

/// A current-price feed. Providers only report ids they could price; anything
/// they don't recognise is left out of the returned map.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    fn source(&self) -> PriceSource;

    async fn prices(&self, asset_ids: &[String]) -> Result<HashMap<String, Decimal>, PriceError>;
}

/// Resolves USD prices by asking each provider in turn for whatever is still
/// unpriced. A failing provider contributes nothing and the next one is tried.
pub struct PriceResolver {
    providers: Vec<Arc<dyn PriceProvider>>,
}

impl PriceResolver {
    pub fn new(providers: Vec<Arc<dyn PriceProvider>>) -> Self {
        Self { providers }
    }

    pub async fn resolve(&self, asset_ids: &BTreeSet<String>) -> HashMap<String, PriceQuote> {
        let mut quotes: HashMap<String, PriceQuote> = HashMap::new();

        for provider in &self.providers {
            let pending: Vec<String> = asset_ids
                .iter()
                .filter(|id| !quotes.contains_key(*id))
                .cloned()
                .collect();
            if pending.is_empty() {
                break;
            }

            let source = provider.source();
            match provider.prices(&pending).await {
                Ok(prices) => {
                    let mut added = 0;
                    for id in &pending {
                        // zero or negative prices are no better than no price
                        let Some(&price) = prices.get(id).filter(|p| **p > Decimal::ZERO) else {
                            continue;
                        };
                        quotes.insert(
                            id.clone(),
                            PriceQuote { asset_id: id.clone(), unit_price_usd: price, source },
                        );
                        added += 1;
                    }
                    tracing::info!("{:?} priced {}/{} assets", source, added, pending.len());
                }
                Err(e) => {
                    tracing::warn!("{:?} price feed unavailable for {} assets: {}", source, pending.len(), e);
                }
            }
        }

        let missing = asset_ids.len() - quotes.len();
        if missing > 0 {
            tracing::info!("No price found for {} of {} assets", missing, asset_ids.len());
        }
        quotes
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    pub(crate) struct FixedPrices {
        source: PriceSource,
        prices: HashMap<String, Decimal>,
        fail: bool,
        pub(crate) requests: Mutex<Vec<Vec<String>>>,
    }

    impl FixedPrices {
        pub(crate) fn new(source: PriceSource, prices: &[(&str, Decimal)]) -> Self {
            Self {
                source,
                prices: prices.iter().map(|(id, p)| (id.to_string(), *p)).collect(),
                fail: false,
                requests: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn failing(source: PriceSource) -> Self {
            Self { fail: true, ..Self::new(source, &[]) }
        }
    }

    #[async_trait]
    impl PriceProvider for FixedPrices {
        fn source(&self) -> PriceSource {
            self.source
        }

        async fn prices(&self, asset_ids: &[String]) -> Result<HashMap<String, Decimal>, PriceError> {
            self.requests.lock().unwrap().push(asset_ids.to_vec());
            if self.fail {
                return Err(PriceError::Status(503));
            }
            Ok(self.prices.clone())
        }
    }

    fn ids(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_later_sources_only_see_unresolved_ids() {
        let primary = Arc::new(FixedPrices::new(PriceSource::Jupiter, &[("A", dec!(1.5))]));
        let secondary = Arc::new(FixedPrices::new(PriceSource::CoinGecko, &[("A", dec!(9)), ("B", dec!(2))]));
        let tertiary = Arc::new(FixedPrices::new(PriceSource::DexScreener, &[("C", dec!(0.01))]));
        let resolver = PriceResolver::new(vec![primary.clone(), secondary.clone(), tertiary.clone()]);

        let quotes = resolver.resolve(&ids(&["A", "B", "C", "D"])).await;

        assert_eq!(quotes["A"].unit_price_usd, dec!(1.5));
        assert_eq!(quotes["A"].source, PriceSource::Jupiter);
        assert_eq!(quotes["B"].source, PriceSource::CoinGecko);
        assert_eq!(quotes["C"].source, PriceSource::DexScreener);
        assert!(!quotes.contains_key("D"));
        assert_eq!(secondary.requests.lock().unwrap()[0], vec!["B", "C", "D"]);
        assert_eq!(tertiary.requests.lock().unwrap()[0], vec!["C", "D"]);
    }

    #[tokio::test]
    async fn test_failing_source_falls_through() {
        let primary = Arc::new(FixedPrices::failing(PriceSource::Jupiter));
        let secondary = Arc::new(FixedPrices::new(PriceSource::CoinGecko, &[("A", dec!(3))]));
        let resolver = PriceResolver::new(vec![primary, secondary]);

        let quotes = resolver.resolve(&ids(&["A"])).await;

        assert_eq!(quotes["A"].source, PriceSource::CoinGecko);
    }

    #[tokio::test]
    async fn test_stops_once_everything_is_priced() {
        let primary = Arc::new(FixedPrices::new(PriceSource::Jupiter, &[("A", dec!(1)), ("B", dec!(2))]));
        let secondary = Arc::new(FixedPrices::new(PriceSource::CoinGecko, &[]));
        let resolver = PriceResolver::new(vec![primary, secondary.clone()]);

        let quotes = resolver.resolve(&ids(&["A", "B"])).await;

        assert_eq!(quotes.len(), 2);
        assert!(secondary.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_zero_price_and_unrequested_ids_are_ignored() {
        let primary = Arc::new(FixedPrices::new(PriceSource::Jupiter, &[("A", dec!(0)), ("Z", dec!(5))]));
        let secondary = Arc::new(FixedPrices::new(PriceSource::CoinGecko, &[("A", dec!(4))]));
        let resolver = PriceResolver::new(vec![primary, secondary]);

        let quotes = resolver.resolve(&ids(&["A"])).await;

        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes["A"].unit_price_usd, dec!(4));
    }

    #[tokio::test]
    async fn test_empty_request_makes_no_calls() {
        let primary = Arc::new(FixedPrices::new(PriceSource::Jupiter, &[]));
        let resolver = PriceResolver::new(vec![primary.clone()]);

        assert!(resolver.resolve(&BTreeSet::new()).await.is_empty());
        assert!(primary.requests.lock().unwrap().is_empty());
    }
}
