use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::services::prices::PriceResolver;
use crate::types::models::{AggregateBucket, PriceQuote, TimeWindow, Transfer, VolumeTable, WindowSpec};

/// Buckets plus the quotes used to value them.
#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    pub table: VolumeTable,
    pub quotes: HashMap<String, PriceQuote>,
}

/// Adds every transfer to each window it falls in. An asset touched for the
/// first time gets a zero bucket for every window, so all assets in the result
/// carry the same window ids. Assets left with no trade in any window are dropped.
pub fn fold(transfers: &[Transfer], windows: &[TimeWindow], mut table: VolumeTable) -> VolumeTable {
    for transfer in transfers {
        let at = transfer.occurred_at();
        let matching: Vec<&TimeWindow> = windows.iter().filter(|w| w.contains(at)).collect();
        if matching.is_empty() {
            continue;
        }

        let buckets = table.entry(transfer.asset_id().to_string()).or_insert_with(|| {
            windows
                .iter()
                .map(|w| (w.id.clone(), AggregateBucket::default()))
                .collect()
        });
        for window in matching {
            buckets.entry(window.id.clone()).or_default().record(transfer);
        }
    }

    table.retain(|_, buckets| buckets.values().any(AggregateBucket::is_active));
    table
}

/// Fills the USD fields. Assets without a quote are valued at zero.
pub fn apply_prices(table: VolumeTable, quotes: &HashMap<String, PriceQuote>) -> VolumeTable {
    table
        .into_iter()
        .map(|(asset_id, buckets)| {
            let price = quotes.get(&asset_id).map(|quote| quote.unit_price_usd);
            let buckets: BTreeMap<String, AggregateBucket> = buckets
                .into_iter()
                .map(|(window, bucket)| (window, bucket.priced(price)))
                .collect();
            (asset_id, buckets)
        })
        .collect()
}

pub struct VolumeAggregator {
    prices: Arc<PriceResolver>,
}

impl VolumeAggregator {
    pub fn new(prices: Arc<PriceResolver>) -> Self {
        Self { prices }
    }

    /// Pins `windows` to `now`, folds the transfers and prices whatever was touched.
    pub async fn aggregate(&self, transfers: &[Transfer], windows: &[WindowSpec], now: DateTime<Utc>) -> Aggregation {
        let resolved: Vec<TimeWindow> = windows.iter().map(|w| w.resolve(now)).collect();
        let table = fold(transfers, &resolved, VolumeTable::new());

        let assets: BTreeSet<String> = table.keys().cloned().collect();
        tracing::info!("Aggregated {} transfers over {} assets", transfers.len(), assets.len());

        let quotes = self.prices.resolve(&assets).await;
        Aggregation {
            table: apply_prices(table, &quotes),
            quotes,
        }
    }
}
