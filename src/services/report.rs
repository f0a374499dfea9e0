use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::services::history::{FetchOutcome, HistoryFetcher};
use crate::services::normalizer::{normalize_with_stats, Normalized};
use crate::services::volume::{Aggregation, VolumeAggregator};
use crate::types::models::{
    AggregateBucket, AssetVolume, PriceQuote, VolumeReport, WindowSpec, WindowTotals, PRICE_CAVEAT,
};
use crate::types::tokens::symbol_for;

/// fetch -> normalize -> aggregate, then rank and total.
pub struct ReportService {
    fetcher: HistoryFetcher,
    aggregator: VolumeAggregator,
}

impl ReportService {
    pub fn new(fetcher: HistoryFetcher, aggregator: VolumeAggregator) -> Self {
        Self { fetcher, aggregator }
    }

    pub async fn volume_report(&self, address: &str, windows: &[WindowSpec], limit: Option<usize>) -> VolumeReport {
        tracing::info!("Building volume report for {} from {}", address, self.fetcher.source_name());

        let history = self.fetcher.fetch(address).await;
        let normalized = normalize_with_stats(&history.records, address);
        let now = Utc::now();
        let aggregation = self.aggregator.aggregate(&normalized.transfers, windows, now).await;

        build_report(address, windows, &history, &normalized, aggregation, limit, now)
    }
}

/// The window assets are ranked by: lifetime if requested, otherwise the last one listed.
fn ranking_window(windows: &[WindowSpec]) -> Option<&str> {
    windows
        .iter()
        .find(|w| w.lookback.is_none())
        .or_else(|| windows.last())
        .map(|w| w.id.as_str())
}

/// Orders by USD volume in the ranking window, then by raw volume, then by asset id.
pub fn rank_assets(
    table: BTreeMap<String, BTreeMap<String, AggregateBucket>>,
    windows: &[WindowSpec],
) -> Vec<(String, BTreeMap<String, AggregateBucket>)> {
    let key_window = ranking_window(windows).map(str::to_string);
    let ranked_bucket = |buckets: &BTreeMap<String, AggregateBucket>| -> AggregateBucket {
        key_window
            .as_ref()
            .and_then(|id| buckets.get(id))
            .cloned()
            .unwrap_or_default()
    };

    let mut assets: Vec<_> = table.into_iter().collect();
    assets.sort_by(|(a_id, a), (b_id, b)| {
        let (a, b) = (ranked_bucket(a), ranked_bucket(b));
        b.total_usd
            .cmp(&a.total_usd)
            .then_with(|| b.raw_volume().cmp(&a.raw_volume()))
            .then_with(|| a_id.cmp(b_id))
    });
    assets
}

/// Sums each window across all assets, before any `limit` is applied.
pub fn window_totals(
    assets: &[(String, BTreeMap<String, AggregateBucket>)],
    windows: &[WindowSpec],
) -> BTreeMap<String, WindowTotals> {
    let mut totals: BTreeMap<String, WindowTotals> =
        windows.iter().map(|w| (w.id.clone(), WindowTotals::default())).collect();

    for (_, buckets) in assets {
        for (window, bucket) in buckets {
            let total = totals.entry(window.clone()).or_default();
            total.buy_usd = total.buy_usd.saturating_add(bucket.buy_usd);
            total.sell_usd = total.sell_usd.saturating_add(bucket.sell_usd);
            total.total_usd = total.total_usd.saturating_add(bucket.total_usd);
            total.trades += bucket.trade_count;
        }
    }
    totals
}

fn asset_volume(mint: String, timeframes: BTreeMap<String, AggregateBucket>, quotes: &HashMap<String, PriceQuote>) -> AssetVolume {
    let quote = quotes.get(&mint);
    AssetVolume {
        symbol: symbol_for(&mint),
        price: quote.map(|q| q.unit_price_usd).unwrap_or(Decimal::ZERO),
        price_source: quote.map(|q| q.source),
        mint,
        timeframes,
    }
}

pub fn build_report(
    address: &str,
    windows: &[WindowSpec],
    history: &FetchOutcome,
    normalized: &Normalized,
    aggregation: Aggregation,
    limit: Option<usize>,
    now: DateTime<Utc>,
) -> VolumeReport {
    let Aggregation { table, quotes } = aggregation;
    let ranked = rank_assets(table, windows);
    let totals = window_totals(&ranked, windows);

    let keep = limit.unwrap_or(ranked.len());
    let tokens = ranked
        .into_iter()
        .take(keep)
        .map(|(mint, timeframes)| asset_volume(mint, timeframes, &quotes))
        .collect();

    VolumeReport {
        wallet: address.to_string(),
        windows: windows.iter().map(|w| w.id.clone()).collect(),
        tokens,
        totals,
        transaction_count: history.records.len(),
        transfer_count: normalized.transfers.len(),
        skipped: normalized.skipped,
        history_complete: history.complete && !history.truncated,
        caveat: PRICE_CAVEAT,
        updated: now,
    }
}
