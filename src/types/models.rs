use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const PRICE_CAVEAT: &str =
    "USD values use current prices, not historical prices at the time of each trade";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Buy,
    Sell,
}

/// Canonical signed movement of one asset into or out of the tracked wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transfer {
    asset_id: String,
    signed_amount: Decimal,
    occurred_at: DateTime<Utc>,
    classification: Classification,
}

impl Transfer {
    /// Returns `None` for a zero amount. The classification follows the sign.
    pub fn new(asset_id: impl Into<String>, signed_amount: Decimal, occurred_at: DateTime<Utc>) -> Option<Self> {
        if signed_amount.is_zero() {
            return None;
        }
        let classification = if signed_amount.is_sign_positive() {
            Classification::Buy
        } else {
            Classification::Sell
        };
        Some(Self {
            asset_id: asset_id.into(),
            signed_amount,
            occurred_at,
            classification,
        })
    }

    pub fn asset_id(&self) -> &str {
        &self.asset_id
    }

    pub fn signed_amount(&self) -> Decimal {
        self.signed_amount
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn classification(&self) -> Classification {
        self.classification
    }
}

/// A named lookback, e.g. "7d". `lookback = None` means the window reaches back forever.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSpec {
    pub id: String,
    pub lookback: Option<Duration>,
}

impl WindowSpec {
    pub fn bounded(id: &str, lookback: Duration) -> Self {
        Self { id: id.to_string(), lookback: Some(lookback) }
    }

    pub fn lifetime() -> Self {
        Self { id: "lifetime".to_string(), lookback: None }
    }

    /// 1d, 7d, 30d and lifetime, shortest first.
    pub fn standard() -> Vec<Self> {
        vec![
            Self::bounded("1d", Duration::days(1)),
            Self::bounded("7d", Duration::days(7)),
            Self::bounded("30d", Duration::days(30)),
            Self::lifetime(),
        ]
    }

    /// Parses `"lifetime"`, `"<n>d"` or `"<n>h"`.
    pub fn parse(id: &str) -> Option<Self> {
        let id = id.trim();
        if id == "lifetime" {
            return Some(Self::lifetime());
        }
        let unit = id.chars().last()?;
        let n: i64 = id[..id.len() - unit.len_utf8()].parse().ok()?;
        if n <= 0 {
            return None;
        }
        let lookback = match unit {
            'd' if n <= 36_500 => Duration::days(n),
            'h' if n <= 876_000 => Duration::hours(n),
            _ => return None,
        };
        Some(Self::bounded(id, lookback))
    }

    /// Comma separated ids; an empty list falls back to the standard set.
    pub fn parse_list(ids: &str) -> Result<Vec<Self>, String> {
        let mut windows: Vec<Self> = Vec::new();
        for id in ids.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let window = Self::parse(id).ok_or_else(|| id.to_string())?;
            if !windows.iter().any(|w| w.id == window.id) {
                windows.push(window);
            }
        }
        if windows.is_empty() {
            return Ok(Self::standard());
        }
        Ok(windows)
    }

    pub fn resolve(&self, now: DateTime<Utc>) -> TimeWindow {
        TimeWindow {
            id: self.id.clone(),
            start: self.lookback.map(|lookback| now - lookback),
        }
    }
}

/// A window pinned to an absolute start. `start = None` is minus infinity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeWindow {
    pub id: String,
    pub start: Option<DateTime<Utc>>,
}

impl TimeWindow {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start.map_or(true, |start| start <= at)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateBucket {
    pub buy_amount: Decimal,
    pub sell_amount: Decimal,
    pub trade_count: u64,
    pub buy_usd: Decimal,
    pub sell_usd: Decimal,
    pub total_usd: Decimal,
}

impl AggregateBucket {
    /// Amounts saturate at `Decimal::MAX` instead of overflowing.
    pub fn record(&mut self, transfer: &Transfer) {
        let amount = transfer.signed_amount().abs();
        match transfer.classification() {
            Classification::Buy => self.buy_amount = self.buy_amount.saturating_add(amount),
            Classification::Sell => self.sell_amount = self.sell_amount.saturating_add(amount),
        }
        self.trade_count += 1;
    }

    /// Buy plus sell amount, saturating.
    pub fn raw_volume(&self) -> Decimal {
        self.buy_amount.saturating_add(self.sell_amount)
    }

    pub fn is_active(&self) -> bool {
        self.trade_count > 0
    }

    /// Values the bucket at `unit_price_usd`; a missing price values it at zero.
    pub fn priced(self, unit_price_usd: Option<Decimal>) -> Self {
        let price = unit_price_usd.unwrap_or(Decimal::ZERO);
        let buy_usd = self.buy_amount.saturating_mul(price);
        let sell_usd = self.sell_amount.saturating_mul(price);
        Self {
            buy_usd,
            sell_usd,
            total_usd: buy_usd.saturating_add(sell_usd),
            ..self
        }
    }
}

/// asset id -> window id -> bucket
pub type VolumeTable = BTreeMap<String, BTreeMap<String, AggregateBucket>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    Jupiter,
    CoinGecko,
    DexScreener,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceQuote {
    pub asset_id: String,
    pub unit_price_usd: Decimal,
    pub source: PriceSource,
}

#[derive(Debug, Clone, Serialize)]
pub struct Holding {
    pub symbol: String,
    pub mint: String,
    pub balance: Decimal,
    pub price: Decimal,
    pub value: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortfolioSnapshot {
    pub wallet: String,
    pub portfolio: Vec<Holding>,
    pub total_value: Decimal,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssetVolume {
    pub symbol: String,
    pub mint: String,
    pub price: Decimal,
    pub price_source: Option<PriceSource>,
    pub timeframes: BTreeMap<String, AggregateBucket>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WindowTotals {
    pub buy_usd: Decimal,
    pub sell_usd: Decimal,
    pub total_usd: Decimal,
    pub trades: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SkippedRecords {
    pub malformed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct VolumeReport {
    pub wallet: String,
    pub windows: Vec<String>,
    pub tokens: Vec<AssetVolume>,
    pub totals: BTreeMap<String, WindowTotals>,
    pub transaction_count: usize,
    pub transfer_count: usize,
    pub skipped: SkippedRecords,
    pub history_complete: bool,
    pub caveat: &'static str,
    pub updated: DateTime<Utc>,
}
