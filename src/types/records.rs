use std::str::FromStr;

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

/// A transaction exactly as a history source returned it.
///
/// Enriched records come from the indexing API and already carry decoded
/// transfer lists. Minimal records are plain `getTransaction` results and
/// have to be diffed from pre/post balance snapshots.
#[derive(Debug, Clone, PartialEq)]
pub enum RawActivityRecord {
    Enriched(Value),
    Minimal(Value),
}

impl RawActivityRecord {
    /// Dispatches on shape: a record with both `meta` and `transaction` is an RPC
    /// transaction, anything else is treated as an enriched record.
    pub fn classify(value: Value) -> Self {
        if value.get("meta").is_some() && value.get("transaction").is_some() {
            RawActivityRecord::Minimal(value)
        } else {
            RawActivityRecord::Enriched(value)
        }
    }

    /// Transaction signature, which doubles as the `before` cursor for the next page.
    pub fn pagination_key(&self) -> Option<&str> {
        match self {
            RawActivityRecord::Enriched(value) => value.get("signature")?.as_str(),
            RawActivityRecord::Minimal(value) => value
                .get("transaction")?
                .get("signatures")?
                .get(0)?
                .as_str(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedTransaction {
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub transaction_error: Option<Value>,
    #[serde(default)]
    pub token_transfers: Vec<Value>,
    #[serde(default)]
    pub native_transfers: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTransferEntry {
    #[serde(default)]
    pub from_user_account: Option<String>,
    #[serde(default)]
    pub to_user_account: Option<String>,
    #[serde(default)]
    pub mint: Option<String>,
    #[serde(default)]
    pub token_amount: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeTransferEntry {
    #[serde(default)]
    pub from_user_account: Option<String>,
    #[serde(default)]
    pub to_user_account: Option<String>,
    /// lamports
    #[serde(default)]
    pub amount: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MinimalTransaction {
    #[serde(default)]
    pub block_time: Option<i64>,
    pub meta: TransactionMeta,
    pub transaction: TransactionEnvelope,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMeta {
    #[serde(default)]
    pub err: Option<Value>,
    #[serde(default)]
    pub pre_balances: Vec<u64>,
    #[serde(default)]
    pub post_balances: Vec<u64>,
    #[serde(default)]
    pub pre_token_balances: Vec<Value>,
    #[serde(default)]
    pub post_token_balances: Vec<Value>,
}

#[derive(Debug, Deserialize)]
pub struct TransactionEnvelope {
    #[serde(default)]
    pub message: MessageView,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    /// Either plain base58 strings or `{ "pubkey": ... }` objects (jsonParsed).
    #[serde(default)]
    pub account_keys: Vec<Value>,
}

impl MessageView {
    pub fn account_key(&self, index: usize) -> Option<&str> {
        let key = self.account_keys.get(index)?;
        key.as_str().or_else(|| key.get("pubkey")?.as_str())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalanceEntry {
    pub account_index: u64,
    #[serde(default)]
    pub mint: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub ui_token_amount: Option<UiTokenAmountView>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiTokenAmountView {
    #[serde(default)]
    pub ui_amount_string: Option<String>,
    #[serde(default)]
    pub ui_amount: Value,
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub decimals: Option<u32>,
}

impl UiTokenAmountView {
    /// Prefers the exact string form, then the float, then raw amount scaled by decimals.
    pub fn to_decimal(&self) -> Option<Decimal> {
        if let Some(amount) = self.ui_amount_string.as_deref().and_then(parse_decimal) {
            return Some(amount);
        }
        if let Some(amount) = decimal_from_json(&self.ui_amount) {
            return Some(amount);
        }
        let raw = i128::from_str(self.amount.as_deref()?).ok()?;
        Decimal::try_from_i128_with_scale(raw, self.decimals?).ok()
    }
}

pub fn parse_decimal(text: &str) -> Option<Decimal> {
    let text = text.trim();
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

/// Reads a JSON number or numeric string without going through `f64` when possible.
pub fn decimal_from_json(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(number) => {
            parse_decimal(&number.to_string()).or_else(|| number.as_f64().and_then(Decimal::from_f64))
        }
        Value::String(text) => parse_decimal(text),
        _ => None,
    }
}

/// Lamport count (integer JSON number or string) as whole SOL.
pub fn lamports_from_json(value: &Value) -> Option<Decimal> {
    let lamports = match value {
        Value::Number(number) => number.as_i64().map(i128::from).or_else(|| number.as_u64().map(i128::from))?,
        Value::String(text) => i128::from_str(text.trim()).ok()?,
        _ => return None,
    };
    Decimal::try_from_i128_with_scale(lamports, super::tokens::LAMPORTS_DECIMALS).ok()
}
