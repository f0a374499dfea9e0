use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::types::models::{SkippedRecords, Transfer};
use crate::types::records::{
    decimal_from_json, lamports_from_json, EnrichedTransaction, MinimalTransaction, NativeTransferEntry,
    RawActivityRecord, TokenBalanceEntry, TokenTransferEntry,
};
use crate::types::tokens::NATIVE_MINT;

/// Native movements under 0.001 SOL are treated as fee noise.
pub const NATIVE_DUST: Decimal = Decimal::from_parts(1, 0, 0, false, 3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Skip {
    Malformed,
    ExecutionFailed,
}

#[derive(Debug, Clone, Default)]
pub struct Normalized {
    pub transfers: Vec<Transfer>,
    pub skipped: SkippedRecords,
}

/// Turns raw records into the wallet's transfer ledger, in record order.
/// Records that cannot be read, or whose transaction failed on chain, are
/// counted and contribute nothing.
pub fn normalize_with_stats(records: &[RawActivityRecord], address: &str) -> Normalized {
    let per_record: Vec<Result<Vec<Transfer>, Skip>> = records
        .par_iter()
        .map(|record| normalize_record(record, address))
        .collect();

    let mut normalized = Normalized::default();
    for result in per_record {
        match result {
            Ok(transfers) => normalized.transfers.extend(transfers),
            Err(Skip::Malformed) => normalized.skipped.malformed += 1,
            Err(Skip::ExecutionFailed) => normalized.skipped.failed += 1,
        }
    }

    tracing::debug!(
        "Normalized {} records into {} transfers ({} malformed, {} failed)",
        records.len(),
        normalized.transfers.len(),
        normalized.skipped.malformed,
        normalized.skipped.failed
    );
    normalized
}

fn normalize_record(record: &RawActivityRecord, address: &str) -> Result<Vec<Transfer>, Skip> {
    match record {
        RawActivityRecord::Enriched(value) => normalize_enriched(value, address),
        RawActivityRecord::Minimal(value) => normalize_minimal(value, address),
    }
}

fn occurred_at(timestamp: Option<i64>) -> DateTime<Utc> {
    timestamp
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or_default()
}

/// Positive when the wallet receives, negative when it sends, `None` when it is not a party.
fn signed_for(address: &str, from: Option<&str>, to: Option<&str>, amount: Decimal) -> Option<Decimal> {
    if to == Some(address) {
        Some(amount)
    } else if from == Some(address) {
        Some(-amount)
    } else {
        None
    }
}

fn normalize_enriched(value: &Value, address: &str) -> Result<Vec<Transfer>, Skip> {
    let tx = EnrichedTransaction::deserialize(value).map_err(|_| Skip::Malformed)?;
    if tx.transaction_error.is_some() {
        return Err(Skip::ExecutionFailed);
    }
    let at = occurred_at(tx.timestamp);
    let mut transfers = Vec::new();

    for entry in &tx.token_transfers {
        let Ok(entry) = TokenTransferEntry::deserialize(entry) else {
            continue;
        };
        let Some(mint) = entry.mint.filter(|mint| !mint.is_empty()) else {
            continue;
        };
        let Some(amount) = decimal_from_json(&entry.token_amount).filter(|a| a.is_sign_positive() && !a.is_zero()) else {
            continue;
        };
        let signed = signed_for(
            address,
            entry.from_user_account.as_deref(),
            entry.to_user_account.as_deref(),
            amount,
        );
        if let Some(transfer) = signed.and_then(|signed| Transfer::new(mint, signed, at)) {
            transfers.push(transfer);
        }
    }

    for entry in &tx.native_transfers {
        let Ok(entry) = NativeTransferEntry::deserialize(entry) else {
            continue;
        };
        let Some(amount) = lamports_from_json(&entry.amount).filter(|a| *a >= NATIVE_DUST) else {
            continue;
        };
        let signed = signed_for(
            address,
            entry.from_user_account.as_deref(),
            entry.to_user_account.as_deref(),
            amount,
        );
        if let Some(transfer) = signed.and_then(|signed| Transfer::new(NATIVE_MINT, signed, at)) {
            transfers.push(transfer);
        }
    }

    Ok(transfers)
}

fn token_balances(entries: &[Value]) -> HashMap<u64, TokenBalanceEntry> {
    entries
        .iter()
        .filter_map(|entry| TokenBalanceEntry::deserialize(entry).ok())
        .map(|entry| (entry.account_index, entry))
        .collect()
}

fn normalize_minimal(value: &Value, address: &str) -> Result<Vec<Transfer>, Skip> {
    let tx = MinimalTransaction::deserialize(value).map_err(|_| Skip::Malformed)?;
    if tx.meta.err.is_some() {
        return Err(Skip::ExecutionFailed);
    }
    let at = occurred_at(tx.block_time);
    let mut transfers = Vec::new();

    let pre = token_balances(&tx.meta.pre_token_balances);
    let post = token_balances(&tx.meta.post_token_balances);
    let indices: BTreeSet<u64> = pre.keys().chain(post.keys()).copied().collect();

    for index in indices {
        let before = pre.get(&index);
        let after = post.get(&index);

        let mint = after.and_then(|b| b.mint.as_deref()).or_else(|| before.and_then(|b| b.mint.as_deref()));
        let owner = after.and_then(|b| b.owner.as_deref()).or_else(|| before.and_then(|b| b.owner.as_deref()));
        let Some(mint) = mint.filter(|mint| !mint.is_empty()) else {
            continue;
        };
        if owner != Some(address) {
            continue;
        }

        let amount_of = |balance: Option<&TokenBalanceEntry>| {
            balance
                .and_then(|b| b.ui_token_amount.as_ref())
                .and_then(|amount| amount.to_decimal())
                .unwrap_or(Decimal::ZERO)
        };
        let change = amount_of(after) - amount_of(before);
        if let Some(transfer) = Transfer::new(mint, change, at) {
            transfers.push(transfer);
        }
    }

    let message = &tx.transaction.message;
    let (pre_lamports, post_lamports) = (&tx.meta.pre_balances, &tx.meta.post_balances);
    for index in 0..message.account_keys.len() {
        if message.account_key(index) != Some(address) {
            continue;
        }
        let (Some(&before), Some(&after)) = (pre_lamports.get(index), post_lamports.get(index)) else {
            continue;
        };
        let diff = i128::from(after) - i128::from(before);
        let Ok(change) = Decimal::try_from_i128_with_scale(diff, crate::types::tokens::LAMPORTS_DECIMALS) else {
            continue;
        };
        if change.abs() <= NATIVE_DUST {
            continue;
        }
        if let Some(transfer) = Transfer::new(NATIVE_MINT, change, at) {
            transfers.push(transfer);
        }
    }

    Ok(transfers)
}
