use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use solana_account_decoder::UiAccountData;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_request::TokenAccountsFilter;
use solana_sdk::pubkey::Pubkey;

use crate::services::prices::PriceResolver;
use crate::services::RpcLimiter;
use crate::types::models::{Holding, PortfolioSnapshot, PriceQuote};
use crate::types::records::UiTokenAmountView;
use crate::types::tokens::{symbol_for, LAMPORTS_DECIMALS, NATIVE_MINT};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParsedTokenInfo {
    mint: String,
    token_amount: UiTokenAmountView,
}

/// Mint and UI balance of a jsonParsed SPL token account.
pub fn parse_token_account(data: &UiAccountData) -> Option<(String, Decimal)> {
    let UiAccountData::Json(parsed) = data else {
        return None;
    };
    let info = ParsedTokenInfo::deserialize(parsed.parsed.get("info")?).ok()?;
    let amount = info.token_amount.to_decimal()?;
    Some((info.mint, amount))
}

/// Sums balances per mint (a wallet can hold several accounts of one mint),
/// drops empty token balances and values the rest. The native row is always
/// kept. Sorted by value, largest first.
pub fn build_holdings(balances: Vec<(String, Decimal)>, quotes: &HashMap<String, PriceQuote>) -> Vec<Holding> {
    let mut by_mint: BTreeMap<String, Decimal> = BTreeMap::new();
    for (mint, amount) in balances {
        let balance = by_mint.entry(mint).or_default();
        *balance = balance.saturating_add(amount);
    }

    let mut holdings: Vec<Holding> = by_mint
        .into_iter()
        .filter(|(mint, balance)| *balance > Decimal::ZERO || mint == NATIVE_MINT)
        .map(|(mint, balance)| {
            let price = quotes.get(&mint).map(|q| q.unit_price_usd).unwrap_or(Decimal::ZERO);
            Holding {
                symbol: symbol_for(&mint),
                value: balance.saturating_mul(price),
                mint,
                balance,
                price,
            }
        })
        .collect();

    holdings.sort_by(|a, b| b.value.cmp(&a.value).then_with(|| a.mint.cmp(&b.mint)));
    holdings
}

pub struct PortfolioService {
    rpc: Arc<RpcClient>,
    limiter: Arc<RpcLimiter>,
    prices: Arc<PriceResolver>,
}

impl PortfolioService {
    pub fn new(rpc: Arc<RpcClient>, limiter: Arc<RpcLimiter>, prices: Arc<PriceResolver>) -> Self {
        Self { rpc, limiter, prices }
    }

    async fn balances(&self, owner: &Pubkey) -> Result<Vec<(String, Decimal)>> {
        self.limiter.until_ready().await;
        let lamports = self.rpc.get_balance(owner).await?;
        let native = Decimal::from_i128_with_scale(i128::from(lamports), LAMPORTS_DECIMALS);
        let mut balances = vec![(NATIVE_MINT.to_string(), native)];

        self.limiter.until_ready().await;
        let accounts = self
            .rpc
            .get_token_accounts_by_owner(owner, TokenAccountsFilter::ProgramId(spl_token::id()))
            .await?;
        tracing::info!("Found {} token accounts for {}", accounts.len(), owner);

        balances.extend(accounts.iter().filter_map(|keyed| parse_token_account(&keyed.account.data)));
        Ok(balances)
    }

    pub async fn snapshot(&self, owner: &Pubkey) -> Result<PortfolioSnapshot> {
        let balances = self.balances(owner).await?;
        let mints: BTreeSet<String> = balances
            .iter()
            .filter(|(_, amount)| *amount > Decimal::ZERO)
            .map(|(mint, _)| mint.clone())
            .collect();
        let quotes = self.prices.resolve(&mints).await;

        let portfolio = build_holdings(balances, &quotes);
        let total_value = portfolio.iter().fold(Decimal::ZERO, |sum, h| sum.saturating_add(h.value));
        tracing::info!("Portfolio for {}: {} holdings worth ${}", owner, portfolio.len(), total_value);

        Ok(PortfolioSnapshot {
            wallet: owner.to_string(),
            portfolio,
            total_value,
            updated: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::models::PriceSource;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use solana_account_decoder::parse_account_data::ParsedAccount;

    fn token_account(mint: &str, ui_amount: &str) -> UiAccountData {
        UiAccountData::Json(ParsedAccount {
            program: "spl-token".to_string(),
            parsed: json!({
                "type": "account",
                "info": {
                    "mint": mint,
                    "owner": "Wallet",
                    "state": "initialized",
                    "tokenAmount": { "amount": "0", "decimals": 6, "uiAmount": null, "uiAmountString": ui_amount }
                }
            }),
            space: 165,
        })
    }

    fn quote(asset_id: &str, price: Decimal) -> (String, PriceQuote) {
        (
            asset_id.to_string(),
            PriceQuote { asset_id: asset_id.to_string(), unit_price_usd: price, source: PriceSource::Jupiter },
        )
    }

    #[test]
    fn test_parse_token_account() {
        assert_eq!(parse_token_account(&token_account("MintA", "12.5")), Some(("MintA".to_string(), dec!(12.5))));
        assert_eq!(parse_token_account(&UiAccountData::LegacyBinary("abc".to_string())), None);
    }

    #[test]
    fn test_holdings_sorted_by_value_without_empty_balances() {
        let balances = vec![
            (NATIVE_MINT.to_string(), dec!(1.5)),
            ("MintA".to_string(), dec!(100)),
            ("MintA".to_string(), dec!(50)),
            ("MintB".to_string(), dec!(0)),
            ("MintC".to_string(), dec!(7)),
        ];
        let quotes = HashMap::from([quote(NATIVE_MINT, dec!(200)), quote("MintA", dec!(3))]);
        let holdings = build_holdings(balances, &quotes);

        let mints: Vec<&str> = holdings.iter().map(|h| h.mint.as_str()).collect();
        assert_eq!(mints, vec!["MintA", NATIVE_MINT, "MintC"]);
        assert_eq!(holdings[0].balance, dec!(150));
        assert_eq!(holdings[0].value, dec!(450));
        assert_eq!(holdings[1].symbol, "SOL");
        assert_eq!(holdings[2].value, Decimal::ZERO);
    }

    #[test]
    fn test_empty_native_balance_is_still_listed() {
        let balances = vec![
            (NATIVE_MINT.to_string(), Decimal::ZERO),
            ("MintA".to_string(), dec!(2)),
            ("MintB".to_string(), Decimal::ZERO),
        ];
        let quotes = HashMap::from([quote("MintA", dec!(1))]);
        let holdings = build_holdings(balances, &quotes);

        let mints: Vec<&str> = holdings.iter().map(|h| h.mint.as_str()).collect();
        assert_eq!(mints, vec!["MintA", NATIVE_MINT]);
        assert_eq!(holdings[1].symbol, "SOL");
        assert_eq!(holdings[1].balance, Decimal::ZERO);
    }

    #[test]
    fn test_huge_balances_do_not_overflow() {
        let huge = dec!(50000000000000000000000000000);
        let balances = vec![("MintA".to_string(), huge), ("MintA".to_string(), huge)];
        let quotes = HashMap::from([quote("MintA", dec!(3))]);
        let holdings = build_holdings(balances, &quotes);
        assert_eq!(holdings[0].balance, Decimal::MAX);
        assert_eq!(holdings[0].value, Decimal::MAX);
    }
}
