/// Wrapped SOL mint; native lamport movements are reported under this id.
pub const NATIVE_MINT: &str = "So11111111111111111111111111111111111111112";

pub const LAMPORTS_DECIMALS: u32 = 9;

pub struct KnownToken {
    pub mint: &'static str,
    pub symbol: &'static str,
    /// CoinGecko id, used by the general-market price feed
    pub market_id: Option<&'static str>,
}

pub const KNOWN_TOKENS: &[KnownToken] = &[
    KnownToken { mint: NATIVE_MINT, symbol: "SOL", market_id: Some("solana") },
    KnownToken { mint: "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v", symbol: "USDC", market_id: Some("usd-coin") },
    KnownToken { mint: "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB", symbol: "USDT", market_id: Some("tether") },
    KnownToken { mint: "JUPyiwrYJFskUPiHa7hkeR8VUtAeFoSYbKedZNsDvCN", symbol: "JUP", market_id: Some("jupiter-exchange-solana") },
    KnownToken { mint: "mSoLzYCxHdYgdzU16g5QSh3i5K3z3KZK7ytfqcJm7So", symbol: "mSOL", market_id: Some("msol") },
    KnownToken { mint: "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263", symbol: "BONK", market_id: Some("bonk") },
    KnownToken { mint: "EKpQGSJtjMFqKZ9KQanSqYXRcF8fBopzLHYxdM65zcjm", symbol: "WIF", market_id: Some("dogwifcoin") },
    KnownToken { mint: "7GCihgDB8fe6KNjn2MYtkzZcRjQy3t9GHdC8uHYmW2hr", symbol: "POPCAT", market_id: Some("popcat") },
    KnownToken { mint: "rndrizKT3MK1iimdxRdWabcF7Zg7AR5T4nud4EkHBof", symbol: "RENDER", market_id: Some("render-token") },
    KnownToken { mint: "HZ1JovNiVvGrGNiiYvEozEVgZ58xaU3RKwX8eACQBCt3", symbol: "PYTH", market_id: Some("pyth-network") },
    KnownToken { mint: "METAewgxyPbgwsseH8T16a39CQ5VyVxZi9zXiDPY18m", symbol: "META", market_id: None },
    KnownToken { mint: "BANKzSRVbe5NQAW9M6xD6o2SkrpCFFxbjJPEKrCv9mz", symbol: "BANK", market_id: None },
];

pub fn lookup(mint: &str) -> Option<&'static KnownToken> {
    KNOWN_TOKENS.iter().find(|token| token.mint == mint)
}

/// Known symbol, or the mint shortened to `abcd...wxyz`.
pub fn symbol_for(mint: &str) -> String {
    if let Some(token) = lookup(mint) {
        return token.symbol.to_string();
    }
    let chars: Vec<char> = mint.chars().collect();
    if chars.len() <= 8 {
        return mint.to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

pub fn market_id_for(mint: &str) -> Option<&'static str> {
    lookup(mint).and_then(|token| token.market_id)
}
