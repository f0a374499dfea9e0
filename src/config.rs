use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

use tokio::time::Duration;

use crate::services::history::FetchPolicy;
use crate::services::retry::RetryPolicy;
use crate::types::error::ConfigError;

pub const PUBLIC_RPC_URL: &str = "https://api.mainnet-beta.solana.com";

#[derive(Debug, Clone)]
pub struct Settings {
    pub helius_api_key: Option<String>,
    pub jupiter_api_key: Option<String>,
    pub rpc_url: String,
    pub default_wallet: Option<String>,
    pub bind_addr: SocketAddr,
    pub page_delay: Duration,
    pub retry_attempts: u32,
    pub retry_backoff: Duration,
    pub rpc_max_transactions: usize,
    pub requests_per_second: u32,
    pub report_timeout: Duration,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Reads settings through `lookup`; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let helius_api_key = get("HELIUS_API_KEY");
        let rpc_url = match (get("SOLANA_RPC_URL"), &helius_api_key) {
            (Some(url), _) => url,
            (None, Some(key)) => format!("https://mainnet.helius-rpc.com/?api-key={}", key),
            (None, None) => PUBLIC_RPC_URL.to_string(),
        };

        let bind_addr = match get("BIND_ADDR") {
            Some(addr) => SocketAddr::from_str(&addr).map_err(|_| ConfigError::InvalidBindAddr(addr))?,
            None => SocketAddr::from(([0, 0, 0, 0], 8000)),
        };

        let requests_per_second: u32 = parse_or(&get, "RPC_REQUESTS_PER_SECOND", 5)?;
        if requests_per_second == 0 {
            return Err(ConfigError::InvalidValue { key: "RPC_REQUESTS_PER_SECOND", value: "0".to_string() });
        }

        Ok(Self {
            jupiter_api_key: get("JUPITER_API_KEY"),
            default_wallet: get("WALLET_ADDRESS"),
            helius_api_key,
            rpc_url,
            bind_addr,
            page_delay: Duration::from_millis(parse_or(&get, "PAGE_DELAY_MS", 200)?),
            retry_attempts: parse_or(&get, "PAGE_RETRY_ATTEMPTS", 3)?,
            retry_backoff: Duration::from_millis(parse_or(&get, "RETRY_BACKOFF_MS", 1000)?),
            rpc_max_transactions: parse_or(&get, "RPC_MAX_TRANSACTIONS", 100)?,
            requests_per_second,
            report_timeout: Duration::from_secs(parse_or(&get, "REPORT_TIMEOUT_SECS", 120)?),
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, self.retry_backoff)
    }

    /// The RPC fallback is capped; the indexing API is walked to the end.
    pub fn fetch_policy(&self) -> FetchPolicy {
        FetchPolicy {
            page_delay: self.page_delay,
            retry: self.retry_policy(),
            max_records: match self.helius_api_key {
                Some(_) => None,
                None => Some(self.rpc_max_transactions),
            },
        }
    }
}

fn parse_or<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &'static str, default: T) -> Result<T, ConfigError> {
    match get(key) {
        Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue { key, value }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let s = settings(&[]).unwrap();
        assert_eq!(s.rpc_url, PUBLIC_RPC_URL);
        assert_eq!(s.bind_addr.to_string(), "0.0.0.0:8000");
        assert_eq!(s.page_delay, Duration::from_millis(200));
        assert_eq!(s.retry_policy(), RetryPolicy::new(3, Duration::from_secs(1)));
        assert_eq!(s.fetch_policy().max_records, Some(100));
        assert_eq!(s.report_timeout, Duration::from_secs(120));
        assert!(s.helius_api_key.is_none());
    }

    #[test]
    fn test_helius_key_sets_rpc_url_and_lifts_cap() {
        let s = settings(&[("HELIUS_API_KEY", "abc"), ("WALLET_ADDRESS", " ")]).unwrap();
        assert_eq!(s.rpc_url, "https://mainnet.helius-rpc.com/?api-key=abc");
        assert_eq!(s.fetch_policy().max_records, None);
        assert!(s.default_wallet.is_none());

        let s = settings(&[("HELIUS_API_KEY", "abc"), ("SOLANA_RPC_URL", "http://localhost:8899")]).unwrap();
        assert_eq!(s.rpc_url, "http://localhost:8899");
    }

    #[test]
    fn test_malformed_values_are_rejected() {
        assert_eq!(
            settings(&[("PAGE_DELAY_MS", "soon")]).unwrap_err(),
            ConfigError::InvalidValue { key: "PAGE_DELAY_MS", value: "soon".to_string() }
        );
        assert!(matches!(settings(&[("BIND_ADDR", "nowhere")]), Err(ConfigError::InvalidBindAddr(_))));
        assert!(settings(&[("RPC_REQUESTS_PER_SECOND", "0")]).is_err());
    }
}
