use thiserror::Error;

/// Failures talking to a history source (indexing API or JSON-RPC).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("source returned status {0}")]
    Status(u16),

    #[error("failed to decode page: {0}")]
    Decode(String),
}

impl SourceError {
    /// Transport failures, throttling and server-side errors are worth another attempt.
    /// Any other non-success status ends pagination straight away.
    pub fn is_retryable(&self) -> bool {
        match self {
            SourceError::Transport(_) => true,
            SourceError::Status(code) => *code == 429 || *code >= 500,
            SourceError::Decode(_) => false,
        }
    }
}

/// The URL is stripped: indexer keys travel as query parameters.
impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        let err = err.without_url();
        if err.is_decode() {
            SourceError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            SourceError::Status(status.as_u16())
        } else {
            SourceError::Transport(err.to_string())
        }
    }
}

impl From<solana_client::client_error::ClientError> for SourceError {
    fn from(err: solana_client::client_error::ClientError) -> Self {
        SourceError::Transport(err.to_string())
    }
}

/// Failures from a single price feed. Never fatal: the resolver logs and moves on.
#[derive(Error, Debug)]
pub enum PriceError {
    #[error("price feed request failed: {0}")]
    Transport(String),

    #[error("price feed returned status {0}")]
    Status(u16),

    #[error("price feed payload not understood: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for PriceError {
    fn from(err: reqwest::Error) -> Self {
        let err = err.without_url();
        if err.is_decode() {
            PriceError::Decode(err.to_string())
        } else {
            PriceError::Transport(err.to_string())
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },

    #[error("invalid bind address: {0}")]
    InvalidBindAddr(String),
}
