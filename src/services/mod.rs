use governor::{clock::DefaultClock, state::{InMemoryState, NotKeyed}, RateLimiter};

pub mod helius;
pub mod history;
pub mod normalizer;
pub mod portfolio;
pub mod price_feeds;
pub mod prices;
pub mod report;
pub mod retry;
pub mod rpc_history;
pub mod volume;

/// Shared quota for outbound RPC and indexer calls.
pub type RpcLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;
