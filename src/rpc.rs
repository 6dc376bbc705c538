//! JSON-RPC client plumbing: authentication, circuit breaker, batched block
//! retrieval, retry policy, and the RPC-backed range fetcher.

pub mod auth;
pub mod circuit_breaker;
pub mod client;
pub mod helpers;
pub mod options;
pub mod range_fetcher;
pub mod retry;

pub use circuit_breaker::{
    CircuitBreakerError, CircuitBreakerSnapshot, CircuitState, RpcCircuitBreaker,
};
pub use client::{AsyncRpcClient, BlockBatchClient, RpcError};
pub use helpers::{parse_quantity, raw_block_from_value, to_quantity};
pub use options::RpcClientOptions;
pub use range_fetcher::RpcRangeFetcher;
