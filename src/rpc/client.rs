//! JSON-RPC client for fetching blocks from an Ethereum-style node. Houses the
//! `AsyncRpcClient`, its error type, and the `BlockBatchClient` trait consumed by
//! the range fetcher.

use crate::backfill::RawBlock;
use crate::rpc::auth::build_auth_headers;
use crate::rpc::circuit_breaker::{CircuitBreakerError, RpcCircuitBreaker};
use crate::rpc::helpers::{raw_block_from_value, to_quantity};
use crate::rpc::options::RpcClientOptions;
use crate::rpc::retry::RetryContext;
use crate::runtime::config::BackfillConfig;
use crate::runtime::telemetry::Telemetry;
use anyhow::{anyhow, bail, Context, Result};
use futures::future::BoxFuture;
use jsonrpsee::core::{
    client::{ClientT, Error as JsonRpcError},
    http_helpers::HttpError,
    params::BatchRequestBuilder,
};
use jsonrpsee::http_client::transport::Error as HttpTransportError;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use jsonrpsee::types::ErrorObject;
use serde_json::Value;
use std::{future::Future, sync::Arc};
use tokio::time::{sleep, timeout};

const GET_BLOCK_BY_NUMBER: &str = "eth_getBlockByNumber";

#[derive(Debug)]
pub enum RpcError {
    Timeout { method: &'static str },
    CircuitOpen,
    /// The node answered `null` for a block it does not have.
    BlockUnavailable { number: u64 },
    ResponseTooLarge { method: &'static str },
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RpcError::Timeout { method } => write!(f, "rpc method {method} timed out"),
            RpcError::CircuitOpen => write!(f, "rpc circuit breaker is open"),
            RpcError::BlockUnavailable { number } => {
                write!(f, "node returned no block for number {number}")
            }
            RpcError::ResponseTooLarge { method } => {
                write!(f, "rpc {method} response exceeded HTTP size limits")
            }
        }
    }
}

impl std::error::Error for RpcError {}

/// Batched block retrieval. Results are returned in request order.
pub trait BlockBatchClient: Send + Sync {
    fn batch_get_blocks<'a>(&'a self, numbers: &'a [u64]) -> BoxFuture<'a, Result<Vec<RawBlock>>>;
}

#[derive(Debug, Clone)]
pub struct AsyncRpcClient {
    rpc_url: Arc<String>,
    client: HttpClient,
    options: RpcClientOptions,
    breaker: Arc<RpcCircuitBreaker>,
    telemetry: Arc<Telemetry>,
}

impl BlockBatchClient for AsyncRpcClient {
    fn batch_get_blocks<'a>(&'a self, numbers: &'a [u64]) -> BoxFuture<'a, Result<Vec<RawBlock>>> {
        Box::pin(self.batch_get_blocks(numbers))
    }
}

impl AsyncRpcClient {
    pub fn new(url: impl Into<String>, credentials: Option<(&str, &str)>) -> Result<Self> {
        Self::with_options(url, credentials, RpcClientOptions::default())
    }

    pub fn with_options(
        url: impl Into<String>,
        credentials: Option<(&str, &str)>,
        options: RpcClientOptions,
    ) -> Result<Self> {
        Self::with_options_and_breaker(
            url,
            credentials,
            options,
            Arc::new(RpcCircuitBreaker::default()),
        )
    }

    pub fn with_options_and_breaker(
        url: impl Into<String>,
        credentials: Option<(&str, &str)>,
        options: RpcClientOptions,
        breaker: Arc<RpcCircuitBreaker>,
    ) -> Result<Self> {
        options.validate()?;

        let rpc_url = url.into();
        let headers = build_auth_headers(credentials)?;
        let max_request_body_size = options.max_request_body_bytes.min(u32::MAX as usize) as u32;
        let max_response_body_size = options.max_response_body_bytes.min(u32::MAX as usize) as u32;

        let client = HttpClientBuilder::default()
            .set_headers(headers)
            .request_timeout(options.request_timeout)
            .max_concurrent_requests(options.max_concurrent_requests)
            .max_request_size(max_request_body_size)
            .max_response_size(max_response_body_size)
            .build(&rpc_url)
            .map_err(|err| anyhow!("failed to build RPC client: {err}"))?;

        Ok(Self {
            rpc_url: Arc::new(rpc_url),
            client,
            options,
            breaker,
            telemetry: Arc::new(Telemetry::default()),
        })
    }

    pub fn from_config(config: &BackfillConfig) -> Result<Self> {
        config.validate()?;
        Self::with_options(
            config.rpc_url().to_owned(),
            config.rpc_credentials(),
            RpcClientOptions::from_config(config),
        )
    }

    /// Routes request, error, and timeout counts into a shared [`Telemetry`].
    pub fn with_telemetry(mut self, telemetry: Arc<Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.rpc_url
    }

    pub fn breaker(&self) -> &Arc<RpcCircuitBreaker> {
        &self.breaker
    }

    /// Fetches full block headers (without transaction bodies) for `numbers`.
    pub async fn batch_get_blocks(&self, numbers: &[u64]) -> Result<Vec<RawBlock>> {
        if numbers.is_empty() {
            return Ok(Vec::new());
        }

        self.retry_with_breaker(
            RetryContext::with_blocks(GET_BLOCK_BY_NUMBER, numbers),
            || async { self.perform_batch(numbers).await },
            |attempt, blocks: &Vec<RawBlock>| {
                tracing::debug!(
                    attempt,
                    blocks = blocks.len(),
                    "batch_get_blocks completed successfully"
                );
            },
        )
        .await
    }

    /// Shared retry loop: breaker gating, telemetry, exponential backoff, and consistent
    /// logging. Errors that a retry cannot fix are returned after the first attempt.
    async fn retry_with_breaker<T, F, Fut, S>(
        &self,
        context: RetryContext,
        mut operation: F,
        mut on_success: S,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        S: FnMut(usize, &T),
    {
        let mut attempt = 0;

        loop {
            match self.breaker.before_request() {
                Ok(state) => context.log_permit(state),
                Err(CircuitBreakerError::CircuitOpen) => {
                    context.log_circuit_open();
                    return Err(RpcError::CircuitOpen.into());
                }
            }

            attempt += 1;
            self.telemetry.record_rpc_request();

            let err = match operation().await {
                Ok(value) => {
                    self.breaker.record_success();
                    on_success(attempt, &value);
                    return Ok(value);
                }
                Err(err) => err,
            };

            let mut timed_out = false;
            match err.downcast_ref::<RpcError>() {
                Some(RpcError::BlockUnavailable { .. }) => {
                    // The node is healthy; it just does not have the block yet.
                    self.breaker.record_success();
                    self.telemetry.record_rpc_error();
                    context.log_not_retryable(attempt, &err);
                    return Err(err);
                }
                Some(RpcError::ResponseTooLarge { .. }) => {
                    self.breaker.record_failure();
                    self.telemetry.record_rpc_error();
                    context.log_not_retryable(attempt, &err);
                    return Err(err);
                }
                Some(RpcError::Timeout { .. }) => {
                    timed_out = true;
                    self.breaker.record_failure();
                    self.telemetry.record_rpc_timeout();
                }
                _ => {
                    self.breaker.record_failure();
                    self.telemetry.record_rpc_error();
                }
            }

            if attempt >= self.options.max_attempts {
                context.log_exhausted(attempt, &err);
                return Err(err);
            }

            let backoff = self.options.backoff_delay(attempt);
            context.log_retry(attempt, backoff, &err, timed_out);
            sleep(backoff).await;
        }
    }

    async fn perform_batch(&self, numbers: &[u64]) -> Result<Vec<RawBlock>> {
        let mut batch = BatchRequestBuilder::new();
        for number in numbers {
            batch
                .insert(GET_BLOCK_BY_NUMBER, rpc_params![to_quantity(*number), false])
                .context("failed to serialize eth_getBlockByNumber params")?;
        }

        let response = timeout(
            self.options.request_timeout,
            self.client.batch_request::<Option<Value>>(batch),
        )
        .await
        .map_err(|_| RpcError::Timeout {
            method: GET_BLOCK_BY_NUMBER,
        })?
        .map_err(|err| map_rpc_error(GET_BLOCK_BY_NUMBER, err))?;

        if response.len() != numbers.len() {
            bail!(
                "RPC returned mismatched block count (expected {}, got {})",
                numbers.len(),
                response.len()
            );
        }

        let mut blocks = Vec::with_capacity(numbers.len());
        for (number, entry) in numbers.iter().copied().zip(response.into_iter()) {
            match entry {
                Ok(Some(value)) => blocks.push(
                    raw_block_from_value(number, value)
                        .with_context(|| format!("invalid block {number} in RPC response"))?,
                ),
                Ok(None) => return Err(RpcError::BlockUnavailable { number }.into()),
                Err(err) => return Err(map_rpc_batch_error(GET_BLOCK_BY_NUMBER, &err)),
            }
        }

        tracing::debug!(
            method = GET_BLOCK_BY_NUMBER,
            count = blocks.len(),
            "batch RPC call completed"
        );

        Ok(blocks)
    }
}

fn map_rpc_error(label: &'static str, err: JsonRpcError) -> anyhow::Error {
    if response_too_large(&err) {
        return RpcError::ResponseTooLarge { method: label }.into();
    }
    anyhow!("rpc {label} call failed: {err}")
}

fn map_rpc_batch_error(label: &str, err: &ErrorObject<'_>) -> anyhow::Error {
    match err.data() {
        Some(data) => anyhow!(
            "rpc {label} call failed (code={}, message={}, data={})",
            err.code(),
            err.message(),
            data.get()
        ),
        None => anyhow!(
            "rpc {label} call failed (code={}, message={})",
            err.code(),
            err.message()
        ),
    }
}

fn response_too_large(err: &JsonRpcError) -> bool {
    let JsonRpcError::Transport(inner) = err else {
        return false;
    };
    matches!(
        inner.downcast_ref::<HttpTransportError>(),
        Some(HttpTransportError::Http(HttpError::TooLarge))
            | Some(HttpTransportError::RequestTooLarge)
    )
}
