use crate::runtime::telemetry;
use anyhow::{bail, Context, Result};
use std::time::Duration;

const DEFAULT_RPC_TIMEOUT_SECS: u64 = 10;
const DEFAULT_RECHECK_INTERVAL_SECS: u64 = 10;
const DEFAULT_FLUSH_INTERVAL_MS: u64 = 100;
const DEFAULT_MAX_CONCURRENCY: usize = 1;

/// Runtime configuration for the backfill engine.
///
/// All instances must be constructed via [`BackfillConfig::builder`] or [`BackfillConfig::new`]
/// so invariants are validated before the engine observes the values. A partially configured
/// engine cannot be built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackfillConfig {
    rpc_url: String,
    rpc_user: Option<String>,
    rpc_password: Option<String>,
    rpc_timeout: Duration,
    chunk_size: u64,
    first_block: u64,
    backfill_depth: Option<u64>,
    recheck_interval: Duration,
    flush_interval: Duration,
    max_concurrency: usize,
    metrics_interval: Duration,
}

pub struct BackfillConfigParams {
    pub rpc_url: String,
    pub rpc_user: Option<String>,
    pub rpc_password: Option<String>,
    pub rpc_timeout: Duration,
    pub chunk_size: u64,
    pub first_block: u64,
    pub backfill_depth: Option<u64>,
    pub recheck_interval: Duration,
    pub flush_interval: Duration,
    pub max_concurrency: usize,
    pub metrics_interval: Duration,
}

impl BackfillConfig {
    /// Returns a builder to incrementally construct and validate a configuration.
    pub fn builder() -> BackfillConfigBuilder {
        BackfillConfigBuilder::default()
    }

    /// Constructs a configuration directly from the provided values and validates it.
    pub fn new(params: BackfillConfigParams) -> Result<Self> {
        let BackfillConfigParams {
            rpc_url,
            rpc_user,
            rpc_password,
            rpc_timeout,
            chunk_size,
            first_block,
            backfill_depth,
            recheck_interval,
            flush_interval,
            max_concurrency,
            metrics_interval,
        } = params;

        let config = Self {
            rpc_url: rpc_url.trim().to_owned(),
            rpc_user: rpc_user.map(|user| user.trim().to_owned()),
            rpc_password: rpc_password.map(|password| password.trim().to_owned()),
            rpc_timeout,
            chunk_size,
            first_block,
            backfill_depth,
            recheck_interval,
            flush_interval,
            max_concurrency,
            metrics_interval,
        };

        config.validate()?;
        Ok(config)
    }

    /// JSON-RPC endpoint used by the range fetcher.
    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// Basic-auth credentials, when the endpoint requires them.
    pub fn rpc_credentials(&self) -> Option<(&str, &str)> {
        match (&self.rpc_user, &self.rpc_password) {
            (Some(user), Some(password)) => Some((user.as_str(), password.as_str())),
            _ => None,
        }
    }

    pub fn rpc_timeout(&self) -> Duration {
        self.rpc_timeout
    }

    /// Maximum number of blocks requested in one RPC round-trip and inspected per step.
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Lowest block the engine backfills; the cursor stops once it reaches this block.
    pub fn first_block(&self) -> u64 {
        self.first_block
    }

    pub fn backfill_depth(&self) -> Option<u64> {
        self.backfill_depth
    }

    /// Span probed by a single step: `chunk_size`, further capped by `backfill_depth`.
    pub fn step_span(&self) -> u64 {
        self.backfill_depth
            .map_or(self.chunk_size, |depth| depth.min(self.chunk_size))
    }

    /// Delay before re-running a step whose fetched blocks were not yet visible.
    pub fn recheck_interval(&self) -> Duration {
        self.recheck_interval
    }

    /// Period of the scheduler's flush loop.
    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Interval used by the telemetry reporter.
    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    /// Performs validation on an existing configuration instance.
    pub fn validate(&self) -> Result<()> {
        validate_url(&self.rpc_url)?;

        match (&self.rpc_user, &self.rpc_password) {
            (Some(user), Some(password)) => {
                ensure_not_empty(user, "rpc_user")?;
                ensure_not_empty(password, "rpc_password")?;
            }
            (None, None) => {}
            _ => bail!("rpc_user and rpc_password must be provided together"),
        }

        if self.rpc_timeout.is_zero() {
            bail!("rpc_timeout must be greater than 0");
        }

        if self.chunk_size == 0 {
            bail!("chunk_size must be greater than 0");
        }

        if self.backfill_depth == Some(0) {
            bail!("backfill_depth must be greater than 0 when set");
        }

        if self.flush_interval.is_zero() {
            bail!("flush_interval must be greater than 0");
        }

        if self.max_concurrency == 0 {
            bail!("max_concurrency must be greater than 0");
        }

        if self.metrics_interval.is_zero() {
            bail!("metrics_interval must be greater than 0");
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct BackfillConfigBuilder {
    rpc_url: Option<String>,
    rpc_user: Option<String>,
    rpc_password: Option<String>,
    rpc_timeout: Option<Duration>,
    chunk_size: Option<u64>,
    first_block: Option<u64>,
    backfill_depth: Option<u64>,
    recheck_interval: Option<Duration>,
    flush_interval: Option<Duration>,
    max_concurrency: Option<usize>,
    metrics_interval: Option<Duration>,
}

impl BackfillConfigBuilder {
    pub fn rpc_url(mut self, url: impl Into<String>) -> Self {
        self.rpc_url = Some(url.into());
        self
    }

    pub fn rpc_user(mut self, user: impl Into<String>) -> Self {
        self.rpc_user = Some(user.into());
        self
    }

    pub fn rpc_password(mut self, password: impl Into<String>) -> Self {
        self.rpc_password = Some(password.into());
        self
    }

    pub fn rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = Some(timeout);
        self
    }

    pub fn chunk_size(mut self, blocks: u64) -> Self {
        self.chunk_size = Some(blocks);
        self
    }

    pub fn first_block(mut self, block: u64) -> Self {
        self.first_block = Some(block);
        self
    }

    pub fn backfill_depth(mut self, blocks: u64) -> Self {
        self.backfill_depth = Some(blocks);
        self
    }

    pub fn recheck_interval(mut self, interval: Duration) -> Self {
        self.recheck_interval = Some(interval);
        self
    }

    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = Some(interval);
        self
    }

    pub fn max_concurrency(mut self, workers: usize) -> Self {
        self.max_concurrency = Some(workers);
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    pub fn build(self) -> Result<BackfillConfig> {
        let params = BackfillConfigParams {
            rpc_url: self.rpc_url.context("rpc_url is required")?,
            rpc_user: self.rpc_user,
            rpc_password: self.rpc_password,
            rpc_timeout: self
                .rpc_timeout
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_RPC_TIMEOUT_SECS)),
            chunk_size: self.chunk_size.context("chunk_size is required")?,
            first_block: self.first_block.context("first_block is required")?,
            backfill_depth: self.backfill_depth,
            recheck_interval: self
                .recheck_interval
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_RECHECK_INTERVAL_SECS)),
            flush_interval: self
                .flush_interval
                .unwrap_or_else(|| Duration::from_millis(DEFAULT_FLUSH_INTERVAL_MS)),
            max_concurrency: self.max_concurrency.unwrap_or(DEFAULT_MAX_CONCURRENCY),
            metrics_interval: self
                .metrics_interval
                .unwrap_or(telemetry::DEFAULT_METRICS_INTERVAL),
        };

        BackfillConfig::new(params)
    }
}

fn ensure_not_empty(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        bail!("{field} cannot be empty");
    }
    Ok(())
}

fn validate_url(url: &str) -> Result<()> {
    let url = url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        bail!("rpc_url must start with http:// or https://");
    }
    Ok(())
}
