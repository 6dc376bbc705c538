//! [`RangeFetcher`] backed by the JSON-RPC client: pulls a range in bounded batches and hands
//! the complete, ordered block list to a [`BlockSink`] in one call.

use crate::backfill::{BlockRange, BlockSink, FetchError, RangeFetcher, RawBlock};
use crate::rpc::client::{AsyncRpcClient, BlockBatchClient};
use crate::runtime::config::BackfillConfig;
use crate::runtime::telemetry::Telemetry;
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use std::sync::Arc;

pub struct RpcRangeFetcher<S> {
    client: Arc<dyn BlockBatchClient>,
    sink: Arc<S>,
    batch_size: u64,
}

impl<S: BlockSink> RpcRangeFetcher<S> {
    pub fn new(client: Arc<dyn BlockBatchClient>, sink: Arc<S>, batch_size: u64) -> Self {
        Self {
            client,
            sink,
            batch_size: batch_size.max(1),
        }
    }

    /// Builds an [`AsyncRpcClient`] from `config`; batches are `chunk_size` blocks wide.
    pub fn from_config(
        config: &BackfillConfig,
        sink: Arc<S>,
        telemetry: Arc<Telemetry>,
    ) -> Result<Self> {
        let client = AsyncRpcClient::from_config(config)
            .context("failed to build RPC client")?
            .with_telemetry(telemetry);
        tracing::info!(endpoint = client.endpoint(), "rpc range fetcher configured");
        Ok(Self::new(Arc::new(client), sink, config.chunk_size()))
    }

    pub fn sink(&self) -> &Arc<S> {
        &self.sink
    }

    async fn fetch_blocks(&self, range: BlockRange) -> Result<Vec<RawBlock>> {
        let mut blocks = Vec::with_capacity(range.len() as usize);
        for batch in range.chunks(self.batch_size) {
            let numbers = batch.heights();
            let fetched = self
                .client
                .batch_get_blocks(&numbers)
                .await
                .with_context(|| format!("failed to fetch batch {batch}"))?;
            blocks.extend(fetched);
        }
        Ok(blocks)
    }
}

impl<S: BlockSink> RangeFetcher for RpcRangeFetcher<S> {
    fn fetch_and_persist<'a>(&'a self, range: BlockRange) -> BoxFuture<'a, Result<(), FetchError>> {
        Box::pin(async move {
            let blocks = self
                .fetch_blocks(range)
                .await
                .map_err(|err| FetchError::rpc(range, err))?;

            let count = blocks.len();
            self.sink
                .persist_blocks(range, blocks)
                .await
                .map_err(|err| FetchError::partial(range, err))?;

            tracing::debug!(
                start_block = range.start,
                end_block = range.end,
                blocks = count,
                "persisted fetched range"
            );
            Ok(())
        })
    }
}
