use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use crate::support::{
    helpers::{assert_disjoint, init_tracing, wait_for_boundary, MemoryIndex},
    mock_rpc::{MockChain, MockRpcServer},
};
use anyhow::Result;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use blockfill::{
    AsyncRpcClient, BackfillConfig, BackfillConfigBuilder, Backfiller, BlockRange, EngineClock,
    RpcError, RpcRangeFetcher, StopReason,
};
use tokio::time::{sleep, timeout};

const CHAIN_LENGTH: u64 = 240;
/// First block the live indexer has written when the backfill starts.
const LIVE_START: u64 = 201;
const RUN_TIMEOUT: Duration = Duration::from_secs(20);

fn config_builder(server: &MockRpcServer) -> BackfillConfigBuilder {
    BackfillConfig::builder()
        .rpc_url(server.url())
        .rpc_user("user")
        .rpc_password("pass")
        .rpc_timeout(Duration::from_secs(2))
        .chunk_size(50)
        .first_block(0)
        .recheck_interval(Duration::from_millis(50))
        .flush_interval(Duration::from_millis(10))
        .metrics_interval(Duration::from_millis(200))
}

/// The reference time sits just after block 200, so bootstrap settles on [`LIVE_START`].
fn backfiller(
    chain: &MockChain,
    config: BackfillConfig,
    index: &Arc<MemoryIndex>,
) -> Result<Backfiller<MemoryIndex, RpcRangeFetcher<MemoryIndex>>> {
    Ok(Backfiller::with_rpc(config, index.clone(), index.clone())?
        .with_clock(EngineClock::starting_at(chain.timestamp_ms(200) + 1)))
}

async fn run_to_completion(
    backfiller: &mut Backfiller<MemoryIndex, RpcRangeFetcher<MemoryIndex>>,
) -> Result<StopReason> {
    backfiller.start().await?;
    Ok(timeout(RUN_TIMEOUT, backfiller.wait()).await??)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn backfills_full_history_over_rpc() -> Result<()> {
    init_tracing();
    let chain = MockChain::new(CHAIN_LENGTH);
    let server = MockRpcServer::start(chain.clone()).await?;
    let index = MemoryIndex::new();
    index.insert_blocks(chain.raw_blocks(LIVE_START, CHAIN_LENGTH));

    let config = config_builder(&server).build()?;
    let mut backfiller = backfiller(&chain, config, &index)?;

    let reason = run_to_completion(&mut backfiller).await?;
    server.shutdown().await;

    assert_eq!(reason, StopReason::Completed);
    assert_eq!(backfiller.boundary(), Some(0));
    assert_eq!(index.indexed(), (0..CHAIN_LENGTH).collect::<Vec<_>>());

    let persisted = index.persisted_ranges();
    assert_disjoint(&persisted);
    assert_eq!(
        persisted.iter().map(BlockRange::len).sum::<u64>(),
        LIVE_START
    );
    assert_eq!(chain.requested_blocks(), LIVE_START);

    let snapshot = backfiller.telemetry().snapshot();
    assert_eq!(snapshot.blocks_fetched, LIVE_START);
    assert_eq!(snapshot.fetch_errors, 0);
    assert!(snapshot.rpc_requests > 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fetches_only_missing_ranges_above_first_block() -> Result<()> {
    init_tracing();
    let chain = MockChain::new(CHAIN_LENGTH);
    let server = MockRpcServer::start(chain.clone()).await?;
    let index = MemoryIndex::new();
    index.insert_blocks(chain.raw_blocks(LIVE_START, CHAIN_LENGTH));
    index.insert_blocks(chain.raw_blocks(150, 180));
    index.insert_blocks(chain.raw_blocks(120, 125));

    let config = config_builder(&server)
        .first_block(100)
        .max_concurrency(4)
        .build()?;
    let mut backfiller = backfiller(&chain, config, &index)?;

    let reason = run_to_completion(&mut backfiller).await?;
    server.shutdown().await;

    assert_eq!(reason, StopReason::Completed);
    assert_eq!(backfiller.boundary(), Some(100));
    assert_eq!(index.indexed(), (100..CHAIN_LENGTH).collect::<Vec<_>>());

    let persisted = index.persisted_ranges();
    assert_disjoint(&persisted);
    let fetched: BTreeSet<u64> = persisted
        .iter()
        .flat_map(|range| range.start..range.end)
        .collect();
    let expected: BTreeSet<u64> = (100..120).chain(125..150).chain(180..LIVE_START).collect();
    assert_eq!(fetched, expected, "only gaps may be fetched");
    assert_eq!(chain.requested_blocks(), expected.len() as u64);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn recovers_from_flaky_rpc() -> Result<()> {
    init_tracing();
    let chain = MockChain::new(CHAIN_LENGTH);
    let server = MockRpcServer::start(chain.clone()).await?;
    let index = MemoryIndex::new();
    index.insert_blocks(chain.raw_blocks(LIVE_START, CHAIN_LENGTH));
    chain.fail_next_requests(4);

    let config = config_builder(&server).build()?;
    let mut backfiller = backfiller(&chain, config, &index)?;

    let reason = run_to_completion(&mut backfiller).await?;
    server.shutdown().await;

    assert_eq!(reason, StopReason::Completed);
    assert_eq!(index.indexed(), (0..CHAIN_LENGTH).collect::<Vec<_>>());
    assert_disjoint(&index.persisted_ranges());

    let snapshot = backfiller.telemetry().snapshot();
    assert!(
        snapshot.fetch_errors >= 1,
        "exhausted client retries should surface as a failed step"
    );
    assert!(snapshot.retries_now >= 1);
    assert!(snapshot.rpc_errors >= 4);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sink_failure_is_retried() -> Result<()> {
    init_tracing();
    let chain = MockChain::new(CHAIN_LENGTH);
    let server = MockRpcServer::start(chain.clone()).await?;
    let index = MemoryIndex::new();
    index.insert_blocks(chain.raw_blocks(LIVE_START, CHAIN_LENGTH));
    index.fail_next_persists(1);

    let config = config_builder(&server).build()?;
    let mut backfiller = backfiller(&chain, config, &index)?;

    let reason = run_to_completion(&mut backfiller).await?;
    server.shutdown().await;

    assert_eq!(reason, StopReason::Completed);
    assert_eq!(index.indexed(), (0..CHAIN_LENGTH).collect::<Vec<_>>());
    assert_disjoint(&index.persisted_ranges());

    let snapshot = backfiller.telemetry().snapshot();
    assert_eq!(snapshot.fetch_errors, 1);
    assert_eq!(snapshot.blocks_fetched, LIVE_START);
    assert!(chain.requested_blocks() > LIVE_START, "failed range is refetched");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn waits_for_live_indexer_before_walking() -> Result<()> {
    init_tracing();
    let chain = MockChain::new(CHAIN_LENGTH);
    let server = MockRpcServer::start(chain.clone()).await?;
    let index = MemoryIndex::new();

    let config = config_builder(&server).first_block(150).build()?;
    let mut backfiller = backfiller(&chain, config, &index)?;
    backfiller.start().await?;

    sleep(Duration::from_millis(300)).await;
    assert_eq!(backfiller.boundary(), None);
    assert_eq!(chain.requested_blocks(), 0);
    assert!(backfiller.telemetry().snapshot().bootstrap_polls > 1);

    index.insert_blocks(chain.raw_blocks(LIVE_START, CHAIN_LENGTH));
    wait_for_boundary(&backfiller, 150, RUN_TIMEOUT).await?;

    let reason = timeout(RUN_TIMEOUT, backfiller.wait()).await??;
    server.shutdown().await;

    assert_eq!(reason, StopReason::Completed);
    assert_eq!(index.indexed(), (150..CHAIN_LENGTH).collect::<Vec<_>>());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn client_fetches_blocks_with_basic_auth() -> Result<()> {
    init_tracing();
    let chain = MockChain::new(CHAIN_LENGTH);
    let server = MockRpcServer::start(chain.clone()).await?;

    let client = AsyncRpcClient::new(server.url(), Some(("user", "pass")))?;
    let blocks = client.batch_get_blocks(&[3, 4, 5]).await?;
    let beyond_tip = client.batch_get_blocks(&[CHAIN_LENGTH]).await;
    server.shutdown().await;

    assert_eq!(
        blocks.iter().map(|block| block.number).collect::<Vec<_>>(),
        vec![3, 4, 5]
    );
    assert_eq!(blocks[1].timestamp_ms, chain.timestamp_ms(4));
    let err = beyond_tip.expect_err("block past the tip must be unavailable");
    assert!(matches!(
        err.downcast_ref::<RpcError>(),
        Some(RpcError::BlockUnavailable { number }) if *number == CHAIN_LENGTH
    ));
    assert_eq!(chain.requested_blocks(), 4, "unavailable blocks are not retried");

    let expected = format!("Basic {}", STANDARD.encode("user:pass"));
    assert_eq!(chain.last_authorization(), Some(expected));
    Ok(())
}
