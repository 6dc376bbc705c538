use std::time::Duration;

use crate::support::{
    helpers::{init_tracing, MemoryIndex},
    mock_rpc::{MockChain, MockRpcServer},
};
use anyhow::Result;
use blockfill::{BackfillConfig, Backfiller, EngineClock, Runner, StopReason};
use tokio::time::{sleep, timeout};

fn config(server: &MockRpcServer, first_block: u64) -> Result<BackfillConfig> {
    BackfillConfig::builder()
        .rpc_url(server.url())
        .rpc_user("user")
        .rpc_password("pass")
        .chunk_size(16)
        .first_block(first_block)
        .recheck_interval(Duration::from_millis(50))
        .flush_interval(Duration::from_millis(10))
        .build()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn runner_returns_once_history_is_complete() -> Result<()> {
    init_tracing();
    let chain = MockChain::new(64);
    let server = MockRpcServer::start(chain.clone()).await?;
    let index = MemoryIndex::new();
    index.insert_blocks(chain.raw_blocks(41, 64));

    let backfiller = Backfiller::with_rpc(config(&server, 0)?, index.clone(), index.clone())?
        .with_clock(EngineClock::starting_at(chain.timestamp_ms(40) + 1));
    let mut runner = Runner::from_backfiller(backfiller);

    let reason = timeout(Duration::from_secs(20), runner.run_until_ctrl_c()).await??;
    server.shutdown().await;

    assert_eq!(reason, StopReason::Completed);
    assert_eq!(runner.backfiller().boundary(), Some(0));
    assert!(!runner.backfiller().is_running());
    assert_eq!(index.indexed(), (0..64).collect::<Vec<_>>());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn runner_stops_when_token_is_cancelled() -> Result<()> {
    init_tracing();
    let chain = MockChain::new(64);
    let server = MockRpcServer::start(chain.clone()).await?;
    // Nothing is indexed yet, so the run keeps polling for its reference block.
    let index = MemoryIndex::new();

    let mut runner = Runner::with_rpc(config(&server, 0)?, index.clone(), index.clone())?;
    let token = runner.cancellation_token();
    let canceller = tokio::spawn(async move {
        sleep(Duration::from_millis(200)).await;
        token.cancel();
    });

    let reason = timeout(Duration::from_secs(10), runner.run_until_ctrl_c()).await??;
    canceller.await?;
    server.shutdown().await;

    assert_eq!(reason, StopReason::Cancelled);
    assert_eq!(runner.backfiller().boundary(), None);
    assert!(!runner.backfiller().is_running());
    assert!(runner.backfiller().telemetry().snapshot().bootstrap_polls >= 1);
    assert_eq!(chain.requested_blocks(), 0);

    // A fresh token is installed, so the runner can be started again.
    runner.start().await?;
    assert!(runner.backfiller().is_running());
    runner.stop().await?;
    assert!(!runner.backfiller().is_running());
    Ok(())
}
