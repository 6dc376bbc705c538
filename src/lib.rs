pub mod backfill;
pub mod processor;
pub mod rpc;
pub mod runtime;
pub mod scheduler;

pub use backfill::{
    BackfillExecutor, BlockRange, BlockSink, DiscoveryError, DiscoveryWorker, FetchError,
    IndexedRangeInspector, RangeFetcher, RawBlock, WorkItem,
};
pub use processor::Backfiller;
pub use rpc::circuit_breaker::{CircuitBreakerSnapshot, CircuitState, RpcCircuitBreaker};
pub use rpc::{AsyncRpcClient, BlockBatchClient, RpcError, RpcRangeFetcher};
pub use runtime::clock::EngineClock;
pub use runtime::config::{BackfillConfig, BackfillConfigBuilder, BackfillConfigParams};
pub use runtime::progress::BoundaryTracker;
pub use runtime::runner::Runner;
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
pub use scheduler::{
    ScheduledTask, SchedulerState, StopReason, TaskExecutor, TaskOutcome, TaskScheduler,
    TaskSubmitter,
};
