//! Backfill orchestration: the `Backfiller` that owns a scheduler run and its
//! run-scoped lifecycle tasks.

pub mod backfiller;
pub(crate) mod lifecycle;

pub use backfiller::Backfiller;
