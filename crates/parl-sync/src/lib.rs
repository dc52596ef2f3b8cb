//! Ingestion pipeline: per-record upserts, the two-stream cycle, and the
//! fixed-interval scheduler.

pub mod config;
mod ingest;
mod scheduler;
mod upsert;

pub use config::{ConfigError, OverlapPolicy, SyncConfig};
pub use ingest::{CycleSummary, Ingestor, StreamOutcome};
pub use scheduler::Scheduler;
pub use upsert::{upsert_batch, UpsertTally, Upsertable};

pub const CRATE_NAME: &str = "parl-sync";
