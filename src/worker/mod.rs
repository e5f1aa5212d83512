//! Worker pool for parallel vanity keypair search.
//!
//! This module provides:
//! - Multi-threaded CPU workers running fixed-size batches
//! - A coordinator that re-issues batches until the search is stopped
//! - Match and progress streams for the caller
//! - The JSON messages of the line protocol

mod cpu;
mod message;
mod pool;

pub use cpu::{CpuWorker, WorkerState, WorkerStats, MAX_CONSECUTIVE_FAILURES};
pub use message::{Outbound, SearchRequest};
pub use pool::{
    default_threads, MatchResult, SearchCoordinator, SearchError, SearchEvent, SearchHandle,
    SearchOptions, DEFAULT_BATCH_SIZE, DEFAULT_STALL_TIMEOUT,
};
