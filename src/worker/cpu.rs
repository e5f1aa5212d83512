//! CPU-based search worker.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};

use crate::crypto::KeypairGenerator;
use crate::matcher::Pattern;

use super::message::{Command, Envelope, WorkerEvent};
use super::MatchResult;

/// Consecutive generation failures after which a worker gives up.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 64;

/// Keys are added to the shared counters in chunks of this size.
const STATS_FLUSH_INTERVAL: u64 = 1024;

/// Statistics for a single worker.
#[derive(Debug, Default)]
pub struct WorkerStats {
    /// Total keys generated
    pub keys_generated: AtomicU64,
    /// Matches found
    pub matches_found: AtomicU64,
    /// Iterations attempted, successful or not; bumped every iteration
    pub heartbeat: AtomicU64,
}

impl WorkerStats {
    /// Creates new worker stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total keys generated.
    pub fn total_keys(&self) -> u64 {
        self.keys_generated.load(Ordering::Relaxed)
    }

    /// Returns the total matches found.
    pub fn total_matches(&self) -> u64 {
        self.matches_found.load(Ordering::Relaxed)
    }

    /// Returns the iteration counter the watchdog samples.
    pub fn heartbeat(&self) -> u64 {
        self.heartbeat.load(Ordering::Relaxed)
    }
}

/// Lifecycle of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Waiting for a batch
    Idle,
    /// Working through a batch
    Running { target: u64, produced: u64 },
    /// Finished its last batch
    Exhausted,
    /// Stopped by the coordinator
    Cancelled,
    /// Gave up after persistent generation failures
    Retired,
}

/// A CPU worker that generates and tests keypairs, one batch at a time.
pub struct CpuWorker {
    /// Worker ID
    id: usize,
    /// The compiled pattern, shared with the other workers
    pattern: Arc<Pattern>,
    /// Keypair source
    generator: Arc<dyn KeypairGenerator>,
    /// Batch assignments from the coordinator
    commands: Receiver<Command>,
    /// Events back to the coordinator
    events: Sender<Envelope>,
    /// Session-wide stop flag
    stop_flag: Arc<AtomicBool>,
    /// This worker's statistics
    stats: Arc<WorkerStats>,
    /// Failed generations since the last success, across batches
    consecutive_failures: u32,
    state: WorkerState,
}

impl CpuWorker {
    /// Creates a new CPU worker.
    pub(crate) fn new(
        id: usize,
        pattern: Arc<Pattern>,
        generator: Arc<dyn KeypairGenerator>,
        commands: Receiver<Command>,
        events: Sender<Envelope>,
        stop_flag: Arc<AtomicBool>,
        stats: Arc<WorkerStats>,
    ) -> Self {
        Self {
            id,
            pattern,
            generator,
            commands,
            events,
            stop_flag,
            stats,
            consecutive_failures: 0,
            state: WorkerState::Idle,
        }
    }

    /// Runs the worker loop.
    ///
    /// Blocks for a batch, works through it, reports, and blocks again until:
    /// - A `Cancel` command arrives or the command channel closes
    /// - The stop flag is set
    /// - Generation keeps failing and the worker retires
    pub fn run(mut self) {
        loop {
            self.state = WorkerState::Idle;

            let target = match self.commands.recv() {
                Ok(Command::Batch(target)) => target,
                Ok(Command::Cancel) | Err(_) => {
                    self.state = WorkerState::Cancelled;
                    break;
                }
            };

            if self.run_batch(target) != WorkerState::Exhausted {
                break;
            }
        }

        tracing::debug!(worker = self.id, state = ?self.state, "Worker exiting");
    }

    /// Generates and tests `target` keypairs.
    ///
    /// Matches are sent the moment they are found. Every iteration counts
    /// toward the batch, including ones whose generation failed. The failure
    /// streak survives batch boundaries, so a dead randomness source retires
    /// the worker whatever the batch size.
    fn run_batch(&mut self, target: u64) -> WorkerState {
        let mut produced = 0;
        let mut unreported = 0;
        self.state = WorkerState::Running { target, produced };

        while produced < target {
            // Cancellation is checked between iterations.
            if self.stop_flag.load(Ordering::Relaxed) {
                self.state = WorkerState::Cancelled;
                break;
            }

            let generated = self.generator.generate();
            self.stats.heartbeat.fetch_add(1, Ordering::Relaxed);

            match generated {
                Ok(keypair) => {
                    self.consecutive_failures = 0;
                    unreported += 1;

                    let address = keypair.address().to_base58();
                    if self.pattern.matches(&address) {
                        self.stats.matches_found.fetch_add(1, Ordering::Relaxed);

                        let result = MatchResult {
                            address,
                            keypair: keypair.to_bytes(),
                            worker_id: self.id,
                        };
                        if !self.emit(WorkerEvent::Match(result)) {
                            self.state = WorkerState::Cancelled;
                            break;
                        }
                    }
                }
                Err(e) => {
                    self.consecutive_failures += 1;
                    let failures = self.consecutive_failures;

                    // One report per streak; the retirement message carries the count.
                    if failures == 1 {
                        tracing::warn!(
                            worker = self.id,
                            error = %e,
                            "Keypair generation failed"
                        );
                        self.emit(WorkerEvent::Error(e.to_string()));
                    } else {
                        tracing::debug!(
                            worker = self.id,
                            failures,
                            error = %e,
                            "Keypair generation still failing"
                        );
                    }

                    if failures >= MAX_CONSECUTIVE_FAILURES {
                        tracing::error!(
                            worker = self.id,
                            failures,
                            "Randomness persistently unavailable, retiring worker"
                        );
                        self.emit(WorkerEvent::Retired(format!(
                            "worker {} retired after {} consecutive generation failures: {}",
                            self.id, failures, e
                        )));
                        self.state = WorkerState::Retired;
                        break;
                    }
                }
            }

            produced += 1;
            self.state = WorkerState::Running { target, produced };

            if unreported == STATS_FLUSH_INTERVAL {
                self.stats.keys_generated.fetch_add(unreported, Ordering::Relaxed);
                unreported = 0;
            }
        }

        self.stats.keys_generated.fetch_add(unreported, Ordering::Relaxed);

        if produced == target {
            self.state = WorkerState::Exhausted;
            if !self.emit(WorkerEvent::Exhausted(target)) {
                self.state = WorkerState::Cancelled;
            }
        }

        self.state
    }

    /// Sends an event to the coordinator. Returns false if it has gone away.
    fn emit(&self, event: WorkerEvent) -> bool {
        self.events
            .send(Envelope {
                worker_id: self.id,
                event,
            })
            .is_ok()
    }

    /// Returns the worker ID.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Returns the current state.
    pub fn state(&self) -> WorkerState {
        self.state
    }
}
