//! Search coordination: worker pool, restart protocol and session handles.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{
    bounded, unbounded, Receiver, RecvTimeoutError, Sender, TrySendError,
};

use crate::codec::DEFAULT_PREFIX;
use crate::crypto::{
    GenerationError, Keypair, KeypairGenerator, SecureGenerator, KEYPAIR_LENGTH,
};
use crate::matcher::{Criteria, Pattern};

use super::cpu::{CpuWorker, WorkerStats};
use super::message::{Command, Envelope, Outbound, SearchRequest, WorkerEvent};

/// Default number of keypairs per worker per batch.
pub const DEFAULT_BATCH_SIZE: u64 = 1024;

/// Default time a running worker may stay silent before it is reported.
pub const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Capacity of the caller-facing progress stream.
const PROGRESS_CAPACITY: usize = 1024;

/// How often the relay looks for stalled workers.
const WATCHDOG_TICK: Duration = Duration::from_millis(100);

static NEXT_COORDINATOR_ID: AtomicU64 = AtomicU64::new(1);

/// A keypair whose address satisfied the pattern.
#[derive(Clone, PartialEq, Eq)]
pub struct MatchResult {
    /// The base-58 address
    pub address: String,
    /// Secret seed (bytes 0..32) followed by public key (bytes 32..64)
    pub keypair: [u8; KEYPAIR_LENGTH],
    /// The ID of the worker that found this result
    pub worker_id: usize,
}

impl MatchResult {
    /// Re-imports the keypair, verifying that both halves belong together.
    pub fn to_keypair(&self) -> Result<Keypair, GenerationError> {
        Keypair::from_bytes(&self.keypair)
    }

    /// Wire form of this match.
    pub fn to_outbound(&self) -> Outbound {
        Outbound::Match(self.keypair.to_vec())
    }
}

impl fmt::Debug for MatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatchResult")
            .field("address", &self.address)
            .field("worker_id", &self.worker_id)
            .finish_non_exhaustive()
    }
}

/// Progress and health reports for a running session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchEvent {
    /// A worker finished a batch and was handed the next one
    Exhausted {
        worker_id: usize,
        batch: u64,
        /// Keypairs processed in exhausted batches so far, across all workers
        total: u64,
    },
    /// A single iteration failed; the worker carries on
    Error { worker_id: usize, message: String },
    /// A running worker has been silent longer than the stall timeout
    Stalled { worker_id: usize, idle: Duration },
    /// A worker gave up and will not be reassigned
    Retired { worker_id: usize, message: String },
    /// Every worker has retired; nothing is searching any more
    Failed,
}

impl SearchEvent {
    /// Wire form of this event.
    pub fn to_outbound(&self) -> Outbound {
        match self {
            SearchEvent::Exhausted { batch, .. } => Outbound::Exit(*batch),
            SearchEvent::Error { message, .. } | SearchEvent::Retired { message, .. } => {
                Outbound::Error(message.clone())
            }
            SearchEvent::Stalled { worker_id, idle } => Outbound::Error(format!(
                "worker {} stalled for {:.1}s",
                worker_id,
                idle.as_secs_f64()
            )),
            SearchEvent::Failed => Outbound::Error("all workers retired".into()),
        }
    }
}

/// Errors surfaced synchronously by the coordinator.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("A search is already running (session {0})")]
    AlreadyRunning(u64),

    #[error("Handle does not belong to this coordinator")]
    InvalidHandle,

    #[error("Batch size must be greater than zero")]
    InvalidBatchSize,

    #[error("Failed to spawn search thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Returns half of the available hardware parallelism, at least 1.
pub fn default_threads() -> usize {
    (num_cpus::get() / 2).max(1)
}

/// Parameters of a search session.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub criteria: Criteria,
    /// Literal prefix for the PoW pattern
    pub pow_prefix: String,
    /// Worker count (default: half the CPUs)
    pub threads: Option<usize>,
    /// Keypairs per worker per batch
    pub batch_size: u64,
    pub stall_timeout: Duration,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            criteria: Criteria::Pow,
            pow_prefix: DEFAULT_PREFIX.to_string(),
            threads: None,
            batch_size: DEFAULT_BATCH_SIZE,
            stall_timeout: DEFAULT_STALL_TIMEOUT,
        }
    }
}

impl SearchOptions {
    /// Options for a wire request, defaults elsewhere.
    pub fn from_request(request: SearchRequest) -> Self {
        Self {
            criteria: request.criteria,
            batch_size: request.count,
            ..Self::default()
        }
    }

    /// Returns the number of workers to spawn.
    pub fn thread_count(&self) -> usize {
        self.threads.unwrap_or_else(default_threads).max(1)
    }
}

/// Counters for one session.
#[derive(Debug)]
struct SessionStats {
    workers: Vec<Arc<WorkerStats>>,
    exhausted: AtomicU64,
    retired: AtomicUsize,
    failed: AtomicBool,
}

/// Caller's view of a running session: the match and progress streams plus
/// live statistics.
pub struct SearchHandle {
    coordinator_id: u64,
    session_id: u64,
    matches: Receiver<MatchResult>,
    events: Receiver<SearchEvent>,
    stats: Arc<SessionStats>,
    stop_flag: Arc<AtomicBool>,
    pattern: Arc<Pattern>,
    batch_size: u64,
    start_time: Instant,
}

impl SearchHandle {
    /// Session identifier, unique within its coordinator.
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Stream of matches, in discovery order per worker.
    pub fn matches(&self) -> &Receiver<MatchResult> {
        &self.matches
    }

    /// Stream of progress and health events.
    pub fn events(&self) -> &Receiver<SearchEvent> {
        &self.events
    }

    /// Waits for a match with a timeout.
    ///
    /// Returns `Some(result)` if a match is found, `None` if timeout expires
    /// or the session has ended.
    pub fn wait_for_match(&self, timeout: Duration) -> Option<MatchResult> {
        self.matches.recv_timeout(timeout).ok()
    }

    /// Attempts to receive a match without blocking.
    pub fn try_recv_match(&self) -> Option<MatchResult> {
        self.matches.try_recv().ok()
    }

    /// Returns the number of workers.
    pub fn num_workers(&self) -> usize {
        self.stats.workers.len()
    }

    /// Returns the pattern being searched for.
    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// Returns the batch size handed to each worker.
    pub fn batch_size(&self) -> u64 {
        self.batch_size
    }

    /// Returns the keypairs processed in exhausted batches.
    pub fn progress_total(&self) -> u64 {
        self.stats.exhausted.load(Ordering::Relaxed)
    }

    /// Returns the total keys generated across all workers.
    pub fn total_keys(&self) -> u64 {
        self.stats.workers.iter().map(|w| w.total_keys()).sum()
    }

    /// Returns the total matches found.
    pub fn total_matches(&self) -> u64 {
        self.stats.workers.iter().map(|w| w.total_matches()).sum()
    }

    /// Returns the elapsed time since the session started.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Returns the current generation rate (keys per second).
    pub fn keys_per_second(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.total_keys() as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Returns the number of workers that gave up.
    pub fn retired_workers(&self) -> usize {
        self.stats.retired.load(Ordering::Relaxed)
    }

    /// Returns true once every worker has retired.
    ///
    /// Set before `SearchEvent::Failed` is queued, so pollers that never
    /// read the event stream still see it.
    pub fn is_failed(&self) -> bool {
        self.stats.failed.load(Ordering::Relaxed)
    }

    /// Returns true once the session has been stopped.
    pub fn is_stopped(&self) -> bool {
        self.stop_flag.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for SearchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchHandle")
            .field("coordinator_id", &self.coordinator_id)
            .field("session_id", &self.session_id)
            .field("criteria", self.pattern.criteria())
            .finish_non_exhaustive()
    }
}

/// Threads and control channels of the active session.
struct Session {
    id: u64,
    stop_flag: Arc<AtomicBool>,
    commands: Vec<Sender<Command>>,
    workers: Vec<JoinHandle<()>>,
    relay: Option<JoinHandle<()>>,
}

impl Session {
    /// Cancels every worker and waits for all threads to exit.
    fn shutdown(mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);

        // Wakes idle workers; busy ones see the flag on their next iteration.
        for tx in self.commands.drain(..) {
            let _ = tx.send(Command::Cancel);
        }
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        if let Some(relay) = self.relay.take() {
            let _ = relay.join();
        }

        tracing::info!(session = self.id, "Search stopped");
    }
}

/// Owns the worker pool and runs at most one search session at a time.
///
/// Starting while a session is active fails with
/// [`SearchError::AlreadyRunning`]; stopping is idempotent.
pub struct SearchCoordinator {
    id: u64,
    generator: Arc<dyn KeypairGenerator>,
    active: Mutex<Option<Session>>,
    next_session: AtomicU64,
}

impl Default for SearchCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchCoordinator {
    /// Creates a coordinator using the secure system generator.
    pub fn new() -> Self {
        Self::with_generator(Arc::new(SecureGenerator))
    }

    /// Creates a coordinator with a custom keypair source.
    pub fn with_generator(generator: Arc<dyn KeypairGenerator>) -> Self {
        Self {
            id: NEXT_COORDINATOR_ID.fetch_add(1, Ordering::Relaxed),
            generator,
            active: Mutex::new(None),
            next_session: AtomicU64::new(1),
        }
    }

    /// Starts a search session.
    ///
    /// Spawns the workers, hands each an initial batch, and returns the handle
    /// carrying the match and progress streams.
    pub fn start(&self, options: SearchOptions) -> Result<SearchHandle, SearchError> {
        if options.batch_size == 0 {
            return Err(SearchError::InvalidBatchSize);
        }

        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(session) = active.as_ref() {
            return Err(SearchError::AlreadyRunning(session.id));
        }

        let session_id = self.next_session.fetch_add(1, Ordering::Relaxed);
        let num_workers = options.thread_count();
        let batch_size = options.batch_size;
        let pattern = Arc::new(Pattern::with_pow_prefix(
            options.criteria,
            options.pow_prefix,
        ));

        let stop_flag = Arc::new(AtomicBool::new(false));
        let (event_tx, event_rx) = unbounded();
        let (match_tx, match_rx) = unbounded();
        let (progress_tx, progress_rx) = bounded(PROGRESS_CAPACITY);

        let mut session = Session {
            id: session_id,
            stop_flag: stop_flag.clone(),
            commands: Vec::with_capacity(num_workers),
            workers: Vec::with_capacity(num_workers),
            relay: None,
        };
        let mut worker_stats = Vec::with_capacity(num_workers);

        for id in 0..num_workers {
            let (cmd_tx, cmd_rx) = unbounded();
            let stats = Arc::new(WorkerStats::new());
            let worker = CpuWorker::new(
                id,
                pattern.clone(),
                self.generator.clone(),
                cmd_rx,
                event_tx.clone(),
                stop_flag.clone(),
                stats.clone(),
            );

            let spawned = thread::Builder::new()
                .name(format!("vanity-worker-{}", id))
                .spawn(move || worker.run());

            match spawned {
                Ok(handle) => {
                    session.workers.push(handle);
                    session.commands.push(cmd_tx);
                    worker_stats.push(stats);
                }
                Err(e) => {
                    tracing::error!(worker = id, error = %e, "Failed to spawn worker thread");
                    session.shutdown();
                    return Err(e.into());
                }
            }
        }

        // Only workers hold event senders, so the relay ends once they exit.
        drop(event_tx);

        let stats = Arc::new(SessionStats {
            workers: worker_stats,
            exhausted: AtomicU64::new(0),
            retired: AtomicUsize::new(0),
            failed: AtomicBool::new(false),
        });

        let relay = Relay {
            events: event_rx,
            commands: session.commands.clone(),
            matches: match_tx,
            progress: progress_tx,
            fatal: VecDeque::new(),
            stop_flag: stop_flag.clone(),
            stats: stats.clone(),
            batch_size,
            stall_timeout: options.stall_timeout,
        };
        match thread::Builder::new()
            .name("vanity-relay".into())
            .spawn(move || relay.run())
        {
            Ok(handle) => session.relay = Some(handle),
            Err(e) => {
                tracing::error!(error = %e, "Failed to spawn relay thread");
                session.shutdown();
                return Err(e.into());
            }
        }

        for tx in &session.commands {
            let _ = tx.send(Command::Batch(batch_size));
        }

        tracing::info!(
            session = session_id,
            workers = num_workers,
            batch_size,
            criteria = %pattern.criteria(),
            "Search started"
        );

        *active = Some(session);

        Ok(SearchHandle {
            coordinator_id: self.id,
            session_id,
            matches: match_rx,
            events: progress_rx,
            stats,
            stop_flag,
            pattern,
            batch_size,
            start_time: Instant::now(),
        })
    }

    /// Stops the session behind `handle` and waits for its threads.
    ///
    /// Once this returns no further matches or events are produced. Stopping
    /// an already stopped handle is a no-op.
    pub fn stop(&self, handle: &SearchHandle) -> Result<(), SearchError> {
        if handle.coordinator_id != self.id {
            return Err(SearchError::InvalidHandle);
        }

        let session = {
            let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
            let current = active
                .as_ref()
                .is_some_and(|session| session.id == handle.session_id);
            if current {
                active.take()
            } else {
                None
            }
        };

        if let Some(session) = session {
            session.shutdown();
        }
        Ok(())
    }

    /// Returns true while a session is active.
    pub fn is_running(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl Drop for SearchCoordinator {
    fn drop(&mut self) {
        let session = self
            .active
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(session) = session {
            session.shutdown();
        }
    }
}

/// Forwards worker events to the caller and re-issues batches.
struct Relay {
    events: Receiver<Envelope>,
    commands: Vec<Sender<Command>>,
    matches: Sender<MatchResult>,
    progress: Sender<SearchEvent>,
    /// `Retired` and `Failed` waiting for room on the progress stream
    fatal: VecDeque<SearchEvent>,
    stop_flag: Arc<AtomicBool>,
    stats: Arc<SessionStats>,
    batch_size: u64,
    stall_timeout: Duration,
}

impl Relay {
    fn run(mut self) {
        let num_workers = self.commands.len();
        let mut last_seen = vec![Instant::now(); num_workers];
        let mut heartbeats = vec![0u64; num_workers];
        let mut stalled = vec![false; num_workers];
        let mut retired = vec![false; num_workers];
        let mut last_check = Instant::now();

        loop {
            match self.events.recv_timeout(WATCHDOG_TICK) {
                Ok(envelope) => {
                    // Nothing is forwarded once the session is stopping.
                    if self.stop_flag.load(Ordering::Relaxed) {
                        continue;
                    }
                    let id = envelope.worker_id;
                    last_seen[id] = Instant::now();
                    stalled[id] = false;

                    match envelope.event {
                        WorkerEvent::Match(result) => {
                            tracing::debug!(
                                worker = id,
                                address = %result.address,
                                "Match found"
                            );
                            let _ = self.matches.send(result);
                        }
                        WorkerEvent::Exhausted(batch) => {
                            let total =
                                self.stats.exhausted.fetch_add(batch, Ordering::Relaxed) + batch;
                            self.publish(SearchEvent::Exhausted {
                                worker_id: id,
                                batch,
                                total,
                            });
                            let next = Command::Batch(self.batch_size);
                            if self.commands[id].send(next).is_err() {
                                tracing::warn!(worker = id, "Worker gone before reassignment");
                            }
                        }
                        WorkerEvent::Error(message) => {
                            self.publish(SearchEvent::Error {
                                worker_id: id,
                                message,
                            });
                        }
                        WorkerEvent::Retired(message) => {
                            retired[id] = true;
                            self.stats.retired.fetch_add(1, Ordering::Relaxed);
                            self.publish_fatal(SearchEvent::Retired {
                                worker_id: id,
                                message,
                            });
                            if retired.iter().all(|r| *r) {
                                tracing::error!("All workers retired, search cannot continue");
                                self.stats.failed.store(true, Ordering::Relaxed);
                                self.publish_fatal(SearchEvent::Failed);
                            }
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            if self.stop_flag.load(Ordering::Relaxed) {
                continue;
            }
            self.flush_fatal();

            if last_check.elapsed() >= WATCHDOG_TICK {
                last_check = Instant::now();
                for id in 0..num_workers {
                    // A worker that is still iterating is alive, events or not.
                    let heartbeat = self.stats.workers[id].heartbeat();
                    if heartbeat != heartbeats[id] {
                        heartbeats[id] = heartbeat;
                        last_seen[id] = last_check;
                        stalled[id] = false;
                    }

                    let idle = last_seen[id].elapsed();
                    if !retired[id] && !stalled[id] && idle > self.stall_timeout {
                        stalled[id] = true;
                        tracing::warn!(
                            worker = id,
                            idle_secs = idle.as_secs_f64(),
                            "Worker stalled"
                        );
                        self.publish(SearchEvent::Stalled {
                            worker_id: id,
                            idle,
                        });
                    }
                }
            }
        }
    }

    /// Progress is lossy when the caller lags: every `Exhausted` carries the
    /// running total, and the exact figure stays on the handle. Queued fatal
    /// events keep their place ahead of new progress.
    fn publish(&self, event: SearchEvent) {
        if self.fatal.is_empty() {
            let _ = self.progress.try_send(event);
        }
    }

    /// `Retired` and `Failed` are never dropped; they wait for room instead.
    fn publish_fatal(&mut self, event: SearchEvent) {
        self.fatal.push_back(event);
        self.flush_fatal();
    }

    fn flush_fatal(&mut self) {
        while let Some(event) = self.fatal.pop_front() {
            match self.progress.try_send(event) {
                Ok(()) => {}
                Err(TrySendError::Full(event)) => {
                    self.fatal.push_front(event);
                    break;
                }
                Err(TrySendError::Disconnected(_)) => {
                    self.fatal.clear();
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::MAX_CONSECUTIVE_FAILURES;

    fn options(criteria: Criteria, threads: usize, batch_size: u64) -> SearchOptions {
        SearchOptions {
            criteria,
            threads: Some(threads),
            batch_size,
            ..SearchOptions::default()
        }
    }

    /// Practically never matches.
    fn never() -> Criteria {
        Criteria::Start("zzzzzzzzzz".into())
    }

    fn always() -> Criteria {
        Criteria::Start(String::new())
    }

    struct FailingGenerator;

    impl KeypairGenerator for FailingGenerator {
        fn generate(&self) -> Result<Keypair, GenerationError> {
            let io = std::io::Error::new(std::io::ErrorKind::Other, "no entropy");
            Err(GenerationError::Entropy(rand::Error::new(io)))
        }
    }

    /// Succeeds `limit` times across all workers, then fails forever.
    struct FailAfter {
        limit: u64,
        calls: AtomicU64,
    }

    impl FailAfter {
        fn new(limit: u64) -> Self {
            Self {
                limit,
                calls: AtomicU64::new(0),
            }
        }
    }

    impl KeypairGenerator for FailAfter {
        fn generate(&self) -> Result<Keypair, GenerationError> {
            if self.calls.fetch_add(1, Ordering::Relaxed) < self.limit {
                Keypair::generate()
            } else {
                FailingGenerator.generate()
            }
        }
    }

    struct SlowGenerator(Duration);

    impl KeypairGenerator for SlowGenerator {
        fn generate(&self) -> Result<Keypair, GenerationError> {
            thread::sleep(self.0);
            Keypair::generate()
        }
    }

    #[test]
    fn test_default_threads() {
        assert!(default_threads() >= 1);
        assert_eq!(SearchOptions::default().thread_count(), default_threads());
        assert_eq!(options(never(), 0, 1).thread_count(), 1);
    }

    #[test]
    fn test_progress_accumulates_batches() {
        let coordinator = SearchCoordinator::new();
        let handle = coordinator.start(options(never(), 2, 100)).unwrap();

        let mut cycles = 0;
        while cycles < 10 {
            match handle.events().recv_timeout(Duration::from_secs(10)).unwrap() {
                SearchEvent::Exhausted { batch, total, .. } => {
                    cycles += 1;
                    assert_eq!(batch, 100);
                    assert_eq!(total, 100 * cycles);
                }
                other => panic!("unexpected event {:?}", other),
            }
        }

        coordinator.stop(&handle).unwrap();
        assert!(handle.progress_total() >= 1000);
        assert_eq!(handle.progress_total() % 100, 0);
    }

    #[test]
    fn test_matches_arrive_before_exhaustion() {
        const K: u64 = 25;
        let coordinator = SearchCoordinator::new();
        let handle = coordinator.start(options(always(), 1, K)).unwrap();

        let first = handle.events().recv_timeout(Duration::from_secs(10)).unwrap();
        assert!(matches!(first, SearchEvent::Exhausted { batch: K, total: K, .. }));

        // The relay forwards a worker's matches before its exhaustion report.
        let matches: Vec<_> = handle.matches().try_iter().collect();
        assert!(matches.len() as u64 >= K);
        for result in &matches {
            assert_eq!(result.worker_id, 0);
            let keypair = result.to_keypair().unwrap();
            assert_eq!(keypair.address().to_base58(), result.address);
        }

        coordinator.stop(&handle).unwrap();
    }

    #[test]
    fn test_stop_ends_both_streams() {
        let coordinator = SearchCoordinator::new();
        let handle = coordinator.start(options(always(), 4, 1000)).unwrap();

        assert!(handle.wait_for_match(Duration::from_secs(10)).is_some());
        coordinator.stop(&handle).unwrap();
        assert!(handle.is_stopped());
        assert!(!coordinator.is_running());

        // Whatever was emitted before the stop drains, then both streams close.
        while handle.try_recv_match().is_some() {}
        handle.events().try_iter().for_each(drop);
        assert_eq!(
            handle.matches().recv_timeout(Duration::from_millis(500)),
            Err(RecvTimeoutError::Disconnected)
        );
        assert_eq!(
            handle.events().recv_timeout(Duration::from_millis(500)),
            Err(RecvTimeoutError::Disconnected)
        );

        let keys = handle.total_keys();
        thread::sleep(Duration::from_millis(100));
        assert_eq!(handle.total_keys(), keys);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let coordinator = SearchCoordinator::new();
        let handle = coordinator.start(options(never(), 1, 100)).unwrap();
        coordinator.stop(&handle).unwrap();
        coordinator.stop(&handle).unwrap();
    }

    #[test]
    fn test_start_while_running_fails() {
        let coordinator = SearchCoordinator::new();
        let handle = coordinator.start(options(never(), 1, 100)).unwrap();

        match coordinator.start(options(never(), 1, 100)) {
            Err(SearchError::AlreadyRunning(id)) => assert_eq!(id, handle.session_id()),
            other => panic!("expected AlreadyRunning, got {:?}", other),
        }

        coordinator.stop(&handle).unwrap();
        let next = coordinator.start(options(never(), 1, 100)).unwrap();
        assert_ne!(next.session_id(), handle.session_id());

        // The old handle no longer controls anything.
        coordinator.stop(&handle).unwrap();
        assert!(coordinator.is_running());
        coordinator.stop(&next).unwrap();
    }

    #[test]
    fn test_foreign_handle_rejected() {
        let a = SearchCoordinator::new();
        let b = SearchCoordinator::new();
        let handle = a.start(options(never(), 1, 100)).unwrap();

        assert!(matches!(b.stop(&handle), Err(SearchError::InvalidHandle)));
        assert!(a.is_running());
        a.stop(&handle).unwrap();
    }

    #[test]
    fn test_zero_batch_rejected() {
        let coordinator = SearchCoordinator::new();
        assert!(matches!(
            coordinator.start(options(never(), 1, 0)),
            Err(SearchError::InvalidBatchSize)
        ));
        assert!(!coordinator.is_running());
    }

    #[test]
    fn test_failing_generator_retires_workers() {
        let coordinator = SearchCoordinator::with_generator(Arc::new(FailingGenerator));
        let handle = coordinator.start(options(Criteria::Pow, 2, 1000)).unwrap();

        let mut errors = 0;
        let mut retired = 0;
        loop {
            match handle.events().recv_timeout(Duration::from_secs(10)).unwrap() {
                SearchEvent::Error { .. } => errors += 1,
                SearchEvent::Retired { .. } => retired += 1,
                SearchEvent::Failed => break,
                other => panic!("unexpected event {:?}", other),
            }
        }

        // One error per failure streak, then the retirements.
        assert_eq!(retired, 2);
        assert_eq!(errors, 2);
        assert_eq!(handle.progress_total(), 0);
        assert!(handle.is_failed());
        assert_eq!(handle.retired_workers(), 2);
        coordinator.stop(&handle).unwrap();
    }

    #[test]
    fn test_small_batches_still_retire() {
        let coordinator = SearchCoordinator::with_generator(Arc::new(FailingGenerator));
        let handle = coordinator.start(options(Criteria::Pow, 1, 10)).unwrap();

        let mut exhausted = 0;
        loop {
            match handle.events().recv_timeout(Duration::from_secs(10)).unwrap() {
                SearchEvent::Exhausted { .. } => exhausted += 1,
                SearchEvent::Error { .. } | SearchEvent::Retired { .. } => {}
                SearchEvent::Failed => break,
                other => panic!("unexpected event {:?}", other),
            }
        }

        // Six full batches of failures, then the streak hits the cap mid-batch.
        let full_batches = MAX_CONSECUTIVE_FAILURES as u64 / 10;
        assert_eq!(exhausted, full_batches);
        assert_eq!(handle.progress_total(), full_batches * 10);
        assert!(handle.is_failed());
        coordinator.stop(&handle).unwrap();
    }

    #[test]
    fn test_failure_survives_lagging_consumer() {
        // 3000 successes at batch size 1 overflow the progress stream before
        // any worker starts failing.
        let generator = Arc::new(FailAfter::new(3000));
        let coordinator = SearchCoordinator::with_generator(generator);
        let handle = coordinator.start(options(never(), 2, 1)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        while !handle.is_failed() {
            assert!(Instant::now() < deadline, "search never failed");
            thread::sleep(Duration::from_millis(10));
        }

        let mut received = 0;
        let mut retired = 0;
        loop {
            let event = handle.events().recv_timeout(Duration::from_secs(5)).unwrap();
            received += 1;
            match event {
                SearchEvent::Retired { .. } => retired += 1,
                SearchEvent::Failed => break,
                _ => {}
            }
        }

        assert!(received > PROGRESS_CAPACITY);
        assert_eq!(retired, 2);
        coordinator.stop(&handle).unwrap();
    }

    #[test]
    fn test_watchdog_reports_stall() {
        let generator = Arc::new(SlowGenerator(Duration::from_millis(400)));
        let coordinator = SearchCoordinator::with_generator(generator);
        let handle = coordinator
            .start(SearchOptions {
                stall_timeout: Duration::from_millis(150),
                ..options(never(), 1, 1000)
            })
            .unwrap();

        match handle.events().recv_timeout(Duration::from_secs(5)).unwrap() {
            SearchEvent::Stalled { worker_id, idle } => {
                assert_eq!(worker_id, 0);
                assert!(idle > Duration::from_millis(150));
            }
            other => panic!("expected stall, got {:?}", other),
        }

        // Shutdown waits for at most the in-flight generation.
        let begun = Instant::now();
        coordinator.stop(&handle).unwrap();
        assert!(begun.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_watchdog_ignores_busy_worker() {
        // Slow but steady: no events for the whole run, yet never stalled.
        let generator = Arc::new(SlowGenerator(Duration::from_millis(20)));
        let coordinator = SearchCoordinator::with_generator(generator);
        let handle = coordinator
            .start(SearchOptions {
                stall_timeout: Duration::from_millis(300),
                ..options(never(), 1, 1000)
            })
            .unwrap();

        assert_eq!(
            handle.events().recv_timeout(Duration::from_secs(1)),
            Err(RecvTimeoutError::Timeout)
        );
        coordinator.stop(&handle).unwrap();
    }

    #[test]
    fn test_first_match_for_suffix() {
        let coordinator = SearchCoordinator::new();
        let handle = coordinator
            .start(options(Criteria::End("z".into()), 4, 50))
            .unwrap();

        let result = handle.wait_for_match(Duration::from_secs(30)).unwrap();
        coordinator.stop(&handle).unwrap();

        let keypair = result.to_keypair().unwrap();
        assert!(keypair.address().to_base58().ends_with('z'));
    }

    #[test]
    #[ignore = "expected ~11M keypairs; run with --ignored"]
    fn test_first_match_for_pow7() {
        let coordinator = SearchCoordinator::new();
        let handle = coordinator
            .start(options(Criteria::Start("pow7".into()), 4, 50))
            .unwrap();

        let result = handle.wait_for_match(Duration::from_secs(3600)).unwrap();
        coordinator.stop(&handle).unwrap();

        assert_eq!(result.keypair.len(), 64);
        let keypair = result.to_keypair().unwrap();
        assert!(keypair.address().to_base58().starts_with("pow7"));
    }
}
