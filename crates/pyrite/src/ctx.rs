//! The execution context.
//!
//! A `Ctx` is the single carrier of mutable evaluation state: stdout buffer,
//! environment variables, filesystem, module registry, wall-clock budget,
//! RNG, and the ordered event log that makes suspend/resume replay
//! deterministic. Every API surface threads a `Ctx` in and out; there is no
//! process-global state.
//!
//! The internals sit behind `Arc` so generator producer threads share the
//! same context as their consumer; the rendezvous discipline means the two
//! sides never contend on the locks.

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant, SystemTime},
};

use ahash::AHashMap;
use indexmap::IndexMap;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::{
    exceptions::{RunError, RunResult},
    fs::{FileSystem, FsError, MemoryFs, WriteMode},
    modules::ModuleDef,
    types::class_table::ClassTable,
    value::Value,
};

/// One recorded evaluation event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    /// Monotonic step number within the log.
    pub step: u64,
    pub payload: EventPayload,
}

/// Event kinds recorded during evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// A name was bound (payload: the target name).
    Assign,
    /// A conditional chose an arm (payload: arm index).
    Branch,
    /// A loop ran one iteration.
    LoopIter,
    /// A user function call started (payload: function name).
    CallEnter,
    /// A user function call returned.
    CallExit,
    /// The script called `suspend()`.
    Suspend,
    /// A filesystem operation ran (payload: op + path).
    FileOp,
    /// A wall-clock sample was taken (payload: the sampled value, replayed
    /// verbatim on resume).
    Clock,
}

/// Minimal event payloads; just enough to verify replay and re-supply
/// nondeterministic inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    None,
    Name(String),
    Arm(u32),
    File { op: String, path: String },
    Clock(f64),
}

/// Wall-clock budget with pause support for streaming.
#[derive(Debug)]
struct Budget {
    timeout: Duration,
    /// Compute time accumulated across pauses.
    compute: Duration,
    /// Set while the evaluator is actively running.
    started_at: Option<Instant>,
}

impl Budget {
    fn elapsed(&self) -> Duration {
        let running = self.started_at.map(|s| s.elapsed()).unwrap_or_default();
        self.compute + running
    }

    fn check(&self) -> RunResult<()> {
        let elapsed = self.elapsed();
        if elapsed > self.timeout {
            return Err(RunError::Timeout {
                limit: self.timeout,
                elapsed,
            });
        }
        Ok(())
    }

    fn resume(&mut self) {
        if self.started_at.is_none() {
            self.started_at = Some(Instant::now());
        }
    }

    fn pause(&mut self) {
        if let Some(started) = self.started_at.take() {
            self.compute += started.elapsed();
        }
    }
}

/// The replayable event log.
#[derive(Debug, Default)]
struct EventLog {
    log: Vec<Event>,
    step: u64,
    /// Non-empty while replaying: events consumed in lock-step with
    /// re-execution until exhausted, at which point the evaluator goes live.
    remaining: VecDeque<Event>,
}

/// Configuration for a new [`Ctx`].
pub struct CtxOptions {
    /// Wall-clock limit in milliseconds.
    pub timeout_ms: u64,
    /// Environment variables visible through the `os` module.
    pub environ: IndexMap<String, String>,
    /// Seed for the deterministic `random` module.
    pub rng_seed: u64,
    /// Filesystem backend; defaults to [`MemoryFs`].
    pub filesystem: Option<Box<dyn FileSystem>>,
    /// Host-registered importable modules.
    pub modules: IndexMap<String, ModuleDef>,
}

impl Default for CtxOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            environ: IndexMap::new(),
            rng_seed: 0,
            filesystem: None,
            modules: IndexMap::new(),
        }
    }
}

impl std::fmt::Debug for CtxOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CtxOptions")
            .field("timeout_ms", &self.timeout_ms)
            .field("rng_seed", &self.rng_seed)
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// The execution context; cheap to clone (shared internals).
#[derive(Debug, Clone)]
pub struct Ctx {
    pub(crate) inner: Arc<CtxInner>,
}

#[derive(Debug)]
pub(crate) struct CtxInner {
    stdout: Mutex<String>,
    pub(crate) environ: IndexMap<String, String>,
    fs: Mutex<Box<dyn FileSystem>>,
    pub(crate) registry: IndexMap<String, ModuleDef>,
    pub(crate) loaded_modules: Mutex<AHashMap<Arc<str>, Value>>,
    budget: Mutex<Budget>,
    events: Mutex<EventLog>,
    file_ops: AtomicU64,
    pub(crate) rng: Mutex<ChaCha8Rng>,
    rng_seed: u64,
    timeout_ms: u64,
    pub(crate) classes: ClassTable,
}

/// Counter snapshot used to compute per-request telemetry deltas.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CtxCounters {
    pub event_count: u64,
    pub file_ops: u64,
    pub compute: Duration,
}

/// Per-response resource accounting record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Telemetry {
    /// Compute microseconds accumulated (excludes suspended time for streams).
    pub compute_us: u64,
    /// Total wall-clock microseconds for the call.
    pub total_us: u64,
    /// Event-log growth during the call.
    pub event_count: u64,
    /// Filesystem operations during the call.
    pub file_ops: u64,
}

/// Serialized form of a context for `dump()`/`load()`.
///
/// Host-registered modules and non-memory filesystems are not carried: the
/// host re-registers those when loading.
#[derive(Debug, Serialize, Deserialize)]
struct CtxSnapshot {
    timeout_ms: u64,
    rng_seed: u64,
    environ: Vec<(String, String)>,
    stdout: String,
    file_ops: u64,
    fs_files: Option<Vec<(String, String)>>,
    events: Vec<Event>,
}

impl Default for Ctx {
    fn default() -> Self {
        Self::new(CtxOptions::default())
    }
}

impl Ctx {
    #[must_use]
    pub fn new(options: CtxOptions) -> Self {
        let fs: Box<dyn FileSystem> = options.filesystem.unwrap_or_else(|| Box::new(MemoryFs::new()));
        Self {
            inner: Arc::new(CtxInner {
                stdout: Mutex::new(String::new()),
                environ: options.environ,
                fs: Mutex::new(fs),
                registry: options.modules,
                loaded_modules: Mutex::new(AHashMap::new()),
                budget: Mutex::new(Budget {
                    timeout: Duration::from_millis(options.timeout_ms),
                    compute: Duration::ZERO,
                    started_at: None,
                }),
                events: Mutex::new(EventLog::default()),
                file_ops: AtomicU64::new(0),
                rng: Mutex::new(ChaCha8Rng::seed_from_u64(options.rng_seed)),
                rng_seed: options.rng_seed,
                timeout_ms: options.timeout_ms,
                classes: ClassTable::build(),
            }),
        }
    }

    /// Everything printed so far.
    #[must_use]
    pub fn stdout(&self) -> String {
        lock(&self.inner.stdout).clone()
    }

    /// The recorded event log (cloned).
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        lock(&self.inner.events).log.clone()
    }

    #[must_use]
    pub fn event_count(&self) -> u64 {
        lock(&self.inner.events).log.len() as u64
    }

    #[must_use]
    pub fn file_ops(&self) -> u64 {
        self.inner.file_ops.load(Ordering::Relaxed)
    }

    /// Serializes the context (stdout, environ, memory filesystem, event log)
    /// to a binary format for durable suspension.
    pub fn dump(&self) -> Result<Vec<u8>, postcard::Error> {
        let snapshot = CtxSnapshot {
            timeout_ms: self.inner.timeout_ms,
            rng_seed: self.inner.rng_seed,
            environ: self.inner.environ.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            stdout: self.stdout(),
            file_ops: self.file_ops(),
            fs_files: lock(&self.inner.fs).snapshot(),
            events: self.events(),
        };
        postcard::to_allocvec(&snapshot)
    }

    /// Restores a context from [`Ctx::dump`] output. Host-registered modules
    /// must be re-registered by the caller if the script imports them.
    pub fn load(bytes: &[u8]) -> Result<Self, postcard::Error> {
        let snapshot: CtxSnapshot = postcard::from_bytes(bytes)?;
        let mut fs = MemoryFs::new();
        if let Some(files) = snapshot.fs_files {
            for (path, contents) in files {
                fs.insert(path, contents);
            }
        }
        let ctx = Self::new(CtxOptions {
            timeout_ms: snapshot.timeout_ms,
            rng_seed: snapshot.rng_seed,
            environ: snapshot.environ.into_iter().collect(),
            filesystem: Some(Box::new(fs)),
            modules: IndexMap::new(),
        });
        *lock(&ctx.inner.stdout) = snapshot.stdout;
        ctx.inner.file_ops.store(snapshot.file_ops, Ordering::Relaxed);
        let mut events = lock(&ctx.inner.events);
        events.step = snapshot.events.len() as u64;
        events.log = snapshot.events;
        drop(events);
        Ok(ctx)
    }

    // ---- crate-internal surface -------------------------------------------

    /// Starts (or resumes) the compute clock for a host-level call.
    pub(crate) fn clock_resume(&self) {
        lock(&self.inner.budget).resume();
    }

    /// Pauses the compute clock (between streamed chunks, or at call end).
    pub(crate) fn clock_pause(&self) {
        lock(&self.inner.budget).pause();
    }

    /// Deadline check, called before each statement.
    pub(crate) fn check_time(&self) -> RunResult<()> {
        lock(&self.inner.budget).check()
    }

    pub(crate) fn compute(&self) -> Duration {
        lock(&self.inner.budget).elapsed()
    }

    pub(crate) fn counters(&self) -> CtxCounters {
        CtxCounters {
            event_count: self.event_count(),
            file_ops: self.file_ops(),
            compute: self.compute(),
        }
    }

    pub(crate) fn telemetry_since(&self, baseline: &CtxCounters, started: Instant) -> Telemetry {
        let now = self.counters();
        Telemetry {
            compute_us: now.compute.saturating_sub(baseline.compute).as_micros() as u64,
            total_us: started.elapsed().as_micros() as u64,
            event_count: now.event_count.saturating_sub(baseline.event_count),
            file_ops: now.file_ops.saturating_sub(baseline.file_ops),
        }
    }

    /// True while the event log still has queued events to replay.
    pub(crate) fn replaying(&self) -> bool {
        !lock(&self.inner.events).remaining.is_empty()
    }

    /// Records an event (live) or consumes-and-verifies the next logged event
    /// (replay). Returns the logged payload while replaying so callers can
    /// re-supply nondeterministic inputs (clock samples).
    pub(crate) fn record(&self, kind: EventKind, payload: EventPayload) -> RunResult<Option<EventPayload>> {
        let mut events = lock(&self.inner.events);
        if let Some(expected) = events.remaining.pop_front() {
            if expected.kind != kind {
                return Err(RunError::ReplayDivergence(
                    format!(
                        "replay divergence at step {}: log has {:?}, execution produced {:?}",
                        expected.step, expected.kind, kind
                    )
                    .into(),
                ));
            }
            let payloads_comparable = !matches!(expected.payload, EventPayload::Clock(_));
            if payloads_comparable && expected.payload != payload {
                return Err(RunError::ReplayDivergence(
                    format!(
                        "replay divergence at step {}: log has {:?}, execution produced {:?}",
                        expected.step, expected.payload, payload
                    )
                    .into(),
                ));
            }
            return Ok(Some(expected.payload));
        }
        events.step += 1;
        let step = events.step;
        events.log.push(Event { kind, step, payload });
        Ok(None)
    }

    /// Moves the recorded log into the replay queue and rewinds derived state
    /// (RNG, compute clock, module cache) so re-execution reproduces the
    /// original run event for event.
    pub(crate) fn prepare_resume(&self) {
        let mut events = lock(&self.inner.events);
        events.remaining = events.log.iter().cloned().collect();
        drop(events);
        *lock(&self.inner.rng) = ChaCha8Rng::seed_from_u64(self.inner.rng_seed);
        // imports must re-run so their recorded events replay in order
        lock(&self.inner.loaded_modules).clear();
        let mut budget = lock(&self.inner.budget);
        budget.compute = Duration::ZERO;
        budget.started_at = None;
    }

    /// Appends to the stdout buffer; suppressed during replay (the buffer
    /// already holds the output of the original run).
    pub(crate) fn write_stdout(&self, text: &str) {
        if self.replaying() {
            return;
        }
        lock(&self.inner.stdout).push_str(text);
    }

    /// Samples the wall clock, replay-stable: the sampled value is logged and
    /// replayed verbatim on resume.
    pub(crate) fn time_now(&self) -> RunResult<f64> {
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        match self.record(EventKind::Clock, EventPayload::Clock(now))? {
            Some(EventPayload::Clock(logged)) => Ok(logged),
            _ => Ok(now),
        }
    }

    // ---- filesystem wrappers ----------------------------------------------

    fn record_file_op(&self, op: &str, path: &str) -> RunResult<bool> {
        self.inner.file_ops.fetch_add(1, Ordering::Relaxed);
        let replayed = self
            .record(
                EventKind::FileOp,
                EventPayload::File {
                    op: op.to_owned(),
                    path: path.to_owned(),
                },
            )?
            .is_some();
        Ok(replayed)
    }

    pub(crate) fn fs_read(&self, path: &str) -> RunResult<Result<String, FsError>> {
        self.record_file_op("read", path)?;
        Ok(lock(&self.inner.fs).read(path))
    }

    pub(crate) fn fs_write(&self, path: &str, contents: &str, mode: WriteMode) -> RunResult<Result<(), FsError>> {
        // mutating ops were already applied when the log was recorded
        if self.record_file_op("write", path)? {
            return Ok(Ok(()));
        }
        Ok(lock(&self.inner.fs).write(path, contents, mode))
    }

    pub(crate) fn fs_exists(&self, path: &str) -> RunResult<bool> {
        self.record_file_op("exists", path)?;
        Ok(lock(&self.inner.fs).exists(path))
    }

    pub(crate) fn fs_delete(&self, path: &str) -> RunResult<Result<(), FsError>> {
        if self.record_file_op("delete", path)? {
            return Ok(Ok(()));
        }
        Ok(lock(&self.inner.fs).delete(path))
    }

    pub(crate) fn fs_list(&self, prefix: &str) -> RunResult<Vec<String>> {
        self.record_file_op("list", prefix)?;
        Ok(lock(&self.inner.fs).list(prefix))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_and_replay_roundtrip() {
        let ctx = Ctx::default();
        ctx.record(EventKind::Assign, EventPayload::Name("x".to_owned())).unwrap();
        ctx.record(EventKind::Branch, EventPayload::Arm(1)).unwrap();
        assert_eq!(ctx.event_count(), 2);

        ctx.prepare_resume();
        assert!(ctx.replaying());
        let replayed = ctx
            .record(EventKind::Assign, EventPayload::Name("x".to_owned()))
            .unwrap();
        assert!(replayed.is_some());
        ctx.record(EventKind::Branch, EventPayload::Arm(1)).unwrap();
        assert!(!ctx.replaying());
        // log is not duplicated by replay
        assert_eq!(ctx.event_count(), 2);
    }

    #[test]
    fn replay_divergence_detected() {
        let ctx = Ctx::default();
        ctx.record(EventKind::Branch, EventPayload::Arm(0)).unwrap();
        ctx.prepare_resume();
        let err = ctx.record(EventKind::Branch, EventPayload::Arm(1)).unwrap_err();
        assert!(matches!(err, RunError::ReplayDivergence(_)));
    }

    #[test]
    fn stdout_suppressed_during_replay() {
        let ctx = Ctx::default();
        ctx.record(EventKind::LoopIter, EventPayload::None).unwrap();
        ctx.write_stdout("live\n");
        ctx.prepare_resume();
        ctx.write_stdout("replayed\n");
        assert_eq!(ctx.stdout(), "live\n");
    }

    #[test]
    fn dump_load_roundtrip() {
        let ctx = Ctx::default();
        ctx.write_stdout("hello\n");
        ctx.record(EventKind::Assign, EventPayload::Name("x".to_owned())).unwrap();
        ctx.fs_write("f.txt", "data", WriteMode::Write).unwrap().unwrap();
        let bytes = ctx.dump().unwrap();
        let restored = Ctx::load(&bytes).unwrap();
        assert_eq!(restored.stdout(), "hello\n");
        assert_eq!(restored.event_count(), 2); // assign + file_op
        assert_eq!(restored.fs_read("f.txt").unwrap().unwrap(), "data");
    }

    #[test]
    fn timeout_budget() {
        let ctx = Ctx::new(CtxOptions {
            timeout_ms: 0,
            ..CtxOptions::default()
        });
        ctx.clock_resume();
        std::thread::sleep(Duration::from_millis(2));
        assert!(ctx.check_time().is_err());
    }
}
