//! Pool of persistent worker subprocesses.
//!
//! At most one worker runs per canonical tool path. Workers are spawned on
//! first use, reused across calls, and removed when they time out, break
//! the protocol, die, sit idle past the configured limit, or the pool shuts
//! down.

use crate::tools::error::ToolError;
use crate::tools::worker::config::WorkerPoolConfig;
use crate::tools::worker::process::{self, Spawned};
use crate::tools::worker::protocol::{WorkerRequest, WorkerResponse};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::Notify;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Returns the display name for a tool file (its stem).
fn tool_name_for(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

struct WorkerIo {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// One live worker subprocess.
struct Worker {
    tool_name: String,
    tool_path: PathBuf,
    pid: Option<u32>,
    child: Mutex<Option<Child>>,
    io: Arc<tokio::sync::Mutex<WorkerIo>>,
    last_used: Mutex<Instant>,
    call_count: AtomicU64,
}

impl Worker {
    fn new(tool_name: String, tool_path: PathBuf, spawned: Spawned) -> Self {
        Self {
            tool_name,
            tool_path,
            pid: spawned.child.id(),
            child: Mutex::new(Some(spawned.child)),
            io: Arc::new(tokio::sync::Mutex::new(WorkerIo {
                stdin: spawned.stdin,
                stdout: spawned.stdout,
            })),
            last_used: Mutex::new(Instant::now()),
            call_count: AtomicU64::new(0),
        }
    }

    fn is_alive(&self) -> bool {
        match lock(&self.child).as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    fn is_busy(&self) -> bool {
        self.io.try_lock().is_err()
    }

    fn touch(&self) -> u64 {
        *lock(&self.last_used) = Instant::now();
        self.call_count.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn refresh(&self) {
        *lock(&self.last_used) = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        lock(&self.last_used).elapsed()
    }

    fn calls(&self) -> u64 {
        self.call_count.load(Ordering::SeqCst)
    }

    fn take_child(&self) -> Option<Child> {
        lock(&self.child).take()
    }

    /// Kills the process without waiting; used when a call is abandoned.
    fn abandon(&self) {
        if let Some(child) = lock(&self.child).as_mut() {
            if let Err(e) = child.start_kill() {
                debug!(tool = %self.tool_name, error = %e, "Abandoned worker already gone");
            }
        }
    }

    fn stats(&self) -> WorkerStats {
        WorkerStats {
            tool_name: self.tool_name.clone(),
            tool_path: self.tool_path.clone(),
            pid: self.pid,
            alive: self.is_alive(),
            call_count: self.calls(),
            idle_seconds: self.idle_for().as_secs_f64(),
        }
    }
}

/// Kills the worker if the call future is dropped before its exchange
/// completes, so a late response can never be read by the next call.
struct ExchangeGuard<'a> {
    worker: &'a Worker,
    armed: bool,
}

impl Drop for ExchangeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!(tool = %self.worker.tool_name, "Worker call abandoned mid-exchange; killing worker");
            self.worker.abandon();
        }
    }
}

/// Snapshot of one worker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerStats {
    /// Tool name (file stem)
    pub tool_name: String,
    /// Canonical tool file path
    pub tool_path: PathBuf,
    /// Process id, if the platform reported one
    pub pid: Option<u32>,
    /// Whether the process was running at snapshot time
    pub alive: bool,
    /// Calls routed to this worker
    pub call_count: u64,
    /// Seconds since the worker was last used
    pub idle_seconds: f64,
}

/// Snapshot of the whole pool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolStats {
    /// Number of live workers
    pub worker_count: usize,
    /// Configured idle timeout
    pub idle_timeout_secs: f64,
    /// Processes spawned since the pool was created
    pub spawn_count: u64,
    /// Per-worker details, ordered by tool path
    pub workers: Vec<WorkerStats>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EvictReason {
    Idle,
    Dead,
}

impl EvictReason {
    fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Dead => "dead",
        }
    }
}

struct PoolInner {
    config: WorkerPoolConfig,
    workers: Mutex<HashMap<PathBuf, Arc<Worker>>>,
    shutting_down: AtomicBool,
    reaper: Mutex<Option<JoinHandle<()>>>,
    reaper_stop: Arc<Notify>,
    spawn_count: AtomicU64,
}

impl PoolInner {
    fn is_current(&self, path: &Path, worker: &Arc<Worker>) -> bool {
        lock(&self.workers)
            .get(path)
            .is_some_and(|current| Arc::ptr_eq(current, worker))
    }

    /// Removes `worker` from the map if the entry still refers to it.
    fn purge(&self, path: &Path, worker: &Arc<Worker>) -> bool {
        let mut workers = lock(&self.workers);
        match workers.get(path) {
            Some(current) if Arc::ptr_eq(current, worker) => {
                workers.remove(path);
                true
            }
            _ => false,
        }
    }

    fn collect_reapable(&self) -> Vec<(Arc<Worker>, EvictReason)> {
        let idle_timeout = self.config.idle_timeout;
        let mut evicted = Vec::new();
        lock(&self.workers).retain(|_, worker| {
            if !worker.is_alive() {
                evicted.push((Arc::clone(worker), EvictReason::Dead));
                return false;
            }
            if !worker.is_busy() && worker.idle_for() >= idle_timeout {
                evicted.push((Arc::clone(worker), EvictReason::Idle));
                return false;
            }
            true
        });
        evicted
    }
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        self.reaper_stop.notify_one();
    }
}

async fn reap_loop(pool: Weak<PoolInner>, stop: Arc<Notify>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = stop.notified() => break,
            _ = ticker.tick() => {}
        }

        let Some(inner) = pool.upgrade() else { break };
        let grace = inner.config.grace_period;
        let evicted = inner.collect_reapable();
        drop(inner);

        for (worker, reason) in evicted {
            info!(
                tool = %worker.tool_name,
                reason = reason.as_str(),
                idle_secs = worker.idle_for().as_secs(),
                call_count = worker.calls(),
                "Reaped worker"
            );
            if let Some(child) = worker.take_child() {
                process::terminate(child, grace, &worker.tool_name).await;
            }
        }
    }
    debug!("Worker reaper stopped");
}

/// Pool of persistent worker subprocesses, one per tool file.
///
/// Cloning the pool is cheap; clones share the same workers.
///
/// # Example
///
/// ```rust,no_run
/// use toolhost::tools::worker::{WorkerPool, WorkerPoolConfig, WorkerRequest};
/// use serde_json::{json, Map};
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = WorkerPool::new(WorkerPoolConfig::default())?;
///
/// let mut kwargs = Map::new();
/// kwargs.insert("query".to_string(), json!("rust"));
/// let request = WorkerRequest::new("search", kwargs);
///
/// let value = pool.call(Path::new("tools/search.py"), request, None).await?;
/// println!("{value}");
///
/// pool.shutdown().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.inner.config)
            .field("worker_count", &lock(&self.inner.workers).len())
            .field("shutting_down", &self.is_shutting_down())
            .finish_non_exhaustive()
    }
}

impl WorkerPool {
    /// Creates an empty pool. No process is spawned until the first call.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the configuration is invalid.
    pub fn new(config: WorkerPoolConfig) -> Result<Self, crate::error::ConfigError> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(PoolInner {
                config,
                workers: Mutex::new(HashMap::new()),
                shutting_down: AtomicBool::new(false),
                reaper: Mutex::new(None),
                reaper_stop: Arc::new(Notify::new()),
                spawn_count: AtomicU64::new(0),
            }),
        })
    }

    /// Returns the pool configuration.
    #[must_use]
    pub fn config(&self) -> &WorkerPoolConfig {
        &self.inner.config
    }

    /// Returns true once `shutdown` has been called.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::SeqCst)
    }

    /// Returns the number of processes spawned so far.
    #[must_use]
    pub fn spawn_count(&self) -> u64 {
        self.inner.spawn_count.load(Ordering::SeqCst)
    }

    /// Calls a function in the worker for `tool_path`.
    ///
    /// The worker is spawned if absent and respawned if it died since the
    /// last call. Calls to the same worker are serialized; calls to
    /// different workers proceed independently.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the tool file cannot be resolved
    /// - `ShuttingDown` after `shutdown`
    /// - `WorkerTimeout` if no response arrives within `timeout`; the
    ///   worker is killed. The deadline also covers waiting for a busy
    ///   worker, in which case the worker is left running
    /// - `WorkerTransport` on spawn failure, broken pipe, EOF or a malformed
    ///   response; the worker is removed
    /// - `ExecutionFailed` if the function reported an error; the worker
    ///   is kept
    pub async fn call(
        &self,
        tool_path: &Path,
        request: WorkerRequest,
        timeout: Option<Duration>,
    ) -> Result<Value, ToolError> {
        if self.is_shutting_down() {
            return Err(ToolError::shutting_down());
        }

        let path = std::fs::canonicalize(tool_path).map_err(|e| {
            ToolError::not_found(format!("{} ({})", tool_path.display(), e))
        })?;
        let tool_name = tool_name_for(&path);
        let timeout = timeout.unwrap_or(self.inner.config.call_timeout);

        let line = request
            .encode()
            .map_err(|e| ToolError::internal(format!("cannot encode worker request: {e}")))?;

        debug!(
            tool = %tool_name,
            function = %request.function,
            timeout_ms = timeout.as_millis() as u64,
            "Sending worker request"
        );

        self.ensure_reaper();
        let deadline = tokio::time::Instant::now() + timeout;
        let (worker, mut io) = loop {
            let worker = self.checkout(&path, &tool_name)?;
            let Ok(io) = tokio::time::timeout_at(deadline, Arc::clone(&worker.io).lock_owned()).await
            else {
                warn!(
                    tool = %tool_name,
                    function = %request.function,
                    timeout_secs = timeout.as_secs_f64(),
                    "Worker stayed busy past the call deadline"
                );
                return Err(ToolError::worker_timeout(tool_name, timeout));
            };
            // A failed call ahead of this one may have replaced the worker.
            if self.inner.is_current(&path, &worker) && worker.is_alive() {
                break (worker, io);
            }
            drop(io);
            if tokio::time::Instant::now() >= deadline {
                return Err(ToolError::worker_timeout(tool_name, timeout));
            }
            debug!(tool = %tool_name, "Worker was replaced while waiting; checking out again");
        };

        let mut guard = ExchangeGuard {
            worker: &worker,
            armed: true,
        };
        let outcome = tokio::time::timeout_at(deadline, exchange(&mut io, &line)).await;
        guard.armed = false;
        drop(guard);
        worker.refresh();

        // Failures evict while `io` is still held so no queued call can
        // reach a process that is about to be killed.
        let result = match outcome {
            Err(_) => {
                warn!(
                    tool = %tool_name,
                    function = %request.function,
                    timeout_secs = timeout.as_secs_f64(),
                    "Worker call timed out; killing worker"
                );
                self.evict(&path, &worker).await;
                Err(ToolError::worker_timeout(tool_name, timeout))
            }
            Ok(Err(reason)) => {
                warn!(tool = %tool_name, reason = %reason, "Worker transport failed");
                self.evict(&path, &worker).await;
                Err(ToolError::worker_transport(tool_name, reason))
            }
            Ok(Ok(line)) => match WorkerResponse::decode(&line) {
                Err(reason) => {
                    warn!(tool = %tool_name, reason = %reason, "Worker sent a malformed response");
                    self.evict(&path, &worker).await;
                    Err(ToolError::worker_transport(tool_name, reason))
                }
                Ok(response) => response
                    .into_result()
                    .map_err(|message| ToolError::execution_failed(tool_name, message)),
            },
        };
        drop(io);
        result
    }

    /// Returns the live worker for `path`, spawning one if needed.
    fn checkout(&self, path: &Path, tool_name: &str) -> Result<Arc<Worker>, ToolError> {
        let mut workers = lock(&self.inner.workers);
        if self.is_shutting_down() {
            return Err(ToolError::shutting_down());
        }

        if let Some(existing) = workers.get(path) {
            if existing.is_alive() {
                existing.touch();
                return Ok(Arc::clone(existing));
            }
            warn!(
                tool = %tool_name,
                call_count = existing.calls(),
                "Worker exited since last call; respawning"
            );
            workers.remove(path);
        }

        let spawned = process::spawn(&self.inner.config, path)
            .map_err(|reason| ToolError::worker_transport(tool_name, reason))?;
        let worker = Arc::new(Worker::new(tool_name.to_string(), path.to_path_buf(), spawned));
        worker.touch();
        workers.insert(path.to_path_buf(), Arc::clone(&worker));
        self.inner.spawn_count.fetch_add(1, Ordering::SeqCst);

        info!(
            tool = %tool_name,
            pid = worker.pid,
            worker_count = workers.len(),
            "Started worker"
        );
        Ok(worker)
    }

    async fn evict(&self, path: &Path, worker: &Arc<Worker>) {
        self.inner.purge(path, worker);
        if let Some(child) = worker.take_child() {
            process::kill(child, &worker.tool_name).await;
        }
    }

    fn ensure_reaper(&self) {
        let mut slot = lock(&self.inner.reaper);
        if slot.is_some() || self.is_shutting_down() {
            return;
        }
        let handle = tokio::spawn(reap_loop(
            Arc::downgrade(&self.inner),
            Arc::clone(&self.inner.reaper_stop),
            self.inner.config.reap_interval,
        ));
        *slot = Some(handle);
        debug!(
            interval_secs = self.inner.config.reap_interval.as_secs_f64(),
            "Started worker reaper"
        );
    }

    /// Returns a snapshot of the pool, purging dead workers first.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let mut workers = lock(&self.inner.workers);
        workers.retain(|_, worker| {
            let alive = worker.is_alive();
            if !alive {
                debug!(tool = %worker.tool_name, "Purging dead worker");
            }
            alive
        });

        let mut snapshots: Vec<WorkerStats> = workers.values().map(|w| w.stats()).collect();
        snapshots.sort_by(|a, b| a.tool_path.cmp(&b.tool_path));

        PoolStats {
            worker_count: snapshots.len(),
            idle_timeout_secs: self.inner.config.idle_timeout.as_secs_f64(),
            spawn_count: self.spawn_count(),
            workers: snapshots,
        }
    }

    /// Stops the reaper and terminates every worker.
    ///
    /// Workers get a terminate signal and the configured grace period
    /// before being killed. Safe to call more than once.
    pub async fn shutdown(&self) {
        let first = !self.inner.shutting_down.swap(true, Ordering::SeqCst);

        let reaper = lock(&self.inner.reaper).take();
        if let Some(handle) = reaper {
            self.inner.reaper_stop.notify_one();
            if let Err(e) = handle.await {
                warn!(error = %e, "Worker reaper ended abnormally");
            }
        }

        let drained: Vec<Arc<Worker>> = lock(&self.inner.workers)
            .drain()
            .map(|(_, worker)| worker)
            .collect();

        if first {
            info!(worker_count = drained.len(), "Shutting down worker pool");
        }

        let grace = self.inner.config.grace_period;
        let mut terminations = JoinSet::new();
        for worker in drained {
            if let Some(child) = worker.take_child() {
                let name = worker.tool_name.clone();
                terminations.spawn(async move { process::terminate(child, grace, &name).await });
            }
        }
        while terminations.join_next().await.is_some() {}
    }
}

async fn exchange(io: &mut WorkerIo, line: &str) -> Result<String, String> {
    io.stdin
        .write_all(line.as_bytes())
        .await
        .map_err(|e| format!("failed to write request: {e}"))?;
    io.stdin
        .flush()
        .await
        .map_err(|e| format!("failed to flush request: {e}"))?;

    let mut response = String::new();
    let read = io
        .stdout
        .read_line(&mut response)
        .await
        .map_err(|e| format!("failed to read response: {e}"))?;
    if read == 0 {
        return Err("worker closed its output before responding (EOF)".to_string());
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn pool() -> WorkerPool {
        WorkerPool::new(WorkerPoolConfig::default()).unwrap()
    }

    #[test]
    fn new_rejects_invalid_config() {
        let config = WorkerPoolConfig::new().with_reap_interval(Duration::ZERO);
        assert!(WorkerPool::new(config).is_err());
    }

    #[test]
    fn empty_pool_stats() {
        let stats = pool().stats();
        assert_eq!(stats.worker_count, 0);
        assert_eq!(stats.spawn_count, 0);
        assert_eq!(stats.idle_timeout_secs, 600.0);
        assert!(stats.workers.is_empty());
    }

    #[test]
    fn tool_name_is_file_stem() {
        assert_eq!(tool_name_for(Path::new("/srv/tools/search.py")), "search");
    }

    #[tokio::test]
    async fn missing_tool_file_is_not_found() {
        let err = pool()
            .call(
                Path::new("/nonexistent/toolhost/tool.py"),
                WorkerRequest::new("f", Map::new()),
                None,
            )
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn spawn_failure_is_transport_error_and_leaves_no_worker() {
        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("tool.py");
        std::fs::write(&tool, "def f():\n    return 1\n").unwrap();

        let config = WorkerPoolConfig::new().with_runtime("/nonexistent/toolhost-runtime");
        let pool = WorkerPool::new(config).unwrap();
        let err = pool
            .call(&tool, WorkerRequest::new("f", Map::new()), None)
            .await
            .unwrap_err();
        assert!(err.is_transport());
        assert_eq!(pool.stats().worker_count, 0);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_is_idempotent_and_blocks_new_calls() {
        let pool = pool();
        pool.shutdown().await;
        pool.shutdown().await;
        assert!(pool.is_shutting_down());

        let err = pool
            .call(Path::new("tool.py"), WorkerRequest::new("f", Map::new()), None)
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::shutting_down());
    }

    #[test]
    fn debug_reports_worker_count() {
        let debug = format!("{:?}", pool());
        assert!(debug.contains("worker_count: 0"));
    }
}
