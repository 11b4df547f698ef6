//! # coworkers-cluster
//!
//! Supervises one real operating-system process per declared queue. The
//! master process that owns a [`ClusterManager`] never opens broker
//! resources itself -- it only spawns, restarts, and signals worker
//! processes, each of which re-executes the current binary bound to a
//! single queue via [`ENV_WORKER_QUEUE`].

#![doc(html_root_url = "https://docs.rs/coworkers-cluster/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

use coworkers_core::{CoworkersError, CoworkersResult, QueueName};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;

/// The line a worker process prints to its inherited stdout once `connect`
/// has fully succeeded; `start` reads this as the worker's readiness signal.
pub const READY_MARKER: &str = "coworkers:ready";

/// Environment variable naming the single queue a worker process is bound to.
pub const ENV_WORKER_QUEUE: &str = "COWORKERS_QUEUE";
/// Environment variable naming a worker's index within its queue's pool.
///
/// This manager runs exactly one worker per declared queue, so this is
/// always `"0"`; the variable exists so a future pool-size increment does
/// not need a new wire format.
pub const ENV_WORKER_NUM: &str = "COWORKERS_QUEUE_WORKER_NUM";

const READY_TIMEOUT: Duration = Duration::from_secs(30);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Running,
    Stopping,
}

struct WorkerRecord {
    queue: QueueName,
    pid: Option<i32>,
}

/// Supervises worker processes, one per declared queue.
///
/// At any quiescent moment while [`ClusterManager::start`] has resolved and
/// [`ClusterManager::stop`] has not yet been called, the live worker set is
/// a bijection over the declared queues: restarts replace a worker bound to
/// the same queue rather than dropping or duplicating it.
pub struct ClusterManager {
    queues: Vec<QueueName>,
    state: Arc<Mutex<State>>,
    workers: Arc<Mutex<HashMap<u64, WorkerRecord>>>,
    next_id: AtomicU64,
}

impl ClusterManager {
    /// Creates a manager for the given declared queues. No processes are
    /// spawned until [`ClusterManager::start`] is called.
    #[must_use]
    pub fn new(queues: Vec<QueueName>) -> Self {
        Self {
            queues,
            state: Arc::new(Mutex::new(State::Idle)),
            workers: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Spawns one worker process per declared queue and waits for every one
    /// to report readiness over its stdout, or fails as soon as any worker
    /// exits (or fails to spawn) first.
    ///
    /// Once resolved, a background supervisor keeps each worker's queue
    /// bound to a live process: a worker that exits non-zero while this
    /// manager is running is replaced with a fresh process bound to the
    /// same queue.
    ///
    /// # Errors
    ///
    /// Returns a transport-kind error if a worker cannot be spawned, exits
    /// before reporting readiness, or no worker reports readiness within
    /// the readiness timeout. On any of these, every already-spawned
    /// worker is stopped before the error is returned.
    pub async fn start(&self) -> CoworkersResult<()> {
        *self.state.lock().await = State::Running;

        let (ready_tx, mut ready_rx) = mpsc::unbounded_channel::<CoworkersResult<()>>();

        for queue in self.queues.clone() {
            let worker_id = self.next_id.fetch_add(1, Ordering::SeqCst);
            self.workers.lock().await.insert(
                worker_id,
                WorkerRecord {
                    queue: queue.clone(),
                    pid: None,
                },
            );
            self.spawn_supervisor(worker_id, queue, Some(ready_tx.clone()));
        }
        drop(ready_tx);

        let expected = self.queues.len();
        let outcome = timeout(READY_TIMEOUT, async {
            let mut ready_count = 0;
            while ready_count < expected {
                match ready_rx.recv().await {
                    Some(Ok(())) => ready_count += 1,
                    Some(Err(err)) => return Err(err),
                    None => {
                        return Err(CoworkersError::transport(
                            "worker set emptied before every worker reported ready",
                        ))
                    }
                }
            }
            Ok(())
        })
        .await;

        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => {
                let _ = self.stop().await;
                Err(err)
            }
            Err(_) => {
                let _ = self.stop().await;
                Err(CoworkersError::transport(
                    "timed out waiting for every worker to report readiness",
                ))
            }
        }
    }

    /// Stops every live worker: SIGINT, a grace period, SIGTERM, another
    /// grace period, then SIGKILL, resolving as soon as the worker set is
    /// empty.
    ///
    /// # Errors
    ///
    /// This manager never fails to stop -- an unkillable process is the
    /// operating system's problem, not this call's -- so it always returns
    /// `Ok`. The signature returns a `Result` to match the dual
    /// `connect`/`close` completion style used everywhere else.
    pub async fn stop(&self) -> CoworkersResult<()> {
        *self.state.lock().await = State::Stopping;

        self.signal_all(Signal::SIGINT).await;
        if !self.wait_for_empty(SHUTDOWN_GRACE).await {
            self.signal_all(Signal::SIGTERM).await;
            if !self.wait_for_empty(SHUTDOWN_GRACE).await {
                self.signal_all(Signal::SIGKILL).await;
                self.wait_for_empty(SHUTDOWN_GRACE).await;
            }
        }

        *self.state.lock().await = State::Idle;
        Ok(())
    }

    /// Returns the queues currently backed by a live worker process.
    #[must_use]
    pub async fn live_queues(&self) -> Vec<QueueName> {
        self.workers
            .lock()
            .await
            .values()
            .map(|w| w.queue.clone())
            .collect()
    }

    async fn signal_all(&self, signal: Signal) {
        let pids: Vec<i32> = self
            .workers
            .lock()
            .await
            .values()
            .filter_map(|w| w.pid)
            .collect();
        for pid in pids {
            if let Err(err) = kill(Pid::from_raw(pid), signal) {
                tracing::warn!(pid, ?signal, error = %err, "failed to signal worker process");
            }
        }
    }

    async fn wait_for_empty(&self, budget: Duration) -> bool {
        timeout(budget, async {
            loop {
                if self.workers.lock().await.is_empty() {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await
        .is_ok()
    }

    fn spawn_supervisor(
        &self,
        worker_id: u64,
        queue: QueueName,
        ready_tx: Option<mpsc::UnboundedSender<CoworkersResult<()>>>,
    ) {
        let state = Arc::clone(&self.state);
        let workers = Arc::clone(&self.workers);

        tokio::spawn(async move {
            let mut ready_tx = ready_tx;

            loop {
                let mut child = match spawn_child(&queue) {
                    Ok(child) => child,
                    Err(err) => {
                        if let Some(tx) = ready_tx.take() {
                            let _ = tx.send(Err(err));
                        }
                        break;
                    }
                };

                if let Some(record) = workers.lock().await.get_mut(&worker_id) {
                    record.pid = child.id().map(|pid| pid as i32);
                }

                let mut reported_ready = false;
                let stdout = child.stdout.take();
                let status = {
                    let line_reader = async {
                        if let Some(stdout) = stdout {
                            let mut lines = BufReader::new(stdout).lines();
                            while let Ok(Some(line)) = lines.next_line().await {
                                if !reported_ready && line.trim() == READY_MARKER {
                                    reported_ready = true;
                                    if let Some(tx) = ready_tx.take() {
                                        let _ = tx.send(Ok(()));
                                    }
                                }
                            }
                        }
                    };
                    let (status, ()) = tokio::join!(child.wait(), line_reader);
                    status
                };

                if !reported_ready {
                    if let Some(tx) = ready_tx.take() {
                        let _ = tx.send(Err(CoworkersError::transport(format!(
                            "worker for queue '{queue}' exited before reporting ready"
                        ))));
                    }
                }

                let restart = match status {
                    Ok(exit_status) => {
                        let nonzero = !exit_status.success();
                        let current_state = *state.lock().await;
                        if !nonzero {
                            tracing::info!(%queue, "worker exited gracefully");
                        } else {
                            tracing::warn!(%queue, code = exit_status.code(), "worker exited non-zero");
                        }
                        matches!(current_state, State::Running) && nonzero
                    }
                    Err(err) => {
                        tracing::error!(%queue, error = %err, "failed to wait on worker process");
                        false
                    }
                };

                if restart {
                    tracing::info!(%queue, "restarting worker");
                    continue;
                }

                workers.lock().await.remove(&worker_id);
                break;
            }
        });
    }
}

fn spawn_child(queue: &QueueName) -> CoworkersResult<tokio::process::Child> {
    let exe = std::env::current_exe().map_err(|err| {
        CoworkersError::transport_with_source(
            "failed to resolve the current executable to respawn as a worker",
            err,
        )
    })?;

    Command::new(exe)
        .env(ENV_WORKER_QUEUE, queue.as_str())
        .env(ENV_WORKER_NUM, "0")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|err| {
            CoworkersError::transport_with_source(
                format!("failed to spawn worker for queue '{queue}'"),
                err,
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_manager_has_no_live_workers_until_started() {
        let manager = ClusterManager::new(vec![QueueName::new("orders.created")]);
        assert!(manager.live_queues().await.is_empty());
    }

    #[tokio::test]
    async fn stop_before_start_is_a_no_op() {
        let manager = ClusterManager::new(vec![QueueName::new("orders.created")]);
        manager.stop().await.unwrap();
        assert!(manager.live_queues().await.is_empty());
    }

    // `start`/`stop` against real respawned processes belongs in an
    // integration test that runs a dedicated worker-mode test binary; it is
    // intentionally not exercised here since it would re-exec the test
    // harness binary itself.
}
