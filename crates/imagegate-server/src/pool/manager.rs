//! The worker pool: owns all worker tasks, dispatches batches round-robin,
//! and drains the batch manager's pending slots on shutdown.
//!
//! Phased shutdown is ported from
//! `ferroid-tonic-server::server::pool::manager::WorkerPool::shutdown`:
//! stop accepting new work, flush whatever is still coalescing, wait (with
//! a timeout) for in-flight batches to drain, then send every worker a
//! `Shutdown` message and give them a grace period before the pool returns
//! regardless.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use imagegate_core::{BatchManager, BatchedRequest, Error, GenerationRequest, Result};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::dispatch::MailboxRegistry;
use crate::pipeline::{ImagePipeline, WorkerConfig};

use super::worker::{WorkRequest, worker_loop};

const WORKER_CHANNEL_CAPACITY: usize = 32;
const WORKER_SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Default per-worker startup delay (`worker_id * STARTUP_STAGGER`), kept
/// short enough that the ready banner still appears promptly in the common
/// single-GPU case. Spec.md §4.1 calls this configurable for tests.
pub const DEFAULT_STARTUP_STAGGER: Duration = Duration::from_secs(3);

struct WorkerHandle {
    tx: mpsc::Sender<WorkRequest>,
    ready: Arc<AtomicBool>,
    task: tokio::task::JoinHandle<()>,
}

pub struct WorkerPool {
    workers: Vec<WorkerHandle>,
    next_worker_index: AtomicUsize,
    batch_manager: Mutex<BatchManager>,
    accepting: AtomicBool,
    shutdown_token: CancellationToken,
    shutdown_timeout: Duration,
    /// Flips `false` → `true` exactly once, when every worker has reported
    /// ready. Polled and flipped by the readiness observer task spawned in
    /// `main.rs`, not by the workers themselves.
    is_ready: AtomicBool,
}

impl WorkerPool {
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        num_workers: usize,
        gpu_count: usize,
        startup_stagger: Duration,
        pipeline: Arc<dyn ImagePipeline>,
        mailbox: MailboxRegistry,
        batch_manager: BatchManager,
        shutdown_timeout: Duration,
    ) -> Arc<Self> {
        let shutdown_token = CancellationToken::new();
        let gpu_count = gpu_count.max(1);
        let mut workers = Vec::with_capacity(num_workers);
        for worker_id in 0..num_workers {
            let (tx, rx) = mpsc::channel(WORKER_CHANNEL_CAPACITY);
            let ready = Arc::new(AtomicBool::new(false));
            let config = WorkerConfig {
                worker_id,
                gpu_index: worker_id % gpu_count,
            };
            let task = tokio::spawn(worker_loop(
                config,
                startup_stagger * worker_id as u32,
                rx,
                pipeline.clone(),
                mailbox.clone(),
                ready.clone(),
            ));
            workers.push(WorkerHandle { tx, ready, task });
        }

        Arc::new(Self {
            workers,
            next_worker_index: AtomicUsize::new(0),
            batch_manager: Mutex::new(batch_manager),
            accepting: AtomicBool::new(true),
            shutdown_token,
            shutdown_timeout,
            is_ready: AtomicBool::new(false),
        })
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    pub fn ready_worker_count(&self) -> usize {
        self.workers
            .iter()
            .filter(|w| w.ready.load(Ordering::SeqCst))
            .count()
    }

    /// Whether every worker has reported ready at least once. Set by
    /// [`Self::mark_ready_if_all_workers_are_up`], never cleared.
    pub fn is_ready(&self) -> bool {
        self.is_ready.load(Ordering::SeqCst)
    }

    /// Called from the readiness observer task. If every worker is ready and
    /// the pool hasn't already flipped, marks it ready and returns `true`
    /// (so the caller logs the banner exactly once).
    pub fn mark_ready_if_all_workers_are_up(&self) -> bool {
        if self.is_ready.load(Ordering::SeqCst) {
            return false;
        }
        if self.ready_worker_count() < self.workers.len() {
            return false;
        }
        !self.is_ready.swap(true, Ordering::SeqCst)
    }

    /// Admits a single request into the batch manager, dispatching
    /// immediately if it completes a batch.
    pub async fn admit(&self, request: GenerationRequest) -> Result<()> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(Error::service_shutdown());
        }
        let flushed = {
            let mut mgr = self.batch_manager.lock().await;
            mgr.add_request(request)?
        };
        if let Some(batch) = flushed {
            self.dispatch(batch).await;
        }
        Ok(())
    }

    /// Called periodically (roughly every 100ms, see `main.rs`'s sweep task)
    /// to flush batches that have aged past `batch_timeout` without filling
    /// up.
    pub async fn sweep_timeouts(&self) {
        let expired = {
            let mut mgr = self.batch_manager.lock().await;
            mgr.check_timeouts()
        };
        for batch in expired {
            self.dispatch(batch).await;
        }
    }

    async fn dispatch(&self, batch: BatchedRequest) {
        let index = self.next_worker_index.fetch_add(1, Ordering::SeqCst) % self.workers.len();
        if self.workers[index]
            .tx
            .send(WorkRequest::Batch(batch))
            .await
            .is_err()
        {
            tracing::error!(worker_id = index, "worker channel closed, batch dropped");
        }
    }

    /// Four-phase shutdown: stop accepting admits, flush every pending
    /// batch slot so nothing silently vanishes, wait briefly for in-flight
    /// work to drain, then tell every worker to stop and give them a grace
    /// period before returning unconditionally.
    pub async fn shutdown(&self) {
        self.accepting.store(false, Ordering::SeqCst);
        self.shutdown_token.cancel();

        let flushed = self.batch_manager.lock().await.flush_pending_batches();
        for batch in flushed {
            self.dispatch(batch).await;
        }

        let drain_deadline = tokio::time::Instant::now() + self.shutdown_timeout;
        while tokio::time::Instant::now() < drain_deadline {
            if self.ready_worker_count() == self.workers.len() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        for worker in &self.workers {
            let _ = worker.tx.send(WorkRequest::Shutdown).await;
        }

        for worker in &self.workers {
            if tokio::time::timeout(WORKER_SHUTDOWN_GRACE, wait_for(&worker.task))
                .await
                .is_err()
            {
                tracing::warn!("worker did not exit within grace period, aborting");
                worker.task.abort();
            }
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }
}

async fn wait_for(task: &tokio::task::JoinHandle<()>) {
    while !task.is_finished() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
