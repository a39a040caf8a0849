//! Delivery engine
//!
//! A fixed pool of workers drains a shared queue of forwarding tasks. Each
//! task is sent with a fixed pause between attempts until the transport
//! reports success, so an unreachable destination ties up exactly one worker
//! while the rest keep delivering.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::node::{Body, MemberId, Transport};
use crate::settings::BroadcasterSettings;
use crate::{concurrency_error, node_error};

/// One message for one destination
#[derive(Clone, Debug)]
pub struct BroadcastTask {
    pub dest: MemberId,
    pub body: Body,
}

/// Delivery counters
#[derive(Debug, Default)]
pub struct BroadcasterStats {
    pub submitted: AtomicU64,
    pub delivered: AtomicU64,
    pub retries: AtomicU64,
    pub dropped: AtomicU64,
    pub cancelled: AtomicU64,
}

pub struct Broadcaster {
    queue_tx: mpsc::Sender<BroadcastTask>,
    cancel: CancellationToken,
    workers: std::sync::Mutex<Vec<JoinHandle<()>>>,
    stats: Arc<BroadcasterStats>,
    settings: BroadcasterSettings,
}

impl std::fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broadcaster")
            .field("workers", &self.settings.workers)
            .field("queue_capacity", &self.settings.queue_capacity)
            .field("retry_delay", &self.settings.retry_delay)
            .field("shut_down", &self.cancel.is_cancelled())
            .finish()
    }
}

impl Broadcaster {
    /// Start the worker pool. Must be called within a tokio runtime.
    pub fn new(transport: Arc<dyn Transport>, settings: BroadcasterSettings) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(settings.queue_capacity.max(1));
        let queue_rx = Arc::new(Mutex::new(queue_rx));
        let cancel = CancellationToken::new();
        let stats = Arc::new(BroadcasterStats::default());

        let workers = (0..settings.workers.max(1))
            .map(|id| {
                let worker = Worker {
                    id,
                    transport: Arc::clone(&transport),
                    queue_rx: Arc::clone(&queue_rx),
                    cancel: cancel.clone(),
                    stats: Arc::clone(&stats),
                    retry_delay: settings.retry_delay,
                    max_attempts: settings.max_attempts,
                };
                tokio::spawn(worker.run())
            })
            .collect();

        info!(
            "Started {} delivery workers (queue capacity {}, retry delay {}ms)",
            settings.workers.max(1),
            settings.queue_capacity.max(1),
            settings.retry_delay.as_millis()
        );

        Self {
            queue_tx,
            cancel,
            workers: std::sync::Mutex::new(workers),
            stats,
            settings,
        }
    }

    /// Queue a task, waiting for room if the queue is full
    pub async fn submit(&self, task: BroadcastTask) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(node_error!("broadcaster has been shut down"));
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(node_error!("broadcaster has been shut down")),
            sent = self.queue_tx.send(task) => {
                sent.map_err(|_| node_error!("delivery queue is closed"))?;
                self.stats.submitted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
        }
    }

    /// Stop all workers. Queued tasks are abandoned; a send already under
    /// way finishes its attempt but is not retried.
    pub fn shutdown(&self) {
        if !self.cancel.is_cancelled() {
            info!("Shutting down delivery workers");
            self.cancel.cancel();
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait for every worker to exit after [`Broadcaster::shutdown`]
    pub async fn join(&self) -> Result<()> {
        let workers = std::mem::take(
            &mut *self
                .workers
                .lock()
                .map_err(|e| concurrency_error!("worker list lock poisoned: {}", e))?,
        );
        for worker in workers {
            if let Err(e) = worker.await {
                error!("Delivery worker panicked: {}", e);
            }
        }
        Ok(())
    }

    pub fn stats(&self) -> &BroadcasterStats {
        &self.stats
    }
}

impl Drop for Broadcaster {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Worker {
    id: usize,
    transport: Arc<dyn Transport>,
    queue_rx: Arc<Mutex<mpsc::Receiver<BroadcastTask>>>,
    cancel: CancellationToken,
    stats: Arc<BroadcasterStats>,
    retry_delay: Duration,
    max_attempts: Option<u32>,
}

impl Worker {
    async fn run(self) {
        loop {
            let task = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                task = Self::next_task(&self.queue_rx) => match task {
                    Some(task) => task,
                    None => break,
                },
            };
            self.deliver(task).await;
        }
        debug!("Delivery worker {} exiting", self.id);
    }

    async fn next_task(queue_rx: &Mutex<mpsc::Receiver<BroadcastTask>>) -> Option<BroadcastTask> {
        queue_rx.lock().await.recv().await
    }

    async fn deliver(&self, task: BroadcastTask) {
        let mut attempts: u32 = 0;
        loop {
            attempts = attempts.saturating_add(1);
            match self.transport.send(&task.dest, task.body.clone()).await {
                Ok(()) => {
                    self.stats.delivered.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        "Worker {} delivered {} to {} after {} attempt(s)",
                        self.id, task.body.kind, task.dest, attempts
                    );
                    return;
                }
                Err(e) => {
                    if matches!(self.max_attempts, Some(max) if attempts >= max) {
                        self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                        error!(
                            "Worker {} giving up on {} to {} after {} attempts: {}",
                            self.id, task.body.kind, task.dest, attempts, e
                        );
                        return;
                    }
                    if e.is_retryable() {
                        debug!(
                            "Worker {} send to {} failed (attempt {}): {}",
                            self.id, task.dest, attempts, e
                        );
                    } else {
                        warn!(
                            "Worker {} send to {} rejected (attempt {}), retrying anyway: {}",
                            self.id, task.dest, attempts, e
                        );
                    }
                }
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    self.stats.cancelled.fetch_add(1, Ordering::Relaxed);
                    debug!("Worker {} abandoning delivery to {}", self.id, task.dest);
                    return;
                }
                _ = tokio::time::sleep(self.retry_delay) => {
                    self.stats.retries.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }
}
