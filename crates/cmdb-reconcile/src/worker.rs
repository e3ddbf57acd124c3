//! Collector Worker
//!
//! Pulls raw collector messages from a source and reconciles up to
//! `concurrency` of them at a time. Each message is handled to completion;
//! there is no ordering between messages and no retry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use cmdb_core::TenantId;

use crate::context::RequestContext;
use crate::reconciler::{ReconcileOutcome, Reconciler};

/// Source of raw inbound messages.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Next message, or `None` once the source is exhausted.
    async fn next_message(&self) -> Option<String>;
}

/// Message source backed by a bounded channel.
pub struct ChannelSource {
    rx: Mutex<mpsc::Receiver<String>>,
}

/// Create a channel whose receiving half is a [`MessageSource`].
#[must_use]
pub fn channel(capacity: usize) -> (mpsc::Sender<String>, ChannelSource) {
    let (tx, rx) = mpsc::channel(capacity);
    (tx, ChannelSource { rx: Mutex::new(rx) })
}

#[async_trait]
impl MessageSource for ChannelSource {
    async fn next_message(&self) -> Option<String> {
        self.rx.lock().await.recv().await
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of messages reconciled concurrently.
    pub concurrency: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { concurrency: 4 }
    }
}

/// Running counters of a worker.
#[derive(Debug, Default)]
pub struct WorkerStats {
    processed: AtomicU64,
    created: AtomicU64,
    updated: AtomicU64,
    unchanged: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of [`WorkerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStatsSnapshot {
    pub processed: u64,
    pub created: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub dropped: u64,
    pub failed: u64,
}

impl WorkerStats {
    #[must_use]
    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            created: self.created.load(Ordering::Relaxed),
            updated: self.updated.load(Ordering::Relaxed),
            unchanged: self.unchanged.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Reconciles messages from a source until it is exhausted or shut down.
pub struct CollectorWorker {
    source: Arc<dyn MessageSource>,
    reconciler: Arc<Reconciler>,
    config: WorkerConfig,
    default_tenant: TenantId,
    stats: Arc<WorkerStats>,
    shutdown: CancellationToken,
}

impl CollectorWorker {
    #[must_use]
    pub fn new(
        source: Arc<dyn MessageSource>,
        reconciler: Arc<Reconciler>,
        config: WorkerConfig,
        default_tenant: TenantId,
    ) -> Self {
        Self {
            source,
            reconciler,
            config,
            default_tenant,
            stats: Arc::new(WorkerStats::default()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that stops intake when cancelled.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Request graceful shutdown.
    pub fn shutdown(&self) {
        info!("Shutdown requested");
        self.shutdown.cancel();
    }

    #[must_use]
    pub fn stats(&self) -> WorkerStatsSnapshot {
        self.stats.snapshot()
    }

    /// Run until the source is exhausted or shutdown is requested, then
    /// wait for in-flight messages.
    #[instrument(skip(self), fields(concurrency = self.config.concurrency))]
    pub async fn run(&self) -> WorkerStatsSnapshot {
        let concurrency = self.config.concurrency.max(1);
        info!(concurrency, "Starting collector worker");

        let semaphore = Arc::new(Semaphore::new(concurrency));

        loop {
            let permit = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => {
                    info!("Worker shutdown requested, stopping intake");
                    break;
                }
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let message = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => {
                    info!("Worker shutdown requested, stopping intake");
                    break;
                }
                message = self.source.next_message() => message,
            };

            let Some(raw) = message else {
                info!("Message source exhausted");
                break;
            };

            let reconciler = Arc::clone(&self.reconciler);
            let stats = Arc::clone(&self.stats);
            let ctx = RequestContext::collector(self.default_tenant.clone());

            tokio::spawn(async move {
                let _permit = permit;
                process_message(&reconciler, &stats, &raw, &ctx).await;
            });
        }

        info!("Waiting for in-flight messages to complete...");
        let _ = semaphore.acquire_many(concurrency as u32).await;

        let stats = self.stats.snapshot();
        info!(
            processed = stats.processed,
            created = stats.created,
            updated = stats.updated,
            unchanged = stats.unchanged,
            dropped = stats.dropped,
            failed = stats.failed,
            "Worker stopped"
        );
        stats
    }
}

async fn process_message(
    reconciler: &Reconciler,
    stats: &WorkerStats,
    raw: &str,
    ctx: &RequestContext,
) {
    bump(&stats.processed);
    match reconciler.reconcile_message(raw, ctx).await {
        Ok(report) => {
            debug!(
                rid = %ctx.request_id,
                instance_id = report.instance_id.get(),
                outcome = ?report.outcome,
                "Message reconciled"
            );
            match report.outcome {
                ReconcileOutcome::Created => bump(&stats.created),
                ReconcileOutcome::Updated => bump(&stats.updated),
                ReconcileOutcome::Unchanged => bump(&stats.unchanged),
            }
        }
        Err(e) if e.is_dropped() => bump(&stats.dropped),
        Err(_) => bump(&stats.failed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_source_drains_then_ends() {
        let (tx, source) = channel(4);
        tx.send("a".to_string()).await.unwrap();
        tx.send("b".to_string()).await.unwrap();
        drop(tx);

        assert_eq!(source.next_message().await.as_deref(), Some("a"));
        assert_eq!(source.next_message().await.as_deref(), Some("b"));
        assert_eq!(source.next_message().await, None);
    }

    #[test]
    fn test_stats_snapshot() {
        let stats = WorkerStats::default();
        bump(&stats.processed);
        bump(&stats.dropped);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.processed, 1);
        assert_eq!(snapshot.dropped, 1);
        assert_eq!(snapshot.failed, 0);
    }
}
