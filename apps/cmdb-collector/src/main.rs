//! CMDB collector daemon.
//!
//! Reads newline-delimited collector messages from stdin and reconciles them
//! into the CMDB until stdin closes or a shutdown signal arrives.

mod config;
mod logging;

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use cmdb_db::{
    run_migrations, DbPool, PgAuditLogStore, PgCiStore, PgModelMetadata, PgSequenceGenerator,
};
use cmdb_reconcile::worker::channel;
use cmdb_reconcile::{AuditRecorder, CollectorWorker, Reconciler, ReconcilerDeps, WorkerConfig};

use crate::config::CollectorConfig;

#[tokio::main]
async fn main() {
    let config = match CollectorConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    logging::init_logging(&config.log_filter);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        concurrency = config.worker_concurrency,
        cache_enabled = config.reconciler.cache_enabled,
        "Starting CMDB collector"
    );

    let pool = match DbPool::connect_with(&config.database_url, config.db_max_connections).await {
        Ok(pool) => {
            info!("Database connection established");
            pool
        }
        Err(e) => {
            error!(error = %e, "Failed to connect to database");
            std::process::exit(1);
        }
    };

    if config.run_migrations {
        if let Err(e) = run_migrations(&pool).await {
            error!(error = %e, "Failed to run migrations");
            std::process::exit(1);
        }
    }

    let reconciler = Arc::new(Reconciler::new(
        ReconcilerDeps {
            store: Arc::new(PgCiStore::new(pool.clone())),
            metadata: Arc::new(PgModelMetadata::new(pool.clone())),
            cache: config.reconciler.cache_gateway(),
            audit: AuditRecorder::new(
                Arc::new(PgSequenceGenerator::new(pool.clone())),
                Arc::new(PgAuditLogStore::new(pool)),
            ),
        },
        &config.reconciler,
    ));

    let (tx, source) = channel(config.queue_capacity);
    let worker = CollectorWorker::new(
        Arc::new(source),
        reconciler,
        WorkerConfig {
            concurrency: config.worker_concurrency,
        },
        config.reconciler.default_tenant.clone(),
    );

    let shutdown = worker.shutdown_token();
    tokio::spawn(read_stdin(tx, shutdown.clone()));
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.cancel();
    });

    let stats = worker.run().await;
    info!(
        processed = stats.processed,
        failed = stats.failed,
        "Collector stopped"
    );
}

/// Forward non-empty stdin lines into the worker queue.
async fn read_stdin(tx: mpsc::Sender<String>, shutdown: CancellationToken) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            () = shutdown.cancelled() => break,
            line = lines.next_line() => line,
        };
        match line {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                if tx.send(line).await.is_err() {
                    break;
                }
            }
            Ok(None) => {
                info!("Input closed");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read input");
                break;
            }
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown"),
        () = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}
