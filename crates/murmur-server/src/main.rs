mod config;
mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use murmur_db::Database;
use murmur_jobs::{JobQueue, RemovalWorker, WorkerPool};
use murmur_removal::{BatchedRemoveStatusService, LoggingFederation, RemoveStatusService};
use murmur_streaming::{Hub, Publisher, RedisPublisher};

use crate::config::Config;
use crate::routes::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "murmur=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    let db = Arc::new(Database::open(&config.db_path)?);
    let queue = JobQueue::open(&config.queue_db_path)?;
    let hub = Hub::new();

    let publisher: Arc<dyn Publisher> = match &config.redis_url {
        Some(url) => {
            let publisher = RedisPublisher::connect(url, config.redis_prefix.clone()).await?;

            let relay_url = url.clone();
            let relay_prefix = config.redis_prefix.clone();
            let relay_hub = hub.clone();
            tokio::spawn(async move {
                if let Err(e) = murmur_streaming::relay_to_hub(&relay_url, &relay_prefix, relay_hub).await {
                    error!("Redis relay stopped: {:#}", e);
                }
            });

            Arc::new(publisher)
        }
        None => {
            info!("MURMUR_REDIS_URL not set, publishing in-process only");
            Arc::new(hub.clone())
        }
    };

    let batch = BatchedRemoveStatusService::new(db, publisher, Arc::new(LoggingFederation));
    let worker = RemovalWorker::new(RemoveStatusService::new(batch));
    let pool = WorkerPool::new(queue.clone(), worker, config.queue);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let workers = pool.spawn(config.workers, shutdown_rx);

    let app = routes::router(AppState { queue, hub }).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Murmur listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Let in-flight jobs finish; anything unfinished is redelivered after its lease
    let _ = shutdown_tx.send(true);
    for handle in workers {
        if let Err(e) = handle.await {
            error!("Removal worker panicked: {}", e);
        }
    }

    info!("Murmur stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
