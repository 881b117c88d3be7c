use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dtsfix_db::{JsonTaskStore, TaskStore};
use dtsfix_events::BroadcastHub;
use dtsfix_worker::{ConversionService, JobExecutor, QueueCoordinator};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dtsfix_api::config::ServerConfig;
use dtsfix_api::router::build_app_router;
use dtsfix_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "dtsfix_api=debug,dtsfix_worker=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = %config.port,
        media_root = %config.media_root.display(),
        database_path = %config.database_path.display(),
        "Loaded server configuration",
    );

    // --- Task store ---
    let store = Arc::new(
        JsonTaskStore::open(&config.database_path)
            .await
            .expect("Failed to open task store"),
    );
    tracing::info!(path = %store.path().display(), "Task store opened");

    // --- Broadcast hub ---
    let hub = Arc::new(BroadcastHub::new());

    // --- Queue coordinator ---
    let queue_cancel = CancellationToken::new();
    let (coordinator, queue) = QueueCoordinator::new(
        Arc::clone(&store) as Arc<dyn TaskStore>,
        Arc::clone(&hub),
        config.queue_config(),
    );
    let queue_handle = tokio::spawn(coordinator.run(queue_cancel.clone()));

    // --- Job executor (recovers interrupted tasks before its first claim) ---
    let executor_cancel = CancellationToken::new();
    let executor = JobExecutor::new(queue.clone(), Arc::clone(&hub), config.executor_config());
    let executor_handle = {
        let executor = executor.clone();
        let cancel = executor_cancel.clone();
        tokio::spawn(async move { executor.run(cancel).await })
    };
    tracing::info!("Queue coordinator and job executor started");

    // --- App state ---
    let service = Arc::new(ConversionService::new(
        queue,
        executor,
        Arc::clone(&hub),
        config.tools(),
        config.media_root.clone(),
    ));
    let state = AppState {
        config: Arc::new(config.clone()),
        hub: Arc::clone(&hub),
        service,
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // The executor cancels the active job and persists its final state
    // through the queue, so it must stop before the coordinator.
    executor_cancel.cancel();
    if tokio::time::timeout(Duration::from_secs(15), executor_handle)
        .await
        .is_err()
    {
        tracing::warn!("Job executor did not stop in time");
    }
    tracing::info!("Job executor stopped");

    queue_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), queue_handle).await;
    tracing::info!("Queue coordinator stopped");

    if let Err(e) = store.flush().await {
        tracing::error!(error = %e, "Failed to flush task store");
    }

    let observers = hub.observer_count().await;
    tracing::info!(observers, "Closing remaining WebSocket connections");
    hub.shutdown_all().await;

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
