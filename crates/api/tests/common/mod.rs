#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use dtsfix_core::ffmpeg::FfmpegTools;
use dtsfix_core::task::Task;
use dtsfix_db::{JsonTaskStore, TaskStore};
use dtsfix_events::BroadcastHub;
use dtsfix_worker::{ConversionService, ExecutorConfig, JobExecutor, QueueConfig, QueueCoordinator};
use http_body_util::BodyExt;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use dtsfix_api::config::ServerConfig;
use dtsfix_api::router::build_app_router;
use dtsfix_api::state::AppState;

/// Build a test `ServerConfig` rooted in `dir`.
///
/// The ffmpeg binaries point at paths that do not exist, so nothing here
/// ever spawns a real conversion.
pub fn test_config(dir: &std::path::Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        database_path: dir.join("data/tasks.json"),
        media_root: dir.join("media"),
        static_dir: dir.join("static"),
        ffmpeg_path: dir.join("bin/ffmpeg"),
        ffprobe_path: dir.join("bin/ffprobe"),
        poll_interval_secs: 3600,
        snapshot_interval_secs: 3600,
        progress_throttle_ms: 100,
        job_timeout_secs: None,
        probe_timeout_secs: 5,
    }
}

/// A running application over a temporary directory.
///
/// The queue coordinator runs in the background; the executor is
/// constructed but its claim loop is not started.
pub struct TestApp {
    pub dir: tempfile::TempDir,
    pub router: Router,
    pub state: AppState,
    pub hub: Arc<BroadcastHub>,
    cancel: CancellationToken,
}

impl TestApp {
    pub fn media_root(&self) -> PathBuf {
        self.dir.path().join("media")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Build the full application router over a fresh store seeded with `tasks`.
pub async fn build_test_app(tasks: &[Task]) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    std::fs::create_dir_all(&config.media_root).unwrap();

    let store = Arc::new(JsonTaskStore::open(&config.database_path).await.unwrap());
    for task in tasks {
        store.create(task).await.unwrap();
    }

    let hub = Arc::new(BroadcastHub::new());
    let (coordinator, queue) = QueueCoordinator::new(
        store as Arc<dyn TaskStore>,
        Arc::clone(&hub),
        QueueConfig::default(),
    );
    let cancel = CancellationToken::new();
    tokio::spawn(coordinator.run(cancel.clone()));

    let tools = FfmpegTools::new(&config.ffmpeg_path, &config.ffprobe_path);
    let executor = JobExecutor::new(
        queue.clone(),
        Arc::clone(&hub),
        ExecutorConfig {
            tools: tools.clone(),
            ..ExecutorConfig::default()
        },
    );
    let service = Arc::new(ConversionService::new(
        queue,
        executor,
        Arc::clone(&hub),
        tools,
        config.media_root.clone(),
    ));

    let state = AppState {
        config: Arc::new(config.clone()),
        hub: Arc::clone(&hub),
        service,
    };

    TestApp {
        router: build_app_router(state.clone(), &config),
        state,
        dir,
        hub,
        cancel,
    }
}

pub async fn get(app: &TestApp, uri: &str) -> Response {
    app.router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn post_json(app: &TestApp, uri: &str, body: serde_json::Value) -> Response {
    app.router
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
