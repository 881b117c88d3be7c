use std::path::PathBuf;
use std::time::Duration;

use dtsfix_core::ffmpeg::FfmpegTools;
use dtsfix_worker::{ExecutorConfig, QueueConfig};

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for a container deployment with the
/// media library mounted at `/media`.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3001`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// JSON task store location.
    pub database_path: PathBuf,
    /// Root directory searched for media files.
    pub media_root: PathBuf,
    /// Directory served for any path no route matches.
    pub static_dir: PathBuf,
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    /// Executor claim loop interval in seconds (default: `5`).
    pub poll_interval_secs: u64,
    /// Queue snapshot broadcast interval in seconds (default: `5`).
    pub snapshot_interval_secs: u64,
    /// Minimum spacing of progress events in milliseconds (default: `2000`).
    pub progress_throttle_ms: u64,
    /// Upper bound on one conversion; unset means unlimited.
    pub job_timeout_secs: Option<u64>,
    /// Upper bound on one ffprobe run in seconds (default: `30`).
    pub probe_timeout_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default                 |
    /// |--------------------------|-------------------------|
    /// | `HOST`                   | `0.0.0.0`               |
    /// | `PORT`                   | `3001`                  |
    /// | `CORS_ORIGINS`           | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`   | `30`                    |
    /// | `DATABASE_PATH`          | `./data/tasks.json`     |
    /// | `MEDIA_ROOT`             | `/media`                |
    /// | `STATIC_DIR`             | `./static`              |
    /// | `FFMPEG_PATH`            | `ffmpeg`                |
    /// | `FFPROBE_PATH`           | `ffprobe`               |
    /// | `POLL_INTERVAL_SECS`     | `5`                     |
    /// | `SNAPSHOT_INTERVAL_SECS` | `5`                     |
    /// | `PROGRESS_THROTTLE_MS`   | `2000`                  |
    /// | `JOB_TIMEOUT_SECS`       | unset                   |
    /// | `PROBE_TIMEOUT_SECS`     | `30`                    |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3001".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let poll_interval_secs: u64 = std::env::var("POLL_INTERVAL_SECS")
            .unwrap_or_else(|_| "5".into())
            .parse()
            .expect("POLL_INTERVAL_SECS must be a valid u64");

        let snapshot_interval_secs: u64 = std::env::var("SNAPSHOT_INTERVAL_SECS")
            .unwrap_or_else(|_| "5".into())
            .parse()
            .expect("SNAPSHOT_INTERVAL_SECS must be a valid u64");

        let progress_throttle_ms: u64 = std::env::var("PROGRESS_THROTTLE_MS")
            .unwrap_or_else(|_| "2000".into())
            .parse()
            .expect("PROGRESS_THROTTLE_MS must be a valid u64");

        let job_timeout_secs: Option<u64> = std::env::var("JOB_TIMEOUT_SECS")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(|s| {
                s.trim()
                    .parse()
                    .expect("JOB_TIMEOUT_SECS must be a valid u64")
            });

        let probe_timeout_secs: u64 = std::env::var("PROBE_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("PROBE_TIMEOUT_SECS must be a valid u64");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            database_path: env_path("DATABASE_PATH", "./data/tasks.json"),
            media_root: env_path("MEDIA_ROOT", "/media"),
            static_dir: env_path("STATIC_DIR", "./static"),
            ffmpeg_path: env_path("FFMPEG_PATH", "ffmpeg"),
            ffprobe_path: env_path("FFPROBE_PATH", "ffprobe"),
            poll_interval_secs,
            snapshot_interval_secs,
            progress_throttle_ms,
            job_timeout_secs,
            probe_timeout_secs,
        }
    }

    pub fn tools(&self) -> FfmpegTools {
        FfmpegTools::new(&self.ffmpeg_path, &self.ffprobe_path)
            .with_probe_timeout(Duration::from_secs(self.probe_timeout_secs.max(1)))
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            poll_interval: Duration::from_secs(self.poll_interval_secs.max(1)),
            progress_throttle: Duration::from_millis(self.progress_throttle_ms),
            job_timeout: self.job_timeout_secs.map(Duration::from_secs),
            tools: self.tools(),
            ..ExecutorConfig::default()
        }
    }

    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            snapshot_interval: Duration::from_secs(self.snapshot_interval_secs.max(1)),
            ..QueueConfig::default()
        }
    }
}

fn env_path(key: &str, default: &str) -> PathBuf {
    std::env::var(key)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
        .into()
}
