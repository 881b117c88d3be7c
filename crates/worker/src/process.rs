//! Supervision of a single conversion process.
//!
//! [`supervise`] spawns the command with both output streams piped, reads
//! them in two spawned tasks and waits for exit, cancellation or the
//! optional deadline. Parsed output is forwarded as [`JobSignal`]s; the
//! readers are joined (with a grace timeout) before the outcome is
//! returned, so every signal precedes the terminal state.

use std::process::Stdio;
use std::time::Duration;

use dtsfix_core::progress::ProgressState;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Maximum diagnostic text kept for the failure message (64 KiB).
const MAX_DIAGNOSTIC_BYTES: usize = 64 * 1024;

/// Number of trailing diagnostic lines quoted in a failure message.
const FAILURE_TAIL_LINES: usize = 5;

/// How a supervised process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Cancelled,
    TimedOut(Duration),
    Failed(String),
}

/// Output forwarded while the process runs.
#[derive(Debug, Clone, PartialEq)]
pub enum JobSignal {
    /// A throttled progress sample (or the final flush).
    Progress {
        current_time: Option<f64>,
        summary: String,
    },
    /// A batch of diagnostic lines.
    Diagnostics(String),
}

/// Rate limiter: at most one `ready()` per interval.
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    last: Option<Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// `true` if the interval has elapsed since the last `true`.
    pub fn ready(&mut self) -> bool {
        let now = Instant::now();
        match self.last {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    /// Minimum spacing of forwarded progress and diagnostic signals.
    pub throttle: Duration,
    /// Kill the process after this long.
    pub timeout: Option<Duration>,
    /// How long the stream readers may run on after exit.
    pub drain_grace: Duration,
}

/// Run `command` to completion, forwarding parsed output on `signals`.
///
/// `kill_on_drop` is set so the child never outlives its supervisor.
pub async fn supervise(
    mut command: Command,
    cancel: &CancellationToken,
    settings: &SupervisorSettings,
    signals: mpsc::Sender<JobSignal>,
) -> JobOutcome {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => return JobOutcome::Failed(format!("failed to start ffmpeg: {e}")),
    };

    let stdout_task = child.stdout.take().map(|out| {
        tokio::spawn(drain_progress(out, settings.throttle, signals.clone()))
    });
    let stderr_task = child.stderr.take().map(|err| {
        tokio::spawn(drain_diagnostics(err, settings.throttle, signals.clone()))
    });
    drop(signals);

    let deadline = async {
        match settings.timeout {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending::<()>().await,
        }
    };

    let mut outcome = tokio::select! {
        status = child.wait() => match status {
            Ok(status) if status.success() => JobOutcome::Succeeded,
            Ok(status) => JobOutcome::Failed(match status.code() {
                Some(code) => format!("ffmpeg exited with code {code}"),
                None => "ffmpeg terminated by signal".to_string(),
            }),
            Err(e) => JobOutcome::Failed(format!("failed to wait for ffmpeg: {e}")),
        },
        _ = cancel.cancelled() => JobOutcome::Cancelled,
        _ = deadline => JobOutcome::TimedOut(settings.timeout.unwrap_or_default()),
    };

    if matches!(outcome, JobOutcome::Cancelled | JobOutcome::TimedOut(_)) {
        if let Err(e) = child.start_kill() {
            tracing::warn!(error = %e, "Failed to kill ffmpeg");
        }
        let _ = child.wait().await;
    }

    join_reader(stdout_task, settings.drain_grace, "stdout").await;
    let diagnostics = join_reader(stderr_task, settings.drain_grace, "stderr")
        .await
        .unwrap_or_default();

    if let JobOutcome::Failed(message) = &mut outcome {
        if let Some(tail) = diagnostics_tail(&diagnostics) {
            message.push_str(": ");
            message.push_str(&tail);
        }
    }
    outcome
}

/// Await a reader task for at most `grace`, aborting it if it overruns.
async fn join_reader<T>(
    task: Option<JoinHandle<T>>,
    grace: Duration,
    stream: &'static str,
) -> Option<T> {
    let mut task = task?;
    match tokio::time::timeout(grace, &mut task).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            tracing::warn!(stream, error = %e, "Stream reader panicked");
            None
        }
        Err(_) => {
            tracing::warn!(stream, grace_ms = grace.as_millis() as u64, "Stream reader overran grace period, aborting");
            task.abort();
            None
        }
    }
}

/// Parse `-progress` lines, forwarding a throttled sample plus one final
/// flush when the stream closes.
async fn drain_progress<R: AsyncRead + Unpin>(
    stream: R,
    interval: Duration,
    signals: mpsc::Sender<JobSignal>,
) {
    let mut lines = BufReader::new(stream).lines();
    let mut state = ProgressState::new();
    let mut throttle = Throttle::new(interval);
    let mut pending = false;

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if !state.apply_line(&line) {
                    continue;
                }
                pending = true;
                // The closing block is always reported.
                if line.starts_with("progress=") && (throttle.ready() || state.is_finished()) {
                    pending = false;
                    send_progress(&state, &signals).await;
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read ffmpeg progress stream");
                break;
            }
        }
    }

    if pending {
        send_progress(&state, &signals).await;
    }
}

async fn send_progress(state: &ProgressState, signals: &mpsc::Sender<JobSignal>) {
    let _ = signals
        .send(JobSignal::Progress {
            current_time: state.current_time_secs(),
            summary: state.summary(),
        })
        .await;
}

/// Batch diagnostic lines on the throttle cadence. Returns the captured
/// text (capped) for failure messages.
async fn drain_diagnostics<R: AsyncRead + Unpin>(
    stream: R,
    interval: Duration,
    signals: mpsc::Sender<JobSignal>,
) -> String {
    let mut lines = BufReader::new(stream).lines();
    let mut throttle = Throttle::new(interval);
    let mut batch = String::new();
    let mut captured = String::new();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim_end();
                if line.is_empty() {
                    continue;
                }
                tracing::debug!(target: "dtsfix_worker::ffmpeg", "{line}");

                if captured.len() + line.len() < MAX_DIAGNOSTIC_BYTES {
                    captured.push_str(line);
                    captured.push('\n');
                }
                if !batch.is_empty() {
                    batch.push('\n');
                }
                batch.push_str(line);

                if throttle.ready() {
                    let _ = signals
                        .send(JobSignal::Diagnostics(std::mem::take(&mut batch)))
                        .await;
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read ffmpeg diagnostic stream");
                break;
            }
        }
    }

    if !batch.is_empty() {
        let _ = signals.send(JobSignal::Diagnostics(batch)).await;
    }
    captured
}

/// Last few non-empty diagnostic lines joined for an error message.
fn diagnostics_tail(diagnostics: &str) -> Option<String> {
    let lines: Vec<&str> = diagnostics.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return None;
    }
    let start = lines.len().saturating_sub(FAILURE_TAIL_LINES);
    Some(lines[start..].join(" | "))
}
