//! FFmpeg/FFprobe command utilities.
//!
//! Probing of the primary audio stream and container duration, plus the
//! builder for the DTS 5.1 -> FLAC 7.1 conversion command.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::task::AudioInfo;

/// Error type for FFmpeg/FFprobe operations.
#[derive(Debug, thiserror::Error)]
pub enum FfmpegError {
    #[error("ffprobe/ffmpeg binary not found: {0}")]
    NotFound(std::io::Error),

    #[error("ffprobe/ffmpeg execution failed (exit code {exit_code:?}): {stderr}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("failed to parse ffprobe output: {0}")]
    ParseError(String),

    #[error("ffprobe did not finish within {0:?}")]
    TimedOut(Duration),

    #[error("media file not found: {0}")]
    MediaNotFound(String),
}

/// Default upper bound on a single ffprobe run.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Locations of the ffmpeg and ffprobe binaries.
#[derive(Debug, Clone)]
pub struct FfmpegTools {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    /// An ffprobe run still going after this long is killed.
    pub probe_timeout: Duration,
}

impl Default for FfmpegTools {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

// ---------------------------------------------------------------------------
// ffprobe JSON output structures
// ---------------------------------------------------------------------------

/// Output of `-show_streams`.
#[derive(Debug, Deserialize)]
pub struct FfprobeStreams {
    #[serde(default)]
    pub streams: Vec<FfprobeStream>,
}

/// A single stream from ffprobe output.
#[derive(Debug, Deserialize)]
pub struct FfprobeStream {
    pub codec_name: Option<String>,
    pub codec_type: Option<String>,
    pub channel_layout: Option<String>,
    pub channels: Option<u32>,
    pub sample_rate: Option<String>,
    pub bit_rate: Option<String>,
}

/// Output of `-show_format`.
#[derive(Debug, Deserialize)]
pub struct FfprobeFormatOutput {
    pub format: FfprobeFormat,
}

/// Format-level metadata from ffprobe.
#[derive(Debug, Deserialize)]
pub struct FfprobeFormat {
    pub duration: Option<String>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

impl FfmpegTools {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Describe the first audio stream of `path`, or `None` when the file
    /// has no audio.
    pub async fn probe_audio(&self, path: &Path) -> Result<Option<AudioInfo>, FfmpegError> {
        let stdout = self
            .run_ffprobe(
                path,
                &[
                    "-v",
                    "quiet",
                    "-print_format",
                    "json",
                    "-show_streams",
                    "-select_streams",
                    "a:0",
                ],
            )
            .await?;
        parse_audio_info(&stdout)
    }

    /// Container duration of `path` in seconds.
    pub async fn probe_duration(&self, path: &Path) -> Result<f64, FfmpegError> {
        let stdout = self
            .run_ffprobe(
                path,
                &["-v", "quiet", "-print_format", "json", "-show_format"],
            )
            .await?;
        parse_format_duration(&stdout)
    }

    /// Build the conversion command. The caller decides how stdio is wired.
    ///
    /// Video and subtitle streams are copied. The first audio stream becomes
    /// 8-channel FLAC, with the 5.1 side channels duplicated into the 7.1
    /// back pair. Progress goes to stdout as `key=value` lines.
    pub fn conversion_command(&self, input: &Path, output: &Path) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.ffmpeg);
        cmd.arg("-i")
            .arg(input)
            .args([
                "-c:v",
                "copy",
                "-c:s",
                "copy",
                "-c:a:0",
                "flac",
                "-b:a",
                "384k",
                "-map",
                "0",
                "-compression_level",
                "8",
                "-channel_layout",
                "7.1",
                "-ac",
                "8",
                "-af",
                "pan=7.1|FL=FL|FR=FR|FC=FC|LFE=LFE|BL=SL|BR=SR|SL=SL|SR=SR",
                "-progress",
                "pipe:1",
                "-nostats",
                "-loglevel",
                "info",
            ])
            .arg(output);
        cmd
    }

    /// Run ffprobe on `path`. The child is killed if it outlives
    /// `probe_timeout` or the returned future is dropped.
    async fn run_ffprobe(&self, path: &Path, args: &[&str]) -> Result<String, FfmpegError> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(FfmpegError::MediaNotFound(
                path.to_string_lossy().to_string(),
            ));
        }

        let mut cmd = tokio::process::Command::new(&self.ffprobe);
        cmd.args(args).arg(path).kill_on_drop(true);
        let output = tokio::time::timeout(self.probe_timeout, cmd.output())
            .await
            .map_err(|_| FfmpegError::TimedOut(self.probe_timeout))?
            .map_err(FfmpegError::NotFound)?;

        if !output.status.success() {
            return Err(FfmpegError::ExecutionFailed {
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

/// Parse `-show_streams` JSON into the first audio stream descriptor.
pub fn parse_audio_info(json: &str) -> Result<Option<AudioInfo>, FfmpegError> {
    let parsed: FfprobeStreams =
        serde_json::from_str(json).map_err(|e| FfmpegError::ParseError(format!("{e}: {json}")))?;

    Ok(parsed
        .streams
        .into_iter()
        .find(|s| s.codec_type.as_deref().is_none_or(|t| t == "audio"))
        .map(|s| AudioInfo {
            codec_name: s.codec_name.unwrap_or_default(),
            channel_layout: s.channel_layout.unwrap_or_default(),
            channels: s.channels.unwrap_or(0),
            sample_rate: s.sample_rate.unwrap_or_default(),
            bit_rate: s.bit_rate.unwrap_or_default(),
        }))
}

/// Parse `-show_format` JSON into a duration in seconds.
pub fn parse_format_duration(json: &str) -> Result<f64, FfmpegError> {
    let parsed: FfprobeFormatOutput =
        serde_json::from_str(json).map_err(|e| FfmpegError::ParseError(format!("{e}: {json}")))?;

    let raw = parsed
        .format
        .duration
        .ok_or_else(|| FfmpegError::ParseError("format has no duration".to_string()))?;

    raw.trim()
        .parse::<f64>()
        .map_err(|e| FfmpegError::ParseError(format!("invalid duration {raw:?}: {e}")))
}
