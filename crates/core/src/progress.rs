//! Parsing of ffmpeg `-progress` output.
//!
//! ffmpeg writes blocks of `key=value` lines, each block terminated by a
//! `progress=continue` or `progress=end` line. [`ProgressState`] keeps the
//! latest value for every key seen so far.

use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
pub struct ProgressState {
    values: HashMap<String, String>,
}

impl ProgressState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one output line into the state. Returns `false` for lines that
    /// are not `key=value`.
    pub fn apply_line(&mut self, line: &str) -> bool {
        let Some((key, value)) = line.split_once('=') else {
            return false;
        };
        let key = key.trim();
        if key.is_empty() {
            return false;
        }
        self.values.insert(key.to_string(), value.trim().to_string());
        true
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Seconds of output written so far.
    ///
    /// `out_time_ms` is in microseconds despite its name; `out_time` is the
    /// `HH:MM:SS.frac` fallback.
    pub fn current_time_secs(&self) -> Option<f64> {
        if let Some(us) = self.get("out_time_ms").and_then(|v| v.parse::<i64>().ok()) {
            if us >= 0 {
                return Some(us as f64 / 1_000_000.0);
            }
        }
        self.get("out_time").and_then(parse_clock)
    }

    /// `progress=end` was seen.
    pub fn is_finished(&self) -> bool {
        self.get("progress") == Some("end")
    }

    /// Human-readable status line for progress events.
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "Processing...".to_string();
        }
        let field = |key: &str| self.get(key).unwrap_or("N/A");
        format!(
            "Frame: {} | FPS: {} | Speed: {} | Time: {}",
            field("frame"),
            field("fps"),
            field("speed"),
            field("out_time"),
        )
    }
}

/// Parse `HH:MM:SS[.frac]` into seconds.
///
/// Negative clocks (ffmpeg reports `-00:00:00.023220` before the first
/// packet) are rejected.
pub fn parse_clock(value: &str) -> Option<f64> {
    let mut parts = value.trim().split(':');
    let hours = parts.next()?.parse::<f64>().ok()?;
    let minutes = parts.next()?.parse::<f64>().ok()?;
    let seconds = parts.next()?.parse::<f64>().ok()?;
    if parts.next().is_some()
        || [hours, minutes, seconds]
            .iter()
            .any(|v| v.is_sign_negative() || !v.is_finite())
    {
        return None;
    }
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Whole percent of `duration` covered by `current`, clamped to 0..=100.
/// Returns 0 when the duration is unknown.
pub fn percent_complete(current: f64, duration: f64) -> u8 {
    if !(duration > 0.0) || !current.is_finite() {
        return 0;
    }
    (current / duration * 100.0).clamp(0.0, 100.0).floor() as u8
}
