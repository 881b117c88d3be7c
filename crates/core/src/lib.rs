//! Domain types and pure helpers shared by every dtsfix crate.
//!
//! Nothing in here talks to the task store or the broadcast hub. The
//! modules cover the task model, the naming rules for converted and backup
//! files, ffmpeg/ffprobe invocation, progress-stream parsing and media
//! discovery.

pub mod error;
pub mod ffmpeg;
pub mod job_events;
pub mod media;
pub mod naming;
pub mod progress;
pub mod task;
pub mod types;
