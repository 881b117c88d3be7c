//! Real-time event fan-out.
//!
//! - [`HubEvent`]: the typed event envelope sent to observers.
//! - [`BroadcastHub`]: registry of live observers with non-blocking
//!   publish.

pub mod event;
pub mod hub;

pub use event::{HubEvent, InitialState, LogLevel, LogLine, ProgressUpdate};
pub use hub::{BroadcastHub, Frame, OBSERVER_BUFFER};
