//! WebSocket message type constants for conversion job events.
//!
//! Used by the broadcast hub when pushing state changes to connected
//! observers.

/// Full state pushed to an observer when it connects or asks for it.
pub const MSG_TYPE_INITIAL_STATE: &str = "initial_state";

/// Snapshot of all known tasks.
pub const MSG_TYPE_QUEUE_UPDATE: &str = "queue_update";

/// The task currently being converted, or `null`.
pub const MSG_TYPE_ACTIVE_TASK: &str = "active_task";

/// Progress of the active conversion (percent + status message).
pub const MSG_TYPE_CONVERSION_PROGRESS: &str = "conversion_progress";

/// Log line for the activity console.
pub const MSG_TYPE_LOG: &str = "log";

/// Media library scan started or finished.
pub const MSG_TYPE_SCAN_PROGRESS: &str = "scan_progress";

/// Suffix appended to an inbound command type to form its reply type.
pub const RESPONSE_SUFFIX: &str = "_response";
