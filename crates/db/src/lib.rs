//! Task persistence.
//!
//! [`TaskStore`] is the port the queue coordinator writes through;
//! [`JsonTaskStore`] keeps every record in one JSON file.

pub mod json_store;
pub mod store;

pub use json_store::JsonTaskStore;
pub use store::{StoreError, StoreResult, TaskStore, LIST_LIMIT};
