//! Conversion job lifecycle.
//!
//! - [`QueueCoordinator`] / [`QueueHandle`]: the single writer of the task
//!   store, republishing the queue on every change and on a timer.
//! - [`JobExecutor`]: claims one pending task at a time and supervises its
//!   ffmpeg process.
//! - [`ConversionService`]: the operations the transports call.

pub mod executor;
pub mod process;
pub mod queue;
pub mod service;

pub use executor::{ExecutorConfig, ExecutorError, JobExecutor};
pub use queue::{QueueConfig, QueueCoordinator, QueueError, QueueHandle};
pub use service::ConversionService;
