//! Route definitions for the `/tasks` resource.

use axum::routing::post;
use axum::Router;

use crate::handlers::tasks;
use crate::state::AppState;

/// Routes mounted at `/tasks`.
///
/// ```text
/// POST   /                -> add_task
/// POST   /cancel          -> cancel_task
/// POST   /delete          -> delete_task
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(tasks::add_task))
        .route("/cancel", post(tasks::cancel_task))
        .route("/delete", post(tasks::delete_task))
}
