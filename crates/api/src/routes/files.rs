use axum::routing::post;
use axum::Router;

use crate::handlers::files;
use crate::state::AppState;

/// Routes mounted at `/files`.
///
/// ```text
/// POST   /search          -> search_files
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/search", post(files::search_files))
}
