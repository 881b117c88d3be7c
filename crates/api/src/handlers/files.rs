use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use dtsfix_core::media::{MediaFile, DEFAULT_SEARCH_PATTERN};
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub pattern: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchReply {
    pub files: Vec<MediaFile>,
    pub count: usize,
    pub default_pattern: &'static str,
}

impl SearchReply {
    pub fn new(files: Vec<MediaFile>) -> Self {
        Self {
            count: files.len(),
            files,
            default_pattern: DEFAULT_SEARCH_PATTERN,
        }
    }
}

/// POST /api/v1/files/search
///
/// Recursively search the media root for video files whose name matches
/// `pattern` (a case-insensitive regex, default `DTS.*5\.1`).
pub async fn search_files(
    State(state): State<AppState>,
    Json(input): Json<SearchRequest>,
) -> AppResult<impl IntoResponse> {
    let files = state.service.search_files(input.pattern.as_deref()).await?;
    Ok(Json(DataResponse {
        data: SearchReply::new(files),
    }))
}
