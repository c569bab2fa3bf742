use crate::AppState;
use crate::api::error::AppError;
use axum::{Json, body::Bytes, extract::State};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Serialize, Deserialize, ToSchema)]
pub struct StatsResponse {
    pub total_files: u64,
    pub total_bytes: u64,
}

#[derive(Deserialize, Default, ToSchema)]
pub struct CleanupRequest {
    /// Files older than this are deleted (default: 86400)
    pub max_age_seconds: Option<u64>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct CleanupResponse {
    pub deleted_count: u64,
}

#[utoipa::path(
    get,
    path = "/stats",
    responses(
        (status = 200, description = "Aggregate storage statistics", body = StatsResponse)
    ),
    tag = "system"
)]
pub async fn get_stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, AppError> {
    let stats = state.relay.stats().await?;

    Ok(Json(StatsResponse {
        total_files: stats.total_files,
        total_bytes: stats.total_bytes,
    }))
}

#[utoipa::path(
    post,
    path = "/cleanup",
    request_body(content = CleanupRequest, description = "Optional; an empty body uses the default age"),
    responses(
        (status = 200, description = "Old files deleted", body = CleanupResponse),
        (status = 400, description = "Malformed request body")
    ),
    tag = "system"
)]
pub async fn cleanup_files(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<CleanupResponse>, AppError> {
    let request: CleanupRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CleanupRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::BadRequest(format!("Invalid cleanup request: {}", e)))?
    };

    let max_age = request
        .max_age_seconds
        .unwrap_or(state.config.default_cleanup_age_secs);
    let deleted_count = state.relay.cleanup(max_age).await?;

    Ok(Json(CleanupResponse { deleted_count }))
}
