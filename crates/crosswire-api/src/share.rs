use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::error;

use crosswire_types::api::ShareRequest;

use crate::state::{AppState, status_for};

/// Share a thread into a chat channel. Unlike the webhook receivers, this is
/// a direct user action and reports failure synchronously to its caller.
pub async fn share_thread(
    State(state): State<AppState>,
    Json(req): Json<ShareRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if req.thread_id.is_empty() || req.channel.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let response = state
        .relay
        .share_thread(&req.thread_id, &req.channel)
        .await
        .map_err(|err| {
            error!(thread_id = %req.thread_id, %err, "share failed");
            status_for(&err)
        })?;

    Ok(Json(response))
}
