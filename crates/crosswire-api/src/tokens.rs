use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use tracing::error;

use crosswire_types::api::UserTokenResponse;

use crate::state::{AppState, status_for};

/// Demo login: issues a client token for the next sample identity in the
/// rotation, so refreshing the front end cycles through users.
pub async fn user_token(
    State(state): State<AppState>,
) -> Result<Json<UserTokenResponse>, StatusCode> {
    let issued = state.issuer.issue_demo_token(&state.db).map_err(|err| {
        error!(%err, "could not issue demo token");
        status_for(&err)
    })?;
    Ok(Json(issued))
}
