//! Integration lifecycle: the OAuth redirect that connects a chat workspace,
//! the cached channel list, and integration removal.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Redirect;
use serde::Deserialize;
use tracing::{error, info};

use crosswire_relay::ChatApi;
use crosswire_types::api::ChannelsResponse;

use crate::state::{AppState, status_for};

#[derive(Debug, Deserialize)]
pub struct AuthQuery {
    pub code: Option<String>,
    /// The threads-platform user id of whoever started the OAuth flow,
    /// round-tripped through the provider.
    pub state: Option<String>,
    pub error: Option<String>,
}

/// OAuth redirect target. Exchanges the code for a bot token, stores the
/// credentials, caches the channel list, links the connecting user's identity
/// explicitly, and email-matches the rest.
pub async fn auth_redirect(
    State(state): State<AppState>,
    Query(query): Query<AuthQuery>,
) -> Result<Redirect, StatusCode> {
    let home = Redirect::to(&state.config.frontend_host);

    // The user clicked "Cancel" in the provider's consent dialog.
    if query.error.as_deref() == Some("access_denied") {
        return Ok(home);
    }

    let code = query.code.as_deref().ok_or(StatusCode::BAD_REQUEST)?;
    let connecting_user = query.state.as_deref().ok_or(StatusCode::BAD_REQUEST)?;

    let access = state.relay.chat.oauth_access(code).await.map_err(|err| {
        error!(%err, "oauth code exchange failed");
        status_for(&err)
    })?;

    // Credentials first: every later chat API call reads the token from the
    // store.
    state
        .db
        .save_integration(&access.bot_token, &access.bot_user_id)
        .map_err(internal)?;

    let channels = state.relay.chat.list_channels().await.map_err(|err| {
        error!(%err, "could not list chat channels");
        status_for(&err)
    })?;
    state.db.replace_channels(&channels).map_err(internal)?;

    // The connecting user told us who they are; everyone else is matched
    // opportunistically by email.
    state
        .db
        .link_identity(connecting_user, &access.authed_user_id)
        .map_err(internal)?;

    let users = state.relay.chat.list_users().await.map_err(|err| {
        error!(%err, "could not list chat users");
        status_for(&err)
    })?;
    let candidates: Vec<(String, String)> = users
        .into_iter()
        .filter_map(|user| {
            let email = user.profile.and_then(|profile| profile.email)?;
            Some((user.id, email))
        })
        .collect();
    let linked = state
        .db
        .match_identities_by_email(&candidates)
        .map_err(internal)?;

    info!(
        channels = channels.len(),
        email_matched = linked,
        "chat integration connected"
    );
    Ok(home)
}

pub async fn list_channels(
    State(state): State<AppState>,
) -> Result<Json<ChannelsResponse>, StatusCode> {
    let channels = state.db.list_channels().map_err(internal)?;
    Ok(Json(ChannelsResponse { channels }))
}

/// The front end needs the OAuth client id to build the consent URL.
pub async fn chat_client_id(State(state): State<AppState>) -> Result<String, StatusCode> {
    state
        .config
        .chat_client_id
        .clone()
        .ok_or(StatusCode::NOT_FOUND)
}

/// Tear the integration down: credentials, thread links, cached channels and
/// identity links all go at once.
pub async fn remove_integration(State(state): State<AppState>) -> Result<StatusCode, StatusCode> {
    state.db.remove_integration().map_err(internal)?;
    info!("chat integration removed");
    Ok(StatusCode::OK)
}

fn internal(err: anyhow::Error) -> StatusCode {
    error!(%err, "store operation failed");
    StatusCode::INTERNAL_SERVER_ERROR
}
