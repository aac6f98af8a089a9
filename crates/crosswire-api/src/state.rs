use std::sync::Arc;

use axum::http::StatusCode;

use crosswire_db::Database;
use crosswire_relay::{ChatClient, Relay, RelayConfig, RelayError, ThreadsClient, TokenIssuer};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub relay: Relay<ThreadsClient, ChatClient>,
    pub issuer: TokenIssuer,
    pub config: Arc<RelayConfig>,
}

/// Map relay failures onto response codes without leaking internals; the
/// detail goes to the log, not the caller.
pub(crate) fn status_for(err: &RelayError) -> StatusCode {
    match err {
        RelayError::NotFound(_) => StatusCode::NOT_FOUND,
        RelayError::Auth(_) => StatusCode::UNAUTHORIZED,
        RelayError::Upstream { .. } => StatusCode::BAD_GATEWAY,
        RelayError::Config(_)
        | RelayError::Store(_)
        | RelayError::Http(_)
        | RelayError::Token(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
