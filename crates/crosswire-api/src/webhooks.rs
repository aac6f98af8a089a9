//! Webhook receivers for both platforms.
//!
//! Both endpoints follow the ack-then-process rule: they answer 200 within
//! the platform's delivery timeout and do the signature check plus relay work
//! in a spawned task. Downstream failures are logged, never reported back to
//! the delivering platform.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::{error, warn};

use crosswire_types::events::{ChatWebhook, ThreadsWebhook};

use crate::state::AppState;

pub async fn threads_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    tokio::spawn(process_threads_event(state, headers, body));
    StatusCode::OK
}

async fn process_threads_event(state: AppState, headers: HeaderMap, body: Bytes) {
    let result = crosswire_verify::verify_threads(
        &body,
        header_str(&headers, "X-Signature-Timestamp"),
        header_str(&headers, "X-Signature"),
        Some(state.config.threads_signing_secret.as_str()),
    );
    if let Err(err) = result {
        warn!(%err, "rejected threads webhook");
        return;
    }

    let webhook: ThreadsWebhook = match serde_json::from_slice(&body) {
        Ok(webhook) => webhook,
        Err(err) => {
            warn!(%err, "unparseable threads webhook body");
            return;
        }
    };

    if let Err(err) = state.relay.handle_threads_webhook(webhook).await {
        error!(%err, "threads webhook processing failed");
    }
}

pub async fn chat_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    // The endpoint-setup handshake is answered by echoing the challenge,
    // before any verification or processing.
    if let Ok(ChatWebhook::UrlVerification { challenge }) =
        serde_json::from_slice::<ChatWebhook>(&body)
    {
        return challenge.into_response();
    }

    tokio::spawn(process_chat_event(state, headers, body));
    StatusCode::OK.into_response()
}

async fn process_chat_event(state: AppState, headers: HeaderMap, body: Bytes) {
    let result = crosswire_verify::verify_chat(
        &body,
        header_str(&headers, "X-Request-Timestamp"),
        header_str(&headers, "X-Signature"),
        state.config.chat_signing_secret.as_deref(),
    );
    if let Err(err) = result {
        warn!(%err, "rejected chat webhook");
        return;
    }

    let webhook: ChatWebhook = match serde_json::from_slice(&body) {
        Ok(webhook) => webhook,
        Err(err) => {
            warn!(%err, "unparseable chat webhook body");
            return;
        }
    };

    if let Err(err) = state.relay.handle_chat_webhook(webhook).await {
        error!(%err, "chat webhook processing failed");
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}
