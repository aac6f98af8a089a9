//! JWTs for the threads platform, plus the demo-login token issuer.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::Serialize;
use serde_json::json;

use crosswire_db::Database;
use crosswire_types::api::UserTokenResponse;

use crate::config::RelayConfig;
use crate::error::RelayError;

#[derive(Serialize)]
struct ServerClaims {
    app_id: String,
    iat: i64,
    exp: i64,
}

#[derive(Serialize)]
struct ClientClaims {
    app_id: String,
    user_id: String,
    organization_id: String,
    user_details: serde_json::Value,
    organization_details: serde_json::Value,
    iat: i64,
    exp: i64,
}

/// Short-lived token for server-to-server calls to the threads platform.
pub fn server_token(config: &RelayConfig) -> Result<String, RelayError> {
    let now = chrono::Utc::now().timestamp();
    let claims = ServerClaims {
        app_id: config.threads_app_id.clone(),
        iat: now,
        exp: now + 60,
    };
    Ok(encode(
        &Header::new(Algorithm::HS512),
        &claims,
        &EncodingKey::from_secret(config.threads_signing_secret.as_bytes()),
    )?)
}

/// Issues client tokens for the demo front end, cycling through the sample
/// identities so a refresh logs in as the next user. The rotation cursor is
/// owned here rather than living in module-level state, so it is thread-safe
/// and testable.
pub struct TokenIssuer {
    config: Arc<RelayConfig>,
    cursor: AtomicUsize,
}

impl TokenIssuer {
    pub fn new(config: Arc<RelayConfig>) -> Self {
        Self {
            config,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn issue_demo_token(&self, db: &Database) -> Result<UserTokenResponse, RelayError> {
        let identities = db.list_identities()?;
        if identities.is_empty() {
            return Err(RelayError::NotFound("no identities to log in as".into()));
        }

        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % identities.len();
        let identity = &identities[index];

        let now = chrono::Utc::now().timestamp();
        let claims = ClientClaims {
            app_id: self.config.threads_app_id.clone(),
            user_id: identity.threads_id.clone(),
            organization_id: self.config.org_id.clone(),
            user_details: json!({
                "name": identity.display_name,
                "email": identity.email,
                "profilePictureURL": identity.avatar_url,
            }),
            organization_details: json!({ "name": self.config.org_name }),
            iat: now,
            exp: now + 3600,
        };
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(self.config.threads_signing_secret.as_bytes()),
        )?;

        Ok(UserTokenResponse {
            user_id: identity.threads_id.clone(),
            token,
        })
    }
}
