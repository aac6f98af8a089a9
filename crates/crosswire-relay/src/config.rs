use anyhow::{Context, Result};

/// Runtime configuration for the relay, read from the environment once at
/// startup. The threads-platform credentials are required up front; the
/// chat-side values only become mandatory when the operation that needs them
/// runs (a missing one surfaces as `RelayError::Config` at that point).
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub threads_app_id: String,
    pub threads_signing_secret: String,
    pub threads_api_url: String,

    pub chat_signing_secret: Option<String>,
    pub chat_client_id: Option<String>,
    pub chat_client_secret: Option<String>,
    pub chat_api_url: String,

    pub org_id: String,
    pub org_name: String,
    pub frontend_host: String,
}

impl RelayConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            threads_app_id: std::env::var("THREADS_APP_ID")
                .context("THREADS_APP_ID must be set")?,
            threads_signing_secret: std::env::var("THREADS_SIGNING_SECRET")
                .context("THREADS_SIGNING_SECRET must be set")?,
            threads_api_url: std::env::var("THREADS_API_URL")
                .unwrap_or_else(|_| "https://api.threads.example.com/v1".into()),

            chat_signing_secret: std::env::var("CHAT_SIGNING_SECRET").ok(),
            chat_client_id: std::env::var("CHAT_CLIENT_ID").ok(),
            chat_client_secret: std::env::var("CHAT_CLIENT_SECRET").ok(),
            chat_api_url: std::env::var("CHAT_API_URL")
                .unwrap_or_else(|_| "https://chat.example.com/api".into()),

            org_id: std::env::var("CROSSWIRE_ORG_ID").unwrap_or_else(|_| "crosswire_org".into()),
            org_name: std::env::var("CROSSWIRE_ORG_NAME")
                .unwrap_or_else(|_| "Crosswire demo org".into()),
            frontend_host: std::env::var("CROSSWIRE_FRONTEND_HOST")
                .unwrap_or_else(|_| "https://localhost:3000".into()),
        })
    }
}
