use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crosswire_db::Database;
use crosswire_types::chat::{
    ApiResponse, Channel, ChannelListResponse, ChatPostMessage, ChatUser, OauthAccessResponse,
    UserInfoResponse, UserListResponse,
};

use crate::config::RelayConfig;
use crate::error::RelayError;

/// Result of the OAuth code exchange at integration-connect time.
#[derive(Debug, Clone)]
pub struct OauthAccess {
    pub bot_token: String,
    pub bot_user_id: String,
    pub authed_user_id: String,
}

/// The chat platform's Web API, as much of it as the relay needs.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Post a message; returns the timestamp the platform assigned to it.
    async fn post_message(&self, message: &ChatPostMessage) -> Result<String, RelayError>;

    /// Join a channel so the bot may post into it.
    async fn join_channel(&self, channel: &str) -> Result<(), RelayError>;

    async fn user_info(&self, user_id: &str) -> Result<ChatUser, RelayError>;

    async fn list_channels(&self) -> Result<Vec<Channel>, RelayError>;

    async fn list_users(&self) -> Result<Vec<ChatUser>, RelayError>;

    async fn oauth_access(&self, code: &str) -> Result<OauthAccess, RelayError>;
}

pub struct ChatClient {
    http: reqwest::Client,
    db: Arc<Database>,
    config: Arc<RelayConfig>,
}

impl ChatClient {
    pub fn new(db: Arc<Database>, config: Arc<RelayConfig>) -> Result<Self, RelayError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { http, db, config })
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}", self.config.chat_api_url, method)
    }

    /// The bot token lives in the store, written at integration-connect time.
    fn bot_token(&self) -> Result<String, RelayError> {
        self.db
            .load_integration()?
            .map(|row| row.bot_token)
            .ok_or(RelayError::Config("chat integration is not connected"))
    }

    /// The chat platform reports failures inside a 200 response, so the `ok`
    /// flag has to be checked in addition to the HTTP status.
    fn check_ok(ok: bool, error: Option<String>) -> Result<(), RelayError> {
        if ok {
            Ok(())
        } else {
            Err(RelayError::Upstream {
                service: "chat",
                status: 200,
                detail: error.unwrap_or_else(|| "unknown error".into()),
            })
        }
    }
}

#[async_trait]
impl ChatApi for ChatClient {
    async fn post_message(&self, message: &ChatPostMessage) -> Result<String, RelayError> {
        let resp: ApiResponse = self
            .http
            .post(self.url("chat.postMessage"))
            .bearer_auth(self.bot_token()?)
            .json(message)
            .send()
            .await?
            .json()
            .await?;
        Self::check_ok(resp.ok, resp.error)?;
        resp.ts.ok_or(RelayError::Upstream {
            service: "chat",
            status: 200,
            detail: "no timestamp on posted message".into(),
        })
    }

    async fn join_channel(&self, channel: &str) -> Result<(), RelayError> {
        let resp: ApiResponse = self
            .http
            .post(self.url("conversations.join"))
            .bearer_auth(self.bot_token()?)
            .json(&json!({ "channel": channel }))
            .send()
            .await?
            .json()
            .await?;
        Self::check_ok(resp.ok, resp.error)
    }

    async fn user_info(&self, user_id: &str) -> Result<ChatUser, RelayError> {
        let resp: UserInfoResponse = self
            .http
            .get(self.url("users.info"))
            .query(&[("user", user_id)])
            .bearer_auth(self.bot_token()?)
            .send()
            .await?
            .json()
            .await?;
        Self::check_ok(resp.ok, resp.error)?;
        resp.user.ok_or(RelayError::Upstream {
            service: "chat",
            status: 200,
            detail: format!("no profile returned for user {}", user_id),
        })
    }

    async fn list_channels(&self) -> Result<Vec<Channel>, RelayError> {
        let resp: ChannelListResponse = self
            .http
            .get(self.url("conversations.list"))
            .bearer_auth(self.bot_token()?)
            .send()
            .await?
            .json()
            .await?;
        Self::check_ok(resp.ok, resp.error)?;
        Ok(resp.channels)
    }

    async fn list_users(&self) -> Result<Vec<ChatUser>, RelayError> {
        let resp: UserListResponse = self
            .http
            .get(self.url("users.list"))
            .bearer_auth(self.bot_token()?)
            .send()
            .await?
            .json()
            .await?;
        Self::check_ok(resp.ok, resp.error)?;
        Ok(resp.members)
    }

    async fn oauth_access(&self, code: &str) -> Result<OauthAccess, RelayError> {
        let client_id = self
            .config
            .chat_client_id
            .as_deref()
            .ok_or(RelayError::Config("CHAT_CLIENT_ID is not set"))?;
        let client_secret = self
            .config
            .chat_client_secret
            .as_deref()
            .ok_or(RelayError::Config("CHAT_CLIENT_SECRET is not set"))?;

        let resp: OauthAccessResponse = self
            .http
            .post(self.url("oauth.v2.access"))
            .basic_auth(client_id, Some(client_secret))
            .form(&[("code", code)])
            .send()
            .await?
            .json()
            .await?;
        Self::check_ok(resp.ok, resp.error)?;

        let bot_token = resp.access_token.ok_or(RelayError::Upstream {
            service: "chat",
            status: 200,
            detail: "oauth exchange returned no bot token".into(),
        })?;
        let bot_user_id = resp.bot_user_id.ok_or(RelayError::Upstream {
            service: "chat",
            status: 200,
            detail: "oauth exchange returned no bot user id".into(),
        })?;
        let authed_user_id = resp
            .authed_user
            .map(|user| user.id)
            .ok_or(RelayError::Upstream {
                service: "chat",
                status: 200,
                detail: "oauth exchange returned no authed user".into(),
            })?;

        Ok(OauthAccess {
            bot_token,
            bot_user_id,
            authed_user_id,
        })
    }
}
