use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crosswire_types::threads::{NewThreadMessage, Thread, ThreadMessage, UserProfile};

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::tokens;

/// Server-to-server surface of the threads platform, as much of it as the
/// relay needs. The trait exists so relay logic can be exercised against a
/// recording mock.
#[async_trait]
pub trait ThreadsApi: Send + Sync {
    /// All messages in a thread, ascending by creation.
    async fn fetch_thread_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, RelayError>;

    async fn fetch_thread(&self, thread_id: &str) -> Result<Thread, RelayError>;

    async fn post_thread_message(
        &self,
        thread_id: &str,
        message: &NewThreadMessage,
    ) -> Result<(), RelayError>;

    async fn update_thread_metadata(
        &self,
        thread_id: &str,
        metadata: serde_json::Value,
    ) -> Result<(), RelayError>;

    /// Create or update a platform user (used for shadow identities).
    async fn upsert_user(&self, user_id: &str, profile: &UserProfile) -> Result<(), RelayError>;

    async fn add_org_member(&self, org_id: &str, user_id: &str) -> Result<(), RelayError>;
}

pub struct ThreadsClient {
    http: reqwest::Client,
    config: Arc<RelayConfig>,
}

impl ThreadsClient {
    pub fn new(config: Arc<RelayConfig>) -> Result<Self, RelayError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { http, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.threads_api_url, path)
    }

    fn bearer(&self) -> Result<String, RelayError> {
        tokens::server_token(&self.config)
    }

    async fn expect_success(resp: reqwest::Response) -> Result<reqwest::Response, RelayError> {
        let status = resp.status();
        if status.is_success() {
            Ok(resp)
        } else {
            let detail = resp.text().await.unwrap_or_default();
            Err(RelayError::Upstream {
                service: "threads",
                status: status.as_u16(),
                detail,
            })
        }
    }
}

#[async_trait]
impl ThreadsApi for ThreadsClient {
    async fn fetch_thread_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, RelayError> {
        let resp = self
            .http
            .get(self.url(&format!("/threads/{}/messages", thread_id)))
            .query(&[("sortDirection", "ascending")])
            .bearer_auth(self.bearer()?)
            .send()
            .await?;
        Ok(Self::expect_success(resp).await?.json().await?)
    }

    async fn fetch_thread(&self, thread_id: &str) -> Result<Thread, RelayError> {
        let resp = self
            .http
            .get(self.url(&format!("/threads/{}", thread_id)))
            .bearer_auth(self.bearer()?)
            .send()
            .await?;
        Ok(Self::expect_success(resp).await?.json().await?)
    }

    async fn post_thread_message(
        &self,
        thread_id: &str,
        message: &NewThreadMessage,
    ) -> Result<(), RelayError> {
        let resp = self
            .http
            .post(self.url(&format!("/threads/{}/messages", thread_id)))
            .bearer_auth(self.bearer()?)
            .json(message)
            .send()
            .await?;
        Self::expect_success(resp).await?;
        Ok(())
    }

    async fn update_thread_metadata(
        &self,
        thread_id: &str,
        metadata: serde_json::Value,
    ) -> Result<(), RelayError> {
        let resp = self
            .http
            .put(self.url(&format!("/threads/{}", thread_id)))
            .bearer_auth(self.bearer()?)
            .json(&json!({ "metadata": metadata }))
            .send()
            .await?;
        Self::expect_success(resp).await?;
        Ok(())
    }

    async fn upsert_user(&self, user_id: &str, profile: &UserProfile) -> Result<(), RelayError> {
        let resp = self
            .http
            .put(self.url(&format!("/users/{}", user_id)))
            .bearer_auth(self.bearer()?)
            .json(profile)
            .send()
            .await?;
        Self::expect_success(resp).await?;
        Ok(())
    }

    async fn add_org_member(&self, org_id: &str, user_id: &str) -> Result<(), RelayError> {
        let resp = self
            .http
            .post(self.url(&format!("/organizations/{}/members", org_id)))
            .bearer_auth(self.bearer()?)
            .json(&json!({ "add": [user_id] }))
            .send()
            .await?;
        Self::expect_success(resp).await?;
        Ok(())
    }
}
