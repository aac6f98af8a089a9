//! REST payloads for the chat platform (system B).

use serde::{Deserialize, Serialize};

/// Body for the chat platform's post-message call. Setting `thread_ts` makes
/// the message a threaded reply; setting `channel` to a user id sends a DM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatPostMessage {
    pub channel: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Section { text: TextObject },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextObject {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

impl TextObject {
    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self { kind: "mrkdwn".into(), text: text.into() }
    }
}

impl Block {
    pub fn section(text: impl Into<String>) -> Self {
        Block::Section { text: TextObject::mrkdwn(text) }
    }
}

/// Response envelope shared by the chat platform's API calls.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    /// Timestamp assigned to a posted message.
    #[serde(default)]
    pub ts: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OauthAccessResponse {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub bot_user_id: Option<String>,
    #[serde(default)]
    pub authed_user: Option<AuthedUser>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthedUser {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelListResponse {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub channels: Vec<Channel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserListResponse {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub members: Vec<ChatUser>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserInfoResponse {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub user: Option<ChatUser>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatUser {
    pub id: String,
    #[serde(default)]
    pub profile: Option<ChatUserProfile>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatUserProfile {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub image_192: Option<String>,
}
