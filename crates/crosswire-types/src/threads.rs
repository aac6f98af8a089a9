//! REST payloads for the threads platform (system A).

use serde::{Deserialize, Serialize};

/// One message fetched from a thread, ascending order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadMessage {
    pub id: String,
    #[serde(rename = "authorID")]
    pub author_id: String,
    pub plaintext: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// Supplementary thread info (name is used in the share wording).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// Body for posting a new message into a thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewThreadMessage {
    pub id: String,
    #[serde(rename = "authorID")]
    pub author_id: String,
    /// Structured message content; built with [`paragraph`].
    pub content: serde_json::Value,
    pub metadata: crate::events::MessageMetadata,
}

/// Profile fields for creating or updating a threads-platform user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, rename = "profilePictureURL")]
    pub profile_picture_url: Option<String>,
}

/// A single paragraph of message content in the platform's block format.
pub fn paragraph(text: &str) -> serde_json::Value {
    serde_json::json!([{ "type": "p", "children": [{ "text": text }] }])
}
