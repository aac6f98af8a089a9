use serde::{Deserialize, Serialize};

/// Webhook envelope delivered by the threads platform.
///
/// The platform sends a JSON body with a `type` discriminator. We only act on
/// `thread-message-added`; anything else falls into `Unknown` and is logged
/// and dropped rather than treated as a dispatch failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ThreadsWebhook {
    #[serde(rename = "thread-message-added")]
    ThreadMessageAdded { event: ThreadMessageAdded },

    #[serde(other)]
    Unknown,
}

/// Payload of a `thread-message-added` webhook event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadMessageAdded {
    pub thread: ThreadRef,
    pub author: UserRef,
    pub plaintext: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub metadata: MessageMetadata,
    #[serde(default)]
    pub users_to_notify: Vec<UserToNotify>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRef {
    pub id: String,
    pub name: String,
}

/// Metadata attached to a thread message. `mirrored_from_ts` is the
/// provenance marker: it is set on messages we post into the threads platform
/// on behalf of a chat-platform author, so the webhook echo for that very
/// message can be recognized and dropped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mirrored_from_ts: Option<String>,
}

/// A recipient the threads platform says should be notified, tagged with the
/// reasons why.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserToNotify {
    pub id: String,
    #[serde(default)]
    pub reply_actions: Option<Vec<NotifyReason>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotifyReason {
    Mention,
    CreateThread,
    #[serde(other)]
    Other,
}

/// Webhook envelope delivered by the chat platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatWebhook {
    /// Endpoint setup handshake: must be answered by echoing the challenge.
    UrlVerification { challenge: String },

    EventCallback { event: ChatEvent },

    #[serde(other)]
    Unknown,
}

/// Inner event of an `event_callback` envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    Message {
        channel: String,
        /// Author id. Absent for some message subtypes (e.g. channel joins).
        #[serde(default)]
        user: Option<String>,
        #[serde(default)]
        text: Option<String>,
        /// The message's own timestamp, which doubles as its id.
        ts: String,
        /// Set when the message is a reply inside a thread; equals the root
        /// message's ts. Top-level channel messages carry no thread_ts and
        /// can never belong to a shared thread.
        #[serde(default)]
        thread_ts: Option<String>,
    },

    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threads_webhook_parses_message_added() {
        let body = serde_json::json!({
            "type": "thread-message-added",
            "event": {
                "thread": { "id": "t1", "name": "Launch plan" },
                "author": { "id": "u1", "name": "Sam" },
                "plaintext": "hello",
                "url": "https://app.example.com/t1",
                "metadata": {},
                "usersToNotify": [
                    { "id": "u2", "replyActions": ["mention"] }
                ]
            }
        });

        let parsed: ThreadsWebhook = serde_json::from_value(body).unwrap();
        match parsed {
            ThreadsWebhook::ThreadMessageAdded { event } => {
                assert_eq!(event.thread.id, "t1");
                assert_eq!(
                    event.users_to_notify[0].reply_actions.as_deref(),
                    Some(&[NotifyReason::Mention][..])
                );
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn unknown_threads_event_type_is_tolerated() {
        let parsed: ThreadsWebhook =
            serde_json::from_str(r#"{"type":"thread-message-updated"}"#).unwrap();
        assert!(matches!(parsed, ThreadsWebhook::Unknown));
    }

    #[test]
    fn unknown_notify_reason_is_tolerated() {
        let user: UserToNotify =
            serde_json::from_str(r#"{"id":"u9","replyActions":["some-new-reason"]}"#).unwrap();
        assert_eq!(user.reply_actions.as_deref(), Some(&[NotifyReason::Other][..]));
    }

    #[test]
    fn chat_webhook_parses_challenge_and_message() {
        let parsed: ChatWebhook =
            serde_json::from_str(r#"{"type":"url_verification","challenge":"abc"}"#).unwrap();
        assert!(matches!(parsed, ChatWebhook::UrlVerification { ref challenge } if challenge == "abc"));

        let body = serde_json::json!({
            "type": "event_callback",
            "event": {
                "type": "message",
                "channel": "C123",
                "user": "U456",
                "text": "a reply",
                "ts": "1700000000.000200",
                "thread_ts": "1700000000.000100"
            }
        });
        let parsed: ChatWebhook = serde_json::from_value(body).unwrap();
        match parsed {
            ChatWebhook::EventCallback { event: ChatEvent::Message { channel, thread_ts, .. } } => {
                assert_eq!(channel, "C123");
                assert_eq!(thread_ts.as_deref(), Some("1700000000.000100"));
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }
}
