use std::sync::Arc;

use serde_json::json;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crosswire_db::Database;
use crosswire_types::api::ShareResponse;
use crosswire_types::events::{
    ChatEvent, ChatWebhook, MessageMetadata, ThreadMessageAdded, ThreadsWebhook,
};
use crosswire_types::threads::{NewThreadMessage, paragraph};

use crate::chat_client::ChatApi;
use crate::compose;
use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::resolver::IdentityResolver;
use crate::threads_client::ThreadsApi;

/// The mirroring engine. Decides whether an inbound event should cross to
/// the other platform, and drives the outbound calls when it should.
///
/// Per shared conversation the relay knows two states: unlinked and linked.
/// Only [`Relay::share_thread`] moves a conversation to linked; webhooks never
/// create links, and nothing unlinks short of removing the integration.
pub struct Relay<T, C> {
    pub db: Arc<Database>,
    pub resolver: IdentityResolver,
    pub threads: T,
    pub chat: C,
    pub config: Arc<RelayConfig>,
}

impl<T: ThreadsApi, C: ChatApi> Relay<T, C> {
    pub fn new(db: Arc<Database>, threads: T, chat: C, config: Arc<RelayConfig>) -> Self {
        let resolver = IdentityResolver::new(db.clone());
        Self {
            db,
            resolver,
            threads,
            chat,
            config,
        }
    }

    /// Share an existing thread into a chat channel: post the first message
    /// as the thread root, record the link, then post the remaining messages
    /// as replies in their original order.
    pub async fn share_thread(
        &self,
        thread_id: &str,
        channel: &str,
    ) -> Result<ShareResponse, RelayError> {
        let messages = self.threads.fetch_thread_messages(thread_id).await?;
        let Some(first) = messages.first() else {
            return Err(RelayError::NotFound(format!(
                "no messages in thread {}",
                thread_id
            )));
        };

        let thread = self.threads.fetch_thread(thread_id).await?;

        // The bot must be in the channel to post; joining an already-joined
        // channel is harmless, so failures here are not fatal.
        if let Err(err) = self.chat.join_channel(channel).await {
            warn!(channel, %err, "could not join chat channel");
        }

        let author_name = self.author_name(&first.author_id)?;
        let root = compose::first_share_message(&author_name, first, &thread, channel);
        let ts = self.chat.post_message(&root).await?;

        // If this fails we are left with a posted-but-unlinked root message;
        // accepted, not auto-repaired.
        self.db.insert_link(thread_id, channel, &ts)?;
        info!(thread_id, channel, %ts, "thread linked to chat channel");

        for message in &messages[1..] {
            let author_name = self.author_name(&message.author_id)?;
            let reply =
                compose::reply_share_message(&author_name, &message.plaintext, channel, &ts);
            self.chat.post_message(&reply).await?;
        }

        // Annotation is for UI display only; the relay never reads it back.
        let annotation = json!({
            "sharedToChat": { "channel": channel, "ts": ts }
        });
        if let Err(err) = self
            .threads
            .update_thread_metadata(thread_id, annotation)
            .await
        {
            warn!(thread_id, %err, "could not annotate thread metadata");
        }

        Ok(ShareResponse {
            thread_id: thread_id.to_string(),
            channel: channel.to_string(),
            ts,
        })
    }

    /// Entry point for a verified threads-platform webhook.
    pub async fn handle_threads_webhook(&self, webhook: ThreadsWebhook) -> Result<(), RelayError> {
        match webhook {
            ThreadsWebhook::ThreadMessageAdded { event } => self.mirror_thread_message(event).await,
            ThreadsWebhook::Unknown => {
                debug!("ignoring unrecognized threads webhook type");
                Ok(())
            }
        }
    }

    async fn mirror_thread_message(&self, event: ThreadMessageAdded) -> Result<(), RelayError> {
        // Provenance check comes before everything else: a message that
        // arrived via a chat->threads mirror must not bounce back.
        if event.metadata.mirrored_from_ts.is_some() {
            debug!(
                thread_id = %event.thread.id,
                "not mirroring to chat: message originated there"
            );
            return Ok(());
        }

        if let Some(link) = self.db.link_for_thread(&event.thread.id)? {
            let author_name = self
                .resolver
                .display_name(&event.author.id)?
                .unwrap_or_else(|| event.author.name.clone());
            let reply = compose::reply_share_message(
                &author_name,
                &event.plaintext,
                &link.chat_channel,
                &link.chat_ts,
            );
            info!(thread_id = %event.thread.id, "mirroring thread message to chat");
            self.chat.post_message(&reply).await?;
        }

        // Notification fan-out runs whether or not the thread is linked.
        // Per-recipient failures are logged and do not stop the loop.
        for recipient in &event.users_to_notify {
            let chat_id = match self.resolver.chat_id_for(&recipient.id) {
                Ok(Some(chat_id)) => chat_id,
                // No chat identity for this recipient: skip, not an error.
                Ok(None) => continue,
                Err(err) => {
                    warn!(recipient = %recipient.id, %err, "identity lookup failed");
                    continue;
                }
            };

            let notification = compose::notification(&chat_id, &event, recipient);
            if let Err(err) = self.chat.post_message(&notification).await {
                error!(recipient = %recipient.id, %err, "could not deliver notification");
            }
        }

        Ok(())
    }

    /// Entry point for a verified chat-platform webhook. The url_verification
    /// handshake is answered at the HTTP layer and never reaches the relay.
    pub async fn handle_chat_webhook(&self, webhook: ChatWebhook) -> Result<(), RelayError> {
        let event = match webhook {
            ChatWebhook::EventCallback { event } => event,
            ChatWebhook::UrlVerification { .. } | ChatWebhook::Unknown => {
                debug!("ignoring non-event chat webhook");
                return Ok(());
            }
        };

        let ChatEvent::Message {
            channel,
            user,
            text,
            ts,
            thread_ts,
        } = event
        else {
            debug!("ignoring unrecognized chat event type");
            return Ok(());
        };

        let Some(user) = user else {
            // Authorless message subtypes (joins, topic changes) carry
            // nothing worth mirroring.
            return Ok(());
        };

        let Some(integration) = self.db.load_integration()? else {
            debug!("chat event received but no integration is connected");
            return Ok(());
        };

        // Provenance check first: our own bot's posts are mirrors, not
        // originals, and must not echo back into the thread.
        if user == integration.bot_user_id {
            debug!("not mirroring to threads: message originated there");
            return Ok(());
        }

        // Only replies inside a linked thread cross over.
        let Some(root_ts) = thread_ts else {
            return Ok(());
        };
        let Some(thread_id) = self.db.thread_for_chat_message(&channel, &root_ts)? else {
            return Ok(());
        };

        let Some(text) = text else {
            return Ok(());
        };

        let author_id = self
            .resolver
            .ensure_threads_author(&self.threads, &self.chat, &self.config.org_id, &user)
            .await?;

        let message = NewThreadMessage {
            id: Uuid::new_v4().to_string(),
            author_id,
            content: paragraph(&text),
            // Stamp the chat message's own ts so the threads webhook echo for
            // this post is recognized and dropped.
            metadata: MessageMetadata {
                mirrored_from_ts: Some(ts),
            },
        };

        info!(%thread_id, %channel, "mirroring chat message to threads");
        self.threads.post_thread_message(&thread_id, &message).await?;

        Ok(())
    }

    fn author_name(&self, threads_id: &str) -> Result<String, RelayError> {
        Ok(self
            .resolver
            .display_name(threads_id)?
            .unwrap_or_else(|| "A user".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use crosswire_types::chat::{Channel, ChatPostMessage, ChatUser, ChatUserProfile};
    use crosswire_types::events::{NotifyReason, ThreadRef, UserRef, UserToNotify};
    use crosswire_types::threads::{Thread, ThreadMessage, UserProfile};

    use crate::chat_client::OauthAccess;

    #[derive(Default)]
    struct MockThreads {
        messages: Vec<ThreadMessage>,
        posted: Mutex<Vec<(String, NewThreadMessage)>>,
        upserted_users: Mutex<Vec<String>>,
        org_adds: Mutex<Vec<(String, String)>>,
        metadata_updates: Mutex<Vec<(String, serde_json::Value)>>,
    }

    #[async_trait]
    impl ThreadsApi for MockThreads {
        async fn fetch_thread_messages(
            &self,
            _thread_id: &str,
        ) -> Result<Vec<ThreadMessage>, RelayError> {
            Ok(self.messages.clone())
        }

        async fn fetch_thread(&self, thread_id: &str) -> Result<Thread, RelayError> {
            Ok(Thread {
                id: thread_id.to_string(),
                name: "Launch plan".into(),
                url: Some("https://app.example.com/t1".into()),
            })
        }

        async fn post_thread_message(
            &self,
            thread_id: &str,
            message: &NewThreadMessage,
        ) -> Result<(), RelayError> {
            self.posted
                .lock()
                .unwrap()
                .push((thread_id.to_string(), message.clone()));
            Ok(())
        }

        async fn update_thread_metadata(
            &self,
            thread_id: &str,
            metadata: serde_json::Value,
        ) -> Result<(), RelayError> {
            self.metadata_updates
                .lock()
                .unwrap()
                .push((thread_id.to_string(), metadata));
            Ok(())
        }

        async fn upsert_user(
            &self,
            user_id: &str,
            _profile: &UserProfile,
        ) -> Result<(), RelayError> {
            self.upserted_users.lock().unwrap().push(user_id.to_string());
            Ok(())
        }

        async fn add_org_member(&self, org_id: &str, user_id: &str) -> Result<(), RelayError> {
            self.org_adds
                .lock()
                .unwrap()
                .push((org_id.to_string(), user_id.to_string()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockChat {
        posted: Mutex<Vec<ChatPostMessage>>,
        ts_counter: AtomicUsize,
    }

    #[async_trait]
    impl ChatApi for MockChat {
        async fn post_message(&self, message: &ChatPostMessage) -> Result<String, RelayError> {
            self.posted.lock().unwrap().push(message.clone());
            let n = self.ts_counter.fetch_add(1, Ordering::SeqCst);
            Ok(format!("1700.{:03}", n))
        }

        async fn join_channel(&self, _channel: &str) -> Result<(), RelayError> {
            Ok(())
        }

        async fn user_info(&self, user_id: &str) -> Result<ChatUser, RelayError> {
            Ok(ChatUser {
                id: user_id.to_string(),
                profile: Some(ChatUserProfile {
                    email: Some(format!("{}@chat.example.com", user_id.to_lowercase())),
                    display_name: Some("Chat Guest".into()),
                    image_192: None,
                }),
            })
        }

        async fn list_channels(&self) -> Result<Vec<Channel>, RelayError> {
            Ok(vec![])
        }

        async fn list_users(&self) -> Result<Vec<ChatUser>, RelayError> {
            Ok(vec![])
        }

        async fn oauth_access(&self, _code: &str) -> Result<OauthAccess, RelayError> {
            Err(RelayError::Config("not supported in tests"))
        }
    }

    fn test_config() -> Arc<RelayConfig> {
        Arc::new(RelayConfig {
            threads_app_id: "app-1".into(),
            threads_signing_secret: "test-secret".into(),
            threads_api_url: "https://threads.test".into(),
            chat_signing_secret: None,
            chat_client_id: None,
            chat_client_secret: None,
            chat_api_url: "https://chat.test".into(),
            org_id: "org-1".into(),
            org_name: "Test org".into(),
            frontend_host: "https://localhost:3000".into(),
        })
    }

    fn test_relay(threads: MockThreads) -> Relay<MockThreads, MockChat> {
        let db = Arc::new(Database::open_in_memory().unwrap());
        Relay::new(db, threads, MockChat::default(), test_config())
    }

    fn thread_message(id: &str, author: &str, text: &str) -> ThreadMessage {
        ThreadMessage {
            id: id.to_string(),
            author_id: author.to_string(),
            plaintext: text.to_string(),
            url: Some(format!("https://app.example.com/t1#{}", id)),
        }
    }

    fn message_added(
        thread_id: &str,
        origin_ts: Option<&str>,
        notify: Vec<UserToNotify>,
    ) -> ThreadsWebhook {
        ThreadsWebhook::ThreadMessageAdded {
            event: ThreadMessageAdded {
                thread: ThreadRef { id: thread_id.into(), name: "Launch plan".into() },
                author: UserRef { id: "maria".into(), name: "Maria".into() },
                plaintext: "ship it".into(),
                url: Some("https://app.example.com/t1".into()),
                metadata: MessageMetadata {
                    mirrored_from_ts: origin_ts.map(str::to_string),
                },
                users_to_notify: notify,
            },
        }
    }

    fn chat_message(channel: &str, user: &str, ts: &str, thread_ts: Option<&str>) -> ChatWebhook {
        ChatWebhook::EventCallback {
            event: ChatEvent::Message {
                channel: channel.into(),
                user: Some(user.into()),
                text: Some("a chat reply".into()),
                ts: ts.into(),
                thread_ts: thread_ts.map(str::to_string),
            },
        }
    }

    #[tokio::test]
    async fn share_posts_root_then_replies_in_original_order() {
        let relay = test_relay(MockThreads {
            messages: vec![
                thread_message("m0", "maria", "first"),
                thread_message("m1", "sam", "second"),
                thread_message("m2", "maria", "third"),
            ],
            ..Default::default()
        });

        let response = relay.share_thread("t1", "C1").await.unwrap();
        assert_eq!(response.ts, "1700.000");

        let posted = relay.chat.posted.lock().unwrap();
        assert_eq!(posted.len(), 3);

        assert_eq!(posted[0].channel, "C1");
        assert!(posted[0].thread_ts.is_none());
        assert!(posted[0].text.contains("Maria left a message"));

        // Replies land in order, all threaded under the root's ts.
        assert_eq!(posted[1].thread_ts.as_deref(), Some("1700.000"));
        assert_eq!(posted[2].thread_ts.as_deref(), Some("1700.000"));
        assert!(posted[1].text.starts_with("Sam"));
        assert!(posted[2].text.starts_with("Maria"));

        let link = relay.db.link_for_thread("t1").unwrap().unwrap();
        assert_eq!(link.chat_channel, "C1");
        assert_eq!(link.chat_ts, "1700.000");

        let updates = relay.threads.metadata_updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].1["sharedToChat"]["ts"], "1700.000");
    }

    #[tokio::test]
    async fn sharing_an_empty_thread_is_not_found() {
        let relay = test_relay(MockThreads::default());

        let err = relay.share_thread("t1", "C1").await.unwrap_err();
        assert!(matches!(err, RelayError::NotFound(_)));
        assert!(relay.chat.posted.lock().unwrap().is_empty());
        assert!(relay.db.link_for_thread("t1").unwrap().is_none());
    }

    #[tokio::test]
    async fn thread_event_with_origin_marker_is_never_mirrored() {
        let relay = test_relay(MockThreads::default());
        relay.db.insert_link("t1", "C1", "1700.000").unwrap();

        relay
            .handle_threads_webhook(message_added("t1", Some("1700.042"), vec![]))
            .await
            .unwrap();

        assert!(relay.chat.posted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn linked_thread_event_mirrors_and_notifies() {
        let relay = test_relay(MockThreads::default());
        relay.db.insert_link("t1", "C1", "1700.000").unwrap();
        relay.db.link_identity("sam", "B2").unwrap();

        let notify = vec![UserToNotify {
            id: "sam".into(),
            reply_actions: Some(vec![NotifyReason::Mention]),
        }];
        relay
            .handle_threads_webhook(message_added("t1", None, notify))
            .await
            .unwrap();

        let posted = relay.chat.posted.lock().unwrap();
        assert_eq!(posted.len(), 2);

        // The threaded mirror goes to the linked channel...
        assert_eq!(posted[0].channel, "C1");
        assert_eq!(posted[0].thread_ts.as_deref(), Some("1700.000"));

        // ...and the notification goes as a DM to the resolved chat id.
        assert_eq!(posted[1].channel, "B2");
        assert!(posted[1].thread_ts.is_none());
        assert_eq!(posted[1].text, "Maria mentioned you on Launch plan");
    }

    #[tokio::test]
    async fn unlinked_thread_event_notifies_without_mirroring() {
        let relay = test_relay(MockThreads::default());
        relay.db.link_identity("sam", "B2").unwrap();

        let notify = vec![
            UserToNotify {
                id: "sam".into(),
                reply_actions: Some(vec![NotifyReason::Mention]),
            },
            // No chat identity: silently skipped.
            UserToNotify { id: "tom".into(), reply_actions: None },
        ];
        relay
            .handle_threads_webhook(message_added("t1", None, notify))
            .await
            .unwrap();

        let posted = relay.chat.posted.lock().unwrap();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].channel, "B2");
        assert_eq!(posted[0].text, "Maria mentioned you on Launch plan");
    }

    #[tokio::test]
    async fn chat_event_from_the_bot_is_never_mirrored() {
        let relay = test_relay(MockThreads::default());
        relay.db.save_integration("xoxb-token", "UBOT").unwrap();
        relay.db.insert_link("t1", "C1", "1700.000").unwrap();

        relay
            .handle_chat_webhook(chat_message("C1", "UBOT", "1700.050", Some("1700.000")))
            .await
            .unwrap();

        assert!(relay.threads.posted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn chat_event_without_a_link_is_ignored() {
        let relay = test_relay(MockThreads::default());
        relay.db.save_integration("xoxb-token", "UBOT").unwrap();

        // Reply in an unshared thread.
        relay
            .handle_chat_webhook(chat_message("C1", "UGUEST", "1700.050", Some("1700.000")))
            .await
            .unwrap();

        // Top-level channel message, no thread_ts at all.
        relay
            .handle_chat_webhook(chat_message("C1", "UGUEST", "1700.060", None))
            .await
            .unwrap();

        assert!(relay.threads.posted.lock().unwrap().is_empty());
        assert!(relay.threads.upserted_users.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn chat_reply_is_mirrored_with_origin_marker_and_echo_is_dropped() {
        let relay = test_relay(MockThreads::default());
        relay.db.save_integration("xoxb-token", "UBOT").unwrap();
        relay.db.insert_link("t1", "C1", "1700.000").unwrap();
        relay.db.link_identity("maria", "UMARIA").unwrap();

        relay
            .handle_chat_webhook(chat_message("C1", "UMARIA", "1700.050", Some("1700.000")))
            .await
            .unwrap();

        let (thread_id, message) = {
            let posted = relay.threads.posted.lock().unwrap();
            assert_eq!(posted.len(), 1);
            posted[0].clone()
        };
        assert_eq!(thread_id, "t1");
        assert_eq!(message.author_id, "maria");
        assert_eq!(message.metadata.mirrored_from_ts.as_deref(), Some("1700.050"));

        // The threads platform now emits a message-added webhook for that
        // very post. Its origin marker must stop the loop.
        relay
            .handle_threads_webhook(message_added("t1", Some("1700.050"), vec![]))
            .await
            .unwrap();
        assert!(relay.chat.posted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn shadow_identity_is_created_exactly_once() {
        let relay = test_relay(MockThreads::default());
        relay.db.save_integration("xoxb-token", "UBOT").unwrap();
        relay.db.insert_link("t1", "C1", "1700.000").unwrap();

        for ts in ["1700.050", "1700.051"] {
            relay
                .handle_chat_webhook(chat_message("C1", "UGUEST", ts, Some("1700.000")))
                .await
                .unwrap();
        }

        // Two mirrored posts, but only one create-user and one org add.
        assert_eq!(relay.threads.posted.lock().unwrap().len(), 2);
        assert_eq!(
            *relay.threads.upserted_users.lock().unwrap(),
            vec!["UGUEST".to_string()]
        );
        assert_eq!(
            *relay.threads.org_adds.lock().unwrap(),
            vec![("org-1".to_string(), "UGUEST".to_string())]
        );

        // Both posts attribute the shadow identity.
        let posted = relay.threads.posted.lock().unwrap();
        assert!(posted.iter().all(|(_, message)| message.author_id == "UGUEST"));
    }
}
