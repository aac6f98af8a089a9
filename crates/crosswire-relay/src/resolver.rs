use std::sync::Arc;

use tracing::info;

use crosswire_db::Database;
use crosswire_types::threads::UserProfile;

use crate::chat_client::ChatApi;
use crate::error::RelayError;
use crate::threads_client::ThreadsApi;

/// Maps an author identity between the two platforms, creating a shadow
/// identity on demand for chat-side authors with no threads counterpart.
pub struct IdentityResolver {
    db: Arc<Database>,
}

impl IdentityResolver {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn chat_id_for(&self, threads_id: &str) -> Result<Option<String>, RelayError> {
        Ok(self.db.chat_id_for_threads_id(threads_id)?)
    }

    pub fn threads_id_for(&self, chat_id: &str) -> Result<Option<String>, RelayError> {
        Ok(self.db.threads_id_for_chat_id(chat_id)?)
    }

    pub fn display_name(&self, threads_id: &str) -> Result<Option<String>, RelayError> {
        Ok(self
            .db
            .identity_by_threads_id(threads_id)?
            .map(|row| row.display_name))
    }

    /// Resolve a chat-side author to a threads-platform user id, creating a
    /// shadow identity if none exists.
    ///
    /// Creation fetches the author's chat profile, mirrors it into a
    /// threads-platform user keyed by the chat id, adds that user to the
    /// shared org, and only then persists the mapping. If the org add fails
    /// after the user was created, the remote account is left orphaned and
    /// harmless; the mapping is not recorded and the event that triggered
    /// creation fails.
    pub async fn ensure_threads_author<T: ThreadsApi, C: ChatApi>(
        &self,
        threads: &T,
        chat: &C,
        org_id: &str,
        chat_user_id: &str,
    ) -> Result<String, RelayError> {
        if let Some(threads_id) = self.db.threads_id_for_chat_id(chat_user_id)? {
            return Ok(threads_id);
        }

        let profile = chat.user_info(chat_user_id).await?.profile.unwrap_or_default();
        let display_name = profile
            .display_name
            .unwrap_or_else(|| chat_user_id.to_string());

        threads
            .upsert_user(
                chat_user_id,
                &UserProfile {
                    name: Some(display_name.clone()),
                    email: profile.email.clone(),
                    profile_picture_url: profile.image_192.clone(),
                },
            )
            .await?;
        threads.add_org_member(org_id, chat_user_id).await?;

        // The chat id doubles as the threads id from here on, so future
        // events from this author resolve without another creation round.
        self.db.insert_shadow_identity(
            chat_user_id,
            &display_name,
            profile.email.as_deref().unwrap_or(""),
            profile.image_192.as_deref(),
        )?;

        info!(chat_user_id, "created shadow identity for chat-side author");
        Ok(chat_user_id.to_string())
    }
}
