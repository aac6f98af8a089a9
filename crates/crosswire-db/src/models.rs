/// A shared conversation: one thread on the threads platform linked to one
/// threaded message on the chat platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadLinkRow {
    pub thread_id: String,
    pub chat_channel: String,
    pub chat_ts: String,
}

#[derive(Debug, Clone)]
pub struct IdentityRow {
    pub threads_id: String,
    pub chat_id: Option<String>,
    pub display_name: String,
    pub email: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct IntegrationRow {
    pub bot_token: String,
    pub bot_user_id: String,
}
