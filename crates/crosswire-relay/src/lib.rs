pub mod chat_client;
pub mod compose;
pub mod config;
pub mod error;
pub mod relay;
pub mod resolver;
pub mod threads_client;
pub mod tokens;

pub use chat_client::{ChatApi, ChatClient, OauthAccess};
pub use config::RelayConfig;
pub use error::RelayError;
pub use relay::Relay;
pub use resolver::IdentityResolver;
pub use threads_client::{ThreadsApi, ThreadsClient};
pub use tokens::TokenIssuer;
