pub mod connect;
pub mod share;
pub mod state;
pub mod tokens;
pub mod webhooks;

pub use state::{AppState, AppStateInner};
