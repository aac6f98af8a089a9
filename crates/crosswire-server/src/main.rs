use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crosswire_api::{AppStateInner, connect, share, tokens, webhooks};
use crosswire_relay::{ChatClient, Relay, RelayConfig, ThreadsClient, TokenIssuer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crosswire=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let config = Arc::new(RelayConfig::from_env()?);
    let db_path = std::env::var("CROSSWIRE_DB_PATH").unwrap_or_else(|_| "crosswire.db".into());
    let host = std::env::var("CROSSWIRE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("CROSSWIRE_PORT")
        .unwrap_or_else(|_| "3001".into())
        .parse()?;

    // Init database
    let db = Arc::new(crosswire_db::Database::open(&PathBuf::from(&db_path))?);

    // Relay with live platform clients
    let threads = ThreadsClient::new(config.clone())?;
    let chat = ChatClient::new(db.clone(), config.clone())?;
    let relay = Relay::new(db.clone(), threads, chat, config.clone());
    let issuer = TokenIssuer::new(config.clone());

    let state = Arc::new(AppStateInner {
        db,
        relay,
        issuer,
        config,
    });

    // Routes
    let app = Router::new()
        .route("/user-token", get(tokens::user_token))
        .route("/auth", get(connect::auth_redirect))
        .route("/chat/client-id", get(connect::chat_client_id))
        .route("/chat/channels", get(connect::list_channels))
        .route("/share", post(share::share_thread))
        .route("/webhooks/threads", post(webhooks::threads_webhook))
        .route("/webhooks/chat", post(webhooks::chat_webhook))
        .route("/integration/remove", post(connect::remove_integration))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Crosswire server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
