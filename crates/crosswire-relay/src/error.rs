use thiserror::Error;

/// Failure taxonomy for relay operations.
///
/// `Auth` and `Config` failures are terminal for the request that hit them.
/// `Upstream` failures abort the current relay step only; steps that already
/// completed are not rolled back.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("webhook authentication failed: {0}")]
    Auth(#[from] crosswire_verify::VerifyError),

    #[error("missing configuration: {0}")]
    Config(&'static str),

    #[error("{service} API call failed ({status}): {detail}")]
    Upstream {
        service: &'static str,
        status: u16,
        detail: String,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("token encoding failed: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}
