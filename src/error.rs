use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Google client secret is not configured (set GOOGLE_CLIENT_SECRET)")]
    SecretMissing,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

pub type Result<T> = std::result::Result<T, RelayError>;
