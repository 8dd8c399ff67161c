use thiserror::Error;

#[derive(Error, Debug)]
pub enum CsrfError {
    #[error("Invalid CSRF token")]
    InvalidToken,

    #[error("Missing CSRF token")]
    MissingToken,

    #[error("CSRF token expired")]
    TokenExpired,

    #[error("CSRF token was issued for another session")]
    SessionMismatch,

    #[error("CSRF token was issued for another action")]
    ActionMismatch,

    #[error("Invalid CSRF configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Base64 decode error: {0}")]
    Base64Error(#[from] base64::DecodeError),
}

impl CsrfError {
    /// Stable identifier for responses and logs.
    pub fn code(&self) -> &'static str {
        match self {
            CsrfError::MissingToken => "missing_token",
            CsrfError::TokenExpired => "token_expired",
            CsrfError::InvalidConfig(_) => "invalid_config",
            _ => "invalid_token",
        }
    }
}

pub type Result<T> = std::result::Result<T, CsrfError>;
