//! Toggle endpoint errors.

use flagpost_core::{FlagError, StoreError};
use flagpost_csrf::CsrfError;
use thiserror::Error;

/// Result type for toggle handling.
pub type Result<T> = std::result::Result<T, ToggleError>;

/// Why a toggle request failed.
///
/// Every variant maps to a stable [`code`](ToggleError::code) used in the
/// failure payload. None of them carries flag state.
#[derive(Debug, Error)]
pub enum ToggleError {
    /// Toggling is switched off in configuration.
    #[error("Flag toggling is disabled")]
    Disabled,

    /// The request is malformed.
    #[error("Invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    /// The anti-forgery token is missing, expired, forged or for another
    /// session.
    #[error("Request could not be authenticated: {0}")]
    Authentication(#[from] CsrfError),

    /// A preview toggle came from an anonymous viewer.
    #[error("Previewing flags requires a signed-in user")]
    AuthenticationRequired,

    #[error("Unknown flag: {0}")]
    UnknownFlag(String),

    /// The service could not be built from its configuration.
    #[error("Invalid toggle configuration: {0}")]
    Configuration(String),

    /// The store failed on every attempt.
    #[error("Flag store unavailable after {attempts} attempt(s): {source}")]
    StoreUnavailable {
        #[source]
        source: StoreError,
        attempts: u32,
    },
}

impl ToggleError {
    pub(crate) fn validation(field: &'static str, message: impl Into<String>) -> Self {
        ToggleError::Validation {
            field,
            message: message.into(),
        }
    }

    pub(crate) fn from_flag_error(error: FlagError, attempts: u32) -> Self {
        match error {
            FlagError::UnknownFlag(key) => ToggleError::UnknownFlag(key),
            FlagError::InvalidKey { reason, .. } => ToggleError::validation("flag_key", reason),
            FlagError::StoreUnavailable(source) => {
                ToggleError::StoreUnavailable { source, attempts }
            }
        }
    }

    /// Stable identifier for the failure payload.
    pub fn code(&self) -> &'static str {
        match self {
            ToggleError::Disabled => "disabled",
            ToggleError::Validation { .. } => "invalid_request",
            ToggleError::Authentication(e) => e.code(),
            ToggleError::AuthenticationRequired => "authentication_required",
            ToggleError::UnknownFlag(_) => "unknown_flag",
            ToggleError::Configuration(_) => "configuration",
            ToggleError::StoreUnavailable { .. } => "store_unavailable",
        }
    }

    /// HTTP status a web adapter should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            ToggleError::Validation { .. } => 400,
            ToggleError::AuthenticationRequired => 401,
            ToggleError::Authentication(_) | ToggleError::Disabled => 403,
            ToggleError::UnknownFlag(_) => 404,
            ToggleError::Configuration(_) => 500,
            ToggleError::StoreUnavailable { .. } => 503,
        }
    }

    /// Message safe to show to the caller.
    pub fn public_message(&self) -> String {
        match self {
            ToggleError::Authentication(_) => "Request could not be authenticated".to_string(),
            ToggleError::StoreUnavailable { .. } => {
                "Flag state is temporarily unavailable, try again later".to_string()
            }
            other => other.to_string(),
        }
    }
}
