use crate::{config::CsrfConfig, error::CsrfError, error::Result, token::CsrfToken};
use flagpost_log::debug;
use std::sync::Arc;

/// Issues and checks session-bound tokens for one action.
#[derive(Clone)]
pub struct CsrfGuard {
    config: Arc<CsrfConfig>,
}

impl CsrfGuard {
    pub fn new(config: CsrfConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &CsrfConfig {
        &self.config
    }

    /// Issue an encoded token bound to `session_id`, ready to embed in a form.
    pub fn issue(&self, session_id: &str) -> Result<String> {
        let token = CsrfToken::generate_with_session(
            self.config.action.clone(),
            self.config.token_ttl,
            session_id,
        );
        token.encode(&self.config.secret)
    }

    /// Check a submitted token against the session it must belong to.
    pub fn verify(&self, submitted: Option<&str>, session_id: &str) -> Result<CsrfToken> {
        let submitted = submitted
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(CsrfError::MissingToken)?;

        let token = CsrfToken::decode(submitted, &self.config.secret).map_err(|e| {
            debug!(target: "flagpost::csrf", "token rejected: {}", e);
            match e {
                CsrfError::TokenExpired => CsrfError::TokenExpired,
                _ => CsrfError::InvalidToken,
            }
        })?;

        if token.action != self.config.action {
            debug!(target: "flagpost::csrf", "token issued for action '{}'", token.action);
            return Err(CsrfError::ActionMismatch);
        }
        if !token.belongs_to(session_id) {
            return Err(CsrfError::SessionMismatch);
        }

        Ok(token)
    }
}
