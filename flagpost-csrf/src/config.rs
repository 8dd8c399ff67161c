use crate::error::{CsrfError, Result};

/// Shortest accepted signing secret, in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Anti-forgery token configuration
#[derive(Debug, Clone)]
pub struct CsrfConfig {
    /// Secret key for token signing (at least [`MIN_SECRET_LEN`] bytes)
    pub secret: Vec<u8>,

    /// Token time-to-live in seconds
    pub token_ttl: i64,

    /// Action a token is scoped to. Tokens for other actions are refused.
    pub action: String,
}

impl CsrfConfig {
    /// Create a new configuration
    pub fn new(secret: Vec<u8>) -> Result<Self> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(CsrfError::InvalidConfig(format!(
                "secret key must be at least {} bytes",
                MIN_SECRET_LEN
            )));
        }

        Ok(Self::with_secret(secret))
    }

    fn with_secret(secret: Vec<u8>) -> Self {
        Self {
            secret,
            token_ttl: 86_400, // 1 day
            action: "flagpost_toggle".to_string(),
        }
    }

    /// Generate a secret key
    pub fn generate_secret() -> Vec<u8> {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        (0..MIN_SECRET_LEN).map(|_| rng.r#gen()).collect()
    }

    /// Set token TTL
    pub fn with_token_ttl(mut self, ttl_seconds: i64) -> Self {
        self.token_ttl = ttl_seconds;
        self
    }

    /// Set the action tokens are scoped to
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = action.into();
        self
    }
}

impl Default for CsrfConfig {
    /// Configuration with a freshly generated secret. Tokens do not survive a
    /// restart.
    fn default() -> Self {
        Self::with_secret(Self::generate_secret())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let secret = CsrfConfig::generate_secret();
        assert_eq!(secret.len(), 32);

        let config = CsrfConfig::new(secret).unwrap();
        assert_eq!(config.token_ttl, 86_400);
        assert_eq!(config.action, "flagpost_toggle");
    }

    #[test]
    fn test_config_builder() {
        let config = CsrfConfig::default()
            .with_token_ttl(600)
            .with_action("other");

        assert_eq!(config.token_ttl, 600);
        assert_eq!(config.action, "other");
    }

    #[test]
    fn test_invalid_secret_length() {
        let err = CsrfConfig::new(vec![1, 2, 3]).unwrap_err();
        assert!(matches!(err, CsrfError::InvalidConfig(_)));
    }
}
