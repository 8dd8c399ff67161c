use crate::error::{CsrfError, Result};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Anti-forgery token with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsrfToken {
    /// Random token value
    pub value: String,

    /// Action the token may be used for
    pub action: String,

    /// Token creation timestamp
    pub created_at: DateTime<Utc>,

    /// Token expiration timestamp
    pub expires_at: DateTime<Utc>,

    /// Session identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl CsrfToken {
    /// Generate a new token
    pub fn generate(action: impl Into<String>, ttl_seconds: i64) -> Self {
        let mut rng = rand::thread_rng();
        let random_bytes: [u8; 32] = rng.r#gen();
        let value = URL_SAFE_NO_PAD.encode(random_bytes);

        let created_at = Utc::now();
        let expires_at = created_at + Duration::seconds(ttl_seconds);

        Self {
            value,
            action: action.into(),
            created_at,
            expires_at,
            session_id: None,
        }
    }

    /// Generate a token with session binding
    pub fn generate_with_session(
        action: impl Into<String>,
        ttl_seconds: i64,
        session_id: impl Into<String>,
    ) -> Self {
        let mut token = Self::generate(action, ttl_seconds);
        token.session_id = Some(session_id.into());
        token
    }

    /// Check if token is expired
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Validate token
    pub fn validate(&self) -> Result<()> {
        if self.is_expired() {
            return Err(CsrfError::TokenExpired);
        }
        Ok(())
    }

    /// Whether the token was issued for `session_id`. Unbound tokens belong
    /// to no session.
    pub fn belongs_to(&self, session_id: &str) -> bool {
        self.session_id.as_deref() == Some(session_id)
    }

    /// Encode as `<payload>.<signature>`, both base64url. The signature is
    /// an HMAC-SHA256 over the encoded payload.
    pub fn encode(&self, secret: &[u8]) -> Result<String> {
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(self)?);
        let signature = URL_SAFE_NO_PAD.encode(Self::mac(&payload, secret)?.finalize().into_bytes());
        Ok(format!("{}.{}", payload, signature))
    }

    /// Verify the signature, then parse and check expiry.
    pub fn decode(encoded: &str, secret: &[u8]) -> Result<Self> {
        let (payload, signature) = encoded
            .trim()
            .split_once('.')
            .ok_or(CsrfError::InvalidToken)?;

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| CsrfError::InvalidToken)?;
        Self::mac(payload, secret)?
            .verify_slice(&signature)
            .map_err(|_| CsrfError::InvalidToken)?;

        let token: CsrfToken = serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload)?)?;
        token.validate()?;

        Ok(token)
    }

    /// HMAC-SHA256 over `data`
    fn mac(data: &str, secret: &[u8]) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(secret)
            .map_err(|e| CsrfError::InvalidConfig(e.to_string()))?;
        mac.update(data.as_bytes());
        Ok(mac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test_secret_key_32_bytes_long!!!";

    #[test]
    fn test_token_generation() {
        let token = CsrfToken::generate("toggle", 3600);
        assert!(!token.value.is_empty());
        assert_eq!(token.action, "toggle");
        assert!(!token.is_expired());
    }

    #[test]
    fn test_token_with_session() {
        let token = CsrfToken::generate_with_session("toggle", 3600, "session123");
        assert!(token.belongs_to("session123"));
        assert!(!token.belongs_to("session456"));
    }

    #[test]
    fn test_unbound_token_belongs_to_nobody() {
        let token = CsrfToken::generate("toggle", 3600);
        assert!(!token.belongs_to(""));
    }

    #[test]
    fn test_token_expiration() {
        let mut token = CsrfToken::generate("toggle", 0);
        token.expires_at = Utc::now() - Duration::seconds(1);
        assert!(token.is_expired());
        assert!(matches!(token.validate(), Err(CsrfError::TokenExpired)));
    }

    #[test]
    fn test_token_encode_decode() {
        let token = CsrfToken::generate_with_session("toggle", 3600, "s1");

        let encoded = token.encode(SECRET).unwrap();
        let decoded = CsrfToken::decode(&encoded, SECRET).unwrap();

        assert_eq!(token.value, decoded.value);
        assert_eq!(decoded.session_id.as_deref(), Some("s1"));
    }

    #[test]
    fn test_invalid_signature() {
        let token = CsrfToken::generate("toggle", 3600);
        let encoded = token.encode(SECRET).unwrap();

        let wrong_secret = b"wrong_secret_key_32_bytes_long!!";
        assert!(matches!(
            CsrfToken::decode(&encoded, wrong_secret),
            Err(CsrfError::InvalidToken)
        ));
    }

    #[test]
    fn test_expired_token_does_not_decode() {
        let mut token = CsrfToken::generate("toggle", 3600);
        token.expires_at = Utc::now() - Duration::seconds(1);
        let encoded = token.encode(SECRET).unwrap();

        assert!(matches!(
            CsrfToken::decode(&encoded, SECRET),
            Err(CsrfError::TokenExpired)
        ));
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let token = CsrfToken::generate_with_session("toggle", 3600, "s1");
        let encoded = token.encode(SECRET).unwrap();
        let (_, signature) = encoded.split_once('.').unwrap();

        let mut forged = token.clone();
        forged.session_id = Some("s2".to_string());
        let forged_payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged).unwrap());

        assert!(matches!(
            CsrfToken::decode(&format!("{}.{}", forged_payload, signature), SECRET),
            Err(CsrfError::InvalidToken)
        ));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(CsrfToken::decode("not a token", SECRET).is_err());
        assert!(CsrfToken::decode("", SECRET).is_err());
    }
}
