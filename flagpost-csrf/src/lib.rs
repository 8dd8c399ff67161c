//! # Flagpost CSRF Protection
//!
//! Anti-forgery tokens for flag toggle requests.
//!
//! ## Features
//!
//! - ✅ **Signed Tokens** - HMAC-SHA256 signed tokens
//! - ✅ **Session Binding** - A token is only valid for the session it was issued to
//! - ✅ **Action Scoping** - A token is only valid for the action it was issued for
//! - ✅ **Expiry** - Tokens carry their own expiration time
//!
//! ## Quick Start
//!
//! ```rust
//! use flagpost_csrf::{CsrfConfig, CsrfGuard};
//!
//! let secret = CsrfConfig::generate_secret();
//! let config = CsrfConfig::new(secret).unwrap().with_token_ttl(3600);
//! let guard = CsrfGuard::new(config);
//!
//! let token = guard.issue("session-123").unwrap();
//! assert!(guard.verify(Some(&token), "session-123").is_ok());
//! assert!(guard.verify(Some(&token), "session-456").is_err());
//! ```
//!
//! ## Token Validation
//!
//! ```rust
//! use flagpost_csrf::CsrfToken;
//!
//! let token = CsrfToken::generate("flagpost_toggle", 3600);
//! assert!(token.validate().is_ok());
//!
//! let expired = CsrfToken::generate("flagpost_toggle", -1);
//! assert!(expired.is_expired());
//! assert!(expired.validate().is_err());
//! ```

pub mod config;
pub mod error;
pub mod guard;
pub mod token;

pub use config::CsrfConfig;
pub use error::{CsrfError, Result};
pub use guard::CsrfGuard;
pub use token::CsrfToken;
