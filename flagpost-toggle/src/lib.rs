//! Toggle endpoint for Flagpost
//!
//! Turns submitted toggle requests into registry mutations:
//!
//! - `toggle_feature` publishes or unpublishes a flag for every viewer
//! - `toggle_preview` starts or stops previewing a flag for the requesting user
//!
//! Every request must carry an anti-forgery token issued for the caller's
//! session by [`ToggleService::issue_token`]. Responses are structured JSON
//! payloads; see [`ToggleResponse`].

pub mod error;
pub mod request;
pub mod response;
pub mod retry;
pub mod service;

pub use error::{Result, ToggleError};
pub use request::{Direction, ToggleAction, ToggleContext, ToggleRequest, ValidatedToggle};
pub use response::{ToggleData, ToggleFailure, ToggleResponse};
pub use retry::{GaveUp, MAX_BACKOFF, RetryPolicy};
pub use service::ToggleService;
