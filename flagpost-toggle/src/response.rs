//! Toggle response payloads.

use crate::error::ToggleError;
use crate::request::{Direction, ToggleAction};
use flagpost_core::{MutationOutcome, Rejection};
use serde::Serialize;

/// What a successful toggle request did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToggleData {
    pub action: &'static str,
    pub flag: String,
    pub direction: &'static str,
    /// `applied`, `unchanged` or `rejected`
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<Rejection>,
}

impl ToggleData {
    pub(crate) fn new(
        action: ToggleAction,
        flag: String,
        direction: Direction,
        outcome: MutationOutcome,
    ) -> Self {
        Self {
            action: action.as_str(),
            flag,
            direction: direction.as_str(),
            outcome: outcome.as_str(),
            reason: outcome.rejection(),
        }
    }
}

/// Failure payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToggleFailure {
    pub code: &'static str,
    pub message: String,
}

/// Structured toggle response.
///
/// ```json
/// {"success": true, "data": {"action": "toggle_feature", "flag": "f1", "direction": "on", "outcome": "applied"}}
/// {"success": false, "error": {"code": "missing_token", "message": "Request could not be authenticated"}}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToggleResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ToggleData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ToggleFailure>,
    #[serde(skip)]
    pub status: u16,
}

impl ToggleResponse {
    pub fn success(data: ToggleData) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            status: 200,
        }
    }

    pub fn failure(error: &ToggleError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ToggleFailure {
                code: error.code(),
                message: error.public_message(),
            }),
            status: error.status_code(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"success":false,"error":{"code":"internal","message":"response encoding failed"}}"#
                .to_string()
        })
    }
}

impl From<Result<ToggleData, ToggleError>> for ToggleResponse {
    fn from(result: Result<ToggleData, ToggleError>) -> Self {
        match result {
            Ok(data) => ToggleResponse::success(data),
            Err(error) => ToggleResponse::failure(&error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_payload() {
        let data = ToggleData::new(
            ToggleAction::Feature,
            "f1".to_string(),
            Direction::On,
            MutationOutcome::Applied,
        );
        let value: serde_json::Value =
            serde_json::from_str(&ToggleResponse::success(data).to_json()).unwrap();

        assert_eq!(
            value,
            json!({
                "success": true,
                "data": {"action": "toggle_feature", "flag": "f1", "direction": "on", "outcome": "applied"}
            })
        );
    }

    #[test]
    fn test_rejected_payload_carries_reason() {
        let data = ToggleData::new(
            ToggleAction::Preview,
            "f1".to_string(),
            Direction::On,
            MutationOutcome::Rejected(Rejection::AlreadyPublished),
        );
        let value = serde_json::to_value(ToggleResponse::success(data)).unwrap();

        assert_eq!(value["data"]["outcome"], "rejected");
        assert_eq!(value["data"]["reason"], "already_published");
    }

    #[test]
    fn test_failure_payload() {
        let response = ToggleResponse::failure(&ToggleError::Disabled);
        let value = serde_json::to_value(&response).unwrap();

        assert_eq!(response.status, 403);
        assert_eq!(value["success"], false);
        assert_eq!(value["error"]["code"], "disabled");
        assert!(value.get("data").is_none());
        assert!(value.get("status").is_none());
    }
}
