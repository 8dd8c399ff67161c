//! Toggle request decoding and validation.

use crate::error::{Result, ToggleError};
use flagpost_core::{Viewer, validate_key};
use serde::Deserialize;
use std::fmt;

/// Which mutation a request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleAction {
    /// Publish or unpublish for everyone
    Feature,
    /// Start or stop previewing for the requesting user
    Preview,
}

impl ToggleAction {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "toggle_feature" => Some(ToggleAction::Feature),
            "toggle_preview" => Some(ToggleAction::Preview),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ToggleAction::Feature => "toggle_feature",
            ToggleAction::Preview => "toggle_preview",
        }
    }
}

impl fmt::Display for ToggleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    On,
    Off,
}

impl Direction {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "on" => Some(Direction::On),
            "off" => Some(Direction::Off),
            _ => None,
        }
    }

    pub fn is_on(self) -> bool {
        self == Direction::On
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::On => "on",
            Direction::Off => "off",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A toggle request as submitted.
///
/// Fields are kept as raw strings until [`validate`](ToggleRequest::validate)
/// so that a malformed request can be reported precisely. The original form
/// field names `flag_direction` and `secret` are accepted as aliases.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ToggleRequest {
    pub action: String,
    pub flag_key: String,
    #[serde(alias = "flag_direction")]
    pub direction: String,
    #[serde(alias = "secret")]
    pub token: Option<String>,
}

impl ToggleRequest {
    pub fn new(
        action: impl Into<String>,
        flag_key: impl Into<String>,
        direction: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            action: action.into(),
            flag_key: flag_key.into(),
            direction: direction.into(),
            token: Some(token.into()),
        }
    }

    /// Decode an `application/x-www-form-urlencoded` body.
    pub fn from_form(body: &str) -> Result<Self> {
        serde_urlencoded::from_str(body).map_err(|e| ToggleError::validation("body", e.to_string()))
    }

    /// Decode a JSON body.
    pub fn from_json(body: &str) -> Result<Self> {
        serde_json::from_str(body).map_err(|e| ToggleError::validation("body", e.to_string()))
    }

    /// Parse action, flag key and direction. The token is checked separately.
    pub fn validate(&self) -> Result<ValidatedToggle> {
        let action = ToggleAction::parse(self.action.trim()).ok_or_else(|| {
            ToggleError::validation("action", format!("unsupported action '{}'", self.action))
        })?;

        let direction = Direction::parse(self.direction.trim()).ok_or_else(|| {
            ToggleError::validation("direction", "expected 'on' or 'off'")
        })?;

        let flag_key = self.flag_key.trim();
        validate_key(flag_key).map_err(|e| match e {
            flagpost_core::FlagError::InvalidKey { reason, .. } => {
                ToggleError::validation("flag_key", reason)
            }
            other => ToggleError::validation("flag_key", other.to_string()),
        })?;

        Ok(ValidatedToggle {
            action,
            flag_key: flag_key.to_string(),
            direction,
        })
    }
}

/// A request that passed syntactic validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedToggle {
    pub action: ToggleAction,
    pub flag_key: String,
    pub direction: Direction,
}

/// Who is asking, as established by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToggleContext {
    pub session_id: String,
    pub viewer: Viewer,
}

impl ToggleContext {
    pub fn new(session_id: impl Into<String>, viewer: Viewer) -> Self {
        Self {
            session_id: session_id.into(),
            viewer,
        }
    }
}
