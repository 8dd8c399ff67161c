//! Flag descriptors and state resolution.
//!
//! A [`Flag`] never looks up state on its own: every query takes the
//! published and preview sets it should be resolved against. Resolution
//! follows a fixed precedence, highest first:
//!
//! 1. unstable flags are off
//! 2. enforced flags are on
//! 3. published flags are on
//! 4. flags previewed by the viewer are on
//! 5. everything else is off

use crate::error::FlagError;
use crate::outcome::Rejection;
use crate::store::FlagSet;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Group a flag belongs to when none is given.
pub const DEFAULT_GROUP: &str = "All";

/// Longest accepted flag key, in bytes.
pub const MAX_KEY_LEN: usize = 191;

/// Check that `key` is a usable flag identifier: non-empty, at most
/// [`MAX_KEY_LEN`] bytes, ASCII letters, digits, `-`, `_`, `.` or `:`.
pub fn validate_key(key: &str) -> Result<(), FlagError> {
    let invalid = |reason| FlagError::InvalidKey {
        key: key.to_string(),
        reason,
    };

    if key.is_empty() {
        return Err(invalid("key is empty"));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(invalid("key is too long"));
    }
    if !key
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b':'))
    {
        return Err(invalid("key contains unsupported characters"));
    }

    Ok(())
}

/// One informational label/value pair shown next to a flag, such as a
/// ticket reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagMeta {
    pub label: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl FlagMeta {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
            link: None,
        }
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    fn is_complete(&self) -> bool {
        !self.label.trim().is_empty() && !self.value.trim().is_empty()
    }
}

impl fmt::Display for FlagMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.label, self.value)
    }
}

/// Resolved state of a flag for one viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagState {
    Off,
    Enforced,
    Published,
    Preview,
}

impl FlagState {
    pub fn is_on(self) -> bool {
        self != FlagState::Off
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FlagState::Off => "off",
            FlagState::Enforced => "enforced",
            FlagState::Published => "published",
            FlagState::Preview => "preview",
        }
    }
}

/// Feature flag descriptor.
///
/// # Examples
///
/// ```
/// use flagpost_core::{Flag, FlagMeta};
///
/// let flag = Flag::new("new-checkout", "New checkout", "Rebuilt checkout flow")
///     .with_group("Shop")
///     .with_meta(FlagMeta::new("Ticket", "SHOP-12"))
///     .stable(true);
///
/// assert!(flag.can_be_published());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flag {
    pub key: String,
    pub name: String,
    pub description: String,

    #[serde(default)]
    pub meta: Vec<FlagMeta>,

    #[serde(default = "default_group")]
    pub group: String,

    /// Always on; cannot be published, unpublished or previewed
    #[serde(default)]
    pub enforced: bool,

    /// Only stable flags can be published or previewed
    #[serde(default)]
    pub stable: bool,

    /// Key of a parent flag. Recorded for display only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

fn default_group() -> String {
    DEFAULT_GROUP.to_string()
}

impl Flag {
    /// Create an unstable, non-enforced flag in the default group.
    pub fn new(
        key: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            description: description.into(),
            meta: Vec::new(),
            group: default_group(),
            enforced: false,
            stable: false,
            parent: None,
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn with_meta(mut self, meta: FlagMeta) -> Self {
        self.meta.push(meta);
        self
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn stable(mut self, stable: bool) -> Self {
        self.stable = stable;
        self
    }

    pub fn enforced(mut self, enforced: bool) -> Self {
        self.enforced = enforced;
        self
    }

    /// Validate the key and fill defaults for blank optional fields.
    pub(crate) fn normalize(mut self) -> Result<Self, FlagError> {
        validate_key(&self.key)?;

        if self.group.trim().is_empty() {
            self.group = default_group();
        }
        self.meta.retain(FlagMeta::is_complete);
        if self.parent.as_deref().is_some_and(|p| p.trim().is_empty()) {
            self.parent = None;
        }

        Ok(self)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn has_parent(&self) -> bool {
        self.parent.is_some()
    }

    pub fn is_stable(&self) -> bool {
        self.stable
    }

    pub fn is_enforced(&self) -> bool {
        self.enforced
    }

    /// Why the publish mechanism does not apply to this flag, if it doesn't.
    pub fn publish_blocker(&self) -> Option<Rejection> {
        if !self.stable {
            Some(Rejection::Unstable)
        } else if self.enforced {
            Some(Rejection::Enforced)
        } else {
            None
        }
    }

    /// Whether publish and preview toggles apply to this flag.
    pub fn can_be_published(&self) -> bool {
        self.publish_blocker().is_none()
    }

    pub fn is_published(&self, published: &FlagSet) -> bool {
        if !self.stable {
            return false;
        }
        if self.enforced {
            return true;
        }
        published.contains(&self.key)
    }

    pub fn in_preview_state(&self, published: &FlagSet, preview: &FlagSet) -> bool {
        if !self.can_be_published() {
            return false;
        }
        // A published flag cannot also be in preview.
        if self.is_published(published) {
            return false;
        }
        preview.contains(&self.key)
    }

    pub fn state(&self, published: &FlagSet, preview: &FlagSet) -> FlagState {
        if !self.stable {
            FlagState::Off
        } else if self.enforced {
            FlagState::Enforced
        } else if self.is_published(published) {
            FlagState::Published
        } else if self.in_preview_state(published, preview) {
            FlagState::Preview
        } else {
            FlagState::Off
        }
    }

    pub fn is_on(&self, published: &FlagSet, preview: &FlagSet) -> bool {
        self.state(published, preview).is_on()
    }
}
