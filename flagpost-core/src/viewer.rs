//! Who is looking at a flag.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an authenticated user. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct UserId(u64);

impl UserId {
    /// Returns `None` for `0`, the id hosts use for "not logged in".
    pub fn new(id: u64) -> Option<Self> {
        (id != 0).then_some(Self(id))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u64> for UserId {
    type Error = &'static str;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        UserId::new(value).ok_or("user id must be non-zero")
    }
}

impl From<UserId> for u64 {
    fn from(id: UserId) -> Self {
        id.0
    }
}

/// The viewer a flag is resolved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Viewer {
    #[default]
    Anonymous,
    User(UserId),
}

impl Viewer {
    /// Build a viewer from a host user id where `0` means anonymous.
    pub fn from_user_id(id: u64) -> Self {
        UserId::new(id).map_or(Viewer::Anonymous, Viewer::User)
    }

    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Viewer::User(id) => Some(*id),
            Viewer::Anonymous => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id().is_some()
    }
}

impl From<UserId> for Viewer {
    fn from(id: UserId) -> Self {
        Viewer::User(id)
    }
}
