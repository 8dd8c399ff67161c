//! Results of publish and preview mutations.

use serde::Serialize;
use std::fmt;

/// Why a mutation was refused by flag policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    /// Unstable flags cannot be published or previewed.
    Unstable,
    /// Enforced flags are on by definition and cannot be toggled.
    Enforced,
    /// Published flags cannot be previewed.
    AlreadyPublished,
    /// Only authenticated viewers have a preview set.
    AnonymousViewer,
}

impl Rejection {
    pub fn as_str(self) -> &'static str {
        match self {
            Rejection::Unstable => "unstable",
            Rejection::Enforced => "enforced",
            Rejection::AlreadyPublished => "already_published",
            Rejection::AnonymousViewer => "anonymous_viewer",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a mutation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationOutcome {
    /// State changed and was persisted.
    Applied,
    /// The flag was already in the requested state.
    Unchanged,
    /// Flag policy does not allow the change.
    Rejected(Rejection),
}

impl MutationOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, MutationOutcome::Applied)
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, MutationOutcome::Rejected(_))
    }

    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            MutationOutcome::Rejected(reason) => Some(*reason),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MutationOutcome::Applied => "applied",
            MutationOutcome::Unchanged => "unchanged",
            MutationOutcome::Rejected(_) => "rejected",
        }
    }
}

impl fmt::Display for MutationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationOutcome::Rejected(reason) => write!(f, "rejected ({})", reason),
            other => f.write_str(other.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_display() {
        assert_eq!(MutationOutcome::Applied.to_string(), "applied");
        assert_eq!(
            MutationOutcome::Rejected(Rejection::AlreadyPublished).to_string(),
            "rejected (already_published)"
        );
    }

    #[test]
    fn test_rejection_accessor() {
        let outcome = MutationOutcome::Rejected(Rejection::Enforced);
        assert!(outcome.is_rejected());
        assert_eq!(outcome.rejection(), Some(Rejection::Enforced));
        assert_eq!(MutationOutcome::Unchanged.rejection(), None);
    }
}
