//! Feature flags for Flagpost
//!
//! Flags are declared in code, then published for everyone or previewed by
//! individual users. Persisted state lives behind the [`FlagStore`] trait.
//!
//! # Features
//!
//! - 🚩 **Flag catalog** - Register flags with groups, metadata and parents
//! - 🌍 **Publishing** - Turn a stable flag on for every viewer
//! - 👀 **Preview** - Let one user try a flag before it is published
//! - 🔒 **Enforced flags** - Flags switched on in code that cannot be toggled
//! - 💾 **Pluggable stores** - In-memory, JSON file, or Redis (`redis` feature)
//!
//! # Quick Start
//!
//! ```
//! use flagpost_core::*;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let registry = FlagRegistry::new(Arc::new(MemoryFlagStore::new()));
//!
//! registry.register(
//!     Flag::new("new-editor", "New editor", "Rebuilt block editor").stable(true),
//! )?;
//!
//! // Preview for one user
//! let alice = Viewer::from_user_id(1);
//! registry.set_preview_status("new-editor", true, alice).await?;
//!
//! let state = registry.load_viewer_state(alice).await;
//! assert!(registry.is_on("new-editor", &state)?);
//!
//! let state = registry.load_viewer_state(Viewer::Anonymous).await;
//! assert!(!registry.is_on("new-editor", &state)?);
//!
//! // Publish for everyone
//! let outcome = registry.set_publish_status("new-editor", true).await?;
//! assert_eq!(outcome, MutationOutcome::Applied);
//! # Ok::<(), FlagError>(())
//! # }).unwrap();
//! ```

pub mod error;
pub mod flag;
pub mod outcome;
pub mod registry;
pub mod store;
pub mod viewer;

pub use error::{FlagError, Result};
pub use flag::{DEFAULT_GROUP, Flag, FlagMeta, FlagState, MAX_KEY_LEN, validate_key};
pub use outcome::{MutationOutcome, Rejection};
pub use registry::{FlagRegistry, FlagSnapshot, FlagView, RegistryOptions, ViewerState};
pub use store::{FileFlagStore, FlagSet, FlagStore, MemoryFlagStore, StoreError, Versioned};
pub use viewer::{UserId, Viewer};

#[cfg(feature = "redis")]
pub use store::RedisFlagStore;
