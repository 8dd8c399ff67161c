// Flagpost - feature flags declared in code
//
// Flags are registered at startup, then published for every viewer or
// previewed by individual users through an authenticated toggle endpoint.

mod bootstrap;

pub use bootstrap::{BootstrapError, Flagpost};

// Re-export core functionality
pub use flagpost_core::*;

// Re-export member crates
pub use flagpost_config;
pub use flagpost_core;
pub use flagpost_csrf;
pub use flagpost_log;
pub use flagpost_toggle;

/// Common imports for hosts.
pub mod prelude {
    pub use crate::bootstrap::{BootstrapError, Flagpost};
    pub use flagpost_config::{FlagpostConfig, StoreBackend, Validate};
    pub use flagpost_core::{
        Flag, FlagError, FlagMeta, FlagRegistry, FlagState, FlagStore, MutationOutcome,
        Rejection, UserId, Viewer, ViewerState,
    };
    pub use flagpost_toggle::{ToggleContext, ToggleRequest, ToggleResponse, ToggleService};
}
