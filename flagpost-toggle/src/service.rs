//! The toggle endpoint.

use crate::error::{Result, ToggleError};
use crate::request::{ToggleAction, ToggleContext, ToggleRequest};
use crate::response::{ToggleData, ToggleResponse};
use crate::retry::RetryPolicy;
use flagpost_config::FlagpostConfig;
use flagpost_core::FlagRegistry;
use flagpost_csrf::{CsrfConfig, CsrfGuard};
use flagpost_log::{debug, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

const LOG_TARGET: &str = "flagpost::toggle";

/// Authenticates toggle requests and applies them to a [`FlagRegistry`].
///
/// Checks run in a fixed order and stop at the first failure: the enable
/// switch, the anti-forgery token, then action, direction and flag key.
/// Nothing reaches the registry unless all of them pass. Store failures are
/// retried with backoff; validation and authentication failures never are.
///
/// # Examples
///
/// ```
/// use flagpost_core::{Flag, FlagRegistry, MemoryFlagStore, Viewer};
/// use flagpost_csrf::{CsrfConfig, CsrfGuard};
/// use flagpost_toggle::{ToggleContext, ToggleRequest, ToggleService};
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let registry = Arc::new(FlagRegistry::new(Arc::new(MemoryFlagStore::new())));
/// registry.register(Flag::new("f1", "Flag one", "").stable(true)).unwrap();
///
/// let service = ToggleService::new(registry, CsrfGuard::new(CsrfConfig::default()));
/// let context = ToggleContext::new("session-1", Viewer::from_user_id(7));
///
/// let token = service.issue_token("session-1").unwrap();
/// let request = ToggleRequest::new("toggle_feature", "f1", "on", token);
///
/// let response = service.respond(&request, &context).await;
/// assert!(response.success);
/// # });
/// ```
pub struct ToggleService {
    registry: Arc<FlagRegistry>,
    guard: CsrfGuard,
    retry: RetryPolicy,
    enabled: AtomicBool,
}

impl ToggleService {
    pub fn new(registry: Arc<FlagRegistry>, guard: CsrfGuard) -> Self {
        Self {
            registry,
            guard,
            retry: RetryPolicy::default(),
            enabled: AtomicBool::new(true),
        }
    }

    /// Build from loaded configuration: token secret and TTL, retry policy
    /// and the enable switch.
    pub fn from_config(registry: Arc<FlagRegistry>, config: &FlagpostConfig) -> Result<Self> {
        let csrf = match &config.csrf.secret {
            Some(secret) => CsrfConfig::new(secret.as_bytes().to_vec())
                .map_err(|e| ToggleError::Configuration(e.to_string()))?,
            None => {
                warn!(
                    target: LOG_TARGET,
                    "no csrf secret configured, issued tokens will not survive a restart"
                );
                CsrfConfig::default()
            }
        }
        .with_token_ttl(config.csrf.token_ttl_secs);

        let service = Self::new(registry, CsrfGuard::new(csrf))
            .with_retry(RetryPolicy::from_settings(&config.toggle));
        service.set_enabled(config.enabled);
        Ok(service)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn registry(&self) -> &Arc<FlagRegistry> {
        &self.registry
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Switch toggling on or off at runtime. Queries are unaffected.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Issue an anti-forgery token for `session_id` to embed in the toggle
    /// UI. The token is valid for every flag and both actions.
    pub fn issue_token(&self, session_id: &str) -> Result<String> {
        Ok(self.guard.issue(session_id)?)
    }

    /// Authenticate, validate and apply one toggle request.
    pub async fn handle(&self, request: &ToggleRequest, context: &ToggleContext) -> Result<ToggleData> {
        if !self.is_enabled() {
            return Err(ToggleError::Disabled);
        }

        if let Err(e) = self
            .guard
            .verify(request.token.as_deref(), &context.session_id)
        {
            debug!(target: LOG_TARGET, "refused unauthenticated toggle: {}", e);
            return Err(e.into());
        }

        let toggle = request.validate()?;
        if toggle.action == ToggleAction::Preview && !context.viewer.is_authenticated() {
            return Err(ToggleError::AuthenticationRequired);
        }

        let registry = &self.registry;
        let key = toggle.flag_key.as_str();
        let on = toggle.direction.is_on();
        let viewer = context.viewer;
        let action = toggle.action;

        let outcome = self
            .retry
            .run(move || async move {
                match action {
                    ToggleAction::Feature => registry.set_publish_status(key, on).await,
                    ToggleAction::Preview => registry.set_preview_status(key, on, viewer).await,
                }
            })
            .await
            .map_err(|e| ToggleError::from_flag_error(e.error, e.attempts))?;

        info!(
            target: LOG_TARGET,
            "{} {} {}: {}", toggle.action, toggle.flag_key, toggle.direction, outcome
        );

        Ok(ToggleData::new(
            toggle.action,
            toggle.flag_key,
            toggle.direction,
            outcome,
        ))
    }

    /// [`handle`](Self::handle) folded into a response payload.
    pub async fn respond(&self, request: &ToggleRequest, context: &ToggleContext) -> ToggleResponse {
        self.handle(request, context).await.into()
    }

    /// Handle an `application/x-www-form-urlencoded` body.
    pub async fn respond_form(&self, body: &str, context: &ToggleContext) -> ToggleResponse {
        match ToggleRequest::from_form(body) {
            Ok(request) => self.respond(&request, context).await,
            Err(e) => ToggleResponse::failure(&e),
        }
    }

    /// Handle a JSON body.
    pub async fn respond_json(&self, body: &str, context: &ToggleContext) -> ToggleResponse {
        match ToggleRequest::from_json(body) {
            Ok(request) => self.respond(&request, context).await,
            Err(e) => ToggleResponse::failure(&e),
        }
    }
}
