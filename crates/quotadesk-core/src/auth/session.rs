//! Session state machine.
//!
//! `SessionManager` owns the authoritative `SessionState` and is the only
//! thing that mutates it. Each transition mirrors the token into the
//! client's `Authorization` default and writes the persisted projection
//! through to the `SessionStore`. Consumers observe the state through a
//! `watch::Receiver` and never write to it.

use anyhow::Result;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiError, AuthResponse};
use crate::models::User;

use super::store::{PersistedSession, SessionStore};

/// Error code recorded when a login fails without a server-supplied code.
pub const LOGIN_FAILED: &str = "login_failed";

/// Error code recorded when a registration fails without a server-supplied code.
pub const REGISTER_FAILED: &str = "register_failed";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub user: Option<User>,
    pub token: Option<String>,
    /// Always equal to `token.is_some()`.
    pub is_authenticated: bool,
    /// True only while a login or register call is in flight.
    pub is_loading: bool,
    pub error: Option<String>,
}

impl SessionState {
    fn anonymous() -> Self {
        Self::default()
    }

    fn authenticated(user: User, token: String) -> Self {
        Self {
            user: Some(user),
            token: Some(token),
            is_authenticated: true,
            is_loading: false,
            error: None,
        }
    }

    /// The part of the state that survives a restart.
    pub fn persisted(&self) -> PersistedSession {
        PersistedSession {
            user: self.user.clone(),
            token: self.token.clone(),
            is_authenticated: self.is_authenticated,
        }
    }

    /// Rebuild from storage. The authenticated flag is derived rather than
    /// trusted: only a stored user together with a non-empty token counts as
    /// signed in, anything partial comes back anonymous.
    pub fn from_persisted(persisted: PersistedSession) -> Self {
        match (persisted.user, persisted.token) {
            (Some(user), Some(token)) if !token.is_empty() => Self::authenticated(user, token),
            _ => Self::anonymous(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Exchange {
    Login,
    Register,
}

impl Exchange {
    fn fallback_code(self) -> &'static str {
        match self {
            Exchange::Login => LOGIN_FAILED,
            Exchange::Register => REGISTER_FAILED,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Exchange::Login => "Login",
            Exchange::Register => "Registration",
        }
    }
}

pub struct SessionManager {
    api: ApiClient,
    store: Box<dyn SessionStore>,
    state: watch::Sender<SessionState>,
}

impl SessionManager {
    /// Start with an empty, anonymous session. Call `rehydrate` before
    /// issuing any authenticated request.
    pub fn new(api: ApiClient, store: Box<dyn SessionStore>) -> Self {
        let (state, _) = watch::channel(SessionState::anonymous());
        Self { api, store, state }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Current state, cloned.
    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated
    }

    /// Read-only view for consumers such as the quota poller.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    // ===== Rehydration =====

    /// Load the stored projection and apply it. Returns whether the session
    /// came back authenticated. Unreadable storage counts as empty.
    pub fn rehydrate(&self) -> bool {
        let persisted = match self.store.load() {
            Ok(persisted) => persisted,
            Err(e) => {
                warn!(error = %e, "Failed to load stored session, starting anonymous");
                None
            }
        };
        self.apply_rehydrated(persisted);
        self.is_authenticated()
    }

    /// Seed the state from a stored projection. A token is installed as the
    /// authorization default before this returns.
    pub fn apply_rehydrated(&self, persisted: Option<PersistedSession>) {
        let restored = SessionState::from_persisted(persisted.unwrap_or_default());

        match restored.token.as_deref() {
            Some(token) => {
                if let Err(e) = self.api.authorization().set(token) {
                    warn!(error = %e, "Stored token is unusable, discarding session");
                    self.logout();
                    return;
                }
                debug!("Session rehydrated with token");
            }
            None => {
                self.api.authorization().clear();
                debug!("No stored session");
            }
        }

        self.state.send_replace(restored);
    }

    // ===== Transitions =====

    pub async fn login(&self, email: &str, password: &str) -> Result<User> {
        self.exchange(Exchange::Login, self.api.login(email, password))
            .await
    }

    pub async fn register(&self, email: &str, password: &str) -> Result<User> {
        self.register_with_username(email, password, None).await
    }

    /// Register with an optional display name.
    pub async fn register_with_username(
        &self,
        email: &str,
        password: &str,
        username: Option<&str>,
    ) -> Result<User> {
        self.exchange(
            Exchange::Register,
            self.api.register(email, password, username),
        )
        .await
    }

    /// Shared body of login and register. Concurrent exchanges are not
    /// serialized: whichever response lands last decides the session.
    async fn exchange(
        &self,
        kind: Exchange,
        request: impl std::future::Future<Output = Result<AuthResponse>>,
    ) -> Result<User> {
        self.state.send_modify(|s| {
            s.is_loading = true;
            s.error = None;
        });

        let outcome = match request.await {
            Ok(auth) => self
                .api
                .authorization()
                .set(&auth.access_token)
                .map(|()| auth),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(AuthResponse { user, access_token }) => {
                self.state
                    .send_replace(SessionState::authenticated(user.clone(), access_token));
                self.persist();
                info!("{} successful", kind.label());
                Ok(user)
            }
            Err(e) => {
                let code = e
                    .downcast_ref::<ApiError>()
                    .and_then(ApiError::code)
                    .unwrap_or(kind.fallback_code())
                    .to_string();
                warn!(error = %e, code = %code, "{} failed", kind.label());
                self.state.send_modify(|s| {
                    s.error = Some(code);
                    s.is_loading = false;
                });
                Err(e)
            }
        }
    }

    /// Drop the credential everywhere. Never fails; calling it on an
    /// anonymous session changes nothing.
    pub fn logout(&self) {
        self.api.authorization().clear();
        self.state.send_if_modified(|s| {
            let reset = SessionState {
                is_loading: s.is_loading,
                ..SessionState::anonymous()
            };
            if *s == reset {
                return false;
            }
            *s = reset;
            true
        });
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear stored session");
        }
        debug!("Logged out");
    }

    /// Re-validate the stored token against the server. Any failure is taken
    /// to mean the token is dead and logs the session out.
    pub async fn refresh_user(&self) {
        let current = self.state.borrow().token.clone();
        let Some(token) = current else {
            return;
        };

        if let Err(e) = self.api.authorization().set(&token) {
            warn!(error = %e, "Session token is unusable, logging out");
            self.logout();
            return;
        }

        match self.api.current_user().await {
            Ok(user) => {
                let updated = self.state.send_if_modified(|s| {
                    if s.token.as_deref() == Some(token.as_str()) && s.user.as_ref() != Some(&user)
                    {
                        s.user = Some(user);
                        true
                    } else {
                        false
                    }
                });
                if updated {
                    self.persist();
                }
                debug!("Current user refreshed");
            }
            Err(e) => {
                warn!(error = %e, "Session token rejected, logging out");
                self.logout();
            }
        }
    }

    pub fn set_error(&self, error: Option<String>) {
        self.state.send_modify(|s| s.error = error);
    }

    fn persist(&self) {
        let persisted = self.state.borrow().persisted();
        if let Err(e) = self.store.save(&persisted) {
            warn!(error = %e, "Failed to save session");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::FileSessionStore;
    use tempfile::TempDir;

    fn user() -> User {
        User {
            id: Some(1),
            email: "a@x.com".to_string(),
            username: None,
        }
    }

    fn manager(dir: &TempDir) -> SessionManager {
        // Nothing listens here; only offline transitions are exercised.
        let api = ApiClient::new("http://127.0.0.1:9").unwrap();
        SessionManager::new(api, Box::new(FileSessionStore::new(dir.path())))
    }

    fn assert_invariant(state: &SessionState) {
        assert_eq!(state.is_authenticated, state.token.is_some());
        assert_eq!(state.is_authenticated, state.user.is_some());
    }

    #[test]
    fn test_state_constructors_hold_invariant() {
        assert_invariant(&SessionState::anonymous());
        assert_invariant(&SessionState::authenticated(user(), "t".to_string()));
    }

    #[test]
    fn test_from_persisted_recomputes_flag() {
        let lying = PersistedSession {
            user: Some(user()),
            token: None,
            is_authenticated: true,
        };
        let state = SessionState::from_persisted(lying);
        assert_invariant(&state);
        assert!(state.user.is_none());

        let forgetful = PersistedSession {
            user: Some(user()),
            token: Some("tok".to_string()),
            is_authenticated: false,
        };
        let state = SessionState::from_persisted(forgetful);
        assert!(state.is_authenticated);
        assert_invariant(&state);
    }

    #[test]
    fn test_from_persisted_token_without_user_is_anonymous() {
        let orphaned = PersistedSession {
            user: None,
            token: Some("t".to_string()),
            is_authenticated: true,
        };
        let state = SessionState::from_persisted(orphaned);
        assert_eq!(state, SessionState::anonymous());
        assert_invariant(&state);
    }

    #[test]
    fn test_persisted_round_trip() {
        let state = SessionState::authenticated(user(), "tok123".to_string());
        let back = SessionState::from_persisted(state.persisted());
        assert_eq!(back, state);
    }

    #[test]
    fn test_rehydrate_installs_authorization() {
        let dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(dir.path());
        store
            .save(&SessionState::authenticated(user(), "tok123".to_string()).persisted())
            .unwrap();

        let session = manager(&dir);
        assert!(session.rehydrate());
        let state = session.snapshot();
        assert_eq!(state.token.as_deref(), Some("tok123"));
        assert_eq!(state.user, Some(user()));
        assert_eq!(
            session.api().authorization().current().as_deref(),
            Some("Bearer tok123")
        );
    }

    #[test]
    fn test_rehydrate_token_without_user_stays_anonymous() {
        let dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(dir.path());
        store
            .save(&PersistedSession {
                user: None,
                token: Some("tok123".to_string()),
                is_authenticated: true,
            })
            .unwrap();

        let session = manager(&dir);
        assert!(!session.rehydrate());
        assert_eq!(session.snapshot(), SessionState::anonymous());
        assert!(!session.api().authorization().is_set());
    }

    #[test]
    fn test_rehydrate_empty_store() {
        let dir = TempDir::new().unwrap();
        let session = manager(&dir);
        assert!(!session.rehydrate());
        assert_eq!(session.snapshot(), SessionState::anonymous());
        assert!(!session.api().authorization().is_set());
    }

    #[test]
    fn test_rehydrate_corrupt_store_is_anonymous() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("auth-storage.json"), "garbage").unwrap();
        let session = manager(&dir);
        assert!(!session.rehydrate());
        assert!(!session.api().authorization().is_set());
    }

    #[test]
    fn test_rehydrate_unusable_token_discards_session() {
        let dir = TempDir::new().unwrap();
        let session = manager(&dir);
        session.apply_rehydrated(Some(PersistedSession {
            user: Some(user()),
            token: Some("bad\ntoken".to_string()),
            is_authenticated: true,
        }));
        assert!(!session.is_authenticated());
        assert!(!session.api().authorization().is_set());
    }

    #[test]
    fn test_logout_clears_everything() {
        let dir = TempDir::new().unwrap();
        let session = manager(&dir);
        session.apply_rehydrated(Some(
            SessionState::authenticated(user(), "tok".to_string()).persisted(),
        ));
        session.persist();
        assert!(dir.path().join("auth-storage.json").exists());

        session.logout();
        assert_eq!(session.snapshot(), SessionState::anonymous());
        assert!(!session.api().authorization().is_set());
        assert!(!dir.path().join("auth-storage.json").exists());
    }

    #[test]
    fn test_logout_when_anonymous_is_noop() {
        let dir = TempDir::new().unwrap();
        let session = manager(&dir);
        let rx = session.subscribe();

        session.logout();
        session.logout();

        assert_eq!(session.snapshot(), SessionState::anonymous());
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_logout_clears_error() {
        let dir = TempDir::new().unwrap();
        let session = manager(&dir);
        session.set_error(Some("invalid_credentials".to_string()));
        session.logout();
        assert!(session.snapshot().error.is_none());
    }

    #[test]
    fn test_set_error() {
        let dir = TempDir::new().unwrap();
        let session = manager(&dir);
        session.set_error(Some("boom".to_string()));
        assert_eq!(session.snapshot().error.as_deref(), Some("boom"));
        session.set_error(None);
        assert!(session.snapshot().error.is_none());
    }

    #[tokio::test]
    async fn test_refresh_user_without_token_is_noop() {
        let dir = TempDir::new().unwrap();
        let session = manager(&dir);
        session.refresh_user().await;
        assert_eq!(session.snapshot(), SessionState::anonymous());
        assert!(!session.api().authorization().is_set());
    }

    #[tokio::test]
    async fn test_failed_login_records_fallback_code() {
        let dir = TempDir::new().unwrap();
        let session = manager(&dir);

        // Connection refused carries no server code.
        let result = session.login("a@x.com", "secret").await;
        assert!(result.is_err());

        let state = session.snapshot();
        assert_eq!(state.error.as_deref(), Some(LOGIN_FAILED));
        assert!(!state.is_loading);
        assert!(!state.is_authenticated);
    }
}
