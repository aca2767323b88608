//! Authentication session slice shared by the HTTP client and the auth store.
//!
//! The session is the single owner of "who is logged in": it mirrors the
//! persisted `auth-storage` record in memory, tracks the bootstrap state
//! machine and publishes changes.
//!
//! ```text
//! Unchecked ──check──> Checking ──/me ok──> Authenticated
//!     ^                    └──no token / failure──> Unauthenticated
//!     └────────────────────── logout ──────────────────┘
//! ```
//!
//! Every stored credential pair starts a new generation. Outcomes that were
//! started under an older generation (a bootstrap check, a request that came
//! back 401) are dropped instead of clobbering a fresh login.
//!
//! Logout and a rejected credential both end the session through
//! [`Session::on_sign_out`] hooks, which is where owners of per-user state
//! discard it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use sprintboard_common::User;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::storage::{Storage, StorageKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    Unchecked,
    Checking,
    Authenticated,
    Unauthenticated,
}

impl AuthStatus {
    /// True once bootstrap reached a terminal state.
    pub fn is_resolved(&self) -> bool {
        matches!(self, AuthStatus::Authenticated | AuthStatus::Unauthenticated)
    }
}

/// Shape of the `auth-storage` record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedSession {
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub user: Option<User>,
    pub token: Option<String>,
    pub status: AuthStatus,
}

impl SessionSnapshot {
    pub fn is_authenticated(&self) -> bool {
        self.status == AuthStatus::Authenticated
    }

    pub fn is_auth_checked(&self) -> bool {
        self.status.is_resolved()
    }
}

/// Where the application should go next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    /// The login entry point; emitted when the server rejects our credentials.
    Login,
}

/// What a view that requires a session should render.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthGate {
    /// Bootstrap has not resolved yet; show a neutral loading state.
    Loading,
    Granted(User),
    Denied,
}

type SignOutHook = Box<dyn Fn() + Send + Sync>;

pub struct Session {
    storage: Arc<Storage>,
    state: Mutex<SessionSnapshot>,
    /// Bumped under the state lock by every `establish`.
    generation: AtomicU64,
    sign_out_hooks: Mutex<Vec<SignOutHook>>,
    status_tx: watch::Sender<AuthStatus>,
    nav_tx: broadcast::Sender<Navigation>,
}

impl Session {
    /// Rehydrate the session from durable storage. Status starts `Unchecked`
    /// whether or not a token was found.
    pub fn new(storage: Arc<Storage>) -> Self {
        let persisted: PersistedSession = storage.get(StorageKey::AuthSession).unwrap_or_default();
        let (status_tx, _) = watch::channel(AuthStatus::Unchecked);
        let (nav_tx, _) = broadcast::channel(8);
        Self {
            storage,
            state: Mutex::new(SessionSnapshot {
                user: persisted.user,
                token: persisted.token.filter(|t| !t.is_empty()),
                status: AuthStatus::Unchecked,
            }),
            generation: AtomicU64::new(0),
            sign_out_hooks: Mutex::new(Vec::new()),
            status_tx,
            nav_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionSnapshot> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.lock().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.lock().token.clone()
    }

    /// The token together with the generation it belongs to.
    pub fn credentials(&self) -> (Option<String>, u64) {
        let state = self.lock();
        (state.token.clone(), self.generation())
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Run `hook` every time the session ends through logout or a rejected
    /// credential.
    pub fn on_sign_out(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.hooks().push(Box::new(hook));
    }

    fn hooks(&self) -> MutexGuard<'_, Vec<SignOutHook>> {
        self.sign_out_hooks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn user(&self) -> Option<User> {
        self.lock().user.clone()
    }

    pub fn status(&self) -> AuthStatus {
        self.lock().status
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthStatus> {
        self.status_tx.subscribe()
    }

    pub fn navigation(&self) -> broadcast::Receiver<Navigation> {
        self.nav_tx.subscribe()
    }

    pub fn gate(&self) -> AuthGate {
        let state = self.lock();
        match (state.status, &state.user) {
            (AuthStatus::Authenticated, Some(user)) => AuthGate::Granted(user.clone()),
            (AuthStatus::Unchecked | AuthStatus::Checking, _) => AuthGate::Loading,
            _ => AuthGate::Denied,
        }
    }

    /// Wait until bootstrap resolves and return the terminal status.
    pub async fn wait_until_checked(&self) -> AuthStatus {
        let mut rx = self.subscribe();
        match rx.wait_for(AuthStatus::is_resolved).await {
            Ok(status) => *status,
            // Sender lives as long as `self`; unreachable in practice.
            Err(_) => self.status(),
        }
    }

    fn set_status(&self, state: &mut SessionSnapshot, status: AuthStatus) {
        if state.status != status {
            info!(from = ?state.status, to = ?status, "session status changed");
        }
        state.status = status;
        self.status_tx.send_replace(status);
    }

    /// Enter `Checking`; returns the generation the check runs under.
    pub(crate) fn begin_check(&self) -> u64 {
        let mut state = self.lock();
        self.set_status(&mut state, AuthStatus::Checking);
        self.generation()
    }

    /// Store a fresh credential pair (login/register) and mark authenticated.
    pub(crate) fn establish(&self, user: User, token: String) {
        let mut state = self.lock();
        self.generation.fetch_add(1, Ordering::SeqCst);
        state.user = Some(user);
        state.token = Some(token);
        self.persist(&state);
        self.set_status(&mut state, AuthStatus::Authenticated);
    }

    /// Confirm the rehydrated token with the user returned by `/me`. Ignored
    /// when a login replaced the token while the check was running.
    pub(crate) fn confirm(&self, user: User, generation: u64) {
        let mut state = self.lock();
        if self.generation() != generation {
            debug!("bootstrap result superseded by a newer login");
            return;
        }
        state.user = Some(user);
        self.persist(&state);
        self.set_status(&mut state, AuthStatus::Authenticated);
    }

    /// Drop credentials from memory and storage and mark unauthenticated.
    pub(crate) fn mark_unauthenticated(&self) {
        self.clear_credentials(None);
    }

    /// Like [`mark_unauthenticated`](Self::mark_unauthenticated), but only
    /// while `generation` is current. Returns whether anything was cleared.
    pub(crate) fn clear_credentials(&self, generation: Option<u64>) -> bool {
        let mut state = self.lock();
        if generation.is_some_and(|g| g != self.generation()) {
            debug!("ignoring sign-out for a superseded session");
            return false;
        }
        state.user = None;
        state.token = None;
        if let Err(e) = self.storage.remove(StorageKey::AuthSession) {
            warn!(error = %e, "failed to clear persisted session");
        }
        self.set_status(&mut state, AuthStatus::Unauthenticated);
        true
    }

    /// End the session: clear credentials, then run every sign-out hook.
    pub(crate) fn sign_out(&self) {
        self.clear_credentials(None);
        self.run_sign_out_hooks();
    }

    fn run_sign_out_hooks(&self) {
        for hook in self.hooks().iter() {
            hook();
        }
    }

    /// Back to the top of the state machine (logout).
    pub(crate) fn reset(&self) {
        let mut state = self.lock();
        self.set_status(&mut state, AuthStatus::Unchecked);
    }

    /// Handle a 401: clear everything and send the application to login.
    pub fn invalidate(&self) {
        self.reject(None);
    }

    /// Handle a 401 for a request sent under `generation`; a no-op when a
    /// newer login has replaced that token.
    pub(crate) fn invalidate_from(&self, generation: u64) {
        self.reject(Some(generation));
    }

    fn reject(&self, generation: Option<u64>) {
        if !self.clear_credentials(generation) {
            return;
        }
        warn!("server rejected credentials; clearing session");
        self.run_sign_out_hooks();
        // No receivers simply means nobody is rendering; not an error.
        let _ = self.nav_tx.send(Navigation::Login);
    }

    fn persist(&self, state: &SessionSnapshot) {
        let record = PersistedSession {
            user: state.user.clone(),
            token: state.token.clone(),
        };
        if let Err(e) = self.storage.set(StorageKey::AuthSession, &record) {
            warn!(error = %e, "failed to persist session");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprintboard_common::Role;

    fn user() -> User {
        User {
            id: 7,
            email: "ada@example.com".into(),
            name: "Ada".into(),
            role: Role::Developer,
            avatar: None,
        }
    }

    #[test]
    fn test_new_session_rehydrates_token() {
        let storage = Arc::new(Storage::in_memory());
        storage
            .set(
                StorageKey::AuthSession,
                &PersistedSession {
                    user: Some(user()),
                    token: Some("tok".into()),
                },
            )
            .unwrap();
        let session = Session::new(storage);
        let snap = session.snapshot();
        assert_eq!(snap.token.as_deref(), Some("tok"));
        assert_eq!(snap.status, AuthStatus::Unchecked);
        assert!(!snap.is_auth_checked());
        assert_eq!(session.gate(), AuthGate::Loading);
    }

    #[test]
    fn test_empty_persisted_token_is_ignored() {
        let storage = Arc::new(Storage::in_memory());
        storage
            .set(
                StorageKey::AuthSession,
                &PersistedSession {
                    user: None,
                    token: Some(String::new()),
                },
            )
            .unwrap();
        assert!(Session::new(storage).token().is_none());
    }

    #[test]
    fn test_establish_persists_and_grants() {
        let storage = Arc::new(Storage::in_memory());
        let session = Session::new(storage.clone());
        session.establish(user(), "abc".into());

        let persisted: PersistedSession = storage.get(StorageKey::AuthSession).unwrap();
        assert_eq!(persisted.token.as_deref(), Some("abc"));
        assert!(session.snapshot().is_authenticated());
        assert_eq!(session.gate(), AuthGate::Granted(user()));
    }

    #[test]
    fn test_invalidate_clears_and_navigates() {
        let storage = Arc::new(Storage::in_memory());
        let session = Session::new(storage.clone());
        session.establish(user(), "abc".into());
        let mut nav = session.navigation();

        session.invalidate();

        let snap = session.snapshot();
        assert!(snap.token.is_none());
        assert!(snap.user.is_none());
        assert!(!snap.is_authenticated());
        assert!(snap.is_auth_checked());
        assert!(storage.get::<PersistedSession>(StorageKey::AuthSession).is_none());
        assert_eq!(nav.try_recv().unwrap(), Navigation::Login);
        assert_eq!(session.gate(), AuthGate::Denied);
    }

    #[test]
    fn test_sign_out_hooks_run_on_logout_and_rejection_only() {
        let session = Session::new(Arc::new(Storage::in_memory()));
        let calls = Arc::new(AtomicU64::new(0));
        {
            let calls = calls.clone();
            session.on_sign_out(move || {
                calls.fetch_add(1, Ordering::SeqCst);
            });
        }

        session.mark_unauthenticated();
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        session.establish(user(), "abc".into());
        session.invalidate();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        session.sign_out();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_stale_rejection_keeps_newer_login() {
        let session = Session::new(Arc::new(Storage::in_memory()));
        let (_, sent_under) = session.credentials();
        session.establish(user(), "fresh".into());
        let mut nav = session.navigation();

        session.invalidate_from(sent_under);

        assert_eq!(session.token().as_deref(), Some("fresh"));
        assert_eq!(session.status(), AuthStatus::Authenticated);
        assert!(nav.try_recv().is_err());
        assert!(!session.clear_credentials(Some(sent_under)));

        let (_, current) = session.credentials();
        session.invalidate_from(current);
        assert!(session.token().is_none());
    }

    #[test]
    fn test_superseded_check_does_not_confirm() {
        let session = Session::new(Arc::new(Storage::in_memory()));
        let check = session.begin_check();
        session.establish(user(), "fresh".into());

        let mut stale = user();
        stale.id = 99;
        session.confirm(stale, check);
        assert_eq!(session.user().map(|u| u.id), Some(7));
        assert_eq!(session.status(), AuthStatus::Authenticated);
    }

    #[tokio::test]
    async fn test_wait_until_checked_resolves() {
        let session = Arc::new(Session::new(Arc::new(Storage::in_memory())));
        session.begin_check();
        let waiter = {
            let session = session.clone();
            tokio::spawn(async move { session.wait_until_checked().await })
        };
        session.mark_unauthenticated();
        assert_eq!(waiter.await.unwrap(), AuthStatus::Unauthenticated);
    }
}
