use std::sync::Arc;

use sprintboard_common::User;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::api::AuthApi;
use crate::api::auth::{LoginRequest, RegisterRequest};
use crate::errors::ApiError;
use crate::session::{AuthStatus, Session, SessionSnapshot};

/// Login, registration, logout and the bootstrap check over the shared [`Session`].
pub struct AuthStore {
    api: AuthApi,
    session: Arc<Session>,
    /// Serializes bootstrap checks so concurrent callers share one `/me` call.
    check: Mutex<()>,
}

impl AuthStore {
    pub fn new(api: AuthApi, session: Arc<Session>) -> Self {
        Self {
            api,
            session,
            check: Mutex::new(()),
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.session.snapshot()
    }

    /// Resolve the bootstrap state machine.
    ///
    /// Once resolved the outcome is returned as-is without touching the
    /// network until a logout resets the session.
    pub async fn check_auth(&self) -> AuthStatus {
        let _guard = self.check.lock().await;
        let status = self.session.status();
        if status.is_resolved() {
            return status;
        }

        if self.session.token().is_none() {
            debug!("no persisted token");
            self.session.mark_unauthenticated();
            return AuthStatus::Unauthenticated;
        }

        let generation = self.session.begin_check();
        match self.api.me().await {
            Ok(user) => self.session.confirm(user, generation),
            Err(e) => {
                warn!(error = %e, "persisted token rejected");
                self.session.clear_credentials(Some(generation));
            }
        }
        self.session.status()
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<User, ApiError> {
        let request = LoginRequest {
            email: email.trim().to_string(),
            password: password.to_string(),
        };
        let credentials = self.api.login(&request).await?;
        self.session.establish(credentials.user.clone(), credentials.token);
        Ok(credentials.user)
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<User, ApiError> {
        let credentials = self.api.register(request).await?;
        self.session.establish(credentials.user.clone(), credentials.token);
        Ok(credentials.user)
    }

    /// End the session. The server call is best effort; local credentials are
    /// always dropped, sign-out hooks run and bootstrap starts again from the top.
    pub async fn logout(&self) -> AuthStatus {
        if self.session.token().is_some()
            && let Err(e) = self.api.logout().await
        {
            warn!(error = %e, "server logout failed; clearing local session anyway");
        }
        {
            let _guard = self.check.lock().await;
            self.session.sign_out();
            self.session.reset();
        }
        self.check_auth().await
    }
}
