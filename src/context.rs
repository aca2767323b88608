//! Process-wide client state with an explicit lifecycle.
//!
//! [`SessionContext::init`] opens durable storage and rehydrates the session
//! and the persisted project/sprint caches; [`SessionContext::teardown`]
//! logs out and wipes every store and storage key. Whenever the session ends,
//! by logout or by a 401, the entity stores and their persisted copies are
//! discarded. Nothing here is global: callers own the context and hand out
//! the `Arc`s they need.

use std::sync::Arc;

use tracing::{debug, info};

use crate::api::{AuthApi, ProjectsApi, SprintsApi, TasksApi};
use crate::config::ClientConfig;
use crate::errors::{RealtimeError, StorageError};
use crate::http::HttpClient;
use crate::realtime::PusherConnection;
use crate::realtime::sync::NotificationInbox;
use crate::session::{AuthStatus, Session};
use crate::storage::{ClearReport, Storage, StorageKey};
use crate::store::{AuthStore, ProjectStore, SprintStore, TaskStore};

pub struct SessionContext {
    pub config: ClientConfig,
    pub storage: Arc<Storage>,
    pub session: Arc<Session>,
    pub http: HttpClient,
    pub auth: Arc<AuthStore>,
    pub projects: Arc<ProjectStore>,
    pub sprints: Arc<SprintStore>,
    pub tasks: Arc<TaskStore>,
    pub notifications: Arc<NotificationInbox>,
}

impl SessionContext {
    /// Open storage under the configured directories and rehydrate from it.
    pub fn init(config: ClientConfig) -> Result<Self, StorageError> {
        let storage = Storage::open(&config.data_dir(), &config.cache_dir())?;
        Ok(Self::with_storage(config, Arc::new(storage)))
    }

    /// A context whose storage never touches disk.
    pub fn ephemeral(config: ClientConfig) -> Self {
        Self::with_storage(config, Arc::new(Storage::in_memory()))
    }

    fn with_storage(config: ClientConfig, storage: Arc<Storage>) -> Self {
        let session = Arc::new(Session::new(storage.clone()));
        let http = HttpClient::new(config.api_base(), session.clone());
        let auth = AuthStore::new(AuthApi::new(http.clone()), session.clone());
        let projects = ProjectStore::new(ProjectsApi::new(http.clone()))
            .with_persistence(storage.clone(), StorageKey::ProjectCache);
        let sprints = SprintStore::new(SprintsApi::new(http.clone()))
            .with_persistence(storage.clone(), StorageKey::SprintCache);
        let tasks = TaskStore::new(TasksApi::new(http.clone()));
        debug!(
            api = config.api_base(),
            projects = projects.len(),
            sprints = sprints.len(),
            "session context initialized"
        );

        let projects = Arc::new(projects);
        let sprints = Arc::new(sprints);
        let tasks = Arc::new(tasks);
        let notifications = Arc::new(NotificationInbox::new());
        discard_on_sign_out(&session, &projects, ProjectStore::clear);
        discard_on_sign_out(&session, &sprints, SprintStore::clear);
        discard_on_sign_out(&session, &tasks, TaskStore::clear);
        discard_on_sign_out(&session, &notifications, NotificationInbox::clear);

        Self {
            config,
            storage,
            session,
            http,
            auth: Arc::new(auth),
            projects,
            sprints,
            tasks,
            notifications,
        }
    }

    /// Resolve the session bootstrap.
    pub async fn bootstrap(&self) -> AuthStatus {
        self.auth.check_auth().await
    }

    /// Open the realtime connection using the current session for channel auth.
    pub async fn connect_realtime(&self) -> Result<PusherConnection, RealtimeError> {
        PusherConnection::connect(&self.config, self.http.clone()).await
    }

    /// Drop every stored key, then log out, which empties the stores.
    pub async fn teardown(&self) -> Result<ClearReport, StorageError> {
        let report = self.storage.clear_all()?;
        self.auth.logout().await;
        info!(
            durable = report.durable_keys,
            cache = report.cache_entries,
            "local state cleared"
        );
        Ok(report)
    }
}

/// Clear `target` whenever the session ends. The hook holds `target` weakly.
fn discard_on_sign_out<T: Send + Sync + 'static>(session: &Session, target: &Arc<T>, clear: fn(&T)) {
    let target = Arc::downgrade(target);
    session.on_sign_out(move || {
        if let Some(target) = target.upgrade() {
            clear(&target);
        }
    });
}
