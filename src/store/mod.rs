//! Observable per-entity caches.
//!
//! Every entity type gets the same store, [`ResourceStore`], parameterized by
//! its [`CrudApi`] binding. A store owns an ordered collection, a loading
//! flag and a version channel that ticks after every change. Locks are held
//! only for the in-memory reconciliation, never across a request, so two
//! in-flight calls resolve in whatever order their responses arrive.
//!
//! | Module     | Extras on top of the generic store                      |
//! |------------|---------------------------------------------------------|
//! | `auth`     | Login, registration, logout and the session bootstrap   |
//! | `projects` | Team membership                                         |
//! | `sprints`  | Per-project and active-sprint queries                   |
//! | `tasks`    | Optimistic status changes with rollback                 |

pub mod auth;
pub mod projects;
pub mod sprints;
pub mod tasks;

use std::sync::{Arc, Mutex, MutexGuard};

use sprintboard_common::Identified;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::api::CrudApi;
use crate::errors::ApiError;
use crate::storage::{Storage, StorageKey};

pub use auth::AuthStore;
pub use projects::ProjectStore;
pub use sprints::SprintStore;
pub use tasks::TaskStore;

/// Re-applied to every entity entering the collection from the server.
pub trait Overlay<T>: Send + Sync {
    fn apply(&self, item: &mut T);
}

#[derive(Debug)]
struct Cache<T> {
    items: Vec<T>,
    in_flight: usize,
}

impl<T: Identified> Cache<T> {
    fn position(&self, id: i64) -> Option<usize> {
        self.items.iter().position(|item| item.id() == id)
    }
}

struct Persistence {
    storage: Arc<Storage>,
    key: StorageKey,
}

pub struct ResourceStore<A: CrudApi> {
    api: A,
    cache: Mutex<Cache<A::Entity>>,
    version: watch::Sender<u64>,
    persistence: Option<Persistence>,
    overlay: Option<Arc<dyn Overlay<A::Entity>>>,
}

impl<A: CrudApi> ResourceStore<A> {
    pub fn new(api: A) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            api,
            cache: Mutex::new(Cache {
                items: Vec::new(),
                in_flight: 0,
            }),
            version,
            persistence: None,
            overlay: None,
        }
    }

    /// Mirror the collection under `key`, starting from whatever was stored there.
    pub fn with_persistence(mut self, storage: Arc<Storage>, key: StorageKey) -> Self {
        if let Some(items) = storage.get::<Vec<A::Entity>>(key) {
            debug!(resource = A::PATH, count = items.len(), "rehydrated cache");
            self.lock().items = items;
        }
        self.persistence = Some(Persistence { storage, key });
        self
    }

    pub(crate) fn with_overlay(mut self, overlay: Arc<dyn Overlay<A::Entity>>) -> Self {
        self.overlay = Some(overlay);
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    fn lock(&self) -> MutexGuard<'_, Cache<A::Entity>> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> Vec<A::Entity> {
        self.lock().items.clone()
    }

    pub fn get(&self, id: i64) -> Option<A::Entity> {
        let cache = self.lock();
        cache.position(id).map(|index| cache.items[index].clone())
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    pub fn is_loading(&self) -> bool {
        self.lock().in_flight > 0
    }

    /// Ticks once per change to the collection or the loading flag.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    /// Run `f` against the collection, then notify observers and persist.
    pub(crate) fn mutate<R>(&self, f: impl FnOnce(&mut Vec<A::Entity>) -> R) -> R {
        let mut cache = self.lock();
        let result = f(&mut cache.items);
        self.persist(&cache.items);
        drop(cache);
        self.bump();
        result
    }

    fn bump(&self) {
        self.version.send_modify(|v| *v += 1);
    }

    fn persist(&self, items: &[A::Entity]) {
        let Some(persistence) = &self.persistence else {
            return;
        };
        if let Err(e) = persistence.storage.set(persistence.key, &items) {
            warn!(resource = A::PATH, error = %e, "failed to persist cache");
        }
    }

    fn overlaid(&self, mut item: A::Entity) -> A::Entity {
        if let Some(overlay) = &self.overlay {
            overlay.apply(&mut item);
        }
        item
    }

    fn set_loading(&self, loading: bool) {
        {
            let mut cache = self.lock();
            if loading {
                cache.in_flight += 1;
            } else {
                cache.in_flight = cache.in_flight.saturating_sub(1);
            }
        }
        self.bump();
    }

    /// Replace the collection with the server's list.
    ///
    /// On failure the collection is left as it was and the error is returned
    /// after being logged.
    pub async fn fetch_all(&self, filter: Option<&A::Filter>) -> Result<Vec<A::Entity>, ApiError> {
        self.set_loading(true);
        let result = self.api.list(filter).await;
        self.set_loading(false);

        match result {
            Ok(items) => {
                debug!(resource = A::PATH, count = items.len(), "fetched collection");
                Ok(self.mutate(|current| {
                    *current = items.into_iter().map(|i| self.overlaid(i)).collect();
                    current.clone()
                }))
            }
            Err(e) => {
                warn!(resource = A::PATH, error = %e, "fetch failed; keeping cached collection");
                Err(e)
            }
        }
    }

    /// Background variant of [`fetch_all`](Self::fetch_all): failures are logged only.
    pub async fn refresh(&self, filter: Option<&A::Filter>) {
        let _ = self.fetch_all(filter).await;
    }

    /// Fetch one entity and upsert it.
    pub async fn fetch_one(&self, id: i64) -> Result<A::Entity, ApiError> {
        let item = self.api.get(id).await?;
        Ok(self.mutate(|items| upsert(items, self.overlaid(item))))
    }

    pub async fn create(&self, input: &A::Create) -> Result<A::Entity, ApiError> {
        let item = self.api.create(input).await?;
        Ok(self.mutate(|items| upsert(items, item)))
    }

    pub async fn update(&self, id: i64, patch: &A::Update) -> Result<A::Entity, ApiError> {
        let item = self.api.update(id, patch).await?;
        Ok(self.mutate(|items| upsert(items, self.overlaid(item))))
    }

    pub async fn delete(&self, id: i64) -> Result<(), ApiError> {
        self.api.delete(id).await?;
        self.mutate(|items| remove(items, id));
        Ok(())
    }

    /// Upsert an entity pushed over the realtime channel.
    pub fn apply_remote(&self, item: A::Entity) {
        debug!(resource = A::PATH, id = item.id(), "applying remote update");
        self.mutate(|items| upsert(items, self.overlaid(item)));
    }

    /// Drop an entity the server reported as gone.
    pub fn forget_remote(&self, id: i64) {
        self.mutate(|items| remove(items, id));
    }

    /// Discard the collection and its persisted copy.
    pub fn clear(&self) {
        {
            let mut cache = self.lock();
            cache.items.clear();
            if let Some(persistence) = &self.persistence
                && let Err(e) = persistence.storage.remove(persistence.key)
            {
                warn!(resource = A::PATH, error = %e, "failed to clear persisted cache");
            }
        }
        self.bump();
    }
}

/// Replace the entity with the same id, or append it. Returns the stored copy.
fn upsert<T: Identified + Clone>(items: &mut Vec<T>, item: T) -> T {
    match items.iter().position(|i| i.id() == item.id()) {
        Some(index) => items[index] = item.clone(),
        None => items.push(item.clone()),
    }
    item
}

fn remove<T: Identified>(items: &mut Vec<T>, id: i64) -> bool {
    let before = items.len();
    items.retain(|i| i.id() != id);
    items.len() != before
}
