//! Task store with optimistic status changes.
//!
//! `update_status` writes the new status into the collection before the
//! request is sent and records a tagged [`PendingStatus`]. When the request
//! fails, the change is undone without clobbering newer changes to the same
//! task:
//!
//! - the newest pending record for a task restores its `previous` status;
//! - an older record instead hands its `previous` down to the next newer
//!   record, so the eventual rollback of that record lands on the right value.
//!
//! A confirmed change supersedes older pending changes to the same task, so
//! their late failures leave the confirmed status alone.
//!
//! While a record is pending, fetches and realtime upserts keep showing its
//! status on top of whatever the server sent.

use std::collections::BTreeMap;
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard};

use sprintboard_common::{Task, TaskStatus};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{Overlay, ResourceStore};
use crate::api::TasksApi;
use crate::errors::ApiError;

#[derive(Debug, Clone, PartialEq)]
pub struct PendingStatus {
    pub tag: Uuid,
    pub task_id: i64,
    pub previous: TaskStatus,
    pub next: TaskStatus,
}

/// Outstanding optimistic status changes, oldest first.
#[derive(Debug, Default)]
pub struct PendingLedger {
    records: Mutex<Vec<PendingStatus>>,
}

impl PendingLedger {
    fn lock(&self) -> MutexGuard<'_, Vec<PendingStatus>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn push(&self, record: PendingStatus) {
        self.lock().push(record);
    }

    /// Forget a confirmed record along with every older record for the same
    /// task, which the confirmed status now supersedes.
    fn settle(&self, tag: Uuid) {
        let mut records = self.lock();
        let Some(index) = records.iter().position(|r| r.tag == tag) else {
            return;
        };
        let task_id = records[index].task_id;
        let mut position = 0;
        records.retain(|r| {
            let keep = position > index || r.task_id != task_id;
            position += 1;
            keep
        });
    }

    /// Drop a failed record and return the status the task should roll back
    /// to, or `None` when a newer pending change owns the task's status.
    fn rollback(&self, tag: Uuid) -> Option<TaskStatus> {
        let mut records = self.lock();
        let index = records.iter().position(|r| r.tag == tag)?;
        let failed = records.remove(index);
        match records[index..].iter_mut().find(|r| r.task_id == failed.task_id) {
            Some(newer) => {
                newer.previous = failed.previous;
                None
            }
            None => Some(failed.previous),
        }
    }

    pub fn pending_for(&self, task_id: i64) -> Vec<PendingStatus> {
        self.lock()
            .iter()
            .filter(|r| r.task_id == task_id)
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn clear(&self) {
        self.lock().clear();
    }
}

impl Overlay<Task> for PendingLedger {
    fn apply(&self, task: &mut Task) {
        if let Some(newest) = self.lock().iter().rev().find(|r| r.task_id == task.id) {
            task.status = newest.next;
        }
    }
}

pub struct TaskStore {
    inner: ResourceStore<TasksApi>,
    pending: Arc<PendingLedger>,
}

impl TaskStore {
    pub fn new(api: TasksApi) -> Self {
        let pending = Arc::new(PendingLedger::default());
        Self {
            inner: ResourceStore::new(api).with_overlay(pending.clone()),
            pending,
        }
    }

    pub fn pending(&self) -> &PendingLedger {
        &self.pending
    }

    /// Move a task to `status` immediately and confirm with the server.
    ///
    /// On success the local task keeps every other field as it was. On
    /// failure the optimistic status is rolled back and the error returned.
    pub async fn update_status(&self, id: i64, status: TaskStatus) -> Result<(), ApiError> {
        let tag = Uuid::new_v4();
        let applied = self.inner.mutate(|tasks| {
            let task = tasks.iter_mut().find(|t| t.id == id)?;
            let record = PendingStatus {
                tag,
                task_id: id,
                previous: task.status,
                next: status,
            };
            task.status = status;
            self.pending.push(record);
            Some(())
        });

        let result = self.inner.api().update_status(id, status).await;

        match (result, applied) {
            (Ok(_), Some(())) => {
                self.pending.settle(tag);
                debug!(task = id, %status, "status change confirmed");
                Ok(())
            }
            (Ok(server), None) => {
                // Not cached locally; take the server's copy.
                self.inner.apply_remote(server);
                Ok(())
            }
            (Err(e), Some(())) => {
                self.inner.mutate(|tasks| {
                    if let Some(previous) = self.pending.rollback(tag)
                        && let Some(task) = tasks.iter_mut().find(|t| t.id == id)
                    {
                        warn!(task = id, from = %status, to = %previous, error = %e, "rolling back status change");
                        task.status = previous;
                    }
                });
                Err(e)
            }
            (Err(e), None) => Err(e),
        }
    }

    /// Tasks grouped into board columns.
    pub fn board(&self) -> BTreeMap<TaskStatus, Vec<Task>> {
        let mut columns: BTreeMap<TaskStatus, Vec<Task>> = BTreeMap::new();
        for task in self.inner.snapshot() {
            columns.entry(task.status).or_default().push(task);
        }
        columns
    }

    pub fn for_sprint(&self, sprint_id: i64) -> Vec<Task> {
        self.inner
            .snapshot()
            .into_iter()
            .filter(|t| t.sprint_id == Some(sprint_id))
            .collect()
    }

    /// Discard tasks and any pending status changes.
    pub fn clear(&self) {
        self.pending.clear();
        self.inner.clear();
    }
}

impl Deref for TaskStore {
    type Target = ResourceStore<TasksApi>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpClient;
    use crate::session::Session;
    use crate::storage::Storage;
    use crate::test_support::{MockBackend, task_json};
    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::routing::{get, patch};
    use axum::{Json, Router};
    use serde_json::{Value, json};
    use tokio::sync::{Mutex as AsyncMutex, oneshot};

    fn store_for(url: &str) -> TaskStore {
        let session = Arc::new(Session::new(Arc::new(Storage::in_memory())));
        TaskStore::new(TasksApi::new(HttpClient::new(url, session)))
    }

    fn task_router() -> Router {
        Router::new()
            .route(
                "/tasks",
                get(|| async { Json(json!([task_json(1, "todo"), task_json(2, "in_progress")])) }),
            )
            .route(
                "/tasks/{id}/status",
                patch(|Path(id): Path<i64>, Json(body): Json<Value>| async move {
                    let status = body["status"].as_str().unwrap_or("todo").to_string();
                    let mut task = task_json(id, &status);
                    // A server that also touched other fields.
                    task["title"] = json!("Changed by server");
                    Json(task)
                }),
            )
    }

    #[tokio::test]
    async fn test_status_success_updates_only_status() {
        let backend = MockBackend::start(task_router()).await;
        let store = store_for(&backend.url());
        store.fetch_all(None).await.unwrap();
        let before = store.get(1).unwrap();

        store.update_status(1, TaskStatus::Done).await.unwrap();

        let after = store.get(1).unwrap();
        assert_eq!(after.status, TaskStatus::Done);
        assert_eq!(after.title, before.title);
        assert_eq!(after.updated_at, before.updated_at);
        assert!(store.pending().is_empty());
    }

    #[tokio::test]
    async fn test_status_failure_rolls_back() {
        let router = Router::new()
            .route("/tasks", get(|| async { Json(json!([task_json(1, "todo")])) }))
            .route(
                "/tasks/{id}/status",
                patch(|| async { (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({"message": "locked"}))) }),
            );
        let backend = MockBackend::start(router).await;
        let store = store_for(&backend.url());
        store.fetch_all(None).await.unwrap();

        let err = store.update_status(1, TaskStatus::Done).await.unwrap_err();
        assert_eq!(err.status(), Some(422));
        assert_eq!(store.get(1).unwrap().status, TaskStatus::Todo);
        assert!(store.pending().is_empty());
    }

    type Gate = Arc<AsyncMutex<Option<oneshot::Receiver<()>>>>;

    /// The status endpoint parks until the test releases it, then fails.
    fn parked_router(gate: Gate) -> Router {
        Router::new()
            .route("/tasks", get(|| async { Json(json!([task_json(1, "todo")])) }))
            .route(
                "/tasks/{id}/status",
                patch(|State(gate): State<Gate>| async move {
                    let rx = gate.lock().await.take();
                    if let Some(rx) = rx {
                        let _ = rx.await;
                        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"message": "late failure"})));
                    }
                    (StatusCode::OK, Json(task_json(1, "review")))
                }),
            )
            .with_state(gate)
    }

    #[tokio::test]
    async fn test_older_failure_does_not_clobber_newer_change() {
        let (release, parked) = oneshot::channel();
        let gate: Gate = Arc::new(AsyncMutex::new(Some(parked)));
        let backend = MockBackend::start(parked_router(gate.clone())).await;
        let store = Arc::new(store_for(&backend.url()));
        store.fetch_all(None).await.unwrap();

        // First change parks on the server.
        let first = {
            let store = store.clone();
            tokio::spawn(async move { store.update_status(1, TaskStatus::InProgress).await })
        };
        // Wait until the server is holding the first request.
        while gate.lock().await.is_some() {
            tokio::task::yield_now().await;
        }
        assert_eq!(store.get(1).unwrap().status, TaskStatus::InProgress);

        // Second change succeeds while the first is still in flight.
        store.update_status(1, TaskStatus::Review).await.unwrap();
        assert_eq!(store.get(1).unwrap().status, TaskStatus::Review);

        release.send(()).unwrap();
        assert!(first.await.unwrap().is_err());
        assert_eq!(store.get(1).unwrap().status, TaskStatus::Review);
        assert!(store.pending().is_empty());
    }

    #[test]
    fn test_ledger_hands_previous_to_newer_record() {
        let ledger = PendingLedger::default();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        ledger.push(PendingStatus {
            tag: a,
            task_id: 1,
            previous: TaskStatus::Todo,
            next: TaskStatus::InProgress,
        });
        ledger.push(PendingStatus {
            tag: b,
            task_id: 1,
            previous: TaskStatus::InProgress,
            next: TaskStatus::Done,
        });

        // Older fails: newer now remembers the original status.
        assert_eq!(ledger.rollback(a), None);
        assert_eq!(ledger.pending_for(1)[0].previous, TaskStatus::Todo);
        // Newer fails: back to the original.
        assert_eq!(ledger.rollback(b), Some(TaskStatus::Todo));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_confirmed_change_supersedes_older_records() {
        let ledger = PendingLedger::default();
        let (a, b, other) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        ledger.push(PendingStatus {
            tag: a,
            task_id: 1,
            previous: TaskStatus::Todo,
            next: TaskStatus::InProgress,
        });
        ledger.push(PendingStatus {
            tag: other,
            task_id: 2,
            previous: TaskStatus::Todo,
            next: TaskStatus::Done,
        });
        ledger.push(PendingStatus {
            tag: b,
            task_id: 1,
            previous: TaskStatus::InProgress,
            next: TaskStatus::Review,
        });

        ledger.settle(b);
        assert!(ledger.pending_for(1).is_empty());
        assert_eq!(ledger.pending_for(2).len(), 1);
        assert_eq!(ledger.rollback(a), None);
    }

    #[tokio::test]
    async fn test_fetch_reapplies_pending_status() {
        let backend = MockBackend::start(task_router()).await;
        let store = store_for(&backend.url());
        store.fetch_all(None).await.unwrap();
        store.pending.push(PendingStatus {
            tag: Uuid::new_v4(),
            task_id: 2,
            previous: TaskStatus::InProgress,
            next: TaskStatus::Review,
        });

        store.fetch_all(None).await.unwrap();
        assert_eq!(store.get(2).unwrap().status, TaskStatus::Review);
        assert_eq!(store.get(1).unwrap().status, TaskStatus::Todo);
    }

    #[tokio::test]
    async fn test_status_on_uncached_task_takes_server_copy() {
        let backend = MockBackend::start(task_router()).await;
        let store = store_for(&backend.url());
        store.update_status(9, TaskStatus::Done).await.unwrap();
        let task = store.get(9).unwrap();
        assert_eq!(task.status, TaskStatus::Done);
        assert_eq!(task.title, "Changed by server");
    }

    #[tokio::test]
    async fn test_board_groups_by_status() {
        let backend = MockBackend::start(task_router()).await;
        let store = store_for(&backend.url());
        store.fetch_all(None).await.unwrap();
        let board = store.board();
        assert_eq!(board[&TaskStatus::Todo].len(), 1);
        assert_eq!(board[&TaskStatus::InProgress].len(), 1);
        assert!(!board.contains_key(&TaskStatus::Done));
    }
}
