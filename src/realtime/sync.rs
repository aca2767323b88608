//! Wiring from realtime events into the stores.
//!
//! Payloads are decoded with the same response schemas as the REST layer and
//! merged with the stores' usual rule: match by id, last write observed wins.
//! A payload may carry the entity under its own key (`{"task": {...}}`) or be
//! the entity itself; `"action": "deleted"` removes it instead.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::de::DeserializeOwned;
use serde_json::Value;
use sprintboard_common::{Notification, Sprint, Task};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::{
    Broadcaster, NOTIFICATION_NEW, SPRINT_UPDATED, Scope, Subscription, TASK_UPDATED, subscribe,
};
use crate::api::sprints::SprintResource;
use crate::api::tasks::TaskResource;
use crate::errors::ApiError;
use crate::store::{SprintStore, TaskStore};

const INBOX_CAPACITY: usize = 100;

/// What an event asks the store to do.
#[derive(Debug, PartialEq)]
enum Change<T> {
    Upsert(T),
    Remove(i64),
}

fn extract<W, T>(payload: &Value, key: &str) -> Result<Change<T>, String>
where
    W: DeserializeOwned + TryInto<T, Error = ApiError>,
{
    let body = payload.get(key).unwrap_or(payload);
    if payload.get("action").and_then(Value::as_str) == Some("deleted") {
        return body
            .get("id")
            .and_then(Value::as_i64)
            .map(Change::Remove)
            .ok_or_else(|| format!("{} deletion without id", key));
    }
    let wire: W = serde_json::from_value(body.clone()).map_err(|e| e.to_string())?;
    wire.try_into().map(Change::Upsert).map_err(|e| e.to_string())
}

/// Keep the task and sprint stores in sync with a project's channel.
pub fn sync_project(
    broadcaster: Arc<dyn Broadcaster>,
    project_id: i64,
    tasks: Arc<TaskStore>,
    sprints: Arc<SprintStore>,
) -> Subscription {
    subscribe(
        broadcaster,
        Scope::Project(project_id),
        &[TASK_UPDATED, SPRINT_UPDATED],
        move |event, payload| match event {
            TASK_UPDATED => match extract::<TaskResource, Task>(payload, "task") {
                Ok(Change::Upsert(task)) => tasks.apply_remote(task),
                Ok(Change::Remove(id)) => tasks.forget_remote(id),
                Err(e) => warn!(event, error = %e, "ignoring undecodable task event"),
            },
            SPRINT_UPDATED => match extract::<SprintResource, Sprint>(payload, "sprint") {
                Ok(Change::Upsert(sprint)) => sprints.apply_remote(sprint),
                Ok(Change::Remove(id)) => sprints.forget_remote(id),
                Err(e) => warn!(event, error = %e, "ignoring undecodable sprint event"),
            },
            _ => {}
        },
    )
}

/// Most recent notifications pushed to the current user, newest first.
pub struct NotificationInbox {
    items: Mutex<VecDeque<Notification>>,
    tx: broadcast::Sender<Notification>,
}

impl Default for NotificationInbox {
    fn default() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self {
            items: Mutex::new(VecDeque::new()),
            tx,
        }
    }
}

impl NotificationInbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Notification>> {
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push(&self, notification: Notification) {
        {
            let mut items = self.lock();
            items.retain(|n| n.id != notification.id);
            items.push_front(notification.clone());
            items.truncate(INBOX_CAPACITY);
        }
        let _ = self.tx.send(notification);
    }

    pub fn items(&self) -> Vec<Notification> {
        self.lock().iter().cloned().collect()
    }

    pub fn unread(&self) -> usize {
        self.lock().iter().filter(|n| !n.read).count()
    }

    pub fn mark_all_read(&self) {
        for n in self.lock().iter_mut() {
            n.read = true;
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

/// Feed a user's notifications into `inbox`.
pub fn sync_notifications(
    broadcaster: Arc<dyn Broadcaster>,
    user_id: i64,
    inbox: Arc<NotificationInbox>,
) -> Subscription {
    subscribe(
        broadcaster,
        Scope::User(user_id),
        &[NOTIFICATION_NEW],
        move |event, payload| {
            let body = payload.get("notification").unwrap_or(payload);
            match serde_json::from_value::<Notification>(body.clone()) {
                Ok(notification) => {
                    debug!(id = %notification.id, "notification received");
                    inbox.push(notification);
                }
                Err(e) => warn!(event, error = %e, "ignoring undecodable notification"),
            }
        },
    )
}
