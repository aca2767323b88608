//! Realtime subscriptions over a Pusher-protocol service.
//!
//! A [`Broadcaster`] delivers named events on named channels. Callers do not
//! use it directly: [`subscribe`] binds a callback to one or more events of a
//! scope's channel and returns a [`Subscription`] that unbinds everything
//! when disposed or dropped. Channel membership is reference counted, so a
//! channel is joined on its first binding and left when its last binding goes.
//!
//! Events carry no ordering, dedupe or replay guarantee.

pub mod local;
pub mod pusher;
pub mod sync;

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tracing::debug;

pub use local::LocalBroadcaster;
pub use pusher::PusherConnection;

pub const TASK_UPDATED: &str = "task.updated";
pub const SPRINT_UPDATED: &str = "sprint.updated";
pub const NOTIFICATION_NEW: &str = "notification.new";

/// What a subscription listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Project(i64),
    User(i64),
}

impl Scope {
    pub fn channel(&self) -> String {
        match self {
            Scope::Project(id) => format!("private-project.{}", id),
            Scope::User(id) => format!("private-user.{}", id),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.channel())
    }
}

/// Receives `(event, payload)`.
pub type Callback = Arc<dyn Fn(&str, &Value) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Event delivery by channel.
///
/// Implementations join a channel on its first binding and leave it when
/// the last binding is removed.
pub trait Broadcaster: Send + Sync {
    fn bind(&self, channel: &str, event: &str, callback: Callback) -> HandlerId;
    fn unbind(&self, channel: &str, id: HandlerId);
}

struct Binding {
    id: HandlerId,
    event: String,
    callback: Callback,
}

/// Bindings per channel, shared by every [`Broadcaster`] implementation.
#[derive(Default)]
pub(crate) struct HandlerRegistry {
    next_id: AtomicU64,
    channels: Mutex<HashMap<String, Vec<Binding>>>,
}

impl HandlerRegistry {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<Binding>>> {
        self.channels.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a binding; `true` when it is the channel's first.
    pub(crate) fn bind(&self, channel: &str, event: &str, callback: Callback) -> (HandlerId, bool) {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut channels = self.lock();
        let bindings = channels.entry(channel.to_string()).or_default();
        let first = bindings.is_empty();
        bindings.push(Binding {
            id,
            event: event.to_string(),
            callback,
        });
        (id, first)
    }

    /// Remove a binding; `true` when the channel has no bindings left.
    pub(crate) fn unbind(&self, channel: &str, id: HandlerId) -> bool {
        let mut channels = self.lock();
        let Some(bindings) = channels.get_mut(channel) else {
            return false;
        };
        let before = bindings.len();
        bindings.retain(|b| b.id != id);
        if before == bindings.len() {
            return false;
        }
        if bindings.is_empty() {
            channels.remove(channel);
            return true;
        }
        false
    }

    /// Drop every binding on `channel`; returns how many were dropped.
    pub(crate) fn forget(&self, channel: &str) -> usize {
        self.lock().remove(channel).map_or(0, |bindings| bindings.len())
    }

    /// Run every callback bound to `event` on `channel`; returns how many ran.
    pub(crate) fn dispatch(&self, channel: &str, event: &str, payload: &Value) -> usize {
        // Callbacks may bind or unbind, so they run outside the lock.
        let callbacks: Vec<Callback> = self
            .lock()
            .get(channel)
            .map(|bindings| {
                bindings
                    .iter()
                    .filter(|b| b.event == event)
                    .map(|b| b.callback.clone())
                    .collect()
            })
            .unwrap_or_default();
        for callback in &callbacks {
            callback(event, payload);
        }
        callbacks.len()
    }

    pub(crate) fn channels(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

/// Disposer for a set of bindings on one channel.
pub struct Subscription {
    broadcaster: Arc<dyn Broadcaster>,
    channel: String,
    handlers: Vec<HandlerId>,
}

impl Subscription {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Unbind every handler. Safe to call more than once.
    pub fn unsubscribe(&mut self) {
        if self.handlers.is_empty() {
            return;
        }
        debug!(channel = %self.channel, handlers = self.handlers.len(), "unsubscribing");
        for id in self.handlers.drain(..) {
            self.broadcaster.unbind(&self.channel, id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Bind `callback` to each of `events` on the scope's channel.
pub fn subscribe<F>(
    broadcaster: Arc<dyn Broadcaster>,
    scope: Scope,
    events: &[&str],
    callback: F,
) -> Subscription
where
    F: Fn(&str, &Value) + Send + Sync + 'static,
{
    let channel = scope.channel();
    let callback: Callback = Arc::new(callback);
    let handlers = events
        .iter()
        .map(|event| broadcaster.bind(&channel, event, callback.clone()))
        .collect();
    debug!(%channel, ?events, "subscribed");
    Subscription {
        broadcaster,
        channel,
        handlers,
    }
}
