use std::sync::Mutex;

use serde_json::Value;
use tracing::debug;

use super::{Broadcaster, Callback, HandlerId, HandlerRegistry};

/// In-process broadcaster for tests and offline use.
#[derive(Default)]
pub struct LocalBroadcaster {
    registry: HandlerRegistry,
    history: Mutex<Vec<Membership>>,
}

/// Channel membership changes, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Membership {
    Joined(String),
    Left(String),
}

impl LocalBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an event as if the service had pushed it; returns how many handlers ran.
    pub fn publish(&self, channel: &str, event: &str, payload: &Value) -> usize {
        self.registry.dispatch(channel, event, payload)
    }

    /// Channels with at least one binding.
    pub fn joined(&self) -> Vec<String> {
        self.registry.channels()
    }

    pub fn history(&self) -> Vec<Membership> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }

    fn record(&self, change: Membership) {
        debug!(?change, "local channel membership");
        if let Ok(mut history) = self.history.lock() {
            history.push(change);
        }
    }
}

impl Broadcaster for LocalBroadcaster {
    fn bind(&self, channel: &str, event: &str, callback: Callback) -> HandlerId {
        let (id, first) = self.registry.bind(channel, event, callback);
        if first {
            self.record(Membership::Joined(channel.to_string()));
        }
        id
    }

    fn unbind(&self, channel: &str, id: HandlerId) {
        if self.registry.unbind(channel, id) {
            self.record(Membership::Left(channel.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::realtime::{NOTIFICATION_NEW, Scope, TASK_UPDATED, subscribe};
    use serde_json::json;

    #[test]
    fn test_subscription_receives_until_disposed() {
        let local = Arc::new(LocalBroadcaster::new());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let mut sub = subscribe(local.clone(), Scope::Project(1), &[TASK_UPDATED], move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(local.publish("private-project.1", TASK_UPDATED, &json!({})), 1);
        sub.unsubscribe();
        sub.unsubscribe();
        assert_eq!(local.publish("private-project.1", TASK_UPDATED, &json!({})), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(
            local.history(),
            vec![
                Membership::Joined("private-project.1".into()),
                Membership::Left("private-project.1".into()),
            ]
        );
    }

    #[test]
    fn test_drop_releases_bindings() {
        let local = Arc::new(LocalBroadcaster::new());
        {
            let _sub = subscribe(local.clone(), Scope::User(5), &[NOTIFICATION_NEW], |_, _| {});
            assert_eq!(local.joined(), vec!["private-user.5".to_string()]);
        }
        assert!(local.joined().is_empty());
    }

    #[test]
    fn test_channel_left_only_after_last_subscription() {
        let local = Arc::new(LocalBroadcaster::new());
        let first = subscribe(local.clone(), Scope::Project(2), &[TASK_UPDATED], |_, _| {});
        let second = subscribe(local.clone(), Scope::Project(2), &[TASK_UPDATED], |_, _| {});

        drop(first);
        assert_eq!(local.joined(), vec!["private-project.2".to_string()]);
        assert_eq!(local.publish("private-project.2", TASK_UPDATED, &json!({})), 1);

        drop(second);
        assert!(local.joined().is_empty());
        assert_eq!(local.history().len(), 2);
    }

    #[test]
    fn test_callback_sees_event_name() {
        let local = Arc::new(LocalBroadcaster::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = subscribe(
            local.clone(),
            Scope::Project(1),
            &[TASK_UPDATED, "sprint.updated"],
            move |event, payload| sink.lock().unwrap().push((event.to_string(), payload["n"].clone())),
        );
        local.publish("private-project.1", "sprint.updated", &json!({"n": 1}));
        local.publish("private-project.1", TASK_UPDATED, &json!({"n": 2}));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![("sprint.updated".to_string(), json!(1)), (TASK_UPDATED.to_string(), json!(2))]
        );
    }
}
