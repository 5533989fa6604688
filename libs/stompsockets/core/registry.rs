//! Subscription registry
//!
//! Maps topics to their ordered listener lists. The registry outlives every
//! connection: it is the source of truth for what gets re-subscribed after a
//! reconnect.

use crate::events::{InboundMessage, Topic};
use crate::listener::EventListener;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, warn};

/// Identifies one registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

type SharedListener = Arc<dyn EventListener<InboundMessage>>;

/// Outcome of removing a registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    pub topic: Topic,
    /// The topic has no listeners left
    pub last: bool,
}

#[derive(Default)]
struct Inner {
    topics: HashMap<Topic, Vec<(SubscriptionId, SharedListener)>>,
    owners: HashMap<SubscriptionId, Topic>,
}

#[derive(Default)]
pub struct SubscriptionRegistry {
    inner: RwLock<Inner>,
    next_id: AtomicU64,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener to `topic`
    ///
    /// Returns the registration id and whether it is the topic's first listener.
    pub fn add(&self, topic: Topic, listener: SharedListener) -> (SubscriptionId, bool) {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut inner = self.inner.write();

        let listeners = inner.topics.entry(topic.clone()).or_default();
        let first = listeners.is_empty();
        listeners.push((id, listener));
        inner.owners.insert(id, topic);

        (id, first)
    }

    /// Remove one registration
    ///
    /// `None` when it was already removed.
    pub fn remove(&self, id: SubscriptionId) -> Option<Removal> {
        let mut inner = self.inner.write();
        let topic = inner.owners.remove(&id)?;

        let last = match inner.topics.get_mut(&topic) {
            Some(listeners) => {
                listeners.retain(|(existing, _)| *existing != id);
                listeners.is_empty()
            }
            None => true,
        };
        if last {
            inner.topics.remove(&topic);
        }

        Some(Removal { topic, last })
    }

    /// Deliver `message` to every listener of its topic, in registration order
    ///
    /// Listeners run outside the lock, so they may subscribe or unsubscribe
    /// from inside the callback; such changes apply from the next dispatch.
    /// A failing or panicking listener is logged and skipped.
    ///
    /// Returns the number of listeners invoked.
    pub fn dispatch(&self, message: &InboundMessage) -> usize {
        let listeners: Vec<(SubscriptionId, SharedListener)> = {
            let inner = self.inner.read();
            match inner.topics.get(&message.topic) {
                Some(listeners) => listeners.clone(),
                None => return 0,
            }
        };

        for (id, listener) in &listeners {
            match catch_unwind(AssertUnwindSafe(|| listener.on_event(message))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!("Listener {} for '{}' failed: {}", id.0, message.topic, e);
                }
                Err(_) => {
                    error!("Listener {} for '{}' panicked", id.0, message.topic);
                }
            }
        }

        listeners.len()
    }

    /// Topics with at least one listener
    pub fn topics_snapshot(&self) -> BTreeSet<Topic> {
        self.inner.read().topics.keys().cloned().collect()
    }

    pub fn listener_count(&self, topic: &str) -> usize {
        self.inner
            .read()
            .topics
            .get(topic)
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn has_listeners(&self, topic: &str) -> bool {
        self.listener_count(topic) > 0
    }
}

/// Box a listener closure for [`SubscriptionRegistry::add`]
pub(crate) fn shared<L>(listener: L) -> SharedListener
where
    L: EventListener<InboundMessage>,
{
    Arc::new(listener)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result as ListenerResult, StompSocketError};
    use parking_lot::Mutex;
    use serde_json::json;

    fn topic(name: &str) -> Topic {
        Topic::new(name).unwrap()
    }

    fn message(name: &str) -> InboundMessage {
        InboundMessage::decode(topic(name), json!({"n": 1})).unwrap()
    }

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, label: &'static str) -> SharedListener {
        let log = Arc::clone(log);
        shared(move |_: &InboundMessage| -> ListenerResult<()> {
            log.lock().push(label);
            Ok(())
        })
    }

    #[test]
    fn delivers_in_registration_order() {
        let registry = SubscriptionRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let (_, first) = registry.add(topic("a"), recorder(&log, "one"));
        let (_, second) = registry.add(topic("a"), recorder(&log, "two"));
        registry.add(topic("b"), recorder(&log, "other"));

        assert!(first);
        assert!(!second);
        assert_eq!(registry.dispatch(&message("a")), 2);
        assert_eq!(*log.lock(), vec!["one", "two"]);
    }

    #[test]
    fn remove_is_idempotent_and_reports_last() {
        let registry = SubscriptionRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let (one, _) = registry.add(topic("a"), recorder(&log, "one"));
        let (two, _) = registry.add(topic("a"), recorder(&log, "two"));

        assert_eq!(registry.remove(one), Some(Removal { topic: topic("a"), last: false }));
        assert_eq!(registry.remove(one), None);
        assert_eq!(registry.remove(two), Some(Removal { topic: topic("a"), last: true }));
        assert!(registry.topics_snapshot().is_empty());
        assert_eq!(registry.dispatch(&message("a")), 0);
    }

    #[test]
    fn failing_listeners_do_not_stop_delivery() {
        let registry = SubscriptionRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        registry.add(
            topic("a"),
            shared(|_: &InboundMessage| -> ListenerResult<()> {
                Err(StompSocketError::Listener("boom".to_string()))
            }),
        );
        registry.add(
            topic("a"),
            shared(|_: &InboundMessage| -> ListenerResult<()> { panic!("listener bug") }),
        );
        registry.add(topic("a"), recorder(&log, "survivor"));

        assert_eq!(registry.dispatch(&message("a")), 3);
        assert_eq!(*log.lock(), vec!["survivor"]);
    }

    #[test]
    fn listener_may_subscribe_during_dispatch() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        let inner_registry = Arc::clone(&registry);
        let inner_log = Arc::clone(&log);
        registry.add(
            topic("a"),
            shared(move |_: &InboundMessage| -> ListenerResult<()> {
                inner_registry.add(topic("a"), recorder(&inner_log, "late"));
                Ok(())
            }),
        );

        assert_eq!(registry.dispatch(&message("a")), 1);
        assert!(log.lock().is_empty());
        assert_eq!(registry.listener_count("a"), 2);
    }

    #[test]
    fn snapshot_lists_each_topic_once() {
        let registry = SubscriptionRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.add(topic("b"), recorder(&log, "x"));
        registry.add(topic("a"), recorder(&log, "y"));
        registry.add(topic("b"), recorder(&log, "z"));

        let topics: Vec<_> = registry.topics_snapshot().into_iter().collect();
        assert_eq!(topics, vec![topic("a"), topic("b")]);
        assert!(registry.has_listeners("b"));
    }
}
