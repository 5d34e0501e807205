/// Change-notification source seam.
///
/// The reconciler never talks to the backend directly.  It hands a
/// [`NotificationSource`] a watch list and a channel sender, and receives
/// [`SourceEvent`]s back on that channel until it drops the receiver or
/// cancels the returned [`Subscription`].
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tokio::sync::mpsc;

use crate::entity::{ChangeNotification, EntityKind};

/// One entry in a subscription's watch list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchSpec {
    pub entity: EntityKind,
    /// Scope key (user id) for user-filtered entities; `None` watches every
    /// row of the entity.
    pub filter: Option<String>,
}

impl WatchSpec {
    pub fn scoped(entity: EntityKind, user_id: &str) -> Self {
        Self { entity, filter: Some(user_id.to_string()) }
    }

    pub fn unscoped(entity: EntityKind) -> Self {
        Self { entity, filter: None }
    }

    /// True when a change to `entity` published under `scope` should be
    /// delivered to a subscriber holding this spec.  A scoped spec never
    /// matches an unscoped publish.
    pub fn matches(&self, entity: EntityKind, scope: Option<&str>) -> bool {
        self.entity == entity
            && match self.filter.as_deref() {
                Some(wanted) => scope == Some(wanted),
                None => true,
            }
    }
}

/// True when any spec in `specs` matches the published change.
pub fn matches_specs(specs: &[WatchSpec], entity: EntityKind, scope: Option<&str>) -> bool {
    specs.iter().any(|s| s.matches(entity, scope))
}

/// Connection-level updates, interleaved with changes on the same channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Subscribed,
    Closed,
    Error(String),
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubscriptionStatus::Subscribed => f.write_str("subscribed"),
            SubscriptionStatus::Closed => f.write_str("closed"),
            SubscriptionStatus::Error(e) => write!(f, "error: {e}"),
        }
    }
}

/// All events funnelled to the reconciler through one mpsc channel.
#[derive(Debug, Clone)]
pub enum SourceEvent {
    Change(ChangeNotification),
    Status(SubscriptionStatus),
}

/// A cancellable handle to an established subscription.
///
/// Delivery stops when [`unsubscribe`](Subscription::unsubscribe) is called or
/// the handle is dropped; both paths run the teardown closure exactly once.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self { cancel: Some(Box::new(cancel)) }
    }

    pub fn unsubscribe(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Establishes delivery of matching change notifications into `tx`.
///
/// `subscribe` must send [`SubscriptionStatus::Subscribed`] once delivery is
/// live, and should send [`SubscriptionStatus::Closed`] when the stream ends
/// on its own.  Implementations must not block.
pub trait NotificationSource {
    fn subscribe(&self, specs: &[WatchSpec], tx: mpsc::Sender<SourceEvent>)
        -> Result<Subscription>;
}

// ── In-process source ─────────────────────────────────────────────────────────

struct Subscriber {
    specs: Vec<WatchSpec>,
    tx: mpsc::Sender<SourceEvent>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    subscribers: HashMap<u64, Subscriber>,
}

/// An in-process [`NotificationSource`]: publishers call
/// [`publish`](ChannelSource::publish) and every live subscriber whose watch
/// list matches receives the change.  Used by embedders that already hold the
/// backend connection, and by the reconciler's own tests.
#[derive(Default, Clone)]
pub struct ChannelSource {
    registry: Arc<Mutex<Registry>>,
}

impl ChannelSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers `(entity, payload)` to every matching subscriber.  `scope` is
    /// the user id the mutated row belongs to, or `None` for campus-wide
    /// tables.  A subscriber with a full channel misses this change.
    pub fn publish(&self, entity: EntityKind, scope: Option<&str>, payload: serde_json::Value) {
        let registry = self.registry.lock().unwrap();
        for sub in registry.subscribers.values() {
            if matches_specs(&sub.specs, entity, scope) {
                let note = ChangeNotification { entity, payload: payload.clone() };
                // try_send is non-blocking; a full channel silently drops this
                // change for that subscriber.
                let _ = sub.tx.try_send(SourceEvent::Change(note));
            }
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.registry.lock().unwrap().subscribers.len()
    }
}

impl NotificationSource for ChannelSource {
    fn subscribe(&self, specs: &[WatchSpec], tx: mpsc::Sender<SourceEvent>)
        -> Result<Subscription> {
        let id = {
            let mut registry = self.registry.lock().unwrap();
            let id = registry.next_id;
            registry.next_id += 1;
            let _ = tx.try_send(SourceEvent::Status(SubscriptionStatus::Subscribed));
            registry.subscribers.insert(id, Subscriber { specs: specs.to_vec(), tx });
            id
        };

        let registry = Arc::clone(&self.registry);
        Ok(Subscription::new(move || {
            registry.lock().unwrap().subscribers.remove(&id);
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityKind::*;

    fn drain_changes(rx: &mut mpsc::Receiver<SourceEvent>) -> Vec<EntityKind> {
        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let SourceEvent::Change(note) = event {
                kinds.push(note.entity);
            }
        }
        kinds
    }

    // ── WatchSpec::matches ────────────────────────────────────────────────────

    #[test]
    fn unscoped_spec_matches_any_scope() {
        let spec = WatchSpec::unscoped(Event);
        assert!(spec.matches(Event, None));
        assert!(spec.matches(Event, Some("u1")));
    }

    #[test]
    fn scoped_spec_matches_only_its_user() {
        let spec = WatchSpec::scoped(CheckIn, "u1");
        assert!(spec.matches(CheckIn, Some("u1")));
        assert!(!spec.matches(CheckIn, Some("u2")));
        assert!(!spec.matches(CheckIn, None));
    }

    #[test]
    fn spec_never_matches_a_different_entity() {
        let spec = WatchSpec::unscoped(Event);
        assert!(!spec.matches(Product, None));
    }

    #[test]
    fn matches_specs_checks_the_whole_list() {
        let specs = vec![WatchSpec::scoped(CheckIn, "u1"), WatchSpec::unscoped(Event)];
        assert!(matches_specs(&specs, Event, None));
        assert!(matches_specs(&specs, CheckIn, Some("u1")));
        assert!(!matches_specs(&specs, Streak, Some("u1")));
    }

    // ── ChannelSource ─────────────────────────────────────────────────────────

    #[test]
    fn subscribe_reports_subscribed_status_first() {
        let source = ChannelSource::new();
        let (tx, mut rx) = mpsc::channel(8);
        let _sub = source.subscribe(&[WatchSpec::unscoped(Event)], tx).unwrap();

        match rx.try_recv().unwrap() {
            SourceEvent::Status(status) => assert_eq!(status, SubscriptionStatus::Subscribed),
            other => panic!("expected status event, got {other:?}"),
        }
    }

    #[test]
    fn publish_delivers_to_matching_subscriber() {
        let source = ChannelSource::new();
        let (tx, mut rx) = mpsc::channel(8);
        let _sub = source
            .subscribe(&[WatchSpec::scoped(CheckIn, "u1"), WatchSpec::unscoped(Event)], tx)
            .unwrap();

        source.publish(CheckIn, Some("u1"), serde_json::json!({"points": 5}));
        source.publish(Event, None, serde_json::Value::Null);

        assert_eq!(drain_changes(&mut rx), vec![CheckIn, Event]);
    }

    #[test]
    fn publish_skips_other_users_rows() {
        let source = ChannelSource::new();
        let (tx, mut rx) = mpsc::channel(8);
        let _sub = source
            .subscribe(&[WatchSpec::scoped(CheckIn, "u1")], tx)
            .unwrap();

        source.publish(CheckIn, Some("u2"), serde_json::Value::Null);

        assert!(drain_changes(&mut rx).is_empty());
    }

    #[test]
    fn publish_skips_unwatched_entities() {
        let source = ChannelSource::new();
        let (tx, mut rx) = mpsc::channel(8);
        let _sub = source.subscribe(&[WatchSpec::unscoped(Event)], tx).unwrap();

        source.publish(Product, None, serde_json::Value::Null);

        assert!(drain_changes(&mut rx).is_empty());
    }

    #[test]
    fn unsubscribe_removes_the_subscriber() {
        let source = ChannelSource::new();
        let (tx, mut rx) = mpsc::channel(8);
        let mut sub = source.subscribe(&[WatchSpec::unscoped(Event)], tx).unwrap();
        assert_eq!(source.subscriber_count(), 1);

        sub.unsubscribe();
        assert_eq!(source.subscriber_count(), 0);

        source.publish(Event, None, serde_json::Value::Null);
        assert!(drain_changes(&mut rx).is_empty());
    }

    #[test]
    fn unsubscribe_twice_is_a_noop() {
        let source = ChannelSource::new();
        let (tx, _rx) = mpsc::channel(8);
        let mut sub = source.subscribe(&[WatchSpec::unscoped(Event)], tx).unwrap();
        sub.unsubscribe();
        sub.unsubscribe();
        assert_eq!(source.subscriber_count(), 0);
    }

    #[test]
    fn dropping_the_handle_unsubscribes() {
        let source = ChannelSource::new();
        let (tx, _rx) = mpsc::channel(8);
        let sub = source.subscribe(&[WatchSpec::unscoped(Event)], tx).unwrap();
        drop(sub);
        assert_eq!(source.subscriber_count(), 0);
    }
}
