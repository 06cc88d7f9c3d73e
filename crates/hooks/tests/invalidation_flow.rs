//! Hooks wired to a registry and an `InvalidationBus`, driven the way the
//! session loop drives them: broker subscribe on connect, MESSAGE frames
//! routed by destination and subscription id.

use std::sync::{Arc, Mutex};

use patientflow_core::topics::{branch_queue_topic, patient_topic, QUEUE_TOPIC};
use patientflow_hooks::cache::{PATIENT_NOTIFICATIONS, PORTAL_DASHBOARD, PORTAL_QUEUES, QUEUE_ENTRIES};
use patientflow_hooks::{
    HookState, InvalidationBus, Notifier, PatientKeys, PatientRealtime, QueryCache, QueryKey,
    QueueBoardRealtime,
};
use patientflow_realtime::link::{BrokerLink, BrokerSubscriptionId};
use patientflow_realtime::{Realtime, TopicRegistry};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Link whose connectivity the test toggles.
#[derive(Default)]
struct ToggleLink {
    connected: Mutex<bool>,
    log: Mutex<Vec<String>>,
    next: Mutex<u64>,
}

impl ToggleLink {
    fn set_connected(&self, connected: bool) {
        *self.connected.lock().unwrap() = connected;
    }

    fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

impl BrokerLink for ToggleLink {
    fn subscribe(&self, topic: &str) -> Option<BrokerSubscriptionId> {
        if !*self.connected.lock().unwrap() {
            return None;
        }
        let mut next = self.next.lock().unwrap();
        *next += 1;
        self.log.lock().unwrap().push(format!("SUBSCRIBE {topic}"));
        Some(BrokerSubscriptionId::new(format!("sub-{next}")))
    }

    fn unsubscribe(&self, id: &BrokerSubscriptionId) {
        if *self.connected.lock().unwrap() {
            self.log.lock().unwrap().push(format!("UNSUBSCRIBE {id}"));
        }
    }
}

#[derive(Default)]
struct Toasts(Mutex<Vec<String>>);

impl Notifier for Toasts {
    fn info(&self, message: &str) {
        self.0.lock().unwrap().push(message.to_string());
    }
}

struct Fixture {
    link: Arc<ToggleLink>,
    registry: Arc<TopicRegistry>,
    bus: Arc<InvalidationBus>,
    toasts: Arc<Toasts>,
}

impl Fixture {
    fn new() -> Self {
        let link = Arc::new(ToggleLink::default());
        let registry = TopicRegistry::new(Arc::clone(&link) as Arc<dyn BrokerLink>);
        Self {
            link,
            registry,
            bus: Arc::new(InvalidationBus::default()),
            toasts: Arc::default(),
        }
    }

    fn realtime(&self) -> Realtime {
        Realtime::new(Arc::clone(&self.registry))
    }

    fn cache(&self) -> Arc<dyn QueryCache> {
        Arc::clone(&self.bus) as Arc<dyn QueryCache>
    }

    fn notifier(&self) -> Arc<dyn Notifier> {
        Arc::clone(&self.toasts) as Arc<dyn Notifier>
    }

    /// What the session loop does on CONNECTED.
    fn connect(&self) -> usize {
        self.link.set_connected(true);
        self.registry.resubscribe_all()
    }

    /// What the connection task does when a session ends.
    fn disconnect(&self) {
        self.link.set_connected(false);
        self.registry.reset_broker_subscriptions();
    }

    /// Route a MESSAGE frame the way the session does.
    fn message(&self, topic: &str, body: &str) -> usize {
        let sub = self
            .registry
            .broker_subscription(topic)
            .map(|id| id.as_str().to_string());
        self.registry.deliver(topic, sub.as_deref(), body)
    }
}

fn drain(rx: &mut broadcast::Receiver<QueryKey>) -> Vec<String> {
    let mut keys = Vec::new();
    while let Ok(key) = rx.try_recv() {
        keys.push(key.root().to_string());
    }
    keys
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn hooks_mounted_offline_start_receiving_after_connect() {
    let fx = Fixture::new();
    let mut rx = fx.bus.subscribe();
    let tenant = uuid::Uuid::new_v4();
    let patient = uuid::Uuid::new_v4();
    let branch = uuid::Uuid::new_v4();

    let hook = PatientRealtime::mount(
        fx.realtime(),
        fx.cache(),
        fx.notifier(),
        PatientKeys::new(Some(tenant), Some(patient), Some(branch)),
    );
    let board = QueueBoardRealtime::mount(fx.realtime(), fx.cache(), fx.notifier());
    assert_eq!(hook.state(), HookState::Subscribed);
    assert_eq!(board.state(), HookState::Subscribed);
    assert!(fx.link.log().is_empty());

    assert_eq!(fx.connect(), 3);

    fx.message(&patient_topic(patient), r#"{"type":"PHARMACY","body":"Ready for pickup"}"#);
    fx.message(&branch_queue_topic(branch), r#"{"type":"QUEUE_REFRESH"}"#);
    fx.message(QUEUE_TOPIC, r#"{"type":"QUEUE_REFRESH"}"#);

    assert_eq!(
        drain(&mut rx),
        vec![PATIENT_NOTIFICATIONS, PORTAL_DASHBOARD, PORTAL_QUEUES, QUEUE_ENTRIES]
    );
    assert_eq!(*fx.toasts.0.lock().unwrap(), vec!["Ready for pickup"]);
}

#[test]
fn reconnect_restores_hook_delivery() {
    let fx = Fixture::new();
    let mut rx = fx.bus.subscribe();
    fx.connect();
    let _board = QueueBoardRealtime::mount(fx.realtime(), fx.cache(), fx.notifier());
    let before = fx.registry.broker_subscription(QUEUE_TOPIC).unwrap();

    fx.disconnect();
    assert_eq!(fx.message(QUEUE_TOPIC, r#"{"type":"QUEUE_REFRESH"}"#), 1);
    drain(&mut rx);

    assert_eq!(fx.connect(), 1);
    let after = fx.registry.broker_subscription(QUEUE_TOPIC).unwrap();
    assert_ne!(before, after);

    // A late frame from the old subscription is dropped.
    assert_eq!(
        fx.registry
            .deliver(QUEUE_TOPIC, Some(before.as_str()), r#"{"type":"QUEUE_REFRESH"}"#),
        0
    );
    assert_eq!(fx.message(QUEUE_TOPIC, r#"{"type":"PATIENT_CALLED"}"#), 1);
    assert_eq!(drain(&mut rx), vec![QUEUE_ENTRIES]);
}

#[test]
fn switching_patient_unsubscribes_previous_topic() {
    let fx = Fixture::new();
    fx.connect();
    let tenant = uuid::Uuid::new_v4();
    let first = uuid::Uuid::new_v4();
    let second = uuid::Uuid::new_v4();

    let mut hook = PatientRealtime::mount(
        fx.realtime(),
        fx.cache(),
        fx.notifier(),
        PatientKeys::new(Some(tenant), Some(first), None),
    );
    hook.update(PatientKeys::new(Some(tenant), Some(second), None));

    assert_eq!(
        fx.link.log(),
        vec![
            format!("SUBSCRIBE {}", patient_topic(first)),
            "UNSUBSCRIBE sub-1".to_string(),
            format!("SUBSCRIBE {}", patient_topic(second)),
        ]
    );
    assert_eq!(fx.registry.active_topics(), vec![patient_topic(second)]);
}

#[test]
fn malformed_payload_does_not_reach_hooks() {
    let fx = Fixture::new();
    let mut rx = fx.bus.subscribe();
    fx.connect();
    let _board = QueueBoardRealtime::mount(fx.realtime(), fx.cache(), fx.notifier());

    assert_eq!(fx.message(QUEUE_TOPIC, "not json"), 0);
    assert_eq!(fx.message(QUEUE_TOPIC, r#""QUEUE_REFRESH""#), 0);
    assert_eq!(fx.message(QUEUE_TOPIC, r#"{"type":"QUEUE_REFRESH"}"#), 1);
    assert_eq!(drain(&mut rx), vec![QUEUE_ENTRIES]);
}
