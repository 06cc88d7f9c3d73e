//! Shared broker connection manager.
//!
//! [`ConnectionManager`] owns the single broker connection for an
//! authenticated session. It is constructed once by the embedding
//! application; [`activate`](ConnectionManager::activate) spawns the
//! connection task (connect -> session -> fixed-delay reconnect) when an
//! identity becomes available and [`deactivate`](ConnectionManager::deactivate)
//! tears it down when the identity goes away.
//!
//! Consumers never see the connection. They get a [`Realtime`] handle and
//! register topic callbacks on it; on every (re)connect the manager
//! re-issues broker subscriptions for all registered topics.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use patientflow_core::types::Identity;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::client::BrokerClient;
use crate::config::{ConfigError, RealtimeConfig};
use crate::events::{ConnectionEvent, ConnectionState};
use crate::link::{BrokerLink, StompLink};
use crate::reconnect::{retry_fixed, wait_before_retry, RECONNECT_DELAY};
use crate::registry::{Realtime, TopicRegistry};
use crate::session::{run_session, SessionContext, SessionEnd};

/// Broadcast channel capacity for connection events.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// How long `deactivate` waits for the connection task to exit.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Owns the one broker connection and the topic registry.
pub struct ConnectionManager {
    client: Arc<BrokerClient>,
    registry: Arc<TopicRegistry>,
    link: Arc<StompLink>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    event_tx: broadcast::Sender<ConnectionEvent>,
    active: Mutex<Option<ActiveConnection>>,
}

/// Bookkeeping for the running connection task.
struct ActiveConnection {
    identity: Identity,
    cancel: CancellationToken,
    task_handle: tokio::task::JoinHandle<()>,
}

impl ConnectionManager {
    /// Build a manager for the configured endpoint. Nothing connects
    /// until [`activate`](Self::activate) is called with an identity.
    pub fn new(config: &RealtimeConfig) -> Result<Self, ConfigError> {
        Ok(Self::with_client(BrokerClient::from_config(config)?))
    }

    pub fn with_client(client: BrokerClient) -> Self {
        let link = Arc::new(StompLink::new());
        let registry = TopicRegistry::new(Arc::clone(&link) as Arc<dyn BrokerLink>);
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            client: Arc::new(client),
            registry,
            link,
            state_tx: Arc::new(state_tx),
            event_tx,
            active: Mutex::new(None),
        }
    }

    /// The subscribe capability handed to hooks.
    pub fn realtime(&self) -> Realtime {
        Realtime::new(Arc::clone(&self.registry))
    }

    /// Read-only access to the registry, for diagnostics.
    pub fn registry(&self) -> &TopicRegistry {
        &self.registry
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Whether a broker session is connected right now.
    pub fn is_connected(&self) -> bool {
        self.link.is_attached()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.event_tx.subscribe()
    }

    /// Whether a connection task is running.
    pub fn is_active(&self) -> bool {
        self.lock_active().is_some()
    }

    /// Start the connection task for `identity`.
    ///
    /// No identity means no connection. Calling this while already active
    /// is a no-op; use [`sync_identity`](Self::sync_identity) to switch
    /// users. Must be called from within a tokio runtime.
    pub fn activate(&self, identity: Option<&Identity>) {
        let Some(identity) = identity else {
            tracing::debug!("No identity, realtime connection not started");
            return;
        };

        let mut active = self.lock_active();
        if active.is_some() {
            return;
        }

        let cancel = CancellationToken::new();
        let task = ConnectionTask {
            client: Arc::clone(&self.client),
            registry: Arc::clone(&self.registry),
            link: Arc::clone(&self.link),
            state_tx: Arc::clone(&self.state_tx),
            event_tx: self.event_tx.clone(),
        };
        let task_cancel = cancel.clone();
        let user_id = identity.user_id;
        let task_handle = tokio::spawn(async move {
            tracing::info!(%user_id, url = task.client.url(), "Starting realtime connection task");
            task.run(&task_cancel).await;
            tracing::info!(%user_id, "Realtime connection task exited");
        });

        *active = Some(ActiveConnection {
            identity: identity.clone(),
            cancel,
            task_handle,
        });
    }

    /// Stop the connection task and wait for it to exit. Idempotent.
    ///
    /// Registered topic callbacks are kept; they are re-subscribed when
    /// the manager is activated again.
    pub async fn deactivate(&self) {
        let Some(active) = self.lock_active().take() else {
            return;
        };

        tracing::info!(user_id = %active.identity.user_id, "Stopping realtime connection");
        active.cancel.cancel();
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, active.task_handle)
            .await
            .is_err()
        {
            tracing::warn!("Realtime connection task did not stop in time");
        }
        self.link.detach();
        self.registry.reset_broker_subscriptions();
        self.state_tx.send_replace(ConnectionState::Disconnected);
    }

    /// Follow the identity lifecycle: connect for a present identity,
    /// reconnect when it changes, disconnect when it is gone.
    pub async fn sync_identity(&self, identity: Option<&Identity>) {
        let current = self.lock_active().as_ref().map(|a| a.identity.clone());
        match (current, identity) {
            (Some(current), Some(next)) if current == *next => {}
            (Some(_), next) => {
                self.deactivate().await;
                self.activate(next);
            }
            (None, next) => self.activate(next),
        }
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveConnection>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// State moved into the spawned connection task.
struct ConnectionTask {
    client: Arc<BrokerClient>,
    registry: Arc<TopicRegistry>,
    link: Arc<StompLink>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    event_tx: broadcast::Sender<ConnectionEvent>,
}

impl ConnectionTask {
    /// Core connection loop: connect -> run session -> reconnect.
    ///
    /// Runs until the cancellation token is triggered. Failures are
    /// logged and retried every [`RECONNECT_DELAY`].
    async fn run(&self, cancel: &CancellationToken) {
        let mut epoch = 0u64;

        loop {
            self.state_tx.send_replace(ConnectionState::Connecting);
            let conn = match retry_fixed(|| self.client.connect(), RECONNECT_DELAY, cancel).await {
                Some(conn) => conn,
                None => break,
            };

            epoch += 1;
            let ctx = SessionContext {
                registry: &self.registry,
                link: &self.link,
                state_tx: &self.state_tx,
                event_tx: &self.event_tx,
                epoch,
            };
            let end = run_session(conn, &ctx, cancel).await;

            self.registry.reset_broker_subscriptions();
            self.state_tx.send_replace(ConnectionState::Disconnected);
            let _ = self.event_tx.send(ConnectionEvent::Disconnected { epoch });

            if end == SessionEnd::Cancelled || cancel.is_cancelled() {
                break;
            }

            tracing::info!(
                epoch,
                retry_in_ms = RECONNECT_DELAY.as_millis() as u64,
                "Broker connection lost, reconnecting",
            );
            if !wait_before_retry(RECONNECT_DELAY, cancel).await {
                break;
            }
        }

        self.state_tx.send_replace(ConnectionState::Disconnected);
    }
}
