use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use patientflow_hooks::{
    InvalidationBus, Notifier, PatientRealtime, PollingQuery, QueryCache, QueueBoardRealtime,
    TracingNotifier,
};
use patientflow_listener::config::ListenerConfig;
use patientflow_listener::observer;
use patientflow_realtime::ConnectionManager;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "patientflow_realtime=debug,patientflow_hooks=debug,patientflow_listener=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ListenerConfig::from_env().context("Failed to load listener configuration")?;
    let url = config
        .realtime
        .transport_url()
        .context("Failed to resolve broker endpoint")?;
    tracing::info!(
        %url,
        user_id = %config.user_id,
        patient_id = ?config.patient_id,
        branch_id = ?config.branch_id,
        "Loaded listener configuration",
    );

    // --- Realtime connection ---
    let manager = ConnectionManager::new(&config.realtime)
        .context("Failed to create realtime connection manager")?;
    let events = tokio::spawn(observer::log_connection_events(manager.subscribe_events()));

    // --- Hooks ---
    let bus = Arc::new(InvalidationBus::default());
    let invalidations = tokio::spawn(observer::log_invalidations(bus.subscribe()));
    let cache = Arc::clone(&bus) as Arc<dyn QueryCache>;
    let notifier: Arc<dyn Notifier> = Arc::new(TracingNotifier);

    let patient = PatientRealtime::mount(
        manager.realtime(),
        Arc::clone(&cache),
        Arc::clone(&notifier),
        config.patient_keys(),
    );
    tracing::info!(state = ?patient.state(), "Patient realtime hook mounted");

    let board = config.queue_board.then(|| {
        QueueBoardRealtime::mount(manager.realtime(), Arc::clone(&cache), Arc::clone(&notifier))
    });

    let conversations = config
        .poll_conversations
        .then(|| PollingQuery::doctor_conversations(Arc::clone(&cache)));

    manager.activate(Some(&config.identity()));

    shutdown_signal().await;

    // --- Teardown ---
    // Hooks hold the last cache handles; dropping them closes the bus.
    drop(patient);
    drop(board);
    if let Some(poll) = conversations {
        poll.stop().await;
    }
    manager.deactivate().await;
    events.abort();

    drop(cache);
    drop(bus);
    let seen = match tokio::time::timeout(Duration::from_secs(1), invalidations).await {
        Ok(Ok(seen)) => seen,
        _ => 0,
    };

    tracing::info!(invalidations = seen, "Listener stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), shutting down");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
}
