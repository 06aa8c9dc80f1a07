// Events server
// Decision: The dispatcher runs in-process next to the HTTP server; both share one EventStore
// Decision: On shutdown stop accepting requests first, then drain the dispatcher

use std::sync::Arc;

use anyhow::{Context, Result};
use events_api::{build_router, AppState, ServerConfig, StorageBackend};
use events_core::{
    DeliveryExecutor, Dispatcher, EventStore, HttpTransport, InMemoryEventStore, RetryPolicy,
};
use events_storage::{redact, PostgresEventStore};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "events_api=debug,events_core=debug,events_storage=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("events starting...");

    let config = ServerConfig::from_env().context("Invalid configuration")?;

    let store = open_store(&config).await?;

    let transport = Arc::new(
        HttpTransport::new(config.delivery_timeout).context("Failed to build HTTP client")?,
    );
    let policy = RetryPolicy::delivery();
    tracing::info!(
        max_attempts = policy.max_attempts,
        delivery_timeout_ms = config.delivery_timeout.as_millis() as u64,
        worst_case_ms = policy.worst_case_duration(config.delivery_timeout).as_millis() as u64,
        lease_secs = config.lease_duration.as_secs(),
        "Delivery configured"
    );
    if policy.worst_case_duration(config.delivery_timeout) >= config.lease_duration {
        tracing::warn!("Lease is shorter than the worst-case delivery; events may be dispatched twice");
    }

    let executor = Arc::new(DeliveryExecutor::new(transport, policy));
    let dispatcher = Arc::new(Dispatcher::new(
        store.clone(),
        executor,
        config.dispatcher.clone(),
    ));
    dispatcher.start().context("Failed to start dispatcher")?;

    let app = build_router(AppState::new(store, config.storage));

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .context("Failed to bind to address")?;
    tracing::info!("HTTP server listening on {}", config.addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if let Err(e) = dispatcher.shutdown().await {
        tracing::warn!(error = %e, "Dispatcher did not stop cleanly");
    }

    tracing::info!("events shutdown complete");
    Ok(())
}

async fn open_store(config: &ServerConfig) -> Result<Arc<dyn EventStore>> {
    match config.storage {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory event store; scheduled events are lost on restart");
            Ok(Arc::new(
                InMemoryEventStore::new().with_lease_duration(config.lease_duration),
            ))
        }
        StorageBackend::Postgres => {
            let store = PostgresEventStore::connect(&config.database_url)
                .await
                .with_context(|| {
                    format!(
                        "Failed to connect to database at {}",
                        redact(&config.database_url)
                    )
                })?
                .with_lease_duration(config.lease_duration);
            store.migrate().await.context("Failed to run migrations")?;
            tracing::info!(url = %redact(&config.database_url), "Connected to database");
            Ok(Arc::new(store))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
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
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Received shutdown signal");
}
