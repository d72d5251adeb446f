//! Development server wiring the in-memory store and loopback provider.
//!
//! Run with: cargo run -p call-agents-server
//!
//! Production deployments swap in real `MeetingStore` and `RealtimeProvider`
//! implementations; the HTTP surface and shutdown wiring are identical.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use call_agents_server::{AppState, create_router};
use call_agents_session::{
    AgentSessionManager, ManagerConfig, provider::LoopbackProvider, store::MemoryMeetingStore,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Default shutdown grace period in seconds.
const DEFAULT_GRACE_SECS: u64 = 10;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let store = Arc::new(MemoryMeetingStore::new());
    let provider = Arc::new(LoopbackProvider::new());
    let manager = Arc::new(AgentSessionManager::new(store, provider, ManagerConfig::default()));

    // Repair meetings stranded in `active` by a previous crash before
    // taking traffic.
    let repaired = manager.reconcile().await?;
    if repaired > 0 {
        tracing::info!(repaired, "Reconciled orphaned active meetings");
    }

    let app = create_router(AppState {
        manager: Arc::clone(&manager),
    });

    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8000);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    tracing::info!("Server listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind listener")?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // Bounded teardown of any sessions still live once the listener stops.
    let grace = std::env::var("SHUTDOWN_GRACE_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_GRACE_SECS);
    match tokio::time::timeout(Duration::from_secs(grace), manager.disconnect_all()).await {
        Ok(count) => tracing::info!(sessions = count, "Shutdown teardown complete"),
        Err(_) => tracing::warn!("Shutdown grace period elapsed with sessions still tearing down"),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
