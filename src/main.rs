//! Rangecast World Server
//!
//! Boots the world visibility grid, applies the configured network
//! visibility range, and keeps connection subscriptions reconciled until
//! shutdown.

use std::sync::Arc;

use anyhow::Result;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{debug, info};
use tracing_subscriber::{fmt, EnvFilter};

use rangecast_server::config::ServerConfig;
use rangecast_server::net::connection::{Connection, ConnectionState};
use rangecast_server::state::AppState;
use rangecast_server::visibility::group::GroupId;
use rangecast_server::visibility::reconcile::GroupHandler;
use rangecast_server::VERSION;

/// Logs group membership changes
///
/// A real deployment queues state snapshots and teardown packets from
/// these hooks; the reference binary only traces them.
struct LoggingGroupHandler;

impl GroupHandler for LoggingGroupHandler {
    fn on_group_entered(
        &self,
        connection: &Connection,
        group: GroupId,
    ) -> rangecast_server::Result<()> {
        debug!(connection_id = connection.id, group = %group, "Group entered");
        Ok(())
    }

    fn on_group_left(
        &self,
        connection: &Connection,
        group: GroupId,
    ) -> rangecast_server::Result<()> {
        debug!(connection_id = connection.id, group = %group, "Group left");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Rangecast World Server v{}", VERSION);

    // Load configuration
    let config = ServerConfig::load().await?;
    info!(
        "Configuration loaded from: {}",
        config.config_path.display()
    );

    // Create shutdown channel
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Initialize application state
    let state = Arc::new(AppState::new(
        config,
        Arc::new(LoggingGroupHandler),
        shutdown_tx.clone(),
    ));
    info!("Application state initialized");

    // Capture the grid's startup range and apply the configured one
    state.start_range_control();

    // Boot a simulated population in dev mode so there is something to
    // roll changes out to
    if state.config.dev_mode {
        spawn_dev_population(&state)?;
    }

    // Drive the staggered rollout until shutdown
    let rollout_state = state.clone();
    let mut rollout_shutdown_rx = shutdown_tx.subscribe();
    let rollout_handle = tokio::spawn(async move {
        rollout_state.range.run(&mut rollout_shutdown_rx).await;
    });

    info!("Server startup complete!");
    info!(
        "World {} is ready with visibility range {}",
        state.config.world_id,
        state.config.visibility.parameters()
    );

    // Wait for shutdown signal
    wait_for_shutdown(shutdown_tx.clone()).await;

    info!("Shutting down server...");

    // Wait for the rollout driver to finish
    let _ = rollout_handle.await;

    // Restore the grid's startup range and tear down connections
    state.stop_range_control();
    state.connections.disconnect_all();
    info!("All connections disconnected");

    info!("Server shutdown complete. Goodbye!");
    Ok(())
}

/// Initialize the logging/tracing system
fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,rangecast_server=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .init();
}

/// Spawn a handful of simulated connections scattered across the grid
fn spawn_dev_population(state: &Arc<AppState>) -> Result<()> {
    let width = state.grid.width();
    let height = state.grid.height();

    for i in 0..8u32 {
        let x = (i * 7 + 3) % width;
        let y = (i * 11 + 5) % height;
        let Some(anchor) = state.grid.group_at(x, y) else {
            continue;
        };

        let address = format!("127.0.0.1:{}", 40000 + i).parse()?;
        let connection = state.connections.create(address, anchor)?;
        connection.set_state(ConnectionState::Active);

        // One simulated client also tracks an auxiliary entity
        if i == 0 {
            connection.set_secondary_anchor(state.grid.group_at(width / 2, height / 2));
        }

        state.range.reconcile_now(&connection)?;
    }

    state.connections.for_each(|connection| {
        debug!(
            connection_id = connection.id,
            subscriptions = connection.subscriptions().len(),
            "Simulated connection ready"
        );
    });

    info!(
        count = state.connections.count(),
        "Dev population spawned"
    );
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn wait_for_shutdown(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    // Signal all tasks to shut down
    let _ = shutdown_tx.send(());
}
