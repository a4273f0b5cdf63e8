//! Application state module
//!
//! Contains the shared state used across the server.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::info;

use crate::config::ServerConfig;
use crate::net::connection::ConnectionManager;
use crate::visibility::grid::GridVisibility;
use crate::visibility::range::RangeParameters;
use crate::visibility::reconcile::GroupHandler;
use crate::visibility::rollout::StaggeredRolloutScheduler;
use crate::visibility::service::RangeService;

/// Application state shared across the server
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,
    /// Connection registry
    pub connections: ConnectionManager,
    /// Host visibility grid
    pub grid: Arc<GridVisibility>,
    /// Visibility range control
    pub range: Arc<RangeService>,
    /// Shutdown signal sender
    pub shutdown_tx: broadcast::Sender<()>,
}

impl AppState {
    /// Create a new application state
    ///
    /// The grid boots with the default radii; the configured radii are
    /// pushed in when range control starts.
    pub fn new(
        config: ServerConfig,
        handler: Arc<dyn GroupHandler>,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Self {
        let grid = Arc::new(GridVisibility::new(
            config.grid.width,
            config.grid.height,
            RangeParameters::default(),
        ));

        let scheduler = StaggeredRolloutScheduler::new(Duration::from_secs(
            config.visibility.rollout_stagger_secs,
        ));
        let range = Arc::new(RangeService::new(
            config.visibility.parameters(),
            handler,
            scheduler,
            Duration::from_millis(config.pump_interval_ms),
        ));

        let connections = ConnectionManager::with_limits(config.max_connections_per_ip as usize);

        info!(
            world_id = config.world_id,
            grid_cells = grid.cell_count(),
            configured_range = %config.visibility.parameters(),
            "Application state created"
        );

        Self {
            config,
            connections,
            grid,
            range,
            shutdown_tx,
        }
    }

    /// Start range control against the host grid
    pub fn start_range_control(&self) {
        self.range
            .on_start(Some(self.grid.clone()), &self.connections);
    }

    /// Stop range control, restoring the grid's startup radii
    pub fn stop_range_control(&self) {
        self.range.on_stop(&self.connections);
    }
}
