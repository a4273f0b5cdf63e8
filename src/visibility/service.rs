//! Visibility range service
//!
//! Ties the tunable radii to the live connection population: captures the
//! host's radii when it starts, pushes the configured radii into the host,
//! and rolls every change out to the connection population as staggered
//! reconciliations. A host without a visibility structure leaves the
//! service inert; the hooks log once and then do nothing.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::error::{Result, VisibilityError};
use crate::net::connection::{Connection, ConnectionManager};
use crate::visibility::query::VisibilityQuery;
use crate::visibility::range::{RangeConfig, RangeParameters};
use crate::visibility::reconcile::{GroupHandler, SubscriptionReconciler};
use crate::visibility::rollout::StaggeredRolloutScheduler;

/// Started state: host provider handle, applied radii, reconciler
struct ActiveRange {
    query: Arc<dyn VisibilityQuery>,
    range: RangeConfig,
    reconciler: SubscriptionReconciler,
}

/// Controls the network visibility range and its rollout
pub struct RangeService {
    /// Radii from the configuration surface, applied at start
    configured: RangeParameters,
    /// Notification sink for group membership changes
    handler: Arc<dyn GroupHandler>,
    /// Rollout scheduler shared across range changes
    scheduler: StaggeredRolloutScheduler,
    /// How often the driver loop fires due reconciliations
    pump_interval: Duration,
    /// None until started, or forever if the host has no provider
    active: RwLock<Option<ActiveRange>>,
}

impl RangeService {
    /// Create a range service applying `configured` once started
    pub fn new(
        configured: RangeParameters,
        handler: Arc<dyn GroupHandler>,
        scheduler: StaggeredRolloutScheduler,
        pump_interval: Duration,
    ) -> Self {
        Self {
            configured,
            handler,
            scheduler,
            pump_interval,
            active: RwLock::new(None),
        }
    }

    /// Whether the service started against a provider
    pub fn is_started(&self) -> bool {
        self.active.read().is_some()
    }

    /// The radii currently applied, or None when not started
    pub fn current_range(&self) -> Option<RangeParameters> {
        self.active.read().as_ref().map(|state| state.range.active())
    }

    /// Capture the host's radii and apply the configured ones
    ///
    /// A host exposing no visibility structure leaves the service inert.
    pub fn on_start(
        &self,
        provider: Option<Arc<dyn VisibilityQuery>>,
        connections: &ConnectionManager,
    ) {
        let Some(query) = provider else {
            error!("Host exposes no visibility structure; range control disabled");
            return;
        };

        let startup = query.range();
        info!(range = %startup, "Captured startup visibility range");

        {
            let mut active = self.active.write();
            *active = Some(ActiveRange {
                range: RangeConfig::capture(startup),
                reconciler: SubscriptionReconciler::new(query.clone(), self.handler.clone()),
                query,
            });
        }

        self.apply(self.configured, connections);
    }

    /// Apply new range parameters to the host and the connection population
    ///
    /// Returns true when either radius changed and a rollout was queued;
    /// identical parameters (or an inert service) change nothing.
    pub fn apply(&self, params: RangeParameters, connections: &ConnectionManager) -> bool {
        let targets = {
            let mut active = self.active.write();
            let Some(state) = active.as_mut() else {
                return false;
            };
            if !state.range.apply(params) {
                return false;
            }
            state.query.set_range(state.range.active());
            connections.active_connections()
        };

        self.scheduler.on_range_changed(&targets, Instant::now());
        true
    }

    /// Restore the radii the host started with
    ///
    /// Goes through the same apply path, so the restore is rolled out with
    /// the same staggering. A service that never captured startup radii
    /// (never started, or the host had no provider) does nothing.
    pub fn on_stop(&self, connections: &ConnectionManager) {
        let startup = self.active.read().as_ref().map(|state| state.range.startup());
        let Some(startup) = startup else {
            debug!("Range control never started; nothing to restore");
            return;
        };

        info!(range = %startup, "Restoring startup visibility range");
        self.apply(startup, connections);
    }

    /// Run one connection's reconciliation immediately
    ///
    /// Used by the session layer when an anchor moves between cells or a
    /// snapshot transfer completes. The reconciliation slot still applies,
    /// so a queued rollout unit wins over this call. Returns true when a
    /// reconciliation actually ran.
    pub fn reconcile_now(&self, connection: &Connection) -> Result<bool> {
        let active = self.active.read();
        let Some(state) = active.as_ref() else {
            return Err(VisibilityError::ProviderUnavailable.into());
        };

        if !connection.is_alive() || connection.is_receiving_snapshot() {
            return Ok(false);
        }
        if !connection.mark_reconcile_scheduled() {
            return Ok(false);
        }

        state.reconciler.reconcile(connection)?;
        Ok(true)
    }

    /// Fire queued rollout reconciliations whose delay elapsed
    pub fn fire_due(&self, now: Instant) -> usize {
        let active = self.active.read();
        match active.as_ref() {
            Some(state) => self.scheduler.fire_due(now, &state.reconciler),
            None => 0,
        }
    }

    /// Number of queued rollout reconciliations
    pub fn pending_count(&self) -> usize {
        self.scheduler.pending_count()
    }

    /// Drive the rollout until shutdown
    pub async fn run(&self, shutdown_rx: &mut broadcast::Receiver<()>) {
        info!(
            pump_interval_ms = self.pump_interval.as_millis() as u64,
            "Starting rollout driver"
        );

        let mut pump = interval(self.pump_interval);
        pump.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = pump.tick() => {
                    self.fire_due(Instant::now());
                }
                _ = shutdown_rx.recv() => {
                    info!("Rollout driver shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::connection::ConnectionState;
    use crate::visibility::grid::GridVisibility;
    use crate::visibility::group::GroupId;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingHandler {
        events: Mutex<Vec<(u64, GroupId, bool)>>,
    }

    impl GroupHandler for RecordingHandler {
        fn on_group_entered(&self, connection: &Connection, group: GroupId) -> Result<()> {
            self.events.lock().push((connection.id, group, true));
            Ok(())
        }

        fn on_group_left(&self, connection: &Connection, group: GroupId) -> Result<()> {
            self.events.lock().push((connection.id, group, false));
            Ok(())
        }
    }

    fn service(
        configured: RangeParameters,
    ) -> (RangeService, Arc<GridVisibility>, Arc<RecordingHandler>) {
        let handler = Arc::new(RecordingHandler::default());
        let grid = Arc::new(GridVisibility::new(16, 16, RangeParameters::default()));
        let service = RangeService::new(
            configured,
            handler.clone(),
            StaggeredRolloutScheduler::new(Duration::ZERO),
            Duration::from_millis(10),
        );
        (service, grid, handler)
    }

    #[test]
    fn test_missing_provider_goes_inert() {
        let (service, _grid, handler) = service(RangeParameters::new(2, 4));
        let connections = ConnectionManager::new();

        service.on_start(None, &connections);

        assert!(!service.is_started());
        assert!(service.current_range().is_none());
        assert!(!service.apply(RangeParameters::new(1, 2), &connections));
        service.on_stop(&connections);
        assert!(handler.events.lock().is_empty());
    }

    #[test]
    fn test_start_captures_and_applies_configured() {
        let (service, grid, _handler) = service(RangeParameters::new(4, 12));
        let connections = ConnectionManager::new();

        service.on_start(Some(grid.clone()), &connections);

        assert!(service.is_started());
        assert_eq!(service.current_range(), Some(RangeParameters::new(4, 12)));
        assert_eq!(grid.range(), RangeParameters::new(4, 12));
    }

    #[test]
    fn test_start_with_matching_config_schedules_nothing() {
        let (service, grid, _handler) = service(RangeParameters::default());
        let connections = ConnectionManager::new();
        let connection = connections
            .create("127.0.0.1:1".parse().unwrap(), GroupId::new(0))
            .unwrap();
        connection.set_state(ConnectionState::Active);

        service.on_start(Some(grid), &connections);

        assert_eq!(service.pending_count(), 0);
        assert!(!connection.is_reconcile_scheduled());
    }

    #[test]
    fn test_apply_schedules_rollout_for_active_connections() {
        let (service, grid, handler) = service(RangeParameters::default());
        let connections = ConnectionManager::new();
        let connection = connections
            .create("127.0.0.1:1".parse().unwrap(), GroupId::new(0))
            .unwrap();
        connection.set_state(ConnectionState::Active);

        service.on_start(Some(grid), &connections);

        assert!(service.apply(RangeParameters::new(4, 2), &connections));
        assert_eq!(service.pending_count(), 1);

        let fired = service.fire_due(Instant::now());
        assert_eq!(fired, 1);
        assert!(!handler.events.lock().is_empty());
        assert!(!connection.subscriptions().is_empty());
    }

    #[test]
    fn test_stop_restores_startup_range() {
        let (service, grid, _handler) = service(RangeParameters::new(2, 16));
        let connections = ConnectionManager::new();

        service.on_start(Some(grid.clone()), &connections);
        assert_eq!(grid.range(), RangeParameters::new(2, 16));

        service.on_stop(&connections);
        assert_eq!(grid.range(), RangeParameters::default());
        assert_eq!(service.current_range(), Some(RangeParameters::default()));
    }

    #[test]
    fn test_reconcile_now_requires_provider() {
        let (service, _grid, _handler) = service(RangeParameters::default());
        let connection = Arc::new(Connection::new(
            1,
            "127.0.0.1:1".parse().unwrap(),
            GroupId::new(0),
        ));

        assert!(service.reconcile_now(&connection).is_err());
    }

    #[test]
    fn test_reconcile_now_guards_slot_and_eligibility() {
        let (service, grid, _handler) = service(RangeParameters::default());
        let connections = ConnectionManager::new();
        service.on_start(Some(grid), &connections);

        let connection = connections
            .create("127.0.0.1:1".parse().unwrap(), GroupId::new(0))
            .unwrap();
        connection.set_state(ConnectionState::Active);

        // Snapshot transfer blocks immediate reconciliation
        connection.begin_snapshot();
        assert!(!service.reconcile_now(&connection).unwrap());
        connection.end_snapshot();

        // Held slot blocks it too
        connection.mark_reconcile_scheduled();
        assert!(!service.reconcile_now(&connection).unwrap());
        connection.clear_reconcile_scheduled();

        assert!(service.reconcile_now(&connection).unwrap());
        assert!(!connection.subscriptions().is_empty());
    }
}
