//! Staggered reconciliation rollout
//!
//! A radius change touches every active connection. Re-evaluating them all
//! in the tick that changed the radii would burst group recomputation and
//! notification traffic, so each connection is re-evaluated after its own
//! uniform random delay instead. Pending units hold weak references; a
//! connection that disconnects before its delay elapses is dropped by the
//! liveness check rather than an explicit cancel signal.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::Rng;
use tracing::{info, trace, warn};

use crate::net::connection::Connection;
use crate::visibility::reconcile::SubscriptionReconciler;

/// Default spread for rollout jitter
pub const DEFAULT_STAGGER: Duration = Duration::from_secs(5);

/// One delayed re-evaluation of a connection's subscriptions
struct PendingReconciliation {
    connection: Weak<Connection>,
    fire_at: Instant,
}

/// Schedules one jittered reconciliation per connection after a range change
pub struct StaggeredRolloutScheduler {
    pending: Mutex<Vec<PendingReconciliation>>,
    stagger: Duration,
}

impl StaggeredRolloutScheduler {
    /// Create a scheduler spreading reconciliations over the given window
    pub fn new(stagger: Duration) -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
            stagger,
        }
    }

    /// Queue a delayed reconciliation for every eligible connection
    ///
    /// Connections that are dead, mid-snapshot, or already holding the
    /// reconciliation slot are skipped; each eligible one gets an
    /// independent delay drawn uniformly from [0, stagger).
    pub fn on_range_changed(&self, connections: &[Arc<Connection>], now: Instant) -> usize {
        let mut rng = rand::thread_rng();
        let mut pending = self.pending.lock();
        let mut scheduled = 0;

        for connection in connections {
            if !connection.is_alive() || connection.is_receiving_snapshot() {
                continue;
            }
            if !connection.mark_reconcile_scheduled() {
                continue;
            }

            let delay = if self.stagger.is_zero() {
                Duration::ZERO
            } else {
                Duration::from_secs_f64(rng.gen_range(0.0..self.stagger.as_secs_f64()))
            };
            pending.push(PendingReconciliation {
                connection: Arc::downgrade(connection),
                fire_at: now + delay,
            });
            scheduled += 1;
        }

        if scheduled > 0 {
            info!(
                scheduled,
                stagger_secs = self.stagger.as_secs(),
                "Queued staggered subscription rollout"
            );
        }
        scheduled
    }

    /// Number of queued reconciliations
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Fire every reconciliation whose delay has elapsed
    ///
    /// Liveness and snapshot state are re-checked at fire time, both may
    /// have changed during the delay. The reconciliation slot is released
    /// whether or not the unit proceeds. Returns how many units ran.
    pub fn fire_due(&self, now: Instant, reconciler: &SubscriptionReconciler) -> usize {
        let due = {
            let mut pending = self.pending.lock();
            let (due, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut *pending)
                .into_iter()
                .partition(|unit| unit.fire_at <= now);
            *pending = rest;
            due
        };

        let mut fired = 0;
        for unit in due {
            let Some(connection) = unit.connection.upgrade() else {
                trace!("Dropping reconciliation for a gone connection");
                continue;
            };

            if !connection.is_alive() || connection.is_receiving_snapshot() {
                trace!(
                    connection_id = connection.id,
                    "Skipping reconciliation, connection no longer eligible"
                );
                connection.clear_reconcile_scheduled();
                continue;
            }

            if let Err(e) = reconciler.reconcile(&connection) {
                warn!(
                    connection_id = connection.id,
                    error = %e,
                    "Subscription handler failed during rollout"
                );
            }
            fired += 1;
        }
        fired
    }
}

impl Default for StaggeredRolloutScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_STAGGER)
    }
}
