//! Subscription reconciliation
//!
//! Recomputes what one connection should see and applies the difference to
//! its live subscription table, notifying the handler once per group
//! entered or left. Removals are processed before additions so a handler
//! never observes a connection subscribed to both the old and the new
//! representation of overlapping state.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::error::Result;
use crate::net::connection::Connection;
use crate::visibility::diff;
use crate::visibility::group::GroupId;
use crate::visibility::query::VisibilityQuery;

/// Handler notified as a connection enters or leaves broadcast groups
///
/// Invoked synchronously, once per (group, direction) pair. Errors are not
/// retried or swallowed; they propagate to the reconcile caller.
pub trait GroupHandler: Send + Sync {
    /// The connection was subscribed to a new group
    fn on_group_entered(&self, connection: &Connection, group: GroupId) -> Result<()>;

    /// The connection was unsubscribed from a group
    fn on_group_left(&self, connection: &Connection, group: GroupId) -> Result<()>;
}

/// Applies desired-set diffs to connection subscription tables
pub struct SubscriptionReconciler {
    query: Arc<dyn VisibilityQuery>,
    handler: Arc<dyn GroupHandler>,
}

impl SubscriptionReconciler {
    /// Create a reconciler over the given query capability and handler
    pub fn new(query: Arc<dyn VisibilityQuery>, handler: Arc<dyn GroupHandler>) -> Self {
        Self { query, handler }
    }

    /// Reconcile one connection's subscriptions with current visibility
    ///
    /// The caller guards the preconditions: the connection is alive, is not
    /// receiving a snapshot, and holds the reconciliation slot. The slot is
    /// released here on every exit path, including handler errors.
    pub fn reconcile(&self, connection: &Connection) -> Result<()> {
        let result = self.apply_visible(connection);
        connection.clear_reconcile_scheduled();
        result
    }

    fn apply_visible(&self, connection: &Connection) -> Result<()> {
        let desired = diff::desired_groups(
            self.query.as_ref(),
            connection.anchor(),
            connection.secondary_anchor(),
        );
        let changes = diff::diff(&connection.subscriptions(), &desired);

        if changes.is_empty() {
            trace!(connection_id = connection.id, "Subscriptions already current");
            return Ok(());
        }

        debug!(
            connection_id = connection.id,
            entering = changes.to_add.len(),
            leaving = changes.to_remove.len(),
            "Reconciling subscriptions"
        );

        for group in changes.to_remove {
            // A disconnect during reconciliation cancels the rest silently
            if !connection.is_alive() {
                return Ok(());
            }
            connection.unsubscribe(group);
            self.handler.on_group_left(connection, group)?;
        }

        for group in changes.to_add {
            if !connection.is_alive() {
                return Ok(());
            }
            connection.subscribe(group);
            self.handler.on_group_entered(connection, group)?;
        }

        Ok(())
    }
}
