//! Visibility module
//!
//! Decides which broadcast groups each connection is subscribed to and
//! keeps that decision current when the configured view range changes:
//! - Group identity and insertion-ordered group sets
//! - Visibility queries against the host grid
//! - Pure desired-set diffing
//! - Subscription reconciliation with enter/leave notifications
//! - Range configuration and staggered rollout scheduling

pub mod diff;
pub mod grid;
pub mod group;
pub mod query;
pub mod range;
pub mod reconcile;
pub mod rollout;
pub mod service;

pub use diff::GroupSetDiff;
pub use group::{GroupId, GroupSet};
pub use query::{RadiusClass, VisibilityQuery};
pub use range::{RangeConfig, RangeParameters};
pub use reconcile::{GroupHandler, SubscriptionReconciler};
pub use rollout::StaggeredRolloutScheduler;
pub use service::RangeService;
