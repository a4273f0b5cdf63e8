//! Visibility range parameters
//!
//! Two independently tuned radii drive group discovery: the far radius for
//! a connection's primary anchor and the near radius for its secondary
//! anchor. `RangeConfig` tracks the radii this server has applied alongside
//! the radii the host started with, so the tuning is fully reversible.

use serde::{Deserialize, Serialize};
use tracing::info;

/// The two tunable visibility radii, in grid cells
///
/// Non-negative by construction; no ordering between near and far is
/// enforced (far is conventionally the larger of the two).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeParameters {
    /// Near radius (secondary-anchor queries)
    pub near: u32,
    /// Far radius (primary-anchor queries)
    pub far: u32,
}

impl RangeParameters {
    /// Create range parameters from the two radii
    pub fn new(near: u32, far: u32) -> Self {
        Self { near, far }
    }
}

impl Default for RangeParameters {
    fn default() -> Self {
        Self { near: 4, far: 8 }
    }
}

impl std::fmt::Display for RangeParameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "near={} far={}", self.near, self.far)
    }
}

/// Active visibility radii plus the startup radii captured from the host
#[derive(Debug, Clone)]
pub struct RangeConfig {
    active: RangeParameters,
    startup: RangeParameters,
}

impl RangeConfig {
    /// Capture the host's current radii
    ///
    /// The captured values double as the initial active set and are what
    /// shutdown restores.
    pub fn capture(startup: RangeParameters) -> Self {
        Self {
            active: startup,
            startup,
        }
    }

    /// The radii currently applied
    pub fn active(&self) -> RangeParameters {
        self.active
    }

    /// The radii that were in effect before this server took control
    pub fn startup(&self) -> RangeParameters {
        self.startup
    }

    /// Apply new parameters, comparing field by field
    ///
    /// Returns true when either radius actually changed; identical
    /// parameters leave the config untouched.
    pub fn apply(&mut self, new: RangeParameters) -> bool {
        let mut changed = false;

        if self.active.far != new.far {
            info!(
                from = self.active.far,
                to = new.far,
                "Updating far visibility radius"
            );
            self.active.far = new.far;
            changed = true;
        }

        if self.active.near != new.near {
            info!(
                from = self.active.near,
                to = new.near,
                "Updating near visibility radius"
            );
            self.active.near = new.near;
            changed = true;
        }

        changed
    }
}
