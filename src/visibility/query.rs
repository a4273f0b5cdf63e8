//! Visibility query capability
//!
//! The host world owns the structure that answers "which groups are visible
//! from here" - a cell grid in this server. The subscription core never
//! reaches into that structure directly; it asks questions through this
//! trait and pushes tuned radii into it through the same seam.

use crate::visibility::group::GroupId;
use crate::visibility::range::RangeParameters;

/// Which of the two configured radii a visibility query uses
///
/// Far drives the primary anchor's visibility; near drives the secondary
/// anchor's supplemental visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RadiusClass {
    /// Near radius (secondary-anchor queries)
    Near,
    /// Far radius (primary-anchor queries)
    Far,
}

impl RadiusClass {
    /// Get a human-readable name for the radius class
    pub fn name(&self) -> &'static str {
        match self {
            RadiusClass::Near => "near",
            RadiusClass::Far => "far",
        }
    }
}

impl std::fmt::Display for RadiusClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Capability for computing group visibility from an anchor
///
/// Implementations are expected to be cheap and side-effect-free from the
/// caller's perspective. The radii accessors exist so range control can
/// capture the host's values at startup and replace them at runtime.
pub trait VisibilityQuery: Send + Sync {
    /// Groups visible from `anchor` at the given radius class
    fn visible_from(&self, anchor: GroupId, class: RadiusClass) -> Vec<GroupId>;

    /// The radii currently in effect in the host structure
    fn range(&self) -> RangeParameters;

    /// Replace the radii in effect in the host structure
    fn set_range(&self, params: RangeParameters);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radius_class_name() {
        assert_eq!(RadiusClass::Near.name(), "near");
        assert_eq!(RadiusClass::Far.name(), "far");
        assert_eq!(RadiusClass::Far.to_string(), "far");
    }
}
