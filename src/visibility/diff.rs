//! Group set diffing
//!
//! Pure computation of the subscribe/unsubscribe work needed to move a
//! connection from its current group set to the set the world says it
//! should see. No side effects; ordering follows input iteration order so
//! results are reproducible.

use crate::visibility::group::{GroupId, GroupSet};
use crate::visibility::query::{RadiusClass, VisibilityQuery};

/// Added and removed groups between a current and a desired set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupSetDiff {
    /// Groups to subscribe, in desired-set iteration order
    pub to_add: Vec<GroupId>,
    /// Groups to unsubscribe, in current-set iteration order
    pub to_remove: Vec<GroupId>,
}

impl GroupSetDiff {
    /// Check whether the diff contains no work
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Compute the diff between a current and a desired group set
pub fn diff(current: &GroupSet, desired: &GroupSet) -> GroupSetDiff {
    let to_remove = current.iter().filter(|&g| !desired.contains(g)).collect();
    let to_add = desired.iter().filter(|&g| !current.contains(g)).collect();
    GroupSetDiff { to_add, to_remove }
}

/// Build the desired group set for a pair of anchors
///
/// Far visibility from the primary anchor, extended by near visibility from
/// the secondary anchor when one exists. The union never contains a group
/// twice even when both queries return it, and no near query is made
/// without a secondary anchor.
pub fn desired_groups(
    query: &dyn VisibilityQuery,
    primary: GroupId,
    secondary: Option<GroupId>,
) -> GroupSet {
    let mut desired: GroupSet = query
        .visible_from(primary, RadiusClass::Far)
        .into_iter()
        .collect();

    if let Some(anchor) = secondary {
        for group in query.visible_from(anchor, RadiusClass::Near) {
            desired.insert(group);
        }
    }

    desired
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visibility::range::RangeParameters;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn set(ids: &[u32]) -> GroupSet {
        ids.iter().copied().map(GroupId::new).collect()
    }

    fn ids(ids: &[u32]) -> Vec<GroupId> {
        ids.iter().copied().map(GroupId::new).collect()
    }

    /// Query returning fixed group lists, counting near invocations
    struct FixedQuery {
        far: Vec<GroupId>,
        near: Vec<GroupId>,
        near_calls: AtomicUsize,
    }

    impl FixedQuery {
        fn new(far: &[u32], near: &[u32]) -> Self {
            Self {
                far: ids(far),
                near: ids(near),
                near_calls: AtomicUsize::new(0),
            }
        }
    }

    impl VisibilityQuery for FixedQuery {
        fn visible_from(&self, _anchor: GroupId, class: RadiusClass) -> Vec<GroupId> {
            match class {
                RadiusClass::Far => self.far.clone(),
                RadiusClass::Near => {
                    self.near_calls.fetch_add(1, Ordering::SeqCst);
                    self.near.clone()
                }
            }
        }

        fn range(&self) -> RangeParameters {
            RangeParameters::default()
        }

        fn set_range(&self, _params: RangeParameters) {}
    }

    #[test]
    fn test_diff_disjoint_add_remove() {
        let current = set(&[1, 2, 3]);
        let desired = set(&[2, 3, 4]);

        let changes = diff(&current, &desired);
        assert_eq!(changes.to_remove, ids(&[1]));
        assert_eq!(changes.to_add, ids(&[4]));

        // to_add and to_remove never overlap
        for added in &changes.to_add {
            assert!(!changes.to_remove.contains(added));
        }
    }

    #[test]
    fn test_diff_reconstructs_desired() {
        let current = set(&[10, 20, 30, 40]);
        let desired = set(&[30, 50, 10]);

        let changes = diff(&current, &desired);

        let mut result = current.clone();
        for group in &changes.to_remove {
            result.remove(*group);
        }
        for group in &changes.to_add {
            result.insert(*group);
        }

        for group in desired.iter() {
            assert!(result.contains(group));
        }
        assert_eq!(result.len(), desired.len());
    }

    #[test]
    fn test_diff_identical_sets_is_empty() {
        let current = set(&[5, 6]);
        let changes = diff(&current, &current.clone());
        assert!(changes.is_empty());
    }

    #[test]
    fn test_diff_preserves_input_order() {
        let current = set(&[9, 7, 5, 3]);
        let desired = set(&[4, 2, 9]);

        let changes = diff(&current, &desired);
        assert_eq!(changes.to_remove, ids(&[7, 5, 3]));
        assert_eq!(changes.to_add, ids(&[4, 2]));
    }

    #[test]
    fn test_desired_union_deduplicates_overlap() {
        let query = FixedQuery::new(&[1, 2, 3], &[2, 3, 4]);
        let desired = desired_groups(&query, GroupId::new(0), Some(GroupId::new(0)));

        assert_eq!(desired.as_slice(), &ids(&[1, 2, 3, 4])[..]);
    }

    #[test]
    fn test_desired_without_secondary_skips_near_query() {
        let query = FixedQuery::new(&[1, 2], &[3]);
        let desired = desired_groups(&query, GroupId::new(0), None);

        assert_eq!(desired.as_slice(), &ids(&[1, 2])[..]);
        assert_eq!(query.near_calls.load(Ordering::SeqCst), 0);
    }
}
