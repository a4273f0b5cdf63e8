//! Grid-based visibility provider
//!
//! The world is partitioned into a bounded grid of square cells; each cell
//! is one broadcast group. Visibility from an anchor cell is every in-bounds
//! cell within the Chebyshev radius for the requested class, returned in
//! row-major order. Group ids are row-major cell indices.

use parking_lot::RwLock;
use tracing::debug;

use crate::visibility::group::GroupId;
use crate::visibility::query::{RadiusClass, VisibilityQuery};
use crate::visibility::range::RangeParameters;

/// Square-cell visibility grid
pub struct GridVisibility {
    /// Grid width in cells
    width: u32,
    /// Grid height in cells
    height: u32,
    /// Radii currently in effect
    range: RwLock<RangeParameters>,
}

impl GridVisibility {
    /// Create a grid with the given dimensions and initial radii
    pub fn new(width: u32, height: u32, range: RangeParameters) -> Self {
        debug!(width, height, range = %range, "Creating visibility grid");
        Self {
            width,
            height,
            range: RwLock::new(range),
        }
    }

    /// Grid width in cells
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Grid height in cells
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Total number of cells (= broadcast groups) in the grid
    pub fn cell_count(&self) -> u32 {
        self.width * self.height
    }

    /// Group id of the cell at (x, y), or None outside the grid
    pub fn group_at(&self, x: u32, y: u32) -> Option<GroupId> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(GroupId::new(y * self.width + x))
    }

    /// Cell coordinates of a group id, or None for an id outside the grid
    pub fn cell_of(&self, group: GroupId) -> Option<(u32, u32)> {
        let raw = group.value();
        if raw >= self.cell_count() {
            return None;
        }
        Some((raw % self.width, raw / self.width))
    }
}

impl VisibilityQuery for GridVisibility {
    fn visible_from(&self, anchor: GroupId, class: RadiusClass) -> Vec<GroupId> {
        // An anchor outside the grid sees nothing; entities despawn from the
        // map while queries for them may still be queued.
        let Some((cx, cy)) = self.cell_of(anchor) else {
            return Vec::new();
        };

        let params = *self.range.read();
        let radius = match class {
            RadiusClass::Near => params.near,
            RadiusClass::Far => params.far,
        };

        let min_x = cx.saturating_sub(radius);
        let max_x = (cx + radius).min(self.width - 1);
        let min_y = cy.saturating_sub(radius);
        let max_y = (cy + radius).min(self.height - 1);

        let mut visible =
            Vec::with_capacity(((max_x - min_x + 1) * (max_y - min_y + 1)) as usize);
        for y in min_y..=max_y {
            for x in min_x..=max_x {
                visible.push(GroupId::new(y * self.width + x));
            }
        }
        visible
    }

    fn range(&self) -> RangeParameters {
        *self.range.read()
    }

    fn set_range(&self, params: RangeParameters) {
        debug!(range = %params, "Grid radii replaced");
        *self.range.write() = params;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> GridVisibility {
        GridVisibility::new(10, 10, RangeParameters::new(1, 2))
    }

    #[test]
    fn test_group_cell_roundtrip() {
        let grid = grid();
        let group = grid.group_at(3, 7).unwrap();
        assert_eq!(group, GroupId::new(73));
        assert_eq!(grid.cell_of(group), Some((3, 7)));
    }

    #[test]
    fn test_group_at_out_of_bounds() {
        let grid = grid();
        assert!(grid.group_at(10, 0).is_none());
        assert!(grid.group_at(0, 10).is_none());
    }

    #[test]
    fn test_visible_from_center() {
        let grid = grid();
        let anchor = grid.group_at(5, 5).unwrap();

        // Near radius 1: a 3x3 block
        let near = grid.visible_from(anchor, RadiusClass::Near);
        assert_eq!(near.len(), 9);
        assert!(near.contains(&anchor));

        // Far radius 2: a 5x5 block
        let far = grid.visible_from(anchor, RadiusClass::Far);
        assert_eq!(far.len(), 25);
    }

    #[test]
    fn test_visible_from_corner_clamps() {
        let grid = grid();
        let anchor = grid.group_at(0, 0).unwrap();

        // Radius 2 from the corner: 3x3 cells survive clamping
        let far = grid.visible_from(anchor, RadiusClass::Far);
        assert_eq!(far.len(), 9);
    }

    #[test]
    fn test_visible_row_major_order() {
        let grid = grid();
        let anchor = grid.group_at(1, 1).unwrap();

        let near = grid.visible_from(anchor, RadiusClass::Near);
        let raw: Vec<u32> = near.iter().map(|g| g.value()).collect();
        let mut sorted = raw.clone();
        sorted.sort_unstable();
        assert_eq!(raw, sorted);
    }

    #[test]
    fn test_visible_from_outside_grid_is_empty() {
        let grid = grid();
        let gone = GroupId::new(grid.cell_count());
        assert!(grid.visible_from(gone, RadiusClass::Far).is_empty());
    }

    #[test]
    fn test_set_range_changes_results() {
        let grid = grid();
        let anchor = grid.group_at(5, 5).unwrap();
        assert_eq!(grid.visible_from(anchor, RadiusClass::Far).len(), 25);

        grid.set_range(RangeParameters::new(1, 3));
        assert_eq!(grid.range(), RangeParameters::new(1, 3));
        assert_eq!(grid.visible_from(anchor, RadiusClass::Far).len(), 49);
    }
}
