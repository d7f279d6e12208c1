use glam::DVec2;
use std::collections::HashMap;

use crate::path::BBox;

/// Spatial index for region outlines using conservative approximation.
/// Each region's bounding box is indexed into every cell it overlaps,
/// guaranteeing no false negatives while allowing false positives
/// (eliminated by the exact point-in-polygon test afterwards).
#[derive(Debug, Default)]
pub struct FeatureGrid {
    cells: HashMap<(i32, i32), Vec<usize>>,
    cell_size: f64,
}

impl FeatureGrid {
    pub fn new(cell_size: f64) -> Self {
        Self {
            cells: HashMap::new(),
            cell_size: cell_size.max(f64::EPSILON),
        }
    }

    #[inline(always)]
    fn to_cell(&self, x: f64, y: f64) -> (i32, i32) {
        ((x / self.cell_size).floor() as i32, (y / self.cell_size).floor() as i32)
    }

    /// Build from bounding boxes in canvas units; indices follow iteration order.
    pub fn build<'a>(bboxes: impl Iterator<Item = &'a BBox>, cell_size: f64) -> Self {
        let mut grid = Self::new(cell_size);
        for (idx, bbox) in bboxes.enumerate() {
            grid.insert(idx, bbox);
        }
        grid
    }

    pub fn insert(&mut self, idx: usize, bbox: &BBox) {
        let min_cell = self.to_cell(bbox.x, bbox.y);
        let max_cell = self.to_cell(bbox.x + bbox.width, bbox.y + bbox.height);
        for y in min_cell.1..=max_cell.1 {
            for x in min_cell.0..=max_cell.0 {
                self.cells.entry((x, y)).or_default().push(idx);
            }
        }
    }

    /// Candidates whose bounding box may contain `p`.
    pub fn query_point(&self, p: DVec2) -> &[usize] {
        self.cells.get(&self.to_cell(p.x, p.y)).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidates_cover_overlapped_cells() {
        let boxes = [BBox::new(0.0, 0.0, 28.0, 10.0), BBox::new(25.0, 5.0, 10.0, 10.0)];
        let grid = FeatureGrid::build(boxes.iter(), 10.0);
        assert_eq!(grid.query_point(DVec2::new(5.0, 5.0)), &[0]);
        assert_eq!(grid.query_point(DVec2::new(27.0, 7.0)), &[0, 1]);
        assert_eq!(grid.query_point(DVec2::new(32.0, 14.0)), &[1]);
        assert!(grid.query_point(DVec2::new(-50.0, -50.0)).is_empty());
    }
}
