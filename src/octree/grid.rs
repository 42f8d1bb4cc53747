//! Bucketed minimum-distance filter used by internal octree nodes.
//!
//! The grid covers a node's bounding box with cells of `spacing * CELL_SIZE_FACTOR`.
//! A point is accepted when it keeps at least `spacing` distance to every point
//! already stored in its cell and in the cell's registered neighbours.

use crate::octree::aabb::Aabb;
use glam::DVec3;
use hashbrown::HashMap;

pub const CELL_SIZE_FACTOR: f64 = 5.0;

/// Each axis index is packed into 20 bits of the cell key.
const AXIS_BITS: u32 = 20;

#[derive(Clone, Debug, Default)]
pub struct GridCell {
    points: Vec<DVec3>,
    /// Arena indices of adjacent cells, linked both ways at creation.
    neighbours: Vec<usize>,
}

impl GridCell {
    pub fn points(&self) -> &[DVec3] {
        &self.points
    }

    pub fn neighbours(&self) -> &[usize] {
        &self.neighbours
    }

    fn is_distant(&self, point: DVec3, squared_spacing: f64) -> bool {
        self.points
            .iter()
            .all(|stored| point.distance_squared(*stored) >= squared_spacing)
    }
}

#[derive(Clone, Debug)]
pub struct Grid {
    aabb: Aabb,
    width: usize,
    height: usize,
    depth: usize,
    squared_spacing: f64,
    cells: Vec<GridCell>,
    lookup: HashMap<u64, usize>,
}

#[inline]
fn cell_key(i: usize, j: usize, k: usize) -> u64 {
    ((k as u64) << (2 * AXIS_BITS)) | ((j as u64) << AXIS_BITS) | i as u64
}

/// Number of cells along one axis; a degenerate axis collapses to one cell
/// and no axis outgrows its key bits.
#[inline]
fn dimension(size: f64, cell_size: f64) -> usize {
    ((size / cell_size) as usize).clamp(1, 1 << AXIS_BITS)
}

/// Cell coordinate of `p` along one axis, clamped to `[0, dim - 1]`.
#[inline]
fn axis_index(p: f64, min: f64, size: f64, dim: usize) -> usize {
    ((dim as f64 * (p - min) / size) as usize).min(dim - 1)
}

impl Grid {
    pub fn new(aabb: Aabb, spacing: f64) -> Self {
        let size = aabb.size();
        let cell_size = spacing * CELL_SIZE_FACTOR;

        Self {
            aabb,
            width: dimension(size.x, cell_size),
            height: dimension(size.y, cell_size),
            depth: dimension(size.z, cell_size),
            squared_spacing: spacing * spacing,
            cells: Vec::new(),
            lookup: HashMap::new(),
        }
    }

    pub fn dimensions(&self) -> (usize, usize, usize) {
        (self.width, self.height, self.depth)
    }

    pub fn squared_spacing(&self) -> f64 {
        self.squared_spacing
    }

    /// Number of cells created so far.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cell(&self, i: usize, j: usize, k: usize) -> Option<&GridCell> {
        self.lookup
            .get(&cell_key(i, j, k))
            .map(|&slot| &self.cells[slot])
    }

    pub fn cell_index(&self, point: DVec3) -> (usize, usize, usize) {
        let size = self.aabb.size();
        (
            axis_index(point.x, self.aabb.min.x, size.x, self.width),
            axis_index(point.y, self.aabb.min.y, size.y, self.height),
            axis_index(point.z, self.aabb.min.z, size.z, self.depth),
        )
    }

    /// Returns `true` and records the position when it is far enough from
    /// every point in its cell and the cell's neighbours.
    pub fn add(&mut self, point: DVec3) -> bool {
        let (i, j, k) = self.cell_index(point);
        let slot = self.get_or_create_cell(i, j, k);

        if !self.is_distant(point, slot) {
            return false;
        }

        self.cells[slot].points.push(point);
        true
    }

    fn is_distant(&self, point: DVec3, slot: usize) -> bool {
        let cell = &self.cells[slot];
        if !cell.is_distant(point, self.squared_spacing) {
            return false;
        }

        cell.neighbours
            .iter()
            .all(|&neighbour| self.cells[neighbour].is_distant(point, self.squared_spacing))
    }

    fn get_or_create_cell(&mut self, i: usize, j: usize, k: usize) -> usize {
        let key = cell_key(i, j, k);
        if let Some(&slot) = self.lookup.get(&key) {
            return slot;
        }

        let slot = self.cells.len();
        let mut neighbours = Vec::new();

        for ni in i.saturating_sub(1)..=(i + 1).min(self.width - 1) {
            for nj in j.saturating_sub(1)..=(j + 1).min(self.height - 1) {
                for nk in k.saturating_sub(1)..=(k + 1).min(self.depth - 1) {
                    if let Some(&neighbour) = self.lookup.get(&cell_key(ni, nj, nk)) {
                        neighbours.push(neighbour);
                        self.cells[neighbour].neighbours.push(slot);
                    }
                }
            }
        }

        self.cells.push(GridCell {
            points: Vec::new(),
            neighbours,
        });
        self.lookup.insert(key, slot);

        slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn unit_grid(spacing: f64) -> Grid {
        Grid::new(Aabb::new(DVec3::ZERO, DVec3::ONE), spacing)
    }

    #[test]
    fn dimensions_from_spacing() {
        // cell size = 0.01 * 5 = 0.05 → 20 cells per unit
        let grid = unit_grid(0.01);
        assert_eq!(grid.dimensions(), (20, 20, 20));

        let flat = Grid::new(
            Aabb::new(DVec3::ZERO, DVec3::new(1.0, 0.5, 0.01)),
            0.01,
        );
        assert_eq!(flat.dimensions(), (20, 10, 1));
    }

    #[test]
    fn tiny_box_degenerates_to_single_cell() {
        let mut grid = unit_grid(10.0);
        assert_eq!(grid.dimensions(), (1, 1, 1));

        assert!(grid.add(DVec3::splat(0.5)));
        assert!(!grid.add(DVec3::ONE));
        assert!(!grid.add(DVec3::ZERO));
        assert_eq!(grid.len(), 1);
    }

    #[test]
    fn first_point_accepted_close_rejected() {
        let mut grid = unit_grid(0.1);

        assert!(grid.add(DVec3::splat(0.5)));
        assert!(!grid.add(DVec3::new(0.55, 0.5, 0.5)));
        assert!(grid.add(DVec3::new(0.5, 0.5, 0.65)));
    }

    #[test]
    fn distance_equal_to_spacing_is_accepted() {
        let mut grid = unit_grid(0.25);

        assert!(grid.add(DVec3::new(0.0, 0.0, 0.0)));
        assert!(grid.add(DVec3::new(0.25, 0.0, 0.0)));
    }

    #[test]
    fn rejects_across_neighbouring_cells() {
        // cell size 0.05; the two points straddle a cell boundary
        let mut grid = unit_grid(0.01);
        let a = DVec3::new(0.049, 0.5, 0.5);
        let b = DVec3::new(0.051, 0.5, 0.5);
        assert_ne!(grid.cell_index(a), grid.cell_index(b));

        assert!(grid.add(a));
        assert!(!grid.add(b));
        assert_eq!(grid.len(), 2);
    }

    #[test]
    fn neighbour_links_are_bidirectional() {
        let mut grid = unit_grid(0.01);
        grid.add(DVec3::new(0.025, 0.025, 0.025));
        grid.add(DVec3::new(0.075, 0.075, 0.075));
        grid.add(DVec3::new(0.9, 0.9, 0.9));

        let first = grid.cell(0, 0, 0).expect("cell (0,0,0)");
        let second = grid.cell(1, 1, 1).expect("cell (1,1,1)");
        let far = grid.cell(18, 18, 18).expect("cell (18,18,18)");

        assert_eq!(first.neighbours(), &[1]);
        assert_eq!(second.neighbours(), &[0]);
        assert!(far.neighbours().is_empty());
    }

    #[test]
    fn out_of_box_points_clamp_to_edge_cells() {
        let mut grid = unit_grid(0.01);
        assert_eq!(grid.cell_index(DVec3::splat(-4.0)), (0, 0, 0));
        assert_eq!(grid.cell_index(DVec3::ONE), (19, 19, 19));
        assert_eq!(grid.cell_index(DVec3::splat(8.0)), (19, 19, 19));

        assert!(grid.add(DVec3::splat(2.0)));
        assert_eq!(grid.cell(19, 19, 19).map(|c| c.points().len()), Some(1));
    }

    #[test]
    fn accepted_points_respect_spacing() {
        let spacing = 0.02;
        let mut grid = unit_grid(spacing);
        let mut rng = StdRng::seed_from_u64(42);
        let mut accepted = Vec::new();

        for _ in 0..5_000 {
            let p = DVec3::new(rng.random(), rng.random(), rng.random());
            if grid.add(p) {
                accepted.push(p);
            }
        }

        assert!(!accepted.is_empty());
        for (n, a) in accepted.iter().enumerate() {
            for b in &accepted[n + 1..] {
                assert!(
                    a.distance(*b) >= spacing,
                    "{a:?} and {b:?} closer than {spacing}"
                );
            }
        }
    }
}
