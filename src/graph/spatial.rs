//! Uniform-grid neighbor search.
//!
//! Points are bucketed into cubic cells whose edge equals the search radius,
//! so every neighbor of a query lies in the 27 cells around it.

use std::collections::HashMap;

use crate::model::vec3::{self, Vec3};

type CellKey = (i64, i64, i64);

/// Grid-based spatial index over a fixed set of points.
#[derive(Debug)]
pub struct SpatialGrid<'a> {
    points: &'a [Vec3],
    inv_cell_size: f64,
    cells: HashMap<CellKey, Vec<usize>>,
}

impl<'a> SpatialGrid<'a> {
    /// Buckets `points` into cells of edge `cell_size`.
    ///
    /// # Panics
    ///
    /// Panics if `cell_size <= 0.0`.
    pub fn new(points: &'a [Vec3], cell_size: f64) -> Self {
        assert!(cell_size > 0.0, "cell size must be positive");
        let mut grid = Self {
            points,
            inv_cell_size: 1.0 / cell_size,
            cells: HashMap::new(),
        };
        for (idx, &p) in points.iter().enumerate() {
            let key = grid.cell_of(p);
            grid.cells.entry(key).or_default().push(idx);
        }
        grid
    }

    fn cell_of(&self, p: Vec3) -> CellKey {
        (
            (p[0] * self.inv_cell_size).floor() as i64,
            (p[1] * self.inv_cell_size).floor() as i64,
            (p[2] * self.inv_cell_size).floor() as i64,
        )
    }

    /// Indices of all points within `radius` of `query`, ascending.
    ///
    /// `radius` must not exceed the cell size the grid was built with.
    pub fn within(&self, query: Vec3, radius: f64) -> Vec<usize> {
        let radius_sq = radius * radius;
        let (cx, cy, cz) = self.cell_of(query);

        let mut hits = Vec::new();
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let Some(bucket) = self.cells.get(&(cx + dx, cy + dy, cz + dz)) else {
                        continue;
                    };
                    for &idx in bucket {
                        let d = vec3::sub(self.points[idx], query);
                        if vec3::dot(d, d) <= radius_sq {
                            hits.push(idx);
                        }
                    }
                }
            }
        }

        hits.sort_unstable();
        hits
    }
}
