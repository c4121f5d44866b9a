//! Finite-difference gradient of a heightmap snapshot.

use crate::tilemap::{Heightmap, Tilemap};

/// Partial derivatives of a heightmap along rows and columns.
///
/// Central differences `(h[i+1] - h[i-1]) / 2` in the interior, first-order
/// one-sided differences on the borders. An axis of length one has zero
/// derivative. The same scheme is used every time the field is refreshed so
/// trajectories stay reproducible.
#[derive(Clone, Debug, PartialEq)]
pub struct GradientField {
    d_row: Tilemap<f64>,
    d_col: Tilemap<f64>,
}

impl GradientField {
    /// Compute the gradient of `heightmap`.
    pub fn compute(heightmap: &Heightmap) -> Self {
        let mut field = Self {
            d_row: Tilemap::new(heightmap.rows, heightmap.cols),
            d_col: Tilemap::new(heightmap.rows, heightmap.cols),
        };
        field.recompute(heightmap);
        field
    }

    /// Refresh from the current heightmap, reusing the existing buffers.
    pub fn recompute(&mut self, heightmap: &Heightmap) {
        let rows = heightmap.rows;
        let cols = heightmap.cols;
        if self.d_row.rows != rows || self.d_row.cols != cols {
            self.d_row = Tilemap::new(rows, cols);
            self.d_col = Tilemap::new(rows, cols);
        }

        for row in 0..rows {
            for col in 0..cols {
                let h = |r: usize, c: usize| *heightmap.get(r, c);

                let d_row = if rows < 2 {
                    0.0
                } else if row == 0 {
                    h(1, col) - h(0, col)
                } else if row == rows - 1 {
                    h(row, col) - h(row - 1, col)
                } else {
                    (h(row + 1, col) - h(row - 1, col)) / 2.0
                };

                let d_col = if cols < 2 {
                    0.0
                } else if col == 0 {
                    h(row, 1) - h(row, 0)
                } else if col == cols - 1 {
                    h(row, col) - h(row, col - 1)
                } else {
                    (h(row, col + 1) - h(row, col - 1)) / 2.0
                };

                self.d_row.set(row, col, d_row);
                self.d_col.set(row, col, d_col);
            }
        }
    }

    /// `(d/d_row, d/d_col)` at a cell.
    #[inline]
    pub fn slope_at(&self, row: usize, col: usize) -> (f64, f64) {
        (*self.d_row.get(row, col), *self.d_col.get(row, col))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gradient_flat() {
        let map = Heightmap::new_with(4, 4, 0.5);
        let field = GradientField::compute(&map);
        for r in 0..4 {
            for c in 0..4 {
                assert_eq!(field.slope_at(r, c), (0.0, 0.0));
            }
        }
    }

    #[test]
    fn test_gradient_of_linear_ramp_is_exact() {
        // h = 2*row + 3*col: every scheme gives the exact slope
        let mut map = Heightmap::new(5, 6);
        for (r, c, h) in map.iter_mut() {
            *h = 2.0 * r as f64 + 3.0 * c as f64;
        }
        let field = GradientField::compute(&map);
        for r in 0..5 {
            for c in 0..6 {
                assert_eq!(field.slope_at(r, c), (2.0, 3.0));
            }
        }
    }

    #[test]
    fn test_gradient_edges_one_sided() {
        // Quadratic along rows: 0, 1, 4, 9
        let map = Heightmap::from_vec(4, 1, vec![0.0, 1.0, 4.0, 9.0]).unwrap();
        let field = GradientField::compute(&map);
        assert_eq!(field.slope_at(0, 0).0, 1.0);
        assert_eq!(field.slope_at(1, 0).0, 2.0);
        assert_eq!(field.slope_at(2, 0).0, 4.0);
        assert_eq!(field.slope_at(3, 0).0, 5.0);
        assert_eq!(field.slope_at(2, 0).1, 0.0);
    }

    #[test]
    fn test_recompute_tracks_changes() {
        let mut map = Heightmap::new_with(3, 3, 0.0);
        let mut field = GradientField::compute(&map);
        map.set(2, 1, 1.0);
        field.recompute(&map);
        assert_eq!(field.slope_at(1, 1), (0.5, 0.0));
        assert_eq!(field, GradientField::compute(&map));
    }
}
