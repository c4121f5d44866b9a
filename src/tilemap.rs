/// A dense 2D grid addressed by `(row, col)`, stored row-major.
///
/// Unlike a planetary map this grid does not wrap: every index must lie in
/// `0..rows` x `0..cols`.
#[derive(Clone, Debug, PartialEq)]
pub struct Tilemap<T> {
    pub rows: usize,
    pub cols: usize,
    data: Vec<T>,
}

/// Terrain elevations. Normalized to [0, 1] when generated, free to drift
/// afterwards as sediment moves around.
pub type Heightmap = Tilemap<f64>;

impl<T: Clone + Default> Tilemap<T> {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![T::default(); rows * cols],
        }
    }
}

impl<T: Clone> Tilemap<T> {
    pub fn new_with(rows: usize, cols: usize, value: T) -> Self {
        Self {
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }

    /// Build a grid from row-major data. Returns `None` if the length does not
    /// match `rows * cols`.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<T>) -> Option<Self> {
        if data.len() != rows * cols {
            return None;
        }
        Some(Self { rows, cols, data })
    }

    #[inline]
    fn index(&self, row: usize, col: usize) -> usize {
        debug_assert!(row < self.rows && col < self.cols, "({row}, {col}) outside {}x{}", self.rows, self.cols);
        row * self.cols + col
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> &T {
        &self.data[self.index(row, col)]
    }

    #[inline]
    pub fn get_mut(&mut self, row: usize, col: usize) -> &mut T {
        let idx = self.index(row, col);
        &mut self.data[idx]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: T) {
        let idx = self.index(row, col);
        self.data[idx] = value;
    }

    /// Fill the entire map with a value.
    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Iterate over rows as slices.
    pub fn row_slices(&self) -> impl Iterator<Item = &[T]> {
        self.data.chunks(self.cols.max(1))
    }

    /// Iterate mutably over all cells with their coordinates.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, usize, &mut T)> {
        let cols = self.cols;
        self.data.iter_mut().enumerate().map(move |(idx, val)| {
            (idx / cols, idx % cols, val)
        })
    }
}

impl Tilemap<f64> {
    /// Smallest and largest value, or `None` for an empty grid.
    pub fn min_max(&self) -> Option<(f64, f64)> {
        let mut iter = self.data.iter().copied();
        let first = iter.next()?;
        Some(iter.fold((first, first), |(lo, hi), h| (lo.min(h), hi.max(h))))
    }

    /// Sum of all elevations. Used for mass-balance checks.
    pub fn total(&self) -> f64 {
        self.data.iter().sum()
    }

    pub fn mean(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.total() / self.data.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_major_layout() {
        let mut map = Tilemap::new_with(2, 3, 0.0f64);
        map.set(1, 2, 5.0);
        map.set(0, 1, 2.0);
        assert_eq!(map.as_slice(), &[0.0, 2.0, 0.0, 0.0, 0.0, 5.0]);
        assert_eq!(*map.get(1, 2), 5.0);
    }

    #[test]
    fn test_from_vec_rejects_bad_length() {
        assert!(Tilemap::from_vec(2, 2, vec![1.0f64; 3]).is_none());
        assert!(Tilemap::from_vec(2, 2, vec![1.0f64; 4]).is_some());
    }

    #[test]
    fn test_min_max_and_mean() {
        let map = Tilemap::from_vec(2, 2, vec![0.5, -1.0, 3.0, 1.5]).unwrap();
        assert_eq!(map.min_max(), Some((-1.0, 3.0)));
        assert!((map.mean() - 1.0).abs() < 1e-12);
        assert_eq!(Tilemap::<f64>::new(0, 0).min_max(), None);
    }

    #[test]
    fn test_iter_coordinates() {
        let mut map = Tilemap::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let cells: Vec<_> = map.iter_mut().map(|(r, c, v)| (r, c, *v)).collect();
        assert_eq!(cells[2], (1, 0, 3.0));
    }
}
