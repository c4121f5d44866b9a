//! Erosion kernel: the weighted footprint an erosion delta is spread over.

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::erosion::Terrain;

/// How a kernel is described in a configuration file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KernelSpec {
    /// 3x3 binomial blur `[1 2 1; 2 4 2; 1 2 1] / 16`
    Binomial3,
    /// Circular brush with linear falloff
    Circular { radius: usize },
    /// Explicit square matrix, normalized to sum to 1
    Custom { weights: Vec<Vec<f64>> },
}

impl Default for KernelSpec {
    fn default() -> Self {
        Self::Binomial3
    }
}

/// Largest kernel radius a configuration may ask for.
pub const MAX_KERNEL_RADIUS: usize = 64;

impl KernelSpec {
    /// Radius of the kernel this spec describes. A custom matrix with an even
    /// side reports the radius it would have if it were valid.
    pub fn radius(&self) -> usize {
        match self {
            Self::Binomial3 => 1,
            Self::Circular { radius } => *radius,
            Self::Custom { weights } => weights.len().saturating_sub(1) / 2,
        }
    }
}

/// Which offsets of the kernel are visited when spreading a delta.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelFootprint {
    /// Offsets `-r..=r` on both axes; every weight is used.
    #[default]
    Symmetric,
    /// Offsets `-r..r`; the last row and column of the kernel are skipped.
    HalfOpen,
}

/// Immutable square weight matrix with odd side `2 * radius + 1`.
#[derive(Clone, Debug, PartialEq)]
pub struct ErosionKernel {
    radius: usize,
    /// Row-major, `side * side` entries, summing to 1
    weights: Vec<f64>,
}

impl ErosionKernel {
    /// Build a kernel from explicit rows. The matrix must be square with an
    /// odd side; weights are rescaled to sum to 1.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self, ConfigError> {
        let side = rows.len();
        if let Some((row, found)) = rows
            .iter()
            .enumerate()
            .map(|(i, r)| (i, r.len()))
            .find(|&(_, len)| len != side)
        {
            return Err(ConfigError::KernelNotSquare { rows: side, row, found });
        }
        if side % 2 == 0 {
            return Err(ConfigError::KernelEvenSide(side));
        }

        let weights: Vec<f64> = rows.iter().flatten().copied().collect();
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ConfigError::KernelWeights);
        }
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return Err(ConfigError::KernelWeights);
        }

        Ok(Self {
            radius: (side - 1) / 2,
            weights: weights.into_iter().map(|w| w / total).collect(),
        })
    }

    /// The single-cell kernel: all erosion lands on the droplet's cell.
    pub fn point() -> Self {
        Self {
            radius: 0,
            weights: vec![1.0],
        }
    }

    pub fn binomial3() -> Self {
        Self {
            radius: 1,
            weights: [1.0, 2.0, 1.0, 2.0, 4.0, 2.0, 1.0, 2.0, 1.0]
                .iter()
                .map(|w| w / 16.0)
                .collect(),
        }
    }

    /// Circular brush with falloff `1 - d^2 / r^2`, normalized to sum to 1.
    pub fn circular(radius: usize) -> Self {
        if radius == 0 {
            return Self::point();
        }
        let r = radius as i64;
        let r_sq = (r * r) as f64;
        let side = 2 * radius + 1;
        let mut weights = Vec::with_capacity(side * side);
        let mut total = 0.0;

        for dr in -r..=r {
            for dc in -r..=r {
                let dist_sq = (dr * dr + dc * dc) as f64;
                let weight = (1.0 - dist_sq / r_sq).max(0.0);
                weights.push(weight);
                total += weight;
            }
        }

        for w in weights.iter_mut() {
            *w /= total;
        }
        Self { radius, weights }
    }

    pub fn from_spec(spec: &KernelSpec) -> Result<Self, ConfigError> {
        match spec {
            KernelSpec::Binomial3 => Ok(Self::binomial3()),
            KernelSpec::Circular { radius } => Ok(Self::circular(*radius)),
            KernelSpec::Custom { weights } => Self::from_rows(weights),
        }
    }

    pub fn radius(&self) -> usize {
        self.radius
    }

    pub fn side(&self) -> usize {
        2 * self.radius + 1
    }

    /// Weight at offset `(dr, dc)` from the center, each in `-radius..=radius`.
    pub fn weight(&self, dr: isize, dc: isize) -> f64 {
        let r = self.radius as isize;
        let side = self.side();
        self.weights[(dr + r) as usize * side + (dc + r) as usize]
    }

    fn offsets(&self, footprint: KernelFootprint) -> std::ops::Range<isize> {
        let r = self.radius as isize;
        match footprint {
            KernelFootprint::Symmetric => -r..r + 1,
            KernelFootprint::HalfOpen => -r..r,
        }
    }

    /// Add `delta` to the terrain around `(row, col)`, split by kernel weight.
    ///
    /// Offsets that fall off the grid (or outside the footprint) are dropped
    /// and the remaining weights renormalized, so the sum written equals
    /// `delta` up to rounding. If nothing remains the whole delta lands on the
    /// center cell. Returns the sum actually written.
    pub fn spread<T: Terrain + ?Sized>(
        &self,
        terrain: &mut T,
        row: usize,
        col: usize,
        delta: f64,
        footprint: KernelFootprint,
    ) -> f64 {
        let (row, col) = (row as isize, col as isize);

        let mut covered = 0.0;
        for dr in self.offsets(footprint) {
            for dc in self.offsets(footprint) {
                if terrain.contains(row + dr, col + dc) {
                    covered += self.weight(dr, dc);
                }
            }
        }

        if covered <= 0.0 {
            terrain.add(row as usize, col as usize, delta);
            return delta;
        }

        let mut written = 0.0;
        for dr in self.offsets(footprint) {
            for dc in self.offsets(footprint) {
                let (r, c) = (row + dr, col + dc);
                if !terrain.contains(r, c) {
                    continue;
                }
                let w = self.weight(dr, dc);
                if w == 0.0 {
                    continue;
                }
                let part = delta * w / covered;
                terrain.add(r as usize, c as usize, part);
                written += part;
            }
        }
        written
    }
}

impl Default for ErosionKernel {
    fn default() -> Self {
        Self::binomial3()
    }
}
