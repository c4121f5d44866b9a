//! Initial terrain synthesis.
//!
//! Fills a grid with multi-octave Perlin noise sampled at `(row / scale,
//! col / scale)` and rescales it so the lowest cell is 0.0 and the highest is
//! 1.0. The noise itself is an implementation detail; callers rely only on
//! the shape, the [0, 1] range and determinism for a given seed.

use noise::{NoiseFn, Perlin};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::tilemap::Heightmap;

// =============================================================================
// TERRAIN PARAMETERS
// =============================================================================

/// Parameters for terrain generation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainParams {
    /// Feature size in cells (larger = broader hills)
    pub scale: f64,
    /// Number of noise octaves
    pub octaves: u32,
    /// Amplitude decay per octave (0.0-1.0)
    pub persistence: f64,
    /// Frequency multiplier per octave
    pub lacunarity: f64,
}

impl Default for TerrainParams {
    fn default() -> Self {
        Self {
            scale: 250.0,
            octaves: 6,
            persistence: 0.6,
            lacunarity: 1.8,
        }
    }
}

impl TerrainParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scale == 0.0 || !self.scale.is_finite() {
            return Err(ConfigError::InvalidScale(self.scale));
        }
        for (name, value) in [("persistence", self.persistence), ("lacunarity", self.lacunarity)] {
            if !value.is_finite() {
                return Err(ConfigError::InvalidParameter {
                    name,
                    reason: format!("must be finite (got {value})"),
                });
            }
        }
        if self.octaves == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "octaves",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// MAIN HEIGHTMAP GENERATION
// =============================================================================

/// Generate a normalized heightmap of `rows` x `cols` cells.
///
/// Identical arguments always produce a bit-identical grid. Rows are filled
/// in parallel; each cell depends only on its own coordinates so the split
/// does not affect the result.
pub fn generate_heightmap(
    rows: usize,
    cols: usize,
    params: &TerrainParams,
    seed: u32,
) -> Result<Heightmap, ConfigError> {
    if rows == 0 || cols == 0 {
        return Err(ConfigError::InvalidDimensions { rows, cols });
    }
    params.validate()?;

    let noise = Perlin::new(seed);
    let mut heightmap = Heightmap::new(rows, cols);

    heightmap
        .as_mut_slice()
        .par_chunks_mut(cols)
        .enumerate()
        .for_each(|(i, row)| {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = fbm(
                    &noise,
                    i as f64 / params.scale,
                    j as f64 / params.scale,
                    params.octaves,
                    params.persistence,
                    params.lacunarity,
                );
            }
        });

    normalize_in_place(&mut heightmap);
    Ok(heightmap)
}

// =============================================================================
// NOISE FUNCTIONS
// =============================================================================

/// Fractional Brownian Motion - multi-octave noise. The sum is left
/// unscaled; [`normalize_in_place`] sets the final range.
fn fbm(
    noise: &Perlin,
    x: f64,
    y: f64,
    octaves: u32,
    persistence: f64,
    lacunarity: f64,
) -> f64 {
    let mut total = 0.0;
    let mut amplitude = 1.0;
    let mut frequency = 1.0;

    for _ in 0..octaves {
        total += amplitude * noise.get([x * frequency, y * frequency]);
        amplitude *= persistence;
        frequency *= lacunarity;
    }

    total
}

// =============================================================================
// NORMALIZATION & STATISTICS
// =============================================================================

/// Rescale heightmap values to the 0.0-1.0 range.
///
/// A flat grid has no range to stretch; it becomes all zeros.
pub fn normalize_in_place(heightmap: &mut Heightmap) {
    let Some((min_val, max_val)) = heightmap.min_max() else {
        return;
    };

    let range = max_val - min_val;
    if range <= 0.0 || !range.is_finite() {
        log::warn!(
            "heightmap is flat ({} x {}, value {:.6}); normalizing to zero",
            heightmap.rows,
            heightmap.cols,
            min_val
        );
        heightmap.fill(0.0);
        return;
    }

    for h in heightmap.as_mut_slice() {
        *h = (*h - min_val) / range;
    }
}

/// Summary statistics of a heightmap, reported after every cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HeightSummary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl HeightSummary {
    pub fn of(heightmap: &Heightmap) -> Self {
        let Some((min, max)) = heightmap.min_max() else {
            return Self::default();
        };
        let mean = heightmap.mean();
        let variance = heightmap
            .as_slice()
            .iter()
            .map(|h| {
                let diff = h - mean;
                diff * diff
            })
            .sum::<f64>()
            / heightmap.len() as f64;

        Self {
            min,
            max,
            mean,
            std_dev: variance.sqrt(),
        }
    }
}

/// Count cells per elevation bin between the map's min and max.
pub fn height_histogram(heightmap: &Heightmap, num_bins: usize) -> Vec<usize> {
    let num_bins = num_bins.clamp(1, 50);
    let mut bins = vec![0usize; num_bins];
    let Some((min_h, max_h)) = heightmap.min_max() else {
        return bins;
    };

    let range = max_h - min_h;
    for &h in heightmap.as_slice() {
        let bin_idx = if range > 0.0 {
            (((h - min_h) / range) * num_bins as f64) as usize
        } else {
            0
        };
        bins[bin_idx.min(num_bins - 1)] += 1;
    }
    bins
}

/// Log the elevation distribution at debug level.
pub fn log_height_histogram(heightmap: &Heightmap, num_bins: usize) {
    if !log::log_enabled!(log::Level::Debug) {
        return;
    }
    let bins = height_histogram(heightmap, num_bins);
    let summary = HeightSummary::of(heightmap);
    let max_bin = bins.iter().copied().max().unwrap_or(1).max(1);
    let bin_width = (summary.max - summary.min) / bins.len() as f64;

    log::debug!(
        "heights: min {:.4} max {:.4} mean {:.4} std {:.4}",
        summary.min, summary.max, summary.mean, summary.std_dev
    );
    for (i, &count) in bins.iter().enumerate() {
        let start = summary.min + i as f64 * bin_width;
        let bar = "#".repeat(count * 40 / max_bin);
        log::debug!("  {:>8.4} | {:<40} | {}", start, bar, count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_is_deterministic() {
        let params = TerrainParams { scale: 25.0, ..TerrainParams::default() };
        let a = generate_heightmap(32, 48, &params, 74).unwrap();
        let b = generate_heightmap(32, 48, &params, 74).unwrap();
        assert_eq!(a.as_slice(), b.as_slice());
    }

    #[test]
    fn test_different_seeds_differ() {
        let params = TerrainParams { scale: 25.0, ..TerrainParams::default() };
        let a = generate_heightmap(32, 32, &params, 1).unwrap();
        let b = generate_heightmap(32, 32, &params, 2).unwrap();
        assert_ne!(a.as_slice(), b.as_slice());
    }

    #[test]
    fn test_generated_heightmap_is_normalized() {
        let params = TerrainParams { scale: 17.3, ..TerrainParams::default() };
        let map = generate_heightmap(40, 30, &params, 9).unwrap();
        assert_eq!((map.rows, map.cols), (40, 30));
        let (lo, hi) = map.min_max().unwrap();
        assert!(lo.abs() < 1e-12);
        assert!((hi - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_negative_persistence_still_normalizes() {
        // Octave amplitudes 1 and -1 sum to zero
        let params = TerrainParams {
            scale: 7.0,
            octaves: 2,
            persistence: -1.0,
            ..TerrainParams::default()
        };
        let map = generate_heightmap(8, 8, &params, 74).unwrap();
        assert!(map.as_slice().iter().all(|h| h.is_finite()));
        let (lo, hi) = map.min_max().unwrap();
        assert!(lo.abs() < 1e-12);
        assert!((hi - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_non_finite_fractal_params() {
        let params = TerrainParams { persistence: f64::NAN, ..TerrainParams::default() };
        assert!(matches!(
            generate_heightmap(4, 4, &params, 1),
            Err(ConfigError::InvalidParameter { name: "persistence", .. })
        ));
        let params = TerrainParams { lacunarity: f64::INFINITY, ..TerrainParams::default() };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_inputs() {
        let params = TerrainParams::default();
        assert!(matches!(
            generate_heightmap(0, 10, &params, 1),
            Err(ConfigError::InvalidDimensions { .. })
        ));
        let zero_scale = TerrainParams { scale: 0.0, ..TerrainParams::default() };
        assert!(matches!(
            generate_heightmap(10, 10, &zero_scale, 1),
            Err(ConfigError::InvalidScale(_))
        ));
    }

    #[test]
    fn test_flat_grid_normalizes_to_zero() {
        let mut map = Heightmap::new_with(3, 3, 0.5);
        normalize_in_place(&mut map);
        assert!(map.as_slice().iter().all(|&h| h == 0.0));
    }

    #[test]
    fn test_histogram_counts_every_cell() {
        let params = TerrainParams { scale: 10.0, ..TerrainParams::default() };
        let map = generate_heightmap(20, 20, &params, 3).unwrap();
        let bins = height_histogram(&map, 10);
        assert_eq!(bins.len(), 10);
        assert_eq!(bins.iter().sum::<usize>(), 400);
    }

    #[test]
    fn test_summary_of_known_grid() {
        let map = Heightmap::from_vec(1, 4, vec![0.0, 1.0, 0.0, 1.0]).unwrap();
        let summary = HeightSummary::of(&map);
        assert_eq!(summary.min, 0.0);
        assert_eq!(summary.max, 1.0);
        assert!((summary.mean - 0.5).abs() < 1e-12);
        assert!((summary.std_dev - 0.5).abs() < 1e-12);
    }
}
