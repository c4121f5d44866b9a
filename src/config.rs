//! Run configuration.
//!
//! A [`RunConfig`] bundles every tunable of a run: grid shape, seeds, terrain
//! noise and the droplet model. It is built once (defaults, JSON file or
//! both), validated once, and then only read.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::erosion::params::ErosionParams;
use crate::heightmap::TerrainParams;
use crate::seeds::RunSeeds;

/// Errors raised while loading or validating a configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Grid must have at least one row and column (got {rows} x {cols})")]
    InvalidDimensions { rows: usize, cols: usize },
    #[error("Grid {rows} x {cols} is too small for droplets; need at least 2 x 2")]
    GridTooSmall { rows: usize, cols: usize },
    #[error("Noise scale must be finite and non-zero (got {0})")]
    InvalidScale(f64),
    #[error("Erosion kernel must be square (got {rows} rows, row {row} has {found} entries)")]
    KernelNotSquare { rows: usize, row: usize, found: usize },
    #[error("Erosion kernel side must be odd (got {0})")]
    KernelEvenSide(usize),
    #[error("Erosion kernel weights must be finite and non-negative with a positive sum")]
    KernelWeights,
    #[error("Erosion kernel radius {radius} exceeds the maximum of {max}")]
    KernelTooLarge { radius: usize, max: usize },
    #[error("Erosion kernel radius {radius} does not fit a {rows} x {cols} grid")]
    KernelExceedsGrid { radius: usize, rows: usize, cols: usize },
    #[error("Invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

/// Complete, immutable configuration of one run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Grid rows
    pub rows: usize,
    /// Grid columns
    pub cols: usize,
    /// Master seed; terrain and droplet seeds derive from it
    pub seed: u64,
    /// Override for the terrain noise seed
    pub terrain_seed: Option<u64>,
    /// Override for the droplet placement seed
    pub droplet_seed: Option<u64>,
    pub terrain: TerrainParams,
    pub erosion: ErosionParams,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            rows: 256,
            cols: 256,
            seed: 74,
            terrain_seed: None,
            droplet_seed: None,
            terrain: TerrainParams::default(),
            erosion: ErosionParams::default(),
        }
    }
}

impl RunConfig {
    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: RunConfig = serde_json::from_str(text)?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Resolve the seeds for each random source.
    pub fn seeds(&self) -> RunSeeds {
        let mut builder = RunSeeds::builder(self.seed);
        if let Some(seed) = self.terrain_seed {
            builder = builder.terrain(seed);
        }
        if let Some(seed) = self.droplet_seed {
            builder = builder.droplets(seed);
        }
        builder.build()
    }

    /// Check every rule that must hold before any work begins.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rows == 0 || self.cols == 0 {
            return Err(ConfigError::InvalidDimensions {
                rows: self.rows,
                cols: self.cols,
            });
        }
        if self.rows < 2 || self.cols < 2 {
            return Err(ConfigError::GridTooSmall {
                rows: self.rows,
                cols: self.cols,
            });
        }
        self.terrain.validate()?;
        self.erosion.validate()?;

        let radius = self.erosion.kernel.radius();
        if radius >= self.rows.max(self.cols) {
            return Err(ConfigError::KernelExceedsGrid {
                radius,
                rows: self.rows,
                cols: self.cols,
            });
        }
        Ok(())
    }
}
