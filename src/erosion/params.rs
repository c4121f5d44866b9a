//! Droplet erosion parameters and configuration

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::erosion::kernel::{ErosionKernel, KernelFootprint, KernelSpec, MAX_KERNEL_RADIUS};

/// How droplets within a batch are scheduled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// One droplet after another against the live heightmap
    #[default]
    Sequential,
    /// Droplets of a batch run concurrently against a frozen snapshot; their
    /// deltas are applied in droplet order once the batch completes
    ParallelBatches,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sequential => write!(f, "sequential"),
            Self::ParallelBatches => write!(f, "parallel-batches"),
        }
    }
}

/// Droplet physics and simulation-scale parameters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErosionParams {
    // =========================================================================
    // Simulation scale
    // =========================================================================

    /// Number of cycles; each ends with a heightmap snapshot
    pub cycles: usize,

    /// Droplets simulated per cycle
    pub droplet_count: usize,

    /// Droplets per gradient refresh
    pub batch_size: usize,

    /// Maximum path length (steps) per droplet
    pub step_cap: usize,

    pub execution: ExecutionMode,

    // =========================================================================
    // Motion
    // =========================================================================

    /// Integration timestep
    pub dt: f64,

    /// Gravity factor accelerating droplets down the gradient
    pub gravity: f64,

    /// Velocity damping per unit time
    pub friction: f64,

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Initial water volume for each droplet
    pub initial_volume: f64,

    /// Volume at or below which a droplet evaporates
    pub min_volume: f64,

    /// Fraction of volume lost per unit time
    pub evaporation_rate: f64,

    /// Stall threshold on speed (only with `stall_detection`)
    pub min_speed: f64,

    /// Stall threshold on gradient magnitude (only with `stall_detection`)
    pub min_slope: f64,

    /// End droplets that are both slow and on flat ground
    pub stall_detection: bool,

    // =========================================================================
    // Erosion / sedimentation
    // =========================================================================

    /// Sediment carrying capacity multiplier
    pub capacity_factor: f64,

    /// Fraction of the free capacity eroded per step (0.0-1.0)
    pub erosion_rate: f64,

    /// Fraction of the excess sediment deposited per step (0.0-1.0)
    pub deposition_rate: f64,

    /// Sediment carried by a fresh droplet
    pub initial_sediment: f64,

    /// Footprint erosion is spread over
    pub kernel: KernelSpec,

    pub kernel_footprint: KernelFootprint,
}

impl Default for ErosionParams {
    fn default() -> Self {
        Self {
            cycles: 10,
            droplet_count: 50_000,
            batch_size: 50,
            step_cap: 250,
            execution: ExecutionMode::Sequential,

            dt: 0.25,
            gravity: 10.0,
            friction: 0.01,

            initial_volume: 1.0,
            min_volume: 0.1,
            evaporation_rate: 0.025,
            min_speed: 0.01,
            min_slope: 0.1,
            stall_detection: false,

            capacity_factor: 8.0,
            erosion_rate: 0.7,
            deposition_rate: 0.25,
            initial_sediment: 0.0,
            kernel: KernelSpec::Binomial3,
            kernel_footprint: KernelFootprint::Symmetric,
        }
    }
}

impl ErosionParams {
    /// Create a fast configuration for testing (fewer droplets and cycles)
    pub fn fast() -> Self {
        Self {
            cycles: 2,
            droplet_count: 500,
            batch_size: 50,
            ..Default::default()
        }
    }

    /// Number of full batches per cycle. A trailing partial batch is dropped.
    pub fn batches_per_cycle(&self) -> usize {
        self.droplet_count / self.batch_size.max(1)
    }

    /// Droplets actually simulated per cycle.
    pub fn droplets_per_cycle(&self) -> usize {
        self.batches_per_cycle() * self.batch_size
    }

    /// Volume retained after one step of evaporation.
    pub fn evaporation_factor(&self) -> f64 {
        1.0 - self.evaporation_rate * self.dt
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(name: &'static str, reason: impl Into<String>) -> ConfigError {
            ConfigError::InvalidParameter { name, reason: reason.into() }
        }

        if self.batch_size == 0 {
            return Err(invalid("batch_size", "must be at least 1"));
        }
        if self.batch_size > self.droplet_count {
            return Err(invalid(
                "batch_size",
                format!("{} exceeds droplet_count {}", self.batch_size, self.droplet_count),
            ));
        }
        if self.step_cap == 0 {
            return Err(invalid("step_cap", "must be at least 1"));
        }
        if !(self.dt > 0.0 && self.dt.is_finite()) {
            return Err(invalid("dt", format!("must be positive (got {})", self.dt)));
        }
        if !(self.initial_volume > 0.0 && self.initial_volume.is_finite()) {
            return Err(invalid("initial_volume", "must be positive"));
        }
        if !(self.min_volume >= 0.0 && self.min_volume < self.initial_volume) {
            return Err(invalid(
                "min_volume",
                format!("must be in [0, initial_volume) (got {})", self.min_volume),
            ));
        }
        let factor = self.evaporation_factor();
        if !(0.0..=1.0).contains(&factor) {
            return Err(invalid(
                "evaporation_rate",
                format!("evaporation_rate * dt must be in [0, 1] (got {})", self.evaporation_rate * self.dt),
            ));
        }
        if !(0.0..=1.0).contains(&(self.friction * self.dt)) {
            return Err(invalid("friction", "friction * dt must be in [0, 1]"));
        }
        for (name, value) in [
            ("erosion_rate", self.erosion_rate),
            ("deposition_rate", self.deposition_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(name, format!("must be in [0, 1] (got {value})")));
            }
        }
        for (name, value) in [
            ("gravity", self.gravity),
            ("capacity_factor", self.capacity_factor),
            ("initial_sediment", self.initial_sediment),
            ("min_speed", self.min_speed),
            ("min_slope", self.min_slope),
        ] {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(invalid(name, format!("must be non-negative (got {value})")));
            }
        }
        let radius = self.kernel.radius();
        if radius > MAX_KERNEL_RADIUS {
            return Err(ConfigError::KernelTooLarge { radius, max: MAX_KERNEL_RADIUS });
        }
        ErosionKernel::from_spec(&self.kernel)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_valid() {
        ErosionParams::default().validate().unwrap();
        ErosionParams::fast().validate().unwrap();
    }

    #[test]
    fn test_batches_per_cycle() {
        let params = ErosionParams { droplet_count: 125, batch_size: 50, ..Default::default() };
        assert_eq!(params.batches_per_cycle(), 2);
        assert_eq!(params.droplets_per_cycle(), 100);
        assert_eq!(ErosionParams::default().batches_per_cycle(), 1000);
    }

    #[test]
    fn test_rejects_bad_batching() {
        let params = ErosionParams { batch_size: 0, ..Default::default() };
        assert!(params.validate().is_err());
        let params = ErosionParams { droplet_count: 10, batch_size: 20, ..Default::default() };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_volumes_and_rates() {
        let params = ErosionParams { min_volume: 1.0, ..Default::default() };
        assert!(params.validate().is_err());
        let params = ErosionParams { erosion_rate: 1.5, ..Default::default() };
        assert!(params.validate().is_err());
        let params = ErosionParams { dt: 0.0, ..Default::default() };
        assert!(params.validate().is_err());
        let params = ErosionParams { step_cap: 0, ..Default::default() };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_rejects_malformed_kernel() {
        let params = ErosionParams {
            kernel: KernelSpec::Custom { weights: vec![vec![1.0, 1.0]] },
            ..Default::default()
        };
        assert!(matches!(params.validate(), Err(ConfigError::KernelNotSquare { .. })));
    }

    #[test]
    fn test_rejects_oversized_kernel_without_building_it() {
        let params = ErosionParams {
            kernel: KernelSpec::Circular { radius: 200_000 },
            ..Default::default()
        };
        assert!(matches!(
            params.validate(),
            Err(ConfigError::KernelTooLarge { radius: 200_000, max: MAX_KERNEL_RADIUS })
        ));

        let params = ErosionParams {
            kernel: KernelSpec::Circular { radius: MAX_KERNEL_RADIUS },
            ..Default::default()
        };
        params.validate().unwrap();
    }

    #[test]
    fn test_evaporation_factor() {
        assert!((ErosionParams::default().evaporation_factor() - 0.99375).abs() < 1e-15);
    }
}
