//! Hydraulic erosion simulation using particle-based water droplets.
//!
//! A run is a sequence of cycles. Each cycle simulates `droplet_count`
//! droplets in batches of `batch_size`; the gradient is refreshed at the
//! start of every batch, so droplets within a batch see a slightly stale
//! slope field. After every cycle the heightmap is handed to a
//! [`SnapshotSink`] and the running statistics are logged.
//!
//! Parallelization: with [`ExecutionMode::ParallelBatches`] the droplets of a
//! batch run on rayon workers against a frozen snapshot of the heightmap,
//! each recording its own deltas. The deltas are applied in droplet order
//! once the batch completes.

use std::collections::HashMap;

use rayon::prelude::*;
use thiserror::Error;

use crate::config::{ConfigError, RunConfig};
use crate::erosion::droplet::{Droplet, DropletState};
use crate::erosion::gradient::GradientField;
use crate::erosion::kernel::ErosionKernel;
use crate::erosion::params::{ErosionParams, ExecutionMode};
use crate::erosion::{ErosionStats, MassTally, Terrain, TrajectoryEnd, TrajectoryRecord};
use crate::export::{ExportError, SnapshotSink};
use crate::heightmap::log_height_histogram;
use crate::seeds::RunSeeds;
use crate::tilemap::Heightmap;

/// Errors that abort a run.
#[derive(Error, Debug)]
pub enum SimulationError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Failed to emit snapshot: {0}")]
    Export(#[from] ExportError),
}

/// Drives droplets over a heightmap for a configured number of cycles.
#[derive(Clone, Debug)]
pub struct ErosionSimulator {
    params: ErosionParams,
    kernel: ErosionKernel,
    seeds: RunSeeds,
}

impl ErosionSimulator {
    /// Validate the parameters and build the kernel. Nothing is simulated if
    /// this fails.
    pub fn new(params: ErosionParams, seeds: RunSeeds) -> Result<Self, ConfigError> {
        params.validate()?;
        let kernel = ErosionKernel::from_spec(&params.kernel)?;
        Ok(Self { params, kernel, seeds })
    }

    pub fn from_config(config: &RunConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Self::new(config.erosion.clone(), config.seeds())
    }

    /// Run every cycle against `heightmap`, emitting a snapshot per cycle.
    pub fn run<S: SnapshotSink + ?Sized>(
        &self,
        heightmap: &mut Heightmap,
        sink: &mut S,
    ) -> Result<ErosionStats, SimulationError> {
        let rows = heightmap.rows;
        let cols = heightmap.cols;
        if rows < 2 || cols < 2 {
            return Err(ConfigError::GridTooSmall { rows, cols }.into());
        }

        let params = &self.params;
        let batches = params.batches_per_cycle();
        log::info!(
            "eroding {}x{} map: {} cycles x {} batches x {} droplets ({}, step cap {})",
            rows,
            cols,
            params.cycles,
            batches,
            params.batch_size,
            params.execution,
            params.step_cap
        );

        let mut stats = ErosionStats::default();
        let mut gradient = GradientField::compute(heightmap);
        let mut droplet = Droplet::at(0, 0, params);
        let mut rng = self.seeds.droplet_rng();
        let mut next_index: u64 = 0;

        for cycle in 1..=params.cycles {
            for batch in 0..batches {
                gradient.recompute(heightmap);

                match params.execution {
                    ExecutionMode::Sequential => {
                        for _ in 0..params.batch_size {
                            droplet.reset(rows, cols, params, &mut rng);
                            let mut mass = MassTally::default();
                            let record = self.trace(&mut droplet, &mut *heightmap, &gradient, &mut mass);
                            stats.record_trajectory(&record, &mass);
                        }
                    }
                    ExecutionMode::ParallelBatches => {
                        self.run_batch_parallel(heightmap, &gradient, next_index, &mut stats);
                    }
                }
                next_index += params.batch_size as u64;

                log::debug!("cycle {} batch {}/{} done", cycle, batch + 1, batches);
            }

            let report = stats.finish_cycle(cycle, heightmap);
            log::info!(
                "cycle {}/{}: mean steps {:.2}, mean max speed {:.4}, absolute max speed {:.4}",
                cycle,
                params.cycles,
                report.mean_steps,
                report.mean_max_speed,
                report.absolute_max_speed
            );
            log::info!(
                "  eroded {:.4}, deposited {:.4}, lost off-map {:.4}; ended: {} evaporated, {} out of bounds, {} stalled, {} capped",
                report.mass.eroded,
                report.mass.deposited,
                report.mass.lost,
                report.outcomes.evaporated,
                report.outcomes.out_of_bounds,
                report.outcomes.stalled,
                report.outcomes.step_cap
            );
            log_height_histogram(heightmap, 10);
            sink.on_cycle(report, heightmap)?;
        }

        Ok(stats)
    }

    /// Step a freshly reset droplet until it ends or hits the step cap.
    ///
    /// A droplet still active at the cap drops its load where it stands.
    fn trace<T: Terrain + ?Sized>(
        &self,
        droplet: &mut Droplet,
        terrain: &mut T,
        gradient: &GradientField,
        mass: &mut MassTally,
    ) -> TrajectoryRecord {
        while droplet.is_active() && droplet.steps() < self.params.step_cap {
            let effect = droplet.step(terrain, gradient, &self.kernel, &self.params);
            mass.record_step(&effect);
        }

        let end = match droplet.state() {
            DropletState::Active => {
                let dropped = droplet.release_sediment(terrain);
                mass.deposited += dropped;
                mass.max_deposition = mass.max_deposition.max(dropped);
                TrajectoryEnd::StepCap
            }
            DropletState::Evaporated => TrajectoryEnd::Evaporated,
            DropletState::OutOfBounds => TrajectoryEnd::OutOfBounds,
            DropletState::Stalled => TrajectoryEnd::Stalled,
        };

        TrajectoryRecord {
            steps: droplet.steps(),
            max_speed: droplet.max_speed(),
            end,
        }
    }

    /// Run one batch concurrently. Droplet `i` of the batch uses the RNG
    /// stream `first_index + i`, so the outcome is independent of the thread
    /// count.
    fn run_batch_parallel(
        &self,
        heightmap: &mut Heightmap,
        gradient: &GradientField,
        first_index: u64,
        stats: &mut ErosionStats,
    ) {
        let params = &self.params;
        let rows = heightmap.rows;
        let cols = heightmap.cols;
        let snapshot: &Heightmap = heightmap;

        let results: Vec<(Vec<(usize, f64)>, TrajectoryRecord, MassTally)> = (0..params.batch_size)
            .into_par_iter()
            .map_init(
                || Droplet::at(0, 0, params),
                |droplet, i| {
                    let mut rng = self.seeds.droplet_rng_for(first_index + i as u64);
                    droplet.reset(rows, cols, params, &mut rng);

                    let mut overlay = DeltaOverlay::new(snapshot);
                    let mut mass = MassTally::default();
                    let record = self.trace(droplet, &mut overlay, gradient, &mut mass);
                    (overlay.into_changes(), record, mass)
                },
            )
            .collect();

        // Apply all deltas from this batch
        let cells = heightmap.as_mut_slice();
        for (changes, record, mass) in results {
            for (idx, delta) in changes {
                cells[idx] += delta;
            }
            stats.record_trajectory(&record, &mass);
        }
    }
}

/// A read-only heightmap plus one droplet's private writes.
struct DeltaOverlay<'a> {
    base: &'a Heightmap,
    deltas: HashMap<usize, f64>,
}

impl<'a> DeltaOverlay<'a> {
    fn new(base: &'a Heightmap) -> Self {
        Self {
            base,
            deltas: HashMap::new(),
        }
    }

    fn into_changes(self) -> Vec<(usize, f64)> {
        self.deltas.into_iter().collect()
    }
}

impl Terrain for DeltaOverlay<'_> {
    fn rows(&self) -> usize {
        self.base.rows
    }

    fn cols(&self) -> usize {
        self.base.cols
    }

    fn height(&self, row: usize, col: usize) -> f64 {
        let idx = row * self.base.cols + col;
        *self.base.get(row, col) + self.deltas.get(&idx).copied().unwrap_or(0.0)
    }

    fn add(&mut self, row: usize, col: usize, delta: f64) {
        debug_assert!(row < self.base.rows && col < self.base.cols);
        let idx = row * self.base.cols + col;
        *self.deltas.entry(idx).or_insert(0.0) += delta;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::{MemorySink, NullSink};
    use crate::heightmap::{generate_heightmap, TerrainParams};

    fn small_terrain() -> Heightmap {
        let params = TerrainParams { scale: 12.0, ..TerrainParams::default() };
        generate_heightmap(32, 32, &params, 74).unwrap()
    }

    fn small_params() -> ErosionParams {
        ErosionParams {
            cycles: 2,
            droplet_count: 200,
            batch_size: 20,
            ..ErosionParams::default()
        }
    }

    #[test]
    fn test_run_emits_one_snapshot_per_cycle() {
        let simulator = ErosionSimulator::new(small_params(), RunSeeds::from_master(1)).unwrap();
        let mut map = small_terrain();
        let initial = map.clone();
        let mut sink = MemorySink::default();

        let stats = simulator.run(&mut map, &mut sink).unwrap();

        assert_eq!(sink.snapshots.len(), 2);
        assert_eq!(sink.snapshots[0].0, 1);
        assert_eq!(sink.snapshots[1].0, 2);
        assert_eq!(sink.snapshots[1].1, map);
        assert_ne!(map, initial);
        assert_eq!(stats.droplets, 400);
        assert_eq!(stats.outcomes.total(), 400);
        assert_eq!(stats.cycles.len(), 2);
        assert_eq!(stats.cycles[0].droplets, 200);
        assert!(stats.mass.eroded > 0.0);
        assert!(stats.absolute_max_speed >= stats.mean_max_speed);
    }

    #[test]
    fn test_mass_balance_over_run() {
        let simulator = ErosionSimulator::new(small_params(), RunSeeds::from_master(2)).unwrap();
        let mut map = small_terrain();
        let before = map.total();

        let stats = simulator.run(&mut map, &mut NullSink).unwrap();

        // Every droplet ends empty-handed on the map or carries its load off it
        let expected = before - stats.mass.eroded + stats.mass.deposited;
        assert!((map.total() - expected).abs() < 1e-8);
        assert!((stats.mass.eroded - stats.mass.deposited - stats.mass.lost).abs() < 1e-8);
    }

    #[test]
    fn test_sequential_run_is_reproducible() {
        let simulator = ErosionSimulator::new(small_params(), RunSeeds::from_master(3)).unwrap();
        let mut a = small_terrain();
        let mut b = small_terrain();
        let stats_a = simulator.run(&mut a, &mut NullSink).unwrap();
        let stats_b = simulator.run(&mut b, &mut NullSink).unwrap();
        assert_eq!(a, b);
        assert_eq!(stats_a, stats_b);
    }

    #[test]
    fn test_parallel_run_is_reproducible_and_conserves_mass() {
        let params = ErosionParams {
            execution: ExecutionMode::ParallelBatches,
            ..small_params()
        };
        let simulator = ErosionSimulator::new(params, RunSeeds::from_master(4)).unwrap();
        let mut a = small_terrain();
        let mut b = small_terrain();
        let before = a.total();

        let stats_a = simulator.run(&mut a, &mut NullSink).unwrap();
        simulator.run(&mut b, &mut NullSink).unwrap();

        assert_eq!(a, b);
        assert_eq!(stats_a.droplets, 400);
        let expected = before - stats_a.mass.eroded + stats_a.mass.deposited;
        assert!((a.total() - expected).abs() < 1e-8);
    }

    #[test]
    fn test_flat_map_caps_every_droplet() {
        let params = ErosionParams {
            cycles: 1,
            droplet_count: 10,
            batch_size: 5,
            ..ErosionParams::default()
        };
        let simulator = ErosionSimulator::new(params, RunSeeds::from_master(5)).unwrap();
        let mut map = Heightmap::new_with(4, 4, 0.5);

        let stats = simulator.run(&mut map, &mut NullSink).unwrap();

        assert_eq!(stats.outcomes.step_cap, 10);
        assert_eq!(stats.mean_steps, 250.0);
        assert_eq!(stats.absolute_max_speed, 0.0);
        assert!(map.as_slice().iter().all(|&h| h == 0.5));
    }

    #[test]
    fn test_every_trajectory_respects_step_cap() {
        let params = ErosionParams { step_cap: 5, ..small_params() };
        let simulator = ErosionSimulator::new(params, RunSeeds::from_master(6)).unwrap();
        let mut map = small_terrain();
        let stats = simulator.run(&mut map, &mut NullSink).unwrap();
        assert!(stats.mean_steps <= 5.0);
        assert!(stats.steps_taken <= 5 * stats.droplets);
    }

    #[test]
    fn test_rejects_invalid_setup() {
        let params = ErosionParams {
            kernel: crate::erosion::KernelSpec::Custom { weights: vec![vec![1.0, 2.0]] },
            ..small_params()
        };
        assert!(ErosionSimulator::new(params, RunSeeds::from_master(0)).is_err());

        let simulator = ErosionSimulator::new(small_params(), RunSeeds::from_master(0)).unwrap();
        let mut tiny = Heightmap::new_with(1, 5, 0.0);
        assert!(matches!(
            simulator.run(&mut tiny, &mut NullSink),
            Err(SimulationError::Config(ConfigError::GridTooSmall { .. }))
        ));
    }

    #[test]
    fn test_overlay_reads_its_own_writes() {
        let base = Heightmap::new_with(3, 3, 1.0);
        let mut overlay = DeltaOverlay::new(&base);
        overlay.add(1, 2, 0.5);
        overlay.add(1, 2, -0.25);
        assert_eq!(overlay.height(1, 2), 1.25);
        assert_eq!(overlay.height(0, 0), 1.0);
        assert_eq!(overlay.into_changes(), vec![(5, 0.25)]);
        assert_eq!(*base.get(1, 2), 1.0);
    }
}
