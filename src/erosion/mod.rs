//! Droplet-based hydraulic erosion.
//!
//! - **gradient**: finite-difference slope field, refreshed once per batch
//! - **kernel**: weighted footprint erosion is spread over
//! - **droplet**: the per-particle physics and erosion state machine
//! - **hydraulic**: the cycle/batch loop driving many droplets

pub mod droplet;
pub mod gradient;
pub mod hydraulic;
pub mod kernel;
pub mod params;

pub use droplet::{Droplet, DropletState, StepEffect};
pub use gradient::GradientField;
pub use hydraulic::{ErosionSimulator, SimulationError};
pub use kernel::{ErosionKernel, KernelFootprint, KernelSpec, MAX_KERNEL_RADIUS};
pub use params::{ErosionParams, ExecutionMode};

use serde::{Deserialize, Serialize};

use crate::heightmap::HeightSummary;
use crate::tilemap::Heightmap;

/// Read/write access a droplet needs to the terrain during one step.
pub trait Terrain {
    fn rows(&self) -> usize;
    fn cols(&self) -> usize;
    fn height(&self, row: usize, col: usize) -> f64;
    fn add(&mut self, row: usize, col: usize, delta: f64);

    /// Whether a signed coordinate falls inside the grid.
    #[inline]
    fn contains(&self, row: isize, col: isize) -> bool {
        row >= 0 && col >= 0 && (row as usize) < self.rows() && (col as usize) < self.cols()
    }
}

impl Terrain for Heightmap {
    #[inline]
    fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    fn height(&self, row: usize, col: usize) -> f64 {
        *self.get(row, col)
    }

    #[inline]
    fn add(&mut self, row: usize, col: usize, delta: f64) {
        *self.get_mut(row, col) += delta;
    }
}

// =============================================================================
// STATISTICS
// =============================================================================

/// How a trajectory ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrajectoryEnd {
    Evaporated,
    OutOfBounds,
    Stalled,
    /// Still active when the step cap was reached
    StepCap,
}

/// One droplet's lifetime, as reported to the statistics.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrajectoryRecord {
    pub steps: usize,
    pub max_speed: f64,
    pub end: TrajectoryEnd,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub evaporated: u64,
    pub out_of_bounds: u64,
    pub stalled: u64,
    pub step_cap: u64,
}

impl OutcomeCounts {
    pub fn record(&mut self, end: TrajectoryEnd) {
        match end {
            TrajectoryEnd::Evaporated => self.evaporated += 1,
            TrajectoryEnd::OutOfBounds => self.out_of_bounds += 1,
            TrajectoryEnd::Stalled => self.stalled += 1,
            TrajectoryEnd::StepCap => self.step_cap += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.evaporated + self.out_of_bounds + self.stalled + self.step_cap
    }
}

/// Mass moved by a set of droplets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MassTally {
    pub eroded: f64,
    pub deposited: f64,
    /// Sediment carried off the map
    pub lost: f64,
    /// Largest erosion by a single step
    pub max_erosion: f64,
    /// Largest deposition by a single step
    pub max_deposition: f64,
    /// Steps requested on droplets that were already terminal
    pub ignored_steps: u64,
}

impl MassTally {
    pub fn record_step(&mut self, effect: &StepEffect) {
        self.eroded += effect.eroded;
        self.deposited += effect.deposited;
        self.lost += effect.lost;
        self.max_erosion = self.max_erosion.max(effect.eroded);
        self.max_deposition = self.max_deposition.max(effect.deposited);
        if effect.ignored {
            self.ignored_steps += 1;
        }
    }

    pub fn merge(&mut self, other: &MassTally) {
        self.eroded += other.eroded;
        self.deposited += other.deposited;
        self.lost += other.lost;
        self.max_erosion = self.max_erosion.max(other.max_erosion);
        self.max_deposition = self.max_deposition.max(other.max_deposition);
        self.ignored_steps += other.ignored_steps;
    }
}

/// Statistics emitted at the end of each cycle.
///
/// `mean_steps`, `mean_max_speed` and `absolute_max_speed` cover every
/// droplet since the start of the run; the mass and outcome figures cover
/// this cycle only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle: usize,
    pub droplets: u64,
    pub mean_steps: f64,
    pub mean_max_speed: f64,
    pub absolute_max_speed: f64,
    pub outcomes: OutcomeCounts,
    pub mass: MassTally,
    pub heights: HeightSummary,
}

/// Statistics from an erosion run
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ErosionStats {
    /// Droplets simulated
    pub droplets: u64,
    /// Total droplet steps taken
    pub steps_taken: u64,
    pub mean_steps: f64,
    pub mean_max_speed: f64,
    pub absolute_max_speed: f64,
    pub outcomes: OutcomeCounts,
    pub mass: MassTally,
    pub cycles: Vec<CycleReport>,
    #[serde(skip)]
    speed_sum: f64,
    #[serde(skip)]
    cycle_outcomes: OutcomeCounts,
    #[serde(skip)]
    cycle_mass: MassTally,
}

impl ErosionStats {
    pub fn record_trajectory(&mut self, record: &TrajectoryRecord, mass: &MassTally) {
        self.droplets += 1;
        self.steps_taken += record.steps as u64;
        self.speed_sum += record.max_speed;
        self.absolute_max_speed = self.absolute_max_speed.max(record.max_speed);
        self.mean_steps = self.steps_taken as f64 / self.droplets as f64;
        self.mean_max_speed = self.speed_sum / self.droplets as f64;

        self.outcomes.record(record.end);
        self.cycle_outcomes.record(record.end);
        self.mass.merge(mass);
        self.cycle_mass.merge(mass);
    }

    /// Close the current cycle and append its report.
    pub fn finish_cycle(&mut self, cycle: usize, heightmap: &Heightmap) -> &CycleReport {
        let report = CycleReport {
            cycle,
            droplets: self.cycle_outcomes.total(),
            mean_steps: self.mean_steps,
            mean_max_speed: self.mean_max_speed,
            absolute_max_speed: self.absolute_max_speed,
            outcomes: std::mem::take(&mut self.cycle_outcomes),
            mass: std::mem::take(&mut self.cycle_mass),
            heights: HeightSummary::of(heightmap),
        };
        self.cycles.push(report);
        &self.cycles[self.cycles.len() - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(steps: usize, max_speed: f64, end: TrajectoryEnd) -> TrajectoryRecord {
        TrajectoryRecord { steps, max_speed, end }
    }

    #[test]
    fn test_running_means_span_cycles() {
        let mut stats = ErosionStats::default();
        let map = Heightmap::new_with(2, 2, 0.5);
        let mass = MassTally::default();

        stats.record_trajectory(&record(10, 1.0, TrajectoryEnd::OutOfBounds), &mass);
        stats.record_trajectory(&record(20, 3.0, TrajectoryEnd::Evaporated), &mass);
        let first = stats.finish_cycle(1, &map).clone();
        assert_eq!(first.droplets, 2);
        assert_eq!(first.mean_steps, 15.0);
        assert_eq!(first.mean_max_speed, 2.0);
        assert_eq!(first.absolute_max_speed, 3.0);

        stats.record_trajectory(&record(30, 2.0, TrajectoryEnd::StepCap), &mass);
        let second = stats.finish_cycle(2, &map).clone();
        assert_eq!(second.droplets, 1);
        assert_eq!(second.outcomes.step_cap, 1);
        assert_eq!(second.outcomes.out_of_bounds, 0);
        assert_eq!(second.mean_steps, 20.0);
        assert_eq!(second.absolute_max_speed, 3.0);
        assert_eq!(stats.outcomes.total(), 3);
        assert_eq!(stats.cycles.len(), 2);
    }

    #[test]
    fn test_mass_tally_tracks_extremes() {
        let mut tally = MassTally::default();
        tally.record_step(&StepEffect { eroded: 0.3, ..Default::default() });
        tally.record_step(&StepEffect { deposited: 0.1, ..Default::default() });
        tally.record_step(&StepEffect { eroded: 0.1, ignored: true, ..Default::default() });
        assert!((tally.eroded - 0.4).abs() < 1e-12);
        assert_eq!(tally.max_erosion, 0.3);
        assert_eq!(tally.max_deposition, 0.1);
        assert_eq!(tally.ignored_steps, 1);
    }

    #[test]
    fn test_heightmap_terrain_access() {
        let mut map = Heightmap::new_with(2, 3, 1.0);
        Terrain::add(&mut map, 1, 2, 0.5);
        assert_eq!(Terrain::height(&map, 1, 2), 1.5);
        assert_eq!((Terrain::rows(&map), Terrain::cols(&map)), (2, 3));
        assert!(map.contains(1, 2));
        assert!(!map.contains(-1, 0));
        assert!(!map.contains(2, 0));
        assert!(!map.contains(0, 3));
    }
}
