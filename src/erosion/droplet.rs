//! A single water droplet and its physics/erosion step.
//!
//! Each step the droplet:
//! 1. reads the slope at its cell and accelerates down it
//! 2. moves, then loses some speed to friction
//! 3. leaves the map if it crossed the last usable row/column
//! 4. compares the height of its new cell with the old one and either
//!    deposits sediment on the old cell or erodes around it, depending on
//!    how much it carries versus how much it could carry
//! 5. evaporates, dropping everything it carries once too small
//!
//! The droplet never owns the terrain. It reads and writes it only through
//! [`Terrain`] during a call to [`Droplet::step`].

use rand::Rng;

use crate::erosion::gradient::GradientField;
use crate::erosion::kernel::ErosionKernel;
use crate::erosion::params::ErosionParams;
use crate::erosion::Terrain;

/// Lifecycle of a droplet. Everything but `Active` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DropletState {
    Active,
    /// Volume fell to `min_volume`; remaining sediment was dropped in place
    Evaporated,
    /// Moved past the last usable row or column; sediment left the map
    OutOfBounds,
    /// Slow on flat ground (only with stall detection)
    Stalled,
}

impl DropletState {
    pub fn is_terminal(self) -> bool {
        self != DropletState::Active
    }
}

/// Mass moved by a single step.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StepEffect {
    /// Removed from the terrain and picked up
    pub eroded: f64,
    /// Dropped from the load onto the terrain
    pub deposited: f64,
    /// Carried off the map
    pub lost: f64,
    /// The step was requested on a terminal droplet and did nothing
    pub ignored: bool,
}

#[derive(Clone, Debug)]
pub struct Droplet {
    /// Continuous (row, col)
    position: (f64, f64),
    /// Integer cell at the last settle
    cell: (usize, usize),
    velocity: (f64, f64),
    sediment: f64,
    volume: f64,
    max_speed: f64,
    state: DropletState,
    steps: usize,
}

impl Droplet {
    /// A fresh droplet at a random cell of a `rows` x `cols` grid.
    pub fn spawn<R: Rng>(rows: usize, cols: usize, params: &ErosionParams, rng: &mut R) -> Self {
        let mut droplet = Self::at(0, 0, params);
        droplet.reset(rows, cols, params, rng);
        droplet
    }

    /// A fresh droplet at a given cell.
    pub fn at(row: usize, col: usize, params: &ErosionParams) -> Self {
        let mut droplet = Self {
            position: (0.0, 0.0),
            cell: (0, 0),
            velocity: (0.0, 0.0),
            sediment: 0.0,
            volume: 0.0,
            max_speed: 0.0,
            state: DropletState::Active,
            steps: 0,
        };
        droplet.place(row, col, params);
        droplet
    }

    /// Reseed at a uniformly random cell in `[0, rows-2] x [0, cols-2]`, so
    /// the droplet starts with a neighbour on each positive axis.
    ///
    /// An axis shorter than 2 has no such cell; the droplet is placed at 0 on
    /// that axis and leaves the map on its first step.
    pub fn reset<R: Rng>(&mut self, rows: usize, cols: usize, params: &ErosionParams, rng: &mut R) {
        let row = rng.gen_range(0..rows.saturating_sub(1).max(1));
        let col = rng.gen_range(0..cols.saturating_sub(1).max(1));
        self.place(row, col, params);
    }

    /// Reseed at a specific cell, discarding all previous state.
    pub fn place(&mut self, row: usize, col: usize, params: &ErosionParams) {
        self.position = (row as f64, col as f64);
        self.cell = (row, col);
        self.velocity = (0.0, 0.0);
        self.sediment = params.initial_sediment;
        self.volume = params.initial_volume;
        self.max_speed = 0.0;
        self.state = DropletState::Active;
        self.steps = 0;
    }

    /// Advance one timestep, eroding or depositing on `terrain`.
    pub fn step<T: Terrain + ?Sized>(
        &mut self,
        terrain: &mut T,
        gradient: &GradientField,
        kernel: &ErosionKernel,
        params: &ErosionParams,
    ) -> StepEffect {
        let mut effect = StepEffect::default();

        if self.state.is_terminal() {
            log::warn!("step ignored: droplet at {:?} is {:?}", self.cell, self.state);
            effect.ignored = true;
            return effect;
        }
        if self.volume <= params.min_volume {
            log::warn!("step ignored: droplet at {:?} has no volume left", self.cell);
            effect.ignored = true;
            return effect;
        }
        self.steps += 1;

        // No usable cell on a grid narrower than 2 in either direction
        if terrain.rows() < 2 || terrain.cols() < 2 {
            self.state = DropletState::OutOfBounds;
            effect.lost = self.sediment;
            return effect;
        }

        // Dynamics
        let dt = params.dt;
        let (slope_row, slope_col) = gradient.slope_at(self.cell.0, self.cell.1);
        self.velocity.0 -= dt * slope_row * params.gravity;
        self.velocity.1 -= dt * slope_col * params.gravity;
        self.position.0 += dt * self.velocity.0;
        self.position.1 += dt * self.velocity.1;
        let damping = 1.0 - dt * params.friction;
        self.velocity.0 *= damping;
        self.velocity.1 *= damping;

        // Usable positions are [0, rows-1) x [0, cols-1); NaN fails too
        let max_row = (terrain.rows() - 1) as f64;
        let max_col = (terrain.cols() - 1) as f64;
        let (row, col) = self.position;
        if !(row >= 0.0 && row < max_row && col >= 0.0 && col < max_col) {
            self.state = DropletState::OutOfBounds;
            effect.lost = self.sediment;
            return effect;
        }

        // Erosion / sedimentation
        let old = self.cell;
        let new = (row as usize, col as usize);
        let delta_height = terrain.height(new.0, new.1) - terrain.height(old.0, old.1);

        if delta_height != 0.0 {
            let speed = self.speed();
            if speed > self.max_speed {
                self.max_speed = speed;
            }
            let capacity = -delta_height * speed * self.volume * params.capacity_factor;

            if delta_height > 0.0 {
                // Uphill: drop sediment to fill the step
                let amount = self.sediment.min(delta_height) * params.deposition_rate;
                terrain.add(old.0, old.1, amount);
                self.sediment -= amount;
                effect.deposited += amount;
            } else if self.sediment > capacity {
                // Overloaded: drop the excess, at most the height difference
                let amount = (self.sediment - capacity).min(-delta_height) * params.deposition_rate;
                terrain.add(old.0, old.1, amount);
                self.sediment -= amount;
                effect.deposited += amount;
            } else {
                let amount = (capacity - self.sediment).min(-delta_height) * params.erosion_rate;
                let removed = -kernel.spread(terrain, old.0, old.1, -amount, params.kernel_footprint);
                self.sediment += removed;
                effect.eroded += removed;
            }
        }

        self.cell = new;

        // Evaporation
        self.volume *= params.evaporation_factor();
        if self.volume <= params.min_volume {
            effect.deposited += self.release_sediment(terrain);
            self.state = DropletState::Evaporated;
            return effect;
        }

        if params.stall_detection && self.is_still(gradient, params) {
            effect.deposited += self.release_sediment(terrain);
            self.state = DropletState::Stalled;
        }

        effect
    }

    /// Slow and on gentle ground.
    pub fn is_still(&self, gradient: &GradientField, params: &ErosionParams) -> bool {
        let (g_row, g_col) = gradient.slope_at(self.cell.0, self.cell.1);
        let slope = g_row.hypot(g_col);
        self.speed() < params.min_speed && slope < params.min_slope
    }

    /// Drop the whole load on the current cell. Returns the amount dropped.
    pub fn release_sediment<T: Terrain + ?Sized>(&mut self, terrain: &mut T) -> f64 {
        let amount = self.sediment;
        if amount != 0.0 {
            terrain.add(self.cell.0, self.cell.1, amount);
        }
        self.sediment = 0.0;
        amount
    }

    pub fn speed(&self) -> f64 {
        self.velocity.0.hypot(self.velocity.1)
    }

    pub fn position(&self) -> (f64, f64) {
        self.position
    }

    pub fn cell(&self) -> (usize, usize) {
        self.cell
    }

    pub fn velocity(&self) -> (f64, f64) {
        self.velocity
    }

    pub fn sediment(&self) -> f64 {
        self.sediment
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn max_speed(&self) -> f64 {
        self.max_speed
    }

    pub fn state(&self) -> DropletState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == DropletState::Active
    }

    /// Steps taken since the last reset.
    pub fn steps(&self) -> usize {
        self.steps
    }
}
