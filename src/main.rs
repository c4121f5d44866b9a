use std::fs;
use std::path::PathBuf;
use std::process;

use clap::Parser;

use droplet_erosion::config::RunConfig;
use droplet_erosion::erosion::{ErosionSimulator, ExecutionMode, SimulationError};
use droplet_erosion::export::{self, DirectorySink, ExportError};
use droplet_erosion::heightmap;

#[derive(Parser, Debug)]
#[command(name = "droplet_erosion")]
#[command(about = "Generate noise terrain and erode it with simulated water droplets")]
struct Args {
    /// JSON run configuration (missing fields take defaults)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory receiving terrain_<cycle>.txt and summary.json
    #[arg(short, long, default_value = "output")]
    output: PathBuf,

    /// Grid rows
    #[arg(long)]
    rows: Option<usize>,

    /// Grid columns
    #[arg(long)]
    cols: Option<usize>,

    /// Master seed
    #[arg(short, long)]
    seed: Option<u64>,

    /// Number of cycles (one snapshot each)
    #[arg(long)]
    cycles: Option<usize>,

    /// Droplets per cycle
    #[arg(short = 'n', long)]
    droplets: Option<usize>,

    /// Droplets per gradient refresh
    #[arg(long)]
    batch_size: Option<usize>,

    /// Maximum steps per droplet
    #[arg(long)]
    step_cap: Option<usize>,

    /// Run each batch on all cores against a frozen snapshot
    #[arg(long)]
    parallel: bool,

    /// End droplets that are slow on flat ground
    #[arg(long)]
    stall_detection: bool,

    /// Print the resolved configuration as JSON and exit
    #[arg(long)]
    print_config: bool,
}

impl Args {
    fn resolve_config(&self) -> Result<RunConfig, SimulationError> {
        let mut config = match &self.config {
            Some(path) => RunConfig::from_json_file(path)?,
            None => RunConfig::default(),
        };

        if let Some(rows) = self.rows {
            config.rows = rows;
        }
        if let Some(cols) = self.cols {
            config.cols = cols;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(cycles) = self.cycles {
            config.erosion.cycles = cycles;
        }
        if let Some(droplets) = self.droplets {
            config.erosion.droplet_count = droplets;
        }
        if let Some(batch_size) = self.batch_size {
            config.erosion.batch_size = batch_size;
        }
        if let Some(step_cap) = self.step_cap {
            config.erosion.step_cap = step_cap;
        }
        if self.parallel {
            config.erosion.execution = ExecutionMode::ParallelBatches;
        }
        if self.stall_detection {
            config.erosion.stall_detection = true;
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if let Err(e) = run(&args) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), SimulationError> {
    let config = args.resolve_config()?;
    if args.print_config {
        println!("{}", config.to_json_string()?);
        return Ok(());
    }

    let seeds = config.seeds();
    println!("Eroding terrain with seeds: {}", seeds);
    println!("Map size: {}x{}", config.rows, config.cols);

    fs::create_dir_all(&args.output).map_err(ExportError::from)?;

    println!("Generating heightmap...");
    let mut terrain = heightmap::generate_heightmap(
        config.rows,
        config.cols,
        &config.terrain,
        seeds.noise_seed(),
    )?;
    heightmap::log_height_histogram(&terrain, 10);

    let mut sink = DirectorySink::new(&args.output);
    sink.write_initial(&terrain)?;

    println!("Simulating erosion...");
    let simulator = ErosionSimulator::from_config(&config)?;
    let stats = simulator.run(&mut terrain, &mut sink)?;

    let summary_path = args.output.join("summary.json");
    export::write_summary(&stats, &summary_path)?;

    println!("Erosion complete:");
    println!("  Droplets: {}", stats.droplets);
    println!("  Mean steps: {:.2}", stats.mean_steps);
    println!("  Mean max speed: {:.4}", stats.mean_max_speed);
    println!("  Absolute max speed: {:.4}", stats.absolute_max_speed);
    println!("  Total eroded: {:.4} units", stats.mass.eroded);
    println!("  Total deposited: {:.4} units", stats.mass.deposited);
    println!("  Lost off map: {:.4} units", stats.mass.lost);
    println!("Wrote {} snapshots and {}", sink.written().len(), summary_path.display());
    Ok(())
}
