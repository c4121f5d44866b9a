//! Profiling tool to identify performance bottlenecks

use std::time::Instant;

use droplet_erosion::{
    config::RunConfig,
    erosion::{ErosionParams, ErosionSimulator, ExecutionMode, GradientField, SimulationError},
    export::NullSink,
    heightmap,
};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), SimulationError> {
    let base = RunConfig {
        erosion: ErosionParams {
            cycles: 1,
            ..ErosionParams::default()
        },
        ..RunConfig::default()
    };
    let seeds = base.seeds();

    println!("=== Performance Profiling ===");
    println!("Map size: {}x{} ({} cells)", base.rows, base.cols, base.rows * base.cols);
    println!(
        "Droplets per cycle: {} in batches of {}",
        base.erosion.droplets_per_cycle(),
        base.erosion.batch_size
    );
    println!();

    // Profile heightmap generation
    let start = Instant::now();
    let terrain = heightmap::generate_heightmap(base.rows, base.cols, &base.terrain, seeds.noise_seed())?;
    let noise_time = start.elapsed();
    println!("Heightmap generation: {:?}", noise_time);

    // Profile gradient (recomputed once per batch during erosion)
    let start = Instant::now();
    let mut gradient = GradientField::compute(&terrain);
    for _ in 1..100 {
        gradient.recompute(&terrain);
    }
    let gradient_time = start.elapsed() / 100;
    println!("Gradient computation: {:?} per call", gradient_time);

    // Profile one erosion cycle in each mode
    let mut timings = Vec::new();
    for mode in [ExecutionMode::Sequential, ExecutionMode::ParallelBatches] {
        let mut config = base.clone();
        config.erosion.execution = mode;
        let simulator = ErosionSimulator::from_config(&config)?;

        let mut map = terrain.clone();
        let start = Instant::now();
        let stats = simulator.run(&mut map, &mut NullSink)?;
        let elapsed = start.elapsed();
        println!("Erosion cycle ({}): {:?}", mode, elapsed);
        println!("  Mean steps: {:.2}", stats.mean_steps);
        println!("  Eroded: {:.4} units", stats.mass.eroded);
        println!("  Deposited: {:.4} units", stats.mass.deposited);
        timings.push((mode, elapsed));
    }

    // Summary
    let sequential = timings[0].1;
    let total = noise_time + sequential;
    println!("\n=== Summary ===");
    println!("Heightmap:        {:>8.2}% ({:?})", 100.0 * noise_time.as_secs_f64() / total.as_secs_f64(), noise_time);
    println!("Erosion:          {:>8.2}% ({:?})", 100.0 * sequential.as_secs_f64() / total.as_secs_f64(), sequential);
    println!(
        "Gradient share:   {:>8.2}% of erosion ({} refreshes)",
        100.0 * (gradient_time * base.erosion.batches_per_cycle() as u32).as_secs_f64() / sequential.as_secs_f64(),
        base.erosion.batches_per_cycle()
    );
    if let Some((_, parallel)) = timings.get(1) {
        println!("Parallel speedup: {:>8.2}x", sequential.as_secs_f64() / parallel.as_secs_f64());
    }
    Ok(())
}
