//! ATSP Solver - Command Line Interface
//!
//! Solves asymmetric TSP instances with a MAX-MIN Ant System biased by the
//! composite minimum spanning arborescence.

use clap::{Parser, Subcommand};
use atsp_cmsa_mmas::arborescence::{Cmsa, CmsaStore, CmsaWeighting};
use atsp_cmsa_mmas::benchmark::{load_instances_from_dir, Benchmark, BenchmarkConfig};
use atsp_cmsa_mmas::error::Result;
use atsp_cmsa_mmas::heuristics::aco::{MaxMinAntSystem, MmasConfig};
use atsp_cmsa_mmas::instance::AtspInstance;

use statrs::statistics::Statistics;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser)]
#[command(name = "atsp-solver")]
#[command(author = "M2 AI2D Student")]
#[command(version = "1.0")]
#[command(about = "A CMSA-biased MAX-MIN Ant System for the Asymmetric TSP")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve a single instance
    Solve {
        #[arg(short, long)]
        instance: PathBuf,

        /// JSON file with solver settings
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of iterations
        #[arg(long)]
        iterations: Option<usize>,

        /// Number of ants
        #[arg(long)]
        ants: Option<usize>,

        /// Initial probability of a CMSA-biased step
        #[arg(long)]
        p_cmsa: Option<f64>,

        /// Random seed
        #[arg(short, long)]
        seed: Option<u64>,

        /// Directory caching the CMSA of this instance
        #[arg(long)]
        cmsa_dir: Option<PathBuf>,

        /// Target tour length (defaults to the known optimum)
        #[arg(long)]
        target: Option<f64>,

        /// Output solution to file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Build or refresh the CMSA cache of an instance
    Cmsa {
        #[arg(short, long)]
        instance: PathBuf,

        /// Cache directory
        #[arg(short, long)]
        dir: PathBuf,
    },

    /// Run benchmarks on a directory of instances
    Benchmark {
        /// Directory containing instance files
        #[arg(short, long)]
        dir: PathBuf,

        /// Output directory for results
        #[arg(short, long, default_value = "results")]
        output: PathBuf,

        /// Number of runs per instance and p_cmsa value
        #[arg(short, long, default_value = "5")]
        runs: usize,

        /// CMSA probabilities to compare
        #[arg(long, value_delimiter = ',', default_value = "0,0.25,0.5,0.75")]
        p_cmsa: Vec<f64>,

        /// Root directory of per-instance CMSA caches
        #[arg(long)]
        cmsa_dir: Option<PathBuf>,

        /// Maximum instance size
        #[arg(long)]
        max_size: Option<usize>,
    },

    /// Analyze an instance
    Analyze {
        /// Path to the instance file
        #[arg(short, long)]
        instance: PathBuf,
    },
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Solve { instance, config, iterations, ants, p_cmsa, seed, cmsa_dir, target, output, verbose } => {
            let overrides = Overrides { iterations, ants, p_cmsa, seed };
            solve_instance(&instance, config.as_deref(), overrides, cmsa_dir.as_deref(), target, output.as_deref(), verbose)
        }

        Commands::Cmsa { instance, dir } => build_cmsa(&instance, &dir),

        Commands::Benchmark { dir, output, runs, p_cmsa, cmsa_dir, max_size } => {
            run_benchmark(&dir, &output, runs, p_cmsa, cmsa_dir, max_size)
        }

        Commands::Analyze { instance } => analyze_instance(&instance),
    };

    if let Err(e) = outcome {
        log::error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Command-line values that take precedence over the config file.
struct Overrides {
    iterations: Option<usize>,
    ants: Option<usize>,
    p_cmsa: Option<f64>,
    seed: Option<u64>,
}

impl Overrides {
    fn apply(self, config: &mut MmasConfig) {
        if let Some(iterations) = self.iterations {
            config.iterations = iterations;
        }
        if let Some(ants) = self.ants {
            // Keep "every ant runs 3-opt" when that was the setting.
            config.local_search_ants = if config.local_search_ants >= config.ants {
                ants
            } else {
                config.local_search_ants.min(ants)
            };
            config.ants = ants;
        }
        if let Some(p_cmsa) = self.p_cmsa {
            config.p_cmsa = p_cmsa;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
    }
}

fn load_cmsa(instance: &AtspInstance, cmsa_dir: Option<&Path>) -> Result<Cmsa> {
    let start = Instant::now();
    let cmsa = match cmsa_dir {
        Some(dir) => CmsaStore::new(dir).load_or_build(&instance.distances, CmsaWeighting::Count)?,
        None => Cmsa::build(&instance.distances)?,
    };
    log::info!(
        "CMSA ready for {} in {:.3}s ({:.1}% of arcs used)",
        instance.name,
        start.elapsed().as_secs_f64(),
        cmsa.density() * 100.0
    );
    Ok(cmsa)
}

fn solve_instance(
    path: &Path,
    config_path: Option<&Path>,
    overrides: Overrides,
    cmsa_dir: Option<&Path>,
    target: Option<f64>,
    output: Option<&Path>,
    verbose: bool,
) -> Result<()> {
    println!("Loading instance from {:?}...", path);
    let instance = AtspInstance::from_file(path)?;
    log::info!("loaded {} ({} cities)", instance.name, instance.dimension);

    if verbose {
        println!("{}", instance.statistics());
    }

    let mut config = match config_path {
        Some(p) => serde_json::from_str(&std::fs::read_to_string(p)?)?,
        None => MmasConfig::for_dimension(instance.dimension),
    };
    overrides.apply(&mut config);

    let cmsa = load_cmsa(&instance, cmsa_dir)?;

    let solver = MaxMinAntSystem::new(&instance.distances, &cmsa, config)?
        .with_target(target.or(instance.known_optimum));
    let config = solver.config();
    println!(
        "Solving with MMAS ({} ants, {} with 3-opt, {} iterations, p_cmsa={})...",
        config.ants, config.local_search_ants, config.iterations, config.p_cmsa
    );
    let solution = solver.run();

    println!("\n========== Results ==========");
    print!("{}", solution);
    println!("CMSA commonality: {:.1}%", cmsa.commonality(&solution.tour));
    if solution.reached_target {
        println!("Target reached");
    }

    if let Some(out_path) = output {
        let json = serde_json::to_string_pretty(&solution)?;
        std::fs::write(out_path, json)?;
        println!("\nSolution saved to {:?}", out_path);
    }

    Ok(())
}

fn build_cmsa(path: &Path, dir: &Path) -> Result<()> {
    let instance = AtspInstance::from_file(path)?;
    let store = CmsaStore::new(dir);
    let cmsa = store.load_or_build(&instance.distances, CmsaWeighting::Count)?;
    println!(
        "CMSA for {} written to {:?} ({} arborescences, {:.1}% of arcs used)",
        instance.name,
        store.dir(),
        cmsa.arborescences().len(),
        cmsa.density() * 100.0
    );
    Ok(())
}

fn run_benchmark(
    dir: &Path,
    output: &Path,
    runs: usize,
    p_cmsa_values: Vec<f64>,
    cmsa_dir: Option<PathBuf>,
    max_size: Option<usize>,
) -> Result<()> {
    println!("Loading instances from {:?}...", dir);

    let mut instances = load_instances_from_dir(dir)?;

    if let Some(max) = max_size {
        instances.retain(|i| i.dimension <= max);
    }

    println!("Found {} instances", instances.len());

    std::fs::create_dir_all(output)?;

    let config = BenchmarkConfig {
        runs,
        p_cmsa_values,
        cmsa_dir,
        ..Default::default()
    };

    let mut benchmark = Benchmark::new(config);
    benchmark.run_on_instances(&instances)?;

    let results_path = output.join("results.csv");
    benchmark.export_to_csv(&results_path)?;
    println!("\nResults exported to {:?}", results_path);

    let stats_path = output.join("statistics.csv");
    benchmark.export_statistics_csv(&stats_path)?;
    println!("Statistics exported to {:?}", stats_path);

    let report = benchmark.generate_report();
    println!("\n{}", report);

    let report_path = output.join("report.txt");
    std::fs::write(&report_path, &report)?;
    println!("Report saved to {:?}", report_path);

    Ok(())
}

fn analyze_instance(path: &Path) -> Result<()> {
    let instance = AtspInstance::from_file(path)?;

    println!("========== Instance Analysis ==========\n");
    println!("{}", instance.statistics());

    let cmsa = Cmsa::build(&instance.distances)?;
    let weights: Vec<f64> = cmsa.arborescences().iter().map(|a| a.weight()).collect();
    let leaves: Vec<f64> = cmsa
        .arborescences()
        .iter()
        .map(|a| a.leaf_count(instance.dimension) as f64)
        .collect();

    println!("\nArborescences ({} roots):", weights.len());
    println!("  Weight min: {:.2}", weights.iter().cloned().fold(f64::INFINITY, f64::min));
    println!("  Weight max: {:.2}", weights.iter().cloned().fold(0.0, f64::max));
    println!("  Weight mean: {:.2}", weights.iter().mean());
    println!("  Leaves mean: {:.2}", leaves.iter().mean());
    println!("  CMSA density: {:.2}%", cmsa.density() * 100.0);

    if let Some(opt) = instance.known_optimum {
        // Dropping one edge of any tour leaves a spanning arborescence.
        let lower_bound = weights.iter().cloned().fold(0.0, f64::max);
        println!("\nKnown optimum: {:.0}", opt);
        println!("  Arborescence lower bound: {:.2} ({:.1}% of optimum)", lower_bound, 100.0 * lower_bound / opt);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ants_only(ants: usize) -> Overrides {
        Overrides {
            iterations: None,
            ants: Some(ants),
            p_cmsa: None,
            seed: None,
        }
    }

    #[test]
    fn test_more_ants_keep_full_local_search() {
        let mut config = MmasConfig::for_dimension(10);
        ants_only(25).apply(&mut config);
        assert_eq!(config.ants, 25);
        assert_eq!(config.local_search_ants, 25);
    }

    #[test]
    fn test_partial_local_search_is_preserved() {
        let mut config = MmasConfig {
            ants: 20,
            local_search_ants: 5,
            ..MmasConfig::default()
        };
        ants_only(40).apply(&mut config);
        assert_eq!(config.local_search_ants, 5);

        ants_only(3).apply(&mut config);
        assert_eq!(config.ants, 3);
        assert_eq!(config.local_search_ants, 3);
    }
}
