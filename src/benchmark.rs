//! Benchmarking and experimentation module for ATSP.
//!
//! Runs the CMSA-biased ant colony repeatedly on a set of instances while
//! sweeping the CMSA probability, collects one record per run and aggregates
//! them per (instance, p_cmsa).

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::arborescence::{Cmsa, CmsaStore, CmsaWeighting};
use crate::error::Result;
use crate::heuristics::aco::{MaxMinAntSystem, MmasConfig};
use crate::instance::AtspInstance;
use crate::solution::deviation;

/// Result of a single run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentResult {
    /// Instance name
    pub instance: String,
    /// Instance dimension
    pub dimension: usize,
    /// CMSA probability used
    pub p_cmsa: f64,
    /// Random seed
    pub seed: u64,
    /// Best tour length
    pub cost: f64,
    /// Iteration at which the best tour was found
    pub best_at_iteration: usize,
    /// Computation time in seconds
    pub time: f64,
    /// Gap to the known optimum in percent (if available)
    pub gap_to_optimal: Option<f64>,
    /// Whether the known optimum was matched
    pub reached_optimal: bool,
    /// Share of tour arcs found in some arborescence, in percent
    pub commonality: f64,
    /// Moves accepted by 3-opt
    pub three_opt_improvements: usize,
    /// Pheromone restarts
    pub restarts: usize,
}

/// Aggregated statistics for one (instance, p_cmsa) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentStatistics {
    pub instance: String,
    pub dimension: usize,
    pub p_cmsa: f64,
    /// Number of runs
    pub runs: usize,
    pub avg_cost: f64,
    pub best_cost: f64,
    pub worst_cost: f64,
    /// Standard deviation of cost
    pub std_cost: f64,
    /// Average gap to the known optimum
    pub avg_gap: Option<f64>,
    /// Fraction of runs that matched the known optimum
    pub success_rate: f64,
    pub avg_best_at_iteration: f64,
    pub avg_commonality: f64,
    pub avg_time: f64,
}

/// Benchmark configuration
#[derive(Debug, Clone)]
pub struct BenchmarkConfig {
    /// Number of runs per instance and p_cmsa value (seeds 0..runs)
    pub runs: usize,
    /// CMSA probabilities to sweep
    pub p_cmsa_values: Vec<f64>,
    /// Solver settings; `None` picks `MmasConfig::for_dimension`
    pub solver: Option<MmasConfig>,
    /// Root of the per-instance CMSA caches
    pub cmsa_dir: Option<PathBuf>,
    /// Show a progress bar
    pub show_progress: bool,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        BenchmarkConfig {
            runs: 5,
            p_cmsa_values: vec![0.0, 0.25, 0.5, 0.75],
            solver: None,
            cmsa_dir: None,
            show_progress: true,
        }
    }
}

/// Benchmarking engine
pub struct Benchmark {
    config: BenchmarkConfig,
    results: Vec<ExperimentResult>,
}

impl Benchmark {
    pub fn new(config: BenchmarkConfig) -> Self {
        Benchmark {
            config,
            results: Vec::new(),
        }
    }

    fn progress_bar(&self, len: u64, name: &str) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(len);
        let style = ProgressStyle::with_template("{msg:>12} [{bar:40}] {pos}/{len} ({elapsed})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        bar.set_style(style);
        bar.set_message(name.to_string());
        bar
    }

    fn cmsa_for(&self, instance: &AtspInstance) -> Result<Cmsa> {
        match &self.config.cmsa_dir {
            Some(root) => CmsaStore::new(root.join(&instance.name))
                .load_or_build(&instance.distances, CmsaWeighting::Count),
            None => Cmsa::build(&instance.distances),
        }
    }

    /// Run the full sweep on one instance
    pub fn run_instance(&mut self, instance: &AtspInstance) -> Result<()> {
        log::info!("Running benchmark on instance: {}", instance.name);
        let cmsa = self.cmsa_for(instance)?;
        let base = self
            .config
            .solver
            .clone()
            .unwrap_or_else(|| MmasConfig::for_dimension(instance.dimension));

        let total = (self.config.runs * self.config.p_cmsa_values.len()) as u64;
        let bar = self.progress_bar(total, &instance.name);

        for &p_cmsa in &self.config.p_cmsa_values {
            for seed in 0..self.config.runs as u64 {
                let config = MmasConfig {
                    p_cmsa,
                    seed,
                    ..base.clone()
                };
                let solution = MaxMinAntSystem::new(&instance.distances, &cmsa, config)?
                    .with_target(instance.known_optimum)
                    .run();

                self.results.push(ExperimentResult {
                    instance: instance.name.clone(),
                    dimension: instance.dimension,
                    p_cmsa,
                    seed,
                    cost: solution.cost,
                    best_at_iteration: solution.best_at_iteration,
                    time: solution.computation_time,
                    gap_to_optimal: instance.known_optimum.map(|opt| deviation(solution.cost, opt)),
                    reached_optimal: solution.reached_target,
                    commonality: cmsa.commonality(&solution.tour),
                    three_opt_improvements: solution.three_opt_improvements,
                    restarts: solution.restarts,
                });
                bar.inc(1);
            }
        }

        bar.finish_and_clear();
        Ok(())
    }

    /// Run benchmark on multiple instances
    pub fn run_on_instances(&mut self, instances: &[AtspInstance]) -> Result<()> {
        for instance in instances {
            self.run_instance(instance)?;
        }
        Ok(())
    }

    /// Compute statistics per (instance, p_cmsa), in instance order of first
    /// appearance and ascending p_cmsa
    pub fn compute_statistics(&self) -> Vec<ExperimentStatistics> {
        let mut groups: BTreeMap<(String, u64), Vec<&ExperimentResult>> = BTreeMap::new();
        for result in &self.results {
            groups
                .entry((result.instance.clone(), result.p_cmsa.to_bits()))
                .or_default()
                .push(result);
        }

        let mut statistics: Vec<ExperimentStatistics> = groups
            .into_values()
            .map(|runs| {
                let first = runs[0];
                let costs: Vec<f64> = runs.iter().map(|r| r.cost).collect();
                let gaps: Vec<f64> = runs.iter().filter_map(|r| r.gap_to_optimal).collect();
                let count = runs.len() as f64;

                ExperimentStatistics {
                    instance: first.instance.clone(),
                    dimension: first.dimension,
                    p_cmsa: first.p_cmsa,
                    runs: runs.len(),
                    avg_cost: costs.iter().mean(),
                    best_cost: costs.iter().cloned().fold(f64::INFINITY, f64::min),
                    worst_cost: costs.iter().cloned().fold(0.0, f64::max),
                    std_cost: if costs.len() > 1 { costs.iter().population_std_dev() } else { 0.0 },
                    avg_gap: (!gaps.is_empty()).then(|| gaps.iter().mean()),
                    success_rate: runs.iter().filter(|r| r.reached_optimal).count() as f64 / count,
                    avg_best_at_iteration: runs.iter().map(|r| r.best_at_iteration as f64).sum::<f64>() / count,
                    avg_commonality: runs.iter().map(|r| r.commonality).sum::<f64>() / count,
                    avg_time: runs.iter().map(|r| r.time).sum::<f64>() / count,
                }
            })
            .collect();

        let order: Vec<&str> = self.instance_order();
        statistics.sort_by(|a, b| {
            let pos = |name: &str| order.iter().position(|n| *n == name);
            pos(a.instance.as_str())
                .cmp(&pos(b.instance.as_str()))
                .then(a.p_cmsa.total_cmp(&b.p_cmsa))
        });
        statistics
    }

    fn instance_order(&self) -> Vec<&str> {
        let mut order: Vec<&str> = Vec::new();
        for result in &self.results {
            if !order.contains(&result.instance.as_str()) {
                order.push(&result.instance);
            }
        }
        order
    }

    /// Export results to CSV
    pub fn export_to_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = csv::Writer::from_writer(file);

        for result in &self.results {
            writer.serialize(result)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Export statistics to CSV
    pub fn export_statistics_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = csv::Writer::from_writer(file);

        for stat in self.compute_statistics() {
            writer.serialize(stat)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Generate summary report
    pub fn generate_report(&self) -> String {
        let mut report = String::new();

        report.push_str("========================================\n");
        report.push_str("     ATSP MMAS-CMSA Benchmark Report\n");
        report.push_str("========================================\n");
        report.push_str(&format!(
            "Generated: {}\n\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        ));

        report.push_str(&format!(
            "{:<12} {:>6} {:>7} {:>12} {:>12} {:>10} {:>9} {:>10}\n",
            "Instance", "N", "p_cmsa", "Avg Cost", "Best Cost", "Avg Gap%", "Success", "Avg Time"
        ));
        report.push_str("-".repeat(84).as_str());
        report.push('\n');

        for stat in self.compute_statistics() {
            let gap_str = stat
                .avg_gap
                .map(|g| format!("{:.2}%", g))
                .unwrap_or_else(|| "-".to_string());
            report.push_str(&format!(
                "{:<12} {:>6} {:>7.2} {:>12.2} {:>12.2} {:>10} {:>8.0}% {:>10.3}\n",
                stat.instance,
                stat.dimension,
                stat.p_cmsa,
                stat.avg_cost,
                stat.best_cost,
                gap_str,
                stat.success_rate * 100.0,
                stat.avg_time
            ));
        }

        report.push_str("-".repeat(84).as_str());
        report.push('\n');
        report
    }

    /// Get all results
    pub fn results(&self) -> &[ExperimentResult] {
        &self.results
    }
}

/// Helper function to load every `*.atsp` instance in a directory, sorted by
/// dimension. Files that fail to parse are skipped with a warning.
pub fn load_instances_from_dir<P: AsRef<Path>>(dir: P) -> Result<Vec<AtspInstance>> {
    let mut instances = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().map(|e| e == "atsp").unwrap_or(false) {
            match AtspInstance::from_file(&path) {
                Ok(instance) => instances.push(instance),
                Err(e) => log::warn!("skipping {}: {}", path.display(), e),
            }
        }
    }

    // Sort by dimension
    instances.sort_by(|a, b| a.dimension.cmp(&b.dimension).then_with(|| a.name.cmp(&b.name)));

    Ok(instances)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heuristics::aco::MmasConfig;
    use tempfile::tempdir;

    const SMALL: &str = "NAME: tiny6
TYPE: ATSP
DIMENSION: 6
EDGE_WEIGHT_TYPE: EXPLICIT
EDGE_WEIGHT_FORMAT: FULL_MATRIX
EDGE_WEIGHT_SECTION
0 1 9 9 9 9
9 0 1 9 9 9
9 9 0 1 9 9
9 9 9 0 1 9
9 9 9 9 0 1
1 9 9 9 9 0
EOF
";

    fn quick_config() -> BenchmarkConfig {
        BenchmarkConfig {
            runs: 2,
            p_cmsa_values: vec![0.0, 0.5],
            solver: Some(MmasConfig {
                ants: 4,
                local_search_ants: 4,
                iterations: 20,
                parallel: false,
                ..MmasConfig::default()
            }),
            cmsa_dir: None,
            show_progress: false,
        }
    }

    #[test]
    fn test_benchmark_config() {
        let config = BenchmarkConfig::default();
        assert_eq!(config.runs, 5);
        assert_eq!(config.p_cmsa_values.len(), 4);
    }

    #[test]
    fn test_sweep_records_every_run() {
        let mut instance: AtspInstance = SMALL.parse().unwrap();
        instance.known_optimum = Some(6.0);

        let mut bench = Benchmark::new(quick_config());
        bench.run_instance(&instance).unwrap();

        assert_eq!(bench.results().len(), 4);
        assert!(bench.results().iter().all(|r| r.cost >= 6.0));

        let stats = bench.compute_statistics();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].p_cmsa, 0.0);
        assert_eq!(stats[1].p_cmsa, 0.5);
        assert!(stats.iter().all(|s| s.runs == 2 && s.best_cost <= s.worst_cost));
        assert!(stats.iter().all(|s| s.avg_gap.is_some()));

        let report = bench.generate_report();
        assert!(report.contains("tiny6"));
    }

    #[test]
    fn test_exports_and_loading() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("tiny6.atsp"), SMALL).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        std::fs::write(dir.path().join("broken.atsp"), "DIMENSION: x\n").unwrap();

        let instances = load_instances_from_dir(dir.path()).unwrap();
        assert_eq!(instances.len(), 1);

        let mut config = quick_config();
        config.cmsa_dir = Some(dir.path().join("cache"));
        let mut bench = Benchmark::new(config);
        bench.run_on_instances(&instances).unwrap();
        assert!(dir.path().join("cache").join("tiny6").join("cmsa.csv").exists());

        let results = dir.path().join("results.csv");
        let stats = dir.path().join("statistics.csv");
        bench.export_to_csv(&results).unwrap();
        bench.export_statistics_csv(&stats).unwrap();

        let text = std::fs::read_to_string(&results).unwrap();
        assert!(text.starts_with("instance,dimension,p_cmsa"));
        assert_eq!(text.lines().count(), 5);
        assert_eq!(std::fs::read_to_string(&stats).unwrap().lines().count(), 3);
    }
}
