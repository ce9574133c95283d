use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{info, span, Level};
use tracing_subscriber::EnvFilter;

use partenc::{load_households, Dataset, ExperimentConfig, Harness, HeBackendKind, StrategyKind, Target};

/// Partial-encryption selection and member-identification attack sweep.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct CommandLineArgs {
    /// JSON configuration file; flags below override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Directory with one CSV file per household.
    #[arg(long)]
    data_dir: Option<PathBuf>,
    #[arg(long, value_enum)]
    strategy: Option<StrategyKind>,
    #[arg(long, value_enum)]
    dataset: Option<Dataset>,
    #[arg(long, value_enum)]
    target: Option<Target>,
    /// Only draw ATDs that occur in no other household.
    #[arg(long)]
    unique_atd: bool,
    /// Encryption ratio in percent; repeat for several.
    #[arg(long = "ratio")]
    ratios: Vec<f64>,
    #[arg(long)]
    seed: Option<u64>,
    /// Time summation and variance with this HE backend.
    #[arg(long, value_enum)]
    he_backend: Option<HeBackendKind>,
    /// Directory receiving attack.csv, he_timing.csv and diagnostics.csv.
    #[arg(short, long, default_value = "results")]
    output: PathBuf,
}

impl CommandLineArgs {
    fn into_config(self) -> anyhow::Result<(ExperimentConfig, PathBuf)> {
        let mut config = match &self.config {
            Some(path) => ExperimentConfig::from_json_file(path)
                .with_context(|| format!("reading configuration {}", path.display()))?,
            None => ExperimentConfig::default(),
        };

        if let Some(dataset) = self.dataset {
            config.dataset = dataset;
        }
        if let Some(dir) = self.data_dir {
            config.data_dir = Some(dir);
        }
        if let Some(strategy) = self.strategy {
            config.strategy = strategy;
        }
        if let Some(target) = self.target {
            config.target = target;
        }
        if self.unique_atd {
            config.unique_atd = true;
        }
        if !self.ratios.is_empty() {
            config.ratios = Some(self.ratios);
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(backend) = self.he_backend {
            config.he_backend = backend;
        }
        Ok((config, self.output))
    }
}

fn main() -> anyhow::Result<()> {
    let cli = CommandLineArgs::parse();
    let filter = EnvFilter::from_default_env().add_directive("partenc=info".parse()?);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .without_time()
        .compact()
        .init();
    let span = span!(Level::INFO, "main");
    let _enter = span.entered();

    let (config, output) = cli.into_config()?;
    let harness = Harness::new(config)?;
    let config = harness.config();

    let data_dir = config.data_dir();
    let households = load_households(&data_dir, config.max_records)
        .with_context(|| format!("loading households from {}", data_dir.display()))?;

    let report = harness.run(&households)?;
    report
        .write_csv(&output)
        .with_context(|| format!("writing results to {}", output.display()))?;

    info!(
        attacks = report.attacks.len(),
        he_timings = report.he_timings.len(),
        diagnostics = report.diagnostics.len(),
        output = %output.display(),
        "sweep finished"
    );
    Ok(())
}
