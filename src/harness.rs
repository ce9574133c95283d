//! Experiment sweep: subsample × budget × ATD size × match percentage
//!
//! Each cell runs the attack on the current projection and yields one
//! [`AttackRecord`]. Failures inside a cell become [`Diagnostic`] records
//! and the sweep moves on to the next cell.

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{seq::index, RngCore, SeedableRng};
use serde::Serialize;
use tracing::{info, warn};

use crate::analyst::{encrypt_dataset, summation, variance};
use crate::attack::AttackSimulator;
use crate::blocks::BlockLayout;
use crate::config::ExperimentConfig;
use crate::error::{HeError, Result};
use crate::he::{ClearBackend, ElGamalBackend, HeCollaborator, HeMetrics, HeParams};
use crate::household::{EncryptionView, Household};
use crate::loader::check_shape;
use crate::metrics::{BlockMetrics, ValueTables};
use crate::projector::project_all;
use crate::selection::{build_strategy, Budget, Selector};
use crate::types::{Dataset, HeBackendKind, StrategyKind, Target};

/// One row of the attack table
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AttackRecord {
    pub strategy: StrategyKind,
    pub dataset: Dataset,
    pub target: Target,
    pub unique_atd: bool,
    /// Requested encryption ratio in percent
    pub ratio: f64,
    /// Budget units requested (blocks, or records for pairwise)
    pub budget: usize,
    /// Records actually encrypted
    pub encrypted_records: usize,
    pub atd_size: usize,
    pub pct: f64,
    pub households: usize,
    pub mean: f64,
    pub std_error: f64,
    pub trials: usize,
    pub loops: usize,
}

/// One row of the HE timing table
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HeTimingRecord {
    pub backend: HeBackendKind,
    pub strategy: StrategyKind,
    pub ratio: f64,
    pub households: usize,
    pub encrypted_records: usize,
    pub encrypt_ms: f64,
    pub summation_ms: f64,
    /// Missing when the backend could not evaluate the variance
    pub variance_ms: Option<f64>,
    pub sum: f64,
    pub variance: Option<f64>,
}

/// A failed sweep cell
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Diagnostic {
    pub stage: &'static str,
    pub ratio: Option<f64>,
    pub atd_size: Option<usize>,
    pub households: usize,
    pub message: String,
}

/// Everything a sweep produced
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SweepReport {
    pub attacks: Vec<AttackRecord>,
    pub he_timings: Vec<HeTimingRecord>,
    pub diagnostics: Vec<Diagnostic>,
}

impl SweepReport {
    /// Write `attack.csv`, `he_timing.csv` and `diagnostics.csv` into `dir`
    pub fn write_csv(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        write_table(&dir.join("attack.csv"), &self.attacks)?;
        write_table(&dir.join("he_timing.csv"), &self.he_timings)?;
        write_table(&dir.join("diagnostics.csv"), &self.diagnostics)?;
        Ok(())
    }
}

fn write_table<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// A budget the sweep visits
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SweepPoint {
    pub ratio: f64,
    pub budget: Budget,
}

/// Budgets to visit, in ascending order.
///
/// Without configured ratios every ceil-step `0..=B` is visited; block
/// strategies then take exactly `step` blocks per household.
pub fn sweep_points(
    config: &ExperimentConfig,
    layout: &BlockLayout,
    households: usize,
) -> Result<Vec<SweepPoint>> {
    let kind = config.strategy;
    let mut points = match &config.ratios {
        Some(ratios) => ratios
            .iter()
            .map(|&ratio| {
                Ok(SweepPoint {
                    ratio,
                    budget: Budget::from_ratio(kind, ratio, layout, households)?,
                })
            })
            .collect::<Result<Vec<_>>>()?,
        None => {
            let blocks = layout.block_count();
            (0..=blocks)
                .map(|step| {
                    let ratio = step as f64 * 100.0 / blocks as f64;
                    let budget = if kind.is_block_level() {
                        Budget::for_step(step, layout, households)
                    } else {
                        Budget::from_ratio(kind, ratio, layout, households)?
                    };
                    Ok(SweepPoint { ratio, budget })
                })
                .collect::<Result<Vec<_>>>()?
        }
    };
    points.sort_by(|a, b| a.budget.cmp(&b.budget).then(a.ratio.total_cmp(&b.ratio)));
    Ok(points)
}

/// Uniform subset of `n` households, kept in population order
pub fn subsample(households: &[Household], n: usize, rng: &mut dyn RngCore) -> Vec<Household> {
    if n >= households.len() {
        return households.to_vec();
    }
    let mut picked = index::sample(rng, households.len(), n).into_vec();
    picked.sort_unstable();
    picked.into_iter().map(|i| households[i].clone()).collect()
}

enum Collaborator {
    Clear(ClearBackend),
    ElGamal(ElGamalBackend),
}

impl Collaborator {
    /// Key setup for the configured backend; `None` when HE timing is off
    fn setup(
        kind: HeBackendKind,
        params: &HeParams,
        rng: &mut dyn RngCore,
    ) -> Option<std::result::Result<Self, HeError>> {
        match kind {
            HeBackendKind::None => None,
            HeBackendKind::Clear => Some(ClearBackend::key_setup(params, rng).map(Collaborator::Clear)),
            HeBackendKind::ElGamal => Some(ElGamalBackend::key_setup(params, rng).map(Collaborator::ElGamal)),
        }
    }
}

/// Outcome of timing the analyst pipeline at one budget
#[derive(Clone, Debug, PartialEq)]
pub struct AnalystTiming {
    pub encrypted_records: usize,
    pub encrypt: Duration,
    pub summation: Duration,
    pub sum: f64,
    /// Variance stage duration and value, or the collaborator's error
    pub variance: std::result::Result<(Duration, f64), HeError>,
    pub metrics: HeMetrics,
}

/// Run encrypt → summation → variance and time each stage
pub fn time_analyst<H: HeCollaborator>(
    he: &H,
    views: &[EncryptionView],
    rng: &mut dyn RngCore,
) -> std::result::Result<AnalystTiming, HeError> {
    let mut metrics = HeMetrics::new();

    let start = Instant::now();
    let enc = encrypt_dataset(he, views, rng, &mut metrics)?;
    let encrypt = start.elapsed();

    let start = Instant::now();
    let sum_out = summation(he, &enc, &mut metrics)?;
    let sum = sum_out.total(he, &mut metrics)?;
    let summation_time = start.elapsed();

    let start = Instant::now();
    let var_stage = variance(he, &enc, &sum_out, rng, &mut metrics)
        .and_then(|var| var.value(he, &mut metrics))
        .map(|value| (start.elapsed(), value));

    Ok(AnalystTiming {
        encrypted_records: enc.encrypted_records,
        encrypt,
        summation: summation_time,
        sum,
        variance: var_stage,
        metrics,
    })
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Runs the configured sweep over a loaded population
pub struct Harness {
    config: ExperimentConfig,
}

impl Harness {
    pub fn new(config: ExperimentConfig) -> Result<Self> {
        config.validate()?;
        Ok(Harness { config })
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// Run every cell of the sweep; only a malformed population is fatal.
    pub fn run(&self, households: &[Household]) -> Result<SweepReport> {
        check_shape(households)?;
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut report = SweepReport::default();

        let counts = if self.config.household_counts.is_empty() {
            vec![households.len()]
        } else {
            self.config.household_counts.clone()
        };

        for n in counts {
            if n > households.len() {
                let message = format!("subsample of {} exceeds population of {}", n, households.len());
                warn!(%message, "skipping household count");
                report.diagnostics.push(Diagnostic {
                    stage: "subsample",
                    ratio: None,
                    atd_size: None,
                    households: n,
                    message,
                });
                continue;
            }
            let subset = subsample(households, n, &mut rng);
            self.run_subset(&subset, &mut rng, &mut report)?;
        }

        Ok(report)
    }

    fn run_subset(&self, households: &[Household], rng: &mut StdRng, report: &mut SweepReport) -> Result<()> {
        let config = &self.config;
        let n = households.len();
        let layout = BlockLayout::new(households[0].len(), config.block_size)?;
        let tables = ValueTables::build(households);
        let metrics = BlockMetrics::compute(households, &tables, &layout, config.dataset, config.target);
        let points = sweep_points(config, &layout, n)?;

        info!(
            households = n,
            records = layout.len(),
            blocks = layout.block_count(),
            strategy = %config.strategy,
            "starting sweep"
        );

        let collaborator = match Collaborator::setup(config.he_backend, &config.he_params(), rng) {
            Some(Ok(he)) => Some(he),
            Some(Err(err)) => {
                self.diagnose(report, "he-key-setup", None, None, n, err.to_string());
                None
            }
            None => None,
        };

        let mut selector = Selector::new(build_strategy(config.strategy, households, &metrics, &layout));
        for point in points {
            if !selector.can_reach(point.budget) {
                selector = Selector::new(build_strategy(config.strategy, households, &metrics, &layout));
            }
            selector.advance(point.budget, rng)?;
            let views = project_all(households, &selector.marks(), &layout);
            let encrypted_records: usize = views.iter().map(|v| v.encrypted_count()).sum();

            for atd_size in config.atd_sizes.values() {
                for &pct in &config.min_percent_matched {
                    let params = config.attack_params(atd_size, pct);
                    let mut simulator = match AttackSimulator::new(households, &views, layout.block_size(), params) {
                        Ok(simulator) => simulator,
                        Err(err) => {
                            self.diagnose(report, "attack", Some(point.ratio), Some(atd_size), n, err.to_string());
                            continue;
                        }
                    };
                    let estimate = simulator.run(rng);
                    if estimate.trials == 0 {
                        let message = format!(
                            "no admissible ATD of size {} in {} households; the ASR is undefined",
                            atd_size, n
                        );
                        self.diagnose(report, "attack", Some(point.ratio), Some(atd_size), n, message);
                        continue;
                    }
                    info!(
                        ratio = point.ratio,
                        budget = point.budget.0,
                        atd_size,
                        pct,
                        households = n,
                        asr = estimate.mean,
                        std_error = estimate.std_error,
                        trials = estimate.trials,
                        "attack cell finished"
                    );
                    report.attacks.push(AttackRecord {
                        strategy: config.strategy,
                        dataset: config.dataset,
                        target: config.target,
                        unique_atd: config.unique_atd,
                        ratio: point.ratio,
                        budget: point.budget.0,
                        encrypted_records,
                        atd_size,
                        pct,
                        households: n,
                        mean: estimate.mean,
                        std_error: estimate.std_error,
                        trials: estimate.trials,
                        loops: estimate.loops,
                    });
                }
            }

            if let Some(he) = &collaborator {
                let timing = match he {
                    Collaborator::Clear(he) => time_analyst(he, &views, rng),
                    Collaborator::ElGamal(he) => time_analyst(he, &views, rng),
                };
                match timing {
                    Ok(timing) => {
                        if let Err(err) = &timing.variance {
                            self.diagnose(report, "he-variance", Some(point.ratio), None, n, err.to_string());
                        }
                        report.he_timings.push(HeTimingRecord {
                            backend: config.he_backend,
                            strategy: config.strategy,
                            ratio: point.ratio,
                            households: n,
                            encrypted_records: timing.encrypted_records,
                            encrypt_ms: millis(timing.encrypt),
                            summation_ms: millis(timing.summation),
                            variance_ms: timing.variance.as_ref().ok().map(|(d, _)| millis(*d)),
                            sum: timing.sum,
                            variance: timing.variance.as_ref().ok().map(|(_, v)| *v),
                        });
                    }
                    Err(err) => {
                        self.diagnose(report, "he-summation", Some(point.ratio), None, n, err.to_string());
                    }
                }
            }
        }

        Ok(())
    }

    fn diagnose(
        &self,
        report: &mut SweepReport,
        stage: &'static str,
        ratio: Option<f64>,
        atd_size: Option<usize>,
        households: usize,
        message: String,
    ) {
        warn!(stage, ?ratio, ?atd_size, households, %message, "sweep cell failed");
        report.diagnostics.push(Diagnostic {
            stage,
            ratio,
            atd_size,
            households,
            message,
        });
    }
}
