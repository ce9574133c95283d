//! Per-block privacy metrics: Shannon entropy and transition count

use std::collections::HashMap;

use crate::blocks::BlockLayout;
use crate::household::Household;
use crate::types::{Dataset, Quantized, Target};

/// Global value tables built once per run and read-only afterwards.
#[derive(Clone, Debug, Default)]
pub struct ValueTables {
    /// Occurrences of each quantized value across all households
    pub frequency: HashMap<Quantized, u64>,
    /// Per-occurrence Shannon term `-p·log₂p / count` of each value
    pub entropy: HashMap<Quantized, f64>,
    /// Total number of records `N_total`
    pub total: u64,
}

impl ValueTables {
    pub fn build(households: &[Household]) -> Self {
        let mut frequency: HashMap<Quantized, u64> = HashMap::new();
        let mut total = 0u64;
        for household in households {
            for value in household.raw() {
                *frequency.entry(*value).or_insert(0) += 1;
                total += 1;
            }
        }

        let entropy = frequency
            .iter()
            .map(|(value, &count)| {
                let p = count as f64 / total as f64;
                (*value, -p * p.log2() / count as f64)
            })
            .collect();

        ValueTables {
            frequency,
            entropy,
            total,
        }
    }

    /// Per-occurrence entropy contribution of `value`
    pub fn value_entropy(&self, value: Quantized) -> f64 {
        self.entropy.get(&value).copied().unwrap_or(0.0)
    }
}

/// Metrics of one household's blocks
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HouseholdMetrics {
    pub entropy: Vec<f64>,
    pub transition: Vec<u64>,
    pub entropy_sum: f64,
    pub transition_sum: u64,
}

impl HouseholdMetrics {
    /// Score of block `b` under `target`
    pub fn score(&self, target: Target, block: usize) -> f64 {
        match target {
            Target::Entropy => self.entropy[block],
            Target::Transition => self.transition[block] as f64,
        }
    }
}

/// Output of the metric engine for a whole population
#[derive(Clone, Debug)]
pub struct BlockMetrics {
    pub households: Vec<HouseholdMetrics>,
    pub entropy_sum: f64,
    pub transition_sum: u64,
    pub target: Target,
    /// Smallest observed block score under `target`
    pub target_min: f64,
    /// Largest observed block score under `target`
    pub target_max: f64,
}

impl BlockMetrics {
    /// Compute entropy and transition count of every block.
    ///
    /// `transition[b]` counts the records `i > 0` in block `b` whose
    /// difference from record `i - 1` exceeds the dataset threshold; the
    /// previous record may sit in the preceding block.
    pub fn compute(
        households: &[Household],
        tables: &ValueTables,
        layout: &BlockLayout,
        dataset: Dataset,
        target: Target,
    ) -> Self {
        let threshold = dataset.transition_threshold().milli() as u64;
        let blocks = layout.block_count();

        let per_household: Vec<HouseholdMetrics> = households
            .iter()
            .map(|household| {
                let raw = household.raw();
                let mut metrics = HouseholdMetrics {
                    entropy: vec![0.0; blocks],
                    transition: vec![0; blocks],
                    ..Default::default()
                };
                for b in 0..blocks {
                    for i in layout.range(b) {
                        metrics.entropy[b] += tables.value_entropy(raw[i]);
                        if i > 0 && raw[i].abs_diff(raw[i - 1]) > threshold {
                            metrics.transition[b] += 1;
                        }
                    }
                    metrics.entropy_sum += metrics.entropy[b];
                    metrics.transition_sum += metrics.transition[b];
                }
                metrics
            })
            .collect();

        let entropy_sum = per_household.iter().map(|m| m.entropy_sum).sum();
        let transition_sum = per_household.iter().map(|m| m.transition_sum).sum();

        let mut target_min = f64::INFINITY;
        let mut target_max = f64::NEG_INFINITY;
        for metrics in &per_household {
            for b in 0..blocks {
                let score = metrics.score(target, b);
                target_min = target_min.min(score);
                target_max = target_max.max(score);
            }
        }

        BlockMetrics {
            households: per_household,
            entropy_sum,
            transition_sum,
            target,
            target_min,
            target_max,
        }
    }

    /// Target-metric scores as a `P × B` grid
    pub fn score_grid(&self) -> Vec<Vec<f64>> {
        self.households
            .iter()
            .map(|m| {
                (0..m.entropy.len())
                    .map(|b| m.score(self.target, b))
                    .collect()
            })
            .collect()
    }
}
