//! Experiment configuration

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::attack::AttackParams;
use crate::error::{PartencError, Result};
use crate::estimator::StoppingRule;
use crate::he::HeParams;
use crate::types::{Dataset, HeBackendKind, StrategyKind, Target};

/// Smallest accepted block size
pub const MIN_BLOCK_SIZE: usize = 1024;

/// Largest accepted block size
pub const MAX_BLOCK_SIZE: usize = 32768;

/// Arithmetic progression `start, start + step, ...` with `count` terms
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progression {
    pub start: usize,
    pub step: usize,
    pub count: usize,
}

impl Progression {
    pub fn values(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.count).map(move |i| self.start + i * self.step)
    }
}

/// Everything a sweep needs; missing JSON fields take their default
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExperimentConfig {
    pub dataset: Dataset,
    /// Directory with one CSV per household; the dataset's default when unset
    pub data_dir: Option<PathBuf>,
    pub strategy: StrategyKind,
    pub target: Target,
    pub unique_atd: bool,
    /// Block size `S`
    pub block_size: usize,
    /// Records kept per household (`Rmax`)
    pub max_records: usize,
    /// ATD sizes `A`
    pub atd_sizes: Progression,
    /// Minimum matched percentages `pct`
    pub min_percent_matched: Vec<f64>,
    /// Encryption ratios in percent; every ceil-step when unset
    pub ratios: Option<Vec<f64>>,
    /// Household subsample sizes `N`; the whole population when empty
    pub household_counts: Vec<usize>,
    /// Attack trials per inner loop, at most
    pub inner_cap: usize,
    /// Inner loops per configuration, at most
    pub macro_cap: usize,
    pub std_error_cutoff: f64,
    pub seed: u64,
    /// Draws before a unique-ATD trial is aborted
    pub atd_retry_limit: usize,
    pub he_backend: HeBackendKind,
    pub he_key_bits: u64,
    pub he_safe_prime: bool,
    /// Largest fresh slot value for the ElGamal backend, in milli-units
    pub he_max_plaintext: u64,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        ExperimentConfig {
            dataset: Dataset::Water,
            data_dir: None,
            strategy: StrategyKind::GlobalGreedy,
            target: Target::Entropy,
            unique_atd: false,
            block_size: 1024,
            max_records: 17_520,
            atd_sizes: Progression {
                start: 24,
                step: 24,
                count: 4,
            },
            min_percent_matched: vec![100.0],
            ratios: None,
            household_counts: Vec::new(),
            inner_cap: 1000,
            macro_cap: 10,
            std_error_cutoff: 0.01,
            seed: 0,
            atd_retry_limit: 1000,
            he_backend: HeBackendKind::None,
            he_key_bits: 512,
            he_safe_prime: false,
            he_max_plaintext: 100_000,
        }
    }
}

impl ExperimentConfig {
    /// Read a JSON configuration file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(self.dataset.default_path()))
    }

    pub fn validate(&self) -> Result<()> {
        if !self.block_size.is_power_of_two()
            || !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&self.block_size)
        {
            return Err(invalid(format!(
                "block size {} is not a power of two in [{}, {}]",
                self.block_size, MIN_BLOCK_SIZE, MAX_BLOCK_SIZE
            )));
        }
        if self.max_records == 0 {
            return Err(invalid("max_records must be positive".to_string()));
        }
        if self.atd_sizes.count == 0 {
            return Err(invalid("no ATD sizes configured".to_string()));
        }
        if let Some(a) = self
            .atd_sizes
            .values()
            .find(|a| *a == 0 || *a > self.max_records)
        {
            return Err(invalid(format!(
                "ATD size {} outside [1, {}]",
                a, self.max_records
            )));
        }
        if self.min_percent_matched.is_empty() {
            return Err(invalid("no match percentages configured".to_string()));
        }
        if let Some(pct) = self
            .min_percent_matched
            .iter()
            .find(|p| !(**p > 0.0 && **p <= 100.0))
        {
            return Err(invalid(format!("match percentage {} outside (0, 100]", pct)));
        }
        if let Some(ratio) = self
            .ratios
            .iter()
            .flatten()
            .find(|r| !(0.0..=100.0).contains(*r))
        {
            return Err(invalid(format!("encryption ratio {} outside [0, 100]", ratio)));
        }
        if self.household_counts.contains(&0) {
            return Err(invalid("household count must be positive".to_string()));
        }
        if self.inner_cap == 0 || self.macro_cap == 0 || self.atd_retry_limit == 0 {
            return Err(invalid("loop caps and retry limit must be positive".to_string()));
        }
        if !(self.std_error_cutoff > 0.0) {
            return Err(invalid(format!(
                "standard-error cutoff {} must be positive",
                self.std_error_cutoff
            )));
        }
        Ok(())
    }

    /// Attack parameters for one `(A, pct)` cell
    pub fn attack_params(&self, atd_size: usize, min_percent_matched: f64) -> AttackParams {
        AttackParams {
            atd_size,
            min_percent_matched,
            unique_atd: self.unique_atd,
            retry_limit: self.atd_retry_limit,
            trial_rule: StoppingRule {
                min_samples: StoppingRule::MIN_TRIALS,
                cutoff: self.std_error_cutoff,
                cap: self.inner_cap,
            },
            macro_rule: StoppingRule {
                min_samples: StoppingRule::MIN_MACRO_LOOPS,
                cutoff: self.std_error_cutoff,
                cap: self.macro_cap,
            },
        }
    }

    pub fn he_params(&self) -> HeParams {
        HeParams {
            slots: self.block_size,
            key_bits: self.he_key_bits,
            safe_prime: self.he_safe_prime,
            max_plaintext: self.he_max_plaintext,
            ..HeParams::default()
        }
    }
}

fn invalid(message: String) -> PartencError {
    PartencError::InvalidParameter(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ExperimentConfig::default();
        config.validate().unwrap();
        assert_eq!(config.atd_sizes.values().collect::<Vec<_>>(), vec![24, 48, 72, 96]);
        assert_eq!(config.data_dir(), PathBuf::from("data/water"));
    }

    #[test]
    fn test_rejects_bad_block_size() {
        for block_size in [0, 1000, 512, 65536] {
            let config = ExperimentConfig {
                block_size,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "{block_size}");
        }
        let config = ExperimentConfig {
            block_size: 32768,
            ..Default::default()
        };
        config.validate().unwrap();
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let too_long = ExperimentConfig {
            max_records: 50,
            ..Default::default()
        };
        assert!(too_long.validate().is_err());

        let bad_pct = ExperimentConfig {
            min_percent_matched: vec![100.0, 0.0],
            ..Default::default()
        };
        assert!(bad_pct.validate().is_err());

        let bad_ratio = ExperimentConfig {
            ratios: Some(vec![10.0, 120.0]),
            ..Default::default()
        };
        assert!(bad_ratio.validate().is_err());

        let bad_cutoff = ExperimentConfig {
            std_error_cutoff: 0.0,
            ..Default::default()
        };
        assert!(bad_cutoff.validate().is_err());

        let zero_cap = ExperimentConfig {
            inner_cap: 0,
            ..Default::default()
        };
        assert!(zero_cap.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{
            "dataset": "electricity",
            "strategy": "pairwise-uniqueness",
            "unique_atd": true,
            "ratios": [10, 50],
            "he_backend": "elgamal"
        }"#;
        let config: ExperimentConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.dataset, Dataset::Electricity);
        assert_eq!(config.strategy, StrategyKind::PairwiseUniqueness);
        assert!(config.unique_atd);
        assert_eq!(config.ratios, Some(vec![10.0, 50.0]));
        assert_eq!(config.he_backend, HeBackendKind::ElGamal);
        assert_eq!(config.block_size, 1024);
        assert_eq!(config.data_dir(), PathBuf::from("data/electricity"));
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let err = serde_json::from_str::<ExperimentConfig>(r#"{"blocksize": 2048}"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_attack_params() {
        let config = ExperimentConfig::default();
        let params = config.attack_params(48, 50.0);
        assert_eq!(params.required_matches(), 24);
        assert_eq!(params.trial_rule.min_samples, 100);
        assert_eq!(params.trial_rule.cap, 1000);
        assert_eq!(params.macro_rule.min_samples, 2);
        assert_eq!(params.macro_rule.cap, 10);
    }
}
