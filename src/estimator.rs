//! Attack Success Rate estimation and the standard-error stopping rule

use serde::Serialize;

/// Running mean and variance of a sample (Welford's update)
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunningStats {
    count: usize,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Unbiased sample standard deviation (divisor `n - 1`); zero below two samples
    pub fn std_dev(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            (self.m2 / (self.count - 1) as f64).max(0.0).sqrt()
        }
    }

    /// Standard error of the mean, `σ / √n`
    pub fn std_error(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.std_dev() / (self.count as f64).sqrt()
        }
    }
}

/// When to stop drawing samples
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StoppingRule {
    /// Samples required before the standard error is consulted
    pub min_samples: usize,
    /// Stop once the standard error is at or below this value
    pub cutoff: f64,
    /// Hard cap on the number of samples
    pub cap: usize,
}

impl StoppingRule {
    /// Minimum number of attack trials before the inner loop may stop early
    pub const MIN_TRIALS: usize = 100;

    /// Minimum number of inner loops before the macro loop may stop early
    pub const MIN_MACRO_LOOPS: usize = 2;

    pub fn should_stop(&self, stats: &RunningStats) -> bool {
        stats.count() >= self.cap
            || (stats.count() >= self.min_samples && stats.std_error() <= self.cutoff)
    }
}

/// Summary of one configuration's ASR estimate
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct AsrEstimate {
    pub mean: f64,
    pub std_dev: f64,
    pub std_error: f64,
    /// Number of inner loops that contributed
    pub loops: usize,
    /// Number of counted attack trials over all loops
    pub trials: usize,
}

/// Collects one ASR (`successes / trials`) per inner loop
#[derive(Clone, Debug, Default)]
pub struct AsrEstimator {
    loops: RunningStats,
    trials: usize,
}

impl AsrEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of one inner loop; loops without trials are ignored
    pub fn record_loop(&mut self, successes: usize, trials: usize) {
        if trials == 0 {
            return;
        }
        self.loops.push(successes as f64 / trials as f64);
        self.trials += trials;
    }

    pub fn stats(&self) -> &RunningStats {
        &self.loops
    }

    pub fn estimate(&self) -> AsrEstimate {
        AsrEstimate {
            mean: self.loops.mean(),
            std_dev: self.loops.std_dev(),
            std_error: self.loops.std_error(),
            loops: self.loops.count(),
            trials: self.trials,
        }
    }
}
