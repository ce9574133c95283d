//! Member-identification attack simulation
//!
//! The adversary holds an attacker data block (ATD): `A` contiguous records
//! of a victim's raw series, together with their position. It looks at the
//! same positions of every household's partially encrypted stream and
//! names the victim only when exactly one household matches.

use std::ops::Range;

use rand::{Rng, RngCore};
use tracing::{debug, warn};

use crate::error::{PartencError, Result};
use crate::estimator::{AsrEstimate, AsrEstimator, RunningStats, StoppingRule};
use crate::household::{EncryptionView, Household};
use crate::types::{Cell, Quantized};

/// Attack configuration for one sweep cell
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AttackParams {
    /// ATD length `A`
    pub atd_size: usize,
    /// Minimum percentage of the ATD that has to match (`pct`)
    pub min_percent_matched: f64,
    /// Only draw ATDs that occur in no other household's raw series
    pub unique_atd: bool,
    /// Draws allowed before a trial is aborted
    pub retry_limit: usize,
    /// Inner loop: attack trials
    pub trial_rule: StoppingRule,
    /// Macro loop: per-loop ASR estimates
    pub macro_rule: StoppingRule,
}

impl AttackParams {
    /// Number of positions that must match, `L = ⌈A · pct / 100⌉`
    pub fn required_matches(&self) -> usize {
        let l = (self.atd_size as f64 * self.min_percent_matched / 100.0).ceil() as usize;
        l.clamp(1, self.atd_size)
    }
}

/// Result of a single attack trial
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrialOutcome {
    /// The victim was the one and only matching household
    Success,
    /// No household, several households, or the wrong household matched
    Failure,
    /// No admissible ATD could be drawn; the trial is not counted
    Aborted,
}

/// Windows of the candidate slice that are compared against the ATD.
///
/// With a full match required there is one window. Otherwise, when the ATD
/// fits in a block the encrypted stretch of the slice can only be a prefix
/// or a suffix, so the leading and trailing `l` positions are tried; longer
/// ATDs try every aligned window of length `l`.
pub fn candidate_windows(atd_size: usize, block_size: usize, l: usize) -> Vec<Range<usize>> {
    if l >= atd_size {
        vec![0..atd_size]
    } else if atd_size <= block_size {
        vec![0..l, atd_size - l..atd_size]
    } else {
        (0..=atd_size - l).map(|j| j..j + l).collect()
    }
}

fn occurs_at<T, U>(haystack: &[T], needle: &[U], at: usize, eq: impl Fn(&T, &U) -> bool) -> bool {
    haystack[at..at + needle.len()]
        .iter()
        .zip(needle)
        .all(|(h, n)| eq(h, n))
}

/// Offsets at which `needle` occurs in `haystack`
fn occurrences<'h, T, U>(
    haystack: &'h [T],
    needle: &'h [U],
    eq: impl Fn(&T, &U) -> bool + Copy + 'h,
) -> impl Iterator<Item = usize> + 'h {
    let last = (haystack.len() + 1).saturating_sub(needle.len());
    (0..last).filter(move |&at| !needle.is_empty() && occurs_at(haystack, needle, at, eq))
}

const VACANT: usize = usize::MAX;

/// Free offsets of one household, with O(1) removal by value
#[derive(Clone, Debug)]
struct FreeOffsets {
    free: Vec<usize>,
    slot: Vec<usize>,
}

impl FreeOffsets {
    fn full(offsets: usize) -> Self {
        FreeOffsets {
            free: (0..offsets).collect(),
            slot: (0..offsets).collect(),
        }
    }

    fn remove(&mut self, offset: usize) -> bool {
        let i = self.slot[offset];
        if i == VACANT {
            return false;
        }
        self.free.swap_remove(i);
        if i < self.free.len() {
            self.slot[self.free[i]] = i;
        }
        self.slot[offset] = VACANT;
        true
    }
}

/// The `(household, offset)` pairs not drawn or retired in the current
/// inner loop. A household is only materialized once it is touched.
#[derive(Clone, Debug)]
struct OffsetPool {
    offsets: usize,
    households: Vec<Option<FreeOffsets>>,
    remaining: usize,
}

impl OffsetPool {
    fn new(households: usize, offsets: usize) -> Self {
        OffsetPool {
            offsets,
            households: vec![None; households],
            remaining: households * offsets,
        }
    }

    fn free_in(&self, household: usize) -> usize {
        self.households[household]
            .as_ref()
            .map_or(self.offsets, |h| h.free.len())
    }

    /// Remove one pair; false when it was already gone
    fn take(&mut self, household: usize, offset: usize) -> bool {
        let offsets = self.offsets;
        let removed = self.households[household]
            .get_or_insert_with(|| FreeOffsets::full(offsets))
            .remove(offset);
        if removed {
            self.remaining -= 1;
        }
        removed
    }

    /// Remove and return a pair chosen uniformly among the remaining ones
    fn draw(&mut self, rng: &mut dyn RngCore) -> Option<(usize, usize)> {
        if self.remaining == 0 {
            return None;
        }
        let mut r = rng.gen_range(0..self.remaining);
        for household in 0..self.households.len() {
            let free = self.free_in(household);
            if r < free {
                let offset = match &self.households[household] {
                    Some(h) => h.free[r],
                    None => r,
                };
                self.take(household, offset);
                return Some((household, offset));
            }
            r -= free;
        }
        None
    }
}

/// Simulates the partial-plaintext-matching adversary over one projection
pub struct AttackSimulator<'a> {
    raw: Vec<&'a [Quantized]>,
    encrypted: Vec<&'a [Cell]>,
    block_size: usize,
    params: AttackParams,
    pool: OffsetPool,
}

impl<'a> AttackSimulator<'a> {
    pub fn new(
        households: &'a [Household],
        views: &'a [EncryptionView],
        block_size: usize,
        params: AttackParams,
    ) -> Result<Self> {
        if households.is_empty() || households.len() != views.len() {
            return Err(PartencError::InvalidParameter(format!(
                "{} households but {} views",
                households.len(),
                views.len()
            )));
        }
        let len = households[0].len();
        if params.atd_size == 0 || params.atd_size > len {
            return Err(PartencError::InvalidParameter(format!(
                "ATD size {} outside [1, {}]",
                params.atd_size, len
            )));
        }
        if !(params.min_percent_matched > 0.0 && params.min_percent_matched <= 100.0) {
            return Err(PartencError::InvalidParameter(format!(
                "minimum match percentage {} outside (0, 100]",
                params.min_percent_matched
            )));
        }
        if params.retry_limit == 0 {
            return Err(PartencError::InvalidParameter(
                "ATD retry limit must be positive".to_string(),
            ));
        }

        Ok(AttackSimulator {
            raw: households.iter().map(|h| h.raw()).collect(),
            encrypted: views.iter().map(|v| v.encrypted_input.as_slice()).collect(),
            block_size,
            params,
            pool: OffsetPool::new(households.len(), len - params.atd_size + 1),
        })
    }

    /// Forget the offsets used so far; called at the start of every macro loop
    pub fn reset_offsets(&mut self) {
        self.pool = OffsetPool::new(self.raw.len(), self.pool.offsets);
    }

    /// `(household, offset)` pairs still available to this inner loop
    pub fn remaining_offsets(&self) -> usize {
        self.pool.remaining
    }

    /// The ATD of `victim` starting at `offset`
    pub fn atd(&self, victim: usize, offset: usize) -> &'a [Quantized] {
        &self.raw[victim][offset..offset + self.params.atd_size]
    }

    /// Draw a fresh `(victim, offset)` pair from the unused ones.
    ///
    /// In unique mode the ATD must not occur anywhere in another household's
    /// raw series; the offsets where it does occur are retired as well. Fails
    /// after `retry_limit` rejected draws, or as soon as the pool is empty.
    pub fn draw_atd(&mut self, rng: &mut dyn RngCore) -> Result<(usize, usize)> {
        let households = self.raw.len();

        for attempt in 0..self.params.retry_limit {
            let Some((victim, offset)) = self.pool.draw(rng) else {
                return Err(PartencError::AtdExhausted { retries: attempt });
            };
            if !self.params.unique_atd {
                return Ok((victim, offset));
            }

            let atd = self.atd(victim, offset);
            let mut unique = true;
            for other in (0..households).filter(|&h| h != victim) {
                let found: Vec<usize> =
                    occurrences(self.raw[other], atd, |a: &Quantized, b: &Quantized| a == b).collect();
                if !found.is_empty() {
                    unique = false;
                    for at in found {
                        self.pool.take(other, at);
                    }
                }
            }
            if unique {
                return Ok((victim, offset));
            }
        }

        Err(PartencError::AtdExhausted {
            retries: self.params.retry_limit,
        })
    }

    /// Whether a plaintext run occurs in no encrypted stream except `owner`'s
    fn globally_unique(&self, owner: usize, run: &[Quantized]) -> bool {
        self.encrypted
            .iter()
            .enumerate()
            .filter(|(h, _)| *h != owner)
            .all(|(_, stream)| {
                occurrences(*stream, run, |cell: &Cell, value: &Quantized| cell.matches(*value))
                    .next()
                    .is_none()
            })
    }

    /// Households whose candidate slice matches the ATD of `victim` at `offset`.
    ///
    /// Stops early once two households have matched.
    pub fn matching_households(&self, victim: usize, offset: usize) -> Vec<usize> {
        let atd = self.atd(victim, offset);
        let windows = candidate_windows(
            self.params.atd_size,
            self.block_size,
            self.params.required_matches(),
        );

        let mut matched = Vec::new();
        for (h, stream) in self.encrypted.iter().enumerate() {
            let candidate = &stream[offset..offset + self.params.atd_size];
            let hit = windows.iter().any(|w| {
                let expected = &atd[w.clone()];
                candidate[w.clone()]
                    .iter()
                    .zip(expected)
                    .all(|(cell, value)| cell.matches(*value))
                    && self.globally_unique(h, expected)
            });
            if hit {
                matched.push(h);
                if matched.len() > 1 {
                    break;
                }
            }
        }
        matched
    }

    /// The attacker succeeds iff the victim is the only matching household
    pub fn identify(&self, victim: usize, offset: usize) -> bool {
        self.matching_households(victim, offset) == [victim]
    }

    pub fn trial(&mut self, rng: &mut dyn RngCore) -> TrialOutcome {
        match self.draw_atd(rng) {
            Ok((victim, offset)) => {
                if self.identify(victim, offset) {
                    TrialOutcome::Success
                } else {
                    TrialOutcome::Failure
                }
            }
            Err(err) => {
                warn!(error = %err, "attack trial aborted");
                TrialOutcome::Aborted
            }
        }
    }

    /// Run trials on a fresh offset pool until the trial stopping rule fires.
    ///
    /// Returns `(successes, counted trials)`. An aborted trial is not
    /// counted; the loop only ends early once every offset has been used.
    pub fn inner_loop(&mut self, rng: &mut dyn RngCore) -> (usize, usize) {
        self.reset_offsets();
        let mut samples = RunningStats::new();
        let mut successes = 0;

        while !self.params.trial_rule.should_stop(&samples) {
            match self.trial(rng) {
                TrialOutcome::Success => {
                    successes += 1;
                    samples.push(1.0);
                }
                TrialOutcome::Failure => samples.push(0.0),
                TrialOutcome::Aborted if self.remaining_offsets() == 0 => break,
                TrialOutcome::Aborted => {}
            }
        }

        debug!(
            successes,
            trials = samples.count(),
            std_error = samples.std_error(),
            "inner loop finished"
        );
        (successes, samples.count())
    }

    /// Repeat inner loops until the per-loop ASRs have a small enough
    /// standard error or the macro-loop cap is reached.
    pub fn run(&mut self, rng: &mut dyn RngCore) -> AsrEstimate {
        let mut estimator = AsrEstimator::new();
        for _ in 0..self.params.macro_rule.cap {
            let (successes, trials) = self.inner_loop(rng);
            if trials == 0 {
                break;
            }
            estimator.record_loop(successes, trials);
            if self.params.macro_rule.should_stop(estimator.stats()) {
                break;
            }
        }
        estimator.estimate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use crate::blocks::BlockLayout;
    use crate::projector::{project_all, Marks};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn params(atd_size: usize, pct: f64, unique: bool) -> AttackParams {
        AttackParams {
            atd_size,
            min_percent_matched: pct,
            unique_atd: unique,
            retry_limit: 1000,
            trial_rule: StoppingRule {
                min_samples: StoppingRule::MIN_TRIALS,
                cutoff: 0.01,
                cap: 300,
            },
            macro_rule: StoppingRule {
                min_samples: StoppingRule::MIN_MACRO_LOOPS,
                cutoff: 0.01,
                cap: 3,
            },
        }
    }

    fn households(series: &[&[i64]]) -> Vec<Household> {
        series
            .iter()
            .enumerate()
            .map(|(i, s)| Household::new(format!("h{}", i), s.iter().map(|v| Quantized(*v)).collect()))
            .collect()
    }

    #[test]
    fn test_candidate_windows() {
        assert_eq!(candidate_windows(8, 8, 8), vec![0..8]);
        assert_eq!(candidate_windows(8, 8, 6), vec![0..6, 2..8]);
        assert_eq!(candidate_windows(8, 4, 6).len(), 3);
        assert_eq!(candidate_windows(8, 4, 8).len(), 1);
    }

    #[test]
    fn test_required_matches_rounds_up() {
        assert_eq!(params(10, 75.0, false).required_matches(), 8);
        assert_eq!(params(10, 100.0, false).required_matches(), 10);
        assert_eq!(params(3, 1.0, false).required_matches(), 1);
    }

    #[test]
    fn test_identification_requires_a_single_match() {
        let hs = households(&[&[1, 2, 3, 4], &[1, 2, 7, 8], &[5, 6, 3, 4]]);
        let layout = BlockLayout::new(4, 4).unwrap();
        let marks = vec![Marks::Blocks(vec![false]); 3];
        let views = project_all(&hs, &marks, &layout);
        let sim = AttackSimulator::new(&hs, &views, 4, params(2, 100.0, false)).unwrap();

        // [1,2] also appears in household 1, so neither slice is unique
        assert!(sim.matching_households(0, 0).is_empty());
        assert!(!sim.identify(0, 0));
        // [2,3] only occurs in household 0
        assert!(sim.identify(0, 1));
        // [3,4] is shared with household 2
        assert!(!sim.identify(0, 2));
    }

    #[test]
    fn test_victim_slice_must_be_globally_unique() {
        // [3,4] at offset 0 of household 0 also occurs at offset 2 of household 1
        let hs = households(&[&[3, 4, 9, 9], &[8, 8, 3, 4]]);
        let layout = BlockLayout::new(4, 4).unwrap();
        let marks = vec![Marks::Blocks(vec![false]); 2];
        let views = project_all(&hs, &marks, &layout);
        let sim = AttackSimulator::new(&hs, &views, 4, params(2, 100.0, false)).unwrap();

        assert!(!sim.identify(0, 0));
        assert!(sim.identify(0, 1));
    }

    #[test]
    fn test_partial_match_with_encrypted_suffix() {
        let hs = households(&[&[1, 2, 3, 4, 5, 6, 7, 8], &[9, 9, 9, 9, 9, 9, 9, 9]]);
        let layout = BlockLayout::new(8, 4).unwrap();
        let marks = vec![
            Marks::Records(vec![false, false, false, true, false, false, false, false]),
            Marks::Blocks(vec![false, false]),
        ];
        let views = project_all(&hs, &marks, &layout);

        let full = AttackSimulator::new(&hs, &views, 4, params(4, 100.0, false)).unwrap();
        assert!(!full.identify(0, 0));

        let partial = AttackSimulator::new(&hs, &views, 4, params(4, 75.0, false)).unwrap();
        assert!(partial.identify(0, 0));
    }

    #[test]
    fn test_unique_draw_retires_shared_offsets() {
        let hs = households(&[&[1, 1, 1, 1], &[1, 1, 1, 1]]);
        let layout = BlockLayout::new(4, 4).unwrap();
        let marks = vec![Marks::Blocks(vec![false]); 2];
        let views = project_all(&hs, &marks, &layout);
        let mut sim = AttackSimulator::new(&hs, &views, 4, params(2, 100.0, true)).unwrap();
        let mut rng = StdRng::seed_from_u64(5);

        assert!(matches!(
            sim.draw_atd(&mut rng),
            Err(PartencError::AtdExhausted { .. })
        ));
        assert_eq!(sim.trial(&mut rng), TrialOutcome::Aborted);
        assert_eq!(sim.inner_loop(&mut rng), (0, 0));
    }

    fn sparse_population(len: usize) -> Vec<Household> {
        let mut marked = vec![1; len];
        marked[len / 2..len / 2 + 3].copy_from_slice(&[7, 8, 9]);
        let flat = vec![1; len];
        households(&[&marked, &flat])
    }

    #[test]
    fn test_unique_draw_finds_sparse_unique_atds() {
        let hs = sparse_population(600);
        let layout = BlockLayout::new(600, 1024).unwrap();
        let marks = vec![Marks::Blocks(vec![false]); 2];
        let views = project_all(&hs, &marks, &layout);
        let mut unique = params(2, 100.0, true);
        unique.retry_limit = 50;

        for seed in 0..5 {
            let mut sim = AttackSimulator::new(&hs, &views, 1024, unique).unwrap();
            let mut rng = StdRng::seed_from_u64(seed);
            assert!(sim.identify(0, 300));

            // only the four ATDs touching 7, 8 or 9 are admissible
            assert_eq!(sim.inner_loop(&mut rng), (4, 4));
            assert_eq!(sim.remaining_offsets(), 0);

            let estimate = sim.run(&mut rng);
            assert_eq!(estimate.mean, 1.0);
            assert_eq!(estimate.loops, 2);
            assert_eq!(estimate.trials, 8);
        }
    }

    #[test]
    fn test_unique_draws_never_repeat() {
        let hs = sparse_population(200);
        let layout = BlockLayout::new(200, 1024).unwrap();
        let marks = vec![Marks::Blocks(vec![false]); 2];
        let views = project_all(&hs, &marks, &layout);
        let mut sim = AttackSimulator::new(&hs, &views, 1024, params(2, 100.0, true)).unwrap();
        let mut rng = StdRng::seed_from_u64(3);

        let mut drawn = HashSet::new();
        while let Ok((victim, offset)) = sim.draw_atd(&mut rng) {
            assert_eq!(victim, 0);
            assert!((99..=102).contains(&offset));
            assert!(drawn.insert(offset));
        }
        assert_eq!(drawn.len(), 4);
        assert_eq!(sim.remaining_offsets(), 0);
    }

    #[test]
    fn test_partial_match_slides_over_blocks() {
        let hs = households(&[&[1, 2, 3, 4, 5, 6, 7, 8], &[9, 9, 9, 9, 9, 9, 9, 9]]);
        let layout = BlockLayout::new(8, 2).unwrap();
        let leading = vec![
            Marks::Records(vec![true, false, false, false, false, false, false, false]),
            Marks::Records(vec![false; 8]),
        ];
        let middle = vec![
            Marks::Records(vec![false, true, false, false, false, false, false, false]),
            Marks::Records(vec![false; 8]),
        ];

        // A = 4 > S = 2 and L = 3: windows 0..3 and 1..4
        let views = project_all(&hs, &leading, &layout);
        let partial = AttackSimulator::new(&hs, &views, 2, params(4, 75.0, false)).unwrap();
        assert!(partial.identify(0, 0));
        let full = AttackSimulator::new(&hs, &views, 2, params(4, 100.0, false)).unwrap();
        assert!(!full.identify(0, 0));

        // an encrypted record inside both windows blocks every match
        let views = project_all(&hs, &middle, &layout);
        let partial = AttackSimulator::new(&hs, &views, 2, params(4, 75.0, false)).unwrap();
        assert!(partial.matching_households(0, 0).is_empty());
        assert!(partial.identify(0, 2));
    }

    #[test]
    fn test_non_unique_offsets_are_not_reused() {
        let hs = households(&[&[1, 2, 3], &[4, 5, 6]]);
        let layout = BlockLayout::new(3, 4).unwrap();
        let marks = vec![Marks::Blocks(vec![false]); 2];
        let views = project_all(&hs, &marks, &layout);
        let mut sim = AttackSimulator::new(&hs, &views, 4, params(2, 100.0, false)).unwrap();
        let mut rng = StdRng::seed_from_u64(11);

        let mut drawn = HashSet::new();
        for _ in 0..4 {
            assert!(drawn.insert(sim.draw_atd(&mut rng).unwrap()));
        }
        assert!(sim.draw_atd(&mut rng).is_err());
        sim.reset_offsets();
        assert!(sim.draw_atd(&mut rng).is_ok());
    }

    #[test]
    fn test_rejects_oversized_atd() {
        let hs = households(&[&[1, 2, 3]]);
        let layout = BlockLayout::new(3, 4).unwrap();
        let views = project_all(&hs, &[Marks::Blocks(vec![false])], &layout);
        assert!(AttackSimulator::new(&hs, &views, 4, params(4, 100.0, false)).is_err());
        assert!(AttackSimulator::new(&hs, &views, 4, params(2, 0.0, false)).is_err());
        let mut no_retries = params(2, 100.0, false);
        no_retries.retry_limit = 0;
        assert!(AttackSimulator::new(&hs, &views, 4, no_retries).is_err());
    }
}
