//! Global greedy selection: the best unmarked block across all households,
//! one household at most once per round

use rand::RngCore;

use super::{Budget, Candidate, Pick, SelectionStrategy};
use crate::projector::Marks;
use crate::types::StrategyKind;

/// Marks, one pick at a time, the highest-scored unmarked block among the
/// households not yet picked in the current round. A round ends once every
/// household with an unmarked block has been picked, so a step of `P` picks
/// marks one block per household. Ties go to the lowest household, then the
/// lowest block.
#[derive(Clone, Debug)]
pub struct GlobalGreedy {
    scores: Vec<Vec<f64>>,
    marked: Vec<Vec<bool>>,
    picked_this_round: Vec<bool>,
    count: usize,
}

impl GlobalGreedy {
    pub fn new(scores: Vec<Vec<f64>>) -> Self {
        let marked = scores.iter().map(|row| vec![false; row.len()]).collect();
        GlobalGreedy {
            picked_this_round: vec![false; scores.len()],
            scores,
            marked,
            count: 0,
        }
    }

    fn best_unmarked(&self) -> Option<(usize, usize, f64)> {
        let mut best: Option<(usize, usize, f64)> = None;
        for (h, row) in self.scores.iter().enumerate() {
            if self.picked_this_round[h] {
                continue;
            }
            if let Some(b) = super::argmax_unmarked(row, &self.marked[h]) {
                let score = row[b];
                match best {
                    Some((_, _, s)) if score <= s => {}
                    _ => best = Some((h, b, score)),
                }
            }
        }
        best
    }
}

impl SelectionStrategy for GlobalGreedy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::GlobalGreedy
    }

    fn score(&self, candidate: &Candidate) -> f64 {
        match candidate {
            Candidate::Block { household, block } => self.scores[*household][*block],
            Candidate::Edge(_) => 0.0,
        }
    }

    fn pick_next(&mut self, remaining: usize, _rng: &mut dyn RngCore) -> Option<Pick> {
        if remaining == 0 {
            return None;
        }
        let (household, block, score) = match self.best_unmarked() {
            Some(best) => best,
            None => {
                self.picked_this_round.fill(false);
                self.best_unmarked()?
            }
        };
        self.marked[household][block] = true;
        self.picked_this_round[household] = true;
        self.count += 1;
        Some(Pick {
            candidate: Candidate::Block { household, block },
            score,
            marked: 1,
        })
    }

    fn is_done(&self, budget: Budget) -> bool {
        self.count >= budget.0
    }

    fn marked(&self) -> usize {
        self.count
    }

    fn marks(&self) -> Vec<Marks> {
        self.marked.iter().cloned().map(Marks::Blocks).collect()
    }
}
