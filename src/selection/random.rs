//! Uniformly random block selection

use rand::{Rng, RngCore};

use super::{Budget, Candidate, Pick, SelectionStrategy};
use crate::projector::Marks;
use crate::types::StrategyKind;

/// Keeps, per household, a permutation of block indices whose tail holds the
/// marked blocks. Each pick swaps a uniformly chosen unmarked position to the
/// front of the tail.
#[derive(Clone, Debug)]
pub struct RandomSelection {
    flags: Vec<Vec<usize>>,
    marked_per_household: Vec<usize>,
    next_household: usize,
    count: usize,
}

impl RandomSelection {
    pub fn new(households: usize, blocks: usize) -> Self {
        RandomSelection {
            flags: (0..households).map(|_| (0..blocks).collect()).collect(),
            marked_per_household: vec![0; households],
            next_household: 0,
            count: 0,
        }
    }

    /// Marked block indices of `household`, most recent first
    pub fn marked_blocks(&self, household: usize) -> &[usize] {
        let flag = &self.flags[household];
        &flag[flag.len() - self.marked_per_household[household]..]
    }
}

impl SelectionStrategy for RandomSelection {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Random
    }

    /// All blocks are equally likely.
    fn score(&self, _candidate: &Candidate) -> f64 {
        0.0
    }

    fn pick_next(&mut self, remaining: usize, rng: &mut dyn RngCore) -> Option<Pick> {
        if remaining == 0 || self.flags.is_empty() {
            return None;
        }
        let households = self.flags.len();
        for offset in 0..households {
            let household = (self.next_household + offset) % households;
            let blocks = self.flags[household].len();
            let unmarked = blocks - self.marked_per_household[household];
            if unmarked == 0 {
                continue;
            }

            let position = rng.gen_range(0..unmarked);
            self.flags[household].swap(position, unmarked - 1);
            self.marked_per_household[household] += 1;
            self.count += 1;
            self.next_household = (household + 1) % households;

            return Some(Pick {
                candidate: Candidate::Block {
                    household,
                    block: self.flags[household][unmarked - 1],
                },
                score: 0.0,
                marked: 1,
            });
        }
        None
    }

    fn is_done(&self, budget: Budget) -> bool {
        self.count >= budget.0
    }

    fn marked(&self) -> usize {
        self.count
    }

    fn marks(&self) -> Vec<Marks> {
        (0..self.flags.len())
            .map(|h| {
                let mut flags = vec![false; self.flags[h].len()];
                for &b in self.marked_blocks(h) {
                    flags[b] = true;
                }
                Marks::Blocks(flags)
            })
            .collect()
    }
}
