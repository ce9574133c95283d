//! Per-household greedy selection

use rand::RngCore;

use super::{Budget, Candidate, Pick, SelectionStrategy};
use crate::projector::Marks;
use crate::types::StrategyKind;

/// Each household in turn marks its own highest-scored unmarked block, so
/// every step adds exactly one block per household.
#[derive(Clone, Debug)]
pub struct HouseholdGreedy {
    scores: Vec<Vec<f64>>,
    marked: Vec<Vec<bool>>,
    next_household: usize,
    count: usize,
}

impl HouseholdGreedy {
    pub fn new(scores: Vec<Vec<f64>>) -> Self {
        let marked = scores.iter().map(|row| vec![false; row.len()]).collect();
        HouseholdGreedy {
            scores,
            marked,
            next_household: 0,
            count: 0,
        }
    }
}

impl SelectionStrategy for HouseholdGreedy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::HouseholdGreedy
    }

    fn score(&self, candidate: &Candidate) -> f64 {
        match candidate {
            Candidate::Block { household, block } => self.scores[*household][*block],
            Candidate::Edge(_) => 0.0,
        }
    }

    fn pick_next(&mut self, remaining: usize, _rng: &mut dyn RngCore) -> Option<Pick> {
        if remaining == 0 || self.scores.is_empty() {
            return None;
        }
        let households = self.scores.len();
        for offset in 0..households {
            let household = (self.next_household + offset) % households;
            if let Some(block) = super::argmax_unmarked(&self.scores[household], &self.marked[household]) {
                self.marked[household][block] = true;
                self.count += 1;
                self.next_household = (household + 1) % households;
                return Some(Pick {
                    candidate: Candidate::Block { household, block },
                    score: self.scores[household][block],
                    marked: 1,
                });
            }
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
        self.marked.iter().cloned().map(Marks::Blocks).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_one_block_per_household_per_step() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut strategy = HouseholdGreedy::new(vec![
            vec![9.0, 8.0, 7.0],
            vec![0.0, 1.0, 0.5],
        ]);

        let picks: Vec<Candidate> = (0..4)
            .map(|_| strategy.pick_next(1, &mut rng).unwrap().candidate)
            .collect();
        assert_eq!(
            picks,
            vec![
                Candidate::Block { household: 0, block: 0 },
                Candidate::Block { household: 1, block: 1 },
                Candidate::Block { household: 0, block: 1 },
                Candidate::Block { household: 1, block: 2 },
            ]
        );
        assert_eq!(
            strategy.marks()[1],
            Marks::Blocks(vec![false, true, true])
        );
    }

    #[test]
    fn test_exhausts_all_blocks() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut strategy = HouseholdGreedy::new(vec![vec![1.0], vec![2.0]]);
        assert!(strategy.pick_next(5, &mut rng).is_some());
        assert!(strategy.pick_next(5, &mut rng).is_some());
        assert!(strategy.pick_next(5, &mut rng).is_none());
        assert!(strategy.is_done(Budget(2)));
    }
}
