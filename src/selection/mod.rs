//! Selection engine: which blocks (or records) get encrypted
//!
//! Every strategy exposes the same capability set: it can [`score`] a
//! candidate, [`pick_next`] the best candidate and mark it, and report when
//! it [`is_done`] for a given budget. [`Selector`] drives a strategy up to a
//! budget; budgets only ever grow, so the marks at a larger budget are a
//! superset of the marks at a smaller one.
//!
//! [`score`]: SelectionStrategy::score
//! [`pick_next`]: SelectionStrategy::pick_next
//! [`is_done`]: SelectionStrategy::is_done

mod global_greedy;
mod household_greedy;
mod pairwise;
mod random;

pub use global_greedy::GlobalGreedy;
pub use household_greedy::HouseholdGreedy;
pub use pairwise::{uniqueness_score, Edge, EdgeIndex, PairwiseUniqueness, MARKED_WEIGHT};
pub use random::RandomSelection;

use rand::RngCore;
use tracing::{debug, warn};

use crate::blocks::BlockLayout;
use crate::error::{PartencError, Result};
use crate::household::Household;
use crate::metrics::BlockMetrics;
use crate::projector::Marks;
use crate::types::StrategyKind;

/// Something a strategy can choose to mark
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Candidate {
    Block { household: usize, block: usize },
    Edge(Edge),
}

/// The outcome of one `pick_next`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pick {
    pub candidate: Candidate,
    pub score: f64,
    /// Budget units newly marked by this pick
    pub marked: usize,
}

/// Number of budget units to mark.
///
/// Block-level strategies count blocks; the pairwise strategy counts records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Budget(pub usize);

impl Budget {
    /// Budget for an encryption ratio in percent.
    ///
    /// Block strategies take `⌈B · ratio / 100⌉` steps of one block per
    /// household; the pairwise strategy marks `⌈P · R · ratio / 100⌉`
    /// records directly.
    pub fn from_ratio(kind: StrategyKind, ratio: f64, layout: &BlockLayout, households: usize) -> Result<Self> {
        if !(0.0..=100.0).contains(&ratio) {
            return Err(PartencError::InvalidParameter(format!(
                "encryption ratio {} outside [0, 100]",
                ratio
            )));
        }
        if kind.is_block_level() {
            let steps = (layout.block_count() as f64 * ratio / 100.0).ceil() as usize;
            Ok(Self::for_step(steps, layout, households))
        } else {
            let records = (households as f64 * layout.len() as f64 * ratio / 100.0).ceil() as usize;
            Ok(Self::clamped(records, households * layout.len()))
        }
    }

    /// Block budget after `step` rounds of one block per household
    pub fn for_step(step: usize, layout: &BlockLayout, households: usize) -> Self {
        Self::clamped(step * households, households * layout.block_count())
    }

    /// Clamp `requested` to `available`, logging the infeasible request
    pub fn clamped(requested: usize, available: usize) -> Self {
        if requested > available {
            let err = PartencError::BudgetInfeasible {
                requested,
                available,
            };
            warn!(error = %err, "clamping encryption budget");
            Budget(available)
        } else {
            Budget(requested)
        }
    }
}

/// A block-selection strategy
pub trait SelectionStrategy {
    fn kind(&self) -> StrategyKind;

    /// Score of `candidate`; higher is picked first
    fn score(&self, candidate: &Candidate) -> f64;

    /// Pick the next candidate and mark it, spending at most `remaining`
    /// budget units. Returns `None` when no feasible candidate is left.
    fn pick_next(&mut self, remaining: usize, rng: &mut dyn RngCore) -> Option<Pick>;

    /// Whether the strategy has reached `budget` or cannot progress further
    fn is_done(&self, budget: Budget) -> bool;

    /// Budget units marked so far
    fn marked(&self) -> usize;

    /// Current marks, one entry per household
    fn marks(&self) -> Vec<Marks>;
}

/// Build the strategy selected by `kind` over a population
pub fn build_strategy(
    kind: StrategyKind,
    households: &[Household],
    metrics: &BlockMetrics,
    layout: &BlockLayout,
) -> Box<dyn SelectionStrategy> {
    match kind {
        StrategyKind::GlobalGreedy => Box::new(GlobalGreedy::new(metrics.score_grid())),
        StrategyKind::HouseholdGreedy => Box::new(HouseholdGreedy::new(metrics.score_grid())),
        StrategyKind::Random => Box::new(RandomSelection::new(households.len(), layout.block_count())),
        StrategyKind::PairwiseUniqueness => Box::new(PairwiseUniqueness::new(households, *layout)),
    }
}

/// Drives a strategy towards ever-growing budgets
pub struct Selector {
    strategy: Box<dyn SelectionStrategy>,
    budget: Budget,
}

impl Selector {
    pub fn new(strategy: Box<dyn SelectionStrategy>) -> Self {
        Selector {
            strategy,
            budget: Budget(0),
        }
    }

    pub fn kind(&self) -> StrategyKind {
        self.strategy.kind()
    }

    /// The largest budget reached so far
    pub fn budget(&self) -> Budget {
        self.budget
    }

    /// Budget units actually marked
    pub fn marked(&self) -> usize {
        self.strategy.marked()
    }

    /// Whether `budget` can be reached from the current marks
    pub fn can_reach(&self, budget: Budget) -> bool {
        budget >= self.budget
    }

    /// Mark until `budget` is reached or the strategy runs out of candidates.
    ///
    /// Returns the number of budget units marked by this call.
    pub fn advance(&mut self, budget: Budget, rng: &mut dyn RngCore) -> Result<usize> {
        if !self.can_reach(budget) {
            return Err(PartencError::InvalidParameter(format!(
                "cannot shrink budget from {} to {}",
                self.budget.0, budget.0
            )));
        }
        self.budget = budget;

        let before = self.strategy.marked();
        while !self.strategy.is_done(budget) {
            let remaining = budget.0.saturating_sub(self.strategy.marked());
            match self.strategy.pick_next(remaining, rng) {
                Some(pick) => {
                    debug!(candidate = ?pick.candidate, score = pick.score, marked = pick.marked, "selected");
                }
                None => {
                    warn!(
                        strategy = %self.strategy.kind(),
                        marked = self.strategy.marked(),
                        budget = budget.0,
                        "no feasible candidate left, stopping at last feasible step"
                    );
                    break;
                }
            }
        }
        Ok(self.strategy.marked() - before)
    }

    pub fn marks(&self) -> Vec<Marks> {
        self.strategy.marks()
    }
}

/// Index of the highest score among unmarked entries, first on ties
pub(crate) fn argmax_unmarked(scores: &[f64], marked: &[bool]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, (&score, &is_marked)) in scores.iter().zip(marked).enumerate() {
        if is_marked {
            continue;
        }
        match best {
            Some((_, s)) if score <= s => {}
            _ => best = Some((i, score)),
        }
    }
    best.map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Quantized;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_block_budget_from_ratio() {
        let layout = BlockLayout::new(10, 2).unwrap();
        let budget = Budget::from_ratio(StrategyKind::GlobalGreedy, 30.0, &layout, 4).unwrap();
        // ⌈5 · 0.3⌉ = 2 steps of 4 households
        assert_eq!(budget, Budget(8));
        let full = Budget::from_ratio(StrategyKind::Random, 100.0, &layout, 4).unwrap();
        assert_eq!(full, Budget(20));
    }

    #[test]
    fn test_record_budget_from_ratio() {
        let layout = BlockLayout::new(10, 2).unwrap();
        let budget = Budget::from_ratio(StrategyKind::PairwiseUniqueness, 25.0, &layout, 3).unwrap();
        assert_eq!(budget, Budget(8));
        assert!(Budget::from_ratio(StrategyKind::PairwiseUniqueness, 120.0, &layout, 3).is_err());
    }

    #[test]
    fn test_infeasible_budget_is_clamped() {
        let layout = BlockLayout::new(8, 4).unwrap();
        assert_eq!(Budget::for_step(5, &layout, 3), Budget(6));
    }

    #[test]
    fn test_argmax_skips_marked_and_keeps_first_tie() {
        let scores = [3.0, 5.0, 5.0, 1.0];
        assert_eq!(argmax_unmarked(&scores, &[false; 4]), Some(1));
        assert_eq!(argmax_unmarked(&scores, &[false, true, false, false]), Some(2));
        assert_eq!(argmax_unmarked(&scores, &[true; 4]), None);
    }

    #[test]
    fn test_selector_refuses_to_shrink() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut selector = Selector::new(Box::new(RandomSelection::new(2, 3)));
        assert_eq!(selector.advance(Budget(4), &mut rng).unwrap(), 4);
        assert!(selector.advance(Budget(2), &mut rng).is_err());
        assert_eq!(selector.advance(Budget(6), &mut rng).unwrap(), 2);
    }

    #[test]
    fn test_build_strategy_dispatch() {
        let households = vec![
            Household::new("a", vec![Quantized(1); 4]),
            Household::new("b", vec![Quantized(2); 4]),
        ];
        let layout = BlockLayout::new(4, 2).unwrap();
        let tables = crate::metrics::ValueTables::build(&households);
        let metrics = BlockMetrics::compute(
            &households,
            &tables,
            &layout,
            crate::types::Dataset::Water,
            crate::types::Target::Entropy,
        );
        for kind in [
            StrategyKind::GlobalGreedy,
            StrategyKind::HouseholdGreedy,
            StrategyKind::Random,
            StrategyKind::PairwiseUniqueness,
        ] {
            let strategy = build_strategy(kind, &households, &metrics, &layout);
            assert_eq!(strategy.kind(), kind);
            assert_eq!(strategy.marks().len(), 2);
        }
    }
}
