//! Pairwise-uniqueness greedy selection
//!
//! An edge joins block `b1` of household `h1` with block `b2` of household
//! `h2` (`h1 < h2`). Its uniqueness score sums, over aligned positions, 1 for
//! records that differ, 0 for identical unmarked records and
//! [`MARKED_WEIGHT`] when either record is already marked. The highest-scored
//! unvisited edge is taken and its differing, still unmarked positions are
//! marked on both sides.

use rand::RngCore;

use super::{Budget, Candidate, Pick, SelectionStrategy};
use crate::blocks::BlockLayout;
use crate::household::Household;
use crate::projector::Marks;
use crate::types::{Quantized, StrategyKind};

/// Weight of a position where at least one endpoint is already marked.
///
/// Slightly below a fresh difference, so that edges needing new marks win.
pub const MARKED_WEIGHT: f64 = 0.9;

/// An unordered pair of blocks from two distinct households, with `h1 < h2`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Edge {
    pub h1: usize,
    pub b1: usize,
    pub h2: usize,
    pub b2: usize,
}

/// Linear addressing of all edges over `P` households of `B` blocks each.
///
/// Edges are ordered by `h1`, then `h2`, then `b1`, then `b2`; there are
/// `P·(P-1)·B²/2` of them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EdgeIndex {
    households: usize,
    blocks: usize,
}

impl EdgeIndex {
    pub fn new(households: usize, blocks: usize) -> Self {
        EdgeIndex { households, blocks }
    }

    /// Total number of edges
    pub fn count(&self) -> usize {
        self.households * self.households.saturating_sub(1) * self.blocks * self.blocks / 2
    }

    fn block_pairs(&self) -> usize {
        self.blocks * self.blocks
    }

    /// Edges whose first household is below `h1`
    fn edges_before(&self, h1: usize) -> usize {
        (0..h1)
            .map(|h| (self.households - 1 - h) * self.block_pairs())
            .sum()
    }

    pub fn encode(&self, edge: &Edge) -> usize {
        self.edges_before(edge.h1)
            + (edge.h2 - edge.h1 - 1) * self.block_pairs()
            + edge.b1 * self.blocks
            + edge.b2
    }

    /// Decode a linear index, or `None` when it is out of range
    pub fn decode(&self, index: usize) -> Option<Edge> {
        if index >= self.count() {
            return None;
        }
        let mut rest = index;
        let mut h1 = 0;
        loop {
            let span = (self.households - 1 - h1) * self.block_pairs();
            if rest < span {
                break;
            }
            rest -= span;
            h1 += 1;
        }
        let h2 = h1 + 1 + rest / self.block_pairs();
        let within = rest % self.block_pairs();
        Some(Edge {
            h1,
            b1: within / self.blocks,
            h2,
            b2: within % self.blocks,
        })
    }
}

/// Uniqueness score of two aligned blocks and their record marks.
///
/// Only positions present in both blocks count. The score is symmetric in
/// its two endpoints.
pub fn uniqueness_score(
    values_a: &[Quantized],
    marks_a: &[bool],
    values_b: &[Quantized],
    marks_b: &[bool],
) -> f64 {
    values_a
        .iter()
        .zip(marks_a)
        .zip(values_b.iter().zip(marks_b))
        .map(|((va, ma), (vb, mb))| {
            if *ma || *mb {
                MARKED_WEIGHT
            } else if va != vb {
                1.0
            } else {
                0.0
            }
        })
        .sum()
}

/// Greedy marking of individual records that make blocks pairwise distinct
#[derive(Clone, Debug)]
pub struct PairwiseUniqueness {
    layout: BlockLayout,
    index: EdgeIndex,
    /// Decorated series, one per household (`greedyInputs`)
    inputs: Vec<Vec<Quantized>>,
    /// Record marks, one per household (`greedyFlags`)
    flags: Vec<Vec<bool>>,
    scores: Vec<f64>,
    visited: Vec<bool>,
    unvisited: usize,
    sweep_marks: usize,
    exhausted: bool,
    count: usize,
}

impl PairwiseUniqueness {
    pub fn new(households: &[Household], layout: BlockLayout) -> Self {
        let inputs: Vec<Vec<Quantized>> = households.iter().map(|h| h.decorated().to_vec()).collect();
        let flags = inputs.iter().map(|v| vec![false; v.len()]).collect();
        let index = EdgeIndex::new(households.len(), layout.block_count());
        let edges = index.count();

        let mut strategy = PairwiseUniqueness {
            layout,
            index,
            inputs,
            flags,
            scores: vec![0.0; edges],
            visited: vec![false; edges],
            unvisited: edges,
            sweep_marks: 0,
            exhausted: edges == 0,
            count: 0,
        };
        for k in 0..edges {
            strategy.scores[k] = strategy.edge_score(k);
        }
        strategy
    }

    pub fn edge_index(&self) -> EdgeIndex {
        self.index
    }

    fn block(&self, household: usize, block: usize) -> (&[Quantized], &[bool]) {
        let range = self.layout.range(block);
        (&self.inputs[household][range.clone()], &self.flags[household][range])
    }

    fn edge_score(&self, k: usize) -> f64 {
        match self.index.decode(k) {
            Some(edge) => {
                let (va, ma) = self.block(edge.h1, edge.b1);
                let (vb, mb) = self.block(edge.h2, edge.b2);
                uniqueness_score(va, ma, vb, mb)
            }
            None => 0.0,
        }
    }

    /// Mark the differing, unmarked positions of `edge`, at most `remaining`
    fn mark_edge(&mut self, edge: &Edge, remaining: usize) -> usize {
        let ra = self.layout.range(edge.b1);
        let rb = self.layout.range(edge.b2);
        let mut marked = 0;
        for (ia, ib) in ra.zip(rb) {
            if marked >= remaining {
                break;
            }
            let differ = self.inputs[edge.h1][ia] != self.inputs[edge.h2][ib];
            if !differ || self.flags[edge.h1][ia] || self.flags[edge.h2][ib] {
                continue;
            }
            self.flags[edge.h1][ia] = true;
            marked += 1;
            if marked < remaining {
                self.flags[edge.h2][ib] = true;
                marked += 1;
            }
        }
        marked
    }

    /// Refresh the cached scores of every edge touching `(household, block)`
    fn rescore_block(&mut self, household: usize, block: usize) {
        let households = self.inputs.len();
        let blocks = self.layout.block_count();
        for other in (0..households).filter(|&o| o != household) {
            for other_block in 0..blocks {
                let edge = if household < other {
                    Edge { h1: household, b1: block, h2: other, b2: other_block }
                } else {
                    Edge { h1: other, b1: other_block, h2: household, b2: block }
                };
                let k = self.index.encode(&edge);
                self.scores[k] = self.edge_score(k);
            }
        }
    }

    fn best_unvisited(&self) -> Option<usize> {
        super::argmax_unmarked(&self.scores, &self.visited)
    }
}

impl SelectionStrategy for PairwiseUniqueness {
    fn kind(&self) -> StrategyKind {
        StrategyKind::PairwiseUniqueness
    }

    fn score(&self, candidate: &Candidate) -> f64 {
        match candidate {
            Candidate::Edge(edge) => {
                let (va, ma) = self.block(edge.h1, edge.b1);
                let (vb, mb) = self.block(edge.h2, edge.b2);
                uniqueness_score(va, ma, vb, mb)
            }
            Candidate::Block { .. } => 0.0,
        }
    }

    fn pick_next(&mut self, remaining: usize, _rng: &mut dyn RngCore) -> Option<Pick> {
        if remaining == 0 || self.exhausted {
            return None;
        }
        loop {
            if self.unvisited == 0 {
                if self.sweep_marks == 0 {
                    self.exhausted = true;
                    return None;
                }
                self.visited.iter_mut().for_each(|v| *v = false);
                self.unvisited = self.visited.len();
                self.sweep_marks = 0;
            }

            let k = self.best_unvisited()?;
            self.visited[k] = true;
            self.unvisited -= 1;
            let edge = self.index.decode(k)?;
            let score = self.scores[k];

            let marked = self.mark_edge(&edge, remaining);
            if marked == 0 {
                continue;
            }
            self.count += marked;
            self.sweep_marks += marked;
            self.rescore_block(edge.h1, edge.b1);
            self.rescore_block(edge.h2, edge.b2);
            return Some(Pick {
                candidate: Candidate::Edge(edge),
                score,
                marked,
            });
        }
    }

    fn is_done(&self, budget: Budget) -> bool {
        self.exhausted || self.count >= budget.0
    }

    fn marked(&self) -> usize {
        self.count
    }

    fn marks(&self) -> Vec<Marks> {
        self.flags.iter().cloned().map(Marks::Records).collect()
    }
}
