// Dotlanth
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Cost-model collaborator.
//!
//! The optimizer asks a [`CostModel`] two questions: how to retrieve one
//! stream given the streams already active, and in which order to join a set
//! of streams. [`HeuristicCostModel`] answers them from index definitions and
//! cardinalities alone.

use riverbed_common::{ActivatedWith, BoolExpr, Inversion, IndexRetrieval, PlanConstraint, SortClause, SortedStreamList, StreamId, StreamStates};
use serde::{Deserialize, Serialize};

use crate::catalog::{IndexDescriptor, RelationDescriptor};
use crate::optimizer::conjuncts::{Conjunct, ConjunctTable};
use crate::planner::index_selector::{IndexMatch, IndexSelector};
use crate::scratch::CompilerScratch;

/// What the cost model sees when asked about one stream.
pub struct RetrievalContext<'c> {
    pub scratch: &'c CompilerScratch,
    /// Activation used to decide which predicates are computable.
    pub states: &'c dyn StreamStates,
    pub conjuncts: &'c ConjunctTable,
    pub stream: StreamId,
    pub outer: bool,
    pub inner: bool,
    pub sort: Option<&'c SortClause>,
}

impl<'c> RetrievalContext<'c> {
    pub fn new(scratch: &'c CompilerScratch, conjuncts: &'c ConjunctTable, stream: StreamId) -> Self {
        Self { scratch, states: scratch, conjuncts, stream, outer: false, inner: false, sort: None }
    }

    /// Unused, non-residual conjuncts this retrieval may match.
    ///
    /// The outer side of an outer join skips the base range; the inner side
    /// never sees parent-missing conjuncts.
    pub fn candidate_conjuncts(&self) -> impl Iterator<Item = (usize, &'c Conjunct)> {
        let start = if self.outer { self.conjuncts.base_parent_count() } else { 0 };
        let end = if self.inner { self.conjuncts.base_missing_count() } else { self.conjuncts.len() };
        self.conjuncts.slots(start..end).filter(|(_, c)| c.is_available())
    }

    pub fn indices(&self) -> &'c [IndexDescriptor] {
        self.scratch.indices(self.stream)
    }

    pub fn relation(&self) -> Option<&'c RelationDescriptor> {
        self.scratch.get(self.stream).and_then(|tail| tail.relation.as_ref())
    }

    pub fn cardinality(&self) -> f64 {
        self.scratch.get(self.stream).map_or(0.0, |tail| tail.cardinality)
    }

    pub fn plan(&self) -> Option<&'c PlanConstraint> {
        self.scratch.get(self.stream).and_then(|tail| tail.plan.as_ref())
    }
}

/// Index combination chosen for one stream.
#[derive(Debug, Clone, Default)]
pub struct InversionCandidate {
    pub inversion: Option<Inversion>,
    /// Must hold at runtime for the inversion to be safe.
    pub condition: Option<BoolExpr>,
    /// Conjunct slots satisfied by the inversion.
    pub matched: Vec<usize>,
    pub used_indices: Vec<u16>,
    /// Streams that must be active for the inversion to be usable.
    pub dependent_streams: SortedStreamList,
    pub selectivity: f64,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationalScan {
    pub index_id: u16,
    pub index_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct RetrievalEstimate {
    pub candidate: InversionCandidate,
    /// Index walk satisfying the requested sort.
    pub navigation: Option<NavigationalScan>,
}

pub struct JoinOrderContext<'c> {
    pub scratch: &'c CompilerScratch,
    pub conjuncts: &'c ConjunctTable,
    pub streams: &'c [StreamId],
    pub sort: Option<&'c SortClause>,
    pub plan: Option<&'c PlanConstraint>,
}

pub trait CostModel {
    fn estimate(&self, ctx: &RetrievalContext<'_>) -> RetrievalEstimate;

    /// Best join order for a prefix of `ctx.streams`; the prefix becomes one river.
    fn join_order(&self, ctx: &JoinOrderContext<'_>) -> Vec<StreamId>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostEstimate {
    pub cpu_cost: f64,
    pub io_cost: f64,
    pub total_cost: f64,
}

impl CostEstimate {
    pub fn new(cpu: f64, io: f64) -> Self {
        Self { cpu_cost: cpu, io_cost: io, total_cost: cpu + io }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OperationCost {
    TableScan { rows: f64 },
    IndexScan { rows: f64, selectivity: f64, indices: usize },
}

pub struct HeuristicCostModel {
    cpu_cost_per_row: f64,
    io_cost_per_page: f64,
    rows_per_page: f64,
    index_lookup_cost: f64,
    /// Largest selectivity worth ANDing another index onto.
    combine_threshold: f64,
    max_combined_indices: usize,
}

impl HeuristicCostModel {
    pub fn new() -> Self {
        Self { cpu_cost_per_row: 0.01, io_cost_per_page: 1.0, rows_per_page: 100.0, index_lookup_cost: 1.0, combine_threshold: 0.1, max_combined_indices: 3 }
    }

    pub fn estimate_operation_cost(&self, operation: &OperationCost) -> CostEstimate {
        match operation {
            OperationCost::TableScan { rows } => {
                let io_cost = (rows / self.rows_per_page).ceil() * self.io_cost_per_page;
                CostEstimate::new(rows * self.cpu_cost_per_row, io_cost)
            }
            OperationCost::IndexScan { rows, selectivity, indices } => {
                let fetched = rows * selectivity;
                let io_cost = *indices as f64 * self.index_lookup_cost + fetched.min(rows / self.rows_per_page).max(1.0) * self.io_cost_per_page;
                CostEstimate::new(fetched * self.cpu_cost_per_row, io_cost)
            }
        }
    }

    fn combine(&self, ctx: &RetrievalContext<'_>, matches: Vec<IndexMatch>) -> InversionCandidate {
        let rows = ctx.cardinality().max(1.0);
        let full = self.estimate_operation_cost(&OperationCost::TableScan { rows });
        let plan_constrained = ctx.plan().and_then(PlanConstraint::access).is_some();

        let mut chosen: Vec<IndexMatch> = Vec::new();
        let mut selectivity = 1.0;
        for m in matches {
            let take = plan_constrained || chosen.is_empty() || (chosen.len() < self.max_combined_indices && m.selectivity < self.combine_threshold);
            if take {
                selectivity *= m.selectivity;
                chosen.push(m);
            }
        }

        let indexed = self.estimate_operation_cost(&OperationCost::IndexScan { rows, selectivity, indices: chosen.len() });
        if chosen.is_empty() || (!plan_constrained && indexed.total_cost >= full.total_cost) {
            return InversionCandidate { selectivity: 1.0, cost: full.total_cost, ..InversionCandidate::default() };
        }

        let mut candidate = InversionCandidate { selectivity, cost: indexed.total_cost, ..InversionCandidate::default() };
        for m in chosen {
            candidate.matched.extend(m.matched.iter().copied());
            candidate.used_indices.push(m.index_id);
            candidate.dependent_streams.extend(m.dependent_streams.iter().copied());
            let retrieval = Inversion::Index(IndexRetrieval { index_id: m.index_id, index_name: m.index_name, predicates: m.predicates });
            candidate.inversion = Some(match candidate.inversion.take() {
                Some(existing) => Inversion::and(existing, retrieval),
                None => retrieval,
            });
        }
        candidate.matched.sort_unstable();
        candidate.matched.dedup();
        candidate
    }
}

impl Default for HeuristicCostModel {
    fn default() -> Self {
        Self::new()
    }
}

impl CostModel for HeuristicCostModel {
    fn estimate(&self, ctx: &RetrievalContext<'_>) -> RetrievalEstimate {
        let matches = IndexSelector::matching_indices(ctx);
        let candidate = self.combine(ctx, matches);
        let navigation = IndexSelector::navigation(ctx).map(|index| NavigationalScan { index_id: index.id, index_name: index.name.clone() });
        RetrievalEstimate { candidate, navigation }
    }

    fn join_order(&self, ctx: &JoinOrderContext<'_>) -> Vec<StreamId> {
        if ctx.plan.is_some() {
            return ctx.streams.to_vec();
        }

        let mut order: Vec<StreamId> = Vec::new();
        let mut remaining = ctx.streams.to_vec();
        while !remaining.is_empty() {
            let mut best: Option<(usize, f64)> = None;
            for (i, &stream) in remaining.iter().enumerate() {
                let states = ActivatedWith::new(ctx.scratch, &order);
                let rctx = RetrievalContext {
                    scratch: ctx.scratch,
                    states: &states,
                    conjuncts: ctx.conjuncts,
                    stream,
                    outer: false,
                    inner: false,
                    sort: if order.is_empty() { ctx.sort } else { None },
                };
                let estimate = self.estimate(&rctx);
                if !order.is_empty() && !estimate.candidate.dependent_streams.iter().any(|d| order.contains(d)) {
                    continue;
                }
                let mut cost = estimate.candidate.cost;
                if estimate.navigation.is_some() {
                    cost /= 2.0;
                }
                if best.is_none_or(|(_, best_cost)| cost < best_cost) {
                    best = Some((i, cost));
                }
            }
            match best {
                Some((i, _)) => order.push(remaining.remove(i)),
                None => break,
            }
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_scan_cost() {
        let model = HeuristicCostModel::new();
        let cost = model.estimate_operation_cost(&OperationCost::TableScan { rows: 1000.0 });
        assert_eq!(cost.io_cost, 10.0);
        assert!(cost.total_cost > cost.io_cost);
    }

    #[test]
    fn test_selective_index_beats_scan() {
        let model = HeuristicCostModel::new();
        let scan = model.estimate_operation_cost(&OperationCost::TableScan { rows: 100_000.0 });
        let index = model.estimate_operation_cost(&OperationCost::IndexScan { rows: 100_000.0, selectivity: 0.0001, indices: 1 });
        assert!(index.total_cost < scan.total_cost);
        let weak = model.estimate_operation_cost(&OperationCost::IndexScan { rows: 100_000.0, selectivity: 1.0, indices: 1 });
        assert!(weak.total_cost >= scan.total_cost);
    }
}
