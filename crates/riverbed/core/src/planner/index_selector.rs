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

use riverbed_common::{BoolExpr, CmpOp, Comparison, FieldId, NullsPlacement, SortDirection, SortedStreamList, ValueExpr};

use crate::catalog::IndexDescriptor;
use crate::optimizer::conjuncts::Conjunct;
use crate::planner::cost_model::RetrievalContext;

/// Fraction of rows kept by one range bound on an index segment.
pub const RANGE_SELECTIVITY: f64 = 0.05;

/// Conjuncts one index can satisfy for the stream being retrieved.
#[derive(Debug, Clone)]
pub struct IndexMatch {
    pub index_id: u16,
    pub index_name: String,
    pub equality_segments: usize,
    pub range: bool,
    pub selectivity: f64,
    pub matched: Vec<usize>,
    pub predicates: Vec<BoolExpr>,
    pub dependent_streams: SortedStreamList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmentUse {
    Equality,
    Range,
}

/// Usable restriction on one field of the stream.
struct SegmentPredicate<'c> {
    slot: usize,
    field: FieldId,
    usage: SegmentUse,
    node: &'c BoolExpr,
    bound: Option<&'c ValueExpr>,
}

pub struct IndexSelector;

impl IndexSelector {
    /// Every usable index with at least one matched segment, most selective first.
    pub fn matching_indices(ctx: &RetrievalContext<'_>) -> Vec<IndexMatch> {
        let predicates: Vec<SegmentPredicate<'_>> = ctx.candidate_conjuncts().filter_map(|(slot, conjunct)| Self::segment_predicate(ctx, slot, conjunct)).collect();
        if predicates.is_empty() {
            return Vec::new();
        }

        let cardinality = ctx.cardinality().max(1.0);
        let mut matches: Vec<IndexMatch> = ctx.indices().iter().filter(|index| index.usable()).filter_map(|index| Self::match_index(index, &predicates, cardinality)).collect();
        matches.sort_by(|a, b| a.selectivity.total_cmp(&b.selectivity));
        matches
    }

    fn segment_predicate<'c>(ctx: &RetrievalContext<'c>, slot: usize, conjunct: &'c Conjunct) -> Option<SegmentPredicate<'c>> {
        let node = &conjunct.node;
        if let BoolExpr::Missing(value) = node {
            let field = value.as_field().filter(|f| f.stream == ctx.stream)?;
            return Some(SegmentPredicate { slot, field: field.field, usage: SegmentUse::Equality, node, bound: None });
        }

        let cmp = node.as_comparison()?;
        let usage = match cmp.op {
            CmpOp::Eql | CmpOp::Equiv => SegmentUse::Equality,
            CmpOp::Gtr | CmpOp::Geq | CmpOp::Lss | CmpOp::Leq | CmpOp::Between | CmpOp::Starting => SegmentUse::Range,
            _ => return None,
        };
        let (field, bound) = Self::oriented(ctx, cmp)?;
        if let Some(upper) = &cmp.arg3
            && !upper.computable(ctx.states, Some(ctx.stream), false)
        {
            return None;
        }
        Some(SegmentPredicate { slot, field, usage, node, bound: Some(bound) })
    }

    /// Field of the retrieved stream and the value it is compared against.
    fn oriented<'c>(ctx: &RetrievalContext<'_>, cmp: &'c Comparison) -> Option<(FieldId, &'c ValueExpr)> {
        let usable = |value: &ValueExpr| value.computable(ctx.states, Some(ctx.stream), false);
        if let Some(field) = cmp.arg1.as_field().filter(|f| f.stream == ctx.stream)
            && usable(&cmp.arg2)
        {
            return Some((field.field, &cmp.arg2));
        }
        // STARTING WITH and BETWEEN are not reversible.
        if matches!(cmp.op, CmpOp::Starting | CmpOp::Between) {
            return None;
        }
        let field = cmp.arg2.as_field().filter(|f| f.stream == ctx.stream)?;
        usable(&cmp.arg1).then_some((field.field, &cmp.arg1))
    }

    fn match_index(index: &IndexDescriptor, predicates: &[SegmentPredicate<'_>], cardinality: f64) -> Option<IndexMatch> {
        let mut found = IndexMatch {
            index_id: index.id,
            index_name: index.name.clone(),
            equality_segments: 0,
            range: false,
            selectivity: 1.0,
            matched: Vec::new(),
            predicates: Vec::new(),
            dependent_streams: SortedStreamList::new(),
        };

        for &segment in &index.segments {
            let on_segment = || predicates.iter().filter(move |p| p.field == segment);
            let equalities: Vec<_> = on_segment().filter(|p| p.usage == SegmentUse::Equality).collect();
            if let Some(first) = equalities.first() {
                Self::take(&mut found, first);
                found.equality_segments += 1;
                continue;
            }
            for range in on_segment().filter(|p| p.usage == SegmentUse::Range) {
                Self::take(&mut found, range);
                found.range = true;
            }
            break;
        }

        if found.matched.is_empty() {
            return None;
        }

        let segments = index.segments.len().max(1);
        let mut selectivity = if found.equality_segments == segments {
            if index.unique { index.selectivity.min(1.0 / cardinality) } else { index.selectivity }
        } else if found.equality_segments > 0 {
            index.selectivity.powf(found.equality_segments as f64 / segments as f64)
        } else {
            1.0
        };
        if found.range {
            selectivity *= RANGE_SELECTIVITY;
        }
        found.selectivity = selectivity;
        Some(found)
    }

    fn take(found: &mut IndexMatch, predicate: &SegmentPredicate<'_>) {
        found.matched.push(predicate.slot);
        found.predicates.push(predicate.node.clone());
        if let Some(bound) = predicate.bound {
            bound.collect_streams(&mut found.dependent_streams);
        }
    }

    /// Index whose key order delivers the requested sort without a sort step.
    ///
    /// Under a user plan only indices the plan names for ORDER qualify.
    pub fn navigation<'c>(ctx: &RetrievalContext<'c>) -> Option<&'c IndexDescriptor> {
        let sort = ctx.sort.filter(|sort| !sort.is_empty())?;
        let mut fields = Vec::with_capacity(sort.len());
        for expr in &sort.expressions {
            let field = expr.as_field().filter(|f| f.stream == ctx.stream)?;
            fields.push(field.field);
        }

        let direction = sort.direction_at(0);
        if (1..sort.len()).any(|i| sort.direction_at(i) != direction) {
            return None;
        }
        let descending = direction == SortDirection::Descending;
        let conflicting_nulls = if descending { NullsPlacement::First } else { NullsPlacement::Last };
        if (0..sort.len()).any(|i| sort.nulls_at(i) == conflicting_nulls) {
            return None;
        }

        let planned = ctx.plan().is_some();
        ctx.indices().iter().find(|index| {
            let allowed = if planned { index.flags.plan_navigate } else { index.usable() };
            allowed && index.descending == descending && index.segments.len() >= fields.len() && index.segments[..fields.len()] == fields[..]
        })
    }
}
