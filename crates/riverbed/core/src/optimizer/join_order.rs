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

//! Inner join ordering: turning relation streams into rivers.

use riverbed_common::{JoinKind, PlanConstraint, RecordSource, SortClause, StreamId, StreamList};
use std::slice;
use tracing::trace;

use super::Optimizer;
use super::river::River;
use crate::error::Result;
use crate::planner::{JoinOrderContext, RetrievalContext};

impl Optimizer<'_> {
    /// Splits `streams` into those with an index lookup driven by the active
    /// streams and those without.
    pub fn find_index_relationship_streams(&mut self, streams: &[StreamId]) -> (StreamList, StreamList) {
        let mut dependent = StreamList::new();
        let mut free = StreamList::new();
        for &stream in streams {
            self.csb.activate(stream);
            let related = !self.conjuncts.is_empty() && {
                let ctx = RetrievalContext::new(self.csb, &self.conjuncts, stream);
                !self.env.cost_model.estimate(&ctx).candidate.dependent_streams.is_empty()
            };
            self.csb.deactivate(stream);
            if related { dependent.push(stream) } else { free.push(stream) }
        }
        trace!(?dependent, ?free, "index relationships");
        (dependent, free)
    }

    /// Forms `streams` into rivers, following `plan` when one is given.
    pub fn gen_join(&mut self, streams: &[StreamId], rivers: &mut Vec<River>, sort: &mut Option<SortClause>, plan: Option<&PlanConstraint>) -> Result<()> {
        if streams.is_empty() {
            return Ok(());
        }
        if let Some(plan) = plan
            && streams.len() > 1
        {
            return self.form_rivers(streams, rivers, sort, plan);
        }

        let mut temp = streams.to_vec();
        while self.form_next_river(streams.len(), &mut temp, rivers, sort, plan)? {}
        Ok(())
    }

    /// Rivers shaped by a user plan: each join node's retrievals that are still
    /// pending are joined in plan order.
    fn form_rivers(&mut self, streams: &[StreamId], rivers: &mut Vec<River>, sort: &mut Option<SortClause>, plan: &PlanConstraint) -> Result<()> {
        let items = match plan {
            PlanConstraint::Join { items, .. } => items.as_slice(),
            PlanConstraint::Retrieve { .. } => slice::from_ref(plan),
        };

        let mut temp = StreamList::new();
        for item in items {
            match item {
                PlanConstraint::Join { .. } => self.form_rivers(streams, rivers, sort, item)?,
                PlanConstraint::Retrieve { stream, .. } => {
                    if streams.contains(stream) {
                        temp.push(*stream);
                    }
                }
            }
        }

        if !temp.is_empty() {
            while self.form_next_river(streams.len(), &mut temp, rivers, sort, Some(plan))? {}
        }
        Ok(())
    }

    fn form_next_river(&mut self, total: usize, temp: &mut StreamList, rivers: &mut Vec<River>, sort: &mut Option<SortClause>, plan: Option<&PlanConstraint>) -> Result<bool> {
        let mut order = {
            let ctx = JoinOrderContext { scratch: self.csb, conjuncts: &self.conjuncts, streams: temp, sort: sort.as_ref(), plan };
            self.env.cost_model.join_order(&ctx)
        };
        order.retain(|stream| temp.contains(stream));
        if order.is_empty() {
            order.push(temp[0]);
        }
        self.env.diagnostics.record_decision("join_order", &format!("{order:?}"));
        self.form_river(&order, total, temp, rivers, sort)
    }

    /// Retrieves `order` as one nested loop river and drops its streams from `temp`.
    ///
    /// Returns whether streams remain. The sort is offered to the leading
    /// stream only, and only when the river covers every stream.
    pub fn form_river(&mut self, order: &[StreamId], total: usize, temp: &mut StreamList, rivers: &mut Vec<River>, sort: &mut Option<SortClause>) -> Result<bool> {
        let mut rsbs = Vec::with_capacity(order.len());
        for (i, &stream) in order.iter().enumerate() {
            let (rsb, _) = if i == 0 && order.len() == total { self.gen_retrieval(stream, sort, false, false)? } else { self.gen_retrieval(stream, &mut None, false, false)? };
            rsbs.push(rsb);
        }

        let rsb = if rsbs.len() == 1 { rsbs.remove(0) } else { RecordSource::NestedLoopJoin { kind: JoinKind::Inner, args: rsbs, boolean: None } };
        let river = River::new(rsb, order.to_vec());
        river.deactivate(self.csb);
        rivers.push(river);

        temp.retain(|stream| !order.contains(stream));
        Ok(!temp.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::IndexDescriptor;
    use crate::optimizer::conjuncts::ConjunctTable;
    use crate::optimizer::testing::{TestEnv, scratch};
    use riverbed_common::{BoolExpr, ValueExpr};

    fn streams_of(rivers: &[River]) -> Vec<StreamList> {
        rivers.iter().map(|river| river.streams.clone()).collect()
    }

    /// `JOIN (T2, JOIN (T0, T1))`
    fn nested_plan() -> PlanConstraint {
        PlanConstraint::join(vec![PlanConstraint::natural(2), PlanConstraint::join(vec![PlanConstraint::natural(0), PlanConstraint::natural(1)])])
    }

    #[test]
    fn test_nested_plan_join_forms_its_own_river() {
        let test = TestEnv::new();
        let mut csb = scratch(3);
        let mut opt = Optimizer::new(test.env(), &mut csb);
        let mut rivers = Vec::new();

        opt.gen_join(&[0, 1, 2], &mut rivers, &mut None, Some(&nested_plan())).unwrap();
        assert_eq!(streams_of(&rivers), vec![vec![0, 1], vec![2]]);
        assert!(matches!(&rivers[0].rsb, RecordSource::NestedLoopJoin { kind: JoinKind::Inner, args, .. } if args.len() == 2));
        assert!(matches!(&rivers[1].rsb, RecordSource::FullTableScan(target) if target.stream == 2));
    }

    #[test]
    fn test_plan_walk_skips_streams_not_requested() {
        let test = TestEnv::new();
        let mut csb = scratch(3);
        let mut opt = Optimizer::new(test.env(), &mut csb);
        let mut rivers = Vec::new();

        opt.gen_join(&[0, 2], &mut rivers, &mut None, Some(&nested_plan())).unwrap();
        assert_eq!(streams_of(&rivers), vec![vec![0], vec![2]]);
    }

    #[test]
    fn test_index_relationship_splits_streams() {
        let test = TestEnv::new();
        let mut csb = scratch(2);
        let tail = csb.get_mut(1);
        tail.indices = Some(vec![IndexDescriptor::new(1, "T1_A", vec![0], 0.001)]);
        tail.cardinality = 10_000.0;
        csb.activate(0);
        let mut opt = Optimizer::new(test.env(), &mut csb);
        opt.conjuncts = ConjunctTable::new(vec![BoolExpr::eq(ValueExpr::field(0, 0), ValueExpr::field(1, 0))], vec![], vec![], vec![]);

        let (dependent, free) = opt.find_index_relationship_streams(&[1]);
        assert_eq!((dependent, free), (vec![1], vec![]));
    }
}
