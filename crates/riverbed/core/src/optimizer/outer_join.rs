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

//! Two-way outer joins.

use riverbed_common::{JoinKind, JoinType, RecordSource, RecordSourceNode, RseNode, SortClause, StreamId};

use super::Optimizer;
use super::river::River;
use crate::error::{OptimizerError, Result};

/// One input of an outer join: a bare relation stream, or a sub-plan already built as a river.
enum JoinSide {
    Stream(StreamId),
    Built(RecordSource),
}

impl Optimizer<'_> {
    /// Joins the two inputs of an outer join expression.
    ///
    /// For LEFT the syntactic left input is the outer one, otherwise the right
    /// input is. A FULL join is the left outer join followed by an anti join
    /// that produces the inner rows without a match.
    pub fn gen_outer(&mut self, rse: &RseNode, rivers: &mut Vec<River>, sort: &mut Option<SortClause>) -> Result<RecordSource> {
        if rse.relations.len() != 2 {
            return Err(OptimizerError::InvalidExpression(format!("outer join over {} inputs", rse.relations.len())));
        }

        // Sub-plan rivers were pushed in order, so the right input pops first.
        let mut side = |node: &RecordSourceNode| -> Result<JoinSide> {
            match node.as_relation() {
                Some(stream) => Ok(JoinSide::Stream(stream)),
                None => rivers.pop().map(|river| JoinSide::Built(river.rsb)).ok_or_else(|| OptimizerError::InvalidExpression("outer join input has no river".to_string())),
            }
        };
        let second = side(&rse.relations[1])?;
        let first = side(&rse.relations[0])?;
        let (outer, inner) = if rse.join_type == JoinType::Left { (first, second) } else { (second, first) };

        if rse.join_type != JoinType::Full {
            let (outer_rsb, boolean) = match outer {
                JoinSide::Stream(stream) => self.gen_retrieval(stream, sort, true, false)?,
                JoinSide::Built(rsb) => (rsb, None),
            };
            let inner_rsb = match inner {
                JoinSide::Stream(stream) => self.gen_retrieval(stream, &mut None, false, true)?.0,
                JoinSide::Built(rsb) => rsb,
            };
            let inner_rsb = self.gen_residual_boolean(inner_rsb);
            return Ok(RecordSource::NestedLoopJoin { kind: JoinKind::Outer, args: vec![outer_rsb, inner_rsb], boolean });
        }

        let (outer_rsb, boolean) = match &outer {
            JoinSide::Stream(stream) => self.gen_retrieval(*stream, &mut None, true, false)?,
            JoinSide::Built(rsb) => (rsb.clone(), None),
        };
        let inner_rsb = match &inner {
            JoinSide::Stream(stream) => self.gen_retrieval(*stream, &mut None, false, true)?.0,
            JoinSide::Built(rsb) => rsb.clone(),
        };
        let inner_rsb = self.gen_residual_boolean(inner_rsb);
        let matched = RecordSource::NestedLoopJoin { kind: JoinKind::Outer, args: vec![outer_rsb, inner_rsb], boolean };

        // The anti join matches the same predicates again.
        let rearmed = self.conjuncts.rearm_used();
        self.env.diagnostics.record_decision("outer_join", &format!("full join re-matches {rearmed} conjuncts"));
        for side in [&inner, &outer] {
            if let JoinSide::Stream(stream) = side {
                self.csb.deactivate(*stream);
            }
        }

        let (inner_rsb, boolean) = match inner {
            JoinSide::Stream(stream) => self.gen_retrieval(stream, &mut None, true, false)?,
            JoinSide::Built(rsb) => (rsb, None),
        };
        let outer_rsb = match outer {
            JoinSide::Stream(stream) => self.gen_retrieval(stream, &mut None, false, false)?.0,
            JoinSide::Built(rsb) => rsb,
        };
        let outer_rsb = self.gen_residual_boolean(outer_rsb);
        let unmatched = RecordSource::NestedLoopJoin { kind: JoinKind::Anti, args: vec![inner_rsb, outer_rsb], boolean };

        Ok(RecordSource::FullOuterJoin { first: Box::new(matched), second: Box::new(unmatched) })
    }
}
