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

//! Access-path optimizer.
//!
//! [`compile`] turns a query expression into a [`riverbed_common::RecordSource`] tree. One
//! [`Optimizer`] holds the working state of a single query expression; nested
//! expressions get their own optimizer sharing the same [`CompilerScratch`].

pub mod conjuncts;
pub mod decompose;
pub mod equalities;
pub mod equi_join;
pub mod join_order;
pub mod outer_join;
pub mod plan_check;
pub mod retrieval;
pub mod river;
pub mod sort;
pub mod sort_elimination;

mod driver;
#[cfg(test)]
pub(crate) mod testing;

pub use driver::{compile, compile_rse};

use riverbed_common::{BoolExpr, JoinType, StreamList};
use std::ops::Range;

use crate::catalog::MetadataProvider;
use crate::config::OptimizerConfig;
use crate::diagnostics::DiagnosticsSink;
use crate::planner::CostModel;
use crate::scratch::{CompilerScratch, ScratchOwner};
use conjuncts::{Conjunct, ConjunctTable};

/// Collaborators shared by every optimizer of one compilation.
#[derive(Clone, Copy)]
pub struct OptimizerEnv<'e> {
    pub cost_model: &'e dyn CostModel,
    pub metadata: &'e dyn MetadataProvider,
    pub diagnostics: &'e dyn DiagnosticsSink,
    pub config: &'e OptimizerConfig,
}

/// Working state for one query expression.
pub struct Optimizer<'a> {
    pub(crate) env: OptimizerEnv<'a>,
    pub(crate) csb: &'a mut CompilerScratch,
    pub(crate) conjuncts: ConjunctTable,
    /// Streams produced by sub-plans (aggregates, procedures, nested expressions).
    pub(crate) beds: StreamList,
    /// Streams whose record keys must survive a sort.
    pub(crate) key_streams: StreamList,
    pub(crate) local_streams: StreamList,
    /// Relation streams still waiting to be joined.
    pub(crate) compile_streams: StreamList,
    /// Relation streams whose index descriptors this optimizer bound.
    pub(crate) bound_streams: StreamList,
    pub(crate) outer_streams: StreamList,
    pub(crate) sub_streams: StreamList,
    pub(crate) favor_first_rows: bool,
    pub(crate) join_type: JoinType,
}

impl<'a> Optimizer<'a> {
    pub fn new(env: OptimizerEnv<'a>, csb: &'a mut CompilerScratch) -> Self {
        Self {
            env,
            csb,
            conjuncts: ConjunctTable::default(),
            beds: StreamList::new(),
            key_streams: StreamList::new(),
            local_streams: StreamList::new(),
            compile_streams: StreamList::new(),
            bound_streams: StreamList::new(),
            outer_streams: StreamList::new(),
            sub_streams: StreamList::new(),
            favor_first_rows: env.config.favor_first_rows,
            join_type: JoinType::Inner,
        }
    }

    pub fn conjuncts(&self) -> &ConjunctTable {
        &self.conjuncts
    }

    /// ANDs together every available conjunct in `range` that `accept` approves, marking each used.
    pub(crate) fn fold_conjuncts(&mut self, range: Range<usize>, mut accept: impl FnMut(&CompilerScratch, &Conjunct) -> bool) -> Option<BoolExpr> {
        let csb: &CompilerScratch = self.csb;
        let slots: Vec<usize> = self.conjuncts.slots(range).filter(|(_, conjunct)| conjunct.is_available() && accept(csb, conjunct)).map(|(slot, _)| slot).collect();

        let mut boolean = None;
        for slot in slots {
            self.conjuncts.mark_used(slot);
            if let Some(conjunct) = self.conjuncts.get(slot) {
                boolean = Some(BoolExpr::compose(boolean, conjunct.node.clone()));
            }
        }
        boolean
    }

    /// Base conjuncts computable with the current activation.
    pub(crate) fn fold_computable_base(&mut self) -> Option<BoolExpr> {
        let base = self.conjuncts.base_count();
        self.fold_conjuncts(0..base, |csb, conjunct| conjunct.node.computable(csb, None, false))
    }
}

impl ScratchOwner for Optimizer<'_> {
    fn scratch(&self) -> &CompilerScratch {
        self.csb
    }

    fn scratch_mut(&mut self) -> &mut CompilerScratch {
        self.csb
    }
}

impl Drop for Optimizer<'_> {
    fn drop(&mut self) {
        for &stream in &self.bound_streams {
            self.csb.get_mut(stream).indices = None;
        }
    }
}
