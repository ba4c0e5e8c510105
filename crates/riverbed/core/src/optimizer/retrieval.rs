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

//! Access path for a single stream.

use riverbed_common::{BoolExpr, Inversion, RecordSource, ScanTarget, SortClause, StreamId};
use tracing::debug;

use super::Optimizer;
use crate::catalog::RelationKind;
use crate::error::{OptimizerError, Result};
use crate::planner::{NavigationalScan, RetrievalContext};

impl Optimizer<'_> {
    /// Builds the scan for `stream` and folds the conjuncts it can evaluate.
    ///
    /// A navigational index satisfying `sort` consumes it. For the outer side
    /// of an outer join the second value is the boolean that must be evaluated
    /// by the join itself rather than below it.
    pub fn gen_retrieval(&mut self, stream: StreamId, sort: &mut Option<SortClause>, outer: bool, inner: bool) -> Result<(RecordSource, Option<BoolExpr>)> {
        let relation = self.csb.get(stream).and_then(|tail| tail.relation.clone()).ok_or(OptimizerError::UnboundStream(stream))?;
        let target = ScanTarget { stream, alias: self.csb.alias(stream), relation: relation.name.clone() };
        self.csb.activate(stream);

        let mut rsb = None;
        let mut inversion = None;
        let mut condition = None;

        match &relation.kind {
            RelationKind::External { .. } => rsb = Some(RecordSource::ExternalTableScan(target.clone())),
            RelationKind::Virtual(table) => rsb = Some(RecordSource::VirtualTableScan { target: target.clone(), table: *table }),
            RelationKind::Persistent | RelationKind::View => {
                let estimate = {
                    let mut ctx = RetrievalContext::new(self.csb, &self.conjuncts, stream);
                    ctx.outer = outer;
                    ctx.inner = inner;
                    ctx.sort = sort.as_ref();
                    self.env.cost_model.estimate(&ctx)
                };
                let candidate = estimate.candidate;
                self.env.diagnostics.record_candidate(stream, &describe(&candidate.inversion, &estimate.navigation), candidate.cost);

                for &slot in &candidate.matched {
                    self.conjuncts.mark_matched(slot);
                }
                if let Some(indices) = self.csb.get_mut(stream).indices.as_mut() {
                    for index in indices.iter_mut().filter(|index| candidate.used_indices.contains(&index.id)) {
                        index.flags.used = true;
                    }
                }

                inversion = candidate.inversion;
                condition = candidate.condition;
                if inversion.is_some()
                    && let Some(guard) = &condition
                    && !guard.computable(&*self.csb, Some(stream), false)
                {
                    debug!(stream, "dropping inversion with a guard that is not computable yet");
                    inversion = None;
                    condition = None;
                }

                if let Some(navigation) = estimate.navigation {
                    *sort = None;
                    if let Some(indices) = self.csb.get_mut(stream).indices.as_mut() {
                        for index in indices.iter_mut().filter(|index| index.id == navigation.index_id) {
                            index.flags.navigated = true;
                        }
                    }
                    rsb = Some(RecordSource::IndexTableScan { target: target.clone(), index_name: navigation.index_name, inversion: inversion.clone(), condition: condition.clone() });
                }
            }
        }

        let boundary = if outer {
            let base = self.conjuncts.base_count();
            self.fold_conjuncts(0..base, |csb, conjunct| conjunct.node.computable(csb, None, false))
        } else {
            None
        };

        let start = if outer { self.conjuncts.base_parent_count() } else { 0 };
        let end = if inner { self.conjuncts.base_missing_count() } else { self.conjuncts.len() };
        let mut boolean = None;
        let mut unmatched = false;
        for slot in start..end {
            let Some(conjunct) = self.conjuncts.get(slot) else {
                break;
            };
            let node = &conjunct.node;
            if !conjunct.is_available() || !node.computable(&*self.csb, None, false) {
                continue;
            }
            let local = match inversion {
                Some(_) => node.find_stream(stream),
                None => node.computable(&*self.csb, Some(stream), true),
            };
            if !local {
                continue;
            }
            let matched = conjunct.flags.matched;
            boolean = Some(BoolExpr::compose(boolean, node.clone()));
            self.conjuncts.mark_used(slot);
            if !outer && !matched {
                unmatched = true;
            }
        }

        let rsb = match rsb {
            Some(rsb) => rsb,
            None => match (inversion, condition) {
                (Some(inversion), Some(condition)) => RecordSource::Conditional {
                    first: Box::new(RecordSource::FullTableScan(target.clone())),
                    second: Box::new(RecordSource::BitmapTableScan { target, inversion }),
                    condition,
                },
                (Some(inversion), None) => RecordSource::BitmapTableScan { target, inversion },
                (None, _) => {
                    if boolean.is_some() {
                        unmatched = true;
                    }
                    RecordSource::FullTableScan(target)
                }
            },
        };
        if unmatched {
            self.csb.get_mut(stream).flags.unmatched = true;
        }

        Ok((RecordSource::filter(rsb, boolean), boundary))
    }

    /// Wraps `rsb` in a filter of every base conjunct not folded anywhere yet, residual ones included.
    pub fn gen_residual_boolean(&mut self, rsb: RecordSource) -> RecordSource {
        let base = self.conjuncts.base_count();
        let slots: Vec<usize> = self.conjuncts.slots(0..base).filter(|(_, conjunct)| !conjunct.flags.used).map(|(slot, _)| slot).collect();
        let mut boolean = None;
        for slot in slots {
            self.conjuncts.mark_used(slot);
            if let Some(conjunct) = self.conjuncts.get(slot) {
                boolean = Some(BoolExpr::compose(boolean, conjunct.node.clone()));
            }
        }
        RecordSource::filter(rsb, boolean)
    }
}

fn describe(inversion: &Option<Inversion>, navigation: &Option<NavigationalScan>) -> String {
    let mut text = match inversion {
        Some(inversion) => format!("indices {}", inversion.index_names().join(", ")),
        None => "natural".to_string(),
    };
    if let Some(navigation) = navigation {
        text.push_str(&format!(", order {}", navigation.index_name));
    }
    text
}
