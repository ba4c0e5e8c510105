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

//! Hash and merge joins between rivers linked by equalities.

use riverbed_common::{binary_comparable, CmpOp, RecordSource, SortClause, ValueExpr};
use tracing::debug;

use super::Optimizer;
use super::river::River;
use super::sort::{gen_sort, SortRequest};
use crate::error::Result;
use crate::scratch::{ScratchOwner, StreamStateHolder};

/// Join keys, one slot per river; `None` where the river does not take part.
type EquiClass = Vec<Option<ValueExpr>>;

impl Optimizer<'_> {
    /// Joins the rivers sharing the widest class of cross-river equalities.
    ///
    /// Returns false, leaving `rivers` untouched, when there are fewer than two
    /// rivers or no usable equality between them.
    pub fn gen_equi_join(&mut self, rivers: &mut Vec<River>) -> Result<bool> {
        let count = rivers.len();
        if count < 2 {
            return Ok(false);
        }

        let classes = self.equi_classes(rivers);
        let Some((selected, mask)) = select_classes(&classes) else {
            return Ok(false);
        };

        let mut holder = StreamStateHolder::all(self);
        holder.deactivate_all();

        let mut lowest = usize::MAX;
        let mut merged: Vec<River> = Vec::new();
        let mut args: Vec<RecordSource> = Vec::new();
        let mut keys: Vec<Vec<ValueExpr>> = Vec::new();
        let prefer_merge = holder.env.config.prefer_merge_join;

        let mut number = 0;
        let mut kept = Vec::with_capacity(rivers.len());
        for river in rivers.drain(..) {
            if !mask[number] {
                kept.push(river);
                number += 1;
                continue;
            }
            lowest = lowest.min(number);

            let river = river.apply_local_boolean(&mut holder);
            let key: Vec<ValueExpr> = selected.iter().filter_map(|class| class[number].clone()).collect();
            number += 1;

            if prefer_merge {
                let clause = SortClause::ascending(key.clone());
                let request = SortRequest::new(&river.streams, &clause).refetch(holder.favor_first_rows);
                let sorted = gen_sort(holder.scratch(), holder.env.config, request, river.rsb.clone())?;
                args.push(sorted);
                keys.push(key);
            } else {
                // Later rivers are smaller; they become the hashed inner inputs.
                args.insert(0, river.rsb.clone());
                keys.insert(0, key);
            }
            merged.push(river);
        }
        *rivers = kept;

        let rsb = if prefer_merge { RecordSource::MergeJoin { args, keys } } else { RecordSource::HashJoin { args, keys } };

        for river in &merged {
            river.activate(holder.scratch_mut());
        }
        let boolean = holder.fold_computable_base();
        let rsb = RecordSource::filter(rsb, boolean);

        let max_streams = holder.env.config.max_streams;
        drop(holder);

        let river = River::compose(rsb, &merged, max_streams)?;
        debug!(streams = ?river.streams, "equi-join formed");
        self.env.diagnostics.record_decision("equi_join", &format!("joined {} rivers over streams {:?}", merged.len(), river.streams));
        rivers.insert(lowest.min(rivers.len()), river);
        Ok(true)
    }

    fn equi_classes(&self, rivers: &[River]) -> Vec<EquiClass> {
        let count = rivers.len();
        let mut classes: Vec<EquiClass> = Vec::new();

        for (_, conjunct) in self.conjuncts.slots(0..self.conjuncts.base_count()) {
            if conjunct.flags.used {
                continue;
            }
            let Some(cmp) = conjunct.node.as_comparison().filter(|cmp| matches!(cmp.op, CmpOp::Eql | CmpOp::Equiv)) else {
                continue;
            };

            let desc1 = cmp.arg1.desc(&*self.csb);
            let desc2 = cmp.arg2.desc(&*self.csb);
            let Some(result) = binary_comparable(&desc1, &desc2) else {
                continue;
            };
            let mut node1 = if result == desc1 { cmp.arg1.clone() } else { ValueExpr::cast(cmp.arg1.clone(), result.clone()) };
            let mut node2 = if result == desc2 { cmp.arg2.clone() } else { ValueExpr::cast(cmp.arg2.clone(), result) };

            for number1 in 0..count {
                let river1 = &rivers[number1];
                if !river1.is_referenced(&node1.streams()) {
                    if !river1.is_referenced(&node2.streams()) {
                        continue;
                    }
                    std::mem::swap(&mut node1, &mut node2);
                }

                for number2 in number1 + 1..count {
                    if !rivers[number2].is_referenced(&node2.streams()) {
                        continue;
                    }
                    let existing = classes.iter().position(|class| {
                        class[number1].as_ref().is_some_and(|member| member.equivalent(&node1)) || class[number2].as_ref().is_some_and(|member| member.equivalent(&node2))
                    });
                    let class = match existing {
                        Some(position) => &mut classes[position],
                        None => {
                            classes.push(vec![None; count]);
                            let last = classes.len() - 1;
                            &mut classes[last]
                        }
                    };
                    class[number1] = Some(node1.clone());
                    class[number2] = Some(node2.clone());
                }
            }
        }
        classes
    }
}

/// Classes touching the most rivers, plus every class covering the same rivers.
fn select_classes(classes: &[EquiClass]) -> Option<(Vec<&EquiClass>, Vec<bool>)> {
    let mut best = 0;
    let mut selected: Vec<&EquiClass> = Vec::new();
    let mut mask: Vec<bool> = Vec::new();

    for class in classes {
        let class_mask: Vec<bool> = class.iter().map(Option::is_some).collect();
        let rivers = class_mask.iter().filter(|&&present| present).count();
        if rivers > best {
            best = rivers;
            selected.clear();
            selected.push(class);
            mask = class_mask;
        } else if mask.iter().zip(&class_mask).all(|(&wanted, &present)| !wanted || present) {
            selected.push(class);
        }
    }

    (best > 0).then_some((selected, mask))
}
