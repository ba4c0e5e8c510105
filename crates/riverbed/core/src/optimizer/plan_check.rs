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

//! User plan enforcement on the index descriptors of a stream.

use riverbed_common::{AccessKind, PlanConstraint};

use crate::catalog::IndexDescriptor;
use crate::error::{OptimizerError, Result};
use crate::scratch::StreamScratch;

const SAME_SELECTIVITY: f64 = 0.00001;

/// Marks the indices of `tail` that its plan retrieval excludes or asks to navigate.
///
/// An index the plan does not list is excluded from inversions. The first
/// index of a navigational access is marked for navigation.
pub fn mark_indices(tail: &mut StreamScratch, relation_id: u16) -> Result<()> {
    let Some(PlanConstraint::Retrieve { access, .. }) = &tail.plan else {
        return Ok(());
    };
    let Some(indices) = tail.indices.as_mut() else {
        return Ok(());
    };

    for index in indices.iter_mut() {
        let Some(access) = access else {
            index.flags.plan_dont_use = true;
            continue;
        };

        let mut listed = false;
        for (position, item) in access.items.iter().enumerate() {
            if item.relation_id != relation_id {
                return Err(OptimizerError::IndexUnused(item.index_name.clone()));
            }
            if index.id != item.index_id {
                continue;
            }
            if access.kind == AccessKind::Navigational && position == 0 {
                index.flags.plan_navigate = true;
            } else {
                listed = true;
                break;
            }
        }
        if !listed {
            index.flags.plan_dont_use = true;
        }
    }
    Ok(())
}

/// Fails unless every index the plan asked for was used the way it asked.
pub fn check_indices(tail: &StreamScratch) -> Result<()> {
    let Some(PlanConstraint::Retrieve { access, .. }) = &tail.plan else {
        return Ok(());
    };

    let indices = tail.indices.as_deref().unwrap_or_default();
    if indices.is_empty()
        && let Some(item) = access.as_ref().and_then(|access| access.items.first())
    {
        return Err(OptimizerError::IndexUnused(item.index_name.clone()));
    }

    for index in indices {
        let flags = index.flags;
        if !(flags.plan_dont_use || flags.used) || (flags.plan_navigate && !flags.navigated) {
            return Err(OptimizerError::IndexUnused(index.name.clone()));
        }
    }
    Ok(())
}

/// Orders indices from most to least selective, ascending before descending on a tie.
pub fn sort_indices_by_selectivity(indices: &mut Vec<IndexDescriptor>) {
    if indices.len() < 2 {
        return;
    }

    let mut taken = vec![false; indices.len()];
    let mut order = Vec::with_capacity(indices.len());
    for _ in 0..indices.len() {
        let mut best = 1.0;
        let mut selected = None;
        for (i, index) in indices.iter().enumerate() {
            let same = (best - index.selectivity).abs() <= SAME_SELECTIVITY;
            if !taken[i] && index.selectivity <= best && !(index.descending && same) {
                best = index.selectivity;
                selected = Some(i);
            }
        }

        let Some(i) = selected.or_else(|| taken.iter().position(|&t| !t)) else {
            break;
        };
        taken[i] = true;
        order.push(i);
    }

    let mut slots: Vec<Option<IndexDescriptor>> = indices.drain(..).map(Some).collect();
    indices.extend(order.into_iter().filter_map(|i| slots[i].take()));
}
