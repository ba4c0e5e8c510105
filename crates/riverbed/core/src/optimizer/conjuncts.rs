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

//! Conjunct side table.
//!
//! Predicates are kept in one ordered sequence partitioned into prefix
//! ranges: base conjuncts, then equalities distributed over inherited
//! predicates, then the inherited (parent) predicates, then the inherited
//! predicates that are only safe outside an outer join. Phases walk
//! "unused conjuncts up to boundary X" over this layout. Flags live here,
//! not on the predicates.

use riverbed_common::BoolExpr;
use std::ops::Range;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConjunctFlags {
    /// Folded into an operator.
    pub used: bool,
    /// Satisfied by an index lookup.
    pub matched: bool,
}

#[derive(Debug, Clone)]
pub struct Conjunct {
    pub node: BoolExpr,
    pub flags: ConjunctFlags,
}

impl Conjunct {
    pub fn new(node: BoolExpr) -> Self {
        Self { node, flags: ConjunctFlags::default() }
    }

    pub fn is_residual(&self) -> bool {
        self.node.is_residual()
    }

    /// Not folded yet and allowed outside a plain filter.
    pub fn is_available(&self) -> bool {
        !self.flags.used && !self.is_residual()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConjunctTable {
    items: Vec<Conjunct>,
    base: usize,
    base_parent: usize,
    base_missing: usize,
}

impl ConjunctTable {
    pub fn new(base: Vec<BoolExpr>, distributed: Vec<BoolExpr>, parent: Vec<BoolExpr>, missing: Vec<BoolExpr>) -> Self {
        let base_count = base.len();
        let base_parent = base_count + distributed.len();
        let base_missing = base_parent + parent.len();
        let items = base.into_iter().chain(distributed).chain(parent).chain(missing).map(Conjunct::new).collect();
        Self { items, base: base_count, base_parent, base_missing }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// End of the base range.
    pub fn base_count(&self) -> usize {
        self.base
    }

    /// End of base plus distributed equalities.
    pub fn base_parent_count(&self) -> usize {
        self.base_parent
    }

    /// End of base, distributed and parent conjuncts.
    pub fn base_missing_count(&self) -> usize {
        self.base_missing
    }

    pub fn get(&self, slot: usize) -> Option<&Conjunct> {
        self.items.get(slot)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Conjunct)> {
        self.items.iter().enumerate()
    }

    pub fn slots(&self, range: Range<usize>) -> impl Iterator<Item = (usize, &Conjunct)> {
        let end = range.end.min(self.items.len());
        let start = range.start.min(end);
        self.items[start..end].iter().enumerate().map(move |(i, c)| (start + i, c))
    }

    pub fn mark_used(&mut self, slot: usize) {
        if let Some(conjunct) = self.items.get_mut(slot) {
            conjunct.flags.used = true;
        }
    }

    pub fn mark_matched(&mut self, slot: usize) {
        if let Some(conjunct) = self.items.get_mut(slot) {
            conjunct.flags.matched = true;
        }
    }

    pub fn is_used(&self, slot: usize) -> bool {
        self.items.get(slot).is_some_and(|c| c.flags.used)
    }

    /// Re-arms every used conjunct for another pass.
    ///
    /// Operators own copies of the predicates they fold, so clearing the
    /// flags is enough to let the same predicates be matched again.
    pub fn rearm_used(&mut self) -> usize {
        let mut count = 0;
        for conjunct in self.items.iter_mut().filter(|c| c.flags.used) {
            conjunct.flags = ConjunctFlags::default();
            count += 1;
        }
        count
    }

    pub fn nodes(&self) -> impl Iterator<Item = &BoolExpr> {
        self.items.iter().map(|c| &c.node)
    }
}
