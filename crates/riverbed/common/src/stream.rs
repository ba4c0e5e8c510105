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

//! Stream identifiers and activation queries.

use std::collections::BTreeSet;

/// One instance of a relation or sub-plan inside a query expression.
pub type StreamId = usize;

/// Field position inside a stream's record format.
pub type FieldId = u16;

pub type StreamList = Vec<StreamId>;
pub type SortedStreamList = BTreeSet<StreamId>;

/// Answers whether a stream's values are visible while an expression is evaluated.
pub trait StreamStates {
    fn is_active(&self, stream: StreamId) -> bool;

    /// Streams of a sub-query that are always visible to the enclosing expression.
    fn is_sub_stream(&self, _stream: StreamId) -> bool {
        false
    }
}

/// Activation view that treats `extra` as active on top of `base`.
pub struct ActivatedWith<'a, S: StreamStates + ?Sized> {
    pub base: &'a S,
    pub extra: &'a [StreamId],
}

impl<'a, S: StreamStates + ?Sized> ActivatedWith<'a, S> {
    pub fn new(base: &'a S, extra: &'a [StreamId]) -> Self {
        Self { base, extra }
    }
}

impl<S: StreamStates + ?Sized> StreamStates for ActivatedWith<'_, S> {
    fn is_active(&self, stream: StreamId) -> bool {
        self.extra.contains(&stream) || self.base.is_active(stream)
    }

    fn is_sub_stream(&self, stream: StreamId) -> bool {
        self.base.is_sub_stream(stream)
    }
}

impl StreamStates for SortedStreamList {
    fn is_active(&self, stream: StreamId) -> bool {
        self.contains(&stream)
    }
}
