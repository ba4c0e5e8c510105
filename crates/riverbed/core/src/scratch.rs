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

//! Per-compilation stream scratch state.
//!
//! [`CompilerScratch`] holds one entry per stream of the statement being
//! compiled. Nested query expressions are compiled recursively against the
//! same scratch, so every phase that changes activation restores it through
//! a [`StreamStateHolder`].

use riverbed_common::{Desc, FieldId, FieldRef, Format, FormatSource, PlanConstraint, StreamId, StreamStates};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ops::{Deref, DerefMut};

use crate::catalog::{IndexDescriptor, RelationDescriptor};

/// Stream as declared by the query compiler.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamDefinition {
    pub stream: StreamId,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub relation: Option<RelationDescriptor>,
    #[serde(default)]
    pub format: Format,
    /// Fields referenced anywhere in the statement.
    #[serde(default)]
    pub fields: BTreeSet<FieldId>,
    #[serde(default)]
    pub sub_stream: bool,
}

impl StreamDefinition {
    pub fn relation(stream: StreamId, relation: RelationDescriptor, format: Format) -> Self {
        Self { stream, alias: None, relation: Some(relation), format, fields: BTreeSet::new(), sub_stream: false }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_fields(mut self, fields: impl IntoIterator<Item = FieldId>) -> Self {
        self.fields.extend(fields);
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamFlags {
    pub active: bool,
    pub sub_stream: bool,
    /// Some filter on this stream is not matched by an index.
    pub unmatched: bool,
    /// Rows are locked for update.
    pub update: bool,
}

#[derive(Debug, Clone, Default)]
pub struct StreamScratch {
    pub alias: Option<String>,
    pub relation: Option<RelationDescriptor>,
    pub format: Format,
    pub fields: BTreeSet<FieldId>,
    pub flags: StreamFlags,
    /// Index descriptors bound while the stream is being compiled.
    pub indices: Option<Vec<IndexDescriptor>>,
    pub plan: Option<PlanConstraint>,
    pub cardinality: f64,
}

impl StreamScratch {
    pub fn alias(&self) -> String {
        match (&self.alias, &self.relation) {
            (Some(alias), _) => alias.clone(),
            (None, Some(relation)) => relation.name.clone(),
            (None, None) => String::new(),
        }
    }

    pub fn relation_name(&self) -> String {
        self.relation.as_ref().map(|r| r.name.clone()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompilerScratch {
    streams: Vec<StreamScratch>,
}

impl CompilerScratch {
    pub fn new(definitions: impl IntoIterator<Item = StreamDefinition>) -> Self {
        let mut scratch = Self::default();
        for def in definitions {
            let tail = scratch.get_mut(def.stream);
            tail.alias = def.alias;
            tail.relation = def.relation;
            tail.format = def.format;
            tail.fields = def.fields;
            tail.flags.sub_stream = def.sub_stream;
        }
        scratch
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    pub fn get(&self, stream: StreamId) -> Option<&StreamScratch> {
        self.streams.get(stream)
    }

    pub fn get_mut(&mut self, stream: StreamId) -> &mut StreamScratch {
        if stream >= self.streams.len() {
            self.streams.resize_with(stream + 1, StreamScratch::default);
        }
        &mut self.streams[stream]
    }

    pub fn activate(&mut self, stream: StreamId) {
        self.get_mut(stream).flags.active = true;
    }

    pub fn deactivate(&mut self, stream: StreamId) {
        if let Some(tail) = self.streams.get_mut(stream) {
            tail.flags.active = false;
        }
    }

    pub fn set_active(&mut self, stream: StreamId, active: bool) {
        if active { self.activate(stream) } else { self.deactivate(stream) }
    }

    pub fn active_streams(&self) -> Vec<StreamId> {
        (0..self.streams.len()).filter(|&s| self.is_active(s)).collect()
    }

    pub fn mark_field(&mut self, field: FieldRef) {
        self.get_mut(field.stream).fields.insert(field.field);
    }

    pub fn alias(&self, stream: StreamId) -> String {
        self.get(stream).map(StreamScratch::alias).unwrap_or_else(|| format!("#{stream}"))
    }

    /// Hands each retrieval of a user plan to its stream.
    pub fn assign_plan(&mut self, plan: &PlanConstraint) {
        for retrieval in plan.retrievals() {
            if let Some(stream) = retrieval.stream() {
                self.get_mut(stream).plan = Some(retrieval.clone());
            }
        }
    }

    pub fn indices(&self, stream: StreamId) -> &[IndexDescriptor] {
        self.get(stream).and_then(|tail| tail.indices.as_deref()).unwrap_or(&[])
    }
}

impl StreamStates for CompilerScratch {
    fn is_active(&self, stream: StreamId) -> bool {
        self.get(stream).is_some_and(|tail| tail.flags.active)
    }

    fn is_sub_stream(&self, stream: StreamId) -> bool {
        self.get(stream).is_some_and(|tail| tail.flags.sub_stream)
    }
}

impl FormatSource for CompilerScratch {
    fn field_desc(&self, field: FieldRef) -> Option<Desc> {
        self.get(field.stream)?.format.field(field.field).cloned()
    }
}

/// Anything that owns, or borrows mutably, the compilation scratch.
pub trait ScratchOwner {
    fn scratch(&self) -> &CompilerScratch;
    fn scratch_mut(&mut self) -> &mut CompilerScratch;
}

impl ScratchOwner for CompilerScratch {
    fn scratch(&self) -> &CompilerScratch {
        self
    }

    fn scratch_mut(&mut self) -> &mut CompilerScratch {
        self
    }
}

/// Saves the activation of a set of streams and restores it when dropped.
///
/// The holder dereferences to its owner, so the guarded code keeps working
/// through it while the guard is alive.
pub struct StreamStateHolder<'g, T: ScratchOwner + ?Sized> {
    owner: &'g mut T,
    saved: Vec<(StreamId, bool)>,
}

impl<'g, T: ScratchOwner + ?Sized> StreamStateHolder<'g, T> {
    pub fn new(owner: &'g mut T, streams: &[StreamId]) -> Self {
        let saved = streams.iter().map(|&s| (s, owner.scratch().is_active(s))).collect();
        Self { owner, saved }
    }

    /// Guards every stream known to the scratch.
    pub fn all(owner: &'g mut T) -> Self {
        let streams: Vec<StreamId> = (0..owner.scratch().stream_count()).collect();
        Self::new(owner, &streams)
    }

    pub fn activate_all(&mut self) {
        for &(stream, _) in &self.saved {
            self.owner.scratch_mut().activate(stream);
        }
    }

    pub fn deactivate_all(&mut self) {
        for &(stream, _) in &self.saved {
            self.owner.scratch_mut().deactivate(stream);
        }
    }
}

impl<T: ScratchOwner + ?Sized> Deref for StreamStateHolder<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.owner
    }
}

impl<T: ScratchOwner + ?Sized> DerefMut for StreamStateHolder<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.owner
    }
}

impl<T: ScratchOwner + ?Sized> Drop for StreamStateHolder<'_, T> {
    fn drop(&mut self) {
        for &(stream, active) in &self.saved {
            self.owner.scratch_mut().set_active(stream, active);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::RelationDescriptor;
    use riverbed_common::DType;

    fn scratch(count: usize) -> CompilerScratch {
        CompilerScratch::new((0..count).map(|s| StreamDefinition::relation(s, RelationDescriptor::persistent(s as u16, format!("T{s}")), Format::new(vec![Desc::of(DType::Long)]))))
    }

    #[test]
    fn test_holder_restores_on_drop() {
        let mut csb = scratch(3);
        csb.activate(0);
        {
            let mut holder = StreamStateHolder::new(&mut csb, &[0, 1]);
            holder.deactivate_all();
            holder.activate(1);
            assert!(!holder.is_active(0));
            assert!(holder.is_active(1));
        }
        assert!(csb.is_active(0));
        assert!(!csb.is_active(1));
    }

    #[test]
    fn test_holder_restores_on_error_path() {
        fn failing(csb: &mut CompilerScratch) -> Result<(), String> {
            let mut holder = StreamStateHolder::all(csb);
            holder.activate_all();
            Err("limit exceeded".to_string())
        }

        let mut csb = scratch(2);
        assert!(failing(&mut csb).is_err());
        assert!(csb.active_streams().is_empty());
    }

    #[test]
    fn test_format_lookup_and_alias() {
        let csb = scratch(2);
        assert_eq!(csb.field_desc(FieldRef::new(1, 0)).map(|d| d.dtype), Some(DType::Long));
        assert!(csb.field_desc(FieldRef::new(1, 5)).is_none());
        assert_eq!(csb.alias(1), "T1");
        assert_eq!(csb.alias(9), "#9");
    }
}
