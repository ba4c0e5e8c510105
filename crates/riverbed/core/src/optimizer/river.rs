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

//! Rivers: partial results covering a set of streams.

use riverbed_common::{JoinKind, RecordSource, SortedStreamList, StreamId, StreamList, StreamStates};
use tracing::warn;

use super::{Optimizer, OptimizerEnv};
use crate::error::{OptimizerError, Result};
use crate::scratch::{CompilerScratch, ScratchOwner, StreamStateHolder};

#[derive(Debug, Clone)]
pub struct River {
    pub rsb: RecordSource,
    pub streams: StreamList,
    /// Streams outside the river its producer reads from.
    pub dependencies: SortedStreamList,
}

impl River {
    pub fn new(rsb: RecordSource, streams: StreamList) -> Self {
        Self { rsb, streams, dependencies: SortedStreamList::new() }
    }

    pub fn with_dependencies(mut self, dependencies: SortedStreamList) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// River over the streams of `rivers`, produced by `rsb`.
    pub fn compose(rsb: RecordSource, rivers: &[River], max_streams: usize) -> Result<River> {
        let (streams, dependencies) = union(rivers, max_streams)?;
        Ok(River { rsb, streams, dependencies })
    }

    pub fn activate(&self, csb: &mut CompilerScratch) {
        for &stream in &self.streams {
            csb.activate(stream);
        }
    }

    pub fn deactivate(&self, csb: &mut CompilerScratch) {
        for &stream in &self.streams {
            csb.deactivate(stream);
        }
    }

    pub fn contains(&self, stream: StreamId) -> bool {
        self.streams.contains(&stream)
    }

    /// Every stream of an expression belongs to this river, and there is at least one.
    pub fn is_referenced(&self, streams: &SortedStreamList) -> bool {
        !streams.is_empty() && streams.iter().all(|s| self.contains(*s))
    }

    pub fn is_computable(&self, states: &dyn StreamStates) -> bool {
        self.dependencies.iter().all(|&s| states.is_active(s))
    }

    /// Filters the river by every base conjunct computable from its own streams alone.
    pub fn apply_local_boolean(self, opt: &mut Optimizer<'_>) -> River {
        let boolean = {
            let mut holder = StreamStateHolder::all(opt);
            holder.deactivate_all();
            self.activate(holder.scratch_mut());
            holder.fold_computable_base()
        };
        let River { rsb, streams, dependencies } = self;
        River { rsb: RecordSource::filter(rsb, boolean), streams, dependencies }
    }
}

fn union(rivers: &[River], max_streams: usize) -> Result<(StreamList, SortedStreamList)> {
    let mut streams = StreamList::new();
    let mut dependencies = SortedStreamList::new();
    for river in rivers {
        let count = streams.len() + river.streams.len();
        if count >= max_streams {
            return Err(OptimizerError::TooManyContexts { count, limit: max_streams });
        }
        streams.extend_from_slice(&river.streams);
        dependencies.extend(river.dependencies.iter().copied());
    }
    Ok((streams, dependencies))
}

/// Joins `rivers` with a nested loop, ordered so each river's inputs are available
/// before it runs.
pub fn cross_join(env: OptimizerEnv<'_>, csb: &mut CompilerScratch, mut rivers: Vec<River>) -> Result<River> {
    if rivers.len() == 1
        && let Some(river) = rivers.pop()
    {
        return Ok(river);
    }

    let (streams, dependencies) = union(&rivers, env.config.max_streams)?;
    let mut holder = StreamStateHolder::new(csb, &streams);
    let mut ordered: Vec<RecordSource> = Vec::with_capacity(rivers.len());
    while !rivers.is_empty() {
        let mut placed = None;
        for (i, candidate) in rivers.iter().enumerate() {
            candidate.activate(holder.scratch_mut());
            if candidate.is_computable(holder.scratch()) {
                placed = Some(i);
                break;
            }
            candidate.deactivate(holder.scratch_mut());
        }
        match placed {
            Some(i) => ordered.push(rivers.remove(i).rsb),
            None => break,
        }
    }

    if !rivers.is_empty() {
        warn!(remaining = rivers.len(), "cross join ordering stalled, keeping input order");
        env.diagnostics.record_decision("cross_join", "dependency ordering stalled; remaining rivers kept in input order");
        for (position, stalled) in rivers.into_iter().enumerate() {
            let position = position.min(ordered.len());
            ordered.insert(position, stalled.rsb);
        }
    }
    drop(holder);

    let rsb = RecordSource::NestedLoopJoin { kind: JoinKind::Inner, args: ordered, boolean: None };
    Ok(River { rsb, streams, dependencies })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingDiagnostics;
    use crate::optimizer::testing::{scan, scratch, TestEnv};

    #[test]
    fn test_compose_respects_stream_limit() {
        let rivers = vec![River::new(scan(0), vec![0, 1]), River::new(scan(2), vec![2])];
        assert!(River::compose(scan(0), &rivers, 4).is_ok());
        let err = River::compose(scan(0), &rivers, 3).unwrap_err();
        assert!(matches!(err, OptimizerError::TooManyContexts { count: 3, limit: 3 }));
    }

    #[test]
    fn test_cross_join_places_dependencies_first() {
        let test = TestEnv::new();
        let mut csb = scratch(3);
        let dependent = River::new(scan(0), vec![0]).with_dependencies([1].into_iter().collect());
        let rivers = vec![dependent, River::new(scan(1), vec![1]), River::new(scan(2), vec![2])];

        let river = cross_join(test.env(), &mut csb, rivers).unwrap();
        assert_eq!(river.streams, vec![0, 1, 2]);
        assert_eq!(river.rsb.used_streams(), vec![1, 0, 2]);
        assert!(csb.active_streams().is_empty());
    }

    #[test]
    fn test_cross_join_single_river_unwrapped() {
        let test = TestEnv::new();
        let mut csb = scratch(1);
        let river = cross_join(test.env(), &mut csb, vec![River::new(scan(0), vec![0])]).unwrap();
        assert_eq!(river.rsb, scan(0));
    }

    #[test]
    fn test_cross_join_stall_keeps_input_order() {
        let diagnostics = CollectingDiagnostics::new();
        let test = TestEnv::new();
        let mut csb = scratch(3);
        let blocked = River::new(scan(0), vec![0]).with_dependencies([7].into_iter().collect());
        let rivers = vec![blocked, River::new(scan(1), vec![1])];

        let river = cross_join(test.env_with(&diagnostics), &mut csb, rivers).unwrap();
        assert_eq!(river.rsb.used_streams(), vec![0, 1]);
        assert_eq!(diagnostics.decisions("cross_join").len(), 1);
    }
}
