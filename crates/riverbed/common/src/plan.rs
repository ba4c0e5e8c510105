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

//! Executable plan trees.
//!
//! A [`RecordSource`] is built bottom-up by the optimizer and never changes
//! afterwards. Each operator owns its inputs; streams are referenced by id.

use serde::{Deserialize, Serialize};

use crate::expr::{BoolExpr, ValueExpr};
use crate::rse::MapNode;
use crate::sort_map::{AggregateSort, SortMap};
use crate::stream::{StreamId, StreamList};

/// In-memory system tables with dedicated scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VirtualTable {
    GlobalMapping,
    Users,
    DbCreators,
    TimeZones,
    Config,
    Keywords,
    Monitoring,
}

/// Scanned relation: the stream, its alias and the relation name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanTarget {
    pub stream: StreamId,
    pub alias: String,
    pub relation: String,
}

/// Index lookup matching a set of predicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRetrieval {
    pub index_id: u16,
    pub index_name: String,
    pub predicates: Vec<BoolExpr>,
}

/// Index-based record-id set for one stream, possibly combining several indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Inversion {
    Index(IndexRetrieval),
    And(Box<Inversion>, Box<Inversion>),
    Or(Box<Inversion>, Box<Inversion>),
    DbKey(ValueExpr),
}

impl Inversion {
    pub fn and(left: Inversion, right: Inversion) -> Self {
        Inversion::And(Box::new(left), Box::new(right))
    }

    pub fn index_names(&self) -> Vec<&str> {
        match self {
            Inversion::Index(retrieval) => vec![retrieval.index_name.as_str()],
            Inversion::And(a, b) | Inversion::Or(a, b) => {
                let mut names = a.index_names();
                names.extend(b.index_names());
                names
            }
            Inversion::DbKey(_) => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinKind {
    Inner,
    Outer,
    Anti,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecordSource {
    FullTableScan(ScanTarget),
    BitmapTableScan { target: ScanTarget, inversion: Inversion },
    /// Index walk in key order, optionally narrowed by an inversion.
    IndexTableScan { target: ScanTarget, index_name: String, inversion: Option<Inversion>, condition: Option<BoolExpr> },
    ExternalTableScan(ScanTarget),
    VirtualTableScan { target: ScanTarget, table: VirtualTable },
    ProcedureScan { stream: StreamId, alias: String, procedure: String, inputs: Vec<ValueExpr> },
    /// Runtime choice: `first` when `condition` is false, `second` otherwise.
    Conditional { first: Box<RecordSource>, second: Box<RecordSource>, condition: BoolExpr },
    Filter { input: Box<RecordSource>, boolean: BoolExpr },
    NestedLoopJoin { kind: JoinKind, args: Vec<RecordSource>, boolean: Option<BoolExpr> },
    FullOuterJoin { first: Box<RecordSource>, second: Box<RecordSource> },
    HashJoin { args: Vec<RecordSource>, keys: Vec<Vec<ValueExpr>> },
    MergeJoin { args: Vec<RecordSource>, keys: Vec<Vec<ValueExpr>> },
    Sort { input: Box<RecordSource>, map: SortMap },
    Aggregate { stream: StreamId, input: Box<RecordSource>, group: Option<Vec<ValueExpr>>, map: MapNode, distinct_sorts: Vec<AggregateSort> },
    Skip { input: Box<RecordSource>, count: ValueExpr },
    First { input: Box<RecordSource>, count: ValueExpr },
    Lock { input: Box<RecordSource> },
}

impl RecordSource {
    pub fn filter(input: RecordSource, boolean: Option<BoolExpr>) -> RecordSource {
        match boolean {
            Some(boolean) => RecordSource::Filter { input: Box::new(input), boolean },
            None => input,
        }
    }

    pub fn inputs(&self) -> Vec<&RecordSource> {
        match self {
            RecordSource::FullTableScan(_)
            | RecordSource::BitmapTableScan { .. }
            | RecordSource::IndexTableScan { .. }
            | RecordSource::ExternalTableScan(_)
            | RecordSource::VirtualTableScan { .. }
            | RecordSource::ProcedureScan { .. } => Vec::new(),
            RecordSource::Conditional { first, second, .. } | RecordSource::FullOuterJoin { first, second } => vec![first.as_ref(), second.as_ref()],
            RecordSource::NestedLoopJoin { args, .. } | RecordSource::HashJoin { args, .. } | RecordSource::MergeJoin { args, .. } => args.iter().collect(),
            RecordSource::Filter { input, .. }
            | RecordSource::Sort { input, .. }
            | RecordSource::Aggregate { input, .. }
            | RecordSource::Skip { input, .. }
            | RecordSource::First { input, .. }
            | RecordSource::Lock { input } => vec![input.as_ref()],
        }
    }

    /// Stream produced directly by this operator, if it is a leaf-like producer.
    pub fn own_stream(&self) -> Option<StreamId> {
        match self {
            RecordSource::FullTableScan(target) | RecordSource::ExternalTableScan(target) => Some(target.stream),
            RecordSource::BitmapTableScan { target, .. } | RecordSource::IndexTableScan { target, .. } | RecordSource::VirtualTableScan { target, .. } => Some(target.stream),
            RecordSource::ProcedureScan { stream, .. } | RecordSource::Aggregate { stream, .. } => Some(*stream),
            _ => None,
        }
    }

    /// Streams whose records this tree produces, in tree order without duplicates.
    pub fn find_used_streams(&self, streams: &mut StreamList) {
        if let Some(stream) = self.own_stream() {
            if !streams.contains(&stream) {
                streams.push(stream);
            }
            if matches!(self, RecordSource::Aggregate { .. }) {
                return;
            }
        }
        for input in self.inputs() {
            input.find_used_streams(streams);
        }
    }

    pub fn used_streams(&self) -> StreamList {
        let mut streams = StreamList::new();
        self.find_used_streams(&mut streams);
        streams
    }

    /// Every boolean evaluated by a filter or join in this tree.
    pub fn collect_booleans<'a>(&'a self, out: &mut Vec<&'a BoolExpr>) {
        match self {
            RecordSource::Filter { boolean, .. } => out.push(boolean),
            RecordSource::NestedLoopJoin { boolean: Some(boolean), .. } => out.push(boolean),
            _ => {}
        }
        for input in self.inputs() {
            input.collect_booleans(out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::BoolExpr;

    fn scan(stream: StreamId) -> RecordSource {
        RecordSource::FullTableScan(ScanTarget { stream, alias: format!("T{stream}"), relation: format!("T{stream}") })
    }

    #[test]
    fn test_used_streams_in_tree_order() {
        let join = RecordSource::NestedLoopJoin { kind: JoinKind::Inner, args: vec![scan(2), RecordSource::filter(scan(0), None)], boolean: None };
        assert_eq!(join.used_streams(), vec![2, 0]);
    }

    #[test]
    fn test_aggregate_hides_input_streams() {
        let agg = RecordSource::Aggregate { stream: 5, input: Box::new(scan(1)), group: None, map: MapNode::default(), distinct_sorts: vec![] };
        assert_eq!(agg.used_streams(), vec![5]);
    }

    #[test]
    fn test_collect_booleans() {
        let cond = BoolExpr::eq(ValueExpr::field(0, 0), ValueExpr::field(1, 0));
        let plan = RecordSource::filter(RecordSource::NestedLoopJoin { kind: JoinKind::Outer, args: vec![scan(0), scan(1)], boolean: Some(cond.clone()) }, Some(cond));
        let mut booleans = Vec::new();
        plan.collect_booleans(&mut booleans);
        assert_eq!(booleans.len(), 2);
    }
}
