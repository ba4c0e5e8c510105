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

//! Compiled query expressions handed to the optimizer.
//!
//! An [`RseNode`] is one query expression: the record sources it joins, its
//! filter, ordering, DISTINCT and grouping clauses, row limits and an
//! optional user-specified access plan.

use serde::{Deserialize, Serialize};

use crate::expr::{BoolExpr, FieldRef, ValueExpr};
use crate::stream::{FieldId, SortedStreamList, StreamId, StreamList};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JoinType {
    #[default]
    Inner,
    Left,
    Right,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NullsPlacement {
    #[default]
    Default,
    First,
    Last,
}

/// ORDER BY, DISTINCT or GROUP BY key list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortClause {
    pub expressions: Vec<ValueExpr>,
    pub direction: Vec<SortDirection>,
    pub nulls: Vec<NullsPlacement>,
    #[serde(default)]
    pub unique: bool,
}

impl SortClause {
    pub fn ascending(expressions: Vec<ValueExpr>) -> Self {
        let count = expressions.len();
        Self { expressions, direction: vec![SortDirection::Ascending; count], nulls: vec![NullsPlacement::Default; count], unique: false }
    }

    pub fn with_directions(expressions: Vec<ValueExpr>, direction: Vec<SortDirection>) -> Self {
        let nulls = vec![NullsPlacement::Default; expressions.len()];
        Self { expressions, direction, nulls, unique: false }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn len(&self) -> usize {
        self.expressions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expressions.is_empty()
    }

    pub fn direction_at(&self, i: usize) -> SortDirection {
        self.direction.get(i).copied().unwrap_or_default()
    }

    pub fn nulls_at(&self, i: usize) -> NullsPlacement {
        self.nulls.get(i).copied().unwrap_or_default()
    }

    /// The single stream all key fields come from, if there is one.
    pub fn single_stream(&self) -> Option<StreamId> {
        let mut streams = SortedStreamList::new();
        for expr in &self.expressions {
            expr.collect_streams(&mut streams);
        }
        match streams.len() {
            1 => streams.into_iter().next(),
            _ => None,
        }
    }
}

/// Maps aggregate source expressions to the fields of the aggregate stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapNode {
    pub source: Vec<ValueExpr>,
    pub target: Vec<ValueExpr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateSource {
    pub stream: StreamId,
    pub rse: Box<RseNode>,
    #[serde(default)]
    pub group: Option<SortClause>,
    #[serde(default)]
    pub map: MapNode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcedureSource {
    pub stream: StreamId,
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<ValueExpr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecordSourceNode {
    Relation { stream: StreamId },
    Rse(Box<RseNode>),
    Aggregate(AggregateSource),
    Procedure(ProcedureSource),
}

impl RecordSourceNode {
    pub fn relation(stream: StreamId) -> Self {
        RecordSourceNode::Relation { stream }
    }

    pub fn as_relation(&self) -> Option<StreamId> {
        match self {
            RecordSourceNode::Relation { stream } => Some(*stream),
            _ => None,
        }
    }

    /// Streams this source contributes to the enclosing expression.
    pub fn compute_rse_streams(&self, streams: &mut StreamList) {
        match self {
            RecordSourceNode::Relation { stream } => streams.push(*stream),
            RecordSourceNode::Rse(rse) => rse.compute_rse_streams(streams),
            RecordSourceNode::Aggregate(agg) => streams.push(agg.stream),
            RecordSourceNode::Procedure(proc) => streams.push(proc.stream),
        }
    }

    /// Streams whose record keys can be fetched through this source.
    pub fn compute_db_key_streams(&self, streams: &mut StreamList) {
        match self {
            RecordSourceNode::Relation { stream } => streams.push(*stream),
            RecordSourceNode::Rse(rse) => {
                for node in &rse.relations {
                    node.compute_db_key_streams(streams);
                }
            }
            RecordSourceNode::Aggregate(_) | RecordSourceNode::Procedure(_) => {}
        }
    }

    /// Streams outside this source that its expressions refer to.
    pub fn outer_references(&self) -> SortedStreamList {
        let mut referenced = SortedStreamList::new();
        self.collect_referenced_streams(&mut referenced);
        let mut own = StreamList::new();
        self.compute_inner_streams(&mut own);
        for stream in own {
            referenced.remove(&stream);
        }
        referenced
    }

    fn compute_inner_streams(&self, streams: &mut StreamList) {
        match self {
            RecordSourceNode::Relation { stream } => streams.push(*stream),
            RecordSourceNode::Rse(rse) => {
                for node in &rse.relations {
                    node.compute_inner_streams(streams);
                }
            }
            RecordSourceNode::Aggregate(agg) => {
                streams.push(agg.stream);
                for node in &agg.rse.relations {
                    node.compute_inner_streams(streams);
                }
            }
            RecordSourceNode::Procedure(proc) => streams.push(proc.stream),
        }
    }

    fn collect_referenced_streams(&self, streams: &mut SortedStreamList) {
        match self {
            RecordSourceNode::Relation { .. } => {}
            RecordSourceNode::Rse(rse) => rse.collect_referenced_streams(streams),
            RecordSourceNode::Aggregate(agg) => {
                agg.rse.collect_referenced_streams(streams);
                for expr in agg.map.source.iter().chain(agg.group.iter().flat_map(|g| g.expressions.iter())) {
                    expr.collect_streams(streams);
                }
            }
            RecordSourceNode::Procedure(proc) => {
                for input in &proc.inputs {
                    input.collect_streams(streams);
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RseFlags {
    #[serde(default)]
    pub write_lock: bool,
    /// Optimize for the first rows rather than the whole result.
    #[serde(default)]
    pub first_rows: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RseNode {
    pub relations: Vec<RecordSourceNode>,
    #[serde(default)]
    pub boolean: Option<BoolExpr>,
    #[serde(default)]
    pub join_type: JoinType,
    #[serde(default)]
    pub sorted: Option<SortClause>,
    #[serde(default)]
    pub projection: Option<SortClause>,
    #[serde(default)]
    pub aggregate: Option<SortClause>,
    #[serde(default)]
    pub first: Option<ValueExpr>,
    #[serde(default)]
    pub skip: Option<ValueExpr>,
    #[serde(default)]
    pub plan: Option<PlanConstraint>,
    #[serde(default)]
    pub flags: RseFlags,
}

impl RseNode {
    pub fn new(relations: Vec<RecordSourceNode>) -> Self {
        Self {
            relations,
            boolean: None,
            join_type: JoinType::Inner,
            sorted: None,
            projection: None,
            aggregate: None,
            first: None,
            skip: None,
            plan: None,
            flags: RseFlags::default(),
        }
    }

    pub fn with_boolean(mut self, boolean: BoolExpr) -> Self {
        self.boolean = Some(boolean);
        self
    }

    pub fn with_join_type(mut self, join_type: JoinType) -> Self {
        self.join_type = join_type;
        self
    }

    pub fn with_sort(mut self, sort: SortClause) -> Self {
        self.sorted = Some(sort);
        self
    }

    pub fn with_projection(mut self, projection: SortClause) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn with_plan(mut self, plan: PlanConstraint) -> Self {
        self.plan = Some(plan);
        self
    }

    pub fn compute_rse_streams(&self, streams: &mut StreamList) {
        for node in &self.relations {
            node.compute_rse_streams(streams);
        }
    }

    pub fn rse_streams(&self) -> StreamList {
        let mut streams = StreamList::new();
        self.compute_rse_streams(&mut streams);
        streams
    }

    fn collect_referenced_streams(&self, streams: &mut SortedStreamList) {
        if let Some(boolean) = &self.boolean {
            boolean.collect_streams(streams);
        }
        for clause in [&self.sorted, &self.projection, &self.aggregate].into_iter().flatten() {
            for expr in &clause.expressions {
                expr.collect_streams(streams);
            }
        }
        for node in &self.relations {
            node.collect_referenced_streams(streams);
        }
    }

    /// Fields of `stream` referenced by the filter and the key clauses.
    pub fn referenced_fields(&self, stream: StreamId) -> Vec<FieldId> {
        let mut refs = Vec::new();
        let mut record = |field: FieldRef| {
            if field.stream == stream {
                refs.push(field.field);
            }
            true
        };
        if let Some(boolean) = &self.boolean {
            boolean.all_fields(&mut record);
        }
        for clause in [&self.sorted, &self.projection, &self.aggregate].into_iter().flatten() {
            for expr in &clause.expressions {
                expr.all_fields(&mut record);
            }
        }
        refs.sort_unstable();
        refs.dedup();
        refs
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessKind {
    Indices,
    Navigational,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessItem {
    pub relation_id: u16,
    pub index_id: u16,
    pub index_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessType {
    pub kind: AccessKind,
    pub items: Vec<AccessItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlanJoinKind {
    #[default]
    Join,
    Merge,
}

/// User-specified access plan. `access: None` on a retrieval means NATURAL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanConstraint {
    Join {
        #[serde(default)]
        kind: PlanJoinKind,
        items: Vec<PlanConstraint>,
    },
    Retrieve {
        stream: StreamId,
        #[serde(default)]
        access: Option<AccessType>,
    },
}

impl PlanConstraint {
    pub fn natural(stream: StreamId) -> Self {
        PlanConstraint::Retrieve { stream, access: None }
    }

    pub fn indices(stream: StreamId, items: Vec<AccessItem>) -> Self {
        PlanConstraint::Retrieve { stream, access: Some(AccessType { kind: AccessKind::Indices, items }) }
    }

    pub fn join(items: Vec<PlanConstraint>) -> Self {
        PlanConstraint::Join { kind: PlanJoinKind::Join, items }
    }

    /// Retrieval leaves in plan order.
    pub fn retrievals(&self) -> Vec<&PlanConstraint> {
        match self {
            PlanConstraint::Retrieve { .. } => vec![self],
            PlanConstraint::Join { items, .. } => items.iter().flat_map(|item| item.retrievals()).collect(),
        }
    }

    pub fn stream(&self) -> Option<StreamId> {
        match self {
            PlanConstraint::Retrieve { stream, .. } => Some(*stream),
            PlanConstraint::Join { .. } => None,
        }
    }

    pub fn access(&self) -> Option<&AccessType> {
        match self {
            PlanConstraint::Retrieve { access, .. } => access.as_ref(),
            PlanConstraint::Join { .. } => None,
        }
    }
}
