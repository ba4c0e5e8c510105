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

//! Riverbed shared data model.
//!
//! Types exchanged between the query compiler, the access-path optimizer and
//! the execution runtime: stream identifiers, value descriptors, expression
//! trees, compiled query expressions, plan trees and sort layouts.

pub mod explain;
pub mod expr;
pub mod plan;
pub mod rse;
pub mod sort_map;
pub mod stream;
pub mod value;

pub use explain::get_plan;
pub use expr::{AggregateFunction, BoolExpr, CmpOp, Comparison, FieldRef, FormatSource, NodeFlags, ValueExpr};
pub use plan::{IndexRetrieval, Inversion, JoinKind, RecordSource, ScanTarget, VirtualTable};
pub use rse::{AccessItem, AccessKind, AccessType, AggregateSource, JoinType, MapNode, NullsPlacement, PlanConstraint, PlanJoinKind, ProcedureSource, RecordSourceNode, RseFlags, RseNode, SortClause, SortDirection};
pub use sort_map::{AggregateSort, SortItemKind, SortKeyDef, SortKeyType, SortMap, SortMapFlags, SortMapItem};
pub use stream::{ActivatedWith, FieldId, SortedStreamList, StreamId, StreamList, StreamStates};
pub use value::{DType, Desc, Format, Literal, TextType, binary_comparable};
