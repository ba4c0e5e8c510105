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

//! Riverbed access-path optimizer.
//!
//! Turns a compiled query expression ([`riverbed_common::RseNode`]) into a
//! plan of record-source operators. The optimizer consults a [`planner::CostModel`]
//! for index and join-order estimates and a [`catalog::MetadataProvider`] for
//! index definitions and cardinalities.

pub mod catalog;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod optimizer;
pub mod planner;
pub mod scratch;

pub use catalog::{IndexDescriptor, MetadataProvider, RelationDescriptor, RelationKind, StaticCatalog};
pub use config::OptimizerConfig;
pub use diagnostics::{CollectingDiagnostics, DiagnosticEntry, DiagnosticsSink, NoopDiagnostics, TracingDiagnostics};
pub use error::{OptimizerError, Result};
pub use optimizer::{Optimizer, OptimizerEnv, compile, compile_rse};
pub use planner::{CostModel, HeuristicCostModel};
pub use scratch::{CompilerScratch, StreamDefinition};
