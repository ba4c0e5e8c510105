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

//! Shared fixtures for optimizer unit tests.

use riverbed_common::{Desc, DType, Format, RecordSource, ScanTarget, StreamId, TextType};

use super::OptimizerEnv;
use crate::catalog::{RelationDescriptor, StaticCatalog};
use crate::config::OptimizerConfig;
use crate::diagnostics::{DiagnosticsSink, NoopDiagnostics};
use crate::planner::HeuristicCostModel;
use crate::scratch::{CompilerScratch, StreamDefinition};

pub fn format() -> Format {
    Format::new(vec![Desc::of(DType::Long), Desc::of(DType::Long), Desc::varying(20, TextType::Ascii), Desc::of(DType::Double)])
}

pub fn definition(stream: StreamId) -> StreamDefinition {
    StreamDefinition::relation(stream, RelationDescriptor::persistent(stream as u16 + 1, format!("T{stream}")), format()).with_fields(0..4)
}

/// Scratch with `count` persistent relation streams named `T0`, `T1`, ...
pub fn scratch(count: usize) -> CompilerScratch {
    CompilerScratch::new((0..count).map(definition))
}

pub fn scan(stream: StreamId) -> RecordSource {
    RecordSource::FullTableScan(ScanTarget { stream, alias: format!("T{stream}"), relation: format!("T{stream}") })
}

pub struct TestEnv {
    pub cost_model: HeuristicCostModel,
    pub catalog: StaticCatalog,
    pub diagnostics: NoopDiagnostics,
    pub config: OptimizerConfig,
}

impl TestEnv {
    pub fn new() -> Self {
        Self { cost_model: HeuristicCostModel::new(), catalog: StaticCatalog::new(), diagnostics: NoopDiagnostics, config: OptimizerConfig::new() }
    }

    pub fn with_catalog(catalog: StaticCatalog) -> Self {
        Self { catalog, ..Self::new() }
    }

    pub fn env(&self) -> OptimizerEnv<'_> {
        self.env_with(&self.diagnostics)
    }

    pub fn env_with<'e>(&'e self, diagnostics: &'e dyn DiagnosticsSink) -> OptimizerEnv<'e> {
        OptimizerEnv { cost_model: &self.cost_model, metadata: &self.catalog, diagnostics, config: &self.config }
    }
}
