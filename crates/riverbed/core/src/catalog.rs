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

//! Pre-resolved metadata the optimizer reads.

use riverbed_common::{FieldId, VirtualTable};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationKind {
    Persistent,
    View,
    External { file: String },
    Virtual(VirtualTable),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDescriptor {
    pub id: u16,
    pub name: String,
    pub kind: RelationKind,
}

impl RelationDescriptor {
    pub fn persistent(id: u16, name: impl Into<String>) -> Self {
        Self { id, name: name.into(), kind: RelationKind::Persistent }
    }

    /// Rows live in table pages and can be fetched again by record key.
    pub fn is_stored_table(&self) -> bool {
        matches!(self.kind, RelationKind::Persistent)
    }
}

/// Per-compilation marks on an index, set by the user plan and by retrieval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexPlanFlags {
    /// The user plan excludes this index from inversions.
    pub plan_dont_use: bool,
    /// The user plan asks for navigation through this index.
    pub plan_navigate: bool,
    pub used: bool,
    pub navigated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub id: u16,
    pub name: String,
    pub segments: Vec<FieldId>,
    /// Fraction of rows matching one full key value.
    pub selectivity: f64,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub descending: bool,
    #[serde(skip)]
    pub flags: IndexPlanFlags,
}

impl IndexDescriptor {
    pub fn new(id: u16, name: impl Into<String>, segments: Vec<FieldId>, selectivity: f64) -> Self {
        Self { id, name: name.into(), segments, selectivity, unique: false, descending: false, flags: IndexPlanFlags::default() }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn descending(mut self) -> Self {
        self.descending = true;
        self
    }

    /// Usable for inversions under the current plan.
    pub fn usable(&self) -> bool {
        !self.flags.plan_dont_use
    }
}

/// Source of relation statistics and index definitions.
#[cfg_attr(test, mockall::automock)]
pub trait MetadataProvider {
    fn indices(&self, relation: &RelationDescriptor) -> Vec<IndexDescriptor>;

    fn cardinality(&self, relation: &RelationDescriptor) -> f64;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelationStats {
    pub cardinality: f64,
    #[serde(default)]
    pub indices: Vec<IndexDescriptor>,
}

/// In-memory catalog keyed by relation name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticCatalog {
    pub relations: HashMap<String, RelationStats>,
}

impl StaticCatalog {
    pub const DEFAULT_CARDINALITY: f64 = 1000.0;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_relation(mut self, name: impl Into<String>, cardinality: f64, indices: Vec<IndexDescriptor>) -> Self {
        self.relations.insert(name.into(), RelationStats { cardinality, indices });
        self
    }
}

impl MetadataProvider for StaticCatalog {
    fn indices(&self, relation: &RelationDescriptor) -> Vec<IndexDescriptor> {
        self.relations.get(&relation.name).map(|stats| stats.indices.clone()).unwrap_or_default()
    }

    fn cardinality(&self, relation: &RelationDescriptor) -> f64 {
        self.relations.get(&relation.name).map_or(Self::DEFAULT_CARDINALITY, |stats| stats.cardinality)
    }
}
