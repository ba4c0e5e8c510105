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

//! Optimizer diagnostics.
//!
//! The optimizer reports the access paths it considered and the decisions it
//! took to a [`DiagnosticsSink`] passed in by the caller.

use parking_lot::Mutex;
use riverbed_common::StreamId;
use tracing::debug;

pub trait DiagnosticsSink {
    /// An access path considered for `stream`.
    fn record_candidate(&self, stream: StreamId, description: &str, cost: f64);

    /// A choice made while building the plan.
    fn record_decision(&self, phase: &str, description: &str);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDiagnostics;

impl DiagnosticsSink for NoopDiagnostics {
    fn record_candidate(&self, _stream: StreamId, _description: &str, _cost: f64) {}

    fn record_decision(&self, _phase: &str, _description: &str) {}
}

/// Forwards diagnostics to `tracing` at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl DiagnosticsSink for TracingDiagnostics {
    fn record_candidate(&self, stream: StreamId, description: &str, cost: f64) {
        debug!(stream, cost, "candidate: {description}");
    }

    fn record_decision(&self, phase: &str, description: &str) {
        debug!(phase, "decision: {description}");
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DiagnosticEntry {
    Candidate { stream: StreamId, description: String, cost: f64 },
    Decision { phase: String, description: String },
}

/// Keeps every entry in memory.
#[derive(Debug, Default)]
pub struct CollectingDiagnostics {
    entries: Mutex<Vec<DiagnosticEntry>>,
}

impl CollectingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<DiagnosticEntry> {
        self.entries.lock().clone()
    }

    pub fn decisions(&self, phase: &str) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter_map(|entry| match entry {
                DiagnosticEntry::Decision { phase: p, description } if p == phase => Some(description.clone()),
                _ => None,
            })
            .collect()
    }
}

impl DiagnosticsSink for CollectingDiagnostics {
    fn record_candidate(&self, stream: StreamId, description: &str, cost: f64) {
        self.entries.lock().push(DiagnosticEntry::Candidate { stream, description: description.to_string(), cost });
    }

    fn record_decision(&self, phase: &str, description: &str) {
        self.entries.lock().push(DiagnosticEntry::Decision { phase: phase.to_string(), description: description.to_string() });
    }
}
