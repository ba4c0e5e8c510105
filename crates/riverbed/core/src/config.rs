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

use serde::{Deserialize, Serialize};

/// Limits and policies of one optimizer instance.
///
/// The limits are hard: exceeding them fails the compilation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub max_conjuncts: usize,
    pub max_streams: usize,
    pub max_sort_record: u32,
    /// Carried payload, in bytes, above which sorts refetch rows instead of carrying them.
    pub inline_sort_threshold: u32,
    /// Join rivers with sort/merge instead of hash joins.
    pub prefer_merge_join: bool,
    pub favor_first_rows: bool,
}

impl OptimizerConfig {
    pub const MAX_CONJUNCTS: usize = 32_000;
    pub const MAX_STREAMS: usize = 255;
    pub const MAX_SORT_RECORD: u32 = 1024 * 1024;
    pub const INLINE_SORT_THRESHOLD: u32 = 1000;

    pub fn new() -> Self {
        Self {
            max_conjuncts: Self::MAX_CONJUNCTS,
            max_streams: Self::MAX_STREAMS,
            max_sort_record: Self::MAX_SORT_RECORD,
            inline_sort_threshold: Self::INLINE_SORT_THRESHOLD,
            prefer_merge_join: false,
            favor_first_rows: false,
        }
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_takes_defaults() {
        let config: OptimizerConfig = serde_json::from_str(r#"{"max_streams": 16, "prefer_merge_join": true}"#).unwrap();
        assert_eq!(config.max_streams, 16);
        assert!(config.prefer_merge_join);
        assert_eq!(config.max_conjuncts, OptimizerConfig::MAX_CONJUNCTS);
        assert_eq!(config.inline_sort_threshold, 1000);
    }
}
