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

use riverbed_common::StreamId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OptimizerError {
    #[error("Size of optimizer block exceeded: {count} conjuncts, limit {limit}")]
    BlockExceeded { count: usize, limit: usize },
    #[error("Too many contexts: {count} streams, limit {limit}")]
    TooManyContexts { count: usize, limit: usize },
    #[error("Index {0} cannot be used in the specified plan")]
    IndexUnused(String),
    #[error("Sort record too big: {size} bytes, limit {limit}")]
    SortRecordTooLarge { size: u32, limit: u32 },
    #[error("Datatype {0} is not supported for sorting operation")]
    InvalidSortDatatype(String),
    #[error("Cannot sort on field {field} of stream {stream}: no such field")]
    UnknownSortField { stream: StreamId, field: u16 },
    #[error("Stream {0} has no relation bound")]
    UnboundStream(StreamId),
    #[error("Invalid query expression: {0}")]
    InvalidExpression(String),
}

pub type Result<T> = std::result::Result<T, OptimizerError>;
