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

//! Sort record layouts.
//!
//! A [`SortMap`] tells the sort operator how each input row is packed: the
//! key area (null flag plus value per key), carried field values with their
//! null flags, and per-stream record identity used to refetch rows and
//! detect update conflicts.

use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::expr::ValueExpr;
use crate::stream::{FieldId, StreamId};
use crate::value::{DType, Desc};

/// Physical encoding of one sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortKeyType {
    Text,
    CString,
    Varying,
    Short,
    Long,
    Quad,
    Float,
    Double,
    SqlDate,
    SqlTime,
    Timestamp,
    Int64,
    Bytes,
    Dec64,
    Dec128,
    Int128,
    SqlTimeTz,
    TimestampTz,
}

impl SortKeyType {
    /// Sort encoding for a data type, `None` when the type cannot be sorted.
    pub fn for_dtype(dtype: DType) -> Option<Self> {
        Some(match dtype {
            DType::Text | DType::Boolean => SortKeyType::Text,
            DType::CString => SortKeyType::CString,
            DType::Varying => SortKeyType::Varying,
            DType::Short => SortKeyType::Short,
            DType::Long => SortKeyType::Long,
            DType::Quad | DType::Blob => SortKeyType::Quad,
            DType::Real => SortKeyType::Float,
            DType::Double => SortKeyType::Double,
            DType::SqlDate => SortKeyType::SqlDate,
            DType::SqlTime => SortKeyType::SqlTime,
            DType::Timestamp => SortKeyType::Timestamp,
            DType::Int64 => SortKeyType::Int64,
            DType::DbKey => SortKeyType::Bytes,
            DType::Dec64 => SortKeyType::Dec64,
            DType::Dec128 => SortKeyType::Dec128,
            DType::Int128 => SortKeyType::Int128,
            DType::SqlTimeTz => SortKeyType::SqlTimeTz,
            DType::TimestampTz => SortKeyType::TimestampTz,
            DType::Unknown | DType::Array => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortKeyDef {
    pub dtype: SortKeyType,
    pub offset: u32,
    pub length: u32,
    pub descending: bool,
    /// Compare varying/cstring keys bytewise.
    pub binary: bool,
    /// The key does not reproduce the value; keep the value next to it.
    pub separate_data: bool,
    /// Slot holding the actual length of a varying key.
    pub vary_offset: Option<u32>,
}

impl SortKeyDef {
    pub fn new(dtype: SortKeyType, offset: u32, length: u32) -> Self {
        Self { dtype, offset, length, descending: false, binary: false, separate_data: false, vary_offset: None }
    }

    pub fn end(&self) -> u32 {
        self.offset + self.length
    }

    /// Offset right after `prev`, aligned for `desc`.
    pub fn next_offset(prev: Option<&SortKeyDef>, desc: Option<&Desc>) -> u32 {
        let offset = prev.map_or(0, SortKeyDef::end);
        match desc {
            Some(desc) if desc.dtype.is_aligned() => align(offset, desc.dtype.alignment()),
            _ => offset,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SortItemKind {
    Key(ValueExpr),
    Field(FieldId),
    DbKey,
    TransactionId,
    DbKeyValid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortMapItem {
    pub kind: SortItemKind,
    pub stream: Option<StreamId>,
    pub desc: Desc,
    pub offset: u32,
    /// Null flag byte of keys and carried fields.
    pub flag_offset: Option<u32>,
}

impl SortMapItem {
    pub fn slot(&self) -> Range<u32> {
        self.offset..self.offset + self.desc.length
    }

    pub fn is_key(&self) -> bool {
        matches!(self.kind, SortItemKind::Key(_))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortMapFlags {
    /// DISTINCT: duplicate keys are removed.
    pub project: bool,
    /// Rows are fetched again after sorting by their record keys.
    pub refetch: bool,
    pub unique: bool,
    /// At least one key carries its varying length separately.
    pub key_vary: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortMap {
    pub flags: SortMapFlags,
    pub key_length: u32,
    pub length: u32,
    pub keys: Vec<SortKeyDef>,
    pub items: Vec<SortMapItem>,
}

impl SortMap {
    pub fn key_items(&self) -> impl Iterator<Item = &SortMapItem> {
        self.items.iter().filter(|item| item.is_key())
    }

    pub fn carried_items(&self) -> impl Iterator<Item = &SortMapItem> {
        self.items.iter().filter(|item| matches!(item.kind, SortItemKind::Field(_)))
    }

    /// Every byte range of the record that holds data, in layout order.
    pub fn slots(&self) -> Vec<Range<u32>> {
        let mut slots: Vec<Range<u32>> = self.keys.iter().map(|key| key.offset..key.end()).collect();
        for item in self.items.iter().filter(|item| !item.is_key()) {
            slots.push(item.slot());
            if let Some(flag) = item.flag_offset {
                slots.push(flag..flag + 1);
            }
        }
        slots.extend(self.keys.iter().filter_map(|key| key.vary_offset).map(|offset| offset..offset + 2));
        slots
    }

    /// Copies `value` into the slot of item `index`.
    pub fn write_item(&self, record: &mut [u8], index: usize, value: &[u8]) -> bool {
        let Some(item) = self.items.get(index) else {
            return false;
        };
        let slot = item.slot();
        let (start, end) = (slot.start as usize, slot.end as usize);
        if value.len() != end - start || end > record.len() {
            return false;
        }
        record[start..end].copy_from_slice(value);
        true
    }

    pub fn read_item<'a>(&self, record: &'a [u8], index: usize) -> Option<&'a [u8]> {
        let slot = self.items.get(index)?.slot();
        record.get(slot.start as usize..slot.end as usize)
    }
}

/// Sort used to eliminate duplicate arguments of a DISTINCT aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateSort {
    /// Position of the aggregate in the aggregate map.
    pub position: usize,
    pub intl: bool,
    pub desc: Desc,
    pub keys: Vec<SortKeyDef>,
    pub length: u32,
}

pub fn align(value: u32, alignment: u32) -> u32 {
    if alignment <= 1 { value } else { value.div_ceil(alignment) * alignment }
}
