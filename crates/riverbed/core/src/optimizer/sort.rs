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

//! Sort record layouts for ORDER BY, DISTINCT, grouping and merge joins.

use riverbed_common::sort_map::align;
use riverbed_common::{AggregateSort, DType, Desc, FieldId, FormatSource, MapNode, NullsPlacement, RecordSource, SortClause, SortDirection, SortItemKind, SortKeyDef, SortKeyType, SortMap, SortMapFlags, SortMapItem, StreamId, TextType, ValueExpr};
use tracing::trace;

use crate::config::OptimizerConfig;
use crate::error::{OptimizerError, Result};
use crate::scratch::CompilerScratch;

const SLONG: u32 = 4;
const SINT64: u32 = 8;
const VARY_LENGTH: u32 = 2;

/// What a sort has to produce.
#[derive(Debug, Clone, Copy)]
pub struct SortRequest<'s> {
    /// Streams whose rows flow through the sort.
    pub streams: &'s [StreamId],
    /// Streams that may be absent from a row and need a validity flag next to their record key.
    pub dbkey_streams: Option<&'s [StreamId]>,
    pub sort: &'s SortClause,
    pub refetch: bool,
    /// Remove duplicate keys.
    pub project: bool,
}

impl<'s> SortRequest<'s> {
    pub fn new(streams: &'s [StreamId], sort: &'s SortClause) -> Self {
        Self { streams, dbkey_streams: None, sort, refetch: false, project: false }
    }

    pub fn with_dbkey_streams(mut self, streams: &'s [StreamId]) -> Self {
        self.dbkey_streams = Some(streams);
        self
    }

    pub fn refetch(mut self, refetch: bool) -> Self {
        self.refetch = refetch;
        self
    }

    pub fn project(mut self, project: bool) -> Self {
        self.project = project;
        self
    }
}

struct CarriedField {
    stream: StreamId,
    field: FieldId,
    desc: Desc,
    kept: bool,
}

/// Wraps `input` in a sort laid out for `request`.
pub fn gen_sort(csb: &CompilerScratch, config: &OptimizerConfig, request: SortRequest<'_>, input: RecordSource) -> Result<RecordSource> {
    let map = build_sort_map(csb, config, request)?;
    Ok(RecordSource::Sort { input: Box::new(input), map })
}

pub fn build_sort_map(csb: &CompilerScratch, config: &OptimizerConfig, request: SortRequest<'_>) -> Result<SortMap> {
    let sort = request.sort;
    let (mut fields, total_length) = carried_fields(csb, request.streams, sort)?;

    let mut refetch = request.refetch || total_length > config.inline_sort_threshold;
    if refetch {
        for item in &mut fields {
            if csb.get(item.stream).and_then(|tail| tail.relation.as_ref()).is_some_and(|relation| relation.is_stored_table()) {
                item.kept = false;
            }
        }
        refetch = fields.iter().any(|item| !item.kept);
    }

    let mut flags = SortMapFlags { project: request.project, refetch, unique: sort.unique, key_vary: false };
    let mut keys: Vec<SortKeyDef> = Vec::with_capacity(2 * sort.len());
    let mut items: Vec<SortMapItem> = Vec::new();

    for (i, expr) in sort.expressions.iter().enumerate() {
        let desc = key_desc(expr.desc(csb));
        let direction = sort.direction_at(i);
        let nulls = sort.nulls_at(i);

        let mut flag = SortKeyDef::new(SortKeyType::Text, SortKeyDef::next_offset(keys.last(), None), 1);
        flag.descending = (nulls == NullsPlacement::Default && direction != SortDirection::Descending) || nulls == NullsPlacement::First;

        let dtype = SortKeyType::for_dtype(desc.dtype).ok_or_else(|| OptimizerError::InvalidSortDatatype(desc.dtype.name().to_string()))?;
        let mut key = SortKeyDef::new(dtype, SortKeyDef::next_offset(Some(&flag), Some(&desc)), desc.length);
        key.descending = direction == SortDirection::Descending;
        key.binary = matches!(dtype, SortKeyType::Varying | SortKeyType::CString) && desc.text_type.is_binary();
        key.separate_data = desc.has_volatile_key() && !refetch;

        items.push(SortMapItem { kind: SortItemKind::Key(expr.clone()), stream: expr.as_field().map(|f| f.stream), desc, offset: key.offset, flag_offset: Some(flag.offset) });
        keys.push(flag);
        keys.push(key);
    }

    let key_length = keys.last().map_or(0, |key| align(key.end(), SLONG));
    let kept_count = fields.iter().filter(|item| item.kept).count() as u32;
    let mut flag_offset = key_length;
    let mut length = key_length + kept_count;

    for item in fields.into_iter().filter(|item| item.kept) {
        if item.desc.dtype.is_aligned() {
            length = align(length, item.desc.dtype.alignment());
        }
        let size = item.desc.length;
        items.push(SortMapItem { kind: SortItemKind::Field(item.field), stream: Some(item.stream), desc: item.desc, offset: length, flag_offset: Some(flag_offset) });
        flag_offset += 1;
        length += size;
    }

    length = align(length, SINT64);
    for &stream in request.streams {
        for kind in [SortItemKind::DbKey, SortItemKind::TransactionId] {
            items.push(identity_item(kind, stream, Desc::of(DType::Int64), &mut length));
        }
    }

    if let Some(dbkey_streams) = request.dbkey_streams.filter(|streams| !streams.is_empty()) {
        length = align(length, SINT64);
        for &stream in dbkey_streams {
            items.push(identity_item(SortItemKind::DbKey, stream, Desc::of(DType::Int64), &mut length));
        }
        for &stream in dbkey_streams {
            items.push(identity_item(SortItemKind::DbKeyValid, stream, Desc::text(1, TextType::Octets), &mut length));
        }
    }

    for &stream in request.streams {
        items.push(identity_item(SortItemKind::DbKeyValid, stream, Desc::text(1, TextType::Octets), &mut length));
    }

    length = align(length, SLONG);
    for key in keys.iter_mut().filter(|key| matches!(key.dtype, SortKeyType::Varying | SortKeyType::CString)) {
        key.vary_offset = Some(length);
        length += VARY_LENGTH;
        flags.key_vary = true;
    }

    if length > config.max_sort_record {
        return Err(OptimizerError::SortRecordTooLarge { size: length, limit: config.max_sort_record });
    }

    trace!(keys = sort.len(), key_length, length, refetch, "sort map built");
    Ok(SortMap { flags, key_length, length, keys, items })
}

/// Fields of `streams` the sort must carry, and their combined length.
///
/// A field that is itself a sort key is left out unless its key form loses the value.
fn carried_fields(csb: &CompilerScratch, streams: &[StreamId], sort: &SortClause) -> Result<(Vec<CarriedField>, u32)> {
    let mut fields = Vec::new();
    let mut total = 0;

    for &stream in streams {
        let Some(tail) = csb.get(stream) else {
            continue;
        };
        for &field in &tail.fields {
            let desc = tail.format.field(field).filter(|desc| desc.dtype != DType::Unknown).ok_or(OptimizerError::UnknownSortField { stream, field })?;

            let is_key = sort.expressions.iter().any(|expr| expr.as_field().is_some_and(|f| f.stream == stream && f.field == field));
            if is_key && !desc.has_volatile_key() {
                continue;
            }
            total += desc.length;
            fields.push(CarriedField { stream, field, desc: desc.clone(), kept: true });
        }
    }
    Ok((fields, total))
}

/// International text sorts on its collation key, which is plain text of a wider length.
fn key_desc(mut desc: Desc) -> Desc {
    if desc.is_intl() {
        let length = desc.intl_key_length();
        desc.dtype = DType::Text;
        desc.length = length;
    }
    desc
}

fn identity_item(kind: SortItemKind, stream: StreamId, desc: Desc, length: &mut u32) -> SortMapItem {
    let offset = *length;
    *length += desc.length;
    SortMapItem { kind, stream: Some(stream), desc, offset, flag_offset: None }
}

/// Sort layouts removing duplicate arguments of DISTINCT aggregates in `map`.
pub fn gen_aggregate_distincts(formats: &dyn FormatSource, map: &MapNode) -> Result<Vec<AggregateSort>> {
    let mut sorts = Vec::new();

    for (position, source) in map.source.iter().enumerate() {
        let ValueExpr::Aggregate { arg: Some(arg), distinct: true, .. } = source else {
            continue;
        };

        let mut desc = arg.desc(formats);
        if desc.dtype == DType::CString {
            desc.dtype = DType::Varying;
            desc.length += 1;
        }
        let intl = desc.dtype.is_text() && matches!(desc.text_type, TextType::Collated { .. });

        let mut keys = Vec::with_capacity(if intl { 2 } else { 1 });
        let mut length = 0;
        if intl {
            let key_length = align(desc.intl_key_length(), SINT64);
            keys.push(SortKeyDef::new(SortKeyType::Bytes, 0, key_length));
            length = key_length;
        }

        let dtype = SortKeyType::for_dtype(desc.dtype).ok_or_else(|| OptimizerError::InvalidSortDatatype(desc.dtype.name().to_string()))?;
        let mut key = SortKeyDef::new(dtype, SortKeyDef::next_offset(keys.last(), None), desc.length);
        if desc.dtype == DType::Varying {
            let vary_offset = key.offset + align(desc.length, SLONG);
            key.vary_offset = Some(vary_offset);
            length = vary_offset + VARY_LENGTH;
        } else {
            length += key.length;
        }
        keys.push(key);

        // One more longword for the duplicate counter kept by the aggregate.
        length = align(length, SLONG) + SLONG;
        sorts.push(AggregateSort { position, intl, desc, keys, length });
    }

    Ok(sorts)
}
