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

//! Value descriptors.
//!
//! A [`Desc`] describes the physical shape of a value: its data type, byte
//! length, scale and, for character data, the text type that decides how it
//! compares and sorts.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    Unknown,
    Text,
    CString,
    Varying,
    Short,
    Long,
    Quad,
    Real,
    Double,
    SqlDate,
    SqlTime,
    Timestamp,
    Blob,
    Array,
    Int64,
    DbKey,
    Boolean,
    Dec64,
    Dec128,
    Int128,
    SqlTimeTz,
    TimestampTz,
}

impl DType {
    pub fn is_text(self) -> bool {
        matches!(self, DType::Text | DType::CString | DType::Varying)
    }

    pub fn is_exact_numeric(self) -> bool {
        matches!(self, DType::Short | DType::Long | DType::Int64 | DType::Int128)
    }

    pub fn is_approx_numeric(self) -> bool {
        matches!(self, DType::Real | DType::Double)
    }

    pub fn is_dec_float(self) -> bool {
        matches!(self, DType::Dec64 | DType::Dec128)
    }

    pub fn is_numeric(self) -> bool {
        self.is_exact_numeric() || self.is_approx_numeric() || self.is_dec_float()
    }

    pub fn is_datetime(self) -> bool {
        matches!(self, DType::SqlDate | DType::SqlTime | DType::Timestamp | DType::SqlTimeTz | DType::TimestampTz)
    }

    /// Types whose values must start on their natural boundary inside a record.
    pub fn is_aligned(self) -> bool {
        !matches!(self, DType::Unknown | DType::Text | DType::CString | DType::Boolean)
    }

    pub fn alignment(self) -> u32 {
        match self {
            DType::Unknown | DType::Text | DType::CString | DType::Boolean => 1,
            DType::Varying | DType::Short => 2,
            DType::Long | DType::Real | DType::SqlDate | DType::SqlTime | DType::Quad | DType::Blob | DType::Array | DType::Timestamp | DType::SqlTimeTz | DType::TimestampTz | DType::DbKey => 4,
            DType::Double | DType::Int64 | DType::Dec64 | DType::Dec128 | DType::Int128 => 8,
        }
    }

    /// Fixed storage length, `None` for character data.
    pub fn fixed_length(self) -> Option<u32> {
        match self {
            DType::Text | DType::CString | DType::Varying | DType::Unknown => None,
            DType::Boolean => Some(1),
            DType::Short => Some(2),
            DType::Long | DType::Real | DType::SqlDate | DType::SqlTime => Some(4),
            DType::SqlTimeTz => Some(6),
            DType::Quad | DType::Double | DType::Timestamp | DType::Blob | DType::Array | DType::Int64 | DType::DbKey | DType::Dec64 => Some(8),
            DType::TimestampTz => Some(12),
            DType::Dec128 | DType::Int128 => Some(16),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DType::Unknown => "UNKNOWN",
            DType::Text => "CHAR",
            DType::CString => "CSTRING",
            DType::Varying => "VARCHAR",
            DType::Short => "SMALLINT",
            DType::Long => "INTEGER",
            DType::Quad => "QUAD",
            DType::Real => "FLOAT",
            DType::Double => "DOUBLE PRECISION",
            DType::SqlDate => "DATE",
            DType::SqlTime => "TIME",
            DType::Timestamp => "TIMESTAMP",
            DType::Blob => "BLOB",
            DType::Array => "ARRAY",
            DType::Int64 => "BIGINT",
            DType::DbKey => "DB_KEY",
            DType::Boolean => "BOOLEAN",
            DType::Dec64 => "DECFLOAT(16)",
            DType::Dec128 => "DECFLOAT(34)",
            DType::Int128 => "INT128",
            DType::SqlTimeTz => "TIME WITH TIME ZONE",
            DType::TimestampTz => "TIMESTAMP WITH TIME ZONE",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How character data compares.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TextType {
    #[default]
    None,
    /// Raw bytes, compared bytewise.
    Octets,
    Ascii,
    /// Culture-aware collation. Sort keys are `key_bytes_per_char` times wider than the value.
    Collated { collation: String, key_bytes_per_char: u16 },
}

impl TextType {
    pub fn is_binary(&self) -> bool {
        matches!(self, TextType::Octets)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Desc {
    pub dtype: DType,
    pub length: u32,
    #[serde(default)]
    pub scale: i8,
    #[serde(default)]
    pub text_type: TextType,
}

impl Desc {
    pub fn of(dtype: DType) -> Self {
        Self { dtype, length: dtype.fixed_length().unwrap_or(0), scale: 0, text_type: TextType::None }
    }

    pub fn unknown() -> Self {
        Self::of(DType::Unknown)
    }

    pub fn text(length: u32, text_type: TextType) -> Self {
        Self { dtype: DType::Text, length, scale: 0, text_type }
    }

    /// Varying string of at most `chars` bytes; the stored length includes the 2-byte prefix.
    pub fn varying(chars: u32, text_type: TextType) -> Self {
        Self { dtype: DType::Varying, length: chars + 2, scale: 0, text_type }
    }

    pub fn cstring(chars: u32, text_type: TextType) -> Self {
        Self { dtype: DType::CString, length: chars + 1, scale: 0, text_type }
    }

    pub fn with_scale(mut self, scale: i8) -> Self {
        self.scale = scale;
        self
    }

    /// Length of the character payload, excluding length prefix or terminator.
    pub fn string_length(&self) -> u32 {
        match self.dtype {
            DType::Varying => self.length.saturating_sub(2),
            DType::CString => self.length.saturating_sub(1),
            _ => self.length,
        }
    }

    /// Character data with a culture-aware collation.
    pub fn is_intl(&self) -> bool {
        self.dtype.is_text() && matches!(self.text_type, TextType::Collated { .. })
    }

    /// The sort key does not reproduce the value, so the value must be carried through a sort.
    pub fn has_volatile_key(&self) -> bool {
        self.is_intl() || self.dtype.is_dec_float()
    }

    /// Width of the binary collation key for international text.
    pub fn intl_key_length(&self) -> u32 {
        match &self.text_type {
            TextType::Collated { key_bytes_per_char, .. } => self.string_length() * u32::from((*key_bytes_per_char).max(1)),
            _ => self.string_length(),
        }
    }
}

/// Common descriptor two values can be converted to so they compare as raw bytes.
///
/// Returns `None` when the pair has no such representation.
pub fn binary_comparable(d1: &Desc, d2: &Desc) -> Option<Desc> {
    if d1.dtype == DType::Unknown || d2.dtype == DType::Unknown {
        return None;
    }

    if d1.dtype.is_text() || d2.dtype.is_text() {
        if !(d1.dtype.is_text() && d2.dtype.is_text()) || d1.text_type != d2.text_type {
            return None;
        }
        if d1.dtype == d2.dtype && d1.length == d2.length {
            return Some(d1.clone());
        }
        return Some(Desc::varying(d1.string_length().max(d2.string_length()), d1.text_type.clone()));
    }

    if matches!(d1.dtype, DType::Blob | DType::Array) || matches!(d2.dtype, DType::Blob | DType::Array) {
        return None;
    }

    if d1.dtype == d2.dtype && d1.scale == d2.scale {
        return Some(d1.clone());
    }

    if d1.dtype.is_numeric() && d2.dtype.is_numeric() {
        if d1.dtype.is_dec_float() || d2.dtype.is_dec_float() {
            return Some(Desc::of(DType::Dec128));
        }
        if d1.dtype.is_approx_numeric() || d2.dtype.is_approx_numeric() {
            return Some(Desc::of(DType::Double));
        }
        let scale = d1.scale.min(d2.scale);
        if d1.dtype == DType::Int128 || d2.dtype == DType::Int128 {
            return Some(Desc::of(DType::Int128).with_scale(scale));
        }
        return Some(Desc::of(DType::Int64).with_scale(scale));
    }

    match (d1.dtype, d2.dtype) {
        (DType::SqlDate, DType::Timestamp) | (DType::Timestamp, DType::SqlDate) => Some(Desc::of(DType::Timestamp)),
        (DType::SqlTimeTz, DType::SqlTime) | (DType::SqlTime, DType::SqlTimeTz) => Some(Desc::of(DType::SqlTimeTz)),
        (DType::TimestampTz, DType::Timestamp) | (DType::Timestamp, DType::TimestampTz) => Some(Desc::of(DType::TimestampTz)),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Null,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    Text {
        value: String,
        #[serde(default)]
        text_type: TextType,
    },
}

impl Literal {
    pub fn text(value: impl Into<String>) -> Self {
        Literal::Text { value: value.into(), text_type: TextType::None }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Literal::Text { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn desc(&self) -> Desc {
        match self {
            Literal::Null => Desc::text(1, TextType::None),
            Literal::Boolean(_) => Desc::of(DType::Boolean),
            Literal::Integer(_) => Desc::of(DType::Int64),
            Literal::Double(_) => Desc::of(DType::Double),
            Literal::Text { value, text_type } => Desc::text(value.len() as u32, text_type.clone()),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => f.write_str("NULL"),
            Literal::Boolean(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Literal::Integer(i) => write!(f, "{i}"),
            Literal::Double(d) => write!(f, "{d}"),
            Literal::Text { value, .. } => write!(f, "'{}'", value.replace('\'', "''")),
        }
    }
}

/// Record format of one stream: descriptors indexed by field id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Format {
    pub fields: Vec<Desc>,
}

impl Format {
    pub fn new(fields: Vec<Desc>) -> Self {
        Self { fields }
    }

    pub fn field(&self, id: u16) -> Option<&Desc> {
        self.fields.get(usize::from(id))
    }
}
