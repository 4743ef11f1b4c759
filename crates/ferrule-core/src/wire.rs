//! Wire-level helpers that follow a field's [`WireMetadata`].
//!
//! Generated code delegates the unusual encodings to these functions:
//! null-wrapped scalars, group-framed collections and the null-carrying
//! collections built on top of them.
//!
//! ## Wire Format Overview
//!
//! Each protobuf field is encoded as:
//! - A varint "tag" containing the field number and wire type
//! - The field data (format depends on wire type)
//!
//! Wire types:
//! - 0: VARINT (int32, int64, uint32, uint64, sint32, sint64, bool, enum)
//! - 1: I64 (fixed64, sfixed64, double)
//! - 2: LEN (string, bytes, embedded messages, packed repeated fields)
//! - 3/4: SGROUP/EGROUP (groups and null-carrying collections)
//! - 5: I32 (fixed32, sfixed32, float)

use crate::error::{Error, Result};
use crate::model::{FieldType, MessageOrigin, ResolvedField, ResolvedModel};
use crate::policy::{NullableScalar, WireMetadata};
use crate::MAX_FIELD_NUMBER;
use bytes::BufMut;
use prost::encoding::{self, encode_key, encode_varint, encoded_len_varint};

/// Protobuf wire types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WireType {
    /// Variable-length integer
    Varint = 0,
    /// 64-bit fixed-width
    I64 = 1,
    /// Length-delimited (strings, bytes, embedded messages)
    Len = 2,
    /// Start group
    StartGroup = 3,
    /// End group
    EndGroup = 4,
    /// 32-bit fixed-width
    I32 = 5,
}

impl TryFrom<u8> for WireType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::I64),
            2 => Ok(WireType::Len),
            3 => Ok(WireType::StartGroup),
            4 => Ok(WireType::EndGroup),
            5 => Ok(WireType::I32),
            _ => Err(Error::invalid_wire_format(
                0,
                format!("unknown wire type: {}", value),
            )),
        }
    }
}

/// Decode a varint from the given bytes.
///
/// Returns the decoded value and the number of bytes consumed.
pub fn decode_varint(data: &[u8]) -> Result<(u64, usize)> {
    let mut result: u64 = 0;
    let mut shift = 0;

    for (i, &byte) in data.iter().enumerate() {
        if i >= 10 {
            // Varints are at most 10 bytes for a 64-bit value
            return Err(Error::varint_decode(i));
        }

        result |= ((byte & 0x7F) as u64) << shift;
        shift += 7;

        if byte & 0x80 == 0 {
            return Ok((result, i + 1));
        }
    }

    Err(Error::varint_decode(data.len()))
}

/// One field read back from encoded bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawField<'a> {
    /// Field number
    pub number: u32,
    /// Wire type from the tag
    pub wire_type: WireType,
    /// Value bytes: the payload of a LEN field, the body between the
    /// markers of a group, the raw bytes of anything else
    pub value: &'a [u8],
    /// Total bytes consumed, tag included
    pub len: usize,
}

/// Deepest group nesting [`read_field`] follows before giving up
pub const MAX_GROUP_DEPTH: usize = 100;

/// Reads a single field, skipping over whole groups
pub fn read_field(data: &[u8]) -> Result<RawField<'_>> {
    read_field_nested(data, 0)
}

fn read_field_nested(data: &[u8], depth: usize) -> Result<RawField<'_>> {
    if data.is_empty() {
        return Err(Error::invalid_wire_format(0, "empty data"));
    }

    let (tag, tag_len) = decode_varint(data)
        .map_err(|_| Error::invalid_wire_format(0, "failed to decode field tag"))?;
    let wire_type = WireType::try_from((tag & 0x07) as u8)?;
    let number = (tag >> 3) as u32;
    if number == 0 || number > MAX_FIELD_NUMBER {
        return Err(Error::invalid_wire_format(
            0,
            format!("field number {number} is outside 1 to {MAX_FIELD_NUMBER}"),
        ));
    }

    let rest = &data[tag_len..];
    let fixed = |width: usize, what: &str| {
        if rest.len() < width {
            Err(Error::invalid_wire_format(tag_len, format!("not enough bytes for {what}")))
        } else {
            Ok((&rest[..width], width))
        }
    };

    let (value, value_len) = match wire_type {
        WireType::Varint => {
            let (_, n) = decode_varint(rest)
                .map_err(|_| Error::invalid_wire_format(tag_len, "failed to decode varint value"))?;
            (&rest[..n], n)
        }
        WireType::I64 => fixed(8, "I64")?,
        WireType::I32 => fixed(4, "I32")?,
        WireType::Len => {
            let (length, prefix) = decode_varint(rest).map_err(|_| {
                Error::invalid_wire_format(tag_len, "failed to decode length prefix")
            })?;
            let end = usize::try_from(length)
                .ok()
                .and_then(|l| prefix.checked_add(l))
                .ok_or_else(|| {
                    Error::invalid_wire_format(tag_len, format!("length prefix {length} is too large"))
                })?;
            if rest.len() < end {
                return Err(Error::invalid_wire_format(
                    tag_len,
                    format!(
                        "not enough bytes for LEN field (need {}, have {})",
                        length,
                        rest.len() - prefix
                    ),
                ));
            }
            (&rest[prefix..end], end)
        }
        WireType::StartGroup => {
            if depth >= MAX_GROUP_DEPTH {
                return Err(Error::invalid_wire_format(
                    0,
                    format!("groups nested deeper than {MAX_GROUP_DEPTH}"),
                ));
            }
            let mut position = 0;
            loop {
                if position >= rest.len() {
                    return Err(Error::invalid_wire_format(
                        tag_len + position,
                        "unterminated group",
                    ));
                }
                let inner = read_field_nested(&rest[position..], depth + 1)?;
                if inner.wire_type == WireType::EndGroup {
                    if inner.number != number {
                        return Err(Error::invalid_wire_format(
                            tag_len + position,
                            format!("group {number} closed by end marker {}", inner.number),
                        ));
                    }
                    break (&rest[..position], position + inner.len);
                }
                position += inner.len;
            }
        }
        WireType::EndGroup => (&rest[..0], 0),
    };

    Ok(RawField {
        number,
        wire_type,
        value,
        len: tag_len + value_len,
    })
}

/// How a repeated message field lays out its elements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionFraming {
    /// One length-delimited record per element; nulls are rejected
    LengthDelimited,
    /// One group per element; nulls are rejected
    Group,
    /// One group per element holding the element in field 1; an empty group
    /// is a null element
    NullCarrying,
}

impl CollectionFraming {
    /// Framing of `field`, which must be a repeated message field
    pub fn of(model: &ResolvedModel, field: &ResolvedField) -> Result<Self> {
        let FieldType::Message(target) = field.ty else {
            return Err(Error::internal(format!(
                "'{}' is not a message collection",
                field.full_name
            )));
        };
        if !field.is_repeated() {
            return Err(Error::internal(format!("'{}' is not repeated", field.full_name)));
        }
        Ok(match (field.wire, model.message(target).origin) {
            (WireMetadata::Group, MessageOrigin::NullWrapper { .. }) => Self::NullCarrying,
            (WireMetadata::Group, _) => Self::Group,
            _ => Self::LengthDelimited,
        })
    }
}

/// Writes the elements of a repeated message field.
///
/// Each element is an already-encoded message body, `None` standing for a
/// null element. Collections that cannot carry nulls fail with
/// [`Error::NullInUnsupportedCollection`] when the null is reached; the
/// elements before it have already been written to `buf`.
pub fn encode_collection<B: BufMut>(
    model: &ResolvedModel,
    field: &ResolvedField,
    elements: &[Option<&[u8]>],
    buf: &mut B,
) -> Result<()> {
    let framing = CollectionFraming::of(model, field)?;
    let tag = field.number;
    for (index, element) in elements.iter().enumerate() {
        match (framing, element) {
            (CollectionFraming::LengthDelimited, Some(body)) => {
                encode_key(tag, encoding::WireType::LengthDelimited, buf);
                encode_varint(body.len() as u64, buf);
                buf.put_slice(body);
            }
            (CollectionFraming::Group, Some(body)) => {
                encode_key(tag, encoding::WireType::StartGroup, buf);
                buf.put_slice(body);
                encode_key(tag, encoding::WireType::EndGroup, buf);
            }
            (CollectionFraming::NullCarrying, element) => {
                encode_key(tag, encoding::WireType::StartGroup, buf);
                if let Some(body) = element {
                    encode_key(1, encoding::WireType::LengthDelimited, buf);
                    encode_varint(body.len() as u64, buf);
                    buf.put_slice(body);
                }
                encode_key(tag, encoding::WireType::EndGroup, buf);
            }
            (_, None) => {
                return Err(Error::null_in_unsupported_collection(&field.full_name, index))
            }
        }
    }
    Ok(())
}

/// Decodes the elements of a repeated message field from a message body,
/// returning each element's encoded body and `None` for null elements
pub fn decode_collection<'a>(
    model: &ResolvedModel,
    field: &ResolvedField,
    mut data: &'a [u8],
) -> Result<Vec<Option<&'a [u8]>>> {
    let framing = CollectionFraming::of(model, field)?;
    let mut out = Vec::new();
    let mut offset = 0;

    while !data.is_empty() {
        let raw = read_field(data).map_err(|e| match e {
            Error::InvalidWireFormat { offset: at, details } => {
                Error::invalid_wire_format(offset + at, details)
            }
            other => other,
        })?;
        if raw.number == field.number {
            let element = match (framing, raw.wire_type) {
                (CollectionFraming::LengthDelimited, WireType::Len) => Some(raw.value),
                (CollectionFraming::Group, WireType::StartGroup) => Some(raw.value),
                (CollectionFraming::NullCarrying, WireType::StartGroup) => {
                    let mut element = None;
                    let mut inner = raw.value;
                    while !inner.is_empty() {
                        let f = read_field(inner)?;
                        if f.number == 1 && f.wire_type == WireType::Len {
                            element = Some(f.value);
                        }
                        inner = &inner[f.len..];
                    }
                    element
                }
                (_, wire_type) => {
                    return Err(Error::invalid_wire_format(
                        offset,
                        format!("unexpected {wire_type:?} for '{}'", field.full_name),
                    ))
                }
            };
            out.push(element);
        }
        offset += raw.len;
        data = &data[raw.len..];
    }
    Ok(out)
}

/// A value for a null-wrapped field
#[derive(Debug, Clone, PartialEq)]
pub enum NullableValue {
    /// `DoubleValue`
    Double(f64),
    /// `FloatValue`
    Float(f32),
    /// `Int64Value`
    Int64(i64),
    /// `UInt64Value`
    Uint64(u64),
    /// `Int32Value`
    Int32(i32),
    /// `UInt32Value`
    Uint32(u32),
    /// `BoolValue`
    Bool(bool),
    /// `StringValue`
    String(String),
    /// `BytesValue`
    Bytes(Vec<u8>),
}

impl NullableValue {
    /// Wrapper kind this value belongs in
    pub fn kind(&self) -> NullableScalar {
        match self {
            NullableValue::Double(_) => NullableScalar::Double,
            NullableValue::Float(_) => NullableScalar::Float,
            NullableValue::Int64(_) => NullableScalar::Int64,
            NullableValue::Uint64(_) => NullableScalar::Uint64,
            NullableValue::Int32(_) => NullableScalar::Int32,
            NullableValue::Uint32(_) => NullableScalar::Uint32,
            NullableValue::Bool(_) => NullableScalar::Bool,
            NullableValue::String(_) => NullableScalar::String,
            NullableValue::Bytes(_) => NullableScalar::Bytes,
        }
    }

    fn is_default(&self) -> bool {
        match self {
            NullableValue::Double(v) => *v == 0.0,
            NullableValue::Float(v) => *v == 0.0,
            NullableValue::Int64(v) => *v == 0,
            NullableValue::Uint64(v) => *v == 0,
            NullableValue::Int32(v) => *v == 0,
            NullableValue::Uint32(v) => *v == 0,
            NullableValue::Bool(v) => !*v,
            NullableValue::String(v) => v.is_empty(),
            NullableValue::Bytes(v) => v.is_empty(),
        }
    }

    /// Length of the wrapper body
    fn body_len(&self) -> usize {
        if self.is_default() {
            return 0;
        }
        match self {
            NullableValue::Double(v) => encoding::double::encoded_len(1, v),
            NullableValue::Float(v) => encoding::float::encoded_len(1, v),
            NullableValue::Int64(v) => encoding::int64::encoded_len(1, v),
            NullableValue::Uint64(v) => encoding::uint64::encoded_len(1, v),
            NullableValue::Int32(v) => encoding::int32::encoded_len(1, v),
            NullableValue::Uint32(v) => encoding::uint32::encoded_len(1, v),
            NullableValue::Bool(v) => encoding::bool::encoded_len(1, v),
            NullableValue::String(v) => encoding::string::encoded_len(1, v),
            NullableValue::Bytes(v) => encoding::bytes::encoded_len(1, v),
        }
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) {
        if self.is_default() {
            return;
        }
        match self {
            NullableValue::Double(v) => encoding::double::encode(1, v, buf),
            NullableValue::Float(v) => encoding::float::encode(1, v, buf),
            NullableValue::Int64(v) => encoding::int64::encode(1, v, buf),
            NullableValue::Uint64(v) => encoding::uint64::encode(1, v, buf),
            NullableValue::Int32(v) => encoding::int32::encode(1, v, buf),
            NullableValue::Uint32(v) => encoding::uint32::encode(1, v, buf),
            NullableValue::Bool(v) => encoding::bool::encode(1, v, buf),
            NullableValue::String(v) => encoding::string::encode(1, v, buf),
            NullableValue::Bytes(v) => encoding::bytes::encode(1, v, buf),
        }
    }
}

/// Writes a null-wrapped field: nothing for null, otherwise the value inside
/// its wrapper message, exactly as the declared wrapper type would encode it
pub fn encode_null_wrapped<B: BufMut>(
    field: &ResolvedField,
    value: Option<&NullableValue>,
    buf: &mut B,
) -> Result<()> {
    let WireMetadata::NullWrapped(expected) = field.wire else {
        return Err(Error::internal(format!(
            "'{}' is not a null-wrapped field",
            field.full_name
        )));
    };
    let Some(value) = value else {
        return Ok(());
    };
    if value.kind() != expected {
        return Err(Error::internal(format!(
            "'{}' holds {:?}, not {:?}",
            field.full_name,
            value.kind(),
            expected
        )));
    }

    let body_len = value.body_len();
    encode_key(field.number, encoding::WireType::LengthDelimited, buf);
    encode_varint(body_len as u64, buf);
    value.encode_body(buf);
    Ok(())
}

/// Bytes [`encode_null_wrapped`] writes for a present value
pub fn null_wrapped_len(field: &ResolvedField, value: &NullableValue) -> usize {
    let body = value.body_len();
    encoding::key_len(field.number) + encoded_len_varint(body as u64) + body
}
