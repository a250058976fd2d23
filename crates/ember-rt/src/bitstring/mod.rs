//! Byte-aligned bitstrings built from typed segments.
//!
//! A [`BitString`] is constructed from a list of [`Segment`]s, each of which
//! says how one value is laid out: its type, its size in units, the unit width
//! in bits, and attributes for signedness and endianness. The same segment
//! descriptions, with patterns in place of values, form a [`BinaryPattern`]
//! that destructures a binary.
//!
//! ## Defaults
//!
//! | type      | unit | size |
//! |-----------|------|------|
//! | integer   | 1    | 8    |
//! | float     | 1    | 64   |
//! | binary    | 8    | -    |
//! | bitstring | 1    | -    |
//! | utf8/16/32| 8    | -    |
//!
//! Every encoded width must be a whole number of bytes.

mod encode;
mod pattern;

use std::fmt;
use std::ops::Index;

use thiserror::Error;

pub use pattern::BinaryPattern;
pub(crate) use pattern::resolve_binary;

use crate::pattern::Pattern;
use crate::term::Term;

// ---------------------------------------------------------------------------
// BitStringError
// ---------------------------------------------------------------------------

/// Errors raised while building a bitstring or a binary pattern.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BitStringError {
    #[error("float segments must be 32 or 64 bits wide, got {0}")]
    InvalidFloatSize(u32),

    #[error("segment {index} has no size and is not the last segment")]
    UnsizedSegment { index: usize },

    #[error("segment width of {bits} bits is not a whole number of bytes")]
    NotByteAligned { bits: u32 },

    #[error("integer segments can be at most 64 bits wide, got {0}")]
    IntegerTooWide(u32),

    #[error("cannot encode {value} as a {ty} segment")]
    BadValue { ty: SegmentType, value: Term },

    #[error("{ty} segment needs {needed} bytes but the value has {available}")]
    InsufficientBytes {
        ty: SegmentType,
        needed: usize,
        available: usize,
    },

    #[error("segment {index} holds a pattern and cannot be encoded")]
    UnboundSegment { index: usize },
}

// ---------------------------------------------------------------------------
// Segment
// ---------------------------------------------------------------------------

/// The encoding of one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentType {
    Integer,
    Float,
    Binary,
    Utf8,
    Utf16,
    Utf32,
    Bitstring,
}

impl SegmentType {
    fn default_unit(self) -> u32 {
        match self {
            SegmentType::Integer | SegmentType::Float | SegmentType::Bitstring => 1,
            SegmentType::Binary | SegmentType::Utf8 | SegmentType::Utf16 | SegmentType::Utf32 => 8,
        }
    }

    fn default_size(self) -> Option<u32> {
        match self {
            SegmentType::Integer => Some(8),
            SegmentType::Float => Some(64),
            _ => None,
        }
    }
}

impl fmt::Display for SegmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SegmentType::Integer => "integer",
            SegmentType::Float => "float",
            SegmentType::Binary => "binary",
            SegmentType::Utf8 => "utf8",
            SegmentType::Utf16 => "utf16",
            SegmentType::Utf32 => "utf32",
            SegmentType::Bitstring => "bitstring",
        };
        f.write_str(name)
    }
}

/// Signedness and endianness modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    Signed,
    Unsigned,
    Big,
    Little,
    Native,
}

/// What a segment holds: a concrete value when building, or a pattern when
/// matching.
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentValue {
    Value(Term),
    Pattern(Box<Pattern>),
}

impl From<Term> for SegmentValue {
    fn from(value: Term) -> Self {
        SegmentValue::Value(value)
    }
}

impl From<Pattern> for SegmentValue {
    fn from(pattern: Pattern) -> Self {
        SegmentValue::Pattern(Box::new(pattern))
    }
}

impl From<i64> for SegmentValue {
    fn from(n: i64) -> Self {
        SegmentValue::Value(Term::Integer(n))
    }
}

impl From<i32> for SegmentValue {
    fn from(n: i32) -> Self {
        SegmentValue::Value(Term::Integer(n as i64))
    }
}

impl From<f64> for SegmentValue {
    fn from(x: f64) -> Self {
        SegmentValue::Value(Term::Float(x))
    }
}

impl From<&str> for SegmentValue {
    fn from(s: &str) -> Self {
        SegmentValue::Value(Term::Str(s.to_string()))
    }
}

impl From<BitString> for SegmentValue {
    fn from(bits: BitString) -> Self {
        SegmentValue::Value(Term::BitString(bits))
    }
}

/// One segment of a bitstring or binary pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub value: SegmentValue,
    pub ty: SegmentType,
    pub unit: Option<u32>,
    pub size: Option<u32>,
    pub attributes: Vec<Attribute>,
}

impl Segment {
    pub fn new(ty: SegmentType, value: impl Into<SegmentValue>) -> Self {
        Segment {
            value: value.into(),
            ty,
            unit: None,
            size: None,
            attributes: Vec::new(),
        }
    }

    pub fn size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    pub fn unit(mut self, unit: u32) -> Self {
        self.unit = Some(unit);
        self
    }

    pub fn signed(self) -> Self {
        self.with(Attribute::Signed)
    }

    pub fn unsigned(self) -> Self {
        self.with(Attribute::Unsigned)
    }

    pub fn big(self) -> Self {
        self.with(Attribute::Big)
    }

    pub fn little(self) -> Self {
        self.with(Attribute::Little)
    }

    pub fn native(self) -> Self {
        self.with(Attribute::Native)
    }

    fn with(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Total width in bits, if the segment is sized (explicitly or by
    /// default).
    pub fn bits(&self) -> Option<u32> {
        let unit = self.unit.unwrap_or_else(|| self.ty.default_unit());
        self.size.or_else(|| self.ty.default_size()).map(|s| s * unit)
    }

    /// Width in bytes, or `None` for a size-less segment.
    pub(crate) fn byte_width(&self) -> Result<Option<usize>, BitStringError> {
        let Some(bits) = self.bits() else {
            return Ok(None);
        };
        if bits % 8 != 0 {
            return Err(BitStringError::NotByteAligned { bits });
        }
        match self.ty {
            SegmentType::Float if bits != 32 && bits != 64 => {
                Err(BitStringError::InvalidFloatSize(bits))
            }
            SegmentType::Integer if bits > 64 => Err(BitStringError::IntegerTooWide(bits)),
            _ => Ok(Some(bits as usize / 8)),
        }
    }

    pub(crate) fn is_signed(&self) -> bool {
        self.attributes
            .iter()
            .rev()
            .find_map(|a| match a {
                Attribute::Signed => Some(true),
                Attribute::Unsigned => Some(false),
                _ => None,
            })
            .unwrap_or(false)
    }

    /// Whether the segment is laid out little-endian. The last endianness
    /// attribute wins; `native` follows the host.
    pub(crate) fn is_little(&self) -> bool {
        self.attributes
            .iter()
            .rev()
            .find_map(|a| match a {
                Attribute::Big => Some(false),
                Attribute::Little => Some(true),
                Attribute::Native => Some(cfg!(target_endian = "little")),
                _ => None,
            })
            .unwrap_or(false)
    }
}

pub fn integer(value: impl Into<SegmentValue>) -> Segment {
    Segment::new(SegmentType::Integer, value)
}

pub fn float(value: impl Into<SegmentValue>) -> Segment {
    Segment::new(SegmentType::Float, value)
}

pub fn binary(value: impl Into<SegmentValue>) -> Segment {
    Segment::new(SegmentType::Binary, value)
}

pub fn utf8(value: impl Into<SegmentValue>) -> Segment {
    Segment::new(SegmentType::Utf8, value)
}

pub fn utf16(value: impl Into<SegmentValue>) -> Segment {
    Segment::new(SegmentType::Utf16, value)
}

pub fn utf32(value: impl Into<SegmentValue>) -> Segment {
    Segment::new(SegmentType::Utf32, value)
}

pub fn bitstring(value: impl Into<SegmentValue>) -> Segment {
    Segment::new(SegmentType::Bitstring, value)
}

// ---------------------------------------------------------------------------
// BitString
// ---------------------------------------------------------------------------

/// An immutable byte-aligned binary.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct BitString {
    bytes: Vec<u8>,
}

impl BitString {
    /// Encode `segments` left to right into a new binary.
    pub fn new(segments: &[Segment]) -> Result<Self, BitStringError> {
        let mut bytes = Vec::new();
        for (index, segment) in segments.iter().enumerate() {
            match &segment.value {
                SegmentValue::Value(value) => {
                    bytes.extend(encode::encode_segment(segment, value)?);
                }
                SegmentValue::Pattern(_) => {
                    return Err(BitStringError::UnboundSegment { index });
                }
            }
        }
        Ok(BitString { bytes })
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        BitString {
            bytes: bytes.into(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn get(&self, index: usize) -> Option<u8> {
        self.bytes.get(index).copied()
    }

    pub fn byte_size(&self) -> usize {
        self.bytes.len()
    }

    pub fn bit_size(&self) -> usize {
        self.bytes.len() * 8
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, u8> {
        self.bytes.iter()
    }

    /// The contents as text, if they are valid UTF-8.
    pub fn to_utf8(&self) -> Option<&str> {
        std::str::from_utf8(&self.bytes).ok()
    }

    /// Concatenate two binaries.
    pub fn concat(&self, other: &BitString) -> BitString {
        let mut bytes = self.bytes.clone();
        bytes.extend_from_slice(&other.bytes);
        BitString { bytes }
    }
}

impl From<Vec<u8>> for BitString {
    fn from(bytes: Vec<u8>) -> Self {
        BitString { bytes }
    }
}

impl From<&[u8]> for BitString {
    fn from(bytes: &[u8]) -> Self {
        BitString {
            bytes: bytes.to_vec(),
        }
    }
}

impl Index<usize> for BitString {
    type Output = u8;

    fn index(&self, index: usize) -> &u8 {
        &self.bytes[index]
    }
}

impl<'a> IntoIterator for &'a BitString {
    type Item = &'a u8;
    type IntoIter = std::slice::Iter<'a, u8>;

    fn into_iter(self) -> Self::IntoIter {
        self.bytes.iter()
    }
}

impl fmt::Display for BitString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<<")?;
        for (i, byte) in self.bytes.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{byte}")?;
        }
        f.write_str(">>")
    }
}

impl fmt::Debug for BitString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
