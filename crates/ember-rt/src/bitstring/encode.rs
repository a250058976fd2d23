//! Per-segment encoding and decoding.
//!
//! Integers are written big-endian in two's complement and truncated to the
//! segment width. `little` reverses the bytes of numeric segments and of
//! each utf16/utf32 code unit; it has no effect on binaries or utf8.

use super::{BitString, BitStringError, Segment, SegmentType};
use crate::term::Term;

/// Encode one segment holding `value`.
pub(super) fn encode_segment(segment: &Segment, value: &Term) -> Result<Vec<u8>, BitStringError> {
    let width = segment.byte_width()?;
    let little = segment.is_little();
    let bad_value = || BitStringError::BadValue {
        ty: segment.ty,
        value: value.clone(),
    };

    match segment.ty {
        SegmentType::Integer => {
            let n = value.as_int().ok_or_else(bad_value)?;
            let width = width.unwrap_or(1);
            let raw = (n as u64).to_be_bytes();
            let mut bytes = raw[8 - width..].to_vec();
            if little {
                bytes.reverse();
            }
            Ok(bytes)
        }
        SegmentType::Float => {
            let x = match value {
                Term::Float(x) => *x,
                Term::Integer(n) => *n as f64,
                _ => return Err(bad_value()),
            };
            let mut bytes = if width == Some(4) {
                (x as f32).to_be_bytes().to_vec()
            } else {
                x.to_be_bytes().to_vec()
            };
            if little {
                bytes.reverse();
            }
            Ok(bytes)
        }
        SegmentType::Binary | SegmentType::Bitstring => {
            let source = match value {
                Term::BitString(bits) => bits.as_bytes(),
                Term::Str(s) => s.as_bytes(),
                _ => return Err(bad_value()),
            };
            take_prefix(segment.ty, source.to_vec(), width)
        }
        SegmentType::Utf8 => {
            let text = text_of(value).ok_or_else(bad_value)?;
            take_prefix(segment.ty, text.into_bytes(), width)
        }
        SegmentType::Utf16 => {
            let text = text_of(value).ok_or_else(bad_value)?;
            let bytes = text
                .encode_utf16()
                .flat_map(|unit| {
                    if little {
                        unit.to_le_bytes()
                    } else {
                        unit.to_be_bytes()
                    }
                })
                .collect();
            take_prefix(segment.ty, bytes, width)
        }
        SegmentType::Utf32 => {
            let text = text_of(value).ok_or_else(bad_value)?;
            let bytes = text
                .chars()
                .flat_map(|c| {
                    let unit = c as u32;
                    if little {
                        unit.to_le_bytes()
                    } else {
                        unit.to_be_bytes()
                    }
                })
                .collect();
            take_prefix(segment.ty, bytes, width)
        }
    }
}

/// A string, or a single code point given as an integer.
fn text_of(value: &Term) -> Option<String> {
    match value {
        Term::Str(s) => Some(s.clone()),
        Term::Integer(n) => u32::try_from(*n)
            .ok()
            .and_then(char::from_u32)
            .map(String::from),
        _ => None,
    }
}

fn take_prefix(
    ty: SegmentType,
    mut bytes: Vec<u8>,
    width: Option<usize>,
) -> Result<Vec<u8>, BitStringError> {
    if let Some(needed) = width {
        if bytes.len() < needed {
            return Err(BitStringError::InsufficientBytes {
                ty,
                needed,
                available: bytes.len(),
            });
        }
        bytes.truncate(needed);
    }
    Ok(bytes)
}

/// Decode the bytes of one segment back into a term.
///
/// Returns `None` when the window cannot hold a value of the segment's type
/// (odd-length utf16, invalid UTF-8, a float that is not 4 or 8 bytes).
pub(super) fn decode_segment(segment: &Segment, window: &[u8]) -> Option<Term> {
    let little = segment.is_little();
    match segment.ty {
        SegmentType::Integer => {
            if window.len() > 8 {
                return None;
            }
            let mut bytes = window.to_vec();
            if little {
                bytes.reverse();
            }
            let mut n = bytes.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64);
            let bits = window.len() * 8;
            if segment.is_signed() && bits > 0 && bits < 64 && (n >> (bits - 1)) & 1 == 1 {
                n |= !0u64 << bits;
            }
            Some(Term::Integer(n as i64))
        }
        SegmentType::Float => {
            let mut bytes = window.to_vec();
            if little {
                bytes.reverse();
            }
            match bytes.len() {
                4 => {
                    let arr: [u8; 4] = bytes.try_into().ok()?;
                    Some(Term::Float(f32::from_be_bytes(arr) as f64))
                }
                8 => {
                    let arr: [u8; 8] = bytes.try_into().ok()?;
                    Some(Term::Float(f64::from_be_bytes(arr)))
                }
                _ => None,
            }
        }
        SegmentType::Binary | SegmentType::Bitstring => {
            Some(Term::BitString(BitString::from(window)))
        }
        SegmentType::Utf8 => std::str::from_utf8(window)
            .ok()
            .map(|s| Term::Str(s.to_string())),
        SegmentType::Utf16 => {
            if window.len() % 2 != 0 {
                return None;
            }
            let units: Vec<u16> = window
                .chunks_exact(2)
                .map(|c| {
                    let pair = [c[0], c[1]];
                    if little {
                        u16::from_le_bytes(pair)
                    } else {
                        u16::from_be_bytes(pair)
                    }
                })
                .collect();
            String::from_utf16(&units).ok().map(Term::Str)
        }
        SegmentType::Utf32 => {
            if window.len() % 4 != 0 {
                return None;
            }
            window
                .chunks_exact(4)
                .map(|c| {
                    let quad = [c[0], c[1], c[2], c[3]];
                    let unit = if little {
                        u32::from_le_bytes(quad)
                    } else {
                        u32::from_be_bytes(quad)
                    };
                    char::from_u32(unit)
                })
                .collect::<Option<String>>()
                .map(Term::Str)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
