//! Binary patterns.
//!
//! A [`BinaryPattern`] fixes the byte layout of a binary at construction
//! time. Concrete segments are encoded into a template that candidates must
//! reproduce byte for byte; pattern segments get a window whose bytes are
//! decoded and handed to the segment's own matcher. Only the last pattern
//! segment may be size-less, in which case it takes the remainder.

use super::encode::{decode_segment, encode_segment};
use super::{BitStringError, Segment, SegmentValue};
use crate::pattern::{build_match, Bindings, Matcher};
use crate::term::Term;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Window {
    Fixed { start: usize, len: usize },
    Rest { start: usize },
}

impl Window {
    fn slice<'a>(&self, bytes: &'a [u8]) -> Option<&'a [u8]> {
        match *self {
            Window::Fixed { start, len } => bytes.get(start..start + len),
            Window::Rest { start } => bytes.get(start..),
        }
    }
}

/// A compiled segment layout for matching binaries.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryPattern {
    segments: Vec<Segment>,
    windows: Vec<Window>,
    template: Vec<u8>,
}

impl BinaryPattern {
    pub fn new(segments: Vec<Segment>) -> Result<Self, BitStringError> {
        let mut windows = Vec::with_capacity(segments.len());
        let mut template = Vec::new();
        let last = segments.len().saturating_sub(1);

        for (index, segment) in segments.iter().enumerate() {
            let start = template.len();
            match &segment.value {
                SegmentValue::Value(value) => {
                    let bytes = encode_segment(segment, value)?;
                    windows.push(Window::Fixed {
                        start,
                        len: bytes.len(),
                    });
                    template.extend(bytes);
                }
                SegmentValue::Pattern(_) => match segment.byte_width()? {
                    Some(len) => {
                        windows.push(Window::Fixed { start, len });
                        template.resize(start + len, 0);
                    }
                    None if index == last => windows.push(Window::Rest { start }),
                    None => return Err(BitStringError::UnsizedSegment { index }),
                },
            }
        }

        Ok(BinaryPattern {
            segments,
            windows,
            template,
        })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Exact byte width of a matching binary, or `None` when the last
    /// segment takes the remainder.
    pub fn fixed_width(&self) -> Option<usize> {
        match self.windows.last() {
            Some(Window::Rest { .. }) => None,
            _ => Some(self.template.len()),
        }
    }
}

struct Step {
    window: Window,
    /// `None` for concrete segments, which compare against the template.
    bind: Option<(Segment, Matcher)>,
}

impl Step {
    fn apply(&self, bytes: &[u8], template: &[u8], bindings: &mut Bindings) -> bool {
        let Some(actual) = self.window.slice(bytes) else {
            return false;
        };
        match &self.bind {
            None => self.window.slice(template) == Some(actual),
            Some((segment, matcher)) => decode_segment(segment, actual)
                .is_some_and(|decoded| matcher.test(&decoded, bindings)),
        }
    }
}

/// Compile a binary pattern into a matcher. Accepts bitstrings and strings
/// (as their UTF-8 bytes); the candidate must be consumed exactly.
pub(crate) fn resolve_binary(pattern: &BinaryPattern) -> Matcher {
    let steps: Vec<Step> = pattern
        .segments
        .iter()
        .zip(&pattern.windows)
        .map(|(segment, window)| Step {
            window: *window,
            bind: match &segment.value {
                SegmentValue::Value(_) => None,
                SegmentValue::Pattern(p) => Some((segment.clone(), build_match(p))),
            },
        })
        .collect();
    let template = pattern.template.clone();
    let exact = pattern.fixed_width();

    Matcher::new(move |value, bindings| {
        let bytes = match value {
            Term::BitString(bits) => bits.as_bytes(),
            Term::Str(s) => s.as_bytes(),
            _ => return false,
        };
        let sized = match exact {
            Some(total) => bytes.len() == total,
            None => bytes.len() >= template.len(),
        };
        sized && steps.iter().all(|step| step.apply(bytes, &template, bindings))
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
