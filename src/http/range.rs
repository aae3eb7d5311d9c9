//! `Range: bytes=<start>[-<end>]` parsing.
//!
//! Only a single range with an explicit start is accepted. Multi-range and
//! suffix (`bytes=-500`) forms are rejected as malformed.

use thiserror::Error;

/// A requested byte range, before it is checked against a resource size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// First byte offset
    pub start: u64,
    /// Last byte offset (inclusive); `None` means through the end
    pub end: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("malformed Range header: {0:?}")]
    Malformed(String),
    #[error("range not satisfiable for resource of {size} bytes")]
    NotSatisfiable { size: u64 },
}

impl ByteRange {
    /// Resolves against a resource of `size` bytes.
    ///
    /// Returns the inclusive `(start, end)` pair, with `end` clamped to the
    /// last byte. A start at or past the end of the resource is not
    /// satisfiable.
    pub fn resolve(&self, size: u64) -> Result<(u64, u64), RangeError> {
        if self.start >= size {
            return Err(RangeError::NotSatisfiable { size });
        }

        let last = size - 1;
        let end = self.end.map_or(last, |end| end.min(last));
        Ok((self.start, end))
    }
}

/// Parses a `Range` header value.
///
/// ```
/// # use spindle::http::range::{parse_range_header, ByteRange};
/// assert_eq!(
///     parse_range_header("bytes=0-99"),
///     Ok(ByteRange { start: 0, end: Some(99) })
/// );
/// assert_eq!(
///     parse_range_header("bytes=500-"),
///     Ok(ByteRange { start: 500, end: None })
/// );
/// ```
pub fn parse_range_header(value: &str) -> Result<ByteRange, RangeError> {
    let malformed = || RangeError::Malformed(value.to_string());

    let range_set = value.trim().strip_prefix("bytes=").ok_or_else(malformed)?;
    if range_set.contains(',') {
        return Err(malformed());
    }

    let (start, end) = match range_set.split_once('-') {
        Some((start, end)) => (start.trim(), end.trim()),
        None => (range_set.trim(), ""),
    };

    let start = parse_offset(start).ok_or_else(malformed)?;
    let end = if end.is_empty() {
        None
    } else {
        Some(parse_offset(end).ok_or_else(malformed)?)
    };

    if end.is_some_and(|end| start > end) {
        return Err(malformed());
    }

    Ok(ByteRange { start, end })
}

fn parse_offset(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}
