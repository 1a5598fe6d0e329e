//! Difference encoding of sorted value streams: each element is stored as
//! the varint of its distance to the previous one, so a sorted list of
//! 32-bit values compresses to a couple of bytes per entry.

use crate::error::SketchError;
use crate::utils::var_int;

#[derive(Debug, Default)]
pub struct DifferenceEncoder {
    buf: Vec<u8>,
    last: u32,
}

impl DifferenceEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            last: 0,
        }
    }

    /// Appends `value`; values must arrive in non-decreasing order.
    pub fn put(&mut self, value: u32) {
        assert!(
            value >= self.last,
            "{} put after {} but values are required to be non-decreasing",
            value,
            self.last
        );
        var_int::write_u32(&mut self.buf, value - self.last);
        self.last = value;
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Iterator over a difference-encoded stream. Ends early on malformed input;
/// run [`validate`] first when the bytes come from outside.
#[derive(Debug, Clone)]
pub struct DifferenceDecoder<'a> {
    data: &'a [u8],
    last: u32,
}

impl<'a> DifferenceDecoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, last: 0 }
    }
}

impl Iterator for DifferenceDecoder<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.data.is_empty() {
            return None;
        }
        let (delta, consumed) = var_int::read_u32(self.data)?;
        self.data = &self.data[consumed..];
        self.last = self.last.checked_add(delta)?;
        Some(self.last)
    }
}

/// Walks a difference-encoded stream checking varint framing and 32-bit
/// bounds, returning the number of encoded values.
pub fn validate(data: &[u8]) -> Result<usize, SketchError> {
    let mut rest = data;
    let mut last = 0u32;
    let mut count = 0;
    while !rest.is_empty() {
        let (delta, consumed) = var_int::read_u32(rest).ok_or_else(|| {
            SketchError::CorruptEncoding("sparse stream ends mid-varint".to_string())
        })?;
        last = last.checked_add(delta).ok_or_else(|| {
            SketchError::CorruptEncoding("sparse stream value exceeds 32 bits".to_string())
        })?;
        rest = &rest[consumed..];
        count += 1;
    }
    Ok(count)
}
