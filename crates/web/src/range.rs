//! `Range` header parsing against a known resource size.
//!
//! Only the `bytes` unit is understood. A header value carries one or
//! more specs separated by `/`; each spec is `<lower>-<upper>` with an
//! inclusive upper bound on the wire, or `<lower>-` running to the end
//! of the resource. Specs are parsed independently and invalid ones are
//! silently dropped; policy on how many survived (0, 1, many) belongs
//! to the caller.

/// A half-open byte range `[lower, upper)` clamped to the resource size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    lower: u64,
    upper: u64,
}

impl ByteRange {
    /// Inclusive start offset.
    pub fn lower(&self) -> u64 {
        self.lower
    }

    /// Exclusive end offset.
    pub fn upper(&self) -> u64 {
        self.upper
    }

    pub fn len(&self) -> u64 {
        self.upper - self.lower
    }

    pub fn is_empty(&self) -> bool {
        self.lower == self.upper
    }
}

/// Parses a `Range` header value against a resource of `size` bytes.
///
/// Returns the surviving ranges in the order their specs appeared. An
/// unknown unit yields no ranges at all; within the `bytes` unit each
/// malformed spec, and each one left empty or inverted after clamping,
/// is dropped on its own. Every surviving range covers at least one byte.
pub fn parse_range(value: &str, size: u64) -> Vec<ByteRange> {
    let Some(specs) = value.strip_prefix("bytes=") else {
        return Vec::new();
    };
    specs.split('/').filter_map(|spec| parse_spec(spec, size)).collect()
}

fn parse_spec(spec: &str, size: u64) -> Option<ByteRange> {
    let (lower, upper) = spec.split_once('-')?;
    let lower: u64 = lower.parse().ok()?;
    let upper = if upper.is_empty() {
        size
    } else {
        // inclusive on the wire; half-open internally, clamped to size
        upper.parse::<u64>().ok()?.saturating_add(1).min(size)
    };
    (lower < upper).then_some(ByteRange { lower, upper })
}
