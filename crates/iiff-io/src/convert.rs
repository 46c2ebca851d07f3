//! Byte-order and floating-point format conversion.
//!
//! Two independent transforms are applied to every multi-byte value that
//! crosses the file boundary: byte reversal and float-format conversion.
//! Both are stateless. The decision of *whether* to reverse is made once per
//! handle (see [`SwapPolicy`]) so a value is never swapped twice.

use crate::{IiffError, IiffResult};

/// Byte order (endianness).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endianness {
    /// Most significant byte first.
    Big,
    /// Least significant byte first.
    Little,
}

impl Endianness {
    /// Byte order of the build target.
    #[inline]
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") {
            Endianness::Big
        } else {
            Endianness::Little
        }
    }

    /// Returns the opposite byte order.
    #[inline]
    pub const fn flip(self) -> Self {
        match self {
            Endianness::Big => Endianness::Little,
            Endianness::Little => Endianness::Big,
        }
    }
}

/// Floating-point encoding used by a platform or file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatFormat {
    /// IEEE-754 binary32/binary64.
    Ieee754,
    /// Encoding known only by its code.
    Other(u8),
}

impl FloatFormat {
    /// Code written to the `IIF_FloatFormat` variable.
    pub fn code(self) -> u8 {
        match self {
            FloatFormat::Ieee754 => 1,
            FloatFormat::Other(c) => c,
        }
    }

    /// Maps a stored code back onto a format.
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => FloatFormat::Ieee754,
            c => FloatFormat::Other(c),
        }
    }
}

/// Converts a run of encoded floats of the given width in place.
pub type FloatConvertFn = fn(&mut [u8], usize);

fn float_identity(_bytes: &mut [u8], _width: usize) {}

/// Selects the float conversion strategy for a `(file, host)` format pair.
///
/// Only the identity is known; every other pair is refused.
pub fn float_converter(from: FloatFormat, to: FloatFormat) -> IiffResult<FloatConvertFn> {
    if from == to {
        Ok(float_identity)
    } else {
        Err(IiffError::UnsupportedFormat(format!(
            "no float conversion from format {} to {}",
            from.code(),
            to.code()
        )))
    }
}

/// Reverses the bytes of every `width`-byte value in `bytes`.
///
/// Widths of 0 or 1 are no-ops. Trailing bytes that do not form a whole
/// value are left untouched.
#[inline]
pub fn swap_in_place(bytes: &mut [u8], width: usize) {
    if width < 2 {
        return;
    }
    for value in bytes.chunks_exact_mut(width) {
        value.reverse();
    }
}

/// Per-handle decision on whether pixel values are reversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapPolicy {
    /// File byte order.
    pub file_order: Endianness,
    /// Host byte order from the engine configuration.
    pub host_order: Endianness,
    /// Caller/file control; when false values pass through untouched.
    pub enabled: bool,
}

impl SwapPolicy {
    /// Creates a policy.
    pub fn new(file_order: Endianness, host_order: Endianness, enabled: bool) -> Self {
        Self { file_order, host_order, enabled }
    }

    /// True when values must be reversed crossing the file boundary.
    #[inline]
    pub fn should_swap(&self) -> bool {
        self.enabled && self.file_order != self.host_order
    }

    /// Applies the policy to a run of `width`-byte values.
    #[inline]
    pub fn apply(&self, bytes: &mut [u8], width: usize) {
        if self.should_swap() {
            swap_in_place(bytes, width);
        }
    }
}
