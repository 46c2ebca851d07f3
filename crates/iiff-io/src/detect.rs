//! Format detection utilities.
//!
//! Detects IIFF files and the two foreign formats (TIFF, GIF) from magic
//! bytes. Foreign files are recognised only; nothing here decodes them.

use crate::IiffResult;
use crate::convert::Endianness;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// OS marker of files written on the big-endian platform family.
pub const MARKER_BIG: [u8; 4] = *b"IIFM";
/// OS marker of files written on the little-endian platform family.
pub const MARKER_LITTLE: [u8; 4] = *b"IIFI";

/// Image file formats known to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// Native IIFF storage layout.
    Iiff,
    /// TIFF (sniffed only).
    Tiff,
    /// GIF (sniffed only).
    Gif,
    /// Unknown/unsupported format.
    Unknown,
}

impl Format {
    /// Detects format from the first bytes of a file.
    pub fn detect<P: AsRef<Path>>(path: P) -> IiffResult<Self> {
        let mut file = File::open(path)?;
        let mut header = [0u8; 4];

        let mut filled = 0;
        while filled < header.len() {
            match file.read(&mut header[filled..])? {
                0 => break,
                n => filled += n,
            }
        }

        Ok(Self::from_bytes(&header[..filled]))
    }

    /// Detects format from raw bytes (magic number check).
    pub fn from_bytes(bytes: &[u8]) -> Self {
        // GIF: "GIF" (3 bytes)
        if bytes.len() >= 3 && bytes[0..3] == *b"GIF" {
            return Format::Gif;
        }

        if bytes.len() < 4 {
            return Format::Unknown;
        }

        if bytes[0..4] == MARKER_BIG || bytes[0..4] == MARKER_LITTLE {
            return Format::Iiff;
        }

        // TIFF little-endian / big-endian
        if bytes[0..4] == [0x49, 0x49, 0x2A, 0x00] || bytes[0..4] == [0x4D, 0x4D, 0x00, 0x2A] {
            return Format::Tiff;
        }

        Format::Unknown
    }

    /// Returns the typical file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Format::Iiff => "iif",
            Format::Tiff => "tif",
            Format::Gif => "gif",
            Format::Unknown => "",
        }
    }

    /// Short display name.
    pub fn name(&self) -> &'static str {
        match self {
            Format::Iiff => "IIFF",
            Format::Tiff => "TIFF",
            Format::Gif => "GIF",
            Format::Unknown => "unknown",
        }
    }

    /// True if the engine can serve pixel and variable operations.
    pub fn is_native(&self) -> bool {
        matches!(self, Format::Iiff)
    }
}

/// Byte order implied by an IIFF OS marker.
pub fn marker_byte_order(marker: &[u8]) -> Option<Endianness> {
    match marker.get(0..4)? {
        m if m == &MARKER_BIG[..] => Some(Endianness::Big),
        m if m == &MARKER_LITTLE[..] => Some(Endianness::Little),
        _ => None,
    }
}

/// OS marker written for files in the given byte order.
pub fn marker_for(order: Endianness) -> [u8; 4] {
    match order {
        Endianness::Big => MARKER_BIG,
        Endianness::Little => MARKER_LITTLE,
    }
}
