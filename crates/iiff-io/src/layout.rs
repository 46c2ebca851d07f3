//! Header layout calculation.
//!
//! The header starts with fixed-position fields whose offsets depend only on
//! the component count and the length of the comma-joined component names.
//! Small tables use the legacy 1024-byte layout; larger ones switch to a
//! computed layout whose slots grow in 256-byte blocks.
//!
//! # Legacy layout
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 4 | OS marker |
//! | 4 | 1 | Format version |
//! | 5 | 1 | Component count |
//! | 6 | 2 | Extension flag |
//! | 12 | 4 | Extended component count (hex) |
//! | 16 | 4 | Extended name length (hex) |
//! | 20 | 4 | Width (hex) |
//! | 24 | 4 | Height (hex) |
//! | 28 | 114 | Component names |
//! | 142 | 114 | Component bit lengths |
//! | 256 | 256 | Filename |
//! | 512 | 256 | Variables |
//! | 768 | 4 | Swap flag (hex) |
//! | 1024 | - | Pixel data |
//!
//! A layout is computed once per handle and never mutated afterwards.

use crate::vars::MAX_TEXT_LEN;
use crate::{IiffError, IiffResult};

/// OS marker offset.
pub const OS_MARKER_OFFSET: usize = 0;
/// Format version byte offset.
pub const VERSION_OFFSET: usize = 4;
/// Component count byte offset.
pub const COUNT_OFFSET: usize = 5;
/// Extension flag offset (2 bytes).
pub const EXT_FLAG_OFFSET: usize = 6;
/// Extended component count offset (4 hex digits); also the layout probe.
pub const EXT_COUNT_OFFSET: usize = 12;
/// Extended name length offset (4 hex digits).
pub const EXT_NAME_LEN_OFFSET: usize = 16;
/// Width offset (4 hex digits).
pub const WIDTH_OFFSET: usize = 20;
/// Height offset (4 hex digits).
pub const HEIGHT_OFFSET: usize = 24;
/// Component names offset.
pub const NAMES_OFFSET: usize = 28;

/// Header size of the legacy layout.
pub const LEGACY_HEADER_SIZE: usize = 1024;
/// Bit-length table offset of the legacy layout.
pub const LEGACY_TABLE_OFFSET: usize = 142;
/// Filename offset of the legacy layout.
pub const LEGACY_FILENAME_OFFSET: usize = 256;
/// Bytes available for names (including the NUL) in the legacy layout.
pub const LEGACY_NAME_CAPACITY: usize = LEGACY_TABLE_OFFSET - NAMES_OFFSET;
/// Components the legacy bit-length table can describe.
pub const LEGACY_COMPONENT_CAPACITY: usize = LEGACY_FILENAME_OFFSET - LEGACY_TABLE_OFFSET;

/// Slot granularity of the computed layout.
pub const BLOCK_SIZE: usize = 256;
/// Filename field size.
pub const FILENAME_SIZE: usize = 256;
/// Base capacity of the variable area.
pub const VARS_BASE_CAPACITY: usize = 256;
/// Size of the swap-flag slot (4 bytes used).
pub const SWAP_SLOT_SIZE: usize = 256;
/// Width of every hex ASCII field.
pub const HEX_FIELD_LEN: usize = 4;

/// Largest value a 4-digit hex field holds.
pub const HEX_FIELD_MAX: usize = 0xFFFF;
/// Most components a table may hold; `IIF_Types` is a text record with one
/// code per component.
pub const MAX_COMPONENTS: usize = MAX_TEXT_LEN;

/// Rounds `n` up to the next multiple of [`BLOCK_SIZE`].
#[inline]
pub fn round_up_block(n: usize) -> usize {
    n.div_ceil(BLOCK_SIZE) * BLOCK_SIZE
}

/// Byte offsets of every header field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    /// True for the computed (grown) layout.
    pub computed: bool,
    /// Number of components the layout was sized for.
    pub component_count: usize,
    /// Length of the comma-joined names (without NUL).
    pub name_length: usize,
    /// Bit-length table offset.
    pub table_offset: usize,
    /// Filename field offset.
    pub filename_offset: usize,
    /// Variable area offset.
    pub vars_offset: usize,
    /// Variable area capacity in bytes.
    pub vars_capacity: usize,
    /// Swap-flag offset.
    pub swap_offset: usize,
    /// Start of pixel data (= header size).
    pub data_offset: usize,
}

impl Layout {
    /// The fixed legacy layout.
    pub const fn legacy(component_count: usize, name_length: usize) -> Self {
        Self {
            computed: false,
            component_count,
            name_length,
            table_offset: LEGACY_TABLE_OFFSET,
            filename_offset: LEGACY_FILENAME_OFFSET,
            vars_offset: LEGACY_FILENAME_OFFSET + FILENAME_SIZE,
            vars_capacity: VARS_BASE_CAPACITY,
            swap_offset: LEGACY_FILENAME_OFFSET + FILENAME_SIZE + VARS_BASE_CAPACITY,
            data_offset: LEGACY_HEADER_SIZE,
        }
    }

    /// Computes the layout for a component table.
    ///
    /// `name_length` is the length of the comma-joined names without the
    /// terminating NUL. Selects the legacy layout whenever it fits.
    pub fn compute(component_count: usize, name_length: usize) -> IiffResult<Self> {
        if component_count == 0 {
            return Err(IiffError::BadComponent("component count is zero".into()));
        }
        if component_count > MAX_COMPONENTS {
            return Err(IiffError::BadComponent(format!(
                "{} components, limit {}",
                component_count, MAX_COMPONENTS
            )));
        }
        if name_length > HEX_FIELD_MAX {
            return Err(IiffError::BadComponent(format!(
                "{} components / {} name bytes exceed the header limits",
                component_count, name_length
            )));
        }

        if name_length + 1 <= LEGACY_NAME_CAPACITY && component_count <= LEGACY_COMPONENT_CAPACITY {
            return Ok(Self::legacy(component_count, name_length));
        }

        // Names and bit table each get half of the span up to the filename.
        let half = (name_length + 1).max(component_count);
        let filename_offset = round_up_block(NAMES_OFFSET + 2 * half);
        let table_offset = (NAMES_OFFSET + filename_offset) / 2;

        let mut vars_capacity = VARS_BASE_CAPACITY;
        if component_count > LEGACY_COMPONENT_CAPACITY {
            vars_capacity += round_up_block(component_count - LEGACY_COMPONENT_CAPACITY);
        }

        let vars_offset = filename_offset + FILENAME_SIZE;
        let swap_offset = vars_offset + vars_capacity;
        let data_offset = swap_offset + SWAP_SLOT_SIZE;

        Ok(Self {
            computed: true,
            component_count,
            name_length,
            table_offset,
            filename_offset,
            vars_offset,
            vars_capacity,
            swap_offset,
            data_offset,
        })
    }

    /// Total header size in bytes.
    #[inline]
    pub fn header_size(&self) -> usize {
        self.data_offset
    }

    /// Bytes available for names including the NUL.
    #[inline]
    pub fn name_capacity(&self) -> usize {
        self.table_offset - NAMES_OFFSET
    }

    /// Entries available in the bit-length table.
    #[inline]
    pub fn table_capacity(&self) -> usize {
        self.filename_offset - self.table_offset
    }
}
