//! Key/value variable storage.
//!
//! Every open image carries two independent [`VarStore`]s: system variables
//! owned by the engine and user variables owned by the caller. Records keep
//! insertion order; putting an existing name overwrites it in place.
//!
//! # On-disk records
//!
//! ```text
//! kind:u8  name_len:u8  value_len:u16  name '='  value
//! ```
//!
//! `name_len` counts the `=`; `value_len` is stored in the file's byte
//! order. A record of kind [`KIND_END`] terminates the list. When the header
//! area cannot take the next record the writer emits [`KIND_MORE`] and
//! continues after the pixel data, where the list ends with [`KIND_END`].
//!
//! Files from before versioning use a plain `name=value\0...\0\0` block that
//! may only carry reserved names.

use crate::convert::Endianness;
use crate::{IiffError, IiffResult, Warning};
use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// Terminator record kind.
pub const KIND_END: u8 = 0;
/// Text record kind.
pub const KIND_TEXT: u8 = 1;
/// Binary record kind.
pub const KIND_BINARY: u8 = 2;
/// More-variables marker: the list continues after the pixel data.
pub const KIND_MORE: u8 = 0xFF;

/// Fixed bytes before the name of a record.
pub const RECORD_PREFIX: usize = 4;
/// Longest name including the `=` terminator.
pub const MAX_NAME_LEN: usize = 255;
/// Longest binary value.
pub const MAX_BINARY_LEN: usize = 65_530;
/// Longest text value.
pub const MAX_TEXT_LEN: usize = 4_090;

/// Platform identity of the writer.
pub const VAR_PLATFORM: &str = "IIF_Platform";
/// Float format code of the writer.
pub const VAR_FLOAT_FORMAT: &str = "IIF_FloatFormat";
/// Engine version marker.
pub const VAR_VERSION: &str = "IIF_Version";
/// Component type characters.
pub const VAR_TYPES: &str = "IIF_Types";
/// Width when it exceeds the 4-digit header field.
pub const VAR_WIDTH: &str = "IIF_Width";
/// Height when it exceeds the 4-digit header field.
pub const VAR_HEIGHT: &str = "IIF_Height";

/// Names owned by the engine.
pub const RESERVED_NAMES: [&str; 6] = [
    VAR_PLATFORM,
    VAR_FLOAT_FORMAT,
    VAR_VERSION,
    VAR_TYPES,
    VAR_WIDTH,
    VAR_HEIGHT,
];

/// True if `name` belongs to the engine.
#[inline]
pub fn is_reserved(name: &str) -> bool {
    RESERVED_NAMES.contains(&name)
}

/// Data kind of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarKind {
    /// UTF-8 text.
    Text,
    /// Raw bytes.
    Binary,
}

impl VarKind {
    /// Record kind byte.
    pub fn to_byte(self) -> u8 {
        match self {
            VarKind::Text => KIND_TEXT,
            VarKind::Binary => KIND_BINARY,
        }
    }

    /// Longest value this kind may hold.
    pub fn max_len(self) -> usize {
        match self {
            VarKind::Text => MAX_TEXT_LEN,
            VarKind::Binary => MAX_BINARY_LEN,
        }
    }
}

/// One named variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarRecord {
    /// Variable name.
    pub name: String,
    /// Raw value bytes.
    pub value: Vec<u8>,
    /// Data kind.
    pub kind: VarKind,
}

impl VarRecord {
    /// Creates a text record.
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into().into_bytes(),
            kind: VarKind::Text,
        }
    }

    /// Creates a binary record.
    pub fn binary(name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            kind: VarKind::Binary,
        }
    }

    /// Value as text, if it is valid UTF-8.
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.value).ok()
    }

    /// Checks name and value limits.
    pub fn validate(&self) -> IiffResult<()> {
        if self.name.is_empty() || self.name.contains('=') || self.name.contains('\0') {
            return Err(IiffError::InvalidParameter(format!(
                "invalid variable name `{}`",
                self.name.escape_default()
            )));
        }
        if self.name.len() + 1 > MAX_NAME_LEN {
            return Err(IiffError::InvalidParameter(format!(
                "variable name longer than {} bytes",
                MAX_NAME_LEN - 1
            )));
        }
        if self.value.len() > self.kind.max_len() {
            return Err(IiffError::InvalidParameter(format!(
                "{:?} value of `{}` is {} bytes, limit {}",
                self.kind,
                self.name,
                self.value.len(),
                self.kind.max_len()
            )));
        }
        Ok(())
    }

    /// Size of the encoded record.
    #[inline]
    pub fn encoded_len(&self) -> usize {
        RECORD_PREFIX + self.name.len() + 1 + self.value.len()
    }

    /// Appends the encoded record to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>, order: Endianness) {
        out.push(self.kind.to_byte());
        out.push((self.name.len() + 1) as u8);
        let mut len = [0u8; 2];
        write_u16(&mut len, self.value.len() as u16, order);
        out.extend_from_slice(&len);
        out.extend_from_slice(self.name.as_bytes());
        out.push(b'=');
        out.extend_from_slice(&self.value);
    }
}

/// Ordered variable list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VarStore {
    records: Vec<VarRecord>,
}

impl VarStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a record by name.
    pub fn get(&self, name: &str) -> Option<&VarRecord> {
        self.records.iter().find(|r| r.name == name)
    }

    /// Looks up a text value by name.
    pub fn get_text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|r| r.as_text())
    }

    /// Inserts or overwrites a record.
    ///
    /// Overwriting keeps the original position and reports
    /// [`Warning::VarOverwritten`].
    pub fn put(&mut self, record: VarRecord) -> IiffResult<Option<Warning>> {
        record.validate()?;
        match self.records.iter_mut().find(|r| r.name == record.name) {
            Some(existing) => {
                *existing = record;
                Ok(Some(Warning::VarOverwritten))
            }
            None => {
                self.records.push(record);
                Ok(None)
            }
        }
    }

    /// Removes a record, returning it.
    pub fn remove(&mut self, name: &str) -> Option<VarRecord> {
        let idx = self.records.iter().position(|r| r.name == name)?;
        Some(self.records.remove(idx))
    }

    /// Number of records.
    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterates in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &VarRecord> {
        self.records.iter()
    }

    /// Drops every record.
    pub fn clear(&mut self) {
        self.records.clear();
    }
}

/// Encoded variable lists ready for storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedVars {
    /// Bytes for the header area (never longer than its capacity).
    pub header: Vec<u8>,
    /// Bytes for the area after the pixel data, if the header overflowed.
    pub continuation: Option<Vec<u8>>,
}

/// Lays records out over the header area and, if needed, the continuation.
///
/// Records are placed strictly in order: once one does not fit, it and all
/// following records go to the continuation.
pub fn encode_records<'a, I>(records: I, capacity: usize, order: Endianness) -> EncodedVars
where
    I: IntoIterator<Item = &'a VarRecord>,
{
    let mut header = Vec::with_capacity(capacity);
    let mut continuation: Option<Vec<u8>> = None;

    for record in records {
        if let Some(cont) = continuation.as_mut() {
            record.encode_into(cont, order);
        } else if header.len() + record.encoded_len() < capacity {
            // One byte stays free for the terminator or the marker.
            record.encode_into(&mut header, order);
        } else {
            let mut cont = Vec::new();
            record.encode_into(&mut cont, order);
            continuation = Some(cont);
        }
    }

    match continuation.as_mut() {
        Some(cont) => {
            header.push(KIND_MORE);
            cont.push(KIND_END);
        }
        None => header.push(KIND_END),
    }

    EncodedVars { header, continuation }
}

/// Records recovered from one area.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedVars {
    /// Records in stored order.
    pub records: Vec<VarRecord>,
    /// True if the area ended with the more-variables marker.
    pub more: bool,
    /// Bytes consumed including the terminator or marker.
    pub consumed: usize,
}

/// Parses records from `area` until a terminator or marker.
///
/// `allow_more` is false for the continuation area, where a second marker
/// is malformed.
pub fn decode_records(area: &[u8], order: Endianness, allow_more: bool) -> IiffResult<DecodedVars> {
    let mut records = Vec::new();
    let mut pos = 0usize;

    loop {
        let kind = *area
            .get(pos)
            .ok_or_else(|| IiffError::BadVariable(format!("variable list not terminated at byte {}", pos)))?;

        match kind {
            KIND_END => {
                return Ok(DecodedVars { records, more: false, consumed: pos + 1 });
            }
            KIND_MORE if allow_more => {
                return Ok(DecodedVars { records, more: true, consumed: pos + 1 });
            }
            KIND_TEXT | KIND_BINARY => {
                let prefix = area
                    .get(pos..pos + RECORD_PREFIX)
                    .ok_or_else(|| IiffError::BadVariable("truncated record header".into()))?;
                let name_len = prefix[1] as usize;
                let value_len = read_u16(&prefix[2..4], order) as usize;
                let body_start = pos + RECORD_PREFIX;
                let body = area
                    .get(body_start..body_start + name_len + value_len)
                    .ok_or_else(|| IiffError::BadVariable("truncated record body".into()))?;

                if name_len < 2 || body[name_len - 1] != b'=' {
                    return Err(IiffError::BadVariable(format!("malformed record name at byte {}", pos)));
                }
                let name = std::str::from_utf8(&body[..name_len - 1])
                    .map_err(|_| IiffError::BadVariable("record name is not UTF-8".into()))?
                    .to_string();
                let value = body[name_len..].to_vec();

                let kind = if kind == KIND_TEXT { VarKind::Text } else { VarKind::Binary };
                if value.len() > kind.max_len() {
                    return Err(IiffError::BadVariable(format!("value of `{}` exceeds its limit", name)));
                }
                if kind == VarKind::Text && std::str::from_utf8(&value).is_err() {
                    return Err(IiffError::BadVariable(format!("text value of `{}` is not UTF-8", name)));
                }

                records.push(VarRecord { name, value, kind });
                pos = body_start + name_len + value_len;
            }
            other => {
                return Err(IiffError::BadVariable(format!(
                    "unknown record kind 0x{:02X} at byte {}",
                    other, pos
                )));
            }
        }
    }
}

/// Parses the pre-versioned `name=value\0...\0\0` block.
///
/// Anything but well-formed pairs with reserved names means the file is too
/// old to support.
pub fn decode_legacy_block(area: &[u8]) -> IiffResult<Vec<VarRecord>> {
    let mut records = Vec::new();
    let mut pos = 0usize;

    loop {
        let rest = &area[pos.min(area.len())..];
        let end = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| IiffError::OldVersion("legacy variable block not terminated".into()))?;
        if end == 0 {
            return Ok(records);
        }

        let entry = std::str::from_utf8(&rest[..end])
            .map_err(|_| IiffError::OldVersion("legacy variable is not text".into()))?;
        let (name, value) = entry
            .split_once('=')
            .ok_or_else(|| IiffError::OldVersion(format!("legacy entry `{}` has no value", entry)))?;
        if !is_reserved(name) {
            return Err(IiffError::OldVersion(format!("unrecognised legacy variable `{}`", name)));
        }

        records.push(VarRecord::text(name, value));
        pos += end + 1;
    }
}

pub(crate) fn read_u16(bytes: &[u8], order: Endianness) -> u16 {
    match order {
        Endianness::Big => BigEndian::read_u16(bytes),
        Endianness::Little => LittleEndian::read_u16(bytes),
    }
}

pub(crate) fn write_u16(bytes: &mut [u8], value: u16, order: Endianness) {
    match order {
        Endianness::Big => BigEndian::write_u16(bytes, value),
        Endianness::Little => LittleEndian::write_u16(bytes, value),
    }
}
