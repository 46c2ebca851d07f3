//! IIFF header codec.
//!
//! Serialises the fixed-position fields at the offsets given by a
//! [`Layout`], followed by the variable lists. Reading probes the extension
//! bytes first to tell legacy from computed layouts, so both old and new
//! files load.
//!
//! System variables are always written before user variables, and the
//! resolution overflow variables come first among them. The continuation
//! offset depends on the height, so the height must be recoverable from the
//! header area alone; the 256-byte minimum variable capacity guarantees it.

use crate::component::{Component, ComponentTable, ComponentType};
use crate::convert::{Endianness, FloatFormat};
use crate::detect::{self, Format};
use crate::layout::{self, HEX_FIELD_LEN, HEX_FIELD_MAX, Layout};
use crate::vars::{self, VarKind, VarRecord, VarStore};
use crate::{EngineConfig, IiffError, IiffResult};
use std::io::{Read, Seek, SeekFrom, Write};
use tracing::{debug, trace};

/// Version byte of files that use the plain-text variable block.
pub const VERSION_LEGACY: u8 = 1;
/// Version byte written by this engine.
pub const VERSION_CURRENT: u8 = 2;

/// Value written to the `IIF_Version` variable.
pub const ENGINE_VERSION: &str = "2.0";

/// Extension flag for computed layouts.
const EXT_FLAG: [u8; 2] = *b"EX";

/// Descriptive fields of an IIFF image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageHeader {
    /// Format version byte.
    pub version: u8,
    /// Byte order of the file.
    pub byte_order: Endianness,
    /// Field offsets.
    pub layout: Layout,
    /// Width in pixels.
    pub width: u32,
    /// Height in scan lines.
    pub height: u32,
    /// Component table.
    pub components: ComponentTable,
    /// True when pixel byte swapping is enabled.
    pub swap_enabled: bool,
    /// Stored filename (base name only).
    pub filename: String,
}

impl ImageHeader {
    /// Bytes per scan line.
    #[inline]
    pub fn bytes_per_line(&self) -> usize {
        self.width as usize * self.components.pixel_size()
    }

    /// Offset of the first byte after the pixel data.
    #[inline]
    pub fn data_end(&self) -> u64 {
        self.layout.data_offset as u64 + self.height as u64 * self.bytes_per_line() as u64
    }

    /// True if either dimension needs the overflow variables.
    pub fn needs_resolution_overflow(&self) -> bool {
        self.width as usize > HEX_FIELD_MAX || self.height as usize > HEX_FIELD_MAX
    }
}

/// Engine-owned variables for `header`, in storage order.
pub fn system_records(header: &ImageHeader, config: &EngineConfig) -> Vec<VarRecord> {
    let mut records = Vec::with_capacity(6);
    if header.needs_resolution_overflow() {
        records.push(VarRecord::text(vars::VAR_WIDTH, format!("{:08X}", header.width)));
        records.push(VarRecord::text(vars::VAR_HEIGHT, format!("{:08X}", header.height)));
    }
    records.push(VarRecord::text(vars::VAR_PLATFORM, config.platform_name.clone()));
    records.push(VarRecord::text(vars::VAR_FLOAT_FORMAT, config.float_format.code().to_string()));
    records.push(VarRecord::text(vars::VAR_VERSION, ENGINE_VERSION));
    records.push(VarRecord::text(vars::VAR_TYPES, header.components.type_string()));
    records
}

/// Positions reached by [`write_header`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderWrite {
    /// Offset just past the last variable record.
    pub vars_end: u64,
    /// Required file length (pixel data plus any continuation).
    pub file_end: u64,
}

/// Encodes the fixed header area (pixel data excluded).
///
/// Returns the header bytes and the continuation records, if any.
pub fn encode_header<'a, I>(header: &ImageHeader, records: I) -> IiffResult<(Vec<u8>, Option<Vec<u8>>)>
where
    I: IntoIterator<Item = &'a VarRecord>,
{
    let layout = &header.layout;
    let count = header.components.len();
    let names = header.components.joined_names();

    if names.len() + 1 > layout.name_capacity() || count > layout.table_capacity() {
        return Err(IiffError::BadComponent(format!(
            "component table ({} components, {} name bytes) does not fit the layout",
            count,
            names.len()
        )));
    }

    let mut buf = vec![0u8; layout.header_size()];

    buf[layout::OS_MARKER_OFFSET..layout::OS_MARKER_OFFSET + 4]
        .copy_from_slice(&detect::marker_for(header.byte_order));
    buf[layout::VERSION_OFFSET] = VERSION_CURRENT;
    buf[layout::COUNT_OFFSET] = u8::try_from(count).unwrap_or(0);

    if layout.computed {
        buf[layout::EXT_FLAG_OFFSET..layout::EXT_FLAG_OFFSET + 2].copy_from_slice(&EXT_FLAG);
        put_hex4(&mut buf, layout::EXT_COUNT_OFFSET, count);
        put_hex4(&mut buf, layout::EXT_NAME_LEN_OFFSET, names.len());
    }

    // Legacy readers get a clamped, plausible value.
    put_hex4(&mut buf, layout::WIDTH_OFFSET, (header.width as usize).min(HEX_FIELD_MAX));
    put_hex4(&mut buf, layout::HEIGHT_OFFSET, (header.height as usize).min(HEX_FIELD_MAX));

    buf[layout::NAMES_OFFSET..layout::NAMES_OFFSET + names.len()].copy_from_slice(names.as_bytes());

    for (i, c) in header.components.iter().enumerate() {
        buf[layout.table_offset + i] = (c.byte_size() * 8) as u8;
    }

    let name = header.filename.as_bytes();
    let name_len = name.len().min(layout::FILENAME_SIZE - 1);
    buf[layout.filename_offset..layout.filename_offset + name_len].copy_from_slice(&name[..name_len]);

    let encoded = vars::encode_records(records, layout.vars_capacity, header.byte_order);
    buf[layout.vars_offset..layout.vars_offset + encoded.header.len()].copy_from_slice(&encoded.header);

    let swap = if header.swap_enabled { 1 } else { 0 };
    put_hex4(&mut buf, layout.swap_offset, swap);

    Ok((buf, encoded.continuation))
}

/// Writes header and variables.
///
/// System records come first, then user records. Continuation records are
/// written right after the pixel data.
pub fn write_header<W: Write + Seek>(
    writer: &mut W,
    header: &ImageHeader,
    system: &VarStore,
    user: &VarStore,
) -> IiffResult<HeaderWrite> {
    trace!(width = header.width, height = header.height, computed = header.layout.computed, "header::write");

    let (bytes, continuation) = encode_header(header, system.iter().chain(user.iter()))?;
    if bytes.len() != header.layout.header_size() {
        return Err(IiffError::DiskFull(format!(
            "header is {} bytes, expected {}",
            bytes.len(),
            header.layout.header_size()
        )));
    }

    writer
        .seek(SeekFrom::Start(0))
        .map_err(|e| IiffError::from_write(e, "header seek"))?;
    writer
        .write_all(&bytes)
        .map_err(|e| IiffError::from_write(e, "header"))?;

    let data_end = header.data_end();
    let result = match continuation {
        Some(cont) => {
            debug!(offset = data_end, bytes = cont.len(), "variables continue after pixel data");
            writer
                .seek(SeekFrom::Start(data_end))
                .map_err(|e| IiffError::from_write(e, "variable seek"))?;
            writer
                .write_all(&cont)
                .map_err(|e| IiffError::from_write(e, "variables"))?;
            let end = data_end + cont.len() as u64;
            HeaderWrite { vars_end: end, file_end: end }
        }
        None => {
            let area = vars::decode_records(
                &bytes[header.layout.vars_offset..header.layout.swap_offset],
                header.byte_order,
                true,
            )?;
            HeaderWrite {
                vars_end: (header.layout.vars_offset + area.consumed) as u64,
                file_end: data_end,
            }
        }
    };

    writer.flush().map_err(|e| IiffError::from_write(e, "header flush"))?;
    Ok(result)
}

/// Header and variables recovered from a file.
#[derive(Debug, Clone)]
pub struct LoadedHeader {
    /// Descriptive fields.
    pub header: ImageHeader,
    /// Engine variables.
    pub system: VarStore,
    /// Caller variables.
    pub user: VarStore,
    /// Offset just past the last variable record.
    pub vars_end: u64,
    /// Float format the file was written with.
    pub float_format: FloatFormat,
}

/// Reads header and variables from the start of `reader`.
pub fn read_header<R: Read + Seek>(reader: &mut R) -> IiffResult<LoadedHeader> {
    trace!("header::read");

    let mut buf = vec![0u8; layout::LEGACY_HEADER_SIZE];
    reader.seek(SeekFrom::Start(0)).map_err(|e| IiffError::from_read(e, "header"))?;
    reader
        .read_exact(&mut buf)
        .map_err(|e| IiffError::from_read(e, "header"))?;

    if Format::from_bytes(&buf[..4]) != Format::Iiff {
        return Err(IiffError::UnsupportedFormat("not an IIFF header".into()));
    }
    let byte_order = detect::marker_byte_order(&buf).ok_or_else(|| {
        IiffError::UnsupportedFormat("unknown OS marker".into())
    })?;

    let version = buf[layout::VERSION_OFFSET];
    match version {
        0 => return Err(IiffError::OldVersion("version byte 0".into())),
        VERSION_LEGACY | VERSION_CURRENT => {}
        v => return Err(IiffError::UnsupportedFormat(format!("unknown format version {}", v))),
    }

    let layout = probe_layout(&buf)?;
    debug!(computed = layout.computed, header_size = layout.header_size(), "header layout");

    if layout.header_size() > buf.len() {
        let old = buf.len();
        buf.resize(layout.header_size(), 0);
        reader
            .read_exact(&mut buf[old..])
            .map_err(|e| IiffError::from_read(e, "extended header"))?;
    }

    let width16 = get_hex4(&buf, layout::WIDTH_OFFSET)?;
    let height16 = get_hex4(&buf, layout::HEIGHT_OFFSET)?;

    let names = read_names(&buf, &layout)?;
    let sizes: Vec<usize> = (0..layout.component_count)
        .map(|i| buf[layout.table_offset + i] as usize)
        .map(|bits| {
            if bits == 0 || bits % 8 != 0 {
                Err(IiffError::BadComponent(format!("component bit length {}", bits)))
            } else {
                Ok(bits / 8)
            }
        })
        .collect::<IiffResult<_>>()?;

    let filename = read_cstr(&buf[layout.filename_offset..layout.filename_offset + layout::FILENAME_SIZE]);
    let swap_enabled = get_hex4(&buf, layout.swap_offset)? != 0;

    // Variables in the header area.
    let area = &buf[layout.vars_offset..layout.vars_offset + layout.vars_capacity];
    let (mut records, more, mut vars_end) = if version == VERSION_LEGACY {
        let records = vars::decode_legacy_block(area)?;
        (records, false, layout.vars_offset as u64)
    } else {
        let decoded = vars::decode_records(area, byte_order, true)?;
        (decoded.records, decoded.more, (layout.vars_offset + decoded.consumed) as u64)
    };

    let width = overflow_dimension(&records, vars::VAR_WIDTH)?.unwrap_or(width16 as u32);
    let height = overflow_dimension(&records, vars::VAR_HEIGHT)?.unwrap_or(height16 as u32);
    if width == 0 || height == 0 {
        return Err(IiffError::UnsupportedFormat(format!("resolution {}x{}", width, height)));
    }

    let pixel_size: usize = sizes.iter().sum();
    let data_end = layout.data_offset as u64 + height as u64 * width as u64 * pixel_size as u64;

    if more {
        debug!(offset = data_end, "reading continued variables");
        reader
            .seek(SeekFrom::Start(data_end))
            .map_err(|e| IiffError::from_read(e, "variable continuation"))?;
        let mut tail = Vec::new();
        reader
            .read_to_end(&mut tail)
            .map_err(|e| IiffError::from_read(e, "variable continuation"))?;
        let decoded = vars::decode_records(&tail, byte_order, false)?;
        vars_end = data_end + decoded.consumed as u64;
        records.extend(decoded.records);
    }

    let mut system = VarStore::new();
    let mut user = VarStore::new();
    for record in records {
        if vars::is_reserved(&record.name) {
            system.put(record)?;
        } else {
            user.put(record)?;
        }
    }

    let types = resolve_types(system.get_text(vars::VAR_TYPES), &sizes)?;
    let components = ComponentTable::new(
        names
            .into_iter()
            .zip(types)
            .map(|(name, ty)| Component::new(name, ty))
            .collect(),
    )?;

    let float_format = match system.get_text(vars::VAR_FLOAT_FORMAT) {
        Some(code) => code
            .trim()
            .parse::<u8>()
            .map(FloatFormat::from_code)
            .map_err(|_| IiffError::BadVariable(format!("float format `{}`", code)))?,
        None => FloatFormat::Ieee754,
    };

    Ok(LoadedHeader {
        header: ImageHeader {
            version,
            byte_order,
            layout,
            width,
            height,
            components,
            swap_enabled,
            filename,
        },
        system,
        user,
        vars_end,
        float_format,
    })
}

/// Decides legacy vs computed layout from the extension bytes.
pub fn probe_layout(buf: &[u8]) -> IiffResult<Layout> {
    let ext = &buf[layout::EXT_COUNT_OFFSET..layout::EXT_COUNT_OFFSET + HEX_FIELD_LEN];
    if ext.iter().all(|&b| b == 0) {
        let count = buf[layout::COUNT_OFFSET] as usize;
        if count == 0 {
            return Err(IiffError::BadComponent("component count is zero".into()));
        }
        let slot = &buf[layout::NAMES_OFFSET..layout::LEGACY_TABLE_OFFSET];
        let name_length = slot
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| IiffError::BadComponent("component names not terminated".into()))?;
        return Ok(Layout::legacy(count, name_length));
    }

    let count = get_hex4(buf, layout::EXT_COUNT_OFFSET)?;
    let name_length = get_hex4(buf, layout::EXT_NAME_LEN_OFFSET)?;
    let computed = Layout::compute(count, name_length)?;
    if !computed.computed {
        // Written by a layout rule that grew earlier than ours; keep ours.
        debug!(count, name_length, "extension bytes set on a legacy-sized table");
    }
    Ok(computed)
}

fn read_names(buf: &[u8], layout: &Layout) -> IiffResult<Vec<String>> {
    let raw = &buf[layout::NAMES_OFFSET..layout::NAMES_OFFSET + layout.name_length];
    let joined = std::str::from_utf8(raw)
        .map_err(|_| IiffError::BadComponent("component names are not UTF-8".into()))?;
    let names: Vec<String> = joined.split(',').map(str::to_string).collect();
    if names.len() != layout.component_count {
        return Err(IiffError::BadComponent(format!(
            "{} component names for {} components",
            names.len(),
            layout.component_count
        )));
    }
    Ok(names)
}

fn resolve_types(types: Option<&str>, sizes: &[usize]) -> IiffResult<Vec<ComponentType>> {
    match types {
        Some(codes) => {
            let types: Vec<ComponentType> = codes
                .chars()
                .map(|c| {
                    ComponentType::from_code(c)
                        .ok_or_else(|| IiffError::BadComponent(format!("unknown type code `{}`", c)))
                })
                .collect::<IiffResult<_>>()?;
            if types.len() != sizes.len() {
                return Err(IiffError::BadComponent(format!(
                    "{} type codes for {} components",
                    types.len(),
                    sizes.len()
                )));
            }
            for (ty, &size) in types.iter().zip(sizes) {
                if ty.byte_size() != size {
                    return Err(IiffError::BadComponent(format!(
                        "type `{}` stored with {} bytes",
                        ty, size
                    )));
                }
            }
            Ok(types)
        }
        None => sizes
            .iter()
            .map(|&size| {
                ComponentType::from_byte_size(size)
                    .ok_or_else(|| IiffError::BadComponent(format!("no type for {}-byte component", size)))
            })
            .collect(),
    }
}

fn overflow_dimension(records: &[VarRecord], name: &str) -> IiffResult<Option<u32>> {
    let Some(record) = records.iter().find(|r| r.name == name) else {
        return Ok(None);
    };
    let text = match record.kind {
        VarKind::Text => record.as_text().unwrap_or_default(),
        VarKind::Binary => "",
    };
    u32::from_str_radix(text.trim(), 16)
        .map(Some)
        .map_err(|_| IiffError::BadVariable(format!("{} = `{}`", name, text)))
}

fn put_hex4(buf: &mut [u8], offset: usize, value: usize) {
    let text = format!("{:04X}", value.min(HEX_FIELD_MAX));
    buf[offset..offset + HEX_FIELD_LEN].copy_from_slice(text.as_bytes());
}

fn get_hex4(buf: &[u8], offset: usize) -> IiffResult<usize> {
    let raw = &buf[offset..offset + HEX_FIELD_LEN];
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| usize::from_str_radix(s, 16).ok())
        .ok_or_else(|| IiffError::UnsupportedFormat(format!("malformed hex field at offset {}", offset)))
}

fn read_cstr(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn rgb_header(width: u32, height: u32) -> ImageHeader {
        let components = ComponentTable::new(vec![
            Component::new("R", ComponentType::Byte),
            Component::new("G", ComponentType::Byte),
            Component::new("B", ComponentType::Byte),
        ])
        .expect("table");
        let layout = Layout::compute(components.len(), components.joined_names().len()).expect("layout");
        ImageHeader {
            version: VERSION_CURRENT,
            byte_order: Endianness::Big,
            layout,
            width,
            height,
            components,
            swap_enabled: true,
            filename: "rgb.iif".into(),
        }
    }

    fn roundtrip(header: &ImageHeader, user: &VarStore) -> LoadedHeader {
        let config = EngineConfig::host().with_platform_name("test");
        let mut system = VarStore::new();
        for r in system_records(header, &config) {
            system.put(r).expect("system var");
        }
        let mut cursor = Cursor::new(Vec::new());
        write_header(&mut cursor, header, &system, user).expect("write");
        read_header(&mut cursor).expect("read")
    }

    #[test]
    fn test_fixed_field_bytes() {
        let header = rgb_header(4, 2);
        let (bytes, cont) = encode_header(&header, std::iter::empty()).expect("encode");
        assert!(cont.is_none());
        assert_eq!(bytes.len(), 1024);
        assert_eq!(&bytes[0..4], b"IIFM");
        assert_eq!(bytes[4], VERSION_CURRENT);
        assert_eq!(bytes[5], 3);
        assert_eq!(&bytes[6..8], &[0, 0]);
        assert_eq!(&bytes[12..16], &[0, 0, 0, 0]);
        assert_eq!(&bytes[20..24], b"0004");
        assert_eq!(&bytes[24..28], b"0002");
        assert_eq!(&bytes[28..34], b"R,G,B\0");
        assert_eq!(&bytes[142..145], &[8, 8, 8]);
        assert_eq!(&bytes[256..264], b"rgb.iif\0");
        assert_eq!(bytes[512], vars::KIND_END);
        assert_eq!(&bytes[768..772], b"0001");
    }

    #[test]
    fn test_roundtrip_legacy() {
        let header = rgb_header(640, 480);
        let loaded = roundtrip(&header, &VarStore::new());
        assert_eq!(loaded.header, header);
        assert_eq!(loaded.system.get_text(vars::VAR_TYPES), Some("bbb"));
        assert_eq!(loaded.system.get_text(vars::VAR_PLATFORM), Some("test"));
        assert!(loaded.user.is_empty());
        assert_eq!(loaded.float_format, FloatFormat::Ieee754);
    }

    #[test]
    fn test_roundtrip_computed() {
        let components = ComponentTable::new(
            (0..150)
                .map(|i| {
                    let ty = if i % 2 == 0 { ComponentType::Short } else { ComponentType::Double };
                    Component::new(format!("chan{}", i), ty)
                })
                .collect(),
        )
        .expect("table");
        let layout = Layout::compute(components.len(), components.joined_names().len()).expect("layout");
        assert!(layout.computed);

        let header = ImageHeader {
            version: VERSION_CURRENT,
            byte_order: Endianness::Little,
            layout,
            width: 3,
            height: 5,
            components,
            swap_enabled: false,
            filename: String::new(),
        };
        let loaded = roundtrip(&header, &VarStore::new());
        assert_eq!(loaded.header, header);
    }

    #[test]
    fn test_resolution_overflow() {
        let header = rgb_header(70_000, 3);
        let config = EngineConfig::host();
        let mut system = VarStore::new();
        for r in system_records(&header, &config) {
            system.put(r).expect("system var");
        }
        assert_eq!(system.get_text(vars::VAR_WIDTH), Some("00011170"));

        let mut cursor = Cursor::new(Vec::new());
        write_header(&mut cursor, &header, &system, &VarStore::new()).expect("write");
        // Legacy field holds the clamped value.
        assert_eq!(&cursor.get_ref()[20..24], b"FFFF");

        let loaded = read_header(&mut cursor).expect("read");
        assert_eq!(loaded.header.width, 70_000);
        assert_eq!(loaded.header.height, 3);
    }

    #[test]
    fn test_user_vars_continue_after_pixels() {
        let header = rgb_header(2, 2);
        let mut user = VarStore::new();
        for i in 0..20 {
            user.put(VarRecord::binary(format!("blob{:02}", i), vec![i as u8; 40]))
                .expect("put");
        }
        let loaded = roundtrip(&header, &user);
        assert_eq!(loaded.user, user);
        assert!(loaded.vars_end > header.data_end());
    }

    #[test]
    fn test_types_inferred_without_variable() {
        let types = resolve_types(None, &[1, 2, 4, 8]).expect("types");
        assert_eq!(
            types,
            [ComponentType::Byte, ComponentType::Short, ComponentType::Long, ComponentType::Double]
        );
        assert!(resolve_types(Some("bf"), &[1, 2]).is_err());
        assert!(resolve_types(Some("b"), &[1, 1]).is_err());
        assert!(resolve_types(None, &[3]).is_err());
    }

    #[test]
    fn test_rejects_foreign_and_versions() {
        let mut tiff = vec![0u8; 1024];
        tiff[0..4].copy_from_slice(&[0x49, 0x49, 0x2A, 0x00]);
        let err = read_header(&mut Cursor::new(tiff)).unwrap_err();
        assert_eq!(err.code(), crate::ErrorCode::UnsupportedFormat);

        let (mut bytes, _) = encode_header(&rgb_header(1, 1), std::iter::empty()).expect("encode");
        bytes[4] = 0;
        let err = read_header(&mut Cursor::new(bytes.clone())).unwrap_err();
        assert_eq!(err.code(), crate::ErrorCode::OldVersion);

        bytes[4] = 9;
        let err = read_header(&mut Cursor::new(bytes)).unwrap_err();
        assert_eq!(err.code(), crate::ErrorCode::UnsupportedFormat);
    }

    #[test]
    fn test_short_file() {
        let err = read_header(&mut Cursor::new(b"IIFI\x02".to_vec())).unwrap_err();
        assert_eq!(err.code(), crate::ErrorCode::UnexpectedEof);
    }
}
