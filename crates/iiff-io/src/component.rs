//! Pixel components: names, type codes, fill values and sample buffers.
//!
//! A pixel is a fixed sequence of named components. Each component has a
//! type code that fixes its byte size; the on-disk scan line stores the
//! components of one pixel next to each other in table order.

use crate::{IiffError, IiffResult};
use smallvec::SmallVec;
use std::fmt;

/// Component data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentType {
    /// 8-bit text character.
    Ascii,
    /// 8-bit unsigned integer.
    Byte,
    /// 16-bit signed integer.
    Short,
    /// 32-bit signed integer.
    Long,
    /// 32-bit float.
    Float,
    /// 64-bit float.
    Double,
}

impl ComponentType {
    /// Size of one sample in bytes.
    #[inline]
    pub fn byte_size(self) -> usize {
        match self {
            ComponentType::Ascii | ComponentType::Byte => 1,
            ComponentType::Short => 2,
            ComponentType::Long | ComponentType::Float => 4,
            ComponentType::Double => 8,
        }
    }

    /// Character used in the `IIF_Types` variable.
    pub fn code(self) -> char {
        match self {
            ComponentType::Ascii => 'a',
            ComponentType::Byte => 'b',
            ComponentType::Short => 's',
            ComponentType::Long => 'l',
            ComponentType::Float => 'f',
            ComponentType::Double => 'd',
        }
    }

    /// Parses a type character.
    pub fn from_code(c: char) -> Option<Self> {
        match c {
            'a' => Some(ComponentType::Ascii),
            'b' => Some(ComponentType::Byte),
            's' => Some(ComponentType::Short),
            'l' => Some(ComponentType::Long),
            'f' => Some(ComponentType::Float),
            'd' => Some(ComponentType::Double),
            _ => None,
        }
    }

    /// Type assumed for files that predate the type variable.
    pub fn from_byte_size(size: usize) -> Option<Self> {
        match size {
            1 => Some(ComponentType::Byte),
            2 => Some(ComponentType::Short),
            4 => Some(ComponentType::Long),
            8 => Some(ComponentType::Double),
            _ => None,
        }
    }

    /// True for floating-point types.
    #[inline]
    pub fn is_float(self) -> bool {
        matches!(self, ComponentType::Float | ComponentType::Double)
    }

    /// Lower-case name as used on the command line.
    pub fn name(self) -> &'static str {
        match self {
            ComponentType::Ascii => "ascii",
            ComponentType::Byte => "byte",
            ComponentType::Short => "short",
            ComponentType::Long => "long",
            ComponentType::Float => "float",
            ComponentType::Double => "double",
        }
    }

    /// Parses a type name (`byte`, `short`, ...).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "ascii" => Some(ComponentType::Ascii),
            "byte" => Some(ComponentType::Byte),
            "short" => Some(ComponentType::Short),
            "long" => Some(ComponentType::Long),
            "float" => Some(ComponentType::Float),
            "double" => Some(ComponentType::Double),
            _ => None,
        }
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One named, typed channel of a pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    /// Channel name (no commas or NULs).
    pub name: String,
    /// Sample type.
    pub ty: ComponentType,
}

impl Component {
    /// Creates a component.
    pub fn new(name: impl Into<String>, ty: ComponentType) -> Self {
        Self { name: name.into(), ty }
    }

    /// Size of one sample in bytes.
    #[inline]
    pub fn byte_size(&self) -> usize {
        self.ty.byte_size()
    }

    /// Parses `NAME:type`, e.g. `R:byte`.
    pub fn parse(spec: &str) -> IiffResult<Self> {
        let (name, ty) = spec
            .split_once(':')
            .ok_or_else(|| IiffError::BadComponent(format!("expected NAME:type, got `{}`", spec)))?;
        let ty = ComponentType::from_name(ty.trim())
            .ok_or_else(|| IiffError::BadComponent(format!("unknown component type `{}`", ty)))?;
        Ok(Self::new(name.trim(), ty))
    }
}

/// Ordered component table with per-component offsets inside a pixel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentTable {
    components: SmallVec<[Component; 4]>,
    offsets: SmallVec<[usize; 4]>,
    pixel_size: usize,
}

impl ComponentTable {
    /// Builds and validates a table.
    pub fn new(components: Vec<Component>) -> IiffResult<Self> {
        if components.is_empty() {
            return Err(IiffError::BadComponent("at least one component is required".into()));
        }
        let mut offsets = SmallVec::with_capacity(components.len());
        let mut pixel_size = 0usize;
        for c in &components {
            if c.name.is_empty() {
                return Err(IiffError::BadComponent("empty component name".into()));
            }
            if c.name.contains(',') || c.name.contains('\0') {
                return Err(IiffError::BadComponent(format!(
                    "component name `{}` contains a separator",
                    c.name.escape_default()
                )));
            }
            offsets.push(pixel_size);
            pixel_size += c.byte_size();
        }
        Ok(Self {
            components: components.into_iter().collect(),
            offsets,
            pixel_size,
        })
    }

    /// Number of components.
    #[inline]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// True if the table has no components.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Component at `index`.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&Component> {
        self.components.get(index)
    }

    /// Iterates over components in order.
    pub fn iter(&self) -> impl Iterator<Item = &Component> {
        self.components.iter()
    }

    /// Byte offset of component `index` inside a pixel.
    #[inline]
    pub fn offset(&self, index: usize) -> usize {
        self.offsets[index]
    }

    /// Bytes per pixel.
    #[inline]
    pub fn pixel_size(&self) -> usize {
        self.pixel_size
    }

    /// Names joined by commas, as stored in the header.
    pub fn joined_names(&self) -> String {
        self.components
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Type characters, as stored in `IIF_Types`.
    pub fn type_string(&self) -> String {
        self.components.iter().map(|c| c.ty.code()).collect()
    }

    /// Index of the component named `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.components.iter().position(|c| c.name == name)
    }
}

/// Fill value for one component, tagged by type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FillValue {
    /// Text character.
    Ascii(u8),
    /// Unsigned byte.
    Byte(u8),
    /// 16-bit integer.
    Short(i16),
    /// 32-bit integer.
    Long(i32),
    /// 32-bit float.
    Float(f32),
    /// 64-bit float.
    Double(f64),
}

impl FillValue {
    /// Type this value belongs to.
    pub fn ty(&self) -> ComponentType {
        match self {
            FillValue::Ascii(_) => ComponentType::Ascii,
            FillValue::Byte(_) => ComponentType::Byte,
            FillValue::Short(_) => ComponentType::Short,
            FillValue::Long(_) => ComponentType::Long,
            FillValue::Float(_) => ComponentType::Float,
            FillValue::Double(_) => ComponentType::Double,
        }
    }

    /// Converts a number into the value variant for `ty`.
    ///
    /// Integers saturate at the type's bounds.
    pub fn from_f64(ty: ComponentType, v: f64) -> Self {
        match ty {
            ComponentType::Ascii => FillValue::Ascii(v.clamp(0.0, 255.0) as u8),
            ComponentType::Byte => FillValue::Byte(v.clamp(0.0, 255.0) as u8),
            ComponentType::Short => FillValue::Short(v.clamp(i16::MIN as f64, i16::MAX as f64) as i16),
            ComponentType::Long => FillValue::Long(v.clamp(i32::MIN as f64, i32::MAX as f64) as i32),
            ComponentType::Float => FillValue::Float(v as f32),
            ComponentType::Double => FillValue::Double(v),
        }
    }

    /// Host-order encoding of the value.
    pub fn to_ne_bytes(&self) -> SmallVec<[u8; 8]> {
        match *self {
            FillValue::Ascii(v) | FillValue::Byte(v) => SmallVec::from_slice(&[v]),
            FillValue::Short(v) => SmallVec::from_slice(&v.to_ne_bytes()),
            FillValue::Long(v) => SmallVec::from_slice(&v.to_ne_bytes()),
            FillValue::Float(v) => SmallVec::from_slice(&v.to_ne_bytes()),
            FillValue::Double(v) => SmallVec::from_slice(&v.to_ne_bytes()),
        }
    }
}

/// Caller-side samples of one component for a run of pixels.
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentBuffer {
    /// Text characters.
    Ascii(Vec<u8>),
    /// Unsigned bytes.
    Byte(Vec<u8>),
    /// 16-bit integers.
    Short(Vec<i16>),
    /// 32-bit integers.
    Long(Vec<i32>),
    /// 32-bit floats.
    Float(Vec<f32>),
    /// 64-bit floats.
    Double(Vec<f64>),
}

impl ComponentBuffer {
    /// Creates a zeroed buffer of `len` samples for `ty`.
    pub fn zeroed(ty: ComponentType, len: usize) -> Self {
        match ty {
            ComponentType::Ascii => ComponentBuffer::Ascii(vec![0; len]),
            ComponentType::Byte => ComponentBuffer::Byte(vec![0; len]),
            ComponentType::Short => ComponentBuffer::Short(vec![0; len]),
            ComponentType::Long => ComponentBuffer::Long(vec![0; len]),
            ComponentType::Float => ComponentBuffer::Float(vec![0.0; len]),
            ComponentType::Double => ComponentBuffer::Double(vec![0.0; len]),
        }
    }

    /// Creates zeroed buffers matching every component of `table`.
    pub fn for_table(table: &ComponentTable, len: usize) -> Vec<Self> {
        table.iter().map(|c| Self::zeroed(c.ty, len)).collect()
    }

    /// Type of the samples held.
    pub fn ty(&self) -> ComponentType {
        match self {
            ComponentBuffer::Ascii(_) => ComponentType::Ascii,
            ComponentBuffer::Byte(_) => ComponentType::Byte,
            ComponentBuffer::Short(_) => ComponentType::Short,
            ComponentBuffer::Long(_) => ComponentType::Long,
            ComponentBuffer::Float(_) => ComponentType::Float,
            ComponentBuffer::Double(_) => ComponentType::Double,
        }
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        match self {
            ComponentBuffer::Ascii(v) | ComponentBuffer::Byte(v) => v.len(),
            ComponentBuffer::Short(v) => v.len(),
            ComponentBuffer::Long(v) => v.len(),
            ComponentBuffer::Float(v) => v.len(),
            ComponentBuffer::Double(v) => v.len(),
        }
    }

    /// True if no samples are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sample `i` widened to `f64` (for display and tests).
    pub fn get_f64(&self, i: usize) -> Option<f64> {
        match self {
            ComponentBuffer::Ascii(v) | ComponentBuffer::Byte(v) => v.get(i).map(|&x| x as f64),
            ComponentBuffer::Short(v) => v.get(i).map(|&x| x as f64),
            ComponentBuffer::Long(v) => v.get(i).map(|&x| x as f64),
            ComponentBuffer::Float(v) => v.get(i).map(|&x| x as f64),
            ComponentBuffer::Double(v) => v.get(i).copied(),
        }
    }

    /// Decodes sample `i` from host-order bytes.
    pub(crate) fn set_from_ne(&mut self, i: usize, b: &[u8]) {
        match self {
            ComponentBuffer::Ascii(v) | ComponentBuffer::Byte(v) => v[i] = b[0],
            ComponentBuffer::Short(v) => v[i] = i16::from_ne_bytes([b[0], b[1]]),
            ComponentBuffer::Long(v) => v[i] = i32::from_ne_bytes([b[0], b[1], b[2], b[3]]),
            ComponentBuffer::Float(v) => v[i] = f32::from_ne_bytes([b[0], b[1], b[2], b[3]]),
            ComponentBuffer::Double(v) => {
                v[i] = f64::from_ne_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
            }
        }
    }

    /// Encodes sample `i` into host-order bytes.
    pub(crate) fn ne_bytes(&self, i: usize) -> SmallVec<[u8; 8]> {
        match self {
            ComponentBuffer::Ascii(v) | ComponentBuffer::Byte(v) => SmallVec::from_slice(&[v[i]]),
            ComponentBuffer::Short(v) => SmallVec::from_slice(&v[i].to_ne_bytes()),
            ComponentBuffer::Long(v) => SmallVec::from_slice(&v[i].to_ne_bytes()),
            ComponentBuffer::Float(v) => SmallVec::from_slice(&v[i].to_ne_bytes()),
            ComponentBuffer::Double(v) => SmallVec::from_slice(&v[i].to_ne_bytes()),
        }
    }
}
