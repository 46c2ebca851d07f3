//! Image file handle and lifecycle.
//!
//! [`ImageFile`] ties the header codec, the variable stores and the scan-line
//! window to one open file. Changes reach storage only through
//! [`ImageFile::close`], which flushes dirty lines, then writes the header
//! and variables, then releases the file.
//!
//! # Example
//!
//! ```no_run
//! use iiff_io::{AccessMode, ComponentBuffer, EngineConfig, ImageFile, ImageSpec};
//!
//! let config = EngineConfig::host();
//! let spec = ImageSpec::parse_components(4, 2, "R:byte,G:byte,B:byte")?;
//! let mut image = ImageFile::create("out.iif", &spec, &config)?;
//!
//! let line = vec![
//!     ComponentBuffer::Byte(vec![10; 4]),
//!     ComponentBuffer::Byte(vec![20; 4]),
//!     ComponentBuffer::Byte(vec![30; 4]),
//! ];
//! image.write_line(0, &line)?;
//! image.put_text_var("Author", "me")?;
//! image.close()?;
//!
//! let image = ImageFile::open("out.iif", AccessMode::Read, &config)?;
//! assert_eq!(image.resolution()?, (4, 2));
//! # Ok::<(), iiff_io::IiffError>(())
//! ```

use crate::component::{Component, ComponentBuffer, ComponentTable, FillValue};
use crate::convert::{Endianness, SwapPolicy};
use crate::detect::Format;
use crate::header::{self, ImageHeader, VERSION_CURRENT};
use crate::layout::Layout;
use crate::vars::{self, VarKind, VarRecord, VarStore};
use crate::window::{self, LineGeometry, PixelCodec, ScanWindow, WHOLE_LINE};
use crate::{EngineConfig, ErrorCode, IiffError, IiffResult, Warning};
use std::cell::Cell;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

/// How a file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    /// Existing file, read only.
    Read,
    /// New file; the image is defined by the caller before use.
    Write,
    /// Existing file, read and write.
    Update,
}

impl AccessMode {
    /// Parses an open-mode string (`r`, `rb`, `w`, `wb`, `w+`, `r+`, `rb+`, `u`, `a`).
    pub fn parse(mode: &str) -> IiffResult<Self> {
        match mode {
            "r" | "rb" => Ok(AccessMode::Read),
            "w" | "wb" | "w+" => Ok(AccessMode::Write),
            "r+" | "rb+" | "u" | "a" => Ok(AccessMode::Update),
            other => Err(IiffError::InvalidParameter(format!("unknown open mode `{}`", other))),
        }
    }

    /// Short name used in messages.
    pub fn name(self) -> &'static str {
        match self {
            AccessMode::Read => "read",
            AccessMode::Write => "write",
            AccessMode::Update => "update",
        }
    }

    /// True if the mode allows changes.
    #[inline]
    pub fn is_writable(self) -> bool {
        !matches!(self, AccessMode::Read)
    }
}

/// Description of a new image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageSpec {
    /// Width in pixels.
    pub width: u32,
    /// Height in scan lines.
    pub height: u32,
    /// Pixel components in storage order.
    pub components: Vec<Component>,
    /// Byte swapping flag stored in the header.
    pub byte_swap: bool,
}

impl ImageSpec {
    /// Creates a spec with byte swapping enabled.
    pub fn new(width: u32, height: u32, components: Vec<Component>) -> Self {
        Self {
            width,
            height,
            components,
            byte_swap: true,
        }
    }

    /// Creates a spec from a `NAME:type,...` list.
    pub fn parse_components(width: u32, height: u32, list: &str) -> IiffResult<Self> {
        let components = list
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(Component::parse)
            .collect::<IiffResult<Vec<_>>>()?;
        Ok(Self::new(width, height, components))
    }

    /// Sets the byte swapping flag.
    pub fn with_byte_swap(mut self, enabled: bool) -> Self {
        self.byte_swap = enabled;
        self
    }
}

/// Pixel-ready state, present once the layout is frozen.
#[derive(Debug)]
struct Image {
    header: ImageHeader,
    codec: PixelCodec,
    window: ScanWindow,
}

/// Settings collected in write mode before initialisation.
#[derive(Debug, Default)]
struct Pending {
    components: Option<ComponentTable>,
    resolution: Option<(u32, u32)>,
    byte_swap: Option<bool>,
}

/// An open IIFF image.
///
/// Every fallible call also records its status, see [`ImageFile::last_error`].
#[derive(Debug)]
pub struct ImageFile {
    path: PathBuf,
    format: Format,
    mode: AccessMode,
    config: EngineConfig,
    file: Option<File>,
    image: Option<Image>,
    pending: Pending,
    system: VarStore,
    user: VarStore,
    fill: Option<Vec<FillValue>>,
    vars_offset: u64,
    header_dirty: bool,
    last: Cell<ErrorCode>,
}

impl ImageFile {
    /// Opens `path` in `mode`.
    ///
    /// Read and update modes load header and variables. Write mode creates
    /// or truncates the file; components and resolution must then be
    /// defined before [`initialize`](Self::initialize).
    ///
    /// TIFF and GIF files open in read mode so their format can be queried;
    /// every other operation on them fails with
    /// [`IiffError::UnsupportedFormat`].
    pub fn open<P: AsRef<Path>>(path: P, mode: AccessMode, config: &EngineConfig) -> IiffResult<Self> {
        let path = path.as_ref();
        trace!(path = %path.display(), mode = mode.name(), "ImageFile::open");

        let format = match mode {
            AccessMode::Write => Format::Iiff,
            AccessMode::Read | AccessMode::Update => Format::detect(path)?,
        };
        match (format, mode) {
            (Format::Iiff, _) => {}
            (Format::Tiff | Format::Gif, AccessMode::Read) => {
                debug!(format = format.name(), "foreign format opened for detection only");
            }
            (other, _) => {
                return Err(IiffError::UnsupportedFormat(format!(
                    "{} is {}",
                    path.display(),
                    other.name()
                )));
            }
        }

        let file = match mode {
            AccessMode::Read => File::open(path)?,
            AccessMode::Update => OpenOptions::new().read(true).write(true).open(path)?,
            AccessMode::Write => OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)
                .map_err(|e| IiffError::from_write(e, "create"))?,
        };

        let mut handle = Self {
            path: path.to_path_buf(),
            format,
            mode,
            config: config.clone(),
            file: Some(file),
            image: None,
            pending: Pending::default(),
            system: VarStore::new(),
            user: VarStore::new(),
            fill: None,
            vars_offset: 0,
            header_dirty: mode == AccessMode::Write,
            last: Cell::new(ErrorCode::Success),
        };

        if format == Format::Iiff && mode != AccessMode::Write {
            handle.load()?;
        }
        Ok(handle)
    }

    /// Creates a new image in one call: open for write, define components and
    /// resolution, then initialise.
    pub fn create<P: AsRef<Path>>(path: P, spec: &ImageSpec, config: &EngineConfig) -> IiffResult<Self> {
        let mut handle = Self::open(path, AccessMode::Write, config)?;
        handle.define_components(spec.components.clone())?;
        handle.set_resolution(spec.width, spec.height)?;
        handle.set_byte_swap(spec.byte_swap)?;
        handle.initialize()?;
        Ok(handle)
    }

    fn load(&mut self) -> IiffResult<()> {
        let file = self.file.as_mut().ok_or(IiffError::BadHandle)?;
        let loaded = header::read_header(file)?;

        debug!(
            width = loaded.header.width,
            height = loaded.header.height,
            components = loaded.header.components.len(),
            version = loaded.header.version,
            user_vars = loaded.user.len(),
            "header loaded"
        );

        let swap = SwapPolicy::new(loaded.header.byte_order, Endianness::native(), loaded.header.swap_enabled);
        let codec = PixelCodec::new(
            loaded.header.components.clone(),
            swap,
            loaded.float_format,
            self.config.float_format,
        )?;
        let window = self.new_window(&loaded.header);

        self.system = loaded.system;
        self.user = loaded.user;
        self.vars_offset = loaded.vars_end;
        self.image = Some(Image {
            header: loaded.header,
            codec,
            window,
        });
        Ok(())
    }

    fn new_window(&self, header: &ImageHeader) -> ScanWindow {
        let geometry = LineGeometry {
            data_offset: header.layout.data_offset as u64,
            width: header.width as usize,
            pixel_size: header.components.pixel_size(),
            height: header.height as usize,
        };
        let lines = window::capped_window_lines(
            geometry.bytes_per_line(),
            self.config.default_window_lines,
            self.config.max_buffer_bytes,
        );
        debug!(lines, bytes_per_line = geometry.bytes_per_line(), "window capacity");
        ScanWindow::new(geometry, lines, self.mode == AccessMode::Write)
    }

    fn track<T>(&self, result: IiffResult<T>) -> IiffResult<T> {
        self.last.set(match &result {
            Ok(_) => ErrorCode::Success,
            Err(e) => e.code(),
        });
        result
    }

    fn track_warning(&self, result: IiffResult<Option<Warning>>) -> IiffResult<Option<Warning>> {
        if let Ok(Some(w)) = &result {
            self.last.set(w.code());
            return result;
        }
        self.track(result)
    }

    fn require_native(&self) -> IiffResult<()> {
        if self.format.is_native() {
            Ok(())
        } else {
            Err(IiffError::UnsupportedFormat(format!("{} images are detected only", self.format.name())))
        }
    }

    fn require_writable(&self, operation: &'static str) -> IiffResult<()> {
        self.require_native()?;
        if self.mode.is_writable() {
            Ok(())
        } else {
            Err(IiffError::InvalidMode {
                operation,
                mode: self.mode.name(),
            })
        }
    }

    fn image(&self, what: &'static str) -> IiffResult<&Image> {
        self.require_native()?;
        self.image.as_ref().ok_or(IiffError::NotInitialized(what))
    }

    fn require_definable(&self, operation: &'static str) -> IiffResult<()> {
        self.require_native()?;
        if self.mode != AccessMode::Write {
            return Err(IiffError::InvalidMode {
                operation,
                mode: self.mode.name(),
            });
        }
        if self.image.is_some() {
            return Err(IiffError::ComponentsFrozen);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Definition (write mode)
    // ------------------------------------------------------------------

    /// Defines the component table of a new image.
    pub fn define_components(&mut self, components: Vec<Component>) -> IiffResult<()> {
        let result = self.require_definable("define_components").and_then(|_| {
            let table = ComponentTable::new(components)?;
            Layout::compute(table.len(), table.joined_names().len())?;
            self.pending.components = Some(table);
            Ok(())
        });
        self.track(result)
    }

    /// Sets the resolution of a new image.
    pub fn set_resolution(&mut self, width: u32, height: u32) -> IiffResult<()> {
        let result = self.require_definable("set_resolution").and_then(|_| {
            if width == 0 || height == 0 {
                return Err(IiffError::InvalidParameter(format!("resolution {}x{}", width, height)));
            }
            self.pending.resolution = Some((width, height));
            Ok(())
        });
        self.track(result)
    }

    /// Enables or disables byte swapping of pixel values.
    ///
    /// Returns [`Warning::SwapIgnored`] when the file already uses the host
    /// byte order, so the flag has no effect on this handle. A writable
    /// handle whose file already holds pixel data keeps its stored flag and
    /// fails with [`IiffError::InvalidMode`]; read handles only change how
    /// this handle decodes.
    pub fn set_byte_swap(&mut self, enabled: bool) -> IiffResult<Option<Warning>> {
        let result = self.set_byte_swap_inner(enabled);
        self.track_warning(result)
    }

    fn set_byte_swap_inner(&mut self, enabled: bool) -> IiffResult<Option<Warning>> {
        self.require_native()?;
        if let Some(image) = &self.image {
            let has_pixels = match self.mode {
                AccessMode::Read => false,
                AccessMode::Write => image.window.is_modified(),
                AccessMode::Update => true,
            };
            if has_pixels && image.header.swap_enabled != enabled {
                return Err(IiffError::InvalidMode {
                    operation: "set_byte_swap",
                    mode: self.mode.name(),
                });
            }
        }
        let file_order = match self.image.as_mut() {
            Some(image) => {
                image.header.swap_enabled = enabled;
                image.codec.set_swap_enabled(enabled);
                image.header.byte_order
            }
            None => {
                self.pending.byte_swap = Some(enabled);
                self.config.byte_order
            }
        };
        if self.mode.is_writable() {
            self.header_dirty = true;
        }
        if file_order == Endianness::native() {
            Ok(Some(Warning::SwapIgnored))
        } else {
            Ok(None)
        }
    }

    /// Freezes components and resolution and prepares the pixel area.
    pub fn initialize(&mut self) -> IiffResult<()> {
        let result = self.initialize_inner();
        self.track(result)
    }

    fn initialize_inner(&mut self) -> IiffResult<()> {
        self.require_definable("initialize")?;
        let components = self
            .pending
            .components
            .clone()
            .ok_or_else(|| IiffError::BadComponent("components not defined".into()))?;
        let (width, height) = self
            .pending
            .resolution
            .ok_or_else(|| IiffError::InvalidParameter("resolution not set".into()))?;

        let layout = Layout::compute(components.len(), components.joined_names().len())?;
        let path = self.path.to_string_lossy();
        let header = ImageHeader {
            version: VERSION_CURRENT,
            byte_order: self.config.byte_order,
            layout,
            width,
            height,
            components: components.clone(),
            swap_enabled: self.pending.byte_swap.unwrap_or(true),
            filename: self.config.base_name(&path).to_string(),
        };
        debug!(
            width,
            height,
            computed = layout.computed,
            header_size = layout.header_size(),
            "image initialized"
        );

        let swap = SwapPolicy::new(header.byte_order, Endianness::native(), header.swap_enabled);
        let codec = PixelCodec::new(components, swap, self.config.float_format, self.config.float_format)?;
        let window = self.new_window(&header);

        self.vars_offset = layout.vars_offset as u64;
        self.image = Some(Image { header, codec, window });
        self.header_dirty = true;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Path the handle was opened with.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Detected format.
    pub fn format(&self) -> Format {
        self.format
    }

    /// Access mode.
    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// Engine configuration of this handle.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Status of the most recent call.
    pub fn last_error(&self) -> ErrorCode {
        self.last.get()
    }

    /// `(width, height)`.
    pub fn resolution(&self) -> IiffResult<(u32, u32)> {
        let result = self.image("resolution").map(|i| (i.header.width, i.header.height));
        self.track(result)
    }

    /// Component table.
    pub fn components(&self) -> IiffResult<&ComponentTable> {
        let result = self.image("components").map(|i| &i.header.components);
        self.track(result)
    }

    /// Header description (layout, byte order, swap flag, filename).
    pub fn header(&self) -> IiffResult<&ImageHeader> {
        let result = self.image("header").map(|i| &i.header);
        self.track(result)
    }

    /// Bytes per scan line.
    pub fn bytes_per_line(&self) -> IiffResult<usize> {
        let result = self.image("bytes_per_line").map(|i| i.header.bytes_per_line());
        self.track(result)
    }

    /// Window height in lines.
    pub fn window_lines(&self) -> IiffResult<usize> {
        let result = self.image("window_lines").map(|i| i.window.capacity());
        self.track(result)
    }

    /// File offset just past the last stored variable record.
    pub fn variables_offset(&self) -> IiffResult<u64> {
        let result = self.require_native().map(|_| self.vars_offset);
        self.track(result)
    }

    // ------------------------------------------------------------------
    // Fill values
    // ------------------------------------------------------------------

    /// Sets one fill value per component.
    pub fn define_fill_values(&mut self, values: Vec<FillValue>) -> IiffResult<()> {
        let result = self.require_native().and_then(|_| {
            let components = match (&self.image, &self.pending.components) {
                (Some(image), _) => &image.header.components,
                (None, Some(pending)) => pending,
                (None, None) => return Err(IiffError::NotInitialized("define_fill_values")),
            };
            window::check_fill_values(components, &values)?;
            self.fill = Some(values);
            Ok(())
        });
        self.track(result)
    }

    /// Removes the fill values.
    pub fn clear_fill_values(&mut self) {
        self.fill = None;
        self.last.set(ErrorCode::Success);
    }

    /// Current fill values.
    pub fn fill_values(&self) -> Option<&[FillValue]> {
        self.fill.as_deref()
    }

    // ------------------------------------------------------------------
    // Pixels
    // ------------------------------------------------------------------

    /// Reads `count` pixels of line `y` starting at `first_pixel`.
    ///
    /// `first_pixel == -1` reads the whole line. Returns pixels read.
    pub fn read_pixels(
        &mut self,
        y: u32,
        first_pixel: i64,
        count: usize,
        dest: &mut [ComponentBuffer],
    ) -> IiffResult<usize> {
        let result = self.read_pixels_inner(y, first_pixel, count, dest);
        self.track(result)
    }

    fn read_pixels_inner(
        &mut self,
        y: u32,
        first_pixel: i64,
        count: usize,
        dest: &mut [ComponentBuffer],
    ) -> IiffResult<usize> {
        self.image("read_pixels")?;
        let file = self.file.as_mut().ok_or(IiffError::BadHandle)?;
        let image = self.image.as_mut().ok_or(IiffError::NotInitialized("read_pixels"))?;
        image
            .window
            .read_pixels(file, &image.codec, y as usize, first_pixel, count, dest)
    }

    /// Reads the whole line `y`.
    pub fn read_line(&mut self, y: u32, dest: &mut [ComponentBuffer]) -> IiffResult<usize> {
        self.read_pixels(y, WHOLE_LINE, 0, dest)
    }

    /// Writes `count` pixels of line `y` starting at `first_pixel`.
    pub fn write_pixels(
        &mut self,
        y: u32,
        first_pixel: i64,
        count: usize,
        src: &[ComponentBuffer],
    ) -> IiffResult<usize> {
        let result = self.write_pixels_inner(y, first_pixel, count, src);
        self.track(result)
    }

    fn write_pixels_inner(
        &mut self,
        y: u32,
        first_pixel: i64,
        count: usize,
        src: &[ComponentBuffer],
    ) -> IiffResult<usize> {
        self.require_writable("write_pixels")?;
        self.image("write_pixels")?;
        let file = self.file.as_mut().ok_or(IiffError::BadHandle)?;
        let image = self.image.as_mut().ok_or(IiffError::NotInitialized("write_pixels"))?;
        image
            .window
            .write_pixels(file, &image.codec, y as usize, first_pixel, count, src)
    }

    /// Writes the whole line `y`.
    pub fn write_line(&mut self, y: u32, src: &[ComponentBuffer]) -> IiffResult<usize> {
        self.write_pixels(y, WHOLE_LINE, 0, src)
    }

    /// Fills `lines` lines from `y` with the fill values over a pixel range.
    ///
    /// `first_pixel == -1` fills whole lines.
    pub fn fill_lines(&mut self, y: u32, lines: u32, first_pixel: i64, count: usize) -> IiffResult<usize> {
        let result = self.fill_lines_inner(y, lines, first_pixel, count);
        self.track(result)
    }

    fn fill_lines_inner(&mut self, y: u32, lines: u32, first_pixel: i64, count: usize) -> IiffResult<usize> {
        self.require_writable("fill_lines")?;
        self.image("fill_lines")?;
        let values = self.fill.as_deref().ok_or(IiffError::FillUndefined)?;
        let file = self.file.as_mut().ok_or(IiffError::BadHandle)?;
        let image = self.image.as_mut().ok_or(IiffError::NotInitialized("fill_lines"))?;
        image.window.fill(
            file,
            &image.codec,
            y as usize,
            lines as usize,
            first_pixel,
            count,
            values,
        )
    }

    /// Writes dirty lines to storage without closing.
    pub fn flush(&mut self) -> IiffResult<usize> {
        let result = self.flush_inner();
        self.track(result)
    }

    fn flush_inner(&mut self) -> IiffResult<usize> {
        self.require_native()?;
        let Some(image) = self.image.as_mut() else {
            return Ok(0);
        };
        let file = self.file.as_mut().ok_or(IiffError::BadHandle)?;
        image.window.flush(file)
    }

    /// Changes the window height.
    ///
    /// Dirty lines are flushed first. If the larger buffer cannot be
    /// allocated, smaller sizes are tried and [`IiffError::NoMemory`] is
    /// returned with the handle still usable.
    pub fn set_window_lines(&mut self, lines: usize) -> IiffResult<usize> {
        let result = self.set_window_lines_inner(lines);
        self.track(result)
    }

    fn set_window_lines_inner(&mut self, lines: usize) -> IiffResult<usize> {
        self.image("set_window_lines")?;
        let file = self.file.as_mut().ok_or(IiffError::BadHandle)?;
        let image = self.image.as_mut().ok_or(IiffError::NotInitialized("set_window_lines"))?;
        image.window.set_capacity(file, lines)
    }

    // ------------------------------------------------------------------
    // Variables
    // ------------------------------------------------------------------

    /// Stores a text user variable.
    pub fn put_text_var(&mut self, name: &str, value: &str) -> IiffResult<Option<Warning>> {
        let result = self.put_var(VarRecord::text(name, value));
        self.track_warning(result)
    }

    /// Stores a binary user variable.
    pub fn put_binary_var(&mut self, name: &str, value: &[u8]) -> IiffResult<Option<Warning>> {
        let result = self.put_var(VarRecord::binary(name, value));
        self.track_warning(result)
    }

    fn put_var(&mut self, record: VarRecord) -> IiffResult<Option<Warning>> {
        self.require_writable("put_var")?;
        if vars::is_reserved(&record.name) {
            return Err(IiffError::ReservedName(record.name));
        }
        let name = record.name.clone();
        let warning = self.user.put(record)?;
        if warning.is_some() {
            warn!(name = %name, "variable overwritten");
        }
        self.header_dirty = true;
        Ok(warning)
    }

    /// Reads a user variable as text.
    ///
    /// A binary variable is returned lossily decoded along with
    /// [`Warning::WrongVarKind`].
    pub fn get_text_var(&self, name: &str) -> IiffResult<(String, Option<Warning>)> {
        let result = self.get_var(name).map(|r| {
            let text = String::from_utf8_lossy(&r.value).into_owned();
            (text, (r.kind != VarKind::Text).then_some(Warning::WrongVarKind))
        });
        self.track_pair(result)
    }

    /// Reads a user variable as bytes.
    ///
    /// A text variable is returned as its UTF-8 bytes along with
    /// [`Warning::WrongVarKind`].
    pub fn get_binary_var(&self, name: &str) -> IiffResult<(Vec<u8>, Option<Warning>)> {
        let result = self
            .get_var(name)
            .map(|r| (r.value.clone(), (r.kind != VarKind::Binary).then_some(Warning::WrongVarKind)));
        self.track_pair(result)
    }

    fn get_var(&self, name: &str) -> IiffResult<&VarRecord> {
        self.require_native()?;
        self.user
            .get(name)
            .ok_or_else(|| IiffError::VarNotFound(name.to_string()))
    }

    fn track_pair<T>(&self, result: IiffResult<(T, Option<Warning>)>) -> IiffResult<(T, Option<Warning>)> {
        match &result {
            Ok((_, Some(w))) => self.last.set(w.code()),
            Ok((_, None)) => self.last.set(ErrorCode::Success),
            Err(e) => self.last.set(e.code()),
        }
        result
    }

    /// Removes a user variable.
    pub fn remove_var(&mut self, name: &str) -> IiffResult<()> {
        let result = self.require_writable("remove_var").and_then(|_| {
            if vars::is_reserved(name) {
                return Err(IiffError::ReservedName(name.to_string()));
            }
            self.user
                .remove(name)
                .ok_or_else(|| IiffError::VarNotFound(name.to_string()))?;
            self.header_dirty = true;
            Ok(())
        });
        self.track(result)
    }

    /// User variables in stored order.
    pub fn user_vars(&self) -> IiffResult<impl Iterator<Item = &VarRecord>> {
        let result = self.require_native().map(|_| self.user.iter());
        self.track(result)
    }

    /// System variables in stored order.
    pub fn system_vars(&self) -> IiffResult<impl Iterator<Item = &VarRecord>> {
        let result = self.require_native().map(|_| self.system.iter());
        self.track(result)
    }

    /// Looks up a system variable.
    pub fn system_var(&self, name: &str) -> IiffResult<Option<&VarRecord>> {
        let result = self.require_native().map(|_| self.system.get(name));
        self.track(result)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Flushes pixels, writes header and variables, and releases the file.
    pub fn close(mut self) -> IiffResult<()> {
        trace!(path = %self.path.display(), mode = self.mode.name(), "ImageFile::close");
        let result = self.finish();
        if let Err(e) = &result {
            warn!(path = %self.path.display(), error = %e, "close failed");
        }
        self.track(result)
    }

    fn finish(&mut self) -> IiffResult<()> {
        let Some(mut file) = self.file.take() else {
            return Err(IiffError::BadHandle);
        };
        if !self.format.is_native() || !self.mode.is_writable() {
            return Ok(());
        }
        let Some(image) = self.image.as_mut() else {
            return Err(IiffError::NotInitialized("close"));
        };

        let lines = image.window.flush(&mut file)?;
        debug!(lines, "final flush");

        if !self.header_dirty {
            return file.flush().map_err(|e| IiffError::from_write(e, "close"));
        }

        image.header.version = VERSION_CURRENT;
        self.system.clear();
        for record in header::system_records(&image.header, &self.config) {
            self.system.put(record)?;
        }

        let written = header::write_header(&mut file, &image.header, &self.system, &self.user)?;
        file.set_len(written.file_end)
            .map_err(|e| IiffError::from_write(e, "truncate"))?;
        self.vars_offset = written.vars_end;
        self.header_dirty = false;
        debug!(vars_end = written.vars_end, file_end = written.file_end, "header written");
        Ok(())
    }
}

impl Drop for ImageFile {
    fn drop(&mut self) {
        if self.file.is_some() && self.mode.is_writable() && self.format.is_native() {
            warn!(path = %self.path.display(), "image dropped without close, changes discarded");
        }
    }
}
