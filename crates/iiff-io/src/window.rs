//! Scan-line window buffer manager.
//!
//! An open image holds at most one contiguous run of scan lines in memory.
//! Lines are loaded on demand when a caller touches a line outside the
//! current window; modified lines are tracked per line and only those are
//! written back, in coalesced runs.
//!
//! ```text
//! file:   [header][line 0][line 1] ... [line h-1][continued variables]
//!                          \___ window ___/
//!                          first_line .. first_line + valid_lines
//! ```
//!
//! The window does not own the storage; every I/O operation takes the
//! backing stream as an argument so the handle keeps a single file.

use crate::component::{ComponentBuffer, ComponentTable, FillValue};
use crate::convert::{FloatConvertFn, FloatFormat, SwapPolicy, float_converter};
use crate::{IiffError, IiffResult};
use smallvec::SmallVec;
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use tracing::{debug, trace, warn};

/// First-pixel value meaning "the whole line".
pub const WHOLE_LINE: i64 = -1;

/// Largest window height not exceeding `max_bytes`.
///
/// Starts from `requested` and shrinks one line at a time; never returns
/// less than one line.
pub fn capped_window_lines(bytes_per_line: usize, requested: usize, max_bytes: usize) -> usize {
    let mut lines = requested.max(1);
    while lines > 1 && bytes_per_line.saturating_mul(lines) > max_bytes {
        lines -= 1;
    }
    lines
}

/// Window heights to try, in order, when growing from `current` to
/// `requested` lines.
///
/// Growing falls back to the midpoint and then to the current size.
/// Shrinking has no fallback.
pub fn fallback_sizes(requested: usize, current: usize) -> SmallVec<[usize; 3]> {
    let mut sizes = SmallVec::new();
    sizes.push(requested);
    if requested > current {
        let mid = current + (requested - current) / 2;
        if mid != requested && mid != current {
            sizes.push(mid);
        }
        sizes.push(current);
    }
    sizes
}

/// Allocates a zeroed buffer, reporting failure instead of aborting.
pub(crate) fn try_alloc(bytes: usize) -> Option<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(bytes).ok()?;
    buf.resize(bytes, 0);
    Some(buf)
}

/// Pixel data geometry inside the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineGeometry {
    /// Offset of line 0.
    pub data_offset: u64,
    /// Pixels per line.
    pub width: usize,
    /// Bytes per pixel.
    pub pixel_size: usize,
    /// Number of lines.
    pub height: usize,
}

impl LineGeometry {
    /// Bytes per scan line.
    #[inline]
    pub fn bytes_per_line(&self) -> usize {
        self.width * self.pixel_size
    }

    /// File offset of line `y`.
    #[inline]
    pub fn line_offset(&self, y: usize) -> u64 {
        self.data_offset + y as u64 * self.bytes_per_line() as u64
    }

    /// Resolves a `(first_pixel, count)` request into a pixel range.
    ///
    /// [`WHOLE_LINE`] selects the full line and ignores `count`.
    pub fn pixel_range(&self, first_pixel: i64, count: usize) -> IiffResult<(usize, usize)> {
        if first_pixel == WHOLE_LINE {
            return Ok((0, self.width));
        }
        let first = usize::try_from(first_pixel)
            .map_err(|_| IiffError::InvalidParameter(format!("first pixel {}", first_pixel)))?;
        match first.checked_add(count) {
            Some(end) if end <= self.width => Ok((first, count)),
            _ => Err(IiffError::InvalidParameter(format!(
                "pixels {}..{}+{} outside width {}",
                first, first, count, self.width
            ))),
        }
    }
}

/// Conversion between file bytes and caller samples.
///
/// Swap and float conversion decisions live here and nowhere else, so each
/// value is converted exactly once per direction.
#[derive(Debug, Clone)]
pub struct PixelCodec {
    components: ComponentTable,
    swap: SwapPolicy,
    to_host: Option<FloatConvertFn>,
    to_file: Option<FloatConvertFn>,
}

impl PixelCodec {
    /// Builds a codec. Float strategies are selected only when the table
    /// holds float components; a missing strategy fails here.
    pub fn new(
        components: ComponentTable,
        swap: SwapPolicy,
        file_float: FloatFormat,
        host_float: FloatFormat,
    ) -> IiffResult<Self> {
        let has_float = components.iter().any(|c| c.ty.is_float());
        let (to_host, to_file) = if has_float {
            (
                Some(float_converter(file_float, host_float)?),
                Some(float_converter(host_float, file_float)?),
            )
        } else {
            (None, None)
        };
        Ok(Self { components, swap, to_host, to_file })
    }

    /// Component table.
    pub fn components(&self) -> &ComponentTable {
        &self.components
    }

    /// Swap decision.
    pub fn swap(&self) -> SwapPolicy {
        self.swap
    }

    /// Turns byte swapping on or off for later transfers.
    pub fn set_swap_enabled(&mut self, enabled: bool) {
        self.swap.enabled = enabled;
    }

    fn decode(&self, index: usize, raw: &[u8], out: &mut ComponentBuffer, at: usize) {
        let mut bytes: SmallVec<[u8; 8]> = SmallVec::from_slice(raw);
        let width = bytes.len();
        self.swap.apply(&mut bytes, width);
        if let (true, Some(convert)) = (self.is_float(index), self.to_host) {
            convert(&mut bytes, width);
        }
        out.set_from_ne(at, &bytes);
    }

    fn encode(&self, index: usize, mut bytes: SmallVec<[u8; 8]>, raw: &mut [u8]) {
        let width = bytes.len();
        if let (true, Some(convert)) = (self.is_float(index), self.to_file) {
            convert(&mut bytes, width);
        }
        self.swap.apply(&mut bytes, width);
        raw.copy_from_slice(&bytes);
    }

    fn is_float(&self, index: usize) -> bool {
        self.components.get(index).is_some_and(|c| c.ty.is_float())
    }

    /// Encodes one pixel of fill values into file bytes.
    pub fn encode_pixel(&self, values: &[FillValue]) -> IiffResult<Vec<u8>> {
        check_fill_values(&self.components, values)?;
        let mut pixel = vec![0u8; self.components.pixel_size()];
        for (i, (c, v)) in self.components.iter().zip(values).enumerate() {
            let start = self.components.offset(i);
            self.encode(i, v.to_ne_bytes(), &mut pixel[start..start + c.byte_size()]);
        }
        Ok(pixel)
    }

    fn check_buffers(&self, buffers: &[ComponentBuffer], count: usize) -> IiffResult<()> {
        if buffers.len() != self.components.len() {
            return Err(IiffError::InvalidParameter(format!(
                "{} buffers for {} components",
                buffers.len(),
                self.components.len()
            )));
        }
        for (c, b) in self.components.iter().zip(buffers) {
            if b.ty() != c.ty {
                return Err(IiffError::InvalidParameter(format!(
                    "buffer for `{}` holds {} samples, component is {}",
                    c.name,
                    b.ty(),
                    c.ty
                )));
            }
            if b.len() < count {
                return Err(IiffError::InvalidParameter(format!(
                    "buffer for `{}` holds {} samples, need {}",
                    c.name,
                    b.len(),
                    count
                )));
            }
        }
        Ok(())
    }
}

/// Checks that `values` has one value of the right type per component.
pub fn check_fill_values(components: &ComponentTable, values: &[FillValue]) -> IiffResult<()> {
    if values.len() != components.len() {
        return Err(IiffError::BadComponent(format!(
            "{} fill values for {} components",
            values.len(),
            components.len()
        )));
    }
    for (c, v) in components.iter().zip(values) {
        if v.ty() != c.ty {
            return Err(IiffError::BadComponent(format!(
                "fill value for `{}` is {}, component is {}",
                c.name,
                v.ty(),
                c.ty
            )));
        }
    }
    Ok(())
}

/// In-memory window over a run of scan lines.
///
/// The buffer stays empty until the first line access; that transition also
/// allocates the per-line dirty bits.
#[derive(Debug)]
pub struct ScanWindow {
    geometry: LineGeometry,
    write_only: bool,
    capacity: usize,
    buf: Vec<u8>,
    first_line: usize,
    valid_lines: usize,
    dirty: Vec<bool>,
    stored: Vec<bool>,
    modified: bool,
}

impl ScanWindow {
    /// Creates an unallocated window of `capacity` lines.
    ///
    /// A write-only window never reads lines this session has not written.
    pub fn new(geometry: LineGeometry, capacity: usize, write_only: bool) -> Self {
        Self {
            geometry,
            write_only,
            capacity: capacity.clamp(1, geometry.height.max(1)),
            buf: Vec::new(),
            first_line: 0,
            valid_lines: 0,
            dirty: Vec::new(),
            stored: Vec::new(),
            modified: false,
        }
    }

    /// Geometry of the pixel area.
    pub fn geometry(&self) -> &LineGeometry {
        &self.geometry
    }

    /// Window height in lines.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// First line held.
    pub fn first_line(&self) -> usize {
        self.first_line
    }

    /// Lines actually held (less than capacity only at the end of the image).
    pub fn valid_lines(&self) -> usize {
        self.valid_lines
    }

    /// True once a buffer has been allocated.
    pub fn is_active(&self) -> bool {
        !self.buf.is_empty()
    }

    /// True if any pixel was written or filled since the handle opened.
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// True if line `y` has unflushed changes.
    pub fn is_dirty(&self, y: usize) -> bool {
        self.dirty.get(y).copied().unwrap_or(false)
    }

    /// Number of lines with unflushed changes.
    pub fn dirty_count(&self) -> usize {
        self.dirty.iter().filter(|&&d| d).count()
    }

    #[inline]
    fn contains(&self, y: usize) -> bool {
        y >= self.first_line && y < self.first_line + self.valid_lines
    }

    fn line_bytes(&self, y: usize) -> std::ops::Range<usize> {
        let bpl = self.geometry.bytes_per_line();
        let start = (y - self.first_line) * bpl;
        start..start + bpl
    }

    /// Makes line `y` resident, flushing and moving the window if needed.
    pub fn ensure_line<S: Read + Write + Seek>(&mut self, io: &mut S, y: usize) -> IiffResult<()> {
        if y >= self.geometry.height {
            return Err(IiffError::InvalidParameter(format!(
                "line {} outside height {}",
                y, self.geometry.height
            )));
        }

        if self.buf.is_empty() {
            let bytes = self.capacity * self.geometry.bytes_per_line();
            self.buf = try_alloc(bytes).ok_or(IiffError::NoMemory(bytes))?;
            self.dirty = vec![false; self.geometry.height];
            self.stored = vec![false; self.geometry.height];
            self.valid_lines = 0;
            debug!(lines = self.capacity, bytes, "window allocated");
        } else if self.contains(y) {
            return Ok(());
        }

        self.flush(io)?;

        self.first_line = y;
        self.valid_lines = self.capacity.min(self.geometry.height - y);
        trace!(first = self.first_line, lines = self.valid_lines, "window::move");
        self.load(io)
    }

    fn load<S: Read + Seek>(&mut self, io: &mut S) -> IiffResult<()> {
        let len = self.valid_lines * self.geometry.bytes_per_line();
        let range = self.first_line..self.first_line + self.valid_lines;

        if self.write_only && !self.stored[range].iter().any(|&s| s) {
            self.buf[..len].fill(0);
            return Ok(());
        }

        io.seek(SeekFrom::Start(self.geometry.line_offset(self.first_line)))
            .map_err(|e| IiffError::from_read(e, "window seek"))?;

        // Lines past the end of the file read as zero.
        let buf = &mut self.buf[..len];
        let mut filled = 0;
        while filled < len {
            match io.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(IiffError::from_read(e, "window load")),
            }
        }
        buf[filled..].fill(0);
        Ok(())
    }

    /// Writes dirty lines of the current window, one call per dirty run.
    ///
    /// The first I/O failure aborts the remaining runs; lines of the failed
    /// and later runs stay dirty. Returns the number of lines written.
    pub fn flush<S: Write + Seek>(&mut self, io: &mut S) -> IiffResult<usize> {
        if self.buf.is_empty() {
            return Ok(0);
        }

        let bpl = self.geometry.bytes_per_line();
        let end = self.first_line + self.valid_lines;
        let mut y = self.first_line;
        let mut written = 0;

        while y < end {
            if !self.dirty[y] {
                y += 1;
                continue;
            }
            let start = y;
            while y < end && self.dirty[y] {
                y += 1;
            }

            let bytes = &self.buf[(start - self.first_line) * bpl..(y - self.first_line) * bpl];
            io.seek(SeekFrom::Start(self.geometry.line_offset(start)))
                .map_err(|e| IiffError::from_write(e, "flush seek"))?;
            io.write_all(bytes)
                .map_err(|e| IiffError::from_write(e, "scan lines"))?;
            debug!(first = start, lines = y - start, "flushed dirty run");

            for line in start..y {
                self.dirty[line] = false;
                self.stored[line] = true;
            }
            written += y - start;
        }

        Ok(written)
    }

    /// Copies pixels of line `y` into per-component buffers.
    ///
    /// Returns the number of pixels transferred.
    pub fn read_pixels<S: Read + Write + Seek>(
        &mut self,
        io: &mut S,
        codec: &PixelCodec,
        y: usize,
        first_pixel: i64,
        count: usize,
        dest: &mut [ComponentBuffer],
    ) -> IiffResult<usize> {
        let (first, count) = self.geometry.pixel_range(first_pixel, count)?;
        codec.check_buffers(dest, count)?;
        self.ensure_line(io, y)?;

        let ps = self.geometry.pixel_size;
        let line = &self.buf[self.line_bytes(y)];
        let table = codec.components();
        for p in 0..count {
            let pixel = &line[(first + p) * ps..(first + p + 1) * ps];
            for (i, out) in dest.iter_mut().enumerate() {
                let start = table.offset(i);
                let size = out.ty().byte_size();
                codec.decode(i, &pixel[start..start + size], out, p);
            }
        }
        Ok(count)
    }

    /// Copies pixels from per-component buffers into line `y`.
    ///
    /// Marks the line dirty. Returns the number of pixels transferred.
    pub fn write_pixels<S: Read + Write + Seek>(
        &mut self,
        io: &mut S,
        codec: &PixelCodec,
        y: usize,
        first_pixel: i64,
        count: usize,
        src: &[ComponentBuffer],
    ) -> IiffResult<usize> {
        let (first, count) = self.geometry.pixel_range(first_pixel, count)?;
        codec.check_buffers(src, count)?;
        self.ensure_line(io, y)?;

        let ps = self.geometry.pixel_size;
        let range = self.line_bytes(y);
        let line = &mut self.buf[range];
        let table = codec.components();
        for p in 0..count {
            let pixel = &mut line[(first + p) * ps..(first + p + 1) * ps];
            for (i, input) in src.iter().enumerate() {
                let start = table.offset(i);
                let size = input.ty().byte_size();
                codec.encode(i, input.ne_bytes(p), &mut pixel[start..start + size]);
            }
        }

        self.dirty[y] = true;
        self.modified = true;
        Ok(count)
    }

    /// Writes `values` over a pixel range of `lines` lines starting at `y`.
    pub fn fill<S: Read + Write + Seek>(
        &mut self,
        io: &mut S,
        codec: &PixelCodec,
        y: usize,
        lines: usize,
        first_pixel: i64,
        count: usize,
        values: &[FillValue],
    ) -> IiffResult<usize> {
        let (first, count) = self.geometry.pixel_range(first_pixel, count)?;
        match y.checked_add(lines) {
            Some(end) if end <= self.geometry.height => {}
            _ => {
                return Err(IiffError::InvalidParameter(format!(
                    "lines {}..{}+{} outside height {}",
                    y, y, lines, self.geometry.height
                )));
            }
        }
        let pixel = codec.encode_pixel(values)?;
        let ps = self.geometry.pixel_size;

        trace!(y, lines, first, count, "window::fill");
        for line_y in y..y + lines {
            self.ensure_line(io, line_y)?;
            let range = self.line_bytes(line_y);
            let line = &mut self.buf[range];
            for chunk in line[first * ps..(first + count) * ps].chunks_exact_mut(ps) {
                chunk.copy_from_slice(&pixel);
            }
            self.dirty[line_y] = true;
            self.modified = true;
        }
        Ok(lines)
    }

    /// Changes the window height, flushing first.
    pub fn set_capacity<S: Read + Write + Seek>(&mut self, io: &mut S, requested: usize) -> IiffResult<usize> {
        self.set_capacity_with(io, requested, try_alloc)
    }

    /// [`set_capacity`](Self::set_capacity) with an explicit allocator.
    ///
    /// When the requested size cannot be allocated, the fallback sizes are
    /// tried in turn; the window ends up valid at the first size that
    /// succeeds and [`IiffError::NoMemory`] is returned.
    pub fn set_capacity_with<S, F>(&mut self, io: &mut S, requested: usize, mut alloc: F) -> IiffResult<usize>
    where
        S: Read + Write + Seek,
        F: FnMut(usize) -> Option<Vec<u8>>,
    {
        if requested == 0 {
            return Err(IiffError::InvalidParameter("window height 0".into()));
        }
        let requested = requested.min(self.geometry.height.max(1));
        if requested == self.capacity {
            return Ok(requested);
        }
        if self.buf.is_empty() {
            self.capacity = requested;
            return Ok(requested);
        }

        self.flush(io)?;

        let bpl = self.geometry.bytes_per_line();
        for candidate in fallback_sizes(requested, self.capacity) {
            if candidate == self.capacity {
                // Keep the existing buffer; its contents are flushed and valid.
                break;
            }
            if let Some(buf) = alloc(candidate * bpl) {
                self.buf = buf;
                self.capacity = candidate;
                self.valid_lines = 0;
                if candidate == requested {
                    debug!(lines = candidate, "window resized");
                    return Ok(candidate);
                }
                warn!(requested, lines = candidate, "window resize fell back");
                return Err(IiffError::NoMemory(requested * bpl));
            }
        }

        warn!(requested, lines = self.capacity, "window resize failed, keeping current size");
        Err(IiffError::NoMemory(requested * bpl))
    }
}
