//! # iiff-io
//!
//! Storage engine for IIFF raster images.
//!
//! An IIFF file holds one image: a header describing the resolution and the
//! per-pixel component table, the pixel data as interleaved scan lines, and
//! any number of named text or binary variables.
//!
//! # Architecture
//!
//! - [`layout`] - Header field offsets (fixed legacy or computed layout)
//! - [`convert`] - Byte order and float format conversion
//! - [`vars`] - Variable stores and their on-disk records
//! - [`header`] - Header codec, including variable continuation
//! - [`window`] - Scan-line window with dirty-line tracking
//! - [`ImageFile`] - Open image handle and lifecycle
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use iiff_io::{AccessMode, ComponentBuffer, EngineConfig, ImageFile};
//!
//! let config = EngineConfig::from_env();
//! let mut image = ImageFile::open("scan.iif", AccessMode::Read, &config)?;
//! let (width, _height) = image.resolution()?;
//!
//! let mut line = ComponentBuffer::for_table(image.components()?, width as usize);
//! image.read_line(0, &mut line)?;
//! image.close()?;
//! # Ok::<(), iiff_io::IiffError>(())
//! ```
//!
//! # Foreign Formats
//!
//! TIFF and GIF files are recognised by [`Format::detect`] and can be opened
//! for reading, but every image operation on them reports
//! [`ErrorCode::UnsupportedFormat`].

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod config;
mod detect;
mod error;
mod file;

pub mod component;
pub mod convert;
pub mod header;
pub mod layout;
pub mod vars;
pub mod window;

pub use component::{Component, ComponentBuffer, ComponentTable, ComponentType, FillValue};
pub use config::{
    DEFAULT_MAX_BUFFER_BYTES, DEFAULT_WINDOW_LINES, ENV_MAX_BUFFER, ENV_WINDOW_LINES, EngineConfig,
};
pub use convert::{Endianness, FloatFormat};
pub use detect::{Format, MARKER_BIG, MARKER_LITTLE};
pub use error::{ErrorCode, IiffError, IiffResult, Warning};
pub use file::{AccessMode, ImageFile, ImageSpec};
pub use layout::Layout;
pub use vars::{VarKind, VarRecord, VarStore};
pub use window::WHOLE_LINE;
