//! Error types and status codes for IIFF operations.
//!
//! Every engine operation reports a status from one closed enumeration,
//! [`ErrorCode`]. Failures travel as [`IiffError`] through `Result`;
//! advisory conditions travel as [`Warning`] inside `Ok` values and never
//! roll back the operation that produced them. The handle additionally keeps
//! the last status so callers can consult [`ErrorCode::message`] later.

use std::fmt;
use std::io;
use thiserror::Error;

/// Engine failure.
#[derive(Debug, Error)]
pub enum IiffError {
    /// Storage could not be read or written.
    #[error("disk error: {0}")]
    BadDisk(#[source] io::Error),

    /// File ended inside a structure that should have been complete.
    #[error("unexpected end of file: {0}")]
    UnexpectedEof(String),

    /// Fewer bytes reached storage than were handed to it.
    #[error("disk full: {0}")]
    DiskFull(String),

    /// File is not an IIFF image (or is a foreign format this engine only sniffs).
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// File predates the versions this engine can load.
    #[error("file version too old: {0}")]
    OldVersion(String),

    /// Component table is malformed or inconsistent.
    #[error("bad component data: {0}")]
    BadComponent(String),

    /// Variable area is malformed.
    #[error("bad variable data: {0}")]
    BadVariable(String),

    /// Handle is closed or was never opened.
    #[error("bad image handle")]
    BadHandle,

    /// Caller passed an argument outside its valid range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Operation is not allowed in the handle's access mode.
    #[error("operation `{operation}` not allowed in {mode} mode")]
    InvalidMode {
        /// Operation that was attempted.
        operation: &'static str,
        /// Access mode of the handle.
        mode: &'static str,
    },

    /// Accessor called before the image was initialised.
    #[error("image not initialized: {0}")]
    NotInitialized(&'static str),

    /// Caller tried to set an engine-owned variable.
    #[error("variable name `{0}` is reserved")]
    ReservedName(String),

    /// Fill requested without fill values.
    #[error("fill values are undefined")]
    FillUndefined,

    /// Component table or resolution changed after the layout was frozen.
    #[error("components are frozen once the image is initialized")]
    ComponentsFrozen,

    /// Buffer allocation failed.
    #[error("out of memory allocating {0} bytes")]
    NoMemory(usize),

    /// Requested variable does not exist.
    #[error("variable `{0}` not found")]
    VarNotFound(String),
}

impl IiffError {
    /// Returns the status code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            IiffError::BadDisk(_) => ErrorCode::BadDisk,
            IiffError::UnexpectedEof(_) => ErrorCode::UnexpectedEof,
            IiffError::DiskFull(_) => ErrorCode::DiskFull,
            IiffError::UnsupportedFormat(_) => ErrorCode::UnsupportedFormat,
            IiffError::OldVersion(_) => ErrorCode::OldVersion,
            IiffError::BadComponent(_) => ErrorCode::BadComponent,
            IiffError::BadVariable(_) => ErrorCode::BadVariable,
            IiffError::BadHandle => ErrorCode::BadHandle,
            IiffError::InvalidParameter(_) => ErrorCode::InvalidParameter,
            IiffError::InvalidMode { .. } => ErrorCode::InvalidMode,
            IiffError::NotInitialized(_) => ErrorCode::NotInitialized,
            IiffError::ReservedName(_) => ErrorCode::ReservedName,
            IiffError::FillUndefined => ErrorCode::FillUndefined,
            IiffError::ComponentsFrozen => ErrorCode::ComponentsFrozen,
            IiffError::NoMemory(_) => ErrorCode::NoMemory,
            IiffError::VarNotFound(_) => ErrorCode::VarNotFound,
        }
    }

    /// Classifies a failed read.
    pub(crate) fn from_read(err: io::Error, what: &str) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => IiffError::UnexpectedEof(what.to_string()),
            _ => IiffError::BadDisk(err),
        }
    }

    /// Classifies a failed write.
    pub(crate) fn from_write(err: io::Error, what: &str) -> Self {
        match err.kind() {
            io::ErrorKind::StorageFull | io::ErrorKind::WriteZero => {
                IiffError::DiskFull(format!("{}: {}", what, err))
            }
            _ => IiffError::BadDisk(err),
        }
    }
}

impl From<io::Error> for IiffError {
    fn from(err: io::Error) -> Self {
        IiffError::from_read(err, "I/O")
    }
}

/// Result type for IIFF operations.
pub type IiffResult<T> = Result<T, IiffError>;

/// Advisory outcome of an operation that otherwise succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Warning {
    /// A variable with the same name existed and now holds the new value.
    VarOverwritten,
    /// Byte-swap control has no effect in this mode.
    SwapIgnored,
    /// Variable was stored with the other kind (text vs binary).
    WrongVarKind,
}

impl Warning {
    /// Returns the status code for this warning.
    pub fn code(self) -> ErrorCode {
        match self {
            Warning::VarOverwritten => ErrorCode::VarOverwritten,
            Warning::SwapIgnored => ErrorCode::SwapIgnored,
            Warning::WrongVarKind => ErrorCode::WrongVarKind,
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code().message())
    }
}

/// Closed set of status codes.
///
/// Zero is success, positive values are warnings, negative values errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum ErrorCode {
    /// Operation succeeded.
    #[default]
    Success = 0,
    /// Existing variable overwritten.
    VarOverwritten = 1,
    /// Byte-swap request ignored.
    SwapIgnored = 2,
    /// Variable kind differs from accessor.
    WrongVarKind = 3,
    /// Disk unreadable or unwritable.
    BadDisk = -1,
    /// Unexpected end of file.
    UnexpectedEof = -2,
    /// Disk full.
    DiskFull = -3,
    /// Unrecognised or foreign format.
    UnsupportedFormat = -4,
    /// File version too old.
    OldVersion = -5,
    /// Malformed component data.
    BadComponent = -6,
    /// Malformed variable data.
    BadVariable = -7,
    /// Bad handle.
    BadHandle = -8,
    /// Invalid parameter.
    InvalidParameter = -9,
    /// Invalid mode for operation.
    InvalidMode = -10,
    /// Accessor before initialisation.
    NotInitialized = -11,
    /// Reserved variable name.
    ReservedName = -12,
    /// Fill values undefined.
    FillUndefined = -13,
    /// Components frozen.
    ComponentsFrozen = -14,
    /// Out of memory.
    NoMemory = -15,
    /// Variable not found.
    VarNotFound = -16,
}

/// Every code, in table order.
const ALL_CODES: [ErrorCode; 20] = [
    ErrorCode::Success,
    ErrorCode::VarOverwritten,
    ErrorCode::SwapIgnored,
    ErrorCode::WrongVarKind,
    ErrorCode::BadDisk,
    ErrorCode::UnexpectedEof,
    ErrorCode::DiskFull,
    ErrorCode::UnsupportedFormat,
    ErrorCode::OldVersion,
    ErrorCode::BadComponent,
    ErrorCode::BadVariable,
    ErrorCode::BadHandle,
    ErrorCode::InvalidParameter,
    ErrorCode::InvalidMode,
    ErrorCode::NotInitialized,
    ErrorCode::ReservedName,
    ErrorCode::FillUndefined,
    ErrorCode::ComponentsFrozen,
    ErrorCode::NoMemory,
    ErrorCode::VarNotFound,
];

impl ErrorCode {
    /// Returns the numeric code.
    #[inline]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Maps a numeric code back onto the enumeration.
    pub fn from_i32(value: i32) -> Option<Self> {
        ALL_CODES.iter().copied().find(|c| c.as_i32() == value)
    }

    /// True for [`ErrorCode::Success`].
    #[inline]
    pub fn is_success(self) -> bool {
        self == ErrorCode::Success
    }

    /// True for advisory codes.
    #[inline]
    pub fn is_warning(self) -> bool {
        self.as_i32() > 0
    }

    /// True for failure codes.
    #[inline]
    pub fn is_error(self) -> bool {
        self.as_i32() < 0
    }

    /// Short human-readable description.
    pub fn message(self) -> &'static str {
        match self {
            ErrorCode::Success => "no error",
            ErrorCode::VarOverwritten => "existing variable was overwritten",
            ErrorCode::SwapIgnored => "byte swap setting has no effect in this mode",
            ErrorCode::WrongVarKind => "variable has a different data kind than requested",
            ErrorCode::BadDisk => "disk could not be read or written",
            ErrorCode::UnexpectedEof => "unexpected end of file",
            ErrorCode::DiskFull => "disk full",
            ErrorCode::UnsupportedFormat => "unsupported image format",
            ErrorCode::OldVersion => "file version is too old to be supported",
            ErrorCode::BadComponent => "bad component description",
            ErrorCode::BadVariable => "bad variable data",
            ErrorCode::BadHandle => "bad image handle",
            ErrorCode::InvalidParameter => "invalid parameter",
            ErrorCode::InvalidMode => "operation not allowed in this access mode",
            ErrorCode::NotInitialized => "image not initialized",
            ErrorCode::ReservedName => "variable name is reserved for the engine",
            ErrorCode::FillUndefined => "fill values are not defined",
            ErrorCode::ComponentsFrozen => "components cannot change after initialization",
            ErrorCode::NoMemory => "out of memory",
            ErrorCode::VarNotFound => "variable not found",
        }
    }

    /// Iterates over every code in table order.
    pub fn all() -> impl Iterator<Item = ErrorCode> {
        ALL_CODES.iter().copied()
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message(), self.as_i32())
    }
}
