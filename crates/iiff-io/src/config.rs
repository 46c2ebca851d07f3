//! Engine configuration.
//!
//! Platform traits (byte order, float format, platform name, path separator)
//! and buffer limits are supplied as one value when a handle is opened. Each
//! handle keeps its own copy, so independent handles share no mutable state.
//!
//! # Example
//!
//! ```rust
//! use iiff_io::{EngineConfig, Endianness};
//!
//! let config = EngineConfig::host()
//!     .with_window_lines(16)
//!     .with_max_buffer_bytes(1 << 20);
//! assert_eq!(config.default_window_lines, 16);
//! assert_eq!(config.byte_order, Endianness::native());
//! ```

use crate::convert::{Endianness, FloatFormat};

/// Default cap on the scan-line window buffer (4 MiB).
pub const DEFAULT_MAX_BUFFER_BYTES: usize = 4 * 1024 * 1024;

/// Default number of scan lines held in memory.
pub const DEFAULT_WINDOW_LINES: usize = 64;

/// Environment variable overriding [`EngineConfig::max_buffer_bytes`].
pub const ENV_MAX_BUFFER: &str = "IIFF_MAX_BUFFER";

/// Environment variable overriding [`EngineConfig::default_window_lines`].
pub const ENV_WINDOW_LINES: &str = "IIFF_WINDOW_LINES";

/// Platform and buffering configuration for image handles.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Byte order new files are written in.
    pub byte_order: Endianness,
    /// Host floating-point encoding.
    pub float_format: FloatFormat,
    /// Platform identity written to the `IIF_Platform` variable.
    pub platform_name: String,
    /// Separator used to strip directories from the stored filename.
    pub path_separator: char,
    /// Upper bound for the window buffer in bytes.
    pub max_buffer_bytes: usize,
    /// Window height requested before the buffer cap is applied.
    pub default_window_lines: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::host()
    }
}

impl EngineConfig {
    /// Configuration describing the build target.
    pub fn host() -> Self {
        Self {
            byte_order: Endianness::native(),
            float_format: FloatFormat::Ieee754,
            platform_name: format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
            path_separator: std::path::MAIN_SEPARATOR,
            max_buffer_bytes: DEFAULT_MAX_BUFFER_BYTES,
            default_window_lines: DEFAULT_WINDOW_LINES,
        }
    }

    /// Host configuration with buffer overrides from the environment.
    ///
    /// Unparseable or zero values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::host();
        if let Some(bytes) = env_usize(ENV_MAX_BUFFER) {
            config.max_buffer_bytes = bytes;
        }
        if let Some(lines) = env_usize(ENV_WINDOW_LINES) {
            config.default_window_lines = lines;
        }
        config
    }

    /// Sets the byte order.
    pub fn with_byte_order(mut self, order: Endianness) -> Self {
        self.byte_order = order;
        self
    }

    /// Sets the float format.
    pub fn with_float_format(mut self, format: FloatFormat) -> Self {
        self.float_format = format;
        self
    }

    /// Sets the platform name.
    pub fn with_platform_name(mut self, name: impl Into<String>) -> Self {
        self.platform_name = name.into();
        self
    }

    /// Sets the path separator.
    pub fn with_path_separator(mut self, sep: char) -> Self {
        self.path_separator = sep;
        self
    }

    /// Sets the buffer cap (at least one byte).
    pub fn with_max_buffer_bytes(mut self, bytes: usize) -> Self {
        self.max_buffer_bytes = bytes.max(1);
        self
    }

    /// Sets the default window height (at least one line).
    pub fn with_window_lines(mut self, lines: usize) -> Self {
        self.default_window_lines = lines.max(1);
        self
    }

    /// Last path component of `path` under this platform's separator.
    pub fn base_name<'a>(&self, path: &'a str) -> &'a str {
        path.rsplit(self.path_separator).next().unwrap_or(path)
    }
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|&v| v > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_defaults() {
        let config = EngineConfig::host();
        assert_eq!(config.float_format, FloatFormat::Ieee754);
        assert_eq!(config.max_buffer_bytes, DEFAULT_MAX_BUFFER_BYTES);
        assert_eq!(config.default_window_lines, DEFAULT_WINDOW_LINES);
        assert!(!config.platform_name.is_empty());
    }

    #[test]
    fn test_builder_clamps() {
        let config = EngineConfig::host().with_window_lines(0).with_max_buffer_bytes(0);
        assert_eq!(config.default_window_lines, 1);
        assert_eq!(config.max_buffer_bytes, 1);
    }

    #[test]
    fn test_base_name() {
        let unix = EngineConfig::host().with_path_separator('/');
        assert_eq!(unix.base_name("/tmp/shots/a.iif"), "a.iif");
        assert_eq!(unix.base_name("plain.iif"), "plain.iif");

        let dos = EngineConfig::host().with_path_separator('\\');
        assert_eq!(dos.base_name("C:\\img\\b.iif"), "b.iif");
    }
}
