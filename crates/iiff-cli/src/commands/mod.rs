//! CLI command implementations

pub mod create;
pub mod detect;
pub mod info;
pub mod set_var;
pub mod vars;

use anyhow::{Context, Result, bail};
use iiff_io::{AccessMode, EngineConfig, ImageFile, VarKind, VarRecord};
use std::path::Path;

/// Engine configuration for CLI runs (host defaults plus environment).
pub fn engine_config() -> EngineConfig {
    EngineConfig::from_env()
}

/// Opens an image with a readable error.
pub fn open_image(path: &Path, mode: AccessMode) -> Result<ImageFile> {
    ImageFile::open(path, mode, &engine_config())
        .with_context(|| format!("Failed to open: {}", path.display()))
}

/// Renders a variable value for display.
pub fn format_value(record: &VarRecord) -> String {
    match record.kind {
        VarKind::Text => format!("\"{}\"", String::from_utf8_lossy(&record.value).escape_default()),
        VarKind::Binary => format!("<{} bytes> {}", record.value.len(), to_hex(&record.value)),
    }
}

/// Lower-case hex without separators.
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Parses hex digits (whitespace ignored) into bytes.
pub fn from_hex(text: &str) -> Result<Vec<u8>> {
    let digits: Vec<u8> = text.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    if digits.len() % 2 != 0 {
        bail!("hex value has an odd number of digits");
    }
    digits
        .chunks_exact(2)
        .map(|pair| {
            let s = std::str::from_utf8(pair).context("hex value is not ASCII")?;
            u8::from_str_radix(s, 16).with_context(|| format!("invalid hex byte `{}`", s))
        })
        .collect()
}

/// Format file size for display
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
