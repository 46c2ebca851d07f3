//! Image info command.
//!
//! Shows resolution, component table, header layout and window sizing.

use crate::InfoArgs;
use anyhow::{Context, Result};
use iiff_io::{AccessMode, Format};
use std::fs;
use tracing::trace;

/// Runs the info command.
///
/// Foreign formats are reported by name only.
pub fn run(args: InfoArgs, verbose: bool) -> Result<()> {
    for path in &args.input {
        trace!(input = %path.display(), "info::run");
        let file_size = fs::metadata(path)
            .with_context(|| format!("Failed to stat: {}", path.display()))?
            .len();
        let format = Format::detect(path).unwrap_or(Format::Unknown);

        println!("{}", path.display());
        println!("  Format:     {}", format.name());
        println!("  File size:  {}", super::format_size(file_size));

        if format.is_native() {
            let image = super::open_image(path, AccessMode::Read)?;
            let header = image.header()?;
            let layout = header.layout;

            println!("  Resolution: {}x{}", header.width, header.height);
            println!("  Components: {}", header.components.len());
            for c in header.components.iter() {
                println!("    {:<16} {}", c.name, c.ty);
            }
            println!("  Version:    {}", header.version);
            println!(
                "  Layout:     {} ({} byte header)",
                if layout.computed { "computed" } else { "legacy" },
                layout.header_size()
            );
            println!("  Byte order: {:?}", header.byte_order);
            println!("  Byte swap:  {}", if header.swap_enabled { "on" } else { "off" });
            println!("  Line bytes: {}", header.bytes_per_line());
            println!("  Window:     {} lines", image.window_lines()?);
            if !header.filename.is_empty() {
                println!("  Filename:   {}", header.filename);
            }
            println!("  Variables:  {} user", image.user_vars()?.count());

            if verbose {
                println!("  Offsets:");
                println!("    bit table  {}", layout.table_offset);
                println!("    filename   {}", layout.filename_offset);
                println!("    variables  {} ({} bytes)", layout.vars_offset, layout.vars_capacity);
                println!("    swap flag  {}", layout.swap_offset);
                println!("    pixels     {}", layout.data_offset);
                println!("    vars end   {}", image.variables_offset()?);
            }
            image.close()?;
        }

        if args.input.len() > 1 {
            println!();
        }
    }

    Ok(())
}
