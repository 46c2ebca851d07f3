//! Format detection command.

use crate::DetectArgs;
use anyhow::{Context, Result};
use iiff_io::Format;
use tracing::trace;

/// Prints the sniffed format of each file.
pub fn run(args: DetectArgs, verbose: bool) -> Result<()> {
    for path in &args.input {
        trace!(input = %path.display(), "detect::run");
        let format = Format::detect(path).with_context(|| format!("Failed to read: {}", path.display()))?;
        if verbose && !format.extension().is_empty() {
            println!("{}: {} (.{})", path.display(), format.name(), format.extension());
        } else {
            println!("{}: {}", path.display(), format.name());
        }
    }
    Ok(())
}
