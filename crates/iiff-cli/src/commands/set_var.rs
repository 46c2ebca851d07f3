//! Variable update command.

use crate::SetVarArgs;
use anyhow::{Context, Result};
use iiff_io::AccessMode;
use tracing::{debug, info, trace};

/// Stores one user variable and rewrites the header.
pub fn run(args: SetVarArgs, verbose: bool) -> Result<()> {
    trace!(input = %args.input.display(), name = %args.name, "set_var::run");
    let mut image = super::open_image(&args.input, AccessMode::Update)?;

    let warning = if args.binary_hex {
        let bytes = super::from_hex(&args.value)?;
        debug!(bytes = bytes.len(), "binary value");
        image.put_binary_var(&args.name, &bytes)
    } else {
        image.put_text_var(&args.name, &args.value)
    }
    .with_context(|| format!("Failed to set `{}`", args.name))?;

    if let Some(w) = warning {
        println!("{}: {}", args.name, w);
    }

    image
        .close()
        .with_context(|| format!("Failed to save: {}", args.input.display()))?;

    if verbose {
        info!("Stored `{}` in {}", args.name, args.input.display());
    }
    Ok(())
}
