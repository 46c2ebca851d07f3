//! Variable listing command.

use crate::VarsArgs;
use anyhow::Result;
use iiff_io::AccessMode;
use tracing::trace;

/// Prints system and/or user variables of one image.
pub fn run(args: VarsArgs, verbose: bool) -> Result<()> {
    trace!(input = %args.input.display(), system = args.system, user = args.user, "vars::run");
    let image = super::open_image(&args.input, AccessMode::Read)?;

    let show_system = args.system || !args.user;
    let show_user = args.user || !args.system;

    if show_system {
        if show_user {
            println!("System:");
        }
        for record in image.system_vars()? {
            println!("  {} = {}", record.name, super::format_value(record));
        }
    }
    if show_user {
        if show_system {
            println!("User:");
        }
        let mut count = 0;
        for record in image.user_vars()? {
            println!("  {} = {}", record.name, super::format_value(record));
            count += 1;
        }
        if verbose {
            println!("  ({} user variables, records end at byte {})", count, image.variables_offset()?);
        }
    }

    image.close()?;
    Ok(())
}
