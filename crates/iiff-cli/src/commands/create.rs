//! Image creation command.

use crate::CreateArgs;
use anyhow::{Context, Result, bail};
use iiff_io::{FillValue, ImageFile, ImageSpec, WHOLE_LINE};
use tracing::{debug, info, trace};

/// Parses `WIDTHxHEIGHT`.
fn parse_size(size: &str) -> Result<(u32, u32)> {
    let (w, h) = size
        .split_once(['x', 'X'])
        .with_context(|| format!("expected WIDTHxHEIGHT, got `{}`", size))?;
    let width: u32 = w.trim().parse().with_context(|| format!("invalid width `{}`", w))?;
    let height: u32 = h.trim().parse().with_context(|| format!("invalid height `{}`", h))?;
    if width == 0 || height == 0 {
        bail!("resolution must be positive, got {}x{}", width, height);
    }
    Ok((width, height))
}

/// Parses comma-separated fill numbers against the component types.
fn parse_fill(list: &str, spec: &ImageSpec) -> Result<Vec<FillValue>> {
    let numbers = list
        .split(',')
        .map(|s| s.trim().parse::<f64>().with_context(|| format!("invalid fill value `{}`", s)))
        .collect::<Result<Vec<_>>>()?;
    if numbers.len() != spec.components.len() {
        bail!(
            "{} fill values for {} components",
            numbers.len(),
            spec.components.len()
        );
    }
    Ok(spec
        .components
        .iter()
        .zip(numbers)
        .map(|(c, v)| FillValue::from_f64(c.ty, v))
        .collect())
}

/// Creates a new image, optionally filled with constant values.
pub fn run(args: CreateArgs, verbose: bool) -> Result<()> {
    trace!(output = %args.output.display(), size = %args.size, "create::run");

    let (width, height) = parse_size(&args.size)?;
    let spec = ImageSpec::parse_components(width, height, &args.components)
        .context("Invalid component list")?
        .with_byte_swap(!args.no_swap);
    let fill = args.fill.as_deref().map(|f| parse_fill(f, &spec)).transpose()?;

    let mut image = ImageFile::create(&args.output, &spec, &super::engine_config())
        .with_context(|| format!("Failed to create: {}", args.output.display()))?;

    if let Some(values) = fill {
        debug!(?values, "filling image");
        image.define_fill_values(values)?;
        image.fill_lines(0, height, WHOLE_LINE, 0)?;
    }

    image
        .close()
        .with_context(|| format!("Failed to save: {}", args.output.display()))?;

    if verbose {
        info!("Created {} ({}x{}, {} components)", args.output.display(), width, height, spec.components.len());
    }
    Ok(())
}
