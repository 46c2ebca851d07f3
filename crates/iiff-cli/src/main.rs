//! iiff - inspect and create IIFF image files

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "iiff")]
#[command(author, version, about = "Inspect and create IIFF image files")]
#[command(long_about = "
Reads and writes IIFF raster images and their variables.

Examples:
  iiff info scan.iif                         # Resolution, components, layout
  iiff vars scan.iif --user                  # List user variables
  iiff set-var scan.iif Author someone       # Add or replace a variable
  iiff set-var scan.iif Thumb 00ff10 --binary-hex
  iiff create out.iif --size 640x480 --components R:byte,G:byte,B:byte --fill 0,0,255
  iiff detect a.tif b.gif c.iif              # Sniff file formats

Set RUST_LOG=iiff_io=trace for engine logs.
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Display image information
    #[command(visible_alias = "i")]
    Info(InfoArgs),

    /// List system and user variables
    Vars(VarsArgs),

    /// Store a user variable
    #[command(name = "set-var")]
    SetVar(SetVarArgs),

    /// Create a new image
    Create(CreateArgs),

    /// Detect file formats
    Detect(DetectArgs),
}

#[derive(Args)]
struct InfoArgs {
    /// Input image(s)
    #[arg(required = true)]
    input: Vec<PathBuf>,
}

#[derive(Args)]
struct VarsArgs {
    /// Input image
    input: PathBuf,

    /// Only system variables
    #[arg(long, conflicts_with = "user")]
    system: bool,

    /// Only user variables
    #[arg(long)]
    user: bool,
}

#[derive(Args)]
struct SetVarArgs {
    /// Image to update
    input: PathBuf,

    /// Variable name
    name: String,

    /// Variable value
    value: String,

    /// Value is hex-encoded binary data
    #[arg(long)]
    binary_hex: bool,
}

#[derive(Args)]
struct CreateArgs {
    /// Output image
    output: PathBuf,

    /// Resolution as WIDTHxHEIGHT
    #[arg(short, long)]
    size: String,

    /// Components as NAME:type,... (types: ascii, byte, short, long, float, double)
    #[arg(short, long)]
    components: String,

    /// Fill every pixel with these values, one per component
    #[arg(short, long)]
    fill: Option<String>,

    /// Store pixels in host order without swapping
    #[arg(long)]
    no_swap: bool,
}

#[derive(Args)]
struct DetectArgs {
    /// Files to inspect
    #[arg(required = true)]
    input: Vec<PathBuf>,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Info(args) => commands::info::run(args, cli.verbose),
        Commands::Vars(args) => commands::vars::run(args, cli.verbose),
        Commands::SetVar(args) => commands::set_var::run(args, cli.verbose),
        Commands::Create(args) => commands::create::run(args, cli.verbose),
        Commands::Detect(args) => commands::detect::run(args, cli.verbose),
    }
}
