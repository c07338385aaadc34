use std::{io, path::PathBuf};

use asm32_core::{AssembleOptions, DEFAULT_RADIX, RADIXES, assemble_path, check_path};
use clap::{Args, Parser, Subcommand};
use tracing::Level;

#[derive(Parser, Debug)]
#[command(name = "asm32")]
#[command(about = "Two-pass assembler for the ASM32 register machine")]
#[command(version)]
struct Cli {
    /// One of `TRACE`, `DEBUG`, `INFO`, `WARN`, or `ERROR`
    #[arg(long, global = true, default_value_t = Level::INFO)]
    log_level: Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write an S-record object file and a listing
    Assemble(AssembleArgs),
    /// Run both passes and report diagnostics without writing files
    Check(CheckArgs),
}

#[derive(Args, Debug)]
struct AssembleArgs {
    /// Source file; `.s` is assumed when it has no extension
    input: PathBuf,

    /// Object file (default: source name with `.mot`)
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Listing file (default: source name with `.lst`)
    #[arg(short = 'l', long = "listing")]
    listing: Option<PathBuf>,

    /// Radix of numbers without a prefix
    #[arg(long, default_value_t = DEFAULT_RADIX, value_parser = parse_radix)]
    radix: u32,
}

#[derive(Args, Debug)]
struct CheckArgs {
    input: PathBuf,

    #[arg(long, default_value_t = DEFAULT_RADIX, value_parser = parse_radix)]
    radix: u32,
}

fn parse_radix(text: &str) -> Result<u32, String> {
    let radix: u32 = text.parse().map_err(|err| format!("`{text}`: {err}"))?;
    if RADIXES.contains(&radix) {
        Ok(radix)
    } else {
        Err(format!("radix must be one of {RADIXES:?}"))
    }
}

fn main() {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_writer(io::stderr)
        .init();

    let exit_code = match cli.command {
        Commands::Assemble(args) => run_assemble(args),
        Commands::Check(args) => run_check(args),
    };

    std::process::exit(exit_code);
}

fn run_assemble(args: AssembleArgs) -> i32 {
    let opts = AssembleOptions {
        object: args.output,
        listing: args.listing,
        radix: args.radix,
    };

    match assemble_path(&args.input, &opts) {
        Ok(_) => 0,
        Err(_) => 1,
    }
}

fn run_check(args: CheckArgs) -> i32 {
    let opts = AssembleOptions {
        radix: args.radix,
        ..AssembleOptions::default()
    };

    match check_path(&args.input, &opts) {
        Ok(_) => 0,
        Err(_) => 1,
    }
}
