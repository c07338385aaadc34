use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

pub mod asm;
pub mod diag;
pub mod emit;
pub mod encode;
pub mod expr;
pub mod ir;
pub mod lex;
pub mod listing;
pub mod operand;
pub mod parse;
pub mod source;
pub mod symbols;

use diag::{Severity, count_severity, render_diags};
use emit::SRecordWriter;
use listing::ListingWriter;
use source::{FileId, SourceFile, SourceManager};
use tracing::{debug, info};

pub use asm::{Assembler, PassCounts, PassState, Segment};
pub use diag::{Diag, DiagLabel, LineError, Severity as DiagSeverity};
pub use expr::{DEFAULT_RADIX, Pass};
pub use symbols::{SymKind, SymTab, Symbol};

pub const SOURCE_EXTENSION: &str = "s";
pub const OBJECT_EXTENSION: &str = "mot";
pub const LISTING_EXTENSION: &str = "lst";

/// Radixes accepted for numbers without a prefix.
pub const RADIXES: [u32; 4] = [2, 8, 10, 16];

#[derive(Clone, Debug)]
pub struct AssembleOptions {
    /// Object file; defaults to the source path with a `.mot` extension.
    pub object: Option<PathBuf>,
    /// Listing file; defaults to the source path with a `.lst` extension.
    pub listing: Option<PathBuf>,
    pub radix: u32,
}

impl Default for AssembleOptions {
    fn default() -> Self {
        Self {
            object: None,
            listing: None,
            radix: DEFAULT_RADIX,
        }
    }
}

/// Result of an in-memory assembly.
#[derive(Clone, Debug)]
pub struct Assembly {
    pub object: String,
    pub listing: String,
    pub diags: Vec<Diag>,
    pub counts: [PassCounts; 2],
    pub symbols: SymTab,
}

impl Assembly {
    /// Errors and warnings over both passes.
    pub fn total_diagnostics(&self) -> u32 {
        self.counts.iter().map(PassCounts::total).sum()
    }
}

#[derive(Clone, Debug)]
pub struct AssemblySummary {
    pub object: Option<PathBuf>,
    pub listing: Option<PathBuf>,
    pub counts: [PassCounts; 2],
    pub symbols: usize,
}

pub fn assemble_source_text(text: &str, name: &str, radix: u32) -> Assembly {
    let mut source_manager = SourceManager::new();
    let file = source_manager.add_virtual_file(name, text);
    let source = source_manager.file(file);

    let mut assembler = Assembler::new(file, radix);
    let mut object = Vec::new();
    let mut listing = Vec::new();
    let result = run_pipeline(&mut assembler, source, &mut object, &mut listing);

    let mut diags = assembler.take_diags();
    if let Err(err) = result {
        diags.push(io_diag(file, "failed to write output", &err));
    }

    Assembly {
        object: String::from_utf8_lossy(&object).into_owned(),
        listing: String::from_utf8_lossy(&listing).into_owned(),
        diags,
        counts: assembler.counts(),
        symbols: assembler.symbols().clone(),
    }
}

/// Assembles `input` into object and listing files. Both files are written
/// even when the source has errors; any diagnostic makes the result `Err`.
pub fn assemble_path(input: &Path, opts: &AssembleOptions) -> Result<AssemblySummary, Vec<Diag>> {
    let (source_manager, file) = load_source(input)?;
    let source = source_manager.file(file);
    let (object_path, listing_path) = output_paths(&source.path, opts);
    debug!(
        source = %source.path.display(),
        object = %object_path.display(),
        listing = %listing_path.display(),
        "assembling"
    );

    let mut assembler = Assembler::new(file, opts.radix);
    let result = write_outputs(&mut assembler, source, &object_path, &listing_path);
    let mut diags = assembler.take_diags();
    if let Err(err) = result {
        diags.push(io_diag(file, "failed to write output file", &err));
    }

    finish(
        &source_manager,
        &assembler,
        diags,
        Some(object_path),
        Some(listing_path),
    )
}

/// Runs both passes without writing any file.
pub fn check_path(input: &Path, opts: &AssembleOptions) -> Result<AssemblySummary, Vec<Diag>> {
    let (source_manager, file) = load_source(input)?;
    let source = source_manager.file(file);

    let mut assembler = Assembler::new(file, opts.radix);
    let result = run_pipeline(&mut assembler, source, io::sink(), io::sink());
    let mut diags = assembler.take_diags();
    if let Err(err) = result {
        diags.push(io_diag(file, "failed to write output", &err));
    }

    finish(&source_manager, &assembler, diags, None, None)
}

/// Adds the default `.s` extension to a source path that has none.
pub fn source_path(input: &Path) -> PathBuf {
    if input.extension().is_some() {
        input.to_path_buf()
    } else {
        input.with_extension(SOURCE_EXTENSION)
    }
}

pub fn output_paths(source: &Path, opts: &AssembleOptions) -> (PathBuf, PathBuf) {
    let object = opts
        .object
        .clone()
        .unwrap_or_else(|| source.with_extension(OBJECT_EXTENSION));
    let listing = opts
        .listing
        .clone()
        .unwrap_or_else(|| source.with_extension(LISTING_EXTENSION));
    (object, listing)
}

fn load_source(input: &Path) -> Result<(SourceManager, FileId), Vec<Diag>> {
    let path = source_path(input);
    let mut source_manager = SourceManager::new();
    match source_manager.load_path(&path) {
        Ok(file) => Ok((source_manager, file)),
        Err(err) => {
            let file = source_manager.add_virtual_file(path, String::new());
            let diags = vec![io_diag(file, "failed to read input file", &err)];
            let _ = render_diags(&source_manager, &diags);
            Err(diags)
        }
    }
}

fn write_outputs(
    assembler: &mut Assembler,
    source: &SourceFile,
    object_path: &Path,
    listing_path: &Path,
) -> io::Result<()> {
    let object = BufWriter::new(File::create(object_path)?);
    let listing = BufWriter::new(File::create(listing_path)?);
    run_pipeline(assembler, source, object, listing)
}

/// The header record goes out before pass 2 produces any data.
fn run_pipeline<O: Write, L: Write>(
    assembler: &mut Assembler,
    source: &SourceFile,
    object: O,
    listing: L,
) -> io::Result<()> {
    let mut object = SRecordWriter::new(object);
    let mut listing = ListingWriter::new(listing);
    object.header(&source.display_name())?;
    assembler.assemble(source, &mut object, &mut listing)?;
    object.finish()?;
    listing.finish()?;
    Ok(())
}

fn finish(
    source_manager: &SourceManager,
    assembler: &Assembler,
    diags: Vec<Diag>,
    object: Option<PathBuf>,
    listing: Option<PathBuf>,
) -> Result<AssemblySummary, Vec<Diag>> {
    let _ = render_diags(source_manager, &diags);

    info!(
        errors = count_severity(&diags, Severity::Error),
        warnings = count_severity(&diags, Severity::Warning),
        "assembly finished"
    );

    if !diags.is_empty() {
        return Err(diags);
    }
    Ok(AssemblySummary {
        object,
        listing,
        counts: assembler.counts(),
        symbols: assembler.symbols().len(),
    })
}

fn io_diag(file: FileId, context: &str, err: &io::Error) -> Diag {
    Diag::error(file, 0..0, format!("{context}: {err}"))
}
