//! Two-pass assembly driver.
//!
//! Pass 1 walks the source binding labels and sizing every line. Pass 2 walks
//! it again with the complete symbol table, encodes each line, and feeds the
//! object and listing sinks. Both passes share one [`Assembler`] context; the
//! per-line scratch state is rebuilt for every line.

mod directive;
mod instr;

use std::io;

use tracing::{debug, trace};

use crate::{
    diag::{Diag, DiagLabel, LineError},
    emit::ObjectSink,
    encode::{CatalogEntry, EntryKind, Handler, Size, disassemble, lookup_mnemonic},
    expr::{ExprSettings, Pass},
    ir::Line,
    listing::{ListingLine, ListingSink, format_line, format_message},
    operand::{Match, MatchEnv, match_any},
    parse::parse_line,
    source::{FileId, SourceFile, Span},
    symbols::{SymKind, SymTab},
};

/// Largest number of object bytes a single line may produce.
pub const MAX_INSTRUCTION_BYTES: usize = 100;

/// Size of every encoded instruction.
pub const INSTRUCTION_BYTES: u32 = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Segment {
    Text,
    Data,
}

impl Segment {
    fn index(self) -> usize {
        match self {
            Segment::Text => 0,
            Segment::Data => 1,
        }
    }

    pub fn symbol_kind(self) -> SymKind {
        match self {
            Segment::Text => SymKind::Text,
            Segment::Data => SymKind::Data,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassState {
    Idle,
    Scanning(Pass),
    Done(Pass),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassCounts {
    pub errors: u32,
    pub warnings: u32,
}

impl PassCounts {
    pub fn total(&self) -> u32 {
        self.errors + self.warnings
    }
}

/// Scratch state for the line being assembled.
#[derive(Clone, Debug)]
struct LineState {
    span: Span,
    bytes: Vec<u8>,
    /// PC once this line has been assembled.
    next_pc: u32,
    object_code: bool,
    failed: bool,
    delimiter: char,
    size: Size,
    instruction: bool,
    /// Address the bytes are emitted at, set by pass 2 for lines that
    /// produced object code without error.
    emit_at: Option<u32>,
    /// Listing text queued while assembling the line.
    listing: Vec<String>,
}

impl LineState {
    fn new(span: Span, pc: u32) -> Self {
        Self {
            span,
            bytes: Vec::new(),
            next_pc: pc.wrapping_add(INSTRUCTION_BYTES),
            object_code: false,
            failed: false,
            delimiter: '|',
            size: Size::Unsized,
            instruction: false,
            emit_at: None,
            listing: Vec::new(),
        }
    }
}

pub struct Assembler {
    file: FileId,
    radix: u32,
    symbols: SymTab,
    pass: Pass,
    state: PassState,
    segment: Segment,
    segment_pc: [u32; 2],
    pc: u32,
    /// Value of `*`: the PC at the start of the current instruction.
    star: i32,
    counts: [PassCounts; 2],
    start_address: Option<u32>,
    diags: Vec<Diag>,
    line: LineState,
}

impl Assembler {
    pub fn new(file: FileId, radix: u32) -> Self {
        Self {
            file,
            radix,
            symbols: SymTab::default(),
            pass: Pass::One,
            state: PassState::Idle,
            segment: Segment::Text,
            segment_pc: [0; 2],
            pc: 0,
            star: 0,
            counts: [PassCounts::default(); 2],
            start_address: None,
            diags: Vec::new(),
            line: LineState::new(0..0, 0),
        }
    }

    pub fn symbols(&self) -> &SymTab {
        &self.symbols
    }

    pub fn counts(&self) -> [PassCounts; 2] {
        self.counts
    }

    pub fn state(&self) -> PassState {
        self.state
    }

    pub fn segment(&self) -> Segment {
        self.segment
    }

    pub fn start_address(&self) -> Option<u32> {
        self.start_address
    }

    pub fn diags(&self) -> &[Diag] {
        &self.diags
    }

    pub fn take_diags(&mut self) -> Vec<Diag> {
        std::mem::take(&mut self.diags)
    }

    /// Runs both passes over `source`, then appends the count trailer and the
    /// symbol table to the listing.
    pub fn assemble(
        &mut self,
        source: &SourceFile,
        object: &mut dyn ObjectSink,
        listing: &mut dyn ListingSink,
    ) -> io::Result<()> {
        self.run_pass(Pass::One, source, object, listing)?;
        self.run_pass(Pass::Two, source, object, listing)?;
        crate::listing::write_counts(listing, &self.counts)?;
        crate::listing::write_symbol_table(listing, &self.symbols)
    }

    pub fn run_pass(
        &mut self,
        pass: Pass,
        source: &SourceFile,
        object: &mut dyn ObjectSink,
        listing: &mut dyn ListingSink,
    ) -> io::Result<()> {
        self.begin_pass(pass);

        for (span, text) in source.lines() {
            self.assemble_line(span, text);

            for text in self.line.listing.drain(..) {
                listing.report(&text)?;
            }
            if let Some(address) = self.line.emit_at {
                for (offset, byte) in self.line.bytes.iter().enumerate() {
                    object.emit(address.wrapping_add(offset as u32), *byte)?;
                }
            }

            if self.state != PassState::Scanning(pass) {
                break;
            }
        }

        self.finish_pass(pass);
        if pass == Pass::Two {
            object.start(self.start_address.unwrap_or(0))?;
        }
        Ok(())
    }

    fn begin_pass(&mut self, pass: Pass) {
        trace!(pass = pass.number(), "begin pass");
        if pass == Pass::One {
            self.symbols.clear();
        }
        self.pass = pass;
        self.state = PassState::Scanning(pass);
        self.segment = Segment::Text;
        self.segment_pc = [0; 2];
        self.pc = 0;
        self.counts[pass.index()] = PassCounts::default();
        if pass == Pass::Two {
            self.start_address = None;
        }
    }

    fn finish_pass(&mut self, pass: Pass) {
        self.state = PassState::Done(pass);
        let counts = self.counts[pass.index()];
        debug!(
            pass = pass.number(),
            errors = counts.errors,
            warnings = counts.warnings,
            symbols = self.symbols.len(),
            "pass complete"
        );
    }

    fn assemble_line(&mut self, span: Span, text: &str) {
        self.line = LineState::new(span, self.pc);
        self.star = self.pc as i32;

        let parsed = parse_line(text);
        let line = parsed.line;
        if let Some(err) = parsed.error {
            self.report(&line, err);
        }

        match self.pass {
            Pass::One => self.pass1_line(&line),
            Pass::Two => self.pass2_line(&line),
        }
    }

    fn pass1_line(&mut self, line: &Line<'_>) {
        let Some(mnemonic) = line.mnemonic else {
            if let Some(label) = line.label {
                self.define_label(line, label);
            }
            return;
        };

        let (entry, size) = match lookup_mnemonic(mnemonic) {
            Ok(found) => found,
            Err(err) => {
                // Unknown mnemonics are left for pass 2 to report.
                if err == LineError::IllegalSize {
                    self.report(line, err);
                }
                if let Some(label) = line.label {
                    self.define_label(line, label);
                }
                return;
            }
        };

        self.line.size = size;
        if entry.kind == EntryKind::Instruction {
            self.pc = align(self.pc, 2);
            self.restart_instruction();
            if let Some(label) = line.label {
                self.define_label(line, label);
            }
        }

        self.dispatch(entry, line);
        self.advance();
    }

    fn pass2_line(&mut self, line: &Line<'_>) {
        let Some(mnemonic) = line.mnemonic else {
            if let Some(label) = line.label {
                self.verify_label(line, label);
            }
            self.reset_buffer();
            self.list_line(line);
            return;
        };

        match lookup_mnemonic(mnemonic) {
            Ok((entry, size)) => {
                self.line.size = size;
                if entry.kind == EntryKind::Instruction {
                    if self.pc & 1 != 0 {
                        self.report(line, LineError::Realigned);
                        self.pc = align(self.pc, 2);
                        self.restart_instruction();
                    }
                    if let Some(label) = line.label {
                        if self.verify_label(line, label) {
                            self.restart_instruction();
                        }
                    }
                }
                self.dispatch(entry, line);
            }
            Err(err) => self.report(line, err),
        }

        self.list_line(line);
        if !self.line.failed && self.line.object_code && !self.line.bytes.is_empty() {
            self.line.emit_at = Some(self.pc);
        }
        self.advance();
    }

    fn dispatch(&mut self, entry: &CatalogEntry, line: &Line<'_>) {
        self.line.instruction = entry.kind == EntryKind::Instruction;

        let result = match entry.handler {
            Handler::Inherent => self.inherent(entry),
            Handler::TwoRegister => self.two_register(entry, line),
            Handler::TwoOrThreeRegister => self.two_or_three_register(entry, line),
            Handler::Indexed => self.indexed(entry, line),
            Handler::Register => self.register_jump(entry, line),
            Handler::Branch => self.branch(entry, line),
            Handler::Org => self.org(line),
            Handler::Equ => self.equ(line),
            Handler::Reg => self.reg(line),
            Handler::Dc => self.dc(line),
            Handler::Ds => self.ds(line),
            Handler::Align => self.align_pc(line),
            Handler::Extern | Handler::Global => self.external(line),
            Handler::Text => self.switch_segment(line, Segment::Text),
            Handler::Data => self.switch_segment(line, Segment::Data),
            Handler::End => self.end(line),
        };

        if let Err(err) = result {
            self.report(line, err);
        }
    }

    fn advance(&mut self) {
        if !self.line.failed {
            self.pc = self.line.next_pc;
        }
    }

    /// Restarts the instruction at the current PC after the PC moved.
    fn restart_instruction(&mut self) {
        self.star = self.pc as i32;
        self.line.next_pc = self.pc.wrapping_add(INSTRUCTION_BYTES);
    }

    /// Directives produce no instruction word; the PC stays put unless the
    /// handler generates bytes.
    fn reset_buffer(&mut self) {
        self.line.bytes.clear();
        self.line.object_code = false;
        self.line.next_pc = self.pc;
        self.line.delimiter = '|';
    }

    fn gen_opcode(&mut self, word: u32) {
        self.line.bytes = word.to_be_bytes().to_vec();
        self.line.object_code = true;
    }

    fn push_byte(&mut self, byte: u8) -> Result<(), LineError> {
        if self.line.bytes.len() >= MAX_INSTRUCTION_BYTES {
            return Err(LineError::OperandTooLarge);
        }
        self.line.bytes.push(byte);
        self.line.next_pc = self.line.next_pc.wrapping_add(1);
        self.line.object_code = true;
        Ok(())
    }

    fn push_sized(&mut self, value: i32, size: Size) -> Result<(), LineError> {
        match size {
            Size::Byte | Size::Unsized => self.push_byte(value as u8),
            Size::Word => (value as u16)
                .to_be_bytes()
                .into_iter()
                .try_for_each(|byte| self.push_byte(byte)),
            Size::Long => (value as u32)
                .to_be_bytes()
                .into_iter()
                .try_for_each(|byte| self.push_byte(byte)),
        }
    }

    /// Shows `value` in the listing bytes without emitting it.
    fn gen_value(&mut self, value: i32) {
        self.line.bytes = (value as u32).to_be_bytes().to_vec();
        self.line.object_code = false;
        self.line.next_pc = self.pc;
    }

    fn settings(&self) -> ExprSettings {
        ExprSettings {
            radix: self.radix,
            star: self.star,
        }
    }

    fn match_operands(
        &mut self,
        templates: &[&str],
        line: &Line<'_>,
        opcode: u32,
    ) -> Option<(usize, Match)> {
        let mut env = MatchEnv {
            settings: self.settings(),
            symbols: &mut self.symbols,
            pass: self.pass,
        };
        match_any(templates, line.operand_text(), opcode, &mut env)
    }

    fn define_label(&mut self, line: &Line<'_>, name: &str) {
        let kind = self.segment.symbol_kind();
        self.bind_symbol(line, name, self.pc as i32, kind);
    }

    fn bind_symbol(&mut self, line: &Line<'_>, name: &str, value: i32, kind: SymKind) {
        let site = (self.file, self.line.span.clone());
        if let Err(existing) = self.symbols.bind_at(name, value, kind, Some(site)) {
            let previous = existing.defined_at.map(|(file, span)| DiagLabel {
                file,
                span,
                message: "previous definition here".to_string(),
            });
            self.report_with(line, LineError::LabelMultiplyDefined, previous);
        }
    }

    /// Compares a label with its pass 1 value. On a mismatch the PC is
    /// resynchronised to the pass 1 value and `true` is returned.
    fn verify_label(&mut self, line: &Line<'_>, name: &str) -> bool {
        let site = (self.file, self.line.span.clone());
        let Some(symbol) = self.symbols.get(name) else {
            return false;
        };
        // Redefinitions were reported in pass 1 and did not bind.
        if symbol.defined_at.as_ref() != Some(&site) {
            return false;
        }

        let value = symbol.value as u32;
        if value == self.pc {
            return false;
        }
        self.report(line, LineError::Phasing);
        self.pc = value;
        true
    }

    fn report(&mut self, line: &Line<'_>, err: LineError) {
        self.report_with(line, err, None);
    }

    /// Records a diagnostic. Only the first error of a line is reported;
    /// warnings always are.
    fn report_with(&mut self, line: &Line<'_>, err: LineError, label: Option<DiagLabel>) {
        let counts = &mut self.counts[self.pass.index()];
        if err.is_warning() {
            counts.warnings += 1;
        } else {
            if self.line.failed {
                return;
            }
            self.line.failed = true;
            counts.errors += 1;
        }

        trace!(pass = self.pass.number(), pc = self.pc, code = err.code(), "{err}");
        self.line.listing.push(format_message(err));
        if self.pass == Pass::One {
            let rows = format_line(&ListingLine {
                address: self.pc,
                delimiter: self.line.delimiter,
                bytes: None,
                line,
                decoded: None,
            });
            self.line.listing.extend(rows);
        }

        let mut diag = Diag::from_line_error(self.file, self.line.span.clone(), err)
            .with_help(format!("reported in pass {}", self.pass.number()));
        if let Some(label) = label {
            diag = diag.with_label(label);
        }
        self.diags.push(diag);
    }

    fn list_line(&mut self, line: &Line<'_>) {
        let shown = !self.line.failed;
        let decoded = if shown && self.line.instruction {
            self.line
                .bytes
                .get(..4)
                .and_then(|word| <[u8; 4]>::try_from(word).ok())
                .map(u32::from_be_bytes)
                .and_then(disassemble)
        } else {
            None
        };

        let rows = format_line(&ListingLine {
            address: self.pc,
            delimiter: self.line.delimiter,
            bytes: shown.then_some(self.line.bytes.as_slice()),
            line,
            decoded: decoded.as_deref(),
        });
        self.line.listing.extend(rows);
    }
}

/// Rounds `pc` up to a multiple of `boundary`, which must be a power of two.
pub fn align(pc: u32, boundary: u32) -> u32 {
    let mask = boundary.wrapping_sub(1);
    pc.wrapping_add(mask) & !mask
}

#[cfg(test)]
struct TestRun {
    asm: Assembler,
    image: crate::emit::ObjectImage,
    listing: Vec<String>,
}

#[cfg(test)]
impl TestRun {
    fn bytes(&self) -> Vec<u8> {
        self.image.bytes.iter().map(|(_, byte)| *byte).collect()
    }

    fn codes(&self) -> Vec<&str> {
        self.asm
            .diags()
            .iter()
            .filter_map(|diag| diag.code.as_deref())
            .collect()
    }
}

#[cfg(test)]
fn run_text(text: &str) -> TestRun {
    let source = SourceFile {
        path: "test.s".into(),
        text: text.to_string(),
    };
    let mut asm = Assembler::new(FileId(0), crate::expr::DEFAULT_RADIX);
    let mut image = crate::emit::ObjectImage::default();
    let mut listing: Vec<String> = Vec::new();
    asm.assemble(&source, &mut image, &mut listing)
        .expect("in-memory sinks never fail");
    TestRun {
        asm,
        image,
        listing,
    }
}
