//! Listing file generation.

use std::io::{self, Write};

use crate::{asm::PassCounts, diag::LineError, ir::Line, symbols::SymTab};

/// Object bytes shown per listing row.
pub const BYTES_PER_LINE: usize = 8;

const RULE: &str = "*******************************************************";

/// Receives listing text one line at a time, without the line terminator.
pub trait ListingSink {
    fn report(&mut self, text: &str) -> io::Result<()>;
}

impl ListingSink for Vec<String> {
    fn report(&mut self, text: &str) -> io::Result<()> {
        self.push(text.to_string());
        Ok(())
    }
}

/// Writer for listing file output.
pub struct ListingWriter<W: Write> {
    out: W,
}

impl<W: Write> ListingWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn finish(mut self) -> io::Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

impl<W: Write> ListingSink for ListingWriter<W> {
    fn report(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.out, "{text}")
    }
}

/// Data for a single listing line.
pub struct ListingLine<'a> {
    pub address: u32,
    /// `|` for ordinary lines, `=` for value definitions.
    pub delimiter: char,
    /// Bytes to show; `None` leaves the byte columns blank.
    pub bytes: Option<&'a [u8]>,
    pub line: &'a Line<'a>,
    pub decoded: Option<&'a str>,
}

/// Formats a listing line followed by one continuation row for every further
/// [`BYTES_PER_LINE`] bytes.
pub fn format_line(listing: &ListingLine<'_>) -> Vec<String> {
    let bytes = listing.bytes.unwrap_or_default();
    let (first, rest) = bytes.split_at(bytes.len().min(BYTES_PER_LINE));

    let mut text = format!("{:08x} {} ", listing.address, listing.delimiter);
    for slot in 0..BYTES_PER_LINE {
        match first.get(slot) {
            Some(byte) => text.push_str(&format!("{byte:02X}")),
            None => text.push_str("  "),
        }
    }

    let line = listing.line;
    if line.label.is_some() || line.mnemonic.is_some() {
        text.push_str(&format!(
            " {:<10} {:<7} {:<20}",
            line.label.unwrap_or_default(),
            line.mnemonic.unwrap_or_default(),
            line.operand_text(),
        ));
    }
    if let Some(decoded) = listing.decoded {
        text.push_str(decoded);
    }
    if let Some(comment) = line.comment {
        text.push(';');
        text.push_str(comment);
    }

    let mut rows = vec![text];
    let mut offset = first.len();
    for chunk in rest.chunks(BYTES_PER_LINE) {
        let address = listing.address.wrapping_add(offset as u32);
        let hex: String = chunk.iter().map(|byte| format!("{byte:02X}")).collect();
        rows.push(format!("{address:08x} + {hex}"));
        offset += chunk.len();
    }
    rows
}

pub fn format_message(err: LineError) -> String {
    format!("{}***** : {err}", err.marker())
}

pub fn write_counts(sink: &mut dyn ListingSink, counts: &[PassCounts; 2]) -> io::Result<()> {
    sink.report("")?;
    sink.report("")?;
    for (idx, pass) in counts.iter().enumerate() {
        sink.report(&format!("{} Errors detected in pass {}", pass.errors, idx + 1))?;
        sink.report(&format!("{} Warnings detected in pass {}", pass.warnings, idx + 1))?;
    }
    Ok(())
}

pub fn write_symbol_table(sink: &mut dyn ListingSink, symbols: &SymTab) -> io::Result<()> {
    sink.report("")?;
    sink.report("")?;
    sink.report("  Symbol Table")?;
    sink.report(RULE)?;
    sink.report("  Value  : Type  : Symbol ")?;
    for (name, symbol) in symbols.sorted() {
        sink.report(&format!(
            "{:08X} : {:<5} : {name}",
            symbol.value as u32,
            symbol.listing_type()
        ))?;
    }
    sink.report(RULE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::SymKind;

    #[test]
    fn instruction_line_with_decode_and_comment() {
        let line = Line {
            label: Some("START"),
            mnemonic: Some("ADD"),
            operands: Some("R1,R2,R3"),
            comment: Some(" sum"),
        };
        let rows = format_line(&ListingLine {
            address: 0x1000,
            delimiter: '|',
            bytes: Some(&[0x00, 0x22, 0x18, 0x00]),
            line: &line,
            decoded: Some("; add   R1 ,R2 ,R3 "),
        });
        assert_eq!(
            rows,
            vec![
                "00001000 | 00221800         START      ADD     R1,R2,R3            ; add   R1 ,R2 ,R3 ; sum"
            ]
        );
    }

    #[test]
    fn comment_only_line_has_blank_columns() {
        let line = Line {
            comment: Some(" hello"),
            ..Line::default()
        };
        let rows = format_line(&ListingLine {
            address: 0,
            delimiter: '|',
            bytes: None,
            line: &line,
            decoded: None,
        });
        assert_eq!(rows, vec!["00000000 |                 ; hello"]);
    }

    #[test]
    fn long_data_wraps_onto_continuation_rows() {
        let line = Line {
            mnemonic: Some("DC.B"),
            operands: Some("\"ABCDEFGHIJ\""),
            ..Line::default()
        };
        let data = b"ABCDEFGHIJ";
        let rows = format_line(&ListingLine {
            address: 0x20,
            delimiter: '|',
            bytes: Some(data),
            line: &line,
            decoded: None,
        });
        assert_eq!(rows.len(), 2);
        assert!(rows[0].starts_with("00000020 | 4142434445464748 "));
        assert_eq!(rows[1], "00000028 + 494A");
    }

    #[test]
    fn messages_use_severity_markers() {
        assert_eq!(
            format_message(LineError::IllegalOperands),
            "E***** : Illegal operands"
        );
        assert_eq!(
            format_message(LineError::LabelMultiplyDefined),
            "W***** : Label multiply defined"
        );
    }

    #[test]
    fn trailer_lists_counts_and_sorted_symbols() {
        let mut symbols = SymTab::default();
        symbols.bind("start", 0x1000, SymKind::Text).unwrap();
        symbols.bind("COUNT", -1, SymKind::Absolute).unwrap();
        symbols.mark_external("ext");

        let mut sink: Vec<String> = Vec::new();
        let counts = [
            PassCounts {
                errors: 1,
                warnings: 0,
            },
            PassCounts {
                errors: 2,
                warnings: 3,
            },
        ];
        write_counts(&mut sink, &counts).unwrap();
        write_symbol_table(&mut sink, &symbols).unwrap();

        assert_eq!(
            sink,
            vec![
                "",
                "",
                "1 Errors detected in pass 1",
                "0 Warnings detected in pass 1",
                "2 Errors detected in pass 2",
                "3 Warnings detected in pass 2",
                "",
                "",
                "  Symbol Table",
                RULE,
                "  Value  : Type  : Symbol ",
                "FFFFFFFF : Abs   : COUNT",
                "00000000 : Und_E : ext",
                "00001000 : Text  : start",
                RULE,
            ]
        );
    }
}
