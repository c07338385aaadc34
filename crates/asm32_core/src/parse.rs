use crate::{diag::LineError, ir::Line, lex::split_operands, symbols::parse_symbol};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParsedLine<'a> {
    pub line: Line<'a>,
    /// Problem found while splitting the fields; the fields that could be
    /// recovered are still returned.
    pub error: Option<LineError>,
}

/// Splits a source line into label, mnemonic, operand and comment fields.
///
/// A label starts in the first column, may end with `:` and must be followed
/// by whitespace, a comment or the end of the line. The mnemonic is the next
/// run of non-blank characters; the operand field runs up to the first
/// unquoted `;`.
pub fn parse_line(text: &str) -> ParsedLine<'_> {
    let mut line = Line::default();
    let mut error = None;
    let mut rest = text;

    if starts_label(text) {
        let label = parse_symbol(text);
        let after = label.map_or(text, |name| &text[name.len()..]);
        let after = after.strip_prefix(':').unwrap_or(after);

        match label {
            Some(name) if ends_field(after) => {
                line.label = Some(name);
                rest = after;
            }
            _ => {
                error = Some(LineError::IllegalLabel);
                rest = &after[field_end(after)..];
            }
        }
    }

    let rest = rest.trim_start();
    if let Some(comment) = rest.strip_prefix(';') {
        line.comment = Some(comment);
        return ParsedLine { line, error };
    }
    if rest.is_empty() {
        return ParsedLine { line, error };
    }

    let end = field_end(rest);
    line.mnemonic = Some(&rest[..end]);

    let rest = rest[end..].trim_start();
    if let Some(comment) = rest.strip_prefix(';') {
        line.comment = Some(comment);
        return ParsedLine { line, error };
    }
    if rest.is_empty() {
        return ParsedLine { line, error };
    }

    match split_operands(rest) {
        Ok(split) => {
            let operands = split.operands.trim_end();
            line.operands = (!operands.is_empty()).then_some(operands);
            line.comment = split.comment;
        }
        Err(err) => {
            line.operands = Some(rest.trim_end());
            error.get_or_insert(err);
        }
    }

    ParsedLine { line, error }
}

fn starts_label(text: &str) -> bool {
    text.chars()
        .next()
        .is_some_and(|ch| !ch.is_whitespace() && ch != ';')
}

fn ends_field(text: &str) -> bool {
    text.chars()
        .next()
        .is_none_or(|ch| ch.is_whitespace() || ch == ';')
}

fn field_end(text: &str) -> usize {
    text.find(|ch: char| ch.is_whitespace() || ch == ';')
        .unwrap_or(text.len())
}
