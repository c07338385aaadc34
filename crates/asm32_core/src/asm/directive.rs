use tracing::trace;

use super::{Assembler, PassState, Segment, align};
use crate::{
    diag::LineError,
    expr::{Pass, escape_char, evaluate_in_pass},
    ir::Line,
    operand::parse_register,
    symbols::{SymKind, parse_symbol},
};

/// Largest `ALIGN` exponent; the boundary is `1 << n`.
const MAX_ALIGN_EXPONENT: i32 = 5;

/// Parses `R1/R3-R8` style register lists into a bit mask.
pub fn register_list(text: &str) -> Option<u32> {
    let mut mask = 0u32;
    let mut rest = text.trim();
    loop {
        let (first, used) = parse_register(rest)?;
        rest = &rest[used..];
        let last = match rest.strip_prefix('-') {
            Some(after) => {
                let (last, used) = parse_register(after)?;
                rest = &after[used..];
                last
            }
            None => first,
        };
        for register in first..=last {
            mask |= 1 << register;
        }

        match rest.strip_prefix('/') {
            Some(after) => rest = after,
            None => break,
        }
    }
    rest.trim().is_empty().then_some(mask)
}

fn blank_len(text: &str) -> usize {
    text.len() - text.trim_start().len()
}

impl Assembler {
    /// Evaluates an expression that must fill the whole of `text`. Passing
    /// [`Pass::Two`] demands a resolved value whatever the current pass.
    fn operand_value(&mut self, text: &str, pass: Pass) -> Result<i32, LineError> {
        let settings = self.settings();
        let evaluated = evaluate_in_pass(text, 0, &mut self.symbols, settings, pass)
            .map_err(|_| LineError::IllegalExpression)?;
        if !text[evaluated.consumed..].trim().is_empty() {
            return Err(LineError::IllegalExpression);
        }
        Ok(evaluated.value)
    }

    fn label_in_pass1(&mut self, line: &Line<'_>) {
        if self.pass == Pass::One {
            if let Some(label) = line.label {
                self.define_label(line, label);
            }
        }
    }

    pub(super) fn org(&mut self, line: &Line<'_>) -> Result<(), LineError> {
        let origin = self.operand_value(line.operand_text(), Pass::Two)?;
        self.pc = origin as u32;
        self.reset_buffer();
        self.label_in_pass1(line);
        Ok(())
    }

    pub(super) fn equ(&mut self, line: &Line<'_>) -> Result<(), LineError> {
        self.reset_buffer();
        self.line.delimiter = '=';
        if line.label.is_none() {
            self.report(line, LineError::LabelRequired);
        }

        let value = self.operand_value(line.operand_text(), self.pass)?;
        self.gen_value(value);
        self.bind_absolute(line, value);
        Ok(())
    }

    pub(super) fn reg(&mut self, line: &Line<'_>) -> Result<(), LineError> {
        self.reset_buffer();
        self.line.delimiter = '=';
        if line.label.is_none() {
            self.report(line, LineError::LabelRequired);
        }

        let text = line.operand_text();
        let mask = match text.strip_prefix('#') {
            Some(expr) => self.operand_value(expr, self.pass)?,
            None => register_list(text).ok_or(LineError::IllegalExpression)? as i32,
        };
        self.gen_value(mask);
        self.bind_absolute(line, mask);
        Ok(())
    }

    fn bind_absolute(&mut self, line: &Line<'_>, value: i32) {
        if let (Pass::One, Some(label)) = (self.pass, line.label) {
            self.bind_symbol(line, label, value, SymKind::Absolute);
        }
    }

    /// Comma-separated expressions and `"strings"`. Expressions take the
    /// element size; strings always produce one byte per character byte.
    pub(super) fn dc(&mut self, line: &Line<'_>) -> Result<(), LineError> {
        self.reset_buffer();
        self.label_in_pass1(line);

        let text = line.operand_text();
        let size = self.line.size;
        let mut pos = 0;
        loop {
            pos += blank_len(&text[pos..]);
            if text[pos..].starts_with('"') {
                pos = self.dc_string(text, pos + 1)?;
            } else {
                let settings = self.settings();
                let evaluated =
                    evaluate_in_pass(text, pos, &mut self.symbols, settings, self.pass)
                        .map_err(|_| LineError::IllegalExpression)?;
                self.push_sized(evaluated.value, size)?;
                pos += evaluated.consumed;
            }

            pos += blank_len(&text[pos..]);
            match text[pos..].chars().next() {
                None => return Ok(()),
                Some(',') => pos += 1,
                Some(_) => return Err(LineError::CommaExpected),
            }
        }
    }

    /// Emits the string body starting at `start`; returns the position after
    /// the closing quote.
    fn dc_string(&mut self, text: &str, start: usize) -> Result<usize, LineError> {
        let mut chars = text[start..].char_indices();
        while let Some((idx, ch)) = chars.next() {
            let ch = match ch {
                '"' => return Ok(start + idx + 1),
                '\\' => chars
                    .next()
                    .map(|(_, escaped)| escape_char(escaped))
                    .ok_or(LineError::UnterminatedConstant)?,
                other => other,
            };
            let mut utf8 = [0; 4];
            for byte in ch.encode_utf8(&mut utf8).bytes() {
                self.push_byte(byte)?;
            }
        }
        Err(LineError::UnterminatedConstant)
    }

    pub(super) fn ds(&mut self, line: &Line<'_>) -> Result<(), LineError> {
        self.label_in_pass1(line);

        let count = self.operand_value(line.operand_text(), Pass::Two)?;
        if count < 0 {
            return Err(LineError::IllegalExpression);
        }
        self.reset_buffer();
        self.line.next_pc = self
            .pc
            .wrapping_add((count as u32).wrapping_mul(self.line.size.bytes()));
        Ok(())
    }

    pub(super) fn align_pc(&mut self, line: &Line<'_>) -> Result<(), LineError> {
        if line.label.is_some() {
            self.report(line, LineError::LabelNotAllowed);
        }

        let boundary = match line.operands {
            None => self.line.size.bytes(),
            Some(text) => {
                let exponent = self.operand_value(text, Pass::Two)?;
                if !(1..=MAX_ALIGN_EXPONENT).contains(&exponent) {
                    return Err(LineError::IllegalExpression);
                }
                1 << exponent
            }
        };
        self.pc = align(self.pc, boundary);
        self.reset_buffer();
        Ok(())
    }

    /// `EXTERN`, `XREF`, `GLOBAL` and `XDEF` all mark names external.
    pub(super) fn external(&mut self, line: &Line<'_>) -> Result<(), LineError> {
        self.reset_buffer();
        if line.label.is_some() {
            self.report(line, LineError::LabelNotAllowed);
        }
        if self.pass != Pass::One {
            return Ok(());
        }

        let mut rest = line.operand_text().trim_start();
        loop {
            let name = parse_symbol(rest).ok_or(LineError::IllegalLabel)?;
            self.symbols.mark_external(name);
            rest = rest[name.len()..].trim_start();
            match rest.strip_prefix(',') {
                Some(after) => rest = after.trim_start(),
                None => break,
            }
        }
        if rest.is_empty() {
            Ok(())
        } else {
            Err(LineError::CommaExpected)
        }
    }

    pub(super) fn switch_segment(&mut self, line: &Line<'_>, target: Segment) -> Result<(), LineError> {
        if self.segment != target {
            self.segment_pc[self.segment.index()] = self.pc;
            self.segment = target;
            self.pc = self.segment_pc[target.index()];
            trace!(segment = ?target, pc = self.pc, "switch segment");
        }
        self.reset_buffer();

        if line.label.is_some() {
            return Err(LineError::LabelNotAllowed);
        }
        Ok(())
    }

    pub(super) fn end(&mut self, line: &Line<'_>) -> Result<(), LineError> {
        self.reset_buffer();
        self.state = PassState::Done(self.pass);

        let start = match line.operands {
            None => 0,
            Some(text) => self.operand_value(text, Pass::Two)?,
        };
        if self.pass == Pass::Two {
            self.start_address.get_or_insert(start as u32);
        }
        self.label_in_pass1(line);
        Ok(())
    }
}
