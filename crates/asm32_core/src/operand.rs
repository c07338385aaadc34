//! Operand templates.
//!
//! A template is matched left to right against the operand text. Literal
//! characters compare case-insensitively (templates are written in upper
//! case). `%<n>R` reads a register `R0`..`R31` and ORs its number, shifted
//! left by `n`, into the opcode. `%V` reads an expression.

use crate::{
    expr::{ExprSettings, Pass, evaluate_in_pass},
    symbols::SymTab,
};

pub const MAX_REGISTER: u32 = 31;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Match {
    pub opcode: u32,
    pub value: i32,
    pub consumed: usize,
}

pub struct MatchEnv<'a> {
    pub symbols: &'a mut SymTab,
    pub settings: ExprSettings,
    pub pass: Pass,
}

/// Reads `R<d>` or `R<dd>` at the start of `text`; returns the register
/// number and the bytes read.
pub fn parse_register(text: &str) -> Option<(u32, usize)> {
    let bytes = text.as_bytes();
    if !matches!(bytes.first(), Some(b'R' | b'r')) {
        return None;
    }

    let digits = bytes[1..]
        .iter()
        .take(2)
        .take_while(|b| b.is_ascii_digit())
        .count();
    if digits == 0 {
        return None;
    }

    let number = bytes[1..=digits]
        .iter()
        .fold(0u32, |acc, b| acc * 10 + u32::from(b - b'0'));
    (number <= MAX_REGISTER).then_some((number, 1 + digits))
}

/// Matches `template` against `operand[start..]`. The caller's opcode is only
/// replaced when the whole template matches.
pub fn match_template(
    template: &str,
    operand: &str,
    start: usize,
    opcode: u32,
    env: &mut MatchEnv<'_>,
) -> Option<Match> {
    let mut pos = start;
    let mut opcode = opcode;
    let mut value = 0;
    let mut tpl = template.chars().peekable();

    while let Some(ch) = tpl.next() {
        if ch != '%' {
            let next = operand.get(pos..)?.chars().next()?;
            if next.to_ascii_uppercase() != ch {
                return None;
            }
            pos += next.len_utf8();
            continue;
        }

        let mut shift = 0u32;
        while let Some(digit) = tpl.peek().and_then(|ch| ch.to_digit(10)) {
            shift = shift * 10 + digit;
            tpl.next();
        }

        match tpl.next()? {
            'R' => {
                let (register, used) = parse_register(operand.get(pos..)?)?;
                opcode |= register.checked_shl(shift)?;
                pos += used;
            }
            'V' => {
                let evaluated =
                    evaluate_in_pass(operand, pos, env.symbols, env.settings, env.pass).ok()?;
                value = evaluated.value;
                pos += evaluated.consumed;
            }
            _ => return None,
        }
    }

    Some(Match {
        opcode,
        value,
        consumed: pos - start,
    })
}

/// Tries each template in order against the whole operand field and returns
/// the first one that matches with nothing but blanks left over.
pub fn match_any(
    templates: &[&str],
    operand: &str,
    opcode: u32,
    env: &mut MatchEnv<'_>,
) -> Option<(usize, Match)> {
    templates.iter().enumerate().find_map(|(idx, template)| {
        match_template(template, operand, 0, opcode, env)
            .filter(|found| operand[found.consumed..].trim().is_empty())
            .map(|found| (idx, found))
    })
}
