use chumsky::{IterParser, error::Rich, extra, prelude::*, span::SimpleSpan, text};
use thiserror::Error;

use crate::symbols::{SymTab, SymbolRead, is_reserved, is_symbol_char, is_symbol_start};

pub const DEFAULT_RADIX: u32 = 10;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expr {
    Number(i32),
    Symbol(String),
    Star,
    Neg(Box<Expr>),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    Resolved,
    Unresolved,
}

impl Resolution {
    fn and(self, other: Resolution) -> Resolution {
        if self == Resolution::Resolved && other == Resolution::Resolved {
            Resolution::Resolved
        } else {
            Resolution::Unresolved
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pass {
    One,
    Two,
}

impl Pass {
    /// Pass 1 tolerates forward references; pass 2 needs every symbol bound.
    pub fn accepts(self, resolution: Resolution) -> bool {
        self == Pass::One || resolution == Resolution::Resolved
    }

    pub fn number(self) -> u8 {
        match self {
            Pass::One => 1,
            Pass::Two => 2,
        }
    }

    pub fn index(self) -> usize {
        usize::from(self.number() - 1)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExprSettings {
    pub radix: u32,
    pub star: i32,
}

impl Default for ExprSettings {
    fn default() -> Self {
        Self {
            radix: DEFAULT_RADIX,
            star: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Evaluated {
    pub value: i32,
    pub resolution: Resolution,
    /// Bytes taken from the input, including skipped leading whitespace.
    pub consumed: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ExprError {
    #[error("empty expression")]
    Empty,
    #[error("{0}")]
    Syntax(String),
    #[error("division by zero")]
    DivideByZero,
    #[error("expression refers to undefined symbols")]
    Unresolved,
}

type ParseError<'src> = Rich<'src, char>;
type ParseExtra<'src> = extra::Err<ParseError<'src>>;

/// Evaluates the longest expression starting at `text[start..]`.
pub fn evaluate(
    text: &str,
    start: usize,
    symbols: &mut SymTab,
    settings: ExprSettings,
) -> Result<Evaluated, ExprError> {
    let rest = text.get(start..).unwrap_or_default();
    let trimmed = rest.trim_start();
    let skipped = rest.len() - trimmed.len();
    if trimmed.is_empty() {
        return Err(ExprError::Empty);
    }

    let (expr, used) = parse_expr_prefix(trimmed, settings.radix).map_err(ExprError::Syntax)?;
    let (value, resolution) = eval_expr(&expr, symbols, settings.star)?;
    Ok(Evaluated {
        value,
        resolution,
        consumed: skipped + used,
    })
}

/// Like [`evaluate`], but rejects unresolved results outside pass 1.
pub fn evaluate_in_pass(
    text: &str,
    start: usize,
    symbols: &mut SymTab,
    settings: ExprSettings,
    pass: Pass,
) -> Result<Evaluated, ExprError> {
    let evaluated = evaluate(text, start, symbols, settings)?;
    if pass.accepts(evaluated.resolution) {
        Ok(evaluated)
    } else {
        Err(ExprError::Unresolved)
    }
}

pub fn parse_expr_prefix(input: &str, radix: u32) -> Result<(Expr, usize), String> {
    expr_parser(radix)
        .map_with(|expr, extra| {
            let span: SimpleSpan = extra.span();
            (expr, span.end)
        })
        .then_ignore(any().repeated())
        .parse(input)
        .into_result()
        .map_err(|errs| format_parser_errors(errs, input))
}

pub fn eval_expr(
    expr: &Expr,
    symbols: &mut SymTab,
    star: i32,
) -> Result<(i32, Resolution), ExprError> {
    match expr {
        Expr::Number(value) => Ok((*value, Resolution::Resolved)),
        Expr::Star => Ok((star, Resolution::Resolved)),
        Expr::Symbol(name) => Ok(match symbols.read(name) {
            SymbolRead::Defined(value) => (value, Resolution::Resolved),
            SymbolRead::Undefined(placeholder) => (placeholder, Resolution::Unresolved),
        }),
        Expr::Neg(inner) => {
            let (value, resolution) = eval_expr(inner, symbols, star)?;
            Ok((value.wrapping_neg(), resolution))
        }
        Expr::Binary { op, lhs, rhs } => {
            let (left, left_res) = eval_expr(lhs, symbols, star)?;
            let (right, right_res) = eval_expr(rhs, symbols, star)?;
            let value = match op {
                BinOp::Add => left.wrapping_add(right),
                BinOp::Sub => left.wrapping_sub(right),
                BinOp::Mul => left.wrapping_mul(right),
                BinOp::Div => {
                    if right == 0 {
                        return Err(ExprError::DivideByZero);
                    }
                    left.wrapping_div(right)
                }
            };
            Ok((value, left_res.and(right_res)))
        }
    }
}

/// Maps the character after a backslash in string and character constants.
pub fn escape_char(ch: char) -> char {
    match ch {
        'n' => '\n',
        't' => '\t',
        'v' => '\x0B',
        'b' => '\x08',
        'r' => '\r',
        'f' => '\x0C',
        'a' => '\x07',
        '0' => '\0',
        other => other,
    }
}

fn pack_chars(chars: &[char]) -> i32 {
    chars
        .iter()
        .fold(0u32, |acc, ch| (acc << 8) | (u32::from(*ch) & 0xFF)) as i32
}

fn accumulate(raw: &str, radix: u32) -> i32 {
    raw.chars()
        .filter_map(|ch| ch.to_digit(radix))
        .fold(0i32, |acc, digit| {
            acc.wrapping_mul(radix as i32).wrapping_add(digit as i32)
        })
}

fn prefixed_number<'src>(radix: u32) -> impl Parser<'src, &'src str, i32, ParseExtra<'src>> + Clone {
    text::digits(radix)
        .to_slice()
        .map(move |raw: &str| accumulate(raw, radix))
}

fn bare_number<'src>(radix: u32) -> impl Parser<'src, &'src str, i32, ParseExtra<'src>> + Clone {
    any()
        .filter(move |ch: &char| ch.is_ascii_digit() && ch.is_digit(radix))
        .then(any().filter(move |ch: &char| ch.is_digit(radix)).repeated())
        .to_slice()
        .map(move |raw: &str| accumulate(raw, radix))
}

fn expr_parser<'src>(radix: u32) -> impl Parser<'src, &'src str, Expr, ParseExtra<'src>> + Clone {
    recursive(move |expr| {
        let escaped = just('\\').ignore_then(any()).map(escape_char);
        let char_literal = just('\'')
            .ignore_then(
                choice((escaped, none_of("\\'")))
                    .repeated()
                    .at_least(1)
                    .at_most(4)
                    .collect::<Vec<char>>(),
            )
            .then_ignore(just('\''))
            .map(|chars| Expr::Number(pack_chars(&chars)));

        let number = choice((
            just("0x")
                .or(just("0X"))
                .ignore_then(prefixed_number(16)),
            just('$').ignore_then(prefixed_number(16)),
            just('&').ignore_then(prefixed_number(10)),
            just('@').ignore_then(prefixed_number(8)),
            just('%').ignore_then(prefixed_number(2)),
            bare_number(radix),
        ))
        .map(Expr::Number);

        let symbol = any()
            .filter(|ch: &char| is_symbol_start(*ch))
            .then(any().filter(|ch: &char| is_symbol_char(*ch)).repeated())
            .to_slice()
            .try_map(|name: &str, span| {
                if is_reserved(name) {
                    Err(Rich::custom(span, format!("`{name}` is a reserved word")))
                } else {
                    Ok(Expr::Symbol(name.to_string()))
                }
            });

        let unsigned = choice((
            expr.clone().delimited_by(just('('), just(')')),
            char_literal,
            just('*').to(Expr::Star),
            number,
            symbol,
        ));

        let signed = just('-')
            .repeated()
            .collect::<Vec<_>>()
            .then(unsigned)
            .map(|(minus, value)| {
                minus
                    .into_iter()
                    .fold(value, |inner, _| Expr::Neg(Box::new(inner)))
            });

        let term = signed
            .clone()
            .then(
                choice((just('*').to(BinOp::Mul), just('/').to(BinOp::Div)))
                    .then(signed.or_not())
                    .repeated()
                    .collect::<Vec<_>>(),
            )
            .try_map(|(first, rest), span| fold_operands(first, rest, span));

        term.clone()
            .then(
                choice((just('+').to(BinOp::Add), just('-').to(BinOp::Sub)))
                    .then(term.or_not())
                    .repeated()
                    .collect::<Vec<_>>(),
            )
            .try_map(|(first, rest), span| fold_operands(first, rest, span))
    })
}

/// Builds a left-associative chain. An operator must be followed by an
/// operand, so `1+` is malformed rather than a shorter expression.
fn fold_operands<'src>(
    first: Expr,
    rest: Vec<(BinOp, Option<Expr>)>,
    span: SimpleSpan,
) -> Result<Expr, ParseError<'src>> {
    rest.into_iter().try_fold(first, |lhs, (op, rhs)| {
        let rhs = rhs.ok_or_else(|| Rich::custom(span, "operator without a right operand"))?;
        Ok(Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    })
}

fn format_parser_errors(errs: Vec<ParseError<'_>>, input: &str) -> String {
    errs.into_iter()
        .map(|err| {
            let span = err.span();
            let where_at = format!("{}..{}", span.start, span.end);
            format!("{} at {where_at} in `{input}`", err.reason())
        })
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::SymKind;

    fn eval(text: &str) -> Result<Evaluated, ExprError> {
        let mut symbols = SymTab::default();
        evaluate(text, 0, &mut symbols, ExprSettings::default())
    }

    fn value(text: &str) -> i32 {
        eval(text).expect("evaluation failed").value
    }

    #[test]
    fn honours_precedence_and_parentheses() {
        assert_eq!(value("1+2*3"), 7);
        assert_eq!(value("(1+2)*3"), 9);
        assert_eq!(value("10-4-3"), 3);
        assert_eq!(value("2*-3"), -6);
        assert_eq!(value("--5"), 5);
        assert_eq!(value("-7/2"), -3);
    }

    #[test]
    fn radix_markers() {
        assert_eq!(value("$1F"), 0x1F);
        assert_eq!(value("0x10"), 16);
        assert_eq!(value("&99"), 99);
        assert_eq!(value("@17"), 0o17);
        assert_eq!(value("%1010"), 10);
        assert!(eval("$").is_err());
        assert!(eval("%2").is_err());
    }

    #[test]
    fn bare_numbers_follow_the_default_radix() {
        let mut symbols = SymTab::default();
        let settings = ExprSettings {
            radix: 16,
            star: 0,
        };
        let evaluated = evaluate("10", 0, &mut symbols, settings).expect("hex default");
        assert_eq!(evaluated.value, 16);

        // A leading letter is a symbol even when it is a valid digit.
        let evaluated = evaluate("AB", 0, &mut symbols, settings).expect("symbol");
        assert_eq!(evaluated.resolution, Resolution::Unresolved);
    }

    #[test]
    fn character_constants_pack_big_endian() {
        assert_eq!(value("'A'"), 0x41);
        assert_eq!(value("'AB'"), 0x4142);
        assert_eq!(value("'\\n'"), 0x0A);
        assert_eq!(value("'\\q'"), i32::from(b'q'));
        assert_eq!(value("'ABCD'") as u32, 0x4142_4344);
        assert!(eval("''").is_err());
        assert!(eval("'ABCDE'").is_err());
    }

    #[test]
    fn reports_consumed_length_including_leading_whitespace() {
        let evaluated = eval("  4(R2)").expect("prefix");
        assert_eq!(evaluated.value, 4);
        assert_eq!(evaluated.consumed, 3);

        let evaluated = eval("LABEL,R1").expect("prefix");
        assert_eq!(evaluated.consumed, 5);
    }

    #[test]
    fn evaluates_from_an_offset() {
        let mut symbols = SymTab::default();
        let evaluated =
            evaluate("R1,#-12", 4, &mut symbols, ExprSettings::default()).expect("offset");
        assert_eq!(evaluated.value, -12);
        assert_eq!(evaluated.consumed, 3);
    }

    #[test]
    fn undefined_symbols_are_created_and_unresolved() {
        let mut symbols = SymTab::default();
        let evaluated =
            evaluate("FWD+2", 0, &mut symbols, ExprSettings::default()).expect("forward");
        assert_eq!(evaluated.value, 3);
        assert_eq!(evaluated.resolution, Resolution::Unresolved);
        assert!(symbols.get("FWD").is_some());

        symbols.bind("FWD", 0x100, SymKind::Text).expect("bind");
        let evaluated =
            evaluate("FWD+2", 0, &mut symbols, ExprSettings::default()).expect("backward");
        assert_eq!(evaluated.value, 0x102);
        assert_eq!(evaluated.resolution, Resolution::Resolved);
    }

    #[test]
    fn pass_two_rejects_unresolved_results() {
        let mut symbols = SymTab::default();
        let settings = ExprSettings::default();
        assert!(evaluate_in_pass("NOPE", 0, &mut symbols, settings, Pass::One).is_ok());
        assert_eq!(
            evaluate_in_pass("NOPE", 0, &mut symbols, settings, Pass::Two),
            Err(ExprError::Unresolved)
        );
        assert_eq!(
            evaluate_in_pass("5*2", 0, &mut symbols, settings, Pass::Two).map(|e| e.value),
            Ok(10)
        );
    }

    #[test]
    fn star_uses_the_supplied_value() {
        let mut symbols = SymTab::default();
        let settings = ExprSettings {
            radix: 10,
            star: 0x200,
        };
        let evaluated = evaluate("*+4", 0, &mut symbols, settings).expect("star");
        assert_eq!(evaluated.value, 0x204);
    }

    #[test]
    fn malformed_inputs() {
        assert_eq!(eval(""), Err(ExprError::Empty));
        assert_eq!(eval("   "), Err(ExprError::Empty));
        assert_eq!(eval("4/0"), Err(ExprError::DivideByZero));
        assert!(matches!(eval("R3"), Err(ExprError::Syntax(_))));
        assert!(matches!(eval("(1+2"), Err(ExprError::Syntax(_))));
        assert!(matches!(eval("#5"), Err(ExprError::Syntax(_))));
    }

    #[test]
    fn dangling_operators_are_malformed() {
        for text in ["1+", "2*", "3-", "4/", "5+)", "1+2*", "(2*)+1"] {
            assert!(
                matches!(eval(text), Err(ExprError::Syntax(_))),
                "`{text}` evaluated to {:?}",
                eval(text)
            );
        }
        assert_eq!(value("1+-2"), -1);
        assert_eq!(eval("3-1,R2").map(|e| e.consumed), Ok(3));
    }

    #[test]
    fn arithmetic_wraps_at_32_bits() {
        assert_eq!(value("$7FFFFFFF+1"), i32::MIN);
        assert_eq!(value("$FFFFFFFF"), -1);
        assert_eq!(value("$100000000"), 0);
    }
}
