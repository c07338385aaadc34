use logos::Logos;

use crate::diag::LineError;

/// Tokens of the text that follows the mnemonic. Only quoting matters here: a
/// `;` inside a string or character constant does not start a comment.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldToken {
    #[regex(r#""([^"\\]|\\.)*""#, allow_greedy = true)]
    Str,

    #[regex(r"'([^'\\]|\\.)*'", allow_greedy = true)]
    Char,

    #[regex(r";[^\n]*", allow_greedy = true)]
    Comment,

    #[regex(r#"[^"';]+"#, allow_greedy = true)]
    Text,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OperandSplit<'a> {
    pub operands: &'a str,
    pub comment: Option<&'a str>,
}

/// Splits `tail` at the first unquoted `;`. The comment excludes the `;`.
pub fn split_operands(tail: &str) -> Result<OperandSplit<'_>, LineError> {
    for (token, span) in FieldToken::lexer(tail).spanned() {
        match token {
            Ok(FieldToken::Comment) => {
                return Ok(OperandSplit {
                    operands: &tail[..span.start],
                    comment: Some(&tail[span.start + 1..]),
                });
            }
            Ok(FieldToken::Str | FieldToken::Char | FieldToken::Text) => {}
            Err(()) => return Err(LineError::UnterminatedConstant),
        }
    }

    Ok(OperandSplit {
        operands: tail,
        comment: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comment_starts_at_first_unquoted_semicolon() {
        let split = split_operands("R1,R2 ; copy").expect("split");
        assert_eq!(split.operands, "R1,R2 ");
        assert_eq!(split.comment, Some(" copy"));
    }

    #[test]
    fn semicolons_inside_constants_are_operands() {
        let split = split_operands(r#""a;b",';' ;done"#).expect("split");
        assert_eq!(split.operands, r#""a;b",';' "#);
        assert_eq!(split.comment, Some("done"));

        let split = split_operands(r#""say \"hi;\"""#).expect("escaped quote");
        assert_eq!(split.comment, None);
    }

    #[test]
    fn unterminated_constants_are_reported() {
        assert_eq!(
            split_operands(r#""abc ; not a comment"#),
            Err(LineError::UnterminatedConstant)
        );
        assert_eq!(split_operands("'x"), Err(LineError::UnterminatedConstant));
    }

    #[test]
    fn comment_inside_comment_is_not_rescanned() {
        let split = split_operands("5 ; it's fine").expect("split");
        assert_eq!(split.operands, "5 ");
        assert_eq!(split.comment, Some(" it's fine"));
    }
}
