/// Fields of one source line. Every field borrows from the line text and is
/// absent when the line does not contain it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Line<'a> {
    pub label: Option<&'a str>,
    pub mnemonic: Option<&'a str>,
    pub operands: Option<&'a str>,
    pub comment: Option<&'a str>,
}

impl<'a> Line<'a> {
    pub fn is_blank(&self) -> bool {
        self.label.is_none() && self.mnemonic.is_none()
    }

    /// Operand field, or an empty string when the line has none.
    pub fn operand_text(&self) -> &'a str {
        self.operands.unwrap_or_default()
    }
}
