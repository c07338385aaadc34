use indexmap::IndexMap;
use thiserror::Error;

use crate::source::{FileId, Span};

/// Value contributed by a symbol that has been referenced but not yet bound.
pub const UNDEFINED_PLACEHOLDER: i32 = 1;

const RESERVED_WORDS: [&str; 2] = ["SP", "CCR"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SymKind {
    Undefined,
    Absolute,
    Text,
    Data,
    Bss,
    Common,
}

impl SymKind {
    pub fn listing_name(self) -> &'static str {
        match self {
            SymKind::Undefined => "Und",
            SymKind::Absolute => "Abs",
            SymKind::Text => "Text",
            SymKind::Data => "Data",
            SymKind::Bss => "Bss",
            SymKind::Common => "Comm",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Symbol {
    pub kind: SymKind,
    pub value: i32,
    pub external: bool,
    pub defined_at: Option<(FileId, Span)>,
}

impl Symbol {
    fn undefined() -> Self {
        Self {
            kind: SymKind::Undefined,
            value: 0,
            external: false,
            defined_at: None,
        }
    }

    pub fn is_defined(&self) -> bool {
        self.kind != SymKind::Undefined
    }

    /// Type column of the symbol-table dump, e.g. `Text` or `Abs_E`.
    pub fn listing_type(&self) -> String {
        let mut name = self.kind.listing_name().to_string();
        if self.external {
            name.push_str("_E");
        }
        name
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SymbolRead {
    Undefined(i32),
    Defined(i32),
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("symbol `{name}` is already bound to {value:#x}")]
pub struct AlreadyBound {
    pub name: String,
    pub value: i32,
    pub defined_at: Option<(FileId, Span)>,
}

#[derive(Clone, Debug, Default)]
pub struct SymTab {
    map: IndexMap<String, Symbol>,
}

impl SymTab {
    pub fn clear(&mut self) {
        self.map.clear();
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.map.get(name)
    }

    pub fn get_known(&self, name: &str) -> Option<i32> {
        self.map
            .get(name)
            .filter(|symbol| symbol.is_defined())
            .map(|symbol| symbol.value)
    }

    pub fn lookup_or_create(&mut self, name: &str) -> &mut Symbol {
        self.map
            .entry(name.to_string())
            .or_insert_with(Symbol::undefined)
    }

    pub fn bind(&mut self, name: &str, value: i32, kind: SymKind) -> Result<(), AlreadyBound> {
        self.bind_at(name, value, kind, None)
    }

    /// Binds `name` once. A second binding leaves the table untouched and
    /// reports the value the symbol already holds.
    pub fn bind_at(
        &mut self,
        name: &str,
        value: i32,
        kind: SymKind,
        defined_at: Option<(FileId, Span)>,
    ) -> Result<(), AlreadyBound> {
        let symbol = self.lookup_or_create(name);
        if symbol.is_defined() {
            return Err(AlreadyBound {
                name: name.to_string(),
                value: symbol.value,
                defined_at: symbol.defined_at.clone(),
            });
        }

        symbol.kind = kind;
        symbol.value = value;
        symbol.defined_at = defined_at;
        Ok(())
    }

    pub fn mark_external(&mut self, name: &str) {
        self.lookup_or_create(name).external = true;
    }

    /// Reads a symbol, creating it undefined on first reference.
    pub fn read(&mut self, name: &str) -> SymbolRead {
        let symbol = self.lookup_or_create(name);
        if symbol.is_defined() {
            SymbolRead::Defined(symbol.value)
        } else {
            SymbolRead::Undefined(UNDEFINED_PLACEHOLDER)
        }
    }

    /// Symbols ordered by name (byte-wise), as dumped at the end of the listing.
    pub fn sorted(&self) -> Vec<(&str, &Symbol)> {
        let mut entries: Vec<_> = self
            .map
            .iter()
            .map(|(name, symbol)| (name.as_str(), symbol))
            .collect();
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));
        entries
    }
}

pub fn is_symbol_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

pub fn is_symbol_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '_' | '$' | '%')
}

/// `SP`, `CCR` and `R0`..`R31`, compared case-insensitively.
pub fn is_reserved(name: &str) -> bool {
    if RESERVED_WORDS
        .iter()
        .any(|word| word.eq_ignore_ascii_case(name))
    {
        return true;
    }

    let Some(digits) = name
        .strip_prefix('R')
        .or_else(|| name.strip_prefix('r'))
    else {
        return false;
    };
    !digits.is_empty()
        && digits.len() <= 2
        && digits.bytes().all(|b| b.is_ascii_digit())
        && digits.parse::<u32>().is_ok_and(|reg| reg <= 31)
        && (digits.len() == 1 || !digits.starts_with('0'))
}

/// Scans an identifier at the start of `text`. Returns `None` when the text
/// does not start with an identifier or the identifier is a reserved word.
pub fn parse_symbol(text: &str) -> Option<&str> {
    let mut chars = text.char_indices();
    let (_, first) = chars.next()?;
    if !is_symbol_start(first) {
        return None;
    }

    let end = chars
        .find(|(_, ch)| !is_symbol_char(*ch))
        .map(|(idx, _)| idx)
        .unwrap_or(text.len());
    let name = &text[..end];
    if is_reserved(name) { None } else { Some(name) }
}
