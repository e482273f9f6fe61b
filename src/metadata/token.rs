//! Metadata tokens for the tables a patch pass reads and writes.
//!
//! A token packs a table id into its high byte and a 1-based row into the low 24 bits. Only four
//! tables appear in the module model: type references and definitions, method definitions and
//! member references.

use std::fmt;

/// Reference to a row of a metadata table.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token(pub u32);

impl Token {
    /// `TypeRef` table
    pub const TYPE_REF: u8 = 0x01;
    /// `TypeDef` table
    pub const TYPE_DEF: u8 = 0x02;
    /// `MethodDef` table
    pub const METHOD_DEF: u8 = 0x06;
    /// `MemberRef` table
    pub const MEMBER_REF: u8 = 0x0A;

    /// Wraps a raw token value. `Token::new(0)` marks a definition not yet added to a module.
    #[must_use]
    pub fn new(value: u32) -> Self {
        Token(value)
    }

    /// Builds the token for `row` of `table`. Row bits above 24 are dropped.
    #[must_use]
    pub fn from_parts(table: u8, row: u32) -> Self {
        Token((u32::from(table) << 24) | (row & 0x00FF_FFFF))
    }

    /// Table id.
    #[must_use]
    // The shift leaves only the high byte
    #[allow(clippy::cast_possible_truncation)]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// 1-based row within the table.
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// `true` for `MethodDef` and `MemberRef` tokens, the two a call can name.
    #[must_use]
    pub fn is_method(&self) -> bool {
        matches!(self.table(), Token::METHOD_DEF | Token::MEMBER_REF)
    }

    fn table_name(&self) -> Option<&'static str> {
        match self.table() {
            Token::TYPE_REF => Some("TypeRef"),
            Token::TYPE_DEF => Some("TypeDef"),
            Token::METHOD_DEF => Some("MethodDef"),
            Token::MEMBER_REF => Some("MemberRef"),
            _ => None,
        }
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.table_name() {
            Some(table) => write!(f, "{table}({})", self.row()),
            None => write!(f, "Token(0x{:08x})", self.0),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}
