use std::fmt;

/// A metadata token referencing a metadata table row.
///
/// The engine never resolves tokens; it only carries them through so that catch types and
/// call targets survive the rebuild untouched, and uses them to tag events with the method
/// they belong to.
///
/// Tokens consist of a 32-bit value where:
/// - The high byte (bits 24-31) indicates the table type
/// - The low 24 bits (bits 0-23) indicate the row index within that table
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Token(pub u32);

impl Token {
    /// `TypeRef` table id
    pub const TABLE_TYPE_REF: u8 = 0x01;
    /// `TypeDef` table id
    pub const TABLE_TYPE_DEF: u8 = 0x02;
    /// `MethodDef` table id
    pub const TABLE_METHOD_DEF: u8 = 0x06;
    /// `TypeSpec` table id
    pub const TABLE_TYPE_SPEC: u8 = 0x1B;

    /// Creates a new token from a raw 32-bit value
    #[must_use]
    pub fn new(value: u32) -> Self {
        Token(value)
    }

    /// Returns the raw token value
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Extracts the table type from the token (high byte)
    #[must_use]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Extracts the row index from the token (low 24 bits)
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// Returns true if this is a null token (value 0)
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Returns true if the token can name the class of a catch clause
    /// (`TypeDef`, `TypeRef` or `TypeSpec` with a non-zero row).
    #[must_use]
    pub fn is_type(&self) -> bool {
        matches!(
            self.table(),
            Self::TABLE_TYPE_REF | Self::TABLE_TYPE_DEF | Self::TABLE_TYPE_SPEC
        ) && self.row() != 0
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl From<Token> for u32 {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token(0x{:08x}, table: 0x{:02x}, row: {})",
            self.0,
            self.table(),
            self.row()
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}
