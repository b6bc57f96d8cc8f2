//! Syntax errors

use thiserror::Error;

/// A syntax error in one source unit. Parsing of that unit stops at the first
/// error; other units are unaffected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{origin}:{line}:{col}: {kind}")]
pub struct ParseError {
    pub origin: String,
    pub line: u32,
    pub col: u32,
    pub kind: ParseErrorKind,
}

impl ParseError {
    pub fn new(origin: impl Into<String>, line: u32, col: u32, kind: ParseErrorKind) -> Self {
        ParseError {
            origin: origin.into(),
            line,
            col,
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    /// `type X string {}`: the primitive kind must follow `is`.
    #[error("invalid inheritance syntax: expected `is` after type name, found {found}")]
    InvalidInheritance { found: String },

    #[error("invalid top-level syntax: unexpected {found}")]
    InvalidTopLevel { found: String },

    #[error("expected {expected}, found {found}")]
    UnexpectedToken { expected: String, found: String },

    #[error("unterminated string literal")]
    UnterminatedString,

    #[error("invalid number literal `{0}`")]
    InvalidNumber(String),

    #[error("unknown primitive kind `{0}`")]
    UnknownPrimitive(String),

    #[error("field type `{0}` is a primitive keyword; declare a primitive type with `type <name> is {0}`")]
    PrimitiveKeywordAsFieldType(String),

    #[error("unexpected character `{0}`")]
    UnexpectedChar(char),

    #[error("duplicate key `{0}`")]
    DuplicateKey(String),
}
