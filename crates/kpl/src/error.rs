//! Compile-time error reporting.
//!
//! Every failure path in the compiler funnels into [`CompileError`]: a kind
//! plus the 1-based source position it was detected at. Errors are fatal —
//! the first one aborts the compile, so there is no recovery or
//! synchronization machinery here.

use std::fmt;
use std::io;

use crate::token::TokenKind;

/// Result alias used throughout the compiler.
pub type Result<T> = std::result::Result<T, CompileError>;

/// Everything that can go wrong while compiling a KPL program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    // Lexical
    InvalidSymbol,
    UnterminatedComment,
    InvalidCharConstant,
    IdentTooLong,

    // Syntactic
    MissingToken(TokenKind),
    InvalidStatement,
    InvalidExpression,
    InvalidTerm,
    InvalidFactor,
    InvalidConstant,
    InvalidType,
    InvalidBasicType,
    InvalidComparator,
    InvalidArguments,
    InvalidIdent,
    InvalidVariable,
    InvalidFunction,
    InvalidProcedure,
    InvalidLValue,

    // Name resolution
    DuplicateIdent,
    UndeclaredIdent,
    UndeclaredConstant,
    UndeclaredType,
    UndeclaredVariable,
    UndeclaredFunction,
    UndeclaredProcedure,
    UndeclaredIntConstant,

    // Type checking
    TypeInconsistency,
    ArgumentCountMismatch,

    // Resources
    CodeOverflow,
    Io(String),
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSymbol => write!(f, "invalid symbol"),
            Self::UnterminatedComment => write!(f, "comment is not terminated"),
            Self::InvalidCharConstant => write!(f, "invalid character constant"),
            Self::IdentTooLong => write!(f, "identifier is too long"),
            Self::MissingToken(kind) => write!(f, "missing {kind}"),
            Self::InvalidStatement => write!(f, "invalid statement"),
            Self::InvalidExpression => write!(f, "invalid expression"),
            Self::InvalidTerm => write!(f, "invalid term"),
            Self::InvalidFactor => write!(f, "invalid factor"),
            Self::InvalidConstant => write!(f, "invalid constant"),
            Self::InvalidType => write!(f, "invalid type"),
            Self::InvalidBasicType => write!(f, "invalid basic type"),
            Self::InvalidComparator => write!(f, "invalid comparator"),
            Self::InvalidArguments => write!(f, "invalid arguments"),
            Self::InvalidIdent => write!(f, "invalid identifier"),
            Self::InvalidVariable => write!(f, "invalid variable"),
            Self::InvalidFunction => write!(f, "invalid function"),
            Self::InvalidProcedure => write!(f, "invalid procedure"),
            Self::InvalidLValue => write!(f, "invalid lvalue"),
            Self::DuplicateIdent => write!(f, "identifier is declared twice"),
            Self::UndeclaredIdent => write!(f, "undeclared identifier"),
            Self::UndeclaredConstant => write!(f, "undeclared constant"),
            Self::UndeclaredType => write!(f, "undeclared type"),
            Self::UndeclaredVariable => write!(f, "undeclared variable"),
            Self::UndeclaredFunction => write!(f, "undeclared function"),
            Self::UndeclaredProcedure => write!(f, "undeclared procedure"),
            Self::UndeclaredIntConstant => write!(f, "undeclared integer constant"),
            Self::TypeInconsistency => write!(f, "type inconsistency"),
            Self::ArgumentCountMismatch => write!(f, "arguments and parameters are inconsistent"),
            Self::CodeOverflow => write!(f, "code buffer overflow"),
            Self::Io(message) => write!(f, "{message}"),
        }
    }
}

/// A fatal compile error with its source position.
///
/// Lines and columns are 1-based. I/O errors raised outside any source
/// position (opening the input, writing the image) carry position 0:0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub kind: ErrorKind,
    pub line: u32,
    pub col: u32,
}

impl CompileError {
    pub fn new(kind: ErrorKind, line: u32, col: u32) -> Self {
        Self { kind, line, col }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.col, self.kind)
    }
}

impl std::error::Error for CompileError {}

impl From<io::Error> for CompileError {
    fn from(err: io::Error) -> Self {
        Self::new(ErrorKind::Io(err.to_string()), 0, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_position() {
        let err = CompileError::new(ErrorKind::TypeInconsistency, 12, 3);
        assert_eq!(err.to_string(), "12:3: type inconsistency");
    }

    #[test]
    fn test_missing_token_names_the_expected_kind() {
        let err = CompileError::new(ErrorKind::MissingToken(TokenKind::Semicolon), 2, 9);
        assert_eq!(err.to_string(), "2:9: missing ;");
    }
}
