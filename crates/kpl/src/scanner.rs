//! Lexical scanner: raw characters to tokens.
//!
//! Identifiers and keywords are folded to upper case as they are read.
//! Comments come in two forms: `(* ... *)` blocks and `//` to end of line.
//! All scan failures are fatal and surface as [`CompileError`]s.

use crate::error::{CompileError, ErrorKind, Result};
use crate::reader::Reader;
use crate::token::{MAX_IDENT_LEN, Token, TokenKind};

/// Token producer over a [`Reader`].
#[derive(Debug)]
pub struct Scanner {
    reader: Reader,
}

impl Scanner {
    pub fn new(source: &str) -> Self {
        Self {
            reader: Reader::new(source),
        }
    }

    /// Returns the next token, skipping whitespace and comments.
    ///
    /// Since every lexical error is fatal there are no invalid tokens to
    /// retry past; the name records that callers get valid tokens only.
    pub fn next_valid_token(&mut self) -> Result<Token> {
        self.next_token()
    }

    fn next_token(&mut self) -> Result<Token> {
        loop {
            let (line, col) = (self.reader.line(), self.reader.col());
            let Some(ch) = self.reader.current_char() else {
                return Ok(Token::new(TokenKind::Eof, line, col));
            };
            match ch {
                c if c.is_whitespace() => self.reader.next_char(),
                c if c.is_ascii_alphabetic() => return self.read_ident_or_keyword(),
                c if c.is_ascii_digit() => return self.read_number(),
                '+' => return Ok(self.single(TokenKind::Plus)),
                '-' => return Ok(self.single(TokenKind::Minus)),
                '*' => return Ok(self.single(TokenKind::Times)),
                '/' => {
                    self.reader.next_char();
                    if self.reader.current_char() == Some('/') {
                        self.skip_line_comment();
                        continue;
                    }
                    return Ok(Token::new(TokenKind::Slash, line, col));
                }
                '(' => {
                    self.reader.next_char();
                    match self.reader.current_char() {
                        Some('.') => {
                            self.reader.next_char();
                            return Ok(Token::new(TokenKind::LSel, line, col));
                        }
                        Some('*') => {
                            self.reader.next_char();
                            self.skip_block_comment()?;
                            continue;
                        }
                        _ => return Ok(Token::new(TokenKind::LPar, line, col)),
                    }
                }
                ')' => return Ok(self.single(TokenKind::RPar)),
                '[' => return Ok(self.single(TokenKind::LSel)),
                ']' => return Ok(self.single(TokenKind::RSel)),
                '.' => {
                    self.reader.next_char();
                    if self.reader.current_char() == Some(')') {
                        self.reader.next_char();
                        return Ok(Token::new(TokenKind::RSel, line, col));
                    }
                    return Ok(Token::new(TokenKind::Period, line, col));
                }
                ',' => return Ok(self.single(TokenKind::Comma)),
                ';' => return Ok(self.single(TokenKind::Semicolon)),
                ':' => {
                    self.reader.next_char();
                    if self.reader.current_char() == Some('=') {
                        self.reader.next_char();
                        return Ok(Token::new(TokenKind::Assign, line, col));
                    }
                    return Ok(Token::new(TokenKind::Colon, line, col));
                }
                '=' => return Ok(self.single(TokenKind::Eq)),
                '<' => {
                    self.reader.next_char();
                    match self.reader.current_char() {
                        Some('=') => {
                            self.reader.next_char();
                            return Ok(Token::new(TokenKind::Le, line, col));
                        }
                        // `<>` is the grammar's not-equal spelling.
                        Some('>') => {
                            self.reader.next_char();
                            return Ok(Token::new(TokenKind::Ne, line, col));
                        }
                        _ => return Ok(Token::new(TokenKind::Lt, line, col)),
                    }
                }
                '>' => {
                    self.reader.next_char();
                    if self.reader.current_char() == Some('=') {
                        self.reader.next_char();
                        return Ok(Token::new(TokenKind::Ge, line, col));
                    }
                    return Ok(Token::new(TokenKind::Gt, line, col));
                }
                '!' => {
                    self.reader.next_char();
                    if self.reader.current_char() == Some('=') {
                        self.reader.next_char();
                        return Ok(Token::new(TokenKind::Ne, line, col));
                    }
                    return Err(CompileError::new(ErrorKind::InvalidSymbol, line, col));
                }
                '\'' => return self.read_char_literal(),
                _ => return Err(CompileError::new(ErrorKind::InvalidSymbol, line, col)),
            }
        }
    }

    /// Consumes a one-character token.
    fn single(&mut self, kind: TokenKind) -> Token {
        let token = Token::new(kind, self.reader.line(), self.reader.col());
        self.reader.next_char();
        token
    }

    fn read_ident_or_keyword(&mut self) -> Result<Token> {
        let (line, col) = (self.reader.line(), self.reader.col());
        let mut lexeme = String::new();
        while let Some(ch) = self.reader.current_char() {
            if !ch.is_ascii_alphanumeric() {
                break;
            }
            if lexeme.len() > MAX_IDENT_LEN {
                return Err(CompileError::new(ErrorKind::IdentTooLong, line, col));
            }
            lexeme.push(ch.to_ascii_uppercase());
            self.reader.next_char();
        }
        if lexeme.len() > MAX_IDENT_LEN {
            return Err(CompileError::new(ErrorKind::IdentTooLong, line, col));
        }
        let kind = TokenKind::keyword(&lexeme).unwrap_or(TokenKind::Ident);
        Ok(Token {
            kind,
            lexeme,
            value: 0,
            line,
            col,
        })
    }

    fn read_number(&mut self) -> Result<Token> {
        let (line, col) = (self.reader.line(), self.reader.col());
        let mut lexeme = String::new();
        let mut value: i32 = 0;
        while let Some(ch) = self.reader.current_char() {
            let Some(digit) = ch.to_digit(10) else { break };
            lexeme.push(ch);
            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_add(digit as i32))
                .ok_or_else(|| CompileError::new(ErrorKind::InvalidConstant, line, col))?;
            self.reader.next_char();
        }
        Ok(Token {
            kind: TokenKind::Number,
            lexeme,
            value,
            line,
            col,
        })
    }

    fn read_char_literal(&mut self) -> Result<Token> {
        let (line, col) = (self.reader.line(), self.reader.col());
        self.reader.next_char();
        let Some(ch) = self.reader.current_char() else {
            return Err(CompileError::new(ErrorKind::InvalidCharConstant, line, col));
        };
        self.reader.next_char();
        if self.reader.current_char() != Some('\'') {
            return Err(CompileError::new(ErrorKind::InvalidCharConstant, line, col));
        }
        self.reader.next_char();
        Ok(Token {
            kind: TokenKind::CharLiteral,
            lexeme: ch.to_string(),
            value: ch as i32,
            line,
            col,
        })
    }

    /// Skips a `//` comment: everything up to and including the newline.
    fn skip_line_comment(&mut self) {
        let start_line = self.reader.line();
        while self.reader.current_char().is_some() && self.reader.line() == start_line {
            self.reader.next_char();
        }
    }

    /// Skips the body of a `(* ... *)` comment; the opener is already
    /// consumed. Unterminated comments are an error.
    fn skip_block_comment(&mut self) -> Result<()> {
        let mut saw_star = false;
        while let Some(ch) = self.reader.current_char() {
            self.reader.next_char();
            if saw_star && ch == ')' {
                return Ok(());
            }
            saw_star = ch == '*';
        }
        Err(CompileError::new(
            ErrorKind::UnterminatedComment,
            self.reader.line(),
            self.reader.col(),
        ))
    }
}
