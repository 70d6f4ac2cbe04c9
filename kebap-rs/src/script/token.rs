//! Tokens produced by the [`Lexer`](super::lexer::Lexer).

use std::fmt;

/// Lexical category of a [`Token`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Keyword,
    Identifier,
    /// `true` / `false`
    Boolean,
    Integer,
    Floating,
    /// `( ) [ ] { } , ; :`
    Separator,
    Operator,
    /// Quoted string; the token text is the unescaped content.
    Quote,
    Comment,
    Whitespace,
    End,
}

/// Numeric literal suffix flags (`u`, `l`, `i`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NumberFlags {
    pub unsigned: bool,
    pub long: bool,
    pub imaginary: bool,
}

/// A single lexeme.  Immutable once produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub flags: NumberFlags,
    pub line: usize,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, line: usize) -> Self {
        Token {
            kind,
            text: text.into(),
            flags: NumberFlags::default(),
            line,
        }
    }

    pub fn end(line: usize) -> Self {
        Token::new(TokenKind::End, "", line)
    }

    pub fn is_end(&self) -> bool {
        self.kind == TokenKind::End
    }

    /// `true` if this is an operator, separator, or keyword spelled `text`.
    pub fn is(&self, text: &str) -> bool {
        matches!(
            self.kind,
            TokenKind::Operator | TokenKind::Separator | TokenKind::Keyword
        ) && self.text == text
    }

    pub fn is_identifier(&self) -> bool {
        self.kind == TokenKind::Identifier
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::End => write!(f, "end of input"),
            TokenKind::Quote => write!(f, "\"{}\"", self.text),
            _ => write!(f, "'{}'", self.text),
        }
    }
}
