//! Script error type.
//!
//! Every failure inside the language (lexing, parsing, evaluation, and
//! user-level `throw`) is reported as a single [`ScriptError`].  The
//! [`ErrorKind`] only classifies the message; callers are expected to show
//! the rendered text.  As an error unwinds through statement frames each
//! frame adds its source line, so the final text reads
//! `line 7: line 2: division by zero`.

use std::fmt;

/// Broad category of a [`ScriptError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unexpected token, malformed literal, unterminated string.
    Syntax,
    /// Unknown variable, function, method, property, or type.
    UnknownName,
    /// Wrong argument kind/count, invalid cast, non-left-value assignment.
    Type,
    /// Division or modulo by zero, invalid range.
    Arithmetic,
    /// Inconsistent list/array length, object returned by value, cycles.
    Structural,
    /// Raised by the script itself with `throw`.
    Thrown,
    /// `exit` unwinding through an expression boundary; never caught by `try`.
    Exit,
}

/// The single error type of the interpreter.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptError {
    kind: ErrorKind,
    message: String,
    /// Source lines, innermost first.
    lines: Vec<usize>,
    /// Exit code carried by [`ErrorKind::Exit`].
    exit_code: i64,
}

pub type ScriptResult<T> = Result<T, ScriptError>;

impl ScriptError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        ScriptError {
            kind,
            message: message.into(),
            lines: Vec::new(),
            exit_code: 0,
        }
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Syntax, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownName, message)
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Type, message)
    }

    pub fn arithmetic(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Arithmetic, message)
    }

    pub fn structural(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Structural, message)
    }

    pub fn thrown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Thrown, message)
    }

    pub fn exit(code: i64) -> Self {
        let mut e = Self::new(ErrorKind::Exit, format!("exit({code})"));
        e.exit_code = code;
        e
    }

    /// Attach the source line of the frame the error is passing through.
    pub fn at_line(mut self, line: usize) -> Self {
        if line > 0 && self.lines.last() != Some(&line) {
            self.lines.push(line);
        }
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The bare message, without line context.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Innermost source line, if any frame recorded one.
    pub fn line(&self) -> Option<usize> {
        self.lines.first().copied()
    }

    pub fn exit_code(&self) -> i64 {
        self.exit_code
    }

    pub fn is_exit(&self) -> bool {
        self.kind == ErrorKind::Exit
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in self.lines.iter().rev() {
            write!(f, "line {line}: ")?;
        }
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ScriptError {}

// ── Tests ─────────────────────────────────────────────────────────────────────
