//! Module driver: turns source text into top-level entries and runs them.
//!
//! A top-level entry is one of
//!
//! - a function definition: a type name (or `void`), an identifier, `(`, a
//!   parameter list and `)` followed by a body.  A forward declaration (the
//!   same header followed by `;`) is accepted and ignored;
//! - `include FILE [from VAR];`, which splices the file into the token
//!   stream;
//! - any statement, executed immediately.  Non-void results of expression
//!   statements are printed on the console.
//!
//! # Quick start
//!
//! ```rust
//! use kebap::script::Interpreter;
//!
//! let mut interp = Interpreter::new();
//! interp.capture_output();
//! interp.run_source("demo", "int sq(int x) { return x*x; } sq(7);").unwrap();
//! assert_eq!(interp.take_output(), "49\n");
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};

use super::error::{ScriptError, ScriptResult};
use super::expr::{Expr, Parser};
use super::interp::{Engine, ExecStatus};
use super::lexer::Lexer;
use super::object::{Console, ObjectPrototype};
use super::optable::{Assoc, BinaryKind, Rank};
use super::slot::{self, Slot};
use super::stmt::{Stmt, StmtKind};
use super::token::TokenKind;
use super::value::Value;

/// Result of [`Interpreter::run_session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionOutcome {
    /// Number of errors reported.
    pub errors: usize,
    /// Code passed to `exit`, if a script ran it.
    pub exit: Option<i64>,
}

/// What one top-level step produced.
enum Step {
    Done,
    Value(Value),
    Exit(i64),
}

enum Entry {
    Statement(Stmt),
    Include { path: String, from: Option<String> },
    Defined,
}

pub struct Interpreter {
    engine: Engine,
    include_path: Vec<PathBuf>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Interpreter {
            engine: Engine::new(),
            include_path: Vec::new(),
        }
    }

    // ── Host configuration ────────────────────────────────────────────────────

    /// Make an object type available to scripts.  A prototype registered
    /// later under an existing name replaces the earlier one.
    pub fn register_object(&mut self, prototype: Box<dyn ObjectPrototype>) {
        tracing::debug!(type_name = prototype.type_name(), "registering object type");
        self.engine.registry.register(prototype);
    }

    /// Add a builtin function library; its methods become callable as plain
    /// functions and shadow same-named functions of earlier libraries.
    pub fn register_function_library(&mut self, library: Box<dyn ObjectPrototype>) {
        tracing::debug!(library = library.type_name(), "registering function library");
        self.engine.builtins.register(library);
    }

    /// Add or replace a binary operator with built-in semantics.
    pub fn register_operator(
        &mut self,
        symbol: &str,
        name: &str,
        rank: Rank,
        assoc: Assoc,
        kind: BinaryKind,
    ) -> ScriptResult<()> {
        self.engine.operators.register_binary(symbol, name, rank, assoc, kind)
    }

    /// Add a binary operator evaluated by `eval`.
    pub fn register_custom_operator(
        &mut self,
        symbol: &str,
        name: &str,
        rank: Rank,
        assoc: Assoc,
        eval: impl Fn(&Value, &Value) -> ScriptResult<Value> + 'static,
    ) -> ScriptResult<()> {
        self.engine.operators.register_custom(symbol, name, rank, assoc, eval)
    }

    /// Directories searched for `include` files given without `from`.
    pub fn set_include_path(&mut self, dirs: Vec<PathBuf>) {
        self.include_path = dirs;
    }

    /// Bind or overwrite a global variable.
    pub fn set_global(&mut self, name: &str, value: Value) -> ScriptResult<()> {
        let id = self.engine.names.intern(name);
        match self.engine.symbols.get_global(id) {
            Some(existing) => slot::store(&existing, value),
            None => {
                self.engine
                    .symbols
                    .register_variable(id, Slot::variant(value).into_ref());
                Ok(())
            }
        }
    }

    pub fn get_global(&self, name: &str) -> Option<Value> {
        let id = self.engine.names.lookup(name)?;
        let slot = self.engine.symbols.get_global(id)?;
        let value = slot.borrow().value.clone();
        Some(value)
    }

    /// Collect console output instead of writing it to stdout.
    pub fn capture_output(&mut self) {
        self.engine.console = Console::Capture(String::new());
    }

    /// Output captured since the last call.
    pub fn take_output(&mut self) -> String {
        self.engine.console.take()
    }

    // ── Running ───────────────────────────────────────────────────────────────

    /// Run every entry of `text`, stopping at the first error.  `exit`
    /// surfaces as an error of kind [`Exit`](super::error::ErrorKind::Exit).
    pub fn run_source(&mut self, name: &str, text: &str) -> ScriptResult<()> {
        self.eval_source(name, text).map(|_| ())
    }

    /// Like [`run_source`](Self::run_source), returning the last non-void
    /// top-level value.
    pub fn eval(&mut self, text: &str) -> ScriptResult<Value> {
        self.eval_source("<eval>", text)
    }

    fn eval_source(&mut self, name: &str, text: &str) -> ScriptResult<Value> {
        let mut lexer = self.lexer_for(name, text);
        let mut last = Value::Void;
        loop {
            match self.step(&mut lexer)? {
                Step::Done => return Ok(last),
                Step::Value(v) if !v.is_void() => last = v,
                Step::Value(_) => {}
                Step::Exit(code) => return Err(ScriptError::exit(code)),
            }
        }
    }

    /// Run `text` as a session: every error is reported to `out` as
    /// `ERROR: <message>` and execution resumes with the next statement.
    /// Stops early when `exit` runs.
    pub fn run_session(&mut self, name: &str, text: &str, out: &mut dyn Write) -> SessionOutcome {
        let mut lexer = self.lexer_for(name, text);
        let mut outcome = SessionOutcome::default();
        let mut report = |e: &ScriptError, outcome: &mut SessionOutcome| {
            outcome.errors += 1;
            if let Err(io) = writeln!(out, "ERROR: {e}") {
                tracing::warn!(error = %io, "cannot report script error");
            }
        };
        loop {
            let entry = match self.next_entry(&mut lexer) {
                Ok(Some(entry)) => entry,
                Ok(None) => return outcome,
                Err(e) => {
                    report(&e, &mut outcome);
                    if let Err(e) = skip_statement(&mut lexer) {
                        tracing::debug!(error = %e, "abandoning input after error");
                        return outcome;
                    }
                    continue;
                }
            };
            match self.run_entry(&mut lexer, entry) {
                Ok(Step::Exit(code)) => {
                    outcome.exit = Some(code);
                    return outcome;
                }
                Ok(_) => {}
                Err(e) => report(&e, &mut outcome),
            }
        }
    }

    /// `true` once every `(`, `[` and `{` in `text` is closed, i.e. the text
    /// can be run without waiting for more lines.
    pub fn is_complete(&self, text: &str) -> bool {
        let mut lexer = self.lexer_for("<input>", text);
        let mut depth: i64 = 0;
        loop {
            let token = match lexer.next() {
                Ok(token) => token,
                Err(_) => return true,
            };
            if token.is_end() {
                return depth <= 0;
            }
            if token.kind == TokenKind::Separator {
                match token.text.as_str() {
                    "(" | "[" | "{" => depth += 1,
                    ")" | "]" | "}" => depth -= 1,
                    _ => {}
                }
            }
        }
    }

    // ── Expressions for the embedding API ─────────────────────────────────────

    /// Parse `text` as a single expression.
    pub fn compile_expression(&mut self, text: &str) -> ScriptResult<Expr> {
        let mut lexer = self.lexer_for("<expression>", text);
        let engine = &mut self.engine;
        let mut parser = Parser::new(&mut lexer, &engine.operators, &mut engine.names, &engine.registry);
        let expr = parser.parse_expression()?;
        let rest = parser.next()?;
        if !rest.is_end() {
            return Err(Parser::unexpected(&rest));
        }
        Ok(expr)
    }

    pub fn evaluate(&mut self, expr: &Expr) -> ScriptResult<Value> {
        self.engine.evaluate(expr)
    }

    // ── Entries ───────────────────────────────────────────────────────────────

    fn lexer_for(&self, name: &str, text: &str) -> Lexer {
        let mut lexer = Lexer::from_source(name, text);
        self.engine.operators.configure_lexer(&mut lexer);
        lexer
    }

    fn step(&mut self, lexer: &mut Lexer) -> ScriptResult<Step> {
        match self.next_entry(lexer)? {
            Some(entry) => self.run_entry(lexer, entry),
            None => Ok(Step::Done),
        }
    }

    fn next_entry(&mut self, lexer: &mut Lexer) -> ScriptResult<Option<Entry>> {
        if lexer.look_ahead(1)?.is_end() {
            return Ok(None);
        }
        self.parse_entry(lexer).map(Some)
    }

    fn run_entry(&mut self, lexer: &mut Lexer, entry: Entry) -> ScriptResult<Step> {
        match entry {
            Entry::Defined => Ok(Step::Value(Value::Void)),
            Entry::Include { path, from } => {
                let line = lexer.line();
                self.include(lexer, &path, from.as_deref())
                    .map_err(|e| e.at_line(line))?;
                Ok(Step::Value(Value::Void))
            }
            Entry::Statement(stmt) => self.run_statement(&stmt),
        }
    }

    fn parse_entry(&mut self, lexer: &mut Lexer) -> ScriptResult<Entry> {
        let engine = &mut self.engine;
        let mut parser = Parser::new(lexer, &engine.operators, &mut engine.names, &engine.registry);
        let first = parser.peek()?;

        if first.kind == TokenKind::Keyword && first.text == "include" {
            parser.next()?;
            return parse_include(&mut parser);
        }

        if parser.is_type_token(&first)
            && parser.lexer.look_ahead(2)?.is_identifier()
            && parser.lexer.look_ahead(3)?.is("(")
        {
            let fourth = parser.lexer.look_ahead(4)?;
            if fourth.is(")") || parser.is_type_token(&fourth) {
                parser.next()?;
                let name = parser.next()?;
                let return_type = parser.decl_type(&first.text)?;
                if let Some(function) = parser.parse_function(return_type, &name)? {
                    engine.symbols.register_function(function.name, function);
                }
                return Ok(Entry::Defined);
            }
        }

        parser.parse_statement().map(Entry::Statement)
    }

    fn run_statement(&mut self, stmt: &Stmt) -> ScriptResult<Step> {
        let result = match self.engine.execute(stmt) {
            Ok(result) => result,
            Err(e) if e.is_exit() => return Ok(Step::Exit(e.exit_code())),
            Err(e) => return Err(e),
        };
        match result.status {
            ExecStatus::Normal => {
                let echo = match &stmt.kind {
                    StmtKind::Expr(expr) => !expr.is_quiet(),
                    _ => false,
                };
                if echo && !result.value.is_void() {
                    self.engine.console.write_line(&result.value.to_string());
                }
                Ok(Step::Value(result.value))
            }
            ExecStatus::Exit => Ok(Step::Exit(result.value.as_long()?)),
            ExecStatus::Error => {
                Err(ScriptError::thrown(result.value.to_string()).at_line(stmt.line))
            }
            ExecStatus::Return => Err(ScriptError::structural("return outside of a function")
                .at_line(stmt.line)),
            ExecStatus::Break | ExecStatus::Continue => Err(ScriptError::structural(
                "break or continue outside of a loop",
            )
            .at_line(stmt.line)),
        }
    }

    // ── include ───────────────────────────────────────────────────────────────

    fn include(&mut self, lexer: &mut Lexer, path: &str, from: Option<&str>) -> ScriptResult<()> {
        let resolved = self.resolve_include(path, from)?;
        let text = std::fs::read_to_string(&resolved).map_err(|e| {
            ScriptError::structural(format!("cannot read '{}': {e}", resolved.display()))
        })?;
        tracing::debug!(path = %resolved.display(), "including file");
        lexer.push_source(&resolved.display().to_string(), &text);
        Ok(())
    }

    fn resolve_include(&self, path: &str, from: Option<&str>) -> ScriptResult<PathBuf> {
        let candidates: Vec<PathBuf> = match from {
            Some(var) => {
                let dirs = std::env::var(var).map_err(|_| {
                    ScriptError::unknown(format!("environment variable '{var}' is not set"))
                })?;
                dirs.split(':')
                    .filter(|d| !d.is_empty())
                    .map(|d| Path::new(d).join(path))
                    .collect()
            }
            None => std::iter::once(PathBuf::from(path))
                .chain(self.include_path.iter().map(|d| d.join(path)))
                .collect(),
        };
        candidates
            .into_iter()
            .find(|p| p.is_file())
            .ok_or_else(|| ScriptError::unknown(format!("cannot find include file '{path}'")))
    }
}

/// After `include`: a quoted or bare path, an optional `from VAR`, and `;`.
fn parse_include(parser: &mut Parser<'_>) -> ScriptResult<Entry> {
    let mut path = String::new();
    let mut from = None;
    loop {
        let token = parser.next()?;
        if token.is(";") || token.is_end() {
            break;
        }
        if token.kind == TokenKind::Keyword && token.text == "from" {
            let var = parser.expect_identifier("an environment variable name after 'from'")?;
            from = Some(var.text);
            continue;
        }
        if from.is_some() {
            return Err(Parser::unexpected(&token));
        }
        path.push_str(&token.text);
    }
    if path.is_empty() {
        return Err(ScriptError::syntax("include needs a file name"));
    }
    Ok(Entry::Include { path, from })
}

/// Discard tokens through the next `;` so a session can resume after a
/// parse error.
fn skip_statement(lexer: &mut Lexer) -> ScriptResult<()> {
    loop {
        let token = lexer.next()?;
        if token.is(";") || token.is_end() {
            if token.is_end() {
                lexer.unget(token);
            }
            return Ok(());
        }
    }
}
