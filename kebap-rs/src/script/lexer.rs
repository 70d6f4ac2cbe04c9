//! Character-stream tokenizer.
//!
//! The lexer reads from an [`InputBuffer`], a stack of sources: a child
//! source pushed with [`Lexer::push_source`] (used by `include`) is drained
//! first, and reading falls back to the parent when the child reaches EOF.
//! Line numbers always come from whichever source is active.
//!
//! Operators are matched greedily against a registered set.  Registering a
//! symbol also registers all of its prefixes, so `>>=` makes `>>` and `>`
//! known; the greedy scanner then only has to extend while the longer text
//! is still a member of the set.

use std::collections::HashSet;

use super::error::{ScriptError, ScriptResult};
use super::token::{NumberFlags, Token, TokenKind};

const KEYWORDS: &[&str] = &[
    "if", "else", "while", "for", "foreach", "break", "continue", "return", "throw", "try",
    "catch", "include", "from", "exit",
];

const SEPARATORS: &[char] = &['(', ')', '[', ']', '{', '}', ',', ';', ':'];

// ── Input buffer ──────────────────────────────────────────────────────────────

#[derive(Debug)]
struct Source {
    name: String,
    chars: Vec<char>,
    pos: usize,
    line: usize,
}

impl Source {
    fn new(name: &str, text: &str) -> Self {
        Source {
            name: name.to_owned(),
            chars: text.chars().collect(),
            pos: 0,
            line: 1,
        }
    }

    fn exhausted(&self) -> bool {
        self.pos >= self.chars.len()
    }
}

/// A chain of character sources; the innermost (most recently pushed) is read
/// first.
#[derive(Debug)]
pub struct InputBuffer {
    sources: Vec<Source>,
}

impl Default for InputBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl InputBuffer {
    pub fn new() -> Self {
        InputBuffer {
            sources: vec![Source::new("<input>", "")],
        }
    }

    /// Append text to the outermost source (REPL feeding).
    pub fn append(&mut self, text: &str) {
        self.sources[0].chars.extend(text.chars());
    }

    /// Push a child source that is read before the remaining parent input.
    pub fn push(&mut self, name: &str, text: &str) {
        self.sources.push(Source::new(name, text));
    }

    /// Pop exhausted child sources so that reads fall back to the parent.
    fn settle(&mut self) {
        while self.sources.len() > 1 && self.sources.last().is_some_and(Source::exhausted) {
            if let Some(done) = self.sources.pop() {
                tracing::trace!(source = %done.name, "input source exhausted");
            }
        }
    }

    fn active(&self) -> &Source {
        // The root source is never popped.
        &self.sources[self.sources.len() - 1]
    }

    pub fn peek(&mut self) -> Option<char> {
        self.settle();
        let src = self.active();
        src.chars.get(src.pos).copied()
    }

    /// Peek `k` characters ahead within the active source.
    pub fn peek_at(&mut self, k: usize) -> Option<char> {
        self.settle();
        let src = self.active();
        src.chars.get(src.pos + k).copied()
    }

    pub fn get(&mut self) -> Option<char> {
        self.settle();
        let idx = self.sources.len() - 1;
        let src = &mut self.sources[idx];
        let ch = src.chars.get(src.pos).copied()?;
        src.pos += 1;
        if ch == '\n' {
            src.line += 1;
        }
        Some(ch)
    }

    pub fn starts_with(&mut self, text: &str) -> bool {
        self.settle();
        let src = self.active();
        let mut i = src.pos;
        for c in text.chars() {
            if src.chars.get(i) != Some(&c) {
                return false;
            }
            i += 1;
        }
        true
    }

    pub fn line(&self) -> usize {
        self.active().line
    }

    pub fn name(&self) -> &str {
        &self.active().name
    }

    /// Number of nested sources, the root included.
    pub fn depth(&self) -> usize {
        self.sources.len()
    }

    /// Drop everything not yet read (all sources).
    pub fn discard(&mut self) {
        self.sources.truncate(1);
        let root = &mut self.sources[0];
        root.pos = root.chars.len();
    }
}

// ── Lexer ─────────────────────────────────────────────────────────────────────

pub struct Lexer {
    input: InputBuffer,
    pushback: Vec<Token>,
    keywords: HashSet<String>,
    operators: HashSet<String>,
    separators: HashSet<char>,
    comments: Vec<(String, String)>,
    skip_whitespace: bool,
    skip_comments: bool,
}

impl Default for Lexer {
    fn default() -> Self {
        Self::new()
    }
}

impl Lexer {
    /// A lexer with the language's keywords, separators and comment
    /// delimiters.  Operators are registered separately from the operator
    /// table.
    pub fn new() -> Self {
        let mut lexer = Lexer {
            input: InputBuffer::new(),
            pushback: Vec::new(),
            keywords: KEYWORDS.iter().map(|&k| k.to_owned()).collect(),
            operators: HashSet::new(),
            separators: SEPARATORS.iter().copied().collect(),
            comments: Vec::new(),
            skip_whitespace: true,
            skip_comments: true,
        };
        lexer.add_comment("/*", "*/");
        lexer.add_comment("//", "\n");
        lexer.add_comment("#!", "\n");
        lexer
    }

    /// Convenience constructor: a lexer reading `text`.
    pub fn from_source(name: &str, text: &str) -> Self {
        let mut lexer = Self::new();
        lexer.push_source(name, text);
        lexer
    }

    // ── Configuration ─────────────────────────────────────────────────────────

    pub fn add_keyword(&mut self, keyword: &str) {
        self.keywords.insert(keyword.to_owned());
    }

    pub fn is_keyword(&self, word: &str) -> bool {
        self.keywords.contains(word)
    }

    /// Register an operator symbol together with all of its prefixes.
    pub fn register_operator(&mut self, symbol: &str) {
        if symbol.chars().all(|c| c.is_alphanumeric() || c == '_') {
            self.operators.insert(symbol.to_owned());
            return;
        }
        let mut prefix = String::new();
        for c in symbol.chars() {
            prefix.push(c);
            self.operators.insert(prefix.clone());
        }
    }

    pub fn is_operator(&self, text: &str) -> bool {
        self.operators.contains(text)
    }

    pub fn add_comment(&mut self, open: &str, close: &str) {
        self.comments.push((open.to_owned(), close.to_owned()));
    }

    pub fn set_skip_whitespace(&mut self, skip: bool) {
        self.skip_whitespace = skip;
    }

    pub fn set_skip_comments(&mut self, skip: bool) {
        self.skip_comments = skip;
    }

    // ── Input ─────────────────────────────────────────────────────────────────

    /// Splice a new source in front of the remaining input.
    pub fn push_source(&mut self, name: &str, text: &str) {
        tracing::debug!(source = name, "pushing input source");
        self.input.push(name, text);
    }

    /// Append text to the end of the outermost input.
    pub fn feed(&mut self, text: &str) {
        self.input.append(text);
    }

    /// Forget all pending tokens and input.
    pub fn reset(&mut self) {
        self.pushback.clear();
        self.input.discard();
    }

    pub fn line(&self) -> usize {
        self.pushback.last().map_or_else(|| self.input.line(), |t| t.line)
    }

    pub fn source_name(&self) -> &str {
        self.input.name()
    }

    pub fn source_depth(&self) -> usize {
        self.input.depth()
    }

    // ── Token stream ──────────────────────────────────────────────────────────

    /// Next token that is not skipped.
    pub fn next(&mut self) -> ScriptResult<Token> {
        loop {
            let token = match self.pushback.pop() {
                Some(t) => t,
                None => self.scan()?,
            };
            match token.kind {
                TokenKind::Whitespace if self.skip_whitespace => continue,
                TokenKind::Comment if self.skip_comments => continue,
                _ => return Ok(token),
            }
        }
    }

    /// Put a token back at the front of the stream.
    pub fn unget(&mut self, token: Token) {
        self.pushback.push(token);
    }

    /// Peek the `n`-th upcoming token (`n >= 1`) without consuming it.
    pub fn look_ahead(&mut self, n: usize) -> ScriptResult<Token> {
        let mut buffered = Vec::with_capacity(n);
        for _ in 0..n.max(1) {
            let token = self.next()?;
            let end = token.is_end();
            buffered.push(token);
            if end {
                break;
            }
        }
        let result = buffered.last().cloned().unwrap_or_else(|| Token::end(self.line()));
        for token in buffered.into_iter().rev() {
            self.unget(token);
        }
        Ok(result)
    }

    /// Consume the next token, requiring it to be `text`.
    pub fn expect(&mut self, text: &str) -> ScriptResult<Token> {
        let token = self.next()?;
        if token.is(text) {
            Ok(token)
        } else {
            Err(ScriptError::syntax(format!("expected '{text}', found {token}")).at_line(token.line))
        }
    }

    // ── Scanners ──────────────────────────────────────────────────────────────

    fn scan(&mut self) -> ScriptResult<Token> {
        let line = self.input.line();
        let Some(c) = self.input.peek() else {
            return Ok(Token::end(line));
        };

        if c.is_whitespace() {
            let mut text = String::new();
            while let Some(ws) = self.input.peek().filter(|c| c.is_whitespace()) {
                text.push(ws);
                self.input.get();
            }
            return Ok(Token::new(TokenKind::Whitespace, text, line));
        }
        if let Some((open, close)) = self.comment_at() {
            return self.scan_comment(&open, &close, line);
        }
        if c.is_ascii_digit()
            || (c == '.' && self.input.peek_at(1).is_some_and(|d| d.is_ascii_digit()))
        {
            return self.scan_number(line);
        }
        if c == '"' || c == '\'' {
            return self.scan_quote(line);
        }
        if c.is_alphabetic() || c == '_' {
            return self.scan_identifier(line);
        }
        if self.separators.contains(&c) {
            self.input.get();
            return Ok(Token::new(TokenKind::Separator, c.to_string(), line));
        }
        self.scan_operator(line)
    }

    fn comment_at(&mut self) -> Option<(String, String)> {
        let comments = self.comments.clone();
        comments.into_iter().find(|(open, _)| {
            !open.starts_with(|c: char| c.is_alphanumeric()) && self.input.starts_with(open)
        })
    }

    fn scan_comment(&mut self, open: &str, close: &str, line: usize) -> ScriptResult<Token> {
        for _ in open.chars() {
            self.input.get();
        }
        let mut text = String::new();
        loop {
            if self.input.starts_with(close) {
                for _ in close.chars() {
                    self.input.get();
                }
                break;
            }
            match self.input.get() {
                Some(c) => text.push(c),
                None if close == "\n" => break,
                None => {
                    return Err(
                        ScriptError::syntax(format!("unterminated comment '{open}'")).at_line(line)
                    );
                }
            }
        }
        Ok(Token::new(TokenKind::Comment, text, line))
    }

    fn scan_number(&mut self, line: usize) -> ScriptResult<Token> {
        let mut text = String::new();
        let mut kind = TokenKind::Integer;

        let radix_mark = match (self.input.peek(), self.input.peek_at(1)) {
            (Some('0'), Some(m @ ('x' | 'X' | 'b' | 'B'))) => Some(m.to_ascii_lowercase()),
            _ => None,
        };

        if let Some(mark) = radix_mark {
            self.input.get();
            self.input.get();
            text.push('0');
            text.push(mark);
            let (is_digit, what): (fn(char) -> bool, &str) = if mark == 'x' {
                (|c| c.is_ascii_hexdigit(), "hex")
            } else {
                (|c| c == '0' || c == '1', "binary")
            };
            while let Some(d) = self.input.peek().filter(|&c| is_digit(c)) {
                text.push(d);
                self.input.get();
            }
            if text.len() == 2 || self.input.peek().is_some_and(|c| c.is_ascii_digit()) {
                return Err(
                    ScriptError::syntax(format!("malformed {what} literal '{text}'")).at_line(line)
                );
            }
        } else {
            self.take_digits(&mut text);
            if self.input.peek() == Some('.') {
                let after = self.input.peek_at(1);
                let is_fraction = match after {
                    Some(d) if d.is_ascii_digit() => true,
                    Some(c) if c.is_alphabetic() || c == '_' || c == '.' => false,
                    _ => true,
                };
                if is_fraction {
                    kind = TokenKind::Floating;
                    text.push('.');
                    self.input.get();
                    self.take_digits(&mut text);
                }
            }
            if matches!(self.input.peek(), Some('e' | 'E')) {
                let exp_ok = match (self.input.peek_at(1), self.input.peek_at(2)) {
                    (Some(d), _) if d.is_ascii_digit() => true,
                    (Some('+' | '-'), Some(d)) if d.is_ascii_digit() => true,
                    _ => false,
                };
                if exp_ok {
                    kind = TokenKind::Floating;
                    text.push('e');
                    self.input.get();
                    if let Some(sign) = self.input.peek().filter(|c| *c == '+' || *c == '-') {
                        text.push(sign);
                        self.input.get();
                    }
                    self.take_digits(&mut text);
                }
            }
        }

        let mut flags = NumberFlags::default();
        while let Some(s) = self.input.peek() {
            match s {
                'u' | 'U' => flags.unsigned = true,
                'l' | 'L' => flags.long = true,
                'i' => flags.imaginary = true,
                _ => break,
            }
            self.input.get();
        }
        if self.input.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            let mut bad = text.clone();
            while let Some(c) = self.input.peek().filter(|c| c.is_alphanumeric() || *c == '_') {
                bad.push(c);
                self.input.get();
            }
            return Err(ScriptError::syntax(format!("malformed number literal '{bad}'")).at_line(line));
        }

        let mut token = Token::new(kind, text, line);
        token.flags = flags;
        Ok(token)
    }

    fn take_digits(&mut self, text: &mut String) {
        while let Some(d) = self.input.peek().filter(|c| c.is_ascii_digit()) {
            text.push(d);
            self.input.get();
        }
    }

    fn scan_quote(&mut self, line: usize) -> ScriptResult<Token> {
        let quote = self.input.get().unwrap_or('"');
        let mut text = String::new();
        loop {
            let Some(c) = self.input.get() else {
                return Err(ScriptError::syntax("unterminated quoted string").at_line(line));
            };
            if c == quote {
                break;
            }
            if c != '\\' {
                text.push(c);
                continue;
            }
            let Some(esc) = self.input.get() else {
                return Err(ScriptError::syntax("unterminated quoted string").at_line(line));
            };
            match esc {
                'a' => text.push('\x07'),
                'b' => text.push('\x08'),
                'f' => text.push('\x0c'),
                'n' => text.push('\n'),
                'r' => text.push('\r'),
                't' => text.push('\t'),
                'v' => text.push('\x0b'),
                '\\' | '"' | '\'' | '?' => text.push(esc),
                other => {
                    text.push('\\');
                    text.push(other);
                }
            }
        }
        Ok(Token::new(TokenKind::Quote, text, line))
    }

    fn scan_identifier(&mut self, line: usize) -> ScriptResult<Token> {
        let mut text = String::new();
        while let Some(c) = self.input.peek().filter(|c| c.is_alphanumeric() || *c == '_') {
            text.push(c);
            self.input.get();
        }

        if let Some((_, close)) = self.comments.iter().find(|(open, _)| *open == text).cloned() {
            return self.scan_comment("", &close, line);
        }
        let kind = if text == "true" || text == "false" {
            TokenKind::Boolean
        } else if self.keywords.contains(&text) {
            TokenKind::Keyword
        } else if self.operators.contains(&text) {
            TokenKind::Operator
        } else {
            TokenKind::Identifier
        };
        Ok(Token::new(kind, text, line))
    }

    fn scan_operator(&mut self, line: usize) -> ScriptResult<Token> {
        let mut text = String::new();
        if let Some(c) = self.input.get() {
            text.push(c);
        }
        if !self.operators.contains(&text) {
            return Err(ScriptError::syntax(format!("unexpected character '{text}'")).at_line(line));
        }
        while let Some(next) = self.input.peek() {
            let mut longer = text.clone();
            longer.push(next);
            if !self.operators.contains(&longer) {
                break;
            }
            self.input.get();
            text = longer;
        }
        Ok(Token::new(TokenKind::Operator, text, line))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn lexer(src: &str) -> Lexer {
        let mut l = Lexer::from_source("test", src);
        for op in ["+", "-", "*", "/", "=", "==", ">>=", "->", "=>", "!", "sizeof"] {
            l.register_operator(op);
        }
        l
    }

    fn texts(src: &str) -> Vec<(TokenKind, String)> {
        let mut l = lexer(src);
        let mut out = Vec::new();
        loop {
            let t = l.next().expect("lex failed");
            if t.is_end() {
                break;
            }
            out.push((t.kind, t.text));
        }
        out
    }

    #[test]
    fn basic_statement() {
        use TokenKind::*;
        assert_eq!(
            texts("int x = 3 + 4.5;"),
            vec![
                (Identifier, "int".into()),
                (Identifier, "x".into()),
                (Operator, "=".into()),
                (Integer, "3".into()),
                (Operator, "+".into()),
                (Floating, "4.5".into()),
                (Separator, ";".into()),
            ]
        );
    }

    #[test]
    fn keywords_booleans_and_word_operators() {
        use TokenKind::*;
        assert_eq!(
            texts("if true sizeof foo"),
            vec![
                (Keyword, "if".into()),
                (Boolean, "true".into()),
                (Operator, "sizeof".into()),
                (Identifier, "foo".into()),
            ]
        );
    }

    #[test]
    fn greedy_operator_uses_registered_prefixes() {
        let toks = texts("a >>= b >> c > d");
        let ops: Vec<_> = toks
            .iter()
            .filter(|(k, _)| *k == TokenKind::Operator)
            .map(|(_, t)| t.as_str())
            .collect();
        assert_eq!(ops, vec![">>=", ">>", ">"]);
    }

    #[test]
    fn comments_are_skipped() {
        let toks = texts("1 /* two\n lines */ 2 // rest\n3 #! shebang\n4");
        let nums: Vec<_> = toks.iter().map(|(_, t)| t.as_str()).collect();
        assert_eq!(nums, vec!["1", "2", "3", "4"]);
    }

    #[test]
    fn comments_can_be_kept() {
        let mut l = lexer("1 // note\n");
        l.set_skip_comments(false);
        assert_eq!(l.next().unwrap().text, "1");
        let c = l.next().unwrap();
        assert_eq!(c.kind, TokenKind::Comment);
        assert_eq!(c.text, " note");
    }

    #[test]
    fn number_forms() {
        use TokenKind::*;
        assert_eq!(
            texts("0x1F 0b101 1e3 2.5e-1 7."),
            vec![
                (Integer, "0x1F".into()),
                (Integer, "0b101".into()),
                (Floating, "1e3".into()),
                (Floating, "2.5e-1".into()),
                (Floating, "7.".into()),
            ]
        );
    }

    #[test]
    fn number_suffix_flags() {
        let mut l = lexer("3ul 2i");
        let a = l.next().unwrap();
        assert!(a.flags.unsigned && a.flags.long && !a.flags.imaginary);
        let b = l.next().unwrap();
        assert!(b.flags.imaginary);
        assert_eq!(b.text, "2");
    }

    #[test]
    fn malformed_literals_are_errors() {
        assert!(lexer("0x").next().is_err());
        assert!(lexer("0b2").next().is_err());
        assert!(lexer("12abc").next().is_err());
    }

    #[test]
    fn member_access_after_integer_is_not_a_float() {
        let toks = texts("1.x");
        assert_eq!(toks[0], (TokenKind::Integer, "1".into()));
    }

    #[test]
    fn string_escapes() {
        let toks = texts(r#""a\tb\n\"q\" \z""#);
        assert_eq!(toks[0], (TokenKind::Quote, "a\tb\n\"q\" \\z".into()));
    }

    #[test]
    fn unterminated_string_reports_line() {
        let err = lexer("\n\n\"abc").next().unwrap_err();
        assert_eq!(err.line(), Some(3));
    }

    #[test]
    fn look_ahead_and_unget() {
        let mut l = lexer("a b c");
        assert_eq!(l.look_ahead(3).unwrap().text, "c");
        assert_eq!(l.next().unwrap().text, "a");
        let b = l.next().unwrap();
        l.unget(b);
        assert_eq!(l.next().unwrap().text, "b");
        assert_eq!(l.next().unwrap().text, "c");
        assert!(l.next().unwrap().is_end());
    }

    #[test]
    fn child_source_is_drained_first() {
        let mut l = lexer("a\nb");
        assert_eq!(l.next().unwrap().text, "a");
        l.push_source("child", "x\ny");
        assert_eq!(l.next().unwrap().text, "x");
        let y = l.next().unwrap();
        assert_eq!((y.text.as_str(), y.line), ("y", 2));
        let b = l.next().unwrap();
        assert_eq!((b.text.as_str(), b.line), ("b", 2));
        assert_eq!(l.source_name(), "test");
    }

    #[test]
    fn unknown_character_is_an_error() {
        assert!(lexer("@").next().is_err());
    }
}
