//! Expression AST and precedence-climbing parser.
//!
//! Binary operators come from the [`OperatorTable`]; the parser climbs its
//! distinct ranks from loosest to tightest.  Below the tightest rank:
//!
//!   prefix (`delete sizeof typeof keys * & ++ -- + - ! ~`, casts)  →
//!   elementary (`new`, ranges, `$name`)  →  primary  →  postfix chain
//!
//! `**` is a postfix operator whose exponent is a prefix sub-expression, so
//! `-1**2` is `-(1**2)` and `2**3**2` is `2**(3**2)`.
//!
//! The statement grammar continues this parser in [`stmt`](super::stmt).

use std::cell::Cell;
use std::rc::Rc;

use super::builtins::FunctionId;
use super::error::{ScriptError, ScriptResult};
use super::interner::{NameTable, SymbolId};
use super::lexer::Lexer;
use super::object::ObjectRegistry;
use super::ops::UnaryOp;
use super::optable::{Assoc, BinaryKind, OperatorDef, OperatorTable};
use super::slot::{DeclType, TypeSpec};
use super::symbol::SymbolTable;
use super::token::{Token, TokenKind};
use super::value::{Complex, Value};

// ── AST ───────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct ListItem {
    pub key: Option<Expr>,
    pub value: Expr,
}

#[derive(Debug)]
pub enum Expr {
    Literal(Value),
    Variable(SymbolId),
    /// `$name`: binding in the innermost block, created on first use.
    Local(SymbolId),
    ListLiteral(Vec<ListItem>),
    /// `[first, last]`, `[first:last]`, `[first:last:step]`.
    Range {
        first: Box<Expr>,
        last: Box<Expr>,
        step: Option<Box<Expr>>,
    },
    Binary {
        op: Rc<OperatorDef>,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Conditional {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    PreStep {
        delta: i64,
        target: Box<Expr>,
    },
    PostStep {
        delta: i64,
        target: Box<Expr>,
    },
    Deref(Box<Expr>),
    AddressOf(Box<Expr>),
    Delete(Box<Expr>),
    SizeOf(Box<Expr>),
    TypeOf(Box<Expr>),
    Keys(Box<Expr>),
    Cast {
        ty: DeclType,
        operand: Box<Expr>,
    },
    Factorial(Box<Expr>),
    Power {
        base: Box<Expr>,
        exponent: Box<Expr>,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    KeyIndex {
        target: Box<Expr>,
        key: Box<Expr>,
    },
    /// `name(args)`; the builtin id is filled in on first resolution and
    /// refreshed once a newer library is registered.
    Call {
        name: SymbolId,
        args: Vec<Expr>,
        builtin: Cell<Option<FunctionId>>,
    },
    /// `expr(args)` on an arbitrary callee: the `"()"` override.
    Apply {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    /// `T(args)`: conversion for built-in types, construction for objects.
    Temporary {
        type_name: String,
        args: Vec<Expr>,
    },
    New {
        type_name: String,
        length: Option<Box<Expr>>,
        args: Vec<Expr>,
    },
    Property {
        target: Box<Expr>,
        name: String,
    },
    /// `target.name(args)`; caches `(object id, method id)`.
    Method {
        target: Box<Expr>,
        name: String,
        args: Vec<Expr>,
        cache: Cell<Option<(u64, usize)>>,
    },
}

impl Expr {
    /// Expressions evaluated for their side effect; the driver does not echo
    /// their value.
    pub fn is_quiet(&self) -> bool {
        match self {
            Expr::Binary { op, .. } => {
                matches!(op.kind, BinaryKind::Assign | BinaryKind::Compound(_))
            }
            Expr::PreStep { .. } | Expr::PostStep { .. } | Expr::Delete(_) => true,
            _ => false,
        }
    }
}

// ── Parser ────────────────────────────────────────────────────────────────────

pub struct Parser<'a> {
    pub(super) lexer: &'a mut Lexer,
    pub(super) operators: &'a OperatorTable,
    pub(super) names: &'a mut NameTable,
    pub(super) registry: &'a ObjectRegistry,
    /// Distinct binary ranks, tightest first.
    ranks: Vec<u32>,
}

impl<'a> Parser<'a> {
    pub fn new(
        lexer: &'a mut Lexer,
        operators: &'a OperatorTable,
        names: &'a mut NameTable,
        registry: &'a ObjectRegistry,
    ) -> Self {
        let ranks = operators.ranks();
        Parser {
            lexer,
            operators,
            names,
            registry,
            ranks,
        }
    }

    // ── Token helpers ─────────────────────────────────────────────────────────

    pub(super) fn next(&mut self) -> ScriptResult<Token> {
        self.lexer.next()
    }

    pub(super) fn peek(&mut self) -> ScriptResult<Token> {
        self.lexer.look_ahead(1)
    }

    /// Consume the next token if it is `text`.
    pub(super) fn accept(&mut self, text: &str) -> ScriptResult<bool> {
        let token = self.next()?;
        if token.is(text) {
            Ok(true)
        } else {
            self.lexer.unget(token);
            Ok(false)
        }
    }

    pub(super) fn expect(&mut self, text: &str) -> ScriptResult<Token> {
        self.lexer.expect(text)
    }

    pub(super) fn expect_identifier(&mut self, what: &str) -> ScriptResult<Token> {
        let token = self.next()?;
        if token.is_identifier() {
            Ok(token)
        } else {
            Err(ScriptError::syntax(format!("expected {what}, found {token}")).at_line(token.line))
        }
    }

    pub(super) fn unexpected(token: &Token) -> ScriptError {
        ScriptError::syntax(format!("unexpected {token}")).at_line(token.line)
    }

    pub(super) fn is_type_name(&self, name: &str) -> bool {
        SymbolTable::is_type_name(name, self.registry)
    }

    pub(super) fn is_type_token(&self, token: &Token) -> bool {
        token.is_identifier() && self.is_type_name(&token.text)
    }

    pub(super) fn decl_type(&self, name: &str) -> ScriptResult<DeclType> {
        match DeclType::primitive(name) {
            Some(ty) => Ok(ty),
            None if self.registry.contains(name) => {
                Ok(DeclType::Typed(TypeSpec::Object(name.to_owned())))
            }
            None => Err(ScriptError::unknown(format!("unknown type '{name}'"))),
        }
    }

    // ── Binary levels ─────────────────────────────────────────────────────────

    pub fn parse_expression(&mut self) -> ScriptResult<Expr> {
        match self.ranks.len() {
            0 => self.parse_prefix(),
            n => self.parse_level(n - 1),
        }
    }

    fn parse_operand(&mut self, level: usize) -> ScriptResult<Expr> {
        if level == 0 {
            self.parse_prefix()
        } else {
            self.parse_level(level - 1)
        }
    }

    /// Binary operator of exactly this level's rank, if the next token is one.
    fn binary_at(&mut self, level: usize) -> ScriptResult<Option<Rc<OperatorDef>>> {
        let token = self.next()?;
        if token.kind == TokenKind::Operator {
            if let Some(def) = self.operators.binary(&token.text) {
                if def.rank == self.ranks[level] {
                    return Ok(Some(def));
                }
            }
        }
        self.lexer.unget(token);
        Ok(None)
    }

    fn parse_level(&mut self, level: usize) -> ScriptResult<Expr> {
        let mut lhs = self.parse_operand(level)?;
        while let Some(op) = self.binary_at(level)? {
            if let BinaryKind::Conditional = op.kind {
                let then = self.parse_expression()?;
                self.expect(":")?;
                let otherwise = self.parse_level(level)?;
                return Ok(Expr::Conditional {
                    cond: Box::new(lhs),
                    then: Box::new(then),
                    otherwise: Box::new(otherwise),
                });
            }
            let right_assoc = op.assoc == Assoc::Right;
            let rhs = if right_assoc {
                self.parse_level(level)?
            } else {
                self.parse_operand(level)?
            };
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
            if right_assoc {
                break;
            }
        }
        Ok(lhs)
    }

    // ── Prefix ────────────────────────────────────────────────────────────────

    fn parse_prefix(&mut self) -> ScriptResult<Expr> {
        let token = self.next()?;
        if token.kind == TokenKind::Operator {
            let boxed = |e: Expr| Box::new(e);
            match token.text.as_str() {
                "delete" => return Ok(Expr::Delete(boxed(self.parse_prefix()?))),
                "sizeof" => return Ok(Expr::SizeOf(boxed(self.parse_prefix()?))),
                "typeof" => return Ok(Expr::TypeOf(boxed(self.parse_prefix()?))),
                "keys" => return Ok(Expr::Keys(boxed(self.parse_prefix()?))),
                "*" => return Ok(Expr::Deref(boxed(self.parse_prefix()?))),
                "&" => return Ok(Expr::AddressOf(boxed(self.parse_prefix()?))),
                "++" | "--" => {
                    let delta = if token.text == "++" { 1 } else { -1 };
                    let target = boxed(self.parse_prefix()?);
                    return Ok(Expr::PreStep { delta, target });
                }
                "+" | "-" | "!" | "~" => {
                    let op = match token.text.as_str() {
                        "+" => UnaryOp::Plus,
                        "-" => UnaryOp::Neg,
                        "!" => UnaryOp::Not,
                        _ => UnaryOp::BitNot,
                    };
                    let operand = boxed(self.parse_prefix()?);
                    return Ok(Expr::Unary { op, operand });
                }
                _ => {}
            }
        }
        if token.is("(") {
            if let Some(ty) = self.cast_type()? {
                let operand = Box::new(self.parse_prefix()?);
                return Ok(Expr::Cast { ty, operand });
            }
        }
        self.lexer.unget(token);
        let primary = self.parse_primary()?;
        self.parse_postfix(primary)
    }

    /// After `(`: consume `type )` when it forms a cast.
    fn cast_type(&mut self) -> ScriptResult<Option<DeclType>> {
        let name = self.lexer.look_ahead(1)?;
        if !self.is_type_token(&name) || name.text == "void" {
            return Ok(None);
        }
        if !self.lexer.look_ahead(2)?.is(")") || self.lexer.look_ahead(3)?.is("(") {
            return Ok(None);
        }
        self.next()?;
        self.next()?;
        self.decl_type(&name.text).map(Some)
    }

    // ── Primary ───────────────────────────────────────────────────────────────

    fn parse_primary(&mut self) -> ScriptResult<Expr> {
        let token = self.next()?;
        match token.kind {
            TokenKind::Integer => integer_literal(&token),
            TokenKind::Floating => {
                let x: f64 = token.text.parse().map_err(|_| {
                    ScriptError::syntax(format!("malformed number '{}'", token.text)).at_line(token.line)
                })?;
                Ok(Expr::Literal(if token.flags.imaginary {
                    Value::Complex(Complex::new(0.0, x))
                } else {
                    Value::Double(x)
                }))
            }
            TokenKind::Boolean => Ok(Expr::Literal(Value::Bool(token.text == "true"))),
            TokenKind::Quote => {
                let mut text = token.text;
                loop {
                    let next = self.next()?;
                    if next.kind == TokenKind::Quote {
                        text.push_str(&next.text);
                    } else {
                        self.lexer.unget(next);
                        break;
                    }
                }
                Ok(Expr::Literal(Value::Str(text)))
            }
            TokenKind::Identifier => self.parse_identifier(token),
            TokenKind::Operator if token.text == "new" => self.parse_new(),
            TokenKind::Operator if token.text == "$" => {
                let name = self.expect_identifier("a variable name after '$'")?;
                Ok(Expr::Local(self.names.intern(&name.text)))
            }
            TokenKind::Separator => match token.text.as_str() {
                "(" => {
                    let inner = self.parse_expression()?;
                    self.expect(")")?;
                    Ok(inner)
                }
                "[" => self.parse_range(),
                "{" => self.parse_list_literal(),
                _ => Err(Self::unexpected(&token)),
            },
            _ => Err(Self::unexpected(&token)),
        }
    }

    fn parse_identifier(&mut self, token: Token) -> ScriptResult<Expr> {
        if self.peek()?.is("(") {
            self.next()?;
            let args = self.parse_args()?;
            if self.is_type_name(&token.text) {
                return Ok(Expr::Temporary {
                    type_name: token.text,
                    args,
                });
            }
            return Ok(Expr::Call {
                name: self.names.intern(&token.text),
                args,
                builtin: Cell::new(None),
            });
        }
        Ok(Expr::Variable(self.names.intern(&token.text)))
    }

    /// Arguments after an opening `(`, through the closing `)`.
    pub(super) fn parse_args(&mut self) -> ScriptResult<Vec<Expr>> {
        let mut args = Vec::new();
        if self.accept(")")? {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expression()?);
            let token = self.next()?;
            if token.is(")") {
                return Ok(args);
            }
            if !token.is(",") {
                return Err(Self::unexpected(&token));
            }
        }
    }

    fn parse_new(&mut self) -> ScriptResult<Expr> {
        let ty = self.expect_identifier("a type name after 'new'")?;
        if !self.is_type_name(&ty.text) {
            return Err(ScriptError::unknown(format!("unknown type '{}'", ty.text)).at_line(ty.line));
        }
        let length = if self.accept("[")? {
            let len = self.parse_expression()?;
            self.expect("]")?;
            Some(Box::new(len))
        } else {
            None
        };
        let args = if self.accept("(")? {
            self.parse_args()?
        } else {
            Vec::new()
        };
        Ok(Expr::New {
            type_name: ty.text,
            length,
            args,
        })
    }

    fn parse_range(&mut self) -> ScriptResult<Expr> {
        let first = Box::new(self.parse_expression()?);
        let sep = self.next()?;
        if !sep.is(",") && !sep.is(":") {
            return Err(Self::unexpected(&sep));
        }
        let last = Box::new(self.parse_expression()?);
        let step = if sep.is(":") && self.accept(":")? {
            Some(Box::new(self.parse_expression()?))
        } else {
            None
        };
        self.expect("]")?;
        Ok(Expr::Range { first, last, step })
    }

    fn parse_list_literal(&mut self) -> ScriptResult<Expr> {
        let mut items = Vec::new();
        if self.accept("}")? {
            return Ok(Expr::ListLiteral(items));
        }
        loop {
            let first = self.parse_expression()?;
            let item = if self.accept("=>")? {
                ListItem {
                    key: Some(first),
                    value: self.parse_expression()?,
                }
            } else {
                ListItem {
                    key: None,
                    value: first,
                }
            };
            items.push(item);
            let token = self.next()?;
            if token.is("}") {
                return Ok(Expr::ListLiteral(items));
            }
            if !token.is(",") {
                return Err(Self::unexpected(&token));
            }
        }
    }

    // ── Postfix ───────────────────────────────────────────────────────────────

    fn parse_postfix(&mut self, mut expr: Expr) -> ScriptResult<Expr> {
        loop {
            let token = self.next()?;
            let target = Box::new(expr);
            expr = match (token.kind, token.text.as_str()) {
                (TokenKind::Operator, "++") => Expr::PostStep { delta: 1, target },
                (TokenKind::Operator, "--") => Expr::PostStep { delta: -1, target },
                (TokenKind::Operator, "!") => Expr::Factorial(target),
                (TokenKind::Operator, "**") => Expr::Power {
                    base: target,
                    exponent: Box::new(self.parse_prefix()?),
                },
                (TokenKind::Separator, "(") => Expr::Apply {
                    callee: target,
                    args: self.parse_args()?,
                },
                (TokenKind::Separator, "[") => {
                    let index = Box::new(self.parse_expression()?);
                    self.expect("]")?;
                    Expr::Index { target, index }
                }
                (TokenKind::Separator, "{") => {
                    let key = Box::new(self.parse_expression()?);
                    self.expect("}")?;
                    Expr::KeyIndex { target, key }
                }
                (TokenKind::Operator, "." | "->") => {
                    let target = if token.text == "->" {
                        Box::new(Expr::Deref(target))
                    } else {
                        target
                    };
                    let name = self.expect_identifier("a member name")?.text;
                    if self.accept("(")? {
                        Expr::Method {
                            target,
                            name,
                            args: self.parse_args()?,
                            cache: Cell::new(None),
                        }
                    } else {
                        Expr::Property { target, name }
                    }
                }
                _ => {
                    self.lexer.unget(token);
                    return Ok(*target);
                }
            };
        }
    }
}

fn integer_literal(token: &Token) -> ScriptResult<Expr> {
    let text = token.text.as_str();
    let parsed = if let Some(hex) = text.strip_prefix("0x") {
        i64::from_str_radix(hex, 16).or_else(|_| u64::from_str_radix(hex, 16).map(|n| n as i64))
    } else if let Some(bin) = text.strip_prefix("0b") {
        i64::from_str_radix(bin, 2).or_else(|_| u64::from_str_radix(bin, 2).map(|n| n as i64))
    } else {
        text.parse::<i64>()
    };
    let value = match parsed {
        Ok(n) if token.flags.imaginary => Value::Complex(Complex::new(0.0, n as f64)),
        Ok(n) => Value::Long(n),
        // Decimal literals too large for a long become doubles.
        Err(_) => match text.parse::<f64>() {
            Ok(x) if token.flags.imaginary => Value::Complex(Complex::new(0.0, x)),
            Ok(x) => Value::Double(x),
            Err(_) => {
                return Err(ScriptError::syntax(format!("integer literal '{text}' out of range"))
                    .at_line(token.line))
            }
        },
    };
    Ok(Expr::Literal(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::optable::Rank;

    fn parse_with(ops: &OperatorTable, src: &str) -> ScriptResult<Expr> {
        let mut lexer = Lexer::from_source("test", src);
        ops.configure_lexer(&mut lexer);
        let mut names = NameTable::new();
        let registry = ObjectRegistry::new();
        let mut parser = Parser::new(&mut lexer, ops, &mut names, &registry);
        parser.parse_expression()
    }

    fn parse(src: &str) -> Expr {
        parse_with(&OperatorTable::c_like(), src).expect("parse failed")
    }

    fn symbol(e: &Expr) -> &str {
        match e {
            Expr::Binary { op, .. } => &op.symbol,
            _ => "",
        }
    }

    #[test]
    fn multiplication_binds_tighter() {
        let e = parse("2+3*4");
        assert_eq!(symbol(&e), "+");
        let Expr::Binary { rhs, .. } = &e else { unreachable!() };
        assert_eq!(symbol(rhs), "*");
    }

    #[test]
    fn subtraction_is_left_associative() {
        let e = parse("1-2-3");
        let Expr::Binary { lhs, rhs, .. } = &e else { panic!("not binary") };
        assert_eq!(symbol(lhs), "-");
        assert!(matches!(**rhs, Expr::Literal(Value::Long(3))));
    }

    #[test]
    fn assignment_is_right_associative() {
        let e = parse("a = b = 5");
        assert!(e.is_quiet());
        let Expr::Binary { lhs, rhs, .. } = &e else { panic!("not binary") };
        assert!(matches!(**lhs, Expr::Variable(_)));
        assert_eq!(symbol(rhs), "=");
    }

    #[test]
    fn power_is_postfix_on_prefix_operand() {
        let e = parse("-1**2");
        let Expr::Unary { op: UnaryOp::Neg, operand } = &e else { panic!("expected negation") };
        assert!(matches!(**operand, Expr::Power { .. }));
        let e = parse("2**3**2");
        let Expr::Power { exponent, .. } = &e else { panic!("expected power") };
        assert!(matches!(**exponent, Expr::Power { .. }));
    }

    #[test]
    fn conditional_nests_to_the_right() {
        let e = parse("a ? 1 : b ? 2 : 3");
        let Expr::Conditional { otherwise, .. } = &e else { panic!("expected conditional") };
        assert!(matches!(**otherwise, Expr::Conditional { .. }));
    }

    #[test]
    fn casts_temporaries_and_calls() {
        assert!(matches!(parse("(int) x"), Expr::Cast { .. }));
        assert!(matches!(parse("(x)"), Expr::Variable(_)));
        assert!(matches!(parse("int(3.5)"), Expr::Temporary { .. }));
        let Expr::Call { args, .. } = parse("f(1, 2)") else { panic!("expected call") };
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn postfix_chain() {
        let e = parse("a.b(1)[2]{\"k\"}");
        let Expr::KeyIndex { target, .. } = &e else { panic!("expected key index") };
        let Expr::Index { target, .. } = &**target else { panic!("expected index") };
        assert!(matches!(**target, Expr::Method { .. }));
        let Expr::Property { target, .. } = parse("p->x") else { panic!("expected property") };
        assert!(matches!(*target, Expr::Deref(_)));
        assert!(matches!(parse("n!"), Expr::Factorial(_)));
        assert!(matches!(parse("i++"), Expr::PostStep { delta: 1, .. }));
    }

    #[test]
    fn elementary_forms() {
        assert!(matches!(parse("[1:10:2]"), Expr::Range { step: Some(_), .. }));
        assert!(matches!(parse("[1,5]"), Expr::Range { step: None, .. }));
        assert!(matches!(parse("$tmp"), Expr::Local(_)));
        assert!(matches!(parse("new int[3]"), Expr::New { length: Some(_), .. }));
        let Expr::ListLiteral(items) = parse("{\"a\" => 1, 2}") else { panic!("expected list") };
        assert_eq!(items.len(), 2);
        assert!(items[0].key.is_some() && items[1].key.is_none());
    }

    #[test]
    fn literals() {
        assert!(matches!(parse("0x1F"), Expr::Literal(Value::Long(31))));
        assert!(matches!(parse("0b101"), Expr::Literal(Value::Long(5))));
        assert!(matches!(parse("2i"), Expr::Literal(Value::Complex(_))));
        let Expr::Literal(Value::Str(s)) = parse("\"ab\" \"cd\"") else { panic!("expected string") };
        assert_eq!(s, "abcd");
    }

    #[test]
    fn custom_operator_takes_its_rank() {
        let mut ops = OperatorTable::c_like();
        ops.register_custom("<>", "compare", Rank::Relative("==".into(), -5), Assoc::Left, |a, b| {
            Ok(Value::Bool(a != b))
        })
        .unwrap();
        let e = parse_with(&ops, "1 + 2 <> 3 == x").unwrap();
        assert_eq!(symbol(&e), "==");
        let Expr::Binary { lhs, .. } = &e else { unreachable!() };
        assert_eq!(symbol(lhs), "<>");
    }

    #[test]
    fn syntax_errors() {
        let ops = OperatorTable::c_like();
        assert!(parse_with(&ops, "1 +").is_err());
        assert!(parse_with(&ops, "(1").is_err());
        assert!(parse_with(&ops, "{1 2}").is_err());
    }
}
