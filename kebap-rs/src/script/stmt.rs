//! Statement AST and recursive-descent statement parser.
//!
//! A statement is chosen by its first token: a control keyword, `{`, `;`, a
//! type name (declaration), or anything else (expression statement).  The
//! parser methods extend [`Parser`] from [`expr`](super::expr).

use super::error::{ScriptError, ScriptResult};
use super::expr::{Expr, Parser};
use super::interner::SymbolId;
use super::slot::DeclType;
use super::token::{Token, TokenKind};

// ── AST ───────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: usize,
}

#[derive(Debug)]
pub enum StmtKind {
    Empty,
    Expr(Expr),
    Block(Vec<Stmt>),
    Declaration {
        ty: DeclType,
        declarators: Vec<Declarator>,
    },
    If {
        cond: Expr,
        then: Box<Stmt>,
        otherwise: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        step: Option<Expr>,
        body: Box<Stmt>,
    },
    /// `foreach (value[, key[, index]]; list) body`
    Foreach {
        value: ForeachVar,
        key: Option<ForeachVar>,
        index: Option<ForeachVar>,
        list: Expr,
        body: Box<Stmt>,
    },
    Break,
    Continue,
    Return(Option<Expr>),
    Throw(Expr),
    Try {
        body: Box<Stmt>,
        param: Option<CatchParam>,
        handler: Box<Stmt>,
    },
    Exit(Option<Expr>),
}

/// One name in a declaration: `name`, `*name`, `name[n]`, `name[]`, with an
/// optional `= expr` or `(args)` initialiser.
#[derive(Debug)]
pub struct Declarator {
    pub name: SymbolId,
    pub pointer: bool,
    /// `Some(None)` for `name[]`, `Some(Some(n))` for `name[n]`.
    pub array: Option<Option<Expr>>,
    pub init: Option<Init>,
}

#[derive(Debug)]
pub enum Init {
    Assign(Expr),
    Construct(Vec<Expr>),
}

/// A foreach variable: declared in the loop block, or any left-value.
#[derive(Debug)]
pub enum ForeachVar {
    Declare(DeclType, SymbolId),
    Target(Expr),
}

#[derive(Debug)]
pub struct CatchParam {
    pub ty: DeclType,
    pub name: SymbolId,
}

#[derive(Debug)]
pub struct Param {
    pub ty: DeclType,
    pub name: SymbolId,
    pub pointer: bool,
    pub array: bool,
}

/// A user-defined function.
#[derive(Debug)]
pub struct Function {
    pub name: SymbolId,
    pub display: String,
    pub params: Vec<Param>,
    pub body: Stmt,
    pub return_type: DeclType,
    pub line: usize,
}

// ── Parser ────────────────────────────────────────────────────────────────────

impl Parser<'_> {
    pub fn parse_statement(&mut self) -> ScriptResult<Stmt> {
        let token = self.next()?;
        let line = token.line;
        let kind = if token.kind == TokenKind::Keyword {
            self.parse_keyword_statement(&token)?
        } else if token.is("{") {
            if self.brace_opens_block()? {
                StmtKind::Block(self.parse_block_body()?)
            } else {
                self.lexer.unget(token);
                self.parse_expression_statement()?
            }
        } else if token.is(";") {
            StmtKind::Empty
        } else if token.is_end() {
            return Err(Self::unexpected(&token));
        } else if self.is_type_token(&token) && !self.peek()?.is("(") {
            let ty = self.decl_type(&token.text)?;
            self.parse_declaration(ty)?
        } else {
            self.lexer.unget(token);
            self.parse_expression_statement()?
        };
        Ok(Stmt { kind, line })
    }

    fn parse_keyword_statement(&mut self, token: &Token) -> ScriptResult<StmtKind> {
        let kind = match token.text.as_str() {
            "if" => {
                let cond = self.parse_condition()?;
                let then = Box::new(self.parse_statement()?);
                let otherwise = if self.accept("else")? {
                    Some(Box::new(self.parse_statement()?))
                } else {
                    None
                };
                StmtKind::If {
                    cond,
                    then,
                    otherwise,
                }
            }
            "while" => {
                let cond = self.parse_condition()?;
                let body = Box::new(self.parse_statement()?);
                StmtKind::While { cond, body }
            }
            "for" => self.parse_for()?,
            "foreach" => self.parse_foreach()?,
            "break" => {
                self.end_statement()?;
                StmtKind::Break
            }
            "continue" => {
                self.end_statement()?;
                StmtKind::Continue
            }
            "return" => StmtKind::Return(self.parse_optional_expression()?),
            "exit" => StmtKind::Exit(self.parse_optional_expression()?),
            "throw" => {
                let value = self.parse_expression()?;
                self.end_statement()?;
                StmtKind::Throw(value)
            }
            "try" => self.parse_try()?,
            _ => return Err(Self::unexpected(token)),
        };
        Ok(kind)
    }

    /// `( expr )`
    fn parse_condition(&mut self) -> ScriptResult<Expr> {
        self.expect("(")?;
        let cond = self.parse_expression()?;
        self.expect(")")?;
        Ok(cond)
    }

    /// A statement ends at `;` or at the end of the input.
    fn end_statement(&mut self) -> ScriptResult<()> {
        let token = self.next()?;
        if token.is(";") {
            return Ok(());
        }
        if token.is_end() {
            self.lexer.unget(token);
            return Ok(());
        }
        Err(ScriptError::syntax(format!("expected ';', found {token}")).at_line(token.line))
    }

    fn parse_optional_expression(&mut self) -> ScriptResult<Option<Expr>> {
        let next = self.peek()?;
        if next.is(";") || next.is_end() {
            self.end_statement()?;
            return Ok(None);
        }
        let value = self.parse_expression()?;
        self.end_statement()?;
        Ok(Some(value))
    }

    fn parse_expression_statement(&mut self) -> ScriptResult<StmtKind> {
        let expr = self.parse_expression()?;
        self.end_statement()?;
        Ok(StmtKind::Expr(expr))
    }

    // ── Blocks ────────────────────────────────────────────────────────────────

    /// Called after `{` at statement start.  The brace opens a block unless
    /// the text up to the matching `}` is a non-empty expression: no `;` at
    /// its top level and no leading statement keyword or `{`.
    fn brace_opens_block(&mut self) -> ScriptResult<bool> {
        let mut scanned = Vec::new();
        let mut depth = 0usize;
        let opens_block = loop {
            let token = self.next()?;
            let first = scanned.is_empty();
            let decision = if token.is_end() {
                Some(true)
            } else if first && (token.is("}") || token.is("{") || token.kind == TokenKind::Keyword) {
                Some(true)
            } else if token.kind == TokenKind::Separator {
                match token.text.as_str() {
                    "(" | "[" | "{" => {
                        depth += 1;
                        None
                    }
                    ")" | "]" => {
                        depth = depth.saturating_sub(1);
                        None
                    }
                    "}" if depth == 0 => Some(false),
                    "}" => {
                        depth -= 1;
                        None
                    }
                    ";" if depth == 0 => Some(true),
                    _ => None,
                }
            } else {
                None
            };
            scanned.push(token);
            if let Some(decision) = decision {
                break decision;
            }
        };
        for token in scanned.into_iter().rev() {
            self.lexer.unget(token);
        }
        Ok(opens_block)
    }

    /// Statements through the closing `}`.
    fn parse_block_body(&mut self) -> ScriptResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        loop {
            let token = self.peek()?;
            if token.is("}") {
                self.next()?;
                return Ok(stmts);
            }
            if token.is_end() {
                return Err(ScriptError::syntax("missing '}' at end of input").at_line(token.line));
            }
            stmts.push(self.parse_statement()?);
        }
    }

    // ── Declarations ──────────────────────────────────────────────────────────

    /// Declarators after the type name, through the terminating `;`.
    fn parse_declaration(&mut self, ty: DeclType) -> ScriptResult<StmtKind> {
        let mut declarators = Vec::new();
        loop {
            let pointer = self.accept("*")?;
            let name = self.expect_identifier("a variable name")?;
            let array = if self.accept("[")? {
                if self.accept("]")? {
                    Some(None)
                } else {
                    let length = self.parse_expression()?;
                    self.expect("]")?;
                    Some(Some(length))
                }
            } else {
                None
            };
            let init = if self.accept("=")? {
                Some(Init::Assign(self.parse_expression()?))
            } else if self.accept("(")? {
                Some(Init::Construct(self.parse_args()?))
            } else {
                None
            };
            declarators.push(Declarator {
                name: self.names.intern(&name.text),
                pointer,
                array,
                init,
            });
            if !self.accept(",")? {
                break;
            }
        }
        self.end_statement()?;
        Ok(StmtKind::Declaration { ty, declarators })
    }

    // ── Loops ─────────────────────────────────────────────────────────────────

    fn parse_for(&mut self) -> ScriptResult<StmtKind> {
        self.expect("(")?;
        let init = if self.accept(";")? {
            None
        } else {
            let token = self.next()?;
            let line = token.line;
            let kind = if self.is_type_token(&token) && !self.peek()?.is("(") {
                let ty = self.decl_type(&token.text)?;
                self.parse_declaration(ty)?
            } else {
                self.lexer.unget(token);
                let expr = self.parse_expression()?;
                self.expect(";")?;
                StmtKind::Expr(expr)
            };
            Some(Box::new(Stmt { kind, line }))
        };
        let cond = if self.peek()?.is(";") {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(";")?;
        let step = if self.peek()?.is(")") {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(")")?;
        let body = Box::new(self.parse_statement()?);
        Ok(StmtKind::For {
            init,
            cond,
            step,
            body,
        })
    }

    fn parse_foreach_var(&mut self) -> ScriptResult<ForeachVar> {
        let token = self.peek()?;
        if self.is_type_token(&token) && self.lexer.look_ahead(2)?.is_identifier() {
            self.next()?;
            let ty = self.decl_type(&token.text)?;
            let name = self.expect_identifier("a loop variable name")?;
            return Ok(ForeachVar::Declare(ty, self.names.intern(&name.text)));
        }
        Ok(ForeachVar::Target(self.parse_expression()?))
    }

    fn parse_foreach(&mut self) -> ScriptResult<StmtKind> {
        self.expect("(")?;
        let value = self.parse_foreach_var()?;
        let key = if self.accept(",")? {
            Some(self.parse_foreach_var()?)
        } else {
            None
        };
        let index = if key.is_some() && self.accept(",")? {
            Some(self.parse_foreach_var()?)
        } else {
            None
        };
        self.expect(";")?;
        let list = self.parse_expression()?;
        self.expect(")")?;
        let body = Box::new(self.parse_statement()?);
        Ok(StmtKind::Foreach {
            value,
            key,
            index,
            list,
            body,
        })
    }

    // ── try / catch ───────────────────────────────────────────────────────────

    fn parse_try(&mut self) -> ScriptResult<StmtKind> {
        let body = Box::new(self.parse_statement()?);
        self.expect("catch")?;
        let param = if self.accept("(")? {
            let first = self.expect_identifier("a catch variable")?;
            let param = if self.peek()?.is_identifier() && self.is_type_token(&first) {
                let ty = self.decl_type(&first.text)?;
                let name = self.expect_identifier("a catch variable")?;
                CatchParam {
                    ty,
                    name: self.names.intern(&name.text),
                }
            } else {
                CatchParam {
                    ty: DeclType::Variant,
                    name: self.names.intern(&first.text),
                }
            };
            self.expect(")")?;
            Some(param)
        } else {
            None
        };
        let handler = Box::new(self.parse_statement()?);
        Ok(StmtKind::Try {
            body,
            param,
            handler,
        })
    }

    // ── Functions ─────────────────────────────────────────────────────────────

    /// Parameter list and body of a function whose return type and name were
    /// already consumed.  A declaration without a body (`;` after the
    /// parameter list) yields `None`.
    pub fn parse_function(&mut self, return_type: DeclType, name: &Token) -> ScriptResult<Option<Function>> {
        self.expect("(")?;
        let mut params = Vec::new();
        if !self.accept(")")? {
            loop {
                let ty_token = self.expect_identifier("a parameter type")?;
                if !self.is_type_name(&ty_token.text) {
                    return Err(ScriptError::unknown(format!("unknown type '{}'", ty_token.text))
                        .at_line(ty_token.line));
                }
                let ty = self.decl_type(&ty_token.text)?;
                let pointer = self.accept("*")?;
                if ty == DeclType::Void && !pointer {
                    return Err(ScriptError::type_error("parameter declared void").at_line(ty_token.line));
                }
                let param = self.expect_identifier("a parameter name")?;
                let array = if self.accept("[")? {
                    self.expect("]")?;
                    true
                } else {
                    false
                };
                params.push(Param {
                    ty,
                    name: self.names.intern(&param.text),
                    pointer,
                    array,
                });
                if self.accept(")")? {
                    break;
                }
                self.expect(",")?;
            }
        }
        if self.accept(";")? {
            return Ok(None);
        }
        let open = self.expect("{")?;
        let body = Stmt {
            kind: StmtKind::Block(self.parse_block_body()?),
            line: open.line,
        };
        Ok(Some(Function {
            name: self.names.intern(&name.text),
            display: name.text.clone(),
            params,
            body,
            return_type,
            line: name.line,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::error::ErrorKind;
    use crate::script::interner::NameTable;
    use crate::script::lexer::Lexer;
    use crate::script::object::ObjectRegistry;
    use crate::script::optable::OperatorTable;

    fn parse_all(src: &str) -> ScriptResult<Vec<Stmt>> {
        let ops = OperatorTable::c_like();
        let mut lexer = Lexer::from_source("test", src);
        ops.configure_lexer(&mut lexer);
        let mut names = NameTable::new();
        let registry = ObjectRegistry::new();
        let mut parser = Parser::new(&mut lexer, &ops, &mut names, &registry);
        let mut stmts = Vec::new();
        while !parser.peek()?.is_end() {
            stmts.push(parser.parse_statement()?);
        }
        Ok(stmts)
    }

    fn parse_one(src: &str) -> Stmt {
        let mut stmts = parse_all(src).expect("parse failed");
        assert_eq!(stmts.len(), 1, "expected one statement in {src:?}");
        stmts.remove(0)
    }

    #[test]
    fn declaration_forms() {
        let stmt = parse_one("int a, *p, b = 2, c[3], d[] = {1,2}, e(4);");
        let StmtKind::Declaration { ty, declarators } = stmt.kind else {
            panic!("not a declaration")
        };
        assert_eq!(ty, DeclType::primitive("int").unwrap());
        assert_eq!(declarators.len(), 6);
        assert!(declarators[1].pointer);
        assert!(matches!(declarators[2].init, Some(Init::Assign(_))));
        assert!(matches!(declarators[3].array, Some(Some(_))));
        assert!(matches!(declarators[4].array, Some(None)));
        assert!(matches!(declarators[5].init, Some(Init::Construct(ref a)) if a.len() == 1));
    }

    #[test]
    fn type_followed_by_paren_is_an_expression() {
        let stmt = parse_one("int(3.7);");
        assert!(matches!(stmt.kind, StmtKind::Expr(Expr::Temporary { .. })));
    }

    #[test]
    fn brace_disambiguation() {
        assert!(matches!(parse_one("{1,2,3}+10;").kind, StmtKind::Expr(_)));
        assert!(matches!(parse_one("{ x = 1; }").kind, StmtKind::Block(ref b) if b.len() == 1));
        assert!(matches!(parse_one("{}").kind, StmtKind::Block(ref b) if b.is_empty()));
        assert!(matches!(parse_one("{ if (1) x; }").kind, StmtKind::Block(_)));
    }

    #[test]
    fn control_flow() {
        let stmt = parse_one("if (a) b; else { c; }");
        assert!(matches!(stmt.kind, StmtKind::If { otherwise: Some(_), .. }));
        let stmt = parse_one("for (int i = 0; i < 3; i++) x += i;");
        assert!(matches!(
            stmt.kind,
            StmtKind::For { init: Some(_), cond: Some(_), step: Some(_), .. }
        ));
        let stmt = parse_one("for (;;) break;");
        assert!(matches!(stmt.kind, StmtKind::For { init: None, cond: None, step: None, .. }));
        let stmt = parse_one("while (x) continue;");
        assert!(matches!(stmt.kind, StmtKind::While { .. }));
    }

    #[test]
    fn foreach_variables() {
        let stmt = parse_one("foreach (var v, string k, int i; list) {}");
        let StmtKind::Foreach { value, key, index, .. } = stmt.kind else {
            panic!("not a foreach")
        };
        assert!(matches!(value, ForeachVar::Declare(DeclType::Variant, _)));
        assert!(matches!(key, Some(ForeachVar::Declare(..))));
        assert!(matches!(index, Some(ForeachVar::Declare(..))));
        let stmt = parse_one("foreach (a[0]; {1,2}) ;");
        assert!(matches!(
            stmt.kind,
            StmtKind::Foreach { value: ForeachVar::Target(_), key: None, .. }
        ));
    }

    #[test]
    fn try_catch_forms() {
        let stmt = parse_one("try throw \"x\"; catch (string e) println(e);");
        assert!(matches!(stmt.kind, StmtKind::Try { param: Some(_), .. }));
        let stmt = parse_one("try { f(); } catch (e) {}");
        let StmtKind::Try { param: Some(param), .. } = stmt.kind else {
            panic!("not a try")
        };
        assert_eq!(param.ty, DeclType::Variant);
        assert!(matches!(parse_one("try {} catch ;").kind, StmtKind::Try { param: None, .. }));
    }

    #[test]
    fn jumps_and_optional_values() {
        assert!(matches!(parse_one("return;").kind, StmtKind::Return(None)));
        assert!(matches!(parse_one("return 1;").kind, StmtKind::Return(Some(_))));
        assert!(matches!(parse_one("exit 3;").kind, StmtKind::Exit(Some(_))));
        assert!(matches!(parse_one("exit").kind, StmtKind::Exit(None)));
        assert!(matches!(parse_one(";").kind, StmtKind::Empty));
    }

    #[test]
    fn final_statement_may_omit_semicolon() {
        let stmts = parse_all("x = 1; y = 2").unwrap();
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn syntax_errors() {
        for src in ["if x) y;", "{ x = 1;", "int ;", "x = 1 y;", "foreach (x list) ;"] {
            let err = parse_all(src).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Syntax, "{src}");
        }
    }

    #[test]
    fn function_definition_and_forward_declaration() {
        let ops = OperatorTable::c_like();
        let mut lexer = Lexer::from_source("test", "int f(int a, var *p, double v[]) { return a; }\nint g();");
        ops.configure_lexer(&mut lexer);
        let mut names = NameTable::new();
        let registry = ObjectRegistry::new();
        let mut parser = Parser::new(&mut lexer, &ops, &mut names, &registry);

        parser.next().unwrap();
        let name = parser.next().unwrap();
        let int = DeclType::primitive("int").unwrap();
        let function = parser.parse_function(int.clone(), &name).unwrap().unwrap();
        assert_eq!(function.display, "f");
        assert_eq!(function.params.len(), 3);
        assert!(function.params[1].pointer);
        assert!(function.params[2].array);
        assert!(matches!(function.body.kind, StmtKind::Block(ref b) if b.len() == 1));

        parser.next().unwrap();
        let name = parser.next().unwrap();
        assert!(parser.parse_function(int, &name).unwrap().is_none());
    }
}
