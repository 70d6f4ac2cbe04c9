//! Operator table.
//!
//! Binary operators are looked up by symbol.  Each one carries a priority
//! rank (lower binds tighter) and an associativity; the expression parser
//! climbs the distinct ranks from loosest to tightest.  Default ranks are
//! spaced by ten so a host can slot an operator between two levels with a
//! relative rank:
//!
//! | rank | operators                                   | assoc |
//! |------|---------------------------------------------|-------|
//! | 100  | `*` `/` `%`                                 | left  |
//! | 110  | `+` `-`                                     | left  |
//! | 120  | `<<` `>>`                                   | left  |
//! | 130  | `<` `<=` `>` `>=`                           | left  |
//! | 140  | `==` `!=`                                   | left  |
//! | 150  | `&`                                         | left  |
//! | 160  | `^`                                         | left  |
//! | 170  | `\|`                                        | left  |
//! | 180  | `&&`                                        | left  |
//! | 190  | `\|\|`                                      | left  |
//! | 200  | `?` `:`                                     | right |
//! | 210  | `=` and the compound assignments            | right |
//!
//! Prefix, postfix and self-leading operators are fixed by the grammar; the
//! table only lists their symbols so the lexer can recognise them.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use super::error::{ScriptError, ScriptResult};
use super::lexer::Lexer;
use super::ops::BinaryOp;
use super::value::Value;

/// Host-supplied evaluator of a custom binary operator.
pub type CustomOperator = Rc<dyn Fn(&Value, &Value) -> ScriptResult<Value>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assoc {
    Left,
    Right,
}

/// Priority of a new operator: absolute, or relative to an existing one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rank {
    Absolute(u32),
    Relative(String, i32),
}

/// How a binary operator node is evaluated.
#[derive(Clone)]
pub enum BinaryKind {
    Arith(BinaryOp),
    /// `&&` / `||`, short-circuiting on scalars.
    Logical(BinaryOp),
    Assign,
    /// `op=`: apply `op`, then assign.
    Compound(BinaryOp),
    /// `?:`; the parser consumes `: expr` itself.
    Conditional,
    Custom(CustomOperator),
}

impl fmt::Debug for BinaryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinaryKind::Arith(op) => write!(f, "Arith({op:?})"),
            BinaryKind::Logical(op) => write!(f, "Logical({op:?})"),
            BinaryKind::Assign => write!(f, "Assign"),
            BinaryKind::Compound(op) => write!(f, "Compound({op:?})"),
            BinaryKind::Conditional => write!(f, "Conditional"),
            BinaryKind::Custom(_) => write!(f, "Custom"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OperatorDef {
    pub symbol: String,
    pub name: String,
    pub rank: u32,
    pub assoc: Assoc,
    pub kind: BinaryKind,
}

/// Prefix operator symbols (`delete`, `sizeof`, … and the sign operators).
pub const PREFIX_SYMBOLS: &[&str] = &[
    "delete", "sizeof", "typeof", "keys", "*", "&", "++", "--", "+", "-", "!", "~",
];

/// Postfix operator symbols.
pub const POSTFIX_SYMBOLS: &[&str] = &["++", "--", "!", "**", ".", "->"];

/// Self-leading operator symbols and punctuation used inside expressions.
pub const ELEMENTARY_SYMBOLS: &[&str] = &["new", "$", "=>"];

#[derive(Debug, Clone)]
pub struct OperatorTable {
    binary: HashMap<String, Rc<OperatorDef>>,
}

impl Default for OperatorTable {
    fn default() -> Self {
        Self::c_like()
    }
}

impl OperatorTable {
    /// Empty table (no binary operators).
    pub fn empty() -> Self {
        OperatorTable {
            binary: HashMap::new(),
        }
    }

    /// The default C-like operator set.
    pub fn c_like() -> Self {
        use BinaryOp::*;
        let mut t = Self::empty();
        let groups: &[(u32, Assoc, &[(&str, &str, BinaryKind)])] = &[
            (100, Assoc::Left, &[
                ("*", "multiply", BinaryKind::Arith(Mul)),
                ("/", "divide", BinaryKind::Arith(Div)),
                ("%", "modulo", BinaryKind::Arith(Mod)),
            ]),
            (110, Assoc::Left, &[
                ("+", "add", BinaryKind::Arith(Add)),
                ("-", "subtract", BinaryKind::Arith(Sub)),
            ]),
            (120, Assoc::Left, &[
                ("<<", "shift left", BinaryKind::Arith(Shl)),
                (">>", "shift right", BinaryKind::Arith(Shr)),
            ]),
            (130, Assoc::Left, &[
                ("<", "less", BinaryKind::Arith(Lt)),
                ("<=", "less or equal", BinaryKind::Arith(Le)),
                (">", "greater", BinaryKind::Arith(Gt)),
                (">=", "greater or equal", BinaryKind::Arith(Ge)),
            ]),
            (140, Assoc::Left, &[
                ("==", "equal", BinaryKind::Arith(Eq)),
                ("!=", "not equal", BinaryKind::Arith(Ne)),
            ]),
            (150, Assoc::Left, &[("&", "bit and", BinaryKind::Arith(BitAnd))]),
            (160, Assoc::Left, &[("^", "bit xor", BinaryKind::Arith(BitXor))]),
            (170, Assoc::Left, &[("|", "bit or", BinaryKind::Arith(BitOr))]),
            (180, Assoc::Left, &[("&&", "and", BinaryKind::Logical(And))]),
            (190, Assoc::Left, &[("||", "or", BinaryKind::Logical(Or))]),
            (200, Assoc::Right, &[("?", "conditional", BinaryKind::Conditional)]),
            (210, Assoc::Right, &[
                ("=", "assign", BinaryKind::Assign),
                ("+=", "add assign", BinaryKind::Compound(Add)),
                ("-=", "subtract assign", BinaryKind::Compound(Sub)),
                ("*=", "multiply assign", BinaryKind::Compound(Mul)),
                ("/=", "divide assign", BinaryKind::Compound(Div)),
                ("%=", "modulo assign", BinaryKind::Compound(Mod)),
                ("&=", "bit and assign", BinaryKind::Compound(BitAnd)),
                ("|=", "bit or assign", BinaryKind::Compound(BitOr)),
                ("^=", "bit xor assign", BinaryKind::Compound(BitXor)),
                ("<<=", "shift left assign", BinaryKind::Compound(Shl)),
                (">>=", "shift right assign", BinaryKind::Compound(Shr)),
            ]),
        ];
        for (rank, assoc, ops) in groups {
            for (symbol, name, kind) in ops.iter() {
                t.insert(OperatorDef {
                    symbol: (*symbol).to_owned(),
                    name: (*name).to_owned(),
                    rank: *rank,
                    assoc: *assoc,
                    kind: kind.clone(),
                });
            }
        }
        t
    }

    fn insert(&mut self, def: OperatorDef) {
        self.binary.insert(def.symbol.clone(), Rc::new(def));
    }

    pub fn resolve_rank(&self, rank: &Rank) -> ScriptResult<u32> {
        match rank {
            Rank::Absolute(n) => Ok(*n),
            Rank::Relative(base, offset) => {
                let base_rank = self
                    .binary
                    .get(base)
                    .map(|d| d.rank)
                    .ok_or_else(|| ScriptError::unknown(format!("unknown operator '{base}'")))?;
                base_rank.checked_add_signed(*offset).ok_or_else(|| {
                    ScriptError::arithmetic(format!("operator rank out of range: {base}{offset:+}"))
                })
            }
        }
    }

    /// Add (or replace) a binary operator.
    pub fn register_binary(
        &mut self,
        symbol: &str,
        name: &str,
        rank: Rank,
        assoc: Assoc,
        kind: BinaryKind,
    ) -> ScriptResult<()> {
        let rank = self.resolve_rank(&rank)?;
        tracing::debug!(symbol, name, rank, "registering binary operator");
        self.insert(OperatorDef {
            symbol: symbol.to_owned(),
            name: name.to_owned(),
            rank,
            assoc,
            kind,
        });
        Ok(())
    }

    /// Add a binary operator evaluated by a host closure.
    pub fn register_custom(
        &mut self,
        symbol: &str,
        name: &str,
        rank: Rank,
        assoc: Assoc,
        eval: impl Fn(&Value, &Value) -> ScriptResult<Value> + 'static,
    ) -> ScriptResult<()> {
        self.register_binary(symbol, name, rank, assoc, BinaryKind::Custom(Rc::new(eval)))
    }

    pub fn binary(&self, symbol: &str) -> Option<Rc<OperatorDef>> {
        self.binary.get(symbol).cloned()
    }

    /// Distinct ranks, tightest first.
    pub fn ranks(&self) -> Vec<u32> {
        let mut ranks: Vec<u32> = self.binary.values().map(|d| d.rank).collect();
        ranks.sort_unstable();
        ranks.dedup();
        ranks
    }

    /// Every operator symbol the lexer must know.
    pub fn symbols(&self) -> Vec<String> {
        let mut out: Vec<String> = self.binary.keys().cloned().collect();
        for s in PREFIX_SYMBOLS.iter().chain(POSTFIX_SYMBOLS).chain(ELEMENTARY_SYMBOLS) {
            out.push((*s).to_owned());
        }
        out.sort();
        out.dedup();
        out
    }

    pub fn configure_lexer(&self, lexer: &mut Lexer) {
        for symbol in self.symbols() {
            lexer.register_operator(&symbol);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ranks() {
        let t = OperatorTable::c_like();
        assert!(t.binary("*").unwrap().rank < t.binary("+").unwrap().rank);
        assert_eq!(t.binary("=").unwrap().assoc, Assoc::Right);
        assert_eq!(t.ranks().len(), 12);
        assert_eq!(t.ranks()[0], 100);
    }

    #[test]
    fn relative_rank() {
        let mut t = OperatorTable::c_like();
        t.register_custom("<>", "spaceship", Rank::Relative("==".into(), -5), Assoc::Left, |a, b| {
            Ok(Value::Long(super::super::ops::compare(a, b) as i64))
        })
        .unwrap();
        assert_eq!(t.binary("<>").unwrap().rank, 135);
        assert!(t
            .register_binary("@", "x", Rank::Relative("nope".into(), 1), Assoc::Left, BinaryKind::Assign)
            .is_err());
    }

    #[test]
    fn symbols_include_prefix_and_postfix() {
        let syms = OperatorTable::c_like().symbols();
        for s in ["**", "->", "sizeof", "new", "$", "=>", "<<="] {
            assert!(syms.iter().any(|x| x == s), "missing {s}");
        }
    }
}
