//! Operator evaluation on values.
//!
//! Binary operators broadcast over lists: two lists are combined element by
//! element (their lengths must match), a scalar is applied to every element
//! of a list.  The result keeps the key index of whichever operand has one,
//! the left operand first.  Scalars are coerced to the richest kind present,
//! complex over double over integer.

use std::cmp::Ordering;

use super::error::{ScriptError, ScriptResult};
use super::list::List;
use super::value::{Complex, Value};

/// Built-in binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Mul,
    Div,
    Mod,
    Add,
    Sub,
    Shl,
    Shr,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitXor,
    BitOr,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitXor => "^",
            BinaryOp::BitOr => "|",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }

    fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Eq | BinaryOp::Ne
        )
    }

    fn is_integral(self) -> bool {
        matches!(
            self,
            BinaryOp::Shl | BinaryOp::Shr | BinaryOp::BitAnd | BinaryOp::BitXor | BinaryOp::BitOr
        )
    }
}

/// Built-in prefix operators that map values to values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    BitNot,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Plus => "+",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
        }
    }
}

// ── Broadcasting ──────────────────────────────────────────────────────────────

/// Map every element of `list` through `f`, keeping its keys.
pub fn map_list(list: &List, mut f: impl FnMut(&Value) -> ScriptResult<Value>) -> ScriptResult<Value> {
    let mut out = List::new();
    for slot in list.slots() {
        let v = f(&slot.borrow().value)?;
        out.push_value(v);
    }
    out.copy_keys_from(list);
    Ok(Value::List(out))
}

fn zip_lists(
    a: &List,
    b: &List,
    op: &str,
    mut f: impl FnMut(&Value, &Value) -> ScriptResult<Value>,
) -> ScriptResult<Value> {
    if a.len() != b.len() {
        return Err(ScriptError::structural(format!(
            "list length mismatch in '{op}': {} vs {}",
            a.len(),
            b.len()
        )));
    }
    let mut out = List::new();
    for (x, y) in a.slots().iter().zip(b.slots()) {
        let v = f(&x.borrow().value, &y.borrow().value)?;
        out.push_value(v);
    }
    if a.has_keys() {
        out.copy_keys_from(a);
    } else {
        out.copy_keys_from(b);
    }
    Ok(Value::List(out))
}

/// Apply `f` with list broadcasting on either side.
pub fn broadcast(
    lhs: &Value,
    rhs: &Value,
    op: &str,
    f: &mut dyn FnMut(&Value, &Value) -> ScriptResult<Value>,
) -> ScriptResult<Value> {
    match (lhs, rhs) {
        (Value::List(a), Value::List(b)) => zip_lists(a, b, op, |x, y| broadcast(x, y, op, f)),
        (Value::List(a), s) => map_list(a, |x| broadcast(x, s, op, f)),
        (s, Value::List(b)) => map_list(b, |y| broadcast(s, y, op, f)),
        _ => f(lhs, rhs),
    }
}

// ── Binary ────────────────────────────────────────────────────────────────────

pub fn binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> ScriptResult<Value> {
    broadcast(lhs, rhs, op.symbol(), &mut |a, b| scalar_binary(op, a, b))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Rank {
    Long,
    Double,
    Complex,
}

fn rank(v: &Value) -> ScriptResult<Rank> {
    Ok(match v {
        Value::Void | Value::Unresolved | Value::Bool(_) | Value::Long(_) => Rank::Long,
        Value::Double(_) => Rank::Double,
        Value::Complex(_) => Rank::Complex,
        Value::Str(s) => match super::value::parse_number(s) {
            Some(n) => rank(&n)?,
            None => {
                return Err(ScriptError::type_error(format!(
                    "\"{s}\" is not a number"
                )))
            }
        },
        other => {
            return Err(ScriptError::type_error(format!(
                "invalid operand of type {}",
                other.type_name()
            )))
        }
    })
}

fn scalar_binary(op: BinaryOp, a: &Value, b: &Value) -> ScriptResult<Value> {
    // Fast path.
    if let (Value::Long(x), Value::Long(y)) = (a, b) {
        return long_binary(op, *x, *y);
    }
    if let (Value::Double(x), Value::Double(y)) = (a, b) {
        return double_binary(op, *x, *y);
    }

    match op {
        BinaryOp::And => return Ok(Value::Bool(a.as_bool()? && b.as_bool()?)),
        BinaryOp::Or => return Ok(Value::Bool(a.as_bool()? || b.as_bool()?)),
        _ => {}
    }

    if let Some(v) = reference_compare(op, a, b) {
        return v;
    }

    if let (Value::Str(_), _) | (_, Value::Str(_)) = (a, b) {
        if op == BinaryOp::Add {
            return Ok(Value::Str(format!("{a}{b}")));
        }
        if op.is_comparison() {
            let numeric = rank(a).is_ok() && rank(b).is_ok();
            if !numeric || matches!((a, b), (Value::Str(_), Value::Str(_))) {
                return Ok(Value::Bool(ordering_holds(op, a.to_string().cmp(&b.to_string()))));
            }
        }
    }

    match rank(a)?.max(rank(b)?) {
        Rank::Long => long_binary(op, a.as_long()?, b.as_long()?),
        Rank::Double => double_binary(op, a.as_double()?, b.as_double()?),
        Rank::Complex => complex_binary(op, a.as_complex()?, b.as_complex()?),
    }
}

/// Identity comparison for objects and pointers.
fn reference_compare(op: BinaryOp, a: &Value, b: &Value) -> Option<ScriptResult<Value>> {
    let same = match (a, b) {
        (Value::Object(x), Value::Object(y)) => std::rc::Rc::ptr_eq(x, y),
        (Value::Pointer(x), Value::Pointer(y)) => x.same_target(y),
        (Value::Pointer(p), Value::Long(0) | Value::Void)
        | (Value::Long(0) | Value::Void, Value::Pointer(p)) => p.is_null(),
        (Value::Object(_) | Value::Pointer(_), _) | (_, Value::Object(_) | Value::Pointer(_)) => {
            return Some(Err(ScriptError::type_error(format!(
                "operator '{}' is not defined for {} and {}",
                op.symbol(),
                a.type_name(),
                b.type_name()
            ))))
        }
        _ => return None,
    };
    Some(match op {
        BinaryOp::Eq => Ok(Value::Bool(same)),
        BinaryOp::Ne => Ok(Value::Bool(!same)),
        _ => Err(ScriptError::type_error(format!(
            "operator '{}' is not defined for {}",
            op.symbol(),
            a.type_name()
        ))),
    })
}

fn ordering_holds(op: BinaryOp, ord: Ordering) -> bool {
    match op {
        BinaryOp::Lt => ord == Ordering::Less,
        BinaryOp::Le => ord != Ordering::Greater,
        BinaryOp::Gt => ord == Ordering::Greater,
        BinaryOp::Ge => ord != Ordering::Less,
        BinaryOp::Eq => ord == Ordering::Equal,
        BinaryOp::Ne => ord != Ordering::Equal,
        _ => false,
    }
}

/// Integer result, or the same operation in doubles when it overflows.
fn long_or_double(checked: Option<i64>, a: i64, b: i64, f: fn(f64, f64) -> f64) -> Value {
    match checked {
        Some(n) => Value::Long(n),
        None => Value::Double(f(a as f64, b as f64)),
    }
}

fn long_binary(op: BinaryOp, a: i64, b: i64) -> ScriptResult<Value> {
    Ok(match op {
        BinaryOp::Add => long_or_double(a.checked_add(b), a, b, |x, y| x + y),
        BinaryOp::Sub => long_or_double(a.checked_sub(b), a, b, |x, y| x - y),
        BinaryOp::Mul => long_or_double(a.checked_mul(b), a, b, |x, y| x * y),
        BinaryOp::Div => {
            if b == 0 {
                return Err(ScriptError::arithmetic("division by zero"));
            }
            long_or_double(a.checked_div(b), a, b, |x, y| x / y)
        }
        BinaryOp::Mod => {
            if b == 0 {
                return Err(ScriptError::arithmetic("modulo by zero"));
            }
            // Only i64::MIN % -1 fails, and its remainder is zero.
            Value::Long(a.checked_rem(b).unwrap_or(0))
        }
        BinaryOp::Shl => Value::Long(a.wrapping_shl((b & 63) as u32)),
        BinaryOp::Shr => Value::Long(a.wrapping_shr((b & 63) as u32)),
        BinaryOp::BitAnd => Value::Long(a & b),
        BinaryOp::BitXor => Value::Long(a ^ b),
        BinaryOp::BitOr => Value::Long(a | b),
        BinaryOp::And => Value::Bool(a != 0 && b != 0),
        BinaryOp::Or => Value::Bool(a != 0 || b != 0),
        cmp => Value::Bool(ordering_holds(cmp, a.cmp(&b))),
    })
}

fn double_binary(op: BinaryOp, a: f64, b: f64) -> ScriptResult<Value> {
    if op.is_integral() {
        return Err(ScriptError::type_error(format!(
            "operator '{}' requires integer operands",
            op.symbol()
        )));
    }
    Ok(match op {
        BinaryOp::Add => Value::Double(a + b),
        BinaryOp::Sub => Value::Double(a - b),
        BinaryOp::Mul => Value::Double(a * b),
        BinaryOp::Div => {
            if b == 0.0 {
                return Err(ScriptError::arithmetic("division by zero"));
            }
            Value::Double(a / b)
        }
        BinaryOp::Mod => {
            if b == 0.0 {
                return Err(ScriptError::arithmetic("modulo by zero"));
            }
            Value::Double(a % b)
        }
        BinaryOp::And => Value::Bool(a != 0.0 && b != 0.0),
        BinaryOp::Or => Value::Bool(a != 0.0 || b != 0.0),
        cmp => match a.partial_cmp(&b) {
            Some(ord) => Value::Bool(ordering_holds(cmp, ord)),
            None => Value::Bool(cmp == BinaryOp::Ne),
        },
    })
}

fn complex_binary(op: BinaryOp, a: Complex, b: Complex) -> ScriptResult<Value> {
    Ok(match op {
        BinaryOp::Add => Value::Complex(a + b),
        BinaryOp::Sub => Value::Complex(a - b),
        BinaryOp::Mul => Value::Complex(a * b),
        BinaryOp::Div => {
            if b.is_zero() {
                return Err(ScriptError::arithmetic("division by zero"));
            }
            Value::Complex(a / b)
        }
        BinaryOp::Eq => Value::Bool(a == b),
        BinaryOp::Ne => Value::Bool(a != b),
        BinaryOp::And => Value::Bool(!a.is_zero() && !b.is_zero()),
        BinaryOp::Or => Value::Bool(!a.is_zero() || !b.is_zero()),
        other => {
            return Err(ScriptError::type_error(format!(
                "operator '{}' is not defined for complex numbers",
                other.symbol()
            )))
        }
    })
}

// ── Unary ─────────────────────────────────────────────────────────────────────

pub fn unary(op: UnaryOp, v: &Value) -> ScriptResult<Value> {
    if let Value::List(list) = v {
        return map_list(list, |x| unary(op, x));
    }
    match op {
        UnaryOp::Not => Ok(Value::Bool(!v.as_bool()?)),
        UnaryOp::Plus => numeric(v),
        UnaryOp::Neg => Ok(match numeric(v)? {
            Value::Long(n) => n.checked_neg().map_or(Value::Double(-(n as f64)), Value::Long),
            Value::Double(x) => Value::Double(-x),
            Value::Complex(c) => Value::Complex(-c),
            other => other,
        }),
        UnaryOp::BitNot => match numeric(v)? {
            Value::Long(n) => Ok(Value::Long(!n)),
            other => Err(ScriptError::type_error(format!(
                "operator '~' requires an integer operand, got {}",
                other.type_name()
            ))),
        },
    }
}

/// Normalise a scalar to long, double or complex.
fn numeric(v: &Value) -> ScriptResult<Value> {
    Ok(match rank(v)? {
        Rank::Long => Value::Long(v.as_long()?),
        Rank::Double => Value::Double(v.as_double()?),
        Rank::Complex => Value::Complex(v.as_complex()?),
    })
}

/// `++`/`--`: add `delta` keeping the numeric kind.
pub fn step(v: &Value, delta: i64) -> ScriptResult<Value> {
    match v {
        Value::Pointer(_) | Value::Object(_) | Value::List(_) | Value::Str(_) => {
            Err(ScriptError::type_error(format!(
                "cannot increment a value of type {}",
                v.type_name()
            )))
        }
        other => binary(BinaryOp::Add, other, &Value::Long(delta)),
    }
}

/// Postfix `!`.
pub fn factorial(v: &Value) -> ScriptResult<Value> {
    if let Value::List(list) = v {
        return map_list(list, factorial);
    }
    let n = v.as_long()?;
    if n < 0 {
        return Err(ScriptError::arithmetic(format!("factorial of negative number {n}")));
    }
    let mut acc: i64 = 1;
    for k in 2..=n {
        match acc.checked_mul(k) {
            Some(next) => acc = next,
            None => {
                let mut f = acc as f64;
                for j in k..=n {
                    f *= j as f64;
                    if f.is_infinite() {
                        break;
                    }
                }
                return Ok(Value::Double(f));
            }
        }
    }
    Ok(Value::Long(acc))
}

/// Postfix `**`.
pub fn power(base: &Value, exp: &Value) -> ScriptResult<Value> {
    broadcast(base, exp, "**", &mut |b, e| {
        Ok(match rank(b)?.max(rank(e)?) {
            Rank::Long => {
                let (x, y) = (b.as_long()?, e.as_long()?);
                match u32::try_from(y).ok().and_then(|y| x.checked_pow(y)) {
                    Some(p) => Value::Long(p),
                    None => Value::Double((x as f64).powf(y as f64)),
                }
            }
            Rank::Double => Value::Double(b.as_double()?.powf(e.as_double()?)),
            Rank::Complex => Value::Complex(b.as_complex()?.powc(e.as_complex()?)),
        })
    })
}

/// Total order used by sorting and `min`/`max`: numbers before strings,
/// numbers by value, strings lexically.
pub fn compare(a: &Value, b: &Value) -> Ordering {
    match (rank(a), rank(b)) {
        (Ok(_), Ok(_)) => {
            let x = a.as_double().unwrap_or(0.0);
            let y = b.as_double().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.to_string().cmp(&b.to_string()),
    }
}
