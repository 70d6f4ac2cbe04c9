//! Expression evaluation.
//!
//! Evaluation yields an [`Operand`]: either a plain value or a place (a
//! slot reached through a variable, an element, or a dereferenced pointer).
//! Places are the left-values of the language; assignment, `++`/`--`, `&`
//! and `delete` require one.

use std::rc::Rc;

use super::error::{ScriptError, ScriptResult};
use super::expr::{Expr, ListItem};
use super::interp::Engine;
use super::list::List;
use super::object::ObjectRef;
use super::ops::{self, BinaryOp};
use super::optable::{BinaryKind, OperatorDef};
use super::slot::{self, Shape, Slot, SlotKind, SlotRef, TypeSpec};
use super::value::{Pointer, Value};

/// Result of evaluating an expression.
#[derive(Debug)]
pub enum Operand {
    Value(Value),
    Place(SlotRef),
}

impl Operand {
    pub fn into_value(self) -> Value {
        match self {
            Operand::Value(v) => v,
            Operand::Place(slot) => slot.borrow().value.clone(),
        }
    }

    pub fn into_place(self) -> ScriptResult<SlotRef> {
        match self {
            Operand::Place(slot) => Ok(slot),
            Operand::Value(v) => Err(ScriptError::type_error(format!(
                "not a left-value ({} temporary)",
                v.type_name()
            ))),
        }
    }
}

fn object_of(slot: &SlotRef) -> Option<ObjectRef> {
    match &slot.borrow().value {
        Value::Object(obj) => Some(Rc::clone(obj)),
        _ => None,
    }
}

fn sizeof(v: &Value) -> i64 {
    match v {
        Value::Void | Value::Unresolved => 0,
        Value::Bool(_) => 1,
        Value::Long(_) | Value::Double(_) | Value::Pointer(_) | Value::Object(_) => 8,
        Value::Complex(_) => 16,
        Value::Str(s) => s.len() as i64,
        Value::List(l) => l.len() as i64,
    }
}

/// Character `index` of `s` (negative counts from the end).
fn string_char(s: &str, index: i64) -> ScriptResult<Value> {
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len() as i64;
    let pos = if index < 0 { len + index } else { index };
    if pos < 0 || pos >= len {
        return Err(ScriptError::structural(format!(
            "index {index} out of range (length {len})"
        )));
    }
    Ok(Value::Str(chars[pos as usize].to_string()))
}

impl Engine {
    /// Evaluate `expr` to a value.
    pub fn evaluate(&mut self, expr: &Expr) -> ScriptResult<Value> {
        Ok(self.eval_operand(expr)?.into_value())
    }

    /// Evaluate `expr` to a place.
    pub fn eval_place(&mut self, expr: &Expr) -> ScriptResult<SlotRef> {
        self.eval_operand(expr)?.into_place()
    }

    pub(super) fn evaluate_args(&mut self, args: &[Expr]) -> ScriptResult<Vec<Value>> {
        args.iter().map(|a| self.evaluate(a)).collect()
    }

    fn unknown_variable(&self, id: super::interner::SymbolId) -> ScriptError {
        ScriptError::unknown(format!("unknown variable '{}'", self.names.name(id)))
    }

    pub fn eval_operand(&mut self, expr: &Expr) -> ScriptResult<Operand> {
        let value = match expr {
            Expr::Literal(v) => v.clone(),
            Expr::Variable(id) => {
                return match self.symbols.get_variable(*id) {
                    Some(slot) => Ok(Operand::Place(slot)),
                    None => Err(self.unknown_variable(*id)),
                }
            }
            Expr::Local(id) => {
                let slot = match self.symbols.get_local(*id) {
                    Some(slot) => slot,
                    None => {
                        let slot = Slot::empty(SlotKind::Variant).into_ref();
                        self.symbols.register_variable(*id, Rc::clone(&slot));
                        slot
                    }
                };
                return Ok(Operand::Place(slot));
            }
            Expr::ListLiteral(items) => self.eval_list_literal(items)?,
            Expr::Range { first, last, step } => {
                let first = self.evaluate(first)?;
                let last = self.evaluate(last)?;
                let step = match step {
                    Some(step) => Some(self.evaluate(step)?),
                    None => None,
                };
                range(&first, &last, step.as_ref())?
            }
            Expr::Binary { op, lhs, rhs } => return self.eval_binary(op, lhs, rhs),
            Expr::Conditional {
                cond,
                then,
                otherwise,
            } => {
                return if self.evaluate(cond)?.as_bool()? {
                    self.eval_operand(then)
                } else {
                    self.eval_operand(otherwise)
                };
            }
            Expr::Unary { op, operand } => {
                let v = self.evaluate(operand)?;
                match &v {
                    Value::Object(obj) => self.object_operator(obj, op.symbol(), &[])?,
                    _ => ops::unary(*op, &v)?,
                }
            }
            Expr::PreStep { delta, target } => {
                let place = self.eval_place(target)?;
                let next = ops::step(&place.borrow().value, *delta)?;
                slot::store(&place, next)?;
                return Ok(Operand::Place(place));
            }
            Expr::PostStep { delta, target } => {
                let place = self.eval_place(target)?;
                let old = place.borrow().value.clone();
                slot::store(&place, ops::step(&old, *delta)?)?;
                old
            }
            Expr::Deref(target) => match self.evaluate(target)? {
                Value::Pointer(p) => return Ok(Operand::Place(p.target()?)),
                other => {
                    return Err(ScriptError::type_error(format!(
                        "cannot dereference a value of type {}",
                        other.type_name()
                    )))
                }
            },
            Expr::AddressOf(target) => {
                let place = self.eval_place(target)?;
                Value::Pointer(Pointer::Borrowed(Rc::downgrade(&place)))
            }
            Expr::Delete(target) => {
                if let Operand::Place(place) = self.eval_operand(target)? {
                    let cleared = {
                        let slot = place.borrow();
                        match slot.shape {
                            Shape::Array { length } => Slot::array(slot.kind.clone(), length).value,
                            Shape::Scalar => Slot::empty(slot.kind.clone()).value,
                        }
                    };
                    let old = std::mem::replace(&mut place.borrow_mut().value, cleared);
                    drop(old);
                }
                Value::Void
            }
            Expr::SizeOf(target) => Value::Long(sizeof(&self.evaluate(target)?)),
            Expr::TypeOf(target) => Value::Str(self.evaluate(target)?.type_name()),
            Expr::Keys(target) => match self.evaluate(target)? {
                Value::List(list) => Value::List(List::from_values(
                    list.keys().into_iter().map(Value::Str),
                )),
                other => {
                    return Err(ScriptError::type_error(format!(
                        "keys needs a list, got {}",
                        other.type_name()
                    )))
                }
            },
            Expr::Cast { ty, operand } => {
                let v = self.evaluate(operand)?;
                ty.convert(v)?
            }
            Expr::Factorial(target) => ops::factorial(&self.evaluate(target)?)?,
            Expr::Power { base, exponent } => {
                let b = self.evaluate(base)?;
                let e = self.evaluate(exponent)?;
                match &b {
                    Value::Object(obj) => self.object_operator(obj, "**", &[e])?,
                    _ => ops::power(&b, &e)?,
                }
            }
            Expr::Index { target, index } => {
                let index = self.evaluate(index)?;
                return self.eval_index(target, index, "[]");
            }
            Expr::KeyIndex { target, key } => {
                let key = Value::Str(self.evaluate(key)?.as_string()?);
                return self.eval_index(target, key, "{}");
            }
            Expr::Call {
                name,
                args,
                builtin,
            } => {
                let args = self.evaluate_args(args)?;
                if let Some(function) = self.symbols.get_function(*name) {
                    self.call_function(&function, args)?
                } else {
                    let cached = match builtin.get() {
                        Some(id) if self.builtins.is_current(id) => Some(id),
                        _ => {
                            let id = self.builtins.resolve(self.names.name(*name));
                            builtin.set(id);
                            id
                        }
                    };
                    match cached {
                        Some(id) => self.builtins.call(id, &args, &mut self.console)?,
                        None => match self.symbols.get_variable(*name).as_ref().and_then(object_of) {
                            Some(obj) => self.object_operator(&obj, "()", &args)?,
                            None => {
                                return Err(ScriptError::unknown(format!(
                                    "unknown function '{}'",
                                    self.names.name(*name)
                                )))
                            }
                        },
                    }
                }
            }
            Expr::Apply { callee, args } => {
                let callee = self.evaluate(callee)?;
                let args = self.evaluate_args(args)?;
                match &callee {
                    Value::Object(obj) => self.object_operator(obj, "()", &args)?,
                    other => {
                        return Err(ScriptError::type_error(format!(
                            "a value of type {} is not callable",
                            other.type_name()
                        )))
                    }
                }
            }
            Expr::Temporary { type_name, args } => {
                let args = self.evaluate_args(args)?;
                let kind = self.decl_type(type_name)?.slot_kind();
                self.construct_value(&kind, &args)?
            }
            Expr::New {
                type_name,
                length,
                args,
            } => {
                let kind = self.decl_type(type_name)?.slot_kind();
                let args = self.evaluate_args(args)?;
                let mut slot = match length {
                    Some(length) => Slot::array(kind.clone(), Some(self.array_length(length)?)),
                    None => Slot::empty(kind.clone()),
                };
                if !args.is_empty() || matches!(kind, SlotKind::Typed(TypeSpec::Object(_))) {
                    self.construct_into(&mut slot, &kind, &args)?;
                }
                Value::Pointer(Pointer::Owned(slot.into_ref()))
            }
            Expr::Property { target, name } => match self.evaluate(target)? {
                Value::Object(obj) => obj.property(name)?,
                other => {
                    return Err(ScriptError::type_error(format!(
                        "a value of type {} has no property '{name}'",
                        other.type_name()
                    )))
                }
            },
            Expr::Method {
                target,
                name,
                args,
                cache,
            } => {
                let receiver = self.evaluate(target)?;
                let args = self.evaluate_args(args)?;
                let obj = match receiver {
                    Value::Object(obj) => obj,
                    other => {
                        return Err(ScriptError::type_error(format!(
                            "a value of type {} has no method '{name}'",
                            other.type_name()
                        )))
                    }
                };
                let method = match cache.get() {
                    Some((id, method)) if id == obj.id() => Some(method),
                    _ => {
                        let method = obj.method_id(name);
                        cache.set(method.map(|m| (obj.id(), m)));
                        method
                    }
                };
                match method {
                    Some(method) => obj.invoke(method, &args, &mut self.console)?,
                    None => obj.invoke_by_name(name, &args, &mut self.console)?,
                }
            }
        };
        Ok(Operand::Value(value))
    }

    fn eval_list_literal(&mut self, items: &[ListItem]) -> ScriptResult<Value> {
        let mut list = List::new();
        for item in items {
            let key = match &item.key {
                Some(key) => Some(self.evaluate(key)?.as_string()?),
                None => None,
            };
            let value = Slot::variant(self.evaluate(&item.value)?).into_ref();
            match key {
                Some(key) => list.push_keyed(&key, value),
                None => list.push(value),
            }
        }
        Ok(Value::List(list))
    }

    // ── Operators ─────────────────────────────────────────────────────────────

    fn object_operator(&mut self, obj: &ObjectRef, symbol: &str, args: &[Value]) -> ScriptResult<Value> {
        match obj.operator(symbol, args, &mut self.console)? {
            Some(v) => Ok(v),
            None => Err(ScriptError::type_error(format!(
                "operator '{symbol}' is not defined for {}",
                obj.type_name()
            ))),
        }
    }

    /// Built-in binary operator, honouring object overrides on the left.
    fn apply_binary(&mut self, op: BinaryOp, lhs: &Value, rhs: &Value) -> ScriptResult<Value> {
        if let Value::Object(obj) = lhs {
            if let Some(v) = obj.operator(op.symbol(), std::slice::from_ref(rhs), &mut self.console)? {
                return Ok(v);
            }
            if !matches!(op, BinaryOp::Eq | BinaryOp::Ne) {
                return Err(ScriptError::type_error(format!(
                    "operator '{}' is not defined for {}",
                    op.symbol(),
                    obj.type_name()
                )));
            }
        }
        ops::binary(op, lhs, rhs)
    }

    fn eval_binary(&mut self, def: &OperatorDef, lhs: &Expr, rhs: &Expr) -> ScriptResult<Operand> {
        let value = match &def.kind {
            BinaryKind::Assign => {
                let place = self.eval_place(lhs)?;
                let value = self.evaluate(rhs)?;
                slot::store(&place, value)?;
                return Ok(Operand::Place(place));
            }
            BinaryKind::Compound(op) => {
                let place = self.eval_place(lhs)?;
                let rhs = self.evaluate(rhs)?;
                let current = place.borrow().value.clone();
                let next = self.apply_binary(*op, &current, &rhs)?;
                slot::store(&place, next)?;
                return Ok(Operand::Place(place));
            }
            BinaryKind::Logical(op) => {
                let l = self.evaluate(lhs)?;
                if matches!(l, Value::List(_) | Value::Object(_)) {
                    let r = self.evaluate(rhs)?;
                    self.apply_binary(*op, &l, &r)?
                } else {
                    let truth = l.as_bool()?;
                    match (op, truth) {
                        (BinaryOp::And, false) => Value::Bool(false),
                        (BinaryOp::Or, true) => Value::Bool(true),
                        _ => {
                            let r = self.evaluate(rhs)?;
                            match r {
                                Value::List(_) => ops::binary(*op, &l, &r)?,
                                other => Value::Bool(other.as_bool()?),
                            }
                        }
                    }
                }
            }
            BinaryKind::Arith(op) => {
                let l = self.evaluate(lhs)?;
                let r = self.evaluate(rhs)?;
                self.apply_binary(*op, &l, &r)?
            }
            BinaryKind::Custom(eval) => {
                let l = self.evaluate(lhs)?;
                let r = self.evaluate(rhs)?;
                match &l {
                    Value::Object(obj) => match obj.operator(&def.symbol, &[r.clone()], &mut self.console)? {
                        Some(v) => v,
                        None => eval(&l, &r)?,
                    },
                    _ => eval(&l, &r)?,
                }
            }
            BinaryKind::Conditional => {
                return Err(ScriptError::structural(format!(
                    "operator '{}' used without ':'",
                    def.symbol
                )))
            }
        };
        Ok(Operand::Value(value))
    }

    // ── Indexing ──────────────────────────────────────────────────────────────

    /// `target[index]` (`symbol` = `"[]"`) or `target{key}` (`"{}"`).  A
    /// string index is a key, an integer index a position.
    fn eval_index(&mut self, target: &Expr, index: Value, symbol: &str) -> ScriptResult<Operand> {
        match self.eval_operand(target)? {
            Operand::Place(place) => {
                if let Some(obj) = object_of(&place) {
                    return Ok(Operand::Value(self.object_operator(&obj, symbol, &[index])?));
                }
                let text = match (&place.borrow().value, &index) {
                    (Value::Str(s), Value::Long(_) | Value::Bool(_) | Value::Double(_)) => Some(s.clone()),
                    _ => None,
                };
                if let Some(text) = text {
                    return Ok(Operand::Value(string_char(&text, index.as_long()?)?));
                }
                let element = match &index {
                    Value::Str(key) => place.borrow_mut().keyed(key)?,
                    other => {
                        let pos = other.as_long()?;
                        place.borrow_mut().element(pos)?
                    }
                };
                Ok(Operand::Place(element))
            }
            Operand::Value(Value::Object(obj)) => {
                Ok(Operand::Value(self.object_operator(&obj, symbol, &[index])?))
            }
            Operand::Value(Value::Str(s)) => Ok(Operand::Value(string_char(&s, index.as_long()?)?)),
            Operand::Value(Value::List(list)) => {
                let slot = match &index {
                    Value::Str(key) => list
                        .get_key(key)
                        .ok_or_else(|| ScriptError::unknown(format!("unknown key \"{key}\"")))?,
                    other => {
                        let n = other.as_long()?;
                        let len = list.len() as i64;
                        let pos = if n < 0 { len + n } else { n };
                        usize::try_from(pos)
                            .ok()
                            .and_then(|p| list.get(p))
                            .ok_or_else(|| {
                                ScriptError::structural(format!("index {n} out of range (length {len})"))
                            })?
                    }
                };
                let value = slot.borrow().value.clone();
                Ok(Operand::Value(value))
            }
            Operand::Value(other) => Err(ScriptError::type_error(format!(
                "cannot index a value of type {}",
                other.type_name()
            ))),
        }
    }
}

// ── Ranges ────────────────────────────────────────────────────────────────────

/// `[first:last:step]`: integers when every bound is an integer, doubles
/// otherwise.  The default step is 1 toward `last`.
pub fn range(first: &Value, last: &Value, step: Option<&Value>) -> ScriptResult<Value> {
    let integral = |v: &Value| matches!(v, Value::Long(_) | Value::Bool(_));
    let all_integral = integral(first) && integral(last) && step.map_or(true, integral);
    let mut list = List::new();

    if all_integral {
        let (a, b) = (first.as_long()?, last.as_long()?);
        let step = match step {
            Some(s) => s.as_long()?,
            None if b >= a => 1,
            None => -1,
        };
        if step == 0 {
            return Err(ScriptError::arithmetic("range step is zero"));
        }
        let mut i = a;
        while (step > 0 && i <= b) || (step < 0 && i >= b) {
            list.push_value(Value::Long(i));
            match i.checked_add(step) {
                Some(next) => i = next,
                None => break,
            }
        }
        return Ok(Value::List(list));
    }

    let (a, b) = (first.as_double()?, last.as_double()?);
    let step = match step {
        Some(s) => s.as_double()?,
        None if b >= a => 1.0,
        None => -1.0,
    };
    if step == 0.0 || !step.is_finite() {
        return Err(ScriptError::arithmetic("range step is zero"));
    }
    let count = ((b - a) / step + 1e-9).floor();
    if count >= 0.0 {
        for k in 0..=(count as i64) {
            list.push_value(Value::Double(a + k as f64 * step));
        }
    }
    Ok(Value::List(list))
}
