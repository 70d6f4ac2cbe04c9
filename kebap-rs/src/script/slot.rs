//! Value slots.
//!
//! A slot is the addressable home of a value: a variable, a list element, an
//! array element, or the target of `new`.  Slots are shared through
//! [`SlotRef`]; a slot reached through a `SlotRef` is a left-value.
//!
//! Typed slots convert whatever is assigned to them; variant slots take the
//! value as is and start out [`Value::Unresolved`].  Array slots hold a list of
//! element slots and keep their declared length across assignments.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::error::{ScriptError, ScriptResult};
use super::list::List;
use super::value::{Complex, Pointer, Value};

pub type SlotRef = Rc<RefCell<Slot>>;

// ── Types ─────────────────────────────────────────────────────────────────────

/// A concrete declared type.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeSpec {
    Bool,
    Long,
    Double,
    Complex,
    Str,
    List,
    Pointer,
    /// Registered object type, by name.
    Object(String),
}

/// What a declaration names: a concrete type, `var`, or `void`.
#[derive(Debug, Clone, PartialEq)]
pub enum DeclType {
    Void,
    Variant,
    Typed(TypeSpec),
}

impl DeclType {
    /// Built-in type keywords.
    pub fn primitive(name: &str) -> Option<DeclType> {
        Some(match name {
            "void" => DeclType::Void,
            "var" | "variant" => DeclType::Variant,
            "bool" => DeclType::Typed(TypeSpec::Bool),
            "int" | "long" | "short" | "char" | "unsigned" => DeclType::Typed(TypeSpec::Long),
            "float" | "double" => DeclType::Typed(TypeSpec::Double),
            "complex" => DeclType::Typed(TypeSpec::Complex),
            "string" => DeclType::Typed(TypeSpec::Str),
            "list" => DeclType::Typed(TypeSpec::List),
            "pointer" => DeclType::Typed(TypeSpec::Pointer),
            _ => return None,
        })
    }

    /// Convert a value to this type (identity for `var`, discard for `void`).
    pub fn convert(&self, value: Value) -> ScriptResult<Value> {
        match self {
            DeclType::Void => Ok(Value::Void),
            DeclType::Variant => Ok(value),
            DeclType::Typed(spec) => spec.convert(value),
        }
    }

    pub fn slot_kind(&self) -> SlotKind {
        match self {
            DeclType::Typed(spec) => SlotKind::Typed(spec.clone()),
            DeclType::Void | DeclType::Variant => SlotKind::Variant,
        }
    }
}

impl fmt::Display for DeclType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeclType::Void => write!(f, "void"),
            DeclType::Variant => write!(f, "var"),
            DeclType::Typed(spec) => write!(f, "{spec}"),
        }
    }
}

impl fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TypeSpec::Bool => "bool",
            TypeSpec::Long => "int",
            TypeSpec::Double => "double",
            TypeSpec::Complex => "complex",
            TypeSpec::Str => "string",
            TypeSpec::List => "list",
            TypeSpec::Pointer => "pointer",
            TypeSpec::Object(name) => name,
        };
        write!(f, "{name}")
    }
}

impl TypeSpec {
    pub fn default_value(&self) -> Value {
        match self {
            TypeSpec::Bool => Value::Bool(false),
            TypeSpec::Long => Value::Long(0),
            TypeSpec::Double => Value::Double(0.0),
            TypeSpec::Complex => Value::Complex(Complex::default()),
            TypeSpec::Str => Value::Str(String::new()),
            TypeSpec::List => Value::List(List::new()),
            TypeSpec::Pointer => Value::Pointer(Pointer::Null),
            TypeSpec::Object(_) => Value::Void,
        }
    }

    pub fn convert(&self, value: Value) -> ScriptResult<Value> {
        let mismatch = |v: &Value| {
            ScriptError::type_error(format!("cannot convert {} to {self}", v.type_name()))
        };
        Ok(match (self, value) {
            (TypeSpec::Bool, v) => Value::Bool(v.as_bool()?),
            (TypeSpec::Long, v) => Value::Long(v.as_long()?),
            (TypeSpec::Double, v) => Value::Double(v.as_double()?),
            (TypeSpec::Complex, v) => Value::Complex(v.as_complex()?),
            (TypeSpec::Str, v) => Value::Str(v.as_string()?),
            (TypeSpec::List, v @ Value::List(_)) => v,
            (TypeSpec::List, Value::Void | Value::Unresolved) => Value::List(List::new()),
            (TypeSpec::Pointer, v @ Value::Pointer(_)) => v,
            (TypeSpec::Pointer, Value::Void | Value::Long(0)) => Value::Pointer(Pointer::Null),
            (TypeSpec::Object(_), v @ (Value::Void | Value::Unresolved)) => v,
            (TypeSpec::Object(name), Value::Object(o)) if o.type_name() == name.as_str() => {
                Value::Object(o)
            }
            (_, v) => return Err(mismatch(&v)),
        })
    }
}

// ── Slot ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum SlotKind {
    Variant,
    Typed(TypeSpec),
}

/// Whether a slot is a declared array.  For arrays, [`Slot::kind`] is the
/// element kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Scalar,
    Array { length: Option<usize> },
}

#[derive(Debug, Clone)]
pub struct Slot {
    pub value: Value,
    pub kind: SlotKind,
    pub shape: Shape,
}

impl Slot {
    pub fn variant(value: Value) -> Self {
        Slot {
            value,
            kind: SlotKind::Variant,
            shape: Shape::Scalar,
        }
    }

    /// Fresh slot of `kind` holding the kind's default value.
    pub fn empty(kind: SlotKind) -> Self {
        let value = match &kind {
            SlotKind::Variant => Value::Unresolved,
            SlotKind::Typed(spec) => spec.default_value(),
        };
        Slot {
            value,
            kind,
            shape: Shape::Scalar,
        }
    }

    /// Array slot with `length` default elements of `kind`.
    pub fn array(kind: SlotKind, length: Option<usize>) -> Self {
        let mut list = List::new();
        for _ in 0..length.unwrap_or(0) {
            list.push(Slot::empty(kind.clone()).into_ref());
        }
        Slot {
            value: Value::List(list),
            kind,
            shape: Shape::Array { length },
        }
    }

    pub fn into_ref(self) -> SlotRef {
        Rc::new(RefCell::new(self))
    }

    pub fn is_array(&self) -> bool {
        matches!(self.shape, Shape::Array { .. })
    }

    /// Kind given to elements created inside this slot's list.
    fn element_kind(&self) -> SlotKind {
        if self.is_array() {
            self.kind.clone()
        } else {
            SlotKind::Variant
        }
    }

    /// Assign, converting to the slot's kind.
    pub fn assign(&mut self, value: Value) -> ScriptResult<()> {
        if let Shape::Array { length } = self.shape {
            let Value::List(source) = value else {
                return Err(ScriptError::type_error(format!(
                    "cannot assign {} to an array",
                    value.type_name()
                )));
            };
            if let Some(n) = length {
                if source.len() != n {
                    return Err(ScriptError::structural(format!(
                        "array length mismatch: expected {n} elements, got {}",
                        source.len()
                    )));
                }
            }
            let mut list = List::new();
            for (i, slot) in source.slots().iter().enumerate() {
                let mut element = Slot::empty(self.kind.clone());
                element.assign(slot.borrow().value.clone())?;
                list.push(element.into_ref());
                if let Some(key) = source.key_of(i) {
                    list.set_key(i, key);
                }
            }
            self.value = Value::List(list);
            return Ok(());
        }
        self.value = match &self.kind {
            SlotKind::Variant => value,
            SlotKind::Typed(spec) => spec.convert(value)?,
        };
        Ok(())
    }

    /// This slot's list, turning an unresolved variant into an empty list.
    pub fn list_mut(&mut self) -> ScriptResult<&mut List> {
        if self.kind == SlotKind::Variant && self.value.is_void() {
            self.value = Value::List(List::new());
        }
        match &mut self.value {
            Value::List(list) => Ok(list),
            other => Err(ScriptError::type_error(format!(
                "cannot index a value of type {}",
                other.type_name()
            ))),
        }
    }

    /// Element at position `index`; negative counts from the end, indices
    /// past the end grow the list unless this is a sized array.
    pub fn element(&mut self, index: i64) -> ScriptResult<SlotRef> {
        let fixed = matches!(self.shape, Shape::Array { length: Some(_) });
        let kind = self.element_kind();
        let list = self.list_mut()?;
        let len = list.len() as i64;
        let pos = if index < 0 { len + index } else { index };
        if pos < 0 || (fixed && pos >= len) {
            return Err(ScriptError::structural(format!(
                "index {index} out of range (length {len})"
            )));
        }
        let pos = pos as usize;
        while list.len() <= pos {
            list.push(Slot::empty(kind.clone()).into_ref());
        }
        list.get(pos)
            .ok_or_else(|| ScriptError::structural(format!("index {index} out of range")))
    }

    /// Element stored under `key`, appended when missing.
    pub fn keyed(&mut self, key: &str) -> ScriptResult<SlotRef> {
        let kind = self.element_kind();
        let list = self.list_mut()?;
        if let Some(slot) = list.get_key(key) {
            return Ok(slot);
        }
        let slot = Slot::empty(kind).into_ref();
        list.push_keyed(key, Rc::clone(&slot));
        Ok(slot)
    }
}

// ── Storing ───────────────────────────────────────────────────────────────────

/// Assign `value` to the slot behind `dest`, rejecting owning-pointer cycles.
pub fn store(dest: &SlotRef, value: Value) -> ScriptResult<()> {
    if reaches(&value, dest) {
        return Err(ScriptError::structural(
            "assignment would create a reference cycle",
        ));
    }
    let mut slot = dest
        .try_borrow_mut()
        .map_err(|_| ScriptError::structural("slot is in use"))?;
    slot.assign(value)
}

/// `true` if `dest` can be reached from `value` through owning pointers or
/// list elements.
fn reaches(value: &Value, dest: &SlotRef) -> bool {
    match value {
        Value::Pointer(Pointer::Owned(target)) => {
            Rc::ptr_eq(target, dest)
                || target.try_borrow().is_ok_and(|t| reaches(&t.value, dest))
        }
        Value::List(list) => list.slots().iter().any(|slot| {
            Rc::ptr_eq(slot, dest) || slot.try_borrow().is_ok_and(|s| reaches(&s.value, dest))
        }),
        _ => false,
    }
}
