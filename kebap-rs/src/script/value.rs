//! Runtime value type.
//!
//! A [`Value`] is a tagged variant; slots (see [`super::slot`]) hold values
//! and give them an address.  Objects are shared through [`ObjectRef`]
//! (reference counted), lists own their element slots, and pointers either
//! own their target (`new`) or merely observe it (`&x`).

use std::cell::RefCell;
use std::fmt;
use std::ops;
use std::rc::{Rc, Weak};

use super::error::{ScriptError, ScriptResult};
use super::list::List;
use super::object::ObjectRef;
use super::slot::{Slot, SlotRef};

// ── Complex ───────────────────────────────────────────────────────────────────

/// A complex number with `f64` components.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Complex {
    pub re: f64,
    pub im: f64,
}

impl Complex {
    pub const fn new(re: f64, im: f64) -> Self {
        Complex { re, im }
    }

    pub fn is_zero(self) -> bool {
        self.re == 0.0 && self.im == 0.0
    }

    pub fn norm(self) -> f64 {
        self.re.hypot(self.im)
    }

    pub fn arg(self) -> f64 {
        self.im.atan2(self.re)
    }

    pub fn conj(self) -> Self {
        Complex::new(self.re, -self.im)
    }

    pub fn from_polar(r: f64, theta: f64) -> Self {
        Complex::new(r * theta.cos(), r * theta.sin())
    }

    pub fn exp(self) -> Self {
        Complex::from_polar(self.re.exp(), self.im)
    }

    pub fn ln(self) -> Self {
        Complex::new(self.norm().ln(), self.arg())
    }

    pub fn sqrt(self) -> Self {
        Complex::from_polar(self.norm().sqrt(), self.arg() / 2.0)
    }

    pub fn powc(self, exp: Complex) -> Self {
        if self.is_zero() {
            return if exp.is_zero() { Complex::new(1.0, 0.0) } else { Complex::default() };
        }
        (self.ln() * exp).exp()
    }

    pub fn sin(self) -> Self {
        Complex::new(self.re.sin() * self.im.cosh(), self.re.cos() * self.im.sinh())
    }

    pub fn cos(self) -> Self {
        Complex::new(self.re.cos() * self.im.cosh(), -(self.re.sin() * self.im.sinh()))
    }
}

impl ops::Add for Complex {
    type Output = Complex;
    fn add(self, rhs: Complex) -> Complex {
        Complex::new(self.re + rhs.re, self.im + rhs.im)
    }
}

impl ops::Sub for Complex {
    type Output = Complex;
    fn sub(self, rhs: Complex) -> Complex {
        Complex::new(self.re - rhs.re, self.im - rhs.im)
    }
}

impl ops::Mul for Complex {
    type Output = Complex;
    fn mul(self, rhs: Complex) -> Complex {
        Complex::new(
            self.re * rhs.re - self.im * rhs.im,
            self.re * rhs.im + self.im * rhs.re,
        )
    }
}

impl ops::Div for Complex {
    type Output = Complex;
    fn div(self, rhs: Complex) -> Complex {
        let d = rhs.re * rhs.re + rhs.im * rhs.im;
        Complex::new(
            (self.re * rhs.re + self.im * rhs.im) / d,
            (self.im * rhs.re - self.re * rhs.im) / d,
        )
    }
}

impl ops::Neg for Complex {
    type Output = Complex;
    fn neg(self) -> Complex {
        Complex::new(-self.re, -self.im)
    }
}

impl fmt::Display for Complex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", format_double(self.re), format_double(self.im))
    }
}

// ── Pointer ───────────────────────────────────────────────────────────────────

/// A pointer value.
///
/// `Owned` pointers come from `new` and keep their target alive; `Borrowed`
/// pointers come from `&x` and become dangling once `x` is released.
#[derive(Clone, Default)]
pub enum Pointer {
    Owned(SlotRef),
    Borrowed(Weak<RefCell<Slot>>),
    #[default]
    Null,
}

impl Pointer {
    pub fn is_null(&self) -> bool {
        match self {
            Pointer::Null => true,
            Pointer::Borrowed(w) => w.strong_count() == 0,
            Pointer::Owned(_) => false,
        }
    }

    /// The slot this pointer refers to.
    pub fn target(&self) -> ScriptResult<SlotRef> {
        match self {
            Pointer::Owned(slot) => Ok(Rc::clone(slot)),
            Pointer::Borrowed(w) => w
                .upgrade()
                .ok_or_else(|| ScriptError::type_error("dangling pointer dereference")),
            Pointer::Null => Err(ScriptError::type_error("null pointer dereference")),
        }
    }

    fn address(&self) -> Option<*const RefCell<Slot>> {
        match self {
            Pointer::Owned(slot) => Some(Rc::as_ptr(slot)),
            Pointer::Borrowed(w) if w.strong_count() > 0 => Some(w.as_ptr()),
            _ => None,
        }
    }

    pub fn same_target(&self, other: &Pointer) -> bool {
        self.address() == other.address()
    }
}

impl fmt::Debug for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pointer::Owned(slot) => write!(f, "Owned({:p})", Rc::as_ptr(slot)),
            Pointer::Borrowed(w) => write!(f, "Borrowed({:p})", w.as_ptr()),
            Pointer::Null => write!(f, "Null"),
        }
    }
}

// ── Value ─────────────────────────────────────────────────────────────────────

/// A runtime value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Void,
    /// Kind not yet fixed (fresh variant slot).
    Unresolved,
    Bool(bool),
    Long(i64),
    Double(f64),
    Complex(Complex),
    Str(String),
    Object(ObjectRef),
    Pointer(Pointer),
    List(List),
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Long(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Double(x)
    }
}

impl From<Complex> for Value {
    fn from(c: Complex) -> Self {
        Value::Complex(c)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<List> for Value {
    fn from(l: List) -> Self {
        Value::List(l)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Void, Value::Void) | (Value::Unresolved, Value::Unresolved) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Complex(a), Value::Complex(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Pointer(a), Value::Pointer(b)) => a.same_target(b),
            (Value::List(a), Value::List(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    /// Name reported by `typeof`.
    pub fn type_name(&self) -> String {
        match self {
            Value::Void => "void".into(),
            Value::Unresolved => "var".into(),
            Value::Bool(_) => "bool".into(),
            Value::Long(_) => "int".into(),
            Value::Double(_) => "double".into(),
            Value::Complex(_) => "complex".into(),
            Value::Str(_) => "string".into(),
            Value::Object(o) => o.type_name().to_owned(),
            Value::Pointer(_) => "pointer".into(),
            Value::List(_) => "list".into(),
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Value::Void | Value::Unresolved)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Value::Bool(_) | Value::Long(_) | Value::Double(_) | Value::Complex(_)
        )
    }

    pub fn as_list(&self) -> Option<&List> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    fn conversion_error(&self, target: &str) -> ScriptError {
        ScriptError::type_error(format!("cannot convert {} to {target}", self.type_name()))
    }

    // ── Conversions ───────────────────────────────────────────────────────────

    pub fn as_bool(&self) -> ScriptResult<bool> {
        Ok(match self {
            Value::Void | Value::Unresolved => false,
            Value::Bool(b) => *b,
            Value::Long(n) => *n != 0,
            Value::Double(x) => *x != 0.0,
            Value::Complex(c) => !c.is_zero(),
            Value::Str(s) => match parse_number(s) {
                Some(v) => v.as_bool()?,
                None => !s.is_empty(),
            },
            Value::Pointer(p) => !p.is_null(),
            Value::Object(_) | Value::List(_) => return Err(self.conversion_error("bool")),
        })
    }

    pub fn as_long(&self) -> ScriptResult<i64> {
        Ok(match self {
            Value::Void | Value::Unresolved => 0,
            Value::Bool(b) => i64::from(*b),
            Value::Long(n) => *n,
            Value::Double(x) => *x as i64,
            Value::Complex(c) => c.re as i64,
            Value::Str(s) => match parse_number(s) {
                Some(v) => v.as_long()?,
                None => return Err(self.string_error(s, "int")),
            },
            _ => return Err(self.conversion_error("int")),
        })
    }

    pub fn as_double(&self) -> ScriptResult<f64> {
        Ok(match self {
            Value::Void | Value::Unresolved => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Long(n) => *n as f64,
            Value::Double(x) => *x,
            Value::Complex(c) => c.re,
            Value::Str(s) => match parse_number(s) {
                Some(v) => v.as_double()?,
                None => return Err(self.string_error(s, "double")),
            },
            _ => return Err(self.conversion_error("double")),
        })
    }

    pub fn as_complex(&self) -> ScriptResult<Complex> {
        Ok(match self {
            Value::Complex(c) => *c,
            Value::Str(s) => match parse_number(s) {
                Some(v) => v.as_complex()?,
                None => return Err(self.string_error(s, "complex")),
            },
            other => Complex::new(other.as_double()?, 0.0),
        })
    }

    pub fn as_string(&self) -> ScriptResult<String> {
        match self {
            Value::Object(_) | Value::Pointer(_) | Value::List(_) => {
                Err(self.conversion_error("string"))
            }
            other => Ok(other.to_string()),
        }
    }

    fn string_error(&self, s: &str, target: &str) -> ScriptError {
        ScriptError::type_error(format!("cannot convert \"{s}\" to {target}"))
    }

    fn fmt_nested(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "\"{s}\""),
            other => write!(f, "{other}"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void | Value::Unresolved => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Long(n) => write!(f, "{n}"),
            Value::Double(x) => write!(f, "{}", format_double(*x)),
            Value::Complex(c) => write!(f, "{c}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Object(o) => write!(f, "<{}>", o.type_name()),
            Value::Pointer(p) if p.is_null() => write!(f, "null"),
            Value::Pointer(_) => write!(f, "<pointer>"),
            Value::List(list) => {
                write!(f, "{{")?;
                for (i, slot) in list.slots().iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    if let Some(key) = list.key_of(i) {
                        write!(f, "\"{key}\"=>")?;
                    }
                    slot.borrow().value.fmt_nested(f)?;
                }
                write!(f, "}}")
            }
        }
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Format a double the way C's `%g` does (six significant digits).
pub fn format_double(x: f64) -> String {
    format_general(x, 6)
}

/// `%.{significant}g` formatting.
pub fn format_general(x: f64, significant: usize) -> String {
    if x.is_nan() {
        return "nan".into();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf".into() } else { "-inf".into() };
    }
    if x == 0.0 {
        return if x.is_sign_negative() { "-0".into() } else { "0".into() };
    }
    let precision = significant.max(1) - 1;
    let sci = format!("{x:.precision$e}");
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m.to_owned(), e.parse::<i32>().unwrap_or(0)),
        None => (sci.clone(), 0),
    };
    if exp < -4 || exp >= significant.max(1) as i32 {
        let sign = if exp < 0 { '-' } else { '+' };
        return format!("{}e{sign}{:02}", trim_zeros(&mantissa), exp.abs());
    }
    let decimals = (precision as i32 - exp).max(0) as usize;
    trim_zeros(&format!("{x:.decimals$}"))
}

fn trim_zeros(s: &str) -> String {
    if !s.contains('.') {
        return s.to_owned();
    }
    s.trim_end_matches('0').trim_end_matches('.').to_owned()
}

/// Parse a complete numeric string (surrounding whitespace allowed).
pub fn parse_number(s: &str) -> Option<Value> {
    let t = s.trim();
    if t.is_empty() {
        return None;
    }
    if let Ok(n) = t.parse::<i64>() {
        return Some(Value::Long(n));
    }
    if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).ok().map(Value::Long);
    }
    let looks_numeric = t
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'));
    if looks_numeric {
        return t.parse::<f64>().ok().map(Value::Double);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_display_matches_printf_g() {
        assert_eq!(format_double(2.5), "2.5");
        assert_eq!(format_double(1.0 / 3.0), "0.333333");
        assert_eq!(format_double(100.0), "100");
        assert_eq!(format_double(1234567.0), "1.23457e+06");
        assert_eq!(format_double(0.0001), "0.0001");
        assert_eq!(format_double(0.00001), "1e-05");
        assert_eq!(format_double(-42.125), "-42.125");
    }

    #[test]
    fn complex_display() {
        assert_eq!(Value::Complex(Complex::new(1.0, -2.5)).to_string(), "(1,-2.5)");
    }

    #[test]
    fn string_conversion_requires_whole_number() {
        assert_eq!(Value::from("42").as_long().unwrap(), 42);
        assert_eq!(Value::from(" 2.5 ").as_double().unwrap(), 2.5);
        assert!(Value::from("42abc").as_long().is_err());
        assert!(Value::from("").as_double().is_err());
    }

    #[test]
    fn list_conversion_fails() {
        let v = Value::List(List::new());
        assert!(v.as_long().is_err());
        assert!(v.as_string().is_err());
    }

    #[test]
    fn numeric_conversions() {
        assert_eq!(Value::Double(3.9).as_long().unwrap(), 3);
        assert_eq!(Value::Bool(true).as_double().unwrap(), 1.0);
        assert_eq!(Value::Void.as_long().unwrap(), 0);
        assert!(!Value::Long(0).as_bool().unwrap());
        assert_eq!(Value::Long(2).as_complex().unwrap(), Complex::new(2.0, 0.0));
    }

    #[test]
    fn complex_arithmetic() {
        let i = Complex::new(0.0, 1.0);
        assert_eq!(i * i, Complex::new(-1.0, 0.0));
        let q = Complex::new(1.0, 1.0) / Complex::new(1.0, 1.0);
        assert!((q.re - 1.0).abs() < 1e-12 && q.im.abs() < 1e-12);
        let r = Complex::new(-4.0, 0.0).sqrt();
        assert!(r.re.abs() < 1e-12 && (r.im - 2.0).abs() < 1e-12);
    }

    #[test]
    fn dangling_pointer_is_an_error() {
        let slot = Slot::variant(Value::Long(1)).into_ref();
        let p = Pointer::Borrowed(Rc::downgrade(&slot));
        assert!(p.target().is_ok());
        drop(slot);
        assert!(p.target().is_err());
        assert!(p.is_null());
    }
}
