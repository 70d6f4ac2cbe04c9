//! Builtin function table and the standard function libraries.
//!
//! A function library is an [`ObjectPrototype`] whose methods are the
//! functions it provides.  The [`BuiltinFunctionTable`] resolves a name by
//! scanning libraries newest first, so a library registered later overrides
//! same-named functions of earlier ones.  Call nodes cache the resulting
//! [`FunctionId`] after the first lookup.

use std::iter::Peekable;
use std::str::Chars;
use std::time::{SystemTime, UNIX_EPOCH};

use super::error::{ScriptError, ScriptResult};
use super::list::List;
use super::object::{Console, ObjectHandle, ObjectPrototype, ObjectRef};
use super::ops;
use super::value::{format_general, Complex, Value};

/// Resolved builtin: library position and method id within it, tagged with
/// the table generation it was resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionId {
    pub library: usize,
    pub method: usize,
    pub generation: u64,
}

#[derive(Debug, Default)]
pub struct BuiltinFunctionTable {
    libraries: Vec<ObjectRef>,
    /// Bumped by every `register`; older ids may be shadowed.
    generation: u64,
}

impl BuiltinFunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with the `math`, `string`, `list` and `system` libraries.
    pub fn standard() -> Self {
        let mut table = Self::new();
        table.register(Box::new(MathLibrary));
        table.register(Box::new(StringLibrary));
        table.register(Box::new(ListLibrary));
        table.register(Box::new(SystemLibrary));
        table
    }

    pub fn register(&mut self, library: Box<dyn ObjectPrototype>) {
        tracing::debug!(library = library.type_name(), "registering function library");
        self.libraries.push(ObjectHandle::wrap(library));
        self.generation += 1;
    }

    /// True when `id` still names what `resolve` would return now.
    pub fn is_current(&self, id: FunctionId) -> bool {
        id.generation == self.generation
    }

    pub fn resolve(&self, name: &str) -> Option<FunctionId> {
        self.libraries
            .iter()
            .enumerate()
            .rev()
            .find_map(|(library, lib)| {
                lib.method_id(name).map(|method| FunctionId {
                    library,
                    method,
                    generation: self.generation,
                })
            })
    }

    pub fn call(&self, id: FunctionId, args: &[Value], console: &mut Console) -> ScriptResult<Value> {
        let lib = self
            .libraries
            .get(id.library)
            .ok_or_else(|| ScriptError::unknown(format!("unknown function library #{}", id.library)))?;
        lib.invoke(id.method, args, console)
    }

    pub fn call_by_name(&self, name: &str, args: &[Value], console: &mut Console) -> ScriptResult<Value> {
        match self.resolve(name) {
            Some(id) => self.call(id, args, console),
            None => Err(ScriptError::unknown(format!("unknown function '{name}'"))),
        }
    }
}

// ── Argument helpers ──────────────────────────────────────────────────────────

fn method_name(names: &[&'static str], method: usize) -> ScriptResult<&'static str> {
    names
        .get(method)
        .copied()
        .ok_or_else(|| ScriptError::unknown(format!("unknown function #{method}")))
}

fn expect_args(args: &[Value], count: usize, name: &str) -> ScriptResult<()> {
    if args.len() == count {
        Ok(())
    } else {
        Err(ScriptError::type_error(format!(
            "{name}() expects {count} argument{}, got {}",
            if count == 1 { "" } else { "s" },
            args.len()
        )))
    }
}

fn expect_range(args: &[Value], min: usize, max: usize, name: &str) -> ScriptResult<()> {
    if (min..=max).contains(&args.len()) {
        Ok(())
    } else {
        Err(ScriptError::type_error(format!(
            "{name}() expects {min} to {max} arguments, got {}",
            args.len()
        )))
    }
}

fn get_str(args: &[Value], idx: usize, name: &str) -> ScriptResult<String> {
    args.get(idx)
        .ok_or_else(|| ScriptError::type_error(format!("{name}(): missing argument {}", idx + 1)))?
        .as_string()
}

fn get_long(args: &[Value], idx: usize, name: &str) -> ScriptResult<i64> {
    args.get(idx)
        .ok_or_else(|| ScriptError::type_error(format!("{name}(): missing argument {}", idx + 1)))?
        .as_long()
}

fn get_list<'a>(args: &'a [Value], idx: usize, name: &str) -> ScriptResult<&'a List> {
    match args.get(idx) {
        Some(Value::List(l)) => Ok(l),
        Some(other) => Err(ScriptError::type_error(format!(
            "{name}(): argument {} must be a list, got {}",
            idx + 1,
            other.type_name()
        ))),
        None => Err(ScriptError::type_error(format!("{name}(): missing argument {}", idx + 1))),
    }
}

// ── math ──────────────────────────────────────────────────────────────────────

const MATH_FUNCTIONS: &[&str] = &[
    "sin", "cos", "tan", "asin", "acos", "atan", "atan2", "sinh", "cosh", "tanh", "exp", "log",
    "log10", "sqrt", "abs", "pow", "ceil", "floor", "round", "trunc", "real", "imag", "arg",
    "conj", "min", "max", "sum", "mean", "deviation",
];

pub struct MathLibrary;

impl ObjectPrototype for MathLibrary {
    fn type_name(&self) -> &str {
        "math"
    }

    fn clone_object(&self) -> Box<dyn ObjectPrototype> {
        Box::new(MathLibrary)
    }

    fn method_names(&self) -> &[&'static str] {
        MATH_FUNCTIONS
    }

    fn invoke(&mut self, method: usize, args: &[Value], _console: &mut Console) -> ScriptResult<Value> {
        math_call(method_name(MATH_FUNCTIONS, method)?, args)
    }
}

fn real_function(name: &str) -> Option<fn(f64) -> f64> {
    Some(match name {
        "sin" => f64::sin,
        "cos" => f64::cos,
        "tan" => f64::tan,
        "asin" => f64::asin,
        "acos" => f64::acos,
        "atan" => f64::atan,
        "sinh" => f64::sinh,
        "cosh" => f64::cosh,
        "tanh" => f64::tanh,
        "exp" => f64::exp,
        "log" => f64::ln,
        "log10" => f64::log10,
        "sqrt" => f64::sqrt,
        "ceil" => f64::ceil,
        "floor" => f64::floor,
        "round" => f64::round,
        "trunc" => f64::trunc,
        _ => return None,
    })
}

fn complex_function(name: &str) -> Option<fn(Complex) -> Complex> {
    Some(match name {
        "sin" => Complex::sin,
        "cos" => Complex::cos,
        "exp" => Complex::exp,
        "log" => Complex::ln,
        "sqrt" => Complex::sqrt,
        "conj" => Complex::conj,
        _ => return None,
    })
}

/// Apply a one-argument math function, recursing into lists.
fn math_unary(name: &str, v: &Value) -> ScriptResult<Value> {
    if let Value::List(list) = v {
        return ops::map_list(list, |x| math_unary(name, x));
    }
    match (name, v) {
        ("abs", Value::Long(n)) => return Ok(Value::Long(n.wrapping_abs())),
        ("abs", Value::Complex(c)) => return Ok(Value::Double(c.norm())),
        ("ceil" | "floor" | "round" | "trunc", Value::Long(n)) => return Ok(Value::Long(*n)),
        ("real", _) => return Ok(Value::Double(v.as_complex()?.re)),
        ("imag", _) => return Ok(Value::Double(v.as_complex()?.im)),
        ("arg", _) => return Ok(Value::Double(v.as_complex()?.arg())),
        ("conj", Value::Complex(c)) => return Ok(Value::Complex(c.conj())),
        ("conj", other) => return Ok(Value::Double(other.as_double()?)),
        (_, Value::Complex(c)) => {
            return match complex_function(name) {
                Some(f) => Ok(Value::Complex(f(*c))),
                None => Err(ScriptError::type_error(format!(
                    "{name}() does not accept complex arguments"
                ))),
            }
        }
        _ => {}
    }
    if name == "abs" {
        return Ok(Value::Double(v.as_double()?.abs()));
    }
    let f = real_function(name)
        .ok_or_else(|| ScriptError::unknown(format!("unknown function '{name}'")))?;
    Ok(Value::Double(f(v.as_double()?)))
}

/// Every scalar in `args`, descending into nested lists at any position.
fn flatten(args: &[Value], out: &mut Vec<Value>) {
    for v in args {
        match v {
            Value::List(list) => flatten(&list.values(), out),
            scalar => out.push(scalar.clone()),
        }
    }
}

fn math_call(name: &str, args: &[Value]) -> ScriptResult<Value> {
    match name {
        "atan2" => {
            expect_args(args, 2, name)?;
            ops::broadcast(&args[0], &args[1], name, &mut |y, x| {
                Ok(Value::Double(y.as_double()?.atan2(x.as_double()?)))
            })
        }
        "pow" => {
            expect_args(args, 2, name)?;
            ops::broadcast(&args[0], &args[1], name, &mut |b, e| {
                if matches!(b, Value::Complex(_)) || matches!(e, Value::Complex(_)) {
                    Ok(Value::Complex(b.as_complex()?.powc(e.as_complex()?)))
                } else {
                    Ok(Value::Double(b.as_double()?.powf(e.as_double()?)))
                }
            })
        }
        "min" | "max" | "sum" | "mean" | "deviation" => {
            let mut values = Vec::new();
            flatten(args, &mut values);
            reduce(name, &values)
        }
        _ => {
            expect_args(args, 1, name)?;
            math_unary(name, &args[0])
        }
    }
}

fn reduce(name: &str, values: &[Value]) -> ScriptResult<Value> {
    if values.is_empty() {
        return Err(ScriptError::arithmetic(format!("{name}() of an empty list")));
    }
    match name {
        "min" | "max" => {
            let mut best = &values[0];
            for v in &values[1..] {
                let ord = ops::compare(v, best);
                let better = if name == "min" { ord.is_lt() } else { ord.is_gt() };
                if better {
                    best = v;
                }
            }
            Ok(best.clone())
        }
        "sum" => {
            let mut acc = Value::Long(0);
            for v in values {
                acc = ops::binary(ops::BinaryOp::Add, &acc, v)?;
            }
            Ok(acc)
        }
        "mean" => Ok(Value::Double(mean(values)?)),
        _ => {
            if values.len() < 2 {
                return Ok(Value::Double(0.0));
            }
            let m = mean(values)?;
            let mut sq = 0.0;
            for v in values {
                let d = v.as_double()? - m;
                sq += d * d;
            }
            Ok(Value::Double((sq / (values.len() - 1) as f64).sqrt()))
        }
    }
}

fn mean(values: &[Value]) -> ScriptResult<f64> {
    let mut total = 0.0;
    for v in values {
        total += v.as_double()?;
    }
    Ok(total / values.len() as f64)
}

// ── string ────────────────────────────────────────────────────────────────────

const STRING_FUNCTIONS: &[&str] = &[
    "strlen", "substr", "strstr", "toupper", "tolower", "trim", "split", "join", "replace",
    "sprintf",
];

pub struct StringLibrary;

impl ObjectPrototype for StringLibrary {
    fn type_name(&self) -> &str {
        "string"
    }

    fn clone_object(&self) -> Box<dyn ObjectPrototype> {
        Box::new(StringLibrary)
    }

    fn method_names(&self) -> &[&'static str] {
        STRING_FUNCTIONS
    }

    fn invoke(&mut self, method: usize, args: &[Value], _console: &mut Console) -> ScriptResult<Value> {
        let name = method_name(STRING_FUNCTIONS, method)?;
        Ok(match name {
            "strlen" => {
                expect_args(args, 1, name)?;
                Value::Long(get_str(args, 0, name)?.chars().count() as i64)
            }
            "substr" => {
                expect_range(args, 2, 3, name)?;
                let chars: Vec<char> = get_str(args, 0, name)?.chars().collect();
                let start = (get_long(args, 1, name)?.max(0) as usize).min(chars.len());
                let end = match args.get(2) {
                    Some(len) => start.saturating_add(len.as_long()?.max(0) as usize).min(chars.len()),
                    None => chars.len(),
                };
                Value::Str(chars[start..end].iter().collect())
            }
            "strstr" => {
                expect_args(args, 2, name)?;
                let haystack = get_str(args, 0, name)?;
                let needle = get_str(args, 1, name)?;
                match haystack.find(&needle) {
                    Some(byte) => Value::Long(haystack[..byte].chars().count() as i64),
                    None => Value::Long(-1),
                }
            }
            "toupper" => {
                expect_args(args, 1, name)?;
                Value::Str(get_str(args, 0, name)?.to_uppercase())
            }
            "tolower" => {
                expect_args(args, 1, name)?;
                Value::Str(get_str(args, 0, name)?.to_lowercase())
            }
            "trim" => {
                expect_args(args, 1, name)?;
                Value::Str(get_str(args, 0, name)?.trim().to_owned())
            }
            "split" => {
                expect_range(args, 1, 2, name)?;
                let s = get_str(args, 0, name)?;
                let parts: Vec<Value> = match args.get(1) {
                    Some(sep) => {
                        let sep = sep.as_string()?;
                        if sep.is_empty() {
                            s.chars().map(|c| Value::Str(c.to_string())).collect()
                        } else {
                            s.split(sep.as_str()).map(Value::from).collect()
                        }
                    }
                    None => s.split_whitespace().map(Value::from).collect(),
                };
                Value::List(List::from_values(parts))
            }
            "join" => {
                expect_range(args, 1, 2, name)?;
                let list = get_list(args, 0, name)?;
                let sep = match args.get(1) {
                    Some(sep) => sep.as_string()?,
                    None => String::new(),
                };
                let parts: Vec<String> = list.values().iter().map(ToString::to_string).collect();
                Value::Str(parts.join(&sep))
            }
            "replace" => {
                expect_args(args, 3, name)?;
                let s = get_str(args, 0, name)?;
                let from = get_str(args, 1, name)?;
                if from.is_empty() {
                    return Err(ScriptError::type_error("replace(): empty search string"));
                }
                Value::Str(s.replace(&from, &get_str(args, 2, name)?))
            }
            _ => {
                if args.is_empty() {
                    return Err(ScriptError::type_error("sprintf() expects a format string"));
                }
                Value::Str(sprintf(&get_str(args, 0, name)?, &args[1..])?)
            }
        })
    }
}

#[derive(Default)]
struct Spec {
    left: bool,
    zero: bool,
    plus: bool,
    space: bool,
    width: usize,
    precision: Option<usize>,
}

impl Spec {
    fn pad(&self, body: String, numeric: bool) -> String {
        let len = body.chars().count();
        if len >= self.width {
            return body;
        }
        let fill = self.width - len;
        if self.left {
            format!("{body}{}", " ".repeat(fill))
        } else if self.zero && numeric {
            let (sign, digits) = match body.chars().next() {
                Some(c @ ('-' | '+' | ' ')) => (c.to_string(), body[1..].to_owned()),
                _ => (String::new(), body),
            };
            format!("{sign}{}{digits}", "0".repeat(fill))
        } else {
            format!("{}{body}", " ".repeat(fill))
        }
    }

    fn sign(&self, negative: bool, body: String) -> String {
        if negative {
            body
        } else if self.plus {
            format!("+{body}")
        } else if self.space {
            format!(" {body}")
        } else {
            body
        }
    }
}

/// C-style exponent notation: `1.500000e+03`.
fn c_exponent(x: f64, precision: usize) -> String {
    let s = format!("{x:.precision$e}");
    match s.split_once('e') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{mantissa}e{sign}{:02}", exp.abs())
        }
        None => s,
    }
}

/// Largest field width or precision `sprintf` accepts.
const MAX_FIELD: usize = 4096;

/// Decimal digits of a width or precision, at most [`MAX_FIELD`].
fn field_number(chars: &mut Peekable<Chars<'_>>, what: &str) -> ScriptResult<usize> {
    let mut n: usize = 0;
    while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
        n = n
            .checked_mul(10)
            .and_then(|n| n.checked_add(d as usize))
            .filter(|n| *n <= MAX_FIELD)
            .ok_or_else(|| ScriptError::type_error(format!("sprintf(): {what} larger than {MAX_FIELD}")))?;
        chars.next();
    }
    Ok(n)
}

/// `printf`-style formatting of `args` according to `fmt`.
pub fn sprintf(fmt: &str, args: &[Value]) -> ScriptResult<String> {
    let mut out = String::new();
    let mut chars = fmt.chars().peekable();
    let mut next_arg = args.iter();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }
        let mut spec = Spec::default();
        while let Some(&f) = chars.peek() {
            match f {
                '-' => spec.left = true,
                '0' => spec.zero = true,
                '+' => spec.plus = true,
                ' ' => spec.space = true,
                '#' => {}
                _ => break,
            }
            chars.next();
        }
        spec.width = field_number(&mut chars, "width")?;
        if chars.peek() == Some(&'.') {
            chars.next();
            spec.precision = Some(field_number(&mut chars, "precision")?);
        }
        let Some(conv) = chars.next() else {
            return Err(ScriptError::type_error("sprintf(): incomplete format specifier"));
        };
        let arg = next_arg
            .next()
            .ok_or_else(|| ScriptError::type_error(format!("sprintf(): missing argument for '%{conv}'")))?;
        let text = match conv {
            'd' | 'i' | 'u' => {
                let n = arg.as_long()?;
                spec.pad(spec.sign(n < 0, n.to_string()), true)
            }
            'x' => spec.pad(format!("{:x}", arg.as_long()?), true),
            'X' => spec.pad(format!("{:X}", arg.as_long()?), true),
            'o' => spec.pad(format!("{:o}", arg.as_long()?), true),
            'c' => {
                let ch = match arg {
                    Value::Str(s) => s.chars().next().unwrap_or(' '),
                    other => char::from_u32(other.as_long()? as u32).unwrap_or('?'),
                };
                spec.pad(ch.to_string(), false)
            }
            's' => {
                let mut s = arg.to_string();
                if let Some(p) = spec.precision {
                    s = s.chars().take(p).collect();
                }
                spec.pad(s, false)
            }
            'f' | 'F' => {
                let x = arg.as_double()?;
                let p = spec.precision.unwrap_or(6);
                spec.pad(spec.sign(x < 0.0, format!("{x:.p$}")), true)
            }
            'e' | 'E' => {
                let x = arg.as_double()?;
                let mut s = c_exponent(x, spec.precision.unwrap_or(6));
                if conv == 'E' {
                    s = s.to_uppercase();
                }
                spec.pad(spec.sign(x < 0.0, s), true)
            }
            'g' | 'G' => {
                let x = arg.as_double()?;
                let mut s = format_general(x, spec.precision.unwrap_or(6).max(1));
                if conv == 'G' {
                    s = s.to_uppercase();
                }
                spec.pad(spec.sign(x < 0.0, s), true)
            }
            other => {
                return Err(ScriptError::type_error(format!(
                    "sprintf(): unknown conversion '%{other}'"
                )))
            }
        };
        out.push_str(&text);
    }
    Ok(out)
}

// ── list ──────────────────────────────────────────────────────────────────────

const LIST_FUNCTIONS: &[&str] = &["length", "sort", "reverse", "haskey", "append"];

pub struct ListLibrary;

impl ObjectPrototype for ListLibrary {
    fn type_name(&self) -> &str {
        "list"
    }

    fn clone_object(&self) -> Box<dyn ObjectPrototype> {
        Box::new(ListLibrary)
    }

    fn method_names(&self) -> &[&'static str] {
        LIST_FUNCTIONS
    }

    fn invoke(&mut self, method: usize, args: &[Value], _console: &mut Console) -> ScriptResult<Value> {
        let name = method_name(LIST_FUNCTIONS, method)?;
        Ok(match name {
            "length" => {
                expect_args(args, 1, name)?;
                match &args[0] {
                    Value::List(l) => Value::Long(l.len() as i64),
                    Value::Str(s) => Value::Long(s.chars().count() as i64),
                    Value::Void | Value::Unresolved => Value::Long(0),
                    _ => Value::Long(1),
                }
            }
            "sort" => {
                expect_args(args, 1, name)?;
                let mut values = get_list(args, 0, name)?.values();
                values.sort_by(ops::compare);
                Value::List(List::from_values(values))
            }
            "reverse" => {
                expect_args(args, 1, name)?;
                let list = get_list(args, 0, name)?;
                let mut out = List::new();
                let n = list.len();
                for pos in (0..n).rev() {
                    if let Some(slot) = list.get(pos) {
                        out.push_value(slot.borrow().value.clone());
                    }
                    if let Some(key) = list.key_of(pos) {
                        out.set_key(n - 1 - pos, key);
                    }
                }
                Value::List(out)
            }
            "haskey" => {
                expect_args(args, 2, name)?;
                let list = get_list(args, 0, name)?;
                Value::Bool(list.position_of(&get_str(args, 1, name)?).is_some())
            }
            _ => {
                if args.is_empty() {
                    return Err(ScriptError::type_error("append() expects a list"));
                }
                let mut out = get_list(args, 0, name)?.clone();
                for v in &args[1..] {
                    out.push_value(v.clone());
                }
                Value::List(out)
            }
        })
    }
}

// ── system ────────────────────────────────────────────────────────────────────

const SYSTEM_FUNCTIONS: &[&str] = &["print", "println", "getenv", "time"];

pub struct SystemLibrary;

impl ObjectPrototype for SystemLibrary {
    fn type_name(&self) -> &str {
        "system"
    }

    fn clone_object(&self) -> Box<dyn ObjectPrototype> {
        Box::new(SystemLibrary)
    }

    fn method_names(&self) -> &[&'static str] {
        SYSTEM_FUNCTIONS
    }

    fn invoke(&mut self, method: usize, args: &[Value], console: &mut Console) -> ScriptResult<Value> {
        let name = method_name(SYSTEM_FUNCTIONS, method)?;
        match name {
            "print" | "println" => {
                let text: String = args.iter().map(ToString::to_string).collect();
                if name == "println" {
                    console.write_line(&text);
                } else {
                    console.write(&text);
                }
                Ok(Value::Void)
            }
            "getenv" => {
                expect_args(args, 1, name)?;
                Ok(Value::Str(std::env::var(get_str(args, 0, name)?).unwrap_or_default()))
            }
            _ => {
                expect_args(args, 0, name)?;
                let secs = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs_f64())
                    .unwrap_or(0.0);
                Ok(Value::Double(secs))
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: Vec<Value>) -> ScriptResult<Value> {
        let table = BuiltinFunctionTable::standard();
        let mut console = Console::Capture(String::new());
        table.call_by_name(name, &args, &mut console)
    }

    fn list(items: &[i64]) -> Value {
        Value::List(List::from_values(items.iter().map(|&n| Value::Long(n))))
    }

    #[test]
    fn resolve_newest_first() {
        struct Shadow;
        impl ObjectPrototype for Shadow {
            fn type_name(&self) -> &str {
                "shadow"
            }
            fn clone_object(&self) -> Box<dyn ObjectPrototype> {
                Box::new(Shadow)
            }
            fn method_names(&self) -> &[&'static str] {
                &["sqrt"]
            }
            fn invoke(&mut self, _m: usize, _a: &[Value], _c: &mut Console) -> ScriptResult<Value> {
                Ok(Value::Long(-1))
            }
        }
        let mut table = BuiltinFunctionTable::standard();
        let before = table.resolve("sqrt").unwrap();
        table.register(Box::new(Shadow));
        let after = table.resolve("sqrt").unwrap();
        assert_ne!(before, after);
        let mut console = Console::default();
        assert_eq!(table.call(after, &[Value::Long(4)], &mut console).unwrap(), Value::Long(-1));
        assert!(table.resolve("no_such_fn").is_none());
    }

    #[test]
    fn math_functions() {
        assert_eq!(call("sqrt", vec![Value::Long(16)]).unwrap(), Value::Double(4.0));
        assert_eq!(call("abs", vec![Value::Long(-3)]).unwrap(), Value::Long(3));
        assert_eq!(call("sqrt", vec![list(&[4, 9])]).unwrap().to_string(), "{2,3}");
        let r = call("sqrt", vec![Value::Complex(Complex::new(-1.0, 0.0))]).unwrap();
        let Value::Complex(c) = r else { panic!("expected complex") };
        assert!(c.re.abs() < 1e-12 && (c.im - 1.0).abs() < 1e-12);
        assert!(call("tan", vec![Value::Complex(Complex::new(0.0, 1.0))]).is_err());
        assert!(call("sin", vec![]).is_err());
    }

    #[test]
    fn reductions_recurse_into_every_element() {
        let nested = Value::List(List::from_values(vec![
            Value::Long(5),
            list(&[1, 9]),
            Value::Long(3),
        ]));
        assert_eq!(call("min", vec![nested.clone()]).unwrap(), Value::Long(1));
        assert_eq!(call("max", vec![nested.clone()]).unwrap(), Value::Long(9));
        assert_eq!(call("sum", vec![nested.clone()]).unwrap(), Value::Long(18));
        assert_eq!(call("mean", vec![list(&[1, 2, 3])]).unwrap(), Value::Double(2.0));
        assert_eq!(call("deviation", vec![list(&[2, 4, 4, 4, 5, 5, 7, 9])]).unwrap().to_string(), "2.13809");
        assert!(call("sum", vec![Value::List(List::new())]).is_err());
    }

    #[test]
    fn string_functions() {
        assert_eq!(call("strlen", vec![Value::from("héllo")]).unwrap(), Value::Long(5));
        assert_eq!(
            call("substr", vec![Value::from("abcdef"), Value::Long(2), Value::Long(3)]).unwrap(),
            Value::from("cde")
        );
        assert_eq!(call("strstr", vec![Value::from("abc"), Value::from("c")]).unwrap(), Value::Long(2));
        assert_eq!(call("strstr", vec![Value::from("abc"), Value::from("z")]).unwrap(), Value::Long(-1));
        assert_eq!(call("split", vec![Value::from("a,b"), Value::from(",")]).unwrap().to_string(), "{\"a\",\"b\"}");
        assert_eq!(
            call("join", vec![list(&[1, 2, 3]), Value::from("-")]).unwrap(),
            Value::from("1-2-3")
        );
        assert_eq!(call("trim", vec![Value::from("  x ")]).unwrap(), Value::from("x"));
    }

    #[test]
    fn sprintf_conversions() {
        let out = sprintf(
            "%d|%5d|%-4s|%05.1f|%x|%e|%g|%%",
            &[
                Value::Long(-3),
                Value::Long(42),
                Value::from("ab"),
                Value::Double(3.14159),
                Value::Long(255),
                Value::Double(1500.0),
                Value::Double(0.5),
            ],
        )
        .unwrap();
        assert_eq!(out, "-3|   42|ab  |003.1|ff|1.500000e+03|0.5|%");
        assert!(sprintf("%d", &[]).is_err());
    }

    #[test]
    fn sprintf_rejects_oversized_fields() {
        let err = sprintf("%99999999999999999999d", &[Value::Long(1)]).unwrap_err();
        assert!(err.message().contains("width"), "{err}");
        assert!(sprintf("%5000d", &[Value::Long(1)]).is_err());
        assert!(sprintf("%.99999999999999999999f", &[Value::Double(1.0)]).is_err());
        assert_eq!(sprintf("%4096d", &[Value::Long(1)]).unwrap().len(), 4096);
    }

    #[test]
    fn list_functions() {
        assert_eq!(call("length", vec![list(&[1, 2, 3])]).unwrap(), Value::Long(3));
        assert_eq!(call("sort", vec![list(&[3, 1, 2])]).unwrap().to_string(), "{1,2,3}");
        assert_eq!(call("reverse", vec![list(&[1, 2, 3])]).unwrap().to_string(), "{3,2,1}");
        assert_eq!(call("append", vec![list(&[1]), Value::Long(2)]).unwrap().to_string(), "{1,2}");
    }

    #[test]
    fn print_goes_to_console() {
        let table = BuiltinFunctionTable::standard();
        let mut console = Console::Capture(String::new());
        table
            .call_by_name("println", &[Value::from("x="), Value::Double(0.5)], &mut console)
            .unwrap();
        assert_eq!(console.take(), "x=0.5\n");
    }
}
