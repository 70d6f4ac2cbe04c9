//! Host embedding API: a single-expression formula in one free variable.
//!
//! ```rust
//! use kebap::Formula;
//!
//! let mut f = Formula::new("a * x**2 + 1");
//! f.set_parameter("a", 3.0).unwrap();
//! assert_eq!(f.evaluate(2.0).unwrap(), 13.0);
//! ```
//!
//! The expression is parsed on the first call to [`Formula::evaluate`].  A
//! parse failure is returned once; the formula then evaluates to zero.

use std::f64::consts;

use crate::script::expr::Expr;
use crate::script::{Interpreter, ObjectPrototype, ScriptResult, Value};

/// Name of the free variable.
pub const VARIABLE: &str = "x";

pub struct Formula {
    interp: Interpreter,
    source: String,
    compiled: Option<Expr>,
}

impl Formula {
    /// A formula over `x` with the constants `pi` and `e` defined.
    pub fn new(expression: &str) -> Self {
        let mut interp = Interpreter::new();
        interp.capture_output();
        for (name, value) in [(VARIABLE, 0.0), ("pi", consts::PI), ("e", consts::E)] {
            // Fresh globals always bind.
            let _ = interp.set_global(name, Value::Double(value));
        }
        Formula {
            interp,
            source: expression.to_owned(),
            compiled: None,
        }
    }

    pub fn expression(&self) -> &str {
        &self.source
    }

    /// Set (or create) a named parameter.
    pub fn set_parameter(&mut self, name: &str, value: f64) -> ScriptResult<()> {
        self.interp.set_global(name, Value::Double(value))
    }

    /// Current value of a parameter, if it exists and is numeric.
    pub fn parameter(&self, name: &str) -> Option<f64> {
        self.interp.get_global(name)?.as_double().ok()
    }

    /// Make an object type usable in the expression.  Register before the
    /// first evaluation.
    pub fn register_object(&mut self, prototype: Box<dyn ObjectPrototype>) {
        self.interp.register_object(prototype);
    }

    /// Make a function library callable from the expression.  Register
    /// before the first evaluation.
    pub fn register_function_library(&mut self, library: Box<dyn ObjectPrototype>) {
        self.interp.register_function_library(library);
    }

    /// Evaluate at `x`.
    pub fn evaluate(&mut self, x: f64) -> ScriptResult<f64> {
        self.interp.set_global(VARIABLE, Value::Double(x))?;
        if self.compiled.is_none() {
            match self.interp.compile_expression(&self.source) {
                Ok(expr) => self.compiled = Some(expr),
                Err(e) => {
                    tracing::debug!(expression = %self.source, error = %e, "formula failed to parse");
                    self.compiled = Some(Expr::Literal(Value::Double(0.0)));
                    return Err(e);
                }
            }
        }
        match &self.compiled {
            Some(expr) => self.interp.evaluate(expr)?.as_double(),
            None => Ok(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{Console, ErrorKind, ScriptError};

    #[test]
    fn polynomial_in_x() {
        let mut f = Formula::new("x*x - 2*x + 1");
        assert_eq!(f.evaluate(3.0).unwrap(), 4.0);
        assert_eq!(f.evaluate(1.0).unwrap(), 0.0);
    }

    #[test]
    fn constants_and_parameters() {
        let mut f = Formula::new("k * sin(pi / 2) + e");
        f.set_parameter("k", 2.0).unwrap();
        assert_eq!(f.parameter("k"), Some(2.0));
        assert!((f.evaluate(0.0).unwrap() - (2.0 + std::f64::consts::E)).abs() < 1e-12);
        assert_eq!(f.parameter("nope"), None);
    }

    #[test]
    fn parse_error_reported_once() {
        let mut f = Formula::new("(x + 2");
        let err = f.evaluate(1.0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Syntax);
        assert_eq!(f.evaluate(1.0).unwrap(), 0.0);
    }

    #[test]
    fn runtime_errors_propagate() {
        let mut f = Formula::new("1 / (x - x)");
        assert!(f.evaluate(1.0).is_err());
        let mut f = Formula::new("unknown_name + x");
        assert_eq!(f.evaluate(1.0).unwrap_err().kind(), ErrorKind::UnknownName);
    }

    struct Doubler;

    impl ObjectPrototype for Doubler {
        fn type_name(&self) -> &str {
            "doubler"
        }
        fn clone_object(&self) -> Box<dyn ObjectPrototype> {
            Box::new(Doubler)
        }
        fn method_names(&self) -> &[&'static str] {
            &["twice"]
        }
        fn invoke(&mut self, _m: usize, args: &[Value], _c: &mut Console) -> ScriptResult<Value> {
            match args {
                [v] => Ok(Value::Double(v.as_double()? * 2.0)),
                _ => Err(ScriptError::type_error("twice() takes one argument")),
            }
        }
    }

    #[test]
    fn host_function_library() {
        let mut f = Formula::new("twice(x) + 1");
        f.register_function_library(Box::new(Doubler));
        assert_eq!(f.evaluate(4.0).unwrap(), 9.0);
    }

    struct Tripler;

    impl ObjectPrototype for Tripler {
        fn type_name(&self) -> &str {
            "tripler"
        }
        fn clone_object(&self) -> Box<dyn ObjectPrototype> {
            Box::new(Tripler)
        }
        fn method_names(&self) -> &[&'static str] {
            &["twice"]
        }
        fn invoke(&mut self, _m: usize, args: &[Value], _c: &mut Console) -> ScriptResult<Value> {
            match args {
                [v] => Ok(Value::Double(v.as_double()? * 3.0)),
                _ => Err(ScriptError::type_error("twice() takes one argument")),
            }
        }
    }

    #[test]
    fn library_registered_after_compile_takes_over() {
        let mut f = Formula::new("twice(x) + 1");
        f.register_function_library(Box::new(Doubler));
        assert_eq!(f.evaluate(4.0).unwrap(), 9.0);
        f.register_function_library(Box::new(Tripler));
        assert_eq!(f.evaluate(4.0).unwrap(), 13.0);
    }
}
