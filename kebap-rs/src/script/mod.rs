//! The kebap scripting language.
//!
//! A tree-walking interpreter for a dynamically typed, C-like language:
//!
//! - [`lexer`] turns text into tokens; `include` pushes nested sources
//! - [`expr`] parses expressions by climbing the ranks of an extensible
//!   [`optable::OperatorTable`]; [`stmt`] parses statements on top of it
//! - [`value`], [`slot`] and [`list`] model values, storage and the
//!   array-or-map lists, with [`ops`] implementing operators and broadcasting
//! - [`object`] and [`builtins`] dispatch host-defined object types and
//!   function libraries
//! - [`interp`] and [`eval`] execute the tree against a [`symbol::SymbolTable`]
//! - [`module`] drives whole sources: function definitions, `include`,
//!   top-level statements
//!
//! # Quick start
//!
//! ```rust
//! use kebap::script::{Interpreter, Value};
//!
//! let mut interp = Interpreter::new();
//! interp.capture_output();
//! interp.run_source("demo", "{1,2,3} + 10;").unwrap();
//! assert_eq!(interp.take_output(), "{11,12,13}\n");
//! assert_eq!(interp.eval("6 * 7;").unwrap(), Value::Long(42));
//! ```

pub mod builtins;
pub mod error;
pub mod eval;
pub mod expr;
pub mod interner;
pub mod interp;
pub mod lexer;
pub mod library;
pub mod list;
pub mod module;
pub mod object;
pub mod ops;
pub mod optable;
pub mod slot;
pub mod stmt;
pub mod symbol;
pub mod token;
pub mod value;

// Re-exports for convenience.
pub use builtins::BuiltinFunctionTable;
pub use error::{ErrorKind, ScriptError, ScriptResult};
pub use module::{Interpreter, SessionOutcome};
pub use object::{Console, ObjectPrototype, ObjectRegistry};
pub use optable::{Assoc, BinaryKind, Rank};
pub use value::{Complex, Value};
