//! Statement execution and user function calls.
//!
//! The [`Engine`] owns everything a running script touches: the name
//! interner, the symbol table, the object registry, the builtin function
//! table, the operator table, and the console.  Expressions are evaluated by
//! the methods in [`eval`](super::eval); this module executes [`Stmt`] trees
//! and produces an [`ExecResult`] per statement.

use std::mem;
use std::rc::Rc;

use super::builtins::BuiltinFunctionTable;
use super::error::{ScriptError, ScriptResult};
use super::expr::Expr;
use super::interner::NameTable;
use super::library::register_library_objects;
use super::object::{Console, ObjectRegistry};
use super::optable::OperatorTable;
use super::slot::{DeclType, Slot, SlotKind, SlotRef, TypeSpec};
use super::stmt::{CatchParam, Declarator, ForeachVar, Function, Init, Stmt, StmtKind};
use super::symbol::SymbolTable;
use super::value::Value;

// ── Execution result ──────────────────────────────────────────────────────────

/// How a statement finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecStatus {
    Normal,
    Break,
    Continue,
    Return,
    /// `exit`; the value is the exit code.
    Exit,
    /// `throw`; the value is the message.
    Error,
}

#[derive(Debug, Clone)]
pub struct ExecResult {
    pub status: ExecStatus,
    pub value: Value,
}

impl ExecResult {
    pub fn normal() -> Self {
        Self::with(ExecStatus::Normal, Value::Void)
    }

    pub fn with(status: ExecStatus, value: Value) -> Self {
        ExecResult { status, value }
    }

    pub fn is_normal(&self) -> bool {
        self.status == ExecStatus::Normal
    }
}

// ── Engine ────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Engine {
    pub names: NameTable,
    pub symbols: SymbolTable,
    pub registry: ObjectRegistry,
    pub builtins: BuiltinFunctionTable,
    pub operators: OperatorTable,
    pub console: Console,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Engine with the standard function libraries, the library object
    /// types, and the C-like operator set.
    pub fn new() -> Self {
        let mut registry = ObjectRegistry::new();
        register_library_objects(&mut registry);
        Engine {
            names: NameTable::new(),
            symbols: SymbolTable::new(),
            registry,
            builtins: BuiltinFunctionTable::standard(),
            operators: OperatorTable::c_like(),
            console: Console::default(),
        }
    }

    /// Declared type named `name`.
    pub fn decl_type(&self, name: &str) -> ScriptResult<DeclType> {
        match DeclType::primitive(name) {
            Some(ty) => Ok(ty),
            None if self.registry.contains(name) => {
                Ok(DeclType::Typed(TypeSpec::Object(name.to_owned())))
            }
            None => Err(ScriptError::unknown(format!("unknown type '{name}'"))),
        }
    }

    /// Run `f` inside a fresh block; the block is closed on every path.
    fn in_block<T>(&mut self, f: impl FnOnce(&mut Self) -> ScriptResult<T>) -> ScriptResult<T> {
        self.symbols.enter_block();
        let result = f(self);
        self.symbols.exit_block();
        result
    }

    // ── Statements ────────────────────────────────────────────────────────────

    pub fn execute(&mut self, stmt: &Stmt) -> ScriptResult<ExecResult> {
        self.execute_kind(&stmt.kind).map_err(|e| e.at_line(stmt.line))
    }

    fn execute_kind(&mut self, kind: &StmtKind) -> ScriptResult<ExecResult> {
        match kind {
            StmtKind::Empty => Ok(ExecResult::normal()),
            StmtKind::Expr(expr) => {
                let value = self.evaluate(expr)?;
                Ok(ExecResult::with(ExecStatus::Normal, value))
            }
            StmtKind::Block(stmts) => self.in_block(|engine| engine.execute_sequence(stmts)),
            StmtKind::Declaration { ty, declarators } => {
                for declarator in declarators {
                    self.declare(ty, declarator)?;
                }
                Ok(ExecResult::normal())
            }
            StmtKind::If {
                cond,
                then,
                otherwise,
            } => {
                if self.evaluate(cond)?.as_bool()? {
                    self.execute(then)
                } else if let Some(otherwise) = otherwise {
                    self.execute(otherwise)
                } else {
                    Ok(ExecResult::normal())
                }
            }
            StmtKind::While { cond, body } => {
                while self.evaluate(cond)?.as_bool()? {
                    if let Some(done) = loop_exit(self.execute(body)?) {
                        return Ok(done);
                    }
                }
                Ok(ExecResult::normal())
            }
            StmtKind::For {
                init,
                cond,
                step,
                body,
            } => self.in_block(|engine| {
                if let Some(init) = init {
                    engine.execute(init)?;
                }
                loop {
                    if let Some(cond) = cond {
                        if !engine.evaluate(cond)?.as_bool()? {
                            break;
                        }
                    }
                    if let Some(done) = loop_exit(engine.execute(body)?) {
                        return Ok(done);
                    }
                    if let Some(step) = step {
                        engine.evaluate(step)?;
                    }
                }
                Ok(ExecResult::normal())
            }),
            StmtKind::Foreach {
                value,
                key,
                index,
                list,
                body,
            } => self.in_block(|engine| {
                engine.execute_foreach(value, key.as_ref(), index.as_ref(), list, body)
            }),
            StmtKind::Break => Ok(ExecResult::with(ExecStatus::Break, Value::Void)),
            StmtKind::Continue => Ok(ExecResult::with(ExecStatus::Continue, Value::Void)),
            StmtKind::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Void,
                };
                if let Value::Object(obj) = &value {
                    return Err(ScriptError::structural(format!(
                        "cannot return a {} object by value",
                        obj.type_name()
                    )));
                }
                Ok(ExecResult::with(ExecStatus::Return, value))
            }
            StmtKind::Throw(expr) => {
                let message = self.evaluate(expr)?.to_string();
                Ok(ExecResult::with(ExecStatus::Error, Value::Str(message)))
            }
            StmtKind::Try {
                body,
                param,
                handler,
            } => self.execute_try(body, param.as_ref(), handler),
            StmtKind::Exit(expr) => {
                let code = match expr {
                    Some(expr) => self.evaluate(expr)?.as_long()?,
                    None => 0,
                };
                Ok(ExecResult::with(ExecStatus::Exit, Value::Long(code)))
            }
        }
    }

    fn execute_sequence(&mut self, stmts: &[Stmt]) -> ScriptResult<ExecResult> {
        for stmt in stmts {
            let result = self.execute(stmt)?;
            if !result.is_normal() {
                return Ok(result);
            }
        }
        Ok(ExecResult::normal())
    }

    fn execute_try(
        &mut self,
        body: &Stmt,
        param: Option<&CatchParam>,
        handler: &Stmt,
    ) -> ScriptResult<ExecResult> {
        let message = match self.execute(body) {
            Ok(result) if result.status == ExecStatus::Error => result.value.to_string(),
            Ok(result) => return Ok(result),
            Err(e) if e.is_exit() => return Err(e),
            Err(e) => e.message().to_owned(),
        };
        tracing::trace!(%message, "caught error");
        self.in_block(|engine| {
            if let Some(param) = param {
                let mut slot = Slot::empty(param.ty.slot_kind());
                slot.assign(Value::Str(message))?;
                engine.symbols.register_variable(param.name, slot.into_ref());
            }
            engine.execute(handler)
        })
    }

    fn execute_foreach(
        &mut self,
        value: &ForeachVar,
        key: Option<&ForeachVar>,
        index: Option<&ForeachVar>,
        list: &Expr,
        body: &Stmt,
    ) -> ScriptResult<ExecResult> {
        let value_slot = self.foreach_binding(value)?;
        let key_slot = match key {
            Some(var) => self.foreach_binding(var)?,
            None => None,
        };
        let index_slot = match index {
            Some(var) => self.foreach_binding(var)?,
            None => None,
        };

        let items = match self.evaluate(list)? {
            Value::List(items) => items,
            Value::Void | Value::Unresolved => return Ok(ExecResult::normal()),
            other => {
                return Err(ScriptError::type_error(format!(
                    "foreach needs a list, got {}",
                    other.type_name()
                )))
            }
        };
        for pos in 0..items.len() {
            let Some(element) = items.get(pos) else { break };
            let element = element.borrow().value.clone();
            self.bind_foreach(&value_slot, value, element)?;
            if let (Some(var), true) = (key, items.has_keys()) {
                let key = items.key_of(pos).unwrap_or_default().to_owned();
                self.bind_foreach(&key_slot, var, Value::Str(key))?;
            }
            if let Some(var) = index {
                self.bind_foreach(&index_slot, var, Value::Long(pos as i64))?;
            }
            if let Some(done) = loop_exit(self.execute(body)?) {
                return Ok(done);
            }
        }
        Ok(ExecResult::normal())
    }

    /// Slot for a declared foreach variable; target expressions are resolved
    /// on every iteration instead.
    fn foreach_binding(&mut self, var: &ForeachVar) -> ScriptResult<Option<SlotRef>> {
        match var {
            ForeachVar::Declare(ty, name) => {
                let slot = Slot::empty(ty.slot_kind()).into_ref();
                self.symbols.register_variable(*name, Rc::clone(&slot));
                Ok(Some(slot))
            }
            ForeachVar::Target(_) => Ok(None),
        }
    }

    fn bind_foreach(&mut self, slot: &Option<SlotRef>, var: &ForeachVar, value: Value) -> ScriptResult<()> {
        let place = match (slot, var) {
            (Some(slot), _) => Rc::clone(slot),
            (None, ForeachVar::Target(expr)) => self.eval_place(expr)?,
            (None, ForeachVar::Declare(..)) => {
                return Err(ScriptError::structural("foreach variable is not bound"))
            }
        };
        super::slot::store(&place, value)
    }

    // ── Declarations ──────────────────────────────────────────────────────────

    fn declare(&mut self, ty: &DeclType, declarator: &Declarator) -> ScriptResult<()> {
        if *ty == DeclType::Void && !declarator.pointer {
            return Err(ScriptError::type_error(format!(
                "variable '{}' declared void",
                self.names.name(declarator.name)
            )));
        }
        let kind = if declarator.pointer {
            SlotKind::Typed(TypeSpec::Pointer)
        } else {
            ty.slot_kind()
        };
        let mut slot = match &declarator.array {
            Some(length) => {
                let length = match length {
                    Some(expr) => Some(self.array_length(expr)?),
                    None => None,
                };
                Slot::array(kind.clone(), length)
            }
            None => Slot::empty(kind.clone()),
        };
        match &declarator.init {
            Some(Init::Assign(expr)) => {
                let value = self.evaluate(expr)?;
                slot.assign(value)?;
            }
            Some(Init::Construct(args)) => {
                let args = self.evaluate_args(args)?;
                self.construct_into(&mut slot, &kind, &args)?;
            }
            None => {
                if let SlotKind::Typed(TypeSpec::Object(_)) = kind {
                    self.construct_into(&mut slot, &kind, &[])?;
                }
            }
        }
        self.symbols.register_variable(declarator.name, slot.into_ref());
        Ok(())
    }

    pub(super) fn array_length(&mut self, expr: &Expr) -> ScriptResult<usize> {
        let n = self.evaluate(expr)?.as_long()?;
        usize::try_from(n)
            .map_err(|_| ScriptError::arithmetic(format!("invalid array length {n}")))
    }

    /// Initialise `slot` from constructor arguments: objects are
    /// instantiated, built-in types convert their single argument.  Array
    /// slots initialise every element.
    pub(super) fn construct_into(&mut self, slot: &mut Slot, kind: &SlotKind, args: &[Value]) -> ScriptResult<()> {
        if slot.is_array() {
            let len = slot.value.as_list().map_or(0, |l| l.len());
            for pos in 0..len {
                let element = slot.element(pos as i64)?;
                let value = self.construct_value(kind, args)?;
                element.borrow_mut().assign(value)?;
            }
            return Ok(());
        }
        let value = self.construct_value(kind, args)?;
        slot.assign(value)
    }

    pub(super) fn construct_value(&mut self, kind: &SlotKind, args: &[Value]) -> ScriptResult<Value> {
        match kind {
            SlotKind::Typed(TypeSpec::Object(name)) => {
                Ok(Value::Object(self.registry.instantiate(name, args)?))
            }
            SlotKind::Typed(spec) => match args {
                [] => Ok(spec.default_value()),
                [arg] => spec.convert(arg.clone()),
                _ => Err(ScriptError::type_error(format!(
                    "{spec}() takes one argument, got {}",
                    args.len()
                ))),
            },
            SlotKind::Variant => match args {
                [] => Ok(Value::Unresolved),
                [arg] => Ok(arg.clone()),
                _ => Err(ScriptError::type_error("var() takes one argument")),
            },
        }
    }

    // ── Functions ─────────────────────────────────────────────────────────────

    /// Call a user function.  The body runs in a child symbol table that
    /// sees only the global block of the caller.
    pub fn call_function(&mut self, function: &Function, args: Vec<Value>) -> ScriptResult<Value> {
        if args.len() != function.params.len() {
            return Err(ScriptError::type_error(format!(
                "{}() expects {} argument{}, got {}",
                function.display,
                function.params.len(),
                if function.params.len() == 1 { "" } else { "s" },
                args.len()
            )));
        }
        let child = self.symbols.child(1);
        let caller = mem::replace(&mut self.symbols, child);
        let result = self.run_function(function, args);
        self.symbols = caller;
        result.map_err(|e| e.at_line(function.line))
    }

    fn run_function(&mut self, function: &Function, args: Vec<Value>) -> ScriptResult<Value> {
        for (param, arg) in function.params.iter().zip(args) {
            let kind = if param.pointer {
                SlotKind::Typed(TypeSpec::Pointer)
            } else {
                param.ty.slot_kind()
            };
            let mut slot = if param.array {
                Slot::array(kind, None)
            } else {
                Slot::empty(kind)
            };
            slot.assign(arg).map_err(|e| {
                ScriptError::type_error(format!(
                    "argument '{}' of {}(): {}",
                    self.names.name(param.name),
                    function.display,
                    e.message()
                ))
            })?;
            self.symbols.register_variable(param.name, slot.into_ref());
        }
        let result = self.execute(&function.body)?;
        match result.status {
            ExecStatus::Normal => function.return_type.convert(Value::Void),
            ExecStatus::Return => function.return_type.convert(result.value),
            ExecStatus::Error => Err(ScriptError::thrown(result.value.to_string())),
            ExecStatus::Exit => Err(ScriptError::exit(result.value.as_long()?)),
            ExecStatus::Break | ExecStatus::Continue => Err(ScriptError::structural(format!(
                "break or continue outside of a loop in {}()",
                function.display
            ))),
        }
    }
}

/// Fold a loop body's result: `Some` ends the loop with that result.
fn loop_exit(result: ExecResult) -> Option<ExecResult> {
    match result.status {
        ExecStatus::Normal | ExecStatus::Continue => None,
        ExecStatus::Break => Some(ExecResult::normal()),
        _ => Some(result),
    }
}
