//! Object prototypes and dispatch.
//!
//! Every object type, whether a library object or one registered by the host,
//! implements [`ObjectPrototype`].  The [`ObjectRegistry`] keeps one blank
//! prototype per type name; `new T(args)` and `T x(args)` clone it and run
//! its constructor.  Method and property names are resolved through a
//! per-type [`DispatchTable`] built once at registration.
//!
//! Instances live behind [`ObjectRef`] (an `Rc`).  Binding an object to a
//! variable, list element or array element clones the `Rc`; when the last
//! clone goes away the handle's `Drop` runs the prototype's `destruct` hook,
//! exactly once.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::error::{ScriptError, ScriptResult};
use super::value::Value;

// ── Console ───────────────────────────────────────────────────────────────────

/// Where script output goes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Console {
    #[default]
    Stdout,
    Capture(String),
}

impl Console {
    pub fn write(&mut self, text: &str) {
        match self {
            Console::Stdout => {
                let mut out = std::io::stdout().lock();
                // Output errors (closed pipe) are not script errors.
                let _ = out.write_all(text.as_bytes());
                let _ = out.flush();
            }
            Console::Capture(buf) => buf.push_str(text),
        }
    }

    pub fn write_line(&mut self, text: &str) {
        self.write(text);
        self.write("\n");
    }

    /// Drain captured output (empty for stdout).
    pub fn take(&mut self) -> String {
        match self {
            Console::Stdout => String::new(),
            Console::Capture(buf) => std::mem::take(buf),
        }
    }
}

// ── Prototype trait ───────────────────────────────────────────────────────────

/// Capability set of an object type.
///
/// Method and property ids are positions in [`method_names`] and
/// [`property_names`].
///
/// [`method_names`]: ObjectPrototype::method_names
/// [`property_names`]: ObjectPrototype::property_names
pub trait ObjectPrototype {
    fn type_name(&self) -> &str;

    /// A fresh, unconstructed instance of the same type.
    fn clone_object(&self) -> Box<dyn ObjectPrototype>;

    fn construct(&mut self, args: &[Value]) -> ScriptResult<()> {
        if args.is_empty() {
            Ok(())
        } else {
            Err(ScriptError::type_error(format!(
                "{} takes no constructor arguments",
                self.type_name()
            )))
        }
    }

    fn destruct(&mut self) {}

    fn method_names(&self) -> &[&'static str] {
        &[]
    }

    fn method_id(&self, name: &str) -> Option<usize> {
        self.method_names().iter().position(|&m| m == name)
    }

    fn invoke(&mut self, method: usize, args: &[Value], console: &mut Console)
        -> ScriptResult<Value>;

    fn invoke_by_name(
        &mut self,
        name: &str,
        args: &[Value],
        console: &mut Console,
    ) -> ScriptResult<Value> {
        match self.method_id(name) {
            Some(id) => self.invoke(id, args, console),
            None => Err(ScriptError::unknown(format!(
                "unknown method '{name}' of {}",
                self.type_name()
            ))),
        }
    }

    fn property_names(&self) -> &[&'static str] {
        &[]
    }

    fn property_id(&self, name: &str) -> Option<usize> {
        self.property_names().iter().position(|&p| p == name)
    }

    fn property(&self, id: usize) -> ScriptResult<Value> {
        Err(ScriptError::unknown(format!(
            "unknown property #{id} of {}",
            self.type_name()
        )))
    }

    /// Operator override.  `Ok(None)` means "not overridden".
    fn operator(
        &mut self,
        _op: &str,
        _args: &[Value],
        _console: &mut Console,
    ) -> ScriptResult<Option<Value>> {
        Ok(None)
    }
}

/// Name → id maps of one object type.
#[derive(Debug, Default)]
pub struct DispatchTable {
    methods: HashMap<String, usize>,
    properties: HashMap<String, usize>,
}

impl DispatchTable {
    pub fn build(proto: &dyn ObjectPrototype) -> Self {
        let mut table = DispatchTable::default();
        for name in proto.method_names() {
            if let Some(id) = proto.method_id(name) {
                table.methods.insert((*name).to_owned(), id);
            }
        }
        for name in proto.property_names() {
            if let Some(id) = proto.property_id(name) {
                table.properties.insert((*name).to_owned(), id);
            }
        }
        table
    }

    pub fn method(&self, name: &str) -> Option<usize> {
        self.methods.get(name).copied()
    }

    pub fn property(&self, name: &str) -> Option<usize> {
        self.properties.get(name).copied()
    }
}

// ── Instances ─────────────────────────────────────────────────────────────────

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

pub type ObjectRef = Rc<ObjectHandle>;

/// A live object instance.
pub struct ObjectHandle {
    id: u64,
    type_name: String,
    dispatch: Rc<DispatchTable>,
    state: RefCell<Box<dyn ObjectPrototype>>,
}

impl ObjectHandle {
    /// Wrap an already constructed instance.
    pub fn wrap(state: Box<dyn ObjectPrototype>) -> ObjectRef {
        let dispatch = Rc::new(DispatchTable::build(state.as_ref()));
        Self::with_dispatch(state, dispatch)
    }

    fn with_dispatch(state: Box<dyn ObjectPrototype>, dispatch: Rc<DispatchTable>) -> ObjectRef {
        let id = NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed);
        Rc::new(ObjectHandle {
            id,
            type_name: state.type_name().to_owned(),
            dispatch,
            state: RefCell::new(state),
        })
    }

    /// Unique identity of this instance.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn method_id(&self, name: &str) -> Option<usize> {
        self.dispatch.method(name)
    }

    fn state_mut(&self) -> ScriptResult<std::cell::RefMut<'_, Box<dyn ObjectPrototype>>> {
        self.state.try_borrow_mut().map_err(|_| {
            ScriptError::structural(format!("{} object is already in use", self.type_name))
        })
    }

    pub fn invoke(&self, method: usize, args: &[Value], console: &mut Console) -> ScriptResult<Value> {
        self.state_mut()?.invoke(method, args, console)
    }

    pub fn invoke_by_name(
        &self,
        name: &str,
        args: &[Value],
        console: &mut Console,
    ) -> ScriptResult<Value> {
        match self.method_id(name) {
            Some(id) => self.invoke(id, args, console),
            None => self.state_mut()?.invoke_by_name(name, args, console),
        }
    }

    pub fn property(&self, name: &str) -> ScriptResult<Value> {
        let state = self
            .state
            .try_borrow()
            .map_err(|_| ScriptError::structural(format!("{} object is in use", self.type_name)))?;
        match self.dispatch.property(name) {
            Some(id) => state.property(id),
            None => Err(ScriptError::unknown(format!(
                "unknown property '{name}' of {}",
                self.type_name
            ))),
        }
    }

    pub fn operator(
        &self,
        op: &str,
        args: &[Value],
        console: &mut Console,
    ) -> ScriptResult<Option<Value>> {
        self.state_mut()?.operator(op, args, console)
    }
}

impl Drop for ObjectHandle {
    fn drop(&mut self) {
        tracing::trace!(id = self.id, type_name = %self.type_name, "destructing object");
        self.state.get_mut().destruct();
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.type_name, self.id)
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

struct Registered {
    prototype: Box<dyn ObjectPrototype>,
    dispatch: Rc<DispatchTable>,
}

/// Known object types by name.  Registering a name again replaces the older
/// prototype.
#[derive(Default)]
pub struct ObjectRegistry {
    types: HashMap<String, Registered>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, prototype: Box<dyn ObjectPrototype>) {
        let name = prototype.type_name().to_owned();
        tracing::debug!(type_name = %name, "registering object type");
        let dispatch = Rc::new(DispatchTable::build(prototype.as_ref()));
        self.types.insert(name, Registered { prototype, dispatch });
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.types.keys().cloned().collect();
        names.sort();
        names
    }

    /// Construct a new instance of `name`.
    pub fn instantiate(&self, name: &str, args: &[Value]) -> ScriptResult<ObjectRef> {
        let entry = self
            .types
            .get(name)
            .ok_or_else(|| ScriptError::unknown(format!("unknown type '{name}'")))?;
        let mut state = entry.prototype.clone_object();
        state.construct(args)?;
        Ok(ObjectHandle::with_dispatch(state, Rc::clone(&entry.dispatch)))
    }
}

impl fmt::Debug for ObjectRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.type_names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Counter {
        count: i64,
        destructed: Rc<Cell<u32>>,
    }

    impl ObjectPrototype for Counter {
        fn type_name(&self) -> &str {
            "Counter"
        }
        fn clone_object(&self) -> Box<dyn ObjectPrototype> {
            Box::new(Counter {
                count: 0,
                destructed: Rc::clone(&self.destructed),
            })
        }
        fn construct(&mut self, args: &[Value]) -> ScriptResult<()> {
            if let Some(v) = args.first() {
                self.count = v.as_long()?;
            }
            Ok(())
        }
        fn destruct(&mut self) {
            self.destructed.set(self.destructed.get() + 1);
        }
        fn method_names(&self) -> &[&'static str] {
            &["inc", "get"]
        }
        fn invoke(&mut self, method: usize, _args: &[Value], _c: &mut Console) -> ScriptResult<Value> {
            if method == 0 {
                self.count += 1;
            }
            Ok(Value::Long(self.count))
        }
        fn property_names(&self) -> &[&'static str] {
            &["count"]
        }
        fn property(&self, _id: usize) -> ScriptResult<Value> {
            Ok(Value::Long(self.count))
        }
    }

    fn registry(destructed: &Rc<Cell<u32>>) -> ObjectRegistry {
        let mut r = ObjectRegistry::new();
        r.register(Box::new(Counter {
            count: 0,
            destructed: Rc::clone(destructed),
        }));
        r
    }

    #[test]
    fn instantiate_and_invoke() {
        let d = Rc::new(Cell::new(0));
        let r = registry(&d);
        let obj = r.instantiate("Counter", &[Value::Long(5)]).unwrap();
        let mut console = Console::Capture(String::new());
        assert_eq!(obj.invoke_by_name("inc", &[], &mut console).unwrap(), Value::Long(6));
        assert_eq!(obj.property("count").unwrap(), Value::Long(6));
        assert!(obj.invoke_by_name("nope", &[], &mut console).is_err());
        assert!(obj.property("nope").is_err());
    }

    #[test]
    fn destruct_fires_once_after_last_reference() {
        let d = Rc::new(Cell::new(0));
        let r = registry(&d);
        let a = r.instantiate("Counter", &[]).unwrap();
        let b = Rc::clone(&a);
        drop(a);
        assert_eq!(d.get(), 0);
        drop(b);
        assert_eq!(d.get(), 1);
    }

    #[test]
    fn unknown_type() {
        let r = ObjectRegistry::new();
        assert!(r.instantiate("Nope", &[]).is_err());
    }

    #[test]
    fn ids_are_unique() {
        let d = Rc::new(Cell::new(0));
        let r = registry(&d);
        let a = r.instantiate("Counter", &[]).unwrap();
        let b = r.instantiate("Counter", &[]).unwrap();
        assert_ne!(a.id(), b.id());
    }
}
