//! Block-scoped symbol table.
//!
//! Variables live in a single entry stack; every block pushes a frame marker
//! (the entry count at block entry) and exiting the block releases the
//! entries above the marker in reverse registration order.  Lookup scans the
//! stack from the top, so inner declarations shadow outer ones.
//!
//! Functions are kept in a map shared by a module table and every child table
//! created for a call.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::interner::SymbolId;
use super::object::ObjectRegistry;
use super::slot::{DeclType, SlotRef};
use super::stmt::Function;

pub type FunctionMap = Rc<RefCell<HashMap<SymbolId, Rc<Function>>>>;

#[derive(Debug)]
pub struct SymbolTable {
    entries: Vec<(SymbolId, SlotRef)>,
    /// Entry count at each block entry; `frames[0]` is the global block.
    frames: Vec<usize>,
    functions: FunctionMap,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    /// Empty table with its global block open.
    pub fn new() -> Self {
        SymbolTable {
            entries: Vec::new(),
            frames: vec![0],
            functions: Rc::new(RefCell::new(HashMap::new())),
        }
    }

    // ── Blocks ────────────────────────────────────────────────────────────────

    pub fn enter_block(&mut self) {
        self.frames.push(self.entries.len());
    }

    /// Close the innermost block, releasing its variables newest first.
    /// The global block is never closed.
    pub fn exit_block(&mut self) {
        if self.frames.len() <= 1 {
            return;
        }
        if let Some(start) = self.frames.pop() {
            self.release_above(start);
        }
    }

    fn release_above(&mut self, start: usize) {
        while self.entries.len() > start {
            self.entries.pop();
        }
    }

    /// Number of open blocks, the global block included.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    // ── Variables ─────────────────────────────────────────────────────────────

    /// Bind `id` to `slot` in the innermost block.  Redeclaring a name in
    /// the same block shadows the earlier binding until the block exits.
    pub fn register_variable(&mut self, id: SymbolId, slot: SlotRef) -> SymbolId {
        self.entries.push((id, slot));
        id
    }

    /// Innermost binding of `id`.
    pub fn get_variable(&self, id: SymbolId) -> Option<SlotRef> {
        self.entries
            .iter()
            .rev()
            .find(|(name, _)| *name == id)
            .map(|(_, slot)| Rc::clone(slot))
    }

    /// Binding of `id` in the innermost block only.
    pub fn get_local(&self, id: SymbolId) -> Option<SlotRef> {
        let start = self.frames.last().copied().unwrap_or(0);
        self.entries[start..]
            .iter()
            .rev()
            .find(|(name, _)| *name == id)
            .map(|(_, slot)| Rc::clone(slot))
    }

    /// Binding of `id` in the global block.
    pub fn get_global(&self, id: SymbolId) -> Option<SlotRef> {
        let end = self.frames.get(1).copied().unwrap_or(self.entries.len());
        self.entries[..end]
            .iter()
            .rev()
            .find(|(name, _)| *name == id)
            .map(|(_, slot)| Rc::clone(slot))
    }

    // ── Functions ─────────────────────────────────────────────────────────────

    pub fn register_function(&self, id: SymbolId, function: Function) {
        tracing::debug!(name = %function.display, line = function.line, "registering function");
        self.functions.borrow_mut().insert(id, Rc::new(function));
    }

    pub fn get_function(&self, id: SymbolId) -> Option<Rc<Function>> {
        self.functions.borrow().get(&id).cloned()
    }

    // ── Child tables ──────────────────────────────────────────────────────────

    /// Copy the bindings of the outermost `depth` blocks of `source` into
    /// this table's global block.  The slots are shared.
    pub fn import(&mut self, source: &SymbolTable, depth: usize) {
        let end = source
            .frames
            .get(depth)
            .copied()
            .unwrap_or(source.entries.len());
        for (id, slot) in &source.entries[..end] {
            self.entries.push((*id, Rc::clone(slot)));
        }
        self.functions = Rc::clone(&source.functions);
    }

    /// A new table for a call: shares the function map and sees the outermost
    /// `depth` blocks of this table.
    pub fn child(&self, depth: usize) -> SymbolTable {
        let mut table = SymbolTable::new();
        table.import(self, depth);
        table.enter_block();
        table
    }

    /// `true` if `name` is a built-in type keyword or a registered object type.
    pub fn is_type_name(name: &str, registry: &ObjectRegistry) -> bool {
        DeclType::primitive(name).is_some() || registry.contains(name)
    }

    /// Release every binding, newest first.
    pub fn teardown(&mut self) {
        self.release_above(0);
        self.frames.truncate(1);
    }
}

impl Drop for SymbolTable {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::error::ScriptResult;
    use crate::script::interner::NameTable;
    use crate::script::object::{Console, ObjectHandle, ObjectPrototype};
    use crate::script::slot::Slot;
    use crate::script::value::Value;

    fn slot(n: i64) -> SlotRef {
        Slot::variant(Value::Long(n)).into_ref()
    }

    fn value(table: &SymbolTable, id: SymbolId) -> Option<Value> {
        table.get_variable(id).map(|s| s.borrow().value.clone())
    }

    #[test]
    fn inner_block_shadows_and_restores() {
        let mut names = NameTable::new();
        let x = names.intern("x");
        let mut t = SymbolTable::new();
        t.register_variable(x, slot(1));
        t.enter_block();
        assert_eq!(t.depth(), 2);
        t.register_variable(x, slot(2));
        assert_eq!(value(&t, x), Some(Value::Long(2)));
        t.exit_block();
        assert_eq!(value(&t, x), Some(Value::Long(1)));
        t.exit_block();
        assert_eq!(t.depth(), 1);
    }

    #[test]
    fn redeclaration_shadows_within_block() {
        let mut names = NameTable::new();
        let x = names.intern("x");
        let mut t = SymbolTable::new();
        t.register_variable(x, slot(1));
        t.register_variable(x, slot(2));
        assert_eq!(value(&t, x), Some(Value::Long(2)));
        assert_eq!(t.get_local(x).map(|s| s.borrow().value.clone()), Some(Value::Long(2)));
    }

    #[test]
    fn child_sees_only_globals() {
        let mut names = NameTable::new();
        let (g, l) = (names.intern("g"), names.intern("l"));
        let mut t = SymbolTable::new();
        t.register_variable(g, slot(1));
        t.enter_block();
        t.register_variable(l, slot(2));
        let child = t.child(1);
        assert_eq!(value(&child, g), Some(Value::Long(1)));
        assert!(child.get_variable(l).is_none());
        assert!(child.get_global(g).is_some());
    }

    struct Tracker {
        order: Rc<RefCell<Vec<i64>>>,
        tag: i64,
    }

    impl ObjectPrototype for Tracker {
        fn type_name(&self) -> &str {
            "Tracker"
        }
        fn clone_object(&self) -> Box<dyn ObjectPrototype> {
            Box::new(Tracker { order: Rc::clone(&self.order), tag: self.tag })
        }
        fn destruct(&mut self) {
            self.order.borrow_mut().push(self.tag);
        }
        fn invoke(&mut self, _m: usize, _a: &[Value], _c: &mut Console) -> ScriptResult<Value> {
            Ok(Value::Void)
        }
    }

    #[test]
    fn block_exit_releases_in_reverse_order() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut names = NameTable::new();
        let mut t = SymbolTable::new();
        t.enter_block();
        for tag in 1..=3 {
            let obj = ObjectHandle::wrap(Box::new(Tracker { order: Rc::clone(&order), tag }));
            let id = names.intern(&format!("o{tag}"));
            t.register_variable(id, Slot::variant(Value::Object(obj)).into_ref());
        }
        t.exit_block();
        assert_eq!(*order.borrow(), vec![3, 2, 1]);
    }

    #[test]
    fn teardown_runs_on_drop() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut names = NameTable::new();
        {
            let mut t = SymbolTable::new();
            let obj = ObjectHandle::wrap(Box::new(Tracker { order: Rc::clone(&order), tag: 7 }));
            t.register_variable(names.intern("g"), Slot::variant(Value::Object(obj)).into_ref());
            assert!(order.borrow().is_empty());
        }
        assert_eq!(*order.borrow(), vec![7]);
    }

    #[test]
    fn type_names() {
        let registry = ObjectRegistry::new();
        assert!(SymbolTable::is_type_name("int", &registry));
        assert!(SymbolTable::is_type_name("var", &registry));
        assert!(!SymbolTable::is_type_name("foo", &registry));
    }
}
