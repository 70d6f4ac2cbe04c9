//! Name interner.
//!
//! Every identifier the parser sees is mapped to a [`SymbolId`] once; symbol
//! tables and call caches compare ids instead of strings.  A table is owned by
//! one interpreter, so separate interpreters never share a namespace.  Ids are
//! stable for the table's lifetime and never reclaimed.

use std::collections::HashMap;
use std::fmt;

/// Interned name handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(u32);

impl SymbolId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Append-only string ↔ id table.
#[derive(Debug, Default, Clone)]
pub struct NameTable {
    ids: HashMap<String, SymbolId>,
    names: Vec<String>,
}

impl NameTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id for `name`, allocating a new one on first sight.
    pub fn intern(&mut self, name: &str) -> SymbolId {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        let id = SymbolId(self.names.len() as u32);
        self.names.push(name.to_owned());
        self.ids.insert(name.to_owned(), id);
        id
    }

    /// Id for `name` if it was interned before.
    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.ids.get(name).copied()
    }

    pub fn name(&self, id: SymbolId) -> &str {
        self.names.get(id.index()).map_or("", String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_id_per_name() {
        let mut t = NameTable::new();
        let a = t.intern("alpha");
        let b = t.intern("beta");
        assert_ne!(a, b);
        assert_eq!(t.intern("alpha"), a);
        assert_eq!(t.name(b), "beta");
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn tables_are_independent() {
        let mut one = NameTable::new();
        let mut two = NameTable::new();
        one.intern("x");
        let y = two.intern("y");
        assert_eq!(one.lookup("y"), None);
        assert_eq!(two.name(y), "y");
    }
}
