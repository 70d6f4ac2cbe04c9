//! Hybrid array / associative list.
//!
//! A [`List`] is an ordered sequence of slots.  The first keyed access creates
//! a key index mapping string keys to positions (and back), so the same
//! container serves `a[i]` and `a{"k"}`.  Every position has at most one key
//! and keys are unique.  Re-keying moves a key to another position and
//! appending under a key that is already mapped overwrites that element;
//! neither changes the length.

use std::collections::HashMap;
use std::rc::Rc;

use super::slot::{Slot, SlotRef};
use super::value::Value;

#[derive(Debug, Default, Clone, PartialEq)]
struct KeyIndex {
    by_key: HashMap<String, usize>,
    by_pos: HashMap<usize, String>,
}

#[derive(Debug, Default)]
pub struct List {
    items: Vec<SlotRef>,
    keys: Option<KeyIndex>,
}

impl Clone for List {
    /// Copies every element slot: lists have value semantics.  Objects and
    /// pointers inside the elements are shared.
    fn clone(&self) -> Self {
        List {
            items: self
                .items
                .iter()
                .map(|slot| slot.borrow().clone().into_ref())
                .collect(),
            keys: self.keys.clone(),
        }
    }
}

impl PartialEq for List {
    fn eq(&self, other: &List) -> bool {
        self.len() == other.len()
            && self.keys.as_ref().map(|k| &k.by_pos) == other.keys.as_ref().map(|k| &k.by_pos)
            && self
                .items
                .iter()
                .zip(&other.items)
                .all(|(a, b)| a.borrow().value == b.borrow().value)
    }
}

impl List {
    pub fn new() -> Self {
        Self::default()
    }

    /// List of variant slots holding `values`.
    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        List {
            items: values
                .into_iter()
                .map(|v| Slot::variant(v).into_ref())
                .collect(),
            keys: None,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn slots(&self) -> &[SlotRef] {
        &self.items
    }

    pub fn get(&self, pos: usize) -> Option<SlotRef> {
        self.items.get(pos).cloned()
    }

    /// Snapshot of the element values.
    pub fn values(&self) -> Vec<Value> {
        self.items.iter().map(|s| s.borrow().value.clone()).collect()
    }

    pub fn push(&mut self, slot: SlotRef) {
        self.items.push(slot);
    }

    pub fn push_value(&mut self, value: Value) {
        self.items.push(Slot::variant(value).into_ref());
    }

    /// Append `slot` and key it.  If `key` is already mapped, the mapped
    /// element takes the new value and the sequence is left unchanged.
    pub fn push_keyed(&mut self, key: &str, slot: SlotRef) {
        if let Some(existing) = self.get_key(key) {
            if !Rc::ptr_eq(&existing, &slot) {
                let value = slot.borrow().value.clone();
                existing.borrow_mut().value = value;
            }
            return;
        }
        self.items.push(slot);
        self.set_key(self.items.len() - 1, key);
    }

    /// Drop every element from `len` on.
    pub fn truncate(&mut self, len: usize) {
        self.items.truncate(len);
        if let Some(index) = &mut self.keys {
            index.by_pos.retain(|&pos, _| pos < len);
            index.by_key.retain(|_, pos| *pos < len);
        }
    }

    // ── Key index ─────────────────────────────────────────────────────────────

    pub fn has_keys(&self) -> bool {
        self.keys.is_some()
    }

    pub fn key_of(&self, pos: usize) -> Option<&str> {
        self.keys.as_ref()?.by_pos.get(&pos).map(String::as_str)
    }

    pub fn position_of(&self, key: &str) -> Option<usize> {
        self.keys.as_ref()?.by_key.get(key).copied()
    }

    pub fn get_key(&self, key: &str) -> Option<SlotRef> {
        self.position_of(key).and_then(|pos| self.get(pos))
    }

    /// Key position `pos` with `key`.  A key already mapped elsewhere moves
    /// here; a key previously held by `pos` is forgotten.
    pub fn set_key(&mut self, pos: usize, key: &str) {
        let index = self.keys.get_or_insert_with(KeyIndex::default);
        if let Some(old_pos) = index.by_key.insert(key.to_owned(), pos) {
            if old_pos != pos {
                index.by_pos.remove(&old_pos);
            }
        }
        if let Some(old_key) = index.by_pos.insert(pos, key.to_owned()) {
            if old_key != key {
                index.by_key.remove(&old_key);
            }
        }
    }

    /// Keys in position order.
    pub fn keys(&self) -> Vec<String> {
        let Some(index) = &self.keys else {
            return Vec::new();
        };
        let mut keyed: Vec<_> = index.by_pos.iter().collect();
        keyed.sort_by_key(|(pos, _)| **pos);
        keyed.into_iter().map(|(_, k)| k.clone()).collect()
    }

    /// Copy the key index of `other` onto this list (positions beyond this
    /// list's length are skipped).
    pub fn copy_keys_from(&mut self, other: &List) {
        let Some(index) = &other.keys else {
            return;
        };
        for (pos, key) in &index.by_pos {
            if *pos < self.len() {
                self.set_key(*pos, key);
            }
        }
    }

    /// A new list sharing the given element slots (no copy).
    pub fn from_slots(items: Vec<SlotRef>) -> Self {
        List { items, keys: None }
    }

    /// `true` if `slot` is one of this list's elements.
    pub fn contains_slot(&self, slot: &SlotRef) -> bool {
        self.items.iter().any(|s| Rc::ptr_eq(s, slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_copies_slots() {
        let a = List::from_values(vec![Value::Long(1), Value::Long(2)]);
        let b = a.clone();
        b.slots()[0].borrow_mut().value = Value::Long(10);
        assert_eq!(a.values(), vec![Value::Long(1), Value::Long(2)]);
        assert_eq!(b.values()[0], Value::Long(10));
    }

    #[test]
    fn duplicate_key_overwrites_in_place() {
        let mut l = List::new();
        l.push_keyed("a", Slot::variant(Value::Long(1)).into_ref());
        l.push_keyed("b", Slot::variant(Value::Long(5)).into_ref());
        l.push_keyed("a", Slot::variant(Value::Long(2)).into_ref());
        assert_eq!(l.len(), 2);
        assert_eq!(l.position_of("a"), Some(0));
        assert_eq!(l.key_of(0), Some("a"));
        assert_eq!(l.values(), vec![Value::Long(2), Value::Long(5)]);
    }

    #[test]
    fn rekeying_a_position_forgets_old_key() {
        let mut l = List::from_values(vec![Value::Long(1)]);
        l.set_key(0, "x");
        l.set_key(0, "y");
        assert_eq!(l.position_of("x"), None);
        assert_eq!(l.keys(), vec!["y".to_string()]);
    }

    #[test]
    fn truncate_drops_keys() {
        let mut l = List::from_values(vec![Value::Long(1), Value::Long(2)]);
        l.set_key(1, "b");
        l.truncate(1);
        assert_eq!(l.position_of("b"), None);
        assert_eq!(l.len(), 1);
    }

    #[test]
    fn keyed_display() {
        let mut l = List::new();
        l.push_keyed("a", Slot::variant(Value::Long(1)).into_ref());
        l.push_keyed("b", Slot::variant(Value::from("x")).into_ref());
        assert_eq!(Value::List(l).to_string(), "{\"a\"=>1,\"b\"=>\"x\"}");
    }
}
