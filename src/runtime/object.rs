//! Objects and their ordered property storage.
//!
//! Properties keep insertion order: a slot vector of `{ key, value,
//! enumerable }` plus a key-to-slot index. Array elements live in the object
//! kind, not in the property map.

use std::{cell::RefCell, collections::HashMap, rc::Rc};

use super::value::{Callable, Value};

pub type ObjectRef = Rc<RefCell<Object>>;

/// Largest `length` an array can have.
pub const MAX_ARRAY_LENGTH: f64 = 4_294_967_295.0;

/// Array elements below this index are stored densely. Higher indices are
/// kept in the property map and do not count towards `length`.
pub const MAX_DENSE_LENGTH: usize = 1 << 20;

#[derive(Debug, Clone)]
pub struct Property {
    pub key: String,
    pub value: Value,
    pub enumerable: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PropertyMap {
    slots: Vec<Property>,
    index: HashMap<String, usize>,
}

impl PropertyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn property(&self, key: &str) -> Option<&Property> {
        self.index.get(key).map(|&slot| &self.slots[slot])
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.property(key).map(|p| &p.value)
    }

    /// Assignment: existing properties keep their flags, new ones are
    /// enumerable.
    pub fn set(&mut self, key: &str, value: Value) {
        match self.index.get(key) {
            Some(&slot) => self.slots[slot].value = value,
            None => self.push(key, value, true),
        }
    }

    /// Definition: creates or overwrites the property with the given flag.
    pub fn define(&mut self, key: &str, value: Value, enumerable: bool) {
        match self.index.get(key) {
            Some(&slot) => {
                let prop = &mut self.slots[slot];
                prop.value = value;
                prop.enumerable = enumerable;
            }
            None => self.push(key, value, enumerable),
        }
    }

    pub fn set_enumerable(&mut self, key: &str, enumerable: bool) {
        if let Some(&slot) = self.index.get(key) {
            self.slots[slot].enumerable = enumerable;
        }
    }

    pub fn remove(&mut self, key: &str) -> bool {
        let Some(slot) = self.index.remove(key) else {
            return false;
        };
        self.slots.remove(slot);
        for (i, prop) in self.slots.iter().enumerate().skip(slot) {
            self.index.insert(prop.key.clone(), i);
        }
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &Property> {
        self.slots.iter()
    }

    pub fn enumerable_keys(&self) -> impl Iterator<Item = &str> {
        self.slots
            .iter()
            .filter(|p| p.enumerable)
            .map(|p| p.key.as_str())
    }

    fn push(&mut self, key: &str, value: Value, enumerable: bool) {
        self.index.insert(key.to_string(), self.slots.len());
        self.slots.push(Property {
            key: key.to_string(),
            value,
            enumerable,
        });
    }
}

#[derive(Clone)]
pub enum ObjectKind {
    Ordinary,
    Array(Vec<Value>),
    Function(Callable),
    Error,
}

pub struct Object {
    pub kind: ObjectKind,
    pub props: PropertyMap,
    pub proto: Option<ObjectRef>,
}

impl Object {
    pub fn alloc(kind: ObjectKind, proto: Option<ObjectRef>) -> ObjectRef {
        Rc::new(RefCell::new(Object {
            kind,
            props: PropertyMap::new(),
            proto,
        }))
    }

    pub fn callable(&self) -> Option<&Callable> {
        match &self.kind {
            ObjectKind::Function(c) => Some(c),
            _ => None,
        }
    }

    /// Own property, including array elements and `length`.
    pub fn get_own(&self, key: &str) -> Option<Value> {
        if let ObjectKind::Array(items) = &self.kind {
            if key == "length" {
                return Some(Value::Number(items.len() as f64));
            }
            if let Some(value) = array_index(key).and_then(|i| items.get(i)) {
                return Some(value.clone());
            }
        }
        self.props.get(key).cloned()
    }

    pub fn has_own(&self, key: &str) -> bool {
        if let ObjectKind::Array(items) = &self.kind {
            if key == "length" || array_index(key).is_some_and(|i| i < items.len()) {
                return true;
            }
        }
        self.props.contains(key)
    }

    /// Why assigning `value` to `key` must throw a `RangeError`, if it must.
    /// Only an array's `length` can be rejected.
    pub fn rejects(&self, key: &str, value: &Value) -> Option<&'static str> {
        if !matches!(self.kind, ObjectKind::Array(_)) || key != "length" {
            return None;
        }
        let len = value.primitive_to_number();
        if !(0.0..=MAX_ARRAY_LENGTH).contains(&len) || len.fract() != 0.0 {
            Some("Invalid array length")
        } else if len > MAX_DENSE_LENGTH as f64 {
            Some("Array length exceeds the supported maximum")
        } else {
            None
        }
    }

    /// Assignment to an own property. A rejected array `length` is ignored;
    /// callers that can throw check [`Object::rejects`] first.
    pub fn put(&mut self, key: &str, value: Value) {
        if matches!(self.kind, ObjectKind::Array(_)) && key == "length" {
            if self.rejects(key, &value).is_none() {
                self.truncate_or_grow(value.primitive_to_number() as usize);
            }
            return;
        }
        if let ObjectKind::Array(items) = &mut self.kind {
            if let Some(i) = array_index(key).filter(|&i| i < MAX_DENSE_LENGTH) {
                if i >= items.len() {
                    items.resize(i + 1, Value::Undefined);
                }
                items[i] = value;
                return;
            }
        }
        self.props.set(key, value);
    }

    fn truncate_or_grow(&mut self, len: usize) {
        if let ObjectKind::Array(items) = &mut self.kind {
            items.resize(len, Value::Undefined);
        }
        let cut: Vec<String> = self
            .props
            .iter()
            .filter(|p| array_index(&p.key).is_some_and(|i| i >= len))
            .map(|p| p.key.clone())
            .collect();
        for key in cut {
            self.props.remove(&key);
        }
    }

    pub fn delete(&mut self, key: &str) -> bool {
        if let ObjectKind::Array(items) = &mut self.kind {
            if let Some(slot) = array_index(key).and_then(|i| items.get_mut(i)) {
                *slot = Value::Undefined;
                return true;
            }
        }
        self.props.remove(key);
        true
    }

    /// Enumerable own keys in order: array indices first, then properties.
    pub fn own_enumerable_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        if let ObjectKind::Array(items) = &self.kind {
            keys.extend((0..items.len()).map(|i| i.to_string()));
        }
        keys.extend(self.props.enumerable_keys().map(str::to_string));
        keys
    }
}

/// Looks `key` up along the prototype chain.
pub fn lookup(obj: &ObjectRef, key: &str) -> Option<Value> {
    let mut current = Some(obj.clone());
    while let Some(o) = current {
        let o = o.borrow();
        if let Some(value) = o.get_own(key) {
            return Some(value);
        }
        current = o.proto.clone();
    }
    None
}

pub fn has_property(obj: &ObjectRef, key: &str) -> bool {
    let mut current = Some(obj.clone());
    while let Some(o) = current {
        let o = o.borrow();
        if o.has_own(key) {
            return true;
        }
        current = o.proto.clone();
    }
    false
}

/// True when `key` is an own, enumerable property of `obj`.
pub fn is_enumerable(obj: &ObjectRef, key: &str) -> bool {
    let o = obj.borrow();
    if let ObjectKind::Array(items) = &o.kind {
        if array_index(key).is_some_and(|i| i < items.len()) {
            return true;
        }
    }
    o.props.property(key).is_some_and(|p| p.enumerable)
}

/// Keys visited by `for...in`: own enumerable keys, then inherited ones not
/// already seen.
pub fn for_in_keys(obj: &ObjectRef) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    let mut current = Some(obj.clone());
    while let Some(o) = current {
        let o = o.borrow();
        for key in o.own_enumerable_keys() {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        current = o.proto.clone();
    }
    keys
}

pub fn array_index(key: &str) -> Option<usize> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    if !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    key.parse::<u32>()
        .ok()
        .filter(|&i| i != u32::MAX)
        .map(|i| i as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_map_keeps_insertion_order() {
        let mut map = PropertyMap::new();
        for key in ["p2", "p0", "p1"] {
            map.set(key, Value::Null);
        }
        map.set("p0", Value::Bool(true));
        let keys: Vec<_> = map.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, vec!["p2", "p0", "p1"]);
        assert!(matches!(map.get("p0"), Some(Value::Bool(true))));
    }

    #[test]
    fn set_keeps_flags_define_overwrites_them() {
        let mut map = PropertyMap::new();
        map.define("hidden", Value::Null, false);
        map.set("hidden", Value::Bool(true));
        assert_eq!(map.enumerable_keys().count(), 0);
        map.define("hidden", Value::Null, true);
        assert_eq!(map.enumerable_keys().collect::<Vec<_>>(), vec!["hidden"]);
    }

    #[test]
    fn remove_reindexes_later_slots() {
        let mut map = PropertyMap::new();
        for key in ["a", "b", "c"] {
            map.set(key, Value::Null);
        }
        assert!(map.remove("a"));
        map.set("c", Value::Bool(false));
        assert_eq!(map.len(), 2);
        assert!(matches!(map.get("c"), Some(Value::Bool(false))));
    }

    #[test]
    fn enumerability_query() {
        let obj = Object::alloc(ObjectKind::Ordinary, None);
        obj.borrow_mut().props.define("__FILE__", Value::str("x"), false);
        obj.borrow_mut().put("visible", Value::Null);
        assert!(!is_enumerable(&obj, "__FILE__"));
        assert!(is_enumerable(&obj, "visible"));
        assert!(!is_enumerable(&obj, "missing"));
    }

    #[test]
    fn arrays_grow_on_index_assignment() {
        let arr = Object::alloc(ObjectKind::Array(vec![]), None);
        arr.borrow_mut().put("2", Value::Number(1.0));
        assert!(matches!(arr.borrow().get_own("length"), Some(Value::Number(n)) if n == 3.0));
        assert_eq!(arr.borrow().own_enumerable_keys(), vec!["0", "1", "2"]);
        assert_eq!(array_index("01"), None);
    }

    #[test]
    fn far_indices_are_stored_sparsely() {
        let arr = Object::alloc(ObjectKind::Array(vec![]), None);
        arr.borrow_mut().put("1000000000000000", Value::Number(1.0));
        arr.borrow_mut().put("4000000000", Value::Number(2.0));
        let arr = arr.borrow();
        assert!(matches!(arr.get_own("length"), Some(Value::Number(n)) if n == 0.0));
        assert!(matches!(arr.get_own("4000000000"), Some(Value::Number(n)) if n == 2.0));
        assert_eq!(array_index("4294967295"), None);
    }

    #[test]
    fn oversized_lengths_are_rejected() {
        let arr = Object::alloc(ObjectKind::Array(vec![Value::Null]), None);
        let mut arr = arr.borrow_mut();
        assert!(arr.rejects("length", &Value::Number(4_294_967_296.0)).is_some());
        assert!(arr.rejects("length", &Value::Number(4_294_967_295.0)).is_some());
        assert!(arr.rejects("length", &Value::Number(1.5)).is_some());
        assert!(arr.rejects("length", &Value::Number(0.0)).is_none());
        arr.put("length", Value::Number(4_294_967_295.0));
        assert!(matches!(arr.get_own("length"), Some(Value::Number(n)) if n == 1.0));
    }
}
