use std::{cell::RefCell, collections::HashMap, rc::Rc};

use super::object::{has_property, lookup, ObjectRef};
use super::value::Value;

pub type ScopeRef = Rc<Scope>;

/// A lexical environment. The outermost scope is backed by the global object.
pub enum Scope {
    Global(ObjectRef),
    Local {
        vars: RefCell<HashMap<String, Value>>,
        parent: ScopeRef,
    },
}

impl Scope {
    pub fn global(object: ObjectRef) -> ScopeRef {
        Rc::new(Scope::Global(object))
    }

    pub fn local(parent: ScopeRef) -> ScopeRef {
        Rc::new(Scope::Local {
            vars: RefCell::new(HashMap::new()),
            parent,
        })
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        match self {
            Scope::Global(object) => lookup(object, name),
            Scope::Local { vars, parent } => match vars.borrow().get(name) {
                Some(value) => Some(value.clone()),
                None => parent.lookup(name),
            },
        }
    }

    pub fn is_declared(&self, name: &str) -> bool {
        match self {
            Scope::Global(object) => has_property(object, name),
            Scope::Local { vars, parent } => {
                vars.borrow().contains_key(name) || parent.is_declared(name)
            }
        }
    }

    /// Assigns to the nearest binding; unknown names become global properties.
    pub fn assign(&self, name: &str, value: Value) {
        match self {
            Scope::Global(object) => object.borrow_mut().put(name, value),
            Scope::Local { vars, parent } => {
                if let Some(slot) = vars.borrow_mut().get_mut(name) {
                    *slot = value;
                    return;
                }
                parent.assign(name, value);
            }
        }
    }

    /// Declares `name` in this scope. An existing binding keeps its value
    /// unless `value` is given.
    pub fn declare(&self, name: &str, value: Option<Value>) {
        match self {
            Scope::Global(object) => {
                let mut object = object.borrow_mut();
                match value {
                    Some(value) => object.put(name, value),
                    None if !object.has_own(name) => object.put(name, Value::Undefined),
                    None => {}
                }
            }
            Scope::Local { vars, .. } => {
                let mut vars = vars.borrow_mut();
                match value {
                    Some(value) => {
                        vars.insert(name.to_string(), value);
                    }
                    None => {
                        vars.entry(name.to_string()).or_insert(Value::Undefined);
                    }
                }
            }
        }
    }

    /// The binding in this exact scope, without walking outwards.
    pub fn own(&self, name: &str) -> Option<Value> {
        match self {
            Scope::Global(object) => object.borrow().get_own(name),
            Scope::Local { vars, .. } => vars.borrow().get(name).cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::object::{is_enumerable, Object, ObjectKind};

    #[test]
    fn assignment_walks_out_to_the_global_object() {
        let global = Object::alloc(ObjectKind::Ordinary, None);
        let outer = Scope::global(global.clone());
        let inner = Scope::local(outer.clone());
        inner.declare("local", Some(Value::Number(1.0)));
        inner.assign("leaked", Value::Number(2.0));
        assert!(outer.lookup("local").is_none());
        assert!(matches!(outer.lookup("leaked"), Some(Value::Number(n)) if n == 2.0));
        assert!(is_enumerable(&global, "leaked"));
    }

    #[test]
    fn redeclaring_keeps_the_value() {
        let scope = Scope::local(Scope::global(Object::alloc(ObjectKind::Ordinary, None)));
        scope.declare("x", Some(Value::Number(3.0)));
        scope.declare("x", None);
        assert!(matches!(scope.lookup("x"), Some(Value::Number(n)) if n == 3.0));
    }
}
