// Runtime values (`Thing`) and lexical scopes.
//
// `Thing` is the closed variant set every operation produces and
// consumes. Two operations are polymorphic across all variants: `call`
// (invoke as a function) and `dispatch` (apply a symbol, delegating to
// the first argument's type). Ownership is arena-style: every `Thing`
// and `Scope` created during a run is owned by the `Runtime` and freed
// in bulk at teardown -- see `vm::Runtime`.

use std::cell::RefCell;
use std::rc::Rc;

use crate::bytecode::Module;
use crate::error::Error;
use crate::symbol::SymbolId;

pub type RetVal = Result<Thing, Rc<Error>>;

/// An order-preserving name -> value map. Iteration order is insertion
/// order, which is observable in Module exports and Object dispatch.
#[derive(Clone, Debug, Default)]
pub struct OrderedMap<T> {
    entries: Vec<(String, T)>,
}

impl<T: Clone> OrderedMap<T> {
    pub fn new() -> OrderedMap<T> {
        OrderedMap { entries: Vec::new() }
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: T) {
        let key = key.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, T)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// `{parent, locals}`, parent-linked, shared by reference. A closure
/// captures its defining scope by sharing the `Rc`, not by copying it:
/// later mutations of enclosing bindings are observable through
/// previously created inner functions.
// `locals` is an `OrderedMap`, not a `HashMap`: module exports and object
// fields need insertion order to be observable (spec's "iteration order
// of linked-list-based maps is insertion order"), and a scope's locals
// become exactly that order once snapshotted into a `Thing::Module`.
#[derive(Debug)]
pub struct ScopeData {
    parent: Option<Scope>,
    locals: RefCell<OrderedMap<Thing>>,
}

pub type Scope = Rc<ScopeData>;

pub fn new_root_scope() -> Scope {
    Rc::new(ScopeData { parent: None, locals: RefCell::new(OrderedMap::new()) })
}

pub fn new_child_scope(parent: &Scope) -> Scope {
    Rc::new(ScopeData { parent: Some(parent.clone()), locals: RefCell::new(OrderedMap::new()) })
}

impl ScopeData {
    pub fn get(&self, name: &str) -> Option<Thing> {
        if let Some(v) = self.locals.borrow().get(name) {
            Some(v.clone())
        } else {
            self.parent.as_ref().and_then(|p| p.get(name))
        }
    }

    pub fn define(&self, name: &str, value: Thing) {
        self.locals.borrow_mut().insert(name, value);
    }

    /// Updates an existing binding anywhere in the chain; falls back to
    /// defining locally if no enclosing scope already binds `name`
    /// (top-level assignment to a fresh name).
    pub fn assign(&self, name: &str, value: Thing) {
        if self.locals.borrow().get(name).is_some() {
            self.locals.borrow_mut().insert(name, value);
        } else if let Some(p) = &self.parent {
            if p.get(name).is_some() {
                p.assign(name, value);
                return;
            }
            self.define(name, value);
        } else {
            self.define(name, value);
        }
    }

    pub fn locals_snapshot(&self) -> OrderedMap<Thing> {
        self.locals.borrow().clone()
    }
}

pub type NativeFn = fn(&mut crate::vm::Runtime, &[Thing]) -> RetVal;

#[derive(Clone)]
pub struct NativeFunc {
    pub name: &'static str,
    pub arity: Option<u8>,
    pub func: NativeFn,
}

impl std::fmt::Debug for NativeFunc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NativeFunc({})", self.name)
    }
}

#[derive(Clone, Debug)]
pub struct FuncData {
    pub entry: u32,
    pub module: Rc<Module>,
    pub captured_scope: Scope,
}

#[derive(Clone, Debug)]
pub enum Thing {
    None,
    Int(i32),
    Float(f32),
    Bool(u8),
    Str(Rc<str>, bool),
    Symbol(SymbolId, u8),
    Func(Rc<FuncData>),
    NativeFunc(Rc<NativeFunc>),
    Module(Rc<OrderedMap<Thing>>),
    Tuple(Rc<Vec<Thing>>),
    List(Rc<Thing>, Rc<Thing>),
    Object(Rc<OrderedMap<(SymbolId, Thing)>>),
    Cell(Rc<RefCell<Thing>>),
    Error(Rc<Error>),
}

impl Thing {
    pub fn str(s: impl Into<Rc<str>>, literal: bool) -> Thing {
        Thing::Str(s.into(), literal)
    }

    pub fn truthy(&self) -> bool {
        match self {
            Thing::None => false,
            Thing::Bool(v) => *v != 0,
            Thing::Int(v) => *v != 0,
            Thing::Float(v) => *v != 0.0,
            _ => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Thing::None => "none",
            Thing::Int(_) => "int",
            Thing::Float(_) => "float",
            Thing::Bool(_) => "bool",
            Thing::Str(..) => "string",
            Thing::Symbol(..) => "symbol",
            Thing::Func(_) => "function",
            Thing::NativeFunc(_) => "native function",
            Thing::Module(_) => "module",
            Thing::Tuple(_) => "tuple",
            Thing::List(..) => "list",
            Thing::Object(_) => "object",
            Thing::Cell(_) => "cell",
            Thing::Error(_) => "error",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Thing::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_chain_resolves_through_parent() {
        let root = new_root_scope();
        root.define("x", Thing::Int(1));
        let child = new_child_scope(&root);
        assert!(matches!(child.get("x"), Some(Thing::Int(1))));
    }

    #[test]
    fn scope_assign_mutates_enclosing_binding() {
        let root = new_root_scope();
        root.define("x", Thing::Int(1));
        let child = new_child_scope(&root);
        child.assign("x", Thing::Int(2));
        assert!(matches!(root.get("x"), Some(Thing::Int(2))));
    }

    #[test]
    fn ordered_map_preserves_insertion_order() {
        let mut m = OrderedMap::new();
        m.insert("b", 1);
        m.insert("a", 2);
        let keys: Vec<_> = m.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec!["b".to_string(), "a".to_string()]);
    }
}
