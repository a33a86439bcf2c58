// Symbol identity.
//
// Every operator -- arithmetic, comparison, logic, and otherwise -- is a
// first-class `Thing::Symbol(id, arity)` rather than a VM special case.
// Applying one dispatches to the first argument's type-specific handler
// (see value::Thing::dispatch). Ids are allocated from a counter carried
// on the `Runtime`, not a process-wide static, so constructing a second
// interpreter in the same process never collides with the first one's.

pub type SymbolId = u32;

pub const ADD: SymbolId = 0;
pub const SUB: SymbolId = 1;
pub const MUL: SymbolId = 2;
pub const DIV: SymbolId = 3;
pub const EQ: SymbolId = 4;
pub const NEQ: SymbolId = 5;
pub const LT: SymbolId = 6;
pub const LTE: SymbolId = 7;
pub const GT: SymbolId = 8;
pub const GTE: SymbolId = 9;
pub const AND: SymbolId = 10;
pub const OR: SymbolId = 11;
pub const NOT: SymbolId = 12;
pub const DOT: SymbolId = 13;
pub const GET: SymbolId = 14;
pub const CALL: SymbolId = 15;
pub const UNPACK: SymbolId = 16;
pub const RESPONDS_TO: SymbolId = 17;

pub const FIXED_SYMBOLS: &[(&str, u8, SymbolId)] = &[
    ("+", 2, ADD),
    ("-", 2, SUB),
    ("*", 2, MUL),
    ("/", 2, DIV),
    ("==", 2, EQ),
    ("!=", 2, NEQ),
    ("<", 2, LT),
    ("<=", 2, LTE),
    (">", 2, GT),
    (">=", 2, GTE),
    ("and", 2, AND),
    ("or", 2, OR),
    ("not", 1, NOT),
    (".", 2, DOT),
    ("get", 2, GET),
    ("call", 1, CALL),
    ("unpack", 1, UNPACK),
    ("responds_to", 2, RESPONDS_TO),
];

/// Allocates symbol ids, starting after the fixed operator block above.
/// Lives on `Runtime` so separate interpreter instances never share state.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    next_id: SymbolId,
    names: Vec<(SymbolId, String, u8)>,
}

impl SymbolTable {
    pub fn new() -> SymbolTable {
        let mut names = Vec::new();
        let mut next_id = 0;
        for &(name, arity, id) in FIXED_SYMBOLS {
            names.push((id, name.to_string(), arity));
            next_id = next_id.max(id + 1);
        }
        SymbolTable { next_id, names }
    }

    /// Allocates a fresh anonymous symbol id (used by the `createSymbol`
    /// native), bypassing name-based dedup since anonymous symbols never
    /// need to be looked up by name.
    pub fn fresh(&mut self, arity: u8) -> SymbolId {
        let id = self.next_id;
        self.next_id += 1;
        self.names.push((id, format!("$anon{}", id), arity));
        id
    }

    pub fn intern(&mut self, name: &str, arity: u8) -> SymbolId {
        if let Some((id, _, _)) = self.names.iter().find(|(_, n, _)| n == name) {
            return *id;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.names.push((id, name.to_string(), arity));
        id
    }

    pub fn name_of(&self, id: SymbolId) -> Option<&str> {
        self.names.iter().find(|(i, _, _)| *i == id).map(|(_, n, _)| n.as_str())
    }

    pub fn arity_of(&self, id: SymbolId) -> Option<u8> {
        self.names.iter().find(|(i, _, _)| *i == id).map(|(_, _, a)| *a)
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        SymbolTable::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_symbols_are_stable() {
        let table = SymbolTable::new();
        assert_eq!(table.name_of(ADD), Some("+"));
        assert_eq!(table.arity_of(NOT), Some(1));
    }

    #[test]
    fn intern_is_idempotent() {
        let mut table = SymbolTable::new();
        let a = table.intern("frobnicate", 3);
        let b = table.intern("frobnicate", 3);
        assert_eq!(a, b);
        assert_ne!(a, ADD);
    }
}
