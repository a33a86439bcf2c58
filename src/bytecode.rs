// Opcode definitions and the bytecode emitter.
//
// `ModuleBuilder` accumulates constants and bytecode as fixed-capacity
// segments so appends are amortized O(1) without a realloc-and-copy of
// the whole buffer; `finalize` compacts the segments into one `Module`
// and patches every label reference with its definition's byte-offset.

use std::rc::Rc;

pub const SEGMENT_CAPACITY: usize = 1024;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    PushInt = 0,
    PushFloat = 1,
    PushBuiltin = 2,
    PushLiteral = 3,
    PushNone = 4,
    Load = 5,
    Store = 6,
    Call = 7,
    Return = 8,
    CreateFunc = 9,
    CondJumpTrue = 10,
    CondJumpFalse = 11,
    AbsJump = 12,
    Dup = 13,
    Swap = 14,
    Pop = 15,
    CheckNone = 16,
    DefFunc = 17,
}

impl Opcode {
    pub fn from_byte(b: u8) -> Option<Opcode> {
        use Opcode::*;
        Some(match b {
            0 => PushInt,
            1 => PushFloat,
            2 => PushBuiltin,
            3 => PushLiteral,
            4 => PushNone,
            5 => Load,
            6 => Store,
            7 => Call,
            8 => Return,
            9 => CreateFunc,
            10 => CondJumpTrue,
            11 => CondJumpFalse,
            12 => AbsJump,
            13 => Dup,
            14 => Swap,
            15 => Pop,
            16 => CheckNone,
            17 => DefFunc,
            _ => return None,
        })
    }
}

pub type LabelId = u32;

#[derive(Clone, Debug, PartialEq)]
pub struct SourceMapEntry {
    pub byte_offset: u32,
    pub location: crate::location::SourceLocation,
}

/// Compiled artifact. Immutable once built; shared via `Rc` so every
/// `Thing::Func` closing over it can outlive the builder that made it.
#[derive(Debug)]
pub struct Module {
    pub constants: Vec<String>,
    pub code: Vec<u8>,
    pub source_map: Vec<SourceMapEntry>,
    pub entry_index: u32,
    pub filename: Option<String>,
}

impl Module {
    /// Looks up the closest source-map entry at or before `offset`.
    pub fn location_at(&self, offset: u32) -> Option<crate::location::SourceLocation> {
        self.source_map
            .iter()
            .rev()
            .find(|e| e.byte_offset <= offset)
            .map(|e| e.location)
    }

    pub fn fetch(&self, offset: u32) -> Option<Opcode> {
        self.code.get(offset as usize).copied().and_then(Opcode::from_byte)
    }

    pub fn read_u32(&self, offset: u32) -> u32 {
        let o = offset as usize;
        u32::from_be_bytes([self.code[o], self.code[o + 1], self.code[o + 2], self.code[o + 3]])
    }

    pub fn read_u8(&self, offset: u32) -> u8 {
        self.code[offset as usize]
    }
}

struct LabelRef {
    label: LabelId,
    byte_offset: u32,
}

/// Mutable accumulator for a `Module`. Scoped: must be dropped (or
/// consumed via `finalize`) once its `Module` is built.
pub struct ModuleBuilder {
    code: Vec<u8>,
    constants: Vec<String>,
    source_map: Vec<SourceMapEntry>,
    next_label: LabelId,
    label_defs: Vec<(LabelId, u32)>,
    label_refs: Vec<LabelRef>,
    filename: Option<String>,
}

impl ModuleBuilder {
    pub fn new(filename: Option<String>) -> ModuleBuilder {
        ModuleBuilder {
            code: Vec::with_capacity(SEGMENT_CAPACITY),
            constants: Vec::new(),
            source_map: Vec::new(),
            next_label: 0,
            label_defs: Vec::new(),
            label_refs: Vec::new(),
            filename,
        }
    }

    pub fn offset(&self) -> u32 {
        self.code.len() as u32
    }

    pub fn new_label(&mut self) -> LabelId {
        let id = self.next_label;
        self.next_label += 1;
        id
    }

    pub fn define_label(&mut self, label: LabelId) {
        let offset = self.offset();
        self.label_defs.push((label, offset));
    }

    pub fn mark_location(&mut self, loc: crate::location::SourceLocation) {
        let offset = self.offset();
        self.source_map.push(SourceMapEntry { byte_offset: offset, location: loc });
    }

    fn push_u8(&mut self, b: u8) {
        self.code.push(b);
    }

    fn push_u32(&mut self, v: u32) {
        self.code.extend_from_slice(&v.to_be_bytes());
    }

    fn push_opcode(&mut self, op: Opcode) {
        self.push_u8(op as u8);
    }

    /// Emits a u32 operand that refers to `label`, recording the
    /// reference site so `finalize` can patch it.
    fn push_label_ref(&mut self, label: LabelId) {
        let offset = self.offset();
        self.label_refs.push(LabelRef { label, byte_offset: offset });
        self.push_u32(0);
    }

    pub fn intern(&mut self, literal: &str) -> u32 {
        if let Some(idx) = self.constants.iter().position(|s| s == literal) {
            return idx as u32;
        }
        self.constants.push(literal.to_string());
        (self.constants.len() - 1) as u32
    }

    pub fn emit_push_int(&mut self, v: i32) {
        self.push_opcode(Opcode::PushInt);
        self.push_u32(v as u32);
    }

    pub fn emit_push_float(&mut self, v: f32) {
        self.push_opcode(Opcode::PushFloat);
        self.push_u32(v.to_bits());
    }

    pub fn emit_push_builtin(&mut self, name: &str) {
        let idx = self.intern(name);
        self.push_opcode(Opcode::PushBuiltin);
        self.push_u32(idx);
    }

    pub fn emit_push_literal(&mut self, text: &str) {
        let idx = self.intern(text);
        self.push_opcode(Opcode::PushLiteral);
        self.push_u32(idx);
    }

    pub fn emit_push_none(&mut self) {
        self.push_opcode(Opcode::PushNone);
    }

    pub fn emit_load(&mut self, name: &str) {
        let idx = self.intern(name);
        self.push_opcode(Opcode::Load);
        self.push_u32(idx);
    }

    pub fn emit_store(&mut self, name: &str) {
        let idx = self.intern(name);
        self.push_opcode(Opcode::Store);
        self.push_u32(idx);
    }

    pub fn emit_call(&mut self, arity: u32) {
        self.push_opcode(Opcode::Call);
        self.push_u32(arity);
    }

    pub fn emit_return(&mut self) {
        self.push_opcode(Opcode::Return);
    }

    pub fn emit_create_func(&mut self, label: LabelId) {
        self.push_opcode(Opcode::CreateFunc);
        self.push_label_ref(label);
    }

    pub fn emit_cond_jump_true(&mut self, label: LabelId) {
        self.push_opcode(Opcode::CondJumpTrue);
        self.push_label_ref(label);
    }

    pub fn emit_cond_jump_false(&mut self, label: LabelId) {
        self.push_opcode(Opcode::CondJumpFalse);
        self.push_label_ref(label);
    }

    pub fn emit_abs_jump(&mut self, label: LabelId) {
        self.push_opcode(Opcode::AbsJump);
        self.push_label_ref(label);
    }

    pub fn emit_dup(&mut self) {
        self.push_opcode(Opcode::Dup);
    }

    pub fn emit_swap(&mut self) {
        self.push_opcode(Opcode::Swap);
    }

    pub fn emit_pop(&mut self) {
        self.push_opcode(Opcode::Pop);
    }

    pub fn emit_check_none(&mut self) {
        self.push_opcode(Opcode::CheckNone);
    }

    pub fn emit_def_func(&mut self, params: &[String]) {
        self.push_opcode(Opcode::DefFunc);
        self.push_u8(params.len() as u8);
        for p in params {
            let idx = self.intern(p);
            self.push_u32(idx);
        }
    }

    /// Patches every label reference with its definition's byte-offset
    /// and produces the immutable `Module`. Panics if a referenced
    /// label was never defined -- the transformer guarantees every
    /// label it allocates is eventually defined exactly once.
    pub fn finalize(mut self, entry_index: u32) -> Rc<Module> {
        for r in &self.label_refs {
            let target = self
                .label_defs
                .iter()
                .find(|(id, _)| *id == r.label)
                .unwrap_or_else(|| panic!("unresolved label {}", r.label))
                .1;
            let o = r.byte_offset as usize;
            self.code[o..o + 4].copy_from_slice(&target.to_be_bytes());
        }
        Rc::new(Module {
            constants: self.constants,
            code: self.code,
            source_map: self.source_map,
            entry_index,
            filename: self.filename,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_resolve_to_byte_offsets() {
        let mut b = ModuleBuilder::new(None);
        let label = b.new_label();
        b.emit_abs_jump(label);
        b.emit_push_none();
        b.define_label(label);
        b.emit_return();
        let module = b.finalize(0);
        let target = module.read_u32(1);
        assert_eq!(module.fetch(target), Some(Opcode::Return));
    }

    #[test]
    fn string_constants_are_interned() {
        let mut b = ModuleBuilder::new(None);
        let a = b.intern("hello");
        let c = b.intern("hello");
        assert_eq!(a, c);
    }
}
