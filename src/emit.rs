// Final stage of the pipeline: walks the fully-lowered `Token` tree into
// `ModuleBuilder` opcode emissions.
//
// By the time a tree reaches here, the nine transform passes have
// already rewritten it to a top-level `Block` of named `Func` siblings
// (one of them `$init`), whose bodies contain only the lowering-tag
// statement forms plus the handful of expression shapes the passes
// deliberately leave alone: `Int`, `Float`, `Literal`, `Identifier`,
// `Tuple`, `Call`, `BinaryOp`, `UnaryOp`. Those are compiled directly
// here rather than through an explicit pass, same as the teacher's
// emitter folds its own small-expression cases into the encode step
// instead of a dedicated rewrite.

use std::collections::HashMap;
use std::rc::Rc;

use crate::bytecode::{LabelId, Module, ModuleBuilder};
use crate::token::{Token, TokenKind};

pub fn emit_module(lowered: Token, filename: Option<String>) -> Rc<Module> {
    let funcs = match lowered.kind {
        TokenKind::Block(stmts) => stmts,
        other => panic!("expected a top-level block of functions, found {:?}", other),
    };

    let mut builder = ModuleBuilder::new(filename);

    // Forward-declare a label for every hoisted function so a `NewFunc`
    // reference can resolve regardless of definition order.
    let mut func_labels: HashMap<String, LabelId> = HashMap::new();
    for func in &funcs {
        if let TokenKind::Func(Some(name), _, _) = &func.kind {
            if name != "$init" {
                func_labels.insert(name.clone(), builder.new_label());
            }
        }
    }

    let mut entry_offset = None;
    let mut jump_labels: HashMap<u32, LabelId> = HashMap::new();

    for func in funcs {
        let (name, params, body) = match func.kind {
            TokenKind::Func(Some(name), params, body) => (name, params, body),
            other => panic!("expected a named function at module top level, found {:?}", other),
        };

        if name == "$init" {
            entry_offset = Some(builder.offset());
        } else {
            builder.define_label(func_labels[&name]);
        }

        builder.mark_location(func.loc);
        builder.emit_def_func(&params);
        {
            let mut emitter = Emitter { builder: &mut builder, func_labels: &func_labels, jump_labels: &mut jump_labels };
            emitter.compile_block(&body);
        }
        // Falling off the end of a function body without an explicit
        // `<-` returns `none`.
        builder.emit_push_none();
        builder.emit_return();
    }

    builder.finalize(entry_offset.expect("lowered module has no $init"))
}

struct Emitter<'a> {
    builder: &'a mut ModuleBuilder,
    func_labels: &'a HashMap<String, LabelId>,
    jump_labels: &'a mut HashMap<u32, LabelId>,
}

impl<'a> Emitter<'a> {
    fn label_for_jump(&mut self, id: u32) -> LabelId {
        *self.jump_labels.entry(id).or_insert_with(|| self.builder.new_label())
    }

    fn compile_block(&mut self, block: &Token) {
        match &block.kind {
            TokenKind::Block(stmts) => {
                for stmt in stmts {
                    self.compile_stmt(stmt);
                }
            }
            other => self.compile_stmt(&Token::new(block.loc, other.clone())),
        }
    }

    fn compile_stmt(&mut self, t: &Token) {
        self.builder.mark_location(t.loc);
        match &t.kind {
            TokenKind::Block(_) => self.compile_block(t),
            TokenKind::Label(id) => {
                let label = self.label_for_jump(*id);
                self.builder.define_label(label);
            }
            TokenKind::AbsJump(id) => {
                let label = self.label_for_jump(*id);
                self.builder.emit_abs_jump(label);
            }
            TokenKind::CondJump(cond, id, when) => {
                self.compile_expr(cond);
                let label = self.label_for_jump(*id);
                if *when {
                    self.builder.emit_cond_jump_true(label);
                } else {
                    self.builder.emit_cond_jump_false(label);
                }
            }
            TokenKind::Return(e) => {
                self.compile_expr(e);
                self.builder.emit_return();
            }
            TokenKind::Store(name) => self.builder.emit_store(name),
            TokenKind::Dup => self.builder.emit_dup(),
            TokenKind::Push(inner) => self.compile_expr(inner),
            TokenKind::Swap => self.builder.emit_swap(),
            TokenKind::Pop => self.builder.emit_pop(),
            TokenKind::CheckNone => self.builder.emit_check_none(),
            TokenKind::CallOp(n) => self.builder.emit_call(*n),
            TokenKind::PushBuiltin(name) => self.builder.emit_push_builtin(name),
            TokenKind::PushInt(v) => self.builder.emit_push_int(*v),
            TokenKind::Assignment(..) | TokenKind::If(..) | TokenKind::While(..) | TokenKind::Func(..) => {
                panic!("unlowered node reached the emitter: {:?}", t.kind)
            }
            // A bare expression in statement position is evaluated for
            // effect and its value discarded -- nothing downstream
            // consumes it, unlike a `Push`-wrapped one.
            _ => {
                self.compile_expr(t);
                self.builder.emit_pop();
            }
        }
    }

    fn compile_expr(&mut self, t: &Token) {
        match &t.kind {
            TokenKind::Int(v) => self.builder.emit_push_int(*v),
            TokenKind::Float(v) => self.builder.emit_push_float(*v),
            TokenKind::Literal(s) => self.builder.emit_push_literal(s),
            TokenKind::Identifier(s) => self.builder.emit_load(s),
            TokenKind::Builtin(name) | TokenKind::PushBuiltin(name) => self.builder.emit_push_builtin(name),
            TokenKind::PushInt(v) => self.builder.emit_push_int(*v),
            TokenKind::NewFunc(name) => {
                let label = self.func_labels[name];
                self.builder.emit_create_func(label);
            }
            TokenKind::Tuple(items) => {
                self.builder.emit_push_builtin("tuple");
                for item in items {
                    self.compile_expr(item);
                }
                self.builder.emit_call(items.len() as u32);
            }
            TokenKind::Call(callee, args) => {
                self.compile_expr(callee);
                for arg in args {
                    self.compile_expr(arg);
                }
                self.builder.emit_call(args.len() as u32);
            }
            TokenKind::BinaryOp(op, l, r) => {
                self.builder.emit_push_builtin(op.symbol_name());
                self.compile_expr(l);
                self.compile_expr(r);
                self.builder.emit_call(2);
            }
            TokenKind::UnaryOp(op, e) => {
                self.builder.emit_push_builtin(op.symbol_name());
                self.compile_expr(e);
                self.builder.emit_call(1);
            }
            TokenKind::Push(inner) => self.compile_expr(inner),
            other => panic!("unsupported expression node reached the emitter: {:?}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::transform::lower;
    use crate::vm::Runtime;
    use crate::value::Thing;

    #[test]
    fn compiles_and_runs_a_top_level_binding() {
        let ast = parse("x = 1 + 2;").unwrap();
        let lowered = lower(ast);
        let module = emit_module(lowered, None);
        let mut rt = Runtime::new(None);
        let result = rt.execute_module(module).unwrap();
        match result {
            Thing::Module(fields) => {
                assert!(matches!(fields.get("x"), Some(Thing::Int(3))));
            }
            other => panic!("expected a module value, got {:?}", other),
        }
    }

    #[test]
    fn compiles_tuple_destructure() {
        let ast = parse("(a, b) = (10, 20);").unwrap();
        let lowered = lower(ast);
        let module = emit_module(lowered, None);
        let mut rt = Runtime::new(None);
        let result = rt.execute_module(module).unwrap();
        match result {
            Thing::Module(fields) => {
                assert!(matches!(fields.get("a"), Some(Thing::Int(10))));
                assert!(matches!(fields.get("b"), Some(Thing::Int(20))));
            }
            other => panic!("expected a module value, got {:?}", other),
        }
    }
}
