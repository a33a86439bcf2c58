// Stack-based virtual machine.
//
// `Runtime` owns the frame stack, the single shared value stack, the
// builtins scope, and the operator/symbol tables. Every `Thing` and
// `Scope` created during a run is owned (directly or transitively)
// through `Rc`, so teardown is just dropping the `Runtime` -- there is
// no separate allocation arena to sweep, and no garbage collector.
//
// The execution loop mirrors a classic fetch-decode-dispatch stack
// machine: fetch one opcode at the active frame's instruction pointer,
// perform its effect, advance (unless the effect itself transferred
// control). `CALL`/`RETURN` push and pop frames; everything else only
// touches the value stack.

use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;

use log::trace;

use crate::bytecode::{Module, Opcode};
use crate::dispatch;
use crate::error::{Error, ErrorFrame, ErrorKind};
use crate::symbol::SymbolTable;
use crate::value::{new_child_scope, new_root_scope, OrderedMap, RetVal, Scope, Thing};
use crate::{stdlib, symbol};

#[derive(Debug)]
pub enum Frame {
    Defined { module: Rc<Module>, ip: u32, scope: Scope },
    Native,
}

pub struct Runtime {
    pub frame_stack: Vec<Frame>,
    pub value_stack: Vec<Thing>,
    pub builtins: Scope,
    pub operators: OrderedMap<Thing>,
    pub modules: HashMap<String, Thing>,
    pub symbols: SymbolTable,
    pub executable_dir: Option<PathBuf>,
}

impl Runtime {
    pub fn new(executable_dir: Option<PathBuf>) -> Runtime {
        let mut rt = Runtime {
            frame_stack: Vec::new(),
            value_stack: Vec::new(),
            builtins: new_root_scope(),
            operators: OrderedMap::new(),
            modules: HashMap::new(),
            symbols: SymbolTable::new(),
            executable_dir,
        };
        for &(name, arity, id) in symbol::FIXED_SYMBOLS {
            rt.operators.insert(name, Thing::Symbol(id, arity));
        }
        stdlib::install(&mut rt);
        rt
    }

    pub fn raise(&self, kind: ErrorKind) -> Rc<Error> {
        Rc::new(Error::new(kind, self.snapshot_frames()))
    }

    fn snapshot_frames(&self) -> Vec<ErrorFrame> {
        self.frame_stack
            .iter()
            .rev()
            .map(|f| match f {
                Frame::Native => ErrorFrame { native: true, location: None, filename: None },
                Frame::Defined { module, ip, .. } => ErrorFrame {
                    native: false,
                    location: module.location_at(*ip),
                    filename: module.filename.clone(),
                },
            })
            .collect()
    }

    fn pop_value(&mut self) -> Result<Thing, Rc<Error>> {
        self.value_stack.pop().ok_or_else(|| self.raise(ErrorKind::Internal("value stack underflow".into())))
    }

    /// Runs `executeCode` semantics: pushes no frame itself, but drives
    /// the fetch-dispatch loop until the frame stack returns to
    /// `entry_height`. On error, both stacks are unwound back to their
    /// pre-entry sizes before the error is returned.
    fn execute_code(&mut self, entry_height: usize) -> Result<(), Rc<Error>> {
        let value_height = self.value_stack.len();
        while self.frame_stack.len() > entry_height {
            if let Err(e) = self.step() {
                self.frame_stack.truncate(entry_height);
                self.value_stack.truncate(value_height);
                return Err(e);
            }
        }
        Ok(())
    }

    fn step(&mut self) -> Result<(), Rc<Error>> {
        let (module, ip) = match self.frame_stack.last() {
            Some(Frame::Defined { module, ip, .. }) => (module.clone(), *ip),
            _ => return Err(self.raise(ErrorKind::Internal("step on a native frame".into()))),
        };
        let opcode = module
            .fetch(ip)
            .ok_or_else(|| self.raise(ErrorKind::Internal(format!("illegal opcode at {}", ip))))?;
        trace!("ip={} op={:?} stack={:?}", ip, opcode, self.value_stack);

        match opcode {
            Opcode::PushInt => {
                let v = module.read_u32(ip + 1) as i32;
                self.value_stack.push(Thing::Int(v));
                self.advance(ip + 5);
            }
            Opcode::PushFloat => {
                let bits = module.read_u32(ip + 1);
                self.value_stack.push(Thing::Float(f32::from_bits(bits)));
                self.advance(ip + 5);
            }
            Opcode::PushBuiltin => {
                let idx = module.read_u32(ip + 1);
                let name = &module.constants[idx as usize];
                let value = self
                    .operators
                    .get(name)
                    .cloned()
                    .or_else(|| self.builtins.get(name))
                    .ok_or_else(|| self.raise(ErrorKind::Undefined(name.clone())))?;
                self.value_stack.push(value);
                self.advance(ip + 5);
            }
            Opcode::PushLiteral => {
                let idx = module.read_u32(ip + 1);
                let text = module.constants[idx as usize].clone();
                self.value_stack.push(Thing::str(text, true));
                self.advance(ip + 5);
            }
            Opcode::PushNone => {
                self.value_stack.push(Thing::None);
                self.advance(ip + 1);
            }
            Opcode::Load => {
                let idx = module.read_u32(ip + 1);
                let name = &module.constants[idx as usize];
                let scope = self.scope_of_top()?;
                let value = scope.get(name).ok_or_else(|| self.raise(ErrorKind::Undefined(name.clone())))?;
                self.value_stack.push(value);
                self.advance(ip + 5);
            }
            Opcode::Store => {
                let idx = module.read_u32(ip + 1);
                let name = module.constants[idx as usize].clone();
                let value = self.pop_value()?;
                self.scope_of_top()?.assign(&name, value);
                self.advance(ip + 5);
            }
            Opcode::Call => {
                let arity = module.read_u32(ip + 1);
                self.advance(ip + 5);
                self.op_call(arity as usize)?;
            }
            Opcode::Return => {
                self.frame_stack.pop();
            }
            Opcode::CreateFunc => {
                let target = module.read_u32(ip + 1);
                let scope = self.scope_of_top()?;
                let func = Thing::Func(Rc::new(crate::value::FuncData {
                    entry: target,
                    module: module.clone(),
                    captured_scope: scope,
                }));
                self.value_stack.push(func);
                self.advance(ip + 5);
            }
            Opcode::CondJumpTrue => {
                let target = module.read_u32(ip + 1);
                let cond = self.pop_value()?;
                self.advance(if cond.truthy() { target } else { ip + 5 });
            }
            Opcode::CondJumpFalse => {
                let target = module.read_u32(ip + 1);
                let cond = self.pop_value()?;
                self.advance(if cond.truthy() { ip + 5 } else { target });
            }
            Opcode::AbsJump => {
                let target = module.read_u32(ip + 1);
                self.advance(target);
            }
            Opcode::Dup => {
                let top = self.value_stack.last().cloned().ok_or_else(|| self.raise(ErrorKind::Internal("dup on empty stack".into())))?;
                self.value_stack.push(top);
                self.advance(ip + 1);
            }
            Opcode::Swap => {
                let len = self.value_stack.len();
                if len < 2 {
                    return Err(self.raise(ErrorKind::Internal("swap on short stack".into())));
                }
                self.value_stack.swap(len - 1, len - 2);
                self.advance(ip + 1);
            }
            Opcode::Pop => {
                self.pop_value()?;
                self.advance(ip + 1);
            }
            Opcode::CheckNone => {
                let v = self.pop_value()?;
                if !v.is_none() {
                    return Err(self.raise(ErrorKind::NotNone));
                }
                self.advance(ip + 1);
            }
            Opcode::DefFunc => {
                // Prologue reached by falling through rather than via
                // CALL (e.g. a module's $init) -- arguments are already
                // bound by whoever constructed this frame.
                let (end, _) = read_def_func(&module, ip);
                self.advance(end);
            }
        }
        Ok(())
    }

    fn advance(&mut self, new_ip: u32) {
        if let Some(Frame::Defined { ip, .. }) = self.frame_stack.last_mut() {
            *ip = new_ip;
        }
    }

    fn scope_of_top(&self) -> Result<Scope, Rc<Error>> {
        match self.frame_stack.last() {
            Some(Frame::Defined { scope, .. }) => Ok(scope.clone()),
            _ => Err(self.raise(ErrorKind::Internal("no active scope".into()))),
        }
    }

    fn op_call(&mut self, arity: usize) -> Result<(), Rc<Error>> {
        if self.value_stack.len() < arity + 1 {
            return Err(self.raise(ErrorKind::Internal("call on short stack".into())));
        }
        let split = self.value_stack.len() - arity;
        let args: Vec<Thing> = self.value_stack.split_off(split);
        let callee = self.pop_value()?;
        self.dispatch_call(callee, args)
    }

    /// Shared by the `CALL` opcode and any native function that invokes
    /// a callback: pushes a defined frame and lets the caller's loop
    /// continue, or runs a native function to completion immediately.
    pub fn dispatch_call(&mut self, callee: Thing, args: Vec<Thing>) -> Result<(), Rc<Error>> {
        match callee {
            Thing::Func(data) => {
                let (end, params) = read_def_func(&data.module, data.entry);
                if params.len() != args.len() {
                    return Err(self.raise(ErrorKind::Arity { expected: params.len() as u8, got: args.len() as u8 }));
                }
                let scope = new_child_scope(&data.captured_scope);
                for (name, value) in params.iter().zip(args.into_iter()) {
                    scope.define(name, value);
                }
                self.frame_stack.push(Frame::Defined { module: data.module.clone(), ip: end, scope });
                Ok(())
            }
            Thing::NativeFunc(native) => {
                if let Some(expected) = native.arity {
                    if expected as usize != args.len() {
                        return Err(self.raise(ErrorKind::Arity { expected, got: args.len() as u8 }));
                    }
                }
                self.frame_stack.push(Frame::Native);
                let result = (native.func)(self, &args);
                self.frame_stack.pop();
                match result {
                    Ok(v) => {
                        self.value_stack.push(v);
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            }
            Thing::Symbol(id, arity) => {
                self.frame_stack.push(Frame::Native);
                let _ = arity;
                let result = dispatch::apply_symbol(self, id, &args);
                self.frame_stack.pop();
                match result {
                    Ok(v) => {
                        self.value_stack.push(v);
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            }
            Thing::Object(ref fields) => {
                let call_prop = fields.iter().find(|(_, (sym, _))| *sym == symbol::CALL).map(|(_, (_, v))| v.clone());
                match call_prop {
                    Some(bound) => self.dispatch_call(bound, args),
                    None => Err(self.raise(ErrorKind::TypeMismatch { expected: "callable", got: callee.type_name() })),
                }
            }
            other => Err(self.raise(ErrorKind::TypeMismatch { expected: "callable", got: other.type_name() })),
        }
    }

    /// `callFunction`: invoke `f` with `args` and run it to completion,
    /// returning its result directly (used by the pipeline to invoke a
    /// module's `main` export, and by natives like `trycatch`).
    pub fn call_function(&mut self, f: &Thing, args: &[Thing]) -> RetVal {
        let entry_height = self.frame_stack.len();
        self.dispatch_call(f.clone(), args.to_vec())?;
        if self.frame_stack.len() > entry_height {
            self.execute_code(entry_height)?;
        }
        self.pop_value()
    }

    /// `executeModule`: runs a module's `$init`, returning a `Module`
    /// value whose fields are `$init`'s top-level bindings.
    pub fn execute_module(&mut self, module: Rc<Module>) -> RetVal {
        let scope = new_child_scope(&self.builtins);
        let (end, params) = read_def_func(&module, module.entry_index);
        for name in &params {
            scope.define(name, Thing::None);
        }
        let entry_height = self.frame_stack.len();
        self.frame_stack.push(Frame::Defined { module, ip: end, scope: scope.clone() });
        self.execute_code(entry_height)?;
        Ok(Thing::Module(Rc::new(scope.locals_snapshot())))
    }
}

/// Reads a `DEF_FUNC` prologue at `offset`: `{u8 arity, u32 x arity
/// constant indices}`. Returns the offset just past the prologue and
/// the parameter names in declaration order.
fn read_def_func(module: &Module, offset: u32) -> (u32, Vec<String>) {
    debug_assert_eq!(module.fetch(offset), Some(Opcode::DefFunc));
    let arity = module.read_u8(offset + 1) as u32;
    let mut params = Vec::with_capacity(arity as usize);
    for i in 0..arity {
        let idx = module.read_u32(offset + 2 + i * 4);
        params.push(module.constants[idx as usize].clone());
    }
    (offset + 2 + arity * 4, params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::ModuleBuilder;

    #[test]
    fn executes_a_function_returning_its_argument() {
        let mut builder = ModuleBuilder::new(None);
        let start = builder.offset();
        builder.emit_def_func(&["x".to_string()]);
        builder.emit_load("x");
        builder.emit_return();
        let module = builder.finalize(start);

        let mut rt = Runtime::new(None);
        let (end, params) = read_def_func(&module, start);
        assert_eq!(params, vec!["x".to_string()]);
        let scope = new_child_scope(&rt.builtins);
        scope.define("x", Thing::Int(41));
        let entry_height = rt.frame_stack.len();
        rt.frame_stack.push(Frame::Defined { module: module.clone(), ip: end, scope });
        rt.execute_code(entry_height).unwrap();
        assert!(matches!(rt.value_stack.pop(), Some(Thing::Int(41))));
    }

    #[test]
    fn call_function_round_trips_through_create_func() {
        let mut builder = ModuleBuilder::new(None);
        let func_label = builder.new_label();
        let init_start = builder.offset();
        builder.emit_def_func(&["$arg".to_string()]);
        builder.emit_create_func(func_label);
        builder.emit_push_none();
        builder.emit_return();

        builder.define_label(func_label);
        builder.emit_def_func(&["n".to_string()]);
        builder.emit_load("n");
        builder.emit_return();

        let module = builder.finalize(init_start);
        let mut rt = Runtime::new(None);
        let result = rt.execute_module(module).unwrap();
        match result {
            Thing::Module(_) => {}
            _ => panic!("expected a module value"),
        }
    }

    #[test]
    fn an_object_with_a_bound_call_property_is_itself_callable() {
        fn lib_add_one(_rt: &mut Runtime, args: &[Thing]) -> RetVal {
            match args[0] {
                Thing::Int(n) => Ok(Thing::Int(n + 1)),
                _ => panic!("expected an int"),
            }
        }
        let callee = Thing::NativeFunc(Rc::new(crate::value::NativeFunc {
            name: "add_one",
            arity: Some(1),
            func: lib_add_one,
        }));
        let mut fields = OrderedMap::new();
        fields.insert("call", (symbol::CALL, callee));
        let obj = Thing::Object(Rc::new(fields));

        let mut rt = Runtime::new(None);
        let result = rt.call_function(&obj, &[Thing::Int(41)]).unwrap();
        assert!(matches!(result, Thing::Int(42)));
    }
}
