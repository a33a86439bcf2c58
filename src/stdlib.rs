// Native global bindings (builtins scope).
//
// Each function here matches the `(runtime, args) -> RetVal` contract of
// `NativeFn`. Grounded in the original interpreter's `lib.cpp`; arity and
// type checks are expressed the same way, just via `?` instead of the
// original's manual `typeCheck` early-return.

use std::cell::RefCell;
use std::io::Write as _;
use std::rc::Rc;

use crate::error::ErrorKind;
use crate::value::{OrderedMap, RetVal, Thing};
use crate::vm::Runtime;
use crate::{compile, symbol};

macro_rules! native {
    ($rt:expr, $name:literal, $arity:expr, $func:expr) => {
        $rt.builtins.define(
            $name,
            Thing::NativeFunc(Rc::new(crate::value::NativeFunc { name: $name, arity: $arity, func: $func })),
        );
    };
}

pub fn install(rt: &mut Runtime) {
    rt.builtins.define("none", Thing::None);
    rt.builtins.define("true", Thing::Bool(1));
    rt.builtins.define("false", Thing::Bool(0));
    for &(name, arity, id) in symbol::FIXED_SYMBOLS {
        rt.builtins.define(name, Thing::Symbol(id, arity));
    }

    native!(rt, "print", Some(1), lib_print);
    native!(rt, "input", Some(0), lib_input);
    native!(rt, "assert", Some(1), lib_assert);
    native!(rt, "toStr", Some(1), lib_to_str);
    native!(rt, "toInt", Some(1), lib_to_int);
    native!(rt, "trycatch", Some(2), lib_trycatch);
    native!(rt, "head", Some(1), lib_head);
    native!(rt, "tail", Some(1), lib_tail);
    native!(rt, "get", Some(2), lib_get);
    native!(rt, "createSymbol", Some(1), lib_create_symbol);
    native!(rt, "createCell", Some(1), lib_create_cell);
    native!(rt, "getCell", Some(1), lib_get_cell);
    native!(rt, "setCell", Some(2), lib_set_cell);
    native!(rt, "import", Some(1), lib_import);
    native!(rt, "responds_to", Some(2), lib_responds_to);
    native!(rt, "is_none", Some(1), lib_is_none);

    native!(rt, "tuple", None, lib_tuple);
    native!(rt, "::", Some(2), lib_cons);
    native!(rt, "object", Some(1), lib_object);
    native!(rt, "unpack_cons", Some(1), lib_unpack_cons);
    native!(rt, "unpack_call", Some(3), lib_unpack_call);
    native!(rt, "check_tuple_size", Some(2), lib_check_tuple_size);
    native!(rt, "assert_equal", Some(2), lib_assert_equal);
}

fn expect_str<'a>(rt: &Runtime, v: &'a Thing) -> Result<&'a Rc<str>, Rc<crate::error::Error>> {
    match v {
        Thing::Str(s, _) => Ok(s),
        other => Err(rt.raise(ErrorKind::TypeMismatch { expected: "string", got: other.type_name() })),
    }
}

fn expect_int(rt: &Runtime, v: &Thing) -> Result<i32, Rc<crate::error::Error>> {
    match v {
        Thing::Int(i) => Ok(*i),
        other => Err(rt.raise(ErrorKind::TypeMismatch { expected: "int", got: other.type_name() })),
    }
}

fn lib_print(rt: &mut Runtime, args: &[Thing]) -> RetVal {
    let s = expect_str(rt, &args[0])?;
    println!("{}", s);
    std::io::stdout().flush().ok();
    Ok(Thing::None)
}

fn lib_input(_rt: &mut Runtime, _args: &[Thing]) -> RetVal {
    let mut line = String::new();
    std::io::stdin().read_line(&mut line).ok();
    let trimmed = line.trim_end_matches(['\n', '\r']);
    Ok(Thing::str(trimmed.to_string(), false))
}

fn lib_assert(rt: &mut Runtime, args: &[Thing]) -> RetVal {
    match &args[0] {
        Thing::Bool(b) if *b != 0 => Ok(Thing::None),
        Thing::Bool(_) => Err(rt.raise(ErrorKind::AssertionFailed)),
        other => Err(rt.raise(ErrorKind::TypeMismatch { expected: "bool", got: other.type_name() })),
    }
}

fn lib_to_str(rt: &mut Runtime, args: &[Thing]) -> RetVal {
    let i = expect_int(rt, &args[0])?;
    Ok(Thing::str(i.to_string(), false))
}

fn lib_to_int(rt: &mut Runtime, args: &[Thing]) -> RetVal {
    let s = expect_str(rt, &args[0])?;
    let i: i32 = s.trim().parse().map_err(|_| rt.raise(ErrorKind::Message(format!("'{}' is not an integer", s))))?;
    Ok(Thing::Int(i))
}

fn lib_trycatch(rt: &mut Runtime, args: &[Thing]) -> RetVal {
    let block1 = args[0].clone();
    let block2 = args[1].clone();
    match rt.call_function(&block1, &[Thing::None]) {
        Ok(v) => Ok(v),
        Err(e) => rt.call_function(&block2, &[Thing::Error(e)]),
    }
}

fn lib_head(rt: &mut Runtime, args: &[Thing]) -> RetVal {
    match &args[0] {
        Thing::List(head, _) => Ok((**head).clone()),
        other => Err(rt.raise(ErrorKind::TypeMismatch { expected: "list", got: other.type_name() })),
    }
}

fn lib_tail(rt: &mut Runtime, args: &[Thing]) -> RetVal {
    match &args[0] {
        Thing::List(_, tail) => Ok((**tail).clone()),
        other => Err(rt.raise(ErrorKind::TypeMismatch { expected: "list", got: other.type_name() })),
    }
}

fn lib_get(rt: &mut Runtime, args: &[Thing]) -> RetVal {
    crate::dispatch::apply_symbol(rt, symbol::GET, args)
}

fn lib_create_symbol(rt: &mut Runtime, args: &[Thing]) -> RetVal {
    let arity = expect_int(rt, &args[0])?;
    if arity <= 0 || arity > 255 {
        return Err(rt.raise(ErrorKind::Message("symbol arity must be between 1 and 255".into())));
    }
    let id = rt.symbols.fresh(arity as u8);
    Ok(Thing::Symbol(id, arity as u8))
}

fn lib_create_cell(_rt: &mut Runtime, args: &[Thing]) -> RetVal {
    Ok(Thing::Cell(Rc::new(RefCell::new(args[0].clone()))))
}

fn lib_get_cell(rt: &mut Runtime, args: &[Thing]) -> RetVal {
    match &args[0] {
        Thing::Cell(cell) => Ok(cell.borrow().clone()),
        other => Err(rt.raise(ErrorKind::TypeMismatch { expected: "cell", got: other.type_name() })),
    }
}

fn lib_set_cell(rt: &mut Runtime, args: &[Thing]) -> RetVal {
    match &args[0] {
        Thing::Cell(cell) => {
            *cell.borrow_mut() = args[1].clone();
            Ok(Thing::None)
        }
        other => Err(rt.raise(ErrorKind::TypeMismatch { expected: "cell", got: other.type_name() })),
    }
}

fn lib_import(rt: &mut Runtime, args: &[Thing]) -> RetVal {
    let name = expect_str(rt, &args[0])?.to_string();
    if let Some(cached) = rt.modules.get(&name) {
        return Ok(cached.clone());
    }

    if let Some(path) = resolve_module_path(rt, &name) {
        let src = std::fs::read_to_string(&path)
            .map_err(|e| rt.raise(ErrorKind::Message(format!("could not read '{}': {}", path.display(), e))))?;
        let module = compile::compile(&src, Some(path.display().to_string()))
            .map_err(|e| rt.raise(ErrorKind::Message(e.to_string())))?;
        let value = rt.execute_module(module)?;
        rt.modules.insert(name, value.clone());
        return Ok(value);
    }

    if let Some(value) = builtin_module(rt, &name) {
        rt.modules.insert(name, value.clone());
        return Ok(value);
    }

    Err(rt.raise(ErrorKind::ModuleNotFound(name)))
}

fn resolve_module_path(rt: &Runtime, name: &str) -> Option<std::path::PathBuf> {
    let literal = std::path::PathBuf::from(name);
    if literal.is_file() {
        return Some(literal);
    }
    if let Some(dir) = &rt.executable_dir {
        let candidate = dir.join("std_lib").join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

/// Last-resort tier of module resolution: modules with no `.blg` source,
/// built directly as `Thing::Module` values. Grounded in
/// `initOperatorsModule`/`initFunctoolsModule`, which build the same
/// modules as native `Map`s rather than loading a script.
fn builtin_module(rt: &mut Runtime, name: &str) -> Option<Thing> {
    match name {
        "std/operators" => Some(operators_module(rt)),
        "std/functools" => Some(functools_module(rt)),
        _ => None,
    }
}

fn operators_module(rt: &mut Runtime) -> Thing {
    const RENAMES: &[(&str, &str)] = &[
        ("add", "+"),
        ("subtract", "-"),
        ("multiply", "*"),
        ("divide", "/"),
        ("equal", "=="),
        ("not_equal", "!="),
        ("less_than", "<"),
        ("less_than_equal", "<="),
        ("more_than", ">"),
        ("more_than_equal", ">="),
        ("op_and", "and"),
        ("op_or", "or"),
        ("op_not", "not"),
        ("cons", "::"),
        ("access", "."),
    ];
    let mut map = OrderedMap::new();
    for &(exported, native) in RENAMES {
        if let Some(op) = rt.operators.get(native) {
            map.insert(exported, op.clone());
        }
    }
    if let Some(get) = rt.operators.get("get") {
        map.insert("unpack", get.clone());
    }
    Thing::Module(Rc::new(map))
}

fn functools_module(_rt: &mut Runtime) -> Thing {
    let mut map = OrderedMap::new();
    map.insert(
        "call",
        Thing::NativeFunc(Rc::new(crate::value::NativeFunc { name: "call", arity: Some(2), func: lib_functools_call })),
    );
    Thing::Module(Rc::new(map))
}

/// `call(f, args)`: applies `f` to the elements of the `args` list, in
/// order. Grounded in `functools.cpp::libCall`.
fn lib_functools_call(rt: &mut Runtime, args: &[Thing]) -> RetVal {
    let func = args[0].clone();
    let mut unpacked = Vec::new();
    let mut cursor = args[1].clone();
    loop {
        match cursor {
            Thing::None => break,
            Thing::List(head, tail) => {
                unpacked.push((*head).clone());
                cursor = (*tail).clone();
            }
            other => return Err(rt.raise(ErrorKind::TypeMismatch { expected: "list", got: other.type_name() })),
        }
    }
    if unpacked.is_empty() {
        return Err(rt.raise(ErrorKind::Message("cannot call function with no arguments".into())));
    }
    rt.call_function(&func, &unpacked)
}

fn lib_responds_to(rt: &mut Runtime, args: &[Thing]) -> RetVal {
    crate::dispatch::apply_symbol(rt, symbol::RESPONDS_TO, args)
}

fn lib_is_none(_rt: &mut Runtime, args: &[Thing]) -> RetVal {
    Ok(Thing::Bool(args[0].is_none() as u8))
}

fn lib_tuple(_rt: &mut Runtime, args: &[Thing]) -> RetVal {
    Ok(Thing::Tuple(Rc::new(args.to_vec())))
}

fn lib_cons(rt: &mut Runtime, args: &[Thing]) -> RetVal {
    match &args[1] {
        Thing::None | Thing::List(..) => Ok(Thing::List(Rc::new(args[0].clone()), Rc::new(args[1].clone()))),
        other => Err(rt.raise(ErrorKind::TypeMismatch { expected: "none or list", got: other.type_name() })),
    }
}

fn lib_object(rt: &mut Runtime, args: &[Thing]) -> RetVal {
    let mut map = OrderedMap::new();
    let mut cursor = args[0].clone();
    loop {
        match cursor {
            Thing::None => break,
            Thing::List(head, tail) => {
                let pair = match &*head {
                    Thing::Tuple(items) if items.len() == 2 => items.clone(),
                    other => {
                        return Err(rt.raise(ErrorKind::TypeMismatch {
                            expected: "2-tuple",
                            got: other.type_name(),
                        }))
                    }
                };
                let key = match &pair[0] {
                    Thing::Symbol(id, _) => *id,
                    other => return Err(rt.raise(ErrorKind::TypeMismatch { expected: "symbol", got: other.type_name() })),
                };
                let name = rt.symbols.name_of(key).unwrap_or("").to_string();
                map.insert(name, (key, pair[1].clone()));
                cursor = (*tail).clone();
            }
            other => return Err(rt.raise(ErrorKind::TypeMismatch { expected: "list", got: other.type_name() })),
        }
    }
    Ok(Thing::Object(Rc::new(map)))
}

fn lib_unpack_cons(rt: &mut Runtime, args: &[Thing]) -> RetVal {
    match &args[0] {
        Thing::List(head, tail) => Ok(Thing::Tuple(Rc::new(vec![(**head).clone(), (**tail).clone()]))),
        other => Err(rt.raise(ErrorKind::TypeMismatch { expected: "list", got: other.type_name() })),
    }
}

fn lib_unpack_call(rt: &mut Runtime, args: &[Thing]) -> RetVal {
    let n = expect_int(rt, &args[2])?;
    let callee = args[0].clone();
    let value = args[1].clone();
    let result = rt.call_function(&callee, &[value])?;
    match &result {
        Thing::Tuple(items) if items.len() as i32 == n => Ok(result),
        Thing::Tuple(_) => Err(rt.raise(ErrorKind::TupleSize)),
        other => Err(rt.raise(ErrorKind::TypeMismatch { expected: "tuple", got: other.type_name() })),
    }
}

/// Guards a tuple-pattern destructure: the value being unpacked must be
/// a tuple of exactly the pattern's arity, or the whole assignment
/// fails with a tuple-size error rather than silently binding a prefix
/// or running off the end.
fn lib_check_tuple_size(rt: &mut Runtime, args: &[Thing]) -> RetVal {
    let n = expect_int(rt, &args[1])?;
    match &args[0] {
        Thing::Tuple(items) if items.len() as i32 == n => Ok(Thing::None),
        Thing::Tuple(_) => Err(rt.raise(ErrorKind::TupleSize)),
        other => Err(rt.raise(ErrorKind::TypeMismatch { expected: "tuple", got: other.type_name() })),
    }
}

fn lib_assert_equal(rt: &mut Runtime, args: &[Thing]) -> RetVal {
    let result = crate::dispatch::apply_symbol(rt, symbol::EQ, args)?;
    match result {
        Thing::Bool(b) if b != 0 => Ok(Thing::None),
        Thing::Bool(_) => Err(rt.raise(ErrorKind::AssertEqualFailed)),
        _ => Err(rt.raise(ErrorKind::Internal("== did not return a bool".into()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cons_and_head_tail_round_trip() {
        let mut rt = Runtime::new(None);
        let list = lib_cons(&mut rt, &[Thing::Int(1), Thing::None]).unwrap();
        assert!(matches!(lib_head(&mut rt, &[list.clone()]).unwrap(), Thing::Int(1)));
        assert!(matches!(lib_tail(&mut rt, &[list]).unwrap(), Thing::None));
    }

    #[test]
    fn assert_rejects_false() {
        let mut rt = Runtime::new(None);
        let err = lib_assert(&mut rt, &[Thing::Bool(0)]).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::AssertionFailed));
    }

    #[test]
    fn object_builds_from_symbol_tuple_list() {
        let mut rt = Runtime::new(None);
        let key = rt.symbols.intern("x", 1);
        let pair = Thing::Tuple(Rc::new(vec![Thing::Symbol(key, 1), Thing::Int(9)]));
        let list = lib_cons(&mut rt, &[pair, Thing::None]).unwrap();
        let obj = lib_object(&mut rt, &[list]).unwrap();
        match obj {
            Thing::Object(fields) => assert_eq!(fields.len(), 1),
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn import_resolves_builtin_operators_module() {
        let mut rt = Runtime::new(None);
        let result = lib_import(&mut rt, &[Thing::str("std/operators", true)]).unwrap();
        match result {
            Thing::Module(fields) => assert!(matches!(fields.get("add"), Some(Thing::Symbol(..)))),
            other => panic!("expected a module, got {:?}", other),
        }
    }

    #[test]
    fn functools_call_applies_function_to_list_args() {
        let mut rt = Runtime::new(None);
        let add = rt.operators.get("+").unwrap().clone();
        let list = lib_cons(&mut rt, &[Thing::Int(2), Thing::None]).unwrap();
        let list = lib_cons(&mut rt, &[Thing::Int(3), list]).unwrap();
        let result = lib_functools_call(&mut rt, &[add, list]).unwrap();
        assert!(matches!(result, Thing::Int(5)));
    }
}
