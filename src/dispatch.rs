// Symbol-based operator dispatch (spec value system, §4.7).
//
// A Symbol carries a fixed arity; applying it to args checks arity, then
// delegates to the *first* argument's type-specific handler. The
// universal sub-symbol `responds_to` reports whether a type has a
// handler for another symbol without invoking it.

use std::rc::Rc;

use crate::error::ErrorKind;
use crate::symbol::{self, SymbolId};
use crate::value::{RetVal, Thing};
use crate::vm::Runtime;

pub fn apply_symbol(rt: &mut Runtime, id: SymbolId, args: &[Thing]) -> RetVal {
    let declared_arity = rt.symbols.arity_of(id);
    if let Some(arity) = declared_arity {
        if arity as usize != args.len() {
            return Err(rt.raise(ErrorKind::Arity { expected: arity, got: args.len() as u8 }));
        }
    }

    if id == symbol::RESPONDS_TO {
        let target = args[1].clone();
        let target_id = match target {
            Thing::Symbol(sid, _) => sid,
            other => return Err(rt.raise(ErrorKind::TypeMismatch { expected: "symbol", got: other.type_name() })),
        };
        return Ok(Thing::Bool(responds_to(&args[0], target_id) as u8));
    }

    dispatch_on(rt, &args[0], id, args)
}

fn responds_to(receiver: &Thing, id: SymbolId) -> bool {
    use symbol::*;
    match receiver {
        Thing::Int(_) | Thing::Float(_) => {
            matches!(id, ADD | SUB | MUL | DIV | EQ | NEQ | LT | LTE | GT | GTE | RESPONDS_TO)
        }
        Thing::Bool(_) => matches!(id, AND | OR | NOT | EQ | NEQ | RESPONDS_TO),
        Thing::Str(..) => matches!(id, ADD | EQ | NEQ | RESPONDS_TO),
        Thing::Tuple(_) => matches!(id, EQ | NEQ | GET | RESPONDS_TO),
        Thing::Module(_) => matches!(id, DOT | RESPONDS_TO),
        Thing::Object(fields) => {
            id == RESPONDS_TO || id == CALL || fields.iter().any(|(_, (sym, _))| *sym == id)
        }
        _ => id == RESPONDS_TO,
    }
}

fn dispatch_on(rt: &mut Runtime, receiver: &Thing, id: SymbolId, args: &[Thing]) -> RetVal {
    use symbol::*;
    match receiver {
        Thing::Int(_) | Thing::Float(_) => numeric(rt, id, args),
        Thing::Bool(a) => boolean(rt, id, *a, args),
        Thing::Str(a, _) => string(rt, id, a, args),
        Thing::Tuple(items) => tuple(rt, id, items, args),
        Thing::Module(fields) => module(rt, id, fields, args),
        Thing::Object(fields) => object(rt, id, fields, args),
        _other => {
            if id == RESPONDS_TO {
                Ok(Thing::Bool(0))
            } else {
                Err(rt.raise(ErrorKind::NoSuchSymbol))
            }
        }
    }
}

fn num_pair(a: &Thing, b: &Thing) -> Option<(f64, f64, bool)> {
    match (a, b) {
        (Thing::Int(x), Thing::Int(y)) => Some((*x as f64, *y as f64, true)),
        (Thing::Float(x), Thing::Float(y)) => Some((*x as f64, *y as f64, false)),
        (Thing::Int(x), Thing::Float(y)) => Some((*x as f64, *y as f64, false)),
        (Thing::Float(x), Thing::Int(y)) => Some((*x as f64, *y as f64, false)),
        _ => None,
    }
}

// Int/int arithmetic wraps on overflow rather than promoting to float or
// panicking, matching 32-bit native-word semantics. Mixed or float/float
// operands go through f64 and are cast back to f32.
fn numeric(rt: &mut Runtime, id: SymbolId, args: &[Thing]) -> RetVal {
    use symbol::*;
    if let (Thing::Int(x), Thing::Int(y)) = (&args[0], &args[1]) {
        let (x, y) = (*x, *y);
        if id == DIV && y == 0 {
            return Err(rt.raise(ErrorKind::Message("division by zero".into())));
        }
        return Ok(match id {
            ADD => Thing::Int(x.wrapping_add(y)),
            SUB => Thing::Int(x.wrapping_sub(y)),
            MUL => Thing::Int(x.wrapping_mul(y)),
            DIV => Thing::Int(x.wrapping_div(y)),
            EQ => Thing::Bool((x == y) as u8),
            NEQ => Thing::Bool((x != y) as u8),
            LT => Thing::Bool((x < y) as u8),
            LTE => Thing::Bool((x <= y) as u8),
            GT => Thing::Bool((x > y) as u8),
            GTE => Thing::Bool((x >= y) as u8),
            RESPONDS_TO => Thing::Bool(1),
            _ => return Err(rt.raise(ErrorKind::NoSuchSymbol)),
        });
    }
    let b = &args[1];
    let (x, y, _) = match num_pair(&args[0], b) {
        Some(v) => v,
        None => return Err(rt.raise(ErrorKind::TypeMismatch { expected: "number", got: b.type_name() })),
    };
    Ok(match id {
        ADD => Thing::Float((x + y) as f32),
        SUB => Thing::Float((x - y) as f32),
        MUL => Thing::Float((x * y) as f32),
        DIV => Thing::Float((x / y) as f32),
        EQ => Thing::Bool((x == y) as u8),
        NEQ => Thing::Bool((x != y) as u8),
        LT => Thing::Bool((x < y) as u8),
        LTE => Thing::Bool((x <= y) as u8),
        GT => Thing::Bool((x > y) as u8),
        GTE => Thing::Bool((x >= y) as u8),
        RESPONDS_TO => Thing::Bool(1),
        _ => return Err(rt.raise(ErrorKind::NoSuchSymbol)),
    })
}

fn boolean(rt: &mut Runtime, id: SymbolId, a: u8, args: &[Thing]) -> RetVal {
    use symbol::*;
    Ok(match id {
        NOT => Thing::Bool((a == 0) as u8),
        AND | OR => {
            let b = match &args[1] {
                Thing::Bool(b) => *b,
                other => return Err(rt.raise(ErrorKind::TypeMismatch { expected: "bool", got: other.type_name() })),
            };
            let result = if id == AND { a != 0 && b != 0 } else { a != 0 || b != 0 };
            Thing::Bool(result as u8)
        }
        EQ => Thing::Bool((a == bool_of(&args[1])) as u8),
        NEQ => Thing::Bool((a != bool_of(&args[1])) as u8),
        RESPONDS_TO => Thing::Bool(1),
        _ => return Err(rt.raise(ErrorKind::NoSuchSymbol)),
    })
}

fn bool_of(t: &Thing) -> u8 {
    match t {
        Thing::Bool(v) => *v,
        _ => u8::MAX,
    }
}

fn string(rt: &mut Runtime, id: SymbolId, a: &Rc<str>, args: &[Thing]) -> RetVal {
    use symbol::*;
    match id {
        ADD => match &args[1] {
            Thing::Str(b, _) => Ok(Thing::str(format!("{}{}", a, b), false)),
            other => Err(rt.raise(ErrorKind::TypeMismatch { expected: "string", got: other.type_name() })),
        },
        EQ => match &args[1] {
            Thing::Str(b, _) => Ok(Thing::Bool((a == b) as u8)),
            _ => Ok(Thing::Bool(0)),
        },
        NEQ => match &args[1] {
            Thing::Str(b, _) => Ok(Thing::Bool((a != b) as u8)),
            _ => Ok(Thing::Bool(1)),
        },
        RESPONDS_TO => Ok(Thing::Bool(1)),
        _ => Err(rt.raise(ErrorKind::NoSuchSymbol)),
    }
}

fn tuple(rt: &mut Runtime, id: SymbolId, items: &Rc<Vec<Thing>>, args: &[Thing]) -> RetVal {
    use symbol::*;
    match id {
        EQ | NEQ => {
            let want = id == EQ;
            let equal = match &args[1] {
                Thing::Tuple(other) => {
                    items.len() == other.len()
                        && items.iter().zip(other.iter()).all(|(a, b)| things_equal(a, b))
                }
                _ => false,
            };
            Ok(Thing::Bool((equal == want) as u8))
        }
        GET => match &args[1] {
            Thing::Int(i) => items
                .get(*i as usize)
                .cloned()
                .ok_or_else(|| rt.raise(ErrorKind::IndexOutOfBounds(*i as i64))),
            other => Err(rt.raise(ErrorKind::TypeMismatch { expected: "int", got: other.type_name() })),
        },
        RESPONDS_TO => Ok(Thing::Bool(1)),
        _ => Err(rt.raise(ErrorKind::NoSuchSymbol)),
    }
}

fn things_equal(a: &Thing, b: &Thing) -> bool {
    match (a, b) {
        (Thing::Int(x), Thing::Int(y)) => x == y,
        (Thing::Float(x), Thing::Float(y)) => x == y,
        (Thing::Bool(x), Thing::Bool(y)) => x == y,
        (Thing::Str(x, _), Thing::Str(y, _)) => x == y,
        (Thing::None, Thing::None) => true,
        (Thing::Tuple(x), Thing::Tuple(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(a, b)| things_equal(a, b))
        }
        _ => false,
    }
}

fn module(rt: &mut Runtime, id: SymbolId, fields: &Rc<crate::value::OrderedMap<Thing>>, args: &[Thing]) -> RetVal {
    use symbol::*;
    match id {
        DOT => match &args[1] {
            Thing::Str(name, _) => fields
                .get(name)
                .cloned()
                .ok_or_else(|| rt.raise(ErrorKind::KeyError(name.to_string()))),
            other => Err(rt.raise(ErrorKind::TypeMismatch { expected: "string", got: other.type_name() })),
        },
        RESPONDS_TO => Ok(Thing::Bool(1)),
        _ => Err(rt.raise(ErrorKind::NoSuchSymbol)),
    }
}

fn object(
    rt: &mut Runtime,
    id: SymbolId,
    fields: &Rc<crate::value::OrderedMap<(SymbolId, Thing)>>,
    args: &[Thing],
) -> RetVal {
    use symbol::*;
    if id == symbol::CALL {
        let call_prop = fields.iter().find(|(_, (sym, _))| *sym == symbol::CALL);
        return match call_prop {
            Some((_, (_, callee))) => rt.call_function(&callee.clone(), &args[1..]),
            None => Err(rt.raise(ErrorKind::NoSuchSymbol)),
        };
    }
    if id == RESPONDS_TO {
        let target = match &args[1] {
            Thing::Symbol(sid, _) => *sid,
            _ => return Ok(Thing::Bool(0)),
        };
        let has = fields.iter().any(|(_, (sym, _))| *sym == target);
        return Ok(Thing::Bool(has as u8));
    }
    match fields.iter().find(|(_, (sym, _))| *sym == id) {
        Some((_, (_, value))) => {
            if args.len() <= 1 {
                Ok(value.clone())
            } else {
                rt.call_function(value, &args[1..])
            }
        }
        None => {
            // absent symbol falls back to `responds_to` semantics: false
            Ok(Thing::Bool(0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::Runtime;

    #[test]
    fn integer_addition_dispatches_on_first_arg() {
        let mut rt = Runtime::new(None);
        let result = apply_symbol(&mut rt, symbol::ADD, &[Thing::Int(2), Thing::Int(3)]).unwrap();
        assert!(matches!(result, Thing::Int(5)));
    }

    #[test]
    fn arity_mismatch_reports_both_counts() {
        let mut rt = Runtime::new(None);
        let err = apply_symbol(&mut rt, symbol::NOT, &[Thing::Bool(1), Thing::Bool(0)]).unwrap_err();
        assert!(err.to_string().contains('1') && err.to_string().contains('2'));
    }

    #[test]
    fn heterogeneous_comparison_is_a_type_error() {
        let mut rt = Runtime::new(None);
        let err = apply_symbol(&mut rt, symbol::LT, &[Thing::Int(1), Thing::str("x", true)]).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::TypeMismatch { .. }));
    }
}
