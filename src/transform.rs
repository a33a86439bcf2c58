// AST lowering: nine fixed passes that rewrite sugar into the small set
// of stack-op tags the emitter understands directly (see token.rs).
//
// Every pass but block-flattening is built on `Token::transform`, the
// single deep-copy-with-visitor primitive: call `t.transform(&mut f)` to
// rewrite every child bottom-up, then apply `f` once more to the result
// so the root itself is covered. Block-flattening is a one-to-many
// splice and doesn't fit that shape, so it walks the tree directly.
//
// Passes run in exactly the order spec'd: closure extraction, list→cons,
// control-flow→jumps, destructure, object-literal desugar, list→cons
// again, block flattening, init-function wrap, block flattening again.

use crate::location::SourceLocation;
use crate::token::{Token, TokenKind};

/// Carries the single monotonic id counter shared by every pass that
/// needs fresh names -- closure extraction's `$N` function names and
/// control-flow's `$N` labels draw from the same pool, so names stay
/// dense across the whole lowering run.
struct Transformer {
    next_id: u32,
}

impl Transformer {
    fn new() -> Transformer {
        Transformer { next_id: 0 }
    }

    fn next(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

pub fn lower(root: Token) -> Token {
    let mut xf = Transformer::new();
    let root = extract_closures(root, &mut xf);
    let root = apply_list_to_cons(root);
    let root = lower_control_flow(root, &mut xf);
    let root = apply_destructure(root);
    let root = apply_object_desugar(root);
    let root = apply_list_to_cons(root);
    let root = flatten_blocks(root);
    let root = wrap_init(root);
    flatten_blocks(root)
}

// --- pass 1: closure extraction ---
//
// Hoisted functions are appended as top-level siblings of the original
// statement list immediately, *before* the later passes run, rather than
// carried alongside in a side list -- control-flow lowering, destructure
// and object desugar all need to reach into every function body, not
// just the statements that end up in `$init`.

fn extract_closures(root: Token, xf: &mut Transformer) -> Token {
    let mut hoisted = Vec::new();
    let mut f = |t: Token| -> Token {
        if let TokenKind::Func(_, params, body) = t.kind {
            let name = format!("${}", xf.next());
            hoisted.push(Token::new(t.loc, TokenKind::Func(Some(name.clone()), params, body)));
            Token::new(t.loc, TokenKind::NewFunc(name))
        } else {
            t
        }
    };
    let transformed = root.transform(&mut f);
    let root = f(transformed);
    let loc = root.loc;
    let mut stmts = match root.kind {
        TokenKind::Block(stmts) => stmts,
        other => vec![Token::new(loc, other)],
    };
    stmts.extend(hoisted);
    Token::new(loc, TokenKind::Block(stmts))
}

// --- passes 2 & 6: list -> cons ---

fn apply_list_to_cons(root: Token) -> Token {
    fn f(t: Token) -> Token {
        if let TokenKind::List(items) = t.kind {
            let mut acc = Token::none(t.loc);
            for item in items.into_iter().rev() {
                acc = Token::call_builtin(t.loc, "::", vec![item, acc]);
            }
            acc
        } else {
            t
        }
    }
    let transformed = root.transform(&mut f);
    f(transformed)
}

// --- pass 3: control flow -> jumps ---

fn lower_control_flow(root: Token, xf: &mut Transformer) -> Token {
    let mut f = |t: Token| -> Token {
        match t.kind {
            TokenKind::If(branches, else_) => lower_if(t.loc, branches, else_, xf),
            TokenKind::While(cond, body) => lower_while(t.loc, *cond, *body, xf),
            other => Token::new(t.loc, other),
        }
    };
    let transformed = root.transform(&mut f);
    f(transformed)
}

fn lower_if(loc: SourceLocation, branches: Vec<(Token, Token)>, else_: Option<Box<Token>>, xf: &mut Transformer) -> Token {
    let mut stmts = Vec::new();
    let end_label = xf.next();
    for (cond, body) in branches {
        let next_label = xf.next();
        stmts.push(Token::new(loc, TokenKind::CondJump(Box::new(cond), next_label, false)));
        stmts.push(body);
        stmts.push(Token::new(loc, TokenKind::AbsJump(end_label)));
        stmts.push(Token::new(loc, TokenKind::Label(next_label)));
    }
    if let Some(else_body) = else_ {
        stmts.push(*else_body);
    }
    stmts.push(Token::new(loc, TokenKind::Label(end_label)));
    Token::new(loc, TokenKind::Block(stmts))
}

fn lower_while(loc: SourceLocation, cond: Token, body: Token, xf: &mut Transformer) -> Token {
    let start = xf.next();
    let end = xf.next();
    Token::new(
        loc,
        TokenKind::Block(vec![
            Token::new(loc, TokenKind::Label(start)),
            Token::new(loc, TokenKind::CondJump(Box::new(cond), end, false)),
            body,
            Token::new(loc, TokenKind::AbsJump(start)),
            Token::new(loc, TokenKind::Label(end)),
        ]),
    )
}

// --- pass 4: destructure ---
//
// The tuple-element accessor is built from Dup/Swap rather than a
// 3-element rotation: a literal reading of spec.md §4.5's ROT3 table
// (`a b c -> b c a`) only produces the right `get(tuple, index)`
// argument order under the *other* common rotation convention
// (swap-the-bottom-two); see DESIGN.md for the derivation.

fn apply_destructure(root: Token) -> Token {
    fn f(t: Token) -> Token {
        let loc = t.loc;
        match t.kind {
            TokenKind::Assignment(lvalue, rvalue) => {
                let mut stmts = vec![Token::push(loc, *rvalue)];
                stmts.extend(destructure_ops(&lvalue));
                Token::new(loc, TokenKind::Block(stmts))
            }
            other => Token::new(loc, other),
        }
    }
    let transformed = root.transform(&mut f);
    f(transformed)
}

fn destructure_ops(lvalue: &Token) -> Vec<Token> {
    let loc = lvalue.loc;
    match &lvalue.kind {
        TokenKind::Identifier(name) => vec![Token::new(loc, TokenKind::Store(name.clone()))],
        TokenKind::Builtin(name) if name == "none" => vec![Token::new(loc, TokenKind::CheckNone)],
        TokenKind::Tuple(elems) => {
            let mut ops = vec![
                Token::new(loc, TokenKind::Dup),
                Token::new(loc, TokenKind::PushBuiltin("check_tuple_size".into())),
                Token::new(loc, TokenKind::Swap),
                Token::new(loc, TokenKind::PushInt(elems.len() as i32)),
                Token::new(loc, TokenKind::CallOp(2)),
                Token::new(loc, TokenKind::Pop),
            ];
            ops.extend(tuple_destructure(loc, elems));
            ops
        }
        TokenKind::Object(pairs) => object_destructure(loc, pairs),
        TokenKind::Call(callee, args) if is_cons_builtin(callee) && args.len() == 2 => {
            let mut ops = vec![
                Token::new(loc, TokenKind::PushBuiltin("unpack_cons".into())),
                Token::new(loc, TokenKind::Swap),
                Token::new(loc, TokenKind::CallOp(1)),
            ];
            ops.extend(tuple_destructure(loc, args));
            ops
        }
        TokenKind::Call(callee, args) => {
            let arity = args.len() as i32;
            let mut ops = vec![
                Token::new(loc, TokenKind::Dup),
                Token::new(loc, TokenKind::PushBuiltin("unpack_call".into())),
                Token::new(loc, TokenKind::Swap),
                Token::push(loc, (**callee).clone()),
                Token::new(loc, TokenKind::Swap),
                Token::new(loc, TokenKind::PushInt(arity)),
                Token::new(loc, TokenKind::CallOp(3)),
            ];
            ops.extend(tuple_destructure(loc, args));
            ops
        }
        TokenKind::Int(_) | TokenKind::Literal(_) => vec![
            Token::new(loc, TokenKind::PushBuiltin("assert_equal".into())),
            Token::new(loc, TokenKind::Swap),
            Token::push(loc, lvalue.clone()),
            Token::new(loc, TokenKind::CallOp(2)),
            Token::new(loc, TokenKind::Pop),
        ],
        other => panic!("destructure: unsupported lvalue shape {:?}", other),
    }
}

fn is_cons_builtin(callee: &Token) -> bool {
    matches!(&callee.kind, TokenKind::Builtin(name) if name == "::")
}

/// Shared by Tuple, the post-`unpack_cons` pair, and a Call pattern's
/// argument list: `get`'s first argument must be the tuple, so each
/// element does `PushBuiltin(get); Swap; PushInt(i); CallOp(2)` rather
/// than a 3-element rotation -- see the module-level note above.
fn tuple_destructure(loc: SourceLocation, elems: &[Token]) -> Vec<Token> {
    let mut ops = Vec::new();
    let last = elems.len().saturating_sub(1);
    for (i, elem) in elems.iter().enumerate() {
        if i != last {
            ops.push(Token::new(loc, TokenKind::Dup));
        }
        ops.push(Token::new(loc, TokenKind::PushBuiltin("get".into())));
        ops.push(Token::new(loc, TokenKind::Swap));
        ops.push(Token::new(loc, TokenKind::PushInt(i as i32)));
        ops.push(Token::new(loc, TokenKind::CallOp(2)));
        ops.extend(destructure_ops(elem));
    }
    ops
}

fn object_destructure(loc: SourceLocation, pairs: &[(Token, Token)]) -> Vec<Token> {
    let mut ops = Vec::new();
    let last = pairs.len().saturating_sub(1);
    for (i, (key, value)) in pairs.iter().enumerate() {
        if i != last {
            ops.push(Token::new(loc, TokenKind::Dup));
        }
        ops.push(Token::push(loc, key.clone()));
        ops.push(Token::new(loc, TokenKind::Swap));
        ops.push(Token::new(loc, TokenKind::CallOp(1)));
        ops.extend(destructure_ops(value));
    }
    ops
}

// --- pass 5: object-literal desugar ---

fn apply_object_desugar(root: Token) -> Token {
    fn f(t: Token) -> Token {
        let loc = t.loc;
        match t.kind {
            TokenKind::Object(pairs) => {
                let items: Vec<Token> =
                    pairs.into_iter().map(|(k, v)| Token::new(loc, TokenKind::Tuple(vec![k, v]))).collect();
                let list = Token::new(loc, TokenKind::List(items));
                Token::call_builtin(loc, "object", vec![list])
            }
            other => Token::new(loc, other),
        }
    }
    let transformed = root.transform(&mut f);
    f(transformed)
}

// --- passes 7 & 9: block flattening ---
//
// A one-to-many splice, so it walks the tree directly instead of going
// through `Token::transform`.

fn flatten_blocks(t: Token) -> Token {
    match t.kind {
        TokenKind::Block(stmts) => {
            let mut out = Vec::new();
            for s in stmts {
                let flat = flatten_blocks(s);
                match flat.kind {
                    TokenKind::Block(inner) => out.extend(inner),
                    other => out.push(Token::new(flat.loc, other)),
                }
            }
            Token::new(t.loc, TokenKind::Block(out))
        }
        TokenKind::Func(name, params, body) => {
            Token::new(t.loc, TokenKind::Func(name, params, Box::new(flatten_blocks(*body))))
        }
        other => Token::new(t.loc, other),
    }
}

// --- pass 8: init-function wrap ---
//
// By now every top-level statement is either a hoisted, named `Func`
// (from pass 1) or an ordinary statement. Split those apart: the named
// funcs stay top-level siblings, everything else becomes `$init`'s body.

fn wrap_init(root: Token) -> Token {
    let loc = root.loc;
    let stmts = match root.kind {
        TokenKind::Block(stmts) => stmts,
        other => vec![Token::new(loc, other)],
    };
    let mut init_stmts = Vec::new();
    let mut funcs = Vec::new();
    for s in stmts {
        match &s.kind {
            TokenKind::Func(Some(_), _, _) => funcs.push(s),
            _ => init_stmts.push(s),
        }
    }
    let init_body = Token::new(loc, TokenKind::Block(init_stmts));
    let init_func = Token::new(loc, TokenKind::Func(Some("$init".to_string()), vec!["$arg".to_string()], Box::new(init_body)));
    let mut top = vec![init_func];
    top.append(&mut funcs);
    Token::new(loc, TokenKind::Block(top))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn wraps_top_level_statements_in_init_and_keeps_funcs_as_siblings() {
        let ast = parse("f = def x do <- x; end; y = 1;").unwrap();
        let lowered = lower(ast);
        match lowered.kind {
            TokenKind::Block(stmts) => {
                assert!(stmts.iter().any(|s| matches!(&s.kind, TokenKind::Func(Some(n), _, _) if n == "$init")));
                assert!(stmts.iter().any(|s| matches!(&s.kind, TokenKind::Func(Some(n), _, _) if n != "$init")));
            }
            other => panic!("expected a top-level block, got {:?}", other),
        }
    }

    #[test]
    fn if_lowers_to_jumps_with_no_residual_if_node() {
        let ast = parse("if x == 1 then y = 2; end").unwrap();
        let lowered = lower(ast);
        assert!(!contains_if_or_while(&lowered));
    }

    fn contains_if_or_while(t: &Token) -> bool {
        let mut found = false;
        t.transform(&mut |inner| {
            if matches!(inner.kind, TokenKind::If(..) | TokenKind::While(..)) {
                found = true;
            }
            inner
        });
        found
    }

    #[test]
    fn tuple_assignment_destructures_into_store_sequence() {
        let ast = parse("(a, b) = (1, 2);").unwrap();
        let lowered = lower(ast);
        let init_body = find_init_body(&lowered);
        let stores: Vec<&str> = init_body
            .iter()
            .filter_map(|t| match &t.kind {
                TokenKind::Store(name) => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(stores, vec!["a", "b"]);
    }

    fn find_init_body(t: &Token) -> Vec<Token> {
        match &t.kind {
            TokenKind::Block(stmts) => {
                for s in stmts {
                    if let TokenKind::Func(Some(n), _, body) = &s.kind {
                        if n == "$init" {
                            if let TokenKind::Block(inner) = &body.kind {
                                return inner.clone();
                            }
                        }
                    }
                }
                panic!("no $init found")
            }
            _ => panic!("expected top-level block"),
        }
    }

    #[test]
    fn control_flow_lowers_inside_hoisted_function_bodies() {
        let ast = parse("def fact n do if n == 1 then <- 1; else <- n; end end;").unwrap();
        let lowered = lower(ast);
        assert!(!contains_if_or_while(&lowered));
    }

    #[test]
    fn destructure_lowers_inside_hoisted_function_bodies() {
        let ast = parse("def f x do (a, b) = x; <- a; end;").unwrap();
        let lowered = lower(ast);
        assert!(!contains_tuple_assign(&lowered));
    }

    fn contains_tuple_assign(t: &Token) -> bool {
        let mut found = false;
        t.transform(&mut |inner| {
            if let TokenKind::Assignment(lhs, _) = &inner.kind {
                if matches!(lhs.kind, TokenKind::Tuple(_)) {
                    found = true;
                }
            }
            inner
        });
        found
    }
}
