// AST node definitions.
//
// `Token` is the closed variant set described by the language's grammar,
// plus the intermediate "stack op" variants produced by the lowering
// passes in `transform`. Every variant owns its children directly (no
// sharing), so a `Token` tree can always be deep-copied independently of
// its source — see `Token::transform`, the single primitive every
// lowering pass is built from.

use crate::location::SourceLocation;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
}

impl BinOp {
    pub fn symbol_name(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Eq => "==",
            BinOp::Neq => "!=",
            BinOp::Lt => "<",
            BinOp::Lte => "<=",
            BinOp::Gt => ">",
            BinOp::Gte => ">=",
            BinOp::And => "and",
            BinOp::Or => "or",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnOp {
    Not,
}

impl UnOp {
    pub fn symbol_name(self) -> &'static str {
        match self {
            UnOp::Not => "not",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub loc: SourceLocation,
    pub kind: TokenKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    // Atoms
    Int(i32),
    Float(f32),
    Literal(String),
    Identifier(String),
    Tuple(Vec<Token>),
    List(Vec<Token>),
    Object(Vec<(Token, Token)>),

    // Expressions
    Call(Box<Token>, Vec<Token>),
    BinaryOp(BinOp, Box<Token>, Box<Token>),
    UnaryOp(UnOp, Box<Token>),

    // Statements
    Assignment(Box<Token>, Box<Token>),
    Block(Vec<Token>),
    If(Vec<(Token, Token)>, Option<Box<Token>>),
    While(Box<Token>, Box<Token>),
    Func(Option<String>, Vec<String>, Box<Token>),
    Return(Box<Token>),

    // Lowering-only tags, produced by `transform` passes and understood
    // directly by the emitter (see emit.rs).
    Label(u32),
    AbsJump(u32),
    CondJump(Box<Token>, u32, bool),
    PushBuiltin(String),
    PushInt(i32),
    CallOp(u32),
    Store(String),
    Dup,
    Push(Box<Token>),
    Swap,
    Pop,
    Builtin(String),
    CheckNone,
    NewFunc(String),
}

/// Transforms `t` bottom-up and lets `f` rewrite the result, for use from
/// inside `Token::transform`'s own match arms. Split into two statements
/// (rather than `f(t.transform(f))` inline) because calling `f` while one
/// of its own arguments also reborrows `f` doesn't borrow-check -- the
/// implicit reborrow for invoking `f` is reserved before the argument
/// expression evaluates, and that argument's own reborrow of `f` collides
/// with it.
fn recurse(t: &Token, f: &mut impl FnMut(Token) -> Token) -> Token {
    let child = t.transform(f);
    f(child)
}

impl Token {
    pub fn new(loc: SourceLocation, kind: TokenKind) -> Token {
        Token { loc, kind }
    }

    pub fn at(loc: SourceLocation, kind: TokenKind) -> Token {
        Token::new(loc, kind)
    }

    pub fn builtin(loc: SourceLocation, name: impl Into<String>) -> Token {
        Token::new(loc, TokenKind::Builtin(name.into()))
    }

    pub fn push(loc: SourceLocation, inner: Token) -> Token {
        Token::new(loc, TokenKind::Push(Box::new(inner)))
    }

    pub fn call(loc: SourceLocation, callee: Token, args: Vec<Token>) -> Token {
        Token::new(loc, TokenKind::Call(Box::new(callee), args))
    }

    pub fn call_builtin(loc: SourceLocation, name: impl Into<String>, args: Vec<Token>) -> Token {
        Token::call(loc, Token::builtin(loc, name), args)
    }

    pub fn none(loc: SourceLocation) -> Token {
        Token::builtin(loc, "none")
    }

    /// Deep-copy this node, replacing each direct child with the result
    /// of calling `f` on it first. Every AST-to-AST transform pass is a
    /// thin wrapper around a call to `transform` with pass-specific
    /// logic in `f`.
    pub fn transform(&self, f: &mut impl FnMut(Token) -> Token) -> Token {
        use TokenKind::*;
        let loc = self.loc;
        let kind = match &self.kind {
            Int(v) => Int(*v),
            Float(v) => Float(*v),
            Literal(s) => Literal(s.clone()),
            Identifier(s) => Identifier(s.clone()),
            Tuple(items) => Tuple(items.iter().map(|t| recurse(t, f)).collect()),
            List(items) => List(items.iter().map(|t| recurse(t, f)).collect()),
            Object(pairs) => Object(
                pairs
                    .iter()
                    .map(|(k, v)| (recurse(k, f), recurse(v, f)))
                    .collect(),
            ),
            Call(callee, args) => Call(
                Box::new(recurse(callee, f)),
                args.iter().map(|t| recurse(t, f)).collect(),
            ),
            BinaryOp(op, l, r) => {
                BinaryOp(*op, Box::new(recurse(l, f)), Box::new(recurse(r, f)))
            }
            UnaryOp(op, e) => UnaryOp(*op, Box::new(recurse(e, f))),
            Assignment(lv, rv) => Assignment(Box::new(recurse(lv, f)), Box::new(recurse(rv, f))),
            Block(stmts) => Block(stmts.iter().map(|t| recurse(t, f)).collect()),
            If(branches, else_) => If(
                branches
                    .iter()
                    .map(|(c, b)| (recurse(c, f), recurse(b, f)))
                    .collect(),
                else_.as_ref().map(|b| Box::new(recurse(b, f))),
            ),
            While(cond, body) => While(Box::new(recurse(cond, f)), Box::new(recurse(body, f))),
            Func(name, params, body) => {
                Func(name.clone(), params.clone(), Box::new(recurse(body, f)))
            }
            Return(e) => Return(Box::new(recurse(e, f))),
            Label(id) => Label(*id),
            AbsJump(id) => AbsJump(*id),
            CondJump(cond, id, when) => CondJump(Box::new(recurse(cond, f)), *id, *when),
            PushBuiltin(n) => PushBuiltin(n.clone()),
            PushInt(v) => PushInt(*v),
            CallOp(n) => CallOp(*n),
            Store(n) => Store(n.clone()),
            Dup => Dup,
            Push(inner) => Push(Box::new(recurse(inner, f))),
            Swap => Swap,
            Pop => Pop,
            Builtin(n) => Builtin(n.clone()),
            CheckNone => CheckNone,
            NewFunc(n) => NewFunc(n.clone()),
        };
        Token::new(loc, kind)
    }

    /// Deep copy, used by the parse round-trip property test.
    pub fn deep_copy(&self) -> Token {
        self.transform(&mut |t| t)
    }

    pub fn print(&self, depth: usize) -> String {
        let indent = "  ".repeat(depth);
        format!("{}{:?}\n", indent, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> SourceLocation {
        SourceLocation::new(1, 1)
    }

    #[test]
    fn deep_copy_is_structurally_equal() {
        let ast = Token::new(
            loc(),
            TokenKind::Block(vec![
                Token::new(loc(), TokenKind::Int(1)),
                Token::call_builtin(loc(), "+", vec![
                    Token::new(loc(), TokenKind::Int(2)),
                    Token::new(loc(), TokenKind::Int(3)),
                ]),
            ]),
        );
        assert_eq!(ast, ast.deep_copy());
    }

    #[test]
    fn transform_can_rewrite_leaves() {
        // `transform` itself only rewrites children; a caller that also
        // wants the root rewritten applies `f` to the result, same as
        // every real call site in transform.rs does.
        let ast = Token::new(loc(), TokenKind::Int(1));
        let mut rewrite = |t: Token| match t.kind {
            TokenKind::Int(v) => Token::new(t.loc, TokenKind::Int(v + 1)),
            _ => t,
        };
        let child = ast.transform(&mut rewrite);
        let rewritten = rewrite(child);
        assert_eq!(rewritten.kind, TokenKind::Int(2));
    }
}
