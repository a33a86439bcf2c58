// Recursive-descent parser with an explicit operator-precedence climb.
//
// Grammar (informal):
//
//   module      := statement*
//   statement   := if | while | func | return | assignment
//   assignment  := expr ';' | expr '=' expr ';'
//   if          := 'if' expr 'then' block ('elif' expr 'then' block)*
//                  ('else' block)? 'end'
//   while       := 'while' expr 'do' block 'end'
//   func        := 'def' identifier identifier* 'do' block 'end' ';'
//   return      := '<-' expr ';'
//   expr        := climb through 6 precedence levels (see parse_or_and)
//
// The left-hand side of an assignment is parsed as a full expression,
// same as the right-hand side -- tuple/object/cons/call *patterns* are
// ordinary expressions syntactically, and are only reinterpreted as
// lvalue shapes by the destructure lowering pass (see transform::destructure).
//
// Parse errors are recorded as the first `{message, location}` the parser
// encounters; the pipeline formats it as `"{msg} at ({line},{col})"`.

use crate::lexer::{is_keyword, LexError, Lexer, Lexeme, SpannedLexeme};
use crate::location::SourceLocation;
use crate::token::{BinOp, Token, TokenKind, UnOp};

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub loc: SourceLocation,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at ({}, {})", self.message, self.loc.line, self.loc.column)
    }
}

impl From<LexError> for ParseError {
    fn from(e: LexError) -> Self {
        ParseError { message: e.message, loc: e.loc }
    }
}

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: SpannedLexeme,
}

type PResult<T> = Result<T, ParseError>;

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> PResult<Parser<'a>> {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_lexeme()?;
        Ok(Parser { lexer, current })
    }

    fn loc(&self) -> SourceLocation {
        self.current.loc
    }

    fn bump(&mut self) -> PResult<Lexeme> {
        let next = self.lexer.next_lexeme()?;
        Ok(std::mem::replace(&mut self.current, next).lexeme)
    }

    fn expect(&mut self, expected: &Lexeme) -> PResult<()> {
        if &self.current.lexeme == expected {
            self.bump()?;
            Ok(())
        } else {
            Err(ParseError {
                message: format!("expected {:?} but found {:?}", expected, self.current.lexeme),
                loc: self.loc(),
            })
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> PResult<()> {
        match &self.current.lexeme {
            Lexeme::Ident(name) if name == kw => {
                self.bump()?;
                Ok(())
            }
            other => Err(ParseError {
                message: format!("expected keyword '{}' but found {:?}", kw, other),
                loc: self.loc(),
            }),
        }
    }

    fn at_keyword(&self, kw: &str) -> bool {
        matches!(&self.current.lexeme, Lexeme::Ident(name) if name == kw)
    }

    fn expect_ident(&mut self) -> PResult<(String, SourceLocation)> {
        let loc = self.loc();
        match self.bump()? {
            Lexeme::Ident(name) if !is_keyword(&name) => Ok((name, loc)),
            other => Err(ParseError {
                message: format!("expected identifier but found {:?}", other),
                loc,
            }),
        }
    }

    pub fn parse_module(&mut self) -> PResult<Token> {
        let loc = self.loc();
        let mut statements = Vec::new();
        while self.current.lexeme != Lexeme::Eof {
            statements.push(self.parse_statement()?);
        }
        Ok(Token::new(loc, TokenKind::Block(statements)))
    }

    fn parse_block_until(&mut self, terminators: &[&str]) -> PResult<Token> {
        let loc = self.loc();
        let mut statements = Vec::new();
        while !terminators.iter().any(|kw| self.at_keyword(kw)) {
            if self.current.lexeme == Lexeme::Eof {
                return Err(ParseError {
                    message: "unexpected end of input".into(),
                    loc: self.loc(),
                });
            }
            statements.push(self.parse_statement()?);
        }
        Ok(Token::new(loc, TokenKind::Block(statements)))
    }

    fn parse_statement(&mut self) -> PResult<Token> {
        if self.at_keyword("if") {
            return self.parse_if();
        }
        if self.at_keyword("while") {
            return self.parse_while();
        }
        if self.at_keyword("def") {
            return self.parse_func_statement();
        }
        if self.current.lexeme == Lexeme::Arrow {
            return self.parse_return();
        }
        self.parse_assignment()
    }

    fn parse_return(&mut self) -> PResult<Token> {
        let loc = self.loc();
        self.bump()?; // <-
        let value = self.parse_expr()?;
        self.expect(&Lexeme::Semicolon)?;
        Ok(Token::new(loc, TokenKind::Return(Box::new(value))))
    }

    fn parse_assignment(&mut self) -> PResult<Token> {
        let loc = self.loc();
        let lhs = self.parse_expr()?;
        if self.current.lexeme == Lexeme::Equals {
            self.bump()?;
            let rhs = self.parse_expr()?;
            self.expect(&Lexeme::Semicolon)?;
            Ok(Token::new(loc, TokenKind::Assignment(Box::new(lhs), Box::new(rhs))))
        } else {
            self.expect(&Lexeme::Semicolon)?;
            Ok(lhs)
        }
    }

    fn parse_if(&mut self) -> PResult<Token> {
        let loc = self.loc();
        self.expect_keyword("if")?;
        let mut branches = Vec::new();
        let cond = self.parse_expr()?;
        self.expect_keyword("then")?;
        let body = self.parse_block_until(&["elif", "else", "end"])?;
        branches.push((cond, body));

        while self.at_keyword("elif") {
            self.expect_keyword("elif")?;
            let cond = self.parse_expr()?;
            self.expect_keyword("then")?;
            let body = self.parse_block_until(&["elif", "else", "end"])?;
            branches.push((cond, body));
        }

        let else_branch = if self.at_keyword("else") {
            self.expect_keyword("else")?;
            Some(Box::new(self.parse_block_until(&["end"])?))
        } else {
            None
        };

        self.expect_keyword("end")?;
        Ok(Token::new(loc, TokenKind::If(branches, else_branch)))
    }

    fn parse_while(&mut self) -> PResult<Token> {
        let loc = self.loc();
        self.expect_keyword("while")?;
        let cond = self.parse_expr()?;
        self.expect_keyword("do")?;
        let body = self.parse_block_until(&["end"])?;
        self.expect_keyword("end")?;
        Ok(Token::new(loc, TokenKind::While(Box::new(cond), Box::new(body))))
    }

    // A named `def` at statement position is sugar for assigning an
    // (unnamed) function value to that identifier.
    fn parse_func_statement(&mut self) -> PResult<Token> {
        let loc = self.loc();
        self.expect_keyword("def")?;
        let (name, name_loc) = self.expect_ident()?;
        let func = self.parse_func_tail(loc)?;
        self.expect(&Lexeme::Semicolon)?;
        Ok(Token::new(
            loc,
            TokenKind::Assignment(
                Box::new(Token::new(name_loc, TokenKind::Identifier(name))),
                Box::new(func),
            ),
        ))
    }

    // Anonymous function literal, used wherever an expression is expected.
    fn parse_func_atom(&mut self) -> PResult<Token> {
        let loc = self.loc();
        self.expect_keyword("def")?;
        self.parse_func_tail(loc)
    }

    fn parse_func_tail(&mut self, loc: SourceLocation) -> PResult<Token> {
        let mut params = Vec::new();
        while let Lexeme::Ident(ident) = &self.current.lexeme {
            if is_keyword(ident) {
                break;
            }
            params.push(ident.clone());
            self.bump()?;
        }
        self.expect_keyword("do")?;
        let body = self.parse_block_until(&["end"])?;
        self.expect_keyword("end")?;
        Ok(Token::new(loc, TokenKind::Func(None, params, Box::new(body))))
    }

    // --- expressions, lowest to highest binding ---

    fn parse_expr(&mut self) -> PResult<Token> {
        self.parse_or_and()
    }

    fn parse_or_and(&mut self) -> PResult<Token> {
        let mut lhs = self.parse_not()?;
        loop {
            let op = match &self.current.lexeme {
                Lexeme::Ident(name) if name == "and" => BinOp::And,
                Lexeme::Ident(name) if name == "or" => BinOp::Or,
                _ => break,
            };
            let loc = self.loc();
            self.bump()?;
            let rhs = self.parse_not()?;
            lhs = Token::new(loc, TokenKind::BinaryOp(op, Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> PResult<Token> {
        if self.at_keyword("not") {
            let loc = self.loc();
            self.bump()?;
            let operand = self.parse_not()?;
            return Ok(Token::new(loc, TokenKind::UnaryOp(UnOp::Not, Box::new(operand))));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> PResult<Token> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match &self.current.lexeme {
                Lexeme::EqEq => BinOp::Eq,
                Lexeme::NotEq => BinOp::Neq,
                Lexeme::Lt => BinOp::Lt,
                Lexeme::Lte => BinOp::Lte,
                Lexeme::Gt => BinOp::Gt,
                Lexeme::Gte => BinOp::Gte,
                _ => break,
            };
            let loc = self.loc();
            self.bump()?;
            let rhs = self.parse_additive()?;
            lhs = Token::new(loc, TokenKind::BinaryOp(op, Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> PResult<Token> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match &self.current.lexeme {
                Lexeme::Plus => BinOp::Add,
                Lexeme::Minus => BinOp::Sub,
                _ => break,
            };
            let loc = self.loc();
            self.bump()?;
            let rhs = self.parse_multiplicative()?;
            lhs = Token::new(loc, TokenKind::BinaryOp(op, Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> PResult<Token> {
        let mut lhs = self.parse_unary_minus()?;
        loop {
            let op = match &self.current.lexeme {
                Lexeme::Star => BinOp::Mul,
                Lexeme::Slash => BinOp::Div,
                _ => break,
            };
            let loc = self.loc();
            self.bump()?;
            let rhs = self.parse_unary_minus()?;
            lhs = Token::new(loc, TokenKind::BinaryOp(op, Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    // A `-` at the start of a factor is a sign, not the subtraction
    // operator: folded directly into a numeric literal when possible,
    // otherwise desugared to `0 - x` so the value system needs no
    // separate unary-negate symbol.
    fn parse_unary_minus(&mut self) -> PResult<Token> {
        if self.current.lexeme == Lexeme::Minus {
            let loc = self.loc();
            self.bump()?;
            let operand = self.parse_unary_minus()?;
            return Ok(match operand.kind {
                TokenKind::Int(v) => Token::new(loc, TokenKind::Int(-v)),
                TokenKind::Float(v) => Token::new(loc, TokenKind::Float(-v)),
                _ => Token::new(
                    loc,
                    TokenKind::BinaryOp(
                        BinOp::Sub,
                        Box::new(Token::new(loc, TokenKind::Int(0))),
                        Box::new(operand),
                    ),
                ),
            });
        }
        self.parse_application()
    }

    fn starts_atom(&self) -> bool {
        matches!(
            self.current.lexeme,
            Lexeme::Int(_)
                | Lexeme::Float(_)
                | Lexeme::Str(_)
                | Lexeme::LParen
                | Lexeme::LBracket
                | Lexeme::LBrace
        ) || matches!(&self.current.lexeme, Lexeme::Ident(name) if !is_keyword(name) || name == "def")
    }

    // Juxtaposed atoms denote function application: `f a b` is one Call
    // with both arguments, not a curried chain.
    fn parse_application(&mut self) -> PResult<Token> {
        let loc = self.loc();
        let callee = self.parse_atom()?;
        let mut args = Vec::new();
        while self.starts_atom() {
            args.push(self.parse_atom()?);
        }
        if args.is_empty() {
            Ok(callee)
        } else {
            Ok(Token::new(loc, TokenKind::Call(Box::new(callee), args)))
        }
    }

    fn parse_object_pair(&mut self) -> PResult<(Token, Token)> {
        let key = self.parse_expr()?;
        self.expect(&Lexeme::Colon)?;
        let value = self.parse_expr()?;
        Ok((key, value))
    }

    fn parse_atom(&mut self) -> PResult<Token> {
        let loc = self.loc();
        match self.current.lexeme.clone() {
            Lexeme::Int(v) => {
                self.bump()?;
                Ok(Token::new(loc, TokenKind::Int(v)))
            }
            Lexeme::Float(v) => {
                self.bump()?;
                Ok(Token::new(loc, TokenKind::Float(v)))
            }
            Lexeme::Str(s) => {
                self.bump()?;
                Ok(Token::new(loc, TokenKind::Literal(s)))
            }
            Lexeme::Ident(name) if name == "def" => self.parse_func_atom(),
            Lexeme::Ident(name) => {
                if is_keyword(&name) {
                    return Err(ParseError {
                        message: format!("unexpected keyword '{}'", name),
                        loc,
                    });
                }
                self.bump()?;
                Ok(Token::new(loc, TokenKind::Identifier(name)))
            }
            Lexeme::LParen => {
                self.bump()?;
                let mut items = vec![self.parse_expr()?];
                let mut is_tuple = false;
                while self.current.lexeme == Lexeme::Comma {
                    is_tuple = true;
                    self.bump()?;
                    items.push(self.parse_expr()?);
                }
                self.expect(&Lexeme::RParen)?;
                if is_tuple {
                    Ok(Token::new(loc, TokenKind::Tuple(items)))
                } else {
                    Ok(items.remove(0))
                }
            }
            Lexeme::LBracket => {
                self.bump()?;
                let mut items = Vec::new();
                if self.current.lexeme != Lexeme::RBracket {
                    items.push(self.parse_expr()?);
                    while self.current.lexeme == Lexeme::Comma {
                        self.bump()?;
                        items.push(self.parse_expr()?);
                    }
                }
                self.expect(&Lexeme::RBracket)?;
                Ok(Token::new(loc, TokenKind::List(items)))
            }
            Lexeme::LBrace => {
                self.bump()?;
                let mut pairs = Vec::new();
                if self.current.lexeme != Lexeme::RBrace {
                    pairs.push(self.parse_object_pair()?);
                    while self.current.lexeme == Lexeme::Comma {
                        self.bump()?;
                        pairs.push(self.parse_object_pair()?);
                    }
                }
                self.expect(&Lexeme::RBrace)?;
                Ok(Token::new(loc, TokenKind::Object(pairs)))
            }
            other => Err(ParseError {
                message: format!("unexpected token {:?}", other),
                loc,
            }),
        }
    }
}

pub fn parse(source: &str) -> Result<Token, ParseError> {
    let mut parser = Parser::new(source)?;
    parser.parse_module()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenKind::*;

    fn parse_expr_only(src: &str) -> Token {
        let mut p = Parser::new(src).unwrap();
        p.parse_expr().unwrap()
    }

    #[test]
    fn parses_arithmetic_precedence() {
        let ast = parse_expr_only("3 + 4 * 5");
        match ast.kind {
            BinaryOp(BinOp::Add, _, ref rhs) => match rhs.kind {
                BinaryOp(BinOp::Mul, _, _) => {}
                _ => panic!("expected multiplication nested under addition"),
            },
            _ => panic!("expected addition at top level"),
        }
    }

    #[test]
    fn parses_function_call_with_multiple_args() {
        let ast = parse_expr_only("add_sub 1 2 3");
        match ast.kind {
            Call(_, args) => assert_eq!(args.len(), 3),
            _ => panic!("expected a call"),
        }
    }

    #[test]
    fn parses_tuple_vs_grouping() {
        assert!(matches!(parse_expr_only("(1)").kind, Int(1)));
        assert!(matches!(parse_expr_only("(1, 2)").kind, Tuple(_)));
    }

    #[test]
    fn parses_unary_minus_as_sign() {
        assert!(matches!(parse_expr_only("-5").kind, Int(-5)));
        match parse_expr_only("-x").kind {
            BinaryOp(BinOp::Sub, _, _) => {}
            other => panic!("expected desugared subtraction, got {:?}", other),
        }
    }

    #[test]
    fn parses_if_while_func() {
        let ast = parse("fact = def n do if n == 1 then <- 1; else <- n * fact(n - 1); end end;").unwrap();
        match ast.kind {
            Block(stmts) => assert_eq!(stmts.len(), 1),
            _ => panic!("expected a single top-level assignment"),
        }
    }

    #[test]
    fn parses_object_literal() {
        let ast = parse_expr_only("{a: 1, b: 2}");
        match ast.kind {
            Object(pairs) => assert_eq!(pairs.len(), 2),
            other => panic!("expected an object literal, got {:?}", other),
        }
    }

    #[test]
    fn rejects_keyword_as_identifier() {
        let err = parse_expr_only_err("1 + end");
        assert!(err.message.contains("keyword"));
    }

    fn parse_expr_only_err(src: &str) -> ParseError {
        Parser::new(src).unwrap().parse_expr().unwrap_err()
    }
}
