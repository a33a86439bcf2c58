// Character stream -> lexeme stream.
//
// Whitespace and `#`-to-end-of-line comments are skipped between lexemes.
// The cursor tracks `{index, line, column}` so every lexeme (and, via the
// parser, every AST node) carries a source location.

use crate::location::SourceLocation;

pub const KEYWORDS: &[&str] = &[
    "def", "if", "then", "do", "elif", "else", "while", "end", "and", "or", "not",
];

lazy_static::lazy_static! {
    static ref KEYWORD_SET: std::collections::HashSet<&'static str> =
        KEYWORDS.iter().copied().collect();
}

pub fn is_keyword(ident: &str) -> bool {
    KEYWORD_SET.contains(ident)
}

#[derive(Clone, Debug, PartialEq)]
pub enum Lexeme {
    Int(i32),
    Float(f32),
    Str(String),
    Ident(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Colon,
    Comma,
    Semicolon,
    Equals,
    Arrow, // <-
    Plus,
    Minus,
    Star,
    Slash,
    EqEq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    Eof,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SpannedLexeme {
    pub lexeme: Lexeme,
    pub loc: SourceLocation,
}

pub struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: u32,
    column: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub message: String,
    pub loc: SourceLocation,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Lexer<'a> {
        Lexer { chars: source.chars().peekable(), line: 1, column: 1 }
    }

    fn loc(&self) -> SourceLocation {
        SourceLocation::new(self.line, self.column)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('#') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    pub fn next_lexeme(&mut self) -> Result<SpannedLexeme, LexError> {
        self.skip_trivia();
        let loc = self.loc();

        let c = match self.peek() {
            None => return Ok(SpannedLexeme { lexeme: Lexeme::Eof, loc }),
            Some(c) => c,
        };

        if c.is_ascii_digit() {
            return self.lex_number(loc);
        }

        if c == '_' || c.is_alphabetic() {
            return self.lex_ident(loc);
        }

        if c == '\'' {
            return self.lex_string(loc);
        }

        self.bump();
        let lexeme = match c {
            '(' => Lexeme::LParen,
            ')' => Lexeme::RParen,
            '[' => Lexeme::LBracket,
            ']' => Lexeme::RBracket,
            '{' => Lexeme::LBrace,
            '}' => Lexeme::RBrace,
            ':' => Lexeme::Colon,
            ',' => Lexeme::Comma,
            ';' => Lexeme::Semicolon,
            '+' => Lexeme::Plus,
            '-' => Lexeme::Minus,
            '*' => Lexeme::Star,
            '/' => Lexeme::Slash,
            '=' => {
                if self.peek() == Some('=') {
                    self.bump();
                    Lexeme::EqEq
                } else {
                    Lexeme::Equals
                }
            }
            '!' => {
                if self.peek() == Some('=') {
                    self.bump();
                    Lexeme::NotEq
                } else {
                    return Err(LexError { message: "unexpected character '!'".into(), loc });
                }
            }
            '<' => {
                if self.peek() == Some('=') {
                    self.bump();
                    Lexeme::Lte
                } else if self.peek() == Some('-') {
                    self.bump();
                    Lexeme::Arrow
                } else {
                    Lexeme::Lt
                }
            }
            '>' => {
                if self.peek() == Some('=') {
                    self.bump();
                    Lexeme::Gte
                } else {
                    Lexeme::Gt
                }
            }
            other => {
                return Err(LexError {
                    message: format!("unexpected character '{}'", other),
                    loc,
                })
            }
        };
        Ok(SpannedLexeme { lexeme, loc })
    }

    fn lex_number(&mut self, loc: SourceLocation) -> Result<SpannedLexeme, LexError> {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }
        let mut is_float = false;
        if self.peek() == Some('.') {
            is_float = true;
            text.push('.');
            self.bump();
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    text.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            is_float = true;
            text.push('e');
            self.bump();
            if matches!(self.peek(), Some('+') | Some('-')) {
                text.push(self.bump().unwrap());
            }
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    text.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
        }

        if is_float {
            let value: f32 = text
                .parse()
                .map_err(|_| LexError { message: format!("invalid float literal '{}'", text), loc })?;
            Ok(SpannedLexeme { lexeme: Lexeme::Float(value), loc })
        } else {
            let value: i32 = text
                .parse()
                .map_err(|_| LexError { message: format!("invalid int literal '{}'", text), loc })?;
            Ok(SpannedLexeme { lexeme: Lexeme::Int(value), loc })
        }
    }

    fn lex_ident(&mut self, loc: SourceLocation) -> Result<SpannedLexeme, LexError> {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c == '_' || c.is_alphanumeric() {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }
        Ok(SpannedLexeme { lexeme: Lexeme::Ident(text), loc })
    }

    fn lex_string(&mut self, loc: SourceLocation) -> Result<SpannedLexeme, LexError> {
        self.bump(); // opening quote
        let mut text = String::new();
        loop {
            match self.bump() {
                None => {
                    return Err(LexError { message: "unterminated string literal".into(), loc })
                }
                Some('\'') => break,
                Some('\\') => match self.bump() {
                    Some('n') => text.push('\n'),
                    Some('r') => text.push('\r'),
                    Some('t') => text.push('\t'),
                    Some('\'') => text.push('\''),
                    Some(other) => {
                        return Err(LexError {
                            message: format!("unknown escape sequence '\\{}'", other),
                            loc,
                        })
                    }
                    None => return Err(LexError { message: "unterminated string literal".into(), loc }),
                },
                Some(c) => text.push(c),
            }
        }
        Ok(SpannedLexeme { lexeme: Lexeme::Str(text), loc })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_all(src: &str) -> Vec<Lexeme> {
        let mut lexer = Lexer::new(src);
        let mut out = Vec::new();
        loop {
            let tok = lexer.next_lexeme().unwrap();
            let done = tok.lexeme == Lexeme::Eof;
            out.push(tok.lexeme);
            if done {
                break;
            }
        }
        out
    }

    #[test]
    fn lexes_numbers() {
        assert_eq!(lex_all("42"), vec![Lexeme::Int(42), Lexeme::Eof]);
        assert_eq!(lex_all("42.5"), vec![Lexeme::Float(42.5), Lexeme::Eof]);
        assert_eq!(lex_all("1e3"), vec![Lexeme::Float(1000.0), Lexeme::Eof]);
    }

    #[test]
    fn lexes_strings_with_escapes() {
        assert_eq!(
            lex_all("'a\\nb'"),
            vec![Lexeme::Str("a\nb".into()), Lexeme::Eof]
        );
    }

    #[test]
    fn skips_comments() {
        assert_eq!(lex_all("1 # comment\n+ 2"), vec![
            Lexeme::Int(1),
            Lexeme::Plus,
            Lexeme::Int(2),
            Lexeme::Eof
        ]);
    }

    #[test]
    fn recognizes_keywords() {
        assert!(is_keyword("if"));
        assert!(!is_keyword("foo"));
    }
}
