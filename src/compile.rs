// Pipeline entry point: source text in, a loadable `Module` out.
//
//   lex+parse -> validate -> lower (nine passes) -> emit
//
// Each stage is its own module (parser, validator, transform, emit) so
// the pipeline itself is just wiring.

use std::rc::Rc;

use crate::bytecode::Module;
use crate::location::SourceLocation;
use crate::parser::{self, ParseError};
use crate::{emit, transform, validator};

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum CompileError {
    #[error("{message} at ({}, {})", loc.line, loc.column)]
    Parse { message: String, loc: SourceLocation },
    #[error("{0}")]
    Validation(String),
}

impl From<ParseError> for CompileError {
    fn from(e: ParseError) -> Self {
        CompileError::Parse { message: e.message, loc: e.loc }
    }
}

pub fn compile(source: &str, filename: Option<String>) -> Result<Rc<Module>, CompileError> {
    let ast = parser::parse(source)?;
    validator::validate(&ast).map_err(CompileError::Validation)?;
    let lowered = transform::lower(ast);
    Ok(emit::emit_module(lowered, filename))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Thing;
    use crate::vm::Runtime;

    #[test]
    fn compiles_and_executes_a_factorial_function() {
        let source = "\
            def fact n do \
                if n <= 1 then \
                    <- 1; \
                else \
                    <- n * fact(n - 1); \
                end \
            end; \
            result = fact(5); \
        ";
        let module = compile(source, Some("fact.blg".to_string())).unwrap();
        let mut rt = Runtime::new(None);
        let result = rt.execute_module(module).unwrap();
        match result {
            Thing::Module(fields) => assert!(matches!(fields.get("result"), Some(Thing::Int(120)))),
            other => panic!("expected a module value, got {:?}", other),
        }
    }

    #[test]
    fn reports_a_parse_error_with_location() {
        let err = compile("x = ;", None).unwrap_err();
        assert!(matches!(err, CompileError::Parse { .. }));
    }
}
