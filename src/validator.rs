// Static validation, run on the freshly-parsed AST before lowering.
//
// Currently a pass-through gate: it always accepts. Kept as its own
// stage (rather than deleted) because the pipeline -- parse, validate,
// lower, emit -- is the shape later checks (arity checking, unbound-name
// detection) would slot into without disturbing the other stages.

use crate::token::Token;

pub fn validate(_ast: &Token) -> Result<(), String> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn accepts_any_parsed_module() {
        let ast = parse("x = 1;").unwrap();
        assert!(validate(&ast).is_ok());
    }
}
