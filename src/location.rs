// Source positions, carried by every AST node and by selected bytecode
// offsets via a module's source map.

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    pub const fn new(line: u32, column: u32) -> Self {
        SourceLocation { line, column }
    }

    pub const fn start() -> Self {
        SourceLocation { line: 1, column: 1 }
    }
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.line, self.column)
    }
}
