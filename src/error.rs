// Runtime error values.
//
// Every operation that fails constructs an `Error`, snapshotting the
// current frame stack into `frames` *at construction time* -- never
// lazily, since by the time anything renders the trace the frames that
// produced it have already been unwound back to their pre-call height.
//
// `Error` doubles as the payload of `Thing::Error`: the same struct that
// propagates a failure out of `RetVal` is also the value `trycatch`'s
// second block receives, so user code can inspect what went wrong
// without the engine building two parallel representations of "an
// error".

use std::fmt;

use crate::location::SourceLocation;

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ErrorKind {
    #[error("'{0}' is undefined")]
    Undefined(String),
    #[error("expected argument to be {expected} but got {got}")]
    TypeMismatch { expected: &'static str, got: &'static str },
    #[error("expected {expected} arguments, but got {got}")]
    Arity { expected: u8, got: u8 },
    #[error("index {0} out of bounds")]
    IndexOutOfBounds(i64),
    #[error("key '{0}' not found")]
    KeyError(String),
    #[error("tuple is not the correct size")]
    TupleSize,
    #[error("value is not none")]
    NotNone,
    #[error("assertion failure: argument is false")]
    AssertionFailed,
    #[error("assertion failed")]
    AssertEqualFailed,
    #[error("could not find module '{0}'")]
    ModuleNotFound(String),
    #[error("symbols do not respond to that symbol")]
    NoSuchSymbol,
    #[error("{0}")]
    Message(String),
    #[error("internal error: {0}")]
    Internal(String),
}

/// One frame of a captured stack trace. Defined frames carry the source
/// location looked up in their module's source map; native frames carry
/// none.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorFrame {
    pub native: bool,
    pub location: Option<SourceLocation>,
    pub filename: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Error {
    pub kind: ErrorKind,
    pub frames: Vec<ErrorFrame>,
}

impl Error {
    pub fn new(kind: ErrorKind, frames: Vec<ErrorFrame>) -> Error {
        Error { kind, frames }
    }

    /// Renders `Traceback:\n\t{filename} at {line},{col}\n...\terror: {msg}`,
    /// innermost frame first, footer last.
    pub fn render_trace(&self) -> String {
        let mut out = String::from("Traceback:\n");
        for frame in &self.frames {
            let line = if frame.native {
                "[native code]".to_string()
            } else {
                let filename = frame.filename.as_deref().unwrap_or("[native code]");
                match frame.location {
                    Some(loc) => format!("{} at {}, {}", filename, loc.line, loc.column),
                    None => filename.to_string(),
                }
            };
            out.push('\t');
            out.push_str(&line);
            out.push('\n');
        }
        out.push_str(&format!("\terror: {}", self.kind));
        out
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_trace_has_header_and_footer() {
        let err = Error::new(
            ErrorKind::Undefined("x".into()),
            vec![ErrorFrame { native: false, location: Some(SourceLocation::new(3, 4)), filename: Some("main.blg".into()) }],
        );
        let trace = err.render_trace();
        assert!(trace.starts_with("Traceback:\n"));
        assert!(trace.contains("main.blg at 3, 4"));
        assert!(trace.ends_with("error: 'x' is undefined"));
    }
}
