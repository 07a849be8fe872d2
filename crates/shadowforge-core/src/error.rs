//! The error taxonomy shared by every shadowforge crate.

use thiserror::Error;

/// A lexical position in ST source, used by `LexError` and `ParseError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourcePos {
    pub line: u32,
    pub column: u32,
}

impl std::fmt::Display for SourcePos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// The ten error kinds named in the error-handling design: compile-time,
/// runtime, and outcome errors all converge on this enum so callers across
/// crates propagate a single `Result` type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("lex error at {pos}: unexpected character {got:?}")]
    LexError { pos: SourcePos, got: char },

    #[error("parse error at {pos}: got {got}, expected {expected}")]
    ParseError {
        pos: SourcePos,
        got: String,
        expected: String,
    },

    #[error("runtime error: {0}")]
    RuntimeError(String),

    /// Advisory rather than fatal: logged, never propagated to a caller as
    /// a failure outcome (§9: "Watchdog policy is advisory-only here").
    #[error("watchdog timeout: cycle exceeded {limit_ms}ms")]
    WatchdogTimeout { limit_ms: u64 },

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("not found: {0}")]
    NotFoundError(String),

    #[error("conflict: {0}")]
    ConflictError(String),

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("integrity error: {0}")]
    IntegrityError(String),

    #[error("io error: {0}")]
    IOError(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::IOError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
