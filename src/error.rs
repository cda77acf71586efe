use std::fmt;

use crate::{
    compiler::ExecutionError, parser::CompilationError, query::ValidationError, schema::SchemaConflictError,
};

/// Any failure surfaced by a container operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The query is malformed
    Validation(ValidationError),

    /// Rows disagree on the type of a column
    SchemaConflict(SchemaConflictError),

    /// An expression is malformed
    Compilation(CompilationError),

    /// An expression failed on a row
    Execution(ExecutionError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Validation(e) => write!(f, "{}", e),
            Error::SchemaConflict(e) => write!(f, "{}", e),
            Error::Compilation(e) => write!(f, "{}", e),
            Error::Execution(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Validation(e) => Some(e),
            Error::SchemaConflict(e) => Some(e),
            Error::Compilation(e) => Some(e),
            Error::Execution(e) => Some(e),
        }
    }
}

impl From<ValidationError> for Error {
    fn from(e: ValidationError) -> Self {
        Error::Validation(e)
    }
}

impl From<SchemaConflictError> for Error {
    fn from(e: SchemaConflictError) -> Self {
        Error::SchemaConflict(e)
    }
}

impl From<CompilationError> for Error {
    fn from(e: CompilationError) -> Self {
        Error::Compilation(e)
    }
}

impl From<ExecutionError> for Error {
    fn from(e: ExecutionError) -> Self {
        Error::Execution(e)
    }
}
