//! Host-facing error records.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    exceptions::{ExcType, RunError},
    parse::ParseError,
};

/// Coarse error classification for hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// An uncaught script-level exception.
    Python,
    /// Lexer/parser failure.
    Syntax,
    /// Unresolvable import.
    Import,
    /// Filesystem failure.
    Io,
    /// Wall-clock budget exhausted.
    Timeout,
    /// The dispatcher found no matching route.
    RouteNotFound,
}

/// A structured error surfaced by the public API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    /// Exception class name, when the error originated as one.
    pub exception_type: Option<String>,
    pub message: String,
    /// Source line, when known.
    pub line: Option<u32>,
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(exc_type) = &self.exception_type {
            write!(f, "{exc_type}: {}", self.message)?;
        } else {
            write!(f, "{}", self.message)?;
        }
        if let Some(line) = self.line {
            write!(f, " on line {line}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorRecord {}

impl ErrorRecord {
    pub(crate) fn route_not_found(method: &str, path: &str) -> Self {
        Self {
            kind: ErrorKind::RouteNotFound,
            exception_type: None,
            message: format!("no route matches {method} {path}"),
            line: None,
        }
    }
}

impl From<ParseError> for ErrorRecord {
    fn from(err: ParseError) -> Self {
        Self {
            kind: ErrorKind::Syntax,
            exception_type: Some(
                if err.indentation {
                    ExcType::IndentationError
                } else {
                    ExcType::SyntaxError
                }
                .to_string(),
            ),
            message: err.message,
            line: Some(err.line),
        }
    }
}

impl From<RunError> for ErrorRecord {
    fn from(err: RunError) -> Self {
        match err {
            RunError::Raise(raised) => {
                let kind = match raised.type_name.parse::<ExcType>() {
                    Ok(ExcType::ImportError | ExcType::ModuleNotFoundError) => ErrorKind::Import,
                    Ok(ExcType::IOError | ExcType::FileNotFoundError) => ErrorKind::Io,
                    Ok(ExcType::SyntaxError | ExcType::IndentationError) => ErrorKind::Syntax,
                    _ => ErrorKind::Python,
                };
                Self {
                    kind,
                    exception_type: Some(raised.type_name.clone()),
                    message: raised.message.clone(),
                    line: raised.line,
                }
            }
            RunError::Timeout { limit, elapsed } => Self {
                kind: ErrorKind::Timeout,
                exception_type: None,
                message: format!("evaluation exceeded the time budget: {elapsed:?} > {limit:?}"),
                line: None,
            },
            RunError::Suspend => Self {
                kind: ErrorKind::Python,
                exception_type: Some("RuntimeError".to_owned()),
                message: "suspend() escaped the evaluator".to_owned(),
                line: None,
            },
            RunError::GeneratorClosed => Self {
                kind: ErrorKind::Python,
                exception_type: Some("RuntimeError".to_owned()),
                message: "generator consumer went away".to_owned(),
                line: None,
            },
            RunError::ReplayDivergence(message) => Self {
                kind: ErrorKind::Python,
                exception_type: Some("RuntimeError".to_owned()),
                message: message.to_string(),
                line: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_format() {
        let record = ErrorRecord {
            kind: ErrorKind::Python,
            exception_type: Some("NameError".to_owned()),
            message: "name 'x' is not defined".to_owned(),
            line: Some(3),
        };
        assert_eq!(record.to_string(), "NameError: name 'x' is not defined on line 3");
    }
}
