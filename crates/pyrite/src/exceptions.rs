//! Internal exception types and the control-flow error channel.
//!
//! Script-level exceptions travel through the evaluator as `RunError::Raise`;
//! the remaining variants are non-local control signals that user code can
//! never catch (timeouts, suspension, generator teardown).

use std::{fmt, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::value::Value;

/// Result type alias for operations that can produce a runtime error.
pub(crate) type RunResult<T> = Result<T, RunError>;

/// Built-in exception types supported by the interpreter.
///
/// Uses strum derives for automatic `Display`, `FromStr`, and `Into<&'static str>`
/// implementations. The string representation matches the variant name exactly
/// (e.g., `ValueError` -> "ValueError").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
pub enum ExcType {
    /// Root of the catchable hierarchy - matches any raised exception.
    Exception,

    TypeError,
    ValueError,
    /// Base class of [`Self::UnboundLocalError`].
    NameError,
    /// Subclass of NameError - local variable read before assignment.
    UnboundLocalError,
    AttributeError,
    IndexError,
    KeyError,
    ZeroDivisionError,
    RuntimeError,
    /// Subclass of RuntimeError - deliberately unsupported language features.
    NotImplementedError,
    /// Subclass of RuntimeError - call stack depth exceeded.
    RecursionError,
    StopIteration,
    OverflowError,
    AssertionError,
    /// Base class of [`Self::ModuleNotFoundError`].
    ImportError,
    ModuleNotFoundError,
    /// Base class of [`Self::FileNotFoundError`]. Displayed as `IOError`.
    IOError,
    FileNotFoundError,
    /// Base class of [`Self::IndentationError`]. Raised by the parser only.
    SyntaxError,
    IndentationError,
    /// Raised into a generator body when its consumer goes away.
    GeneratorExit,
}

impl ExcType {
    /// Checks if this exception type is a subclass of another exception type.
    ///
    /// Implements the catch hierarchy for try/except matching: `Exception`
    /// catches every type except `GeneratorExit`, the intermediate bases
    /// catch their listed subclasses, and everything else matches exactly.
    ///
    /// Returns true if `self` would be caught by `except handler_type:`.
    #[must_use]
    pub fn is_subclass_of(self, handler_type: Self) -> bool {
        if self == handler_type {
            return true;
        }
        match handler_type {
            Self::Exception => !matches!(self, Self::GeneratorExit),
            Self::NameError => matches!(self, Self::UnboundLocalError),
            Self::RuntimeError => matches!(self, Self::NotImplementedError | Self::RecursionError),
            Self::ImportError => matches!(self, Self::ModuleNotFoundError),
            Self::IOError => matches!(self, Self::FileNotFoundError),
            Self::SyntaxError => matches!(self, Self::IndentationError),
            _ => false,
        }
    }

    /// All variants, in hierarchy-stable order. Used to prebuild the class table.
    pub(crate) const ALL: &'static [Self] = &[
        Self::Exception,
        Self::TypeError,
        Self::ValueError,
        Self::NameError,
        Self::UnboundLocalError,
        Self::AttributeError,
        Self::IndexError,
        Self::KeyError,
        Self::ZeroDivisionError,
        Self::RuntimeError,
        Self::NotImplementedError,
        Self::RecursionError,
        Self::StopIteration,
        Self::OverflowError,
        Self::AssertionError,
        Self::ImportError,
        Self::ModuleNotFoundError,
        Self::IOError,
        Self::FileNotFoundError,
        Self::SyntaxError,
        Self::IndentationError,
        Self::GeneratorExit,
    ];

    /// The direct base used when building the prebuilt class objects.
    pub(crate) fn base(self) -> Option<Self> {
        match self {
            Self::Exception => None,
            Self::UnboundLocalError => Some(Self::NameError),
            Self::NotImplementedError | Self::RecursionError => Some(Self::RuntimeError),
            Self::ModuleNotFoundError => Some(Self::ImportError),
            Self::FileNotFoundError => Some(Self::IOError),
            Self::IndentationError => Some(Self::SyntaxError),
            _ => Some(Self::Exception),
        }
    }
}

/// A raised script-level exception in flight.
///
/// Carries the exception instance (always a `Value::Instance` whose class sits
/// in an exception hierarchy) plus the source line of the raise site for error
/// reporting. The line is filled in by the statement loop the first time the
/// error crosses a statement boundary.
#[derive(Debug, Clone)]
pub(crate) struct Raised {
    /// The exception instance being propagated.
    pub value: Value,
    /// Name of the exception class, e.g. `"ValueError"`.
    pub type_name: String,
    /// Rendered message (comma-joined args).
    pub message: String,
    /// Source line of the raise site, when known.
    pub line: Option<u32>,
}

impl Raised {
    pub(crate) fn with_line(mut self, line: u32) -> Self {
        if self.line.is_none() {
            self.line = Some(line);
        }
        self
    }
}

impl fmt::Display for Raised {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.type_name)?;
        } else {
            write!(f, "{}: {}", self.type_name, self.message)?;
        }
        if let Some(line) = self.line {
            write!(f, " on line {line}")?;
        }
        Ok(())
    }
}

/// Non-returning control flow for the evaluator.
///
/// Only `Raise` is visible to script-level `try`/`except`; every other variant
/// unwinds straight through handlers (running `finally` bodies on the way out).
#[derive(Debug, Clone)]
pub(crate) enum RunError {
    /// A script-level exception; catchable.
    Raise(Box<Raised>),
    /// Wall-clock budget exhausted. Never catchable.
    Timeout {
        limit: Duration,
        elapsed: Duration,
    },
    /// The script called `suspend()` in live mode.
    Suspend,
    /// The consumer of a generator went away; unwinds the producer thread,
    /// running `finally`/`__exit__` cleanup on the way out.
    GeneratorClosed,
    /// Replay-mode event mismatch between the log and re-execution.
    ReplayDivergence(Arc<str>),
}

impl RunError {
    /// Builds a catchable exception of the given type with a message.
    ///
    /// The instance value is created lazily by the evaluator when the error is
    /// caught or surfaced; until then the type/message pair is authoritative.
    pub(crate) fn raise(exc_type: ExcType, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::Raise(Box::new(Raised {
            value: Value::None,
            type_name: exc_type.to_string(),
            message,
            line: None,
        }))
    }

    pub(crate) fn type_error(message: impl Into<String>) -> Self {
        Self::raise(ExcType::TypeError, message)
    }

    pub(crate) fn value_error(message: impl Into<String>) -> Self {
        Self::raise(ExcType::ValueError, message)
    }

    pub(crate) fn name_error(name: &str) -> Self {
        Self::raise(ExcType::NameError, format!("name '{name}' is not defined"))
    }

    pub(crate) fn runtime_error(message: impl Into<String>) -> Self {
        Self::raise(ExcType::RuntimeError, message)
    }

    pub(crate) fn not_implemented(feature: &str) -> Self {
        Self::raise(
            ExcType::NotImplementedError,
            format!("{feature} is not supported by this interpreter"),
        )
    }

    pub(crate) fn stop_iteration() -> Self {
        Self::raise(ExcType::StopIteration, "")
    }

    /// True when the error is a raised `StopIteration` (iterator exhaustion).
    pub(crate) fn is_stop_iteration(&self) -> bool {
        matches!(self, Self::Raise(r) if r.type_name == "StopIteration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subclass_matching() {
        assert!(ExcType::ValueError.is_subclass_of(ExcType::Exception));
        assert!(ExcType::UnboundLocalError.is_subclass_of(ExcType::NameError));
        assert!(ExcType::ModuleNotFoundError.is_subclass_of(ExcType::ImportError));
        assert!(ExcType::FileNotFoundError.is_subclass_of(ExcType::IOError));
        assert!(ExcType::IndentationError.is_subclass_of(ExcType::SyntaxError));
        assert!(ExcType::NotImplementedError.is_subclass_of(ExcType::RuntimeError));
        assert!(!ExcType::ValueError.is_subclass_of(ExcType::TypeError));
        assert!(!ExcType::GeneratorExit.is_subclass_of(ExcType::Exception));
    }

    #[test]
    fn display_names() {
        assert_eq!(ExcType::ValueError.to_string(), "ValueError");
        assert_eq!(ExcType::ZeroDivisionError.to_string(), "ZeroDivisionError");
        let parsed: ExcType = "KeyError".parse().unwrap();
        assert_eq!(parsed, ExcType::KeyError);
    }
}
