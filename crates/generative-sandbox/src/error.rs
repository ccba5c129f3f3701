//! Error types for validation, compilation and sandboxed execution

use std::fmt::{self, Display, Formatter};

/// Why a candidate was refused before anything ran
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Parse failure, or no function definition at all
    #[error("syntax invalid: {0}")]
    SyntaxInvalid(String),

    /// Body contains only placeholders
    #[error("incomplete candidate: {0}")]
    Incomplete(String),

    /// Not exactly one plain top-level function
    #[error("shape invalid: {0}")]
    ShapeInvalid(String),
}

impl ValidationError {
    /// Short label of the failed stage
    #[must_use]
    pub fn stage(&self) -> &'static str {
        match self {
            Self::SyntaxInvalid(_) => "syntax",
            Self::Incomplete(_) => "completeness",
            Self::ShapeInvalid(_) => "shape",
        }
    }
}

/// Category of a compile failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompileErrorKind {
    /// Source does not parse
    Parse,
    /// Construct outside the supported language subset
    Unsupported,
    /// Construct excluded by the capability policy
    Forbidden,
    /// Entry point not defined by the source
    MissingEntryPoint,
}

impl Display for CompileErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Parse => "parse error",
            Self::Unsupported => "unsupported construct",
            Self::Forbidden => "forbidden capability",
            Self::MissingEntryPoint => "missing entry point",
        };
        f.write_str(label)
    }
}

/// Source could not be loaded into the sandbox
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} at line {line}: {message}")]
pub struct CompileError {
    /// Which loading stage failed
    pub kind: CompileErrorKind,
    /// Human-readable detail
    pub message: String,
    /// 1-based source line
    pub line: usize,
}

impl CompileError {
    /// Compile error of `kind` at `line`
    pub fn new(kind: CompileErrorKind, line: usize, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            line,
        }
    }

    /// The source does not parse
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::new(CompileErrorKind::Parse, line, message)
    }

    /// Valid syntax the interpreter does not run
    pub fn unsupported(line: usize, message: impl Into<String>) -> Self {
        Self::new(CompileErrorKind::Unsupported, line, message)
    }

    /// Construct the capability policy refuses
    pub fn forbidden(line: usize, message: impl Into<String>) -> Self {
        Self::new(CompileErrorKind::Forbidden, line, message)
    }

    /// `entry` is not defined by the source
    pub fn missing_entry_point(entry: &str) -> Self {
        Self::new(
            CompileErrorKind::MissingEntryPoint,
            0,
            format!("function '{entry}' is not defined"),
        )
    }
}

/// Category of a runtime fault
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FaultKind {
    /// Exception raised by the unit, named by its class (`ValueError`)
    Raised(String),
    /// Step budget exhausted
    StepLimit,
    /// Call nesting exceeded the policy limit
    DepthLimit,
    /// A value grew past the policy size limit
    SizeLimit,
    /// Wall-clock budget exhausted
    Timeout,
    /// Aborted through `Sandbox::kill`
    Killed,
}

impl FaultKind {
    /// Exception-class style name of the fault
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Raised(name) => name,
            Self::StepLimit => "StepLimitExceeded",
            Self::DepthLimit => "RecursionError",
            Self::SizeLimit => "MemoryError",
            Self::Timeout => "TimeoutError",
            Self::Killed => "Killed",
        }
    }

    /// Whether the fault was imposed by the sandbox rather than raised by the unit
    #[must_use]
    pub fn is_resource_limit(&self) -> bool {
        !matches!(self, Self::Raised(_))
    }
}

/// Fault raised while a loaded unit was running
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub struct RuntimeFault {
    /// Exception class or exhausted limit
    pub kind: FaultKind,
    /// Exception message as the unit would print it
    pub message: String,
    /// 1-based line of the statement that faulted, when known
    pub line: Option<usize>,
}

impl RuntimeFault {
    /// Fault of `kind` with no line attached
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            line: None,
        }
    }

    /// Exception of the given class
    pub fn raised(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(FaultKind::Raised(class.into()), message)
    }

    /// `TypeError`
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::raised("TypeError", message)
    }

    /// `ValueError`
    pub fn value_error(message: impl Into<String>) -> Self {
        Self::raised("ValueError", message)
    }

    /// `NameError` for an unbound `name`
    pub fn name_error(name: &str) -> Self {
        Self::raised("NameError", format!("name '{name}' is not defined"))
    }

    /// `IndexError`
    pub fn index_error(message: impl Into<String>) -> Self {
        Self::raised("IndexError", message)
    }

    /// `KeyError` for a missing `key`
    pub fn key_error(key: &generative_artifact::Value) -> Self {
        Self::raised("KeyError", key.repr())
    }

    /// `ZeroDivisionError`
    pub fn zero_division(message: impl Into<String>) -> Self {
        Self::raised("ZeroDivisionError", message)
    }

    /// `OverflowError` for results outside i64
    pub fn overflow() -> Self {
        Self::raised("OverflowError", "integer overflow")
    }

    /// `AttributeError` for `type_name.attr`
    pub fn attribute_error(type_name: &str, attr: &str) -> Self {
        Self::raised(
            "AttributeError",
            format!("'{type_name}' object has no attribute '{attr}'"),
        )
    }

    /// Attach the faulting line unless one is already recorded
    #[must_use]
    pub fn at_line(mut self, line: usize) -> Self {
        if self.line.is_none() {
            self.line = Some(line);
        }
        self
    }
}

impl Display for RuntimeFault {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.name(), self.message)?;
        if let Some(line) = self.line {
            write!(f, " (line {line})")?;
        }
        Ok(())
    }
}

/// Any failure surfaced by a sandbox
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SandboxError {
    #[error("sandbox compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("sandbox runtime error: {0}")]
    Runtime(#[from] RuntimeFault),
}

impl SandboxError {
    /// Compile errors never ran any code
    #[inline]
    #[must_use]
    pub fn is_compile(&self) -> bool {
        matches!(self, Self::Compile(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_fault_display_includes_line() {
        let fault = RuntimeFault::zero_division("division by zero").at_line(3).at_line(9);
        assert_eq!(fault.to_string(), "ZeroDivisionError: division by zero (line 3)");
    }

    #[test]
    fn resource_limits_are_classified() {
        assert!(FaultKind::Timeout.is_resource_limit());
        assert!(FaultKind::Killed.is_resource_limit());
        assert!(!FaultKind::Raised("ValueError".into()).is_resource_limit());
    }

    #[test]
    fn compile_error_display() {
        let err = CompileError::forbidden(2, "import of 'os' is not allowed");
        assert_eq!(
            err.to_string(),
            "forbidden capability at line 2: import of 'os' is not allowed"
        );
        assert!(SandboxError::from(err).is_compile());
    }
}
