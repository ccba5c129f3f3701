//! Error types for Generative Core
//!
//! Failures are split by how far they travel:
//! - oracle, validation, critique and compile failures are recovered inside
//!   the engine (fallback or original error)
//! - runtime faults of loaded synthesized code propagate from `adapt`
//! - cache store failures ride alongside a successful value

use crate::state_machine::Stage;
use generative_artifact::{HashError, UnitError};
use generative_sandbox::{CompileError, RuntimeFault, SandboxError, ValidationError};
use std::time::Duration;

/// Oracle (and critic) transport failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    /// Backend could not be reached or answered with an error
    #[error("oracle transport failed: {0}")]
    Transport(String),

    /// Caller-side timeout elapsed
    #[error("oracle timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Backend answered with nothing
    #[error("oracle returned an empty response")]
    Empty,
}

impl OracleError {
    /// Create transport error
    #[inline]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Check if a retry might succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout(_))
    }
}

/// Cache backend failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// Fingerprint could not be derived from the call
    #[error("fingerprint failed: {0}")]
    Fingerprint(String),

    /// Backend refused or lost the write
    #[error("cache backend failed: {0}")]
    Backend(String),
}

impl CacheError {
    /// Create backend error
    #[inline]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}

impl From<HashError> for CacheError {
    fn from(e: HashError) -> Self {
        Self::Fingerprint(e.to_string())
    }
}

/// Critic output held no boolean verdict
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no true/false verdict in critic output: {0:?}")]
pub struct DecodeError(pub String);

/// Why a synthesis attempt produced no usable replacement
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SynthesisError {
    /// No oracle configured, or the oracle failed
    #[error("oracle failure: {0}")]
    OracleFailure(#[from] OracleError),

    /// Nothing to synthesize from
    #[error("no oracle configured")]
    NoOracle,

    /// Unit has no source to repair
    #[error("unit '{0}' has no source")]
    NoSource(String),

    /// Candidate refused by the validator
    #[error("synthesis invalid: {0}")]
    SynthesisInvalid(#[from] ValidationError),

    /// Critic rejected the candidate or could not be decoded
    #[error("critique rejected candidate: {0}")]
    CritiqueRejected(String),

    /// Sandbox refused to load the candidate
    #[error("sandbox compile error: {0}")]
    SandboxCompile(#[from] CompileError),

    /// Loaded candidate failed while running
    #[error("sandbox runtime error: {0}")]
    SandboxRuntime(#[from] RuntimeFault),

    /// Dispatch attempted an illegal stage move
    #[error(transparent)]
    StateMachine(#[from] StateMachineError),
}

impl SynthesisError {
    /// Recovered inside the engine rather than surfaced to the caller
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::SandboxRuntime(_))
    }
}

impl From<SandboxError> for SynthesisError {
    fn from(e: SandboxError) -> Self {
        match e {
            SandboxError::Compile(e) => Self::SandboxCompile(e),
            SandboxError::Runtime(e) => Self::SandboxRuntime(e),
        }
    }
}

/// Error surfaced by an adapted unit
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AdaptError {
    /// The original unit raised (after fallback)
    #[error(transparent)]
    Original(#[from] UnitError),

    /// Synthesized code loaded and then faulted
    #[error("synthesized code failed: {0}")]
    Runtime(RuntimeFault),
}

impl AdaptError {
    /// Whether the error came from the original unit
    #[inline]
    #[must_use]
    pub fn is_original(&self) -> bool {
        matches!(self, Self::Original(_))
    }
}

/// Attribute lookup failed and could not be materialized
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{owner}' has no attribute '{name}'")]
pub struct NotFound {
    /// Type or instance the lookup ran against
    pub owner: String,
    /// Requested attribute
    pub name: String,
}

impl NotFound {
    /// `name` is missing on `owner`
    #[inline]
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

/// Error from the explain-on-exception wrapper
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExplainError {
    /// Original error, no explanation available
    #[error(transparent)]
    Original(UnitError),

    /// Original error plus the oracle's summary
    #[error("{original}\n\n{summary}")]
    Explained {
        original: UnitError,
        summary: String,
    },
}

impl ExplainError {
    /// The error the original unit raised
    #[must_use]
    pub fn original(&self) -> &UnitError {
        match self {
            Self::Original(e) | Self::Explained { original: e, .. } => e,
        }
    }

    /// The oracle's explanation, when there is one
    #[must_use]
    pub fn summary(&self) -> Option<&str> {
        match self {
            Self::Original(_) => None,
            Self::Explained { summary, .. } => Some(summary),
        }
    }
}

/// Type registry failures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown type: {0}")]
    UnknownType(String),

    #[error("type '{type_name}' has no method '{method}'")]
    UnknownMethod { type_name: String, method: String },

    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}

/// Illegal move in the per-call state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StateMachineError {
    /// Transition not in the relation
    #[error("invalid transition: {from:?} -> {to:?}")]
    InvalidTransition { from: Stage, to: Stage },

    /// State entered a second time within one call
    #[error("state {0:?} already visited")]
    Revisited(Stage),
}

/// Configuration loading failures
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
