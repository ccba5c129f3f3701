//! Generative Sandbox
//!
//! Validation and capability-restricted execution of synthesized units.
//!
//! Oracle output goes through the [`Validator`] first; an accepted
//! [`generative_artifact::SynthesizedArtifact`] is then loaded by a
//! [`Sandbox`] and run with the original call's arguments.
//!
//! # Example
//!
//! ```rust
//! use generative_artifact::{CallContext, Origin, Value};
//! use generative_sandbox::{Interpreter, Sandbox, Validator};
//!
//! let raw = "Here you go:\n### BEGIN FUNCTION ###\ndef add(a, b):\n    return sum([a, b])\n### END FUNCTION ###";
//! let artifact = Validator::default().validate(raw, Origin::Oracle).into_result().unwrap();
//!
//! let sandbox = Interpreter::default();
//! let unit = sandbox.compile(artifact.source(), artifact.entry_point(), &[]).unwrap();
//! let value = sandbox.run(&unit, &CallContext::positional([3, 4])).unwrap();
//! assert_eq!(value, Value::Int(7));
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod ast;
mod builtins;
pub mod clean;
pub mod error;
mod interp;
pub mod language;
pub mod lower;
mod ops;
pub mod policy;
pub mod sandbox;
pub mod validator;

pub use clean::{extract_func_name, to_func_name};
pub use error::{
    CompileError, CompileErrorKind, FaultKind, RuntimeFault, SandboxError, ValidationError,
};
pub use language::Language;
pub use policy::CapabilityPolicy;
pub use sandbox::{Interpreter, KillSwitch, LoadedUnit, Sandbox};
pub use validator::{
    BodyStatement, BodySummary, CompletenessDetector, CompletenessPolicy, PassToken,
    PlaceholderBody, ValidationVerdict, Validator,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
