//! Generative Core - interception and synthesis
//!
//! Wraps units so their calls can be served by oracle-generated code:
//! - [`Adapted`]: prefer supplied, cached or synthesized code, fall back to
//!   the original
//! - [`Guarded`]: run the original, synthesize a repair only when it fails
//! - [`Generative`]: materialize missing attributes of a [`Resolve`] type
//! - [`TypeRegistry`]: attach validated methods to named types
//! - [`Explaining`]: attach an oracle explanation to the original's errors
//!
//! Every synthesized candidate passes the validator, the optional critic and
//! the capability-restricted sandbox before its value is returned.
//!
//! # Example
//!
//! ```rust
//! use generative_artifact::{CallContext, Unit, Value};
//! use generative_core::{Adapted, Engine, FnOracle, Route};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let oracle = FnOracle::new("fixed", |_prompt| {
//!     Ok("### BEGIN FUNCTION ###\ndef add(a, b):\n    return sum([a, b])\n### END FUNCTION ###".to_string())
//! });
//! let engine = Arc::new(Engine::default().with_oracle(Arc::new(oracle)));
//!
//! let add = Unit::new("add", |_| Ok(Value::None)).with_source("def add(a, b):\n    pass\n");
//! let dispatch = Adapted::new(add, engine)
//!     .call(CallContext::positional([3, 4]))
//!     .await
//!     .unwrap();
//!
//! assert_eq!(dispatch.value, Value::Int(7));
//! assert_eq!(dispatch.route, Route::Synthesized);
//! # });
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod attribute;
pub mod cache;
pub mod config;
pub mod critic;
pub mod error;
pub mod explain;
pub mod harvest;
pub mod intercept;
pub mod oracle;
pub mod pipeline;
pub mod prompt;
pub mod registry;
pub mod state_machine;
pub mod telemetry;

pub use attribute::{Generative, Resolve};
pub use cache::{CacheStats, CodeCache, MemoryCache};
pub use config::EngineConfig;
pub use critic::{decode_verdict, Critic, OracleCritic};
pub use error::{
    AdaptError, CacheError, ConfigError, DecodeError, ExplainError, NotFound, OracleError,
    RegistryError, StateMachineError, SynthesisError,
};
pub use explain::{explain_all, Explaining};
pub use harvest::harvest;
pub use intercept::{Adapted, Dispatch, Guarded, Route};
pub use oracle::{FnOracle, Oracle};
pub use pipeline::Engine;
pub use prompt::{GenerationRequest, GenerationShape};
pub use registry::{Augmented, TypeRegistry};
pub use state_machine::{Stage, Trace};
pub use telemetry::init_tracing;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with Generative Core
    pub use crate::{
        Adapted, AdaptError, Critic, Dispatch, Engine, EngineConfig, Generative, Guarded,
        MemoryCache, NotFound, Oracle, Resolve, Route, TypeRegistry,
    };
    pub use generative_artifact::{CallContext, Scope, Unit, UnitError, Value};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
