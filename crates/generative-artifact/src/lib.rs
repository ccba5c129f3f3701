//! Generative Artifact Model
//!
//! Data model shared by every layer of the synthesis engine.
//!
//! # Core Concepts
//!
//! - [`Unit`]: the function being adapted, with its source and native body
//! - [`CallContext`]: positional and keyword arguments of one invocation
//! - [`Value`]: dynamic values flowing through original and synthesized code
//! - [`Fingerprint`]: Blake3 cache key over unit identity and arguments
//! - [`SynthesizedArtifact`]: validated source plus its entry point
//!
//! # Example
//!
//! ```rust
//! use generative_artifact::{CallContext, Fingerprint, Unit, Value};
//!
//! let add = Unit::new("add", |call| {
//!     let a = call.get(0).and_then(Value::as_int).unwrap_or_default();
//!     let b = call.get(1).and_then(Value::as_int).unwrap_or_default();
//!     Ok(Value::Int(a + b))
//! })
//! .with_source("def add(a, b):\n    return a + b\n");
//!
//! let call = CallContext::positional([3, 4]);
//! assert_eq!(add.invoke(&call).unwrap(), Value::Int(7));
//! let key = Fingerprint::compute(add.id(), &call).unwrap();
//! assert_eq!(key.as_key().len(), 64);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod artifact;
mod call;
mod hash;
mod unit;
mod value;

pub use artifact::{CacheEntry, Origin, SynthesizedArtifact};
pub use call::CallContext;
pub use hash::{ContentHash, Fingerprint, HashError};
pub use unit::{Member, NativeFn, Scope, Unit, UnitError, UnitId};
pub use value::{Callable, Value};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
