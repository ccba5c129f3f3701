//! Capability policy for loaded units
//!
//! A [`CapabilityPolicy`] decides what a synthesized unit may reference and
//! how much work a single run may do. Lowering consults the allow-lists; the
//! interpreter enforces the step, depth, size and wall-clock limits.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Builtins a unit may call unless the policy says otherwise
pub const DEFAULT_BUILTINS: &[&str] = &[
    "abs", "all", "any", "bool", "dict", "enumerate", "float", "int", "len", "list", "max", "min",
    "range", "reversed", "round", "sorted", "str", "sum", "tuple", "zip",
];

/// Modules a unit may import unless the policy says otherwise
pub const DEFAULT_MODULES: &[&str] = &["math"];

/// Names that are never reachable from a unit, whatever the allow-lists say
pub const DENIED_NAMES: &[&str] = &[
    "__import__",
    "breakpoint",
    "compile",
    "delattr",
    "eval",
    "exec",
    "exit",
    "getattr",
    "globals",
    "input",
    "locals",
    "open",
    "print",
    "quit",
    "setattr",
    "vars",
];

/// Restrictions applied to every compile and run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityPolicy {
    /// Builtin functions reachable by name
    pub allowed_builtins: BTreeSet<String>,
    /// Modules reachable through `import`
    pub allowed_modules: BTreeSet<String>,
    /// Interpreter steps per run before the run is aborted
    pub max_steps: u64,
    /// Maximum nesting of unit-level calls
    pub max_call_depth: usize,
    /// Largest list, tuple, dict or string a run may build
    pub max_sequence_len: usize,
    /// Wall-clock budget per run
    #[serde(with = "duration_millis")]
    pub wall_clock: Duration,
}

impl Default for CapabilityPolicy {
    fn default() -> Self {
        Self {
            allowed_builtins: DEFAULT_BUILTINS.iter().map(|s| (*s).to_string()).collect(),
            allowed_modules: DEFAULT_MODULES.iter().map(|s| (*s).to_string()).collect(),
            max_steps: 1_000_000,
            max_call_depth: 64,
            max_sequence_len: 1_000_000,
            wall_clock: Duration::from_secs(5),
        }
    }
}

impl CapabilityPolicy {
    /// Policy with the default allow-lists and limits
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the step budget
    #[must_use]
    pub fn with_max_steps(mut self, steps: u64) -> Self {
        self.max_steps = steps;
        self
    }

    /// Replace the call-depth limit
    #[must_use]
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    /// Replace the sequence size limit
    #[must_use]
    pub fn with_max_sequence_len(mut self, len: usize) -> Self {
        self.max_sequence_len = len;
        self
    }

    /// Replace the wall-clock limit
    #[must_use]
    pub fn with_wall_clock(mut self, limit: Duration) -> Self {
        self.wall_clock = limit;
        self
    }

    /// Allow an additional builtin
    #[must_use]
    pub fn allow_builtin(mut self, name: impl Into<String>) -> Self {
        self.allowed_builtins.insert(name.into());
        self
    }

    /// Remove a builtin from the allow-list
    #[must_use]
    pub fn deny_builtin(mut self, name: &str) -> Self {
        self.allowed_builtins.remove(name);
        self
    }

    /// Allow an additional module
    #[must_use]
    pub fn allow_module(mut self, name: impl Into<String>) -> Self {
        self.allowed_modules.insert(name.into());
        self
    }

    /// Whether `name` resolves to a builtin under this policy
    #[inline]
    #[must_use]
    pub fn builtin_allowed(&self, name: &str) -> bool {
        !is_denied(name) && self.allowed_builtins.contains(name)
    }

    /// Whether `module` may be imported under this policy
    #[inline]
    #[must_use]
    pub fn module_allowed(&self, module: &str) -> bool {
        self.allowed_modules.contains(module)
    }
}

/// Whether `name` is on the fixed deny-list
#[inline]
#[must_use]
pub fn is_denied(name: &str) -> bool {
    DENIED_NAMES.contains(&name)
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
