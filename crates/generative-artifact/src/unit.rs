//! Units: the functions targeted for adaptation
//!
//! A [`Unit`] couples a stable identity, the unit-language source text of its
//! intended behavior (when available), its declaring [`Scope`] and the native
//! implementation that runs as the original behavior.

use crate::call::CallContext;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

/// Stable identity of a unit: optional declaring scope plus name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId {
    scope: Option<String>,
    name: String,
}

impl UnitId {
    /// Free-standing unit
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            scope: None,
            name: name.into(),
        }
    }

    /// Unit declared inside a named scope
    #[inline]
    #[must_use]
    pub fn scoped(scope: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            scope: Some(scope.into()),
            name: name.into(),
        }
    }

    /// Unit name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declaring scope name
    #[inline]
    #[must_use]
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }
}

impl Display for UnitId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.scope {
            Some(scope) => write!(f, "{scope}.{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Error raised by an original unit (the analogue of an exception)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct UnitError {
    /// Exception class, e.g. `ValueError`
    pub kind: String,
    /// Human-readable message
    pub message: String,
    /// Call frames, outermost first
    pub frames: Vec<String>,
}

impl UnitError {
    /// Create error with explicit kind
    #[must_use]
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            frames: Vec::new(),
        }
    }

    /// Generic `Exception`
    #[inline]
    #[must_use]
    pub fn exception(message: impl Into<String>) -> Self {
        Self::new("Exception", message)
    }

    /// Record a frame the error passed through
    #[inline]
    #[must_use]
    pub fn with_frame(mut self, frame: impl Into<String>) -> Self {
        self.frames.push(frame.into());
        self
    }

    /// Traceback-style rendering fed to oracles
    #[must_use]
    pub fn traceback(&self) -> String {
        let mut out = String::from("Traceback (most recent call last):\n");
        for frame in &self.frames {
            out.push_str("  in ");
            out.push_str(frame);
            out.push('\n');
        }
        out.push_str(&self.to_string());
        out
    }
}

/// Native implementation of a unit
pub type NativeFn = dyn Fn(&CallContext) -> Result<Value, UnitError> + Send + Sync;

/// Callable declared in a scope, as seen by the context harvester
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Callable name
    pub name: String,
    /// Unit-language source, absent for natively implemented members
    pub source: Option<String>,
}

/// Declaring scope of a unit (the analogue of a class body or module)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    name: String,
    members: Vec<Member>,
}

impl Scope {
    /// Empty scope
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
        }
    }

    /// Add a member with source text
    #[must_use]
    pub fn member(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.members.push(Member {
            name: name.into(),
            source: Some(source.into()),
        });
        self
    }

    /// Add a member whose source is unavailable
    #[must_use]
    pub fn native(mut self, name: impl Into<String>) -> Self {
        self.members.push(Member {
            name: name.into(),
            source: None,
        });
        self
    }

    /// Scope name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Members in declaration order
    #[inline]
    #[must_use]
    pub fn members(&self) -> &[Member] {
        &self.members
    }
}

/// The function or method being adapted
///
/// Immutable once built; shared by the interception layer for the lifetime
/// of the wrapped call site.
#[derive(Clone)]
pub struct Unit {
    id: UnitId,
    source: Option<String>,
    scope: Option<Arc<Scope>>,
    reentrant: bool,
    implementation: Arc<NativeFn>,
}

impl Unit {
    /// Free-standing unit backed by a native implementation
    pub fn new<F>(name: impl Into<String>, implementation: F) -> Self
    where
        F: Fn(&CallContext) -> Result<Value, UnitError> + Send + Sync + 'static,
    {
        Self {
            id: UnitId::new(name),
            source: None,
            scope: None,
            reentrant: false,
            implementation: Arc::new(implementation),
        }
    }

    /// Attach the unit-language source of the intended behavior
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        let source = source.into();
        self.source = if source.trim().is_empty() {
            None
        } else {
            Some(source)
        };
        self
    }

    /// Declare the unit inside a scope
    #[must_use]
    pub fn in_scope(mut self, scope: Arc<Scope>) -> Self {
        self.id = UnitId::scoped(scope.name(), self.id.name.clone());
        self.scope = Some(scope);
        self
    }

    /// Keep the unit's own definition in its harvested context
    #[must_use]
    pub fn reentrant(mut self) -> Self {
        self.reentrant = true;
        self
    }

    /// Unit identity
    #[inline]
    #[must_use]
    pub fn id(&self) -> &UnitId {
        &self.id
    }

    /// Unit name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        self.id.name()
    }

    /// Source text, if available
    #[inline]
    #[must_use]
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Declaring scope
    #[inline]
    #[must_use]
    pub fn scope(&self) -> Option<&Scope> {
        self.scope.as_deref()
    }

    /// Whether the unit may reference itself through its context
    #[inline]
    #[must_use]
    pub fn is_reentrant(&self) -> bool {
        self.reentrant
    }

    /// Run the original behavior
    ///
    /// # Errors
    /// Returns whatever the native implementation raises, with the unit's
    /// name recorded as a frame.
    pub fn invoke(&self, call: &CallContext) -> Result<Value, UnitError> {
        (self.implementation)(call).map_err(|e| e.with_frame(self.id.to_string()))
    }
}

impl fmt::Debug for Unit {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unit")
            .field("id", &self.id)
            .field("has_source", &self.source.is_some())
            .field("scope", &self.scope.as_ref().map(|s| s.name().to_string()))
            .field("reentrant", &self.reentrant)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn multiply() -> Unit {
        Unit::new("multiply", |call| {
            let a = call.get(0).and_then(Value::as_int).unwrap_or_default();
            let b = call.get(1).and_then(Value::as_int).unwrap_or_default();
            Ok(Value::Int(a * b))
        })
    }

    #[test]
    fn invoke_runs_native_implementation() {
        let unit = multiply();
        let result = unit.invoke(&CallContext::positional([3, 4])).unwrap();
        assert_eq!(result, Value::Int(12));
    }

    #[test]
    fn invoke_records_frame_on_error() {
        let unit = Unit::new("boom", |_| Err(UnitError::exception("boom")));
        let err = unit.invoke(&CallContext::new()).unwrap_err();
        assert_eq!(err.frames, vec!["boom".to_string()]);
        assert!(err.traceback().ends_with("Exception: boom"));
    }

    #[test]
    fn scope_qualifies_identity() {
        let scope = Arc::new(Scope::new("Mobile").member("phone", "def phone():\n    return 1\n"));
        let unit = multiply().in_scope(scope);
        assert_eq!(unit.id().to_string(), "Mobile.multiply");
        assert_eq!(unit.scope().map(|s| s.members().len()), Some(1));
    }

    #[test]
    fn blank_source_counts_as_missing() {
        let unit = multiply().with_source("   \n");
        assert!(unit.source().is_none());
    }
}
