//! Call context for one invocation of an adapted unit

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

/// Positional and keyword arguments of one invocation
///
/// Exists only for the duration of one dispatch. It feeds the fingerprint and
/// is handed unchanged to whichever implementation finally runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallContext {
    args: Vec<Value>,
    kwargs: BTreeMap<String, Value>,
}

impl CallContext {
    /// Empty call (no arguments)
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Call with positional arguments only
    #[must_use]
    pub fn positional<I, V>(args: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            kwargs: BTreeMap::new(),
        }
    }

    /// Call with keyword arguments only
    #[must_use]
    pub fn keywords<I, K, V>(kwargs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self {
            args: Vec::new(),
            kwargs: kwargs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Append a positional argument
    #[inline]
    #[must_use]
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Set a keyword argument
    #[inline]
    #[must_use]
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(name.into(), value.into());
        self
    }

    /// Positional arguments
    #[inline]
    #[must_use]
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Keyword arguments, ordered by name
    #[inline]
    #[must_use]
    pub fn kwargs(&self) -> &BTreeMap<String, Value> {
        &self.kwargs
    }

    /// Positional argument by index
    #[inline]
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    /// Keyword argument by name
    #[inline]
    #[must_use]
    pub fn get_kwarg(&self, name: &str) -> Option<&Value> {
        self.kwargs.get(name)
    }

    /// Whether no arguments were supplied
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.args.is_empty() && self.kwargs.is_empty()
    }

    /// Keyword arguments rendered as a dict literal (`{'modes': 'study'}`)
    #[must_use]
    pub fn kwargs_repr(&self) -> String {
        let dict = Value::Dict(
            self.kwargs
                .iter()
                .map(|(k, v)| (Value::Str(k.clone()), v.clone()))
                .collect(),
        );
        dict.repr()
    }
}

impl Display for CallContext {
    /// Renders as an argument list: `(3, 4, mode='fast')`
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        let mut first = true;
        for arg in &self.args {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            f.write_str(&arg.repr())?;
        }
        for (name, value) in &self.kwargs {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "{name}={}", value.repr())?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_arguments() {
        let call = CallContext::new().arg(3).arg("x").kwarg("mode", "fast");
        assert_eq!(call.args(), &[Value::Int(3), Value::from("x")]);
        assert_eq!(call.get_kwarg("mode"), Some(&Value::from("fast")));
        assert!(!call.is_empty());
    }

    #[test]
    fn display_renders_argument_list() {
        let call = CallContext::positional([3, 4]).kwarg("mode", "fast");
        assert_eq!(call.to_string(), "(3, 4, mode='fast')");
        assert_eq!(CallContext::new().to_string(), "()");
    }

    #[test]
    fn kwargs_repr_is_dict_literal() {
        let call = CallContext::keywords([("modes", "study")]);
        assert_eq!(call.kwargs_repr(), "{'modes': 'study'}");
    }
}
