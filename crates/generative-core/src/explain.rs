//! Explain-on-exception
//!
//! Runs the original unit; when it raises and an oracle is available, the
//! traceback is sent through the stack-trace prompt and the answer is
//! attached to the error.

use crate::error::ExplainError;
use crate::pipeline::Engine;
use crate::prompt;
use generative_artifact::{CallContext, Unit, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Unit whose errors come back with an explanation
#[derive(Debug, Clone)]
pub struct Explaining {
    unit: Arc<Unit>,
    engine: Arc<Engine>,
}

impl Explaining {
    /// Explain failures of `unit` through `engine`
    #[must_use]
    pub fn new(unit: Unit, engine: Arc<Engine>) -> Self {
        Self {
            unit: Arc::new(unit),
            engine,
        }
    }

    /// The wrapped unit
    #[inline]
    #[must_use]
    pub fn unit(&self) -> &Unit {
        &self.unit
    }

    /// Call the original
    ///
    /// # Errors
    /// Returns [`ExplainError::Explained`] when the original raised and the
    /// oracle answered, [`ExplainError::Original`] when it raised otherwise
    pub async fn call(&self, call: CallContext) -> Result<Value, ExplainError> {
        let original = match self.unit.invoke(&call) {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        if !self.engine.is_generative() {
            return Err(ExplainError::Original(original));
        }

        match self.engine.ask(&prompt::stack_trace(&original.traceback())).await {
            Ok(summary) => Err(ExplainError::Explained {
                original,
                summary: summary.trim().to_string(),
            }),
            Err(e) => {
                tracing::warn!("Could not explain failure of {}: {}", self.unit.id(), e);
                Err(ExplainError::Original(original))
            }
        }
    }
}

/// Wrap every unit of a scope, keyed by unit name
pub fn explain_all<I>(units: I, engine: &Arc<Engine>) -> BTreeMap<String, Explaining>
where
    I: IntoIterator<Item = Unit>,
{
    units
        .into_iter()
        .map(|unit| (unit.name().to_string(), Explaining::new(unit, Arc::clone(engine))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OracleError;
    use crate::oracle::FnOracle;
    use generative_artifact::UnitError;

    fn parse() -> Unit {
        Unit::new("parse", |call| match call.get(0) {
            Some(Value::Str(s)) => s
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|e| UnitError::new("ValueError", e.to_string())),
            _ => Err(UnitError::new("TypeError", "expected str")),
        })
    }

    fn explainer() -> Arc<Engine> {
        let oracle = FnOracle::new("explainer", |prompt| {
            assert!(prompt.contains("Traceback (most recent call last):"));
            Ok("  The input was not a number.\n".to_string())
        });
        Arc::new(Engine::default().with_oracle(Arc::new(oracle)))
    }

    #[tokio::test]
    async fn success_passes_through() {
        let unit = Explaining::new(parse(), explainer());
        let value = unit.call(CallContext::positional(["12"])).await.unwrap();
        assert_eq!(value, Value::Int(12));
    }

    #[tokio::test]
    async fn failure_is_explained() {
        let unit = Explaining::new(parse(), explainer());
        let err = unit.call(CallContext::positional(["x"])).await.unwrap_err();
        assert_eq!(err.original().kind, "ValueError");
        assert_eq!(err.summary(), Some("The input was not a number."));
    }

    #[tokio::test]
    async fn oracle_failure_returns_original() {
        let oracle = FnOracle::new("down", |_| Err(OracleError::transport("503")));
        let engine = Arc::new(Engine::default().with_oracle(Arc::new(oracle)));
        let err = Explaining::new(parse(), engine)
            .call(CallContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExplainError::Original(_)));
    }

    #[tokio::test]
    async fn whole_scope_is_wrapped() {
        let engine = Arc::new(Engine::default());
        let ok = Unit::new("ok", |_| Ok(Value::None));
        let wrapped = explain_all([parse(), ok], &engine);
        assert_eq!(wrapped.keys().collect::<Vec<_>>(), vec!["ok", "parse"]);
        let err = wrapped["parse"].call(CallContext::new()).await.unwrap_err();
        assert!(matches!(err, ExplainError::Original(_)));
    }
}
