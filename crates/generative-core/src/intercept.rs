//! Interception of unit calls
//!
//! [`Adapted`] replaces a unit with synthesized code whenever it can and
//! falls back to the original otherwise. [`Guarded`] runs the original first
//! and only synthesizes a repair once it has failed.

use crate::error::{AdaptError, CacheError, SynthesisError};
use crate::harvest::harvest;
use crate::pipeline::Engine;
use crate::prompt::GenerationRequest;
use crate::state_machine::{Stage, Trace};
use generative_artifact::{CallContext, Origin, Unit, UnitError, Value};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Which implementation produced a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Route {
    /// The original unit
    Original,
    /// Code supplied with the adapted unit
    Supplied,
    /// Code read back from the cache
    Cached,
    /// Code freshly produced by the oracle
    Synthesized,
    /// Value memoized by an earlier attribute materialization
    Memoized,
}

/// Outcome of one intercepted call
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    /// Value returned to the caller
    pub value: Value,
    /// Implementation that produced it
    pub route: Route,
    /// Cache write failure, if the value came with one
    pub cache_error: Option<CacheError>,
    /// Stages visited, starting at [`Stage::Start`]
    pub path: Vec<Stage>,
}

impl Dispatch {
    pub(crate) fn new(value: Value, route: Route, trace: Trace) -> Self {
        Self {
            value,
            route,
            cache_error: None,
            path: trace.into_path(),
        }
    }

    pub(crate) fn with_cache_error(mut self, cache_error: Option<CacheError>) -> Self {
        self.cache_error = cache_error;
        self
    }

    /// Drop the bookkeeping and keep the value
    #[inline]
    #[must_use]
    pub fn into_value(self) -> Value {
        self.value
    }
}

/// Unit whose calls go to synthesized code when possible
#[derive(Debug, Clone)]
pub struct Adapted {
    unit: Arc<Unit>,
    engine: Arc<Engine>,
    code: Option<String>,
}

impl Adapted {
    /// Wrap `unit`, serving its calls through `engine`
    #[must_use]
    pub fn new(unit: Unit, engine: Arc<Engine>) -> Self {
        Self {
            unit: Arc::new(unit),
            engine,
            code: None,
        }
    }

    /// Use `code` instead of asking the oracle; blank code is ignored
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        let code = code.into();
        self.code = (!code.trim().is_empty()).then_some(code);
        self
    }

    /// The wrapped unit
    #[inline]
    #[must_use]
    pub fn unit(&self) -> &Unit {
        &self.unit
    }

    /// Whether calls may be served by synthesized code
    #[inline]
    #[must_use]
    pub fn is_generative(&self) -> bool {
        self.engine.is_generative()
    }

    /// Call the adapted unit
    ///
    /// # Errors
    /// Returns [`AdaptError::Runtime`] when loaded synthesized code faults and
    /// [`AdaptError::Original`] when the fallback to the original raises
    pub async fn call(&self, call: CallContext) -> Result<Dispatch, AdaptError> {
        let mut trace = Trace::new(self.unit.id().to_string());
        match self.replace(&mut trace, &call).await {
            Ok((value, route, cache_error)) => {
                trace.record(Stage::Done);
                Ok(Dispatch::new(value, route, trace).with_cache_error(cache_error))
            }
            Err(SynthesisError::SandboxRuntime(fault)) => {
                tracing::warn!("Synthesized {} failed: {}", self.unit.id(), fault);
                trace.record(Stage::Raised);
                Err(AdaptError::Runtime(fault))
            }
            Err(e @ (SynthesisError::NoOracle | SynthesisError::NoSource(_))) => {
                tracing::debug!("{}: {}, using original", self.unit.id(), e);
                self.fallback(trace, &call)
            }
            Err(e) => {
                tracing::warn!("Falling back to original {}: {}", self.unit.id(), e);
                self.fallback(trace, &call)
            }
        }
    }

    /// Dispatch several calls concurrently, each with its own state machine
    pub async fn call_all<I>(&self, calls: I) -> Vec<Result<Dispatch, AdaptError>>
    where
        I: IntoIterator<Item = CallContext>,
    {
        futures::future::join_all(calls.into_iter().map(|call| self.call(call))).await
    }

    async fn replace(
        &self,
        trace: &mut Trace,
        call: &CallContext,
    ) -> Result<(Value, Route, Option<CacheError>), SynthesisError> {
        let engine = &self.engine;
        let context = harvest(&self.unit);

        if let Some(code) = &self.code {
            trace.advance(Stage::Validate)?;
            let artifact = engine.validate(code, Origin::Supplied)?;
            trace.advance(Stage::Execute)?;
            let value = engine.execute(&artifact, &context, call.clone()).await?;
            return Ok((value, Route::Supplied, None));
        }

        if engine.has_cache() {
            trace.advance(Stage::CacheCheck)?;
            if let Some(source) = engine.lookup(self.unit.id(), call).await {
                tracing::debug!("Cache hit for {}", self.unit.id());
                trace.advance(Stage::Validate)?;
                let artifact = engine.validate(&source, Origin::Cached)?;
                trace.advance(Stage::Execute)?;
                let value = engine.execute(&artifact, &context, call.clone()).await?;
                return Ok((value, Route::Cached, None));
            }
        }

        if !engine.is_generative() {
            return Err(SynthesisError::NoOracle);
        }
        let source = self
            .unit
            .source()
            .ok_or_else(|| SynthesisError::NoSource(self.unit.id().to_string()))?;

        trace.advance(Stage::Synthesize)?;
        let raw = engine
            .synthesize(&GenerationRequest::repair(source, context.clone()))
            .await?;
        trace.advance(Stage::Validate)?;
        let artifact = engine.validate(&raw, Origin::Oracle)?;
        if engine.has_critic() {
            trace.advance(Stage::Critique)?;
            engine.critique(&artifact, call, &context).await?;
        }
        trace.advance(Stage::Execute)?;
        let value = engine.execute(&artifact, &context, call.clone()).await?;
        let cache_error = engine.store(self.unit.id(), call, artifact.source()).await;
        Ok((value, Route::Synthesized, cache_error))
    }

    fn fallback(&self, mut trace: Trace, call: &CallContext) -> Result<Dispatch, AdaptError> {
        trace.record(Stage::Fallback);
        match self.unit.invoke(call) {
            Ok(value) => {
                trace.record(Stage::Done);
                Ok(Dispatch::new(value, Route::Original, trace))
            }
            Err(e) => {
                trace.record(Stage::Raised);
                Err(AdaptError::Original(e))
            }
        }
    }
}

/// Unit whose failures trigger a synthesized repair
#[derive(Debug, Clone)]
pub struct Guarded {
    unit: Arc<Unit>,
    engine: Arc<Engine>,
}

impl Guarded {
    /// Wrap `unit`, serving its calls through `engine`
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

    /// Whether failures can be repaired
    #[inline]
    #[must_use]
    pub fn is_generative(&self) -> bool {
        self.engine.is_generative()
    }

    /// Call the original, repairing it on failure
    ///
    /// # Errors
    /// Returns the original's error, unchanged, when no repair succeeds
    pub async fn call(&self, call: CallContext) -> Result<Dispatch, UnitError> {
        let mut trace = Trace::new(self.unit.id().to_string());
        let original = match self.unit.invoke(&call) {
            Ok(value) => {
                trace.record(Stage::Done);
                return Ok(Dispatch::new(value, Route::Original, trace));
            }
            Err(e) => e,
        };

        match self.repair(&mut trace, &call, &original).await {
            Ok(value) => {
                trace.record(Stage::Done);
                Ok(Dispatch::new(value, Route::Synthesized, trace))
            }
            Err(e) => {
                tracing::warn!("Repair of {} failed: {}", self.unit.id(), e);
                trace.record(Stage::Raised);
                Err(original)
            }
        }
    }

    async fn repair(
        &self,
        trace: &mut Trace,
        call: &CallContext,
        original: &UnitError,
    ) -> Result<Value, SynthesisError> {
        let engine = &self.engine;
        if !engine.is_generative() {
            return Err(SynthesisError::NoOracle);
        }
        let source = self
            .unit
            .source()
            .ok_or_else(|| SynthesisError::NoSource(self.unit.id().to_string()))?;
        let context = harvest(&self.unit);

        trace.advance(Stage::Synthesize)?;
        let request =
            GenerationRequest::repair(source, context.clone()).with_failure(original.traceback());
        let raw = engine.synthesize(&request).await?;
        trace.advance(Stage::Validate)?;
        let artifact = engine.validate(&raw, Origin::Oracle)?;
        if engine.has_critic() {
            trace.advance(Stage::Critique)?;
            engine.critique(&artifact, call, &context).await?;
        }
        trace.advance(Stage::Execute)?;
        engine.execute(&artifact, &context, call.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OracleError;
    use crate::oracle::FnOracle;
    use Stage::*;

    fn add() -> Unit {
        Unit::new("add", |call| {
            let a = call.get(0).and_then(Value::as_int).unwrap_or_default();
            let b = call.get(1).and_then(Value::as_int).unwrap_or_default();
            Ok(Value::Int(a + b))
        })
        .with_source("def add(a, b):\n    return a + b\n")
    }

    fn failing() -> Unit {
        Unit::new("div", |_| Err(UnitError::new("ZeroDivisionError", "division by zero")))
            .with_source("def div(a, b):\n    return a / b\n")
    }

    fn oracle(answer: &'static str) -> Arc<Engine> {
        let oracle = FnOracle::new("fixed", move |_| Ok(answer.to_string()));
        Arc::new(Engine::default().with_oracle(Arc::new(oracle)))
    }

    #[tokio::test]
    async fn no_oracle_is_passthrough() {
        let adapted = Adapted::new(add(), Arc::new(Engine::default()));
        assert!(!adapted.is_generative());
        let dispatch = adapted.call(CallContext::positional([3, 4])).await.unwrap();
        assert_eq!(dispatch.value, Value::Int(7));
        assert_eq!(dispatch.route, Route::Original);
        assert_eq!(dispatch.path, vec![Start, Fallback, Done]);
    }

    #[tokio::test]
    async fn supplied_code_skips_oracle() {
        let engine = Arc::new(Engine::default().with_oracle(Arc::new(FnOracle::new(
            "unused",
            |_| Err(OracleError::transport("should not be called")),
        ))));
        let adapted =
            Adapted::new(add(), engine).with_code("def add(a, b):\n    return a * b\n");
        let dispatch = adapted.call(CallContext::positional([3, 4])).await.unwrap();
        assert_eq!(dispatch.value, Value::Int(12));
        assert_eq!(dispatch.route, Route::Supplied);
        assert_eq!(dispatch.path, vec![Start, Validate, Execute, Done]);
    }

    #[tokio::test]
    async fn invalid_candidate_falls_back() {
        let adapted = Adapted::new(add(), oracle("def add(a, b):\n    pass\n"));
        let dispatch = adapted.call(CallContext::positional([1, 2])).await.unwrap();
        assert_eq!(dispatch.value, Value::Int(3));
        assert_eq!(dispatch.route, Route::Original);
        assert_eq!(dispatch.path, vec![Start, Synthesize, Validate, Fallback, Done]);
    }

    #[tokio::test]
    async fn synthesized_runtime_fault_propagates() {
        let adapted = Adapted::new(add(), oracle("def add(a, b):\n    return a // 0\n"));
        let err = adapted.call(CallContext::positional([1, 2])).await.unwrap_err();
        assert!(matches!(err, AdaptError::Runtime(_)));
    }

    #[tokio::test]
    async fn concurrent_calls_are_independent() {
        let adapted = Adapted::new(add(), oracle("def add(a, b):\n    return a - b\n"));
        let results = adapted
            .call_all((0..4).map(|i| CallContext::positional([i, 1])))
            .await;
        let values: Vec<Value> = results.into_iter().map(|r| r.unwrap().value).collect();
        assert_eq!(values, vec![Value::Int(-1), Value::Int(0), Value::Int(1), Value::Int(2)]);
    }

    #[tokio::test]
    async fn original_error_survives_fallback() {
        let adapted = Adapted::new(failing(), Arc::new(Engine::default()));
        let err = adapted.call(CallContext::positional([1, 0])).await.unwrap_err();
        assert!(err.is_original());
    }

    #[tokio::test]
    async fn guarded_repairs_failures() {
        let guarded = Guarded::new(failing(), oracle("def func(a, b):\n    return a + b\n"));
        let dispatch = guarded.call(CallContext::positional([3, 4])).await.unwrap();
        assert_eq!(dispatch.value, Value::Int(7));
        assert_eq!(dispatch.route, Route::Synthesized);
        assert_eq!(dispatch.path, vec![Start, Synthesize, Validate, Execute, Done]);
    }

    #[tokio::test]
    async fn guarded_reraises_original_unchanged() {
        let guarded = Guarded::new(failing(), oracle("def func(a, b):\n    return a // 0\n"));
        let err = guarded.call(CallContext::positional([3, 4])).await.unwrap_err();
        assert_eq!(err.kind, "ZeroDivisionError");
        assert_eq!(err.frames, vec!["div".to_string()]);
    }

    #[tokio::test]
    async fn guarded_success_never_synthesizes() {
        let guarded = Guarded::new(add(), oracle("not code"));
        let dispatch = guarded.call(CallContext::positional([1, 1])).await.unwrap();
        assert_eq!(dispatch.route, Route::Original);
        assert_eq!(dispatch.path, vec![Start, Done]);
    }
}
