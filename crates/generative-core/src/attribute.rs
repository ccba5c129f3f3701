//! Attribute-miss materialization
//!
//! A type opts in by implementing [`Resolve`]. Wrapped in [`Generative`], a
//! lookup that resolves to [`NotFound`] is turned into a zero-argument unit
//! named after the attribute, synthesized, run, and optionally memoized.

use crate::error::{CacheError, NotFound, SynthesisError};
use crate::harvest::harvest_scope;
use crate::intercept::{Dispatch, Route};
use crate::pipeline::Engine;
use crate::prompt::GenerationRequest;
use crate::state_machine::{Stage, Trace};
use dashmap::DashMap;
use generative_artifact::{CallContext, Origin, Scope, UnitId, Value};
use generative_sandbox::to_func_name;
use std::sync::Arc;

/// Attribute lookup on a user type
pub trait Resolve: Send + Sync {
    /// Name used for cache keys and error messages
    fn type_name(&self) -> &str;

    /// Resolve `name` requested with `kwargs`
    ///
    /// # Errors
    /// Returns [`NotFound`] when the type has no such attribute
    fn resolve(&self, name: &str, kwargs: &CallContext) -> Result<Value, NotFound>;

    /// Declared members offered to the oracle as context
    fn scope(&self) -> Option<Arc<Scope>> {
        None
    }
}

/// Instance whose missing attributes are materialized on demand
#[derive(Debug)]
pub struct Generative<T> {
    inner: T,
    engine: Arc<Engine>,
    memo: DashMap<String, Value>,
}

impl<T: Resolve> Generative<T> {
    /// Wrap `inner` so its missing attributes are materialized by `engine`
    pub fn new(inner: T, engine: Arc<Engine>) -> Self {
        Self {
            inner,
            engine,
            memo: DashMap::new(),
        }
    }

    /// The wrapped value
    #[inline]
    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// Unwrap, dropping the memo
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Whether misses can be materialized
    #[inline]
    pub fn is_generative(&self) -> bool {
        self.engine.is_generative()
    }

    /// Memoized value for a (normalized) attribute name
    pub fn memoized(&self, name: &str) -> Option<Value> {
        self.memo.get(&to_func_name(name)).map(|v| v.clone())
    }

    /// Drop a memoized attribute
    pub fn forget(&self, name: &str) -> Option<Value> {
        self.memo.remove(&to_func_name(name)).map(|(_, v)| v)
    }

    /// Look `name` up, materializing it if the type does not have it
    ///
    /// # Errors
    /// Returns the [`NotFound`] from [`Resolve::resolve`] when
    /// materialization fails for any reason
    pub async fn get(&self, name: &str, kwargs: CallContext) -> Result<Dispatch, NotFound> {
        let missing = match self.inner.resolve(name, &kwargs) {
            Ok(value) => {
                let mut trace = Trace::new(name);
                trace.record(Stage::Done);
                return Ok(Dispatch::new(value, Route::Original, trace));
            }
            Err(missing) => missing,
        };

        let func_name = to_func_name(name);
        if self.engine.config().memoize_attributes {
            if let Some(value) = self.memo.get(&func_name).map(|v| v.clone()) {
                let mut trace = Trace::new(func_name);
                trace.record(Stage::Done);
                return Ok(Dispatch::new(value, Route::Memoized, trace));
            }
        }

        let id = UnitId::scoped(self.inner.type_name(), func_name.as_str());
        let mut trace = Trace::new(id.to_string());
        match self.materialize(&mut trace, &id, &kwargs).await {
            Ok((value, route, cache_error)) => {
                trace.record(Stage::Done);
                if self.engine.config().memoize_attributes {
                    self.memo.insert(func_name, value.clone());
                }
                Ok(Dispatch::new(value, route, trace).with_cache_error(cache_error))
            }
            Err(e) => {
                tracing::debug!("Could not materialize {}: {}", id, e);
                trace.record(Stage::Fallback);
                trace.record(Stage::Raised);
                Err(missing)
            }
        }
    }

    async fn materialize(
        &self,
        trace: &mut Trace,
        id: &UnitId,
        kwargs: &CallContext,
    ) -> Result<(Value, Route, Option<CacheError>), SynthesisError> {
        let engine = &self.engine;
        let context = self
            .inner
            .scope()
            .map(|scope| harvest_scope(&scope, None))
            .unwrap_or_default();

        if engine.has_cache() {
            trace.advance(Stage::CacheCheck)?;
            if let Some(source) = engine.lookup(id, kwargs).await {
                trace.advance(Stage::Validate)?;
                let artifact = engine.validate(&source, Origin::Cached)?;
                trace.advance(Stage::Execute)?;
                let value = engine.execute(&artifact, &context, CallContext::new()).await?;
                return Ok((value, Route::Cached, None));
            }
        }

        if !engine.is_generative() {
            return Err(SynthesisError::NoOracle);
        }
        trace.advance(Stage::Synthesize)?;
        let request = GenerationRequest::materialize(id.name(), kwargs.clone(), context.clone());
        let raw = engine.synthesize(&request).await?;
        trace.advance(Stage::Validate)?;
        let artifact = engine.validate(&raw, Origin::Oracle)?;
        if engine.has_critic() {
            trace.advance(Stage::Critique)?;
            engine.critique(&artifact, &CallContext::new(), &context).await?;
        }
        trace.advance(Stage::Execute)?;
        let value = engine.execute(&artifact, &context, CallContext::new()).await?;
        tracing::info!("Materialized {}", id);
        let cache_error = engine.store(id, kwargs, artifact.source()).await;
        Ok((value, Route::Synthesized, cache_error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::oracle::FnOracle;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Settings;

    impl Resolve for Settings {
        fn type_name(&self) -> &str {
            "Settings"
        }

        fn resolve(&self, name: &str, _kwargs: &CallContext) -> Result<Value, NotFound> {
            match name {
                "volume" => Ok(Value::Int(7)),
                _ => Err(NotFound::new("Settings", name)),
            }
        }
    }

    fn counting_engine(config: EngineConfig, calls: Arc<AtomicUsize>) -> Arc<Engine> {
        let oracle = FnOracle::new("modes", move |prompt| {
            calls.fetch_add(1, Ordering::SeqCst);
            assert!(prompt.contains("save_custom_mode"));
            Ok("def save_custom_mode():\n    return 'study'.upper()\n".to_string())
        });
        Arc::new(Engine::new(config).with_oracle(Arc::new(oracle)))
    }

    #[tokio::test]
    async fn present_attributes_never_synthesize() {
        let calls = Arc::new(AtomicUsize::new(0));
        let settings = Generative::new(Settings, counting_engine(EngineConfig::default(), calls.clone()));
        let dispatch = settings.get("volume", CallContext::new()).await.unwrap();
        assert_eq!(dispatch.value, Value::Int(7));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_attribute_is_materialized_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let settings = Generative::new(Settings, counting_engine(EngineConfig::default(), calls.clone()));
        let kwargs = CallContext::keywords([("modes", "study")]);

        let first = settings.get("Save Custom Mode", kwargs.clone()).await.unwrap();
        assert_eq!(first.value, Value::from("STUDY"));
        assert_eq!(first.route, Route::Synthesized);

        let second = settings.get("save custom mode", kwargs).await.unwrap();
        assert_eq!(second.route, Route::Memoized);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(settings.memoized("save_custom_mode"), Some(Value::from("STUDY")));
    }

    #[tokio::test]
    async fn memoization_can_be_disabled() {
        let calls = Arc::new(AtomicUsize::new(0));
        let config = EngineConfig::default().with_memoize_attributes(false);
        let settings = Generative::new(Settings, counting_engine(config, calls.clone()));
        for _ in 0..2 {
            settings.get("save_custom_mode", CallContext::new()).await.unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(settings.memoized("save_custom_mode"), None);
    }

    #[tokio::test]
    async fn failure_returns_original_not_found() {
        let settings = Generative::new(Settings, Arc::new(Engine::default()));
        let err = settings.get("brightness", CallContext::new()).await.unwrap_err();
        assert_eq!(err, NotFound::new("Settings", "brightness"));
    }
}
