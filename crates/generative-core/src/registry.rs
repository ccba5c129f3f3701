//! Type registry: methods attached to named types at runtime
//!
//! [`TypeRegistry::augment`] validates a single-function source and attaches
//! it to a type; [`TypeRegistry::call`] runs it in the sandbox with the type's
//! other methods loaded as helpers.

use crate::error::{CacheError, RegistryError};
use crate::pipeline::{run_loaded, Engine};
use dashmap::DashMap;
use generative_artifact::{CallContext, Origin, SynthesizedArtifact, UnitId, Value};
use generative_sandbox::ValidationError;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Result of [`TypeRegistry::augment_cached`]
#[derive(Debug, Clone, PartialEq)]
pub struct Augmented {
    /// Name the method was attached under
    pub method: String,
    /// Whether the attached source came from the caller or the cache
    pub origin: Origin,
    /// Cache write failure, if any
    pub cache_error: Option<CacheError>,
}

/// Registry of generative types and their attached methods
#[derive(Debug)]
pub struct TypeRegistry {
    engine: Arc<Engine>,
    types: DashMap<String, BTreeMap<String, SynthesizedArtifact>>,
}

impl TypeRegistry {
    /// Empty registry validating and running through `engine`
    #[must_use]
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            types: DashMap::new(),
        }
    }

    /// Register `type_name` with no methods; returns false if already known
    pub fn register(&self, type_name: &str) -> bool {
        if self.types.contains_key(type_name) {
            return false;
        }
        self.types.insert(type_name.to_string(), BTreeMap::new());
        true
    }

    /// Registered types carry the generative flag
    #[must_use]
    pub fn is_generative(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    /// Attach the function in `source` to `type_name`
    ///
    /// The type is registered if needed. A method of the same name is
    /// replaced.
    ///
    /// # Errors
    /// Returns [`ValidationError`] when `source` is not a single complete
    /// function
    pub fn augment(&self, type_name: &str, source: &str) -> Result<String, ValidationError> {
        let artifact = self.validate(source, Origin::Supplied)?;
        Ok(self.attach(type_name, artifact))
    }

    /// Like [`Self::augment`], but consult the engine's cache first
    ///
    /// A cached source for the same type and method name wins over
    /// `source`; otherwise `source` is attached and stored.
    ///
    /// # Errors
    /// Returns [`ValidationError`] when `source` is not a single complete
    /// function
    pub async fn augment_cached(
        &self,
        type_name: &str,
        source: &str,
    ) -> Result<Augmented, ValidationError> {
        let supplied = self.validate(source, Origin::Supplied)?;
        let id = UnitId::scoped(type_name, supplied.entry_point());
        let key = CallContext::new();

        if let Some(cached) = self.engine.lookup(&id, &key).await {
            match self.validate(&cached, Origin::Cached) {
                Ok(artifact) if artifact.entry_point() == supplied.entry_point() => {
                    return Ok(Augmented {
                        method: self.attach(type_name, artifact),
                        origin: Origin::Cached,
                        cache_error: None,
                    });
                }
                _ => tracing::warn!("Ignoring unusable cached source for {}", id),
            }
        }

        let cache_error = self.engine.store(&id, &key, supplied.source()).await;
        Ok(Augmented {
            method: self.attach(type_name, supplied),
            origin: Origin::Supplied,
            cache_error,
        })
    }

    /// Attached method names, sorted
    #[must_use]
    pub fn methods(&self, type_name: &str) -> Vec<String> {
        self.types
            .get(type_name)
            .map(|methods| methods.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Source attached under `method`
    #[must_use]
    pub fn source(&self, type_name: &str, method: &str) -> Option<String> {
        self.types
            .get(type_name)
            .and_then(|methods| methods.get(method).map(|a| a.source().to_string()))
    }

    /// Call `method` of `type_name`
    ///
    /// # Errors
    /// Returns [`RegistryError::UnknownType`] / [`RegistryError::UnknownMethod`]
    /// for unknown names, otherwise the sandbox's error
    pub async fn call(
        &self,
        type_name: &str,
        method: &str,
        call: CallContext,
    ) -> Result<Value, RegistryError> {
        let (artifact, helpers) = {
            let methods = self
                .types
                .get(type_name)
                .ok_or_else(|| RegistryError::UnknownType(type_name.to_string()))?;
            let artifact = methods.get(method).cloned().ok_or_else(|| {
                RegistryError::UnknownMethod {
                    type_name: type_name.to_string(),
                    method: method.to_string(),
                }
            })?;
            let helpers: Vec<(String, String)> = methods
                .iter()
                .filter(|(name, _)| name.as_str() != method)
                .map(|(name, a)| (name.clone(), a.source().to_string()))
                .collect();
            (artifact, helpers)
        };

        let value = run_loaded(
            Arc::clone(self.engine.sandbox()),
            artifact.source().to_string(),
            artifact.entry_point().to_string(),
            helpers,
            call,
        )
        .await?;
        Ok(value)
    }

    fn validate(&self, source: &str, origin: Origin) -> Result<SynthesizedArtifact, ValidationError> {
        self.engine.validator().validate(source, origin).into_result()
    }

    fn attach(&self, type_name: &str, artifact: SynthesizedArtifact) -> String {
        let method = artifact.entry_point().to_string();
        tracing::debug!("Attaching {}.{}", type_name, method);
        self.types
            .entry(type_name.to_string())
            .or_default()
            .insert(method.clone(), artifact);
        method
    }
}
