//! Testing utilities for the Generative workspace
//!
//! Scripted oracles and critics, an instrumented cache, and unit fixtures.

#![allow(missing_docs)]

use async_trait::async_trait;
use generative_artifact::{CacheEntry, CallContext, Fingerprint, Scope, Unit, UnitError, Value};
use generative_core::{CacheError, CodeCache, Critic, Engine, MemoryCache, Oracle, OracleError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Oracle that answers from a script and records every prompt
///
/// Once the script is exhausted the last answer repeats.
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    answers: Mutex<VecDeque<Result<String, OracleError>>>,
    last: Mutex<Option<Result<String, OracleError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedOracle {
    /// Oracle with an empty script
    pub fn new() -> Self {
        Self::default()
    }

    /// Oracle that always answers `text`
    pub fn always(text: impl Into<String>) -> Self {
        Self::new().then(text)
    }

    /// Oracle that always fails with a transport error
    pub fn failing() -> Self {
        Self::new().then_fail(OracleError::transport("scripted failure"))
    }

    /// Queue an answer
    pub fn then(self, text: impl Into<String>) -> Self {
        self.answers.lock().push_back(Ok(text.into()));
        self
    }

    /// Queue a failure
    pub fn then_fail(self, error: OracleError) -> Self {
        self.answers.lock().push_back(Err(error));
        self
    }

    /// Number of calls so far
    pub fn calls(&self) -> usize {
        self.prompts.lock().len()
    }

    /// Every prompt received, in order
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    /// Most recent prompt
    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().last().cloned()
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn generate(&self, prompt: &str) -> Result<String, OracleError> {
        self.prompts.lock().push(prompt.to_string());
        let next = self.answers.lock().pop_front();
        let mut last = self.last.lock();
        match next {
            Some(answer) => {
                *last = Some(answer.clone());
                answer
            }
            None => last.clone().unwrap_or(Err(OracleError::Empty)),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Critic with a fixed answer that counts how often it was asked
#[derive(Debug)]
pub struct ScriptedCritic {
    answer: Result<String, OracleError>,
    calls: AtomicUsize,
}

impl ScriptedCritic {
    /// Critic that always answers `text`
    pub fn answering(text: impl Into<String>) -> Self {
        Self {
            answer: Ok(text.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Critic that always answers `True`
    pub fn approving() -> Self {
        Self::answering("True")
    }

    /// Critic that always answers `False`
    pub fn rejecting() -> Self {
        Self::answering("False")
    }

    /// Critic whose every judgement fails
    pub fn failing() -> Self {
        Self {
            answer: Err(OracleError::transport("critic unavailable")),
            calls: AtomicUsize::new(0),
        }
    }
/// Number of calls so far

    /// Number of judgements so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Critic for ScriptedCritic {
    async fn judge(
        &self,
        _candidate: &str,
        _sample_input: &str,
        _context: &str,
    ) -> Result<String, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer.clone()
    }
}

/// [`MemoryCache`] that counts reads and writes and can refuse writes
#[derive(Debug, Default)]
pub struct CountingCache {
    inner: MemoryCache,
    gets: AtomicUsize,
    sets: AtomicUsize,
    refuse_writes: AtomicBool,
}

impl CountingCache {
    /// Cache with no entries
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache whose every write fails
    pub fn refusing() -> Self {
        let cache = Self::default();
        cache.refuse_writes.store(true, Ordering::SeqCst);
        cache
    }

    /// Number of reads
    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    /// Number of attempted writes
    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CodeCache for CountingCache {
    async fn contains(&self, key: &Fingerprint) -> bool {
        self.inner.contains(key).await
    }

    async fn get(&self, key: &Fingerprint) -> Option<String> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn set(&self, entry: CacheEntry) -> Result<(), CacheError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        if self.refuse_writes.load(Ordering::SeqCst) {
            return Err(CacheError::backend("writes refused"));
        }
        self.inner.set(entry).await
    }
}

fn int_arg(call: &CallContext, index: usize, name: &str) -> Result<i64, UnitError> {
    call.get(index)
        .or_else(|| call.get_kwarg(name))
        .and_then(Value::as_int)
        .ok_or_else(|| UnitError::new("TypeError", format!("missing integer argument '{name}'")))
}

/// `add(a, b)` whose source asks for `sum([a, b])`
pub fn add_unit() -> Unit {
    Unit::new("add", |call| Ok(Value::Int(int_arg(call, 0, "a")? + int_arg(call, 1, "b")?)))
        .with_source("def add(a, b):\n    return sum([a, b])\n")
}

/// `multiply(a, b)` with no source at all
pub fn multiply_unit() -> Unit {
    Unit::new("multiply", |call| {
        Ok(Value::Int(int_arg(call, 0, "a")? * int_arg(call, 1, "b")?))
    })
}

/// `divide(a, b)` that always raises
pub fn broken_unit() -> Unit {
    Unit::new("divide", |_| {
        Err(UnitError::new("ZeroDivisionError", "division by zero"))
    })
    .with_source("def divide(a, b):\n    return a / 0\n")
}

/// Scope with two sibling methods, one of them native
pub fn calculator_scope() -> Arc<Scope> {
    Arc::new(
        Scope::new("Calculator")
            .member("add", "    def add(self, a, b):\n        return sum([a, b])\n")
            .member("double", "    def double(self, x):\n        return x * 2\n")
            .native("log"),
    )
}

/// Engine wired to `oracle` with an in-memory cache
pub fn engine_with(oracle: Arc<dyn Oracle>) -> Arc<Engine> {
    Arc::new(Engine::default().with_oracle(oracle).with_memory_cache())
}
