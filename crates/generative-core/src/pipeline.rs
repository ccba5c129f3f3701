//! Synthesis pipeline shared by every interception path
//!
//! The [`Engine`] owns the validator, the sandbox and the optional oracle,
//! critic and cache. Each step is a separate method so interception paths
//! can drive them through their own [`crate::state_machine::Trace`].

use crate::cache::{self, CodeCache, MemoryCache};
use crate::config::EngineConfig;
use crate::critic::{decode_verdict, Critic};
use crate::error::{CacheError, OracleError, SynthesisError};
use crate::oracle::{generate_within, Oracle};
use crate::prompt::{render_context, GenerationRequest};
use generative_artifact::{CallContext, Origin, SynthesizedArtifact, UnitId, Value};
use generative_sandbox::clean::clean;
use generative_sandbox::{
    FaultKind, Interpreter, KillSwitch, RuntimeFault, Sandbox, SandboxError, Validator,
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Slack on top of the policy wall clock before a run is killed from outside
const KILL_GRACE: Duration = Duration::from_millis(250);

/// Synthesis engine
pub struct Engine {
    config: EngineConfig,
    validator: Validator,
    sandbox: Arc<dyn Sandbox>,
    oracle: Option<Arc<dyn Oracle>>,
    critic: Option<Arc<dyn Critic>>,
    cache: Option<Arc<dyn CodeCache>>,
}

impl Engine {
    /// Engine with an [`Interpreter`] sandbox and no oracle, critic or cache
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            validator: Validator::with_policy(config.completeness),
            sandbox: Arc::new(Interpreter::new(config.policy.clone())),
            oracle: None,
            critic: None,
            cache: None,
            config,
        }
    }

    /// Generate candidates with `oracle`
    #[must_use]
    pub fn with_oracle(mut self, oracle: Arc<dyn Oracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Judge oracle candidates with `critic` before they run
    #[must_use]
    pub fn with_critic(mut self, critic: Arc<dyn Critic>) -> Self {
        self.critic = Some(critic);
        self
    }

    /// Look up and store accepted sources in `cache`
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn CodeCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Attach a [`MemoryCache`] sized by the configuration
    #[must_use]
    pub fn with_memory_cache(self) -> Self {
        let cache = MemoryCache::from_config(&self.config);
        self.with_cache(Arc::new(cache))
    }

    /// Execute through `sandbox` instead of the default interpreter
    #[must_use]
    pub fn with_sandbox(mut self, sandbox: Arc<dyn Sandbox>) -> Self {
        self.sandbox = sandbox;
        self
    }

    /// Replace the validator built from the configuration
    #[must_use]
    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    /// Engine configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Validator every candidate passes through
    #[inline]
    #[must_use]
    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    /// Sandbox synthesized code runs in
    #[inline]
    #[must_use]
    pub fn sandbox(&self) -> &Arc<dyn Sandbox> {
        &self.sandbox
    }

    /// Whether a critic is configured
    #[inline]
    #[must_use]
    pub fn has_critic(&self) -> bool {
        self.critic.is_some()
    }

    /// Whether a cache is configured
    #[inline]
    #[must_use]
    pub fn has_cache(&self) -> bool {
        self.cache.is_some()
    }

    /// Whether units wrapped by this engine can be synthesized at all
    #[inline]
    #[must_use]
    pub fn is_generative(&self) -> bool {
        self.oracle.is_some()
    }

    /// Send a raw prompt to the oracle under the configured timeout
    ///
    /// # Errors
    /// Returns [`SynthesisError::NoOracle`] without an oracle, otherwise
    /// [`SynthesisError::OracleFailure`] on transport failure or timeout
    pub async fn ask(&self, prompt: &str) -> Result<String, SynthesisError> {
        let oracle = self.oracle.as_ref().ok_or(SynthesisError::NoOracle)?;
        let text = generate_within(oracle.as_ref(), prompt, self.config.oracle_timeout()).await?;
        Ok(text)
    }

    /// Ask the oracle for a candidate satisfying `request`
    ///
    /// # Errors
    /// As [`Self::ask`]
    pub async fn synthesize(&self, request: &GenerationRequest) -> Result<String, SynthesisError> {
        self.ask(&request.render()).await
    }

    /// Run the validation stages over `raw`
    ///
    /// # Errors
    /// Returns [`SynthesisError::SynthesisInvalid`] when a stage refuses it
    pub fn validate(&self, raw: &str, origin: Origin) -> Result<SynthesizedArtifact, SynthesisError> {
        let artifact = self.validator.validate(raw, origin).into_result()?;
        Ok(artifact)
    }

    /// Ask the critic about `artifact`; without a critic everything passes
    ///
    /// # Errors
    /// Returns [`SynthesisError::CritiqueRejected`] for a false verdict, an
    /// undecodable answer, a transport failure or a timeout
    pub async fn critique(
        &self,
        artifact: &SynthesizedArtifact,
        call: &CallContext,
        context: &[(String, String)],
    ) -> Result<(), SynthesisError> {
        let Some(critic) = &self.critic else {
            return Ok(());
        };
        let timeout = self.config.critic_timeout();
        let judged = tokio::time::timeout(
            timeout,
            critic.judge(artifact.source(), &call.to_string(), &render_context(context)),
        )
        .await
        .unwrap_or(Err(OracleError::Timeout(timeout)));

        let answer = judged.map_err(|e| SynthesisError::CritiqueRejected(e.to_string()))?;
        match decode_verdict(&answer) {
            Ok(true) => Ok(()),
            Ok(false) => Err(SynthesisError::CritiqueRejected(format!(
                "critic judged {} incorrect",
                artifact.entry_point()
            ))),
            Err(e) => Err(SynthesisError::CritiqueRejected(e.to_string())),
        }
    }

    /// Load `artifact` with its helpers and run it with `call`
    ///
    /// # Errors
    /// Returns [`SynthesisError::SandboxCompile`] when loading fails and
    /// [`SynthesisError::SandboxRuntime`] when the run faults
    pub async fn execute(
        &self,
        artifact: &SynthesizedArtifact,
        context: &[(String, String)],
        call: CallContext,
    ) -> Result<Value, SynthesisError> {
        let helpers = context
            .iter()
            .map(|(name, source)| (name.clone(), clean(source)))
            .collect();
        let value = run_loaded(
            Arc::clone(&self.sandbox),
            artifact.source().to_string(),
            artifact.entry_point().to_string(),
            helpers,
            call,
        )
        .await?;
        tracing::info!(
            "Executed synthesized {} ({:?})",
            artifact.entry_point(),
            artifact.origin()
        );
        Ok(value)
    }

    /// Cached source for `unit` with `call`; cache failures read as a miss
    pub async fn lookup(&self, unit: &UnitId, call: &CallContext) -> Option<String> {
        let cache = self.cache.as_ref()?;
        match cache::lookup(cache.as_ref(), unit, call).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!("Cache lookup for {} failed: {}", unit, e);
                None
            }
        }
    }

    /// Store accepted `source`; a failure is handed back, not raised
    pub async fn store(&self, unit: &UnitId, call: &CallContext, source: &str) -> Option<CacheError> {
        let cache = self.cache.as_ref()?;
        match cache::store(cache.as_ref(), unit, call, source).await {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!("Cache store for {} failed: {}", unit, e);
                Some(e)
            }
        }
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("oracle", &self.oracle.as_ref().map(|o| o.name().to_string()))
            .field("critic", &self.critic.is_some())
            .field("cache", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

/// Compile and run on the blocking pool
///
/// The policy wall clock is enforced by the sandbox itself; if a run
/// outlives it by more than a short grace period its [`KillSwitch`] is
/// tripped. Other runs on the same sandbox are unaffected.
///
/// # Errors
/// Returns [`SandboxError`] for compile errors and runtime faults
pub async fn run_loaded(
    sandbox: Arc<dyn Sandbox>,
    source: String,
    entry: String,
    helpers: Vec<(String, String)>,
    call: CallContext,
) -> Result<Value, SandboxError> {
    let limit = sandbox.policy().wall_clock + KILL_GRACE;
    let switch = KillSwitch::new();
    let worker_switch = switch.clone();
    let task = tokio::task::spawn_blocking(move || -> Result<Value, SandboxError> {
        let loaded = sandbox.compile(&source, &entry, &helpers)?;
        Ok(sandbox.run_until(&loaded, &call, &worker_switch)?)
    });

    match tokio::time::timeout(limit, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join)) => Err(RuntimeFault::new(
            FaultKind::Killed,
            format!("sandbox task failed: {join}"),
        )
        .into()),
        Err(_) => {
            tracing::warn!("Sandbox run exceeded {:?}, killing", limit);
            switch.trip();
            Err(RuntimeFault::new(FaultKind::Timeout, "wall-clock limit exceeded").into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::FnOracle;
    use async_trait::async_trait;
    use generative_sandbox::CapabilityPolicy;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Answer(&'static str);

    #[async_trait]
    impl Critic for Answer {
        async fn judge(&self, _candidate: &str, _input: &str, _context: &str) -> Result<String, OracleError> {
            Ok(self.0.to_string())
        }
    }

    fn artifact(source: &str) -> SynthesizedArtifact {
        Engine::default().validate(source, Origin::Oracle).unwrap()
    }

    #[tokio::test]
    async fn ask_without_oracle_fails() {
        let err = Engine::default().ask("anything").await.unwrap_err();
        assert_eq!(err, SynthesisError::NoOracle);
        assert!(!Engine::default().is_generative());
    }

    #[tokio::test]
    async fn synthesize_sends_rendered_prompt() {
        let oracle = FnOracle::new("check", |prompt| {
            assert!(prompt.contains("def add(a, b):"));
            Ok("def add(a, b):\n    return a + b\n".to_string())
        });
        let engine = Engine::default().with_oracle(Arc::new(oracle));
        let request = GenerationRequest::repair("def add(a, b):\n    pass\n", Vec::new());
        let raw = engine.synthesize(&request).await.unwrap();
        assert!(engine.validate(&raw, Origin::Oracle).is_ok());
    }

    #[tokio::test]
    async fn critic_verdicts() {
        let candidate = artifact("def f(x):\n    return x\n");
        let call = CallContext::positional([1]);

        let yes = Engine::default().with_critic(Arc::new(Answer("True.")));
        assert!(yes.critique(&candidate, &call, &[]).await.is_ok());

        let no = Engine::default().with_critic(Arc::new(Answer("false")));
        assert!(matches!(
            no.critique(&candidate, &call, &[]).await,
            Err(SynthesisError::CritiqueRejected(_))
        ));

        let mumble = Engine::default().with_critic(Arc::new(Answer("maybe")));
        assert!(mumble.critique(&candidate, &call, &[]).await.is_err());
    }

    #[tokio::test]
    async fn execute_loads_cleaned_helpers() {
        let engine = Engine::default();
        let candidate = artifact("def total(a, b):\n    return double(a) + b\n");
        let context = vec![(
            "double".to_string(),
            "def double(self, x):\n    return x * 2".to_string(),
        )];
        let value = engine
            .execute(&candidate, &context, CallContext::positional([3, 1]))
            .await
            .unwrap();
        assert_eq!(value, Value::Int(7));
    }

    #[tokio::test]
    async fn compile_and_runtime_failures_are_distinct() {
        let engine = Engine::default();
        let forbidden = artifact("def f(p):\n    return open(p)\n");
        assert!(matches!(
            engine.execute(&forbidden, &[], CallContext::positional(["x"])).await,
            Err(SynthesisError::SandboxCompile(_))
        ));

        let faulty = artifact("def f(a):\n    return 1 // a\n");
        let err = engine
            .execute(&faulty, &[], CallContext::positional([0]))
            .await
            .unwrap_err();
        assert!(!err.is_recoverable());
    }

    #[tokio::test]
    async fn runaway_run_times_out() {
        let policy = CapabilityPolicy::default()
            .with_max_steps(u64::MAX)
            .with_wall_clock(Duration::from_millis(30));
        let engine = Engine::new(EngineConfig::default().with_policy(policy));
        let spin = artifact("def spin():\n    while True:\n        x = 1\n");
        let err = engine.execute(&spin, &[], CallContext::new()).await.unwrap_err();
        let SynthesisError::SandboxRuntime(fault) = err else {
            panic!("expected runtime fault");
        };
        assert_eq!(fault.kind, FaultKind::Timeout);
    }

    /// Ignores the policy wall clock; stops only when its switch trips
    struct Stubborn {
        policy: CapabilityPolicy,
        stopped: Arc<AtomicBool>,
        killed: AtomicBool,
    }

    impl Sandbox for Stubborn {
        fn policy(&self) -> &CapabilityPolicy {
            &self.policy
        }

        fn compile(
            &self,
            source: &str,
            entry: &str,
            helpers: &[(String, String)],
        ) -> Result<generative_sandbox::LoadedUnit, generative_sandbox::CompileError> {
            Interpreter::new(self.policy.clone()).compile(source, entry, helpers)
        }

        fn run_until(
            &self,
            _unit: &generative_sandbox::LoadedUnit,
            _call: &CallContext,
            switch: &KillSwitch,
        ) -> Result<Value, RuntimeFault> {
            while !switch.is_tripped() {
                std::thread::sleep(Duration::from_millis(1));
            }
            self.stopped.store(true, Ordering::SeqCst);
            Err(RuntimeFault::new(FaultKind::Killed, "tripped"))
        }

        fn kill(&self) {
            self.killed.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn overdue_run_trips_its_own_switch_only() {
        let stopped = Arc::new(AtomicBool::new(false));
        let sandbox = Arc::new(Stubborn {
            policy: CapabilityPolicy::default().with_wall_clock(Duration::from_millis(10)),
            stopped: Arc::clone(&stopped),
            killed: AtomicBool::new(false),
        });
        let err = run_loaded(
            sandbox.clone(),
            "def f():\n    return 1\n".to_string(),
            "f".to_string(),
            Vec::new(),
            CallContext::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SandboxError::Runtime(ref fault) if fault.kind == FaultKind::Timeout));

        for _ in 0..200 {
            if stopped.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(stopped.load(Ordering::SeqCst));
        assert!(!sandbox.killed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn store_and_lookup_through_engine() {
        let engine = Engine::default().with_memory_cache();
        let unit = UnitId::new("f");
        let call = CallContext::positional([2]);
        assert_eq!(engine.lookup(&unit, &call).await, None);
        assert_eq!(engine.store(&unit, &call, "def f(x):\n    return x\n").await, None);
        assert!(engine.lookup(&unit, &call).await.is_some());
    }
}
