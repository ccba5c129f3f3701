//! Sandbox boundary: load validated source, run it under a policy
//!
//! The [`Sandbox`] trait is the seam the engine executes through. The
//! in-process [`Interpreter`] is the only implementation shipped here; it
//! never touches the host filesystem, network or process state because the
//! language it interprets has no way to name them.

use crate::ast::FunctionDef;
use crate::error::{CompileError, RuntimeFault};
use crate::interp::Machine;
use crate::lower::lower_module;
use crate::policy::CapabilityPolicy;
use generative_artifact::{CallContext, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Executes synthesized source under a capability policy
pub trait Sandbox: Send + Sync {
    /// Policy applied to every compile and run
    fn policy(&self) -> &CapabilityPolicy;

    /// Load `source` together with sibling `helpers` (`(name, source)` pairs)
    ///
    /// Helpers that fail to load are skipped and recorded on the returned
    /// unit; only `source` itself must load.
    ///
    /// # Errors
    /// Returns [`CompileError`] when `source` does not load or does not define `entry`
    fn compile(
        &self,
        source: &str,
        entry: &str,
        helpers: &[(String, String)],
    ) -> Result<LoadedUnit, CompileError>;

    /// Invoke the loaded entry point with `call`
    ///
    /// # Errors
    /// Returns [`RuntimeFault`] for exceptions raised by the unit and for
    /// exhausted step, depth, size or wall-clock limits
    fn run(&self, unit: &LoadedUnit, call: &CallContext) -> Result<Value, RuntimeFault> {
        self.run_until(unit, call, &KillSwitch::new())
    }

    /// [`Sandbox::run`] that also stops once `switch` is tripped
    ///
    /// Tripping the switch aborts this run only.
    ///
    /// # Errors
    /// As [`Sandbox::run`], plus [`FaultKind::Killed`](crate::FaultKind::Killed)
    /// when the switch trips
    fn run_until(
        &self,
        unit: &LoadedUnit,
        call: &CallContext,
        switch: &KillSwitch,
    ) -> Result<Value, RuntimeFault>;

    /// Abort every run currently in progress
    fn kill(&self);
}

/// Cancellation flag scoped to a single run
#[derive(Debug, Clone, Default)]
pub struct KillSwitch(Arc<AtomicBool>);

impl KillSwitch {
    /// Untripped switch
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort the run watching this switch
    pub fn trip(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether [`Self::trip`] was called
    #[inline]
    #[must_use]
    pub fn is_tripped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Namespace produced by [`Sandbox::compile`]
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedUnit {
    entry: String,
    functions: HashMap<String, Arc<FunctionDef>>,
    imports: HashMap<String, String>,
    skipped_helpers: Vec<(String, CompileError)>,
}

impl LoadedUnit {
    /// Name of the function [`Sandbox::run`] invokes
    #[inline]
    #[must_use]
    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Loaded definition named `name`
    #[inline]
    #[must_use]
    pub fn function(&self, name: &str) -> Option<&Arc<FunctionDef>> {
        self.functions.get(name)
    }

    /// Dotted import target bound to `name` at module level
    #[inline]
    #[must_use]
    pub fn import(&self, name: &str) -> Option<&str> {
        self.imports.get(name).map(String::as_str)
    }

    /// Names of every function in the namespace, sorted
    #[must_use]
    pub fn function_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Helpers that could not be loaded, with the reason
    #[inline]
    #[must_use]
    pub fn skipped_helpers(&self) -> &[(String, CompileError)] {
        &self.skipped_helpers
    }
}

/// In-process tree-walking sandbox
#[derive(Debug, Default)]
pub struct Interpreter {
    policy: CapabilityPolicy,
    epoch: AtomicU64,
}

impl Interpreter {
    /// Interpreter enforcing `policy`
    #[must_use]
    pub fn new(policy: CapabilityPolicy) -> Self {
        Self {
            policy,
            epoch: AtomicU64::new(0),
        }
    }
}

impl Sandbox for Interpreter {
    fn policy(&self) -> &CapabilityPolicy {
        &self.policy
    }

    fn compile(
        &self,
        source: &str,
        entry: &str,
        helpers: &[(String, String)],
    ) -> Result<LoadedUnit, CompileError> {
        let module = lower_module(source, &self.policy)?;
        if module.function(entry).is_none() {
            return Err(CompileError::missing_entry_point(entry));
        }

        let mut functions = HashMap::new();
        for function in module.functions {
            functions.insert(function.name.clone(), function);
        }
        let mut imports: HashMap<String, String> = module.imports.into_iter().collect();

        let mut skipped_helpers = Vec::new();
        for (name, helper) in helpers {
            if name == entry || functions.contains_key(name) {
                continue;
            }
            match lower_module(helper, &self.policy) {
                Ok(loaded) => {
                    for function in loaded.functions {
                        functions.entry(function.name.clone()).or_insert(function);
                    }
                    for (alias, target) in loaded.imports {
                        imports.entry(alias).or_insert(target);
                    }
                }
                Err(e) => {
                    tracing::debug!("Skipping helper {}: {}", name, e);
                    skipped_helpers.push((name.clone(), e));
                }
            }
        }

        tracing::trace!(
            "Loaded {} with {} function(s), {} helper(s) skipped",
            entry,
            functions.len(),
            skipped_helpers.len()
        );
        Ok(LoadedUnit {
            entry: entry.to_string(),
            functions,
            imports,
            skipped_helpers,
        })
    }

    fn run_until(
        &self,
        unit: &LoadedUnit,
        call: &CallContext,
        switch: &KillSwitch,
    ) -> Result<Value, RuntimeFault> {
        let mut machine = Machine::new(unit, &self.policy, &self.epoch, switch);
        let result = machine.run_entry(call);
        tracing::trace!("Ran {} in {} step(s)", unit.entry(), machine.steps());
        result
    }

    fn kill(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CompileErrorKind, FaultKind};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn missing_entry_point_is_a_compile_error() {
        let sandbox = Interpreter::default();
        let err = sandbox
            .compile("def other():\n    return 1\n", "wanted", &[])
            .unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::MissingEntryPoint);
    }

    #[test]
    fn helpers_are_loaded_leniently() {
        let sandbox = Interpreter::default();
        let helpers = vec![
            ("double".to_string(), "def double(x):\n    return x * 2\n".to_string()),
            ("broken".to_string(), "def broken(:\n".to_string()),
            ("main".to_string(), "def main():\n    return 0\n".to_string()),
        ];
        let unit = sandbox
            .compile("def main(x):\n    return double(x) + 1\n", "main", &helpers)
            .unwrap();

        assert_eq!(unit.function_names(), vec!["double", "main"]);
        assert_eq!(unit.skipped_helpers().len(), 1);
        assert_eq!(unit.skipped_helpers()[0].0, "broken");
        assert_eq!(
            sandbox.run(&unit, &CallContext::positional([5])).unwrap(),
            Value::Int(11)
        );
    }

    #[test]
    fn wall_clock_limit_times_out() {
        let policy = CapabilityPolicy::default()
            .with_max_steps(u64::MAX)
            .with_wall_clock(Duration::from_millis(20));
        let sandbox = Interpreter::new(policy);
        let unit = sandbox
            .compile("def spin():\n    while True:\n        pass\n", "spin", &[])
            .unwrap();
        let err = sandbox.run(&unit, &CallContext::new()).unwrap_err();
        assert_eq!(err.kind, FaultKind::Timeout);
    }

    #[test]
    fn kill_aborts_a_running_unit() {
        let policy = CapabilityPolicy::default()
            .with_max_steps(u64::MAX)
            .with_wall_clock(Duration::from_secs(30));
        let sandbox = Arc::new(Interpreter::new(policy));
        let unit = sandbox
            .compile("def spin():\n    while True:\n        pass\n", "spin", &[])
            .unwrap();

        let runner = {
            let sandbox = Arc::clone(&sandbox);
            std::thread::spawn(move || sandbox.run(&unit, &CallContext::new()))
        };
        std::thread::sleep(Duration::from_millis(50));
        sandbox.kill();
        let err = runner.join().unwrap().unwrap_err();
        assert_eq!(err.kind, FaultKind::Killed);
    }

    #[test]
    fn tripped_switch_aborts_only_its_own_run() {
        let policy = CapabilityPolicy::default()
            .with_max_steps(u64::MAX)
            .with_wall_clock(Duration::from_secs(30));
        let sandbox = Arc::new(Interpreter::new(policy));
        let spin = sandbox
            .compile("def spin():\n    while True:\n        pass\n", "spin", &[])
            .unwrap();
        let count = sandbox
            .compile(
                "def count(n):\n    total = 0\n    for i in range(n):\n        total += i\n    return total\n",
                "count",
                &[],
            )
            .unwrap();

        let switch = KillSwitch::new();
        let runner = {
            let sandbox = Arc::clone(&sandbox);
            let switch = switch.clone();
            std::thread::spawn(move || sandbox.run_until(&spin, &CallContext::new(), &switch))
        };
        let neighbour = {
            let sandbox = Arc::clone(&sandbox);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                sandbox.run(&count, &CallContext::positional([200_000]))
            })
        };
        std::thread::sleep(Duration::from_millis(50));
        switch.trip();

        let err = runner.join().unwrap().unwrap_err();
        assert_eq!(err.kind, FaultKind::Killed);
        assert!(switch.is_tripped());
        assert_eq!(
            neighbour.join().unwrap().unwrap(),
            Value::Int(199_999 * 200_000 / 2)
        );
    }

    #[test]
    fn forbidden_capability_fails_to_load() {
        let sandbox = Interpreter::default();
        let err = sandbox
            .compile("def leak():\n    import os\n    return os.getcwd()\n", "leak", &[])
            .unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::Forbidden);

        let err = sandbox
            .compile("def leak(path):\n    return open(path).read()\n", "leak", &[])
            .unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::Forbidden);
    }
}
