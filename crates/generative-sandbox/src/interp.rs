//! Tree-walking evaluator for loaded units
//!
//! A [`Machine`] executes one invocation. Every statement and expression
//! costs one step; the wall-clock deadline, the kill epoch and the run's
//! [`KillSwitch`] are polled every [`POLL_INTERVAL`] steps.

use crate::ast::{
    Arg, BoolOp, Clause, Expr, FunctionDef, ParamKind, Stmt, StmtKind, Target,
};
use crate::builtins;
use crate::error::{FaultKind, RuntimeFault};
use crate::ops::{self, Eval};
use crate::policy::CapabilityPolicy;
use crate::sandbox::{KillSwitch, LoadedUnit};
use generative_artifact::{CallContext, Callable, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

const POLL_INTERVAL: u64 = 256;

type Locals = HashMap<String, Value>;

/// Lambda or nested definition plus the bindings visible where it was made
struct Closure {
    def: Arc<FunctionDef>,
    captured: Arc<Locals>,
}

struct Frame {
    locals: Locals,
    captured: Option<Arc<Locals>>,
}

impl Frame {
    fn new(captured: Option<Arc<Locals>>) -> Self {
        Self {
            locals: HashMap::new(),
            captured,
        }
    }

    /// Everything a closure created here can see
    fn snapshot(&self) -> Arc<Locals> {
        let mut all = self
            .captured
            .as_deref()
            .cloned()
            .unwrap_or_default();
        all.extend(self.locals.iter().map(|(k, v)| (k.clone(), v.clone())));
        Arc::new(all)
    }

    /// Mutable root of a named place, copying captured values in on first write
    fn root_mut(&mut self, name: &str) -> Eval<&mut Value> {
        if !self.locals.contains_key(name) {
            let inherited = self
                .captured
                .as_ref()
                .and_then(|c| c.get(name))
                .cloned()
                .ok_or_else(|| RuntimeFault::name_error(name))?;
            self.locals.insert(name.to_string(), inherited);
        }
        self.locals
            .get_mut(name)
            .ok_or_else(|| RuntimeFault::name_error(name))
    }
}

enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

/// Which body a comprehension produces per iteration
enum Produce<'e> {
    Element(&'e Expr),
    Pair(&'e Expr, &'e Expr),
}

/// State of one run
pub(crate) struct Machine<'a> {
    unit: &'a LoadedUnit,
    policy: &'a CapabilityPolicy,
    kill: &'a AtomicU64,
    epoch: u64,
    switch: &'a KillSwitch,
    deadline: Instant,
    steps: u64,
    depth: usize,
    closures: Vec<Closure>,
}

impl<'a> Machine<'a> {
    pub(crate) fn new(
        unit: &'a LoadedUnit,
        policy: &'a CapabilityPolicy,
        kill: &'a AtomicU64,
        switch: &'a KillSwitch,
    ) -> Self {
        Self {
            unit,
            policy,
            kill,
            epoch: kill.load(Ordering::Acquire),
            switch,
            deadline: Instant::now() + policy.wall_clock,
            steps: 0,
            depth: 0,
            closures: Vec::new(),
        }
    }

    /// Invoke the unit's entry point with `call`
    pub(crate) fn run_entry(&mut self, call: &CallContext) -> Eval<Value> {
        let entry = self
            .unit
            .function(self.unit.entry())
            .cloned()
            .ok_or_else(|| RuntimeFault::name_error(self.unit.entry()))?;
        let kwargs = call
            .kwargs()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        self.call_function(&entry, None, None, call.args().to_vec(), kwargs)
    }

    /// Steps consumed so far
    pub(crate) fn steps(&self) -> u64 {
        self.steps
    }

    pub(crate) fn max_len(&self) -> usize {
        self.policy.max_sequence_len
    }

    pub(crate) fn check_len(&self, len: usize) -> Eval<()> {
        ops::check_len(len, self.policy.max_sequence_len)
    }

    /// Charge one step and poll the external limits
    pub(crate) fn tick(&mut self) -> Eval<()> {
        self.steps += 1;
        if self.steps > self.policy.max_steps {
            return Err(RuntimeFault::new(
                FaultKind::StepLimit,
                format!("step budget of {} exhausted", self.policy.max_steps),
            ));
        }
        if self.steps % POLL_INTERVAL == 0 {
            self.poll()?;
        }
        Ok(())
    }

    fn poll(&self) -> Eval<()> {
        if self.switch.is_tripped() || self.kill.load(Ordering::Acquire) != self.epoch {
            return Err(RuntimeFault::new(FaultKind::Killed, "run aborted"));
        }
        if Instant::now() >= self.deadline {
            return Err(RuntimeFault::new(
                FaultKind::Timeout,
                format!("wall-clock limit of {:?} exceeded", self.policy.wall_clock),
            ));
        }
        Ok(())
    }

    /// Call any callable value
    pub(crate) fn call_value(
        &mut self,
        callee: &Value,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Eval<Value> {
        match callee {
            Value::Callable(Callable::Function(name)) => {
                let def = self
                    .unit
                    .function(name)
                    .cloned()
                    .ok_or_else(|| RuntimeFault::name_error(name))?;
                self.call_function(&def, None, None, args, kwargs)
            }
            Value::Callable(Callable::Closure(slot)) => {
                let closure = usize::try_from(*slot)
                    .ok()
                    .and_then(|i| self.closures.get(i))
                    .ok_or_else(|| RuntimeFault::type_error("stale closure reference"))?;
                let def = closure.def.clone();
                let captured = closure.captured.clone();
                self.call_function(&def, Some(captured), Some(callee.clone()), args, kwargs)
            }
            Value::Callable(Callable::Builtin(name)) => {
                builtins::call_builtin(self, name, args, kwargs)
            }
            other => Err(RuntimeFault::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    fn call_function(
        &mut self,
        def: &Arc<FunctionDef>,
        captured: Option<Arc<Locals>>,
        self_ref: Option<Value>,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Eval<Value> {
        if self.depth >= self.policy.max_call_depth {
            return Err(RuntimeFault::new(
                FaultKind::DepthLimit,
                "maximum recursion depth exceeded",
            ));
        }
        self.tick()?;

        let mut frame = Frame::new(captured);
        if let Some(me) = self_ref {
            frame.locals.insert(def.name.clone(), me);
        }
        self.bind(def, args, kwargs, &mut frame)
            .map_err(|e| e.at_line(def.line))?;

        self.depth += 1;
        let flow = self.exec_block(&def.body, &mut frame);
        self.depth -= 1;

        match flow? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::None),
        }
    }

    fn bind(
        &mut self,
        def: &FunctionDef,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
        frame: &mut Frame,
    ) -> Eval<()> {
        let given = args.len();
        let mut positional = args.into_iter();
        let mut by_name: HashMap<String, Value> = HashMap::new();
        let mut extra = Vec::new();
        let accepts_extra = def.params.iter().any(|p| p.kind == ParamKind::VarKwargs);

        for (name, value) in kwargs {
            let named = def.params.iter().any(|p| {
                p.name == name && matches!(p.kind, ParamKind::Positional | ParamKind::KeywordOnly)
            });
            if named {
                if by_name.insert(name.clone(), value).is_some() {
                    return Err(RuntimeFault::type_error(format!(
                        "{}() got multiple values for argument '{name}'",
                        def.name
                    )));
                }
            } else if accepts_extra {
                extra.push((Value::Str(name), value));
            } else {
                return Err(RuntimeFault::type_error(format!(
                    "{}() got an unexpected keyword argument '{name}'",
                    def.name
                )));
            }
        }

        for param in &def.params {
            let value = match param.kind {
                ParamKind::Positional => match positional.next() {
                    Some(value) => {
                        if by_name.contains_key(&param.name) {
                            return Err(RuntimeFault::type_error(format!(
                                "{}() got multiple values for argument '{}'",
                                def.name, param.name
                            )));
                        }
                        value
                    }
                    None => self.named_or_default(def, param, &mut by_name, frame)?,
                },
                ParamKind::KeywordOnly => self.named_or_default(def, param, &mut by_name, frame)?,
                ParamKind::VarArgs => Value::Tuple(positional.by_ref().collect()),
                ParamKind::VarKwargs => Value::Dict(std::mem::take(&mut extra)),
            };
            frame.locals.insert(param.name.clone(), value);
        }

        if positional.next().is_some() {
            return Err(RuntimeFault::type_error(format!(
                "{}() takes {} positional arguments but {given} were given",
                def.name,
                def.positional_arity()
            )));
        }
        Ok(())
    }

    fn named_or_default(
        &mut self,
        def: &FunctionDef,
        param: &crate::ast::Param,
        by_name: &mut HashMap<String, Value>,
        frame: &mut Frame,
    ) -> Eval<Value> {
        if let Some(value) = by_name.remove(&param.name) {
            return Ok(value);
        }
        match &param.default {
            Some(default) => self.eval(default, frame),
            None => Err(RuntimeFault::type_error(format!(
                "{}() missing required argument: '{}'",
                def.name, param.name
            ))),
        }
    }

    fn exec_block(&mut self, body: &[Stmt], frame: &mut Frame) -> Eval<Flow> {
        for stmt in body {
            let flow = self
                .exec(stmt, frame)
                .map_err(|e| e.at_line(stmt.line))?;
            if !matches!(flow, Flow::Normal) {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    #[allow(clippy::too_many_lines)]
    fn exec(&mut self, stmt: &Stmt, frame: &mut Frame) -> Eval<Flow> {
        self.tick()?;
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.eval(expr, frame)?;
            }
            StmtKind::Assign { targets, value } => {
                let value = self.eval(value, frame)?;
                for target in targets {
                    self.assign(target, value.clone(), frame)?;
                }
            }
            StmtKind::AugAssign { target, op, value } => {
                let current = self.read_target(target, frame)?;
                let rhs = self.eval(value, frame)?;
                let updated = ops::binary(*op, &current, &rhs, self.max_len())?;
                self.assign(target, updated, frame)?;
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, frame)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::If { branches, orelse } => {
                for (test, block) in branches {
                    if self.eval(test, frame)?.is_truthy() {
                        return self.exec_block(block, frame);
                    }
                }
                return self.exec_block(orelse, frame);
            }
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
            } => {
                let items = ops::iterate(&self.eval(iter, frame)?)?;
                for item in items {
                    self.tick()?;
                    self.assign(target, item, frame)?;
                    match self.exec_block(body, frame)? {
                        Flow::Break => return Ok(Flow::Normal),
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Continue | Flow::Normal => {}
                    }
                }
                return self.exec_block(orelse, frame);
            }
            StmtKind::While { test, body, orelse } => {
                while self.eval(test, frame)?.is_truthy() {
                    self.tick()?;
                    match self.exec_block(body, frame)? {
                        Flow::Break => return Ok(Flow::Normal),
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Continue | Flow::Normal => {}
                    }
                }
                return self.exec_block(orelse, frame);
            }
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
            StmtKind::Pass => {}
            StmtKind::Raise { class, message } => {
                let Some(class) = class else {
                    return Err(RuntimeFault::raised(
                        "RuntimeError",
                        "No active exception to reraise",
                    ));
                };
                let message = match message {
                    Some(expr) => self.eval(expr, frame)?.to_string(),
                    None => String::new(),
                };
                return Err(RuntimeFault::raised(class.clone(), message));
            }
            StmtKind::Assert { test, message } => {
                if !self.eval(test, frame)?.is_truthy() {
                    let message = match message {
                        Some(expr) => self.eval(expr, frame)?.to_string(),
                        None => String::new(),
                    };
                    return Err(RuntimeFault::raised("AssertionError", message));
                }
            }
            StmtKind::FunctionDef(def) => {
                let closure = self.make_closure(def, frame);
                frame.locals.insert(def.name.clone(), closure);
            }
            StmtKind::Import { module, alias } => {
                if !builtins::module_exists(module) {
                    return Err(RuntimeFault::raised(
                        "ModuleNotFoundError",
                        format!("No module named '{module}'"),
                    ));
                }
                frame
                    .locals
                    .insert(alias.clone(), Value::Module(module.clone()));
            }
            StmtKind::ImportFrom { module, names } => {
                for (name, alias) in names {
                    let value = builtins::module_attr(module, name).map_err(|_| {
                        RuntimeFault::raised(
                            "ImportError",
                            format!("cannot import name '{name}' from '{module}'"),
                        )
                    })?;
                    frame.locals.insert(alias.clone(), value);
                }
            }
        }
        Ok(Flow::Normal)
    }

    fn make_closure(&mut self, def: &Arc<FunctionDef>, frame: &Frame) -> Value {
        let slot = u32::try_from(self.closures.len()).unwrap_or(u32::MAX);
        self.closures.push(Closure {
            def: def.clone(),
            captured: frame.snapshot(),
        });
        Value::Callable(Callable::Closure(slot))
    }

    fn load(&self, name: &str, frame: &Frame) -> Eval<Value> {
        if let Some(value) = frame.locals.get(name) {
            return Ok(value.clone());
        }
        if let Some(value) = frame.captured.as_ref().and_then(|c| c.get(name)) {
            return Ok(value.clone());
        }
        if self.unit.function(name).is_some() {
            return Ok(Value::Callable(Callable::Function(name.to_string())));
        }
        if let Some(target) = self.unit.import(name) {
            return match target.split_once('.') {
                Some((module, attr)) => builtins::module_attr(module, attr),
                None => Ok(Value::Module(target.to_string())),
            };
        }
        if self.policy.builtin_allowed(name) && builtins::exists(name) {
            return Ok(Value::Callable(Callable::Builtin(name.to_string())));
        }
        Err(RuntimeFault::name_error(name))
    }

    fn read_target(&mut self, target: &Target, frame: &mut Frame) -> Eval<Value> {
        match target {
            Target::Place { root, path } => {
                let mut value = self.load(root, frame)?;
                for index in path {
                    let index = self.eval(index, frame)?;
                    value = ops::get_item(&value, &index)?;
                }
                Ok(value)
            }
            Target::Unpack(_) => Err(RuntimeFault::raised(
                "SyntaxError",
                "illegal expression for augmented assignment",
            )),
        }
    }

    fn assign(&mut self, target: &Target, value: Value, frame: &mut Frame) -> Eval<()> {
        match target {
            Target::Place { root, path } => {
                let Some((last, inner)) = path.split_last() else {
                    frame.locals.insert(root.clone(), value);
                    return Ok(());
                };
                let mut indices = Vec::with_capacity(inner.len());
                for index in inner {
                    indices.push(self.eval(index, frame)?);
                }
                let last = self.eval(last, frame)?;

                let max_len = self.max_len();
                let mut slot = frame.root_mut(root)?;
                for index in &indices {
                    slot = ops::item_mut(slot, index)?;
                }
                ops::set_item(slot, last, value, max_len)
            }
            Target::Unpack(targets) => {
                let items = ops::iterate(&value)?;
                if items.len() != targets.len() {
                    let message = if items.len() < targets.len() {
                        format!(
                            "not enough values to unpack (expected {}, got {})",
                            targets.len(),
                            items.len()
                        )
                    } else {
                        format!("too many values to unpack (expected {})", targets.len())
                    };
                    return Err(RuntimeFault::value_error(message));
                }
                for (target, item) in targets.iter().zip(items) {
                    self.assign(target, item, frame)?;
                }
                Ok(())
            }
        }
    }

    fn eval_args(
        &mut self,
        args: &[Arg],
        frame: &mut Frame,
    ) -> Eval<(Vec<Value>, Vec<(String, Value)>)> {
        let mut positional = Vec::new();
        let mut keywords = Vec::new();
        for arg in args {
            match arg {
                Arg::Positional(expr) => positional.push(self.eval(expr, frame)?),
                Arg::Keyword(name, expr) => keywords.push((name.clone(), self.eval(expr, frame)?)),
                Arg::Splat(expr) => positional.extend(ops::iterate(&self.eval(expr, frame)?)?),
                Arg::KwSplat(expr) => match self.eval(expr, frame)? {
                    Value::Dict(entries) => {
                        for (key, value) in entries {
                            let Value::Str(key) = key else {
                                return Err(RuntimeFault::type_error("keywords must be strings"));
                            };
                            keywords.push((key, value));
                        }
                    }
                    other => {
                        return Err(RuntimeFault::type_error(format!(
                            "argument after ** must be a mapping, not {}",
                            other.type_name()
                        )))
                    }
                },
            }
        }
        Ok((positional, keywords))
    }

    #[allow(clippy::too_many_lines)]
    fn eval(&mut self, expr: &Expr, frame: &mut Frame) -> Eval<Value> {
        self.tick()?;
        match expr {
            Expr::Const(value) => Ok(value.clone()),
            Expr::Name(name) => self.load(name, frame),
            Expr::Binary { op, left, right } => {
                let l = self.eval(left, frame)?;
                let r = self.eval(right, frame)?;
                ops::binary(*op, &l, &r, self.max_len())
            }
            Expr::Unary { op, operand } => {
                let v = self.eval(operand, frame)?;
                ops::unary(*op, &v)
            }
            Expr::Bool { op, left, right } => {
                let l = self.eval(left, frame)?;
                match (op, l.is_truthy()) {
                    (BoolOp::And, false) | (BoolOp::Or, true) => Ok(l),
                    _ => self.eval(right, frame),
                }
            }
            Expr::Compare { first, rest } => {
                let mut left = self.eval(first, frame)?;
                for (op, next) in rest {
                    let right = self.eval(next, frame)?;
                    if !ops::compare(*op, &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            }
            Expr::IfExp { test, body, orelse } => {
                if self.eval(test, frame)?.is_truthy() {
                    self.eval(body, frame)
                } else {
                    self.eval(orelse, frame)
                }
            }
            Expr::Call { func, args } => {
                let callee = self.eval(func, frame)?;
                let (args, kwargs) = self.eval_args(args, frame)?;
                self.call_value(&callee, args, kwargs)
            }
            Expr::Method {
                receiver,
                name,
                args,
            } => self.method_call(receiver, name, args, frame),
            Expr::Attribute { value, name } => match self.eval(value, frame)? {
                Value::Module(module) => builtins::module_attr(&module, name),
                other => Err(RuntimeFault::attribute_error(other.type_name(), name)),
            },
            Expr::Subscript { value, index } => {
                let v = self.eval(value, frame)?;
                let i = self.eval(index, frame)?;
                ops::get_item(&v, &i)
            }
            Expr::Slice {
                value,
                lower,
                upper,
                step,
            } => {
                let v = self.eval(value, frame)?;
                let mut bound = |part: &Option<Box<Expr>>, m: &mut Self| -> Eval<Option<Value>> {
                    part.as_deref().map(|e| m.eval(e, frame)).transpose()
                };
                let lower = bound(lower, self)?;
                let upper = bound(upper, self)?;
                let step = bound(step, self)?;
                ops::slice(&v, lower.as_ref(), upper.as_ref(), step.as_ref())
            }
            Expr::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval(item, frame)?);
                }
                Ok(Value::List(out))
            }
            Expr::Tuple(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval(item, frame)?);
                }
                Ok(Value::Tuple(out))
            }
            Expr::Dict(pairs) => {
                let mut entries = Vec::with_capacity(pairs.len());
                for (k, v) in pairs {
                    let key = self.eval(k, frame)?;
                    ops::ensure_hashable(&key)?;
                    let value = self.eval(v, frame)?;
                    ops::dict_insert(&mut entries, key, value);
                }
                Ok(Value::Dict(entries))
            }
            Expr::ListComp { element, clauses } => {
                let out = self.comprehension(clauses, &Produce::Element(element), frame)?;
                Ok(Value::List(out))
            }
            Expr::DictComp {
                key,
                value,
                clauses,
            } => {
                let pairs = self.comprehension(clauses, &Produce::Pair(key, value), frame)?;
                let mut entries = Vec::with_capacity(pairs.len());
                for pair in pairs {
                    if let Value::Tuple(mut kv) = pair {
                        if let (Some(v), Some(k)) = (kv.pop(), kv.pop()) {
                            ops::dict_insert(&mut entries, k, v);
                        }
                    }
                }
                Ok(Value::Dict(entries))
            }
            Expr::Lambda(def) => Ok(self.make_closure(def, frame)),
        }
    }

    fn method_call(
        &mut self,
        receiver: &Expr,
        name: &str,
        args: &[Arg],
        frame: &mut Frame,
    ) -> Eval<Value> {
        if builtins::is_mutating(name) {
            if let Some((root, path)) = receiver.as_place() {
                let known = frame.locals.contains_key(root)
                    || frame.captured.as_ref().is_some_and(|c| c.contains_key(root));
                if known {
                    let mut indices = Vec::with_capacity(path.len());
                    for index in path {
                        indices.push(self.eval(index, frame)?);
                    }
                    let (args, kwargs) = self.eval_args(args, frame)?;
                    let mut slot = frame.root_mut(root)?;
                    for index in &indices {
                        slot = ops::item_mut(slot, index)?;
                    }
                    return builtins::call_method(self, slot, name, args, kwargs);
                }
            }
        }

        let mut value = self.eval(receiver, frame)?;
        let (args, kwargs) = self.eval_args(args, frame)?;
        if let Value::Module(module) = &value {
            let function = builtins::module_attr(module, name)?;
            return self.call_value(&function, args, kwargs);
        }
        builtins::call_method(self, &mut value, name, args, kwargs)
    }

    fn comprehension(
        &mut self,
        clauses: &[Clause],
        produce: &Produce<'_>,
        frame: &mut Frame,
    ) -> Eval<Vec<Value>> {
        let mut names = Vec::new();
        for clause in clauses {
            if let Clause::For { target, .. } = clause {
                target_names(target, &mut names);
            }
        }
        let saved: Vec<(String, Option<Value>)> = names
            .into_iter()
            .map(|name| {
                let old = frame.locals.get(&name).cloned();
                (name, old)
            })
            .collect();

        let mut out = Vec::new();
        let result = self.comprehend(clauses, produce, frame, &mut out);

        for (name, old) in saved {
            match old {
                Some(value) => frame.locals.insert(name, value),
                None => frame.locals.remove(&name),
            };
        }
        result.map(|()| out)
    }

    fn comprehend(
        &mut self,
        clauses: &[Clause],
        produce: &Produce<'_>,
        frame: &mut Frame,
        out: &mut Vec<Value>,
    ) -> Eval<()> {
        match clauses.split_first() {
            None => {
                self.check_len(out.len() + 1)?;
                let item = match produce {
                    Produce::Element(expr) => self.eval(expr, frame)?,
                    Produce::Pair(k, v) => {
                        let key = self.eval(k, frame)?;
                        ops::ensure_hashable(&key)?;
                        Value::Tuple(vec![key, self.eval(v, frame)?])
                    }
                };
                out.push(item);
                Ok(())
            }
            Some((Clause::For { target, iter }, rest)) => {
                let items = ops::iterate(&self.eval(iter, frame)?)?;
                for item in items {
                    self.tick()?;
                    self.assign(target, item, frame)?;
                    self.comprehend(rest, produce, frame, out)?;
                }
                Ok(())
            }
            Some((Clause::If(test), rest)) => {
                if self.eval(test, frame)?.is_truthy() {
                    self.comprehend(rest, produce, frame, out)?;
                }
                Ok(())
            }
        }
    }
}

fn target_names(target: &Target, out: &mut Vec<String>) {
    match target {
        Target::Place { root, path } if path.is_empty() => out.push(root.clone()),
        Target::Place { .. } => {}
        Target::Unpack(items) => items.iter().for_each(|t| target_names(t, out)),
    }
}
