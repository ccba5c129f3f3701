//! Builtin functions, value methods and the `math` module
//!
//! Everything a unit can call that it did not define itself ends up here.
//! Builtins receive the running [`Machine`] so higher-order ones (`sorted`
//! with a key, `map`, `filter`) can call back into unit code under the same
//! step and depth budget.

use crate::ast::BinOp;
use crate::error::RuntimeFault;
use crate::interp::Machine;
use crate::ops::{self, as_f64, py_cmp, py_eq, Eval};
use generative_artifact::{Callable, Value};
use std::cmp::Ordering;
use std::f64::consts;

type Kwargs = Vec<(String, Value)>;

/// Builtins with an implementation; the policy decides which are reachable
const IMPLEMENTED: &[&str] = &[
    "abs", "all", "any", "bool", "chr", "dict", "divmod", "enumerate", "filter", "float", "int",
    "len", "list", "map", "max", "min", "ord", "pow", "range", "reversed", "round", "sorted",
    "str", "sum", "tuple", "zip",
];

/// Methods that change their receiver in place
const MUTATING: &[&str] = &[
    "append", "clear", "extend", "insert", "pop", "remove", "reverse", "setdefault", "sort",
    "update",
];

const MATH_CONSTANTS: &[(&str, f64)] = &[
    ("pi", consts::PI),
    ("e", consts::E),
    ("tau", consts::TAU),
    ("inf", f64::INFINITY),
    ("nan", f64::NAN),
];

const MATH_FUNCTIONS: &[&str] = &[
    "atan", "atan2", "ceil", "cos", "degrees", "exp", "fabs", "factorial", "floor", "gcd", "hypot",
    "isfinite", "isinf", "isnan", "isqrt", "log", "log10", "log2", "pow", "radians", "sin", "sqrt",
    "tan", "trunc",
];

#[must_use]
pub(crate) fn exists(name: &str) -> bool {
    IMPLEMENTED.contains(&name)
}

#[must_use]
pub(crate) fn is_mutating(method: &str) -> bool {
    MUTATING.contains(&method)
}

#[must_use]
pub(crate) fn module_exists(module: &str) -> bool {
    module == "math"
}

/// Attribute of an importable module
pub(crate) fn module_attr(module: &str, attr: &str) -> Eval<Value> {
    if !module_exists(module) {
        return Err(RuntimeFault::raised(
            "ModuleNotFoundError",
            format!("No module named '{module}'"),
        ));
    }
    if let Some((_, value)) = MATH_CONSTANTS.iter().find(|(name, _)| *name == attr) {
        return Ok(Value::Float(*value));
    }
    if MATH_FUNCTIONS.contains(&attr) {
        return Ok(Value::Callable(Callable::Builtin(format!("{module}.{attr}"))));
    }
    Err(RuntimeFault::raised(
        "AttributeError",
        format!("module '{module}' has no attribute '{attr}'"),
    ))
}

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> Eval<()> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            format!("exactly {min}")
        } else if args.len() < min {
            format!("at least {min}")
        } else {
            format!("at most {max}")
        };
        return Err(RuntimeFault::type_error(format!(
            "{name}() takes {expected} arguments ({} given)",
            args.len()
        )));
    }
    Ok(())
}

fn take_kwarg(kwargs: &mut Kwargs, key: &str) -> Option<Value> {
    let at = kwargs.iter().position(|(k, _)| k == key)?;
    Some(kwargs.remove(at).1)
}

fn no_kwargs(name: &str, kwargs: &Kwargs) -> Eval<()> {
    match kwargs.first() {
        Some((key, _)) => Err(RuntimeFault::type_error(format!(
            "{name}() got an unexpected keyword argument '{key}'"
        ))),
        None => Ok(()),
    }
}

fn int_arg(name: &str, v: &Value) -> Eval<i64> {
    match v {
        Value::Int(i) => Ok(*i),
        Value::Bool(b) => Ok(i64::from(*b)),
        other => Err(RuntimeFault::type_error(format!(
            "{name}() argument must be int, not '{}'",
            other.type_name()
        ))),
    }
}

fn float_arg(name: &str, v: &Value) -> Eval<f64> {
    as_f64(v).ok_or_else(|| {
        RuntimeFault::type_error(format!(
            "{name}() argument must be a real number, not '{}'",
            v.type_name()
        ))
    })
}

/// Total order for sorting and extremes; NaN compares equal
fn order(a: &Value, b: &Value) -> Eval<Ordering> {
    Ok(py_cmp(a, b)?.unwrap_or(Ordering::Equal))
}

fn apply_key(m: &mut Machine<'_>, key: Option<&Value>, item: &Value) -> Eval<Value> {
    match key {
        Some(Value::None) | None => Ok(item.clone()),
        Some(f) => m.call_value(f, vec![item.clone()], Vec::new()),
    }
}

/// Stable sort of `items` by optional key function
fn sort_values(
    m: &mut Machine<'_>,
    items: Vec<Value>,
    key: Option<&Value>,
    reverse: bool,
) -> Eval<Vec<Value>> {
    let mut keys = Vec::with_capacity(items.len());
    for item in &items {
        m.tick()?;
        keys.push(apply_key(m, key, item)?);
    }

    let mut positions: Vec<usize> = (0..items.len()).collect();
    let mut failure = None;
    positions.sort_by(|&a, &b| match order(&keys[a], &keys[b]) {
        Ok(o) if reverse => o.reverse(),
        Ok(o) => o,
        Err(e) => {
            failure.get_or_insert(e);
            Ordering::Equal
        }
    });
    if let Some(e) = failure {
        return Err(e);
    }

    let mut slots: Vec<Option<Value>> = items.into_iter().map(Some).collect();
    Ok(positions
        .into_iter()
        .filter_map(|i| slots[i].take())
        .collect())
}

/// Call a builtin or module function by its qualified name
#[allow(clippy::too_many_lines)]
pub(crate) fn call_builtin(
    m: &mut Machine<'_>,
    name: &str,
    args: Vec<Value>,
    mut kwargs: Kwargs,
) -> Eval<Value> {
    m.tick()?;
    if let Some(function) = name.strip_prefix("math.") {
        no_kwargs(name, &kwargs)?;
        return math_call(function, &args);
    }

    match name {
        "abs" => {
            no_kwargs(name, &kwargs)?;
            arity(name, &args, 1, 1)?;
            match &args[0] {
                Value::Int(i) => i.checked_abs().map(Value::Int).ok_or_else(RuntimeFault::overflow),
                Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
                Value::Float(f) => Ok(Value::Float(f.abs())),
                other => Err(RuntimeFault::type_error(format!(
                    "bad operand type for abs(): '{}'",
                    other.type_name()
                ))),
            }
        }
        "all" | "any" => {
            no_kwargs(name, &kwargs)?;
            arity(name, &args, 1, 1)?;
            let items = ops::iterate(&args[0])?;
            let result = if name == "all" {
                items.iter().all(Value::is_truthy)
            } else {
                items.iter().any(Value::is_truthy)
            };
            Ok(Value::Bool(result))
        }
        "bool" => {
            no_kwargs(name, &kwargs)?;
            arity(name, &args, 0, 1)?;
            Ok(Value::Bool(args.first().is_some_and(Value::is_truthy)))
        }
        "chr" => {
            no_kwargs(name, &kwargs)?;
            arity(name, &args, 1, 1)?;
            let code = int_arg(name, &args[0])?;
            u32::try_from(code)
                .ok()
                .and_then(char::from_u32)
                .map(|c| Value::Str(c.to_string()))
                .ok_or_else(|| RuntimeFault::value_error("chr() arg not in range(0x110000)"))
        }
        "dict" => {
            arity(name, &args, 0, 1)?;
            let mut entries = match args.into_iter().next() {
                None => Vec::new(),
                Some(Value::Dict(entries)) => entries,
                Some(other) => {
                    let mut entries = Vec::new();
                    for pair in ops::iterate(&other)? {
                        let mut kv = ops::iterate(&pair)?;
                        if kv.len() != 2 {
                            return Err(RuntimeFault::value_error(format!(
                                "dictionary update sequence element has length {}; 2 is required",
                                kv.len()
                            )));
                        }
                        let value = kv.pop().unwrap_or_default();
                        let key = kv.pop().unwrap_or_default();
                        ops::ensure_hashable(&key)?;
                        ops::dict_insert(&mut entries, key, value);
                    }
                    entries
                }
            };
            for (key, value) in kwargs {
                ops::dict_insert(&mut entries, Value::Str(key), value);
            }
            m.check_len(entries.len())?;
            Ok(Value::Dict(entries))
        }
        "divmod" => {
            no_kwargs(name, &kwargs)?;
            arity(name, &args, 2, 2)?;
            let max_len = m.max_len();
            let q = ops::binary(BinOp::FloorDiv, &args[0], &args[1], max_len)?;
            let r = ops::binary(BinOp::Mod, &args[0], &args[1], max_len)?;
            Ok(Value::Tuple(vec![q, r]))
        }
        "enumerate" => {
            arity(name, &args, 1, 2)?;
            let start = match args.get(1).cloned().or_else(|| take_kwarg(&mut kwargs, "start")) {
                Some(v) => int_arg(name, &v)?,
                None => 0,
            };
            no_kwargs(name, &kwargs)?;
            let mut out = Vec::new();
            for (offset, item) in (0_i64..).zip(ops::iterate(&args[0])?) {
                let index = start.checked_add(offset).ok_or_else(RuntimeFault::overflow)?;
                out.push(Value::Tuple(vec![Value::Int(index), item]));
            }
            Ok(Value::List(out))
        }
        "filter" => {
            no_kwargs(name, &kwargs)?;
            arity(name, &args, 2, 2)?;
            let mut out = Vec::new();
            for item in ops::iterate(&args[1])? {
                let keep = match &args[0] {
                    Value::None => item.is_truthy(),
                    f => m.call_value(f, vec![item.clone()], Vec::new())?.is_truthy(),
                };
                if keep {
                    out.push(item);
                }
            }
            Ok(Value::List(out))
        }
        "float" => {
            no_kwargs(name, &kwargs)?;
            arity(name, &args, 0, 1)?;
            match args.first() {
                None => Ok(Value::Float(0.0)),
                Some(Value::Str(s)) => without_separators(s.trim())
                    .and_then(|digits| digits.parse::<f64>().ok())
                    .map(Value::Float)
                    .ok_or_else(|| {
                        RuntimeFault::value_error(format!(
                            "could not convert string to float: {}",
                            Value::Str(s.clone()).repr()
                        ))
                    }),
                Some(v) => float_arg(name, v).map(Value::Float),
            }
        }
        "int" => {
            arity(name, &args, 0, 2)?;
            let base = match args.get(1).cloned().or_else(|| take_kwarg(&mut kwargs, "base")) {
                Some(v) => Some(int_arg(name, &v)?),
                None => None,
            };
            no_kwargs(name, &kwargs)?;
            to_int(args.first(), base)
        }
        "len" => {
            no_kwargs(name, &kwargs)?;
            arity(name, &args, 1, 1)?;
            let len = match &args[0] {
                Value::Str(s) => s.chars().count(),
                Value::List(items) | Value::Tuple(items) => items.len(),
                Value::Dict(entries) => entries.len(),
                other => {
                    return Err(RuntimeFault::type_error(format!(
                        "object of type '{}' has no len()",
                        other.type_name()
                    )))
                }
            };
            i64::try_from(len).map(Value::Int).map_err(|_| RuntimeFault::overflow())
        }
        "list" | "tuple" => {
            no_kwargs(name, &kwargs)?;
            arity(name, &args, 0, 1)?;
            let items = match args.first() {
                Some(v) => ops::iterate(v)?,
                None => Vec::new(),
            };
            Ok(if name == "list" {
                Value::List(items)
            } else {
                Value::Tuple(items)
            })
        }
        "map" => {
            no_kwargs(name, &kwargs)?;
            if args.len() < 2 {
                return Err(RuntimeFault::type_error(
                    "map() must have at least two arguments.",
                ));
            }
            let mut args = args.into_iter();
            let func = args.next().unwrap_or_default();
            let columns = args
                .map(|v| ops::iterate(&v))
                .collect::<Eval<Vec<_>>>()?;
            let rows = columns.iter().map(Vec::len).min().unwrap_or(0);
            let mut out = Vec::with_capacity(rows);
            for row in 0..rows {
                let call_args = columns.iter().map(|c| c[row].clone()).collect();
                out.push(m.call_value(&func, call_args, Vec::new())?);
            }
            Ok(Value::List(out))
        }
        "max" | "min" => extreme(m, name, args, kwargs),
        "ord" => {
            no_kwargs(name, &kwargs)?;
            arity(name, &args, 1, 1)?;
            let Value::Str(s) = &args[0] else {
                return Err(RuntimeFault::type_error(format!(
                    "ord() expected string of length 1, but {} found",
                    args[0].type_name()
                )));
            };
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(Value::Int(i64::from(u32::from(c)))),
                _ => Err(RuntimeFault::type_error(format!(
                    "ord() expected a character, but string of length {} found",
                    s.chars().count()
                ))),
            }
        }
        "pow" => {
            no_kwargs(name, &kwargs)?;
            arity(name, &args, 2, 3)?;
            match args.get(2) {
                None => ops::binary(BinOp::Pow, &args[0], &args[1], m.max_len()),
                Some(modulus) => {
                    let base = int_arg(name, &args[0])?;
                    let exp = int_arg(name, &args[1])?;
                    let modulus = int_arg(name, modulus)?;
                    mod_pow(base, exp, modulus).map(Value::Int)
                }
            }
        }
        "range" => {
            no_kwargs(name, &kwargs)?;
            arity(name, &args, 1, 3)?;
            let ints = args
                .iter()
                .map(|v| int_arg(name, v))
                .collect::<Eval<Vec<_>>>()?;
            let (start, stop, step) = match ints.as_slice() {
                [stop] => (0, *stop, 1),
                [start, stop] => (*start, *stop, 1),
                [start, stop, step, ..] => (*start, *stop, *step),
                [] => (0, 0, 1),
            };
            range(m, start, stop, step)
        }
        "reversed" => {
            no_kwargs(name, &kwargs)?;
            arity(name, &args, 1, 1)?;
            let mut items = ops::iterate(&args[0])?;
            items.reverse();
            Ok(Value::List(items))
        }
        "round" => {
            arity(name, &args, 1, 2)?;
            let digits = args.get(1).cloned().or_else(|| take_kwarg(&mut kwargs, "ndigits"));
            no_kwargs(name, &kwargs)?;
            round(&args[0], digits.as_ref())
        }
        "sorted" => {
            arity(name, &args, 1, 1)?;
            let key = take_kwarg(&mut kwargs, "key");
            let reverse = take_kwarg(&mut kwargs, "reverse").is_some_and(|v| v.is_truthy());
            no_kwargs(name, &kwargs)?;
            let items = ops::iterate(&args[0])?;
            sort_values(m, items, key.as_ref(), reverse).map(Value::List)
        }
        "str" => {
            no_kwargs(name, &kwargs)?;
            arity(name, &args, 0, 1)?;
            let text = args.first().map(ToString::to_string).unwrap_or_default();
            m.check_len(text.len())?;
            Ok(Value::Str(text))
        }
        "sum" => {
            arity(name, &args, 1, 2)?;
            let start = args
                .get(1)
                .cloned()
                .or_else(|| take_kwarg(&mut kwargs, "start"))
                .unwrap_or(Value::Int(0));
            no_kwargs(name, &kwargs)?;
            if matches!(start, Value::Str(_)) {
                return Err(RuntimeFault::type_error(
                    "sum() can't sum strings [use ''.join(seq) instead]",
                ));
            }
            let max_len = m.max_len();
            ops::iterate(&args[0])?
                .iter()
                .try_fold(start, |acc, item| ops::binary(BinOp::Add, &acc, item, max_len))
        }
        "zip" => {
            no_kwargs(name, &kwargs)?;
            let columns = args
                .iter()
                .map(ops::iterate)
                .collect::<Eval<Vec<_>>>()?;
            let rows = columns.iter().map(Vec::len).min().unwrap_or(0);
            Ok(Value::List(
                (0..rows)
                    .map(|row| Value::Tuple(columns.iter().map(|c| c[row].clone()).collect()))
                    .collect(),
            ))
        }
        _ => Err(RuntimeFault::name_error(name)),
    }
}

fn extreme(m: &mut Machine<'_>, name: &str, args: Vec<Value>, mut kwargs: Kwargs) -> Eval<Value> {
    let key = take_kwarg(&mut kwargs, "key");
    let default = take_kwarg(&mut kwargs, "default");
    no_kwargs(name, &kwargs)?;
    let items = match args.len() {
        0 => {
            return Err(RuntimeFault::type_error(format!(
                "{name} expected at least 1 argument, got 0"
            )))
        }
        1 => ops::iterate(&args[0])?,
        _ => args,
    };
    let wanted = if name == "max" {
        Ordering::Greater
    } else {
        Ordering::Less
    };

    let mut best: Option<(Value, Value)> = None;
    for item in items {
        let k = apply_key(m, key.as_ref(), &item)?;
        let replace = match &best {
            None => true,
            Some((_, best_key)) => order(&k, best_key)? == wanted,
        };
        if replace {
            best = Some((item, k));
        }
    }
    match (best, default) {
        (Some((item, _)), _) => Ok(item),
        (None, Some(default)) => Ok(default),
        (None, None) => Err(RuntimeFault::value_error(format!(
            "{name}() arg is an empty sequence"
        ))),
    }
}

fn range(m: &Machine<'_>, start: i64, stop: i64, step: i64) -> Eval<Value> {
    if step == 0 {
        return Err(RuntimeFault::value_error("range() arg 3 must not be zero"));
    }
    let span = if step > 0 {
        i128::from(stop) - i128::from(start)
    } else {
        i128::from(start) - i128::from(stop)
    };
    let count = if span <= 0 {
        0
    } else {
        let step = i128::from(step).abs();
        usize::try_from((span + step - 1) / step).unwrap_or(usize::MAX)
    };
    m.check_len(count)?;

    let mut out = Vec::with_capacity(count);
    let mut current = start;
    for _ in 0..count {
        out.push(Value::Int(current));
        current = current.saturating_add(step);
    }
    Ok(Value::List(out))
}

fn mod_pow(base: i64, exp: i64, modulus: i64) -> Eval<i64> {
    if modulus == 0 {
        return Err(RuntimeFault::value_error("pow() 3rd argument cannot be 0"));
    }
    if exp < 0 {
        return Err(RuntimeFault::value_error(
            "pow() 2nd argument cannot be negative when 3rd argument specified",
        ));
    }
    let m = i128::from(modulus);
    let mut result: i128 = 1;
    let mut b = i128::from(base).rem_euclid(m);
    let mut e = exp;
    while e > 0 {
        if e & 1 == 1 {
            result = (result * b).rem_euclid(m);
        }
        b = (b * b).rem_euclid(m);
        e >>= 1;
    }
    // Result takes the sign of the modulus
    let result = if modulus < 0 && result > 0 { result + m } else { result };
    i64::try_from(result).map_err(|_| RuntimeFault::overflow())
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn to_int(value: Option<&Value>, base: Option<i64>) -> Eval<Value> {
    let Some(value) = value else {
        return Ok(Value::Int(0));
    };
    if base.is_some() && !matches!(value, Value::Str(_)) {
        return Err(RuntimeFault::type_error(
            "int() can't convert non-string with explicit base",
        ));
    }
    match value {
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Float(f) => {
            if f.is_nan() {
                return Err(RuntimeFault::value_error("cannot convert float NaN to integer"));
            }
            if f.is_infinite() {
                return Err(RuntimeFault::raised(
                    "OverflowError",
                    "cannot convert float infinity to integer",
                ));
            }
            let truncated = f.trunc();
            if truncated < i64::MIN as f64 || truncated >= i64::MAX as f64 {
                return Err(RuntimeFault::overflow());
            }
            Ok(Value::Int(truncated as i64))
        }
        Value::Str(s) => {
            let radix = base.unwrap_or(10);
            let invalid = || {
                RuntimeFault::value_error(format!(
                    "invalid literal for int() with base {radix}: {}",
                    Value::Str(s.clone()).repr()
                ))
            };
            let radix = u32::try_from(radix)
                .ok()
                .filter(|r| (2..=36).contains(r))
                .ok_or_else(|| RuntimeFault::value_error("int() base must be >= 2 and <= 36"))?;
            let digits = without_separators(s.trim()).ok_or_else(invalid)?;
            i64::from_str_radix(&digits, radix)
                .map(Value::Int)
                .map_err(|_| invalid())
        }
        other => Err(RuntimeFault::type_error(format!(
            "int() argument must be a string or a real number, not '{}'",
            other.type_name()
        ))),
    }
}

/// Drop `_` digit separators, which may only sit between two digits
fn without_separators(text: &str) -> Option<String> {
    let chars: Vec<char> = text.chars().collect();
    for (i, c) in chars.iter().enumerate() {
        if *c != '_' {
            continue;
        }
        let between_digits = i > 0
            && chars[i - 1].is_ascii_alphanumeric()
            && chars.get(i + 1).is_some_and(char::is_ascii_alphanumeric);
        if !between_digits {
            return None;
        }
    }
    Some(chars.into_iter().filter(|c| *c != '_').collect())
}

/// Round half to even, like the unit language's `round`
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn round(value: &Value, digits: Option<&Value>) -> Eval<Value> {
    let digits = match digits {
        None | Some(Value::None) => None,
        Some(v) => Some(int_arg("round", v)?),
    };
    match (value, digits) {
        (Value::Int(i), None) => Ok(Value::Int(*i)),
        (Value::Bool(b), None) => Ok(Value::Int(i64::from(*b))),
        (Value::Int(i), Some(d)) if d >= 0 => Ok(Value::Int(*i)),
        (Value::Int(i), Some(d)) => {
            let factor = u32::try_from(-d)
                .ok()
                .and_then(|p| 10_i64.checked_pow(p));
            let Some(factor) = factor else {
                return Ok(Value::Int(0));
            };
            let scaled = (*i as f64 / factor as f64).round_ties_even() as i64;
            scaled
                .checked_mul(factor)
                .map(Value::Int)
                .ok_or_else(RuntimeFault::overflow)
        }
        (Value::Float(f), None) => {
            if !f.is_finite() {
                return Err(RuntimeFault::value_error("cannot round non-finite float"));
            }
            let rounded = f.round_ties_even();
            if rounded < i64::MIN as f64 || rounded >= i64::MAX as f64 {
                return Err(RuntimeFault::overflow());
            }
            Ok(Value::Int(rounded as i64))
        }
        (Value::Float(f), Some(d)) => {
            let exp = i32::try_from(d.clamp(-308, 308)).unwrap_or(0);
            let factor = 10_f64.powi(exp);
            Ok(Value::Float((f * factor).round_ties_even() / factor))
        }
        (other, _) => Err(RuntimeFault::type_error(format!(
            "type {} doesn't define __round__ method",
            other.type_name()
        ))),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn math_call(function: &str, args: &[Value]) -> Eval<Value> {
    let name = format!("math.{function}");
    let unary = |f: fn(f64) -> f64| -> Eval<Value> {
        arity(&name, args, 1, 1)?;
        Ok(Value::Float(f(float_arg(&name, &args[0])?)))
    };
    let domain = || RuntimeFault::value_error("math domain error");

    match function {
        "sqrt" => {
            arity(&name, args, 1, 1)?;
            let x = float_arg(&name, &args[0])?;
            if x < 0.0 {
                return Err(domain());
            }
            Ok(Value::Float(x.sqrt()))
        }
        "floor" | "ceil" | "trunc" => {
            arity(&name, args, 1, 1)?;
            if let Value::Int(i) = &args[0] {
                return Ok(Value::Int(*i));
            }
            let x = float_arg(&name, &args[0])?;
            let rounded = match function {
                "floor" => x.floor(),
                "ceil" => x.ceil(),
                _ => x.trunc(),
            };
            if rounded.is_nan() {
                return Err(RuntimeFault::value_error("cannot convert float NaN to integer"));
            }
            if rounded.is_infinite() {
                return Err(RuntimeFault::raised(
                    "OverflowError",
                    "cannot convert float infinity to integer",
                ));
            }
            if rounded < i64::MIN as f64 || rounded >= i64::MAX as f64 {
                return Err(RuntimeFault::overflow());
            }
            Ok(Value::Int(rounded as i64))
        }
        "fabs" => unary(f64::abs),
        "exp" => unary(f64::exp),
        "sin" => unary(f64::sin),
        "cos" => unary(f64::cos),
        "tan" => unary(f64::tan),
        "atan" => unary(f64::atan),
        "degrees" => unary(f64::to_degrees),
        "radians" => unary(f64::to_radians),
        "pow" => {
            arity(&name, args, 2, 2)?;
            let base = float_arg(&name, &args[0])?;
            let exp = float_arg(&name, &args[1])?;
            Ok(Value::Float(base.powf(exp)))
        }
        "atan2" | "hypot" => {
            arity(&name, args, 2, 2)?;
            let a = float_arg(&name, &args[0])?;
            let b = float_arg(&name, &args[1])?;
            Ok(Value::Float(if function == "atan2" {
                a.atan2(b)
            } else {
                a.hypot(b)
            }))
        }
        "log" => {
            arity(&name, args, 1, 2)?;
            let x = float_arg(&name, &args[0])?;
            if x <= 0.0 {
                return Err(domain());
            }
            match args.get(1) {
                None => Ok(Value::Float(x.ln())),
                Some(base) => {
                    let base = float_arg(&name, base)?;
                    if base <= 0.0 || base == 1.0 {
                        return Err(domain());
                    }
                    Ok(Value::Float(x.ln() / base.ln()))
                }
            }
        }
        "log2" | "log10" => {
            arity(&name, args, 1, 1)?;
            let x = float_arg(&name, &args[0])?;
            if x <= 0.0 {
                return Err(domain());
            }
            Ok(Value::Float(if function == "log2" {
                x.log2()
            } else {
                x.log10()
            }))
        }
        "isfinite" | "isinf" | "isnan" => {
            arity(&name, args, 1, 1)?;
            let x = float_arg(&name, &args[0])?;
            Ok(Value::Bool(match function {
                "isfinite" => x.is_finite(),
                "isinf" => x.is_infinite(),
                _ => x.is_nan(),
            }))
        }
        "gcd" => {
            let mut acc: i64 = 0;
            for arg in args {
                let mut a = int_arg(&name, arg)?.checked_abs().ok_or_else(RuntimeFault::overflow)?;
                let mut b = acc;
                while b != 0 {
                    (a, b) = (b, a % b);
                }
                acc = a;
            }
            Ok(Value::Int(acc))
        }
        "factorial" => {
            arity(&name, args, 1, 1)?;
            let n = int_arg(&name, &args[0])?;
            if n < 0 {
                return Err(RuntimeFault::value_error(
                    "factorial() not defined for negative values",
                ));
            }
            (1..=n)
                .try_fold(1_i64, i64::checked_mul)
                .map(Value::Int)
                .ok_or_else(RuntimeFault::overflow)
        }
        "isqrt" => {
            arity(&name, args, 1, 1)?;
            let n = int_arg(&name, &args[0])?;
            if n < 0 {
                return Err(RuntimeFault::value_error(
                    "isqrt() argument must be nonnegative",
                ));
            }
            let mut root = (n as f64).sqrt() as i64;
            while root.checked_mul(root).map_or(true, |sq| sq > n) {
                root -= 1;
            }
            while (root + 1).checked_mul(root + 1).is_some_and(|sq| sq <= n) {
                root += 1;
            }
            Ok(Value::Int(root))
        }
        _ => Err(RuntimeFault::raised(
            "AttributeError",
            format!("module 'math' has no attribute '{function}'"),
        )),
    }
}

/// Call `receiver.name(args)`; mutating methods change `receiver` in place
pub(crate) fn call_method(
    m: &mut Machine<'_>,
    receiver: &mut Value,
    name: &str,
    args: Vec<Value>,
    kwargs: Kwargs,
) -> Eval<Value> {
    m.tick()?;
    match receiver {
        Value::Str(s) => {
            no_kwargs(name, &kwargs)?;
            str_method(m, s, name, &args)
        }
        Value::List(items) => list_method(m, items, name, args, kwargs),
        Value::Tuple(items) => {
            no_kwargs(name, &kwargs)?;
            match name {
                "index" | "count" => sequence_query(items, name, &args, "tuple"),
                _ => Err(RuntimeFault::attribute_error("tuple", name)),
            }
        }
        Value::Dict(entries) => {
            let max_len = m.max_len();
            dict_method(entries, name, args, kwargs, max_len)
        }
        other => Err(RuntimeFault::attribute_error(other.type_name(), name)),
    }
}

fn sequence_query(items: &[Value], name: &str, args: &[Value], type_name: &str) -> Eval<Value> {
    arity(name, args, 1, 1)?;
    let needle = &args[0];
    if name == "count" {
        let n = items.iter().filter(|v| py_eq(v, needle)).count();
        return i64::try_from(n).map(Value::Int).map_err(|_| RuntimeFault::overflow());
    }
    items
        .iter()
        .position(|v| py_eq(v, needle))
        .and_then(|i| i64::try_from(i).ok())
        .map(Value::Int)
        .ok_or_else(|| RuntimeFault::value_error(format!("{type_name}.index(x): x not in {type_name}")))
}

fn list_method(
    m: &mut Machine<'_>,
    items: &mut Vec<Value>,
    name: &str,
    args: Vec<Value>,
    mut kwargs: Kwargs,
) -> Eval<Value> {
    if name == "sort" {
        arity(name, &args, 0, 0)?;
        let key = take_kwarg(&mut kwargs, "key");
        let reverse = take_kwarg(&mut kwargs, "reverse").is_some_and(|v| v.is_truthy());
        no_kwargs(name, &kwargs)?;
        let sorted = sort_values(m, std::mem::take(items), key.as_ref(), reverse)?;
        *items = sorted;
        return Ok(Value::None);
    }
    no_kwargs(name, &kwargs)?;

    match name {
        "append" => {
            arity(name, &args, 1, 1)?;
            m.check_len(items.len() + 1)?;
            items.extend(args);
            Ok(Value::None)
        }
        "extend" => {
            arity(name, &args, 1, 1)?;
            let extra = ops::iterate(&args[0])?;
            m.check_len(items.len() + extra.len())?;
            items.extend(extra);
            Ok(Value::None)
        }
        "insert" => {
            arity(name, &args, 2, 2)?;
            m.check_len(items.len() + 1)?;
            let len = i64::try_from(items.len()).map_err(|_| RuntimeFault::overflow())?;
            let at = int_arg(name, &args[0])?;
            let at = if at < 0 { (at + len).max(0) } else { at.min(len) };
            let at = usize::try_from(at).unwrap_or(0);
            let mut args = args;
            items.insert(at, args.pop().unwrap_or_default());
            Ok(Value::None)
        }
        "pop" => {
            arity(name, &args, 0, 1)?;
            if items.is_empty() {
                return Err(RuntimeFault::index_error("pop from empty list"));
            }
            let index = match args.first() {
                Some(v) => int_arg(name, v)?,
                None => -1,
            };
            let at = ops::normalize_index(index, items.len())
                .ok_or_else(|| RuntimeFault::index_error("pop index out of range"))?;
            Ok(items.remove(at))
        }
        "remove" => {
            arity(name, &args, 1, 1)?;
            let at = items
                .iter()
                .position(|v| py_eq(v, &args[0]))
                .ok_or_else(|| RuntimeFault::value_error("list.remove(x): x not in list"))?;
            items.remove(at);
            Ok(Value::None)
        }
        "reverse" => {
            arity(name, &args, 0, 0)?;
            items.reverse();
            Ok(Value::None)
        }
        "clear" => {
            arity(name, &args, 0, 0)?;
            items.clear();
            Ok(Value::None)
        }
        "copy" => {
            arity(name, &args, 0, 0)?;
            Ok(Value::List(items.clone()))
        }
        "index" | "count" => sequence_query(items, name, &args, "list"),
        _ => Err(RuntimeFault::attribute_error("list", name)),
    }
}

fn dict_method(
    entries: &mut Vec<(Value, Value)>,
    name: &str,
    args: Vec<Value>,
    kwargs: Kwargs,
    max_len: usize,
) -> Eval<Value> {
    if name != "update" {
        no_kwargs(name, &kwargs)?;
    }
    match name {
        "get" => {
            arity(name, &args, 1, 2)?;
            ops::ensure_hashable(&args[0])?;
            Ok(ops::dict_lookup(entries, &args[0])
                .cloned()
                .or_else(|| args.get(1).cloned())
                .unwrap_or_default())
        }
        "keys" => {
            arity(name, &args, 0, 0)?;
            Ok(Value::List(entries.iter().map(|(k, _)| k.clone()).collect()))
        }
        "values" => {
            arity(name, &args, 0, 0)?;
            Ok(Value::List(entries.iter().map(|(_, v)| v.clone()).collect()))
        }
        "items" => {
            arity(name, &args, 0, 0)?;
            Ok(Value::List(
                entries
                    .iter()
                    .map(|(k, v)| Value::Tuple(vec![k.clone(), v.clone()]))
                    .collect(),
            ))
        }
        "update" => {
            arity(name, &args, 0, 1)?;
            if let Some(other) = args.first() {
                let pairs = match other {
                    Value::Dict(other) => other.clone(),
                    other => {
                        let mut pairs = Vec::new();
                        for pair in ops::iterate(other)? {
                            let mut kv = ops::iterate(&pair)?;
                            if kv.len() != 2 {
                                return Err(RuntimeFault::value_error(
                                    "dictionary update sequence element has wrong length",
                                ));
                            }
                            let value = kv.pop().unwrap_or_default();
                            let key = kv.pop().unwrap_or_default();
                            pairs.push((key, value));
                        }
                        pairs
                    }
                };
                for (key, value) in pairs {
                    ops::ensure_hashable(&key)?;
                    ops::dict_insert(entries, key, value);
                }
            }
            for (key, value) in kwargs {
                ops::dict_insert(entries, Value::Str(key), value);
            }
            ops::check_len(entries.len(), max_len)?;
            Ok(Value::None)
        }
        "pop" => {
            arity(name, &args, 1, 2)?;
            ops::ensure_hashable(&args[0])?;
            match entries.iter().position(|(k, _)| py_eq(k, &args[0])) {
                Some(at) => Ok(entries.remove(at).1),
                None => args
                    .get(1)
                    .cloned()
                    .ok_or_else(|| RuntimeFault::key_error(&args[0])),
            }
        }
        "setdefault" => {
            arity(name, &args, 1, 2)?;
            ops::ensure_hashable(&args[0])?;
            if let Some(existing) = ops::dict_lookup(entries, &args[0]) {
                return Ok(existing.clone());
            }
            ops::check_len(entries.len() + 1, max_len)?;
            let value = args.get(1).cloned().unwrap_or_default();
            entries.push((args[0].clone(), value.clone()));
            Ok(value)
        }
        "copy" => {
            arity(name, &args, 0, 0)?;
            Ok(Value::Dict(entries.clone()))
        }
        "clear" => {
            arity(name, &args, 0, 0)?;
            entries.clear();
            Ok(Value::None)
        }
        _ => Err(RuntimeFault::attribute_error("dict", name)),
    }
}

fn str_arg<'v>(name: &str, v: &'v Value) -> Eval<&'v str> {
    v.as_str().ok_or_else(|| {
        RuntimeFault::type_error(format!(
            "{name}() argument must be str, not {}",
            v.type_name()
        ))
    })
}

fn char_count_index(s: &str, byte_index: usize) -> Value {
    let chars = s[..byte_index].chars().count();
    Value::Int(i64::try_from(chars).unwrap_or(i64::MAX))
}

#[allow(clippy::too_many_lines)]
fn str_method(m: &Machine<'_>, s: &str, name: &str, args: &[Value]) -> Eval<Value> {
    let text = |out: String| -> Eval<Value> {
        m.check_len(out.len())?;
        Ok(Value::Str(out))
    };
    let predicate = |f: fn(char) -> bool| -> Eval<Value> {
        arity(name, args, 0, 0)?;
        Ok(Value::Bool(!s.is_empty() && s.chars().all(f)))
    };
    let strip_chars = |args: &[Value]| -> Eval<Option<Vec<char>>> {
        arity(name, args, 0, 1)?;
        match args.first() {
            None | Some(Value::None) => Ok(None),
            Some(v) => Ok(Some(str_arg(name, v)?.chars().collect())),
        }
    };

    match name {
        "upper" => text(s.to_uppercase()),
        "lower" => text(s.to_lowercase()),
        "strip" | "lstrip" | "rstrip" => {
            let chars = strip_chars(args)?;
            let matches = |c: char| match &chars {
                Some(set) => set.contains(&c),
                None => c.is_whitespace(),
            };
            let out = match name {
                "strip" => s.trim_matches(matches),
                "lstrip" => s.trim_start_matches(matches),
                _ => s.trim_end_matches(matches),
            };
            text(out.to_string())
        }
        "split" => {
            arity(name, args, 0, 2)?;
            let limit = match args.get(1) {
                Some(v) => int_arg(name, v)?,
                None => -1,
            };
            let limit = usize::try_from(limit).ok();
            let parts: Vec<Value> = match args.first() {
                None | Some(Value::None) => match limit {
                    Some(n) => split_whitespace_n(s, n),
                    None => s.split_whitespace().map(|p| Value::Str(p.to_string())).collect(),
                },
                Some(sep) => {
                    let sep = str_arg(name, sep)?;
                    if sep.is_empty() {
                        return Err(RuntimeFault::value_error("empty separator"));
                    }
                    match limit {
                        Some(n) => s
                            .splitn(n + 1, sep)
                            .map(|p| Value::Str(p.to_string()))
                            .collect(),
                        None => s.split(sep).map(|p| Value::Str(p.to_string())).collect(),
                    }
                }
            };
            Ok(Value::List(parts))
        }
        "splitlines" => {
            arity(name, args, 0, 0)?;
            Ok(Value::List(
                s.lines().map(|l| Value::Str(l.to_string())).collect(),
            ))
        }
        "join" => {
            arity(name, args, 1, 1)?;
            let mut parts = Vec::new();
            for (i, item) in ops::iterate(&args[0])?.into_iter().enumerate() {
                match item {
                    Value::Str(part) => parts.push(part),
                    other => {
                        return Err(RuntimeFault::type_error(format!(
                            "sequence item {i}: expected str instance, {} found",
                            other.type_name()
                        )))
                    }
                }
            }
            let total = parts
                .iter()
                .map(String::len)
                .fold(s.len().saturating_mul(parts.len().saturating_sub(1)), usize::saturating_add);
            m.check_len(total)?;
            text(parts.join(s))
        }
        "replace" => {
            arity(name, args, 2, 3)?;
            let from = str_arg(name, &args[0])?;
            let to = str_arg(name, &args[1])?;
            let limit = match args.get(2) {
                Some(count) => usize::try_from(int_arg(name, count)?).unwrap_or(usize::MAX),
                None => usize::MAX,
            };
            let hits = if from.is_empty() {
                s.chars().count() + 1
            } else {
                s.matches(from).count()
            }
            .min(limit);
            m.check_len(
                s.len()
                    .saturating_sub(hits.saturating_mul(from.len()))
                    .saturating_add(hits.saturating_mul(to.len())),
            )?;
            text(s.replacen(from, to, hits))
        }
        "startswith" | "endswith" => {
            arity(name, args, 1, 1)?;
            let candidates = match &args[0] {
                Value::Tuple(options) => options.clone(),
                other => vec![other.clone()],
            };
            for candidate in &candidates {
                let candidate = str_arg(name, candidate)?;
                let hit = if name == "startswith" {
                    s.starts_with(candidate)
                } else {
                    s.ends_with(candidate)
                };
                if hit {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        "find" | "index" => {
            arity(name, args, 1, 1)?;
            let needle = str_arg(name, &args[0])?;
            match s.find(needle) {
                Some(at) => Ok(char_count_index(s, at)),
                None if name == "find" => Ok(Value::Int(-1)),
                None => Err(RuntimeFault::value_error("substring not found")),
            }
        }
        "count" => {
            arity(name, args, 1, 1)?;
            let needle = str_arg(name, &args[0])?;
            let n = if needle.is_empty() {
                s.chars().count() + 1
            } else {
                s.matches(needle).count()
            };
            Ok(Value::Int(i64::try_from(n).unwrap_or(i64::MAX)))
        }
        "title" => {
            arity(name, args, 0, 0)?;
            let mut out = String::with_capacity(s.len());
            let mut boundary = true;
            for c in s.chars() {
                if c.is_alphabetic() {
                    if boundary {
                        out.extend(c.to_uppercase());
                    } else {
                        out.extend(c.to_lowercase());
                    }
                    boundary = false;
                } else {
                    out.push(c);
                    boundary = true;
                }
            }
            text(out)
        }
        "capitalize" => {
            arity(name, args, 0, 0)?;
            let mut chars = s.chars();
            let out = match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            };
            text(out)
        }
        "zfill" => {
            arity(name, args, 1, 1)?;
            let width = usize::try_from(int_arg(name, &args[0])?).unwrap_or(0);
            let len = s.chars().count();
            if width <= len {
                return text(s.to_string());
            }
            m.check_len(s.len().saturating_add(width - len))?;
            let pad = "0".repeat(width - len);
            let out = match s.strip_prefix(['+', '-']) {
                Some(rest) => format!("{}{pad}{rest}", &s[..1]),
                None => format!("{pad}{s}"),
            };
            text(out)
        }
        "isdigit" => predicate(|c| c.is_ascii_digit()),
        "isalpha" => predicate(char::is_alphabetic),
        "isalnum" => predicate(char::is_alphanumeric),
        "isspace" => predicate(char::is_whitespace),
        "isupper" | "islower" => {
            arity(name, args, 0, 0)?;
            let cased: Vec<char> = s.chars().filter(|c| c.is_alphabetic()).collect();
            let all = if name == "isupper" {
                cased.iter().all(|c| c.is_uppercase())
            } else {
                cased.iter().all(|c| c.is_lowercase())
            };
            Ok(Value::Bool(!cased.is_empty() && all))
        }
        _ => Err(RuntimeFault::attribute_error("str", name)),
    }
}

fn split_whitespace_n(s: &str, splits: usize) -> Vec<Value> {
    let mut parts = Vec::new();
    let mut rest = s.trim_start();
    while !rest.is_empty() {
        if parts.len() == splits {
            parts.push(Value::Str(rest.to_string()));
            break;
        }
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        parts.push(Value::Str(rest[..end].to_string()));
        rest = rest[end..].trim_start();
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FaultKind;
    use crate::policy::CapabilityPolicy;
    use crate::sandbox::{Interpreter, Sandbox};
    use generative_artifact::CallContext;
    use pretty_assertions::assert_eq;

    fn eval(body: &str) -> Result<Value, RuntimeFault> {
        let policy = CapabilityPolicy::default()
            .allow_builtin("divmod")
            .allow_builtin("pow")
            .allow_builtin("map")
            .allow_builtin("filter")
            .allow_builtin("chr")
            .allow_builtin("ord");
        let sandbox = Interpreter::new(policy);
        let source = format!("def snippet():\n    return {body}\n");
        let loaded = sandbox.compile(&source, "snippet", &[]).unwrap();
        sandbox.run(&loaded, &CallContext::new())
    }

    fn s(text: &str) -> Value {
        Value::from(text)
    }

    #[test]
    fn numeric_builtins() {
        assert_eq!(eval("abs(-4)").unwrap(), Value::Int(4));
        assert_eq!(eval("round(2.5)").unwrap(), Value::Int(2));
        assert_eq!(eval("round(3.5)").unwrap(), Value::Int(4));
        assert_eq!(eval("round(2.675, 1)").unwrap(), Value::Float(2.7));
        assert_eq!(eval("int('  42 ')").unwrap(), Value::Int(42));
        assert_eq!(eval("int('ff', 16)").unwrap(), Value::Int(255));
        assert_eq!(eval("int(-3.9)").unwrap(), Value::Int(-3));
        assert_eq!(eval("float('1.5')").unwrap(), Value::Float(1.5));
        assert_eq!(
            eval("divmod(-7, 2)").unwrap(),
            Value::Tuple(vec![Value::Int(-4), Value::Int(1)])
        );
        assert_eq!(eval("pow(3, 4, 5)").unwrap(), Value::Int(1));
        assert_eq!(eval("sum([1, 2, 3], 10)").unwrap(), Value::Int(16));
    }

    #[test]
    fn string_builders_refuse_oversized_results_up_front() {
        for body in [
            "'1'.zfill(10 ** 15)",
            "('a' * 1000000).replace('a', 'b' * 1000000)",
            "('a' * 1000).replace('', 'xy' * 1000)",
            "('x' * 1000).join(['a'] * 100000)",
        ] {
            let err = eval(body).unwrap_err();
            assert_eq!(err.kind, FaultKind::SizeLimit, "{body}");
        }
        assert_eq!(eval("'-7'.zfill(4)").unwrap(), s("-007"));
        assert_eq!(eval("'aaa'.replace('a', 'bc', 2)").unwrap(), s("bcbca"));
        assert_eq!(eval("'ab'.replace('', '-')").unwrap(), s("-a-b-"));
    }

    fn eval_math(body: &str) -> Result<Value, RuntimeFault> {
        let sandbox = Interpreter::new(CapabilityPolicy::default());
        let source = format!("def snippet():\n    import math\n    return {body}\n");
        let loaded = sandbox.compile(&source, "snippet", &[]).unwrap();
        sandbox.run(&loaded, &CallContext::new())
    }

    #[test]
    fn rounding_non_finite_floats_matches_python() {
        let err = eval_math("math.ceil(float('nan'))").unwrap_err();
        assert_eq!(err.kind.name(), "ValueError");
        assert_eq!(err.message, "cannot convert float NaN to integer");
        let err = eval_math("math.floor(float('inf'))").unwrap_err();
        assert_eq!(err.kind.name(), "OverflowError");
        assert_eq!(eval_math("math.ceil(2.1)").unwrap(), Value::Int(3));
    }

    #[test]
    fn digit_separators_only_between_digits() {
        assert_eq!(eval("int('1_000')").unwrap(), Value::Int(1000));
        assert_eq!(eval("int(' -1_0 ')").unwrap(), Value::Int(-10));
        assert_eq!(eval("float('1_0.5')").unwrap(), Value::Float(10.5));
        for bad in ["int('+_1')", "int('_1')", "int('1_')", "int('1__0')", "float('_1.0')"] {
            assert_eq!(eval(bad).unwrap_err().kind.name(), "ValueError", "{bad}");
        }
    }

    #[test]
    fn conversion_errors_name_the_literal() {
        let err = eval("int('abc')").unwrap_err();
        assert_eq!(err.message, "invalid literal for int() with base 10: 'abc'");
        let err = eval("max([])").unwrap_err();
        assert_eq!(err.kind.name(), "ValueError");
    }

    #[test]
    fn sequence_builtins() {
        assert_eq!(
            eval("list(range(10, 0, -3))").unwrap(),
            Value::from(vec![10, 7, 4, 1])
        );
        assert_eq!(
            eval("sorted(['b', 'a', 'c'], reverse=True)").unwrap(),
            Value::from(vec!["c", "b", "a"])
        );
        assert_eq!(
            eval("max(['aa', 'b', 'cccc'], key=len)").unwrap(),
            s("cccc")
        );
        assert_eq!(eval("min(3, 1, 2)").unwrap(), Value::Int(1));
        assert_eq!(
            eval("list(zip([1, 2, 3], 'ab'))").unwrap(),
            Value::List(vec![
                Value::Tuple(vec![Value::Int(1), s("a")]),
                Value::Tuple(vec![Value::Int(2), s("b")]),
            ])
        );
        assert_eq!(
            eval("list(map(lambda a, b: a * b, [1, 2], [3, 4]))").unwrap(),
            Value::from(vec![3, 8])
        );
        assert_eq!(
            eval("list(filter(None, [0, 1, '', 'x']))").unwrap(),
            Value::List(vec![Value::Int(1), s("x")])
        );
        assert_eq!(eval("chr(ord('a') + 1)").unwrap(), s("b"));
    }

    #[test]
    fn sorting_mixed_types_is_a_type_error() {
        let err = eval("sorted([1, 'a'])").unwrap_err();
        assert_eq!(err.kind.name(), "TypeError");
    }

    #[test]
    fn string_methods() {
        assert_eq!(eval("'  hi  '.strip()").unwrap(), s("hi"));
        assert_eq!(eval("'xxhixx'.strip('x')").unwrap(), s("hi"));
        assert_eq!(
            eval("'a,b,,c'.split(',')").unwrap(),
            Value::from(vec!["a", "b", "", "c"])
        );
        assert_eq!(
            eval("' a  b c '.split(None, 1)").unwrap(),
            Value::from(vec!["a", "b c "])
        );
        assert_eq!(eval("'-'.join(['a', 'b'])").unwrap(), s("a-b"));
        assert_eq!(eval("'hello world'.title()").unwrap(), s("Hello World"));
        assert_eq!(eval("'-42'.zfill(5)").unwrap(), s("-0042"));
        assert_eq!(eval("'héllo'.find('l')").unwrap(), Value::Int(2));
        assert_eq!(eval("'abc'.startswith(('x', 'a'))").unwrap(), Value::Bool(true));
        assert_eq!(eval("'ABC1'.isupper()").unwrap(), Value::Bool(true));
    }

    #[test]
    fn dict_methods() {
        assert_eq!(eval("{'a': 1}.get('b', 7)").unwrap(), Value::Int(7));
        assert_eq!(
            eval("{'a': 1, 'b': 2}.items()").unwrap(),
            Value::List(vec![
                Value::Tuple(vec![s("a"), Value::Int(1)]),
                Value::Tuple(vec![s("b"), Value::Int(2)]),
            ])
        );
        let err = eval("{'a': 1}.pop('z')").unwrap_err();
        assert_eq!(err.to_string(), "KeyError: 'z' (line 2)");
    }

    #[test]
    fn math_module_functions() {
        assert_eq!(module_attr("math", "pi").unwrap(), Value::Float(consts::PI));
        assert_eq!(math_call("factorial", &[Value::Int(5)]).unwrap(), Value::Int(120));
        assert_eq!(math_call("isqrt", &[Value::Int(17)]).unwrap(), Value::Int(4));
        assert_eq!(
            math_call("gcd", &[Value::Int(12), Value::Int(-18)]).unwrap(),
            Value::Int(6)
        );
        assert_eq!(
            math_call("sqrt", &[Value::Int(-1)]).unwrap_err().message,
            "math domain error"
        );
        assert!(module_attr("math", "system").is_err());
        assert!(module_attr("os", "path").is_err());
    }
}
