//! Operator semantics over [`Value`]
//!
//! Integer arithmetic is checked: overflow raises `OverflowError` instead of
//! wrapping. Floor division and modulo round toward negative infinity.

use crate::ast::{BinOp, CmpOp, UnaryOp};
use crate::error::RuntimeFault;
use generative_artifact::Value;
use std::cmp::Ordering;

pub(crate) type Eval<T> = Result<T, RuntimeFault>;

/// Numeric view of a value; bools count as ints
#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

fn num(v: &Value) -> Option<Num> {
    match v {
        Value::Bool(b) => Some(Num::Int(i64::from(*b))),
        Value::Int(i) => Some(Num::Int(*i)),
        Value::Float(f) => Some(Num::Float(*f)),
        _ => None,
    }
}

/// Float view of a numeric value
#[allow(clippy::cast_precision_loss)]
pub(crate) fn as_f64(v: &Value) -> Option<f64> {
    match num(v)? {
        Num::Int(i) => Some(i as f64),
        Num::Float(f) => Some(f),
    }
}

fn unsupported(op: &str, l: &Value, r: &Value) -> RuntimeFault {
    RuntimeFault::type_error(format!(
        "unsupported operand type(s) for {op}: '{}' and '{}'",
        l.type_name(),
        r.type_name()
    ))
}

pub(crate) fn binary(op: BinOp, l: &Value, r: &Value, max_len: usize) -> Eval<Value> {
    if let (Some(a), Some(b)) = (num(l), num(r)) {
        return match (a, b) {
            (Num::Int(a), Num::Int(b)) => int_binary(op, a, b),
            (a, b) => {
                let (a, b) = (to_float(a), to_float(b));
                float_binary(op, a, b).ok_or_else(|| unsupported(op.symbol(), l, r))?
            }
        };
    }

    match (op, l, r) {
        (BinOp::Add, Value::Str(a), Value::Str(b)) => {
            check_len(a.len() + b.len(), max_len)?;
            Ok(Value::Str(format!("{a}{b}")))
        }
        (BinOp::Add, Value::List(a), Value::List(b)) => {
            check_len(a.len() + b.len(), max_len)?;
            Ok(Value::List(a.iter().chain(b).cloned().collect()))
        }
        (BinOp::Add, Value::Tuple(a), Value::Tuple(b)) => {
            check_len(a.len() + b.len(), max_len)?;
            Ok(Value::Tuple(a.iter().chain(b).cloned().collect()))
        }
        (BinOp::Mul, seq, n) | (BinOp::Mul, n, seq) if num(n).is_some() && is_sequence(seq) => {
            let times = match num(n) {
                Some(Num::Int(times)) => usize::try_from(times).unwrap_or(0),
                _ => return Err(unsupported("*", l, r)),
            };
            repeat(seq, times, max_len)
        }
        (BinOp::BitOr, Value::Dict(a), Value::Dict(b)) => {
            let mut merged = a.clone();
            for (k, v) in b {
                dict_insert(&mut merged, k.clone(), v.clone());
            }
            Ok(Value::Dict(merged))
        }
        _ => Err(unsupported(op.symbol(), l, r)),
    }
}

fn is_sequence(v: &Value) -> bool {
    matches!(v, Value::Str(_) | Value::List(_) | Value::Tuple(_))
}

fn repeat(seq: &Value, times: usize, max_len: usize) -> Eval<Value> {
    let unit = match seq {
        Value::Str(s) => s.len(),
        Value::List(items) | Value::Tuple(items) => items.len(),
        _ => 0,
    };
    check_len(unit.saturating_mul(times), max_len)?;
    Ok(match seq {
        Value::Str(s) => Value::Str(s.repeat(times)),
        Value::List(items) => Value::List(repeat_items(items, times)),
        Value::Tuple(items) => Value::Tuple(repeat_items(items, times)),
        other => other.clone(),
    })
}

fn repeat_items(items: &[Value], times: usize) -> Vec<Value> {
    let mut out = Vec::with_capacity(items.len() * times);
    for _ in 0..times {
        out.extend_from_slice(items);
    }
    out
}

/// Fail with `MemoryError` when a value would exceed `max_len`
pub(crate) fn check_len(len: usize, max_len: usize) -> Eval<()> {
    if len > max_len {
        Err(RuntimeFault::new(
            crate::error::FaultKind::SizeLimit,
            format!("sequence of length {len} exceeds the limit of {max_len}"),
        ))
    } else {
        Ok(())
    }
}

#[allow(clippy::cast_precision_loss)]
fn to_float(n: Num) -> f64 {
    match n {
        Num::Int(i) => i as f64,
        Num::Float(f) => f,
    }
}

#[allow(clippy::cast_precision_loss)]
fn int_binary(op: BinOp, a: i64, b: i64) -> Eval<Value> {
    let overflow = RuntimeFault::overflow;
    let value = match op {
        BinOp::Add => Value::Int(a.checked_add(b).ok_or_else(overflow)?),
        BinOp::Sub => Value::Int(a.checked_sub(b).ok_or_else(overflow)?),
        BinOp::Mul => Value::Int(a.checked_mul(b).ok_or_else(overflow)?),
        BinOp::Div => {
            if b == 0 {
                return Err(RuntimeFault::zero_division("division by zero"));
            }
            Value::Float(a as f64 / b as f64)
        }
        BinOp::FloorDiv => Value::Int(floor_div(a, b)?),
        BinOp::Mod => Value::Int(floor_mod(a, b)?),
        BinOp::Pow => {
            if b < 0 {
                let base = a as f64;
                if base == 0.0 {
                    return Err(RuntimeFault::zero_division(
                        "0.0 cannot be raised to a negative power",
                    ));
                }
                return Ok(Value::Float(base.powf(b as f64)));
            }
            let exp = u32::try_from(b).map_err(|_| overflow())?;
            Value::Int(a.checked_pow(exp).ok_or_else(overflow)?)
        }
        BinOp::BitAnd => Value::Int(a & b),
        BinOp::BitOr => Value::Int(a | b),
        BinOp::BitXor => Value::Int(a ^ b),
        BinOp::LShift => {
            if b < 0 {
                return Err(RuntimeFault::value_error("negative shift count"));
            }
            if a == 0 {
                return Ok(Value::Int(0));
            }
            let shift = u32::try_from(b).ok().filter(|s| *s < 63).ok_or_else(overflow)?;
            let shifted = a << shift;
            if shifted >> shift != a {
                return Err(overflow());
            }
            Value::Int(shifted)
        }
        BinOp::RShift => {
            if b < 0 {
                return Err(RuntimeFault::value_error("negative shift count"));
            }
            let shift = u32::try_from(b).unwrap_or(63).min(63);
            Value::Int(a >> shift)
        }
    };
    Ok(value)
}

pub(crate) fn floor_div(a: i64, b: i64) -> Eval<i64> {
    if b == 0 {
        return Err(RuntimeFault::zero_division(
            "integer division or modulo by zero",
        ));
    }
    let q = a.checked_div(b).ok_or_else(RuntimeFault::overflow)?;
    if (a % b != 0) && ((a < 0) != (b < 0)) {
        Ok(q - 1)
    } else {
        Ok(q)
    }
}

pub(crate) fn floor_mod(a: i64, b: i64) -> Eval<i64> {
    if b == 0 {
        return Err(RuntimeFault::zero_division(
            "integer division or modulo by zero",
        ));
    }
    let r = a.checked_rem(b).unwrap_or(0);
    if r != 0 && ((r < 0) != (b < 0)) {
        Ok(r + b)
    } else {
        Ok(r)
    }
}

fn float_binary(op: BinOp, a: f64, b: f64) -> Option<Eval<Value>> {
    let zero = |what: &str| -> Eval<Value> {
        Err(RuntimeFault::zero_division(format!("float {what} by zero")))
    };
    let result = match op {
        BinOp::Add => Ok(Value::Float(a + b)),
        BinOp::Sub => Ok(Value::Float(a - b)),
        BinOp::Mul => Ok(Value::Float(a * b)),
        BinOp::Div if b == 0.0 => zero("division"),
        BinOp::Div => Ok(Value::Float(a / b)),
        BinOp::FloorDiv if b == 0.0 => zero("floor division"),
        BinOp::FloorDiv => Ok(Value::Float((a / b).floor())),
        BinOp::Mod if b == 0.0 => zero("modulo"),
        BinOp::Mod => {
            let mut r = a % b;
            if r != 0.0 && ((r < 0.0) != (b < 0.0)) {
                r += b;
            }
            Ok(Value::Float(r))
        }
        BinOp::Pow if a == 0.0 && b < 0.0 => Err(RuntimeFault::zero_division(
            "0.0 cannot be raised to a negative power",
        )),
        BinOp::Pow => Ok(Value::Float(a.powf(b))),
        _ => return None,
    };
    Some(result)
}

pub(crate) fn unary(op: UnaryOp, v: &Value) -> Eval<Value> {
    match (op, num(v)) {
        (UnaryOp::Not, _) => Ok(Value::Bool(!v.is_truthy())),
        (UnaryOp::Neg, Some(Num::Int(i))) => i
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(RuntimeFault::overflow),
        (UnaryOp::Neg, Some(Num::Float(f))) => Ok(Value::Float(-f)),
        (UnaryOp::Pos, Some(Num::Int(i))) => Ok(Value::Int(i)),
        (UnaryOp::Pos, Some(Num::Float(f))) => Ok(Value::Float(f)),
        (UnaryOp::Invert, Some(Num::Int(i))) => Ok(Value::Int(!i)),
        (op, _) => {
            let symbol = match op {
                UnaryOp::Neg => "-",
                UnaryOp::Pos => "+",
                _ => "~",
            };
            Err(RuntimeFault::type_error(format!(
                "bad operand type for unary {symbol}: '{}'",
                v.type_name()
            )))
        }
    }
}

/// Equality as the unit language defines it (`1 == 1.0 == True`)
pub(crate) fn py_eq(a: &Value, b: &Value) -> bool {
    if let (Some(x), Some(y)) = (num(a), num(b)) {
        return match (x, y) {
            (Num::Int(x), Num::Int(y)) => x == y,
            (x, y) => to_float(x) == to_float(y),
        };
    }
    match (a, b) {
        (Value::List(x), Value::List(y)) | (Value::Tuple(x), Value::Tuple(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(p, q)| py_eq(p, q))
        }
        (Value::Dict(x), Value::Dict(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| dict_lookup(y, k).is_some_and(|other| py_eq(v, other)))
        }
        _ => a == b,
    }
}

/// Ordering between two values; `None` when unordered (NaN)
pub(crate) fn py_cmp(a: &Value, b: &Value) -> Eval<Option<Ordering>> {
    if let (Some(x), Some(y)) = (num(a), num(b)) {
        return Ok(match (x, y) {
            (Num::Int(x), Num::Int(y)) => Some(x.cmp(&y)),
            (x, y) => to_float(x).partial_cmp(&to_float(y)),
        });
    }
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Ok(Some(x.cmp(y))),
        (Value::List(x), Value::List(y)) | (Value::Tuple(x), Value::Tuple(y)) => {
            for (p, q) in x.iter().zip(y) {
                if !py_eq(p, q) {
                    return py_cmp(p, q);
                }
            }
            Ok(Some(x.len().cmp(&y.len())))
        }
        _ => Err(RuntimeFault::type_error(format!(
            "'<' not supported between instances of '{}' and '{}'",
            a.type_name(),
            b.type_name()
        ))),
    }
}

pub(crate) fn compare(op: CmpOp, a: &Value, b: &Value) -> Eval<bool> {
    let ordered = |want: fn(Ordering) -> bool| -> Eval<bool> {
        Ok(py_cmp(a, b)?.is_some_and(want))
    };
    match op {
        CmpOp::Eq => Ok(py_eq(a, b)),
        CmpOp::NotEq => Ok(!py_eq(a, b)),
        CmpOp::Lt => ordered(Ordering::is_lt),
        CmpOp::LtE => ordered(Ordering::is_le),
        CmpOp::Gt => ordered(Ordering::is_gt),
        CmpOp::GtE => ordered(Ordering::is_ge),
        CmpOp::In => contains(b, a),
        CmpOp::NotIn => contains(b, a).map(|found| !found),
        CmpOp::Is => Ok(identical(a, b)),
        CmpOp::IsNot => Ok(!identical(a, b)),
    }
}

/// Identity approximated structurally; only meaningful for `None` and bools
fn identical(a: &Value, b: &Value) -> bool {
    std::mem::discriminant(a) == std::mem::discriminant(b) && a == b
}

pub(crate) fn contains(container: &Value, item: &Value) -> Eval<bool> {
    match container {
        Value::List(items) | Value::Tuple(items) => Ok(items.iter().any(|v| py_eq(v, item))),
        Value::Dict(entries) => Ok(dict_lookup(entries, item).is_some()),
        Value::Str(s) => match item {
            Value::Str(needle) => Ok(s.contains(needle.as_str())),
            other => Err(RuntimeFault::type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        other => Err(RuntimeFault::type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

/// Items produced by iterating a value
pub(crate) fn iterate(v: &Value) -> Eval<Vec<Value>> {
    match v {
        Value::List(items) | Value::Tuple(items) => Ok(items.clone()),
        Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
        Value::Dict(entries) => Ok(entries.iter().map(|(k, _)| k.clone()).collect()),
        other => Err(RuntimeFault::type_error(format!(
            "'{}' object is not iterable",
            other.type_name()
        ))),
    }
}

pub(crate) fn ensure_hashable(key: &Value) -> Eval<()> {
    match key {
        Value::List(_) | Value::Dict(_) => Err(RuntimeFault::type_error(format!(
            "unhashable type: '{}'",
            key.type_name()
        ))),
        Value::Tuple(items) => items.iter().try_for_each(ensure_hashable),
        _ => Ok(()),
    }
}

pub(crate) fn dict_lookup<'v>(entries: &'v [(Value, Value)], key: &Value) -> Option<&'v Value> {
    entries.iter().find(|(k, _)| py_eq(k, key)).map(|(_, v)| v)
}

/// Insert or overwrite, keeping first-insertion order
pub(crate) fn dict_insert(entries: &mut Vec<(Value, Value)>, key: Value, value: Value) {
    match entries.iter_mut().find(|(k, _)| py_eq(k, &key)) {
        Some(slot) => slot.1 = value,
        None => entries.push((key, value)),
    }
}

fn index_of(idx: &Value, len: usize, what: &str) -> Eval<usize> {
    let i = match idx {
        Value::Int(i) => *i,
        Value::Bool(b) => i64::from(*b),
        other => {
            return Err(RuntimeFault::type_error(format!(
                "{what} indices must be integers or slices, not {}",
                other.type_name()
            )))
        }
    };
    normalize_index(i, len)
        .ok_or_else(|| RuntimeFault::index_error(format!("{what} index out of range")))
}

/// Resolve a possibly negative index against `len`
pub(crate) fn normalize_index(i: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let resolved = if i < 0 { i + len } else { i };
    if (0..len).contains(&resolved) {
        usize::try_from(resolved).ok()
    } else {
        None
    }
}

pub(crate) fn get_item(v: &Value, idx: &Value) -> Eval<Value> {
    match v {
        Value::List(items) => Ok(items[index_of(idx, items.len(), "list")?].clone()),
        Value::Tuple(items) => Ok(items[index_of(idx, items.len(), "tuple")?].clone()),
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let at = index_of(idx, chars.len(), "string")?;
            Ok(Value::Str(chars[at].to_string()))
        }
        Value::Dict(entries) => {
            ensure_hashable(idx)?;
            dict_lookup(entries, idx)
                .cloned()
                .ok_or_else(|| RuntimeFault::key_error(idx))
        }
        other => Err(RuntimeFault::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

/// Mutable element of a list or existing dict entry
pub(crate) fn item_mut<'v>(v: &'v mut Value, idx: &Value) -> Eval<&'v mut Value> {
    match v {
        Value::List(items) => {
            let at = index_of(idx, items.len(), "list")?;
            Ok(&mut items[at])
        }
        Value::Dict(entries) => entries
            .iter_mut()
            .find(|(k, _)| py_eq(k, idx))
            .map(|(_, value)| value)
            .ok_or_else(|| RuntimeFault::key_error(idx)),
        other => Err(RuntimeFault::type_error(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}

pub(crate) fn set_item(target: &mut Value, idx: Value, value: Value, max_len: usize) -> Eval<()> {
    match target {
        Value::List(items) => {
            let at = index_of(&idx, items.len(), "list assignment")?;
            items[at] = value;
            Ok(())
        }
        Value::Dict(entries) => {
            ensure_hashable(&idx)?;
            check_len(entries.len() + 1, max_len)?;
            dict_insert(entries, idx, value);
            Ok(())
        }
        other => Err(RuntimeFault::type_error(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}

fn slice_bound(v: Option<&Value>) -> Eval<Option<i64>> {
    match v {
        None | Some(Value::None) => Ok(None),
        Some(other) => other.as_int().map(Some).ok_or_else(|| {
            RuntimeFault::type_error("slice indices must be integers or None")
        }),
    }
}

/// Positions selected by `[lower:upper:step]` over a sequence of `len`
pub(crate) fn slice_positions(
    len: usize,
    lower: Option<&Value>,
    upper: Option<&Value>,
    step: Option<&Value>,
) -> Eval<Vec<usize>> {
    let step = slice_bound(step)?.unwrap_or(1);
    if step == 0 {
        return Err(RuntimeFault::value_error("slice step cannot be zero"));
    }
    let n = i64::try_from(len).map_err(|_| RuntimeFault::overflow())?;
    let clamp = |raw: i64, low: i64, high: i64| {
        let resolved = if raw < 0 { raw + n } else { raw };
        resolved.clamp(low, high)
    };

    let (start, stop) = if step > 0 {
        (
            slice_bound(lower)?.map_or(0, |v| clamp(v, 0, n)),
            slice_bound(upper)?.map_or(n, |v| clamp(v, 0, n)),
        )
    } else {
        (
            slice_bound(lower)?.map_or(n - 1, |v| clamp(v, -1, n - 1)),
            slice_bound(upper)?.map_or(-1, |v| clamp(v, -1, n - 1)),
        )
    };

    let mut positions = Vec::new();
    let mut i = start;
    while (step > 0 && i < stop) || (step < 0 && i > stop) {
        if let Ok(at) = usize::try_from(i) {
            positions.push(at);
        }
        i += step;
    }
    Ok(positions)
}

pub(crate) fn slice(
    v: &Value,
    lower: Option<&Value>,
    upper: Option<&Value>,
    step: Option<&Value>,
) -> Eval<Value> {
    match v {
        Value::List(items) => Ok(Value::List(
            slice_positions(items.len(), lower, upper, step)?
                .into_iter()
                .map(|i| items[i].clone())
                .collect(),
        )),
        Value::Tuple(items) => Ok(Value::Tuple(
            slice_positions(items.len(), lower, upper, step)?
                .into_iter()
                .map(|i| items[i].clone())
                .collect(),
        )),
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            Ok(Value::Str(
                slice_positions(chars.len(), lower, upper, step)?
                    .into_iter()
                    .map(|i| chars[i])
                    .collect(),
            ))
        }
        other => Err(RuntimeFault::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}
