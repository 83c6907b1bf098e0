//! Operators, indexing and iteration over runtime values.
//!
//! Shared by the evaluator and the built-in tools so `sorted`, `min` and
//! `in` agree with `<` and `==` in scripts.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::ast::{BinaryOp, CompareOp, UnaryOp};
use crate::sandbox::Budget;

use super::control_flow::{Fault, FaultKind, Interrupt};
use super::value::{Dict, RangeValue, Value};

fn unsupported(op: impl std::fmt::Display, a: &Value, b: &Value) -> Fault {
    Fault::type_error(format!(
        "unsupported operand type(s) for {op}: '{}' and '{}'",
        a.type_name(),
        b.type_name()
    ))
}

fn overflow() -> Fault {
    Fault::new(FaultKind::OverflowError, "integer result too large")
}

fn zero_division(message: &str) -> Fault {
    Fault::new(FaultKind::ZeroDivisionError, message)
}

fn is_number(v: &Value) -> bool {
    matches!(v, Value::Int(_) | Value::Float(_) | Value::Bool(_))
}

pub fn unary(op: UnaryOp, value: &Value) -> Result<Value, Fault> {
    match (op, value) {
        (UnaryOp::Not, v) => Ok(Value::Bool(!v.truthy())),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Pos, Value::Float(f)) => Ok(Value::Float(*f)),
        (UnaryOp::Neg, v) if v.as_int().is_some() => v
            .as_int()
            .and_then(i64::checked_neg)
            .map(Value::Int)
            .ok_or_else(overflow),
        (UnaryOp::Pos, v) if v.as_int().is_some() => Ok(Value::Int(v.as_int().unwrap_or(0))),
        (op, v) => {
            let symbol = if op == UnaryOp::Neg { "-" } else { "+" };
            Err(Fault::type_error(format!(
                "bad operand type for unary {symbol}: '{}'",
                v.type_name()
            )))
        }
    }
}

/// Arithmetic. Allocation-producing forms are checked against the budget
/// before anything is built.
pub fn binary(op: BinaryOp, a: &Value, b: &Value, budget: &mut Budget) -> Result<Value, Interrupt> {
    if let (Some(x), Some(y)) = (int_operand(a), int_operand(b)) {
        return int_arith(op, x, y).map_err(Interrupt::from);
    }
    if is_number(a) && is_number(b) {
        let (x, y) = (a.as_float().unwrap_or(0.0), b.as_float().unwrap_or(0.0));
        return float_arith(op, x, y).map_err(Interrupt::from);
    }
    match (op, a, b) {
        (BinaryOp::Add, Value::Str(x), Value::Str(y)) => {
            budget.check_alloc(x.len() + y.len())?;
            let mut out = String::with_capacity(x.len() + y.len());
            out.push_str(x);
            out.push_str(y);
            Ok(Value::str(out))
        }
        (BinaryOp::Add, Value::List(x), Value::List(y)) => {
            Ok(Value::list(concat(x, y, budget)?))
        }
        (BinaryOp::Add, Value::Tuple(x), Value::Tuple(y)) => {
            Ok(Value::tuple(concat(x, y, budget)?))
        }
        (BinaryOp::Mul, seq, n) | (BinaryOp::Mul, n, seq)
            if int_operand(n).is_some()
                && matches!(seq, Value::Str(_) | Value::List(_) | Value::Tuple(_)) =>
        {
            repeat(seq, int_operand(n).unwrap_or(0), budget)
        }
        _ => Err(unsupported(op, a, b).into()),
    }
}

/// Ints and bools take part in integer arithmetic.
fn int_operand(v: &Value) -> Option<i64> {
    match v {
        Value::Int(_) | Value::Bool(_) => v.as_int(),
        _ => None,
    }
}

fn int_arith(op: BinaryOp, x: i64, y: i64) -> Result<Value, Fault> {
    let result = match op {
        BinaryOp::Add => x.checked_add(y),
        BinaryOp::Sub => x.checked_sub(y),
        BinaryOp::Mul => x.checked_mul(y),
        BinaryOp::Div => {
            if y == 0 {
                return Err(zero_division("division by zero"));
            }
            return Ok(Value::Float(x as f64 / y as f64));
        }
        BinaryOp::FloorDiv => {
            if y == 0 {
                return Err(zero_division("integer division or modulo by zero"));
            }
            x.checked_div(y).map(|q| {
                if x % y != 0 && ((x < 0) != (y < 0)) {
                    q - 1
                } else {
                    q
                }
            })
        }
        BinaryOp::Mod => {
            if y == 0 {
                return Err(zero_division("integer division or modulo by zero"));
            }
            x.checked_rem(y).map(|r| {
                if r != 0 && ((r < 0) != (y < 0)) {
                    r + y
                } else {
                    r
                }
            })
        }
        BinaryOp::Pow => {
            if y < 0 {
                if x == 0 {
                    return Err(zero_division("0.0 cannot be raised to a negative power"));
                }
                return Ok(Value::Float((x as f64).powf(y as f64)));
            }
            u32::try_from(y).ok().and_then(|e| x.checked_pow(e))
        }
    };
    result.map(Value::Int).ok_or_else(overflow)
}

fn float_arith(op: BinaryOp, x: f64, y: f64) -> Result<Value, Fault> {
    let result = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div => {
            if y == 0.0 {
                return Err(zero_division("float division by zero"));
            }
            x / y
        }
        BinaryOp::FloorDiv => {
            if y == 0.0 {
                return Err(zero_division("float floor division by zero"));
            }
            (x / y).floor()
        }
        BinaryOp::Mod => {
            if y == 0.0 {
                return Err(zero_division("float modulo"));
            }
            let r = x % y;
            if r != 0.0 && ((r < 0.0) != (y < 0.0)) { r + y } else { r }
        }
        BinaryOp::Pow => {
            if x == 0.0 && y < 0.0 {
                return Err(zero_division("0.0 cannot be raised to a negative power"));
            }
            x.powf(y)
        }
    };
    if result.is_infinite() && x.is_finite() && y.is_finite() && op == BinaryOp::Pow {
        return Err(Fault::new(FaultKind::OverflowError, "numerical result out of range"));
    }
    Ok(Value::Float(result))
}

fn concat(x: &[Value], y: &[Value], budget: &mut Budget) -> Result<Vec<Value>, Interrupt> {
    let bytes: usize = x.iter().chain(y).map(Value::estimated_size).sum();
    budget.check_alloc(bytes)?;
    Ok(x.iter().chain(y).cloned().collect())
}

fn repeat(seq: &Value, times: i64, budget: &mut Budget) -> Result<Value, Interrupt> {
    let times = usize::try_from(times).unwrap_or(0);
    let unit = match seq {
        Value::Str(s) => s.len(),
        _ => seq.estimated_size(),
    };
    budget.check_alloc(unit.saturating_mul(times))?;
    Ok(match seq {
        Value::Str(s) => Value::str(s.repeat(times)),
        Value::List(items) => Value::list(repeat_items(items, times)),
        Value::Tuple(items) => Value::tuple(repeat_items(items, times)),
        _ => Value::None,
    })
}

fn repeat_items(items: &[Value], times: usize) -> Vec<Value> {
    let mut out = Vec::with_capacity(items.len() * times);
    for _ in 0..times {
        out.extend_from_slice(items);
    }
    out
}

/// Ordering used by `<`, `sorted`, `min` and `max`. `None` for unordered
/// floats (NaN).
pub fn order(a: &Value, b: &Value, symbol: &str) -> Result<Option<Ordering>, Fault> {
    if is_number(a) && is_number(b) {
        if let (Some(x), Some(y)) = (int_operand(a), int_operand(b)) {
            return Ok(Some(x.cmp(&y)));
        }
        let (x, y) = (a.as_float().unwrap_or(0.0), b.as_float().unwrap_or(0.0));
        return Ok(x.partial_cmp(&y));
    }
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Ok(Some(x.cmp(y))),
        (Value::List(x), Value::List(y)) | (Value::Tuple(x), Value::Tuple(y)) => {
            for (l, r) in x.iter().zip(y.iter()) {
                if l != r {
                    return order(l, r, symbol);
                }
            }
            Ok(Some(x.len().cmp(&y.len())))
        }
        _ => Err(Fault::type_error(format!(
            "'{symbol}' not supported between instances of '{}' and '{}'",
            a.type_name(),
            b.type_name()
        ))),
    }
}

pub fn compare(op: CompareOp, a: &Value, b: &Value) -> Result<bool, Fault> {
    let symbol = op.to_string();
    Ok(match op {
        CompareOp::Eq => a == b,
        CompareOp::NotEq => a != b,
        CompareOp::Lt => order(a, b, &symbol)? == Some(Ordering::Less),
        CompareOp::Gt => order(a, b, &symbol)? == Some(Ordering::Greater),
        CompareOp::LtEq => matches!(
            order(a, b, &symbol)?,
            Some(Ordering::Less | Ordering::Equal)
        ),
        CompareOp::GtEq => matches!(
            order(a, b, &symbol)?,
            Some(Ordering::Greater | Ordering::Equal)
        ),
        CompareOp::In => contains(b, a)?,
        CompareOp::NotIn => !contains(b, a)?,
        CompareOp::Is => identical(a, b),
        CompareOp::IsNot => !identical(a, b),
    })
}

fn identical(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::None, Value::None) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Function(x), Value::Function(y)) => Arc::ptr_eq(x, y),
        (Value::List(x), Value::List(y)) | (Value::Tuple(x), Value::Tuple(y)) => Arc::ptr_eq(x, y),
        (Value::Dict(x), Value::Dict(y)) => Arc::ptr_eq(x, y),
        _ => false,
    }
}

/// `item in container`.
pub fn contains(container: &Value, item: &Value) -> Result<bool, Fault> {
    match container {
        Value::Str(s) => match item {
            Value::Str(needle) => Ok(s.contains(&**needle)),
            other => Err(Fault::type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Value::List(items) | Value::Tuple(items) => Ok(items.contains(item)),
        Value::Dict(dict) => {
            item.check_hashable()?;
            Ok(dict.contains_key(item))
        }
        Value::Range(range) => Ok(match item {
            Value::Float(f) if f.fract() == 0.0 => range.contains(*f as i64),
            other => other.as_int().is_some_and(|i| range.contains(i)),
        }),
        other => Err(Fault::type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

/// Python-style index normalization: negative counts from the end.
pub fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let i = if index < 0 { index + len } else { index };
    (0..len).contains(&i).then_some(i as usize)
}

fn index_of(index: &Value, container: &str) -> Result<i64, Fault> {
    index.as_int().ok_or_else(|| {
        Fault::type_error(format!(
            "{container} indices must be integers or slices, not {}",
            index.type_name()
        ))
    })
}

fn out_of_range(container: &str) -> Fault {
    Fault::new(FaultKind::IndexError, format!("{container} index out of range"))
}

/// `object[index]`.
pub fn subscript(object: &Value, index: &Value) -> Result<Value, Fault> {
    match object {
        Value::List(items) | Value::Tuple(items) => {
            let name = object.type_name();
            let i = index_of(index, name)?;
            normalize_index(i, items.len())
                .map(|i| items[i].clone())
                .ok_or_else(|| out_of_range(name))
        }
        Value::Str(s) => {
            let i = index_of(index, "string")?;
            let len = s.chars().count();
            normalize_index(i, len)
                .and_then(|i| s.chars().nth(i))
                .map(|c| Value::str(c.to_string()))
                .ok_or_else(|| out_of_range("string"))
        }
        Value::Range(range) => {
            let i = index_of(index, "range")?;
            normalize_index(i, range.len())
                .and_then(|i| range.get(i))
                .map(Value::Int)
                .ok_or_else(|| Fault::new(FaultKind::IndexError, "range object index out of range"))
        }
        Value::Dict(dict) => {
            index.check_hashable()?;
            dict.get(index)
                .cloned()
                .ok_or_else(|| Fault::new(FaultKind::KeyError, index.repr()))
        }
        other => Err(Fault::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

fn clamp_bound(bound: Option<&Value>, len: usize, default: usize) -> Result<usize, Fault> {
    let Some(bound) = bound else {
        return Ok(default);
    };
    if bound.is_none() {
        return Ok(default);
    }
    let i = bound.as_int().ok_or_else(|| {
        Fault::type_error("slice indices must be integers or None")
    })?;
    let len_i = i64::try_from(len).unwrap_or(i64::MAX);
    let i = if i < 0 { (i + len_i).max(0) } else { i.min(len_i) };
    Ok(i as usize)
}

/// `object[lower:upper]`.
pub fn slice(object: &Value, lower: Option<&Value>, upper: Option<&Value>) -> Result<Value, Fault> {
    let len = match object {
        Value::List(items) | Value::Tuple(items) => items.len(),
        Value::Str(s) => s.chars().count(),
        other => {
            return Err(Fault::type_error(format!(
                "'{}' object is not subscriptable",
                other.type_name()
            )));
        }
    };
    let start = clamp_bound(lower, len, 0)?;
    let end = clamp_bound(upper, len, len)?.max(start);
    Ok(match object {
        Value::List(items) => Value::list(items[start..end].to_vec()),
        Value::Tuple(items) => Value::tuple(items[start..end].to_vec()),
        Value::Str(s) => Value::str(s.chars().skip(start).take(end - start).collect::<String>()),
        _ => Value::None,
    })
}

/// `object[index] = value`. Returns the change in estimated size.
pub fn assign_index(object: &mut Value, index: Value, value: Value) -> Result<i64, Fault> {
    let added = value.estimated_size() as i64;
    match object {
        Value::List(items) => {
            let i = index_of(&index, "list")?;
            let i = normalize_index(i, items.len())
                .ok_or_else(|| Fault::new(FaultKind::IndexError, "list assignment index out of range"))?;
            let items = Arc::make_mut(items);
            let old = std::mem::replace(&mut items[i], value);
            Ok(added - old.estimated_size() as i64)
        }
        Value::Dict(dict) => {
            let key_size = index.estimated_size() as i64;
            match Arc::make_mut(dict).insert(index, value)? {
                Some(old) => Ok(added - old.estimated_size() as i64),
                None => Ok(added + key_size),
            }
        }
        other => Err(Fault::type_error(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}

/// Iterator over the items a `for` loop or an iterable-taking tool sees.
/// Ranges are produced lazily.
#[derive(Debug)]
pub enum ValueIter {
    Items { items: Arc<Vec<Value>>, pos: usize },
    Chars { text: Arc<str>, pos: usize },
    Range { range: RangeValue, pos: usize },
}

impl Iterator for ValueIter {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        match self {
            ValueIter::Items { items, pos } => {
                let item = items.get(*pos).cloned();
                *pos += 1;
                item
            }
            ValueIter::Chars { text, pos } => {
                let ch = text[*pos..].chars().next()?;
                *pos += ch.len_utf8();
                Some(Value::str(ch.to_string()))
            }
            ValueIter::Range { range, pos } => {
                let item = range.get(*pos).map(Value::Int);
                *pos += 1;
                item
            }
        }
    }
}

pub fn iterate(value: &Value) -> Result<ValueIter, Fault> {
    Ok(match value {
        Value::List(items) | Value::Tuple(items) => ValueIter::Items {
            items: Arc::clone(items),
            pos: 0,
        },
        Value::Str(text) => ValueIter::Chars {
            text: Arc::clone(text),
            pos: 0,
        },
        Value::Range(range) => ValueIter::Range {
            range: *range,
            pos: 0,
        },
        Value::Dict(dict) => ValueIter::Items {
            items: Arc::new(dict.keys().cloned().collect()),
            pos: 0,
        },
        other => {
            return Err(Fault::type_error(format!(
                "'{}' object is not iterable",
                other.type_name()
            )));
        }
    })
}

/// Collect an iterable, checking the budget for ranges first.
pub fn collect(value: &Value, budget: &mut Budget) -> Result<Vec<Value>, Interrupt> {
    let Value::Range(range) = value else {
        return Ok(iterate(value)?.collect());
    };
    budget.check_alloc(range.len().saturating_mul(Value::Int(0).estimated_size()))?;
    let mut items = Vec::with_capacity(range.len());
    for (done, item) in iterate(value)?.enumerate() {
        budget.pace(done)?;
        items.push(item);
    }
    Ok(items)
}

/// Build a dict from `(key, value)` pairs.
pub fn dict_from_pairs(pairs: impl IntoIterator<Item = Value>) -> Result<Dict, Fault> {
    let mut dict = Dict::new();
    for pair in pairs {
        let items = match &pair {
            Value::List(items) | Value::Tuple(items) if items.len() == 2 => items,
            other => {
                return Err(Fault::value_error(format!(
                    "dictionary update sequence element must be a pair, got {}",
                    other.type_name()
                )));
            }
        };
        dict.insert(items[0].clone(), items[1].clone())?;
    }
    Ok(dict)
}
