//! Methods on built-in value types (`s.upper()`, `items.append(x)`, ...).
//!
//! Mutating methods update the receiver in place and report how much its
//! estimated size changed so the caller can keep scope accounting exact.

use std::sync::Arc;

use crate::sandbox::Budget;

use super::control_flow::{Fault, FaultKind, Interrupt};
use super::ops;
use super::value::{Dict, Value};

/// Outcome of a method call: its return value and the receiver's size change.
pub struct MethodResult {
    pub value: Value,
    pub delta: i64,
}

impl MethodResult {
    fn pure(value: Value) -> Self {
        Self { value, delta: 0 }
    }
}

/// Whether `name` changes its receiver.
pub fn is_mutating(receiver: &Value, name: &str) -> bool {
    match receiver {
        Value::List(_) => matches!(name, "append" | "extend" | "pop" | "insert"),
        Value::Dict(_) => matches!(name, "update" | "pop"),
        _ => false,
    }
}

fn no_attribute(owner: &str, name: &str) -> Fault {
    Fault::new(
        FaultKind::AttributeError,
        format!("'{owner}' object has no attribute '{name}'"),
    )
}

fn arity(owner: &str, name: &str, args: &[Value], min: usize, max: usize) -> Result<(), Fault> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            format!("exactly {min}")
        } else {
            format!("{min} to {max}")
        };
        return Err(Fault::type_error(format!(
            "{owner}.{name}() takes {expected} argument(s) ({} given)",
            args.len()
        )));
    }
    Ok(())
}

fn str_arg<'v>(owner: &str, name: &str, arg: &'v Value) -> Result<&'v str, Fault> {
    arg.as_str().ok_or_else(|| {
        Fault::type_error(format!(
            "{owner}.{name}() argument must be str, not {}",
            arg.type_name()
        ))
    })
}

/// Call `receiver.name(*args)`.
pub fn call(
    receiver: &mut Value,
    name: &str,
    args: Vec<Value>,
    budget: &mut Budget,
) -> Result<MethodResult, Interrupt> {
    match receiver {
        Value::Str(text) => str_method(text, name, args, budget).map(MethodResult::pure),
        Value::List(items) => list_method(items, name, args, budget),
        Value::Dict(dict) => dict_method(dict, name, args, budget),
        other => Err(no_attribute(other.type_name(), name).into()),
    }
}

fn str_method(
    text: &str,
    name: &str,
    args: Vec<Value>,
    budget: &mut Budget,
) -> Result<Value, Interrupt> {
    let strip_chars = |args: &[Value]| -> Result<Option<Vec<char>>, Fault> {
        arity("str", name, args, 0, 1)?;
        match args.first() {
            None | Some(Value::None) => Ok(None),
            Some(arg) => Ok(Some(str_arg("str", name, arg)?.chars().collect())),
        }
    };
    Ok(match name {
        "upper" | "lower" => {
            arity("str", name, &args, 0, 0)?;
            budget.check_alloc(text.len())?;
            if name == "upper" {
                Value::str(text.to_uppercase())
            } else {
                Value::str(text.to_lowercase())
            }
        }
        "strip" | "lstrip" | "rstrip" => {
            let chars = strip_chars(&args)?;
            let matches = |c: char| match &chars {
                Some(set) => set.contains(&c),
                None => c.is_whitespace(),
            };
            let stripped = match name {
                "strip" => text.trim_matches(matches),
                "lstrip" => text.trim_start_matches(matches),
                _ => text.trim_end_matches(matches),
            };
            Value::str(stripped)
        }
        "split" => {
            arity("str", name, &args, 0, 1)?;
            budget.check_alloc(text.len() * 2)?;
            let parts: Vec<Value> = match args.first() {
                None | Some(Value::None) => text.split_whitespace().map(Value::from).collect(),
                Some(sep) => {
                    let sep = str_arg("str", name, sep)?;
                    if sep.is_empty() {
                        return Err(Fault::value_error("empty separator").into());
                    }
                    text.split(sep).map(Value::from).collect()
                }
            };
            Value::list(parts)
        }
        "join" => {
            arity("str", name, &args, 1, 1)?;
            let items = ops::collect(&args[0], budget)?;
            let mut pieces = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                match item.as_str() {
                    Some(s) => pieces.push(s),
                    None => {
                        return Err(Fault::type_error(format!(
                            "sequence item {i}: expected str instance, {} found",
                            item.type_name()
                        ))
                        .into());
                    }
                }
            }
            let total = pieces.iter().map(|s| s.len()).sum::<usize>()
                + text.len() * pieces.len().saturating_sub(1);
            budget.check_alloc(total)?;
            Value::str(pieces.join(text))
        }
        "replace" => {
            arity("str", name, &args, 2, 2)?;
            let old = str_arg("str", name, &args[0])?;
            let new = str_arg("str", name, &args[1])?;
            let hits = if old.is_empty() {
                text.chars().count() + 1
            } else {
                text.matches(old).count()
            };
            budget.check_alloc(text.len() + hits.saturating_mul(new.len()))?;
            Value::str(text.replace(old, new))
        }
        "startswith" | "endswith" => {
            arity("str", name, &args, 1, 1)?;
            let affix = str_arg("str", name, &args[0])?;
            Value::Bool(if name == "startswith" {
                text.starts_with(affix)
            } else {
                text.ends_with(affix)
            })
        }
        "find" => {
            arity("str", name, &args, 1, 1)?;
            let needle = str_arg("str", name, &args[0])?;
            match text.find(needle) {
                Some(byte) => Value::Int(text[..byte].chars().count() as i64),
                None => Value::Int(-1),
            }
        }
        "count" => {
            arity("str", name, &args, 1, 1)?;
            let needle = str_arg("str", name, &args[0])?;
            let n = if needle.is_empty() {
                text.chars().count() + 1
            } else {
                text.matches(needle).count()
            };
            Value::Int(n as i64)
        }
        _ => return Err(no_attribute("str", name).into()),
    })
}

fn list_method(
    items: &mut Arc<Vec<Value>>,
    name: &str,
    mut args: Vec<Value>,
    budget: &mut Budget,
) -> Result<MethodResult, Interrupt> {
    match name {
        "append" => {
            arity("list", name, &args, 1, 1)?;
            let item = args.remove(0);
            let size = item.estimated_size();
            budget.check_alloc(size)?;
            Arc::make_mut(items).push(item);
            Ok(MethodResult {
                value: Value::None,
                delta: size as i64,
            })
        }
        "extend" => {
            arity("list", name, &args, 1, 1)?;
            let extra = ops::collect(&args[0], budget)?;
            let size: usize = extra.iter().map(Value::estimated_size).sum();
            budget.check_alloc(size)?;
            Arc::make_mut(items).extend(extra);
            Ok(MethodResult {
                value: Value::None,
                delta: size as i64,
            })
        }
        "insert" => {
            arity("list", name, &args, 2, 2)?;
            let index = args[0].as_int().ok_or_else(|| {
                Fault::type_error(format!(
                    "'{}' object cannot be interpreted as an integer",
                    args[0].type_name()
                ))
            })?;
            let item = args.remove(1);
            let size = item.estimated_size();
            budget.check_alloc(size)?;
            let len = items.len() as i64;
            let at = if index < 0 { (index + len).max(0) } else { index.min(len) };
            Arc::make_mut(items).insert(at as usize, item);
            Ok(MethodResult {
                value: Value::None,
                delta: size as i64,
            })
        }
        "pop" => {
            arity("list", name, &args, 0, 1)?;
            if items.is_empty() {
                return Err(Fault::new(FaultKind::IndexError, "pop from empty list").into());
            }
            let index = match args.first() {
                Some(arg) => arg.as_int().ok_or_else(|| {
                    Fault::type_error(format!(
                        "'{}' object cannot be interpreted as an integer",
                        arg.type_name()
                    ))
                })?,
                None => -1,
            };
            let at = ops::normalize_index(index, items.len())
                .ok_or_else(|| Fault::new(FaultKind::IndexError, "pop index out of range"))?;
            let item = Arc::make_mut(items).remove(at);
            let size = item.estimated_size() as i64;
            Ok(MethodResult {
                value: item,
                delta: -size,
            })
        }
        "index" => {
            arity("list", name, &args, 1, 1)?;
            let position = items.iter().position(|item| item == &args[0]).ok_or_else(|| {
                Fault::value_error(format!("{} is not in list", args[0].repr()))
            })?;
            Ok(MethodResult::pure(Value::Int(position as i64)))
        }
        "count" => {
            arity("list", name, &args, 1, 1)?;
            let n = items.iter().filter(|item| *item == &args[0]).count();
            Ok(MethodResult::pure(Value::Int(n as i64)))
        }
        _ => Err(no_attribute("list", name).into()),
    }
}

fn dict_method(
    dict: &mut Arc<Dict>,
    name: &str,
    args: Vec<Value>,
    budget: &mut Budget,
) -> Result<MethodResult, Interrupt> {
    match name {
        "get" => {
            arity("dict", name, &args, 1, 2)?;
            args[0].check_hashable()?;
            let found = dict.get(&args[0]).cloned();
            Ok(MethodResult::pure(
                found.unwrap_or_else(|| args.get(1).cloned().unwrap_or(Value::None)),
            ))
        }
        "keys" | "values" | "items" => {
            arity("dict", name, &args, 0, 0)?;
            let bytes = dict
                .iter()
                .map(|(k, v)| k.estimated_size() + v.estimated_size())
                .sum();
            budget.check_alloc(bytes)?;
            let items: Vec<Value> = match name {
                "keys" => dict.keys().cloned().collect(),
                "values" => dict.values().cloned().collect(),
                _ => dict
                    .iter()
                    .map(|(k, v)| Value::tuple(vec![k.clone(), v.clone()]))
                    .collect(),
            };
            Ok(MethodResult::pure(Value::list(items)))
        }
        "update" => {
            arity("dict", name, &args, 1, 1)?;
            let other: Dict = match &args[0] {
                Value::Dict(other) => (**other).clone(),
                iterable => ops::dict_from_pairs(ops::collect(iterable, budget)?)?,
            };
            let mut delta = 0i64;
            let target = Arc::make_mut(dict);
            for (key, value) in other.iter() {
                let added = value.estimated_size() as i64;
                budget.check_alloc(added as usize)?;
                delta += match target.insert(key.clone(), value.clone())? {
                    Some(old) => added - old.estimated_size() as i64,
                    None => added + key.estimated_size() as i64,
                };
            }
            Ok(MethodResult {
                value: Value::None,
                delta,
            })
        }
        "pop" => {
            arity("dict", name, &args, 1, 2)?;
            args[0].check_hashable()?;
            if !dict.contains_key(&args[0]) {
                return match args.get(1) {
                    Some(default) => Ok(MethodResult::pure(default.clone())),
                    None => Err(Fault::new(FaultKind::KeyError, args[0].repr()).into()),
                };
            }
            let removed = Arc::make_mut(dict).remove(&args[0]).unwrap_or(Value::None);
            let size = (removed.estimated_size() + args[0].estimated_size()) as i64;
            Ok(MethodResult {
                value: removed,
                delta: -size,
            })
        }
        _ => Err(no_attribute("dict", name).into()),
    }
}
