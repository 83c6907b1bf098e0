//! Console output and the pure helper functions (`len`, `sorted`, ...).

use std::cmp::Ordering;

use async_trait::async_trait;

use crate::interpreter::ops;
use crate::interpreter::{Dict, Fault, FaultKind, Interrupt, RangeValue, Value};
use crate::tools::{Tool, ToolArgs, ToolContext};

type PureFn = fn(&ToolArgs, &mut ToolContext<'_>) -> Result<Value, Interrupt>;

/// A synchronous built-in.
pub struct Pure {
    name: &'static str,
    run: PureFn,
}

#[async_trait]
impl Tool for Pure {
    fn name(&self) -> &str {
        self.name
    }

    async fn execute(&self, args: ToolArgs, ctx: &mut ToolContext<'_>) -> Result<Value, Interrupt> {
        (self.run)(&args, ctx)
    }
}

/// Every synchronous built-in.
pub fn all() -> Vec<Pure> {
    let table: [(&'static str, PureFn); 20] = [
        ("print", print),
        ("len", len),
        ("str", str),
        ("repr", repr),
        ("int", int),
        ("float", float),
        ("bool", bool),
        ("list", list),
        ("dict", dict),
        ("range", range),
        ("sorted", sorted),
        ("reversed", reversed),
        ("min", min),
        ("max", max),
        ("sum", sum),
        ("abs", abs),
        ("round", round),
        ("enumerate", enumerate),
        ("zip", zip),
        ("type_name", type_name),
    ];
    table.into_iter().map(|(name, run)| Pure { name, run }).collect()
}

fn separator<'a>(args: &'a ToolArgs, name: &str, default: &'a str) -> Result<&'a str, Fault> {
    match args.keyword(name) {
        None | Some(Value::None) => Ok(default),
        Some(Value::Str(s)) => Ok(s),
        Some(other) => Err(Fault::type_error(format!(
            "{name} must be None or a string, not {}",
            other.type_name()
        ))),
    }
}

fn print(args: &ToolArgs, ctx: &mut ToolContext<'_>) -> Result<Value, Interrupt> {
    let sep = separator(args, "sep", " ")?;
    let end = separator(args, "end", "\n")?;
    let mut line = args
        .positional
        .iter()
        .map(Value::to_str)
        .collect::<Vec<_>>()
        .join(sep);
    line.push_str(end);
    ctx.stdout.write(&line);
    Ok(Value::None)
}

fn len(args: &ToolArgs, _ctx: &mut ToolContext<'_>) -> Result<Value, Interrupt> {
    let value = args.required("len", 0, "obj")?;
    let n = match value {
        Value::Str(s) => s.chars().count(),
        Value::List(items) | Value::Tuple(items) => items.len(),
        Value::Dict(dict) => dict.len(),
        Value::Range(range) => range.len(),
        other => {
            return Err(Fault::type_error(format!(
                "object of type '{}' has no len()",
                other.type_name()
            ))
            .into());
        }
    };
    Ok(Value::Int(n as i64))
}

fn str(args: &ToolArgs, ctx: &mut ToolContext<'_>) -> Result<Value, Interrupt> {
    let text = args.get(0, "value").map(Value::to_str).unwrap_or_default();
    ctx.budget.check_alloc(text.len())?;
    Ok(Value::str(text))
}

fn repr(args: &ToolArgs, ctx: &mut ToolContext<'_>) -> Result<Value, Interrupt> {
    let text = args.required("repr", 0, "value")?.repr();
    ctx.budget.check_alloc(text.len())?;
    Ok(Value::str(text))
}

fn int(args: &ToolArgs, _ctx: &mut ToolContext<'_>) -> Result<Value, Interrupt> {
    let Some(value) = args.get(0, "value") else {
        return Ok(Value::Int(0));
    };
    let n = match value {
        Value::Int(_) | Value::Bool(_) => value.as_int().unwrap_or(0),
        Value::Float(f) if f.is_nan() => {
            return Err(Fault::value_error("cannot convert float NaN to integer").into());
        }
        Value::Float(f) if f.is_infinite() || f.abs() >= 9.3e18 => {
            return Err(Fault::new(FaultKind::OverflowError, "cannot convert float to integer").into());
        }
        Value::Float(f) => f.trunc() as i64,
        Value::Str(s) => s.trim().replace('_', "").parse::<i64>().map_err(|_| {
            Fault::value_error(format!("invalid literal for int() with base 10: {}", value.repr()))
        })?,
        other => {
            return Err(Fault::type_error(format!(
                "int() argument must be a string or a number, not '{}'",
                other.type_name()
            ))
            .into());
        }
    };
    Ok(Value::Int(n))
}

fn float(args: &ToolArgs, _ctx: &mut ToolContext<'_>) -> Result<Value, Interrupt> {
    let Some(value) = args.get(0, "value") else {
        return Ok(Value::Float(0.0));
    };
    let f = match value {
        Value::Str(s) => {
            let text = s.trim().to_ascii_lowercase();
            match text.as_str() {
                "inf" | "+inf" | "infinity" => f64::INFINITY,
                "-inf" | "-infinity" => f64::NEG_INFINITY,
                "nan" => f64::NAN,
                _ => text.parse::<f64>().map_err(|_| {
                    Fault::value_error(format!("could not convert string to float: {}", value.repr()))
                })?,
            }
        }
        other => other.as_float().ok_or_else(|| {
            Fault::type_error(format!(
                "float() argument must be a string or a real number, not '{}'",
                other.type_name()
            ))
        })?,
    };
    Ok(Value::Float(f))
}

fn bool(args: &ToolArgs, _ctx: &mut ToolContext<'_>) -> Result<Value, Interrupt> {
    Ok(Value::Bool(args.get(0, "value").is_some_and(Value::truthy)))
}

fn list(args: &ToolArgs, ctx: &mut ToolContext<'_>) -> Result<Value, Interrupt> {
    match args.get(0, "iterable") {
        None => Ok(Value::list(Vec::new())),
        Some(value) => Ok(Value::list(ops::collect(value, ctx.budget)?)),
    }
}

fn dict(args: &ToolArgs, ctx: &mut ToolContext<'_>) -> Result<Value, Interrupt> {
    match args.get(0, "mapping") {
        None | Some(Value::None) => Ok(Value::dict(Dict::new())),
        Some(Value::Dict(dict)) => Ok(Value::Dict(dict.clone())),
        Some(pairs) => Ok(Value::dict(ops::dict_from_pairs(ops::collect(pairs, ctx.budget)?)?)),
    }
}

fn range(args: &ToolArgs, _ctx: &mut ToolContext<'_>) -> Result<Value, Interrupt> {
    let first = args.int_arg("range", 0, "start")?.unwrap_or(0);
    let (start, stop) = match args.int_arg("range", 1, "stop")? {
        Some(stop) => (first, stop),
        None => (0, first),
    };
    let step = args.int_arg("range", 2, "step")?.unwrap_or(1);
    if step == 0 {
        return Err(Fault::value_error("range() arg 3 must not be zero").into());
    }
    Ok(Value::Range(RangeValue { start, stop, step }))
}

/// Sort with the script's `<`, failing on the first unordered pair.
fn sort_values(items: &mut [Value]) -> Result<(), Fault> {
    let mut error = None;
    items.sort_by(|a, b| match ops::order(a, b, "<") {
        Ok(ordering) => ordering.unwrap_or(Ordering::Equal),
        Err(fault) => {
            error.get_or_insert(fault);
            Ordering::Equal
        }
    });
    error.map_or(Ok(()), Err)
}

fn sorted(args: &ToolArgs, ctx: &mut ToolContext<'_>) -> Result<Value, Interrupt> {
    let mut items = ops::collect(args.required("sorted", 0, "iterable")?, ctx.budget)?;
    sort_values(&mut items)?;
    if args.keyword("reverse").is_some_and(Value::truthy) {
        items.reverse();
    }
    Ok(Value::list(items))
}

fn reversed(args: &ToolArgs, ctx: &mut ToolContext<'_>) -> Result<Value, Interrupt> {
    let value = args.required("reversed", 0, "sequence")?;
    if matches!(value, Value::Dict(_)) {
        return Err(Fault::type_error("'dict' object is not reversible").into());
    }
    let mut items = ops::collect(value, ctx.budget)?;
    items.reverse();
    Ok(Value::list(items))
}

fn extreme(
    name: &str,
    args: &ToolArgs,
    ctx: &mut ToolContext<'_>,
    wanted: Ordering,
) -> Result<Value, Interrupt> {
    let items = match args.positional.as_slice() {
        [single] => ops::collect(single, ctx.budget)?,
        many => many.to_vec(),
    };
    let mut best: Option<Value> = None;
    for (done, item) in items.into_iter().enumerate() {
        ctx.budget.pace(done)?;
        best = Some(match best {
            None => item,
            Some(current) => {
                if ops::order(&item, &current, if wanted == Ordering::Less { "<" } else { ">" })?
                    == Some(wanted)
                {
                    item
                } else {
                    current
                }
            }
        });
    }
    best.ok_or_else(|| Fault::value_error(format!("{name}() arg is an empty sequence")).into())
}

fn min(args: &ToolArgs, ctx: &mut ToolContext<'_>) -> Result<Value, Interrupt> {
    extreme("min", args, ctx, Ordering::Less)
}

fn max(args: &ToolArgs, ctx: &mut ToolContext<'_>) -> Result<Value, Interrupt> {
    extreme("max", args, ctx, Ordering::Greater)
}

fn sum(args: &ToolArgs, ctx: &mut ToolContext<'_>) -> Result<Value, Interrupt> {
    let start = args.get(1, "start").cloned().unwrap_or(Value::Int(0));
    if matches!(start, Value::Str(_)) {
        return Err(Fault::type_error("sum() can't sum strings [use ''.join(seq) instead]").into());
    }
    let mut total = start;
    for (done, item) in ops::iterate(args.required("sum", 0, "iterable")?)?.enumerate() {
        ctx.budget.pace(done)?;
        total = ops::binary(crate::ast::BinaryOp::Add, &total, &item, ctx.budget)?;
    }
    Ok(total)
}

fn abs(args: &ToolArgs, _ctx: &mut ToolContext<'_>) -> Result<Value, Interrupt> {
    match args.required("abs", 0, "x")? {
        Value::Float(f) => Ok(Value::Float(f.abs())),
        value @ (Value::Int(_) | Value::Bool(_)) => value
            .as_int()
            .and_then(i64::checked_abs)
            .map(Value::Int)
            .ok_or_else(|| Fault::new(FaultKind::OverflowError, "integer result too large").into()),
        other => Err(Fault::type_error(format!(
            "bad operand type for abs(): '{}'",
            other.type_name()
        ))
        .into()),
    }
}

fn round(args: &ToolArgs, _ctx: &mut ToolContext<'_>) -> Result<Value, Interrupt> {
    let value = args.required("round", 0, "x")?;
    let digits = args.int_arg("round", 1, "ndigits")?;
    match (value, digits) {
        (Value::Int(_) | Value::Bool(_), _) => Ok(Value::Int(value.as_int().unwrap_or(0))),
        (Value::Float(f), None) => {
            let rounded = f.round_ties_even();
            if !rounded.is_finite() || rounded.abs() >= 9.3e18 {
                return Err(Fault::new(FaultKind::OverflowError, "cannot convert float to integer").into());
            }
            Ok(Value::Int(rounded as i64))
        }
        (Value::Float(f), Some(n)) => {
            let scale = 10f64.powi(n.clamp(-308, 308) as i32);
            Ok(Value::Float((f * scale).round_ties_even() / scale))
        }
        (other, _) => Err(Fault::type_error(format!(
            "type {} doesn't define __round__ method",
            other.type_name()
        ))
        .into()),
    }
}

fn enumerate(args: &ToolArgs, ctx: &mut ToolContext<'_>) -> Result<Value, Interrupt> {
    let start = args.int_arg("enumerate", 1, "start")?.unwrap_or(0);
    let items = ops::collect(args.required("enumerate", 0, "iterable")?, ctx.budget)?;
    ctx.budget.check_alloc(items.len() * Value::tuple(Vec::new()).estimated_size())?;
    Ok(Value::list(
        items
            .into_iter()
            .zip(start..)
            .map(|(item, i)| Value::tuple(vec![Value::Int(i), item]))
            .collect(),
    ))
}

fn zip(args: &ToolArgs, ctx: &mut ToolContext<'_>) -> Result<Value, Interrupt> {
    let mut columns = args
        .positional
        .iter()
        .map(ops::iterate)
        .collect::<Result<Vec<_>, _>>()?;
    if columns.is_empty() {
        return Ok(Value::list(Vec::new()));
    }
    let mut rows = Vec::new();
    let mut total = 0usize;
    'rows: loop {
        ctx.budget.pace(rows.len())?;
        let mut row = Vec::with_capacity(columns.len());
        for column in &mut columns {
            match column.next() {
                Some(item) => row.push(item),
                None => break 'rows,
            }
        }
        let row = Value::tuple(row);
        total = total.saturating_add(row.estimated_size());
        ctx.budget.check_alloc(total)?;
        rows.push(row);
    }
    Ok(Value::list(rows))
}

fn type_name(args: &ToolArgs, _ctx: &mut ToolContext<'_>) -> Result<Value, Interrupt> {
    Ok(Value::str(args.required("type_name", 0, "value")?.type_name()))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rstest::rstest;

    use super::*;
    use crate::sandbox::{Budget, FilesystemPolicy, NetworkGuard, NetworkPolicy, OutputBuffer, ScopedFs};

    struct Harness {
        fs: ScopedFs,
        net: NetworkGuard,
        stdout: OutputBuffer,
        stderr: OutputBuffer,
        budget: Budget,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                fs: ScopedFs::new(FilesystemPolicy::Disabled),
                net: NetworkGuard::new(NetworkPolicy::Deny),
                stdout: OutputBuffer::default(),
                stderr: OutputBuffer::default(),
                budget: Budget::new(Duration::from_secs(5), 1 << 20),
            }
        }

        fn call(&mut self, name: &str, args: ToolArgs) -> Result<Value, Interrupt> {
            let tool = all()
                .into_iter()
                .find(|t| t.name == name)
                .expect("known builtin");
            let mut ctx = ToolContext {
                fs: &self.fs,
                net: &self.net,
                stdout: &mut self.stdout,
                stderr: &mut self.stderr,
                budget: &mut self.budget,
            };
            (tool.run)(&args, &mut ctx)
        }
    }

    fn positional(values: Vec<Value>) -> ToolArgs {
        ToolArgs::from_positional(values)
    }

    fn ints(values: &[i64]) -> Value {
        Value::list(values.iter().copied().map(Value::Int).collect())
    }

    #[test]
    fn print_joins_with_sep_and_end() {
        let mut h = Harness::new();
        h.call("print", positional(vec![Value::str("a"), Value::Int(1)])).expect("print");
        let args = ToolArgs {
            positional: vec![Value::str("x"), Value::str("y")],
            named: vec![("sep".into(), Value::str("-")), ("end".into(), Value::str("!"))],
        };
        h.call("print", args).expect("print");
        assert_eq!(h.stdout.as_str(), "a 1\nx-y!");
    }

    #[rstest]
    #[case("len", vec![Value::str("héllo")], Value::Int(5))]
    #[case("len", vec![ints(&[1, 2])], Value::Int(2))]
    #[case("int", vec![Value::str(" 42 ")], Value::Int(42))]
    #[case("int", vec![Value::Float(-2.7)], Value::Int(-2))]
    #[case("float", vec![Value::str("1.5")], Value::Float(1.5))]
    #[case("str", vec![Value::Float(3.0)], Value::str("3.0"))]
    #[case("bool", vec![Value::str("")], Value::Bool(false))]
    #[case("abs", vec![Value::Int(-3)], Value::Int(3))]
    #[case("round", vec![Value::Float(2.5)], Value::Int(2))]
    #[case("round", vec![Value::Float(3.14159), Value::Int(2)], Value::Float(3.14))]
    #[case("sum", vec![ints(&[1, 2, 3])], Value::Int(6))]
    #[case("min", vec![ints(&[3, 1, 2])], Value::Int(1))]
    #[case("max", vec![Value::Int(3), Value::Int(9), Value::Int(2)], Value::Int(9))]
    #[case("type_name", vec![Value::None], Value::str("NoneType"))]
    fn pure_functions(#[case] name: &str, #[case] args: Vec<Value>, #[case] want: Value) {
        let mut h = Harness::new();
        assert_eq!(h.call(name, positional(args)).expect(name), want);
    }

    #[test]
    fn sorted_and_reversed() {
        let mut h = Harness::new();
        let sorted = h.call("sorted", positional(vec![ints(&[3, 1, 2])])).expect("sorted");
        assert_eq!(sorted, ints(&[1, 2, 3]));
        let args = ToolArgs {
            positional: vec![ints(&[3, 1, 2])],
            named: vec![("reverse".into(), Value::Bool(true))],
        };
        assert_eq!(h.call("sorted", args).expect("sorted"), ints(&[3, 2, 1]));
        let reversed = h.call("reversed", positional(vec![Value::str("ab")])).expect("reversed");
        assert_eq!(reversed.repr(), "['b', 'a']");
    }

    #[test]
    fn sorting_mixed_types_is_type_error() {
        let mut h = Harness::new();
        let mixed = Value::list(vec![Value::Int(1), Value::str("a")]);
        match h.call("sorted", positional(vec![mixed])) {
            Err(Interrupt::Fault(f)) => assert_eq!(f.kind, FaultKind::TypeError),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn range_forms() {
        let mut h = Harness::new();
        let r = h.call("range", positional(vec![Value::Int(3)])).expect("range");
        assert_eq!(r, Value::Range(RangeValue { start: 0, stop: 3, step: 1 }));
        let listed = h.call("list", positional(vec![r])).expect("list");
        assert_eq!(listed, ints(&[0, 1, 2]));
        match h.call("range", positional(vec![Value::Int(0), Value::Int(5), Value::Int(0)])) {
            Err(Interrupt::Fault(f)) => assert_eq!(f.kind, FaultKind::ValueError),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn huge_range_cannot_be_listed() {
        let mut h = Harness::new();
        let r = h.call("range", positional(vec![Value::Int(1 << 40)])).expect("range");
        assert!(matches!(
            h.call("list", positional(vec![r])),
            Err(Interrupt::ResourceExceeded(_))
        ));
    }

    #[test]
    fn summing_past_the_deadline_times_out() {
        let mut h = Harness::new();
        h.budget = Budget::new(Duration::ZERO, 1 << 20);
        let r = h.call("range", positional(vec![Value::Int(1 << 40)])).expect("range");
        assert!(matches!(
            h.call("sum", positional(vec![r.clone()])),
            Err(Interrupt::Timeout)
        ));
        assert!(matches!(
            h.call("zip", positional(vec![r.clone(), r])),
            Err(Interrupt::Timeout)
        ));
    }

    #[test]
    fn zip_counts_every_row_against_the_budget() {
        let mut h = Harness::new();
        let r = h.call("range", positional(vec![Value::Int(1 << 40)])).expect("range");
        assert!(matches!(
            h.call("zip", positional(vec![r.clone(), r])),
            Err(Interrupt::ResourceExceeded(_))
        ));
        let peak = h.budget.usage().peak_memory_bytes;
        assert!(peak > 1024 && peak <= 1 << 20, "peak {peak}");
    }

    #[test]
    fn enumerate_and_zip() {
        let mut h = Harness::new();
        let pairs = h
            .call("enumerate", positional(vec![Value::str("ab")]))
            .expect("enumerate");
        assert_eq!(pairs.repr(), "[(0, 'a'), (1, 'b')]");
        let zipped = h
            .call("zip", positional(vec![ints(&[1, 2, 3]), Value::str("xy")]))
            .expect("zip");
        assert_eq!(zipped.repr(), "[(1, 'x'), (2, 'y')]");
    }

    #[test]
    fn dict_from_pairs_and_bad_int() {
        let mut h = Harness::new();
        let pairs = Value::list(vec![Value::tuple(vec![Value::str("a"), Value::Int(1)])]);
        let d = h.call("dict", positional(vec![pairs])).expect("dict");
        assert_eq!(d.repr(), "{'a': 1}");
        match h.call("int", positional(vec![Value::str("abc")])) {
            Err(Interrupt::Fault(f)) => {
                assert_eq!(f.message, "invalid literal for int() with base 10: 'abc'")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn empty_min_is_value_error() {
        let mut h = Harness::new();
        match h.call("min", positional(vec![Value::list(vec![])])) {
            Err(Interrupt::Fault(f)) => assert_eq!(f.message, "min() arg is an empty sequence"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
