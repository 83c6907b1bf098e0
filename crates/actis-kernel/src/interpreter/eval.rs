//! Statement execution and expression evaluation.
//!
//! The interpreter walks the validated AST directly. Every named call goes
//! through the run's [`SandboxContext`]; there is no other way for a script
//! to reach a tool.
//!
//! Evaluation is recursive, so the recursive entry points return boxed
//! futures. The deadline is checked on every statement, loop iteration and
//! call, and the interpreter yields to the runtime every few hundred steps
//! so the surrounding timeout can fire even while a script spins.

use std::sync::Arc;

use futures::future::{FutureExt, LocalBoxFuture};

use crate::ast::{
    BinaryOp, Expr, ExprKind, FStringPart, Ident, Literal, LogicalOp, Program, Stmt, StmtKind, Target,
};
use crate::sandbox::SandboxContext;
use crate::tools::ToolArgs;

use super::control_flow::{Fault, FaultKind, Flow, Interrupt};
use super::format::format_value;
use super::methods::{self, MethodResult};
use super::ops;
use super::scope::Scope;
use super::value::{Dict, FunctionValue, Value};

/// Deepest allowed nesting of user function calls.
pub const MAX_CALL_DEPTH: usize = 64;

const YIELD_EVERY: u64 = 256;

/// A subscript chain rooted at a variable: `items[0]["k"]` is
/// `("items", [0, "k"])`.
type Place = (String, Vec<Value>);

fn name_error(name: &str) -> Fault {
    Fault::new(FaultKind::NameError, format!("name '{name}' is not defined"))
}

fn literal(lit: &Literal) -> Value {
    match lit {
        Literal::None => Value::None,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Int(i) => Value::Int(*i),
        Literal::Float(f) => Value::Float(*f),
        Literal::Str(s) => Value::str(s.as_str()),
    }
}

/// Mutable access to one element of a container, unsharing it first.
fn child_mut<'v>(value: &'v mut Value, index: &Value) -> Result<&'v mut Value, Fault> {
    let owner = value.type_name();
    match value {
        Value::List(items) | Value::Tuple(items) => {
            let i = index.as_int().ok_or_else(|| {
                Fault::type_error(format!(
                    "{owner} indices must be integers, not {}",
                    index.type_name()
                ))
            })?;
            let pos = ops::normalize_index(i, items.len()).ok_or_else(|| {
                Fault::new(FaultKind::IndexError, format!("{owner} index out of range"))
            })?;
            Arc::make_mut(items)
                .get_mut(pos)
                .ok_or_else(|| Fault::new(FaultKind::IndexError, "index out of range"))
        }
        Value::Dict(dict) => {
            index.check_hashable()?;
            Arc::make_mut(dict)
                .get_mut(index)
                .ok_or_else(|| Fault::new(FaultKind::KeyError, index.repr()))
        }
        other => Err(Fault::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

fn navigate_mut<'v>(root: &'v mut Value, path: &[Value]) -> Result<&'v mut Value, Fault> {
    let mut current = root;
    for index in path {
        current = child_mut(current, index)?;
    }
    Ok(current)
}

/// Tree-walking interpreter for one run.
pub struct Interpreter<'a> {
    scope: Scope,
    ctx: &'a mut SandboxContext,
    call_depth: usize,
    line_starts: Vec<usize>,
}

impl<'a> Interpreter<'a> {
    /// `source` is only used to turn spans into line numbers.
    pub fn new(ctx: &'a mut SandboxContext, source: &str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self {
            scope: Scope::new(),
            ctx,
            call_depth: 0,
            line_starts,
        }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Run a program to completion or until something interrupts it.
    pub async fn run(&mut self, program: &Program) -> Result<(), Interrupt> {
        self.exec_block(&program.body).await.map(|_| ())
    }

    /// The script's designated output: the top-level `result` variable.
    pub fn returned_value(&self) -> Option<serde_json::Value> {
        self.scope.get_global("result").map(Value::to_json)
    }

    fn line_of(&self, offset: usize) -> usize {
        self.line_starts
            .partition_point(|&start| start <= offset)
            .max(1)
    }

    async fn tick(&mut self) -> Result<(), Interrupt> {
        let budget = self.ctx.budget_mut();
        let steps = budget.step();
        if budget.expired() {
            return Err(Interrupt::Timeout);
        }
        if steps % YIELD_EVERY == 0 {
            tokio::task::yield_now().await;
        }
        Ok(())
    }

    fn exec_block<'s>(&'s mut self, body: &'s [Stmt]) -> LocalBoxFuture<'s, Result<Flow, Interrupt>> {
        async move {
            for stmt in body {
                let line = self.line_of(stmt.span.start);
                let flow = self.exec_stmt(stmt).await.map_err(|e| e.at_line(line))?;
                let live = self.scope.live_bytes();
                self.ctx
                    .budget_mut()
                    .set_live(live)
                    .map_err(|e| e.at_line(line))?;
                if !flow.is_normal() {
                    return Ok(flow);
                }
            }
            Ok(Flow::Normal)
        }
        .boxed_local()
    }

    async fn exec_stmt(&mut self, stmt: &Stmt) -> Result<Flow, Interrupt> {
        self.tick().await?;
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.eval(expr).await?;
            }
            StmtKind::Assign { target, value } => {
                let value = self.eval(value).await?;
                self.assign(target, value).await?;
            }
            StmtKind::AugAssign { target, op, value } => {
                self.aug_assign(target, *op, value).await?;
            }
            StmtKind::If { branches, orelse } => {
                for branch in branches {
                    if self.eval(&branch.cond).await?.truthy() {
                        return self.exec_block(&branch.body).await;
                    }
                }
                if let Some(body) = orelse {
                    return self.exec_block(body).await;
                }
            }
            StmtKind::For { targets, iter, body } => {
                let items = ops::iterate(&self.eval(iter).await?)?;
                for item in items {
                    self.tick().await?;
                    self.bind(targets, item)?;
                    match self.exec_block(body).await? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            StmtKind::While { cond, body } => loop {
                self.tick().await?;
                if !self.eval(cond).await?.truthy() {
                    break;
                }
                match self.exec_block(body).await? {
                    Flow::Break => break,
                    Flow::Return(value) => return Ok(Flow::Return(value)),
                    Flow::Normal | Flow::Continue => {}
                }
            },
            StmtKind::FunctionDef(def) => {
                let mut defaults = Vec::with_capacity(def.params.len());
                for param in &def.params {
                    defaults.push(match &param.default {
                        Some(expr) => Some(self.eval(expr).await?),
                        None => None,
                    });
                }
                let function = FunctionValue {
                    def: Arc::clone(def),
                    defaults,
                };
                self.scope
                    .set(def.name.name.clone(), Value::Function(Arc::new(function)));
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr).await?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
            StmtKind::Pass => {}
        }
        Ok(Flow::Normal)
    }

    /// Bind loop variables: one name takes the item, several unpack it.
    fn bind(&mut self, names: &[Ident], value: Value) -> Result<(), Fault> {
        match names {
            [single] => {
                self.scope.set(single.name.clone(), value);
                Ok(())
            }
            _ => self.unpack(names, value),
        }
    }

    fn unpack(&mut self, names: &[Ident], value: Value) -> Result<(), Fault> {
        let items: Vec<Value> = ops::iterate(&value)
            .map_err(|_| {
                Fault::type_error(format!(
                    "cannot unpack non-iterable {} object",
                    value.type_name()
                ))
            })?
            .take(names.len() + 1)
            .collect();
        if items.len() < names.len() {
            return Err(Fault::value_error(format!(
                "not enough values to unpack (expected {}, got {})",
                names.len(),
                items.len()
            )));
        }
        if items.len() > names.len() {
            return Err(Fault::value_error(format!(
                "too many values to unpack (expected {})",
                names.len()
            )));
        }
        for (name, item) in names.iter().zip(items) {
            self.scope.set(name.name.clone(), item);
        }
        Ok(())
    }

    fn lookup(&self, name: &str) -> Result<Value, Fault> {
        if let Some(value) = self.scope.get(name) {
            return Ok(value.clone());
        }
        if self.ctx.is_capability(name) {
            return Ok(Value::Capability(name.into()));
        }
        Err(name_error(name))
    }

    /// Resolve an expression to a place in the scope, evaluating its indices.
    /// `None` when it is not a subscript chain over a bound variable.
    async fn place(&mut self, expr: &Expr) -> Result<Option<Place>, Interrupt> {
        let mut indices = Vec::new();
        let mut current = expr;
        let root = loop {
            match &current.kind {
                ExprKind::Name(name) => break name,
                ExprKind::Subscript { object, index } => {
                    indices.push(index.as_ref());
                    current = object.as_ref();
                }
                _ => return Ok(None),
            }
        };
        if !self.scope.contains(root) {
            return Ok(None);
        }
        let mut path = Vec::with_capacity(indices.len());
        for index in indices.into_iter().rev() {
            path.push(self.eval(index).await?);
        }
        Ok(Some((root.clone(), path)))
    }

    /// Read the current value at a place.
    fn resolve(&self, (root, path): &Place) -> Result<Value, Fault> {
        let mut value = self.lookup(root)?;
        for index in path {
            value = ops::subscript(&value, index)?;
        }
        Ok(value)
    }

    /// `container[key] = value`, in place when the container is a variable.
    fn store(
        &mut self,
        place: Option<Place>,
        temporary: Option<Value>,
        key: Value,
        value: Value,
    ) -> Result<(), Fault> {
        match (place, temporary) {
            (Some((root, path)), _) => {
                let slot = self.scope.get_mut(&root).ok_or_else(|| name_error(&root))?;
                let target = navigate_mut(slot, &path)?;
                let delta = ops::assign_index(target, key, value)?;
                self.scope.adjust(&root, delta);
            }
            // Assigning into a temporary only has to type-check.
            (None, Some(mut container)) => {
                ops::assign_index(&mut container, key, value)?;
            }
            (None, None) => {}
        }
        Ok(())
    }

    async fn assign(&mut self, target: &Target, value: Value) -> Result<(), Interrupt> {
        match target {
            Target::Name(ident) => self.scope.set(ident.name.clone(), value),
            Target::Tuple(names) => self.unpack(names, value)?,
            Target::Subscript { object, index } => {
                let place = self.place(object).await?;
                let temporary = match place {
                    Some(_) => None,
                    None => Some(self.eval(object).await?),
                };
                let key = self.eval(index).await?;
                self.store(place, temporary, key, value)?;
            }
        }
        Ok(())
    }

    async fn aug_assign(
        &mut self,
        target: &Target,
        op: BinaryOp,
        value: &Expr,
    ) -> Result<(), Interrupt> {
        match target {
            Target::Name(ident) => {
                let current = self.lookup(&ident.name)?;
                let rhs = self.eval(value).await?;
                let updated = ops::binary(op, &current, &rhs, self.ctx.budget_mut())?;
                drop(current);
                self.scope.set(ident.name.clone(), updated);
            }
            Target::Subscript { object, index } => {
                let place = self.place(object).await?;
                let container = match &place {
                    Some(place) => self.resolve(place)?,
                    None => self.eval(object).await?,
                };
                let key = self.eval(index).await?;
                let current = ops::subscript(&container, &key)?;
                let rhs = self.eval(value).await?;
                let updated = ops::binary(op, &current, &rhs, self.ctx.budget_mut())?;
                drop(current);
                let temporary = match place {
                    Some(_) => {
                        drop(container);
                        None
                    }
                    None => Some(container),
                };
                self.store(place, temporary, key, updated)?;
            }
            Target::Tuple(_) => {
                return Err(Fault::type_error(
                    "illegal expression for augmented assignment",
                )
                .into());
            }
        }
        Ok(())
    }

    fn eval<'s>(&'s mut self, expr: &'s Expr) -> LocalBoxFuture<'s, Result<Value, Interrupt>> {
        async move {
            match &expr.kind {
                ExprKind::Literal(lit) => Ok(literal(lit)),
                ExprKind::FString(parts) => self.eval_fstring(parts).await,
                ExprKind::Name(name) => Ok(self.lookup(name)?),
                ExprKind::List(items) => Ok(Value::list(self.eval_all(items).await?)),
                ExprKind::Tuple(items) => Ok(Value::tuple(self.eval_all(items).await?)),
                ExprKind::Dict(entries) => {
                    let mut dict = Dict::new();
                    for (key, value) in entries {
                        let key = self.eval(key).await?;
                        let value = self.eval(value).await?;
                        dict.insert(key, value)?;
                    }
                    Ok(Value::dict(dict))
                }
                ExprKind::Call { func, args, kwargs } => self.eval_call(func, args, kwargs).await,
                ExprKind::Attribute { object, attr } => {
                    let value = self.eval(object).await?;
                    Err(Fault::new(
                        FaultKind::AttributeError,
                        format!(
                            "'{}' object attribute '{}' can only be called",
                            value.type_name(),
                            attr.name
                        ),
                    )
                    .into())
                }
                ExprKind::Subscript { object, index } => {
                    let object = self.eval(object).await?;
                    let index = self.eval(index).await?;
                    Ok(ops::subscript(&object, &index)?)
                }
                ExprKind::Slice { object, lower, upper } => {
                    let object = self.eval(object).await?;
                    let lower = match lower {
                        Some(expr) => Some(self.eval(expr).await?),
                        None => None,
                    };
                    let upper = match upper {
                        Some(expr) => Some(self.eval(expr).await?),
                        None => None,
                    };
                    Ok(ops::slice(&object, lower.as_ref(), upper.as_ref())?)
                }
                ExprKind::Unary { op, operand } => {
                    let value = self.eval(operand).await?;
                    Ok(ops::unary(*op, &value)?)
                }
                ExprKind::Binary { left, op, right } => {
                    let left = self.eval(left).await?;
                    let right = self.eval(right).await?;
                    ops::binary(*op, &left, &right, self.ctx.budget_mut())
                }
                ExprKind::Compare { left, op, right } => {
                    let left = self.eval(left).await?;
                    let right = self.eval(right).await?;
                    Ok(Value::Bool(ops::compare(*op, &left, &right)?))
                }
                ExprKind::Logical { left, op, right } => {
                    let left = self.eval(left).await?;
                    let short_circuit = match op {
                        LogicalOp::And => !left.truthy(),
                        LogicalOp::Or => left.truthy(),
                    };
                    if short_circuit {
                        Ok(left)
                    } else {
                        self.eval(right).await
                    }
                }
                ExprKind::IfElse { cond, then, orelse } => {
                    if self.eval(cond).await?.truthy() {
                        self.eval(then).await
                    } else {
                        self.eval(orelse).await
                    }
                }
            }
        }
        .boxed_local()
    }

    async fn eval_all(&mut self, exprs: &[Expr]) -> Result<Vec<Value>, Interrupt> {
        let mut values = Vec::with_capacity(exprs.len());
        for expr in exprs {
            values.push(self.eval(expr).await?);
        }
        Ok(values)
    }

    async fn eval_kwargs(&mut self, kwargs: &[(Ident, Expr)]) -> Result<Vec<(String, Value)>, Interrupt> {
        let mut named = Vec::with_capacity(kwargs.len());
        for (name, expr) in kwargs {
            named.push((name.name.clone(), self.eval(expr).await?));
        }
        Ok(named)
    }

    async fn eval_fstring(&mut self, parts: &[FStringPart]) -> Result<Value, Interrupt> {
        let mut text = String::new();
        for part in parts {
            match part {
                FStringPart::Text(literal) => text.push_str(literal),
                FStringPart::Field { expr, spec } => {
                    let value = self.eval(expr).await?;
                    let field = format_value(&value, spec.as_deref())?;
                    self.ctx
                        .budget_mut()
                        .check_alloc(text.len() + field.len())?;
                    text.push_str(&field);
                }
            }
        }
        Ok(Value::str(text))
    }

    async fn eval_call(
        &mut self,
        func: &Expr,
        args: &[Expr],
        kwargs: &[(Ident, Expr)],
    ) -> Result<Value, Interrupt> {
        if let ExprKind::Attribute { object, attr } = &func.kind {
            return self.call_method(object, &attr.name, args, kwargs).await;
        }
        let callee = self.eval(func).await?;
        let positional = self.eval_all(args).await?;
        let named = self.eval_kwargs(kwargs).await?;
        self.tick().await?;
        self.call_value(callee, positional, named).await
    }

    async fn call_value(
        &mut self,
        callee: Value,
        positional: Vec<Value>,
        named: Vec<(String, Value)>,
    ) -> Result<Value, Interrupt> {
        match callee {
            Value::Function(function) => self.call_function(function, positional, named).await,
            Value::Capability(name) => {
                self.ctx
                    .invoke(&name, ToolArgs { positional, named })
                    .await
            }
            other => Err(Fault::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))
            .into()),
        }
    }

    async fn call_method(
        &mut self,
        object: &Expr,
        name: &str,
        args: &[Expr],
        kwargs: &[(Ident, Expr)],
    ) -> Result<Value, Interrupt> {
        let place = self.place(object).await?;
        let receiver = match &place {
            Some(place) => self.resolve(place)?,
            None => self.eval(object).await?,
        };
        let positional = self.eval_all(args).await?;
        if !kwargs.is_empty() {
            return Err(Fault::type_error(format!(
                "{}.{name}() takes no keyword arguments",
                receiver.type_name()
            ))
            .into());
        }
        self.tick().await?;

        match place {
            Some((root, path)) if methods::is_mutating(&receiver, name) => {
                // The receiver must be the only handle on the value so the
                // update happens without copying it.
                drop(receiver);
                let slot = self.scope.get_mut(&root).ok_or_else(|| name_error(&root))?;
                let target = navigate_mut(slot, &path)?;
                let MethodResult { value, delta } =
                    methods::call(target, name, positional, self.ctx.budget_mut())?;
                self.scope.adjust(&root, delta);
                Ok(value)
            }
            _ => {
                let mut receiver = receiver;
                Ok(methods::call(&mut receiver, name, positional, self.ctx.budget_mut())?.value)
            }
        }
    }

    async fn call_function(
        &mut self,
        function: Arc<FunctionValue>,
        positional: Vec<Value>,
        named: Vec<(String, Value)>,
    ) -> Result<Value, Interrupt> {
        let def = &function.def;
        let name = def.name.name.as_str();
        if self.call_depth >= MAX_CALL_DEPTH {
            return Err(Interrupt::ResourceExceeded(Fault::new(
                FaultKind::CallDepthExceeded,
                format!("maximum call depth of {MAX_CALL_DEPTH} exceeded calling '{name}'"),
            )));
        }

        let params = &def.params;
        if positional.len() > params.len() {
            return Err(Fault::type_error(format!(
                "{name}() takes {} positional argument(s) but {} were given",
                params.len(),
                positional.len()
            ))
            .into());
        }
        let mut slots: Vec<Option<Value>> = positional.into_iter().map(Some).collect();
        slots.resize(params.len(), None);
        for (key, value) in named {
            let Some(index) = params.iter().position(|p| p.name.name == key) else {
                return Err(Fault::type_error(format!(
                    "{name}() got an unexpected keyword argument '{key}'"
                ))
                .into());
            };
            if slots[index].is_some() {
                return Err(Fault::type_error(format!(
                    "{name}() got multiple values for argument '{key}'"
                ))
                .into());
            }
            slots[index] = Some(value);
        }
        let mut bound = Vec::with_capacity(params.len());
        for ((param, slot), default) in params.iter().zip(slots).zip(&function.defaults) {
            let Some(value) = slot.or_else(|| default.clone()) else {
                return Err(Fault::type_error(format!(
                    "{name}() missing required argument: '{}'",
                    param.name.name
                ))
                .into());
            };
            bound.push((param.name.name.clone(), value));
        }

        self.scope.push_frame();
        for (param, value) in bound {
            self.scope.set(param, value);
        }
        self.call_depth += 1;
        let outcome = self.exec_block(&def.body).await;
        self.call_depth -= 1;
        self.scope.pop_frame();
        match outcome? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::None),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use uuid::Uuid;

    use super::*;
    use crate::registry::CapabilityRegistry;
    use crate::sandbox::ExecutionLimits;
    use crate::tools::ToolSet;
    use crate::validator::IncrementalValidator;

    const ALLOWED: &[&str] = &[
        "print", "len", "str", "int", "range", "sorted", "sum", "list", "enumerate", "respond",
    ];

    struct Outcome {
        result: Result<(), Interrupt>,
        stdout: String,
        returned: Option<serde_json::Value>,
    }

    async fn run_with(source: &str, memory: usize) -> Outcome {
        let registry = Arc::new(CapabilityRegistry::standard());
        let session = IncrementalValidator::new(Arc::clone(&registry)).validate(source);
        let program = session.program().expect("script parses").clone();
        let limits = ExecutionLimits::new(Duration::from_secs(5), memory, ALLOWED.iter().copied());
        let mut ctx = SandboxContext::new(registry, Arc::new(ToolSet::builtin()), &limits, Uuid::new_v4());
        let (result, returned) = {
            let mut interp = Interpreter::new(&mut ctx, source);
            let result = interp.run(&program).await;
            (result, interp.returned_value())
        };
        Outcome {
            result,
            stdout: ctx.stdout().as_str().to_string(),
            returned,
        }
    }

    async fn run(source: &str) -> Outcome {
        run_with(source, 1 << 20).await
    }

    fn fault(outcome: &Outcome) -> &Fault {
        match &outcome.result {
            Err(Interrupt::Fault(fault)) => fault,
            other => panic!("expected a fault, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn print_and_result() {
        let out = run("print('hi')\nresult = 2 + 2\n").await;
        assert!(out.result.is_ok());
        assert_eq!(out.stdout, "hi\n");
        assert_eq!(out.returned, Some(serde_json::json!(4)));
    }

    #[tokio::test]
    async fn control_flow_and_functions() {
        let source = "\
def fib(n):
    if n < 2:
        return n
    return fib(n - 1) + fib(n - 2)

total = 0
for i in range(10):
    if i % 2 == 0:
        continue
    if i > 7:
        break
    total += i
n = 0
while True:
    n += 1
    if n == 3:
        break
result = [fib(10), total, n]
";
        let out = run(source).await;
        assert!(out.result.is_ok(), "{:?}", out.result);
        assert_eq!(out.returned, Some(serde_json::json!([55, 16, 3])));
    }

    #[tokio::test]
    async fn in_place_mutation_through_subscripts() {
        let source = "\
data = {'items': [1, 2], 'count': 0}
data['items'].append(3)
data['count'] += 5
data['items'][0] = 10
pairs = [(1, 'a'), (2, 'b')]
names = []
for num, letter in pairs:
    names.append(f'{letter}{num}')
result = [data, names]
";
        let out = run(source).await;
        assert!(out.result.is_ok(), "{:?}", out.result);
        assert_eq!(
            out.returned,
            Some(serde_json::json!([{"items": [10, 2, 3], "count": 5}, ["a1", "b2"]]))
        );
    }

    #[tokio::test]
    async fn defaults_keywords_and_methods() {
        let source = "\
def greet(name, greeting='hello'):
    message = f'{greeting}, {name}!'
    return message.upper()

text = 'a b c'
sep = '-'
words = text.split()
result = [greet('ann'), greet(greeting='hi', name='bo'), sep.join(words), f'{3.14159:.2f}']
";
        let out = run(source).await;
        assert!(out.result.is_ok(), "{:?}", out.result);
        assert_eq!(
            out.returned,
            Some(serde_json::json!(["HELLO, ANN!", "HI, BO!", "a-b-c", "3.14"]))
        );
    }

    #[tokio::test]
    async fn faults_carry_line_numbers() {
        let out = run("x = 1\ny = {'a': 1}\nz = y['b']\n").await;
        let fault = fault(&out);
        assert_eq!(fault.kind, FaultKind::KeyError);
        assert_eq!(fault.message, "'b'");
        assert_eq!(fault.line, Some(3));
    }

    #[tokio::test]
    async fn division_by_zero_inside_function() {
        let out = run("def f(a):\n    return a // 0\n\nf(1)\n").await;
        let fault = fault(&out);
        assert_eq!(fault.kind, FaultKind::ZeroDivisionError);
        assert_eq!(fault.line, Some(2));
    }

    #[tokio::test]
    async fn unpack_mismatch_is_value_error() {
        let out = run("a, b = [1]\n").await;
        assert_eq!(fault(&out).message, "not enough values to unpack (expected 2, got 1)");
    }

    #[tokio::test]
    async fn unknown_method_is_attribute_error() {
        let out = run("x = 5\nx.upper()\n").await;
        let fault = fault(&out);
        assert_eq!(fault.kind, FaultKind::AttributeError);
        assert_eq!(fault.message, "'int' object has no attribute 'upper'");
    }

    #[test]
    fn runaway_recursion_hits_call_depth() {
        let out = std::thread::Builder::new()
            .stack_size(crate::sandbox::RUN_STACK_SIZE)
            .spawn(|| {
                tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("runtime")
                    .block_on(run("def down(n):\n    return down(n + 1)\n\ndown(0)\n"))
            })
            .expect("spawn")
            .join()
            .expect("run thread");
        match out.result {
            Err(Interrupt::ResourceExceeded(fault)) => {
                assert_eq!(fault.kind, FaultKind::CallDepthExceeded)
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn growing_a_string_exceeds_memory() {
        let out = run_with("s = 'x'\nwhile True:\n    s = s + s\n", 4096).await;
        assert!(matches!(out.result, Err(Interrupt::ResourceExceeded(_))));
    }

    #[tokio::test]
    async fn respond_ends_the_run_early() {
        let out = run("print('before')\nrespond('done')\nprint('after')\n").await;
        assert!(matches!(out.result, Err(Interrupt::Signal(_))));
        assert_eq!(out.stdout, "before\n");
    }

    #[tokio::test]
    async fn copies_do_not_alias() {
        let out = run("a = [1]\nb = a\nb.append(2)\nresult = [len(a), len(b)]\n").await;
        assert_eq!(out.returned, Some(serde_json::json!([1, 2])));
    }
}
