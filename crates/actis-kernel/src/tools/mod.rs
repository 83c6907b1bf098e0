//! Capability implementations.
//!
//! Each registered capability is backed by a [`Tool`]. Tools never see the
//! interpreter: they get their arguments as values and a [`ToolContext`]
//! exposing only what the run was granted.

mod builtin;
mod context;
mod registry;

use async_trait::async_trait;

use crate::interpreter::{Fault, Interrupt, Value};

pub use builtin::register_builtins;
pub use context::ToolContext;
pub use registry::ToolSet;

/// A capability implementation.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The capability name this tool implements.
    fn name(&self) -> &str;

    /// Run the tool. Arguments have already passed the allow-list and the
    /// signature's arity checks.
    async fn execute(&self, args: ToolArgs, ctx: &mut ToolContext<'_>) -> Result<Value, Interrupt>;
}

/// Arguments of one call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArgs {
    pub positional: Vec<Value>,
    pub named: Vec<(String, Value)>,
}

impl ToolArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_positional(positional: Vec<Value>) -> Self {
        Self {
            positional,
            named: Vec::new(),
        }
    }

    pub fn keyword(&self, name: &str) -> Option<&Value> {
        self.named.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// The argument at `index`, or passed as `name=`.
    pub fn get(&self, index: usize, name: &str) -> Option<&Value> {
        self.positional.get(index).or_else(|| self.keyword(name))
    }

    pub fn required(&self, tool: &str, index: usize, name: &str) -> Result<&Value, Fault> {
        self.get(index, name)
            .ok_or_else(|| Fault::type_error(format!("{tool}() missing required argument: '{name}'")))
    }

    pub fn str_arg(&self, tool: &str, index: usize, name: &str) -> Result<&str, Fault> {
        let value = self.required(tool, index, name)?;
        value.as_str().ok_or_else(|| {
            Fault::type_error(format!(
                "{tool}() argument '{name}' must be str, not {}",
                value.type_name()
            ))
        })
    }

    /// An optional integer argument; `None` when absent or passed as `None`.
    pub fn int_arg(&self, tool: &str, index: usize, name: &str) -> Result<Option<i64>, Fault> {
        match self.get(index, name) {
            None | Some(Value::None) => Ok(None),
            Some(value) => value.as_int().map(Some).ok_or_else(|| {
                Fault::type_error(format!(
                    "{tool}() argument '{name}' must be int, not {}",
                    value.type_name()
                ))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_fills_missing_positional() {
        let args = ToolArgs {
            positional: vec![Value::Int(1)],
            named: vec![("b".into(), Value::str("x"))],
        };
        assert_eq!(args.get(0, "a"), Some(&Value::Int(1)));
        assert_eq!(args.str_arg("f", 1, "b"), Ok("x"));
        assert!(args.required("f", 2, "c").is_err());
    }

    #[test]
    fn int_arg_accepts_none() {
        let args = ToolArgs::from_positional(vec![Value::None, Value::str("s")]);
        assert_eq!(args.int_arg("f", 0, "n"), Ok(None));
        assert_eq!(args.int_arg("f", 5, "m"), Ok(None));
        let err = args.int_arg("f", 1, "k").expect_err("not an int");
        assert_eq!(err.message, "f() argument 'k' must be int, not str");
    }
}
