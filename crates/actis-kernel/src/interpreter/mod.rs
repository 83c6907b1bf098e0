//! The Action Script interpreter.
//!
//! Runs a validated [`Program`](crate::ast::Program) against a
//! [`SandboxContext`](crate::sandbox::SandboxContext). Values are immutable
//! and shared; mutation unshares them first, so assigning a list to a second
//! name copies it on the next write.

mod control_flow;
mod eval;
mod format;
mod methods;
pub mod ops;
mod scope;
mod value;

pub use control_flow::{Fault, FaultKind, Flow, Interrupt, TurnSignal};
pub use eval::{Interpreter, MAX_CALL_DEPTH};
pub use format::format_value;
pub use scope::Scope;
pub use value::{Dict, FunctionValue, RangeValue, Value, format_float};
