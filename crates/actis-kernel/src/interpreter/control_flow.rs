//! Control flow signals for loops and functions, and the ways a run can
//! stop early.
//!
//! `Flow` propagates `break`, `continue` and `return` through the statement
//! stack. Everything that ends the script (a fault, a denial, the deadline,
//! a resource bound, or a turn signal) travels as an `Interrupt` in the
//! error position so `?` unwinds it.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::value::Value;

/// Result of running one statement.
#[derive(Debug, Clone, Default)]
pub enum Flow {
    #[default]
    Normal,
    Break,
    Continue,
    Return(Value),
}

impl Flow {
    pub fn is_normal(&self) -> bool {
        matches!(self, Flow::Normal)
    }
}

/// Category of a fault, named the way a Python programmer would expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultKind {
    NameError,
    TypeError,
    ValueError,
    ZeroDivisionError,
    IndexError,
    KeyError,
    AttributeError,
    OverflowError,
    ToolError,
    CapabilityDenied,
    FilesystemDenied,
    NetworkDenied,
    Timeout,
    MemoryExceeded,
    CallDepthExceeded,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Structured description of what went wrong.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct Fault {
    pub kind: FaultKind,
    pub message: String,
    /// 1-based script line, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    /// The capability that was being called.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,
}

impl Fault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            line: None,
            capability: None,
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(FaultKind::TypeError, message)
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::new(FaultKind::ValueError, message)
    }

    pub fn with_capability(mut self, name: impl Into<String>) -> Self {
        self.capability = Some(name.into());
        self
    }

    pub fn with_line(mut self, line: usize) -> Self {
        self.line.get_or_insert(line);
        self
    }
}

/// How a script asked to end its turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnSignal {
    Respond { message: String },
    ContinueTurn,
}

/// Early termination of a run.
#[derive(Debug, Clone, PartialEq)]
pub enum Interrupt {
    /// An unhandled fault raised by the script.
    Fault(Fault),
    /// A capability, path or host outside the granted set.
    Denied(Fault),
    Timeout,
    ResourceExceeded(Fault),
    Signal(TurnSignal),
}

impl Interrupt {
    /// Attach the current line to a fault that does not have one yet.
    pub fn at_line(self, line: usize) -> Self {
        match self {
            Interrupt::Fault(f) => Interrupt::Fault(f.with_line(line)),
            Interrupt::Denied(f) => Interrupt::Denied(f.with_line(line)),
            Interrupt::ResourceExceeded(f) => Interrupt::ResourceExceeded(f.with_line(line)),
            other => other,
        }
    }

    pub fn memory(needed: usize, limit: usize) -> Self {
        Interrupt::ResourceExceeded(Fault::new(
            FaultKind::MemoryExceeded,
            format!("allocation of {needed} bytes exceeds the memory ceiling of {limit} bytes"),
        ))
    }
}

impl From<Fault> for Interrupt {
    fn from(fault: Fault) -> Self {
        Interrupt::Fault(fault)
    }
}
