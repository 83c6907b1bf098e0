//! actis-kernel: validate agent action scripts while they are written, then
//! run them in a sandbox.
//!
//! This crate provides:
//!
//! - **Lexer / Parser / AST**: the Python-shaped action script language
//!   (logos tokens, chumsky grammar)
//! - **Registry**: the catalogue of capabilities a script may call
//! - **Validator**: incremental checking of a script as increments arrive
//! - **Assembler**: turns a finished validation session into a candidate
//! - **Interpreter / Sandbox / Tools**: capability-mediated execution under
//!   time, memory, filesystem and network limits
//! - **Report / Pipeline**: the outcome handed back to the orchestrator
//!
//! ```
//! use std::time::Duration;
//! use actis_kernel::{ExecutionLimits, Pipeline};
//!
//! let limits = ExecutionLimits::new(Duration::from_secs(2), 1 << 20, ["print"]);
//! let report = Pipeline::standard()
//!     .run_stream(["print('hi')\n", "result = 2 + 2\n"], &limits)
//!     .expect("sandbox starts");
//! let result = report.result().expect("executed");
//! assert_eq!(result.stdout, "hi\n");
//! ```

pub mod assembler;
pub mod ast;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod pipeline;
pub mod registry;
pub mod report;
pub mod sandbox;
pub mod tools;
pub mod validator;

pub use assembler::{CandidateScript, Rejection, ScriptAssembler, SourceIncrement};
pub use pipeline::Pipeline;
pub use registry::CapabilityRegistry;
pub use report::{Classification, ExecutionReport};
pub use sandbox::{
    ExecutionLimits, ExecutionResult, ExecutionStatus, FilesystemPolicy, NetworkPolicy, Sandbox,
    SandboxError,
};
pub use validator::{Diagnostic, IncrementalValidator, Session, Severity};
