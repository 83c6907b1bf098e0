//! Sandboxed execution of accepted scripts.
//!
//! [`Sandbox::execute`] runs one [`CandidateScript`](crate::assembler::CandidateScript)
//! under [`ExecutionLimits`] and always answers with an [`ExecutionResult`]
//! unless the sandbox itself cannot be stood up.

mod context;
mod executor;
mod fs;
mod limits;
mod net;
mod output;
mod result;

pub use context::{Budget, SandboxContext};
pub(crate) use executor::RUN_STACK_SIZE;
pub use executor::{Sandbox, SandboxError};
pub use fs::{FsError, ScopedFs};
pub use limits::{ExecutionLimits, FilesystemPolicy, NetworkPolicy};
pub use net::{HttpResponse, NetError, NetworkGuard};
pub use output::{OUTPUT_LIMIT, OutputBuffer, TRUNCATION_MARKER};
pub use result::{ExecutionResult, ExecutionStatus, ResourceUsage, StateUpdate};
