//! One attempt, end to end: validate a stream of increments, assemble,
//! execute, report.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::assembler::{ScriptAssembler, SourceIncrement};
use crate::registry::CapabilityRegistry;
use crate::report::ExecutionReport;
use crate::sandbox::{ExecutionLimits, Sandbox, SandboxError};
use crate::tools::ToolSet;
use crate::validator::{IncrementalValidator, SessionState};

/// Drives a single attempt. Never retries; that is the caller's decision.
#[derive(Debug, Clone)]
pub struct Pipeline {
    validator: IncrementalValidator,
    assembler: ScriptAssembler,
    sandbox: Sandbox,
}

impl Pipeline {
    pub fn new(registry: Arc<CapabilityRegistry>, tools: Arc<ToolSet>) -> Self {
        Self {
            validator: IncrementalValidator::new(Arc::clone(&registry)),
            assembler: ScriptAssembler::new(),
            sandbox: Sandbox::new(registry, tools),
        }
    }

    pub fn standard() -> Self {
        Self::new(
            Arc::new(CapabilityRegistry::standard()),
            Arc::new(ToolSet::builtin()),
        )
    }

    pub fn validator(&self) -> &IncrementalValidator {
        &self.validator
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    /// Feed every increment, stopping early on a fatal diagnostic, then
    /// finalize and run the script if it was accepted.
    pub fn run_stream<I>(
        &self,
        increments: I,
        limits: &ExecutionLimits,
    ) -> Result<ExecutionReport, SandboxError>
    where
        I: IntoIterator,
        I::Item: Into<SourceIncrement>,
    {
        let mut session = self.validator.begin();
        for increment in increments {
            if self.validator.feed(&mut session, increment).is_err() {
                break;
            }
            if session.state() == SessionState::Halted {
                warn!(session = %session.id(), "validation halted, dropping remaining input");
                break;
            }
        }
        if session.state() == SessionState::Open {
            // Only fails on a session that is no longer open.
            let _ = self.validator.finalize(&mut session);
        }

        let diagnostics = session.diagnostics().to_vec();
        let script = match self.assembler.accept(session) {
            Ok(script) => script,
            Err(reason) => {
                debug!(%reason, "script not executed");
                return Ok(ExecutionReport::not_executed(diagnostics, reason));
            }
        };
        let result = self.sandbox.execute(&script, limits)?;
        Ok(ExecutionReport::executed(&script, result))
    }
}
