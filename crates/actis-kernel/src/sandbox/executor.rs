//! Runs an accepted script and captures everything about the run.

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::assembler::CandidateScript;
use crate::interpreter::{Fault, FaultKind, Interpreter, Interrupt};
use crate::registry::CapabilityRegistry;
use crate::tools::ToolSet;

use super::context::SandboxContext;
use super::limits::ExecutionLimits;
use super::result::{ExecutionResult, ExecutionStatus};

/// How long in-flight runtime tasks get to wind down after a run.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(100);

/// Stack for the run thread. The interpreter recurses per call frame and
/// per nested expression, so it needs room for the full call-depth ceiling
/// even in unoptimised builds.
pub(crate) const RUN_STACK_SIZE: usize = 256 * 1024 * 1024;

/// The sandbox could not be set up. Script outcomes are never errors.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("failed to build the execution runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error("allowed capability '{0}' has no implementation")]
    MissingImplementation(String),
    #[error("allowed capability '{0}' is not in the registry")]
    UnknownCapability(String),
    #[error("the run thread panicked")]
    RunPanicked,
}

/// Executes candidate scripts in isolation, one run at a time per call.
#[derive(Debug, Clone)]
pub struct Sandbox {
    registry: Arc<CapabilityRegistry>,
    tools: Arc<ToolSet>,
}

impl Sandbox {
    pub fn new(registry: Arc<CapabilityRegistry>, tools: Arc<ToolSet>) -> Self {
        Self { registry, tools }
    }

    /// The standard registry backed by the built-in tools.
    pub fn standard() -> Self {
        Self::new(
            Arc::new(CapabilityRegistry::standard()),
            Arc::new(ToolSet::builtin()),
        )
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    fn preflight(&self, limits: &ExecutionLimits) -> Result<(), SandboxError> {
        for name in &limits.allowed_capabilities {
            let Some(signature) = self.registry.lookup(name) else {
                return Err(SandboxError::UnknownCapability(name.clone()));
            };
            if !signature.disallowed && !self.tools.contains(name) {
                return Err(SandboxError::MissingImplementation(name.clone()));
            }
        }
        Ok(())
    }

    /// Run `script` under `limits`.
    ///
    /// The run gets its own thread and current-thread runtime, both gone
    /// before this returns. Blocking, so async callers go through
    /// `spawn_blocking`.
    #[tracing::instrument(skip_all, fields(script = %script.id()))]
    pub fn execute(
        &self,
        script: &CandidateScript,
        limits: &ExecutionLimits,
    ) -> Result<ExecutionResult, SandboxError> {
        self.preflight(limits)?;
        let span = tracing::Span::current();
        std::thread::scope(|scope| -> Result<ExecutionResult, SandboxError> {
            let worker = std::thread::Builder::new()
                .name("actis-run".into())
                .stack_size(RUN_STACK_SIZE)
                .spawn_scoped(scope, || {
                    let _entered = span.enter();
                    self.run_to_completion(script, limits)
                })?;
            worker.join().map_err(|_| SandboxError::RunPanicked)?
        })
    }

    fn run_to_completion(
        &self,
        script: &CandidateScript,
        limits: &ExecutionLimits,
    ) -> Result<ExecutionResult, SandboxError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let mut ctx = SandboxContext::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.tools),
            limits,
            Uuid::new_v4(),
        );
        let started = Instant::now();
        let (outcome, returned) = {
            let mut interpreter = Interpreter::new(&mut ctx, script.source());
            let outcome = runtime.block_on(async {
                tokio::time::timeout(limits.wall_time, interpreter.run(script.program())).await
            });
            let returned = interpreter.returned_value();
            (outcome, returned)
        };
        let wall_time = started.elapsed();
        runtime.shutdown_timeout(SHUTDOWN_GRACE);

        let interrupt = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(interrupt)) => Some(interrupt),
            Err(_elapsed) => Some(Interrupt::Timeout),
        };
        let (stdout, mut stderr, budget, state_updates) = ctx.into_parts();

        let mut signal = None;
        let (status, fault) = match interrupt {
            None => (ExecutionStatus::Completed, None),
            Some(Interrupt::Signal(turn)) => {
                signal = Some(turn);
                (ExecutionStatus::Completed, None)
            }
            Some(Interrupt::Fault(fault)) => (ExecutionStatus::Raised, Some(fault)),
            Some(Interrupt::Denied(fault)) => (ExecutionStatus::Denied, Some(fault)),
            Some(Interrupt::ResourceExceeded(fault)) => {
                (ExecutionStatus::ResourceExceeded, Some(fault))
            }
            Some(Interrupt::Timeout) => (
                ExecutionStatus::TimedOut,
                Some(Fault::new(
                    FaultKind::Timeout,
                    format!(
                        "execution exceeded the wall-time ceiling of {} ms",
                        limits.wall_time.as_millis()
                    ),
                )),
            ),
        };
        if let Some(fault) = &fault {
            match fault.line {
                Some(line) => stderr.write(&format!("line {line}: {fault}\n")),
                None => stderr.write(&format!("{fault}\n")),
            }
        }

        let usage = budget.usage();
        if status == ExecutionStatus::Denied {
            warn!(fault = ?fault, "script denied");
        }
        info!(
            %status,
            wall_time_ms = wall_time.as_millis() as u64,
            peak_memory = usage.peak_memory_bytes,
            steps = usage.steps,
            capability_calls = usage.capability_calls,
            "script executed"
        );

        Ok(ExecutionResult {
            status,
            stdout: stdout.into_string(),
            stderr: stderr.into_string(),
            returned_value: if status == ExecutionStatus::Completed {
                returned
            } else {
                None
            },
            fault,
            wall_time,
            resource_usage: usage,
            signal,
            state_updates,
        })
    }
}
