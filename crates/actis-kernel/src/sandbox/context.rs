//! The per-run mediation layer.
//!
//! A `SandboxContext` is created for each run and owns everything the
//! script can reach: the scoped filesystem, the network guard, the captured
//! output, the resource budget and the state ledger. Every capability call
//! passes through [`SandboxContext::invoke`], which checks the allow-list
//! before any tool code runs.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::interpreter::{Fault, FaultKind, Interrupt, Value};
use crate::registry::CapabilityRegistry;
use crate::tools::{ToolArgs, ToolContext, ToolSet};

use super::fs::ScopedFs;
use super::limits::ExecutionLimits;
use super::net::NetworkGuard;
use super::output::OutputBuffer;
use super::result::{ResourceUsage, StateUpdate};

/// Items a built-in walks between deadline checks.
const PACE_STRIDE: usize = 4096;

/// Time and memory accounting for one run.
#[derive(Debug, Clone)]
pub struct Budget {
    deadline: Option<Instant>,
    memory_limit: usize,
    live: usize,
    peak: usize,
    steps: u64,
    capability_calls: u64,
}

impl Budget {
    pub fn new(wall_time: Duration, memory_limit: usize) -> Self {
        Self {
            deadline: Instant::now().checked_add(wall_time),
            memory_limit,
            live: 0,
            peak: 0,
            steps: 0,
            capability_calls: 0,
        }
    }

    /// Refuse an allocation of `bytes` that would not fit next to the live
    /// values.
    pub fn check_alloc(&mut self, bytes: usize) -> Result<(), Interrupt> {
        let projected = self.live.saturating_add(bytes);
        if projected > self.memory_limit {
            return Err(Interrupt::memory(bytes, self.memory_limit));
        }
        self.peak = self.peak.max(projected);
        Ok(())
    }

    /// Record the re-measured size of all live values.
    pub fn set_live(&mut self, bytes: usize) -> Result<(), Interrupt> {
        self.live = bytes;
        self.peak = self.peak.max(bytes);
        if bytes > self.memory_limit {
            return Err(Interrupt::ResourceExceeded(Fault::new(
                FaultKind::MemoryExceeded,
                format!(
                    "live values use {bytes} bytes, over the memory ceiling of {} bytes",
                    self.memory_limit
                ),
            )));
        }
        Ok(())
    }

    pub fn remaining_memory(&self) -> usize {
        self.memory_limit.saturating_sub(self.live)
    }

    pub fn expired(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Deadline check for built-ins that loop without returning to the
    /// interpreter. `done` is the number of items processed so far.
    pub fn pace(&self, done: usize) -> Result<(), Interrupt> {
        if done % PACE_STRIDE == 0 && self.expired() {
            return Err(Interrupt::Timeout);
        }
        Ok(())
    }

    /// Count a step and return the new total.
    pub fn step(&mut self) -> u64 {
        self.steps += 1;
        self.steps
    }

    pub fn usage(&self) -> ResourceUsage {
        ResourceUsage {
            peak_memory_bytes: self.peak,
            steps: self.steps,
            capability_calls: self.capability_calls,
        }
    }
}

fn with_capability(interrupt: Interrupt, name: &str) -> Interrupt {
    let tag = |fault: Fault| {
        if fault.capability.is_some() {
            fault
        } else {
            fault.with_capability(name)
        }
    };
    match interrupt {
        Interrupt::Fault(f) => Interrupt::Fault(tag(f)),
        Interrupt::Denied(f) => Interrupt::Denied(tag(f)),
        Interrupt::ResourceExceeded(f) => Interrupt::ResourceExceeded(tag(f)),
        other => other,
    }
}

/// Capability-checked context for one run.
pub struct SandboxContext {
    registry: Arc<CapabilityRegistry>,
    tools: Arc<ToolSet>,
    limits: ExecutionLimits,
    fs: ScopedFs,
    net: NetworkGuard,
    stdout: OutputBuffer,
    stderr: OutputBuffer,
    budget: Budget,
    state_updates: Vec<StateUpdate>,
    turn_id: Uuid,
}

impl SandboxContext {
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        tools: Arc<ToolSet>,
        limits: &ExecutionLimits,
        turn_id: Uuid,
    ) -> Self {
        Self {
            registry,
            tools,
            fs: ScopedFs::new(limits.filesystem.clone()),
            net: NetworkGuard::new(limits.network.clone()),
            stdout: OutputBuffer::default(),
            stderr: OutputBuffer::default(),
            budget: Budget::new(limits.wall_time, limits.memory_bytes),
            limits: limits.clone(),
            state_updates: Vec::new(),
            turn_id,
        }
    }

    /// Whether `name` is a registered capability (allowed or not).
    pub fn is_capability(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    pub fn budget(&self) -> &Budget {
        &self.budget
    }

    pub fn budget_mut(&mut self) -> &mut Budget {
        &mut self.budget
    }

    pub fn stdout(&self) -> &OutputBuffer {
        &self.stdout
    }

    pub fn stderr(&self) -> &OutputBuffer {
        &self.stderr
    }

    pub fn state_updates(&self) -> &[StateUpdate] {
        &self.state_updates
    }

    pub fn turn_id(&self) -> Uuid {
        self.turn_id
    }

    /// Check the allow-list and the call's shape, then run the tool.
    pub async fn invoke(&mut self, name: &str, args: ToolArgs) -> Result<Value, Interrupt> {
        let Some(signature) = self.registry.lookup(name) else {
            return Err(Fault::new(
                FaultKind::NameError,
                format!("name '{name}' is not defined"),
            )
            .into());
        };
        if signature.disallowed || !self.limits.allows(name) {
            warn!(capability = name, "capability denied");
            return Err(Interrupt::Denied(
                Fault::new(
                    FaultKind::CapabilityDenied,
                    format!("capability '{name}' is not in the allowed set"),
                )
                .with_capability(name),
            ));
        }

        for (keyword, _) in &args.named {
            if signature.param_named(keyword).is_none() {
                return Err(Fault::type_error(format!(
                    "{name}() got an unexpected keyword argument '{keyword}'"
                ))
                .with_capability(name)
                .into());
            }
        }
        if signature
            .max_args()
            .is_some_and(|max| args.positional.len() > max)
        {
            return Err(Fault::type_error(format!(
                "{name}() takes {} positional argument(s) but {} were given",
                signature.arity_text(),
                args.positional.len()
            ))
            .with_capability(name)
            .into());
        }
        for (index, param) in signature.positional().enumerate() {
            if param.required && index >= args.positional.len() && args.keyword(&param.name).is_none() {
                return Err(Fault::type_error(format!(
                    "{name}() missing required argument: '{}'",
                    param.name
                ))
                .with_capability(name)
                .into());
            }
        }

        let Some(tool) = self.tools.get(name) else {
            return Err(Fault::new(
                FaultKind::ToolError,
                format!("capability '{name}' has no implementation"),
            )
            .with_capability(name)
            .into());
        };
        let effectful = signature.effect.is_effectful();

        self.budget.capability_calls += 1;
        debug!(capability = name, "invoking capability");
        let mut ctx = ToolContext {
            fs: &self.fs,
            net: &self.net,
            stdout: &mut self.stdout,
            stderr: &mut self.stderr,
            budget: &mut self.budget,
        };
        let value = tool
            .execute(args, &mut ctx)
            .await
            .map_err(|interrupt| with_capability(interrupt, name))?;

        self.budget.check_alloc(value.estimated_size())?;
        if effectful && !value.is_none() {
            self.state_updates.push(StateUpdate {
                capability: name.to_string(),
                result: value.to_json(),
                timestamp_utc: Utc::now(),
                turn_id: self.turn_id,
            });
        }
        Ok(value)
    }

    /// Hand back the captured streams, the budget and the ledger.
    pub fn into_parts(self) -> (OutputBuffer, OutputBuffer, Budget, Vec<StateUpdate>) {
        (self.stdout, self.stderr, self.budget, self.state_updates)
    }
}

impl std::fmt::Debug for SandboxContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxContext")
            .field("turn_id", &self.turn_id)
            .field("allowed", &self.limits.allowed_capabilities)
            .field("tools", &self.tools)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::FilesystemPolicy;

    fn context(allowed: &[&str]) -> SandboxContext {
        let limits = ExecutionLimits::new(Duration::from_secs(5), 1 << 20, allowed.iter().copied());
        SandboxContext::new(
            Arc::new(CapabilityRegistry::standard()),
            Arc::new(ToolSet::builtin()),
            &limits,
            Uuid::new_v4(),
        )
    }

    #[test]
    fn budget_refuses_oversized_allocations() {
        let mut budget = Budget::new(Duration::from_secs(1), 100);
        budget.check_alloc(60).expect("fits");
        budget.set_live(60).expect("fits");
        assert!(matches!(budget.check_alloc(50), Err(Interrupt::ResourceExceeded(_))));
        assert_eq!(budget.usage().peak_memory_bytes, 60);
        assert_eq!(budget.remaining_memory(), 40);
    }

    #[test]
    fn zero_wall_time_is_already_expired() {
        let budget = Budget::new(Duration::ZERO, 100);
        assert!(budget.expired());
        assert!(matches!(budget.pace(0), Err(Interrupt::Timeout)));
        assert!(budget.pace(1).is_ok());
        assert!(Budget::new(Duration::from_secs(5), 100).pace(0).is_ok());
    }

    #[tokio::test]
    async fn capability_outside_allow_list_is_denied() {
        let mut ctx = context(&["print"]);
        let err = ctx
            .invoke("len", ToolArgs::from_positional(vec![Value::str("abc")]))
            .await
            .expect_err("denied");
        match err {
            Interrupt::Denied(fault) => {
                assert_eq!(fault.kind, FaultKind::CapabilityDenied);
                assert_eq!(fault.capability.as_deref(), Some("len"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn allowed_call_runs_and_counts() {
        let mut ctx = context(&["len"]);
        let value = ctx
            .invoke("len", ToolArgs::from_positional(vec![Value::str("abc")]))
            .await
            .expect("len");
        assert_eq!(value, Value::Int(3));
        assert_eq!(ctx.budget().usage().capability_calls, 1);
        assert!(ctx.state_updates().is_empty());
    }

    #[tokio::test]
    async fn unexpected_keyword_is_type_error() {
        let mut ctx = context(&["len"]);
        let mut args = ToolArgs::from_positional(vec![Value::str("abc")]);
        args.named.push(("bogus".into(), Value::None));
        match ctx.invoke("len", args).await {
            Err(Interrupt::Fault(fault)) => assert_eq!(fault.kind, FaultKind::TypeError),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn effectful_results_are_recorded() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("a.txt"), "alpha").expect("write");
        let limits = ExecutionLimits::new(Duration::from_secs(5), 1 << 20, ["read_files"])
            .with_filesystem(FilesystemPolicy::ReadOnlyScoped {
                root: dir.path().to_path_buf(),
            });
        let turn = Uuid::new_v4();
        let mut ctx = SandboxContext::new(
            Arc::new(CapabilityRegistry::standard()),
            Arc::new(ToolSet::builtin()),
            &limits,
            turn,
        );
        let args = ToolArgs::from_positional(vec![Value::list(vec![Value::str("a.txt")])]);
        ctx.invoke("read_files", args).await.expect("read");
        let updates = ctx.state_updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].capability, "read_files");
        assert_eq!(updates[0].result, serde_json::json!({"a.txt": "alpha"}));
        assert_eq!(updates[0].turn_id, turn);
    }
}
