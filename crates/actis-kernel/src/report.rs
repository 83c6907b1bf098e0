//! The execution report handed back to the orchestrator.
//!
//! One report per attempt: the script's diagnostics plus either the result
//! of running it or the reason it was never run.

use std::fmt::{self, Write as _};

use serde::Serialize;
use uuid::Uuid;

use crate::assembler::{CandidateScript, Rejection};
use crate::sandbox::{ExecutionResult, ExecutionStatus};
use crate::validator::{Diagnostic, Severity};

/// What happened to the script.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportOutcome {
    Executed {
        script_id: Uuid,
        source: String,
        result: ExecutionResult,
    },
    NotExecuted {
        reason: Rejection,
    },
}

/// Where an attempt landed in the outcome taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    ValidationError,
    ValidationFatal,
    AssemblyRejection,
    Denied,
    Timeout,
    ResourceExceeded,
    Raised,
    Completed,
}

impl Classification {
    /// Whether the attempt produced a usable result.
    pub fn is_success(self) -> bool {
        self == Classification::Completed
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Classification::ValidationError => "validation error",
            Classification::ValidationFatal => "validation fatal",
            Classification::AssemblyRejection => "assembly rejection",
            Classification::Denied => "execution denied",
            Classification::Timeout => "execution timeout",
            Classification::ResourceExceeded => "execution resource-exceeded",
            Classification::Raised => "execution raised",
            Classification::Completed => "completed",
        })
    }
}

/// The record memory consolidation receives for a completed attempt.
#[derive(Debug, Clone, Serialize)]
pub struct ConsolidationRecord {
    pub intent: String,
    pub script: String,
    pub result: ExecutionResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub diagnostics: Vec<Diagnostic>,
    pub outcome: ReportOutcome,
}

impl ExecutionReport {
    pub fn executed(script: &CandidateScript, result: ExecutionResult) -> Self {
        Self {
            diagnostics: script.diagnostics().to_vec(),
            outcome: ReportOutcome::Executed {
                script_id: script.id(),
                source: script.source().to_string(),
                result,
            },
        }
    }

    pub fn not_executed(diagnostics: Vec<Diagnostic>, reason: Rejection) -> Self {
        Self {
            diagnostics,
            outcome: ReportOutcome::NotExecuted { reason },
        }
    }

    pub fn result(&self) -> Option<&ExecutionResult> {
        match &self.outcome {
            ReportOutcome::Executed { result, .. } => Some(result),
            ReportOutcome::NotExecuted { .. } => None,
        }
    }

    pub fn classify(&self) -> Classification {
        match &self.outcome {
            ReportOutcome::Executed { result, .. } => match result.status {
                ExecutionStatus::Completed => Classification::Completed,
                ExecutionStatus::Raised => Classification::Raised,
                ExecutionStatus::TimedOut => Classification::Timeout,
                ExecutionStatus::ResourceExceeded => Classification::ResourceExceeded,
                ExecutionStatus::Denied => Classification::Denied,
            },
            ReportOutcome::NotExecuted { reason } => match reason {
                Rejection::Halted { .. } => Classification::ValidationFatal,
                Rejection::Invalid { errors } => {
                    if errors.iter().any(|d| d.severity == Severity::Fatal) {
                        Classification::ValidationFatal
                    } else {
                        Classification::ValidationError
                    }
                }
                Rejection::NotFinalized | Rejection::Aborted | Rejection::Empty => {
                    Classification::AssemblyRejection
                }
            },
        }
    }

    /// The consolidation record, only for completed runs.
    pub fn consolidation_record(&self, intent: impl Into<String>) -> Option<ConsolidationRecord> {
        match &self.outcome {
            ReportOutcome::Executed { source, result, .. } if result.is_completed() => {
                Some(ConsolidationRecord {
                    intent: intent.into(),
                    script: source.clone(),
                    result: result.clone(),
                })
            }
            _ => None,
        }
    }

    /// Plain-text summary for the next generation attempt.
    pub fn feedback(&self) -> String {
        let classification = self.classify();
        let mut out = String::new();
        if classification.is_success() {
            let _ = writeln!(out, "Previous attempt completed.");
        } else {
            let _ = writeln!(out, "Previous attempt failed ({classification}).");
        }

        let findings: Vec<_> = self
            .diagnostics
            .iter()
            .filter(|d| d.severity >= Severity::Warning)
            .collect();
        if !findings.is_empty() {
            let _ = writeln!(out, "Diagnostics:");
            for diagnostic in findings {
                let _ = writeln!(out, "  {diagnostic}");
            }
        }

        match &self.outcome {
            ReportOutcome::NotExecuted { reason } => {
                let _ = writeln!(out, "Not executed: {reason}");
            }
            ReportOutcome::Executed { result, .. } => {
                if let Some(fault) = &result.fault {
                    match fault.line {
                        Some(line) => {
                            let _ = writeln!(out, "Fault at line {line}: {fault}");
                        }
                        None => {
                            let _ = writeln!(out, "Fault: {fault}");
                        }
                    }
                }
                if !result.stdout.is_empty() {
                    let _ = writeln!(out, "Output:\n{}", result.stdout.trim_end());
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::assembler::ScriptAssembler;
    use crate::interpreter::{Fault, FaultKind};
    use crate::registry::CapabilityRegistry;
    use crate::sandbox::ResourceUsage;
    use crate::validator::IncrementalValidator;

    fn result(status: ExecutionStatus, fault: Option<Fault>) -> ExecutionResult {
        ExecutionResult {
            status,
            stdout: "partial\n".into(),
            stderr: String::new(),
            returned_value: None,
            fault,
            wall_time: Duration::from_millis(3),
            resource_usage: ResourceUsage::default(),
            signal: None,
            state_updates: Vec::new(),
        }
    }

    fn candidate(source: &str) -> CandidateScript {
        let validator = IncrementalValidator::new(Arc::new(CapabilityRegistry::standard()));
        ScriptAssembler::new()
            .accept(validator.validate(source))
            .expect("valid")
    }

    #[test]
    fn completed_report_yields_consolidation_record() {
        let script = candidate("respond('ok')\n");
        let report = ExecutionReport::executed(&script, result(ExecutionStatus::Completed, None));
        assert_eq!(report.classify(), Classification::Completed);
        let record = report.consolidation_record("say ok").expect("record");
        assert_eq!(record.intent, "say ok");
        assert_eq!(record.script, "respond('ok')\n");
    }

    #[test]
    fn raised_report_has_no_record_and_explains_the_fault() {
        let script = candidate("respond('ok')\n");
        let mut fault = Fault::new(FaultKind::KeyError, "'missing'");
        fault.line = Some(4);
        let report = ExecutionReport::executed(&script, result(ExecutionStatus::Raised, Some(fault)));
        assert_eq!(report.classify(), Classification::Raised);
        assert!(report.consolidation_record("x").is_none());
        let feedback = report.feedback();
        assert!(feedback.starts_with("Previous attempt failed (execution raised)."));
        assert!(feedback.contains("Fault at line 4: KeyError: 'missing'"));
        assert!(feedback.contains("Output:\npartial"));
    }

    #[test]
    fn rejections_classify_by_reason() {
        let validator = IncrementalValidator::new(Arc::new(CapabilityRegistry::standard()));
        let session = validator.validate("y = undefined_name + 1\n");
        let diagnostics = session.diagnostics().to_vec();
        let reason = ScriptAssembler::new().accept(session).expect_err("invalid");
        let report = ExecutionReport::not_executed(diagnostics, reason);
        assert_eq!(report.classify(), Classification::ValidationError);
        assert!(report.feedback().contains("undefined_name"));

        let fatal = validator.validate("import os\n");
        let diagnostics = fatal.diagnostics().to_vec();
        let reason = ScriptAssembler::new().accept(fatal).expect_err("fatal");
        let report = ExecutionReport::not_executed(diagnostics, reason);
        assert_eq!(report.classify(), Classification::ValidationFatal);

        let empty = ExecutionReport::not_executed(Vec::new(), Rejection::Empty);
        assert_eq!(empty.classify(), Classification::AssemblyRejection);
    }

    #[test]
    fn report_serializes_with_outcome_tag() {
        let report = ExecutionReport::not_executed(Vec::new(), Rejection::Aborted);
        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["outcome"]["kind"], "not_executed");
        assert_eq!(json["outcome"]["reason"]["reason"], "aborted");
    }
}
