//! Script assembly: turns a finished validation session into an executable
//! candidate, or says why it cannot.

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::ast::Program;
use crate::validator::{Diagnostic, Session, SessionState, Severity};

/// One chunk of script text as it arrived from the generator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceIncrement(String);

impl SourceIncrement {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn text(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for SourceIncrement {
    fn from(text: &str) -> Self {
        Self(text.to_string())
    }
}

impl From<String> for SourceIncrement {
    fn from(text: String) -> Self {
        Self(text)
    }
}

/// Increments of one session, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct ScriptBuffer {
    increments: Vec<SourceIncrement>,
}

impl ScriptBuffer {
    pub fn push(&mut self, increment: SourceIncrement) {
        self.increments.push(increment);
    }

    /// The increments concatenated.
    pub fn text(&self) -> String {
        self.increments.iter().map(SourceIncrement::text).collect()
    }

    pub fn increments(&self) -> &[SourceIncrement] {
        &self.increments
    }

    /// No text at all, even if empty increments were received.
    pub fn is_empty(&self) -> bool {
        self.increments.iter().all(SourceIncrement::is_empty)
    }
}

/// A validated script, ready for the sandbox.
#[derive(Debug, Clone)]
pub struct CandidateScript {
    id: Uuid,
    source: String,
    program: Program,
    diagnostics: Vec<Diagnostic>,
    bindings: Vec<String>,
}

impl CandidateScript {
    /// The id of the session it was assembled from.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Non-blocking diagnostics carried over from validation.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Names bound at the top level.
    pub fn bindings(&self) -> &[String] {
        &self.bindings
    }
}

/// Why a session could not become a candidate.
#[derive(Debug, Clone, Error, Serialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum Rejection {
    #[error("session has not been finalized")]
    NotFinalized,
    #[error("validation halted: {diagnostic}")]
    Halted { diagnostic: Diagnostic },
    #[error("script has {} blocking diagnostic(s)", errors.len())]
    Invalid { errors: Vec<Diagnostic> },
    #[error("session was aborted")]
    Aborted,
    #[error("script is empty")]
    Empty,
}

fn blocking(session: &Session) -> Vec<Diagnostic> {
    session
        .diagnostics()
        .iter()
        .filter(|d| d.severity >= Severity::Error)
        .cloned()
        .collect()
}

/// Assembles candidates from finished sessions.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptAssembler;

impl ScriptAssembler {
    pub fn new() -> Self {
        Self
    }

    /// Take the finished session and produce a candidate.
    pub fn accept(&self, session: Session) -> Result<CandidateScript, Rejection> {
        let rejection = match session.state() {
            SessionState::Closed => Some(Rejection::Aborted),
            _ if session.buffer().is_empty() => Some(Rejection::Empty),
            SessionState::Open => Some(Rejection::NotFinalized),
            SessionState::Halted => Some(match session.fatal() {
                Some(diagnostic) => Rejection::Halted {
                    diagnostic: diagnostic.clone(),
                },
                None => Rejection::Invalid {
                    errors: blocking(&session),
                },
            }),
            SessionState::Finalized => {
                let errors = blocking(&session);
                (!errors.is_empty()).then_some(Rejection::Invalid { errors })
            }
        };
        if let Some(rejection) = rejection {
            info!(session = %session.id(), "script rejected: {rejection}");
            return Err(rejection);
        }

        let Some(program) = session.program().cloned() else {
            return Err(Rejection::NotFinalized);
        };
        debug!(
            session = %session.id(),
            statements = program.body.len(),
            "script assembled"
        );
        Ok(CandidateScript {
            id: session.id(),
            source: session.source(),
            program,
            diagnostics: session.diagnostics().to_vec(),
            bindings: session.bindings().to_vec(),
        })
    }
}
