//! Incremental validation of action scripts.
//!
//! A script arrives as a stream of text increments while it is being
//! generated. The validator checks each increment as it lands and reports
//! what it can prove so far:
//!
//! - **Lexical and structural errors**: bad tokens, unterminated strings,
//!   mismatched brackets, indentation errors
//! - **Names**: every name used is bound somewhere in the script or is a
//!   registered capability (resolved at finalize, so forward references work)
//! - **Calls**: arity, keyword names and literal argument shapes against the
//!   capability registry
//! - **Safety**: imports, dunder access and forbidden capabilities are fatal
//!   and stop intake immediately
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use actis_kernel::registry::CapabilityRegistry;
//! use actis_kernel::validator::IncrementalValidator;
//!
//! let validator = IncrementalValidator::new(Arc::new(CapabilityRegistry::standard()));
//! let mut session = validator.begin();
//! validator.feed(&mut session, "x = len([1, 2")?;
//! validator.feed(&mut session, "])\nrespond(str(x))\n")?;
//! let diagnostics = validator.finalize(&mut session)?;
//! assert!(diagnostics.iter().all(|d| !d.is_blocking()));
//! # Ok::<(), actis_kernel::validator::SessionError>(())
//! ```

mod checks;
mod diagnostic;
mod scanner;
mod scope_tracker;
mod state;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

pub use diagnostic::{Diagnostic, DiagnosticCode, Location, Position, Severity};
pub use scope_tracker::{PendingRef, RefKind, ScopeTracker};

use crate::assembler::{ScriptBuffer, SourceIncrement};
use crate::ast::Program;
use crate::registry::CapabilityRegistry;
use state::ParseState;

/// Lifecycle of a validation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Accepting increments.
    Open,
    /// End of input seen; the diagnostics are final.
    Finalized,
    /// A fatal diagnostic stopped intake.
    Halted,
    /// Aborted by the caller.
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Open => write!(f, "open"),
            SessionState::Finalized => write!(f, "finalized"),
            SessionState::Halted => write!(f, "halted"),
            SessionState::Closed => write!(f, "closed"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session {id} is {state} and no longer accepts input")]
    NotOpen { id: Uuid, state: SessionState },
}

/// One script being validated.
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    state: SessionState,
    parse: Option<ParseState>,
    buffer: ScriptBuffer,
    diagnostics: Vec<Diagnostic>,
    program: Option<Program>,
    bindings: Vec<String>,
}

impl Session {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Every diagnostic emitted so far, in emission order.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// The first fatal diagnostic, if intake was halted.
    pub fn fatal(&self) -> Option<&Diagnostic> {
        self.diagnostics
            .iter()
            .find(|d| d.severity == Severity::Fatal)
    }

    pub fn has_blocking(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_blocking)
    }

    pub fn buffer(&self) -> &ScriptBuffer {
        &self.buffer
    }

    /// The text received so far.
    pub fn source(&self) -> String {
        self.buffer.text()
    }

    /// The statement tree, available once finalized.
    pub fn program(&self) -> Option<&Program> {
        self.program.as_ref()
    }

    /// Names the script binds at top level, available once finalized.
    pub fn bindings(&self) -> &[String] {
        &self.bindings
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Open => Ok(()),
            state => Err(SessionError::NotOpen { id: self.id, state }),
        }
    }

    fn settle_halt(&mut self) {
        if self.parse.as_ref().is_some_and(ParseState::is_halted) {
            self.state = SessionState::Halted;
            // Intake is over; the parse state is no longer needed.
            self.parse = None;
        }
    }
}

/// Creates sessions and drives them with a shared capability registry.
#[derive(Debug, Clone)]
pub struct IncrementalValidator {
    registry: Arc<CapabilityRegistry>,
}

impl IncrementalValidator {
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    /// Start a new, empty session.
    pub fn begin(&self) -> Session {
        let id = Uuid::new_v4();
        debug!(session = %id, "validation session opened");
        Session {
            id,
            state: SessionState::Open,
            parse: Some(ParseState::new(Arc::clone(&self.registry))),
            buffer: ScriptBuffer::default(),
            diagnostics: Vec::new(),
            program: None,
            bindings: Vec::new(),
        }
    }

    /// Append an increment and return the diagnostics it produced.
    ///
    /// An empty increment is accepted and produces nothing. If a fatal
    /// diagnostic is emitted the session halts and later calls fail.
    pub fn feed(
        &self,
        session: &mut Session,
        increment: impl Into<SourceIncrement>,
    ) -> Result<Vec<Diagnostic>, SessionError> {
        session.ensure_open()?;
        let increment = increment.into();
        debug!(
            session = %session.id,
            bytes = increment.text().len(),
            "validating increment"
        );

        let mut new = Vec::new();
        if let Some(parse) = session.parse.as_mut() {
            parse.feed(increment.text(), &mut new);
        }
        session.buffer.push(increment);
        session.diagnostics.extend(new.iter().cloned());
        session.settle_halt();
        Ok(new)
    }

    /// Mark end of input and run the whole-script checks.
    ///
    /// Returns every diagnostic of the session, in emission order.
    pub fn finalize(&self, session: &mut Session) -> Result<Vec<Diagnostic>, SessionError> {
        session.ensure_open()?;
        let mut new = Vec::new();
        if let Some(mut parse) = session.parse.take() {
            let program = parse.finalize(&mut new);
            session.bindings = parse.bindings();
            session.diagnostics.extend(new);
            if parse.is_halted() {
                session.state = SessionState::Halted;
            } else {
                session.state = SessionState::Finalized;
                session.program = Some(program);
            }
        }
        info!(
            session = %session.id,
            state = %session.state,
            diagnostics = session.diagnostics.len(),
            blocking = session.has_blocking(),
            "validation session finalized"
        );
        Ok(session.diagnostics.clone())
    }

    /// Discard the session's buffered text and stop accepting input.
    ///
    /// A finalized session keeps its results; aborting it has no effect.
    pub fn abort(&self, session: &mut Session) {
        if session.state == SessionState::Finalized {
            return;
        }
        debug!(session = %session.id, "validation session aborted");
        session.parse = None;
        session.buffer = ScriptBuffer::default();
        session.program = None;
        session.state = SessionState::Closed;
    }

    /// Validate a complete script in one go.
    pub fn validate(&self, source: &str) -> Session {
        let mut session = self.begin();
        // Both calls only fail on a session that is no longer open, which
        // leaves it halted with its diagnostics intact.
        if self.feed(&mut session, source).is_ok() {
            let _ = self.finalize(&mut session);
        }
        session
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> IncrementalValidator {
        IncrementalValidator::new(Arc::new(CapabilityRegistry::standard()))
    }

    fn codes(diagnostics: &[Diagnostic]) -> Vec<DiagnosticCode> {
        diagnostics.iter().map(|d| d.code).collect()
    }

    fn blocking_codes(session: &Session) -> Vec<DiagnosticCode> {
        session
            .diagnostics()
            .iter()
            .filter(|d| d.is_blocking())
            .map(|d| d.code)
            .collect()
    }

    #[test]
    fn clean_script_finalizes() {
        let session = validator().validate("x = 1\nrespond(str(x))\n");
        assert_eq!(session.state(), SessionState::Finalized);
        assert!(!session.has_blocking());
        assert_eq!(session.bindings(), ["x".to_string()]);
        assert_eq!(session.program().map(|p| p.body.len()), Some(2));
    }

    #[test]
    fn empty_increment_is_a_no_op() {
        let v = validator();
        let mut session = v.begin();
        assert!(v.feed(&mut session, "").expect("open").is_empty());
        assert_eq!(session.state(), SessionState::Open);
    }

    #[test]
    fn forward_reference_is_not_an_error() {
        let session = validator().validate(
            "def main():\n    return helper()\ndef helper():\n    return 1\nrespond(str(main()))\n",
        );
        assert!(!session.has_blocking(), "{:?}", session.diagnostics());
    }

    #[test]
    fn undefined_name_is_reported_once() {
        let session = validator().validate("respond(str(undefined_name))\n");
        let undefined: Vec<_> = session
            .diagnostics()
            .iter()
            .filter(|d| d.code == DiagnosticCode::UndefinedName)
            .collect();
        assert_eq!(undefined.len(), 1);
        assert!(undefined[0].message.contains("undefined_name"));
        assert_eq!(undefined[0].location.line, 1);
    }

    #[test]
    fn import_halts_in_first_increment() {
        let v = validator();
        let mut session = v.begin();
        let first = v.feed(&mut session, "import os\n").expect("open");
        assert_eq!(codes(&first), vec![DiagnosticCode::DisallowedImport]);
        assert_eq!(session.state(), SessionState::Halted);
        assert!(matches!(
            v.feed(&mut session, "x = 1\n"),
            Err(SessionError::NotOpen { state: SessionState::Halted, .. })
        ));
    }

    #[test]
    fn import_is_seen_before_the_line_ends() {
        let v = validator();
        let mut session = v.begin();
        let first = v.feed(&mut session, "import os").expect("open");
        assert_eq!(codes(&first), vec![DiagnosticCode::DisallowedImport]);
    }

    #[test]
    fn unterminated_string_at_finalize() {
        let session = validator().validate("print(\"abc\n");
        assert!(blocking_codes(&session).contains(&DiagnosticCode::UnterminatedString));
    }

    #[test]
    fn unclosed_bracket_at_finalize() {
        let session = validator().validate("x = [1, 2\n");
        assert_eq!(blocking_codes(&session), vec![DiagnosticCode::UnclosedBracket]);
    }

    #[test]
    fn indentation_errors() {
        let session = validator().validate("if True:\nx = 1\n");
        assert!(blocking_codes(&session).contains(&DiagnosticCode::ExpectedIndent));

        let session = validator().validate("x = 1\n    y = 2\n");
        assert!(blocking_codes(&session).contains(&DiagnosticCode::UnexpectedIndent));

        let session = validator().validate("if True:\n    x = 1\n  y = 2\n");
        assert_eq!(session.state(), SessionState::Halted);
        assert!(blocking_codes(&session).contains(&DiagnosticCode::IndentDesync));
    }

    #[test]
    fn control_flow_placement() {
        let session = validator().validate("break\n");
        assert_eq!(blocking_codes(&session), vec![DiagnosticCode::OutsideLoop]);

        let session = validator().validate("return 1\n");
        assert_eq!(blocking_codes(&session), vec![DiagnosticCode::OutsideFunction]);

        let session = validator().validate("else:\n    pass\n");
        assert_eq!(blocking_codes(&session), vec![DiagnosticCode::OrphanClause]);
    }

    #[test]
    fn call_checks() {
        let session = validator().validate("x = len()\n");
        assert_eq!(blocking_codes(&session), vec![DiagnosticCode::Arity]);

        let session = validator().validate("print(1, colour=2)\n");
        assert_eq!(blocking_codes(&session), vec![DiagnosticCode::UnknownKeyword]);

        let session = validator().validate("r = read_files(\"a.txt\")\n");
        assert_eq!(blocking_codes(&session), vec![DiagnosticCode::ArgumentShape]);

        let session = validator().validate("frobnicate(1)\n");
        assert_eq!(blocking_codes(&session), vec![DiagnosticCode::UnknownCallable]);
    }

    #[test]
    fn effects_and_terminator() {
        let session = validator().validate("print(1)\n");
        let all = codes(session.diagnostics());
        assert!(all.contains(&DiagnosticCode::SideEffect));
        assert!(all.contains(&DiagnosticCode::MissingTerminator));
        assert!(!session.has_blocking());
    }

    #[test]
    fn shadowing_warns() {
        let session = validator().validate("len = 3\nrespond(str(len))\n");
        assert!(codes(session.diagnostics()).contains(&DiagnosticCode::ShadowedCapability));
        assert!(!session.has_blocking());
    }

    #[test]
    fn elif_else_build_one_if() {
        let session = validator().validate(
            "x = 2\nif x == 1:\n    y = 1\nelif x == 2:\n    y = 2\nelse:\n    y = 3\nrespond(str(y))\n",
        );
        assert!(!session.has_blocking(), "{:?}", session.diagnostics());
        let program = session.program().expect("finalized");
        assert_eq!(program.body.len(), 3);
        assert!(matches!(
            &program.body[1].kind,
            crate::ast::StmtKind::If { branches, orelse: Some(_) } if branches.len() == 2
        ));
    }

    #[test]
    fn abort_discards_buffer() {
        let v = validator();
        let mut session = v.begin();
        v.feed(&mut session, "x = 1\n").expect("open");
        v.abort(&mut session);
        assert_eq!(session.state(), SessionState::Closed);
        assert!(session.buffer().is_empty());
        assert!(v.finalize(&mut session).is_err());
    }

    #[test]
    fn abort_after_finalize_keeps_results() {
        let v = validator();
        let mut session = v.begin();
        v.feed(&mut session, "respond(\"hi\")\n").expect("open");
        v.finalize(&mut session).expect("open");
        v.abort(&mut session);
        assert_eq!(session.state(), SessionState::Finalized);
        assert!(session.program().is_some());
    }
}
