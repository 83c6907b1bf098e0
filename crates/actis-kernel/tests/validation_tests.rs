//! Integration tests for validation and assembly.
//!
//! These tests check which scripts are blocked before execution and which
//! are accepted with, at most, warnings.

use std::sync::Arc;

use actis_kernel::assembler::{Rejection, ScriptAssembler};
use actis_kernel::registry::CapabilityRegistry;
use actis_kernel::validator::{DiagnosticCode, IncrementalValidator, SessionState, Severity};
use rstest::rstest;

fn validator() -> IncrementalValidator {
    IncrementalValidator::new(Arc::new(CapabilityRegistry::standard()))
}

// ============================================================================
// Scripts that are blocked
// ============================================================================

#[rstest]
#[case::break_outside_loop("break\n", DiagnosticCode::OutsideLoop)]
#[case::return_outside_function("return 1\n", DiagnosticCode::OutsideFunction)]
#[case::unclosed_bracket("x = [1, 2\n", DiagnosticCode::UnclosedBracket)]
#[case::unterminated_string("print(\"abc\n", DiagnosticCode::UnterminatedString)]
#[case::missing_indent("if True:\nx = 1\n", DiagnosticCode::ExpectedIndent)]
#[case::unknown_callable("frobnicate(1)\n", DiagnosticCode::UnknownCallable)]
#[case::arity("x = len()\n", DiagnosticCode::Arity)]
#[case::unknown_keyword("print(1, colour=2)\n", DiagnosticCode::UnknownKeyword)]
#[case::argument_shape("r = read_files(\"a.txt\")\n", DiagnosticCode::ArgumentShape)]
#[case::undefined_name("respond(str(nope))\n", DiagnosticCode::UndefinedName)]
fn blocking_errors(#[case] source: &str, #[case] code: DiagnosticCode) {
    let session = validator().validate(source);
    let blocking: Vec<_> = session
        .diagnostics()
        .iter()
        .filter(|d| d.is_blocking())
        .map(|d| d.code)
        .collect();
    assert!(blocking.contains(&code), "{source:?} gave {blocking:?}");

    let rejection = ScriptAssembler::new()
        .accept(session)
        .expect_err("blocked scripts are rejected");
    assert!(matches!(rejection, Rejection::Invalid { .. }), "{rejection:?}");
}

#[rstest]
#[case::import("import os\n", DiagnosticCode::DisallowedImport)]
#[case::from_import("from os import path\n", DiagnosticCode::DisallowedImport)]
#[case::eval("eval('1 + 1')\n", DiagnosticCode::DisallowedCapability)]
#[case::dunder("x = [].__class__\n", DiagnosticCode::DunderAccess)]
fn fatal_diagnostics_halt(#[case] source: &str, #[case] code: DiagnosticCode) {
    let session = validator().validate(source);
    assert_eq!(session.state(), SessionState::Halted);
    let fatal = session.fatal().expect("a fatal diagnostic");
    assert_eq!(fatal.code, code);
    assert_eq!(fatal.severity, Severity::Fatal);

    match ScriptAssembler::new().accept(session) {
        Err(Rejection::Halted { diagnostic }) => assert_eq!(diagnostic.code, code),
        other => panic!("expected a halted rejection, got {other:?}"),
    }
}

// ============================================================================
// Scripts that are accepted
// ============================================================================

#[rstest]
#[case::simple("x = 1\nrespond(str(x))\n")]
#[case::loop_with_break("for i in range(3):\n    if i == 1:\n        break\nrespond('done')\n")]
#[case::functions(
    "def add(a, b=2):\n    return a + b\n\nresult = add(1)\nrespond(str(result))\n"
)]
#[case::methods("items = []\nitems.append(1)\nname = 'x'.upper()\nrespond(name)\n")]
#[case::fstring("n = 3\nrespond(f'{n:.2f} items')\n")]
#[case::line_continuation("total = 1 + \\\n    2\nrespond(str(total))\n")]
#[case::implicit_join("values = [\n    1,\n    2,\n]\nrespond(str(values))\n")]
fn clean_scripts_are_accepted(#[case] source: &str) {
    let session = validator().validate(source);
    assert!(!session.has_blocking(), "{:?}", session.diagnostics());
    let script = ScriptAssembler::new().accept(session).expect("accepted");
    assert_eq!(script.source(), source);
    assert!(!script.program().body.is_empty());
}

#[test]
fn warnings_do_not_block() {
    let session = validator().validate("print('hi')\n");
    assert!(session
        .diagnostics()
        .iter()
        .any(|d| d.code == DiagnosticCode::MissingTerminator));
    assert!(ScriptAssembler::new().accept(session).is_ok());
}

#[test]
fn unfinalized_session_is_not_accepted() {
    let v = validator();
    let mut session = v.begin();
    v.feed(&mut session, "x = 1\n").expect("open");
    assert!(matches!(
        ScriptAssembler::new().accept(session),
        Err(Rejection::NotFinalized)
    ));
}

#[test]
fn aborted_session_is_rejected() {
    let v = validator();
    let mut session = v.begin();
    v.feed(&mut session, "x = 1\n").expect("open");
    v.abort(&mut session);
    assert!(matches!(
        ScriptAssembler::new().accept(session),
        Err(Rejection::Aborted)
    ));
}

#[test]
fn empty_script_is_rejected() {
    let v = validator();
    let mut session = v.begin();
    v.finalize(&mut session).expect("open");
    assert!(matches!(
        ScriptAssembler::new().accept(session),
        Err(Rejection::Empty)
    ));
}
