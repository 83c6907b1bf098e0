//! Diagnostics emitted by the validator.

use std::fmt;
use std::ops::Range;

use ariadne::{Color, Config, IndexType, Label, Report, ReportKind, Source};
use serde::{Deserialize, Serialize};

/// How bad a diagnostic is.
///
/// `Error` makes a script non-executable; `Fatal` also stops intake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Fatal,
}

impl Severity {
    /// Error or fatal.
    pub fn is_blocking(self) -> bool {
        self >= Severity::Error
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
            Severity::Fatal => write!(f, "fatal"),
        }
    }
}

/// Stable category tag of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiagnosticCode {
    Lex,
    Syntax,
    UnterminatedString,
    UnclosedBracket,
    MismatchedBracket,
    IncompleteStatement,
    UnexpectedIndent,
    ExpectedIndent,
    IndentDesync,
    OrphanClause,
    UnsupportedSyntax,
    UndefinedName,
    UnknownCallable,
    Arity,
    UnknownKeyword,
    ArgumentShape,
    OutsideLoop,
    OutsideFunction,
    ShadowedCapability,
    SideEffect,
    MissingTerminator,
    DisallowedImport,
    DisallowedCapability,
    DunderAccess,
}

impl DiagnosticCode {
    pub fn as_str(self) -> &'static str {
        match self {
            DiagnosticCode::Lex => "lex",
            DiagnosticCode::Syntax => "syntax",
            DiagnosticCode::UnterminatedString => "unterminated-string",
            DiagnosticCode::UnclosedBracket => "unclosed-bracket",
            DiagnosticCode::MismatchedBracket => "mismatched-bracket",
            DiagnosticCode::IncompleteStatement => "incomplete-statement",
            DiagnosticCode::UnexpectedIndent => "unexpected-indent",
            DiagnosticCode::ExpectedIndent => "expected-indent",
            DiagnosticCode::IndentDesync => "indent-desync",
            DiagnosticCode::OrphanClause => "orphan-clause",
            DiagnosticCode::UnsupportedSyntax => "unsupported-syntax",
            DiagnosticCode::UndefinedName => "undefined-name",
            DiagnosticCode::UnknownCallable => "unknown-callable",
            DiagnosticCode::Arity => "arity",
            DiagnosticCode::UnknownKeyword => "unknown-keyword",
            DiagnosticCode::ArgumentShape => "argument-shape",
            DiagnosticCode::OutsideLoop => "outside-loop",
            DiagnosticCode::OutsideFunction => "outside-function",
            DiagnosticCode::ShadowedCapability => "shadowed-capability",
            DiagnosticCode::SideEffect => "side-effect",
            DiagnosticCode::MissingTerminator => "missing-terminator",
            DiagnosticCode::DisallowedImport => "disallowed-import",
            DiagnosticCode::DisallowedCapability => "disallowed-capability",
            DiagnosticCode::DunderAccess => "dunder-access",
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            DiagnosticCode::SideEffect => Severity::Info,
            DiagnosticCode::ShadowedCapability | DiagnosticCode::MissingTerminator => {
                Severity::Warning
            }
            DiagnosticCode::IndentDesync
            | DiagnosticCode::DisallowedImport
            | DiagnosticCode::DisallowedCapability
            | DiagnosticCode::DunderAccess => Severity::Fatal,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 1-based line and column (in characters).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub line: usize,
    pub column: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<Position>,
}

/// A single finding about the script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub location: Location,
    pub message: String,
    pub code: DiagnosticCode,
    /// Absolute byte range in the assembled script.
    pub span: Range<usize>,
}

impl Diagnostic {
    pub fn new(
        code: DiagnosticCode,
        span: Range<usize>,
        location: Location,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity: code.severity(),
            location,
            message: message.into(),
            code,
            span,
        }
    }

    pub fn is_blocking(&self) -> bool {
        self.severity.is_blocking()
    }

    /// Render with source context.
    pub fn render(&self, source: &str) -> String {
        let kind = match self.severity {
            Severity::Info => ReportKind::Advice,
            Severity::Warning => ReportKind::Warning,
            Severity::Error => ReportKind::Error,
            Severity::Fatal => ReportKind::Custom("Fatal", Color::Red),
        };
        let start = self.span.start.min(source.len());
        let end = self.span.end.clamp(start, source.len());
        let span = start..end;

        let mut out = Vec::new();
        let written = Report::build(kind, span.clone())
            .with_config(
                Config::default()
                    .with_color(false)
                    .with_index_type(IndexType::Byte),
            )
            .with_code(self.code.as_str())
            .with_message(&self.message)
            .with_label(Label::new(span).with_message(self.code.as_str()))
            .finish()
            .write(Source::from(source), &mut out);

        match written {
            Ok(()) => String::from_utf8_lossy(&out).into_owned(),
            Err(_) => self.to_string(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: {}[{}]: {}",
            self.location.line, self.location.column, self.severity, self.code, self.message
        )
    }
}

/// Maps absolute offsets inside a piece of text to line/column positions.
///
/// The validator only ever holds the text of the current logical line (or
/// the unfinished tail), so positions are computed relative to where that
/// text starts.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TextWindow<'a> {
    text: &'a str,
    base: usize,
    first_line: usize,
}

impl<'a> TextWindow<'a> {
    pub fn new(text: &'a str, base: usize, first_line: usize) -> Self {
        Self {
            text,
            base,
            first_line,
        }
    }

    pub fn position(&self, offset: usize) -> Position {
        let mut rel = offset.saturating_sub(self.base).min(self.text.len());
        while !self.text.is_char_boundary(rel) {
            rel -= 1;
        }
        let prefix = &self.text[..rel];
        let line = self.first_line + prefix.matches('\n').count();
        let column = prefix.rsplit('\n').next().unwrap_or("").chars().count() + 1;
        Position { line, column }
    }

    pub fn location(&self, span: &Range<usize>) -> Location {
        let start = self.position(span.start);
        let end = (span.end > span.start).then(|| self.position(span.end));
        Location {
            line: start.line,
            column: start.column,
            end,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severities_are_ordered() {
        assert!(Severity::Fatal > Severity::Error);
        assert!(Severity::Error.is_blocking());
        assert!(!Severity::Warning.is_blocking());
    }

    #[test]
    fn code_severity_table() {
        assert_eq!(DiagnosticCode::DisallowedImport.severity(), Severity::Fatal);
        assert_eq!(DiagnosticCode::UndefinedName.severity(), Severity::Error);
        assert_eq!(DiagnosticCode::SideEffect.severity(), Severity::Info);
        assert_eq!(DiagnosticCode::MissingTerminator.severity(), Severity::Warning);
    }

    #[test]
    fn code_serializes_as_tag() {
        let json = serde_json::to_string(&DiagnosticCode::UnknownCallable).expect("json");
        assert_eq!(json, "\"unknown-callable\"");
    }

    #[test]
    fn window_positions() {
        let window = TextWindow::new("ab\ncdé\nf", 100, 7);
        assert_eq!(window.position(100), Position { line: 7, column: 1 });
        assert_eq!(window.position(104), Position { line: 8, column: 2 });
        // after the two-byte é
        assert_eq!(window.position(107), Position { line: 8, column: 4 });
        assert_eq!(window.position(108), Position { line: 9, column: 1 });
    }

    #[test]
    fn render_includes_code_and_message() {
        let source = "x = 1\ny = nope\n";
        let diag = Diagnostic::new(
            DiagnosticCode::UndefinedName,
            10..14,
            Location {
                line: 2,
                column: 5,
                end: None,
            },
            "name `nope` is not defined",
        );
        let rendered = diag.render(source);
        assert!(rendered.contains("undefined-name"));
        assert!(rendered.contains("name `nope` is not defined"));
    }
}
