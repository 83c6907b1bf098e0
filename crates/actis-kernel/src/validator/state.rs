//! Incremental parse state of one validation session.
//!
//! Text accumulates in a boundary region until the scanner finds the end of
//! a logical line. Each complete line is lexed, parsed and checked exactly
//! once, then folded into the statement tree; the region after the last
//! complete line is lexed on every feed only to surface findings that can no
//! longer change.
//!
//! Every diagnostic is keyed by its code and absolute offset, and a key is
//! emitted at most once. Feeding a script in pieces or all at once therefore
//! yields the same diagnostics.

use std::collections::HashSet;
use std::ops::Range;
use std::sync::Arc;

use tracing::{debug, warn};

use super::checks::{self, Finding};
use super::diagnostic::{Diagnostic, DiagnosticCode, Location, Severity, TextWindow};
use super::scanner::{BoundaryScanner, Mismatch};
use super::scope_tracker::{RefKind, ScopeTracker};
use crate::ast::{Branch, Expr, FunctionDef, Ident, Param, Program, Stmt, StmtKind, Target};
use crate::lexer::{self, Spanned, Token};
use crate::parser::{self, Header, Line};
use crate::registry::CapabilityRegistry;

#[derive(Debug)]
enum BlockKind {
    Root,
    If(Expr),
    Elif(Expr),
    Else,
    For { targets: Vec<Ident>, iter: Expr },
    While(Expr),
    Def { name: Ident, params: Vec<Param> },
    /// Header that failed to parse; its body is checked but discarded.
    Opaque,
}

impl BlockKind {
    fn keyword(&self) -> &'static str {
        match self {
            BlockKind::Root => "script",
            BlockKind::If(_) => "if",
            BlockKind::Elif(_) => "elif",
            BlockKind::Else => "else",
            BlockKind::For { .. } => "for",
            BlockKind::While(_) => "while",
            BlockKind::Def { .. } => "def",
            BlockKind::Opaque => "block",
        }
    }
}

#[derive(Debug)]
struct OpenBlock {
    kind: BlockKind,
    /// Indentation of the header line.
    indent: usize,
    /// Indentation of the body, known once its first line arrives.
    body_indent: Option<usize>,
    header_span: Range<usize>,
    header_line: usize,
    body: Vec<Stmt>,
}

#[derive(Debug)]
pub(crate) struct ParseState {
    pub(super) registry: Arc<CapabilityRegistry>,
    /// Text after the last complete logical line.
    pending: String,
    /// Absolute offset and 1-based line number where `pending` starts.
    pending_base: usize,
    pending_line: usize,
    scanner: BoundaryScanner,
    blocks: Vec<OpenBlock>,
    /// The last line was a header; the next one must indent.
    expect_body: bool,
    pub(super) scope: ScopeTracker,
    /// Loop nesting, one entry per function frame.
    loop_depth: Vec<usize>,
    emitted: HashSet<(DiagnosticCode, usize)>,
    pub(super) saw_terminal: bool,
    halted: bool,
}

/// Width of leading whitespace, with tabs advancing to the next multiple
/// of 8. Returns the width and the byte length of the whitespace.
fn measure_indent(line: &str) -> (usize, usize) {
    let mut width = 0;
    let mut bytes = 0;
    for ch in line.chars() {
        match ch {
            ' ' => width += 1,
            '\t' => width = (width / 8 + 1) * 8,
            '\x0c' => width = 0,
            _ => break,
        }
        bytes += ch.len_utf8();
    }
    (width, bytes)
}

impl ParseState {
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self {
            registry,
            pending: String::new(),
            pending_base: 0,
            pending_line: 1,
            scanner: BoundaryScanner::default(),
            blocks: vec![OpenBlock {
                kind: BlockKind::Root,
                indent: 0,
                body_indent: Some(0),
                header_span: 0..0,
                header_line: 1,
                body: Vec::new(),
            }],
            expect_body: false,
            scope: ScopeTracker::new(),
            loop_depth: vec![0],
            emitted: HashSet::new(),
            saw_terminal: false,
            halted: false,
        }
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Names bound at the top level of the script.
    pub fn bindings(&self) -> Vec<String> {
        self.scope.global_names()
    }

    /// Append text and process every logical line it completes.
    pub fn feed(&mut self, text: &str, out: &mut Vec<Diagnostic>) {
        if self.halted {
            return;
        }
        self.pending.push_str(text);
        self.drain_lines(false, out);
        if !self.halted {
            self.scan_tail(out);
        }
    }

    /// End of input: close everything and resolve names.
    pub fn finalize(&mut self, out: &mut Vec<Diagnostic>) -> Program {
        if !self.halted {
            self.drain_lines(true, out);
        }
        if !self.halted {
            self.finish_tail(out);
        }
        if !self.halted {
            self.close_all(out);
        }
        if !self.halted {
            self.resolve_names(out);
            self.check_terminator(out);
        }
        let body = self
            .blocks
            .first_mut()
            .map(|root| std::mem::take(&mut root.body))
            .unwrap_or_default();
        Program { body }
    }

    pub(super) fn emit(
        &mut self,
        out: &mut Vec<Diagnostic>,
        code: DiagnosticCode,
        span: Range<usize>,
        location: Location,
        message: impl Into<String>,
    ) {
        if self.halted || !self.emitted.insert((code, span.start)) {
            return;
        }
        let diagnostic = Diagnostic::new(code, span, location, message);
        if diagnostic.severity == Severity::Fatal {
            warn!(
                code = %diagnostic.code,
                line = diagnostic.location.line,
                "fatal diagnostic, halting intake: {}",
                diagnostic.message
            );
            self.halted = true;
        }
        out.push(diagnostic);
    }

    fn emit_findings(
        &mut self,
        findings: Vec<Finding>,
        window: &TextWindow<'_>,
        out: &mut Vec<Diagnostic>,
    ) {
        for finding in findings {
            let location = window.location(&finding.span);
            self.emit(out, finding.code, finding.span, location, finding.message);
            if self.halted {
                return;
            }
        }
    }

    fn drain_lines(&mut self, at_eof: bool, out: &mut Vec<Diagnostic>) {
        while let Some(end) = self.scanner.next_line_end(&self.pending, at_eof) {
            let line: String = self.pending.drain(..end).collect();
            let mismatches = self.scanner.take_line();
            let base = self.pending_base;
            let first_line = self.pending_line;
            self.pending_base += line.len();
            self.pending_line += line.matches('\n').count();

            self.process_line(&line, base, first_line, &mismatches, out);
            if self.halted {
                return;
            }
        }
    }

    /// Check the settled part of the unfinished tail.
    fn scan_tail(&mut self, out: &mut Vec<Diagnostic>) {
        let settled = self.scanner.settled_len();
        if settled == 0 {
            return;
        }
        let base = self.pending_base;
        let limit = base + settled;
        let at_quote = self.scanner.open_quote().is_some();
        let text = &self.pending[..settled];

        let (tokens, lex_errors) = lexer::tokenize(text, base);
        // A token touching the limit may still grow, unless a string starts
        // right after it (identifiers there may be string prefixes).
        let complete = tokens
            .iter()
            .take_while(|t| {
                t.span.end < limit || (at_quote && !matches!(t.token, Token::Ident(_)))
            })
            .count();
        let lex_errors: Vec<_> = lex_errors
            .into_iter()
            .filter(|e| e.span.end < limit)
            .collect();
        let mismatches: Vec<Mismatch> = self
            .scanner
            .mismatches()
            .iter()
            .copied()
            .filter(|m| m.offset < settled)
            .collect();

        let findings = checks::token_findings(
            &self.registry,
            &tokens,
            complete,
            &lex_errors,
            &mismatches,
            base,
        );
        if findings.is_empty() {
            return;
        }
        let window_text = text.to_string();
        let window = TextWindow::new(&window_text, base, self.pending_line);
        self.emit_findings(findings, &window, out);
    }

    /// Whatever is left after the last newline once input has ended.
    fn finish_tail(&mut self, out: &mut Vec<Diagnostic>) {
        let text = std::mem::take(&mut self.pending);
        let mismatches = self.scanner.mismatches().to_vec();
        let quote = self.scanner.open_quote();
        let unclosed = self.scanner.open_brackets().next();
        let dangling = self.scanner.dangling_continuation();
        let base = self.pending_base;
        let first_line = self.pending_line;
        self.scanner.take_line();
        self.pending_base += text.len();
        self.pending_line += text.matches('\n').count();

        if text.is_empty() {
            return;
        }
        let window = TextWindow::new(&text, base, first_line);
        let end = base + text.len();

        if quote.is_none() && unclosed.is_none() && !dangling {
            self.process_line(&text, base, first_line, &mismatches, out);
            return;
        }

        // The tail is structurally incomplete; still report what its tokens
        // reveal before saying why it never ended.
        let settled = quote.map_or(text.len(), |q| q.start);
        let (tokens, lex_errors) = lexer::tokenize(&text[..settled], base);
        let findings = checks::token_findings(
            &self.registry,
            &tokens,
            tokens.len(),
            &lex_errors,
            &mismatches,
            base,
        );
        self.emit_findings(findings, &window, out);

        if let Some(quote) = quote {
            let span = base + quote.start..end;
            let message = if quote.triple {
                "unterminated triple-quoted string literal"
            } else {
                "unterminated string literal"
            };
            let location = window.location(&span);
            self.emit(out, DiagnosticCode::UnterminatedString, span, location, message);
        } else if let Some((opener, offset)) = unclosed {
            let span = base + offset..base + offset + 1;
            let location = window.location(&span);
            self.emit(
                out,
                DiagnosticCode::UnclosedBracket,
                span,
                location,
                format!("`{opener}` was never closed"),
            );
        } else {
            let span = end.saturating_sub(1)..end;
            let location = window.location(&span);
            self.emit(
                out,
                DiagnosticCode::IncompleteStatement,
                span,
                location,
                "script ends after a line continuation",
            );
        }
    }

    fn process_line(
        &mut self,
        line: &str,
        base: usize,
        first_line: usize,
        mismatches: &[Mismatch],
        out: &mut Vec<Diagnostic>,
    ) {
        let (tokens, lex_errors) = lexer::tokenize(line, base);
        if tokens.is_empty() && lex_errors.is_empty() && mismatches.is_empty() {
            return;
        }
        debug!(line = first_line, tokens = tokens.len(), "logical line");

        let window = TextWindow::new(line, base, first_line);
        let findings = checks::token_findings(
            &self.registry,
            &tokens,
            tokens.len(),
            &lex_errors,
            mismatches,
            base,
        );
        let broken = !findings.is_empty();
        self.emit_findings(findings, &window, out);
        if self.halted {
            return;
        }

        let (indent, ws_len) = measure_indent(line);
        self.handle_indent(indent, base..base + ws_len, &window, out);
        if self.halted {
            return;
        }

        let line_span = base..base + line.trim_end().len();
        if broken {
            self.recover(&tokens, indent, line_span, &window);
            return;
        }

        match parser::parse_line(&tokens, line_span.end) {
            Ok(Line::Header(header)) => self.open_header(header, indent, line_span, &window, out),
            Ok(Line::Simple(stmt)) => self.add_statement(stmt, &window, out),
            Err(errors) => {
                if let Some(error) = errors.into_iter().next() {
                    let location = window.location(&error.span);
                    self.emit(
                        out,
                        DiagnosticCode::Syntax,
                        error.span,
                        location,
                        format!("invalid syntax: {}", error.message),
                    );
                }
                self.recover(&tokens, indent, line_span, &window);
            }
        }
    }

    /// A line that could not be parsed. If it looks like a header, absorb
    /// its body so the indented lines do not cascade into indent errors.
    fn recover(
        &mut self,
        tokens: &[Spanned],
        indent: usize,
        span: Range<usize>,
        window: &TextWindow<'_>,
    ) {
        if tokens.last().is_some_and(|t| t.token == Token::Colon) {
            self.push_block(BlockKind::Opaque, indent, span, window);
        }
    }

    fn current_indent(&self) -> usize {
        self.blocks
            .last()
            .and_then(|b| b.body_indent)
            .unwrap_or(0)
    }

    fn handle_indent(
        &mut self,
        indent: usize,
        span: Range<usize>,
        window: &TextWindow<'_>,
        out: &mut Vec<Diagnostic>,
    ) {
        if self.expect_body {
            self.expect_body = false;
            if let Some(top) = self.blocks.last_mut() {
                if indent > top.indent {
                    top.body_indent = Some(indent);
                    return;
                }
                let message = format!(
                    "expected an indented block after `{}` on line {}",
                    top.kind.keyword(),
                    top.header_line
                );
                let location = window.location(&span);
                self.emit(out, DiagnosticCode::ExpectedIndent, span.clone(), location, message);
                self.close_block();
            }
        }

        if indent > self.current_indent() {
            let location = window.location(&span);
            self.emit(out, DiagnosticCode::UnexpectedIndent, span, location, "unexpected indent");
            return;
        }
        while indent < self.current_indent() && self.blocks.len() > 1 {
            self.close_block();
        }
        if indent != self.current_indent() {
            let location = window.location(&span);
            self.emit(
                out,
                DiagnosticCode::IndentDesync,
                span,
                location,
                "unindent does not match any outer indentation level",
            );
        }
    }

    fn push_block(
        &mut self,
        kind: BlockKind,
        indent: usize,
        header_span: Range<usize>,
        window: &TextWindow<'_>,
    ) {
        let header_line = window.position(header_span.start).line;
        self.blocks.push(OpenBlock {
            kind,
            indent,
            body_indent: None,
            header_span,
            header_line,
            body: Vec::new(),
        });
        self.expect_body = true;
    }

    /// Whether the current block ends with an `if` that can take an
    /// `elif`/`else`.
    fn can_extend_if(&self) -> bool {
        matches!(
            self.blocks.last().and_then(|b| b.body.last()),
            Some(Stmt {
                kind: StmtKind::If { orelse: None, .. },
                ..
            })
        )
    }

    fn loop_depth_mut(&mut self) -> &mut usize {
        if self.loop_depth.is_empty() {
            self.loop_depth.push(0);
        }
        let last = self.loop_depth.len() - 1;
        &mut self.loop_depth[last]
    }

    fn open_header(
        &mut self,
        header: Header,
        indent: usize,
        span: Range<usize>,
        window: &TextWindow<'_>,
        out: &mut Vec<Diagnostic>,
    ) {
        let kind = match header {
            Header::If(cond) => {
                self.check_expr(&cond, window, out);
                BlockKind::If(cond)
            }
            Header::Elif(cond) if self.can_extend_if() => {
                self.check_expr(&cond, window, out);
                BlockKind::Elif(cond)
            }
            Header::Else if self.can_extend_if() => BlockKind::Else,
            Header::Elif(_) => self.orphan_clause("elif", &span, window, out),
            Header::Else => self.orphan_clause("else", &span, window, out),
            Header::For { targets, iter } => {
                self.check_expr(&iter, window, out);
                for target in &targets {
                    self.bind_name(target, window, out);
                }
                *self.loop_depth_mut() += 1;
                BlockKind::For { targets, iter }
            }
            Header::While(cond) => {
                self.check_expr(&cond, window, out);
                *self.loop_depth_mut() += 1;
                BlockKind::While(cond)
            }
            Header::Def { name, params } => {
                for param in &params {
                    if let Some(default) = &param.default {
                        self.check_expr(default, window, out);
                    }
                }
                self.bind_name(&name, window, out);
                self.scope.push_frame();
                for param in &params {
                    self.scope.bind(param.name.name.clone());
                }
                self.loop_depth.push(0);
                BlockKind::Def { name, params }
            }
        };
        self.push_block(kind, indent, span, window);
    }

    fn orphan_clause(
        &mut self,
        keyword: &str,
        span: &Range<usize>,
        window: &TextWindow<'_>,
        out: &mut Vec<Diagnostic>,
    ) -> BlockKind {
        self.emit(
            out,
            DiagnosticCode::OrphanClause,
            span.clone(),
            window.location(span),
            format!("`{keyword}` without a matching `if`"),
        );
        BlockKind::Opaque
    }

    fn add_statement(&mut self, stmt: Stmt, window: &TextWindow<'_>, out: &mut Vec<Diagnostic>) {
        match &stmt.kind {
            StmtKind::Expr(expr) => self.check_expr(expr, window, out),
            StmtKind::Assign { target, value } => {
                self.check_expr(value, window, out);
                self.check_target(target, false, window, out);
            }
            StmtKind::AugAssign { target, value, .. } => {
                self.check_expr(value, window, out);
                self.check_target(target, true, window, out);
            }
            StmtKind::Return(value) => {
                if self.loop_depth.len() <= 1 {
                    let location = window.location(&stmt.span);
                    self.emit(
                        out,
                        DiagnosticCode::OutsideFunction,
                        stmt.span.clone(),
                        location,
                        "`return` outside function",
                    );
                }
                if let Some(value) = value {
                    self.check_expr(value, window, out);
                }
            }
            StmtKind::Break | StmtKind::Continue => {
                if *self.loop_depth_mut() == 0 {
                    let keyword = if matches!(stmt.kind, StmtKind::Break) {
                        "break"
                    } else {
                        "continue"
                    };
                    let location = window.location(&stmt.span);
                    self.emit(
                        out,
                        DiagnosticCode::OutsideLoop,
                        stmt.span.clone(),
                        location,
                        format!("`{keyword}` outside loop"),
                    );
                }
            }
            _ => {}
        }
        if let Some(block) = self.blocks.last_mut() {
            block.body.push(stmt);
        }
    }

    fn check_target(
        &mut self,
        target: &Target,
        augmented: bool,
        window: &TextWindow<'_>,
        out: &mut Vec<Diagnostic>,
    ) {
        match target {
            Target::Name(ident) => {
                if augmented {
                    self.use_name(&ident.name, &ident.span, RefKind::Name, window, out);
                }
                self.bind_name(ident, window, out);
            }
            Target::Subscript { object, index } => {
                self.check_expr(object, window, out);
                self.check_expr(index, window, out);
            }
            Target::Tuple(idents) => {
                for ident in idents {
                    self.bind_name(ident, window, out);
                }
            }
        }
    }

    /// Pop the innermost block and attach it to its parent.
    fn close_block(&mut self) {
        if self.blocks.len() <= 1 {
            return;
        }
        let Some(block) = self.blocks.pop() else {
            return;
        };
        let is_loop = matches!(block.kind, BlockKind::For { .. } | BlockKind::While(_));
        let is_def = matches!(block.kind, BlockKind::Def { .. });
        let span = block.header_span;
        let body = block.body;

        if let Some(parent) = self.blocks.last_mut() {
            match block.kind {
                BlockKind::If(cond) => parent.body.push(Stmt::new(
                    StmtKind::If {
                        branches: vec![Branch { cond, body }],
                        orelse: None,
                    },
                    span,
                )),
                BlockKind::Elif(cond) => {
                    if let Some(StmtKind::If { branches, .. }) =
                        parent.body.last_mut().map(|s| &mut s.kind)
                    {
                        branches.push(Branch { cond, body });
                    }
                }
                BlockKind::Else => {
                    if let Some(StmtKind::If { orelse, .. }) =
                        parent.body.last_mut().map(|s| &mut s.kind)
                    {
                        *orelse = Some(body);
                    }
                }
                BlockKind::For { targets, iter } => parent
                    .body
                    .push(Stmt::new(StmtKind::For { targets, iter, body }, span)),
                BlockKind::While(cond) => parent
                    .body
                    .push(Stmt::new(StmtKind::While { cond, body }, span)),
                BlockKind::Def { name, params } => parent.body.push(Stmt::new(
                    StmtKind::FunctionDef(Arc::new(FunctionDef { name, params, body })),
                    span,
                )),
                BlockKind::Opaque | BlockKind::Root => {}
            }
        }

        if is_loop {
            let depth = self.loop_depth_mut();
            *depth = depth.saturating_sub(1);
        }
        if is_def {
            self.scope.pop_frame();
            self.loop_depth.pop();
        }
    }

    fn eof_location(&self) -> (Range<usize>, Location) {
        let window = TextWindow::new("", self.pending_base, self.pending_line);
        let span = self.pending_base..self.pending_base;
        let location = window.location(&span);
        (span, location)
    }

    fn close_all(&mut self, out: &mut Vec<Diagnostic>) {
        if self.expect_body {
            self.expect_body = false;
            if let Some(top) = self.blocks.last() {
                let message = format!(
                    "expected an indented block after `{}` on line {}, found end of script",
                    top.kind.keyword(),
                    top.header_line
                );
                let (span, location) = self.eof_location();
                self.emit(out, DiagnosticCode::ExpectedIndent, span, location, message);
            }
        }
        while self.blocks.len() > 1 {
            self.close_block();
        }
    }

    fn resolve_names(&mut self, out: &mut Vec<Diagnostic>) {
        for reference in self.scope.take_unresolved() {
            let (code, message) = match reference.kind {
                RefKind::Name => (
                    DiagnosticCode::UndefinedName,
                    format!("name `{}` is not defined", reference.name),
                ),
                RefKind::Call => (
                    DiagnosticCode::UnknownCallable,
                    format!(
                        "`{}` is not a registered capability or a defined function",
                        reference.name
                    ),
                ),
            };
            self.emit(out, code, reference.span, reference.location, message);
        }
    }

    fn check_terminator(&mut self, out: &mut Vec<Diagnostic>) {
        if self.saw_terminal || !self.registry.has_terminal() {
            return;
        }
        let names: Vec<String> = self
            .registry
            .signatures()
            .filter(|sig| sig.terminal && !sig.disallowed)
            .map(|sig| format!("`{}`", sig.name))
            .collect();
        let (span, location) = self.eof_location();
        self.emit(
            out,
            DiagnosticCode::MissingTerminator,
            span,
            location,
            format!("script never ends the turn; call one of {}", names.join(", ")),
        );
    }
}
