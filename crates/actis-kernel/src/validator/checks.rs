//! Validation rules.
//!
//! Token rules run on raw tokens and can fire before a line is complete;
//! they cover everything that is decided by a single token and its
//! neighbours (imports, dunder names, forbidden calls, unsupported keywords).
//! Expression rules run on parsed lines and check names and calls against the
//! scope and the capability registry.

use std::ops::Range;
use std::sync::Arc;

use super::diagnostic::{Diagnostic, DiagnosticCode, TextWindow};
use super::scanner::Mismatch;
use super::scope_tracker::{PendingRef, RefKind};
use super::state::ParseState;
use crate::ast::{Expr, ExprKind, FStringPart, Ident, Literal};
use crate::lexer::{LexError, LexErrorKind, Spanned, Token};
use crate::registry::{ArgShape, CapabilityRegistry};

/// A diagnostic before its position is resolved.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Finding {
    pub code: DiagnosticCode,
    pub span: Range<usize>,
    pub message: String,
}

impl Finding {
    fn new(code: DiagnosticCode, span: Range<usize>, message: impl Into<String>) -> Self {
        Self {
            code,
            span,
            message: message.into(),
        }
    }
}

fn is_dunder(name: &str) -> bool {
    name.len() > 4 && name.starts_with("__") && name.ends_with("__")
}

/// Token-level findings, ordered by offset.
///
/// Only the first `complete` tokens are inspected; a token's right neighbour
/// is consulted only when it is complete too. `mismatches` carry offsets
/// relative to `base`.
pub(crate) fn token_findings(
    registry: &CapabilityRegistry,
    tokens: &[Spanned],
    complete: usize,
    lex_errors: &[LexError],
    mismatches: &[Mismatch],
    base: usize,
) -> Vec<Finding> {
    let mut findings = Vec::new();

    for error in lex_errors {
        let code = match error.kind {
            LexErrorKind::UnterminatedString => DiagnosticCode::UnterminatedString,
            _ => DiagnosticCode::Lex,
        };
        findings.push(Finding::new(code, error.span.clone(), error.to_string()));
    }

    for mismatch in mismatches {
        let offset = base + mismatch.offset;
        let message = match mismatch.expected {
            Some(expected) => format!(
                "closing `{}` does not match; expected `{expected}`",
                mismatch.found
            ),
            None => format!("unmatched closing `{}`", mismatch.found),
        };
        findings.push(Finding::new(
            DiagnosticCode::MismatchedBracket,
            offset..offset + 1,
            message,
        ));
    }

    let settled = &tokens[..complete.min(tokens.len())];
    for (k, spanned) in settled.iter().enumerate() {
        let prev = k.checked_sub(1).map(|p| &settled[p].token);
        let span = spanned.span.clone();
        match &spanned.token {
            Token::Import | Token::From => findings.push(Finding::new(
                DiagnosticCode::DisallowedImport,
                span,
                "imports are not allowed in action scripts",
            )),
            Token::Unsupported(keyword) => findings.push(Finding::new(
                DiagnosticCode::UnsupportedSyntax,
                span,
                format!("`{keyword}` is not supported in action scripts"),
            )),
            Token::Ident(name) if prev == Some(&Token::Dot) => {
                if name.starts_with("__") {
                    findings.push(Finding::new(
                        DiagnosticCode::DunderAccess,
                        span,
                        format!("access to dunder attribute `{name}` is not allowed"),
                    ));
                }
            }
            Token::Ident(name) if is_dunder(name) => findings.push(Finding::new(
                DiagnosticCode::DunderAccess,
                span,
                format!("use of dunder name `{name}` is not allowed"),
            )),
            Token::Ident(name) => {
                let called = settled
                    .get(k + 1)
                    .is_some_and(|next| next.token == Token::LParen);
                if called && prev != Some(&Token::Def) && registry.is_disallowed(name) {
                    findings.push(Finding::new(
                        DiagnosticCode::DisallowedCapability,
                        span,
                        format!("`{name}` is a disallowed capability"),
                    ));
                }
            }
            _ => {}
        }
    }

    findings.sort_by_key(|f| f.span.start);
    findings
}

/// Kind of a literal argument as a script author would name it, or `None`
/// when the expression is not a literal.
fn literal_kind(expr: &Expr) -> Option<&'static str> {
    match &expr.kind {
        ExprKind::Literal(Literal::Str(_)) | ExprKind::FString(_) => Some("str"),
        ExprKind::Literal(Literal::Int(_)) => Some("int"),
        ExprKind::Literal(Literal::Float(_)) => Some("float"),
        ExprKind::Literal(Literal::Bool(_)) => Some("bool"),
        ExprKind::List(_) => Some("list"),
        ExprKind::Tuple(_) => Some("tuple"),
        ExprKind::Dict(_) => Some("dict"),
        _ => None,
    }
}

fn shape_accepts(shape: ArgShape, kind: &str) -> bool {
    match shape {
        ArgShape::Any => true,
        ArgShape::Str => kind == "str",
        ArgShape::Int => kind == "int",
        ArgShape::Number => matches!(kind, "int" | "float"),
        ArgShape::Bool => kind == "bool",
        ArgShape::List => matches!(kind, "list" | "tuple"),
        ArgShape::Dict => kind == "dict",
    }
}

impl ParseState {
    /// Walk an expression, checking every name and call in it.
    pub(super) fn check_expr(
        &mut self,
        expr: &Expr,
        window: &TextWindow<'_>,
        out: &mut Vec<Diagnostic>,
    ) {
        match &expr.kind {
            ExprKind::Literal(_) => {}
            ExprKind::FString(parts) => {
                for part in parts {
                    if let FStringPart::Field { expr, .. } = part {
                        self.check_expr(expr, window, out);
                    }
                }
            }
            ExprKind::Name(name) => self.use_name(name, &expr.span, RefKind::Name, window, out),
            ExprKind::List(items) | ExprKind::Tuple(items) => {
                for item in items {
                    self.check_expr(item, window, out);
                }
            }
            ExprKind::Dict(pairs) => {
                for (key, value) in pairs {
                    self.check_expr(key, window, out);
                    self.check_expr(value, window, out);
                }
            }
            ExprKind::Call { func, args, kwargs } => {
                match &func.kind {
                    ExprKind::Name(name) => {
                        self.check_call(name, &func.span, args, kwargs, &expr.span, window, out)
                    }
                    // Method calls: the receiver is checked, the method is
                    // resolved at run time.
                    _ => self.check_expr(func, window, out),
                }
                for arg in args {
                    self.check_expr(arg, window, out);
                }
                for (_, value) in kwargs {
                    self.check_expr(value, window, out);
                }
            }
            ExprKind::Attribute { object, .. } => self.check_expr(object, window, out),
            ExprKind::Subscript { object, index } => {
                self.check_expr(object, window, out);
                self.check_expr(index, window, out);
            }
            ExprKind::Slice {
                object,
                lower,
                upper,
            } => {
                self.check_expr(object, window, out);
                for bound in [lower, upper].into_iter().flatten() {
                    self.check_expr(bound, window, out);
                }
            }
            ExprKind::Unary { operand, .. } => self.check_expr(operand, window, out),
            ExprKind::Binary { left, right, .. }
            | ExprKind::Compare { left, right, .. }
            | ExprKind::Logical { left, right, .. } => {
                self.check_expr(left, window, out);
                self.check_expr(right, window, out);
            }
            ExprKind::IfElse { cond, then, orelse } => {
                self.check_expr(cond, window, out);
                self.check_expr(then, window, out);
                self.check_expr(orelse, window, out);
            }
        }
    }

    /// A read of `name`. Unbound names are parked until finalize.
    pub(super) fn use_name(
        &mut self,
        name: &str,
        span: &Range<usize>,
        kind: RefKind,
        window: &TextWindow<'_>,
        out: &mut Vec<Diagnostic>,
    ) {
        if self.scope.is_bound(name) {
            return;
        }
        if self.registry.is_disallowed(name) {
            self.emit(
                out,
                DiagnosticCode::DisallowedCapability,
                span.clone(),
                window.location(span),
                format!("`{name}` is a disallowed capability"),
            );
            return;
        }
        if self.registry.contains(name) {
            return;
        }
        self.scope.defer(PendingRef {
            name: name.to_string(),
            span: span.clone(),
            location: window.location(span),
            kind,
        });
    }

    /// Bind a name in the current scope, warning when it hides a capability.
    pub(super) fn bind_name(
        &mut self,
        ident: &Ident,
        window: &TextWindow<'_>,
        out: &mut Vec<Diagnostic>,
    ) {
        if self.registry.contains(&ident.name) && !self.scope.is_bound(&ident.name) {
            self.emit(
                out,
                DiagnosticCode::ShadowedCapability,
                ident.span.clone(),
                window.location(&ident.span),
                format!("`{}` shadows a registered capability", ident.name),
            );
        }
        self.scope.bind(ident.name.clone());
    }

    #[allow(clippy::too_many_arguments)]
    fn check_call(
        &mut self,
        name: &str,
        name_span: &Range<usize>,
        args: &[Expr],
        kwargs: &[(Ident, Expr)],
        call_span: &Range<usize>,
        window: &TextWindow<'_>,
        out: &mut Vec<Diagnostic>,
    ) {
        if self.scope.is_bound(name) {
            return;
        }
        let registry = Arc::clone(&self.registry);
        let Some(sig) = registry.lookup(name) else {
            self.use_name(name, name_span, RefKind::Call, window, out);
            return;
        };
        if sig.disallowed {
            self.use_name(name, name_span, RefKind::Call, window, out);
            return;
        }

        let by_keyword = kwargs
            .iter()
            .filter(|(kw, _)| {
                sig.param_named(&kw.name)
                    .is_some_and(|(_, param)| !param.keyword_only)
            })
            .count();
        let too_few = args.len() + by_keyword < sig.min_args();
        let too_many = sig.max_args().is_some_and(|max| args.len() > max);
        if too_few || too_many {
            self.emit(
                out,
                DiagnosticCode::Arity,
                call_span.clone(),
                window.location(call_span),
                format!(
                    "`{name}` takes {} positional argument(s) but {} were given",
                    sig.arity_text(),
                    args.len() + by_keyword
                ),
            );
        }

        for (kw, value) in kwargs {
            match sig.param_named(&kw.name) {
                None => self.emit(
                    out,
                    DiagnosticCode::UnknownKeyword,
                    kw.span.clone(),
                    window.location(&kw.span),
                    format!("`{name}` has no parameter named `{}`", kw.name),
                ),
                Some((_, param)) => {
                    self.check_shape(name, &param.name, param.shape, value, window, out)
                }
            }
        }
        for (arg, param) in args.iter().zip(sig.positional()) {
            self.check_shape(name, &param.name, param.shape, arg, window, out);
        }

        if sig.effect.is_effectful() {
            self.emit(
                out,
                DiagnosticCode::SideEffect,
                name_span.clone(),
                window.location(name_span),
                format!("calls {} capability `{name}`", sig.effect),
            );
        }
        if sig.terminal {
            self.saw_terminal = true;
        }
    }

    fn check_shape(
        &mut self,
        callee: &str,
        param: &str,
        shape: ArgShape,
        value: &Expr,
        window: &TextWindow<'_>,
        out: &mut Vec<Diagnostic>,
    ) {
        let Some(kind) = literal_kind(value) else {
            return;
        };
        if shape_accepts(shape, kind) {
            return;
        }
        self.emit(
            out,
            DiagnosticCode::ArgumentShape,
            value.span.clone(),
            window.location(&value.span),
            format!("argument `{param}` of `{callee}` expects {shape}, got {kind}"),
        );
    }
}
