//! Parser for action scripts.
//!
//! Parses one logical line at a time. Block structure comes from indentation,
//! which the validator tracks itself, so a line is either a block header
//! (`if x:`, `def f(a):` ...) or a complete simple statement. The validator
//! stitches headers and bodies into the statement tree.
//!
//! Uses chumsky parser combinators over the logos token stream. Token spans
//! are absolute offsets into the whole script, so every AST node can be
//! located without further bookkeeping.

use std::ops::Range;

use crate::ast::{
    BinaryOp, CompareOp, Expr, ExprKind, FStringPart, Ident, Literal, LogicalOp, Param, Stmt,
    StmtKind, Target, UnaryOp,
};
use crate::lexer::{self, Spanned, Token};
use chumsky::{input::ValueInput, prelude::*};

/// Span type used throughout the parser.
pub type Span = SimpleSpan;

type ParserExtra<'tokens> = extra::Err<Rich<'tokens, Token, Span>>;

/// One parsed logical line.
#[derive(Debug, Clone, PartialEq)]
pub enum Line {
    /// A block header; its body arrives on the following indented lines.
    Header(Header),
    /// A statement that is complete on its own.
    Simple(Stmt),
}

/// Block-opening line, without its body.
#[derive(Debug, Clone, PartialEq)]
pub enum Header {
    If(Expr),
    Elif(Expr),
    Else,
    For { targets: Vec<Ident>, iter: Expr },
    While(Expr),
    Def { name: Ident, params: Vec<Param> },
}

/// Parse error with location and context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub span: Range<usize>,
    pub message: String,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {:?}", self.message, self.span)
    }
}

impl std::error::Error for ParseError {}

/// Parse the tokens of one logical line.
///
/// `eoi` is the absolute offset just past the line, used to locate
/// "unexpected end of line" errors.
pub fn parse_line(tokens: &[Spanned], eoi: usize) -> Result<Line, Vec<ParseError>> {
    let tokens = to_parser_input(tokens);
    let end_span: Span = (eoi..eoi).into();

    let parser = line_parser();
    let result = parser.parse(tokens.as_slice().map(end_span, |(t, s)| (t, s)));
    result.into_result().map_err(convert_errors)
}

/// Parse a standalone expression, e.g. an f-string field.
///
/// `base` is the absolute offset of `source` within the script.
pub fn parse_expression(source: &str, base: usize) -> Result<Expr, Vec<ParseError>> {
    let (tokens, errors) = lexer::tokenize(source, base);
    if !errors.is_empty() {
        return Err(errors
            .into_iter()
            .map(|e| ParseError {
                message: e.to_string(),
                span: e.span,
            })
            .collect());
    }

    let tokens = to_parser_input(&tokens);
    let eoi = base + source.len();
    let end_span: Span = (eoi..eoi).into();

    let parser = expr_parser().then_ignore(end());
    let result = parser.parse(tokens.as_slice().map(end_span, |(t, s)| (t, s)));
    result.into_result().map_err(convert_errors)
}

fn to_parser_input(tokens: &[Spanned]) -> Vec<(Token, Span)> {
    tokens
        .iter()
        .map(|spanned| {
            (
                spanned.token.clone(),
                (spanned.span.start..spanned.span.end).into(),
            )
        })
        .collect()
}

fn convert_errors(errs: Vec<Rich<'_, Token, Span>>) -> Vec<ParseError> {
    errs.into_iter()
        .map(|e| {
            let span = *e.span();
            ParseError {
                span: span.start..span.end,
                message: e.to_string(),
            }
        })
        .collect()
}

fn to_range(span: Span) -> Range<usize> {
    span.start..span.end
}

/// Split an f-string body into literal text and `{expr[:spec]}` fields.
fn parse_fstring(raw: &str, base: usize) -> Result<Vec<FStringPart>, String> {
    let mut parts = Vec::new();
    let mut text = String::new();
    let mut chars = raw.char_indices().peekable();

    while let Some((i, ch)) = chars.next() {
        match ch {
            '{' if matches!(chars.peek(), Some((_, '{'))) => {
                chars.next();
                text.push('{');
            }
            '}' if matches!(chars.peek(), Some((_, '}'))) => {
                chars.next();
                text.push('}');
            }
            '}' => return Err("single `}` is not allowed in an f-string".into()),
            '{' => {
                let start = i + 1;
                let mut depth = 0usize;
                let mut quote: Option<char> = None;
                let mut colon = None;
                let mut close = None;

                for (j, c) in chars.by_ref() {
                    match (quote, c) {
                        (Some(q), c) if c == q => quote = None,
                        (Some(_), _) => {}
                        (None, '\'' | '"') => quote = Some(c),
                        (None, '(' | '[' | '{') => depth += 1,
                        (None, ')' | ']') => depth = depth.saturating_sub(1),
                        (None, '}') if depth == 0 => {
                            close = Some(j);
                            break;
                        }
                        (None, '}') => depth -= 1,
                        (None, ':') if depth == 0 && colon.is_none() => colon = Some(j),
                        _ => {}
                    }
                }

                let close = close.ok_or("unterminated `{` in f-string")?;
                let expr_end = colon.unwrap_or(close);
                let field = &raw[start..expr_end];
                if field.trim().is_empty() {
                    return Err("empty expression in f-string".into());
                }
                if field.contains('!') && !field.contains("!=") {
                    return Err("f-string conversions (`!r`, `!s`) are not supported".into());
                }

                let expr = parse_expression(field, base + start).map_err(|errs| {
                    errs.into_iter()
                        .next()
                        .map(|e| format!("in f-string field: {}", e.message))
                        .unwrap_or_else(|| "invalid f-string field".into())
                })?;

                if !text.is_empty() {
                    parts.push(FStringPart::Text(std::mem::take(&mut text)));
                }
                parts.push(FStringPart::Field {
                    expr,
                    spec: colon.map(|c| raw[c + 1..close].to_string()),
                });
            }
            _ => text.push(ch),
        }
    }

    if !text.is_empty() {
        parts.push(FStringPart::Text(text));
    }
    Ok(parts)
}

// ═══════════════════════════════════════════════════════════════════════════
// Node builders
// ═══════════════════════════════════════════════════════════════════════════

fn binary(left: Expr, op: BinaryOp, right: Expr) -> Expr {
    let span = left.span.start..right.span.end;
    Expr::new(
        ExprKind::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        },
        span,
    )
}

fn compare(left: Expr, op: CompareOp, right: Expr) -> Expr {
    let span = left.span.start..right.span.end;
    Expr::new(
        ExprKind::Compare {
            left: Box::new(left),
            op,
            right: Box::new(right),
        },
        span,
    )
}

fn logical(left: Expr, op: LogicalOp, right: Expr) -> Expr {
    let span = left.span.start..right.span.end;
    Expr::new(
        ExprKind::Logical {
            left: Box::new(left),
            op,
            right: Box::new(right),
        },
        span,
    )
}

fn unary(op: UnaryOp, start: usize, operand: Expr) -> Expr {
    let span = start..operand.span.end;
    Expr::new(
        ExprKind::Unary {
            op,
            operand: Box::new(operand),
        },
        span,
    )
}

enum CallArg {
    Positional(Expr),
    Keyword(Ident, Expr),
}

enum Postfix {
    Call(Vec<CallArg>),
    Index(Expr),
    Slice(Option<Expr>, Option<Expr>),
    Attr(Ident),
}

fn apply_postfix(object: Expr, op: Postfix, end: usize) -> Expr {
    let span = object.span.start..end;
    let object = Box::new(object);
    let kind = match op {
        Postfix::Call(call_args) => {
            let mut args = Vec::new();
            let mut kwargs = Vec::new();
            for arg in call_args {
                match arg {
                    CallArg::Positional(expr) => args.push(expr),
                    CallArg::Keyword(name, expr) => kwargs.push((name, expr)),
                }
            }
            ExprKind::Call {
                func: object,
                args,
                kwargs,
            }
        }
        Postfix::Index(index) => ExprKind::Subscript {
            object,
            index: Box::new(index),
        },
        Postfix::Slice(lower, upper) => ExprKind::Slice {
            object,
            lower: lower.map(Box::new),
            upper: upper.map(Box::new),
        },
        Postfix::Attr(attr) => ExprKind::Attribute { object, attr },
    };
    Expr::new(kind, span)
}

// ═══════════════════════════════════════════════════════════════════════════
// Parser Combinators - generic over input type
// ═══════════════════════════════════════════════════════════════════════════

/// Logical line parser: a block header or a simple statement.
fn line_parser<'tokens, I>() -> impl Parser<'tokens, I, Line, ParserExtra<'tokens>>
where
    I: ValueInput<'tokens, Token = Token, Span = Span>,
{
    choice((header_parser().map(Line::Header), simple_parser()))
        .then_ignore(end())
}

/// Block headers. Each one ends with `:`.
fn header_parser<'tokens, I>() -> impl Parser<'tokens, I, Header, ParserExtra<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = Span>,
{
    let expr = expr_parser();
    let colon = just(Token::Colon).labelled("`:`");

    // Annotations are accepted and ignored: `def f(x: int = 1) -> str:`
    let param = spanned_ident_parser()
        .then_ignore(just(Token::Colon).then(expr.clone()).or_not())
        .then(just(Token::Assign).ignore_then(expr.clone()).or_not())
        .map(|(name, default)| Param { name, default });

    let def = just(Token::Def)
        .ignore_then(spanned_ident_parser())
        .then(
            param
                .separated_by(just(Token::Comma))
                .allow_trailing()
                .collect::<Vec<_>>()
                .delimited_by(just(Token::LParen), just(Token::RParen)),
        )
        .then_ignore(just(Token::Arrow).then(expr.clone()).or_not())
        .then_ignore(colon.clone())
        .map(|(name, params)| Header::Def { name, params })
        .labelled("function definition");

    let targets = spanned_ident_parser()
        .separated_by(just(Token::Comma))
        .at_least(1)
        .allow_trailing()
        .collect::<Vec<_>>();
    let for_ = just(Token::For)
        .ignore_then(
            targets
                .clone()
                .delimited_by(just(Token::LParen), just(Token::RParen))
                .or(targets),
        )
        .then_ignore(just(Token::In))
        .then(expr.clone())
        .then_ignore(colon.clone())
        .map(|(targets, iter)| Header::For { targets, iter })
        .labelled("for loop");

    let if_ = just(Token::If)
        .ignore_then(expr.clone())
        .then_ignore(colon.clone())
        .map(Header::If)
        .labelled("if statement");

    let elif = just(Token::Elif)
        .ignore_then(expr.clone())
        .then_ignore(colon.clone())
        .map(Header::Elif);

    let else_ = just(Token::Else).then(colon.clone()).to(Header::Else);

    let while_ = just(Token::While)
        .ignore_then(expr)
        .then_ignore(colon)
        .map(Header::While)
        .labelled("while loop");

    choice((def, for_, if_, elif, else_, while_)).boxed()
}

/// Statements that fit on one logical line.
fn simple_parser<'tokens, I>() -> impl Parser<'tokens, I, Line, ParserExtra<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = Span>,
{
    // `a, b` without parentheses is a tuple
    let expr_list = expr_parser()
        .separated_by(just(Token::Comma))
        .at_least(1)
        .allow_trailing()
        .collect::<Vec<_>>()
        .map_with(|mut items: Vec<Expr>, e| {
            if items.len() == 1 {
                items.swap_remove(0)
            } else {
                Expr::new(ExprKind::Tuple(items), to_range(e.span()))
            }
        });

    let assign_op = select! {
        Token::Assign => None,
        Token::PlusAssign => Some(BinaryOp::Add),
        Token::MinusAssign => Some(BinaryOp::Sub),
        Token::StarAssign => Some(BinaryOp::Mul),
        Token::SlashAssign => Some(BinaryOp::Div),
        Token::SlashSlashAssign => Some(BinaryOp::FloorDiv),
        Token::PercentAssign => Some(BinaryOp::Mod),
    };

    let assignment = expr_list
        .clone()
        .then(assign_op)
        .then(expr_list.clone())
        .try_map(|((lhs, op), value), span: Span| {
            let target = Target::from_expr(lhs).map_err(|msg| Rich::custom(span, msg))?;
            match op {
                None => Ok(StmtKind::Assign { target, value }),
                Some(_) if matches!(target, Target::Tuple(_)) => Err(Rich::custom(
                    span,
                    "augmented assignment to a tuple is not allowed",
                )),
                Some(op) => Ok(StmtKind::AugAssign { target, op, value }),
            }
        })
        .labelled("assignment");

    choice((
        just(Token::Return)
            .ignore_then(expr_list.clone().or_not())
            .map(StmtKind::Return),
        just(Token::Break).to(StmtKind::Break),
        just(Token::Continue).to(StmtKind::Continue),
        just(Token::Pass).to(StmtKind::Pass),
        assignment,
        expr_list.map(StmtKind::Expr),
    ))
    .map_with(|kind, e| Line::Simple(Stmt::new(kind, to_range(e.span()))))
    .boxed()
}

/// Expression parser with Python precedence:
///
///   conditional = disjunction [ "if" disjunction "else" conditional ]
///   disjunction = conjunction { "or" conjunction }
///   conjunction = negation { "and" negation }
///   negation    = "not" negation | comparison
///   comparison  = sum [ comp_op sum ]
///   sum         = product { ("+" | "-") product }
///   product     = unary { ("*" | "/" | "//" | "%") unary }
///   unary       = ("-" | "+") unary | power
///   power       = primary [ "**" unary ]
///   primary     = atom { call | subscript | "." NAME }
fn expr_parser<'tokens, I>() -> impl Parser<'tokens, I, Expr, ParserExtra<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = Span>,
{
    recursive(|expr| {
        let literal = select! {
            Token::Int(n) => Literal::Int(n),
            Token::Float(x) => Literal::Float(x),
            Token::Str(s) => Literal::Str(s),
            Token::True => Literal::Bool(true),
            Token::False => Literal::Bool(false),
            Token::None => Literal::None,
        }
        .map_with(|lit, e| Expr::new(ExprKind::Literal(lit), to_range(e.span())))
        .labelled("literal");

        let fstring = select! { Token::FStr(raw) => raw }.try_map(|raw: String, span: Span| {
            parse_fstring(&raw, span.start + 2)
                .map(|parts| Expr::new(ExprKind::FString(parts), to_range(span)))
                .map_err(|msg| Rich::custom(span, msg))
        });

        let name = ident_parser()
            .map_with(|name, e| Expr::new(ExprKind::Name(name), to_range(e.span())));

        let items = expr
            .clone()
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<_>>();

        let list = items
            .clone()
            .delimited_by(just(Token::LBracket), just(Token::RBracket))
            .map_with(|items, e| Expr::new(ExprKind::List(items), to_range(e.span())))
            .labelled("list");

        let dict = expr
            .clone()
            .then_ignore(just(Token::Colon))
            .then(expr.clone())
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LBrace), just(Token::RBrace))
            .map_with(|pairs, e| Expr::new(ExprKind::Dict(pairs), to_range(e.span())))
            .labelled("dict");

        let unit = just(Token::LParen)
            .then(just(Token::RParen))
            .map_with(|_, e| Expr::new(ExprKind::Tuple(Vec::new()), to_range(e.span())));

        // `(x)` is grouping, `(x,)` and `(x, y)` are tuples
        let group = expr
            .clone()
            .then(just(Token::Comma).ignore_then(items.clone()).or_not())
            .delimited_by(just(Token::LParen), just(Token::RParen))
            .map_with(|(first, rest), e| match rest {
                None => first,
                Some(rest) => {
                    let mut all = vec![first];
                    all.extend(rest);
                    Expr::new(ExprKind::Tuple(all), to_range(e.span()))
                }
            });

        let atom = choice((literal, fstring, name, list, dict, unit, group))
            .labelled("expression")
            .boxed();

        let keyword_arg = spanned_ident_parser()
            .then_ignore(just(Token::Assign))
            .then(expr.clone())
            .map(|(name, value)| CallArg::Keyword(name, value));
        let arg = keyword_arg.or(expr.clone().map(CallArg::Positional));

        let call = arg
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LParen), just(Token::RParen))
            .map(Postfix::Call);

        let subscript = choice((
            expr.clone()
                .or_not()
                .then_ignore(just(Token::Colon))
                .then(expr.clone().or_not())
                .map(|(lower, upper)| Postfix::Slice(lower, upper)),
            expr.clone().map(Postfix::Index),
        ))
        .delimited_by(just(Token::LBracket), just(Token::RBracket));

        let attribute = just(Token::Dot)
            .ignore_then(spanned_ident_parser())
            .map(Postfix::Attr);

        let postfix = choice((call, subscript, attribute)).map_with(|op, e| (op, e.span()));

        let primary = atom
            .foldl(postfix.repeated(), |object: Expr, (op, span): (Postfix, Span)| {
                apply_postfix(object, op, span.end)
            })
            .boxed();

        let unary_expr = recursive(|unary_expr| {
            let power = primary
                .clone()
                .then(just(Token::StarStar).ignore_then(unary_expr.clone()).or_not())
                .map(|(base, exponent): (Expr, Option<Expr>)| match exponent {
                    Some(exponent) => binary(base, BinaryOp::Pow, exponent),
                    None => base,
                });

            let sign = select! {
                Token::Minus => UnaryOp::Neg,
                Token::Plus => UnaryOp::Pos,
            };

            sign.map_with(|op, e| (op, e.span()))
                .then(unary_expr)
                .map(|((op, span), operand): ((UnaryOp, Span), Expr)| {
                    unary(op, span.start, operand)
                })
                .or(power)
        })
        .boxed();

        let product_op = select! {
            Token::Star => BinaryOp::Mul,
            Token::Slash => BinaryOp::Div,
            Token::SlashSlash => BinaryOp::FloorDiv,
            Token::Percent => BinaryOp::Mod,
        };
        let product = unary_expr
            .clone()
            .foldl(product_op.then(unary_expr).repeated(), |left, (op, right)| {
                binary(left, op, right)
            })
            .boxed();

        let sum_op = select! {
            Token::Plus => BinaryOp::Add,
            Token::Minus => BinaryOp::Sub,
        };
        let sum = product
            .clone()
            .foldl(sum_op.then(product).repeated(), |left, (op, right)| {
                binary(left, op, right)
            })
            .boxed();

        let comparison_op = choice((
            just(Token::Not).then(just(Token::In)).to(CompareOp::NotIn),
            just(Token::Is).then(just(Token::Not)).to(CompareOp::IsNot),
            select! {
                Token::EqEq => CompareOp::Eq,
                Token::NotEq => CompareOp::NotEq,
                Token::Lt => CompareOp::Lt,
                Token::Gt => CompareOp::Gt,
                Token::LtEq => CompareOp::LtEq,
                Token::GtEq => CompareOp::GtEq,
                Token::In => CompareOp::In,
                Token::Is => CompareOp::Is,
            },
        ));

        // Chained comparisons (`a < b < c`) are not supported.
        let comparison = sum
            .clone()
            .then(comparison_op.then(sum).or_not())
            .map(|(left, rest)| match rest {
                Some((op, right)) => compare(left, op, right),
                None => left,
            })
            .boxed();

        let negation = recursive(|negation| {
            just(Token::Not)
                .map_with(|_, e| e.span())
                .then(negation)
                .map(|(span, operand): (Span, Expr)| unary(UnaryOp::Not, span.start, operand))
                .or(comparison.clone())
        })
        .boxed();

        let conjunction = negation
            .clone()
            .foldl(just(Token::And).ignore_then(negation).repeated(), |left, right| {
                logical(left, LogicalOp::And, right)
            })
            .boxed();

        let disjunction = conjunction
            .clone()
            .foldl(just(Token::Or).ignore_then(conjunction).repeated(), |left, right| {
                logical(left, LogicalOp::Or, right)
            })
            .boxed();

        disjunction
            .clone()
            .then(
                just(Token::If)
                    .ignore_then(disjunction)
                    .then_ignore(just(Token::Else))
                    .then(expr)
                    .or_not(),
            )
            .map(|(then, rest): (Expr, Option<(Expr, Expr)>)| match rest {
                Some((cond, orelse)) => {
                    let span = then.span.start..orelse.span.end;
                    Expr::new(
                        ExprKind::IfElse {
                            cond: Box::new(cond),
                            then: Box::new(then),
                            orelse: Box::new(orelse),
                        },
                        span,
                    )
                }
                None => then,
            })
    })
}

/// Identifier parser.
fn ident_parser<'tokens, I>() -> impl Parser<'tokens, I, String, ParserExtra<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = Span>,
{
    select! {
        Token::Ident(s) => s,
    }
    .labelled("identifier")
}

/// Identifier parser that keeps the span.
fn spanned_ident_parser<'tokens, I>() -> impl Parser<'tokens, I, Ident, ParserExtra<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = Span>,
{
    ident_parser().map_with(|name, e| Ident {
        name,
        span: to_range(e.span()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(src: &str) -> Line {
        let (tokens, errors) = lexer::tokenize(src, 0);
        assert!(errors.is_empty(), "lex errors: {errors:?}");
        parse_line(&tokens, src.len()).expect("parse")
    }

    fn stmt(src: &str) -> StmtKind {
        match line(src) {
            Line::Simple(stmt) => stmt.kind,
            other => panic!("expected simple statement, got {other:?}"),
        }
    }

    fn expr(src: &str) -> Expr {
        parse_expression(src, 0).expect("expression")
    }

    fn parse_err(src: &str) -> Vec<ParseError> {
        let (tokens, _) = lexer::tokenize(src, 0);
        parse_line(&tokens, src.len()).expect_err("should fail")
    }

    #[test]
    fn parse_call_statement() {
        match stmt("print('hi', end='')") {
            StmtKind::Expr(Expr {
                kind: ExprKind::Call { args, kwargs, .. },
                ..
            }) => {
                assert_eq!(args.len(), 1);
                assert_eq!(kwargs.len(), 1);
                assert_eq!(kwargs[0].0.name, "end");
            }
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn parse_assignment() {
        match stmt("result = 2 + 2") {
            StmtKind::Assign {
                target: Target::Name(ident),
                value,
            } => {
                assert_eq!(ident.name, "result");
                assert!(matches!(
                    value.kind,
                    ExprKind::Binary {
                        op: BinaryOp::Add,
                        ..
                    }
                ));
            }
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn parse_tuple_unpacking() {
        match stmt("a, b = pair") {
            StmtKind::Assign {
                target: Target::Tuple(names),
                ..
            } => assert_eq!(names.len(), 2),
            other => panic!("expected tuple target, got {other:?}"),
        }
    }

    #[test]
    fn parse_subscript_assignment() {
        assert!(matches!(
            stmt("d['k'] = 1"),
            StmtKind::Assign {
                target: Target::Subscript { .. },
                ..
            }
        ));
    }

    #[test]
    fn parse_aug_assign() {
        assert!(matches!(
            stmt("total += x"),
            StmtKind::AugAssign {
                op: BinaryOp::Add,
                ..
            }
        ));
    }

    #[test]
    fn cannot_assign_to_call() {
        let errs = parse_err("f() = 1");
        assert!(!errs.is_empty());
    }

    #[test]
    fn parse_headers() {
        assert!(matches!(line("if x > 1:"), Line::Header(Header::If(_))));
        assert!(matches!(line("elif x:"), Line::Header(Header::Elif(_))));
        assert!(matches!(line("else:"), Line::Header(Header::Else)));
        assert!(matches!(line("while True:"), Line::Header(Header::While(_))));
        match line("for k, v in d.items():") {
            Line::Header(Header::For { targets, .. }) => assert_eq!(targets.len(), 2),
            other => panic!("expected for, got {other:?}"),
        }
    }

    #[test]
    fn parse_def_with_defaults_and_annotations() {
        match line("def greet(name: str, punct='!') -> str:") {
            Line::Header(Header::Def { name, params }) => {
                assert_eq!(name.name, "greet");
                assert_eq!(params.len(), 2);
                assert!(params[0].default.is_none());
                assert!(params[1].default.is_some());
            }
            other => panic!("expected def, got {other:?}"),
        }
    }

    #[test]
    fn header_requires_colon() {
        assert!(!parse_err("if x").is_empty());
    }

    #[test]
    fn power_binds_tighter_than_unary_minus() {
        let e = expr("-2 ** 2");
        match e.kind {
            ExprKind::Unary {
                op: UnaryOp::Neg,
                operand,
            } => assert!(matches!(
                operand.kind,
                ExprKind::Binary {
                    op: BinaryOp::Pow,
                    ..
                }
            )),
            other => panic!("expected negation, got {other:?}"),
        }
    }

    #[test]
    fn product_binds_tighter_than_sum() {
        match expr("1 + 2 * 3").kind {
            ExprKind::Binary {
                op: BinaryOp::Add,
                right,
                ..
            } => assert!(matches!(
                right.kind,
                ExprKind::Binary {
                    op: BinaryOp::Mul,
                    ..
                }
            )),
            other => panic!("expected sum, got {other:?}"),
        }
    }

    #[test]
    fn parse_not_in_and_is_not() {
        assert!(matches!(
            expr("x not in xs").kind,
            ExprKind::Compare {
                op: CompareOp::NotIn,
                ..
            }
        ));
        assert!(matches!(
            expr("x is not None").kind,
            ExprKind::Compare {
                op: CompareOp::IsNot,
                ..
            }
        ));
    }

    #[test]
    fn parse_conditional_expression() {
        assert!(matches!(expr("a if c else b").kind, ExprKind::IfElse { .. }));
    }

    #[test]
    fn parse_method_chain() {
        match expr("s.strip().split(',')").kind {
            ExprKind::Call { func, args, .. } => {
                assert_eq!(args.len(), 1);
                assert!(matches!(func.kind, ExprKind::Attribute { .. }));
            }
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn parse_slices() {
        assert!(matches!(expr("xs[1:]").kind, ExprKind::Slice { .. }));
        assert!(matches!(expr("xs[:2]").kind, ExprKind::Slice { .. }));
        assert!(matches!(expr("xs[0]").kind, ExprKind::Subscript { .. }));
    }

    #[test]
    fn parse_displays() {
        assert!(matches!(expr("[1, 2, 3]").kind, ExprKind::List(ref v) if v.len() == 3));
        assert!(matches!(expr("{'a': 1, 'b': 2}").kind, ExprKind::Dict(ref v) if v.len() == 2));
        assert!(matches!(expr("(1,)").kind, ExprKind::Tuple(ref v) if v.len() == 1));
        assert!(matches!(expr("()").kind, ExprKind::Tuple(ref v) if v.is_empty()));
        assert!(matches!(expr("(1)").kind, ExprKind::Literal(Literal::Int(1))));
    }

    #[test]
    fn parse_fstring_fields() {
        match expr("f\"{name} is {age:.1f} {{ok}}\"").kind {
            ExprKind::FString(parts) => {
                assert_eq!(parts.len(), 4);
                assert!(matches!(&parts[3], FStringPart::Text(t) if t == " {ok}"));
                match &parts[2] {
                    FStringPart::Field { spec, .. } => assert_eq!(spec.as_deref(), Some(".1f")),
                    other => panic!("expected field, got {other:?}"),
                }
            }
            other => panic!("expected f-string, got {other:?}"),
        }
    }

    #[test]
    fn fstring_with_bad_field_is_an_error() {
        assert!(parse_expression("f\"{}\"", 0).is_err());
        assert!(parse_expression("f\"{x\"", 0).is_err());
    }

    #[test]
    fn spans_are_absolute() {
        let (tokens, _) = lexer::tokenize("x = y", 40);
        match parse_line(&tokens, 45).expect("parse") {
            Line::Simple(stmt) => {
                assert_eq!(stmt.span, 40..45);
                match stmt.kind {
                    StmtKind::Assign { value, .. } => assert_eq!(value.span, 44..45),
                    other => panic!("expected assignment, got {other:?}"),
                }
            }
            other => panic!("expected simple line, got {other:?}"),
        }
    }
}
