//! Lexer for action scripts.
//!
//! Tokenizes one logical line at a time using logos. Newlines, backslash
//! continuations and comments are skipped here: the validator's boundary
//! scanner has already cut the source into logical lines, and indentation is
//! measured from the raw text before lexing.
//!
//! String literals are lexed by callbacks so that escapes are decoded once and
//! an unterminated string becomes a single error token spanning the rest of
//! the physical line.

use std::fmt;
use std::ops::Range;

use logos::{Lexer, Logos};

/// Alias keeps `logos-derive` from rewriting `'static` to the source lifetime.
type Keyword = &'static str;

/// Tokens of the action-script language.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip(r"([ \t\f\r\n]+|\\\r?\n|#[^\n]*)", allow_greedy = true))]
pub enum Token {
    // Keywords
    #[token("def")]
    Def,
    #[token("if")]
    If,
    #[token("elif")]
    Elif,
    #[token("else")]
    Else,
    #[token("for")]
    For,
    #[token("while")]
    While,
    #[token("in")]
    In,
    #[token("not")]
    Not,
    #[token("and")]
    And,
    #[token("or")]
    Or,
    #[token("is")]
    Is,
    #[token("return")]
    Return,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("pass")]
    Pass,
    #[token("True")]
    True,
    #[token("False")]
    False,
    #[token("None")]
    None,
    #[token("import")]
    Import,
    #[token("from")]
    From,

    /// Python keywords the sandbox does not support.
    #[token("class", |_| "class")]
    #[token("try", |_| "try")]
    #[token("except", |_| "except")]
    #[token("finally", |_| "finally")]
    #[token("with", |_| "with")]
    #[token("lambda", |_| "lambda")]
    #[token("global", |_| "global")]
    #[token("nonlocal", |_| "nonlocal")]
    #[token("del", |_| "del")]
    #[token("raise", |_| "raise")]
    #[token("yield", |_| "yield")]
    #[token("async", |_| "async")]
    #[token("await", |_| "await")]
    #[token("assert", |_| "assert")]
    #[token("@", |_| "@")]
    Unsupported(Keyword),

    // Punctuation
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(";")]
    Semi,
    #[token(".")]
    Dot,
    #[token("->")]
    Arrow,

    // Assignment
    #[token("=")]
    Assign,
    #[token("+=")]
    PlusAssign,
    #[token("-=")]
    MinusAssign,
    #[token("*=")]
    StarAssign,
    #[token("/=")]
    SlashAssign,
    #[token("//=")]
    SlashSlashAssign,
    #[token("%=")]
    PercentAssign,

    // Operators
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("<=")]
    LtEq,
    #[token(">=")]
    GtEq,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("**")]
    StarStar,
    #[token("/")]
    Slash,
    #[token("//")]
    SlashSlash,
    #[token("%")]
    Percent,

    // Literals
    #[regex(r"[0-9][0-9_]*", lex_int)]
    Int(i64),
    #[regex(r"[0-9][0-9_]*\.[0-9_]*([eE][+-]?[0-9]+)?", lex_float)]
    #[regex(r"\.[0-9][0-9_]*([eE][+-]?[0-9]+)?", lex_float)]
    #[regex(r"[0-9][0-9_]*[eE][+-]?[0-9]+", lex_float)]
    Float(f64),

    #[token("\"", |lex| lex_string(lex, "\"", false))]
    #[token("'", |lex| lex_string(lex, "'", false))]
    #[token("\"\"\"", |lex| lex_string(lex, "\"\"\"", false))]
    #[token("'''", |lex| lex_string(lex, "'''", false))]
    #[token("r\"", |lex| lex_string(lex, "\"", true))]
    #[token("r'", |lex| lex_string(lex, "'", true))]
    #[token("r\"\"\"", |lex| lex_string(lex, "\"\"\"", true))]
    #[token("r'''", |lex| lex_string(lex, "'''", true))]
    Str(String),

    /// f-string body with escapes decoded and `{}` fields left in place.
    #[token("f\"", |lex| lex_string(lex, "\"", false))]
    #[token("f'", |lex| lex_string(lex, "'", false))]
    #[token("f\"\"\"", |lex| lex_string(lex, "\"\"\"", false))]
    #[token("f'''", |lex| lex_string(lex, "'''", false))]
    #[token("rf\"", |lex| lex_string(lex, "\"", true))]
    #[token("rf'", |lex| lex_string(lex, "'", true))]
    #[token("fr\"", |lex| lex_string(lex, "\"", true))]
    #[token("fr'", |lex| lex_string(lex, "'", true))]
    FStr(String),

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),
}

impl Token {
    /// True for tokens that open a bracketed group.
    pub fn is_opener(&self) -> bool {
        matches!(self, Token::LParen | Token::LBracket | Token::LBrace)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Def => write!(f, "def"),
            Token::If => write!(f, "if"),
            Token::Elif => write!(f, "elif"),
            Token::Else => write!(f, "else"),
            Token::For => write!(f, "for"),
            Token::While => write!(f, "while"),
            Token::In => write!(f, "in"),
            Token::Not => write!(f, "not"),
            Token::And => write!(f, "and"),
            Token::Or => write!(f, "or"),
            Token::Is => write!(f, "is"),
            Token::Return => write!(f, "return"),
            Token::Break => write!(f, "break"),
            Token::Continue => write!(f, "continue"),
            Token::Pass => write!(f, "pass"),
            Token::True => write!(f, "True"),
            Token::False => write!(f, "False"),
            Token::None => write!(f, "None"),
            Token::Import => write!(f, "import"),
            Token::From => write!(f, "from"),
            Token::Unsupported(kw) => write!(f, "{kw}"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::Comma => write!(f, ","),
            Token::Colon => write!(f, ":"),
            Token::Semi => write!(f, ";"),
            Token::Dot => write!(f, "."),
            Token::Arrow => write!(f, "->"),
            Token::Assign => write!(f, "="),
            Token::PlusAssign => write!(f, "+="),
            Token::MinusAssign => write!(f, "-="),
            Token::StarAssign => write!(f, "*="),
            Token::SlashAssign => write!(f, "/="),
            Token::SlashSlashAssign => write!(f, "//="),
            Token::PercentAssign => write!(f, "%="),
            Token::EqEq => write!(f, "=="),
            Token::NotEq => write!(f, "!="),
            Token::Lt => write!(f, "<"),
            Token::Gt => write!(f, ">"),
            Token::LtEq => write!(f, "<="),
            Token::GtEq => write!(f, ">="),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::StarStar => write!(f, "**"),
            Token::Slash => write!(f, "/"),
            Token::SlashSlash => write!(f, "//"),
            Token::Percent => write!(f, "%"),
            Token::Int(n) => write!(f, "{n}"),
            Token::Float(x) => write!(f, "{x}"),
            Token::Str(s) => write!(f, "{s:?}"),
            Token::FStr(s) => write!(f, "f{s:?}"),
            Token::Ident(name) => write!(f, "{name}"),
        }
    }
}

/// A token with its byte span.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub span: Range<usize>,
}

/// What kind of text the lexer could not tokenize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexErrorKind {
    UnterminatedString,
    InvalidNumber,
    InvalidCharacter,
}

/// A lexer error with its byte span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub kind: LexErrorKind,
    pub span: Range<usize>,
    pub text: String,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            LexErrorKind::UnterminatedString => write!(f, "unterminated string literal"),
            LexErrorKind::InvalidNumber => write!(f, "invalid number literal `{}`", self.text),
            LexErrorKind::InvalidCharacter => write!(f, "invalid character `{}`", self.text),
        }
    }
}

/// Tokenize `source`, shifting every span by `base`.
///
/// Lexing never stops at an error: invalid input is reported and skipped so
/// the caller sees every problem on the line.
pub fn tokenize(source: &str, base: usize) -> (Vec<Spanned>, Vec<LexError>) {
    let mut tokens = Vec::new();
    let mut errors = Vec::new();

    for (result, span) in Token::lexer(source).spanned() {
        let text = &source[span.clone()];
        let shifted = (span.start + base)..(span.end + base);
        match result {
            Ok(token) => tokens.push(Spanned {
                token,
                span: shifted,
            }),
            Err(()) => errors.push(LexError {
                kind: classify_error(text),
                span: shifted,
                text: text.to_string(),
            }),
        }
    }

    (tokens, errors)
}

fn classify_error(text: &str) -> LexErrorKind {
    let stripped = text.trim_start_matches(['r', 'f']);
    if stripped.starts_with('"') || stripped.starts_with('\'') {
        LexErrorKind::UnterminatedString
    } else if text.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
        LexErrorKind::InvalidNumber
    } else {
        LexErrorKind::InvalidCharacter
    }
}

fn lex_int(lex: &mut Lexer<Token>) -> Option<i64> {
    lex.slice().replace('_', "").parse().ok()
}

fn lex_float(lex: &mut Lexer<Token>) -> Option<f64> {
    lex.slice().replace('_', "").parse().ok()
}

/// Consume a string body up to the closing `quote`.
///
/// Returns `None` (a lexer error) when a single-quoted string reaches the end
/// of its physical line or any string reaches end of input. In that case the
/// rest of the line is consumed so the error does not cascade.
fn lex_string(lex: &mut Lexer<Token>, quote: &str, raw: bool) -> Option<String> {
    let rest = lex.remainder();
    let triple = quote.len() == 3;
    let mut out = String::new();
    let mut chars = rest.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if rest[i..].starts_with(quote) {
            lex.bump(i + quote.len());
            return Some(out);
        }
        match c {
            '\n' if !triple => {
                lex.bump(i);
                return None;
            }
            '\\' => {
                let Some((_, next)) = chars.next() else {
                    break;
                };
                if raw {
                    out.push('\\');
                    out.push(next);
                    continue;
                }
                match next {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    '0' => out.push('\0'),
                    '\\' => out.push('\\'),
                    '\'' => out.push('\''),
                    '"' => out.push('"'),
                    // Escaped newline continues the string on the next line.
                    '\n' => {}
                    'x' => {
                        let hex: String = (0..2).filter_map(|_| chars.next().map(|(_, h)| h)).collect();
                        match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                            Some(decoded) => out.push(decoded),
                            None => {
                                out.push_str("\\x");
                                out.push_str(&hex);
                            }
                        }
                    }
                    'u' => {
                        let hex: String = (0..4).filter_map(|_| chars.next().map(|(_, h)| h)).collect();
                        match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                            Some(decoded) => out.push(decoded),
                            None => {
                                out.push_str("\\u");
                                out.push_str(&hex);
                            }
                        }
                    }
                    other => {
                        out.push('\\');
                        out.push(other);
                    }
                }
            }
            _ => out.push(c),
        }
    }

    lex.bump(rest.len());
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(src: &str) -> Vec<Token> {
        let (tokens, errors) = tokenize(src, 0);
        assert!(errors.is_empty(), "unexpected lex errors: {errors:?}");
        tokens.into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn keywords_and_identifiers() {
        assert_eq!(
            tokens("def define if iffy"),
            vec![
                Token::Def,
                Token::Ident("define".into()),
                Token::If,
                Token::Ident("iffy".into()),
            ]
        );
    }

    #[test]
    fn numbers() {
        assert_eq!(
            tokens("42 1_000 3.5 .5 1e3 2."),
            vec![
                Token::Int(42),
                Token::Int(1000),
                Token::Float(3.5),
                Token::Float(0.5),
                Token::Float(1000.0),
                Token::Float(2.0),
            ]
        );
    }

    #[test]
    fn attribute_access_is_not_a_float() {
        assert_eq!(
            tokens("x.upper"),
            vec![Token::Ident("x".into()), Token::Dot, Token::Ident("upper".into())]
        );
    }

    #[test]
    fn strings_decode_escapes() {
        assert_eq!(tokens(r#""a\nb""#), vec![Token::Str("a\nb".into())]);
        assert_eq!(tokens(r#"'it\'s'"#), vec![Token::Str("it's".into())]);
        assert_eq!(tokens(r#"r"\d+""#), vec![Token::Str("\\d+".into())]);
    }

    #[test]
    fn triple_quoted_string_spans_lines() {
        assert_eq!(
            tokens("\"\"\"one\ntwo\"\"\""),
            vec![Token::Str("one\ntwo".into())]
        );
    }

    #[test]
    fn fstring_keeps_fields() {
        assert_eq!(tokens("f\"hi {name}\""), vec![Token::FStr("hi {name}".into())]);
    }

    #[test]
    fn comments_and_continuations_are_skipped() {
        assert_eq!(
            tokens("x = 1 + \\\n 2  # trailing"),
            vec![
                Token::Ident("x".into()),
                Token::Assign,
                Token::Int(1),
                Token::Plus,
                Token::Int(2),
            ]
        );
    }

    #[test]
    fn operators_prefer_longest_match() {
        assert_eq!(
            tokens("a //= b ** c <= d"),
            vec![
                Token::Ident("a".into()),
                Token::SlashSlashAssign,
                Token::Ident("b".into()),
                Token::StarStar,
                Token::Ident("c".into()),
                Token::LtEq,
                Token::Ident("d".into()),
            ]
        );
    }

    #[test]
    fn unsupported_keywords_are_tagged() {
        assert_eq!(
            tokens("try lambda"),
            vec![Token::Unsupported("try"), Token::Unsupported("lambda")]
        );
    }

    #[test]
    fn unterminated_string_is_one_error() {
        let (tokens, errors) = tokenize("x = 'abc\ny = 2", 10);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, LexErrorKind::UnterminatedString);
        assert_eq!(errors[0].span.start, 14);
        // Lexing resumes on the next physical line.
        assert!(tokens.iter().any(|t| t.token == Token::Ident("y".into())));
    }

    #[test]
    fn invalid_character_is_reported_and_skipped() {
        let (tokens, errors) = tokenize("a $ b", 0);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, LexErrorKind::InvalidCharacter);
        assert_eq!(tokens.len(), 2);
    }

    #[test]
    fn spans_are_shifted_by_base() {
        let (tokens, _) = tokenize("ab", 100);
        assert_eq!(tokens[0].span, 100..102);
    }
}
