//! f-string field formatting: `[[fill]align][width][,][.precision][type]`
//! with types `f`, `d`, `s` and `%`.

use super::control_flow::Fault;
use super::value::{Value, format_float};

/// Widths and precisions above this are refused rather than allocated.
const MAX_FORMAT_WIDTH: usize = 1 << 16;

#[derive(Debug, Clone, PartialEq, Eq)]
struct FormatSpec {
    fill: char,
    align: Option<char>,
    width: usize,
    grouping: bool,
    precision: Option<usize>,
    kind: Option<char>,
}

fn take_number(chars: &[char], pos: &mut usize) -> Option<String> {
    let start = *pos;
    while chars.get(*pos).is_some_and(char::is_ascii_digit) {
        *pos += 1;
    }
    (*pos > start).then(|| chars[start..*pos].iter().collect())
}

impl FormatSpec {
    fn parse(spec: &str) -> Result<Self, Fault> {
        let invalid = || Fault::value_error(format!("Invalid format specifier '{spec}'"));
        let bounded = |digits: String| {
            digits
                .parse::<usize>()
                .ok()
                .filter(|n| *n <= MAX_FORMAT_WIDTH)
                .ok_or_else(|| Fault::value_error("Too many decimal digits in format string"))
        };
        let chars: Vec<char> = spec.chars().collect();
        let is_align = |c: &char| matches!(c, '<' | '>' | '^');

        let mut parsed = FormatSpec {
            fill: ' ',
            align: None,
            width: 0,
            grouping: false,
            precision: None,
            kind: None,
        };
        let mut pos = 0;
        if chars.get(1).is_some_and(is_align) {
            parsed.fill = chars[0];
            parsed.align = Some(chars[1]);
            pos = 2;
        } else if chars.first().is_some_and(is_align) {
            parsed.align = Some(chars[0]);
            pos = 1;
        }
        if let Some(width) = take_number(&chars, &mut pos) {
            parsed.width = bounded(width)?;
        }
        if chars.get(pos) == Some(&',') {
            parsed.grouping = true;
            pos += 1;
        }
        if chars.get(pos) == Some(&'.') {
            pos += 1;
            let digits = take_number(&chars, &mut pos).ok_or_else(|| {
                Fault::value_error("Format specifier missing precision")
            })?;
            parsed.precision = Some(bounded(digits)?);
        }
        if let Some(kind) = chars.get(pos) {
            if !matches!(kind, 'f' | 'd' | 's' | '%') {
                return Err(invalid());
            }
            parsed.kind = Some(*kind);
            pos += 1;
        }
        if pos != chars.len() {
            return Err(invalid());
        }
        Ok(parsed)
    }
}

fn unknown_code(code: char, value: &Value) -> Fault {
    Fault::value_error(format!(
        "Unknown format code '{code}' for object of type '{}'",
        value.type_name()
    ))
}

fn number(value: &Value, code: char) -> Result<f64, Fault> {
    match value {
        Value::Int(_) | Value::Float(_) | Value::Bool(_) => value
            .as_float()
            .ok_or_else(|| unknown_code(code, value)),
        other => Err(unknown_code(code, other)),
    }
}

fn non_finite(f: f64) -> Option<String> {
    if f.is_nan() {
        Some("nan".into())
    } else if f.is_infinite() {
        Some(if f > 0.0 { "inf" } else { "-inf" }.into())
    } else {
        None
    }
}

fn fixed(f: f64, precision: usize) -> String {
    non_finite(f).unwrap_or_else(|| format!("{f:.precision$}"))
}

fn trim_zeros(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}

/// `precision` significant digits, switching to exponent form for very
/// large or small magnitudes.
fn general(f: f64, precision: usize) -> String {
    if let Some(special) = non_finite(f) {
        return special;
    }
    if f == 0.0 {
        return format_float(f);
    }
    let digits = precision.max(1);
    let scientific = format!("{:.*e}", digits - 1, f);
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((&scientific, "0"));
    let exponent: i64 = exponent.parse().unwrap_or(0);
    if exponent < -4 || exponent >= digits as i64 {
        let sign = if exponent < 0 { '-' } else { '+' };
        return format!("{}e{sign}{:02}", trim_zeros(mantissa), exponent.abs());
    }
    let decimals = (digits as i64 - 1 - exponent).max(0) as usize;
    let text = format!("{f:.decimals$}");
    let trimmed = trim_zeros(&text);
    if trimmed.contains('.') {
        trimmed.to_string()
    } else {
        format!("{trimmed}.0")
    }
}

fn truncate(text: &str, precision: Option<usize>) -> String {
    match precision {
        Some(n) => text.chars().take(n).collect(),
        None => text.to_string(),
    }
}

fn group_thousands(number: &str) -> String {
    let (sign, rest) = number
        .strip_prefix('-')
        .map_or(("", number), |rest| ("-", rest));
    let split = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let (int, tail) = rest.split_at(split);
    let mut grouped = String::with_capacity(int.len() + int.len() / 3);
    for (i, ch) in int.chars().enumerate() {
        if i > 0 && (int.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{sign}{grouped}{tail}")
}

fn pad(body: String, spec: &FormatSpec, numeric: bool) -> String {
    let len = body.chars().count();
    if len >= spec.width {
        return body;
    }
    let missing = spec.width - len;
    let (left, right) = match spec.align.unwrap_or(if numeric { '>' } else { '<' }) {
        '<' => (0, missing),
        '^' => (missing / 2, missing - missing / 2),
        _ => (missing, 0),
    };
    let fill = |n: usize| std::iter::repeat_n(spec.fill, n).collect::<String>();
    format!("{}{body}{}", fill(left), fill(right))
}

/// Render `value` for an f-string field.
pub fn format_value(value: &Value, spec: Option<&str>) -> Result<String, Fault> {
    let Some(spec) = spec.filter(|s| !s.is_empty()) else {
        return Ok(value.to_str());
    };
    let spec = FormatSpec::parse(spec)?;
    let numeric = matches!(value, Value::Int(_) | Value::Float(_) | Value::Bool(_));

    let body = match spec.kind {
        Some('f') => fixed(number(value, 'f')?, spec.precision.unwrap_or(6)),
        Some('%') => format!(
            "{}%",
            fixed(number(value, '%')? * 100.0, spec.precision.unwrap_or(6))
        ),
        Some('d') => match value {
            Value::Int(_) | Value::Bool(_) if spec.precision.is_none() => {
                value.as_int().unwrap_or(0).to_string()
            }
            Value::Int(_) | Value::Bool(_) => {
                return Err(Fault::value_error(
                    "Precision not allowed in integer format specifier",
                ));
            }
            other => return Err(unknown_code('d', other)),
        },
        Some(_) => match value {
            Value::Str(s) => truncate(s, spec.precision),
            other => return Err(unknown_code('s', other)),
        },
        None => match (value, spec.precision) {
            (Value::Float(f), Some(precision)) => general(*f, precision),
            (Value::Str(s), precision) => truncate(s, precision),
            (Value::Int(_) | Value::Bool(_), Some(_)) => {
                return Err(Fault::value_error(
                    "Precision not allowed in integer format specifier",
                ));
            }
            (other, _) => other.to_str(),
        },
    };

    let body = if !spec.grouping {
        body
    } else if numeric && spec.kind != Some('s') {
        group_thousands(&body)
    } else {
        return Err(Fault::value_error("Cannot specify ',' with 's'."));
    };
    Ok(pad(body, &spec, numeric))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(Value::Float(3.14159), ".2f", "3.14")]
    #[case(Value::Int(7), ".1f", "7.0")]
    #[case(Value::Int(1234567), ",", "1,234,567")]
    #[case(Value::Float(-9876.5), ",.1f", "-9,876.5")]
    #[case(Value::Int(42), "5", "   42")]
    #[case(Value::Int(42), "<5d", "42   ")]
    #[case(Value::str("ab"), ">5", "   ab")]
    #[case(Value::str("ab"), "4", "ab  ")]
    #[case(Value::Float(3.14159), "*^8.2f", "**3.14**")]
    #[case(Value::Float(0.256), ".1%", "25.6%")]
    #[case(Value::str("abcdef"), ".3s", "abc")]
    #[case(Value::Float(3.14159), ".3", "3.14")]
    #[case(Value::Float(3.0), ".2", "3.0")]
    #[case(Value::Float(1234.5), ".2", "1.2e+03")]
    fn formats(#[case] value: Value, #[case] spec: &str, #[case] want: &str) {
        assert_eq!(format_value(&value, Some(spec)).expect("valid spec"), want);
    }

    #[test]
    fn no_spec_uses_str() {
        assert_eq!(format_value(&Value::Float(2.0), None).expect("plain"), "2.0");
        assert_eq!(format_value(&Value::None, Some("")).expect("plain"), "None");
    }

    #[rstest]
    #[case(Value::str("x"), ".2f")]
    #[case(Value::Float(1.5), "d")]
    #[case(Value::Int(1), "q")]
    #[case(Value::Int(1), ".")]
    #[case(Value::str("x"), ",")]
    #[case(Value::Int(1), "99999999999")]
    fn rejects(#[case] value: Value, #[case] spec: &str) {
        assert!(format_value(&value, Some(spec)).is_err());
    }
}
