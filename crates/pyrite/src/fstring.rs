//! F-string assembly and format-spec application.
//!
//! Specs follow the `[[fill]align][sign][#][0][width][,][.precision][type]`
//! mini-language, covering the forms realistic scripts use: alignment,
//! zero-padding, thousands separators, precision, and the d/b/o/x/X/f/F/e/E/
//! g/%/s presentation types.

use num_traits::ToPrimitive;

use crate::{
    eval::{Evaluator, Scope},
    exceptions::{RunError, RunResult},
    expressions::{Conversion, FStringPart},
    value::{Value, as_number, float_repr, int_repr, Num},
};

/// Evaluates and joins all parts of an f-string.
pub(crate) fn format_fstring(ev: &mut Evaluator, parts: &[FStringPart], scope: &Scope) -> RunResult<Value> {
    let mut out = String::new();
    for part in parts {
        match part {
            FStringPart::Literal(text) => out.push_str(text),
            FStringPart::Expr {
                expr,
                conversion,
                spec,
            } => {
                let value = ev.eval(expr, scope)?;
                let rendered = match conversion {
                    Some(Conversion::Repr) => {
                        let repr = ev.repr_value(&value)?;
                        apply_optional_spec(ev, &Value::str(repr), spec.as_deref(), scope)?
                    }
                    Some(Conversion::Str) => {
                        let s = ev.str_value(&value)?;
                        apply_optional_spec(ev, &Value::str(s), spec.as_deref(), scope)?
                    }
                    None => apply_optional_spec(ev, &value, spec.as_deref(), scope)?,
                };
                out.push_str(&rendered);
            }
        }
    }
    Ok(Value::str(out))
}

fn apply_optional_spec(
    ev: &mut Evaluator,
    value: &Value,
    spec: Option<&[FStringPart]>,
    scope: &Scope,
) -> RunResult<String> {
    match spec {
        None => ev.str_value(value),
        Some(parts) => {
            // the spec may itself interpolate expressions ({x:{width}})
            let mut spec_text = String::new();
            for part in parts {
                match part {
                    FStringPart::Literal(text) => spec_text.push_str(text),
                    FStringPart::Expr { expr, .. } => {
                        let v = ev.eval(expr, scope)?;
                        spec_text.push_str(&ev.str_value(&v)?);
                    }
                }
            }
            format_value(ev, value, &spec_text)
        }
    }
}

#[derive(Debug, Default)]
struct FormatSpec {
    fill: Option<char>,
    align: Option<char>,
    sign: Option<char>,
    zero: bool,
    width: Option<usize>,
    comma: bool,
    precision: Option<usize>,
    kind: Option<char>,
}

/// Formats one value against a parsed format spec.
pub(crate) fn format_value(ev: &mut Evaluator, value: &Value, spec_text: &str) -> RunResult<String> {
    let spec = parse_spec(spec_text)?;
    let body = render_body(ev, value, &spec)?;
    Ok(pad(body, &spec, value))
}

fn parse_spec(text: &str) -> RunResult<FormatSpec> {
    let mut spec = FormatSpec::default();
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;

    if chars.len() >= 2 && matches!(chars[1], '<' | '>' | '^') {
        spec.fill = Some(chars[0]);
        spec.align = Some(chars[1]);
        i = 2;
    } else if !chars.is_empty() && matches!(chars[0], '<' | '>' | '^') {
        spec.align = Some(chars[0]);
        i = 1;
    }
    if i < chars.len() && matches!(chars[i], '+' | '-' | ' ') {
        spec.sign = Some(chars[i]);
        i += 1;
    }
    if i < chars.len() && chars[i] == '#' {
        i += 1;
    }
    if i < chars.len() && chars[i] == '0' {
        spec.zero = true;
        i += 1;
    }
    let mut width = String::new();
    while i < chars.len() && chars[i].is_ascii_digit() {
        width.push(chars[i]);
        i += 1;
    }
    if !width.is_empty() {
        spec.width = width.parse().ok();
    }
    if i < chars.len() && chars[i] == ',' {
        spec.comma = true;
        i += 1;
    }
    if i < chars.len() && chars[i] == '.' {
        i += 1;
        let mut precision = String::new();
        while i < chars.len() && chars[i].is_ascii_digit() {
            precision.push(chars[i]);
            i += 1;
        }
        spec.precision = precision.parse().ok();
        if spec.precision.is_none() {
            return Err(RunError::value_error("format spec missing precision digits"));
        }
    }
    if i < chars.len() {
        let kind = chars[i];
        if !matches!(kind, 'd' | 'b' | 'o' | 'x' | 'X' | 'f' | 'F' | 'e' | 'E' | 'g' | 'G' | '%' | 's') {
            return Err(RunError::value_error(format!(
                "unknown format code '{kind}' in format spec"
            )));
        }
        spec.kind = Some(kind);
        i += 1;
    }
    if i < chars.len() {
        return Err(RunError::value_error(format!("invalid format spec '{text}'")));
    }
    Ok(spec)
}

fn render_body(ev: &mut Evaluator, value: &Value, spec: &FormatSpec) -> RunResult<String> {
    match spec.kind {
        Some('s') | None => {
            let mut s = ev.str_value(value)?;
            if let (Some(precision), true) = (spec.precision, matches!(value, Value::Str(_))) {
                s.truncate_chars(precision);
            }
            // numeric defaults still honour sign/comma without a type code
            if spec.kind.is_none() && as_number(value).is_some() && (spec.sign.is_some() || spec.comma) {
                return render_numeric_default(value, spec);
            }
            if spec.kind.is_none() {
                if let Some(precision) = spec.precision {
                    if matches!(value, Value::Float(_)) {
                        if let Some(Num::Float(f)) = as_number(value) {
                            return Ok(apply_sign(format!("{f:.precision$}"), f < 0.0, spec));
                        }
                    }
                }
            }
            Ok(s)
        }
        Some('d') => {
            let rendered = int_repr(value)
                .or_else(|| match value {
                    Value::Bool(b) => Some(i64::from(*b).to_string()),
                    _ => None,
                })
                .ok_or_else(|| {
                    RunError::value_error(format!(
                        "unknown format code 'd' for object of type '{}'",
                        value.type_name()
                    ))
                })?;
            Ok(group_int(rendered, spec))
        }
        Some(kind @ ('b' | 'o' | 'x' | 'X')) => {
            let Some(i) = value.as_index() else {
                return Err(RunError::value_error(format!(
                    "unknown format code '{kind}' for object of type '{}'",
                    value.type_name()
                )));
            };
            let magnitude = i.unsigned_abs();
            let digits = match kind {
                'b' => format!("{magnitude:b}"),
                'o' => format!("{magnitude:o}"),
                'x' => format!("{magnitude:x}"),
                _ => format!("{magnitude:X}"),
            };
            Ok(apply_sign(digits, i < 0, spec))
        }
        Some(kind @ ('f' | 'F' | 'e' | 'E' | 'g' | 'G' | '%')) => {
            let Some(num) = as_number(value) else {
                return Err(RunError::value_error(format!(
                    "unknown format code '{kind}' for object of type '{}'",
                    value.type_name()
                )));
            };
            let f = match num {
                Num::Int(i) => i as f64,
                Num::Big(b) => b.to_f64().unwrap_or(f64::INFINITY),
                Num::Float(f) => f,
            };
            let precision = spec.precision.unwrap_or(6);
            let body = match kind {
                'f' | 'F' => format!("{:.*}", precision, f.abs()),
                'e' => format_exp(f.abs(), precision, false),
                'E' => format_exp(f.abs(), precision, true),
                '%' => format!("{:.*}%", precision, f.abs() * 100.0),
                _ => {
                    // 'g': shortest of fixed/exponent at the given significance
                    let formatted = format!("{:.*}", precision.max(1), f.abs());
                    trim_g(&formatted)
                }
            };
            let grouped = if spec.comma { group_float(&body) } else { body };
            Ok(apply_sign(grouped, f.is_sign_negative() && f != 0.0, spec))
        }
        Some(other) => Err(RunError::value_error(format!(
            "unknown format code '{other}' in format spec"
        ))),
    }
}

fn render_numeric_default(value: &Value, spec: &FormatSpec) -> RunResult<String> {
    match value {
        Value::Float(f) => Ok(apply_sign(group_if(float_repr(f.abs()), spec), *f < 0.0, spec)),
        _ => {
            let rendered = int_repr(value).unwrap_or_default();
            Ok(group_int(rendered, spec))
        }
    }
}

fn group_if(s: String, spec: &FormatSpec) -> String {
    if spec.comma { group_float(&s) } else { s }
}

/// Applies the sign policy to an unsigned rendering.
fn apply_sign(body: String, negative: bool, spec: &FormatSpec) -> String {
    if negative {
        format!("-{body}")
    } else {
        match spec.sign {
            Some('+') => format!("+{body}"),
            Some(' ') => format!(" {body}"),
            _ => body,
        }
    }
}

/// Comma-groups a signed integer rendering.
fn group_int(rendered: String, spec: &FormatSpec) -> String {
    let negative = rendered.starts_with('-');
    let digits = rendered.trim_start_matches('-');
    let grouped = if spec.comma { group_digits(digits) } else { digits.to_owned() };
    apply_sign(grouped, negative, spec)
}

fn group_digits(digits: &str) -> String {
    let chars: Vec<char> = digits.chars().collect();
    let mut out = String::new();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(*c);
    }
    out
}

fn group_float(body: &str) -> String {
    match body.split_once('.') {
        Some((int_part, frac)) => format!("{}.{frac}", group_digits(int_part)),
        None => group_digits(body),
    }
}

fn format_exp(f: f64, precision: usize, upper: bool) -> String {
    let formatted = format!("{f:.precision$e}");
    // Rust renders 1.5e2; the source language wants 1.5e+02
    let (mantissa, exp) = formatted.split_once('e').unwrap_or((formatted.as_str(), "0"));
    let (sign, digits) = match exp.strip_prefix('-') {
        Some(rest) => ('-', rest),
        None => ('+', exp),
    };
    let e = if upper { 'E' } else { 'e' };
    if digits.len() < 2 {
        format!("{mantissa}{e}{sign}0{digits}")
    } else {
        format!("{mantissa}{e}{sign}{digits}")
    }
}

fn trim_g(formatted: &str) -> String {
    if formatted.contains('.') {
        let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
        trimmed.to_owned()
    } else {
        formatted.to_owned()
    }
}

/// Pads a rendered body per fill/align/width.
fn pad(body: String, spec: &FormatSpec, value: &Value) -> String {
    let Some(width) = spec.width else {
        return body;
    };
    let current = body.chars().count();
    if current >= width {
        return body;
    }
    let missing = width - current;
    let numeric = as_number(value).is_some();
    let align = spec.align.unwrap_or(if numeric { '>' } else { '<' });
    let fill = spec.fill.unwrap_or(if spec.zero && numeric { '0' } else { ' ' });

    // zero-fill keeps the sign out front
    if fill == '0' && numeric && align == '>' {
        let (sign, rest) = match body.strip_prefix('-') {
            Some(rest) => ("-", rest),
            None => match body.strip_prefix('+') {
                Some(rest) => ("+", rest),
                None => ("", body.as_str()),
            },
        };
        return format!("{sign}{}{rest}", "0".repeat(missing));
    }

    let fill_str: String = std::iter::repeat_n(fill, missing).collect();
    match align {
        '>' => format!("{fill_str}{body}"),
        '^' => {
            let left = missing / 2;
            let right = missing - left;
            format!(
                "{}{body}{}",
                fill_str.chars().take(left).collect::<String>(),
                fill_str.chars().take(right).collect::<String>()
            )
        }
        _ => format!("{body}{fill_str}"),
    }
}

trait TruncateChars {
    fn truncate_chars(&mut self, max: usize);
}

impl TruncateChars for String {
    fn truncate_chars(&mut self, max: usize) {
        if self.chars().count() > max {
            let truncated: String = self.chars().take(max).collect();
            *self = truncated;
        }
    }
}
