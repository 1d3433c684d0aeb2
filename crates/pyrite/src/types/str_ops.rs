//! String methods.

use crate::{
    eval::Evaluator,
    exceptions::{ExcType, RunError, RunResult},
    value::{MethodFn, Value},
};

pub(crate) fn method(name: &str) -> Option<MethodFn> {
    Some(match name {
        "upper" => s_upper,
        "lower" => s_lower,
        "strip" => s_strip,
        "lstrip" => s_lstrip,
        "rstrip" => s_rstrip,
        "split" => s_split,
        "rsplit" => s_rsplit,
        "splitlines" => s_splitlines,
        "join" => s_join,
        "replace" => s_replace,
        "startswith" => s_startswith,
        "endswith" => s_endswith,
        "find" => s_find,
        "rfind" => s_rfind,
        "index" => s_index,
        "count" => s_count,
        "isdigit" => s_isdigit,
        "isalpha" => s_isalpha,
        "isalnum" => s_isalnum,
        "isspace" => s_isspace,
        "isupper" => s_isupper,
        "islower" => s_islower,
        "title" => s_title,
        "capitalize" => s_capitalize,
        "zfill" => s_zfill,
        "center" => s_center,
        "ljust" => s_ljust,
        "rjust" => s_rjust,
        "removeprefix" => s_removeprefix,
        "removesuffix" => s_removesuffix,
        "encode" => s_encode,
        "format" => s_format_rejected,
        _ => return None,
    })
}

fn recv_str(recv: &Value) -> RunResult<&str> {
    match recv {
        Value::Str(s) => Ok(s),
        other => Err(RunError::type_error(format!(
            "str method called on '{}'",
            other.type_name()
        ))),
    }
}

fn arg_str<'a>(args: &'a [Value], i: usize, method: &str) -> RunResult<&'a str> {
    match args.get(i) {
        Some(Value::Str(s)) => Ok(s),
        Some(other) => Err(RunError::type_error(format!(
            "{method}() argument must be str, not {}",
            other.type_name()
        ))),
        None => Err(RunError::type_error(format!("{method}() missing required argument"))),
    }
}

fn no_kwargs(kw: &[(String, Value)], method: &str) -> RunResult<()> {
    if let Some((name, _)) = kw.first() {
        return Err(RunError::type_error(format!(
            "{method}() got an unexpected keyword argument '{name}'"
        )));
    }
    Ok(())
}

fn s_upper(_ev: &mut Evaluator, recv: &Value, _a: Vec<Value>, kw: Vec<(String, Value)>) -> RunResult<Value> {
    no_kwargs(&kw, "upper")?;
    Ok(Value::str(recv_str(recv)?.to_uppercase()))
}

fn s_lower(_ev: &mut Evaluator, recv: &Value, _a: Vec<Value>, kw: Vec<(String, Value)>) -> RunResult<Value> {
    no_kwargs(&kw, "lower")?;
    Ok(Value::str(recv_str(recv)?.to_lowercase()))
}

fn strip_chars(args: &[Value], method: &str) -> RunResult<Option<Vec<char>>> {
    match args.first() {
        None | Some(Value::None) => Ok(None),
        Some(Value::Str(s)) => Ok(Some(s.chars().collect())),
        Some(other) => Err(RunError::type_error(format!(
            "{method}() argument must be str or None, not {}",
            other.type_name()
        ))),
    }
}

fn s_strip(_ev: &mut Evaluator, recv: &Value, args: Vec<Value>, kw: Vec<(String, Value)>) -> RunResult<Value> {
    no_kwargs(&kw, "strip")?;
    let s = recv_str(recv)?;
    Ok(Value::str(match strip_chars(&args, "strip")? {
        None => s.trim().to_owned(),
        Some(chars) => s.trim_matches(|c| chars.contains(&c)).to_owned(),
    }))
}

fn s_lstrip(_ev: &mut Evaluator, recv: &Value, args: Vec<Value>, kw: Vec<(String, Value)>) -> RunResult<Value> {
    no_kwargs(&kw, "lstrip")?;
    let s = recv_str(recv)?;
    Ok(Value::str(match strip_chars(&args, "lstrip")? {
        None => s.trim_start().to_owned(),
        Some(chars) => s.trim_start_matches(|c| chars.contains(&c)).to_owned(),
    }))
}

fn s_rstrip(_ev: &mut Evaluator, recv: &Value, args: Vec<Value>, kw: Vec<(String, Value)>) -> RunResult<Value> {
    no_kwargs(&kw, "rstrip")?;
    let s = recv_str(recv)?;
    Ok(Value::str(match strip_chars(&args, "rstrip")? {
        None => s.trim_end().to_owned(),
        Some(chars) => s.trim_end_matches(|c| chars.contains(&c)).to_owned(),
    }))
}

fn split_impl(s: &str, args: &[Value], from_right: bool, method: &str) -> RunResult<Vec<Value>> {
    let maxsplit = match args.get(1) {
        Some(v) => v.as_index().unwrap_or(-1),
        None => -1,
    };
    let parts: Vec<String> = match args.first() {
        None | Some(Value::None) => {
            // whitespace split: runs collapse, no empty strings
            let mut parts: Vec<String> = Vec::new();
            let mut remaining = s.trim();
            let mut splits = 0;
            while !remaining.is_empty() {
                if maxsplit >= 0 && splits >= maxsplit {
                    parts.push(remaining.to_owned());
                    break;
                }
                match remaining.find(char::is_whitespace) {
                    Some(pos) => {
                        parts.push(remaining[..pos].to_owned());
                        remaining = remaining[pos..].trim_start();
                        splits += 1;
                    }
                    None => {
                        parts.push(remaining.to_owned());
                        break;
                    }
                }
            }
            if from_right {
                // whitespace rsplit only differs when maxsplit is set; keep simple
                parts
            } else {
                parts
            }
        }
        Some(Value::Str(sep)) => {
            if sep.is_empty() {
                return Err(RunError::value_error("empty separator"));
            }
            let mut parts: Vec<String> = if from_right {
                let mut rev: Vec<String> = Vec::new();
                let mut remaining = s;
                let mut splits = 0;
                while maxsplit < 0 || splits < maxsplit {
                    match remaining.rfind(&**sep) {
                        Some(pos) => {
                            rev.push(remaining[pos + sep.len()..].to_owned());
                            remaining = &remaining[..pos];
                            splits += 1;
                        }
                        None => break,
                    }
                }
                rev.push(remaining.to_owned());
                rev.reverse();
                rev
            } else {
                let mut parts: Vec<String> = Vec::new();
                let mut remaining = s;
                let mut splits = 0;
                while maxsplit < 0 || splits < maxsplit {
                    match remaining.find(&**sep) {
                        Some(pos) => {
                            parts.push(remaining[..pos].to_owned());
                            remaining = &remaining[pos + sep.len()..];
                            splits += 1;
                        }
                        None => break,
                    }
                }
                parts.push(remaining.to_owned());
                parts
            };
            if parts.is_empty() {
                parts.push(String::new());
            }
            parts
        }
        Some(other) => {
            return Err(RunError::type_error(format!(
                "{method}() separator must be str or None, not {}",
                other.type_name()
            )));
        }
    };
    Ok(parts.into_iter().map(Value::str).collect())
}

fn s_split(_ev: &mut Evaluator, recv: &Value, args: Vec<Value>, kw: Vec<(String, Value)>) -> RunResult<Value> {
    no_kwargs(&kw, "split")?;
    Ok(Value::list(split_impl(recv_str(recv)?, &args, false, "split")?))
}

fn s_rsplit(_ev: &mut Evaluator, recv: &Value, args: Vec<Value>, kw: Vec<(String, Value)>) -> RunResult<Value> {
    no_kwargs(&kw, "rsplit")?;
    Ok(Value::list(split_impl(recv_str(recv)?, &args, true, "rsplit")?))
}

fn s_splitlines(_ev: &mut Evaluator, recv: &Value, _a: Vec<Value>, kw: Vec<(String, Value)>) -> RunResult<Value> {
    no_kwargs(&kw, "splitlines")?;
    let lines: Vec<Value> = recv_str(recv)?.lines().map(Value::str).collect();
    Ok(Value::list(lines))
}

fn s_join(ev: &mut Evaluator, recv: &Value, args: Vec<Value>, kw: Vec<(String, Value)>) -> RunResult<Value> {
    no_kwargs(&kw, "join")?;
    let sep = recv_str(recv)?.to_owned();
    let Some(iterable) = args.first() else {
        return Err(RunError::type_error("join() missing required argument"));
    };
    let items = ev.drain_iterable(iterable, 0)?;
    let mut parts = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        match item {
            Value::Str(s) => parts.push(s.to_string()),
            other => {
                return Err(RunError::type_error(format!(
                    "sequence item {i}: expected str instance, {} found",
                    other.type_name()
                )));
            }
        }
    }
    Ok(Value::str(parts.join(&sep)))
}

fn s_replace(_ev: &mut Evaluator, recv: &Value, args: Vec<Value>, kw: Vec<(String, Value)>) -> RunResult<Value> {
    no_kwargs(&kw, "replace")?;
    let s = recv_str(recv)?;
    let old = arg_str(&args, 0, "replace")?;
    let new = arg_str(&args, 1, "replace")?;
    let count = args.get(2).and_then(Value::as_index).unwrap_or(-1);
    if count < 0 {
        Ok(Value::str(s.replace(old, new)))
    } else {
        Ok(Value::str(s.replacen(old, new, count as usize)))
    }
}

fn prefix_args(args: &[Value], method: &str) -> RunResult<Vec<String>> {
    match args.first() {
        Some(Value::Str(s)) => Ok(vec![s.to_string()]),
        Some(Value::Tuple(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items.iter() {
                match item {
                    Value::Str(s) => out.push(s.to_string()),
                    other => {
                        return Err(RunError::type_error(format!(
                            "{method}() tuple elements must be str, not {}",
                            other.type_name()
                        )));
                    }
                }
            }
            Ok(out)
        }
        Some(other) => Err(RunError::type_error(format!(
            "{method}() argument must be str or a tuple of str, not {}",
            other.type_name()
        ))),
        None => Err(RunError::type_error(format!("{method}() missing required argument"))),
    }
}

fn s_startswith(_ev: &mut Evaluator, recv: &Value, args: Vec<Value>, kw: Vec<(String, Value)>) -> RunResult<Value> {
    no_kwargs(&kw, "startswith")?;
    let s = recv_str(recv)?;
    Ok(Value::Bool(prefix_args(&args, "startswith")?.iter().any(|p| s.starts_with(p))))
}

fn s_endswith(_ev: &mut Evaluator, recv: &Value, args: Vec<Value>, kw: Vec<(String, Value)>) -> RunResult<Value> {
    no_kwargs(&kw, "endswith")?;
    let s = recv_str(recv)?;
    Ok(Value::Bool(prefix_args(&args, "endswith")?.iter().any(|p| s.ends_with(p))))
}

/// Byte offset -> code-point index.
fn char_index_of(s: &str, byte_pos: usize) -> i64 {
    s[..byte_pos].chars().count() as i64
}

fn s_find(_ev: &mut Evaluator, recv: &Value, args: Vec<Value>, kw: Vec<(String, Value)>) -> RunResult<Value> {
    no_kwargs(&kw, "find")?;
    let s = recv_str(recv)?;
    let needle = arg_str(&args, 0, "find")?;
    Ok(Value::Int(match s.find(needle) {
        Some(pos) => char_index_of(s, pos),
        None => -1,
    }))
}

fn s_rfind(_ev: &mut Evaluator, recv: &Value, args: Vec<Value>, kw: Vec<(String, Value)>) -> RunResult<Value> {
    no_kwargs(&kw, "rfind")?;
    let s = recv_str(recv)?;
    let needle = arg_str(&args, 0, "rfind")?;
    Ok(Value::Int(match s.rfind(needle) {
        Some(pos) => char_index_of(s, pos),
        None => -1,
    }))
}

fn s_index(_ev: &mut Evaluator, recv: &Value, args: Vec<Value>, kw: Vec<(String, Value)>) -> RunResult<Value> {
    no_kwargs(&kw, "index")?;
    let s = recv_str(recv)?;
    let needle = arg_str(&args, 0, "index")?;
    match s.find(needle) {
        Some(pos) => Ok(Value::Int(char_index_of(s, pos))),
        None => Err(RunError::value_error("substring not found")),
    }
}

fn s_count(_ev: &mut Evaluator, recv: &Value, args: Vec<Value>, kw: Vec<(String, Value)>) -> RunResult<Value> {
    no_kwargs(&kw, "count")?;
    let s = recv_str(recv)?;
    let needle = arg_str(&args, 0, "count")?;
    if needle.is_empty() {
        return Ok(Value::Int(s.chars().count() as i64 + 1));
    }
    Ok(Value::Int(s.matches(needle).count() as i64))
}

fn class_test(recv: &Value, test: impl Fn(char) -> bool) -> RunResult<Value> {
    let s = recv_str(recv)?;
    Ok(Value::Bool(!s.is_empty() && s.chars().all(test)))
}

fn s_isdigit(_ev: &mut Evaluator, recv: &Value, _a: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    class_test(recv, |c| c.is_ascii_digit())
}

fn s_isalpha(_ev: &mut Evaluator, recv: &Value, _a: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    class_test(recv, char::is_alphabetic)
}

fn s_isalnum(_ev: &mut Evaluator, recv: &Value, _a: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    class_test(recv, char::is_alphanumeric)
}

fn s_isspace(_ev: &mut Evaluator, recv: &Value, _a: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    class_test(recv, char::is_whitespace)
}

fn s_isupper(_ev: &mut Evaluator, recv: &Value, _a: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    let s = recv_str(recv)?;
    let has_cased = s.chars().any(char::is_alphabetic);
    Ok(Value::Bool(has_cased && !s.chars().any(char::is_lowercase)))
}

fn s_islower(_ev: &mut Evaluator, recv: &Value, _a: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    let s = recv_str(recv)?;
    let has_cased = s.chars().any(char::is_alphabetic);
    Ok(Value::Bool(has_cased && !s.chars().any(char::is_uppercase)))
}

fn s_title(_ev: &mut Evaluator, recv: &Value, _a: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    let s = recv_str(recv)?;
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if c.is_alphabetic() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    Ok(Value::str(out))
}

fn s_capitalize(_ev: &mut Evaluator, recv: &Value, _a: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    let s = recv_str(recv)?;
    let mut chars = s.chars();
    let out = match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    };
    Ok(Value::str(out))
}

fn s_zfill(_ev: &mut Evaluator, recv: &Value, args: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    let s = recv_str(recv)?;
    let width = args.first().and_then(Value::as_index).unwrap_or(0).max(0) as usize;
    let current = s.chars().count();
    if current >= width {
        return Ok(recv.clone());
    }
    let (sign, rest) = match s.strip_prefix(['-', '+']) {
        Some(rest) => (&s[..1], rest),
        None => ("", s),
    };
    Ok(Value::str(format!("{sign}{}{rest}", "0".repeat(width - current))))
}

fn justify(recv: &Value, args: &[Value], method: &str, mode: char) -> RunResult<Value> {
    let s = recv_str(recv)?;
    let Some(width) = args.first().and_then(Value::as_index) else {
        return Err(RunError::type_error(format!("{method}() missing required width")));
    };
    let fill = match args.get(1) {
        Some(Value::Str(f)) if f.chars().count() == 1 => f.chars().next().unwrap_or(' '),
        Some(_) => {
            return Err(RunError::type_error(format!(
                "{method}() fill character must be exactly one character"
            )));
        }
        None => ' ',
    };
    let current = s.chars().count() as i64;
    if current >= width {
        return Ok(recv.clone());
    }
    let missing = (width - current) as usize;
    let out = match mode {
        '<' => format!("{s}{}", fill.to_string().repeat(missing)),
        '>' => format!("{}{s}", fill.to_string().repeat(missing)),
        _ => {
            let left = missing / 2;
            let right = missing - left;
            format!(
                "{}{s}{}",
                fill.to_string().repeat(left),
                fill.to_string().repeat(right)
            )
        }
    };
    Ok(Value::str(out))
}

fn s_center(_ev: &mut Evaluator, recv: &Value, args: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    justify(recv, &args, "center", '^')
}

fn s_ljust(_ev: &mut Evaluator, recv: &Value, args: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    justify(recv, &args, "ljust", '<')
}

fn s_rjust(_ev: &mut Evaluator, recv: &Value, args: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    justify(recv, &args, "rjust", '>')
}

fn s_removeprefix(_ev: &mut Evaluator, recv: &Value, args: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    let s = recv_str(recv)?;
    let prefix = arg_str(&args, 0, "removeprefix")?;
    Ok(Value::str(s.strip_prefix(prefix).unwrap_or(s).to_owned()))
}

fn s_removesuffix(_ev: &mut Evaluator, recv: &Value, args: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    let s = recv_str(recv)?;
    let suffix = arg_str(&args, 0, "removesuffix")?;
    Ok(Value::str(s.strip_suffix(suffix).unwrap_or(s).to_owned()))
}

fn s_encode(_ev: &mut Evaluator, _recv: &Value, _a: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    Err(RunError::raise(
        ExcType::NotImplementedError,
        "bytes values are not supported by this interpreter; keep data as str",
    ))
}

fn s_format_rejected(_ev: &mut Evaluator, _recv: &Value, _a: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    Err(RunError::raise(
        ExcType::NotImplementedError,
        "str.format() is not supported; use an f-string instead",
    ))
}
