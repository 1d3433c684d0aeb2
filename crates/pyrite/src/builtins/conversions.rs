//! Constructors backing the builtin type classes (`int()`, `list()`, ...).

use std::sync::Arc;

use num_bigint::BigInt;
use num_traits::{FromPrimitive, Num as _, ToPrimitive};

use crate::{
    eval::Evaluator,
    exceptions::{ExcType, RunError, RunResult},
    value::{DictData, Key, RangeValue, SetData, TypeTag, Value, plock},
};

pub(crate) fn construct_type(
    ev: &mut Evaluator,
    tag: TypeTag,
    pos: Vec<Value>,
    kw: Vec<(String, Value)>,
    line: u32,
) -> RunResult<Value> {
    match tag {
        TypeTag::Int => int_constructor(&pos),
        TypeTag::Float => float_constructor(&pos),
        TypeTag::Bool => {
            let value = match pos.first() {
                Some(v) => ev.value_truthy(v)?,
                None => false,
            };
            Ok(Value::Bool(value))
        }
        TypeTag::Str => match pos.first() {
            Some(value) => Ok(Value::str(ev.str_value(value)?)),
            None => Ok(Value::str(String::new())),
        },
        TypeTag::List => match pos.first() {
            Some(iterable) => Ok(Value::list(ev.drain_iterable(iterable, line)?)),
            None => Ok(Value::list(Vec::new())),
        },
        TypeTag::Tuple => match pos.first() {
            Some(iterable) => Ok(Value::tuple(ev.drain_iterable(iterable, line)?)),
            None => Ok(Value::tuple(Vec::new())),
        },
        TypeTag::Set => match pos.first() {
            Some(iterable) => {
                let mut data = SetData::default();
                for item in ev.drain_iterable(iterable, line)? {
                    data.insert(Key::new(item)?);
                }
                Ok(Value::set(data))
            }
            None => Ok(Value::set(SetData::default())),
        },
        TypeTag::Dict => {
            let mut data = DictData::default();
            match pos.first() {
                Some(Value::Dict(d)) => {
                    data = plock(d).clone();
                }
                Some(iterable) => {
                    for pair in ev.drain_iterable(iterable, line)? {
                        let items = match &pair {
                            Value::Tuple(items) if items.len() == 2 => items.to_vec(),
                            Value::List(items) if plock(items).len() == 2 => plock(items).clone(),
                            _ => {
                                return Err(RunError::value_error(
                                    "dict() update sequence elements must be pairs",
                                ));
                            }
                        };
                        data.insert(Key::new(items[0].clone())?, items[1].clone());
                    }
                }
                None => {}
            }
            for (name, value) in kw {
                data.insert(Key::new(Value::str(name))?, value);
            }
            Ok(Value::dict(data))
        }
        TypeTag::Range => range_constructor(&pos),
        TypeTag::Type => match pos.first() {
            Some(value) => Ok(crate::builtins::type_of(ev, value)),
            None => Err(RunError::type_error("type() takes 1 argument")),
        },
    }
}

/// `int(x)` / `int(s, base)` with base 0 auto-detection and underscores.
fn int_constructor(pos: &[Value]) -> RunResult<Value> {
    let Some(value) = pos.first() else {
        return Ok(Value::Int(0));
    };
    match value {
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Int(_) | Value::BigInt(_) => {
            if pos.len() > 1 {
                return Err(RunError::type_error("int() can't convert non-string with explicit base"));
            }
            Ok(value.clone())
        }
        Value::Float(f) => {
            if pos.len() > 1 {
                return Err(RunError::type_error("int() can't convert non-string with explicit base"));
            }
            if f.is_nan() {
                return Err(RunError::value_error("cannot convert float NaN to integer"));
            }
            if f.is_infinite() {
                return Err(RunError::raise(
                    ExcType::OverflowError,
                    "cannot convert float infinity to integer",
                ));
            }
            let truncated = f.trunc();
            if truncated.abs() < 9e18 {
                Ok(Value::Int(truncated as i64))
            } else {
                match BigInt::from_f64(truncated) {
                    Some(b) => Ok(Value::from_bigint(b)),
                    None => Err(RunError::value_error("cannot convert float to integer")),
                }
            }
        }
        Value::Str(s) => {
            let base = match pos.get(1) {
                Some(b) => b.as_index().ok_or_else(|| {
                    RunError::type_error(format!("int() base must be an integer, not {}", b.type_name()))
                })?,
                None => 10,
            };
            parse_int_literal(s, base)
        }
        other => Err(RunError::type_error(format!(
            "int() argument must be a string or a number, not '{}'",
            other.type_name()
        ))),
    }
}

fn parse_int_literal(s: &str, base: i64) -> RunResult<Value> {
    let error = || RunError::value_error(format!("invalid literal for int() with base {base}: '{s}'"));
    if !matches!(base, 0 | 2 | 8 | 10 | 16) {
        return Err(RunError::value_error("int() base must be 0, 2, 8, 10 or 16"));
    }
    let trimmed = s.trim();
    let (negative, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let lower = body.to_ascii_lowercase();
    let (radix, digits, had_prefix) = match base {
        0 => {
            if let Some(rest) = lower.strip_prefix("0x") {
                (16, rest.to_owned(), true)
            } else if let Some(rest) = lower.strip_prefix("0o") {
                (8, rest.to_owned(), true)
            } else if let Some(rest) = lower.strip_prefix("0b") {
                (2, rest.to_owned(), true)
            } else {
                (10, lower, false)
            }
        }
        16 => match lower.strip_prefix("0x") {
            Some(rest) => (16, rest.to_owned(), true),
            None => (16, lower, false),
        },
        8 => match lower.strip_prefix("0o") {
            Some(rest) => (8, rest.to_owned(), true),
            None => (8, lower, false),
        },
        2 => match lower.strip_prefix("0b") {
            Some(rest) => (2, rest.to_owned(), true),
            None => (2, lower, false),
        },
        _ => (10, lower, false),
    };
    // one underscore may directly follow a base prefix ("0x_ff")
    let digits = match (had_prefix, digits.strip_prefix('_')) {
        (true, Some(rest)) => rest.to_owned(),
        _ => digits,
    };
    if digits.is_empty() || digits.starts_with('_') || digits.ends_with('_') || digits.contains("__") {
        return Err(error());
    }
    let cleaned = digits.replace('_', "");
    let magnitude = BigInt::from_str_radix(&cleaned, radix).map_err(|_| error())?;
    Ok(Value::from_bigint(if negative { -magnitude } else { magnitude }))
}

fn float_constructor(pos: &[Value]) -> RunResult<Value> {
    let Some(value) = pos.first() else {
        return Ok(Value::Float(0.0));
    };
    match value {
        Value::Bool(b) => Ok(Value::Float(f64::from(u8::from(*b)))),
        Value::Int(i) => Ok(Value::Float(*i as f64)),
        Value::BigInt(b) => Ok(Value::Float(b.to_f64().unwrap_or(f64::INFINITY))),
        Value::Float(_) => Ok(value.clone()),
        Value::Str(s) => {
            let trimmed = s.trim();
            match trimmed.to_ascii_lowercase().as_str() {
                "inf" | "+inf" | "infinity" | "+infinity" => return Ok(Value::Float(f64::INFINITY)),
                "-inf" | "-infinity" => return Ok(Value::Float(f64::NEG_INFINITY)),
                "nan" | "+nan" | "-nan" => return Ok(Value::Float(f64::NAN)),
                _ => {}
            }
            let cleaned = trimmed.replace('_', "");
            cleaned
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| RunError::value_error(format!("could not convert string to float: '{s}'")))
        }
        other => Err(RunError::type_error(format!(
            "float() argument must be a string or a number, not '{}'",
            other.type_name()
        ))),
    }
}

fn range_constructor(pos: &[Value]) -> RunResult<Value> {
    let as_int = |v: &Value| -> RunResult<i64> {
        v.as_index().ok_or_else(|| {
            RunError::type_error(format!(
                "'{}' object cannot be interpreted as an integer",
                v.type_name()
            ))
        })
    };
    let (start, stop, step) = match pos.len() {
        1 => (0, as_int(&pos[0])?, 1),
        2 => (as_int(&pos[0])?, as_int(&pos[1])?, 1),
        3 => {
            let step = as_int(&pos[2])?;
            if step == 0 {
                return Err(RunError::value_error("range() arg 3 must not be zero"));
            }
            (as_int(&pos[0])?, as_int(&pos[1])?, step)
        }
        n => {
            return Err(RunError::type_error(format!(
                "range() takes 1 to 3 arguments ({n} given)"
            )));
        }
    };
    Ok(Value::Range(Arc::new(RangeValue { start, stop, step })))
}
