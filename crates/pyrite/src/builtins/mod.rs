//! The builtin function table.
//!
//! Builtin *types* (`int`, `str`, `list`, ...) and exception classes live in
//! the per-Ctx class table; this module covers the callable builtins and the
//! constructors backing the type classes.

mod conversions;
mod min_max;
mod print;
mod sorted_fn;

use std::sync::Arc;

use strum::{Display, EnumString};

use crate::{
    ctx::{EventKind, EventPayload},
    eval::Evaluator,
    exceptions::{ExcType, RunError, RunResult},
    types::{file, iter::IterState},
    value::{RangeValue, Value, as_number, plock, py_hash, Num},
};

pub(crate) use conversions::construct_type;

/// Callable builtins, named by their source-language spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub(crate) enum Builtin {
    Len,
    Print,
    Abs,
    Min,
    Max,
    Sum,
    Sorted,
    Reversed,
    Enumerate,
    Zip,
    Isinstance,
    Callable,
    Round,
    Any,
    All,
    Map,
    Filter,
    Chr,
    Ord,
    Hex,
    Oct,
    Bin,
    Pow,
    Divmod,
    Repr,
    Hash,
    Iter,
    Next,
    Open,
    Suspend,
    Super,
}

/// Resolves a builtin name (type classes are resolved by the class table
/// before this is consulted).
pub(crate) fn lookup(name: &str) -> Option<Value> {
    let builtin: Builtin = name.parse().ok()?;
    Some(Value::Builtin(builtin))
}

pub(crate) fn call(
    ev: &mut Evaluator,
    builtin: Builtin,
    mut pos: Vec<Value>,
    kw: Vec<(String, Value)>,
    line: u32,
) -> RunResult<Value> {
    match builtin {
        Builtin::Print => print::print(ev, pos, kw),
        Builtin::Min => min_max::min_max(ev, pos, kw, true),
        Builtin::Max => min_max::min_max(ev, pos, kw, false),
        Builtin::Sorted => sorted_fn::sorted(ev, pos, kw, line),
        _ => {
            if let Some((name, _)) = kw.first() {
                return Err(RunError::type_error(format!(
                    "{builtin}() got an unexpected keyword argument '{name}'"
                )));
            }
            call_positional(ev, builtin, &mut pos, line)
        }
    }
}

fn arity(builtin: Builtin, pos: &[Value], min: usize, max: usize) -> RunResult<()> {
    if pos.len() < min || pos.len() > max {
        let expected = if min == max {
            format!("{min}")
        } else {
            format!("{min} to {max}")
        };
        return Err(RunError::type_error(format!(
            "{builtin}() takes {expected} argument{} ({} given)",
            if max == 1 { "" } else { "s" },
            pos.len()
        )));
    }
    Ok(())
}

fn call_positional(ev: &mut Evaluator, builtin: Builtin, pos: &mut Vec<Value>, line: u32) -> RunResult<Value> {
    match builtin {
        Builtin::Len => {
            arity(builtin, pos, 1, 1)?;
            value_len(ev, &pos[0])
        }
        Builtin::Abs => {
            arity(builtin, pos, 1, 1)?;
            match as_number(&pos[0]) {
                Some(Num::Int(i)) => Ok(match i.checked_abs() {
                    Some(a) => Value::Int(a),
                    None => Value::from_bigint(-num_bigint::BigInt::from(i)),
                }),
                Some(Num::Big(b)) => Ok(Value::from_bigint(b.magnitude().clone().into())),
                Some(Num::Float(f)) => Ok(Value::Float(f.abs())),
                None => Err(RunError::type_error(format!(
                    "bad operand type for abs(): '{}'",
                    pos[0].type_name()
                ))),
            }
        }
        Builtin::Sum => {
            arity(builtin, pos, 1, 2)?;
            let start = pos.get(1).cloned().unwrap_or(Value::Int(0));
            if matches!(start, Value::Str(_)) {
                return Err(RunError::type_error(
                    "sum() can't sum strings (use ''.join(seq) instead)",
                ));
            }
            let mut acc = start;
            let iterator = ev.get_iter(&pos[0], line)?;
            loop {
                ev.ctx.check_time()?;
                let Some(item) = ev.iter_next(&iterator, line)? else {
                    break;
                };
                acc = ev.binary(crate::expressions::BinOp::Add, &acc, &item, line)?;
            }
            Ok(acc)
        }
        Builtin::Reversed => {
            arity(builtin, pos, 1, 1)?;
            if let Value::Range(r) = &pos[0] {
                // reversed ranges stay lazy
                let len = r.len();
                if len == 0 {
                    return Ok(IterState::Items { items: vec![], idx: 0 }.into_value());
                }
                return Ok(IterState::Range {
                    range: Arc::new(RangeValue {
                        start: r.get(len - 1),
                        stop: r.start - r.step.signum(),
                        step: -r.step,
                    }),
                    idx: 0,
                }
                .into_value());
            }
            let mut items = ev.drain_iterable(&pos[0], line)?;
            items.reverse();
            Ok(IterState::Items { items, idx: 0 }.into_value())
        }
        Builtin::Enumerate => {
            arity(builtin, pos, 1, 2)?;
            let start = pos.get(1).and_then(Value::as_index).unwrap_or(0);
            let inner = ev.get_iter(&pos[0], line)?;
            Ok(IterState::Enumerate { inner, count: start }.into_value())
        }
        Builtin::Zip => {
            let mut inners = Vec::with_capacity(pos.len());
            for iterable in pos.iter() {
                inners.push(ev.get_iter(iterable, line)?);
            }
            Ok(IterState::Zip { inners }.into_value())
        }
        Builtin::Map => {
            if pos.len() < 2 {
                return Err(RunError::type_error("map() requires a function and at least one iterable"));
            }
            let func = pos.remove(0);
            let mut inners = Vec::with_capacity(pos.len());
            for iterable in pos.iter() {
                inners.push(ev.get_iter(iterable, line)?);
            }
            Ok(IterState::Map { func, inners }.into_value())
        }
        Builtin::Filter => {
            arity(builtin, pos, 2, 2)?;
            let func = pos.remove(0);
            let inner = ev.get_iter(&pos[0], line)?;
            Ok(IterState::Filter { func, inner }.into_value())
        }
        Builtin::Isinstance => {
            arity(builtin, pos, 2, 2)?;
            let classes = match &pos[1] {
                Value::Tuple(items) => items.to_vec(),
                other => vec![other.clone()],
            };
            for candidate in classes {
                let Value::Class(class) = candidate else {
                    return Err(RunError::type_error(
                        "isinstance() arg 2 must be a type or tuple of types",
                    ));
                };
                if ev.value_isinstance(&pos[0], &class) {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        Builtin::Callable => {
            arity(builtin, pos, 1, 1)?;
            let callable = match &pos[0] {
                Value::Function(_)
                | Value::Builtin(_)
                | Value::Native(_)
                | Value::NativeMethod(_)
                | Value::BoundMethod(_)
                | Value::Class(_) => true,
                Value::Instance(inst) => inst.class.lookup("__call__").is_some(),
                _ => false,
            };
            Ok(Value::Bool(callable))
        }
        Builtin::Round => {
            arity(builtin, pos, 1, 2)?;
            let digits = pos.get(1).and_then(Value::as_index);
            match as_number(&pos[0]) {
                Some(Num::Float(f)) => match digits {
                    None => {
                        // banker's rounding, matching the source language
                        let rounded = round_half_even(f);
                        if rounded.abs() < 9e18 {
                            Ok(Value::Int(rounded as i64))
                        } else {
                            Ok(Value::Float(rounded))
                        }
                    }
                    Some(d) => {
                        let factor = 10f64.powi(d.clamp(-300, 300) as i32);
                        Ok(Value::Float(round_half_even(f * factor) / factor))
                    }
                },
                Some(Num::Int(_) | Num::Big(_)) => Ok(pos[0].clone()),
                None => Err(RunError::type_error(format!(
                    "type {} doesn't define __round__ method",
                    pos[0].type_name()
                ))),
            }
        }
        Builtin::Any => {
            arity(builtin, pos, 1, 1)?;
            let iterator = ev.get_iter(&pos[0], line)?;
            while let Some(item) = ev.iter_next(&iterator, line)? {
                if ev.value_truthy(&item)? {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        Builtin::All => {
            arity(builtin, pos, 1, 1)?;
            let iterator = ev.get_iter(&pos[0], line)?;
            while let Some(item) = ev.iter_next(&iterator, line)? {
                if !ev.value_truthy(&item)? {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }
        Builtin::Chr => {
            arity(builtin, pos, 1, 1)?;
            let Some(code) = pos[0].as_index() else {
                return Err(RunError::type_error(format!(
                    "an integer is required (got type {})",
                    pos[0].type_name()
                )));
            };
            let c = u32::try_from(code)
                .ok()
                .and_then(char::from_u32)
                .ok_or_else(|| RunError::value_error("chr() arg not in range(0x110000)"))?;
            Ok(Value::str(c.to_string()))
        }
        Builtin::Ord => {
            arity(builtin, pos, 1, 1)?;
            let Value::Str(s) = &pos[0] else {
                return Err(RunError::type_error(format!(
                    "ord() expected string of length 1, but {} found",
                    pos[0].type_name()
                )));
            };
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(Value::Int(i64::from(u32::from(c)))),
                _ => Err(RunError::type_error(format!(
                    "ord() expected a character, but string of length {} found",
                    s.chars().count()
                ))),
            }
        }
        Builtin::Hex => based_repr(&pos[0], 16, "0x", builtin, pos),
        Builtin::Oct => based_repr(&pos[0], 8, "0o", builtin, pos),
        Builtin::Bin => based_repr(&pos[0], 2, "0b", builtin, pos),
        Builtin::Pow => {
            arity(builtin, pos, 2, 3)?;
            let base = pos[0].clone();
            let exp = pos[1].clone();
            let result = ev.binary(crate::expressions::BinOp::Pow, &base, &exp, line)?;
            match pos.get(2) {
                None | Some(Value::None) => Ok(result),
                Some(modulus) => ev.binary(crate::expressions::BinOp::Mod, &result, modulus, line),
            }
        }
        Builtin::Divmod => {
            arity(builtin, pos, 2, 2)?;
            let q = ev.binary(crate::expressions::BinOp::FloorDiv, &pos[0], &pos[1], line)?;
            let r = ev.binary(crate::expressions::BinOp::Mod, &pos[0], &pos[1], line)?;
            Ok(Value::tuple(vec![q, r]))
        }
        Builtin::Repr => {
            arity(builtin, pos, 1, 1)?;
            let rendered = ev.repr_value(&pos[0])?;
            Ok(Value::str(rendered))
        }
        Builtin::Hash => {
            arity(builtin, pos, 1, 1)?;
            Ok(Value::Int(py_hash(&pos[0])? as i64))
        }
        Builtin::Iter => {
            arity(builtin, pos, 1, 1)?;
            ev.get_iter(&pos[0], line)
        }
        Builtin::Next => {
            arity(builtin, pos, 1, 2)?;
            if let Some(err) = Evaluator::next_misuse_error(&pos[0]) {
                return Err(err);
            }
            match ev.iter_next(&pos[0], line) {
                Ok(Some(value)) => Ok(value),
                Ok(None) => match pos.get(1) {
                    Some(default) => Ok(default.clone()),
                    None => Err(RunError::stop_iteration()),
                },
                Err(err) if err.is_stop_iteration() => match pos.get(1) {
                    Some(default) => Ok(default.clone()),
                    None => Err(err),
                },
                Err(err) => Err(err),
            }
        }
        Builtin::Open => {
            arity(builtin, pos, 1, 2)?;
            let Value::Str(path) = &pos[0] else {
                return Err(RunError::type_error(format!(
                    "open() path must be str, not {}",
                    pos[0].type_name()
                )));
            };
            let mode = match pos.get(1) {
                Some(Value::Str(mode)) => mode.to_string(),
                Some(other) => {
                    return Err(RunError::type_error(format!(
                        "open() mode must be str, not {}",
                        other.type_name()
                    )));
                }
                None => "r".to_owned(),
            };
            file::open_file(ev, path, &mode)
        }
        Builtin::Suspend => {
            arity(builtin, pos, 0, 0)?;
            if ev.yield_port.is_some() {
                return Err(RunError::runtime_error(
                    "suspend() is not allowed inside a generator",
                ));
            }
            match ev.ctx.record(EventKind::Suspend, EventPayload::None)? {
                // replaying the original suspension: carry on as a no-op
                Some(_) => Ok(Value::None),
                None => Err(RunError::Suspend),
            }
        }
        Builtin::Super => {
            arity(builtin, pos, 0, 2)?;
            if pos.is_empty() {
                ev.make_super()
            } else {
                let Value::Class(class) = &pos[0] else {
                    return Err(RunError::type_error("super() argument 1 must be a type"));
                };
                let Some(instance) = pos.get(1) else {
                    return Err(RunError::type_error("super() with one argument is not supported"));
                };
                Ok(Value::Super(Arc::new(crate::value::SuperValue {
                    class: class.clone(),
                    instance: instance.clone(),
                })))
            }
        }
        Builtin::Print | Builtin::Min | Builtin::Max | Builtin::Sorted => {
            unreachable!("handled by the keyword-aware dispatcher")
        }
    }
}

fn based_repr(value: &Value, radix: u32, prefix: &str, builtin: Builtin, pos: &[Value]) -> RunResult<Value> {
    arity(builtin, pos, 1, 1)?;
    let rendered = match value {
        Value::Bool(b) => format_radix(i64::from(*b), radix, prefix),
        Value::Int(i) => format_radix(*i, radix, prefix),
        Value::BigInt(b) => {
            let (sign, magnitude) = (b.sign(), b.magnitude());
            let body = magnitude.to_str_radix(radix);
            if sign == num_bigint::Sign::Minus {
                format!("-{prefix}{body}")
            } else {
                format!("{prefix}{body}")
            }
        }
        other => {
            return Err(RunError::type_error(format!(
                "'{}' object cannot be interpreted as an integer",
                other.type_name()
            )));
        }
    };
    Ok(Value::str(rendered))
}

fn format_radix(i: i64, radix: u32, prefix: &str) -> String {
    let magnitude = i.unsigned_abs();
    let body = match radix {
        16 => format!("{magnitude:x}"),
        8 => format!("{magnitude:o}"),
        _ => format!("{magnitude:b}"),
    };
    if i < 0 {
        format!("-{prefix}{body}")
    } else {
        format!("{prefix}{body}")
    }
}

fn round_half_even(f: f64) -> f64 {
    let floor = f.floor();
    let diff = f - floor;
    if diff > 0.5 {
        floor + 1.0
    } else if diff < 0.5 {
        floor
    } else if (floor as i64) % 2 == 0 {
        floor
    } else {
        floor + 1.0
    }
}

/// `len()` with `__len__` dunder support.
fn value_len(ev: &mut Evaluator, value: &Value) -> RunResult<Value> {
    let len = match value {
        Value::Str(s) => s.chars().count() as i64,
        Value::List(items) => plock(items).len() as i64,
        Value::Tuple(items) => items.len() as i64,
        Value::Dict(d) => plock(d).len() as i64,
        Value::Set(s) => plock(s).len() as i64,
        Value::Range(r) => r.len(),
        Value::Instance(_) => {
            if let Some(result) = ev.try_dunder(value, "__len__", vec![])? {
                return match result.as_index() {
                    Some(n) if n >= 0 => Ok(Value::Int(n)),
                    _ => Err(RunError::type_error("__len__() should return a non-negative int")),
                };
            }
            return Err(RunError::type_error(format!(
                "object of type '{}' has no len()",
                value.type_name()
            )));
        }
        other => {
            return Err(RunError::type_error(format!(
                "object of type '{}' has no len()",
                other.type_name()
            )));
        }
    };
    Ok(Value::Int(len))
}

/// `type()` builtin (exposed via the `type` class constructor).
pub(crate) fn type_of(ev: &Evaluator, value: &Value) -> Value {
    Value::Class(ev.ctx.inner.classes.class_of(value))
}

const _: () = {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Value>();
    assert_send_sync::<ExcType>();
};
