//! `min()` / `max()` with `key=` support.

use crate::{
    eval::Evaluator,
    exceptions::{RunError, RunResult},
    types::list_ops::value_lt,
    value::Value,
};

pub(crate) fn min_max(
    ev: &mut Evaluator,
    pos: Vec<Value>,
    kw: Vec<(String, Value)>,
    want_min: bool,
) -> RunResult<Value> {
    let name = if want_min { "min" } else { "max" };
    let mut key_func = Value::None;
    let mut default = None;
    for (kw_name, value) in kw {
        match kw_name.as_str() {
            "key" => key_func = value,
            "default" => default = Some(value),
            other => {
                return Err(RunError::type_error(format!(
                    "{name}() got an unexpected keyword argument '{other}'"
                )));
            }
        }
    }

    let candidates: Vec<Value> = match pos.len() {
        0 => {
            return Err(RunError::type_error(format!(
                "{name}() expected at least 1 argument, got 0"
            )));
        }
        1 => ev.drain_iterable(&pos[0], 0)?,
        _ => pos,
    };

    if candidates.is_empty() {
        return match default {
            Some(default) => Ok(default),
            None => Err(RunError::value_error(format!("{name}() arg is an empty sequence"))),
        };
    }

    let mut best: Option<(Value, Value)> = None;
    for candidate in candidates {
        let key = match &key_func {
            Value::None => candidate.clone(),
            f => ev.call_value(f, vec![candidate.clone()], Vec::new(), 0)?,
        };
        best = match best {
            None => Some((key, candidate)),
            Some((best_key, best_value)) => {
                let replace = if want_min {
                    value_lt(ev, &key, &best_key)?
                } else {
                    value_lt(ev, &best_key, &key)?
                };
                if replace {
                    Some((key, candidate))
                } else {
                    Some((best_key, best_value))
                }
            }
        };
    }
    Ok(best.map(|(_, v)| v).unwrap_or(Value::None))
}
