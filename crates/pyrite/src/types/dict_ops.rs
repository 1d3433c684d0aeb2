//! Dict methods.

use crate::{
    eval::Evaluator,
    exceptions::{ExcType, RunError, RunResult},
    value::{Key, MethodFn, Value, plock},
};

pub(crate) fn method(name: &str) -> Option<MethodFn> {
    Some(match name {
        "get" => d_get,
        "keys" => d_keys,
        "values" => d_values,
        "items" => d_items,
        "pop" => d_pop,
        "setdefault" => d_setdefault,
        "update" => d_update,
        "clear" => d_clear,
        "copy" => d_copy,
        _ => return None,
    })
}

fn recv_dict(recv: &Value) -> RunResult<&std::sync::Arc<std::sync::Mutex<crate::value::DictData>>> {
    match recv {
        Value::Dict(d) => Ok(d),
        other => Err(RunError::type_error(format!(
            "dict method called on '{}'",
            other.type_name()
        ))),
    }
}

fn d_get(_ev: &mut Evaluator, recv: &Value, mut args: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    if args.is_empty() || args.len() > 2 {
        return Err(RunError::type_error(format!(
            "get() takes 1 or 2 arguments ({} given)",
            args.len()
        )));
    }
    let default = if args.len() == 2 { args.remove(1) } else { Value::None };
    let key = Key::new(args.remove(0))?;
    Ok(plock(recv_dict(recv)?).get(&key).cloned().unwrap_or(default))
}

fn d_keys(_ev: &mut Evaluator, recv: &Value, _a: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    let keys: Vec<Value> = plock(recv_dict(recv)?).keys().map(|k| k.value.clone()).collect();
    Ok(Value::list(keys))
}

fn d_values(_ev: &mut Evaluator, recv: &Value, _a: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    let values: Vec<Value> = plock(recv_dict(recv)?).values().cloned().collect();
    Ok(Value::list(values))
}

fn d_items(_ev: &mut Evaluator, recv: &Value, _a: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    let items: Vec<Value> = plock(recv_dict(recv)?)
        .iter()
        .map(|(k, v)| Value::tuple(vec![k.value.clone(), v.clone()]))
        .collect();
    Ok(Value::list(items))
}

fn d_pop(ev: &mut Evaluator, recv: &Value, mut args: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    if args.is_empty() || args.len() > 2 {
        return Err(RunError::type_error(format!(
            "pop() takes 1 or 2 arguments ({} given)",
            args.len()
        )));
    }
    let default = if args.len() == 2 { Some(args.remove(1)) } else { None };
    let key_value = args.remove(0);
    let key = Key::new(key_value.clone())?;
    match plock(recv_dict(recv)?).shift_remove(&key) {
        Some(value) => Ok(value),
        None => match default {
            Some(default) => Ok(default),
            None => {
                let rendered = ev.repr_value(&key_value)?;
                Err(RunError::raise(ExcType::KeyError, rendered))
            }
        },
    }
}

fn d_setdefault(_ev: &mut Evaluator, recv: &Value, mut args: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    if args.is_empty() || args.len() > 2 {
        return Err(RunError::type_error(format!(
            "setdefault() takes 1 or 2 arguments ({} given)",
            args.len()
        )));
    }
    let default = if args.len() == 2 { args.remove(1) } else { Value::None };
    let key = Key::new(args.remove(0))?;
    let mut data = plock(recv_dict(recv)?);
    if let Some(existing) = data.get(&key) {
        return Ok(existing.clone());
    }
    data.insert(key, default.clone());
    Ok(default)
}

fn d_update(ev: &mut Evaluator, recv: &Value, args: Vec<Value>, kw: Vec<(String, Value)>) -> RunResult<Value> {
    let dict = recv_dict(recv)?.clone();
    if let Some(source) = args.first() {
        match source {
            Value::Dict(other) => {
                let entries = plock(other).clone();
                plock(&dict).extend(entries);
            }
            other => {
                // an iterable of (key, value) pairs
                let pairs = ev.drain_iterable(other, 0)?;
                for pair in pairs {
                    let items = match &pair {
                        Value::Tuple(items) if items.len() == 2 => items.to_vec(),
                        Value::List(items) if plock(items).len() == 2 => plock(items).clone(),
                        _ => {
                            return Err(RunError::value_error(
                                "dictionary update sequence elements must be pairs",
                            ));
                        }
                    };
                    let key = Key::new(items[0].clone())?;
                    plock(&dict).insert(key, items[1].clone());
                }
            }
        }
    }
    for (name, value) in kw {
        plock(&dict).insert(Key::new(Value::str(name))?, value);
    }
    Ok(Value::None)
}

fn d_clear(_ev: &mut Evaluator, recv: &Value, _a: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    plock(recv_dict(recv)?).clear();
    Ok(Value::None)
}

fn d_copy(_ev: &mut Evaluator, recv: &Value, _a: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    Ok(Value::dict(plock(recv_dict(recv)?).clone()))
}
