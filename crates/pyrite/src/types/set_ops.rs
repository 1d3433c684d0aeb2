//! Set methods.

use crate::{
    eval::Evaluator,
    exceptions::{ExcType, RunError, RunResult},
    value::{Key, MethodFn, SetData, Value, plock},
};

pub(crate) fn method(name: &str) -> Option<MethodFn> {
    Some(match name {
        "add" => s_add,
        "remove" => s_remove,
        "discard" => s_discard,
        "union" => s_union,
        "intersection" => s_intersection,
        "difference" => s_difference,
        "symmetric_difference" => s_symmetric_difference,
        "issubset" => s_issubset,
        "issuperset" => s_issuperset,
        "pop" => s_pop,
        "clear" => s_clear,
        "copy" => s_copy,
        _ => return None,
    })
}

fn recv_set(recv: &Value) -> RunResult<&std::sync::Arc<std::sync::Mutex<SetData>>> {
    match recv {
        Value::Set(s) => Ok(s),
        other => Err(RunError::type_error(format!(
            "set method called on '{}'",
            other.type_name()
        ))),
    }
}

/// Builds key sets out of arbitrary iterables for the algebra methods.
fn other_keys(ev: &mut Evaluator, args: &[Value], method: &str) -> RunResult<SetData> {
    let Some(other) = args.first() else {
        return Err(RunError::type_error(format!("{method}() missing required argument")));
    };
    if let Value::Set(s) = other {
        return Ok(plock(s).clone());
    }
    let mut data = SetData::default();
    for item in ev.drain_iterable(other, 0)? {
        data.insert(Key::new(item)?);
    }
    Ok(data)
}

fn s_add(_ev: &mut Evaluator, recv: &Value, mut args: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    if args.len() != 1 {
        return Err(RunError::type_error(format!(
            "add() takes exactly one argument ({} given)",
            args.len()
        )));
    }
    plock(recv_set(recv)?).insert(Key::new(args.remove(0))?);
    Ok(Value::None)
}

fn s_remove(ev: &mut Evaluator, recv: &Value, mut args: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    if args.len() != 1 {
        return Err(RunError::type_error(format!(
            "remove() takes exactly one argument ({} given)",
            args.len()
        )));
    }
    let value = args.remove(0);
    let key = Key::new(value.clone())?;
    if plock(recv_set(recv)?).shift_remove(&key) {
        Ok(Value::None)
    } else {
        let rendered = ev.repr_value(&value)?;
        Err(RunError::raise(ExcType::KeyError, rendered))
    }
}

fn s_discard(_ev: &mut Evaluator, recv: &Value, mut args: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    if args.len() != 1 {
        return Err(RunError::type_error(format!(
            "discard() takes exactly one argument ({} given)",
            args.len()
        )));
    }
    let key = Key::new(args.remove(0))?;
    plock(recv_set(recv)?).shift_remove(&key);
    Ok(Value::None)
}

fn s_union(ev: &mut Evaluator, recv: &Value, args: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    let mine = plock(recv_set(recv)?).clone();
    let theirs = other_keys(ev, &args, "union")?;
    Ok(Value::set(mine.union(&theirs).cloned().collect()))
}

fn s_intersection(ev: &mut Evaluator, recv: &Value, args: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    let mine = plock(recv_set(recv)?).clone();
    let theirs = other_keys(ev, &args, "intersection")?;
    Ok(Value::set(mine.intersection(&theirs).cloned().collect()))
}

fn s_difference(ev: &mut Evaluator, recv: &Value, args: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    let mine = plock(recv_set(recv)?).clone();
    let theirs = other_keys(ev, &args, "difference")?;
    Ok(Value::set(mine.difference(&theirs).cloned().collect()))
}

fn s_symmetric_difference(
    ev: &mut Evaluator,
    recv: &Value,
    args: Vec<Value>,
    _kw: Vec<(String, Value)>,
) -> RunResult<Value> {
    let mine = plock(recv_set(recv)?).clone();
    let theirs = other_keys(ev, &args, "symmetric_difference")?;
    Ok(Value::set(mine.symmetric_difference(&theirs).cloned().collect()))
}

fn s_issubset(ev: &mut Evaluator, recv: &Value, args: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    let mine = plock(recv_set(recv)?).clone();
    let theirs = other_keys(ev, &args, "issubset")?;
    Ok(Value::Bool(mine.iter().all(|k| theirs.contains(k))))
}

fn s_issuperset(ev: &mut Evaluator, recv: &Value, args: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    let mine = plock(recv_set(recv)?).clone();
    let theirs = other_keys(ev, &args, "issuperset")?;
    Ok(Value::Bool(theirs.iter().all(|k| mine.contains(k))))
}

fn s_pop(_ev: &mut Evaluator, recv: &Value, _a: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    let set = recv_set(recv)?;
    let mut data = plock(set);
    match data.shift_remove_index(0) {
        Some(key) => Ok(key.value),
        None => Err(RunError::raise(ExcType::KeyError, "pop from an empty set")),
    }
}

fn s_clear(_ev: &mut Evaluator, recv: &Value, _a: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    plock(recv_set(recv)?).clear();
    Ok(Value::None)
}

fn s_copy(_ev: &mut Evaluator, recv: &Value, _a: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    Ok(Value::set(plock(recv_set(recv)?).clone()))
}
