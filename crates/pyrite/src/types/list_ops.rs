//! List (and tuple) methods.

use std::cmp::Ordering;

use crate::{
    eval::Evaluator,
    exceptions::{RunError, RunResult},
    value::{MethodFn, Value, plock, py_cmp, py_eq},
};

pub(crate) fn method(name: &str) -> Option<MethodFn> {
    Some(match name {
        "append" => l_append,
        "extend" => l_extend,
        "insert" => l_insert,
        "pop" => l_pop,
        "remove" => l_remove,
        "clear" => l_clear,
        "index" => l_index,
        "count" => l_count,
        "sort" => l_sort,
        "reverse" => l_reverse,
        "copy" => l_copy,
        _ => return None,
    })
}

pub(crate) fn tuple_method(name: &str) -> Option<MethodFn> {
    Some(match name {
        "index" => l_index,
        "count" => l_count,
        _ => return None,
    })
}

fn recv_list(recv: &Value) -> RunResult<&std::sync::Arc<std::sync::Mutex<Vec<Value>>>> {
    match recv {
        Value::List(list) => Ok(list),
        other => Err(RunError::type_error(format!(
            "list method called on '{}'",
            other.type_name()
        ))),
    }
}

fn elements(recv: &Value) -> RunResult<Vec<Value>> {
    match recv {
        Value::List(list) => Ok(plock(list).clone()),
        Value::Tuple(items) => Ok(items.to_vec()),
        other => Err(RunError::type_error(format!(
            "sequence method called on '{}'",
            other.type_name()
        ))),
    }
}

fn l_append(_ev: &mut Evaluator, recv: &Value, mut args: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    if args.len() != 1 {
        return Err(RunError::type_error(format!(
            "append() takes exactly one argument ({} given)",
            args.len()
        )));
    }
    plock(recv_list(recv)?).push(args.remove(0));
    Ok(Value::None)
}

fn l_extend(ev: &mut Evaluator, recv: &Value, args: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    let Some(iterable) = args.first() else {
        return Err(RunError::type_error("extend() missing required argument"));
    };
    let items = ev.drain_iterable(iterable, 0)?;
    plock(recv_list(recv)?).extend(items);
    Ok(Value::None)
}

fn l_insert(_ev: &mut Evaluator, recv: &Value, mut args: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    if args.len() != 2 {
        return Err(RunError::type_error(format!(
            "insert() takes exactly 2 arguments ({} given)",
            args.len()
        )));
    }
    let value = args.remove(1);
    let Some(raw) = args[0].as_index() else {
        return Err(RunError::type_error("insert() index must be an integer"));
    };
    let list = recv_list(recv)?;
    let mut items = plock(list);
    let len = items.len() as i64;
    let index = if raw < 0 { (raw + len).max(0) } else { raw.min(len) } as usize;
    items.insert(index, value);
    Ok(Value::None)
}

fn l_pop(_ev: &mut Evaluator, recv: &Value, args: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    let list = recv_list(recv)?;
    let mut items = plock(list);
    if items.is_empty() {
        return Err(RunError::raise(
            crate::exceptions::ExcType::IndexError,
            "pop from empty list",
        ));
    }
    let len = items.len() as i64;
    let raw = args.first().and_then(Value::as_index).unwrap_or(-1);
    let index = if raw < 0 { raw + len } else { raw };
    if index < 0 || index >= len {
        return Err(RunError::raise(
            crate::exceptions::ExcType::IndexError,
            "pop index out of range",
        ));
    }
    Ok(items.remove(index as usize))
}

fn l_remove(ev: &mut Evaluator, recv: &Value, args: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    let Some(target) = args.first() else {
        return Err(RunError::type_error("remove() missing required argument"));
    };
    let list = recv_list(recv)?;
    let snapshot = plock(list).clone();
    for (i, item) in snapshot.iter().enumerate() {
        if ev.values_equal(item, target)? {
            plock(list).remove(i);
            return Ok(Value::None);
        }
    }
    Err(RunError::value_error("list.remove(x): x not in list"))
}

fn l_clear(_ev: &mut Evaluator, recv: &Value, _a: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    plock(recv_list(recv)?).clear();
    Ok(Value::None)
}

fn l_index(ev: &mut Evaluator, recv: &Value, args: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    let Some(target) = args.first() else {
        return Err(RunError::type_error("index() missing required argument"));
    };
    for (i, item) in elements(recv)?.iter().enumerate() {
        if ev.values_equal(item, target)? {
            return Ok(Value::Int(i as i64));
        }
    }
    let rendered = ev.repr_value(target)?;
    Err(RunError::value_error(format!("{rendered} is not in list")))
}

fn l_count(_ev: &mut Evaluator, recv: &Value, args: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    let Some(target) = args.first() else {
        return Err(RunError::type_error("count() missing required argument"));
    };
    let count = elements(recv)?.iter().filter(|item| py_eq(item, target)).count();
    Ok(Value::Int(count as i64))
}

fn l_sort(ev: &mut Evaluator, recv: &Value, _args: Vec<Value>, kw: Vec<(String, Value)>) -> RunResult<Value> {
    let mut key_func = Value::None;
    let mut reverse = false;
    for (name, value) in kw {
        match name.as_str() {
            "key" => key_func = value,
            "reverse" => reverse = ev.value_truthy(&value)?,
            other => {
                return Err(RunError::type_error(format!(
                    "sort() got an unexpected keyword argument '{other}'"
                )));
            }
        }
    }
    let list = recv_list(recv)?.clone();
    let items = plock(&list).clone();
    let mut sorted = sort_values(ev, items, &key_func, reverse)?;
    std::mem::swap(&mut *plock(&list), &mut sorted);
    Ok(Value::None)
}

fn l_reverse(_ev: &mut Evaluator, recv: &Value, _a: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    plock(recv_list(recv)?).reverse();
    Ok(Value::None)
}

fn l_copy(_ev: &mut Evaluator, recv: &Value, _a: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    Ok(Value::list(plock(recv_list(recv)?).clone()))
}

/// Stable merge sort with an evaluator-aware comparison (needed for `key=`
/// functions and `__lt__` dunders). Shared with `sorted()`/`min`/`max`.
pub(crate) fn sort_values(
    ev: &mut Evaluator,
    items: Vec<Value>,
    key_func: &Value,
    reverse: bool,
) -> RunResult<Vec<Value>> {
    // decorate with keys so the key function runs once per element
    let mut decorated: Vec<(Value, Value)> = Vec::with_capacity(items.len());
    for item in items {
        let key = match key_func {
            Value::None => item.clone(),
            f => ev.call_value(f, vec![item.clone()], Vec::new(), 0)?,
        };
        decorated.push((key, item));
    }
    let mut sorted = merge_sort(ev, decorated)?;
    if reverse {
        sorted.reverse();
    }
    Ok(sorted.into_iter().map(|(_, v)| v).collect())
}

fn merge_sort(ev: &mut Evaluator, items: Vec<(Value, Value)>) -> RunResult<Vec<(Value, Value)>> {
    if items.len() <= 1 {
        return Ok(items);
    }
    let mid = items.len() / 2;
    let mut items = items;
    let right = items.split_off(mid);
    let left = merge_sort(ev, items)?;
    let right = merge_sort(ev, right)?;

    let mut out = Vec::with_capacity(left.len() + right.len());
    let mut li = left.into_iter().peekable();
    let mut ri = right.into_iter().peekable();
    loop {
        match (li.peek(), ri.peek()) {
            (Some(l), Some(r)) => {
                // stability: take from the left unless right is strictly less
                if value_lt(ev, &r.0, &l.0)? {
                    out.push(ri.next().unwrap_or_else(|| unreachable!()));
                } else {
                    out.push(li.next().unwrap_or_else(|| unreachable!()));
                }
            }
            (Some(_), None) => out.push(li.next().unwrap_or_else(|| unreachable!())),
            (None, Some(_)) => out.push(ri.next().unwrap_or_else(|| unreachable!())),
            (None, None) => break,
        }
    }
    Ok(out)
}

/// `a < b` with dunder support; the canonical sort comparison.
pub(crate) fn value_lt(ev: &mut Evaluator, a: &Value, b: &Value) -> RunResult<bool> {
    if let Value::Instance(_) = a {
        if let Some(result) = ev.try_dunder(a, "__lt__", vec![b.clone()])? {
            return ev.value_truthy(&result);
        }
    }
    match py_cmp(a, b)? {
        Some(Ordering::Less) => Ok(true),
        Some(_) => Ok(false),
        None => Err(RunError::type_error(format!(
            "'<' not supported between instances of '{}' and '{}'",
            a.type_name(),
            b.type_name()
        ))),
    }
}
