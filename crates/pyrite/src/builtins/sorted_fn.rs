//! `sorted()` with `key=`/`reverse=` support.

use crate::{
    eval::Evaluator,
    exceptions::{RunError, RunResult},
    types::list_ops::sort_values,
    value::Value,
};

pub(crate) fn sorted(ev: &mut Evaluator, pos: Vec<Value>, kw: Vec<(String, Value)>, line: u32) -> RunResult<Value> {
    let Some(iterable) = pos.first() else {
        return Err(RunError::type_error("sorted() expected 1 argument, got 0"));
    };
    let mut key_func = Value::None;
    let mut reverse = false;
    for (name, value) in kw {
        match name.as_str() {
            "key" => key_func = value,
            "reverse" => reverse = ev.value_truthy(&value)?,
            other => {
                return Err(RunError::type_error(format!(
                    "sorted() got an unexpected keyword argument '{other}'"
                )));
            }
        }
    }
    let items = ev.drain_iterable(iterable, line)?;
    Ok(Value::list(sort_values(ev, items, &key_func, reverse)?))
}
