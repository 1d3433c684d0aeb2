//! Subscripting and slicing.

use crate::{
    eval::Evaluator,
    exceptions::{ExcType, RunError, RunResult},
    value::{Key, RangeValue, Value, plock},
};

impl Evaluator {
    pub(crate) fn get_item(&mut self, container: &Value, index: &Value, line: u32) -> RunResult<Value> {
        match container {
            Value::List(items) => {
                let items = plock(items);
                let i = normalize_index(index, items.len(), "list")?;
                Ok(items[i].clone())
            }
            Value::Tuple(items) => {
                let i = normalize_index(index, items.len(), "tuple")?;
                Ok(items[i].clone())
            }
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let i = normalize_index(index, chars.len(), "string")?;
                Ok(Value::str(chars[i].to_string()))
            }
            Value::Range(range) => {
                let len = range.len();
                let Some(raw) = index.as_index() else {
                    return Err(RunError::type_error(format!(
                        "range indices must be integers, not {}",
                        index.type_name()
                    )));
                };
                let i = if raw < 0 { raw + len } else { raw };
                if i < 0 || i >= len {
                    return Err(RunError::raise(ExcType::IndexError, "range object index out of range"));
                }
                Ok(Value::Int(range.get(i)))
            }
            Value::Dict(d) => {
                let key = Key::new(index.clone())?;
                match plock(d).get(&key) {
                    Some(value) => Ok(value.clone()),
                    None => {
                        let rendered = self.repr_value(index)?;
                        Err(RunError::raise(ExcType::KeyError, rendered))
                    }
                }
            }
            Value::Instance(_) => {
                if let Some(result) = self.try_dunder(container, "__getitem__", vec![index.clone()])? {
                    return Ok(result);
                }
                Err(RunError::type_error(format!(
                    "'{}' object is not subscriptable",
                    container.type_name()
                ))
                .into_with_line(line))
            }
            other => Err(RunError::type_error(format!(
                "'{}' object is not subscriptable",
                other.type_name()
            ))),
        }
    }

    pub(crate) fn set_item(&mut self, container: &Value, index: &Value, value: Value, line: u32) -> RunResult<()> {
        match container {
            Value::List(items) => {
                let mut items = plock(items);
                let i = normalize_index(index, items.len(), "list")?;
                items[i] = value;
                Ok(())
            }
            Value::Dict(d) => {
                let key = Key::new(index.clone())?;
                plock(d).insert(key, value);
                Ok(())
            }
            Value::Instance(_) => {
                if let Some(_result) =
                    self.try_dunder(container, "__setitem__", vec![index.clone(), value])?
                {
                    return Ok(());
                }
                Err(RunError::type_error(format!(
                    "'{}' object does not support item assignment",
                    container.type_name()
                ))
                .into_with_line(line))
            }
            other => Err(RunError::type_error(format!(
                "'{}' object does not support item assignment",
                other.type_name()
            ))),
        }
    }

    pub(crate) fn del_item(&mut self, container: &Value, index: &Value, line: u32) -> RunResult<()> {
        match container {
            Value::List(items) => {
                let mut items = plock(items);
                let i = normalize_index(index, items.len(), "list")?;
                items.remove(i);
                Ok(())
            }
            Value::Dict(d) => {
                let key = Key::new(index.clone())?;
                if plock(d).shift_remove(&key).is_some() {
                    Ok(())
                } else {
                    let rendered = self.repr_value(index)?;
                    Err(RunError::raise(ExcType::KeyError, rendered))
                }
            }
            Value::Instance(_) => {
                if let Some(_result) = self.try_dunder(container, "__delitem__", vec![index.clone()])? {
                    return Ok(());
                }
                Err(RunError::type_error(format!(
                    "'{}' object does not support item deletion",
                    container.type_name()
                ))
                .into_with_line(line))
            }
            other => Err(RunError::type_error(format!(
                "'{}' object does not support item deletion",
                other.type_name()
            ))),
        }
    }

    /// `container[lower:upper:step]` on sequences; ranges slice to ranges.
    pub(crate) fn get_slice(
        &mut self,
        container: &Value,
        lower: &Value,
        upper: &Value,
        step: &Value,
        line: u32,
    ) -> RunResult<Value> {
        let step_i = match step {
            Value::None => 1,
            other => other.as_index().ok_or_else(|| {
                RunError::type_error(format!("slice step must be an integer, not {}", other.type_name()))
            })?,
        };
        if step_i == 0 {
            return Err(RunError::value_error("slice step cannot be zero"));
        }
        let bound = |v: &Value| -> RunResult<Option<i64>> {
            match v {
                Value::None => Ok(None),
                other => other
                    .as_index()
                    .map(Some)
                    .ok_or_else(|| RunError::type_error(format!(
                        "slice indices must be integers or None, not {}",
                        other.type_name()
                    ))),
            }
        };
        let lower_i = bound(lower)?;
        let upper_i = bound(upper)?;

        match container {
            Value::List(items) => {
                let items = plock(items).clone();
                Ok(Value::list(slice_vec(&items, lower_i, upper_i, step_i)))
            }
            Value::Tuple(items) => Ok(Value::tuple(slice_vec(items, lower_i, upper_i, step_i))),
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let sliced = slice_vec(&chars, lower_i, upper_i, step_i);
                Ok(Value::str(sliced.into_iter().collect::<String>()))
            }
            Value::Range(range) => {
                let len = range.len();
                let indices = slice_indices(len, lower_i, upper_i, step_i);
                let (start_idx, stop_idx, step_idx) = indices;
                Ok(Value::Range(std::sync::Arc::new(RangeValue {
                    start: range.start + start_idx * range.step,
                    stop: range.start + stop_idx * range.step,
                    step: range.step * step_idx,
                })))
            }
            other => Err(RunError::type_error(format!(
                "'{}' object is not subscriptable",
                other.type_name()
            ))
            .into_with_line(line)),
        }
    }
}

/// Normalises an integer index against a length, raising the canonical
/// `IndexError`/`TypeError`.
fn normalize_index(index: &Value, len: usize, what: &str) -> RunResult<usize> {
    let Some(raw) = index.as_index() else {
        return Err(RunError::type_error(format!(
            "{what} indices must be integers, not {}",
            index.type_name()
        )));
    };
    let len_i = len as i64;
    let adjusted = if raw < 0 { raw + len_i } else { raw };
    if adjusted < 0 || adjusted >= len_i {
        return Err(RunError::raise(
            ExcType::IndexError,
            format!("{what} index out of range"),
        ));
    }
    Ok(adjusted as usize)
}

/// Computes (start, stop, step) clamped to a sequence of length `len`.
fn slice_indices(len: i64, lower: Option<i64>, upper: Option<i64>, step: i64) -> (i64, i64, i64) {
    let adjust = |v: i64| if v < 0 { v + len } else { v };
    if step > 0 {
        let start = lower.map_or(0, adjust).clamp(0, len);
        let stop = upper.map_or(len, adjust).clamp(0, len);
        (start, stop, step)
    } else {
        let start = lower.map_or(len - 1, adjust).clamp(-1, len - 1);
        let stop = upper.map_or(-1, |v| adjust(v).max(-1)).clamp(-1, len - 1);
        (start, stop, step)
    }
}

fn slice_vec<T: Clone>(items: &[T], lower: Option<i64>, upper: Option<i64>, step: i64) -> Vec<T> {
    let len = items.len() as i64;
    let (start, stop, step) = slice_indices(len, lower, upper, step);
    let mut out = Vec::new();
    if step > 0 {
        let mut i = start;
        while i < stop {
            out.push(items[i as usize].clone());
            i += step;
        }
    } else {
        let mut i = start;
        while i > stop {
            if i >= 0 && i < len {
                out.push(items[i as usize].clone());
            }
            i += step;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_basics() {
        let items = vec![0, 1, 2, 3, 4];
        assert_eq!(slice_vec(&items, Some(1), Some(3), 1), vec![1, 2]);
        assert_eq!(slice_vec(&items, None, None, -1), vec![4, 3, 2, 1, 0]);
        assert_eq!(slice_vec(&items, None, None, 2), vec![0, 2, 4]);
        assert_eq!(slice_vec(&items, Some(-2), None, 1), vec![3, 4]);
        assert_eq!(slice_vec(&items, Some(10), None, 1), Vec::<i32>::new());
    }
}
