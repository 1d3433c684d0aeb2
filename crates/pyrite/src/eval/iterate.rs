//! The iteration protocol: obtaining iterators and stepping them.

use std::sync::{Arc, Mutex};

use crate::{
    eval::Evaluator,
    exceptions::{ExcType, RunError, RunResult},
    types::iter::IterState,
    value::{Value, plock},
};

impl Evaluator {
    /// Obtains an iterator for `for x in value` / `iter(value)`.
    pub(crate) fn get_iter(&mut self, value: &Value, line: u32) -> RunResult<Value> {
        match value {
            Value::Generator(_) | Value::Iterator(_) => Ok(value.clone()),
            Value::List(list) => Ok(IterState::List {
                list: list.clone(),
                idx: 0,
            }
            .into_value()),
            Value::Tuple(items) => Ok(IterState::Tuple {
                items: items.clone(),
                idx: 0,
            }
            .into_value()),
            Value::Str(s) => Ok(IterState::Str { s: s.clone(), pos: 0 }.into_value()),
            Value::Range(range) => Ok(IterState::Range {
                range: range.clone(),
                idx: 0,
            }
            .into_value()),
            Value::Dict(d) => {
                let keys: Vec<Value> = plock(d).keys().map(|k| k.value.clone()).collect();
                Ok(IterState::Items { items: keys, idx: 0 }.into_value())
            }
            Value::Set(s) => {
                let items: Vec<Value> = plock(s).iter().map(|k| k.value.clone()).collect();
                Ok(IterState::Items { items, idx: 0 }.into_value())
            }
            Value::File(file) => {
                // iteration by line; materialised from the remaining contents
                let lines: Vec<Value> = {
                    let handle = plock(file);
                    if handle.closed {
                        return Err(RunError::value_error("I/O operation on closed file"));
                    }
                    handle.contents[handle.cursor..]
                        .split_inclusive('\n')
                        .map(Value::str)
                        .collect()
                };
                Ok(IterState::Items { items: lines, idx: 0 }.into_value())
            }
            Value::Instance(inst) => {
                if inst.class.lookup("__iter__").is_some() {
                    let result = self.call_method(value, "__iter__", vec![], line)?;
                    return match result {
                        Value::Generator(_) | Value::Iterator(_) => Ok(result),
                        Value::Instance(_) => Ok(IterState::Object { obj: result }.into_value()),
                        other => Err(RunError::type_error(format!(
                            "__iter__ returned non-iterator of type '{}'",
                            other.type_name()
                        ))),
                    };
                }
                if inst.class.lookup("__next__").is_some() {
                    return Ok(IterState::Object { obj: value.clone() }.into_value());
                }
                Err(RunError::type_error(format!(
                    "'{}' object is not iterable",
                    value.type_name()
                )))
            }
            other => Err(RunError::type_error(format!(
                "'{}' object is not iterable",
                other.type_name()
            ))),
        }
    }

    /// Steps an iterator; `Ok(None)` signals exhaustion.
    pub(crate) fn iter_next(&mut self, iterator: &Value, line: u32) -> RunResult<Option<Value>> {
        match iterator {
            Value::Generator(generator) => generator.next(),
            Value::Iterator(state) => self.step_state(state, line),
            Value::Instance(_) => self.step_object(iterator, line),
            other => Err(RunError::type_error(format!(
                "'{}' object is not an iterator",
                other.type_name()
            ))),
        }
    }

    fn step_object(&mut self, obj: &Value, line: u32) -> RunResult<Option<Value>> {
        let Value::Instance(inst) = obj else {
            return Err(RunError::type_error(format!(
                "'{}' object is not an iterator",
                obj.type_name()
            )));
        };
        if inst.class.lookup("__next__").is_none() {
            return Err(RunError::type_error(format!(
                "'{}' object is not an iterator",
                obj.type_name()
            )));
        }
        match self.call_method(obj, "__next__", vec![], line) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_stop_iteration() => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn step_state(&mut self, state: &Arc<Mutex<IterState>>, line: u32) -> RunResult<Option<Value>> {
        // decide the step while holding the lock only for cursor updates;
        // callbacks into user code run unlocked
        enum Pending {
            Done(Option<Value>),
            Map { func: Value, args: Vec<Value> },
            Filter { func: Value, inner: Value },
            Zip { inners: Vec<Value> },
            Enumerate { inner: Value, count: i64 },
            Object { obj: Value },
        }

        let pending = {
            let mut guard = plock(state);
            match &mut *guard {
                IterState::List { list, idx } => {
                    let items = plock(list);
                    if *idx < items.len() {
                        let value = items[*idx].clone();
                        *idx += 1;
                        Pending::Done(Some(value))
                    } else {
                        Pending::Done(None)
                    }
                }
                IterState::Tuple { items, idx } => {
                    if *idx < items.len() {
                        let value = items[*idx].clone();
                        *idx += 1;
                        Pending::Done(Some(value))
                    } else {
                        Pending::Done(None)
                    }
                }
                IterState::Str { s, pos } => match s[*pos..].chars().next() {
                    Some(c) => {
                        *pos += c.len_utf8();
                        Pending::Done(Some(Value::str(c.to_string())))
                    }
                    None => Pending::Done(None),
                },
                IterState::Range { range, idx } => {
                    if *idx < range.len() {
                        let value = range.get(*idx);
                        *idx += 1;
                        Pending::Done(Some(Value::Int(value)))
                    } else {
                        Pending::Done(None)
                    }
                }
                IterState::Items { items, idx } => {
                    if *idx < items.len() {
                        let value = items[*idx].clone();
                        *idx += 1;
                        Pending::Done(Some(value))
                    } else {
                        Pending::Done(None)
                    }
                }
                IterState::Object { obj } => Pending::Object { obj: obj.clone() },
                IterState::Map { func, inners } => Pending::Map {
                    func: func.clone(),
                    args: inners.clone(),
                },
                IterState::Filter { func, inner } => Pending::Filter {
                    func: func.clone(),
                    inner: inner.clone(),
                },
                IterState::Zip { inners } => Pending::Zip { inners: inners.clone() },
                IterState::Enumerate { inner, count } => {
                    let current = *count;
                    *count += 1;
                    Pending::Enumerate {
                        inner: inner.clone(),
                        count: current,
                    }
                }
            }
        };

        match pending {
            Pending::Done(result) => Ok(result),
            Pending::Object { obj } => self.step_object(&obj, line),
            Pending::Map { func, args } => {
                let mut call_args = Vec::with_capacity(args.len());
                for inner in &args {
                    match self.iter_next(inner, line)? {
                        Some(v) => call_args.push(v),
                        None => return Ok(None),
                    }
                }
                Ok(Some(self.call_value(&func, call_args, Vec::new(), line)?))
            }
            Pending::Filter { func, inner } => loop {
                let Some(candidate) = self.iter_next(&inner, line)? else {
                    return Ok(None);
                };
                let keep = match &func {
                    Value::None => self.value_truthy(&candidate)?,
                    f => {
                        let result = self.call_value(f, vec![candidate.clone()], Vec::new(), line)?;
                        self.value_truthy(&result)?
                    }
                };
                if keep {
                    return Ok(Some(candidate));
                }
            },
            Pending::Zip { inners } => {
                let mut items = Vec::with_capacity(inners.len());
                for inner in &inners {
                    match self.iter_next(inner, line)? {
                        Some(v) => items.push(v),
                        None => return Ok(None),
                    }
                }
                Ok(Some(Value::tuple(items)))
            }
            Pending::Enumerate { inner, count } => match self.iter_next(&inner, line)? {
                Some(v) => Ok(Some(Value::tuple(vec![Value::Int(count), v]))),
                None => Ok(None),
            },
        }
    }

    /// Fully drains an iterable into a vector (used by `list()`, `sorted()`,
    /// argument splats, ...).
    pub(crate) fn drain_iterable(&mut self, value: &Value, line: u32) -> RunResult<Vec<Value>> {
        match value {
            Value::List(items) => Ok(plock(items).clone()),
            Value::Tuple(items) => Ok(items.to_vec()),
            _ => {
                let iterator = self.get_iter(value, line)?;
                let mut out = Vec::new();
                loop {
                    self.ctx.check_time()?;
                    let Some(item) = self.iter_next(&iterator, line)? else {
                        break;
                    };
                    out.push(item);
                }
                Ok(out)
            }
        }
    }

    /// Raises the `TypeError` required when `next()` is applied to a
    /// generator *function* instead of a generator.
    pub(crate) fn next_misuse_error(value: &Value) -> Option<RunError> {
        if let Value::Function(func) = value {
            if func.is_generator {
                return Some(RunError::raise(
                    ExcType::TypeError,
                    format!(
                        "'{}' is a generator function, not an iterator; call it and wrap the result in iter() if needed",
                        func.name
                    ),
                ));
            }
        }
        None
    }
}
