//! Iterator cursor states.
//!
//! An `Iterator` value wraps one of these cursors. Stepping happens through
//! the evaluator (`Evaluator::iter_next`) because several variants call back
//! into user code (`map` functions, `__next__` methods, generators).

use std::sync::Arc;

use crate::value::{RangeValue, Value};

/// The state of a builtin iterator.
#[derive(Debug)]
pub(crate) enum IterState {
    /// Live cursor over a list; mutations during iteration are visible.
    List {
        list: Arc<std::sync::Mutex<Vec<Value>>>,
        idx: usize,
    },
    Tuple {
        items: Arc<[Value]>,
        idx: usize,
    },
    /// Cursor over string code points; `pos` is a byte offset.
    Str {
        s: Arc<str>,
        pos: usize,
    },
    Range {
        range: Arc<RangeValue>,
        idx: i64,
    },
    /// Snapshot cursor (dict keys, dict items, set elements, reversed
    /// sequences, sorted output).
    Items {
        items: Vec<Value>,
        idx: usize,
    },
    /// A user object driven via its `__next__` method.
    Object {
        obj: Value,
    },
    /// Lazy `map(func, *iterables)`.
    Map {
        func: Value,
        inners: Vec<Value>,
    },
    /// Lazy `filter(func, iterable)`; `func` of `None` filters by truthiness.
    Filter {
        func: Value,
        inner: Value,
    },
    /// Lazy `zip(*iterables)`; stops at the shortest.
    Zip {
        inners: Vec<Value>,
    },
    /// Lazy `enumerate(iterable, start)`.
    Enumerate {
        inner: Value,
        count: i64,
    },
}

impl IterState {
    pub(crate) fn into_value(self) -> Value {
        Value::Iterator(Arc::new(std::sync::Mutex::new(self)))
    }
}
