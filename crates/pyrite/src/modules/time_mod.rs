//! The `time` module.
//!
//! Clock samples are recorded in the event log so resumed runs replay the
//! original values. `sleep()` is a sandbox no-op: real sleeping would burn
//! the caller's wall-clock budget on nothing.

use crate::{
    eval::Evaluator,
    exceptions::{RunError, RunResult},
    modules::native,
    value::{AttrTable, Value},
};

pub(crate) fn namespace() -> AttrTable {
    let mut table = AttrTable::default();
    for (name, value) in [
        native("time", t_time),
        native("monotonic", t_time),
        native("perf_counter", t_time),
        native("sleep", t_sleep),
    ] {
        table.insert(name, value);
    }
    table
}

fn t_time(ev: &mut Evaluator, _args: Vec<Value>) -> RunResult<Value> {
    Ok(Value::Float(ev.ctx.time_now()?))
}

fn t_sleep(_ev: &mut Evaluator, args: Vec<Value>) -> RunResult<Value> {
    match args.first() {
        Some(Value::Int(_) | Value::Float(_) | Value::Bool(_)) | None => Ok(Value::None),
        Some(other) => Err(RunError::type_error(format!(
            "sleep() argument must be a number, not {}",
            other.type_name()
        ))),
    }
}
