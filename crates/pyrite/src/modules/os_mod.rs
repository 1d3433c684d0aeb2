//! The `os` module: environment variables only (the filesystem is reached
//! through `open()`).

use crate::{
    eval::Evaluator,
    exceptions::RunResult,
    modules::native,
    value::{AttrTable, DictData, Key, Value},
};

pub(crate) fn namespace(ev: &mut Evaluator) -> AttrTable {
    let mut table = AttrTable::default();
    let mut environ = DictData::default();
    for (name, value) in &ev.ctx.inner.environ {
        if let Ok(key) = Key::new(Value::str(name.clone())) {
            environ.insert(key, Value::str(value.clone()));
        }
    }
    table.insert("environ".into(), Value::dict(environ));
    let (name, value) = native("getenv", os_getenv);
    table.insert(name, value);
    table
}

fn os_getenv(ev: &mut Evaluator, args: Vec<Value>) -> RunResult<Value> {
    let Some(Value::Str(name)) = args.first() else {
        return Err(crate::exceptions::RunError::type_error(
            "getenv() argument must be str",
        ));
    };
    match ev.ctx.inner.environ.get(&**name) {
        Some(value) => Ok(Value::str(value.clone())),
        None => Ok(args.get(1).cloned().unwrap_or(Value::None)),
    }
}
