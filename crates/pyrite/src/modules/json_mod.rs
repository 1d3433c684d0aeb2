//! The `json` module, backed by serde_json (insertion order preserved).

use num_traits::ToPrimitive;
use serde_json::Value as Json;

use crate::{
    eval::Evaluator,
    exceptions::{RunError, RunResult},
    modules::{native, native_kw},
    value::{AttrTable, DictData, Key, Value, plock},
};

pub(crate) fn namespace() -> AttrTable {
    let mut table = AttrTable::default();
    for (name, value) in [native_kw("dumps", j_dumps), native("loads", j_loads)] {
        table.insert(name, value);
    }
    table
}

/// Converts a runtime value to a JSON tree, rejecting non-data values.
pub(crate) fn to_json(ev: &mut Evaluator, value: &Value) -> RunResult<Json> {
    match value {
        Value::None => Ok(Json::Null),
        Value::Bool(b) => Ok(Json::Bool(*b)),
        Value::Int(i) => Ok(Json::from(*i)),
        Value::BigInt(b) => match b.to_i64() {
            Some(i) => Ok(Json::from(i)),
            None => Ok(Json::from(b.to_f64().unwrap_or(f64::INFINITY))),
        },
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(Json::Number)
            .ok_or_else(|| RunError::value_error("Out of range float values are not JSON compliant")),
        Value::Str(s) => Ok(Json::String(s.to_string())),
        Value::List(items) => {
            let snapshot = plock(items).clone();
            let mut out = Vec::with_capacity(snapshot.len());
            for item in &snapshot {
                out.push(to_json(ev, item)?);
            }
            Ok(Json::Array(out))
        }
        Value::Tuple(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items.iter() {
                out.push(to_json(ev, item)?);
            }
            Ok(Json::Array(out))
        }
        Value::Dict(d) => {
            let snapshot = plock(d).clone();
            let mut out = serde_json::Map::with_capacity(snapshot.len());
            for (key, val) in &snapshot {
                let name = match &key.value {
                    Value::Str(s) => s.to_string(),
                    other => ev.str_value(other)?,
                };
                out.insert(name, to_json(ev, val)?);
            }
            Ok(Json::Object(out))
        }
        Value::Instance(inst) => {
            // plain objects serialise as their attribute table
            let snapshot = plock(&inst.attrs).clone();
            let mut out = serde_json::Map::with_capacity(snapshot.len());
            for (name, val) in &snapshot {
                out.insert(name.to_string(), to_json(ev, val)?);
            }
            Ok(Json::Object(out))
        }
        other => Err(RunError::type_error(format!(
            "Object of type {} is not JSON serializable",
            other.type_name()
        ))),
    }
}

/// Converts a JSON tree to a runtime value.
pub(crate) fn from_json(json: &Json) -> RunResult<Value> {
    Ok(match json {
        Json::Null => Value::None,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Json::String(s) => Value::str(s.clone()),
        Json::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(from_json(item)?);
            }
            Value::list(out)
        }
        Json::Object(entries) => {
            let mut data = DictData::default();
            for (name, item) in entries {
                data.insert(Key::new(Value::str(name.clone()))?, from_json(item)?);
            }
            Value::dict(data)
        }
    })
}

fn j_dumps(ev: &mut Evaluator, args: Vec<Value>, kw: Vec<(String, Value)>) -> RunResult<Value> {
    let Some(value) = args.first() else {
        return Err(RunError::type_error("dumps() missing required argument"));
    };
    let mut indent = None;
    for (name, kw_value) in kw {
        match name.as_str() {
            "indent" => indent = kw_value.as_index(),
            other => {
                return Err(RunError::type_error(format!(
                    "dumps() got an unexpected keyword argument '{other}'"
                )));
            }
        }
    }
    let json = to_json(ev, value)?;
    let rendered = match indent {
        Some(width) if width > 0 => {
            let spaces = " ".repeat(width as usize);
            let mut buffer = Vec::new();
            let formatter = serde_json::ser::PrettyFormatter::with_indent(spaces.as_bytes());
            let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
            serde::Serialize::serialize(&json, &mut serializer)
                .map_err(|e| RunError::value_error(e.to_string()))?;
            String::from_utf8(buffer).unwrap_or_default()
        }
        _ => compact_dumps(&json),
    };
    Ok(Value::str(rendered))
}

/// Compact rendering with `", "`/`": "` separators, matching the source
/// language's default output.
fn compact_dumps(json: &Json) -> String {
    match json {
        Json::Array(items) => {
            let parts: Vec<String> = items.iter().map(compact_dumps).collect();
            format!("[{}]", parts.join(", "))
        }
        Json::Object(entries) => {
            let parts: Vec<String> = entries
                .iter()
                .map(|(k, v)| format!("{}: {}", Json::String(k.clone()), compact_dumps(v)))
                .collect();
            format!("{{{}}}", parts.join(", "))
        }
        other => other.to_string(),
    }
}

fn j_loads(_ev: &mut Evaluator, args: Vec<Value>) -> RunResult<Value> {
    let Some(Value::Str(text)) = args.first() else {
        return Err(RunError::type_error("loads() argument must be str"));
    };
    let json: Json = serde_json::from_str(text)
        .map_err(|e| RunError::value_error(format!("Invalid JSON: {e}")))?;
    from_json(&json)
}
