//! Public value mirror.
//!
//! `Object` is the owned, host-facing form of runtime values: inputs to
//! host-registered module functions, response bodies, and `run()` results.
//! Unlike the internal `Value` it owns all its data and needs no evaluator
//! for inspection. Values with no data mapping degrade to `Repr`.

use ahash::AHashSet;
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

use crate::{
    eval::Evaluator,
    exceptions::{RunError, RunResult},
    value::{DictData, Key, SetData, Value, plock},
};

/// A value that can cross the host boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Object {
    None,
    Bool(bool),
    Int(i64),
    /// Arbitrary-precision integer (outside i64 range).
    BigInt(BigInt),
    Float(f64),
    Str(String),
    List(Vec<Object>),
    Tuple(Vec<Object>),
    /// Insertion-ordered pairs; keys are data values.
    Dict(Vec<(Object, Object)>),
    Set(Vec<Object>),
    /// An exception instance (type name + rendered message).
    Exception {
        exc_type: String,
        message: String,
    },
    /// Fallback for values with no data mapping (functions, classes,
    /// generators); contains their `repr()`.
    Repr(String),
}

impl Object {
    /// Natural JSON rendering (used for `application/json` response bodies).
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Self::None => Json::Null,
            Self::Bool(b) => Json::Bool(*b),
            Self::Int(i) => Json::from(*i),
            Self::BigInt(b) => {
                use num_traits::ToPrimitive;
                match b.to_i64() {
                    Some(i) => Json::from(i),
                    None => Json::String(b.to_string()),
                }
            }
            Self::Float(f) => serde_json::Number::from_f64(*f).map_or(Json::Null, Json::Number),
            Self::Str(s) => Json::String(s.clone()),
            Self::List(items) | Self::Tuple(items) | Self::Set(items) => {
                Json::Array(items.iter().map(Self::to_json).collect())
            }
            Self::Dict(pairs) => {
                let mut map = serde_json::Map::with_capacity(pairs.len());
                for (key, value) in pairs {
                    let name = match key {
                        Self::Str(s) => s.clone(),
                        other => other.to_json().to_string(),
                    };
                    map.insert(name, value.to_json());
                }
                Json::Object(map)
            }
            Self::Exception { exc_type, message } => {
                Json::String(format!("{exc_type}: {message}"))
            }
            Self::Repr(r) => Json::String(r.clone()),
        }
    }
}

impl Evaluator {
    /// Converts a runtime value into a host object; cycle-safe, with a
    /// `Repr` fallback for non-data values.
    pub(crate) fn to_object(&mut self, value: &Value) -> Object {
        let mut visited = AHashSet::new();
        self.to_object_inner(value, &mut visited)
    }

    fn to_object_inner(&mut self, value: &Value, visited: &mut AHashSet<usize>) -> Object {
        match value {
            Value::None => Object::None,
            Value::Bool(b) => Object::Bool(*b),
            Value::Int(i) => Object::Int(*i),
            Value::BigInt(b) => Object::BigInt((**b).clone()),
            Value::Float(f) => Object::Float(*f),
            Value::Str(s) => Object::Str(s.to_string()),
            Value::List(items) => {
                let ptr = std::sync::Arc::as_ptr(items) as usize;
                if !visited.insert(ptr) {
                    return Object::Repr("[...]".to_owned());
                }
                let snapshot = plock(items).clone();
                let out = snapshot.iter().map(|v| self.to_object_inner(v, visited)).collect();
                visited.remove(&ptr);
                Object::List(out)
            }
            Value::Tuple(items) => Object::Tuple(items.iter().map(|v| self.to_object_inner(v, visited)).collect()),
            Value::Dict(d) => {
                let ptr = std::sync::Arc::as_ptr(d) as usize;
                if !visited.insert(ptr) {
                    return Object::Repr("{...}".to_owned());
                }
                let snapshot = plock(d).clone();
                let out = snapshot
                    .iter()
                    .map(|(k, v)| (self.to_object_inner(&k.value, visited), self.to_object_inner(v, visited)))
                    .collect();
                visited.remove(&ptr);
                Object::Dict(out)
            }
            Value::Set(s) => {
                let snapshot = plock(s).clone();
                Object::Set(snapshot.iter().map(|k| self.to_object_inner(&k.value, visited)).collect())
            }
            Value::Instance(inst) if inst.class.exc_type().is_some() => {
                let message = self.exception_message(value).unwrap_or_default();
                Object::Exception {
                    exc_type: inst.class.name.to_string(),
                    message,
                }
            }
            other => {
                let rendered = self
                    .repr_value(other)
                    .unwrap_or_else(|_| format!("<{}>", other.type_name()));
                Object::Repr(rendered)
            }
        }
    }

    /// Converts a host object into a runtime value.
    pub(crate) fn from_object(&mut self, object: &Object) -> RunResult<Value> {
        Ok(match object {
            Object::None => Value::None,
            Object::Bool(b) => Value::Bool(*b),
            Object::Int(i) => Value::Int(*i),
            Object::BigInt(b) => Value::from_bigint(b.clone()),
            Object::Float(f) => Value::Float(*f),
            Object::Str(s) => Value::str(s.clone()),
            Object::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.from_object(item)?);
                }
                Value::list(out)
            }
            Object::Tuple(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.from_object(item)?);
                }
                Value::tuple(out)
            }
            Object::Dict(pairs) => {
                let mut data = DictData::default();
                for (key, value) in pairs {
                    let key = Key::new(self.from_object(key)?)?;
                    data.insert(key, self.from_object(value)?);
                }
                Value::dict(data)
            }
            Object::Set(items) => {
                let mut data = SetData::default();
                for item in items {
                    data.insert(Key::new(self.from_object(item)?)?);
                }
                Value::set(data)
            }
            Object::Exception { exc_type, message } => {
                let raised = crate::exceptions::Raised {
                    value: Value::None,
                    type_name: exc_type.clone(),
                    message: message.clone(),
                    line: None,
                };
                self.materialize_exception(&raised)
            }
            Object::Repr(_) => {
                return Err(RunError::type_error(
                    "Repr objects cannot be converted back into runtime values",
                ));
            }
        })
    }
}
