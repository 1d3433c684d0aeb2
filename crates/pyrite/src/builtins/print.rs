//! The `print()` builtin; output goes to the Ctx stdout buffer.

use crate::{
    eval::Evaluator,
    exceptions::{RunError, RunResult},
    value::Value,
};

pub(crate) fn print(ev: &mut Evaluator, pos: Vec<Value>, kw: Vec<(String, Value)>) -> RunResult<Value> {
    let mut sep = " ".to_owned();
    let mut end = "\n".to_owned();
    for (name, value) in kw {
        match name.as_str() {
            "sep" => {
                sep = match value {
                    Value::None => " ".to_owned(),
                    Value::Str(s) => s.to_string(),
                    other => {
                        return Err(RunError::type_error(format!(
                            "sep must be None or a string, not {}",
                            other.type_name()
                        )));
                    }
                };
            }
            "end" => {
                end = match value {
                    Value::None => "\n".to_owned(),
                    Value::Str(s) => s.to_string(),
                    other => {
                        return Err(RunError::type_error(format!(
                            "end must be None or a string, not {}",
                            other.type_name()
                        )));
                    }
                };
            }
            other => {
                return Err(RunError::type_error(format!(
                    "print() got an unexpected keyword argument '{other}'"
                )));
            }
        }
    }
    let mut out = String::new();
    for (i, value) in pos.iter().enumerate() {
        if i > 0 {
            out.push_str(&sep);
        }
        out.push_str(&ev.str_value(value)?);
    }
    out.push_str(&end);
    ev.ctx.write_stdout(&out);
    Ok(Value::None)
}
