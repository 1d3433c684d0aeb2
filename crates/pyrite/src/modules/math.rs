//! The `math` module.

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{Signed, ToPrimitive, Zero};

use crate::{
    eval::Evaluator,
    exceptions::{ExcType, RunError, RunResult},
    modules::native,
    value::{AttrTable, Num, Value, as_number},
};

pub(crate) fn namespace() -> AttrTable {
    let mut table = AttrTable::default();
    table.insert("pi".into(), Value::Float(std::f64::consts::PI));
    table.insert("e".into(), Value::Float(std::f64::consts::E));
    table.insert("tau".into(), Value::Float(std::f64::consts::TAU));
    table.insert("inf".into(), Value::Float(f64::INFINITY));
    table.insert("nan".into(), Value::Float(f64::NAN));
    for (name, value) in [
        native("sqrt", m_sqrt),
        native("floor", m_floor),
        native("ceil", m_ceil),
        native("fabs", m_fabs),
        native("exp", m_exp),
        native("log", m_log),
        native("log2", m_log2),
        native("log10", m_log10),
        native("sin", m_sin),
        native("cos", m_cos),
        native("tan", m_tan),
        native("asin", m_asin),
        native("acos", m_acos),
        native("atan", m_atan),
        native("atan2", m_atan2),
        native("degrees", m_degrees),
        native("radians", m_radians),
        native("hypot", m_hypot),
        native("fmod", m_fmod),
        native("trunc", m_trunc),
        native("copysign", m_copysign),
        native("gcd", m_gcd),
        native("factorial", m_factorial),
        native("isfinite", m_isfinite),
        native("isinf", m_isinf),
        native("isnan", m_isnan),
        native("pow", m_pow),
    ] {
        table.insert(name, value);
    }
    table
}

fn float_arg(args: &[Value], i: usize, func: &str) -> RunResult<f64> {
    match args.get(i).and_then(as_number) {
        Some(Num::Int(v)) => Ok(v as f64),
        Some(Num::Big(b)) => Ok(b.to_f64().unwrap_or(f64::INFINITY)),
        Some(Num::Float(f)) => Ok(f),
        None => Err(RunError::type_error(format!(
            "math.{func}() argument must be a real number"
        ))),
    }
}

fn domain_check(result: f64, func: &str) -> RunResult<Value> {
    if result.is_nan() {
        return Err(RunError::value_error(format!("math domain error in {func}()")));
    }
    Ok(Value::Float(result))
}

fn m_sqrt(_ev: &mut Evaluator, args: Vec<Value>) -> RunResult<Value> {
    let x = float_arg(&args, 0, "sqrt")?;
    if x < 0.0 {
        return Err(RunError::value_error("math domain error"));
    }
    Ok(Value::Float(x.sqrt()))
}

fn floor_ceil(args: &[Value], func: &str, want_floor: bool) -> RunResult<Value> {
    match args.first().and_then(as_number) {
        Some(Num::Int(v)) => Ok(Value::Int(v)),
        Some(Num::Big(b)) => Ok(Value::from_bigint(b)),
        Some(Num::Float(f)) => {
            let r = if want_floor { f.floor() } else { f.ceil() };
            if r.abs() < 9e18 {
                Ok(Value::Int(r as i64))
            } else {
                Err(RunError::raise(
                    ExcType::OverflowError,
                    format!("{func}() result too large"),
                ))
            }
        }
        None => Err(RunError::type_error(format!(
            "math.{func}() argument must be a real number"
        ))),
    }
}

fn m_floor(_ev: &mut Evaluator, args: Vec<Value>) -> RunResult<Value> {
    floor_ceil(&args, "floor", true)
}

fn m_ceil(_ev: &mut Evaluator, args: Vec<Value>) -> RunResult<Value> {
    floor_ceil(&args, "ceil", false)
}

fn m_fabs(_ev: &mut Evaluator, args: Vec<Value>) -> RunResult<Value> {
    Ok(Value::Float(float_arg(&args, 0, "fabs")?.abs()))
}

fn m_exp(_ev: &mut Evaluator, args: Vec<Value>) -> RunResult<Value> {
    Ok(Value::Float(float_arg(&args, 0, "exp")?.exp()))
}

fn m_log(_ev: &mut Evaluator, args: Vec<Value>) -> RunResult<Value> {
    let x = float_arg(&args, 0, "log")?;
    if x <= 0.0 {
        return Err(RunError::value_error("math domain error"));
    }
    let result = match args.get(1) {
        Some(_) => {
            let base = float_arg(&args, 1, "log")?;
            x.ln() / base.ln()
        }
        None => x.ln(),
    };
    domain_check(result, "log")
}

fn m_log2(_ev: &mut Evaluator, args: Vec<Value>) -> RunResult<Value> {
    let x = float_arg(&args, 0, "log2")?;
    if x <= 0.0 {
        return Err(RunError::value_error("math domain error"));
    }
    Ok(Value::Float(x.log2()))
}

fn m_log10(_ev: &mut Evaluator, args: Vec<Value>) -> RunResult<Value> {
    let x = float_arg(&args, 0, "log10")?;
    if x <= 0.0 {
        return Err(RunError::value_error("math domain error"));
    }
    Ok(Value::Float(x.log10()))
}

fn m_sin(_ev: &mut Evaluator, args: Vec<Value>) -> RunResult<Value> {
    Ok(Value::Float(float_arg(&args, 0, "sin")?.sin()))
}

fn m_cos(_ev: &mut Evaluator, args: Vec<Value>) -> RunResult<Value> {
    Ok(Value::Float(float_arg(&args, 0, "cos")?.cos()))
}

fn m_tan(_ev: &mut Evaluator, args: Vec<Value>) -> RunResult<Value> {
    Ok(Value::Float(float_arg(&args, 0, "tan")?.tan()))
}

fn m_asin(_ev: &mut Evaluator, args: Vec<Value>) -> RunResult<Value> {
    domain_check(float_arg(&args, 0, "asin")?.asin(), "asin")
}

fn m_acos(_ev: &mut Evaluator, args: Vec<Value>) -> RunResult<Value> {
    domain_check(float_arg(&args, 0, "acos")?.acos(), "acos")
}

fn m_atan(_ev: &mut Evaluator, args: Vec<Value>) -> RunResult<Value> {
    Ok(Value::Float(float_arg(&args, 0, "atan")?.atan()))
}

fn m_atan2(_ev: &mut Evaluator, args: Vec<Value>) -> RunResult<Value> {
    Ok(Value::Float(
        float_arg(&args, 0, "atan2")?.atan2(float_arg(&args, 1, "atan2")?),
    ))
}

fn m_degrees(_ev: &mut Evaluator, args: Vec<Value>) -> RunResult<Value> {
    Ok(Value::Float(float_arg(&args, 0, "degrees")?.to_degrees()))
}

fn m_radians(_ev: &mut Evaluator, args: Vec<Value>) -> RunResult<Value> {
    Ok(Value::Float(float_arg(&args, 0, "radians")?.to_radians()))
}

fn m_hypot(_ev: &mut Evaluator, args: Vec<Value>) -> RunResult<Value> {
    Ok(Value::Float(
        float_arg(&args, 0, "hypot")?.hypot(float_arg(&args, 1, "hypot")?),
    ))
}

fn m_fmod(_ev: &mut Evaluator, args: Vec<Value>) -> RunResult<Value> {
    let x = float_arg(&args, 0, "fmod")?;
    let y = float_arg(&args, 1, "fmod")?;
    if y == 0.0 {
        return Err(RunError::value_error("math domain error"));
    }
    Ok(Value::Float(x % y))
}

fn m_trunc(_ev: &mut Evaluator, args: Vec<Value>) -> RunResult<Value> {
    match args.first().and_then(as_number) {
        Some(Num::Int(v)) => Ok(Value::Int(v)),
        Some(Num::Big(b)) => Ok(Value::from_bigint(b)),
        Some(Num::Float(f)) => Ok(Value::Int(f.trunc() as i64)),
        None => Err(RunError::type_error("math.trunc() argument must be a real number")),
    }
}

fn m_copysign(_ev: &mut Evaluator, args: Vec<Value>) -> RunResult<Value> {
    Ok(Value::Float(
        float_arg(&args, 0, "copysign")?.copysign(float_arg(&args, 1, "copysign")?),
    ))
}

fn int_arg(args: &[Value], i: usize, func: &str) -> RunResult<BigInt> {
    match args.get(i).and_then(as_number) {
        Some(Num::Int(v)) => Ok(BigInt::from(v)),
        Some(Num::Big(b)) => Ok(b),
        _ => Err(RunError::type_error(format!(
            "math.{func}() argument must be an integer"
        ))),
    }
}

fn m_gcd(_ev: &mut Evaluator, args: Vec<Value>) -> RunResult<Value> {
    let a = int_arg(&args, 0, "gcd")?;
    let b = int_arg(&args, 1, "gcd")?;
    Ok(Value::from_bigint(a.gcd(&b)))
}

fn m_factorial(_ev: &mut Evaluator, args: Vec<Value>) -> RunResult<Value> {
    let n = int_arg(&args, 0, "factorial")?;
    if n.is_negative() {
        return Err(RunError::value_error("factorial() not defined for negative values"));
    }
    let Some(n) = n.to_u32() else {
        return Err(RunError::raise(
            ExcType::OverflowError,
            "factorial() argument is too large",
        ));
    };
    if n > 10_000 {
        return Err(RunError::raise(
            ExcType::OverflowError,
            "factorial() argument is too large",
        ));
    }
    let mut acc = BigInt::from(1);
    for i in 2..=u64::from(n) {
        acc *= i;
    }
    if acc.is_zero() && n > 1 {
        return Err(RunError::value_error("factorial() internal error"));
    }
    Ok(Value::from_bigint(acc))
}

fn m_isfinite(_ev: &mut Evaluator, args: Vec<Value>) -> RunResult<Value> {
    Ok(Value::Bool(float_arg(&args, 0, "isfinite")?.is_finite()))
}

fn m_isinf(_ev: &mut Evaluator, args: Vec<Value>) -> RunResult<Value> {
    Ok(Value::Bool(float_arg(&args, 0, "isinf")?.is_infinite()))
}

fn m_isnan(_ev: &mut Evaluator, args: Vec<Value>) -> RunResult<Value> {
    Ok(Value::Bool(float_arg(&args, 0, "isnan")?.is_nan()))
}

fn m_pow(_ev: &mut Evaluator, args: Vec<Value>) -> RunResult<Value> {
    Ok(Value::Float(
        float_arg(&args, 0, "pow")?.powf(float_arg(&args, 1, "pow")?),
    ))
}
