//! The `random` module: deterministic, ChaCha-seeded per Ctx.

use rand::{Rng, SeedableRng, seq::SliceRandom};
use rand_chacha::ChaCha8Rng;

use crate::{
    eval::Evaluator,
    exceptions::{RunError, RunResult},
    modules::native,
    value::{AttrTable, Value, plock},
};

pub(crate) fn namespace() -> AttrTable {
    let mut table = AttrTable::default();
    for (name, value) in [
        native("random", r_random),
        native("randint", r_randint),
        native("uniform", r_uniform),
        native("choice", r_choice),
        native("shuffle", r_shuffle),
        native("seed", r_seed),
        native("randrange", r_randrange),
    ] {
        table.insert(name, value);
    }
    table
}

fn r_random(ev: &mut Evaluator, _args: Vec<Value>) -> RunResult<Value> {
    let value = plock(&ev.ctx.inner.rng).r#gen::<f64>();
    Ok(Value::Float(value))
}

fn int_pair(args: &[Value], func: &str) -> RunResult<(i64, i64)> {
    let a = args.first().and_then(Value::as_index);
    let b = args.get(1).and_then(Value::as_index);
    match (a, b) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(RunError::type_error(format!("{func}() requires integer arguments"))),
    }
}

fn r_randint(ev: &mut Evaluator, args: Vec<Value>) -> RunResult<Value> {
    let (a, b) = int_pair(&args, "randint")?;
    if a > b {
        return Err(RunError::value_error("empty range for randint()"));
    }
    let value = plock(&ev.ctx.inner.rng).gen_range(a..=b);
    Ok(Value::Int(value))
}

fn r_uniform(ev: &mut Evaluator, args: Vec<Value>) -> RunResult<Value> {
    let a = match args.first() {
        Some(Value::Float(f)) => *f,
        Some(v) => v.as_index().map(|i| i as f64).unwrap_or(0.0),
        None => 0.0,
    };
    let b = match args.get(1) {
        Some(Value::Float(f)) => *f,
        Some(v) => v.as_index().map(|i| i as f64).unwrap_or(0.0),
        None => 0.0,
    };
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let value = if lo == hi {
        lo
    } else {
        plock(&ev.ctx.inner.rng).gen_range(lo..hi)
    };
    Ok(Value::Float(value))
}

fn r_choice(ev: &mut Evaluator, args: Vec<Value>) -> RunResult<Value> {
    let Some(seq) = args.first() else {
        return Err(RunError::type_error("choice() missing required argument"));
    };
    let items = ev.drain_iterable(seq, 0)?;
    if items.is_empty() {
        return Err(RunError::raise(
            crate::exceptions::ExcType::IndexError,
            "cannot choose from an empty sequence",
        ));
    }
    let index = plock(&ev.ctx.inner.rng).gen_range(0..items.len());
    Ok(items[index].clone())
}

fn r_shuffle(ev: &mut Evaluator, args: Vec<Value>) -> RunResult<Value> {
    let Some(Value::List(list)) = args.first() else {
        return Err(RunError::type_error("shuffle() argument must be a list"));
    };
    let mut items = plock(list).clone();
    items.shuffle(&mut *plock(&ev.ctx.inner.rng));
    *plock(list) = items;
    Ok(Value::None)
}

fn r_seed(ev: &mut Evaluator, args: Vec<Value>) -> RunResult<Value> {
    let seed = args.first().and_then(Value::as_index).unwrap_or(0);
    *plock(&ev.ctx.inner.rng) = ChaCha8Rng::seed_from_u64(seed as u64);
    Ok(Value::None)
}

fn r_randrange(ev: &mut Evaluator, args: Vec<Value>) -> RunResult<Value> {
    let (start, stop) = match args.len() {
        1 => (
            0,
            args[0]
                .as_index()
                .ok_or_else(|| RunError::type_error("randrange() requires integer arguments"))?,
        ),
        _ => int_pair(&args, "randrange")?,
    };
    if start >= stop {
        return Err(RunError::value_error("empty range for randrange()"));
    }
    let value = plock(&ev.ctx.inner.rng).gen_range(start..stop);
    Ok(Value::Int(value))
}
