//! The `re` module: a regex-crate-backed subset (match/search/findall/sub/
//! split) returning match objects with `group`/`groups`/`start`/`end`/`span`.

use std::sync::{Arc, Mutex};

use regex::Regex;

use crate::{
    eval::Evaluator,
    exceptions::{RunError, RunResult},
    modules::native,
    value::{
        AttrTable, AttrTable as Attrs, ClassKind, ClassValue, InstanceValue, NativeFunction, NativeImpl, Value,
        plock,
    },
};

pub(crate) fn namespace() -> AttrTable {
    let mut table = AttrTable::default();
    for (name, value) in [
        native("match", re_match),
        native("search", re_search),
        native("findall", re_findall),
        native("sub", re_sub),
        native("split", re_split),
    ] {
        table.insert(name, value);
    }
    table
}

fn compile(pattern: &Value) -> RunResult<Regex> {
    let Value::Str(pattern) = pattern else {
        return Err(RunError::type_error("pattern must be str"));
    };
    Regex::new(pattern).map_err(|e| RunError::value_error(format!("invalid regular expression: {e}")))
}

fn text_arg(args: &[Value], i: usize) -> RunResult<&str> {
    match args.get(i) {
        Some(Value::Str(s)) => Ok(s),
        Some(other) => Err(RunError::type_error(format!(
            "expected string, got {}",
            other.type_name()
        ))),
        None => Err(RunError::type_error("missing required argument")),
    }
}

/// The lazily-built `re.Match` class: plain attribute storage plus native
/// accessor methods.
fn match_class() -> Arc<ClassValue> {
    let mut attrs = Attrs::default();
    for (name, imp) in [
        ("group", m_group as fn(&mut Evaluator, Vec<Value>) -> RunResult<Value>),
        ("groups", m_groups),
        ("start", m_start),
        ("end", m_end),
        ("span", m_span),
    ] {
        attrs.insert(
            Arc::from(name),
            Value::Native(Arc::new(NativeFunction {
                name: Arc::from(name),
                imp: NativeImpl::Fixed(imp),
            })),
        );
    }
    Arc::new(ClassValue {
        name: Arc::from("Match"),
        bases: Vec::new(),
        mro: Vec::new(),
        attrs: Mutex::new(attrs),
        kind: ClassKind::User,
        annotations: Vec::new(),
    })
}

fn make_match(regex: &Regex, text: &str, m: &regex::Captures<'_>) -> RunResult<Value> {
    let whole = m.get(0).map_or((0, 0), |g| (g.start(), g.end()));
    let mut attrs = Attrs::default();
    let char_at = |byte: usize| text[..byte].chars().count() as i64;
    attrs.insert(Arc::from("_text"), Value::str(text.to_owned()));
    attrs.insert(
        Arc::from("_groups"),
        Value::list(
            (0..regex.captures_len())
                .map(|i| match m.get(i) {
                    Some(g) => Value::str(g.as_str().to_owned()),
                    None => Value::None,
                })
                .collect(),
        ),
    );
    attrs.insert(Arc::from("_start"), Value::Int(char_at(whole.0)));
    attrs.insert(Arc::from("_end"), Value::Int(char_at(whole.1)));
    Ok(Value::Instance(Arc::new(InstanceValue {
        class: match_class(),
        attrs: Mutex::new(attrs),
    })))
}

fn self_attr(args: &[Value], name: &str) -> RunResult<Value> {
    let Some(Value::Instance(inst)) = args.first() else {
        return Err(RunError::type_error("match method requires a match object"));
    };
    plock(&inst.attrs)
        .get(name)
        .cloned()
        .ok_or_else(|| RunError::type_error("malformed match object"))
}

fn m_group(_ev: &mut Evaluator, args: Vec<Value>) -> RunResult<Value> {
    let groups = self_attr(&args, "_groups")?;
    let Value::List(groups) = &groups else {
        return Err(RunError::type_error("malformed match object"));
    };
    let index = args.get(1).and_then(Value::as_index).unwrap_or(0);
    let groups = plock(groups);
    groups
        .get(index.max(0) as usize)
        .cloned()
        .ok_or_else(|| RunError::raise(crate::exceptions::ExcType::IndexError, "no such group"))
}

fn m_groups(_ev: &mut Evaluator, args: Vec<Value>) -> RunResult<Value> {
    let groups = self_attr(&args, "_groups")?;
    let Value::List(groups) = &groups else {
        return Err(RunError::type_error("malformed match object"));
    };
    let all = plock(groups).clone();
    Ok(Value::tuple(all.into_iter().skip(1).collect()))
}

fn m_start(_ev: &mut Evaluator, args: Vec<Value>) -> RunResult<Value> {
    self_attr(&args, "_start")
}

fn m_end(_ev: &mut Evaluator, args: Vec<Value>) -> RunResult<Value> {
    self_attr(&args, "_end")
}

fn m_span(_ev: &mut Evaluator, args: Vec<Value>) -> RunResult<Value> {
    Ok(Value::tuple(vec![self_attr(&args, "_start")?, self_attr(&args, "_end")?]))
}

fn re_match(_ev: &mut Evaluator, args: Vec<Value>) -> RunResult<Value> {
    let regex = compile(args.first().unwrap_or(&Value::None))?;
    let text = text_arg(&args, 1)?;
    match regex.captures(text) {
        // match() anchors at the start
        Some(m) if m.get(0).is_some_and(|g| g.start() == 0) => make_match(&regex, text, &m),
        _ => Ok(Value::None),
    }
}

fn re_search(_ev: &mut Evaluator, args: Vec<Value>) -> RunResult<Value> {
    let regex = compile(args.first().unwrap_or(&Value::None))?;
    let text = text_arg(&args, 1)?;
    match regex.captures(text) {
        Some(m) => make_match(&regex, text, &m),
        None => Ok(Value::None),
    }
}

fn re_findall(_ev: &mut Evaluator, args: Vec<Value>) -> RunResult<Value> {
    let regex = compile(args.first().unwrap_or(&Value::None))?;
    let text = text_arg(&args, 1)?;
    let mut out = Vec::new();
    for m in regex.captures_iter(text) {
        let value = if regex.captures_len() == 1 {
            Value::str(m.get(0).map_or("", |g| g.as_str()).to_owned())
        } else if regex.captures_len() == 2 {
            Value::str(m.get(1).map_or("", |g| g.as_str()).to_owned())
        } else {
            Value::tuple(
                (1..regex.captures_len())
                    .map(|i| Value::str(m.get(i).map_or("", |g| g.as_str()).to_owned()))
                    .collect(),
            )
        };
        out.push(value);
    }
    Ok(Value::list(out))
}

fn re_sub(_ev: &mut Evaluator, args: Vec<Value>) -> RunResult<Value> {
    let regex = compile(args.first().unwrap_or(&Value::None))?;
    let replacement = text_arg(&args, 1)?.to_owned();
    let text = text_arg(&args, 2)?;
    Ok(Value::str(regex.replace_all(text, replacement.as_str()).into_owned()))
}

fn re_split(_ev: &mut Evaluator, args: Vec<Value>) -> RunResult<Value> {
    let regex = compile(args.first().unwrap_or(&Value::None))?;
    let text = text_arg(&args, 1)?;
    let parts: Vec<Value> = regex.split(text).map(|p| Value::str(p.to_owned())).collect();
    Ok(Value::list(parts))
}
