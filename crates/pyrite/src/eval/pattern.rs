//! `match`/`case` execution.

use std::sync::Arc;

use crate::{
    ctx::{EventKind, EventPayload},
    eval::{Evaluator, Flow, Scope},
    exceptions::{RunError, RunResult},
    expressions::{ExprLoc, Literal, MatchCase, Pattern},
    value::{Key, Value, plock, py_eq},
};

impl Evaluator {
    pub(crate) fn exec_match(&mut self, subject: &ExprLoc, cases: &[MatchCase], scope: &Scope) -> RunResult<Flow> {
        let subject_value = self.eval(subject, scope)?;
        for (arm, case) in cases.iter().enumerate() {
            let mut bindings = Vec::new();
            if !self.match_pattern(&case.pattern, &subject_value, &mut bindings, scope)? {
                continue;
            }
            // bindings apply before the guard, which may reference them
            for (name, value) in bindings {
                self.write_name(&name, value, scope)?;
                self.record_assign(&name)?;
            }
            if let Some(guard) = &case.guard {
                let guard_value = self.eval(guard, scope)?;
                if !self.value_truthy(&guard_value)? {
                    continue;
                }
            }
            self.ctx.record(EventKind::Branch, EventPayload::Arm(arm as u32))?;
            return self.exec_block(&case.body, scope);
        }
        self.ctx
            .record(EventKind::Branch, EventPayload::Arm(cases.len() as u32))?;
        Ok(Flow::Normal)
    }

    /// Tries a pattern, collecting would-be bindings. Bindings are only
    /// applied by the caller once the whole pattern matches.
    fn match_pattern(
        &mut self,
        pattern: &Pattern,
        subject: &Value,
        bindings: &mut Vec<(Arc<str>, Value)>,
        scope: &Scope,
    ) -> RunResult<bool> {
        match pattern {
            Pattern::Wildcard => Ok(true),
            Pattern::Capture(name) => {
                bindings.push((name.clone(), subject.clone()));
                Ok(true)
            }
            Pattern::Literal(literal) => {
                let value = match literal {
                    Literal::None => Value::None,
                    Literal::Bool(b) => Value::Bool(*b),
                    Literal::Int(i) => Value::Int(*i),
                    Literal::BigInt(b) => Value::BigInt(b.clone()),
                    Literal::Float(f) => Value::Float(*f),
                    Literal::Str(s) => Value::Str(s.clone()),
                };
                Ok(py_eq(subject, &value))
            }
            Pattern::Or(alternatives) => {
                for alt in alternatives {
                    let mut attempt = Vec::new();
                    if self.match_pattern(alt, subject, &mut attempt, scope)? {
                        bindings.extend(attempt);
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Pattern::As(inner, name) => {
                if self.match_pattern(inner, subject, bindings, scope)? {
                    bindings.push((name.clone(), subject.clone()));
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Pattern::Sequence { items, star } => {
                let elements = match subject {
                    Value::List(list) => plock(list).clone(),
                    Value::Tuple(items) => items.to_vec(),
                    _ => return Ok(false),
                };
                match star {
                    None => {
                        if elements.len() != items.len() {
                            return Ok(false);
                        }
                        for (p, v) in items.iter().zip(elements.iter()) {
                            if !self.match_pattern(p, v, bindings, scope)? {
                                return Ok(false);
                            }
                        }
                        Ok(true)
                    }
                    Some((star_index, star_name)) => {
                        if elements.len() < items.len() {
                            return Ok(false);
                        }
                        let before = &items[..*star_index];
                        let after = &items[*star_index..];
                        for (p, v) in before.iter().zip(elements.iter()) {
                            if !self.match_pattern(p, v, bindings, scope)? {
                                return Ok(false);
                            }
                        }
                        let tail_start = elements.len() - after.len();
                        for (p, v) in after.iter().zip(elements[tail_start..].iter()) {
                            if !self.match_pattern(p, v, bindings, scope)? {
                                return Ok(false);
                            }
                        }
                        if let Some(name) = star_name {
                            let middle: Vec<Value> = elements[before.len()..tail_start].to_vec();
                            bindings.push((name.clone(), Value::list(middle)));
                        }
                        Ok(true)
                    }
                }
            }
            Pattern::Mapping(entries) => {
                let Value::Dict(d) = subject else {
                    return Ok(false);
                };
                let snapshot = plock(d).clone();
                for (key_expr, value_pattern) in entries {
                    let key_value = self.eval(key_expr, scope)?;
                    let key = Key::new(key_value)?;
                    let Some(found) = snapshot.get(&key) else {
                        return Ok(false);
                    };
                    if !self.match_pattern(value_pattern, found, bindings, scope)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Pattern::Class {
                class,
                positional,
                keyword,
            } => {
                let class_value = self.eval(class, scope)?;
                let Value::Class(target_class) = &class_value else {
                    return Err(RunError::type_error(format!(
                        "match class pattern requires a class, not '{}'",
                        class_value.type_name()
                    )));
                };
                if !self.value_isinstance(subject, target_class) {
                    return Ok(false);
                }
                // positional sub-patterns bind the class's declared fields in order
                if !positional.is_empty() {
                    let field_names: Vec<Arc<str>> =
                        target_class.annotations.iter().map(|(n, _)| n.clone()).collect();
                    if positional.len() > field_names.len() {
                        return Err(RunError::type_error(format!(
                            "{}() accepts {} positional sub-patterns ({} given)",
                            target_class.name,
                            field_names.len(),
                            positional.len()
                        )));
                    }
                    for (p, field) in positional.iter().zip(field_names.iter()) {
                        let Ok(attr) = self.get_attr(subject, field, 0) else {
                            return Ok(false);
                        };
                        if !self.match_pattern(p, &attr, bindings, scope)? {
                            return Ok(false);
                        }
                    }
                }
                for (attr_name, p) in keyword {
                    let Ok(attr) = self.get_attr(subject, attr_name, 0) else {
                        return Ok(false);
                    };
                    if !self.match_pattern(p, &attr, bindings, scope)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }
}
