//! Generator semantics: laziness, back-pressure, teardown, delegation.

use pretty_assertions::assert_eq;
use pyrite::{Object, RunOutcome, run};

fn run_ok(source: &str) -> Object {
    match run(source, None) {
        RunOutcome::Ok { value, .. } => value,
        other => panic!("expected success, got {other:?}"),
    }
}

fn str_list(items: &[&str]) -> Object {
    Object::List(items.iter().map(|s| Object::Str((*s).to_owned())).collect())
}

#[test]
fn generators_are_lazy() {
    // the producer advances exactly one yield per pull: after k pulls the
    // side-effect log holds exactly k entries
    let source = r#"
log = []

def produce():
    for i in range(100):
        log.append(i)
        yield i

g = produce()
first = next(g)
count_after_one = len(log)
second = next(g)
count_after_two = len(log)
[first, count_after_one, second, count_after_two]
"#;
    assert_eq!(
        run_ok(source),
        Object::List(vec![Object::Int(0), Object::Int(1), Object::Int(1), Object::Int(2)])
    );
}

#[test]
fn generator_body_does_not_start_until_first_pull() {
    let source = r#"
log = []

def produce():
    log.append("started")
    yield 1

g = produce()
before = len(log)
next(g)
after = len(log)
[before, after]
"#;
    assert_eq!(run_ok(source), Object::List(vec![Object::Int(0), Object::Int(1)]));
}

#[test]
fn exhaustion_raises_stop_iteration() {
    let source = r#"
def produce():
    yield 1

g = produce()
next(g)
try:
    next(g)
    result = "no error"
except StopIteration:
    result = "stopped"
result
"#;
    assert_eq!(run_ok(source), Object::Str("stopped".to_owned()));
}

#[test]
fn next_default_on_exhausted() {
    let source = r#"
def produce():
    yield 1

g = produce()
next(g)
next(g, "done")
"#;
    assert_eq!(run_ok(source), Object::Str("done".to_owned()));
}

#[test]
fn next_on_generator_function_is_type_error_advising_iter() {
    let source = r#"
def produce():
    yield 1

try:
    next(produce)
    result = "no error"
except TypeError as e:
    result = str(e)
result
"#;
    let Object::Str(message) = run_ok(source) else {
        panic!("expected a string result");
    };
    assert!(message.contains("generator function"), "message was: {message}");
    assert!(message.contains("iter()"), "message was: {message}");
}

#[test]
fn close_releases_producer_resources() {
    // close() wakes the parked producer, which unwinds through finally
    let source = r#"
released = []

def produce():
    try:
        while True:
            yield 1
    finally:
        released.append(True)

g = produce()
next(g)
g.close()
len(released)
"#;
    assert_eq!(run_ok(source), Object::Int(1));
}

#[test]
fn early_break_from_for_loop() {
    let source = r#"
log = []

def produce():
    for i in range(1000):
        log.append(i)
        yield i

total = 0
for value in produce():
    total += value
    if value >= 4:
        break
[total, len(log)]
"#;
    assert_eq!(run_ok(source), Object::List(vec![Object::Int(10), Object::Int(5)]));
}

#[test]
fn with_resources_released_in_producer() {
    let source = r#"
trace = []

class Resource:
    def __enter__(self):
        trace.append("acquired")
        return self
    def __exit__(self, exc_type, exc_value, tb):
        trace.append("released")
        return False

def produce():
    with Resource():
        yield "a"
        yield "b"

g = produce()
first = next(g)
g.close()
[first, trace]
"#;
    assert_eq!(
        run_ok(source),
        Object::List(vec![
            Object::Str("a".to_owned()),
            str_list(&["acquired", "released"]),
        ])
    );
}

#[test]
fn yield_from_delegates_and_propagates() {
    // the spec's generator-propagation scenario
    let source = r#"
def inner():
    yield "a"
    raise ValueError("fail")

def outer():
    yield "start"
    yield from inner()

out = []
try:
    for x in outer():
        out.append(x)
except ValueError as e:
    out.append("caught: " + str(e))
out
"#;
    assert_eq!(run_ok(source), str_list(&["start", "a", "caught: fail"]));
}

#[test]
fn yield_from_plain_iterables() {
    let source = r#"
def produce():
    yield from [1, 2]
    yield from range(3, 5)
    yield from "xy"

list(produce())
"#;
    assert_eq!(
        run_ok(source),
        Object::List(vec![
            Object::Int(1),
            Object::Int(2),
            Object::Int(3),
            Object::Int(4),
            Object::Str("x".to_owned()),
            Object::Str("y".to_owned()),
        ])
    );
}

#[test]
fn send_resumes_with_value() {
    let source = r#"
def echo():
    received = yield "ready"
    yield "got: " + received

g = echo()
first = next(g)
second = g.send("hello")
[first, second]
"#;
    assert_eq!(run_ok(source), str_list(&["ready", "got: hello"]));
}

#[test]
fn generator_expressions_are_lazy_generators() {
    let source = r#"
log = []

def observe(x):
    log.append(x)
    return x

g = (observe(i) * 2 for i in range(10))
first = next(g)
[first, len(log), sum(x * x for x in range(5))]
"#;
    assert_eq!(
        run_ok(source),
        Object::List(vec![Object::Int(0), Object::Int(1), Object::Int(30)])
    );
}

#[test]
fn nested_generators() {
    let source = r#"
def inner(n):
    for i in range(n):
        yield i

def outer(n):
    for g in [inner(n), inner(n)]:
        for value in g:
            yield value

list(outer(3))
"#;
    assert_eq!(
        run_ok(source),
        Object::List(vec![
            Object::Int(0),
            Object::Int(1),
            Object::Int(2),
            Object::Int(0),
            Object::Int(1),
            Object::Int(2),
        ])
    );
}

#[test]
fn generator_errors_cross_the_rendezvous() {
    let source = r#"
def explode():
    yield 1
    return 1 // 0

g = explode()
next(g)
try:
    next(g)
    result = "no error"
except ZeroDivisionError:
    result = "zero division"
result
"#;
    assert_eq!(run_ok(source), Object::Str("zero division".to_owned()));
}

#[test]
fn suspend_inside_generator_is_rejected() {
    let source = r#"
def produce():
    yield 1
    suspend()
    yield 2

g = produce()
next(g)
try:
    next(g)
    result = "no error"
except RuntimeError as e:
    result = str(e)
result
"#;
    let Object::Str(message) = run_ok(source) else {
        panic!("expected a string result");
    };
    assert!(message.contains("suspend()"), "message was: {message}");
}

#[test]
fn comprehension_consumes_generator() {
    let source = r#"
def produce():
    yield 2
    yield 3

[x * x for x in produce()]
"#;
    assert_eq!(run_ok(source), Object::List(vec![Object::Int(4), Object::Int(9)]));
}
