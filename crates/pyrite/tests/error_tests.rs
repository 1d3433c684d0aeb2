//! The error-message contract and the no-crash property.

use pyrite::{Ctx, CtxOptions, ErrorKind, Object, RunOutcome, run};

fn run_err(source: &str) -> pyrite::ErrorRecord {
    match run(source, None) {
        RunOutcome::Error(record) => record,
        other => panic!("expected error, got {other:?}"),
    }
}

fn run_ok(source: &str) -> Object {
    match run(source, None) {
        RunOutcome::Ok { value, .. } => value,
        other => panic!("expected success, got {other:?}"),
    }
}

#[test]
fn name_error_names_the_name_and_line() {
    let err = run_err("x = 1\ny = missing_name\n");
    assert_eq!(err.kind, ErrorKind::Python);
    assert_eq!(err.exception_type.as_deref(), Some("NameError"));
    assert_eq!(err.message, "name 'missing_name' is not defined");
    assert_eq!(err.line, Some(2));
    assert_eq!(err.to_string(), "NameError: name 'missing_name' is not defined on line 2");
}

#[test]
fn attribute_error_names_type_and_attribute() {
    let err = run_err("(5).foo\n");
    assert_eq!(err.exception_type.as_deref(), Some("AttributeError"));
    assert_eq!(err.message, "'int' object has no attribute 'foo'");
}

#[test]
fn type_error_names_both_operands() {
    let err = run_err("None + 1\n");
    assert_eq!(err.exception_type.as_deref(), Some("TypeError"));
    assert!(err.message.contains("NoneType"));
    assert!(err.message.contains("int"));
}

#[test]
fn syntax_errors_cite_expectations_not_tokens() {
    let err = run_err("def f(:\n    pass\n");
    assert_eq!(err.kind, ErrorKind::Syntax);
    assert!(!err.message.contains("Tok"), "raw tokens leaked: {}", err.message);
    assert!(!err.message.contains("Op("), "raw tokens leaked: {}", err.message);

    let err = run_err("if x\n    pass\n");
    assert!(err.message.contains("':'"), "message was: {}", err.message);
    assert_eq!(err.line, Some(1));
}

#[test]
fn indentation_error_kind() {
    let err = run_err("if x:\npass\n");
    assert_eq!(err.kind, ErrorKind::Syntax);
    assert_eq!(err.exception_type.as_deref(), Some("IndentationError"));
}

#[test]
fn unsupported_features_are_named_not_nameerrors() {
    let err = run_err("exec('x = 1')\n");
    assert_eq!(err.exception_type.as_deref(), Some("NotImplementedError"));
    assert!(err.message.contains("exec"), "message was: {}", err.message);

    let err = run_err("eval('1')\n");
    assert_eq!(err.exception_type.as_deref(), Some("NotImplementedError"));

    let err = run_err("compile('1', '<s>', 'eval')\n");
    assert_eq!(err.exception_type.as_deref(), Some("NotImplementedError"));

    // shadowing restores normal name semantics
    assert_eq!(run_ok("exec = 5\nexec\n"), Object::Int(5));
}

#[test]
fn async_await_rejected_with_feature_message() {
    let err = run_err("async def f():\n    pass\n");
    assert_eq!(err.kind, ErrorKind::Syntax);
    assert!(err.message.contains("async/await is not supported"));

    let err = run_err("x = await f()\n");
    assert!(err.message.contains("async/await is not supported"));
}

#[test]
fn bytes_and_complex_rejected_specifically() {
    let err = run_err("x = b'abc'\n");
    assert!(err.message.contains("bytes literals are not supported"));

    let err = run_err("x = 2j\n");
    assert!(err.message.contains("complex numbers are not supported"));
}

#[test]
fn import_error_enumerates_registered_modules() {
    let err = run_err("import requests\n");
    assert_eq!(err.kind, ErrorKind::Import);
    assert_eq!(err.exception_type.as_deref(), Some("ModuleNotFoundError"));
    assert!(err.message.contains("No module named 'requests'"));
    for module in ["math", "json", "random", "time", "re", "os", "web"] {
        assert!(err.message.contains(module), "missing {module}: {}", err.message);
    }
}

#[test]
fn import_error_is_catchable() {
    let source = r#"
try:
    import not_a_module
except ImportError:
    result = "caught"
result
"#;
    assert_eq!(run_ok(source), Object::Str("caught".to_owned()));
}

#[test]
fn io_errors_are_catchable_and_classified() {
    let source = r#"
try:
    open("missing.txt")
except FileNotFoundError as e:
    result = "caught: " + str(e)
result
"#;
    let Object::Str(message) = run_ok(source) else { panic!() };
    assert!(message.contains("missing.txt"));

    let err = run_err("open('missing.txt')\n");
    assert_eq!(err.kind, ErrorKind::Io);
    assert_eq!(err.exception_type.as_deref(), Some("FileNotFoundError"));
}

#[test]
fn timeout_is_never_catchable() {
    let ctx = Ctx::new(CtxOptions {
        timeout_ms: 50,
        ..CtxOptions::default()
    });
    let source = r#"
try:
    while True:
        pass
except Exception:
    result = "caught"
result
"#;
    match run(source, Some(ctx)) {
        RunOutcome::Error(record) => {
            assert_eq!(record.kind, ErrorKind::Timeout);
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[test]
fn timeout_reaches_into_generators() {
    let ctx = Ctx::new(CtxOptions {
        timeout_ms: 50,
        ..CtxOptions::default()
    });
    let source = r#"
def spin():
    while True:
        pass
    yield 1

next(iter(spin()))
"#;
    match run(source, Some(ctx)) {
        RunOutcome::Error(record) => assert_eq!(record.kind, ErrorKind::Timeout),
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[test]
fn key_error_carries_the_key_repr() {
    let err = run_err("d = {'a': 1}\nd['b']\n");
    assert_eq!(err.exception_type.as_deref(), Some("KeyError"));
    assert_eq!(err.message, "'b'");
}

#[test]
fn index_error_message() {
    let err = run_err("[1, 2][5]\n");
    assert_eq!(err.exception_type.as_deref(), Some("IndexError"));
    assert!(err.message.contains("list index out of range"));
}

#[test]
fn zero_division_message() {
    let err = run_err("1 // 0\n");
    assert_eq!(err.exception_type.as_deref(), Some("ZeroDivisionError"));
}

#[test]
fn user_defined_exception_classes() {
    let source = r#"
class AppError(Exception):
    pass

class NotFound(AppError):
    pass

try:
    raise NotFound("missing widget")
except AppError as e:
    result = [type(e).__name__, str(e), isinstance(e, Exception)]
result
"#;
    assert_eq!(
        run_ok(source),
        Object::List(vec![
            Object::Str("NotFound".to_owned()),
            Object::Str("missing widget".to_owned()),
            Object::Bool(true),
        ])
    );
}

#[test]
fn uncaught_user_exception_surfaces_class_name() {
    let source = r#"
class CustomError(Exception):
    pass

raise CustomError("custom detail")
"#;
    let err = run_err(source);
    assert_eq!(err.exception_type.as_deref(), Some("CustomError"));
    assert_eq!(err.message, "custom detail");
    assert_eq!(err.line, Some(5));
}

#[test]
fn exception_args_tuple() {
    let source = r#"
e = ValueError("a", 2)
[list(e.args), str(e)]
"#;
    assert_eq!(
        run_ok(source),
        Object::List(vec![
            Object::List(vec![Object::Str("a".to_owned()), Object::Int(2)]),
            Object::Str("('a', 2)".to_owned()),
        ])
    );
}

#[test]
fn no_crash_on_garbage_inputs() {
    let inputs = [
        "",
        "\n\n\n",
        ")(",
        "def",
        "def f(",
        "class :",
        "x ===== 3",
        "if True:\nelse:",
        "\u{0}\u{1}\u{2}",
        "🦀🦀🦀",
        "'unterminated",
        "\"\"\"also unterminated",
        "x = ((((((((((",
        "lambda lambda lambda",
        "try:\n    pass\n",
        "yield 5\n",
        "import \n",
        "@\n@\ndef f(): pass\n",
        "match match match:",
        "0x",
        "1__2",
        "f'{'",
        "del\n",
        "global\n",
        "while:\n",
        "a.b.c.d.e.",
        "[1, 2,\n",
    ];
    for source in inputs {
        // any outcome shape is acceptable, panicking is not
        let _ = run(source, None);
    }
}
