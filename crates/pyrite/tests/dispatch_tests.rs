//! Request dispatcher: routing, parameter binding, envelopes, streaming.

use pretty_assertions::assert_eq;
use pyrite::{CtxOptions, ErrorKind, Object, Request, boot, handle, handle_stream, invoke};

const POSTS_APP: &str = r#"
import web

app = web.App()

@app.get("/users/{user_id}/posts/{post_id}")
def get_post(user_id, post_id):
    return {"user": user_id, "post": post_id}

@app.get("/health")
def health():
    return {"ok": True}
"#;

fn dict_get<'a>(body: &'a Object, key: &str) -> Option<&'a Object> {
    let Object::Dict(pairs) = body else { return None };
    pairs
        .iter()
        .find(|(k, _)| matches!(k, Object::Str(s) if s == key))
        .map(|(_, v)| v)
}

#[test]
fn multi_param_path_with_int_coercion() {
    let mut app = boot(POSTS_APP, CtxOptions::default()).expect("boot failed");
    let response = handle(&mut app, &Request::get("/users/5/posts/99")).expect("handle failed");
    assert_eq!(response.status, 200);
    assert_eq!(dict_get(&response.body, "user"), Some(&Object::Int(5)));
    assert_eq!(dict_get(&response.body, "post"), Some(&Object::Int(99)));
    assert_eq!(
        response.headers.get("content-type").map(String::as_str),
        Some("application/json")
    );
}

#[test]
fn string_path_params_stay_strings() {
    let source = r#"
import web

app = web.App()

@app.get("/files/{name}")
def get_file(name):
    return {"name": name}
"#;
    let mut app = boot(source, CtxOptions::default()).expect("boot failed");
    let response = handle(&mut app, &Request::get("/files/report.txt")).expect("handle failed");
    assert_eq!(
        dict_get(&response.body, "name"),
        Some(&Object::Str("report.txt".to_owned()))
    );
}

#[test]
fn annotated_int_param_rejects_non_numeric() {
    let source = r#"
import web

app = web.App()

@app.get("/items/{item_id}")
def get_item(item_id: int):
    return {"id": item_id}
"#;
    let mut app = boot(source, CtxOptions::default()).expect("boot failed");
    let ok = handle(&mut app, &Request::get("/items/7")).expect("handle failed");
    assert_eq!(dict_get(&ok.body, "id"), Some(&Object::Int(7)));
    let bad = handle(&mut app, &Request::get("/items/abc")).expect("handle failed");
    assert_eq!(bad.status, 422);
}

#[test]
fn routes_match_in_declaration_order() {
    let source = r#"
import web

app = web.App()

@app.get("/items/{kind}")
def by_kind(kind):
    return {"handler": "kind"}

@app.get("/items/special")
def special():
    return {"handler": "special"}
"#;
    let mut app = boot(source, CtxOptions::default()).expect("boot failed");
    // the parameterised route was declared first, so it wins
    let response = handle(&mut app, &Request::get("/items/special")).expect("handle failed");
    assert_eq!(
        dict_get(&response.body, "handler"),
        Some(&Object::Str("kind".to_owned()))
    );
}

#[test]
fn no_route_is_structured_404() {
    let mut app = boot(POSTS_APP, CtxOptions::default()).expect("boot failed");
    let err = handle(&mut app, &Request::get("/missing")).expect_err("expected no route");
    assert_eq!(err.kind, ErrorKind::RouteNotFound);
    assert!(err.message.contains("GET"));
    assert!(err.message.contains("/missing"));
    // method mismatch on an existing path is also a 404
    let err = handle(&mut app, &Request::new("POST", "/health")).expect_err("expected no route");
    assert_eq!(err.kind, ErrorKind::RouteNotFound);
}

#[test]
fn handler_exception_becomes_500_detail() {
    let source = r#"
import web

app = web.App()

@app.get("/boom")
def boom():
    raise ValueError("kaput")
"#;
    let mut app = boot(source, CtxOptions::default()).expect("boot failed");
    let response = handle(&mut app, &Request::get("/boom")).expect("handle failed");
    assert_eq!(response.status, 500);
    assert_eq!(
        dict_get(&response.body, "detail"),
        Some(&Object::Str("ValueError: kaput".to_owned()))
    );
}

#[test]
fn html_and_json_response_envelopes() {
    let source = r#"
import web

app = web.App()

@app.get("/page")
def page():
    return web.HTMLResponse("<h1>hi</h1>")

@app.get("/teapot")
def teapot():
    return web.JSONResponse({"steeping": True}, status=418)
"#;
    let mut app = boot(source, CtxOptions::default()).expect("boot failed");

    let page = handle(&mut app, &Request::get("/page")).expect("handle failed");
    assert_eq!(page.status, 200);
    assert_eq!(page.headers.get("content-type").map(String::as_str), Some("text/html"));
    assert_eq!(page.body, Object::Str("<h1>hi</h1>".to_owned()));

    let teapot = handle(&mut app, &Request::get("/teapot")).expect("handle failed");
    assert_eq!(teapot.status, 418);
    assert_eq!(dict_get(&teapot.body, "steeping"), Some(&Object::Bool(true)));
}

#[test]
fn request_object_binding() {
    let source = r#"
import web

app = web.App()

@app.post("/echo")
def echo(request):
    return {
        "method": request.method,
        "path": request.path,
        "q": request.query_params.get("q"),
        "agent": request.headers.get("user-agent"),
        "parsed": request.json(),
    }
"#;
    let mut app = boot(source, CtxOptions::default()).expect("boot failed");
    let mut request = Request::post("/echo", r#"{"n": 3}"#);
    request.query_params.insert("q".to_owned(), "find".to_owned());
    request.headers.insert("user-agent".to_owned(), "test".to_owned());
    let response = handle(&mut app, &request).expect("handle failed");
    assert_eq!(dict_get(&response.body, "method"), Some(&Object::Str("POST".to_owned())));
    assert_eq!(dict_get(&response.body, "q"), Some(&Object::Str("find".to_owned())));
    assert_eq!(dict_get(&response.body, "agent"), Some(&Object::Str("test".to_owned())));
    let parsed = dict_get(&response.body, "parsed").expect("missing parsed");
    assert_eq!(dict_get(parsed, "n"), Some(&Object::Int(3)));
}

#[test]
fn body_model_binding_validates_and_coerces() {
    let source = r#"
import web

app = web.App()

class Item(web.BaseModel):
    name: str
    price: float

@app.post("/items")
def create(item: Item):
    return {"name": item.name, "price": item.price, "doubled": item.price * 2}
"#;
    let mut app = boot(source, CtxOptions::default()).expect("boot failed");

    let ok = handle(&mut app, &Request::post("/items", r#"{"name": "gem", "price": 3}"#)).expect("handle failed");
    assert_eq!(ok.status, 200);
    assert_eq!(dict_get(&ok.body, "name"), Some(&Object::Str("gem".to_owned())));
    assert_eq!(dict_get(&ok.body, "price"), Some(&Object::Float(3.0)));
    assert_eq!(dict_get(&ok.body, "doubled"), Some(&Object::Float(6.0)));

    let missing = handle(&mut app, &Request::post("/items", r#"{"name": "gem"}"#)).expect("handle failed");
    assert_eq!(missing.status, 422);
    let bad_type = handle(&mut app, &Request::post("/items", r#"{"name": 7, "price": 1}"#)).expect("handle failed");
    assert_eq!(bad_type.status, 422);
}

#[test]
fn streaming_html_table() {
    let source = r#"
import web

app = web.App()

@app.get("/table")
def table():
    def rows():
        yield "<table>"
        for r in range(3):
            yield "<tr>"
            for c in range(4):
                yield f"<td>{r * 4 + c}</td>"
            yield "</tr>"
        yield "</table>"
    return web.StreamingResponse(rows(), media_type="text/html")
"#;
    let mut app = boot(source, CtxOptions::default()).expect("boot failed");
    let response = handle_stream(&mut app, &Request::get("/table")).expect("handle_stream failed");
    assert_eq!(response.status, 200);
    assert_eq!(
        response.headers.get("content-type").map(String::as_str),
        Some("text/html")
    );

    // taking two chunks drives the producer exactly two yields
    let first_two: Vec<String> = response.chunks.take(2).collect();
    assert_eq!(first_two, vec!["<table>".to_owned(), "<tr>".to_owned()]);
}

#[test]
fn streaming_full_consumption_in_order() {
    let source = r#"
import web

app = web.App()

@app.get("/chunks")
def chunks():
    def produce():
        for i in range(5):
            yield f"chunk-{i};"
    return web.StreamingResponse(produce())
"#;
    let mut app = boot(source, CtxOptions::default()).expect("boot failed");
    let response = handle_stream(&mut app, &Request::get("/chunks")).expect("handle_stream failed");
    let collected: String = response.chunks.collect();
    assert_eq!(collected, "chunk-0;chunk-1;chunk-2;chunk-3;chunk-4;");
}

#[test]
fn streaming_accepts_lists_and_strings() {
    let source = r#"
import web

app = web.App()

@app.get("/list")
def from_list():
    return web.StreamingResponse(["a", "b", "c"])

@app.get("/single")
def from_string():
    return web.StreamingResponse("whole", headers={"x-origin": "test"})
"#;
    let mut app = boot(source, CtxOptions::default()).expect("boot failed");

    let listed = handle_stream(&mut app, &Request::get("/list")).expect("handle_stream failed");
    assert_eq!(listed.chunks.collect::<Vec<_>>(), vec!["a", "b", "c"]);

    let single = handle_stream(&mut app, &Request::get("/single")).expect("handle_stream failed");
    assert_eq!(single.headers.get("x-origin").map(String::as_str), Some("test"));
    assert_eq!(single.chunks.collect::<Vec<_>>(), vec!["whole"]);
}

#[test]
fn streaming_producer_error_becomes_trailing_detail_chunk() {
    let source = r#"
import web

app = web.App()

@app.get("/flaky")
def flaky():
    def produce():
        yield "ok-1"
        raise RuntimeError("stream broke")
    return web.StreamingResponse(produce())
"#;
    let mut app = boot(source, CtxOptions::default()).expect("boot failed");
    let response = handle_stream(&mut app, &Request::get("/flaky")).expect("handle_stream failed");
    let chunks: Vec<String> = response.chunks.collect();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0], "ok-1");
    assert!(chunks[1].contains("detail"), "trailing chunk was: {}", chunks[1]);
    assert!(chunks[1].contains("RuntimeError: stream broke"));
}

#[test]
fn plain_handle_materialises_streams() {
    let source = r#"
import web

app = web.App()

@app.get("/joined")
def joined():
    def produce():
        yield "a"
        yield "b"
    return web.StreamingResponse(produce())
"#;
    let mut app = boot(source, CtxOptions::default()).expect("boot failed");
    let response = handle(&mut app, &Request::get("/joined")).expect("handle failed");
    assert_eq!(response.body, Object::Str("ab".to_owned()));
}

#[test]
fn telemetry_is_attached() {
    let mut app = boot(POSTS_APP, CtxOptions::default()).expect("boot failed");
    let before_events = handle(&mut app, &Request::get("/health")).expect("handle failed");
    assert!(before_events.telemetry.event_count > 0);
    // wall-clock total always covers compute
    assert!(before_events.telemetry.total_us >= before_events.telemetry.compute_us);
}

#[test]
fn state_threads_through_handles() {
    let source = r#"
import web

app = web.App()
hits = []

@app.get("/count")
def count():
    hits.append(1)
    return {"hits": len(hits)}
"#;
    let mut app = boot(source, CtxOptions::default()).expect("boot failed");
    let first = handle(&mut app, &Request::get("/count")).expect("handle failed");
    let second = handle(&mut app, &Request::get("/count")).expect("handle failed");
    assert_eq!(dict_get(&first.body, "hits"), Some(&Object::Int(1)));
    assert_eq!(dict_get(&second.body, "hits"), Some(&Object::Int(2)));
}

#[test]
fn boot_requires_an_app_binding() {
    let err = boot("x = 1\n", CtxOptions::default()).expect_err("expected boot failure");
    assert!(err.message.contains("'app'"));
}

#[test]
fn invoke_is_one_shot_boot_plus_handle() {
    let response = invoke(POSTS_APP, &Request::get("/users/1/posts/2")).expect("invoke failed");
    assert_eq!(response.status, 200);
    assert_eq!(dict_get(&response.body, "user"), Some(&Object::Int(1)));
}

#[test]
fn fastapi_import_suggests_web() {
    let err = boot("import fastapi\napp = 1\n", CtxOptions::default()).expect_err("expected import failure");
    assert_eq!(err.kind, ErrorKind::Import);
    assert!(err.message.contains("No module named 'fastapi'"));
    assert!(err.message.contains("'web'"), "message was: {}", err.message);
    // registered modules are enumerated
    assert!(err.message.contains("math"));
    assert!(err.message.contains("json"));
}
