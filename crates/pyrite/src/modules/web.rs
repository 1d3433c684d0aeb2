//! The bundled web layer consumed by the request dispatcher.
//!
//! The module is bootstrapped through the interpreter itself: a small prelude
//! script defines `App`, the response classes, `Request`, and `BaseModel`,
//! and its module bindings become the importable namespace. The dispatcher
//! later recognises response values by class identity through the Ctx's
//! loaded-module cache.

use crate::{
    env::Frame,
    eval::Evaluator,
    exceptions::{RunError, RunResult},
    parse::parse,
    value::AttrTable,
};

/// The prelude source evaluated once per Ctx on first `import web`.
pub(crate) const PRELUDE: &str = r#"
class BaseModel:
    pass


class Request:
    def json(self):
        import json
        if self.body is None:
            raise ValueError("request has no body")
        return json.loads(self.body)


class HTMLResponse:
    def __init__(self, content, status=200):
        self.content = content
        self.status = status


class JSONResponse:
    def __init__(self, content, status=200):
        self.content = content
        self.status = status


class StreamingResponse:
    def __init__(self, content, media_type="text/plain", status=200, headers=None):
        self.content = content
        self.media_type = media_type
        self.status = status
        self.headers = headers or {}


class App:
    def __init__(self):
        self.__routes__ = []

    def route(self, method, path):
        def register(handler):
            self.__routes__.append({"method": method, "path": path, "handler": handler})
            return handler
        return register

    def get(self, path):
        return self.route("GET", path)

    def post(self, path):
        return self.route("POST", path)

    def put(self, path):
        return self.route("PUT", path)

    def delete(self, path):
        return self.route("DELETE", path)
"#;

pub(crate) fn namespace(ev: &mut Evaluator) -> RunResult<AttrTable> {
    let stmts = parse(PRELUDE)
        .map_err(|e| RunError::runtime_error(format!("web module prelude failed to parse: {e}")))?;
    let frame = Frame::module();
    let mut sub = Evaluator::new(ev.ctx.clone());
    sub.run_module(&stmts, &frame)?;
    let mut table = AttrTable::default();
    for (name, value) in frame.bindings() {
        table.insert(name, value);
    }
    Ok(table)
}
