//! The request dispatcher.
//!
//! Boots a script once, locates the `app` binding, and matches incoming
//! requests against its registered routes: path-parameter coercion,
//! `request` object binding, pydantic-style body models, response envelope
//! normalisation, streaming with per-chunk budget pause, and per-response
//! telemetry.

use std::{
    sync::{Arc, Mutex},
    time::Instant,
};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    ctx::{Ctx, CtxCounters, CtxOptions, Telemetry},
    env::Frame,
    errors::{ErrorKind, ErrorRecord},
    eval::Evaluator,
    exceptions::{RunError, RunResult},
    object::Object,
    parse::parse,
    value::{AttrTable, ClassValue, DictData, InstanceValue, Key, Value, plock},
};

/// An incoming request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub headers: IndexMap<String, String>,
    #[serde(default)]
    pub query_params: IndexMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
}

impl Request {
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new("GET", path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>, body: impl Into<String>) -> Self {
        let mut request = Self::new("POST", path);
        request.body = Some(body.into());
        request
    }

    #[must_use]
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            headers: IndexMap::new(),
            query_params: IndexMap::new(),
            body: None,
        }
    }
}

/// A finished (non-streaming) response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    pub headers: IndexMap<String, String>,
    pub body: Object,
    pub telemetry: Telemetry,
}

/// A streaming response: status/headers plus a lazy chunk sequence whose
/// consumption drives the underlying producer one yield at a time.
pub struct StreamingResponse {
    pub status: u16,
    pub headers: IndexMap<String, String>,
    pub chunks: ChunkStream,
    ctx: Ctx,
    baseline: CtxCounters,
    started: Instant,
}

impl StreamingResponse {
    /// Telemetry so far; compute excludes time spent suspended between chunks.
    #[must_use]
    pub fn telemetry(&self) -> Telemetry {
        self.ctx.telemetry_since(&self.baseline, self.started)
    }
}

impl std::fmt::Debug for StreamingResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Lazy chunk source backing a [`StreamingResponse`].
///
/// Dropping the stream early disconnects the producer, which unwinds and
/// releases its resources before computing another value.
pub struct ChunkStream {
    source: ChunkSource,
    ctx: Ctx,
    pending_error: Option<String>,
    done: bool,
}

enum ChunkSource {
    Generator(Value),
    Items(std::vec::IntoIter<String>),
}

impl Iterator for ChunkStream {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.done {
            return None;
        }
        if let Some(detail) = self.pending_error.take() {
            self.done = true;
            return Some(detail);
        }
        match &mut self.source {
            ChunkSource::Items(items) => match items.next() {
                Some(chunk) => Some(chunk),
                None => {
                    self.done = true;
                    None
                }
            },
            ChunkSource::Generator(generator_value) => {
                let Value::Generator(generator) = generator_value else {
                    self.done = true;
                    return None;
                };
                // the budget only runs while the producer does
                self.ctx.clock_resume();
                let step = generator.next();
                self.ctx.clock_pause();
                match step {
                    Ok(Some(value)) => {
                        let mut ev = Evaluator::new(self.ctx.clone());
                        Some(ev.str_value(&value).unwrap_or_default())
                    }
                    Ok(None) => {
                        self.done = true;
                        None
                    }
                    Err(err) => {
                        // a producer-side failure becomes a trailing detail chunk
                        self.done = true;
                        Some(error_chunk(&err))
                    }
                }
            }
        }
    }
}

fn error_chunk(err: &RunError) -> String {
    let record = ErrorRecord::from(err.clone());
    let detail = match &record.exception_type {
        Some(exc_type) => format!("{exc_type}: {}", record.message),
        None => record.message.clone(),
    };
    serde_json::json!({ "detail": detail }).to_string()
}

/// One compiled route.
#[derive(Debug)]
struct Route {
    method: String,
    segments: Vec<Segment>,
    handler: Value,
}

#[derive(Debug)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A booted application: the evaluated script's context plus its compiled
/// route table. `handle` mutates the context in place (the Rust rendering of
/// the handle-returns-updated-app contract).
pub struct AppHandle {
    ctx: Ctx,
    routes: Vec<Route>,
    module_frame: Arc<Frame>,
    web: WebClasses,
}

impl std::fmt::Debug for AppHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppHandle")
            .field("routes", &self.routes.len())
            .finish_non_exhaustive()
    }
}

/// Response/request classes resolved from the `web` module at boot, matched
/// by class identity when normalising handler results.
#[derive(Debug, Default)]
struct WebClasses {
    html_response: Option<Arc<ClassValue>>,
    json_response: Option<Arc<ClassValue>>,
    streaming_response: Option<Arc<ClassValue>>,
    request: Option<Arc<ClassValue>>,
}

/// Boots a script: evaluates it top-to-bottom once and compiles the route
/// table of its `app` binding.
pub fn boot(source: &str, options: CtxOptions) -> Result<AppHandle, ErrorRecord> {
    let ctx = Ctx::new(options);
    let stmts = parse(source).map_err(ErrorRecord::from)?;
    let frame = Frame::module();
    let mut ev = Evaluator::new(ctx.clone());
    ctx.clock_resume();
    let result = ev.run_module(&stmts, &frame);
    ctx.clock_pause();
    match result {
        Ok(_) => {}
        Err(RunError::Suspend) => {
            return Err(ErrorRecord {
                kind: ErrorKind::Python,
                exception_type: Some("RuntimeError".to_owned()),
                message: "suspend() is not supported during boot".to_owned(),
                line: None,
            });
        }
        Err(err) => return Err(err.into()),
    }

    let Some(app) = frame.get_local("app") else {
        return Err(ErrorRecord {
            kind: ErrorKind::Python,
            exception_type: Some("RuntimeError".to_owned()),
            message: "script defines no 'app' binding; create one with web.App()".to_owned(),
            line: None,
        });
    };
    let routes = extract_routes(&mut ev, &app)?;
    let web = resolve_web_classes(&ctx);
    Ok(AppHandle {
        ctx,
        routes,
        module_frame: frame,
        web,
    })
}

fn extract_routes(ev: &mut Evaluator, app: &Value) -> Result<Vec<Route>, ErrorRecord> {
    let invalid_app = || ErrorRecord {
        kind: ErrorKind::Python,
        exception_type: Some("TypeError".to_owned()),
        message: "'app' is not a web application object (missing __routes__)".to_owned(),
        line: None,
    };
    let routes_value = ev.get_attr(app, "__routes__", 0).map_err(|_| invalid_app())?;
    let Value::List(entries) = &routes_value else {
        return Err(invalid_app());
    };
    let entries = plock(entries).clone();
    let mut routes = Vec::with_capacity(entries.len());
    for entry in &entries {
        let Value::Dict(record) = entry else {
            return Err(invalid_app());
        };
        let record = plock(record).clone();
        let get = |name: &str| -> Option<Value> {
            let key = Key::new(Value::str(name.to_owned())).ok()?;
            record.get(&key).cloned()
        };
        let (Some(Value::Str(method)), Some(Value::Str(path)), Some(handler)) =
            (get("method"), get("path"), get("handler"))
        else {
            return Err(invalid_app());
        };
        routes.push(Route {
            method: method.to_uppercase(),
            segments: compile_template(&path),
            handler,
        });
    }
    Ok(routes)
}

fn compile_template(template: &str) -> Vec<Segment> {
    template
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|part| {
            match part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                Some(name) => Segment::Param(name.to_owned()),
                None => Segment::Literal(part.to_owned()),
            }
        })
        .collect()
}

fn resolve_web_classes(ctx: &Ctx) -> WebClasses {
    let loaded = plock(&ctx.inner.loaded_modules);
    let Some(Value::Module(web)) = loaded.get("web") else {
        return WebClasses::default();
    };
    let namespace = plock(&web.namespace);
    let class_named = |name: &str| -> Option<Arc<ClassValue>> {
        match namespace.get(name) {
            Some(Value::Class(class)) => Some(class.clone()),
            _ => None,
        }
    };
    WebClasses {
        html_response: class_named("HTMLResponse"),
        json_response: class_named("JSONResponse"),
        streaming_response: class_named("StreamingResponse"),
        request: class_named("Request"),
    }
}

/// Handles one request to completion, materialising streaming bodies.
pub fn handle(app: &mut AppHandle, request: &Request) -> Result<Response, ErrorRecord> {
    let started = Instant::now();
    let baseline = app.ctx.counters();
    let outcome = dispatch(app, request)?;
    let ctx = app.ctx.clone();
    match outcome {
        Dispatched::Plain {
            status,
            mut headers,
            body,
        } => {
            headers
                .entry("content-type".to_owned())
                .or_insert_with(|| "application/json".to_owned());
            Ok(Response {
                status,
                headers,
                body,
                telemetry: ctx.telemetry_since(&baseline, started),
            })
        }
        Dispatched::Stream(stream) => {
            // plain handle() drains the stream into a single body
            let mut collected = String::new();
            let status = stream.status;
            let headers = stream.headers.clone();
            for chunk in stream.chunks {
                collected.push_str(&chunk);
            }
            Ok(Response {
                status,
                headers,
                body: Object::Str(collected),
                telemetry: ctx.telemetry_since(&baseline, started),
            })
        }
    }
}

/// Handles one request, keeping a streaming body lazy: chunks are produced as
/// the caller pulls them, with the budget paused in between.
pub fn handle_stream(app: &mut AppHandle, request: &Request) -> Result<StreamingResponse, ErrorRecord> {
    let started = Instant::now();
    let baseline = app.ctx.counters();
    let outcome = dispatch(app, request)?;
    let ctx = app.ctx.clone();
    match outcome {
        Dispatched::Stream(mut stream) => {
            stream.baseline = baseline;
            stream.started = started;
            Ok(stream)
        }
        Dispatched::Plain { status, mut headers, body } => {
            headers
                .entry("content-type".to_owned())
                .or_insert_with(|| "application/json".to_owned());
            let chunk = match body {
                Object::Str(s) => s,
                other => other.to_json().to_string(),
            };
            Ok(StreamingResponse {
                status,
                headers,
                chunks: ChunkStream {
                    source: ChunkSource::Items(vec![chunk].into_iter()),
                    ctx: ctx.clone(),
                    pending_error: None,
                    done: false,
                },
                ctx,
                baseline,
                started,
            })
        }
    }
}

/// One-shot convenience: boot + handle with a fresh default context.
pub fn invoke(source: &str, request: &Request) -> Result<Response, ErrorRecord> {
    let mut app = boot(source, CtxOptions::default())?;
    handle(&mut app, request)
}

enum Dispatched {
    Plain {
        status: u16,
        headers: IndexMap<String, String>,
        body: Object,
    },
    Stream(StreamingResponse),
}

fn dispatch(app: &mut AppHandle, request: &Request) -> Result<Dispatched, ErrorRecord> {
    let method = request.method.to_uppercase();
    let path_segments: Vec<&str> = request.path.split('/').filter(|s| !s.is_empty()).collect();

    let mut matched: Option<(Value, IndexMap<String, String>)> = None;
    for route in &app.routes {
        if route.method != method || route.segments.len() != path_segments.len() {
            continue;
        }
        let mut params = IndexMap::new();
        let mut is_match = true;
        for (segment, actual) in route.segments.iter().zip(&path_segments) {
            match segment {
                Segment::Literal(expected) => {
                    if expected != actual {
                        is_match = false;
                        break;
                    }
                }
                Segment::Param(name) => {
                    params.insert(name.clone(), (*actual).to_owned());
                }
            }
        }
        if is_match {
            matched = Some((route.handler.clone(), params));
            break;
        }
    }

    let Some((handler, params)) = matched else {
        return Err(ErrorRecord::route_not_found(&method, &request.path));
    };

    let ctx = app.ctx.clone();
    let mut ev = Evaluator::new(ctx.clone());
    ctx.clock_resume();
    let result = invoke_handler(&mut ev, app, &handler, &params, request);
    ctx.clock_pause();

    match result {
        Ok(value) => normalise_response(&mut ev, app, value),
        Err(HandlerError::Fatal(record)) => Err(record),
        Err(HandlerError::Status(status, detail)) => Ok(Dispatched::Plain {
            status,
            headers: IndexMap::new(),
            body: Object::Dict(vec![(Object::Str("detail".to_owned()), Object::Str(detail))]),
        }),
    }
}

enum HandlerError {
    /// Surfaced to the host as an error (timeouts, internal faults).
    Fatal(ErrorRecord),
    /// Becomes an error-status response with a detail body.
    Status(u16, String),
}

fn invoke_handler(
    ev: &mut Evaluator,
    app: &AppHandle,
    handler: &Value,
    params: &IndexMap<String, String>,
    request: &Request,
) -> Result<Value, HandlerError> {
    let mut kwargs: Vec<(String, Value)> = Vec::new();
    let Value::Function(func) = handler else {
        return Err(HandlerError::Fatal(ErrorRecord {
            kind: ErrorKind::Python,
            exception_type: Some("TypeError".to_owned()),
            message: "route handler is not a function".to_owned(),
            line: None,
        }));
    };

    for param in &func.params.args {
        let name = &*param.name;
        let annotation = func
            .annotations
            .iter()
            .find(|(n, _)| &**n == name)
            .map(|(_, a)| a.to_string());

        if let Some(raw) = params.get(name) {
            let value = coerce_path_param(raw, annotation.as_deref())
                .map_err(|detail| HandlerError::Status(422, detail))?;
            kwargs.push((name.to_owned(), value));
            continue;
        }
        if name == "request" {
            let value = build_request_object(ev, app, request).map_err(runtime_fatal)?;
            kwargs.push((name.to_owned(), value));
            continue;
        }
        if let Some(annotation) = &annotation {
            if let Some(model) = resolve_model_class(app, annotation) {
                let value = bind_body_model(ev, &model, request)?;
                kwargs.push((name.to_owned(), value));
                continue;
            }
        }
        // remaining parameters fall back to their defaults (bind_args errors
        // out with the canonical TypeError when there is none)
    }

    match ev.call_value(handler, Vec::new(), kwargs, 0) {
        Ok(value) => Ok(value),
        Err(RunError::Raise(raised)) => Err(HandlerError::Status(
            500,
            format!("{}: {}", raised.type_name, raised.message),
        )),
        Err(err) => Err(HandlerError::Fatal(err.into())),
    }
}

fn runtime_fatal(err: RunError) -> HandlerError {
    HandlerError::Fatal(err.into())
}

/// Path parameters: annotated `int` must parse; unannotated values coerce to
/// int when they parse cleanly, otherwise stay strings.
fn coerce_path_param(raw: &str, annotation: Option<&str>) -> Result<Value, String> {
    match annotation {
        Some("int") => raw
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| format!("path parameter '{raw}' is not a valid integer")),
        Some("str") => Ok(Value::str(raw.to_owned())),
        Some("float") => raw
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| format!("path parameter '{raw}' is not a valid number")),
        _ => match raw.parse::<i64>() {
            Ok(i) => Ok(Value::Int(i)),
            Err(_) => Ok(Value::str(raw.to_owned())),
        },
    }
}

fn string_dict(entries: &IndexMap<String, String>) -> RunResult<Value> {
    let mut data = DictData::default();
    for (name, value) in entries {
        data.insert(Key::new(Value::str(name.clone()))?, Value::str(value.clone()));
    }
    Ok(Value::dict(data))
}

fn build_request_object(ev: &mut Evaluator, app: &AppHandle, request: &Request) -> RunResult<Value> {
    let mut attrs = AttrTable::default();
    attrs.insert(Arc::from("method"), Value::str(request.method.to_uppercase()));
    attrs.insert(Arc::from("path"), Value::str(request.path.clone()));
    attrs.insert(Arc::from("headers"), string_dict(&request.headers)?);
    attrs.insert(Arc::from("query_params"), string_dict(&request.query_params)?);
    attrs.insert(
        Arc::from("body"),
        match &request.body {
            Some(body) => Value::str(body.clone()),
            None => Value::None,
        },
    );
    let class = match &app.web.request {
        Some(class) => class.clone(),
        None => {
            // ensure the web module (and its Request class) exists
            ev.import_module("web", 0)?;
            resolve_web_classes(&ev.ctx)
                .request
                .ok_or_else(|| RunError::runtime_error("web module has no Request class"))?
        }
    };
    Ok(Value::Instance(Arc::new(InstanceValue {
        class,
        attrs: Mutex::new(attrs),
    })))
}

fn resolve_model_class(app: &AppHandle, annotation: &str) -> Option<Arc<ClassValue>> {
    match app.module_frame.get_local(annotation) {
        Some(Value::Class(class)) => Some(class),
        _ => None,
    }
}

/// Parses and validates an annotated body model from the request body.
fn bind_body_model(ev: &mut Evaluator, model: &Arc<ClassValue>, request: &Request) -> Result<Value, HandlerError> {
    let Some(body) = &request.body else {
        return Err(HandlerError::Status(
            422,
            format!("request body required for {}", model.name),
        ));
    };
    let parsed: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| HandlerError::Status(422, format!("invalid JSON body: {e}")))?;
    let serde_json::Value::Object(entries) = &parsed else {
        return Err(HandlerError::Status(
            422,
            format!("request body for {} must be a JSON object", model.name),
        ));
    };

    let mut attrs = AttrTable::default();
    for (field, annotation) in &model.annotations {
        let Some(raw) = entries.get(&**field) else {
            return Err(HandlerError::Status(
                422,
                format!("field '{field}' is required for {}", model.name),
            ));
        };
        let value = crate::modules::json_mod::from_json(raw).map_err(runtime_fatal)?;
        let coerced = coerce_field(&value, annotation).map_err(|detail| {
            HandlerError::Status(422, format!("field '{field}' of {}: {detail}", model.name))
        })?;
        attrs.insert(field.clone(), coerced);
    }
    // extra keys pass through permissively
    for (name, raw) in entries {
        if !model.annotations.iter().any(|(field, _)| &**field == name) {
            let value = crate::modules::json_mod::from_json(raw).map_err(runtime_fatal)?;
            attrs.insert(Arc::from(name.as_str()), value);
        }
    }
    let _ = ev;
    Ok(Value::Instance(Arc::new(InstanceValue {
        class: model.clone(),
        attrs: Mutex::new(attrs),
    })))
}

/// Coerces a declared primitive field type.
fn coerce_field(value: &Value, annotation: &str) -> Result<Value, String> {
    match annotation {
        "int" => match value {
            Value::Int(_) | Value::BigInt(_) => Ok(value.clone()),
            Value::Float(f) if f.fract() == 0.0 => Ok(Value::Int(*f as i64)),
            Value::Str(s) => s.parse::<i64>().map(Value::Int).map_err(|_| "expected an integer".to_owned()),
            _ => Err("expected an integer".to_owned()),
        },
        "float" => match value {
            Value::Float(_) => Ok(value.clone()),
            Value::Int(i) => Ok(Value::Float(*i as f64)),
            Value::Str(s) => s
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| "expected a number".to_owned()),
            _ => Err("expected a number".to_owned()),
        },
        "str" => match value {
            Value::Str(_) => Ok(value.clone()),
            _ => Err("expected a string".to_owned()),
        },
        "bool" => match value {
            Value::Bool(_) => Ok(value.clone()),
            _ => Err("expected a boolean".to_owned()),
        },
        _ => Ok(value.clone()),
    }
}

/// Normalises a handler result into the response envelope.
fn normalise_response(ev: &mut Evaluator, app: &AppHandle, value: Value) -> Result<Dispatched, ErrorRecord> {
    let instance_of = |class: &Option<Arc<ClassValue>>, value: &Value| -> bool {
        match (class, value) {
            (Some(class), Value::Instance(inst)) => inst.class.is_subclass(class),
            _ => false,
        }
    };

    let attr = |inst: &Value, name: &str| -> Option<Value> {
        let Value::Instance(inst) = inst else { return None };
        plock(&inst.attrs).get(name).cloned()
    };
    let status_of = |inst: &Value| -> u16 {
        attr(inst, "status")
            .and_then(|v| v.as_index())
            .and_then(|v| u16::try_from(v).ok())
            .unwrap_or(200)
    };

    if instance_of(&app.web.html_response, &value) {
        let content = attr(&value, "content").unwrap_or(Value::None);
        let body = Object::Str(ev.str_value(&content).map_err(ErrorRecord::from)?);
        let mut headers = IndexMap::new();
        headers.insert("content-type".to_owned(), "text/html".to_owned());
        return Ok(Dispatched::Plain {
            status: status_of(&value),
            headers,
            body,
        });
    }

    if instance_of(&app.web.json_response, &value) {
        let content = attr(&value, "content").unwrap_or(Value::None);
        let mut headers = IndexMap::new();
        headers.insert("content-type".to_owned(), "application/json".to_owned());
        return Ok(Dispatched::Plain {
            status: status_of(&value),
            headers,
            body: ev.to_object(&content),
        });
    }

    if instance_of(&app.web.streaming_response, &value) {
        let content = attr(&value, "content").unwrap_or(Value::None);
        let media_type = match attr(&value, "media_type") {
            Some(Value::Str(s)) => s.to_string(),
            _ => "text/plain".to_owned(),
        };
        let mut headers = IndexMap::new();
        headers.insert("content-type".to_owned(), media_type);
        if let Some(Value::Dict(extra)) = attr(&value, "headers") {
            for (key, header_value) in plock(&extra).iter() {
                if let (Value::Str(name), Value::Str(v)) = (&key.value, header_value) {
                    headers.insert(name.to_string(), v.to_string());
                }
            }
        }
        let source = match &content {
            Value::Generator(_) => ChunkSource::Generator(content.clone()),
            Value::Str(s) => ChunkSource::Items(vec![s.to_string()].into_iter()),
            other => {
                let items = ev.drain_iterable(other, 0).map_err(ErrorRecord::from)?;
                let mut chunks = Vec::with_capacity(items.len());
                for item in &items {
                    chunks.push(ev.str_value(item).map_err(ErrorRecord::from)?);
                }
                ChunkSource::Items(chunks.into_iter())
            }
        };
        let ctx = app.ctx.clone();
        return Ok(Dispatched::Stream(StreamingResponse {
            status: status_of(&value),
            headers,
            chunks: ChunkStream {
                source,
                ctx: ctx.clone(),
                pending_error: None,
                done: false,
            },
            ctx: ctx.clone(),
            baseline: ctx.counters(),
            started: Instant::now(),
        }));
    }

    // plain values (mappings and friends): 200 application/json
    Ok(Dispatched::Plain {
        status: 200,
        headers: IndexMap::new(),
        body: ev.to_object(&value),
    })
}
