//! pyrite: a sandboxed, embeddable interpreter for a Python subset.
//!
//! An LLM-authored script runs inside the host process with deterministic
//! resource accounting (wall-clock budget, compute time, file-op counters),
//! a replayable event log enabling cooperative suspension (`suspend()`) and
//! deterministic resumption, true lazy generators (thread-per-generator
//! rendezvous with strict back-pressure), and a request dispatcher that maps
//! decorated route handlers to incoming method+path pairs, including
//! incremental streaming responses.
//!
//! # Example
//! ```
//! use pyrite::{run, Object, RunOutcome};
//!
//! let outcome = run("x = 40\nx + 2\n", None);
//! let RunOutcome::Ok { value, .. } = outcome else { panic!("run failed") };
//! assert_eq!(value, Object::Int(42));
//! ```

mod api;
mod builtins;
mod ctx;
mod dispatch;
mod env;
mod errors;
mod eval;
mod exceptions;
mod expressions;
mod fs;
mod fstring;
mod generator;
mod lex;
mod modules;
mod object;
mod parse;
mod types;
mod value;

pub use crate::{
    api::{RunOutcome, resume, run},
    ctx::{Ctx, CtxOptions, Event, EventKind, EventPayload, Telemetry},
    dispatch::{AppHandle, ChunkStream, Request, Response, StreamingResponse, boot, handle, handle_stream, invoke},
    errors::{ErrorKind, ErrorRecord},
    exceptions::ExcType,
    fs::{FileSystem, FsError, MemoryFs, WriteMode},
    modules::{HostFunction, HostKwFunction, ModuleDef, ModuleEntry, ModuleNamespace},
    object::Object,
    parse::ParseError,
};
