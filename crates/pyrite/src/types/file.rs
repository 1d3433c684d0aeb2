//! The file object returned by `open()`.
//!
//! Read modes snapshot the contents at open time; write modes buffer locally
//! and flush through the Ctx filesystem on `write()` so every operation is
//! visible to the `file_ops` counter and the event log.

use std::sync::{Arc, Mutex};

use crate::{
    eval::Evaluator,
    exceptions::{ExcType, RunError, RunResult},
    fs::WriteMode,
    value::{FileHandle, FileMode, MethodFn, Value, plock},
};

pub(crate) fn method(name: &str) -> Option<MethodFn> {
    Some(match name {
        "read" => f_read,
        "readline" => f_readline,
        "readlines" => f_readlines,
        "write" => f_write,
        "close" => f_close,
        "__enter__" => f_enter,
        "__exit__" => f_exit,
        _ => return None,
    })
}

/// Opens a path against the Ctx filesystem, producing a file value.
pub(crate) fn open_file(ev: &mut Evaluator, path: &str, mode_text: &str) -> RunResult<Value> {
    let mode = match mode_text {
        "r" | "rt" => FileMode::Read,
        "w" | "wt" => FileMode::Write,
        "a" | "at" => FileMode::Append,
        "rb" | "wb" | "ab" => {
            return Err(RunError::raise(
                ExcType::NotImplementedError,
                "binary file modes are not supported; open files in text mode",
            ));
        }
        other => {
            return Err(RunError::value_error(format!("invalid mode: '{other}'")));
        }
    };
    let contents = match mode {
        FileMode::Read => match ev.ctx.fs_read(path)? {
            Ok(contents) => contents,
            Err(err) => {
                return Err(RunError::raise(ExcType::FileNotFoundError, err.to_string()));
            }
        },
        FileMode::Write | FileMode::Append => String::new(),
    };
    Ok(Value::File(Arc::new(Mutex::new(FileHandle {
        path: path.to_owned(),
        mode,
        closed: false,
        contents,
        cursor: 0,
        buffer: String::new(),
    }))))
}

fn recv_file(recv: &Value) -> RunResult<&Arc<Mutex<FileHandle>>> {
    match recv {
        Value::File(file) => Ok(file),
        other => Err(RunError::type_error(format!(
            "file method called on '{}'",
            other.type_name()
        ))),
    }
}

fn check_open(handle: &FileHandle) -> RunResult<()> {
    if handle.closed {
        return Err(RunError::value_error("I/O operation on closed file"));
    }
    Ok(())
}

fn f_read(_ev: &mut Evaluator, recv: &Value, args: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    let file = recv_file(recv)?;
    let mut handle = plock(file);
    check_open(&handle)?;
    if handle.mode != FileMode::Read {
        return Err(RunError::raise(ExcType::IOError, "file not open for reading"));
    }
    let size = args.first().and_then(Value::as_index);
    let remaining = &handle.contents[handle.cursor..];
    let taken: String = match size {
        Some(n) if n >= 0 => remaining.chars().take(n as usize).collect(),
        _ => remaining.to_owned(),
    };
    handle.cursor += taken.len();
    Ok(Value::str(taken))
}

fn f_readline(_ev: &mut Evaluator, recv: &Value, _a: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    let file = recv_file(recv)?;
    let mut handle = plock(file);
    check_open(&handle)?;
    let remaining = &handle.contents[handle.cursor..];
    let line = match remaining.find('\n') {
        Some(pos) => &remaining[..=pos],
        None => remaining,
    };
    let line = line.to_owned();
    handle.cursor += line.len();
    Ok(Value::str(line))
}

fn f_readlines(_ev: &mut Evaluator, recv: &Value, _a: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    let file = recv_file(recv)?;
    let mut handle = plock(file);
    check_open(&handle)?;
    let remaining = handle.contents[handle.cursor..].to_owned();
    handle.cursor = handle.contents.len();
    let lines: Vec<Value> = remaining.split_inclusive('\n').map(Value::str).collect();
    Ok(Value::list(lines))
}

fn f_write(ev: &mut Evaluator, recv: &Value, args: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    let file = recv_file(recv)?;
    let (path, mode, written) = {
        let mut handle = plock(file);
        check_open(&handle)?;
        if handle.mode == FileMode::Read {
            return Err(RunError::raise(ExcType::IOError, "file not open for writing"));
        }
        let Some(Value::Str(text)) = args.first() else {
            return Err(RunError::type_error("write() argument must be str"));
        };
        // first write in "w" mode truncates; everything after appends
        let write_mode = if handle.buffer.is_empty() && handle.mode == FileMode::Write {
            WriteMode::Write
        } else {
            WriteMode::Append
        };
        handle.buffer.push_str(text);
        (handle.path.clone(), write_mode, text.to_string())
    };
    match ev.ctx.fs_write(&path, &written, mode)? {
        Ok(()) => Ok(Value::Int(written.chars().count() as i64)),
        Err(err) => Err(RunError::raise(ExcType::IOError, err.to_string())),
    }
}

fn f_close(_ev: &mut Evaluator, recv: &Value, _a: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    let file = recv_file(recv)?;
    plock(file).closed = true;
    Ok(Value::None)
}

fn f_enter(_ev: &mut Evaluator, recv: &Value, _a: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    Ok(recv.clone())
}

fn f_exit(_ev: &mut Evaluator, recv: &Value, _a: Vec<Value>, _kw: Vec<(String, Value)>) -> RunResult<Value> {
    let file = recv_file(recv)?;
    plock(file).closed = true;
    Ok(Value::Bool(false))
}
