//! Top-level evaluation API: `run` and `resume`.
//!
//! (`boot`/`handle`/`handle_stream`/`invoke` live in [`crate::dispatch`].)

use crate::{
    ctx::Ctx,
    env::Frame,
    errors::ErrorRecord,
    eval::Evaluator,
    exceptions::RunError,
    object::Object,
    parse::parse,
};

/// Result of a `run`/`resume` call.
#[derive(Debug)]
pub enum RunOutcome {
    /// The script ran to completion; `value` is the final expression's value.
    Ok { value: Object, ctx: Ctx },
    /// The script called `suspend()`; resume later with [`resume`].
    Suspended { ctx: Ctx },
    Error(ErrorRecord),
}

impl RunOutcome {
    /// The completed value, if this outcome is `Ok`.
    #[must_use]
    pub fn into_value(self) -> Option<Object> {
        match self {
            Self::Ok { value, .. } => Some(value),
            _ => None,
        }
    }

    /// The carried context, if any.
    #[must_use]
    pub fn ctx(&self) -> Option<&Ctx> {
        match self {
            Self::Ok { ctx, .. } | Self::Suspended { ctx } => Some(ctx),
            Self::Error(_) => None,
        }
    }
}

/// Evaluates a script top-to-bottom against a (possibly fresh) context.
///
/// Never panics on malformed input: lexical/syntactic problems come back as
/// `Error { kind: Syntax }`, runtime problems as their respective kinds.
pub fn run(source: &str, ctx: Option<Ctx>) -> RunOutcome {
    let ctx = ctx.unwrap_or_default();
    run_against(source, ctx)
}

/// Resumes a suspended evaluation: the context's event log is replayed in
/// lock-step with re-execution (the original `suspend()` becomes a no-op),
/// then execution continues live.
pub fn resume(source: &str, ctx: Ctx) -> RunOutcome {
    ctx.prepare_resume();
    run_against(source, ctx)
}

fn run_against(source: &str, ctx: Ctx) -> RunOutcome {
    let stmts = match parse(source) {
        Ok(stmts) => stmts,
        Err(err) => return RunOutcome::Error(err.into()),
    };
    let frame = Frame::module();
    let mut ev = Evaluator::new(ctx.clone());
    ctx.clock_resume();
    let result = ev.run_module(&stmts, &frame);
    ctx.clock_pause();
    match result {
        Ok(value) => {
            let value = ev.to_object(&value);
            RunOutcome::Ok { value, ctx }
        }
        Err(RunError::Suspend) => RunOutcome::Suspended { ctx },
        Err(err) => RunOutcome::Error(err.into()),
    }
}
