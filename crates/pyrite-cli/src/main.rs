use std::{
    env, fs,
    io::Read,
    process::ExitCode,
    time::Instant,
};

use pyrite::{Ctx, CtxOptions, RunOutcome, run};

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    let code = match args.get(1).map(String::as_str) {
        Some("-") | None => {
            let mut buffer = String::new();
            if std::io::stdin().read_to_string(&mut buffer).is_err() {
                eprintln!("error: failed to read stdin");
                return ExitCode::FAILURE;
            }
            buffer
        }
        Some(path) => match fs::read_to_string(path) {
            Ok(code) => code,
            Err(err) => {
                eprintln!("error: cannot read {path}: {err}");
                return ExitCode::FAILURE;
            }
        },
    };

    let timeout_ms = env::var("PYRITE_TIMEOUT_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(30_000);
    let ctx = Ctx::new(CtxOptions {
        timeout_ms,
        ..CtxOptions::default()
    });

    let start = Instant::now();
    match run(&code, Some(ctx)) {
        RunOutcome::Ok { value, ctx } => {
            print!("{}", ctx.stdout());
            eprintln!("success after {:?}: {value:?}", start.elapsed());
            ExitCode::SUCCESS
        }
        RunOutcome::Suspended { ctx } => {
            print!("{}", ctx.stdout());
            eprintln!("suspended after {:?} ({} events logged)", start.elapsed(), ctx.event_count());
            ExitCode::SUCCESS
        }
        RunOutcome::Error(record) => {
            eprintln!("error after {:?}:\n{record}", start.elapsed());
            ExitCode::FAILURE
        }
    }
}
