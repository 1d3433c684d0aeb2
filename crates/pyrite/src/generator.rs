//! Generators as thread-backed continuations.
//!
//! Each generator runs its body on a dedicated producer thread coupled to the
//! consumer through a pair of zero-capacity rendezvous channels. The producer
//! runs exactly long enough to reach the next `yield`, then blocks until the
//! consumer pulls again: no prefetch, strict back-pressure.
//!
//! Teardown: dropping the generator (or calling `close()`) disconnects the
//! request channel; the parked producer wakes immediately with a
//! `GeneratorClosed` unwind that runs `finally`/`__exit__` cleanup on its way
//! out, so abandoned producers release their resources promptly.
//!
//! States mirror the usual generator lifecycle: New (body not started),
//! Running (only observable from the producer side), Suspended (parked at a
//! yield), Finished.

use std::sync::{
    Arc, Mutex,
    mpsc::{Receiver, SyncSender, sync_channel},
};

use crate::{
    ctx::Ctx,
    env::Frame,
    eval::Evaluator,
    exceptions::{RunError, RunResult},
    value::{FunctionValue, Value, plock},
};

/// Consumer-to-producer messages.
pub(crate) enum GenRequest {
    /// Run to the next yield; the payload is the `send()` value (None for a
    /// plain `next()`).
    Next(Value),
    /// Unwind and finish.
    Close,
}

/// Producer-to-consumer messages.
pub(crate) enum GenReply {
    Yield(Value),
    Return(Value),
    Err(RunError),
}

/// Everything needed to start the body lazily on first pull.
pub(crate) struct GenSeed {
    pub func: Arc<FunctionValue>,
    /// Call frame with parameters already bound.
    pub frame: Arc<Frame>,
    pub ctx: Ctx,
}

enum GenState {
    New(Box<GenSeed>),
    Suspended(GenChannels),
    Finished,
}

struct GenChannels {
    req_tx: SyncSender<GenRequest>,
    reply_rx: Receiver<GenReply>,
    handle: Option<std::thread::JoinHandle<()>>,
}

/// A generator value: a running suspension driven by its consumer.
pub(crate) struct GeneratorValue {
    pub name: Arc<str>,
    state: Mutex<GenState>,
}

impl std::fmt::Debug for GeneratorValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratorValue").field("name", &self.name).finish()
    }
}

/// The producer side of the rendezvous, owned by the producer's evaluator.
pub(crate) struct YieldPort {
    reply_tx: SyncSender<GenReply>,
    req_rx: Receiver<GenRequest>,
}

impl YieldPort {
    /// Hands one value to the consumer and parks until the next pull.
    /// Returns the `send()` payload supplied by the consumer.
    pub(crate) fn emit(&self, value: Value) -> RunResult<Value> {
        if self.reply_tx.send(GenReply::Yield(value)).is_err() {
            return Err(RunError::GeneratorClosed);
        }
        match self.req_rx.recv() {
            Ok(GenRequest::Next(sent)) => Ok(sent),
            Ok(GenRequest::Close) | Err(_) => Err(RunError::GeneratorClosed),
        }
    }
}

impl GeneratorValue {
    pub(crate) fn new(name: Arc<str>, func: Arc<FunctionValue>, frame: Arc<Frame>, ctx: Ctx) -> Self {
        Self {
            name,
            state: Mutex::new(GenState::New(Box::new(GenSeed { func, frame, ctx }))),
        }
    }

    /// Pulls the next value. `Ok(None)` means the generator returned.
    pub(crate) fn next(&self) -> RunResult<Option<Value>> {
        self.resume_with(Value::None)
    }

    /// `send(value)`: resumes the parked yield expression with `value`.
    pub(crate) fn resume_with(&self, sent: Value) -> RunResult<Option<Value>> {
        let mut state = plock(&self.state);
        if let GenState::New(_) = &*state {
            let GenState::New(seed) = std::mem::replace(&mut *state, GenState::Finished) else {
                unreachable!();
            };
            *state = spawn_producer(*seed);
        }
        let GenState::Suspended(channels) = &mut *state else {
            return Ok(None);
        };
        if channels.req_tx.send(GenRequest::Next(sent)).is_err() {
            *state = GenState::Finished;
            return Err(RunError::runtime_error("generator producer terminated unexpectedly"));
        }
        match channels.reply_rx.recv() {
            Ok(GenReply::Yield(value)) => Ok(Some(value)),
            Ok(GenReply::Return(_)) => {
                finish(&mut state);
                Ok(None)
            }
            Ok(GenReply::Err(err)) => {
                finish(&mut state);
                Err(err)
            }
            Err(_) => {
                finish(&mut state);
                Ok(None)
            }
        }
    }

    /// Terminates the generator, unwinding the producer (running `finally`
    /// bodies) and waiting for it to exit.
    pub(crate) fn close(&self) {
        let mut state = plock(&self.state);
        let old = std::mem::replace(&mut *state, GenState::Finished);
        if let GenState::Suspended(mut channels) = old {
            // try_send only succeeds when the producer is parked in recv; a
            // producer blocked delivering its final value is instead released
            // by the receiver drop below
            let _ = channels.req_tx.try_send(GenRequest::Close);
            // disconnect both channels before joining: a yield during the
            // unwind (or a producer racing towards recv) must fail fast
            // instead of parking forever against a consumer that is busy
            // joining
            drop(channels.reply_rx);
            drop(channels.req_tx);
            if let Some(handle) = channels.handle.take() {
                let _ = handle.join();
            }
        }
    }

    pub(crate) fn is_finished(&self) -> bool {
        matches!(&*plock(&self.state), GenState::Finished)
    }
}

fn finish(state: &mut GenState) {
    if let GenState::Suspended(channels) = state {
        if let Some(handle) = channels.handle.take() {
            let _ = handle.join();
        }
    }
    *state = GenState::Finished;
}

impl Drop for GeneratorValue {
    fn drop(&mut self) {
        // dropping the channels disconnects the parked producer, which wakes
        // with GeneratorClosed and unwinds on its own; no join here so drops
        // never block.
        let mut state = plock(&self.state);
        *state = GenState::Finished;
    }
}

fn spawn_producer(seed: GenSeed) -> GenState {
    let (req_tx, req_rx) = sync_channel::<GenRequest>(0);
    let (reply_tx, reply_rx) = sync_channel::<GenReply>(0);
    let final_tx = reply_tx.clone();
    let handle = std::thread::Builder::new()
        .name("pyrite-generator".to_owned())
        .stack_size(8 * 1024 * 1024)
        .spawn(move || {
            // the body does not start until the first pull
            match req_rx.recv() {
                Ok(GenRequest::Next(_)) => {}
                Ok(GenRequest::Close) | Err(_) => return,
            }
            let port = YieldPort { reply_tx, req_rx };
            let mut ev = Evaluator::for_generator(seed.ctx, port);
            let result = ev.run_generator_body(&seed.func, &seed.frame);
            let reply = match result {
                Ok(value) => GenReply::Return(value),
                Err(RunError::GeneratorClosed) => return,
                Err(err) => GenReply::Err(err),
            };
            let _ = final_tx.send(reply);
        });
    match handle {
        Ok(handle) => GenState::Suspended(GenChannels {
            req_tx,
            reply_rx,
            handle: Some(handle),
        }),
        Err(_) => GenState::Finished,
    }
}
