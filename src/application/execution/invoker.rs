//! Fault-isolated invocation of user callables.
//!
//! Every main method call and every post-step call goes through [`invoke`],
//! which turns returned errors, panics and timeouts into an
//! [`InvocationFailure`] instead of letting them unwind into the engine.

use crossbeam_channel::RecvTimeoutError;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum InvocationFailure {
    /// The callable returned an error
    Failed(String),
    /// The callable panicked
    Panicked(String),
    /// No result within the time budget
    TimedOut(Duration),
}

impl InvocationFailure {
    pub fn message(&self) -> String {
        match self {
            InvocationFailure::Failed(message) => message.clone(),
            InvocationFailure::Panicked(message) => format!("panicked: {}", message),
            InvocationFailure::TimedOut(limit) => {
                format!("timed out after {:.2}s", limit.as_secs_f64())
            }
        }
    }
}

/// Runs `f`, optionally bounded by `timeout`.
///
/// With a timeout the call runs on a helper thread. A call that overruns is
/// abandoned: the thread keeps running to completion but its result is
/// dropped. Only that invocation is affected.
pub fn invoke<T, F>(timeout: Option<Duration>, f: F) -> Result<T, InvocationFailure>
where
    T: Send + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    let Some(limit) = timeout else {
        return run_guarded(f);
    };

    let (tx, rx) = crossbeam_channel::bounded(1);
    thread::Builder::new()
        .name("bench-invoke".to_string())
        .spawn(move || {
            // Receiver is gone after a timeout
            let _ = tx.send(run_guarded(f));
        })
        .map_err(|e| InvocationFailure::Failed(format!("failed to spawn invocation thread: {}", e)))?;

    match rx.recv_timeout(limit) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(InvocationFailure::TimedOut(limit)),
        Err(RecvTimeoutError::Disconnected) => Err(InvocationFailure::Failed(
            "invocation thread exited without a result".to_string(),
        )),
    }
}

fn run_guarded<T, F>(f: F) -> Result<T, InvocationFailure>
where
    F: FnOnce() -> anyhow::Result<T>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(InvocationFailure::Failed(format!("{:#}", e))),
        Err(payload) => Err(InvocationFailure::Panicked(panic_message(payload))),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}
