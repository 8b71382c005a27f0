//! Synchronous and completion-sink execution of session operations.
//!
//! Every session operation is an async fn. This module lets the same future
//! run to completion on a runtime while the caller blocks, or run on a
//! worker with its result delivered to a [`Completion`].

use std::future::Future;

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};

/// Where the result of a dispatched operation goes.
pub enum Completion<T> {
    /// Invoke a callback with the result.
    Callback(Box<dyn FnOnce(Result<T>) + Send + 'static>),
    /// Send the result over a channel. If the receiver is gone, errors are
    /// rethrown.
    Channel(oneshot::Sender<Result<T>>),
    /// Discard successes and rethrow errors.
    Rethrow,
}

impl<T> Completion<T> {
    pub fn callback(f: impl FnOnce(Result<T>) + Send + 'static) -> Self {
        Completion::Callback(Box::new(f))
    }

    /// A channel completion and the receiver that will observe its result.
    pub fn channel() -> (Self, oneshot::Receiver<Result<T>>) {
        let (tx, rx) = oneshot::channel();
        (Completion::Channel(tx), rx)
    }

    fn deliver(self, result: Result<T>) {
        match self {
            Completion::Callback(f) => f(result),
            Completion::Channel(tx) => {
                if let Err(Err(err)) = tx.send(result) {
                    rethrow(err);
                }
            }
            Completion::Rethrow => {
                if let Err(err) = result {
                    rethrow(err);
                }
            }
        }
    }
}

impl<T> std::fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Completion::Callback(_) => f.write_str("Callback"),
            Completion::Channel(_) => f.write_str("Channel"),
            Completion::Rethrow => f.write_str("Rethrow"),
        }
    }
}

/// Raises an error nobody is waiting for.
///
/// The error is logged and then raised as a panic on the current task, where
/// it surfaces through the task's [`JoinHandle`].
pub fn rethrow(err: Error) -> ! {
    tracing::error!(kind = ?err.kind(), error = %err, "unhandled error in async operation");
    panic!("unhandled error in async operation: {}", err)
}

/// Spawns `fut` on `handle` and delivers its result to `completion`.
pub fn dispatch<T, F>(handle: &Handle, fut: F, completion: Completion<T>) -> JoinHandle<()>
where
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    handle.spawn(async move { completion.deliver(fut.await) })
}

/// Runs `fut` to completion on `handle`, blocking the calling thread.
///
/// Inside a multi-threaded runtime the worker is handed off with
/// [`tokio::task::block_in_place`]; calling this from a current-thread
/// runtime panics.
pub fn block_on<F, T>(handle: &Handle, fut: F) -> T
where
    F: Future<Output = T>,
{
    match Handle::try_current() {
        Ok(_) => tokio::task::block_in_place(|| handle.block_on(fut)),
        Err(_) => handle.block_on(fut),
    }
}
