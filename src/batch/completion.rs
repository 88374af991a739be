//! # Completion Handles
//!
//! Single-assignment results tied to one published message. The batch keeps the
//! resolving half ([`Completion`]); the caller gets the observing half
//! ([`PublishFuture`]), which can be awaited, waited on from a plain thread, or
//! given callbacks.
//!
//! Resolution consumes the `Completion`, so a handle is resolved at most once.
//! A `Completion` dropped without being resolved resolves its future with
//! [`PublishError::Abandoned`], so no observer waits forever.

use futures::future::BoxFuture;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

use crate::error::{PublishError, PublishResult};

type DoneCallback = Box<dyn FnOnce(&PublishResult) + Send>;

#[derive(Default)]
struct FutureState {
    result: Option<PublishResult>,
    callbacks: Vec<DoneCallback>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<FutureState>,
    condvar: Condvar,
    notify: Notify,
}

impl Shared {
    fn complete(&self, result: PublishResult) {
        let callbacks = {
            let mut state = self.state.lock();
            if state.result.is_some() {
                return;
            }
            state.result = Some(result.clone());
            std::mem::take(&mut state.callbacks)
        };

        self.condvar.notify_all();
        self.notify.notify_waiters();

        for callback in callbacks {
            callback(&result);
        }
    }
}

/// Create a linked resolver/observer pair
pub(crate) fn completion_pair() -> (Completion, PublishFuture) {
    let shared = Arc::new(Shared::default());
    (
        Completion {
            shared: Some(Arc::clone(&shared)),
        },
        PublishFuture { shared },
    )
}

/// Resolving half of a completion handle, owned by the batch
pub(crate) struct Completion {
    shared: Option<Arc<Shared>>,
}

impl Completion {
    pub(crate) fn resolve_success(self, message_id: String) {
        self.resolve(Ok(message_id));
    }

    pub(crate) fn resolve_failure(self, error: PublishError) {
        self.resolve(Err(error));
    }

    fn resolve(mut self, result: PublishResult) {
        if let Some(shared) = self.shared.take() {
            shared.complete(result);
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            shared.complete(Err(PublishError::Abandoned));
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("pending", &self.shared.is_some())
            .finish()
    }
}

/// Observing half of a completion handle, returned by `publish`.
///
/// Cloning is cheap; every clone observes the same result.
#[derive(Clone)]
pub struct PublishFuture {
    shared: Arc<Shared>,
}

impl PublishFuture {
    /// Whether the message has been resolved
    pub fn is_done(&self) -> bool {
        self.shared.state.lock().result.is_some()
    }

    /// The result if already resolved, without waiting
    pub fn try_result(&self) -> Option<PublishResult> {
        self.shared.state.lock().result.clone()
    }

    /// Wait asynchronously for the result
    pub async fn result(&self) -> PublishResult {
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a resolution in between is not missed
            notified.as_mut().enable();

            if let Some(result) = self.try_result() {
                return result;
            }
            notified.await;
        }
    }

    /// Block the current thread until the result is available.
    ///
    /// Must not be called from inside an async task.
    pub fn wait(&self) -> PublishResult {
        let mut state = self.shared.state.lock();
        loop {
            if let Some(result) = &state.result {
                return result.clone();
            }
            self.shared.condvar.wait(&mut state);
        }
    }

    /// Block for at most `timeout`; `None` if the message is still pending
    pub fn wait_timeout(&self, timeout: Duration) -> Option<PublishResult> {
        let mut state = self.shared.state.lock();
        if let Some(result) = &state.result {
            return Some(result.clone());
        }

        // A timeout past the end of `Instant` is an unbounded wait
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            drop(state);
            return Some(self.wait());
        };

        loop {
            if let Some(result) = &state.result {
                return Some(result.clone());
            }
            if self
                .shared
                .condvar
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return state.result.clone();
            }
        }
    }

    /// Run `callback` once the message is resolved.
    ///
    /// Runs immediately on the calling thread if already resolved, otherwise on
    /// the thread that resolves the message.
    pub fn add_done_callback<F>(&self, callback: F)
    where
        F: FnOnce(&PublishResult) + Send + 'static,
    {
        let mut state = self.shared.state.lock();
        match state.result.clone() {
            Some(result) => {
                drop(state);
                callback(&result);
            }
            None => state.callbacks.push(Box::new(callback)),
        }
    }
}

impl IntoFuture for PublishFuture {
    type Output = PublishResult;
    type IntoFuture = BoxFuture<'static, PublishResult>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.result().await })
    }
}

impl fmt::Debug for PublishFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublishFuture")
            .field("result", &self.try_result())
            .finish()
    }
}
