//! One-shot deferred values
//!
//! ## Table of Contents
//! - **Deferred**: Cloneable handle to a value that settles exactly once
//! - **Resolver**: The single write side of a `Deferred`
//! - **Completion**: Future for the outcome of a continuation
//! - **CompletionSender**: Write side of a hand-built `Completion`
//!
//! Continuations registered on a pending `Deferred` are queued and run in
//! registration order when it settles. Continuations registered after it
//! settled run immediately on the caller's stack. Registration is eager:
//! an operation is issued when `then` is called, not when its
//! `Completion` is first polled, so dropping a `Completion` never cancels
//! the operation.

use crate::error::{MapError, Result};
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

type Continuation<T> = Box<dyn FnOnce(std::result::Result<&T, &MapError>) + Send>;

enum State<T> {
    Pending(Vec<Continuation<T>>),
    Resolved(T),
    Rejected(MapError),
}

/// A value that settles exactly once and can be awaited by any number of
/// consumers, whether they register before or after settlement.
pub struct Deferred<T> {
    state: Arc<Mutex<State<T>>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = match &*self.state.lock() {
            State::Pending(queue) => format!("pending({} queued)", queue.len()),
            State::Resolved(_) => "resolved".to_string(),
            State::Rejected(err) => format!("rejected({err})"),
        };
        f.debug_struct("Deferred").field("status", &status).finish()
    }
}

impl<T: Clone + Send + Sync + 'static> Deferred<T> {
    /// Create a pending deferred together with its resolver
    pub fn new() -> (Self, Resolver<T>) {
        let state = Arc::new(Mutex::new(State::Pending(Vec::new())));
        let deferred = Self {
            state: state.clone(),
        };
        (deferred, Resolver { state: Some(state) })
    }

    /// Create an already resolved deferred
    pub fn resolved(value: T) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::Resolved(value))),
        }
    }

    /// Create an already rejected deferred
    pub fn rejected(err: MapError) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::Rejected(err))),
        }
    }

    /// Whether the value has settled (either way)
    pub fn is_settled(&self) -> bool {
        !matches!(&*self.state.lock(), State::Pending(_))
    }

    /// Whether the value resolved successfully
    pub fn is_resolved(&self) -> bool {
        matches!(&*self.state.lock(), State::Resolved(_))
    }

    /// Register a raw continuation that observes the settled outcome
    pub fn when_settled<F>(&self, f: F)
    where
        F: FnOnce(std::result::Result<&T, &MapError>) + Send + 'static,
    {
        let mut state = self.state.lock();
        let settled = match &mut *state {
            State::Pending(queue) => {
                queue.push(Box::new(f));
                return;
            }
            State::Resolved(value) => Ok(value.clone()),
            State::Rejected(err) => Err(err.clone()),
        };
        drop(state);
        f(settled.as_ref());
    }

    /// Run `f` against the value once it resolves
    ///
    /// The returned `Completion` yields `f`'s result, or the rejection.
    pub fn then<R, F>(&self, f: F) -> Completion<R>
    where
        R: Send + 'static,
        F: FnOnce(&T) -> R + Send + 'static,
    {
        let (tx, completion) = Completion::channel();
        self.when_settled(move |outcome| tx.send(outcome.map(f).map_err(Clone::clone)));
        completion
    }

    /// Derive a new deferred by transforming the resolved value
    pub fn map<U, F>(&self, f: F) -> Deferred<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(&T) -> Result<U> + Send + 'static,
    {
        let (next, resolver) = Deferred::new();
        self.when_settled(move |outcome| match outcome {
            Ok(value) => resolver.settle(f(value)),
            Err(err) => resolver.reject(err.clone()),
        });
        next
    }

    /// Wait for a clone of the resolved value
    pub fn value(&self) -> Completion<T> {
        self.then(T::clone)
    }
}

/// Write side of a [`Deferred`]
///
/// Consumed on use, so a deferred can settle at most once. Dropping an
/// unused resolver rejects the deferred with [`MapError::Abandoned`].
pub struct Resolver<T: Clone + Send + Sync + 'static> {
    state: Option<Arc<Mutex<State<T>>>>,
}

impl<T: Clone + Send + Sync + 'static> Resolver<T> {
    /// Resolve with a value
    pub fn resolve(mut self, value: T) {
        self.complete(Ok(value));
    }

    /// Reject with an error
    pub fn reject(mut self, err: MapError) {
        self.complete(Err(err));
    }

    /// Settle with either outcome
    pub fn settle(mut self, outcome: Result<T>) {
        self.complete(outcome);
    }

    fn complete(&mut self, outcome: Result<T>) {
        let Some(state) = self.state.take() else {
            return;
        };
        let queue = {
            let mut guard = state.lock();
            let next = match &outcome {
                Ok(value) => State::Resolved(value.clone()),
                Err(err) => State::Rejected(err.clone()),
            };
            match std::mem::replace(&mut *guard, next) {
                State::Pending(queue) => queue,
                _ => Vec::new(),
            }
        };
        for continuation in queue {
            continuation(outcome.as_ref());
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Drop for Resolver<T> {
    fn drop(&mut self) {
        if self.state.is_some() {
            self.complete(Err(MapError::abandoned("resolver dropped before settling")));
        }
    }
}

/// Future resolving to the outcome of an issued operation
#[must_use = "the operation is already issued; await the completion to observe its outcome"]
pub struct Completion<R> {
    rx: oneshot::Receiver<Result<R>>,
}

impl<R> Completion<R> {
    /// Create a completion with its sender
    pub fn channel() -> (CompletionSender<R>, Self) {
        let (tx, rx) = oneshot::channel();
        (CompletionSender { tx }, Self { rx })
    }

    /// A completion that is already settled
    pub fn ready(outcome: Result<R>) -> Self {
        let (tx, completion) = Self::channel();
        tx.send(outcome);
        completion
    }
}

impl<R> Future for Completion<R> {
    type Output = Result<R>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(MapError::abandoned(
                "operation dropped before completing",
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Write side of a [`Completion`]
pub struct CompletionSender<R> {
    tx: oneshot::Sender<Result<R>>,
}

impl<R> CompletionSender<R> {
    /// Deliver the outcome; ignored if the completion was dropped
    pub fn send(self, outcome: Result<R>) {
        let _ = self.tx.send(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready_eq, task};

    #[tokio::test]
    async fn test_late_consumer_sees_value() {
        let (deferred, resolver) = Deferred::<u32>::new();
        resolver.resolve(7);
        assert!(deferred.is_resolved());
        assert_eq!(deferred.value().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_continuations_run_in_registration_order() {
        let (deferred, resolver) = Deferred::<u32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let mut completions = Vec::new();
        for i in 0..5 {
            let seen = seen.clone();
            completions.push(deferred.then(move |v| seen.lock().push(v + i)));
        }
        assert!(seen.lock().is_empty());

        resolver.resolve(10);
        for completion in completions {
            completion.await.unwrap();
        }
        assert_eq!(*seen.lock(), vec![10, 11, 12, 13, 14]);
    }

    #[tokio::test]
    async fn test_dropped_resolver_rejects() {
        let (deferred, resolver) = Deferred::<u32>::new();
        let waiting = deferred.value();
        drop(resolver);
        let err = waiting.await.unwrap_err();
        assert!(matches!(err, MapError::Abandoned(_)));
    }

    #[tokio::test]
    async fn test_rejection_propagates_through_map() {
        let (deferred, resolver) = Deferred::<u32>::new();
        let doubled = deferred.map(|v| Ok(v * 2));
        resolver.reject(MapError::bootstrap("no script"));
        assert_eq!(
            doubled.value().await.unwrap_err(),
            MapError::bootstrap("no script")
        );
    }

    #[tokio::test]
    async fn test_map_transforms_value() {
        let deferred = Deferred::resolved(3u32);
        let text = deferred.map(|v| Ok(format!("#{v}")));
        assert_eq!(text.value().await.unwrap(), "#3");
    }

    #[test]
    fn test_completion_pending_until_settled() {
        let (deferred, resolver) = Deferred::<u32>::new();
        let mut waiting = task::spawn(deferred.value());
        assert_pending!(waiting.poll());
        resolver.resolve(1);
        assert!(waiting.is_woken());
        assert_ready_eq!(waiting.poll(), Ok(1));
    }

    #[tokio::test]
    async fn test_ready_completion() {
        assert_eq!(Completion::ready(Ok(5u8)).await.unwrap(), 5);
    }
}
