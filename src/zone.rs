//! Main task queue
//!
//! Engine callbacks can fire from the engine's own scheduling. Anything
//! that touches shared state (the entity association, map attachment,
//! facade outputs) is posted to a `Zone` and runs there, one job at a
//! time, in posting order.

use crate::deferred::Completion;
use crate::error::MapError;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

type Job = Box<dyn FnOnce() + Send>;

/// Handle to the single cooperative execution context
#[derive(Clone)]
pub struct Zone {
    tx: mpsc::UnboundedSender<Job>,
    name: Arc<str>,
}

impl std::fmt::Debug for Zone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Zone")
            .field("name", &self.name)
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl Zone {
    /// Start a zone on the current tokio runtime
    ///
    /// # Panics
    /// Panics when called outside a tokio runtime.
    pub fn spawn(name: impl Into<String>) -> Self {
        let name: Arc<str> = Arc::from(name.into());
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();

        let task_name = name.clone();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                job();
            }
            debug!(zone = %task_name, "Zone drained and stopped");
        });

        Self { tx, name }
    }

    /// Zone name for logging
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue a job without waiting for it
    pub fn post<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.tx.send(Box::new(job)).is_err() {
            warn!(zone = %self.name, "Zone closed, dropping job");
        }
    }

    /// Queue a job and get a completion for its result
    pub fn run<R, F>(&self, job: F) -> Completion<R>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        let (tx, completion) = Completion::channel();
        let boxed: Job = Box::new(move || tx.send(Ok(job())));
        if self.tx.send(boxed).is_err() {
            return Completion::ready(Err(MapError::ZoneClosed));
        }
        completion
    }

    /// Wrap a callback so every invocation is re-posted onto this zone
    pub fn wrap<A, F>(&self, callback: F) -> impl Fn(A) + Send + Sync + 'static
    where
        A: Send + 'static,
        F: Fn(A) + Send + Sync + 'static,
    {
        let zone = self.clone();
        let callback = Arc::new(callback);
        move |arg: A| {
            let callback = callback.clone();
            zone.post(move || callback(arg));
        }
    }
}
