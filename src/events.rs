//! Event bridge
//!
//! ## Table of Contents
//! - **EventStream**: Stream of engine events for one (target, event name) pair
//! - **EventEmitter**: Sending side of an `EventStream`
//! - **Subscription**: Disposal state shared by a stream and its native listener
//! - **EventSubscription**: A stream whose events go straight to a handler
//! - **MarkerEvent**: Event names bridged for markers
//! - **observe**: Register a zone-wrapped listener once a target resolves
//!
//! Streams never complete while their source is alive. They end only when
//! the native listener is gone, which happens after `dispose` or when the
//! target never resolved.

use crate::deferred::Deferred;
use crate::engine::{Listener, ListenerHandle};
use crate::types::NativeEvent;
use crate::zone::Zone;
use futures::Stream;
use parking_lot::Mutex;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::trace;

/// Marker events forwarded by the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerEvent {
    /// `click`
    Click,
    /// `rightclick`
    RightClick,
    /// `dragstart`
    DragStart,
    /// `drag`
    Drag,
    /// `dragend`
    DragEnd,
    /// `mouseover`
    MouseOver,
    /// `mouseout`
    MouseOut,
}

impl MarkerEvent {
    /// Every bridged marker event
    pub const ALL: [MarkerEvent; 7] = [
        MarkerEvent::Click,
        MarkerEvent::RightClick,
        MarkerEvent::DragStart,
        MarkerEvent::Drag,
        MarkerEvent::DragEnd,
        MarkerEvent::MouseOver,
        MarkerEvent::MouseOut,
    ];

    /// Engine event name
    pub fn as_str(&self) -> &'static str {
        match self {
            MarkerEvent::Click => "click",
            MarkerEvent::RightClick => "rightclick",
            MarkerEvent::DragStart => "dragstart",
            MarkerEvent::Drag => "drag",
            MarkerEvent::DragEnd => "dragend",
            MarkerEvent::MouseOver => "mouseover",
            MarkerEvent::MouseOut => "mouseout",
        }
    }
}

impl std::fmt::Display for MarkerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

enum SubscriptionState {
    Pending,
    Active(Box<dyn ListenerHandle>),
    Disposed,
}

/// Disposal state of one native listener registration
///
/// Starts pending because the listener can only be registered once the
/// target resolves. Disposing a pending subscription makes the later
/// registration remove itself immediately.
#[derive(Clone)]
pub struct Subscription {
    state: Arc<Mutex<SubscriptionState>>,
}

impl Subscription {
    /// Create a pending subscription
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SubscriptionState::Pending)),
        }
    }

    /// Record the native listener handle
    pub fn attach(&self, handle: Box<dyn ListenerHandle>) {
        let mut state = self.state.lock();
        if matches!(*state, SubscriptionState::Disposed) {
            drop(state);
            handle.remove();
        } else {
            *state = SubscriptionState::Active(handle);
        }
    }

    /// Remove the native listener, now or as soon as it is registered
    pub fn dispose(&self) {
        let previous = std::mem::replace(&mut *self.state.lock(), SubscriptionState::Disposed);
        if let SubscriptionState::Active(handle) = previous {
            handle.remove();
        }
    }

    /// Whether a native listener is currently registered
    pub fn is_active(&self) -> bool {
        matches!(&*self.state.lock(), SubscriptionState::Active(_))
    }

    /// Whether `dispose` was called
    pub fn is_disposed(&self) -> bool {
        matches!(&*self.state.lock(), SubscriptionState::Disposed)
    }
}

impl Default for Subscription {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &*self.state.lock() {
            SubscriptionState::Pending => "pending",
            SubscriptionState::Active(_) => "active",
            SubscriptionState::Disposed => "disposed",
        };
        f.debug_struct("Subscription").field("state", &state).finish()
    }
}

type Handler<T> = Arc<dyn Fn(T) + Send + Sync>;

enum Sink<T> {
    Buffered(mpsc::UnboundedSender<T>),
    Forwarding(Handler<T>),
    Closed,
}

/// Sending side of an [`EventStream`]
///
/// While the stream is read directly, events are buffered without bound.
/// Once the stream is forwarded, `emit` runs the handler on the caller,
/// so events posted through a zone are handled inside that zone job.
pub struct EventEmitter<T> {
    sink: Arc<Mutex<Sink<T>>>,
}

impl<T> Clone for EventEmitter<T> {
    fn clone(&self) -> Self {
        Self {
            sink: self.sink.clone(),
        }
    }
}

impl<T> EventEmitter<T> {
    /// Deliver an event; false when nobody can receive it any more
    pub fn emit(&self, event: T) -> bool {
        let handler = match &*self.sink.lock() {
            Sink::Buffered(tx) => return tx.send(event).is_ok(),
            Sink::Forwarding(handler) => handler.clone(),
            Sink::Closed => return false,
        };
        handler(event);
        true
    }
}

/// Stream of events from one native listener
///
/// Dropping the stream disposes its subscription. The stream ends once
/// every emitter is gone.
pub struct EventStream<T> {
    rx: mpsc::UnboundedReceiver<T>,
    sink: Weak<Mutex<Sink<T>>>,
    subscription: Subscription,
    forwarded: bool,
}

impl<T> EventStream<T> {
    /// Create a stream with a fresh pending subscription
    pub fn channel() -> (EventEmitter<T>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Arc::new(Mutex::new(Sink::Buffered(tx)));
        (
            EventEmitter { sink: sink.clone() },
            Self {
                rx,
                sink: Arc::downgrade(&sink),
                subscription: Subscription::new(),
                forwarded: false,
            },
        )
    }

    /// Wait for the next event
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Take an already delivered event without waiting
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Shared disposal state
    pub fn subscription(&self) -> Subscription {
        self.subscription.clone()
    }

    /// Stop forwarding; buffered events can still be read
    pub fn dispose(&self) {
        self.subscription.dispose();
    }

    /// Hand every event to `handler` on the emitting side
    ///
    /// Events already buffered are handled first, in order. No task is
    /// spawned: later events run `handler` wherever they are emitted.
    pub fn forward<F>(mut self, handler: F) -> EventSubscription<T>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let handler: Handler<T> = Arc::new(handler);
        match self.sink.upgrade() {
            Some(shared) => {
                let mut sink = shared.lock();
                while let Ok(event) = self.rx.try_recv() {
                    handler(event);
                }
                *sink = Sink::Forwarding(handler);
            }
            None => {
                while let Ok(event) = self.rx.try_recv() {
                    handler(event);
                }
            }
        }
        self.forwarded = true;
        EventSubscription {
            subscription: self.subscription.clone(),
            sink: self.sink.clone(),
        }
    }
}

impl<T> Stream for EventStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl<T> Drop for EventStream<T> {
    fn drop(&mut self) {
        if !self.forwarded {
            self.subscription.dispose();
        }
    }
}

impl<T> std::fmt::Debug for EventStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("subscription", &self.subscription)
            .field("forwarded", &self.forwarded)
            .finish()
    }
}

/// An [`EventStream`] handed over to a handler
pub struct EventSubscription<T> {
    subscription: Subscription,
    sink: Weak<Mutex<Sink<T>>>,
}

impl<T> EventSubscription<T> {
    /// Remove the native listener and stop calling the handler
    ///
    /// Firings already queued on the zone are dropped.
    pub fn dispose(&self) {
        self.subscription.dispose();
        if let Some(sink) = self.sink.upgrade() {
            *sink.lock() = Sink::Closed;
        }
    }

    /// Whether a native listener is currently registered
    pub fn is_active(&self) -> bool {
        self.subscription.is_active()
    }
}

impl<T> std::fmt::Debug for EventSubscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSubscription")
            .field("subscription", &self.subscription)
            .finish()
    }
}

/// Bridge a named native event into an [`EventStream`]
///
/// Once `target` resolves, `register` is called with a listener that
/// re-posts every firing onto `zone` before it reaches the stream. A
/// rejected target leaves the stream to end without events.
pub fn observe<S, F>(target: &Deferred<S>, zone: &Zone, event: &str, register: F) -> EventStream<NativeEvent>
where
    S: Clone + Send + Sync + 'static,
    F: FnOnce(&S, &str, Listener) -> Box<dyn ListenerHandle> + Send + 'static,
{
    let (emitter, stream) = EventStream::channel();
    let subscription = stream.subscription();
    let event = event.to_string();
    let listener: Listener = Arc::new(zone.wrap(move |payload: NativeEvent| {
        emitter.emit(payload);
    }));

    target.when_settled(move |outcome| match outcome {
        Ok(target) => {
            if subscription.is_disposed() {
                trace!(event = %event, "Stream disposed before target resolved");
                return;
            }
            subscription.attach(register(target, &event, listener));
        }
        Err(err) => trace!(event = %event, error = %err, "Event target never resolved"),
    });

    stream
}
