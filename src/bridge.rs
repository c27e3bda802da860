// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Bridge from bus listener registration to an async event stream.
//!
//! An [`EventBridge`] is cold: nothing happens until it is first polled. On
//! that first poll the optional start operation runs on the bus owner
//! context, then (unless the start event already satisfied the exit
//! condition) a listener is registered. The listener is removed when the exit
//! condition is met, when the start operation fails, or when the bridge is
//! dropped, whichever comes first, and never more than once.
//!
//! Delivery never waits for the consumer. Events it has not polled yet stay
//! queued on the bridge in bus order, so one idle stream cannot hold up the
//! owner context for every other bridge on the bus.

use futures::stream::BoxStream;
use futures::{ready, Stream, StreamExt};
use parking_lot::Mutex;
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tracing::{debug, warn};

use crate::bluetooth::AdapterError;
use crate::bus::{EventBus, EventFilter, Listener, RegistrationId};
use crate::error::BridgeError;
use crate::events::{EventKind, RawEvent};

/// Deferred action run once when the bridge is first polled.
pub type StartOperation = Box<dyn FnOnce() -> Result<Option<RawEvent>, AdapterError> + Send>;

/// Predicate that ends the stream.
pub type ExitCondition = Arc<dyn Fn(&RawEvent) -> bool + Send + Sync>;

type Delivery = Result<RawEvent, BridgeError>;

#[derive(Default)]
struct SubscriptionState {
    registration: Option<RegistrationId>,
    finished: bool,
}

/// Registration slot shared between the stream, its listener and the owner
/// context.
#[derive(Default)]
struct Subscription {
    state: Mutex<SubscriptionState>,
}

impl Subscription {
    fn is_finished(&self) -> bool {
        self.state.lock().finished
    }

    fn mark_finished(&self) {
        self.state.lock().finished = true;
    }

    /// Mark finished and drop the registration. Runs on the owner context.
    fn release(&self, bus: &dyn EventBus) {
        let registration = {
            let mut state = self.state.lock();
            state.finished = true;
            state.registration.take()
        };
        if let Some(id) = registration {
            bus.unregister(id);
        }
    }

    /// Keep `id` unless the subscription was cancelled meanwhile.
    fn attach(&self, bus: &dyn EventBus, id: RegistrationId) {
        let mut state = self.state.lock();
        if state.finished {
            drop(state);
            bus.unregister(id);
        } else {
            state.registration = Some(id);
        }
    }
}

struct Setup {
    filter: EventFilter,
    start: Option<StartOperation>,
    exit: Option<ExitCondition>,
    include_exit: bool,
    tx: async_channel::Sender<Delivery>,
}

/// Releases the registration when the bridge is dropped.
struct CancelGuard {
    bus: Arc<dyn EventBus>,
    subscription: Arc<Subscription>,
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        self.subscription.mark_finished();
        let bus = self.bus.clone();
        let subscription = self.subscription.clone();
        self.bus
            .owner()
            .run_or_post(move || subscription.release(bus.as_ref()));
    }
}

pin_project! {
    /// Cold, single-subscriber stream of bus events.
    pub struct EventBridge {
        setup: Option<Setup>,
        guard: CancelGuard,
        #[pin]
        events: async_channel::Receiver<Delivery>,
    }
}

impl EventBridge {
    /// Start building a bridge on `bus`.
    pub fn builder(bus: Arc<dyn EventBus>) -> EventBridgeBuilder {
        EventBridgeBuilder {
            bus,
            filter: EventFilter::new(),
            start: None,
            exit: None,
            include_exit: false,
        }
    }

    /// Consume the bridge, discarding events, until it completes or fails.
    pub async fn drain(self) -> Result<(), BridgeError> {
        let mut events = Box::pin(self);
        while let Some(item) = events.next().await {
            item?;
        }
        Ok(())
    }
}

impl Stream for EventBridge {
    type Item = Result<RawEvent, BridgeError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        if let Some(setup) = this.setup.take() {
            let bus = this.guard.bus.clone();
            let subscription = this.guard.subscription.clone();
            this.guard
                .bus
                .owner()
                .run_or_post(move || subscribe(bus, subscription, setup));
        }
        this.events.poll_next(cx)
    }
}

fn deliver(tx: &async_channel::Sender<Delivery>, event: RawEvent) {
    // Unbounded, so this only fails once the consumer is gone.
    if tx.try_send(Ok(event)).is_err() {
        debug!("Bridge consumer is gone, dropping event");
    }
}

fn subscribe(bus: Arc<dyn EventBus>, subscription: Arc<Subscription>, setup: Setup) {
    if subscription.is_finished() {
        debug!("Bridge cancelled before subscription started");
        return;
    }

    let Setup {
        filter,
        start,
        exit,
        include_exit,
        tx,
    } = setup;

    if let Some(start) = start {
        match start() {
            Err(e) => {
                warn!("Start operation failed: {}", e);
                subscription.mark_finished();
                let _ = tx.try_send(Err(BridgeError::StartOperation(e)));
                tx.close();
                return;
            }
            Ok(Some(event)) => {
                let satisfied = exit.as_ref().map(|exit| exit(&event)).unwrap_or(false);
                if include_exit || !satisfied {
                    deliver(&tx, event);
                }
                if satisfied {
                    debug!("Exit condition already met, listener not registered");
                    subscription.mark_finished();
                    tx.close();
                    return;
                }
            }
            Ok(None) => {}
        }
    }

    let weak_bus: Weak<dyn EventBus> = Arc::downgrade(&bus);
    let listener_subscription = subscription.clone();
    let listener: Listener = Arc::new(move |event: &RawEvent| {
        if listener_subscription.is_finished() {
            return;
        }
        let satisfied = exit.as_ref().map(|exit| exit(event)).unwrap_or(false);
        if include_exit || !satisfied {
            deliver(&tx, event.clone());
        }
        if satisfied {
            debug!("Exit condition met by {}", event);
            if let Some(bus) = weak_bus.upgrade() {
                listener_subscription.release(bus.as_ref());
            }
            tx.close();
        }
    });

    let id = bus.register(filter, listener);
    subscription.attach(bus.as_ref(), id);
}

/// Builder for [`EventBridge`].
pub struct EventBridgeBuilder {
    bus: Arc<dyn EventBus>,
    filter: EventFilter,
    start: Option<StartOperation>,
    exit: Option<ExitCondition>,
    include_exit: bool,
}

impl EventBridgeBuilder {
    pub fn add_filter(mut self, kind: EventKind) -> Self {
        self.filter.add(kind);
        self
    }

    pub fn add_filters(mut self, kinds: impl IntoIterator<Item = EventKind>) -> Self {
        for kind in kinds {
            self.filter.add(kind);
        }
        self
    }

    /// Action run once, before the listener is registered.
    pub fn start_operation(
        mut self,
        op: impl FnOnce() -> Result<Option<RawEvent>, AdapterError> + Send + 'static,
    ) -> Self {
        self.start = Some(Box::new(op));
        self
    }

    pub fn exit_condition(mut self, condition: impl Fn(&RawEvent) -> bool + Send + Sync + 'static) -> Self {
        self.exit = Some(Arc::new(condition));
        self
    }

    /// Deliver the event that satisfies the exit condition before completing.
    pub fn include_exit_event(mut self) -> Self {
        self.include_exit = true;
        self
    }

    pub fn build(self) -> Result<EventBridge, BridgeError> {
        if self.filter.is_empty() {
            return Err(BridgeError::EmptyFilter);
        }

        let (tx, events) = async_channel::unbounded();
        Ok(EventBridge {
            setup: Some(Setup {
                filter: self.filter,
                start: self.start,
                exit: self.exit,
                include_exit: self.include_exit,
                tx,
            }),
            guard: CancelGuard {
                bus: self.bus,
                subscription: Arc::new(Subscription::default()),
            },
            events,
        })
    }
}

struct UntilError<T, E> {
    inner: Option<BoxStream<'static, Result<T, E>>>,
}

impl<T, E> Stream for UntilError<T, E> {
    type Item = Result<T, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let Some(inner) = self.inner.as_mut() else {
            return Poll::Ready(None);
        };
        let item = ready!(inner.as_mut().poll_next(cx));
        if !matches!(item, Some(Ok(_))) {
            // Drop the source right away so its listener is released.
            self.inner = None;
        }
        Poll::Ready(item)
    }
}

/// End `stream` after its first error, releasing the source immediately.
pub(crate) fn until_error<T, E>(stream: BoxStream<'static, Result<T, E>>) -> BoxStream<'static, Result<T, E>>
where
    T: Send + 'static,
    E: Send + 'static,
{
    UntilError {
        inner: Some(stream),
    }
    .boxed()
}
