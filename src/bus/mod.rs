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

//! Publish/subscribe bus for adapter broadcast events.

mod owner;

pub use owner::OwnerContext;

use parking_lot::Mutex;
use std::collections::HashSet;
use std::io;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::events::{EventKind, RawEvent};

/// Callback invoked on the owner context for every matching event.
pub type Listener = Arc<dyn Fn(&RawEvent) + Send + Sync>;

/// Handle identifying one listener registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrationId(u64);

/// Set of event kinds a listener is interested in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    kinds: HashSet<EventKind>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, kind: EventKind) {
        self.kinds.insert(kind);
    }

    pub fn matches(&self, event: &RawEvent) -> bool {
        self.kinds.contains(&event.kind())
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

impl FromIterator<EventKind> for EventFilter {
    fn from_iter<I: IntoIterator<Item = EventKind>>(iter: I) -> Self {
        Self {
            kinds: iter.into_iter().collect(),
        }
    }
}

/// Host-supplied event bus.
///
/// `register` and `unregister` must run on [`EventBus::owner`]; listeners are
/// invoked there as well. `emit` may be called from any thread.
pub trait EventBus: Send + Sync {
    /// Add a listener for events matching `filter`.
    fn register(&self, filter: EventFilter, listener: Listener) -> RegistrationId;

    /// Remove a listener. Unknown ids are ignored.
    fn unregister(&self, id: RegistrationId);

    /// Broadcast an event to every matching listener.
    fn emit(&self, event: RawEvent);

    /// Context that owns registrations and delivers events.
    fn owner(&self) -> &OwnerContext;
}

struct Registration {
    id: RegistrationId,
    filter: EventFilter,
    listener: Listener,
}

/// In-process bus delivering events on its own owner thread.
pub struct LocalEventBus {
    owner: OwnerContext,
    registrations: Arc<Mutex<Vec<Registration>>>,
    next_id: AtomicU64,
    total_registered: AtomicUsize,
    total_unregistered: AtomicUsize,
}

impl LocalEventBus {
    /// Create a bus with a dedicated delivery thread.
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            owner: OwnerContext::spawn("event-bus")?,
            registrations: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(1),
            total_registered: AtomicUsize::new(0),
            total_unregistered: AtomicUsize::new(0),
        })
    }

    /// Number of currently registered listeners.
    pub fn active_registrations(&self) -> usize {
        self.registrations.lock().len()
    }

    /// Number of successful `register` calls since creation.
    pub fn total_registrations(&self) -> usize {
        self.total_registered.load(Ordering::SeqCst)
    }

    /// Number of `unregister` calls that removed a listener.
    pub fn total_unregistrations(&self) -> usize {
        self.total_unregistered.load(Ordering::SeqCst)
    }

    fn deliver(registrations: &Mutex<Vec<Registration>>, event: &RawEvent) {
        // Snapshot so listeners can unregister while being called.
        let listeners: Vec<Listener> = registrations
            .lock()
            .iter()
            .filter(|r| r.filter.matches(event))
            .map(|r| r.listener.clone())
            .collect();

        debug!("Delivering {} to {} listener(s)", event, listeners.len());
        for listener in listeners {
            listener(event);
        }
    }
}

impl EventBus for LocalEventBus {
    fn register(&self, filter: EventFilter, listener: Listener) -> RegistrationId {
        debug_assert!(self.owner.is_current(), "register called off the owner thread");
        let id = RegistrationId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.registrations.lock().push(Registration {
            id,
            filter,
            listener,
        });
        self.total_registered.fetch_add(1, Ordering::SeqCst);
        debug!("Registered listener {:?}", id);
        id
    }

    fn unregister(&self, id: RegistrationId) {
        debug_assert!(self.owner.is_current(), "unregister called off the owner thread");
        let removed = {
            let mut registrations = self.registrations.lock();
            let before = registrations.len();
            registrations.retain(|r| r.id != id);
            before != registrations.len()
        };
        if removed {
            self.total_unregistered.fetch_add(1, Ordering::SeqCst);
            debug!("Unregistered listener {:?}", id);
        }
    }

    fn emit(&self, event: RawEvent) {
        let registrations = self.registrations.clone();
        self.owner
            .post(move || Self::deliver(&registrations, &event));
    }

    fn owner(&self) -> &OwnerContext {
        &self.owner
    }
}
