//! Cross-view refresh bus.
//!
//! Mutation sites (mint, transfer, delete) publish here; mounted views
//! subscribe so their cached lists stay consistent without a shared server.
//! The bus is an explicit object handed to whoever needs it, constructed
//! once at startup - no module-level singleton.

use std::sync::{Arc, Mutex};

use log::debug;
use uuid::Uuid;

/// Typed event schema. One variant today; mutation kind can grow here
/// without breaking subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshEvent {
    /// Some token set belonging to `owner` changed (mint, transfer, delete).
    Mutated { owner: String },
}

impl RefreshEvent {
    pub fn owner(&self) -> &str {
        match self {
            RefreshEvent::Mutated { owner } => owner,
        }
    }
}

type Handler = Arc<dyn Fn(&RefreshEvent) + Send + Sync>;

/// Opaque unsubscribe token returned by `subscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionToken(Uuid);

#[derive(Default)]
pub struct RefreshBus {
    /// Registration order is delivery order.
    listeners: Mutex<Vec<(Uuid, Handler)>>,
}

impl RefreshBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. The caller must unsubscribe when its view
    /// unmounts, or the handler keeps firing against disposed state.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionToken
    where
        F: Fn(&RefreshEvent) + Send + Sync + 'static,
    {
        let id = Uuid::new_v4();
        self.listeners
            .lock()
            .expect("refresh bus lock poisoned")
            .push((id, Arc::new(handler)));
        SubscriptionToken(id)
    }

    pub fn unsubscribe(&self, token: SubscriptionToken) {
        self.listeners
            .lock()
            .expect("refresh bus lock poisoned")
            .retain(|(id, _)| *id != token.0);
    }

    /// Fire-and-forget delivery to exactly the listeners alive right now,
    /// synchronously, in registration order. Listeners added during
    /// delivery see only later events.
    pub fn publish(&self, event: RefreshEvent) {
        let snapshot: Vec<Handler> = self
            .listeners
            .lock()
            .expect("refresh bus lock poisoned")
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();
        debug!(
            "🔔 [BUS] Publishing {:?} to {} listener(s)",
            event,
            snapshot.len()
        );
        for handler in snapshot {
            handler(&event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .expect("refresh bus lock poisoned")
            .len()
    }
}
