//! Per-session event bus.
//!
//! Inbound semantic events (a chat line, a log line, a join or leave) are
//! fanned out to prioritized listeners. Listeners are registered under an
//! owner [`ListenerToken`]; revoking the token invalidates every listener it
//! owns as a batch, which is how plugins and shells drop their listeners
//! without touching each session they subscribed to.
//!
//! # Mute semantics
//!
//! Dispatch passes one mutable event value to every listener in descending
//! priority order. A listener may flip a `muted` flag on the event to signal
//! that later listeners should skip processing, but dispatch itself never
//! stops: every listener runs and must check the flag itself. This is a
//! cooperative convention, not hard cancellation, and it is deliberate.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

type BoxedListener = Box<dyn FnMut(&mut dyn Any) + Send>;

/// Ownership token for event listeners.
///
/// Every listener is registered under a token; once the token is revoked the
/// listener is treated as stale, skipped on dispatch and pruned from the
/// listener set.
#[derive(Clone)]
pub struct ListenerToken {
    live: Arc<AtomicBool>,
}

impl ListenerToken {
    /// Creates a fresh, live token.
    pub fn new() -> Self {
        Self {
            live: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Revokes the token, invalidating every listener registered under it.
    pub fn revoke(&self) {
        self.live.store(false, Ordering::SeqCst);
    }

    /// Whether listeners owned by this token are still valid.
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

impl Default for ListenerToken {
    fn default() -> Self {
        Self::new()
    }
}

struct ListenerEntry {
    priority: i32,
    owner: Arc<AtomicBool>,
    callback: Arc<Mutex<BoxedListener>>,
}

/// Priority-ordered fan-out of typed events to registered listeners.
pub struct EventBus {
    listeners: Mutex<HashMap<TypeId, Vec<ListenerEntry>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a listener for events of type `E` under the given owner
    /// token. Higher priorities are invoked first; listeners with equal
    /// priority run in registration order.
    pub fn listen<E, F>(&self, owner: &ListenerToken, priority: i32, mut listener: F)
    where
        E: Any + Send,
        F: FnMut(&mut E) + Send + 'static,
    {
        let callback: BoxedListener = Box::new(move |event: &mut dyn Any| {
            if let Some(event) = event.downcast_mut::<E>() {
                listener(event);
            }
        });
        let entry = ListenerEntry {
            priority,
            owner: owner.live.clone(),
            callback: Arc::new(Mutex::new(callback)),
        };
        let Ok(mut listeners) = self.listeners.lock() else {
            return;
        };
        let slot = listeners.entry(TypeId::of::<E>()).or_default();
        // Stable insert: after the last entry with priority >= ours.
        let position = slot
            .iter()
            .rposition(|existing| existing.priority >= priority)
            .map(|i| i + 1)
            .unwrap_or(0);
        slot.insert(position, entry);
    }

    /// Dispatches an event to every live listener in priority order.
    ///
    /// The event value is shared mutably down the chain; a listener setting
    /// a `muted` flag relies on later listeners checking it, dispatch does
    /// not short-circuit. Listeners whose owner token has been revoked are
    /// pruned here.
    pub fn fire<E>(&self, event: &mut E)
    where
        E: Any + Send,
    {
        let snapshot: Vec<Arc<Mutex<BoxedListener>>> = {
            let Ok(mut listeners) = self.listeners.lock() else {
                return;
            };
            let Some(slot) = listeners.get_mut(&TypeId::of::<E>()) else {
                return;
            };
            slot.retain(|entry| entry.owner.load(Ordering::SeqCst));
            slot.iter().map(|entry| entry.callback.clone()).collect()
        };
        for callback in snapshot {
            if let Ok(mut callback) = callback.lock() {
                callback(event);
            }
        }
    }

    /// Number of live listeners currently registered for `E`.
    pub fn listener_count<E: Any>(&self) -> usize {
        let Ok(listeners) = self.listeners.lock() else {
            return 0;
        };
        listeners
            .get(&TypeId::of::<E>())
            .map(|slot| {
                slot.iter()
                    .filter(|entry| entry.owner.load(Ordering::SeqCst))
                    .count()
            })
            .unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestEvent {
        trace: Vec<&'static str>,
        muted: bool,
    }

    #[test]
    fn listeners_run_in_priority_order() {
        let bus = EventBus::new();
        let token = ListenerToken::new();
        bus.listen::<TestEvent, _>(&token, 0, |e| e.trace.push("low"));
        bus.listen::<TestEvent, _>(&token, 10, |e| e.trace.push("high"));
        bus.listen::<TestEvent, _>(&token, 5, |e| e.trace.push("mid"));

        let mut event = TestEvent {
            trace: Vec::new(),
            muted: false,
        };
        bus.fire(&mut event);
        assert_eq!(event.trace, vec!["high", "mid", "low"]);
    }

    #[test]
    fn equal_priority_keeps_registration_order() {
        let bus = EventBus::new();
        let token = ListenerToken::new();
        bus.listen::<TestEvent, _>(&token, 1, |e| e.trace.push("first"));
        bus.listen::<TestEvent, _>(&token, 1, |e| e.trace.push("second"));

        let mut event = TestEvent {
            trace: Vec::new(),
            muted: false,
        };
        bus.fire(&mut event);
        assert_eq!(event.trace, vec!["first", "second"]);
    }

    #[test]
    fn mute_is_cooperative_not_short_circuiting() {
        let bus = EventBus::new();
        let token = ListenerToken::new();
        bus.listen::<TestEvent, _>(&token, 10, |e| {
            e.muted = true;
            e.trace.push("muter");
        });
        // A well-behaved low-priority listener checks the flag itself.
        bus.listen::<TestEvent, _>(&token, 0, |e| {
            if e.muted {
                e.trace.push("saw-mute");
            } else {
                e.trace.push("processed");
            }
        });

        let mut event = TestEvent {
            trace: Vec::new(),
            muted: false,
        };
        bus.fire(&mut event);
        // Both listeners ran; the second observed the flag.
        assert_eq!(event.trace, vec!["muter", "saw-mute"]);
    }

    #[test]
    fn revoked_token_invalidates_listeners() {
        let bus = EventBus::new();
        let stale = ListenerToken::new();
        let live = ListenerToken::new();
        bus.listen::<TestEvent, _>(&stale, 0, |e| e.trace.push("stale"));
        bus.listen::<TestEvent, _>(&live, 0, |e| e.trace.push("live"));
        stale.revoke();

        let mut event = TestEvent {
            trace: Vec::new(),
            muted: false,
        };
        bus.fire(&mut event);
        assert_eq!(event.trace, vec!["live"]);
        assert_eq!(bus.listener_count::<TestEvent>(), 1);
    }

    #[test]
    fn fire_without_listeners_is_harmless() {
        let bus = EventBus::new();
        let mut event = TestEvent {
            trace: Vec::new(),
            muted: false,
        };
        bus.fire(&mut event);
        assert!(event.trace.is_empty());
    }
}
