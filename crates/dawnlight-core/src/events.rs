use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alarm::AlarmRecord;
use crate::ambient::Rgb;
use crate::lock;

/// Every engine lifecycle change produces an Event.
/// The UI subscribes to them; the CLI prints them as JSON lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    SunriseStarted {
        alarm: AlarmRecord,
        /// Minutes.
        duration: u32,
        at: DateTime<Utc>,
    },
    SunriseProgress {
        color: Rgb,
        progress: f64,
    },
    SunriseComplete {
        alarm: AlarmRecord,
        at: DateTime<Utc>,
    },
    /// The active alarm was disabled or deleted while its sunrise was running.
    SunriseCancelled {
        alarm: AlarmRecord,
        at: DateTime<Utc>,
    },
    AlarmTriggered {
        alarm: AlarmRecord,
        /// True when this ring is the re-ring after a snooze.
        #[serde(default)]
        snoozed: bool,
        at: DateTime<Utc>,
    },
    AlarmSnoozed {
        minutes: u32,
        at: DateTime<Utc>,
    },
    AlarmDismissed {
        at: DateTime<Utc>,
    },
}

impl Event {
    /// Stable snake_case event name.
    pub fn name(&self) -> &'static str {
        match self {
            Event::SunriseStarted { .. } => "sunrise_started",
            Event::SunriseProgress { .. } => "sunrise_progress",
            Event::SunriseComplete { .. } => "sunrise_complete",
            Event::SunriseCancelled { .. } => "sunrise_cancelled",
            Event::AlarmTriggered { .. } => "alarm_triggered",
            Event::AlarmSnoozed { .. } => "alarm_snoozed",
            Event::AlarmDismissed { .. } => "alarm_dismissed",
        }
    }
}

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;
pub type Handler = Arc<dyn Fn(&Event) -> Result<(), HandlerError> + Send + Sync>;

/// Token returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: Vec<(SubscriptionId, Handler)>,
}

/// Ordered, synchronous broadcast of [`Event`]s.
///
/// Handlers run in registration order on the emitting thread. The registry
/// lock is not held while handlers run, so a handler may subscribe,
/// unsubscribe or call back into the engine.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let mut registry = lock(&self.registry);
        registry.next_id += 1;
        let id = SubscriptionId(registry.next_id);
        registry.handlers.push((id, Arc::new(handler)));
        id
    }

    /// Returns false if the token was unknown or already removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = lock(&self.registry);
        let before = registry.handlers.len();
        registry.handlers.retain(|(sid, _)| *sid != id);
        registry.handlers.len() != before
    }

    pub fn len(&self) -> usize {
        lock(&self.registry).handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver to every handler; a failing or panicking handler is logged
    /// and skipped.
    pub fn emit(&self, event: &Event) {
        let handlers: Vec<Handler> = lock(&self.registry)
            .handlers
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();

        for handler in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(event = event.name(), "event handler failed: {e}"),
                Err(_) => tracing::error!(event = event.name(), "event handler panicked"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dismissed() -> Event {
        Event::AlarmDismissed { at: Utc::now() }
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            bus.subscribe(move |_| {
                seen.lock().unwrap().push(tag);
                Ok(())
            });
        }
        bus.emit(&dismissed());
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn failing_handlers_do_not_block_others() {
        let bus = EventBus::new();
        let delivered = Arc::new(Mutex::new(0));
        bus.subscribe(|_| Err("boom".into()));
        bus.subscribe(|_| panic!("handler panic"));
        let d = Arc::clone(&delivered);
        bus.subscribe(move |_| {
            *d.lock().unwrap() += 1;
            Ok(())
        });

        bus.emit(&dismissed());
        bus.emit(&dismissed());
        assert_eq!(*delivered.lock().unwrap(), 2);
    }

    #[test]
    fn unsubscribe_by_token() {
        let bus = EventBus::new();
        let a = bus.subscribe(|_| Ok(()));
        let _b = bus.subscribe(|_| Ok(()));
        assert_eq!(bus.len(), 2);
        assert!(bus.unsubscribe(a));
        assert!(!bus.unsubscribe(a));
        assert_eq!(bus.len(), 1);
    }

    #[test]
    fn handler_may_unsubscribe_itself() {
        let bus = EventBus::new();
        let slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::default();
        let (b, s) = (bus.clone(), Arc::clone(&slot));
        let id = bus.subscribe(move |_| {
            if let Some(id) = *s.lock().unwrap() {
                b.unsubscribe(id);
            }
            Ok(())
        });
        *slot.lock().unwrap() = Some(id);
        bus.emit(&dismissed());
        assert!(bus.is_empty());
    }

    #[test]
    fn events_serialize_with_snake_case_tag() {
        let json = serde_json::to_value(Event::AlarmSnoozed {
            minutes: 9,
            at: Utc::now(),
        })
        .unwrap();
        assert_eq!(json["type"], "alarm_snoozed");
        assert_eq!(json["minutes"], 9);
        assert_eq!(dismissed().name(), "alarm_dismissed");
    }
}
