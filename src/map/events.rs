//! Notifications raised to the host.
//!
//! Hooks run synchronously while an event is dispatched and may veto it or
//! rewrite its payload; every dispatched event is then recorded in the
//! outbox, which the host drains when convenient.

use glam::DVec2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Region,
    Marker,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MapEvent {
    ElementOver { kind: ElementKind, id: String },
    ElementOut { kind: ElementKind, id: String },
    ElementClick { kind: ElementKind, id: String },
    /// Selection of `id` changed to `selected`; `selection` lists every
    /// element of that kind selected afterwards.
    ElementSelected { kind: ElementKind, id: String, selected: bool, selection: Vec<String> },
    /// The tip is about to show `text`. Hooks may rewrite it.
    TipShow { kind: ElementKind, id: String, text: String },
    /// Zoom relative to the base scale, and the absolute translation.
    ViewportChanged { zoom: f64, translate: DVec2 },
    DrillDownStarted { code: String },
    DrillDownCompleted { code: String, map_name: String, level: usize },
    DrillDownFailed { code: String, reason: String },
    WentBack { map_name: String, level: usize },
}

/// What a hook wants done with the event it saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Prevent,
}

pub type Hook = Box<dyn FnMut(&mut MapEvent) -> Flow>;

#[derive(Default)]
pub struct EventBus {
    hooks: Vec<Hook>,
    events: Vec<MapEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_hook(&mut self, hook: impl FnMut(&mut MapEvent) -> Flow + 'static) {
        self.hooks.push(Box::new(hook));
    }

    /// Run every hook, record the event and report whether it may proceed.
    /// All hooks see the event even after one of them prevented it.
    pub fn dispatch(&mut self, mut event: MapEvent) -> (bool, MapEvent) {
        let mut allowed = true;
        for hook in &mut self.hooks {
            if hook(&mut event) == Flow::Prevent {
                allowed = false;
            }
        }
        self.events.push(event.clone());
        (allowed, event)
    }

    /// Record an event nobody can veto.
    pub fn emit(&mut self, event: MapEvent) {
        self.dispatch(event);
    }

    pub fn events(&self) -> &[MapEvent] {
        &self.events
    }

    pub fn drain(&mut self) -> Vec<MapEvent> {
        std::mem::take(&mut self.events)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("hooks", &self.hooks.len())
            .field("events", &self.events)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn over(id: &str) -> MapEvent {
        MapEvent::ElementOver { kind: ElementKind::Region, id: id.into() }
    }

    #[test]
    fn test_records_events() {
        let mut bus = EventBus::new();
        bus.emit(over("A"));
        assert_eq!(bus.events().len(), 1);
        assert_eq!(bus.drain(), vec![over("A")]);
        assert!(bus.events().is_empty());
    }

    #[test]
    fn test_hook_can_prevent_and_rewrite() {
        let mut bus = EventBus::new();
        bus.add_hook(|event| match event {
            MapEvent::ElementOver { id, .. } if id == "B" => Flow::Prevent,
            MapEvent::TipShow { text, .. } => {
                text.push_str(" (2024)");
                Flow::Continue
            }
            _ => Flow::Continue,
        });
        assert!(bus.dispatch(over("A")).0);
        assert!(!bus.dispatch(over("B")).0);
        let (allowed, event) = bus.dispatch(MapEvent::TipShow {
            kind: ElementKind::Region,
            id: "A".into(),
            text: "Alpha".into(),
        });
        assert!(allowed);
        assert!(matches!(event, MapEvent::TipShow { text, .. } if text == "Alpha (2024)"));
        assert_eq!(bus.events().len(), 3);
    }
}
