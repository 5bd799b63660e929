use tracing::{info, warn};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A failure that was swallowed so that sibling work could continue.
    Error,
    /// Something the user should be told about that is not a failure.
    Notification,
}

/// One entry on the application's error/notification channel.
///
/// UI layers drain these and present them; the core never halts silently,
/// so every failure it recovers from ends up here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub sequence: u64,
    pub kind: EventKind,
    pub title: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct EventBus {
    next_sequence: u64,
    events: Vec<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, kind: EventKind, title: impl Into<String>, message: impl Into<String>) {
        let title = title.into();
        let message = message.into();
        match kind {
            EventKind::Error => warn!(%title, %message, "error raised"),
            EventKind::Notification => info!(%title, %message, "notification raised"),
        }
        self.events.push(Event {
            sequence: self.next_sequence,
            kind,
            title,
            message,
        });
        self.next_sequence += 1;
    }

    pub fn error(&mut self, title: impl Into<String>, message: impl Into<String>) {
        self.emit(EventKind::Error, title, message);
    }

    pub fn notify(&mut self, title: impl Into<String>, message: impl Into<String>) {
        self.emit(EventKind::Notification, title, message);
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn errors(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().filter(|e| e.kind == EventKind::Error)
    }

    pub fn drain(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::{EventBus, EventKind};

    #[test]
    fn records_events_in_sequence() {
        let mut bus = EventBus::new();
        bus.error("Failed", "boom");
        bus.notify("Converted", "share link");
        assert_eq!(bus.events().len(), 2);
        assert_eq!(bus.events()[0].sequence, 0);
        assert_eq!(bus.events()[1].sequence, 1);
        assert_eq!(bus.events()[1].kind, EventKind::Notification);
        assert_eq!(bus.errors().count(), 1);
    }

    #[test]
    fn drain_clears_events_but_keeps_numbering() {
        let mut bus = EventBus::new();
        bus.error("k", "m");
        let drained = bus.drain();
        assert_eq!(drained.len(), 1);
        assert!(bus.events().is_empty());
        bus.error("k", "m");
        assert_eq!(bus.events()[0].sequence, 1);
    }
}
