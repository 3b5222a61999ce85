use event_log::DomainEvent;
use notifications::DomainNotification;

/// The kind tag a message dispatches under.
///
/// Handler registration is keyed by this explicit tag, resolved once at
/// startup into a static mapping table; there is no runtime-type dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// A domain event raised by domain logic.
    Event,

    /// A business-rule outcome raised by domain or validation logic.
    Notification,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageKind::Event => write!(f, "event"),
            MessageKind::Notification => write!(f, "notification"),
        }
    }
}

/// A message published through the mediator during the collecting phase.
#[derive(Debug, Clone)]
pub enum Message {
    /// A domain event to be staged for the current unit of work.
    Event(DomainEvent),

    /// A notification to be buffered for the current unit of work.
    Notification(DomainNotification),
}

impl Message {
    /// Returns the kind tag this message dispatches under.
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Event(_) => MessageKind::Event,
            Message::Notification(_) => MessageKind::Notification,
        }
    }
}

impl From<DomainEvent> for Message {
    fn from(event: DomainEvent) -> Self {
        Message::Event(event)
    }
}

impl From<DomainNotification> for Message {
    fn from(notification: DomainNotification) -> Self {
        Message::Notification(notification)
    }
}
