use crate::slurm::object::Resource;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Added,
    Modified,
    Deleted,
}

/// A change the informer observed in the remote state.
///
/// `object_old` is only set for [`EventType::Modified`].
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub event_type: EventType,
    pub object: Resource,
    pub object_old: Option<Resource>,
}

impl Event {
    #[must_use]
    pub const fn added(object: Resource) -> Self {
        Self {
            event_type: EventType::Added,
            object,
            object_old: None,
        }
    }

    #[must_use]
    pub const fn modified(object_old: Resource, object: Resource) -> Self {
        Self {
            event_type: EventType::Modified,
            object,
            object_old: Some(object_old),
        }
    }

    #[must_use]
    pub const fn deleted(object: Resource) -> Self {
        Self {
            event_type: EventType::Deleted,
            object,
            object_old: None,
        }
    }
}

/// Sink for informer events. Called from the informer's dispatcher task, so
/// implementations should hand work off rather than block.
pub trait EventHandler: Send + Sync {
    fn on_add(&self, object: &Resource, has_synced: bool);

    fn on_update(&self, object_old: &Resource, object_new: &Resource);

    fn on_delete(&self, object: &Resource);
}

/// Forwards every event into a channel
pub struct ChannelHandler {
    sender: mpsc::UnboundedSender<Event>,
}

impl ChannelHandler {
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl EventHandler for ChannelHandler {
    fn on_add(&self, object: &Resource, _has_synced: bool) {
        // Send update, ignore if receiver dropped
        let _ = self.sender.send(Event::added(object.clone()));
    }

    fn on_update(&self, object_old: &Resource, object_new: &Resource) {
        let _ = self
            .sender
            .send(Event::modified(object_old.clone(), object_new.clone()));
    }

    fn on_delete(&self, object: &Resource) {
        let _ = self.sender.send(Event::deleted(object.clone()));
    }
}
