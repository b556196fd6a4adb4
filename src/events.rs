//! Geometry change notifications. Whoever moves nodes publishes an event;
//! consumers that cache geometry subscribe instead of being called directly.

use crate::routing::geometry::Rect;

#[derive(Debug, Clone, PartialEq)]
pub enum GeometryEvent {
    NodeMoved { id: String, rect: Rect },
    NodeRemoved { id: String },
    /// Every position changed at once, e.g. after a relayout.
    LayoutReplaced,
}

pub trait GeometryObserver {
    fn on_geometry_event(&mut self, event: &GeometryEvent);
}

#[derive(Default)]
pub struct EventBus {
    observers: Vec<Box<dyn GeometryObserver>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: Box<dyn GeometryObserver>) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Delivers `event` to every observer in subscription order.
    pub fn publish(&mut self, event: &GeometryEvent) {
        log::trace!("geometry event {event:?} to {} observers", self.observers.len());
        for observer in &mut self.observers {
            observer.on_geometry_event(event);
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("observers", &self.observers.len())
            .finish()
    }
}
