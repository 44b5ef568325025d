//! # Change Events
//!
//! The world calls its listener synchronously after every structural change:
//! entity creation and removal, component add/remove, and relation target
//! changes. Listeners declare which kinds of change they care about and may
//! restrict themselves to a set of components.

use std::ops::BitOr;
use std::sync::Arc;

use parking_lot::Mutex;

use super::component::ComponentId;
use super::entity::Entity;
use super::mask::Mask;

/// Coarse event category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// The entity was created.
    Added,
    /// The entity is being removed.
    Removed,
    /// Components or the relation target changed.
    Changed,
}

/// Set of change kinds a listener wants to hear about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Subscription(u8);

impl Subscription {
    /// Nothing.
    pub const NONE: Self = Self(0);
    /// Entity creation.
    pub const ENTITY_CREATED: Self = Self(1);
    /// Entity removal.
    pub const ENTITY_REMOVED: Self = Self(1 << 1);
    /// Components added to an existing entity.
    pub const COMPONENT_ADDED: Self = Self(1 << 2);
    /// Components removed from an existing entity.
    pub const COMPONENT_REMOVED: Self = Self(1 << 3);
    /// The entity gained or lost its relation component.
    pub const RELATION_CHANGED: Self = Self(1 << 4);
    /// The relation target changed.
    pub const TARGET_CHANGED: Self = Self(1 << 5);
    /// Everything.
    pub const ALL: Self = Self(0b11_1111);

    /// Whether all bits of `other` are set.
    #[inline]
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether any bit of `other` is set.
    #[inline]
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for Subscription {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// A structural change of one entity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntityEvent {
    /// The affected entity.
    pub entity: Entity,
    /// Coarse category.
    pub kind: EventKind,
    /// Components gained.
    pub added: Mask,
    /// Components lost.
    pub removed: Mask,
    /// Components after the change; for removals, before it.
    pub current: Mask,
    /// Relation component before the change.
    pub old_relation: Option<ComponentId>,
    /// Relation component after the change.
    pub new_relation: Option<ComponentId>,
    /// Relation target before the change.
    pub old_target: Entity,
    /// Relation target after the change.
    pub new_target: Entity,
}

impl EntityEvent {
    /// The change kinds this event belongs to.
    #[must_use]
    pub fn subscriptions(&self) -> Subscription {
        let mut bits = match self.kind {
            EventKind::Added => Subscription::ENTITY_CREATED,
            EventKind::Removed => Subscription::ENTITY_REMOVED,
            EventKind::Changed => Subscription::NONE,
        };
        if self.kind == EventKind::Changed {
            if !self.added.is_empty() {
                bits = bits | Subscription::COMPONENT_ADDED;
            }
            if !self.removed.is_empty() {
                bits = bits | Subscription::COMPONENT_REMOVED;
            }
            if self.old_relation != self.new_relation {
                bits = bits | Subscription::RELATION_CHANGED;
            }
        }
        if self.old_target != self.new_target {
            bits = bits | Subscription::TARGET_CHANGED;
        }
        bits
    }

    /// Whether the change touches any component in `components`.
    #[must_use]
    pub fn touches(&self, components: &Mask) -> bool {
        match self.kind {
            EventKind::Added | EventKind::Removed => self.current.contains_any(components),
            EventKind::Changed => {
                self.added.contains_any(components)
                    || self.removed.contains_any(components)
                    || (self.old_target != self.new_target
                        && self.new_relation.is_some_and(|r| components.get(r)))
            }
        }
    }

    /// Whether the entity was just created.
    #[inline]
    #[must_use]
    pub fn entity_created(&self) -> bool {
        self.kind == EventKind::Added
    }

    /// Whether the entity is being removed.
    #[inline]
    #[must_use]
    pub fn entity_removed(&self) -> bool {
        self.kind == EventKind::Removed
    }
}

/// Receiver of [`EntityEvent`]s.
pub trait Listener: Send {
    /// Called after each relevant change.
    fn notify(&mut self, event: &EntityEvent);

    /// Change kinds to deliver.
    fn subscriptions(&self) -> Subscription {
        Subscription::ALL
    }

    /// Restricts delivery to changes touching these components.
    fn components(&self) -> Option<Mask> {
        None
    }

    /// Whether `event` should be delivered.
    fn wants(&self, event: &EntityEvent) -> bool {
        self.subscriptions().intersects(event.subscriptions())
            && self.components().map_or(true, |m| event.touches(&m))
    }
}

impl<F> Listener for F
where
    F: FnMut(&EntityEvent) + Send,
{
    fn notify(&mut self, event: &EntityEvent) {
        self(event);
    }
}

/// Listener that records events into a shared log.
///
/// Clones share the same log, so a clone kept by the caller sees what the
/// copy installed in the world records.
#[derive(Clone, Debug, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<EntityEvent>>>,
    subscriptions: Option<Subscription>,
    components: Option<Mask>,
}

impl EventLog {
    /// Records everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Only records these change kinds.
    #[must_use]
    pub fn subscribed(mut self, subscriptions: Subscription) -> Self {
        self.subscriptions = Some(subscriptions);
        self
    }

    /// Only records changes touching these components.
    #[must_use]
    pub fn for_components(mut self, components: Mask) -> Self {
        self.components = Some(components);
        self
    }

    /// Number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Whether nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Copy of the recorded events.
    #[must_use]
    pub fn snapshot(&self) -> Vec<EntityEvent> {
        self.events.lock().clone()
    }

    /// Removes and returns the recorded events.
    #[must_use]
    pub fn take(&self) -> Vec<EntityEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl Listener for EventLog {
    fn notify(&mut self, event: &EntityEvent) {
        self.events.lock().push(event.clone());
    }

    fn subscriptions(&self) -> Subscription {
        self.subscriptions.unwrap_or(Subscription::ALL)
    }

    fn components(&self) -> Option<Mask> {
        self.components
    }
}

/// Listener that fans each event out to several listeners.
///
/// Subscriptions and components are the union of the inner listeners'.
/// Each inner listener still only sees the events it wants.
#[derive(Default)]
pub struct Dispatch {
    listeners: Vec<Box<dyn Listener>>,
}

impl Dispatch {
    /// No listeners.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a listener, builder style.
    #[must_use]
    pub fn with<L: Listener + 'static>(mut self, listener: L) -> Self {
        self.push(listener);
        self
    }

    /// Adds a listener.
    pub fn push<L: Listener + 'static>(&mut self, listener: L) {
        self.listeners.push(Box::new(listener));
    }

    /// Number of inner listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Whether there are no inner listeners.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl std::fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatch")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Listener for Dispatch {
    fn notify(&mut self, event: &EntityEvent) {
        for listener in &mut self.listeners {
            if listener.wants(event) {
                listener.notify(event);
            }
        }
    }

    fn subscriptions(&self) -> Subscription {
        self.listeners
            .iter()
            .fold(Subscription::NONE, |acc, l| acc | l.subscriptions())
    }

    /// `None` as soon as one inner listener is unrestricted.
    fn components(&self) -> Option<Mask> {
        self.listeners
            .iter()
            .try_fold(Mask::EMPTY, |acc, l| l.components().map(|m| acc | m))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u8) -> ComponentId {
        ComponentId::from_raw(raw)
    }

    fn changed(added: &[ComponentId], removed: &[ComponentId]) -> EntityEvent {
        EntityEvent {
            entity: Entity::new(1, 0),
            kind: EventKind::Changed,
            added: Mask::new(added),
            removed: Mask::new(removed),
            current: Mask::new(added),
            old_relation: None,
            new_relation: None,
            old_target: Entity::ZERO,
            new_target: Entity::ZERO,
        }
    }

    #[test]
    fn test_subscription_bits() {
        let event = changed(&[id(0)], &[id(1)]);
        let bits = event.subscriptions();
        assert!(bits.contains(Subscription::COMPONENT_ADDED | Subscription::COMPONENT_REMOVED));
        assert!(!bits.intersects(Subscription::ENTITY_CREATED));

        let mut retarget = changed(&[], &[]);
        retarget.new_target = Entity::new(3, 0);
        assert_eq!(retarget.subscriptions(), Subscription::TARGET_CHANGED);
    }

    #[test]
    fn test_log_filters_by_kind_and_component() {
        let mut log = EventLog::new()
            .subscribed(Subscription::COMPONENT_ADDED)
            .for_components(Mask::new(&[id(0)]));
        let keep = changed(&[id(0)], &[]);
        let other_component = changed(&[id(2)], &[]);
        let other_kind = changed(&[], &[id(0)]);
        for event in [&keep, &other_component, &other_kind] {
            if log.wants(event) {
                log.notify(event);
            }
        }
        assert_eq!(log.snapshot(), vec![keep]);
    }

    #[test]
    fn test_closure_listener() {
        let mut count = 0;
        {
            let mut listener = |_: &EntityEvent| count += 1;
            let event = changed(&[id(0)], &[]);
            assert!(listener.wants(&event));
            listener.notify(&event);
        }
        assert_eq!(count, 1);
    }

    #[test]
    fn test_log_clones_share_storage() {
        let log = EventLog::new();
        let mut installed = log.clone();
        installed.notify(&changed(&[id(0)], &[]));
        assert_eq!(log.len(), 1);
        assert_eq!(log.take().len(), 1);
        assert!(log.is_empty());
    }

    #[test]
    fn test_dispatch_routes_by_interest() {
        let added = EventLog::new().subscribed(Subscription::COMPONENT_ADDED);
        let removed = EventLog::new()
            .subscribed(Subscription::COMPONENT_REMOVED)
            .for_components(Mask::new(&[id(1)]));
        let mut dispatch = Dispatch::new().with(added.clone()).with(removed.clone());
        assert_eq!(dispatch.len(), 2);
        assert_eq!(
            dispatch.subscriptions(),
            Subscription::COMPONENT_ADDED | Subscription::COMPONENT_REMOVED
        );
        assert_eq!(dispatch.components(), None);

        for event in [changed(&[id(0)], &[]), changed(&[], &[id(1)]), changed(&[], &[id(2)])] {
            if dispatch.wants(&event) {
                dispatch.notify(&event);
            }
        }
        assert_eq!(added.len(), 1);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed.snapshot()[0].removed, Mask::new(&[id(1)]));
    }

    #[test]
    fn test_dispatch_unions_component_masks() {
        let dispatch = Dispatch::new()
            .with(EventLog::new().for_components(Mask::new(&[id(0)])))
            .with(EventLog::new().for_components(Mask::new(&[id(3)])));
        assert_eq!(dispatch.components(), Some(Mask::new(&[id(0), id(3)])));

        let empty = Dispatch::new();
        assert!(empty.is_empty());
        assert_eq!(empty.subscriptions(), Subscription::NONE);
        assert!(!empty.wants(&changed(&[id(0)], &[])));
    }
}
