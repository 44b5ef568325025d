//! # Filter Cache
//!
//! Keeps, per registered filter, the list of archetypes it can match. The
//! list is built once at registration and then extended as archetypes are
//! created, so a cached query never scans the whole archetype table.
//!
//! Relation filters with a concrete target depend on which targets are
//! populated right now. Such archetypes are kept as candidates and
//! re-checked at query time.

use super::archetype::{Archetype, ArchetypeId};
use super::filter::{Filter, Verdict};
use super::world::World;
use crate::error::{fatal, EcsError};

/// Handle to a filter registered with the cache.
///
/// Slots are reused after `unregister`; the generation tells a stale handle
/// apart from the filter that took its slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CachedFilter {
    id: u32,
    generation: u32,
}

impl CachedFilter {
    /// Raw slot index.
    #[inline]
    #[must_use]
    pub const fn id(self) -> u32 {
        self.id
    }

    /// Times the slot was reused before this handle was issued.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

#[derive(Debug)]
pub(crate) struct CacheEntry {
    pub filter: Filter,
    pub archetypes: Vec<ArchetypeId>,
    /// Parallel to `archetypes`: needs a re-check at query time.
    pub dynamic: Vec<bool>,
}

impl CacheEntry {
    fn offer(&mut self, archetype: &Archetype) {
        match self
            .filter
            .classify(archetype.mask(), archetype.relation())
        {
            Verdict::No => {}
            verdict => {
                self.archetypes.push(archetype.id());
                self.dynamic.push(verdict == Verdict::Maybe);
            }
        }
    }
}

#[derive(Default)]
struct Slot {
    generation: u32,
    entry: Option<CacheEntry>,
}

#[derive(Default)]
pub(crate) struct FilterCache {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl FilterCache {
    pub fn register<'a>(
        &mut self,
        filter: Filter,
        archetypes: impl Iterator<Item = &'a Archetype>,
    ) -> CachedFilter {
        let mut entry = CacheEntry {
            filter,
            archetypes: Vec::new(),
            dynamic: Vec::new(),
        };
        for archetype in archetypes {
            entry.offer(archetype);
        }

        let id = match self.free.pop() {
            Some(id) => id,
            None => {
                let id = u32::try_from(self.slots.len()).unwrap_or_else(|_| {
                    fatal(EcsError::CapacityExceeded {
                        what: "cached filters",
                        limit: u32::MAX as usize,
                    })
                });
                self.slots.push(Slot::default());
                id
            }
        };
        let slot = &mut self.slots[id as usize];
        slot.entry = Some(entry);
        tracing::debug!(filter = id, generation = slot.generation, "registered cached filter");
        CachedFilter {
            id,
            generation: slot.generation,
        }
    }

    fn slot_mut(&mut self, handle: CachedFilter) -> Option<&mut Slot> {
        self.slots
            .get_mut(handle.id as usize)
            .filter(|slot| slot.generation == handle.generation)
    }

    pub fn unregister(&mut self, handle: CachedFilter) -> Option<Filter> {
        let slot = self.slot_mut(handle)?;
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.id);
        tracing::debug!(filter = handle.id, "unregistered cached filter");
        Some(entry.filter)
    }

    /// Tests a freshly created archetype against every entry.
    pub fn on_archetype_created(&mut self, archetype: &Archetype) {
        for entry in self.slots.iter_mut().filter_map(|slot| slot.entry.as_mut()) {
            entry.offer(archetype);
        }
    }

    #[track_caller]
    pub fn entry(&self, handle: CachedFilter) -> &CacheEntry {
        match self.slots.get(handle.id as usize) {
            Some(Slot {
                generation,
                entry: Some(entry),
            }) if *generation == handle.generation => entry,
            _ => fatal(EcsError::UnknownFilter(handle.id)),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}

/// Cache access for a world.
pub struct Cache<'w> {
    pub(crate) world: &'w mut World,
}

impl Cache<'_> {
    /// Registers `filter` and returns its handle.
    pub fn register(&mut self, filter: Filter) -> CachedFilter {
        let world = &mut *self.world;
        world.cache.register(filter, world.graph.iter())
    }

    /// Removes a registration and hands back its filter.
    ///
    /// # Panics
    ///
    /// Panics if the handle is not registered.
    #[track_caller]
    pub fn unregister(&mut self, handle: CachedFilter) -> Filter {
        self.world
            .cache
            .unregister(handle)
            .unwrap_or_else(|| fatal(EcsError::UnknownFilter(handle.id)))
    }

    /// The filter behind a handle.
    ///
    /// # Panics
    ///
    /// Panics if the handle is not registered.
    #[must_use]
    #[track_caller]
    pub fn filter(&self, handle: CachedFilter) -> &Filter {
        &self.world.cache.entry(handle).filter
    }

    /// Archetypes the filter can match.
    ///
    /// For filters without a concrete relation target this is exactly the
    /// matching set; otherwise it is a superset settled per query.
    ///
    /// # Panics
    ///
    /// Panics if the handle is not registered.
    #[must_use]
    #[track_caller]
    pub fn matching_archetypes(&self, handle: CachedFilter) -> &[ArchetypeId] {
        &self.world.cache.entry(handle).archetypes
    }

    /// Number of registered filters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.world.cache.len()
    }

    /// Whether no filters are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::component::ComponentId;
    use bytemuck::{Pod, Zeroable};

    #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Speed(f32);

    #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Frozen(u8);

    fn world() -> (World, ComponentId, ComponentId) {
        let mut world = World::default();
        let speed = world.component_id::<Speed>();
        let frozen = world.component_id::<Frozen>();
        (world, speed, frozen)
    }

    #[test]
    fn test_matching_archetypes_follow_new_archetypes() {
        let (mut world, speed, frozen) = world();
        world.new_entity(&[speed]).unwrap();
        let handle = world.cache().register(Filter::all(&[speed]));
        assert_eq!(world.cache().matching_archetypes(handle).len(), 1);

        world.new_entity(&[speed, frozen]).unwrap();
        world.new_entity(&[frozen]).unwrap();
        let cache = world.cache();
        assert_eq!(cache.matching_archetypes(handle).len(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_unregister_frees_slot_and_returns_filter() {
        let (mut world, speed, _) = world();
        let handle = world.cache().register(Filter::all(&[speed]));
        let filter = world.cache().unregister(handle);
        assert_eq!(filter, Filter::all(&[speed]));
        assert!(world.cache().is_empty());

        let reused = world.cache().register(Filter::any());
        assert_eq!(reused.id(), handle.id());
        assert_ne!(reused.generation(), handle.generation());
        assert_eq!(world.cache().filter(reused), &Filter::any());
    }

    #[test]
    #[should_panic(expected = "is not registered")]
    fn test_stale_handle_does_not_alias_reused_slot() {
        let (mut world, speed, frozen) = world();
        let old = world.cache().register(Filter::all(&[speed]));
        world.cache().unregister(old);
        let _new = world.cache().register(Filter::all(&[frozen]));
        let _ = world.cache().matching_archetypes(old);
    }

    #[test]
    #[should_panic(expected = "is not registered")]
    fn test_double_unregister_panics() {
        let (mut world, speed, _) = world();
        let handle = world.cache().register(Filter::all(&[speed]));
        world.cache().unregister(handle);
        world.cache().unregister(handle);
    }
}
