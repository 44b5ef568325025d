//! # ECS World
//!
//! The central container for all entities, components and resources.
//!
//! Structural changes (creating or removing entities, adding or removing
//! components, changing relation targets) are refused with
//! [`EcsError::WorldLocked`] while any [`Query`] is open. Component values
//! can be read and written at any time.

use std::any::Any;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

use super::archetype::{ArchetypeId, TargetRule};
use super::batch::Batch;
use super::cache::{Cache, CachedFilter, FilterCache};
use super::component::{Component, ComponentId, ComponentInfo, ComponentRegistry, ComponentValue};
use super::entity::{Entity, EntityRegistry, Location};
use super::event::{EntityEvent, EventKind, Listener};
use super::filter::Filter;
use super::graph::ArchetypeGraph;
use super::lock::WorldLock;
use super::mask::Mask;
use super::query::{Query, Span};
use super::relations::Relations;
use super::resource::{ResourceId, ResourceStore};
use super::stats::{ArchetypeStats, EntityStats, WorldStats};
use super::storage::{ComponentMut, ComponentRef};
use crate::config::WorldConfig;
use crate::error::{fatal, EcsError, EcsResult};

static NEXT_WORLD_ID: AtomicU64 = AtomicU64::new(1);

/// The ECS World - container for all entity state.
///
/// # Example
///
/// ```rust
/// use bytemuck::{Pod, Zeroable};
/// use tessera_core::{ComponentValue, Filter, World};
///
/// #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
/// #[repr(C)]
/// struct Position {
///     x: f32,
///     y: f32,
/// }
///
/// let mut world = World::default();
/// let pos = world.component_id::<Position>();
/// let e = world
///     .new_entity_with(&[ComponentValue::new(pos, Position { x: 1.0, y: 2.0 })])
///     .unwrap();
///
/// let mut query = world.query(&Filter::all(&[pos]));
/// while query.next() {
///     query.get_mut(&mut world, pos).get_mut::<Position>().x += 1.0;
/// }
/// assert_eq!(world.get(e, pos).unwrap().get::<Position>().x, 2.0);
/// ```
pub struct World {
    pub(crate) id: u64,
    pub(crate) config: WorldConfig,
    pub(crate) entities: EntityRegistry,
    pub(crate) components: ComponentRegistry,
    pub(crate) graph: ArchetypeGraph,
    pub(crate) cache: FilterCache,
    pub(crate) resources: ResourceStore,
    pub(crate) lock: WorldLock,
    pub(crate) listener: Option<Box<dyn Listener>>,
}

impl Default for World {
    fn default() -> Self {
        Self::new(WorldConfig::default())
    }
}

impl World {
    /// Creates a world.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid.
    #[must_use]
    pub fn new(config: WorldConfig) -> Self {
        match Self::try_new(config) {
            Ok(world) => world,
            Err(err) => fatal(err),
        }
    }

    /// Creates a world, rejecting an invalid configuration.
    ///
    /// # Errors
    ///
    /// [`EcsError::InvalidConfig`] if validation fails.
    pub fn try_new(config: WorldConfig) -> EcsResult<Self> {
        config.validate()?;
        Ok(Self {
            id: NEXT_WORLD_ID.fetch_add(1, Ordering::Relaxed),
            config,
            entities: EntityRegistry::new(config.initial_capacity),
            components: ComponentRegistry::new(),
            graph: ArchetypeGraph::new(&config),
            cache: FilterCache::default(),
            resources: ResourceStore::default(),
            lock: WorldLock::default(),
            listener: None,
        })
    }

    /// The configuration the world was built with.
    #[must_use]
    pub const fn config(&self) -> &WorldConfig {
        &self.config
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Id of component type `T`, registering it on first use.
    ///
    /// # Panics
    ///
    /// Panics once all 256 component ids are taken.
    pub fn component_id<T: Component>(&mut self) -> ComponentId {
        self.components.id_of::<T>(false).unwrap_or_else(|err| fatal(err))
    }

    /// Id of relation component type `T`, registering it on first use.
    ///
    /// Rows holding a relation component are partitioned by target entity.
    /// An entity can hold at most one relation component.
    ///
    /// # Panics
    ///
    /// Panics if `T` was already registered as a plain component, or once
    /// all component ids are taken.
    pub fn relation_id<T: Component>(&mut self) -> ComponentId {
        self.components.id_of::<T>(true).unwrap_or_else(|err| fatal(err))
    }

    /// Id of resource type `T`, registering it on first use.
    ///
    /// # Panics
    ///
    /// Panics once all resource ids are taken.
    pub fn resource_id<T: Send + Sync + 'static>(&mut self) -> ResourceId {
        self.resources.id_of::<T>().unwrap_or_else(|err| fatal(err))
    }

    /// Metadata of a registered component.
    #[must_use]
    pub fn component_info(&self, id: ComponentId) -> Option<&ComponentInfo> {
        self.components.info(id)
    }

    /// All registered components, in id order.
    #[must_use]
    pub fn component_infos(&self) -> &[ComponentInfo] {
        self.components.infos()
    }

    /// Id of component type `T` if it is registered. Never registers.
    #[must_use]
    pub fn lookup_component<T: Component>(&self) -> Option<ComponentId> {
        self.components.get::<T>()
    }

    /// Ids of all registered components, ascending.
    #[must_use]
    pub fn component_ids(&self) -> Vec<ComponentId> {
        self.components.infos().iter().map(|info| info.id).collect()
    }

    // =========================================================================
    // Internal plumbing
    // =========================================================================

    pub(crate) fn check_unlocked(&self) -> EcsResult<()> {
        match self.lock.open() {
            0 => Ok(()),
            open => Err(EcsError::WorldLocked { open }),
        }
    }

    pub(crate) fn check_target(&self, target: Entity) -> EcsResult<()> {
        if target.is_zero() || self.entities.is_alive(target) {
            Ok(())
        } else {
            Err(EcsError::RelationTargetNotAlive { target })
        }
    }

    #[track_caller]
    pub(crate) fn check_relation(&self, relation: ComponentId) {
        self.components.check(relation);
        if !self.components.is_relation(relation) {
            fatal(EcsError::NotARelation { id: relation });
        }
    }

    /// Mask of `ids`, rejecting unknown and repeated ids.
    #[track_caller]
    pub(crate) fn mask_of(&self, ids: &[ComponentId]) -> Mask {
        let mut mask = Mask::EMPTY;
        for &id in ids {
            self.components.check(id);
            if mask.get(id) {
                fatal(EcsError::DuplicateComponent { id });
            }
            mask.set(id, true);
        }
        mask
    }

    /// Offers archetypes created since `before` to the filter cache.
    fn sync_cache(&mut self, before: usize) {
        for index in before..self.graph.len() {
            #[allow(clippy::cast_possible_truncation)]
            let archetype = self.graph.get(ArchetypeId::new(index as u32));
            self.cache.on_archetype_created(archetype);
        }
    }

    pub(crate) fn archetype_for(&mut self, mask: Mask) -> ArchetypeId {
        let before = self.graph.len();
        let id = self.graph.find_or_create(mask, &self.components);
        self.sync_cache(before);
        id
    }

    pub(crate) fn transition(
        &mut self,
        from: ArchetypeId,
        add: &[ComponentId],
        remove: &[ComponentId],
    ) -> ArchetypeId {
        let before = self.graph.len();
        let id = self.graph.transition(from, add, remove, &self.components);
        self.sync_cache(before);
        id
    }

    /// Creates `n` entities in `archetype`. Returns their rows.
    pub(crate) fn spawn(&mut self, archetype: ArchetypeId, n: usize, target: Entity) -> Range<u32> {
        let fresh: Vec<Entity> = (0..n)
            .map(|_| self.entities.create(Location::NOWHERE))
            .collect();
        let registry = &mut self.entities;
        self.graph
            .get_mut(archetype)
            .alloc(&fresh, target, &mut |e, row| {
                registry.set_location(e, Location { archetype, row });
            })
    }

    /// Moves one entity to `dst`. Returns the event describing the move.
    pub(crate) fn move_entity(
        &mut self,
        entity: Entity,
        from: Location,
        dst: ArchetypeId,
        rule: TargetRule,
    ) -> EntityEvent {
        let src_id = from.archetype;
        let (src, dst_arch) = self.graph.pair_mut(src_id, dst);
        let old_target = src.target_of(from.row).unwrap_or(Entity::ZERO);
        let new_target = match (dst_arch.relation(), rule) {
            (None, _) => Entity::ZERO,
            (Some(_), TargetRule::Set(t)) => t,
            (Some(r), TargetRule::Keep) if src.relation() == Some(r) => old_target,
            (Some(_), TargetRule::Keep) => Entity::ZERO,
        };
        let event = EntityEvent {
            entity,
            kind: EventKind::Changed,
            added: dst_arch.mask().difference(src.mask()),
            removed: src.mask().difference(dst_arch.mask()),
            current: *dst_arch.mask(),
            old_relation: src.relation(),
            new_relation: dst_arch.relation(),
            old_target,
            new_target,
        };

        let registry = &mut self.entities;
        dst_arch.push_from(src, from.row, new_target, &mut |e, row| {
            registry.set_location(e, Location { archetype: dst, row });
        });
        src.remove_row(from.row, &mut |e, row| {
            registry.set_location(e, Location { archetype: src_id, row });
        });
        event
    }

    /// Removes one live entity. Returns the event describing the removal.
    pub(crate) fn despawn(&mut self, entity: Entity, at: Location) -> EntityEvent {
        let archetype = self.graph.get_mut(at.archetype);
        let target = archetype.target_of(at.row).unwrap_or(Entity::ZERO);
        let event = EntityEvent {
            entity,
            kind: EventKind::Removed,
            added: Mask::EMPTY,
            removed: *archetype.mask(),
            current: *archetype.mask(),
            old_relation: archetype.relation(),
            new_relation: archetype.relation(),
            old_target: target,
            new_target: target,
        };
        let registry = &mut self.entities;
        let id = at.archetype;
        archetype.remove_row(at.row, &mut |e, row| {
            registry.set_location(e, Location { archetype: id, row });
        });
        // The handle was checked by the caller.
        let destroyed = self.entities.destroy(entity);
        debug_assert!(destroyed.is_ok());
        event
    }

    pub(crate) fn created_event(&self, entity: Entity) -> EntityEvent {
        let at = self.entities.locate_unchecked(entity);
        let archetype = self.graph.get(at.archetype);
        let target = archetype.target_of(at.row).unwrap_or(Entity::ZERO);
        EntityEvent {
            entity,
            kind: EventKind::Added,
            added: *archetype.mask(),
            removed: Mask::EMPTY,
            current: *archetype.mask(),
            old_relation: None,
            new_relation: archetype.relation(),
            old_target: Entity::ZERO,
            new_target: target,
        }
    }

    #[inline]
    pub(crate) fn has_listener(&self) -> bool {
        self.listener.is_some()
    }

    pub(crate) fn notify(&mut self, event: &EntityEvent) {
        if let Some(listener) = self.listener.as_mut() {
            if listener.wants(event) {
                listener.notify(event);
            }
        }
    }

    /// Row spans of every archetype matching `filter`, evaluated now.
    pub(crate) fn matching_spans(&self, filter: &Filter) -> Vec<Span> {
        self.spans(filter, self.graph.iter().map(|a| (a.id(), true)))
    }

    fn spans(
        &self,
        filter: &Filter,
        candidates: impl Iterator<Item = (ArchetypeId, bool)>,
    ) -> Vec<Span> {
        let scope = filter.scope();
        let mut spans = Vec::new();
        for (id, recheck) in candidates {
            let archetype = self.graph.get(id);
            if archetype.is_empty() || (recheck && !filter.matches(archetype)) {
                continue;
            }
            let rows = match scope {
                Some(target) => match archetype.rows_for_target(target) {
                    Some(rows) => rows,
                    None => continue,
                },
                #[allow(clippy::cast_possible_truncation)]
                None => 0..archetype.len() as u32,
            };
            if rows.start < rows.end {
                spans.push(Span {
                    archetype: id,
                    start: rows.start,
                    end: rows.end,
                });
            }
        }
        spans
    }

    // =========================================================================
    // Entity lifecycle
    // =========================================================================

    /// Creates an entity with zeroed components `ids`.
    ///
    /// # Errors
    ///
    /// [`EcsError::WorldLocked`] while a query is open.
    ///
    /// # Panics
    ///
    /// Panics on unknown or repeated ids.
    pub fn new_entity(&mut self, ids: &[ComponentId]) -> EcsResult<Entity> {
        self.new_entity_with_target_inner(ids, Entity::ZERO)
    }

    /// Creates an entity related to `target` through `relation`, which must
    /// be one of `ids`.
    ///
    /// # Errors
    ///
    /// [`EcsError::WorldLocked`] while a query is open, or
    /// [`EcsError::RelationTargetNotAlive`] for a dead target.
    ///
    /// # Panics
    ///
    /// Panics if `relation` is not a relation component or not in `ids`.
    pub fn new_entity_with_target(
        &mut self,
        ids: &[ComponentId],
        relation: ComponentId,
        target: Entity,
    ) -> EcsResult<Entity> {
        self.check_relation(relation);
        if !ids.contains(&relation) {
            fatal(EcsError::MissingComponent { id: relation });
        }
        self.check_target(target)?;
        self.new_entity_with_target_inner(ids, target)
    }

    fn new_entity_with_target_inner(
        &mut self,
        ids: &[ComponentId],
        target: Entity,
    ) -> EcsResult<Entity> {
        self.check_unlocked()?;
        let mask = self.mask_of(ids);
        let archetype = self.archetype_for(mask);
        let rows = self.spawn(archetype, 1, target);
        let entity = self.graph.get(archetype).entity(rows.start);
        if self.has_listener() {
            let event = self.created_event(entity);
            self.notify(&event);
        }
        Ok(entity)
    }

    /// Creates an entity with initial component values.
    ///
    /// # Errors
    ///
    /// [`EcsError::WorldLocked`] while a query is open.
    ///
    /// # Panics
    ///
    /// Panics on unknown or repeated ids, or a value whose type does not
    /// match its id.
    pub fn new_entity_with(&mut self, values: &[ComponentValue]) -> EcsResult<Entity> {
        self.check_unlocked()?;
        for value in values {
            value.check(&self.components);
        }
        let ids: Vec<ComponentId> = values.iter().map(ComponentValue::id).collect();
        let mask = self.mask_of(&ids);
        let archetype = self.archetype_for(mask);
        let rows = self.spawn(archetype, 1, Entity::ZERO);
        let storage = self.graph.get_mut(archetype);
        for value in values {
            storage.write_bytes(value.id(), rows.start, value.bytes());
        }
        let entity = storage.entity(rows.start);
        if self.has_listener() {
            let event = self.created_event(entity);
            self.notify(&event);
        }
        Ok(entity)
    }

    /// Removes an entity and all its components.
    ///
    /// # Errors
    ///
    /// [`EcsError::WorldLocked`] while a query is open, or
    /// [`EcsError::NotAlive`] for a stale handle.
    pub fn remove_entity(&mut self, entity: Entity) -> EcsResult<()> {
        self.check_unlocked()?;
        let at = self.entities.locate(entity)?;
        let event = self.despawn(entity, at);
        self.notify(&event);
        Ok(())
    }

    /// Whether `entity` is alive.
    #[inline]
    #[must_use]
    pub fn alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    /// Adds zeroed components.
    ///
    /// # Errors
    ///
    /// [`EcsError::WorldLocked`] while a query is open, or
    /// [`EcsError::NotAlive`] for a stale handle.
    ///
    /// # Panics
    ///
    /// Panics if a component is already present, or on unknown or
    /// repeated ids.
    pub fn add(&mut self, entity: Entity, ids: &[ComponentId]) -> EcsResult<()> {
        self.exchange_with(entity, ids, &[], TargetRule::Keep, None)
    }

    /// Removes components.
    ///
    /// # Errors
    ///
    /// [`EcsError::WorldLocked`] while a query is open, or
    /// [`EcsError::NotAlive`] for a stale handle.
    ///
    /// # Panics
    ///
    /// Panics if a component is absent, or on unknown or repeated ids.
    pub fn remove(&mut self, entity: Entity, ids: &[ComponentId]) -> EcsResult<()> {
        self.exchange_with(entity, &[], ids, TargetRule::Keep, None)
    }

    /// Removes `remove`, then adds `add`, in a single move.
    ///
    /// # Errors
    ///
    /// [`EcsError::WorldLocked`] while a query is open, or
    /// [`EcsError::NotAlive`] for a stale handle.
    ///
    /// # Panics
    ///
    /// Panics on invalid transitions, or on unknown or repeated ids.
    pub fn exchange(
        &mut self,
        entity: Entity,
        add: &[ComponentId],
        remove: &[ComponentId],
    ) -> EcsResult<()> {
        self.exchange_with(entity, add, remove, TargetRule::Keep, None)
    }

    /// Adds components with initial values.
    ///
    /// # Errors
    ///
    /// [`EcsError::WorldLocked`] while a query is open, or
    /// [`EcsError::NotAlive`] for a stale handle.
    ///
    /// # Panics
    ///
    /// Panics if a component is already present, or a value's type does not
    /// match its id.
    pub fn assign(&mut self, entity: Entity, values: &[ComponentValue]) -> EcsResult<()> {
        for value in values {
            value.check(&self.components);
        }
        let ids: Vec<ComponentId> = values.iter().map(ComponentValue::id).collect();
        self.exchange_with(entity, &ids, &[], TargetRule::Keep, None)?;
        let at = self.entities.locate_unchecked(entity);
        let storage = self.graph.get_mut(at.archetype);
        for value in values {
            storage.write_bytes(value.id(), at.row, value.bytes());
        }
        Ok(())
    }

    /// Overwrites one component value. Allowed while queries are open.
    ///
    /// # Errors
    ///
    /// [`EcsError::NotAlive`] for a stale handle.
    ///
    /// # Panics
    ///
    /// Panics if the entity lacks the component or the value's type does not
    /// match its id.
    pub fn set(&mut self, entity: Entity, value: &ComponentValue) -> EcsResult<()> {
        value.check(&self.components);
        let at = self.entities.locate(entity)?;
        if !self
            .graph
            .get_mut(at.archetype)
            .write_bytes(value.id(), at.row, value.bytes())
        {
            fatal(EcsError::MissingComponent { id: value.id() });
        }
        Ok(())
    }

    pub(crate) fn exchange_with(
        &mut self,
        entity: Entity,
        add: &[ComponentId],
        remove: &[ComponentId],
        rule: TargetRule,
        relation: Option<ComponentId>,
    ) -> EcsResult<()> {
        self.check_unlocked()?;
        let at = self.entities.locate(entity)?;
        if let TargetRule::Set(target) = rule {
            self.check_target(target)?;
        }
        self.mask_of(add);
        self.mask_of(remove);

        let dst = self.transition(at.archetype, add, remove);
        if let Some(relation) = relation {
            if self.graph.get(dst).relation() != Some(relation) {
                fatal(EcsError::MissingComponent { id: relation });
            }
        }

        if dst == at.archetype {
            if let TargetRule::Set(target) = rule {
                return self.retarget(entity, at, target);
            }
            return Ok(());
        }

        let event = self.move_entity(entity, at, dst, rule);
        self.notify(&event);
        Ok(())
    }

    /// Moves a live entity to another relation target within its archetype.
    pub(crate) fn retarget(&mut self, entity: Entity, at: Location, target: Entity) -> EcsResult<()> {
        let archetype = self.graph.get_mut(at.archetype);
        let old_target = archetype.target_of(at.row).unwrap_or(Entity::ZERO);
        if old_target == target {
            return Ok(());
        }
        let relation = archetype.relation();
        let mask = *archetype.mask();
        let registry = &mut self.entities;
        let id = at.archetype;
        archetype.set_target(at.row, target, &mut |e, row| {
            registry.set_location(e, Location { archetype: id, row });
        });
        let event = EntityEvent {
            entity,
            kind: EventKind::Changed,
            added: Mask::EMPTY,
            removed: Mask::EMPTY,
            current: mask,
            old_relation: relation,
            new_relation: relation,
            old_target,
            new_target: target,
        };
        self.notify(&event);
        Ok(())
    }

    // =========================================================================
    // Component access
    // =========================================================================

    /// Component `id` of `entity`.
    ///
    /// # Errors
    ///
    /// [`EcsError::NotAlive`] for a stale handle.
    ///
    /// # Panics
    ///
    /// Panics if the entity lacks the component.
    #[track_caller]
    pub fn get(&self, entity: Entity, id: ComponentId) -> EcsResult<ComponentRef<'_>> {
        self.components.check(id);
        let at = self.entities.locate(entity)?;
        Ok(self
            .graph
            .get(at.archetype)
            .get(id, at.row)
            .unwrap_or_else(|| fatal(EcsError::MissingComponent { id })))
    }

    /// Mutable component `id` of `entity`.
    ///
    /// # Errors
    ///
    /// [`EcsError::NotAlive`] for a stale handle.
    ///
    /// # Panics
    ///
    /// Panics if the entity lacks the component.
    #[track_caller]
    pub fn get_mut(&mut self, entity: Entity, id: ComponentId) -> EcsResult<ComponentMut<'_>> {
        self.components.check(id);
        let at = self.entities.locate(entity)?;
        Ok(self
            .graph
            .get_mut(at.archetype)
            .get_mut(id, at.row)
            .unwrap_or_else(|| fatal(EcsError::MissingComponent { id })))
    }

    /// Component `id` of `entity` without the liveness check.
    ///
    /// Access stays bounds-checked: a dead handle yields some other row's
    /// value or a panic, never undefined behavior.
    ///
    /// # Panics
    ///
    /// Panics if the entity lacks the component.
    #[inline]
    #[must_use]
    #[track_caller]
    pub fn get_unchecked(&self, entity: Entity, id: ComponentId) -> ComponentRef<'_> {
        let at = self.entities.locate_unchecked(entity);
        self.graph
            .get(at.archetype)
            .get(id, at.row)
            .unwrap_or_else(|| fatal(EcsError::MissingComponent { id }))
    }

    /// Whether `entity` is alive and has component `id`.
    #[must_use]
    pub fn has(&self, entity: Entity, id: ComponentId) -> bool {
        self.components.check(id);
        self.entities
            .locate(entity)
            .is_ok_and(|at| self.graph.get(at.archetype).has(id))
    }

    /// Component set of `entity`.
    ///
    /// # Errors
    ///
    /// [`EcsError::NotAlive`] for a stale handle.
    pub fn mask(&self, entity: Entity) -> EcsResult<Mask> {
        let at = self.entities.locate(entity)?;
        Ok(*self.graph.get(at.archetype).mask())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Opens a cursor over every entity matching `filter`.
    ///
    /// The world stays locked against structural changes until the cursor
    /// is exhausted, closed or dropped.
    #[must_use]
    pub fn query(&self, filter: &Filter) -> Query {
        let spans = self.matching_spans(filter);
        Query::new(self.id, spans, self.lock.acquire())
    }

    /// Opens a cursor over a cached filter.
    ///
    /// # Panics
    ///
    /// Panics if the handle is not registered.
    #[must_use]
    #[track_caller]
    pub fn query_cached(&self, handle: CachedFilter) -> Query {
        let entry = self.cache.entry(handle);
        let candidates = entry
            .archetypes
            .iter()
            .copied()
            .zip(entry.dynamic.iter().copied());
        let spans = self.spans(&entry.filter, candidates);
        Query::new(self.id, spans, self.lock.acquire())
    }

    /// Filter cache access.
    pub fn cache(&mut self) -> Cache<'_> {
        Cache { world: self }
    }

    /// Batch operations.
    pub fn batch(&mut self) -> Batch<'_> {
        Batch { world: self }
    }

    /// Relation target access.
    pub fn relations(&mut self) -> Relations<'_> {
        Relations { world: self }
    }

    /// Whether a query is open.
    #[inline]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }

    // =========================================================================
    // Resources
    // =========================================================================

    /// Stores a resource, returning the one it replaced.
    ///
    /// # Panics
    ///
    /// Panics once all resource ids are taken.
    pub fn add_resource<T: Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.resources.insert(value).unwrap_or_else(|err| fatal(err))
    }

    /// The resource of type `T`.
    #[must_use]
    pub fn get_resource<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.resources.get::<T>()
    }

    /// The resource of type `T`, mutably.
    pub fn get_resource_mut<T: Send + Sync + 'static>(&mut self) -> Option<&mut T> {
        self.resources.get_mut::<T>()
    }

    /// Whether a resource of type `T` is stored.
    #[must_use]
    pub fn has_resource<T: Send + Sync + 'static>(&self) -> bool {
        self.resources.has::<T>()
    }

    /// Takes the resource of type `T` out of the world.
    pub fn remove_resource<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.resources.remove::<T>()
    }

    /// The resource stored under `id`. Downcast it to its type.
    #[must_use]
    pub fn resource(&self, id: ResourceId) -> Option<&(dyn Any + Send + Sync + 'static)> {
        self.resources.get_by_id(id)
    }

    /// The resource stored under `id`, mutably.
    pub fn resource_mut(
        &mut self,
        id: ResourceId,
    ) -> Option<&mut (dyn Any + Send + Sync + 'static)> {
        self.resources.get_by_id_mut(id)
    }

    /// Whether a value is stored under `id`.
    #[must_use]
    pub fn has_resource_id(&self, id: ResourceId) -> bool {
        self.resources.get_by_id(id).is_some()
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Installs the change listener, replacing any previous one.
    pub fn set_listener<L: Listener + 'static>(&mut self, listener: L) {
        tracing::debug!(
            subscriptions = ?listener.subscriptions(),
            "installed world listener"
        );
        self.listener = Some(Box::new(listener));
    }

    /// Removes the change listener.
    pub fn clear_listener(&mut self) -> Option<Box<dyn Listener>> {
        self.listener.take()
    }

    // =========================================================================
    // Whole-world operations
    // =========================================================================

    /// Removes every entity and resource.
    ///
    /// Registered components, archetypes and cached filters survive.
    /// Listeners are not notified.
    ///
    /// # Errors
    ///
    /// [`EcsError::WorldLocked`] while a query is open.
    pub fn reset(&mut self) -> EcsResult<()> {
        self.check_unlocked()?;
        let removed = self.entities.alive_count();
        for archetype in self.graph.iter_mut() {
            archetype.clear();
        }
        self.entities.reset();
        self.resources.clear();
        tracing::debug!(entities = removed, "reset world");
        Ok(())
    }

    /// Number of live entities.
    #[inline]
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.alive_count()
    }

    /// Number of archetypes, including the empty one.
    #[inline]
    #[must_use]
    pub fn archetype_count(&self) -> usize {
        self.graph.len()
    }

    /// Storage statistics.
    #[must_use]
    pub fn stats(&self) -> WorldStats {
        let archetypes: Vec<ArchetypeStats> = self
            .graph
            .iter()
            .map(|a| ArchetypeStats {
                id: a.id(),
                components: a.ids().to_vec(),
                component_names: a
                    .ids()
                    .iter()
                    .filter_map(|&id| self.components.info(id).map(|info| info.name))
                    .collect(),
                size: a.len(),
                capacity: a.capacity(),
                memory_bytes: a.memory_bytes(),
                memory_per_entity: a.row_size(),
                relation: a.relation(),
                partitions: a.partitions(),
            })
            .collect();
        WorldStats {
            entities: EntityStats {
                used: self.entities.alive_count(),
                total: self.entities.total(),
                recycled: self.entities.recycled(),
                capacity: self.entities.capacity(),
            },
            component_count: self.components.len(),
            memory_bytes: archetypes.iter().map(|a| a.memory_bytes).sum(),
            archetypes,
            cached_filters: self.cache.len(),
            resources: self.resources.len(),
            open_queries: self.lock.open(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::event::{Dispatch, EventLog, Subscription};
    use bytemuck::{Pod, Zeroable};

    #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Velocity {
        x: f32,
        y: f32,
    }

    #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct ChildOf {
        depth: u32,
    }

    struct Setup {
        world: World,
        pos: ComponentId,
        vel: ComponentId,
        child: ComponentId,
    }

    fn setup() -> Setup {
        let mut world = World::default();
        let pos = world.component_id::<Position>();
        let vel = world.component_id::<Velocity>();
        let child = world.relation_id::<ChildOf>();
        Setup {
            world,
            pos,
            vel,
            child,
        }
    }

    #[test]
    fn test_new_entity_zeroes_components() {
        let Setup { mut world, pos, .. } = setup();
        let e = world.new_entity(&[pos]).unwrap();
        assert!(world.alive(e));
        assert_eq!(*world.get(e, pos).unwrap().get::<Position>(), Position::default());
        assert_eq!(world.entity_count(), 1);
    }

    #[test]
    fn test_add_remove_preserves_values() {
        let Setup {
            mut world, pos, vel, ..
        } = setup();
        let e = world
            .new_entity_with(&[ComponentValue::new(pos, Position { x: 3.0, y: 4.0 })])
            .unwrap();
        world.add(e, &[vel]).unwrap();
        assert!(world.has(e, vel));
        assert_eq!(world.get(e, pos).unwrap().get::<Position>().x, 3.0);
        world.remove(e, &[vel]).unwrap();
        assert!(!world.has(e, vel));
        assert_eq!(world.get(e, pos).unwrap().get::<Position>().y, 4.0);
    }

    #[test]
    fn test_swapped_entity_keeps_its_data() {
        let Setup {
            mut world, pos, vel, ..
        } = setup();
        let a = world
            .new_entity_with(&[ComponentValue::new(pos, Position { x: 1.0, y: 0.0 })])
            .unwrap();
        let b = world
            .new_entity_with(&[ComponentValue::new(pos, Position { x: 2.0, y: 0.0 })])
            .unwrap();
        world.add(a, &[vel]).unwrap();
        assert_eq!(world.get(b, pos).unwrap().get::<Position>().x, 2.0);
        world.remove_entity(a).unwrap();
        assert_eq!(world.get(b, pos).unwrap().get::<Position>().x, 2.0);
    }

    #[test]
    fn test_stale_handle_is_not_alive() {
        let Setup { mut world, pos, .. } = setup();
        let a = world.new_entity(&[pos]).unwrap();
        world.remove_entity(a).unwrap();
        let b = world.new_entity(&[pos]).unwrap();
        assert_eq!(a.index(), b.index());
        assert_ne!(a.generation(), b.generation());
        assert!(matches!(world.get(a, pos), Err(EcsError::NotAlive { .. })));
        assert_eq!(world.remove_entity(a), Err(EcsError::NotAlive { entity: a }));
        assert!(!world.has(a, pos));
    }

    #[test]
    #[should_panic(expected = "duplicate component id")]
    fn test_duplicate_ids_rejected() {
        let Setup { mut world, pos, .. } = setup();
        let _ = world.new_entity(&[pos, pos]);
    }

    #[test]
    #[should_panic(expected = "component is already present")]
    fn test_add_present_rejected() {
        let Setup { mut world, pos, .. } = setup();
        let e = world.new_entity(&[pos]).unwrap();
        let _ = world.add(e, &[pos]);
    }

    #[test]
    #[should_panic(expected = "is not present on the entity")]
    fn test_get_missing_component_panics() {
        let Setup {
            mut world, pos, vel, ..
        } = setup();
        let e = world.new_entity(&[pos]).unwrap();
        let _ = world.get(e, vel);
    }

    #[test]
    fn test_structural_change_refused_while_locked() {
        let Setup { mut world, pos, .. } = setup();
        let e = world.new_entity(&[pos]).unwrap();
        let mut query = world.query(&Filter::all(&[pos]));
        assert!(world.is_locked());
        assert!(matches!(
            world.new_entity(&[pos]),
            Err(EcsError::WorldLocked { open: 1 })
        ));
        assert!(matches!(world.remove_entity(e), Err(EcsError::WorldLocked { .. })));

        // Values stay writable.
        assert!(query.next());
        query.get_mut(&mut world, pos).set(Position { x: 9.0, y: 9.0 });
        world
            .set(e, &ComponentValue::new(pos, Position { x: 5.0, y: 5.0 }))
            .unwrap();

        query.close();
        assert!(!world.is_locked());
        world.remove_entity(e).unwrap();
    }

    #[test]
    fn test_relation_target_on_creation_and_change() {
        let Setup {
            mut world,
            pos,
            child,
            ..
        } = setup();
        let parent = world.new_entity(&[pos]).unwrap();
        let other = world.new_entity(&[pos]).unwrap();
        let kid = world
            .new_entity_with_target(&[pos, child], child, parent)
            .unwrap();
        assert_eq!(world.relations().get(kid, child), Ok(parent));

        world.relations().set(kid, child, other).unwrap();
        assert_eq!(world.relations().get(kid, child), Ok(other));

        world.remove_entity(parent).unwrap();
        assert_eq!(
            world.relations().set(kid, child, parent),
            Err(EcsError::RelationTargetNotAlive { target: parent })
        );
    }

    #[test]
    fn test_removing_relation_drops_target() {
        let Setup {
            mut world,
            pos,
            child,
            ..
        } = setup();
        let parent = world.new_entity(&[pos]).unwrap();
        let kid = world
            .new_entity_with_target(&[pos, child], child, parent)
            .unwrap();
        world.remove(kid, &[child]).unwrap();
        world.add(kid, &[child]).unwrap();
        assert_eq!(world.relations().get(kid, child), Ok(Entity::ZERO));
    }

    #[test]
    fn test_listener_sees_lifecycle() {
        let Setup {
            mut world, pos, vel, ..
        } = setup();
        let log = EventLog::new();
        world.set_listener(log.clone());

        let e = world.new_entity(&[pos]).unwrap();
        world.add(e, &[vel]).unwrap();
        world.remove_entity(e).unwrap();

        let events = log.take();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].kind, EventKind::Added);
        assert_eq!(events[1].added, Mask::new(&[vel]));
        assert_eq!(events[1].current, Mask::new(&[pos, vel]));
        assert_eq!(events[2].kind, EventKind::Removed);
        assert_eq!(events[2].removed, Mask::new(&[pos, vel]));
    }

    #[test]
    fn test_dispatch_fans_out_to_each_listener() {
        let Setup {
            mut world, pos, vel, ..
        } = setup();
        let lifecycle = EventLog::new()
            .subscribed(Subscription::ENTITY_CREATED | Subscription::ENTITY_REMOVED);
        let velocity = EventLog::new().for_components(Mask::new(&[vel]));
        world.set_listener(Dispatch::new().with(lifecycle.clone()).with(velocity.clone()));

        let e = world.new_entity(&[pos]).unwrap();
        world.add(e, &[vel]).unwrap();
        world.remove_entity(e).unwrap();

        let kinds: Vec<EventKind> = lifecycle.take().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::Added, EventKind::Removed]);
        let touched: Vec<EventKind> = velocity.take().iter().map(|e| e.kind).collect();
        assert_eq!(touched, vec![EventKind::Changed, EventKind::Removed]);
    }

    #[test]
    fn test_resources() {
        let mut world = World::default();
        let id = world.resource_id::<String>();
        assert_eq!(world.resource_id::<String>(), id);
        assert!(world.add_resource(String::from("a")).is_none());
        assert_eq!(world.add_resource(String::from("b")).as_deref(), Some("a"));
        world.get_resource_mut::<String>().unwrap().push('!');
        assert_eq!(world.get_resource::<String>().map(String::as_str), Some("b!"));
        assert_eq!(world.remove_resource::<String>().as_deref(), Some("b!"));
        assert!(!world.has_resource::<String>());
    }

    #[test]
    fn test_resource_by_id() {
        let mut world = World::default();
        let id = world.resource_id::<u64>();
        assert!(!world.has_resource_id(id));
        world.add_resource(7_u64);
        assert!(world.has_resource_id(id));
        assert_eq!(world.resource(id).and_then(|r| r.downcast_ref::<u64>()), Some(&7));
        *world
            .resource_mut(id)
            .and_then(|r| r.downcast_mut::<u64>())
            .unwrap() += 1;
        assert_eq!(world.get_resource::<u64>(), Some(&8));
        assert!(world.resource(id).and_then(|r| r.downcast_ref::<u32>()).is_none());
    }

    #[test]
    fn test_get_unchecked_reads_live_entity() {
        let Setup {
            mut world, pos, ..
        } = setup();
        let e = world.new_entity(&[pos]).unwrap();
        world.get_mut(e, pos).unwrap().set(Position { x: 1.0, y: 2.0 });
        assert_eq!(
            *world.get_unchecked(e, pos).get::<Position>(),
            Position { x: 1.0, y: 2.0 }
        );
    }

    #[test]
    #[should_panic(expected = "is not present on the entity")]
    fn test_get_unchecked_missing_component_panics() {
        let Setup {
            mut world, pos, vel, ..
        } = setup();
        let e = world.new_entity(&[pos]).unwrap();
        let _ = world.get_unchecked(e, vel);
    }

    #[test]
    fn test_component_introspection() {
        let Setup {
            world, pos, child, ..
        } = setup();
        assert_eq!(world.lookup_component::<Position>(), Some(pos));
        assert_eq!(world.lookup_component::<u64>(), None);
        assert_eq!(world.component_ids().len(), 3);
        let info = world.component_info(child).unwrap();
        assert!(info.is_relation);
        assert_eq!(info.size, 4);
        assert!(world.component_info(pos).unwrap().name.ends_with("Position"));
    }

    #[test]
    fn test_reset_keeps_registrations() {
        let Setup { mut world, pos, .. } = setup();
        let handle = world.cache().register(Filter::all(&[pos]));
        let e = world.new_entity(&[pos]).unwrap();
        world.add_resource(5u32);
        world.reset().unwrap();
        assert!(!world.alive(e));
        assert_eq!(world.entity_count(), 0);
        assert!(!world.has_resource::<u32>());

        world.new_entity(&[pos]).unwrap();
        assert_eq!(world.query_cached(handle).count(), 1);
    }

    #[test]
    fn test_stats() {
        let Setup {
            mut world, pos, vel, ..
        } = setup();
        world.new_entity(&[pos]).unwrap();
        world.new_entity(&[pos, vel]).unwrap();
        let stats = world.stats();
        assert_eq!(stats.entity_count(), 2);
        assert_eq!(stats.archetype_count(), 3);
        assert_eq!(stats.component_count, 3);
        assert!(stats.memory_bytes > 0);
        assert!(stats.to_string().contains("Used: 2"));
    }

    #[test]
    #[should_panic(expected = "invalid configuration")]
    fn test_invalid_config_panics() {
        let _ = World::new(WorldConfig::default().with_capacity_increment(0));
    }
}
