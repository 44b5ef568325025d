//! # Batch Operations
//!
//! Bulk creation and bulk structural changes over every entity matching a
//! filter. Whole archetypes move with one column copy per component instead
//! of one move per entity.

use super::archetype::{ArchetypeId, TargetRule};
use super::component::{ComponentId, ComponentValue};
use super::entity::{Entity, Location};
use super::event::{EntityEvent, EventKind};
use super::filter::Filter;
use super::mask::Mask;
use super::query::{Query, Span};
use super::world::World;
use crate::error::{fatal, EcsError, EcsResult};

/// Batch access for a world.
pub struct Batch<'w> {
    pub(crate) world: &'w mut World,
}

impl Batch<'_> {
    /// Creates `n` entities with zeroed components `ids`.
    ///
    /// # Errors
    ///
    /// [`EcsError::WorldLocked`] while a query is open.
    ///
    /// # Panics
    ///
    /// Panics on unknown or repeated ids.
    pub fn new_entities(&mut self, n: usize, ids: &[ComponentId]) -> EcsResult<Vec<Entity>> {
        let (archetype, rows) = self.create(n, ids, Entity::ZERO)?;
        Ok(self.collect(archetype, rows.start, rows.end))
    }

    /// Creates `n` entities related to `target` through `relation`.
    ///
    /// # Errors
    ///
    /// [`EcsError::WorldLocked`] while a query is open, or
    /// [`EcsError::RelationTargetNotAlive`] for a dead target.
    ///
    /// # Panics
    ///
    /// Panics if `relation` is not a relation component or not in `ids`.
    pub fn new_entities_with_target(
        &mut self,
        n: usize,
        ids: &[ComponentId],
        relation: ComponentId,
        target: Entity,
    ) -> EcsResult<Vec<Entity>> {
        self.check_relation_in(ids, relation, target)?;
        let (archetype, rows) = self.create(n, ids, target)?;
        Ok(self.collect(archetype, rows.start, rows.end))
    }

    /// Creates `n` entities that all start with the same values.
    ///
    /// # Errors
    ///
    /// [`EcsError::WorldLocked`] while a query is open.
    ///
    /// # Panics
    ///
    /// Panics on unknown or repeated ids, or a value whose type does not
    /// match its id.
    pub fn new_entities_with(
        &mut self,
        n: usize,
        values: &[ComponentValue],
    ) -> EcsResult<Vec<Entity>> {
        let (archetype, rows) = self.create_with(n, values)?;
        Ok(self.collect(archetype, rows.start, rows.end))
    }

    /// Creates `n` entities with the same values and returns a query over
    /// exactly those.
    ///
    /// # Errors
    ///
    /// [`EcsError::WorldLocked`] while a query is open.
    ///
    /// # Panics
    ///
    /// Panics on unknown or repeated ids, or a value whose type does not
    /// match its id.
    pub fn new_entities_with_query(
        &mut self,
        n: usize,
        values: &[ComponentValue],
    ) -> EcsResult<Query> {
        let (archetype, rows) = self.create_with(n, values)?;
        Ok(self.query_rows(archetype, rows.start, rows.end))
    }

    /// Creates `n` entities and returns a query over exactly those.
    ///
    /// The world stays locked until the query is exhausted or closed.
    ///
    /// # Errors
    ///
    /// [`EcsError::WorldLocked`] while a query is open.
    ///
    /// # Panics
    ///
    /// Panics on unknown or repeated ids.
    pub fn new_query(&mut self, n: usize, ids: &[ComponentId]) -> EcsResult<Query> {
        let (archetype, rows) = self.create(n, ids, Entity::ZERO)?;
        Ok(self.query_rows(archetype, rows.start, rows.end))
    }

    /// Creates `n` related entities and returns a query over exactly those.
    ///
    /// # Errors
    ///
    /// [`EcsError::WorldLocked`] while a query is open, or
    /// [`EcsError::RelationTargetNotAlive`] for a dead target.
    ///
    /// # Panics
    ///
    /// Panics if `relation` is not a relation component or not in `ids`.
    pub fn new_query_with_target(
        &mut self,
        n: usize,
        ids: &[ComponentId],
        relation: ComponentId,
        target: Entity,
    ) -> EcsResult<Query> {
        self.check_relation_in(ids, relation, target)?;
        let (archetype, rows) = self.create(n, ids, target)?;
        Ok(self.query_rows(archetype, rows.start, rows.end))
    }

    /// Adds zeroed components to every matching entity. Returns how many
    /// entities changed.
    ///
    /// # Errors
    ///
    /// [`EcsError::WorldLocked`] while a query is open.
    ///
    /// # Panics
    ///
    /// Panics if a matching entity already has one of the components.
    pub fn add(&mut self, filter: &Filter, ids: &[ComponentId]) -> EcsResult<usize> {
        self.exchange(filter, ids, &[])
    }

    /// Removes components from every matching entity.
    ///
    /// # Errors
    ///
    /// [`EcsError::WorldLocked`] while a query is open.
    ///
    /// # Panics
    ///
    /// Panics if a matching entity lacks one of the components.
    pub fn remove(&mut self, filter: &Filter, ids: &[ComponentId]) -> EcsResult<usize> {
        self.exchange(filter, &[], ids)
    }

    /// Removes `remove`, then adds `add`, on every matching entity.
    ///
    /// The matching set is fixed before anything moves: entities that start
    /// matching because of this call are not visited.
    ///
    /// # Errors
    ///
    /// [`EcsError::WorldLocked`] while a query is open.
    ///
    /// # Panics
    ///
    /// Panics on invalid transitions, or on unknown or repeated ids.
    pub fn exchange(
        &mut self,
        filter: &Filter,
        add: &[ComponentId],
        remove: &[ComponentId],
    ) -> EcsResult<usize> {
        let moved = self.exchange_with(filter, add, remove, TargetRule::Keep, None)?;
        Ok(moved.len())
    }

    /// Like [`Batch::exchange`], but returns a query over the entities that
    /// changed.
    ///
    /// # Errors
    ///
    /// [`EcsError::WorldLocked`] while a query is open.
    ///
    /// # Panics
    ///
    /// Panics on invalid transitions, or on unknown or repeated ids.
    pub fn exchange_query(
        &mut self,
        filter: &Filter,
        add: &[ComponentId],
        remove: &[ComponentId],
    ) -> EcsResult<Query> {
        let moved = self.exchange_with(filter, add, remove, TargetRule::Keep, None)?;
        Ok(self.query_entities(&moved))
    }

    /// Exchanges components on every matching entity and files the moved
    /// rows by `rule`. With `relation` set, every destination must hold it.
    pub(crate) fn exchange_with(
        &mut self,
        filter: &Filter,
        add: &[ComponentId],
        remove: &[ComponentId],
        rule: TargetRule,
        relation: Option<ComponentId>,
    ) -> EcsResult<Vec<Entity>> {
        let world = &mut *self.world;
        world.check_unlocked()?;
        if let TargetRule::Set(target) = rule {
            world.check_target(target)?;
        }
        world.mask_of(add);
        world.mask_of(remove);
        if let Some(relation) = relation {
            if add.is_empty() && remove.is_empty() {
                fatal(EcsError::EmptyExchange { relation });
            }
        }

        let spans = world.matching_spans(filter);
        let mut changed = Vec::new();
        for span in spans {
            let dst = world.transition(span.archetype, add, remove);
            if let Some(relation) = relation {
                if world.graph.get(dst).relation() != Some(relation) {
                    fatal(EcsError::MissingComponent { id: relation });
                }
            }
            if dst == span.archetype {
                continue;
            }
            let moved = span_entities(world, span);
            if covers_archetype(world, span) {
                let old_targets = if world.has_listener() {
                    span_targets(world, span)
                } else {
                    Vec::new()
                };
                bulk_move(world, span.archetype, dst, rule);
                if world.has_listener() {
                    let events = moved_events(world, &moved, &old_targets, span.archetype);
                    for event in &events {
                        world.notify(event);
                    }
                }
            } else {
                for &entity in &moved {
                    let at = world.entities.locate_unchecked(entity);
                    let event = world.move_entity(entity, at, dst, rule);
                    world.notify(&event);
                }
            }
            changed.extend(moved);
        }
        tracing::debug!(entities = changed.len(), "batch exchange");
        Ok(changed)
    }

    /// Removes every matching entity. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// [`EcsError::WorldLocked`] while a query is open.
    pub fn remove_entities(&mut self, filter: &Filter) -> EcsResult<usize> {
        let world = &mut *self.world;
        world.check_unlocked()?;

        let spans = world.matching_spans(filter);
        let mut count = 0;
        for span in spans {
            let doomed = span_entities(world, span);
            if covers_archetype(world, span) {
                for &entity in &doomed {
                    if world.has_listener() {
                        let event = removal_event(world, entity);
                        world.notify(&event);
                    }
                    // Every handle in the span is alive.
                    let destroyed = world.entities.destroy(entity);
                    debug_assert!(destroyed.is_ok());
                }
                world.graph.get_mut(span.archetype).clear();
            } else {
                for &entity in &doomed {
                    let at = world.entities.locate_unchecked(entity);
                    let event = world.despawn(entity, at);
                    world.notify(&event);
                }
            }
            count += doomed.len();
        }
        tracing::debug!(entities = count, "batch remove");
        Ok(count)
    }

    /// Sets the relation target of every matching entity.
    ///
    /// # Errors
    ///
    /// [`EcsError::WorldLocked`] while a query is open, or
    /// [`EcsError::RelationTargetNotAlive`] for a dead target.
    ///
    /// # Panics
    ///
    /// Panics if `relation` is not a relation component, or a matching
    /// entity does not hold it.
    pub fn set_relation(
        &mut self,
        filter: &Filter,
        relation: ComponentId,
        target: Entity,
    ) -> EcsResult<usize> {
        let changed = self.set_relation_with(filter, relation, target)?;
        Ok(changed.len())
    }

    /// Like [`Batch::set_relation`], but returns a query over the matched
    /// entities.
    ///
    /// # Errors
    ///
    /// [`EcsError::WorldLocked`] while a query is open, or
    /// [`EcsError::RelationTargetNotAlive`] for a dead target.
    ///
    /// # Panics
    ///
    /// Panics if `relation` is not a relation component, or a matching
    /// entity does not hold it.
    pub fn set_relation_query(
        &mut self,
        filter: &Filter,
        relation: ComponentId,
        target: Entity,
    ) -> EcsResult<Query> {
        let changed = self.set_relation_with(filter, relation, target)?;
        Ok(self.query_entities(&changed))
    }

    fn set_relation_with(
        &mut self,
        filter: &Filter,
        relation: ComponentId,
        target: Entity,
    ) -> EcsResult<Vec<Entity>> {
        let world = &mut *self.world;
        world.check_unlocked()?;
        world.check_relation(relation);
        world.check_target(target)?;

        let scope = filter.scope();
        let spans = world.matching_spans(filter);
        let mut changed = Vec::new();
        for span in spans {
            if world.graph.get(span.archetype).relation() != Some(relation) {
                fatal(EcsError::MissingComponent { id: relation });
            }
            let entities = span_entities(world, span);
            let old = if world.has_listener() {
                span_targets(world, span)
            } else {
                Vec::new()
            };

            let id = span.archetype;
            match scope {
                Some(from) if !covers_archetype(world, span) => {
                    let registry = &mut world.entities;
                    world
                        .graph
                        .get_mut(id)
                        .retarget(from, target, &mut |e, row| {
                            registry.set_location(e, Location { archetype: id, row });
                        });
                }
                _ => world.graph.get_mut(id).retarget_all(target),
            }

            if world.has_listener() {
                let archetype = world.graph.get(id);
                let mask = *archetype.mask();
                for (&entity, &old_target) in entities.iter().zip(&old) {
                    if old_target == target {
                        continue;
                    }
                    let event = EntityEvent {
                        entity,
                        kind: EventKind::Changed,
                        added: Mask::EMPTY,
                        removed: Mask::EMPTY,
                        current: mask,
                        old_relation: Some(relation),
                        new_relation: Some(relation),
                        old_target,
                        new_target: target,
                    };
                    world.notify(&event);
                }
            }
            changed.extend(entities);
        }
        tracing::debug!(entities = changed.len(), %target, "batch set relation");
        Ok(changed)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn check_relation_in(
        &self,
        ids: &[ComponentId],
        relation: ComponentId,
        target: Entity,
    ) -> EcsResult<()> {
        self.world.check_relation(relation);
        if !ids.contains(&relation) {
            fatal(EcsError::MissingComponent { id: relation });
        }
        self.world.check_target(target)
    }

    fn create_silent(
        &mut self,
        n: usize,
        ids: &[ComponentId],
        target: Entity,
    ) -> EcsResult<(ArchetypeId, std::ops::Range<u32>)> {
        let world = &mut *self.world;
        world.check_unlocked()?;
        let mask = world.mask_of(ids);
        let archetype = world.archetype_for(mask);
        let rows = world.spawn(archetype, n, target);
        tracing::debug!(entities = n, %archetype, "batch create");
        Ok((archetype, rows))
    }

    fn create_with(
        &mut self,
        n: usize,
        values: &[ComponentValue],
    ) -> EcsResult<(ArchetypeId, std::ops::Range<u32>)> {
        for value in values {
            value.check(&self.world.components);
        }
        let ids: Vec<ComponentId> = values.iter().map(ComponentValue::id).collect();
        let (archetype, rows) = self.create_silent(n, &ids, Entity::ZERO)?;
        let storage = self.world.graph.get_mut(archetype);
        for row in rows.clone() {
            for value in values {
                storage.write_bytes(value.id(), row, value.bytes());
            }
        }
        let entities = self.collect(archetype, rows.start, rows.end);
        self.notify_created(&entities);
        Ok((archetype, rows))
    }

    fn create(
        &mut self,
        n: usize,
        ids: &[ComponentId],
        target: Entity,
    ) -> EcsResult<(ArchetypeId, std::ops::Range<u32>)> {
        let (archetype, rows) = self.create_silent(n, ids, target)?;
        if self.world.has_listener() {
            let entities = self.collect(archetype, rows.start, rows.end);
            self.notify_created(&entities);
        }
        Ok((archetype, rows))
    }

    fn notify_created(&mut self, entities: &[Entity]) {
        if !self.world.has_listener() {
            return;
        }
        for &entity in entities {
            let event = self.world.created_event(entity);
            self.world.notify(&event);
        }
    }

    fn collect(&self, archetype: ArchetypeId, start: u32, end: u32) -> Vec<Entity> {
        self.world.graph.get(archetype).entities()[start as usize..end as usize].to_vec()
    }

    fn query_rows(&self, archetype: ArchetypeId, start: u32, end: u32) -> Query {
        let spans = if start < end {
            vec![Span {
                archetype,
                start,
                end,
            }]
        } else {
            Vec::new()
        };
        Query::new(self.world.id, spans, self.world.lock.acquire())
    }

    pub(crate) fn query_entities(&self, entities: &[Entity]) -> Query {
        let spans = spans_of(self.world, entities);
        Query::new(self.world.id, spans, self.world.lock.acquire())
    }
}

/// Current rows of live `entities`, merged into runs of consecutive rows.
fn spans_of(world: &World, entities: &[Entity]) -> Vec<Span> {
    let mut rows: Vec<(ArchetypeId, u32)> = entities
        .iter()
        .map(|&e| {
            let at = world.entities.locate_unchecked(e);
            (at.archetype, at.row)
        })
        .collect();
    rows.sort_unstable();
    let mut spans: Vec<Span> = Vec::new();
    for (archetype, row) in rows {
        match spans.last_mut() {
            Some(last) if last.archetype == archetype && last.end == row => last.end += 1,
            _ => spans.push(Span {
                archetype,
                start: row,
                end: row + 1,
            }),
        }
    }
    spans
}

/// Relation targets of the rows in `span`, zero for plain archetypes.
fn span_targets(world: &World, span: Span) -> Vec<Entity> {
    let archetype = world.graph.get(span.archetype);
    (span.start..span.end)
        .map(|row| archetype.target_of(row).unwrap_or(Entity::ZERO))
        .collect()
}

fn span_entities(world: &World, span: Span) -> Vec<Entity> {
    world.graph.get(span.archetype).entities()[span.start as usize..span.end as usize].to_vec()
}

fn covers_archetype(world: &World, span: Span) -> bool {
    span.start == 0 && span.end as usize == world.graph.get(span.archetype).len()
}

/// Appends every row of `src` to `dst`, then empties `src`.
fn bulk_move(world: &mut World, src: ArchetypeId, dst: ArchetypeId, rule: TargetRule) {
    let (from, to) = world.graph.pair_mut(src, dst);
    let registry = &mut world.entities;
    to.extend_from(from, rule, &mut |e, row| {
        registry.set_location(e, Location { archetype: dst, row });
    });
    from.clear();
}

/// Change events for entities that moved out of `src` in bulk.
/// `old_targets` holds their targets before the move, in the same order.
fn moved_events(
    world: &World,
    moved: &[Entity],
    old_targets: &[Entity],
    src: ArchetypeId,
) -> Vec<EntityEvent> {
    let old = world.graph.get(src);
    moved
        .iter()
        .zip(old_targets)
        .map(|(&entity, &old_target)| {
            let at = world.entities.locate_unchecked(entity);
            let new = world.graph.get(at.archetype);
            EntityEvent {
                entity,
                kind: EventKind::Changed,
                added: new.mask().difference(old.mask()),
                removed: old.mask().difference(new.mask()),
                current: *new.mask(),
                old_relation: old.relation(),
                new_relation: new.relation(),
                old_target,
                new_target: new.target_of(at.row).unwrap_or(Entity::ZERO),
            }
        })
        .collect()
}

fn removal_event(world: &World, entity: Entity) -> EntityEvent {
    let at = world.entities.locate_unchecked(entity);
    let archetype = world.graph.get(at.archetype);
    let target = archetype.target_of(at.row).unwrap_or(Entity::ZERO);
    EntityEvent {
        entity,
        kind: EventKind::Removed,
        added: Mask::EMPTY,
        removed: *archetype.mask(),
        current: *archetype.mask(),
        old_relation: archetype.relation(),
        new_relation: archetype.relation(),
        old_target: target,
        new_target: target,
    }
}
