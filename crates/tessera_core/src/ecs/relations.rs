//! # Relation Targets
//!
//! Read and change the target entity of an entity's relation component.

use super::archetype::TargetRule;
use super::component::ComponentId;
use super::entity::Entity;
use super::filter::Filter;
use super::query::Query;
use super::world::World;
use crate::error::{fatal, EcsError, EcsResult};

/// Relation access for a world.
pub struct Relations<'w> {
    pub(crate) world: &'w mut World,
}

impl Relations<'_> {
    /// Target of `relation` on `entity`. Zero when unset.
    ///
    /// The target may have been removed since it was set; check it with
    /// [`World::alive`] before use.
    ///
    /// # Errors
    ///
    /// [`EcsError::NotAlive`] for a stale handle.
    ///
    /// # Panics
    ///
    /// Panics if `relation` is not a relation component or the entity does
    /// not hold it.
    #[track_caller]
    pub fn get(&self, entity: Entity, relation: ComponentId) -> EcsResult<Entity> {
        self.world.check_relation(relation);
        let at = self.world.entities.locate(entity)?;
        let archetype = self.world.graph.get(at.archetype);
        if archetype.relation() != Some(relation) {
            fatal(EcsError::MissingComponent { id: relation });
        }
        Ok(archetype.target_of(at.row).unwrap_or(Entity::ZERO))
    }

    /// Target of `relation` on `entity` without the liveness check.
    ///
    /// # Panics
    ///
    /// Panics if `relation` is not a relation component or the entity's
    /// last archetype does not hold it.
    #[must_use]
    #[track_caller]
    pub fn get_unchecked(&self, entity: Entity, relation: ComponentId) -> Entity {
        self.world.check_relation(relation);
        let at = self.world.entities.locate_unchecked(entity);
        let archetype = self.world.graph.get(at.archetype);
        if archetype.relation() != Some(relation) {
            fatal(EcsError::MissingComponent { id: relation });
        }
        archetype.target_of(at.row).unwrap_or(Entity::ZERO)
    }

    /// Sets the target of `relation` on `entity`. Zero clears it.
    ///
    /// # Errors
    ///
    /// [`EcsError::WorldLocked`] while a query is open,
    /// [`EcsError::NotAlive`] for a stale handle, or
    /// [`EcsError::RelationTargetNotAlive`] for a dead target.
    ///
    /// # Panics
    ///
    /// Panics if `relation` is not a relation component or the entity does
    /// not hold it.
    #[track_caller]
    pub fn set(&mut self, entity: Entity, relation: ComponentId, target: Entity) -> EcsResult<()> {
        let world = &mut *self.world;
        world.check_unlocked()?;
        world.check_relation(relation);
        let at = world.entities.locate(entity)?;
        world.check_target(target)?;
        if world.graph.get(at.archetype).relation() != Some(relation) {
            fatal(EcsError::MissingComponent { id: relation });
        }
        world.retarget(entity, at, target)
    }

    /// Exchanges components and sets the target of `relation` in one move.
    ///
    /// `relation` must be held by the entity after the exchange.
    ///
    /// # Errors
    ///
    /// [`EcsError::WorldLocked`] while a query is open,
    /// [`EcsError::NotAlive`] for a stale handle, or
    /// [`EcsError::RelationTargetNotAlive`] for a dead target.
    ///
    /// # Panics
    ///
    /// Panics on invalid transitions, or if the entity does not end up
    /// holding `relation`.
    #[track_caller]
    pub fn exchange(
        &mut self,
        entity: Entity,
        add: &[ComponentId],
        remove: &[ComponentId],
        relation: ComponentId,
        target: Entity,
    ) -> EcsResult<()> {
        self.world.check_relation(relation);
        self.world
            .exchange_with(entity, add, remove, TargetRule::Set(target), Some(relation))
    }

    /// Sets the target of `relation` on every matching entity. Same as
    /// [`Batch::set_relation`](super::Batch::set_relation).
    ///
    /// # Errors
    ///
    /// [`EcsError::WorldLocked`] while a query is open, or
    /// [`EcsError::RelationTargetNotAlive`] for a dead target.
    pub fn set_batch(
        &mut self,
        filter: &Filter,
        relation: ComponentId,
        target: Entity,
    ) -> EcsResult<usize> {
        self.world.batch().set_relation(filter, relation, target)
    }

    /// Like [`Relations::set_batch`], but returns a query over the matched
    /// entities.
    ///
    /// # Errors
    ///
    /// [`EcsError::WorldLocked`] while a query is open, or
    /// [`EcsError::RelationTargetNotAlive`] for a dead target.
    pub fn set_batch_query(
        &mut self,
        filter: &Filter,
        relation: ComponentId,
        target: Entity,
    ) -> EcsResult<Query> {
        self.world.batch().set_relation_query(filter, relation, target)
    }

    /// Exchanges components on every matching entity and files them all
    /// under `target`. Returns how many entities changed.
    ///
    /// # Errors
    ///
    /// [`EcsError::WorldLocked`] while a query is open, or
    /// [`EcsError::RelationTargetNotAlive`] for a dead target.
    ///
    /// # Panics
    ///
    /// Panics on invalid transitions, if `add` and `remove` are both empty,
    /// or if a changed entity does not end up holding `relation`.
    #[track_caller]
    pub fn exchange_batch(
        &mut self,
        filter: &Filter,
        add: &[ComponentId],
        remove: &[ComponentId],
        relation: ComponentId,
        target: Entity,
    ) -> EcsResult<usize> {
        self.world.check_relation(relation);
        let moved = self.world.batch().exchange_with(
            filter,
            add,
            remove,
            TargetRule::Set(target),
            Some(relation),
        )?;
        Ok(moved.len())
    }

    /// Like [`Relations::exchange_batch`], but returns a query over the
    /// entities that changed.
    ///
    /// # Errors
    ///
    /// [`EcsError::WorldLocked`] while a query is open, or
    /// [`EcsError::RelationTargetNotAlive`] for a dead target.
    ///
    /// # Panics
    ///
    /// Panics on invalid transitions, if `add` and `remove` are both empty,
    /// or if a changed entity does not end up holding `relation`.
    #[track_caller]
    pub fn exchange_batch_query(
        &mut self,
        filter: &Filter,
        add: &[ComponentId],
        remove: &[ComponentId],
        relation: ComponentId,
        target: Entity,
    ) -> EcsResult<Query> {
        self.world.check_relation(relation);
        let mut batch = self.world.batch();
        let moved =
            batch.exchange_with(filter, add, remove, TargetRule::Set(target), Some(relation))?;
        Ok(batch.query_entities(&moved))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::event::{EventLog, Subscription};
    use bytemuck::{Pod, Zeroable};

    #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Tag(u8);

    #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct ChildOf(u32);

    #[test]
    fn test_exchange_sets_target_in_one_move() {
        let mut world = World::default();
        let tag = world.component_id::<Tag>();
        let child = world.relation_id::<ChildOf>();
        let parent = world.new_entity(&[tag]).unwrap();
        let e = world.new_entity(&[tag]).unwrap();

        world
            .relations()
            .exchange(e, &[child], &[tag], child, parent)
            .unwrap();
        assert!(!world.has(e, tag));
        assert_eq!(world.relations().get(e, child), Ok(parent));

        let scoped = Filter::all(&[child]).with_target(parent);
        assert_eq!(world.query(&scoped).count(), 1);
    }

    #[test]
    fn test_set_moves_between_blocks() {
        let mut world = World::default();
        let tag = world.component_id::<Tag>();
        let child = world.relation_id::<ChildOf>();
        let a = world.new_entity(&[tag]).unwrap();
        let b = world.new_entity(&[tag]).unwrap();
        let kids = world
            .batch()
            .new_entities_with_target(4, &[child], child, a)
            .unwrap();

        world.relations().set(kids[1], child, b).unwrap();
        world.relations().set(kids[3], child, b).unwrap();
        for (i, &kid) in kids.iter().enumerate() {
            let expected = if i % 2 == 1 { b } else { a };
            assert_eq!(world.relations().get(kid, child), Ok(expected));
        }
        assert_eq!(world.query(&Filter::all(&[child]).with_target(a)).count(), 2);
        assert_eq!(world.query(&Filter::all(&[child]).with_target(b)).count(), 2);
    }

    #[test]
    fn test_stale_target_is_kept() {
        let mut world = World::default();
        let tag = world.component_id::<Tag>();
        let child = world.relation_id::<ChildOf>();
        let parent = world.new_entity(&[tag]).unwrap();
        let kid = world
            .new_entity_with_target(&[child], child, parent)
            .unwrap();
        world.remove_entity(parent).unwrap();
        let target = world.relations().get(kid, child).unwrap();
        assert_eq!(target, parent);
        assert!(!world.alive(target));
        world.relations().set(kid, child, Entity::ZERO).unwrap();
        assert_eq!(world.relations().get(kid, child), Ok(Entity::ZERO));
    }

    #[test]
    fn test_target_change_event() {
        let mut world = World::default();
        let tag = world.component_id::<Tag>();
        let child = world.relation_id::<ChildOf>();
        let parent = world.new_entity(&[tag]).unwrap();
        let kid = world.new_entity(&[child]).unwrap();
        let log = EventLog::new().subscribed(Subscription::TARGET_CHANGED);
        world.set_listener(log.clone());

        world.relations().set(kid, child, parent).unwrap();
        world.relations().set(kid, child, parent).unwrap();

        let events = log.take();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].old_target, Entity::ZERO);
        assert_eq!(events[0].new_target, parent);
    }

    #[test]
    fn test_get_unchecked_matches_get() {
        let mut world = World::default();
        let tag = world.component_id::<Tag>();
        let child = world.relation_id::<ChildOf>();
        let parent = world.new_entity(&[tag]).unwrap();
        let kid = world
            .new_entity_with_target(&[child, tag], child, parent)
            .unwrap();
        let relations = world.relations();
        assert_eq!(relations.get_unchecked(kid, child), parent);
        assert_eq!(relations.get(kid, child), Ok(parent));
    }

    #[test]
    fn test_exchange_batch_files_all_under_target() {
        let mut world = World::default();
        let tag = world.component_id::<Tag>();
        let child = world.relation_id::<ChildOf>();
        let parent = world.new_entity(&[]).unwrap();
        let kids = world.batch().new_entities(4, &[tag]).unwrap();
        let log = EventLog::new().subscribed(Subscription::TARGET_CHANGED);
        world.set_listener(log.clone());

        let moved = world
            .relations()
            .exchange_batch(&Filter::all(&[tag]), &[child], &[tag], child, parent)
            .unwrap();
        assert_eq!(moved, 4);
        for &kid in &kids {
            assert!(!world.has(kid, tag));
            assert_eq!(world.relations().get(kid, child), Ok(parent));
        }
        let events = log.take();
        assert_eq!(events.len(), 4);
        assert!(events.iter().all(|e| e.new_target == parent));
    }

    #[test]
    fn test_exchange_batch_query_and_set_batch() {
        let mut world = World::default();
        let tag = world.component_id::<Tag>();
        let child = world.relation_id::<ChildOf>();
        let a = world.new_entity(&[]).unwrap();
        let b = world.new_entity(&[]).unwrap();
        world.batch().new_entities(3, &[tag]).unwrap();

        let mut query = world
            .relations()
            .exchange_batch_query(&Filter::all(&[tag]), &[child], &[], child, a)
            .unwrap();
        assert_eq!(query.count(), 3);
        while query.next() {
            assert!(query.has(&world, tag));
            assert_eq!(query.relation(&world, child), a);
        }

        let scoped = Filter::all(&[child]).with_target(a);
        assert_eq!(world.relations().set_batch(&scoped, child, b).unwrap(), 3);
        let mut query = world
            .relations()
            .set_batch_query(&Filter::all(&[child]).with_target(b), child, a)
            .unwrap();
        assert_eq!(query.count(), 3);
        query.close();
        assert_eq!(world.query(&scoped).count(), 3);
    }

    #[test]
    #[should_panic(expected = "use set_relation")]
    fn test_exchange_batch_without_changes_panics() {
        let mut world = World::default();
        let child = world.relation_id::<ChildOf>();
        world.batch().new_entities(2, &[child]).unwrap();
        let _ = world
            .relations()
            .exchange_batch(&Filter::all(&[child]), &[], &[], child, Entity::ZERO);
    }

    #[test]
    #[should_panic(expected = "is not a relation component")]
    fn test_plain_component_is_not_a_relation() {
        let mut world = World::default();
        let tag = world.component_id::<Tag>();
        let e = world.new_entity(&[tag]).unwrap();
        let _ = world.relations().get(e, tag);
    }
}
