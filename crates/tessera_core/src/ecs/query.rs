//! # Query Cursor
//!
//! A query owns the list of row spans it will visit and one count on the
//! world lock. It does not borrow the world: accessors take it explicitly,
//! so component values stay writable during iteration while structural
//! changes are refused with `WorldLocked`.
//!
//! ```rust,ignore
//! let mut query = world.query(&Filter::all(&[pos, vel]));
//! while query.next() {
//!     let v = *query.get(&world, vel).get::<Velocity>();
//!     query.get_mut(&mut world, pos).get_mut::<Position>().x += v.x;
//! }
//! ```
//!
//! State machine: `Created -> Iterating -> Exhausted`, and `Closed` from
//! anywhere. Exhausting or closing the cursor, or dropping it, releases the
//! lock.

use super::archetype::{Archetype, ArchetypeId};
use super::component::ComponentId;
use super::entity::Entity;
use super::lock::LockGuard;
use super::mask::Mask;
use super::storage::{ComponentMut, ComponentRef};
use super::world::World;
use crate::error::{fatal, EcsError};

/// Lifecycle of a [`Query`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryState {
    /// Not advanced yet.
    Created,
    /// Positioned on a row.
    Iterating,
    /// Ran past the last row.
    Exhausted,
    /// Closed explicitly.
    Closed,
}

/// Consecutive rows of one archetype.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Span {
    pub archetype: ArchetypeId,
    pub start: u32,
    pub end: u32,
}

impl Span {
    #[inline]
    fn len(&self) -> usize {
        (self.end - self.start) as usize
    }
}

/// Cursor over the entities matching a filter.
#[derive(Debug)]
pub struct Query {
    world_id: u64,
    spans: Vec<Span>,
    count: usize,
    state: QueryState,
    /// Ordinal of the current row.
    ordinal: usize,
    span_idx: usize,
    /// Ordinal of the first row of `spans[span_idx]`.
    span_base: usize,
    row: u32,
    guard: Option<LockGuard>,
}

impl Query {
    pub(crate) fn new(world_id: u64, spans: Vec<Span>, guard: LockGuard) -> Self {
        let count = spans.iter().map(Span::len).sum();
        Self {
            world_id,
            spans,
            count,
            state: QueryState::Created,
            ordinal: 0,
            span_idx: 0,
            span_base: 0,
            row: 0,
            guard: Some(guard),
        }
    }

    /// Current state.
    #[inline]
    #[must_use]
    pub const fn state(&self) -> QueryState {
        self.state
    }

    /// Total number of rows, known without iterating.
    #[inline]
    #[must_use]
    pub const fn count(&self) -> usize {
        self.count
    }

    /// Advances to the next row. Returns `false` once exhausted.
    #[inline]
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> bool {
        self.step(1)
    }

    /// Advances by `n` rows. `step(1)` is `next()`.
    ///
    /// # Panics
    ///
    /// Panics if `n` is zero.
    pub fn step(&mut self, n: usize) -> bool {
        assert!(n > 0, "step count must be positive");
        let ordinal = match self.state {
            QueryState::Exhausted | QueryState::Closed => return false,
            QueryState::Created => n - 1,
            QueryState::Iterating => self.ordinal.saturating_add(n),
        };
        if ordinal >= self.count {
            self.state = QueryState::Exhausted;
            self.guard = None;
            return false;
        }

        while ordinal >= self.span_base + self.spans[self.span_idx].len() {
            self.span_base += self.spans[self.span_idx].len();
            self.span_idx += 1;
        }
        let offset = u32::try_from(ordinal - self.span_base).unwrap_or(u32::MAX);
        self.row = self.spans[self.span_idx].start + offset;
        self.ordinal = ordinal;
        self.state = QueryState::Iterating;
        true
    }

    /// Releases the lock. Further `next()` calls return `false`.
    pub fn close(&mut self) {
        self.state = QueryState::Closed;
        self.guard = None;
    }

    #[track_caller]
    fn check_world(&self, world: &World) {
        assert_eq!(
            self.world_id, world.id,
            "query used with a world it was not created from"
        );
    }

    #[track_caller]
    fn current<'w>(&self, world: &'w World) -> (&'w Archetype, u32) {
        self.check_world(world);
        assert!(
            self.state == QueryState::Iterating,
            "query is not positioned on a row ({:?})",
            self.state
        );
        let span = self.spans[self.span_idx];
        (world.graph.get(span.archetype), self.row)
    }

    /// Entity at the current row.
    ///
    /// # Panics
    ///
    /// Panics unless the last `next()` returned `true`.
    #[must_use]
    #[track_caller]
    pub fn entity(&self, world: &World) -> Entity {
        let (archetype, row) = self.current(world);
        archetype.entity(row)
    }

    /// Component `id` of the current row.
    ///
    /// # Panics
    ///
    /// Panics unless positioned on a row whose archetype holds `id`.
    #[must_use]
    #[track_caller]
    pub fn get<'w>(&self, world: &'w World, id: ComponentId) -> ComponentRef<'w> {
        let (archetype, row) = self.current(world);
        archetype
            .get(id, row)
            .unwrap_or_else(|| fatal(EcsError::MissingComponent { id }))
    }

    /// Mutable component `id` of the current row.
    ///
    /// # Panics
    ///
    /// Panics unless positioned on a row whose archetype holds `id`.
    #[track_caller]
    pub fn get_mut<'w>(&self, world: &'w mut World, id: ComponentId) -> ComponentMut<'w> {
        let (archetype, row) = self.current(world);
        let archetype = archetype.id();
        world
            .graph
            .get_mut(archetype)
            .get_mut(id, row)
            .unwrap_or_else(|| fatal(EcsError::MissingComponent { id }))
    }

    /// Whether the current row has component `id`.
    #[must_use]
    #[track_caller]
    pub fn has(&self, world: &World, id: ComponentId) -> bool {
        self.current(world).0.has(id)
    }

    /// Mask of the current row.
    #[must_use]
    #[track_caller]
    pub fn mask(&self, world: &World) -> Mask {
        *self.current(world).0.mask()
    }

    /// Target of relation `relation` on the current row.
    ///
    /// # Panics
    ///
    /// Panics if the current row does not hold `relation` as its relation.
    #[must_use]
    #[track_caller]
    pub fn relation(&self, world: &World, relation: ComponentId) -> Entity {
        let (archetype, row) = self.current(world);
        if archetype.relation() != Some(relation) {
            fatal(EcsError::MissingComponent { id: relation });
        }
        archetype.target_of(row).unwrap_or(Entity::ZERO)
    }

    /// Entity at `ordinal` among all matched rows, without moving the cursor.
    ///
    /// # Panics
    ///
    /// Panics if `ordinal >= count()`, or once the query is exhausted or
    /// closed. Without the lock the recorded rows may have moved.
    #[must_use]
    #[track_caller]
    pub fn entity_at(&self, world: &World, ordinal: usize) -> Entity {
        self.check_world(world);
        match self.state {
            QueryState::Created | QueryState::Iterating => {}
            QueryState::Exhausted => panic!("query is exhausted"),
            QueryState::Closed => panic!("query is closed"),
        }
        assert!(
            ordinal < self.count,
            "ordinal {ordinal} out of range for {} rows",
            self.count
        );
        let mut base = 0;
        for span in &self.spans {
            if ordinal < base + span.len() {
                let offset = u32::try_from(ordinal - base).unwrap_or(u32::MAX);
                return world.graph.get(span.archetype).entity(span.start + offset);
            }
            base += span.len();
        }
        unreachable!("count covers every span")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::filter::Filter;
    use crate::ecs::lock::WorldLock;
    use bytemuck::{Pod, Zeroable};

    fn spans(lens: &[u32]) -> Vec<Span> {
        lens.iter()
            .enumerate()
            .map(|(i, &len)| Span {
                archetype: ArchetypeId::new(u32::try_from(i).unwrap()),
                start: 10,
                end: 10 + len,
            })
            .collect()
    }

    #[test]
    fn test_next_walks_all_spans() {
        let lock = WorldLock::default();
        let mut query = Query::new(0, spans(&[2, 3]), lock.acquire());
        assert_eq!(query.count(), 5);
        assert_eq!(query.state(), QueryState::Created);
        let mut seen = Vec::new();
        while query.next() {
            seen.push((query.span_idx, query.row));
        }
        assert_eq!(seen, vec![(0, 10), (0, 11), (1, 10), (1, 11), (1, 12)]);
        assert_eq!(query.state(), QueryState::Exhausted);
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_step_skips_rows() {
        let lock = WorldLock::default();
        let mut query = Query::new(0, spans(&[2, 3]), lock.acquire());
        assert!(query.step(3));
        assert_eq!((query.span_idx, query.row), (1, 10));
        assert!(query.step(2));
        assert_eq!((query.span_idx, query.row), (1, 12));
        assert!(!query.step(1));
    }

    #[test]
    fn test_close_releases_lock() {
        let lock = WorldLock::default();
        let mut query = Query::new(0, spans(&[4]), lock.acquire());
        assert!(query.next());
        query.close();
        assert_eq!(query.state(), QueryState::Closed);
        assert!(!lock.is_locked());
        assert!(!query.next());
    }

    #[test]
    fn test_drop_releases_lock() {
        let lock = WorldLock::default();
        {
            let _query = Query::new(0, spans(&[4]), lock.acquire());
            assert!(lock.is_locked());
        }
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_step_past_end_with_huge_count() {
        let lock = WorldLock::default();
        let mut query = Query::new(0, spans(&[3]), lock.acquire());
        assert!(query.next());
        assert!(!query.step(usize::MAX));
        assert_eq!(query.state(), QueryState::Exhausted);
        assert!(!lock.is_locked());
    }

    fn populated(n: usize) -> (World, ComponentId, Vec<Entity>) {
        let mut world = World::default();
        let hp = world.component_id::<Hp>();
        let entities = (0..n).map(|_| world.new_entity(&[hp]).unwrap()).collect();
        (world, hp, entities)
    }

    #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Hp(u32);

    #[test]
    fn test_entity_at_reads_without_moving() {
        let (world, hp, entities) = populated(3);
        let mut query = world.query(&Filter::all(&[hp]));
        assert_eq!(query.entity_at(&world, 2), entities[2]);
        assert!(query.next());
        assert_eq!(query.entity_at(&world, 1), entities[1]);
        assert_eq!(query.entity(&world), entities[0]);
        query.close();
    }

    #[test]
    #[should_panic(expected = "query is exhausted")]
    fn test_entity_at_after_exhaustion_panics() {
        let (mut world, hp, entities) = populated(3);
        let mut query = world.query(&Filter::all(&[hp]));
        while query.next() {}
        world.remove_entity(entities[0]).unwrap();
        world.remove_entity(entities[1]).unwrap();
        let _ = query.entity_at(&world, 0);
    }

    #[test]
    #[should_panic(expected = "query is closed")]
    fn test_entity_at_after_close_panics() {
        let (world, hp, _) = populated(2);
        let mut query = world.query(&Filter::all(&[hp]));
        query.close();
        let _ = query.entity_at(&world, 0);
    }

    #[test]
    fn test_empty_query_unlocks_on_first_next() {
        let lock = WorldLock::default();
        let mut query = Query::new(0, Vec::new(), lock.acquire());
        assert_eq!(query.count(), 0);
        assert!(!query.next());
        assert!(!lock.is_locked());
    }
}
