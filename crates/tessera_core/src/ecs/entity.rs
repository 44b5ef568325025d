//! # Entity Management
//!
//! Entities are lightweight identifiers consisting of:
//! - An index into the registry's slot table
//! - A generation counter for safe reuse
//!
//! Slot 0 is reserved, so `Entity::ZERO` never refers to a live entity.

use std::fmt;

use super::archetype::ArchetypeId;
use crate::error::{EcsError, EcsResult};

/// Unique identifier for an entity.
///
/// Handles are only issued by the world. A handle stays valid until its
/// entity is removed; after that the slot's generation moves on and the old
/// handle is rejected everywhere.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Entity {
    index: u32,
    generation: u32,
}

impl Entity {
    /// The "no entity" sentinel. Never alive.
    pub const ZERO: Self = Self {
        index: 0,
        generation: 0,
    };

    #[inline]
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Returns the slot index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Returns the generation counter.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// Checks if this is the zero sentinel.
    #[inline]
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.index == 0 && self.generation == 0
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({}v{})", self.index, self.generation)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Where an entity's row lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Location {
    pub archetype: ArchetypeId,
    pub row: u32,
}

impl Location {
    pub const NOWHERE: Self = Self {
        archetype: ArchetypeId::EMPTY,
        row: u32::MAX,
    };
}

#[derive(Clone, Copy, Debug)]
struct Slot {
    generation: u32,
    alive: bool,
    location: Location,
}

/// Allocates and recycles entity handles.
///
/// Freed indices are reused last-in first-out with the generation bumped.
pub(crate) struct EntityRegistry {
    slots: Vec<Slot>,
    free: Vec<u32>,
    alive: usize,
}

impl EntityRegistry {
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity.max(1));
        // Reserved slot backing Entity::ZERO.
        slots.push(Slot {
            generation: 0,
            alive: false,
            location: Location::NOWHERE,
        });
        Self {
            slots,
            free: Vec::new(),
            alive: 0,
        }
    }

    /// Issues a handle, reusing the most recently freed index first.
    pub fn create(&mut self, location: Location) -> Entity {
        self.alive += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.alive = true;
            slot.location = location;
            return Entity::new(index, slot.generation);
        }

        let index = u32::try_from(self.slots.len()).unwrap_or_else(|_| {
            crate::error::fatal(EcsError::CapacityExceeded {
                what: "entities",
                limit: u32::MAX as usize,
            })
        });
        self.slots.push(Slot {
            generation: 0,
            alive: true,
            location,
        });
        Entity::new(index, 0)
    }

    /// Frees the entity's slot.
    ///
    /// # Errors
    ///
    /// [`EcsError::NotAlive`] if the handle is stale.
    pub fn destroy(&mut self, entity: Entity) -> EcsResult<()> {
        if !self.is_alive(entity) {
            return Err(EcsError::NotAlive { entity });
        }
        let slot = &mut self.slots[entity.index as usize];
        slot.generation = slot.generation.wrapping_add(1);
        slot.alive = false;
        slot.location = Location::NOWHERE;
        self.free.push(entity.index);
        self.alive -= 1;
        Ok(())
    }

    #[inline]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.slots
            .get(entity.index as usize)
            .is_some_and(|slot| slot.alive && slot.generation == entity.generation)
    }

    /// Looks up the entity's row.
    ///
    /// # Errors
    ///
    /// [`EcsError::NotAlive`] if the handle is stale.
    #[inline]
    pub fn locate(&self, entity: Entity) -> EcsResult<Location> {
        match self.slots.get(entity.index as usize) {
            Some(slot) if slot.alive && slot.generation == entity.generation => Ok(slot.location),
            _ => Err(EcsError::NotAlive { entity }),
        }
    }

    /// Location without the generation check.
    #[inline]
    pub fn locate_unchecked(&self, entity: Entity) -> Location {
        self.slots[entity.index as usize].location
    }

    #[inline]
    pub fn set_location(&mut self, entity: Entity, location: Location) {
        debug_assert!(self.is_alive(entity), "moving a dead entity {entity}");
        self.slots[entity.index as usize].location = location;
    }

    /// Frees every live slot. Outstanding handles become stale.
    pub fn reset(&mut self) {
        self.free.clear();
        for index in (1..self.slots.len()).rev() {
            let slot = &mut self.slots[index];
            if slot.alive {
                slot.generation = slot.generation.wrapping_add(1);
                slot.alive = false;
                slot.location = Location::NOWHERE;
            }
            #[allow(clippy::cast_possible_truncation)]
            self.free.push(index as u32);
        }
        self.alive = 0;
    }

    /// Number of live entities.
    #[inline]
    pub fn alive_count(&self) -> usize {
        self.alive
    }

    /// Slots ever issued, excluding the reserved one.
    #[inline]
    pub fn total(&self) -> usize {
        self.slots.len() - 1
    }

    /// Slots waiting for reuse.
    #[inline]
    pub fn recycled(&self) -> usize {
        self.free.len()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }
}
