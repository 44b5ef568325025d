//! # Resources
//!
//! Singleton values that do not belong to any entity: a clock, a random
//! number generator, a spatial index. One slot per registered type.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

use super::mask::MASK_TOTAL_BITS;
use crate::error::{EcsError, EcsResult};

/// Dense per-world identifier of a resource type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct ResourceId(u8);

impl ResourceId {
    /// Returns the raw id.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u8 {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

type Slot = Option<Box<dyn Any + Send + Sync>>;

#[derive(Default)]
pub(crate) struct ResourceStore {
    ids: HashMap<TypeId, ResourceId>,
    slots: Vec<Slot>,
}

impl ResourceStore {
    /// Id of `T`, registering it on first use.
    ///
    /// # Errors
    ///
    /// [`EcsError::CapacityExceeded`] once all ids are taken.
    pub fn id_of<T: Send + Sync + 'static>(&mut self) -> EcsResult<ResourceId> {
        let type_id = TypeId::of::<T>();
        if let Some(&id) = self.ids.get(&type_id) {
            return Ok(id);
        }
        let raw = u8::try_from(self.slots.len()).map_err(|_| EcsError::CapacityExceeded {
            what: "resource types",
            limit: MASK_TOTAL_BITS,
        })?;
        let id = ResourceId(raw);
        self.ids.insert(type_id, id);
        self.slots.push(None);
        Ok(id)
    }

    fn slot<T: 'static>(&self) -> Option<&Slot> {
        let id = self.ids.get(&TypeId::of::<T>())?;
        self.slots.get(id.0 as usize)
    }

    /// Stores `value`, returning the one it replaced.
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) -> EcsResult<Option<T>> {
        let id = self.id_of::<T>()?;
        let old = self.slots[id.0 as usize].replace(Box::new(value));
        Ok(old.and_then(|b| b.downcast::<T>().ok()).map(|b| *b))
    }

    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.slot::<T>()?.as_ref()?.downcast_ref::<T>()
    }

    pub fn get_mut<T: 'static>(&mut self) -> Option<&mut T> {
        let id = *self.ids.get(&TypeId::of::<T>())?;
        self.slots[id.0 as usize].as_mut()?.downcast_mut::<T>()
    }

    pub fn has<T: 'static>(&self) -> bool {
        self.slot::<T>().is_some_and(Option::is_some)
    }

    pub fn remove<T: 'static>(&mut self) -> Option<T> {
        let id = *self.ids.get(&TypeId::of::<T>())?;
        let boxed = self.slots[id.0 as usize].take()?;
        boxed.downcast::<T>().ok().map(|b| *b)
    }

    /// Value stored under `id`, type-erased.
    pub fn get_by_id(&self, id: ResourceId) -> Option<&(dyn Any + Send + Sync + 'static)> {
        self.slots.get(id.0 as usize)?.as_deref()
    }

    pub fn get_by_id_mut(
        &mut self,
        id: ResourceId,
    ) -> Option<&mut (dyn Any + Send + Sync + 'static)> {
        self.slots.get_mut(id.0 as usize)?.as_deref_mut()
    }

    /// Drops every value. Registrations are kept.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}
