//! # Component System
//!
//! Components are pure data containers with no behavior.
//! They must be plain old data so rows can be relocated bit-for-bit and new
//! components start out zeroed.

use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::fmt;

use bytemuck::Pod;

use super::mask::MASK_TOTAL_BITS;
use super::storage::{new_column, ErasedColumn};
use crate::error::{EcsError, EcsResult};

/// Marker trait for ECS components.
///
/// Components must be:
/// - `Pod`: bitwise copyable, no padding, valid when zeroed
/// - `Send + Sync`: worlds can move between threads
///
/// Implemented for every such type.
///
/// # Example
///
/// ```rust
/// use bytemuck::{Pod, Zeroable};
///
/// #[derive(Clone, Copy, Default, Pod, Zeroable)]
/// #[repr(C)]
/// struct Position {
///     x: f32,
///     y: f32,
/// }
///
/// let mut world = tessera_core::World::default();
/// let pos = world.component_id::<Position>();
/// ```
pub trait Component: Pod + Send + Sync + 'static {}

impl<T: Pod + Send + Sync + 'static> Component for T {}

/// Dense per-world identifier of a component type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct ComponentId(u8);

impl ComponentId {
    #[inline]
    pub(crate) const fn from_raw(raw: u8) -> Self {
        Self(raw)
    }

    /// Returns the raw id.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// Returns the id as an index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metadata recorded when a component type is registered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComponentInfo {
    /// The assigned id.
    pub id: ComponentId,
    /// Rust type of the component.
    pub type_id: TypeId,
    /// Type name, for diagnostics.
    pub name: &'static str,
    /// Size of one value in bytes.
    pub size: usize,
    /// Alignment of one value.
    pub align: usize,
    /// Whether rows carrying this component are partitioned by target entity.
    pub is_relation: bool,
}

/// Maps component types to ids and knows how to build their columns.
pub(crate) struct ComponentRegistry {
    by_type: HashMap<TypeId, ComponentId>,
    infos: Vec<ComponentInfo>,
    factories: Vec<fn() -> Box<dyn ErasedColumn>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self {
            by_type: HashMap::new(),
            infos: Vec::new(),
            factories: Vec::new(),
        }
    }

    /// Returns the id of `T`, registering it on first use.
    ///
    /// The first registration decides whether `T` is a relation component.
    ///
    /// # Errors
    ///
    /// [`EcsError::CapacityExceeded`] once all ids are taken.
    pub fn id_of<T: Component>(&mut self, relation: bool) -> EcsResult<ComponentId> {
        let type_id = TypeId::of::<T>();
        if let Some(&id) = self.by_type.get(&type_id) {
            if relation && !self.infos[id.index()].is_relation {
                return Err(EcsError::NotARelation { id });
            }
            return Ok(id);
        }

        let raw = u8::try_from(self.infos.len()).map_err(|_| EcsError::CapacityExceeded {
            what: "component types",
            limit: MASK_TOTAL_BITS,
        })?;
        let id = ComponentId(raw);
        self.by_type.insert(type_id, id);
        self.infos.push(ComponentInfo {
            id,
            type_id,
            name: type_name::<T>(),
            size: std::mem::size_of::<T>(),
            align: std::mem::align_of::<T>(),
            is_relation: relation,
        });
        self.factories.push(new_column::<T>);
        Ok(id)
    }

    /// Looks up the id of `T` without registering.
    pub fn get<T: Component>(&self) -> Option<ComponentId> {
        self.by_type.get(&TypeId::of::<T>()).copied()
    }

    #[inline]
    pub fn info(&self, id: ComponentId) -> Option<&ComponentInfo> {
        self.infos.get(id.index())
    }

    /// Panics unless `id` was issued by this registry.
    #[inline]
    #[track_caller]
    pub fn check(&self, id: ComponentId) {
        if id.index() >= self.infos.len() {
            crate::error::fatal(EcsError::InvalidComponentId { id: id.0 });
        }
    }

    #[inline]
    pub fn is_relation(&self, id: ComponentId) -> bool {
        self.infos.get(id.index()).is_some_and(|info| info.is_relation)
    }

    /// Builds an empty column for `id`.
    pub fn new_column(&self, id: ComponentId) -> Box<dyn ErasedColumn> {
        (self.factories[id.index()])()
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn infos(&self) -> &[ComponentInfo] {
        &self.infos
    }
}

/// A component value detached from any entity.
///
/// Used to create or extend entities with initial values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComponentValue {
    id: ComponentId,
    type_id: TypeId,
    type_name: &'static str,
    bytes: Vec<u8>,
}

impl ComponentValue {
    /// Packs `value` for component `id`.
    #[must_use]
    pub fn new<T: Component>(id: ComponentId, value: T) -> Self {
        Self {
            id,
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            bytes: bytemuck::bytes_of(&value).to_vec(),
        }
    }

    /// The target component id.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> ComponentId {
        self.id
    }

    /// Raw bytes of the value.
    #[inline]
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Panics unless the value's type matches what `id` stores.
    #[track_caller]
    pub(crate) fn check(&self, registry: &ComponentRegistry) {
        registry.check(self.id);
        let stored = registry.info(self.id).map(|info| info.type_id);
        if stored != Some(self.type_id) {
            crate::error::fatal(EcsError::TypeMismatch {
                id: self.id,
                requested: self.type_name,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, Default, bytemuck::Pod, bytemuck::Zeroable)]
    #[repr(C)]
    struct Health(u32);

    #[derive(Clone, Copy, Default, bytemuck::Pod, bytemuck::Zeroable)]
    #[repr(C)]
    struct ChildOf(u8);

    #[test]
    fn test_ids_are_dense_and_memoized() {
        let mut registry = ComponentRegistry::new();
        let a = registry.id_of::<Health>(false).unwrap();
        let b = registry.id_of::<ChildOf>(true).unwrap();
        assert_eq!(a.raw(), 0);
        assert_eq!(b.raw(), 1);
        assert_eq!(registry.id_of::<Health>(false).unwrap(), a);
        assert_eq!(registry.get::<ChildOf>(), Some(b));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_metadata() {
        let mut registry = ComponentRegistry::new();
        let id = registry.id_of::<Health>(false).unwrap();
        let info = registry.info(id).unwrap();
        assert_eq!(info.size, 4);
        assert_eq!(info.align, 4);
        assert!(!info.is_relation);
        assert!(info.name.ends_with("Health"));
    }

    #[test]
    fn test_relation_flag_fixed_by_first_registration() {
        let mut registry = ComponentRegistry::new();
        let id = registry.id_of::<Health>(false).unwrap();
        assert_eq!(
            registry.id_of::<Health>(true),
            Err(EcsError::NotARelation { id })
        );

        let rel = registry.id_of::<ChildOf>(true).unwrap();
        assert!(registry.is_relation(rel));
        assert_eq!(registry.id_of::<ChildOf>(false).unwrap(), rel);
    }

    #[test]
    #[should_panic(expected = "invalid component id 9")]
    fn test_check_rejects_foreign_id() {
        let registry = ComponentRegistry::new();
        registry.check(ComponentId::from_raw(9));
    }

    #[test]
    #[should_panic(expected = "does not store values of type")]
    fn test_value_type_mismatch() {
        let mut registry = ComponentRegistry::new();
        let health = registry.id_of::<Health>(false).unwrap();
        ComponentValue::new(health, ChildOf(1)).check(&registry);
    }

    #[test]
    fn test_value_bytes() {
        let value = ComponentValue::new(ComponentId::from_raw(0), Health(0x0102_0304));
        assert_eq!(value.bytes(), &0x0102_0304u32.to_ne_bytes());
    }
}
