//! # Archetype Graph
//!
//! Owns every archetype, one per distinct mask. Archetypes are addressed by
//! small integer ids; a mask → id map finds them, and per-archetype edges
//! memoize single-component transitions so repeated add/remove calls skip
//! the hash lookup.

use std::collections::HashMap;

use super::archetype::{Archetype, ArchetypeId};
use super::component::{ComponentId, ComponentRegistry};
use super::mask::Mask;
use crate::config::WorldConfig;
use crate::error::{fatal, EcsError};

pub(crate) struct ArchetypeGraph {
    archetypes: Vec<Archetype>,
    by_mask: HashMap<Mask, ArchetypeId>,
    increment: usize,
    relation_increment: usize,
}

impl ArchetypeGraph {
    pub fn new(config: &WorldConfig) -> Self {
        let mut graph = Self {
            archetypes: Vec::new(),
            by_mask: HashMap::new(),
            increment: config.capacity_increment,
            relation_increment: config.relation_increment(),
        };
        let empty = Archetype::new(
            ArchetypeId::EMPTY,
            Mask::EMPTY,
            Vec::new(),
            None,
            graph.increment,
        );
        graph.by_mask.insert(Mask::EMPTY, ArchetypeId::EMPTY);
        graph.archetypes.push(empty);
        graph
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.archetypes.len()
    }

    #[inline]
    pub fn get(&self, id: ArchetypeId) -> &Archetype {
        &self.archetypes[id.index()]
    }

    #[inline]
    pub fn get_mut(&mut self, id: ArchetypeId) -> &mut Archetype {
        &mut self.archetypes[id.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Archetype> {
        self.archetypes.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Archetype> {
        self.archetypes.iter_mut()
    }

    /// Mutable access to two distinct archetypes.
    pub fn pair_mut(&mut self, a: ArchetypeId, b: ArchetypeId) -> (&mut Archetype, &mut Archetype) {
        assert_ne!(a, b, "pair_mut needs two distinct archetypes");
        let (ai, bi) = (a.index(), b.index());
        if ai < bi {
            let (left, right) = self.archetypes.split_at_mut(bi);
            (&mut left[ai], &mut right[0])
        } else {
            let (left, right) = self.archetypes.split_at_mut(ai);
            (&mut right[0], &mut left[bi])
        }
    }

    /// Returns the archetype for `mask`, creating it if needed.
    ///
    /// # Panics
    ///
    /// Panics if the mask holds more than one relation component.
    pub fn find_or_create(&mut self, mask: Mask, registry: &ComponentRegistry) -> ArchetypeId {
        if let Some(&id) = self.by_mask.get(&mask) {
            return id;
        }

        let mut relation = None;
        let mut columns = Vec::with_capacity(mask.len());
        for cid in &mask {
            registry.check(cid);
            if registry.is_relation(cid) {
                if relation.is_some() {
                    fatal(EcsError::InvalidTransition {
                        id: cid,
                        reason: "entity already has a relation component",
                    });
                }
                relation = Some(cid);
            }
            columns.push((cid, registry.new_column(cid)));
        }

        let index = u32::try_from(self.archetypes.len()).unwrap_or_else(|_| {
            fatal(EcsError::CapacityExceeded {
                what: "archetypes",
                limit: u32::MAX as usize,
            })
        });
        let id = ArchetypeId::new(index);
        let increment = if relation.is_some() {
            self.relation_increment
        } else {
            self.increment
        };
        tracing::debug!(
            archetype = index,
            components = mask.len(),
            relation = ?relation,
            "created archetype"
        );
        self.archetypes
            .push(Archetype::new(id, mask, columns, relation, increment));
        self.by_mask.insert(mask, id);
        id
    }

    /// Follows (or builds) the edge from `from` over one component.
    ///
    /// # Panics
    ///
    /// Panics when adding a present component or removing an absent one.
    pub fn step(
        &mut self,
        from: ArchetypeId,
        id: ComponentId,
        adding: bool,
        registry: &ComponentRegistry,
    ) -> ArchetypeId {
        let source = self.get(from);
        if let Some(to) = source.edges.get(id, adding) {
            return to;
        }

        registry.check(id);
        let mask = *source.mask();
        if mask.get(id) == adding {
            fatal(EcsError::InvalidTransition {
                id,
                reason: if adding {
                    "component is already present"
                } else {
                    "component is not present"
                },
            });
        }

        let next = if adding { mask.with(id) } else { mask.without(id) };
        let to = self.find_or_create(next, registry);
        self.get_mut(from).edges.insert(id, adding, to);
        self.get_mut(to).edges.insert(id, !adding, from);
        to
    }

    /// Destination after removing `remove` and then adding `add`.
    pub fn transition(
        &mut self,
        from: ArchetypeId,
        add: &[ComponentId],
        remove: &[ComponentId],
        registry: &ComponentRegistry,
    ) -> ArchetypeId {
        let mut at = from;
        for &id in remove {
            at = self.step(at, id, false, registry);
        }
        for &id in add {
            at = self.step(at, id, true, registry);
        }
        at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
    #[repr(C)]
    struct A(u32);

    #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
    #[repr(C)]
    struct B(u64);

    #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
    #[repr(C)]
    struct R1(u8);

    #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
    #[repr(C)]
    struct R2(u8);

    fn setup() -> (ArchetypeGraph, ComponentRegistry, [ComponentId; 4]) {
        let mut registry = ComponentRegistry::new();
        let ids = [
            registry.id_of::<A>(false).unwrap(),
            registry.id_of::<B>(false).unwrap(),
            registry.id_of::<R1>(true).unwrap(),
            registry.id_of::<R2>(true).unwrap(),
        ];
        (ArchetypeGraph::new(&WorldConfig::default()), registry, ids)
    }

    #[test]
    fn test_one_archetype_per_mask() {
        let (mut graph, registry, [a, b, ..]) = setup();
        let ab = graph.find_or_create(Mask::new(&[a, b]), &registry);
        let again = graph.find_or_create(Mask::new(&[b, a]), &registry);
        assert_eq!(ab, again);
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn test_edges_are_memoized_both_ways() {
        let (mut graph, registry, [a, b, ..]) = setup();
        let to_a = graph.step(ArchetypeId::EMPTY, a, true, &registry);
        let to_ab = graph.step(to_a, b, true, &registry);
        assert_eq!(graph.get(to_ab).mask(), &Mask::new(&[a, b]));
        assert_eq!(graph.get(to_ab).edges.get(b, false), Some(to_a));
        assert_eq!(graph.get(to_a).edges.get(a, false), Some(ArchetypeId::EMPTY));
        assert_eq!(graph.transition(to_ab, &[], &[a, b], &registry), ArchetypeId::EMPTY);
        assert_eq!(graph.len(), 3);
    }

    #[test]
    fn test_relation_archetype() {
        let (mut graph, registry, [a, _, r1, _]) = setup();
        let id = graph.find_or_create(Mask::new(&[a, r1]), &registry);
        assert_eq!(graph.get(id).relation(), Some(r1));
    }

    #[test]
    #[should_panic(expected = "already has a relation component")]
    fn test_two_relations_rejected() {
        let (mut graph, registry, [_, _, r1, r2]) = setup();
        graph.find_or_create(Mask::new(&[r1, r2]), &registry);
    }

    #[test]
    #[should_panic(expected = "component is already present")]
    fn test_add_present_rejected() {
        let (mut graph, registry, [a, ..]) = setup();
        let to_a = graph.step(ArchetypeId::EMPTY, a, true, &registry);
        // The edge cache must not hide the invalid request.
        let _ = graph.step(to_a, a, true, &registry);
    }

    #[test]
    #[should_panic(expected = "component is not present")]
    fn test_remove_absent_rejected() {
        let (mut graph, registry, [a, ..]) = setup();
        graph.step(ArchetypeId::EMPTY, a, false, &registry);
    }

    #[test]
    fn test_pair_mut_either_order() {
        let (mut graph, registry, [a, ..]) = setup();
        let to_a = graph.find_or_create(Mask::new(&[a]), &registry);
        let (x, y) = graph.pair_mut(to_a, ArchetypeId::EMPTY);
        assert_eq!(x.id(), to_a);
        assert_eq!(y.id(), ArchetypeId::EMPTY);
    }
}
