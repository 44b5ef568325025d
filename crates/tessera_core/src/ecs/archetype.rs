//! # Archetype-based Entity Storage
//!
//! Entities with the same component set are stored together:
//!
//! ```text
//! Archetype {Position, Velocity}:
//! entities: [e3, e7, e1, ...]
//! Position: [P3, P7, P1, ...]
//! Velocity: [V3, V7, V1, ...]
//! ```
//!
//! Every column has exactly as many rows as the entity list, with no gaps.
//! Removal swaps the last row into the hole, so row order is unspecified.
//! Archetypes holding a relation component additionally keep their rows
//! grouped by target (see [`RelationIndex`]).

use std::collections::HashMap;
use std::fmt;
use std::ops::Range;

use super::component::ComponentId;
use super::entity::Entity;
use super::mask::{Mask, MASK_TOTAL_BITS};
use super::relation::RelationIndex;
use super::storage::{ComponentMut, ComponentRef, ErasedColumn};

/// Index of an archetype in its world.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct ArchetypeId(u32);

impl ArchetypeId {
    /// The archetype with no components. Always exists.
    pub const EMPTY: Self = Self(0);

    #[inline]
    pub(crate) const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the id as an index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ArchetypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

const NO_COLUMN: u16 = u16::MAX;

/// How rows arriving from another archetype pick their relation target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TargetRule {
    /// Keep the source target if the relation is retained, else zero.
    Keep,
    /// Use this target.
    Set(Entity),
}

/// Memoized single-component transitions.
#[derive(Default)]
pub(crate) struct Edges {
    add: HashMap<ComponentId, ArchetypeId>,
    remove: HashMap<ComponentId, ArchetypeId>,
}

impl Edges {
    #[inline]
    pub fn get(&self, id: ComponentId, adding: bool) -> Option<ArchetypeId> {
        if adding {
            self.add.get(&id).copied()
        } else {
            self.remove.get(&id).copied()
        }
    }

    #[inline]
    pub fn insert(&mut self, id: ComponentId, adding: bool, to: ArchetypeId) {
        if adding {
            self.add.insert(id, to);
        } else {
            self.remove.insert(id, to);
        }
    }
}

/// Column storage for one component set.
pub(crate) struct Archetype {
    id: ArchetypeId,
    mask: Mask,
    ids: Vec<ComponentId>,
    columns: Vec<Box<dyn ErasedColumn>>,
    column_of: Box<[u16; MASK_TOTAL_BITS]>,
    entities: Vec<Entity>,
    relation: Option<RelationIndex>,
    increment: usize,
    pub edges: Edges,
}

/// Column and entity storage, split off so the relation index can swap rows
/// while it is itself borrowed.
struct Rows<'a> {
    columns: &'a mut [Box<dyn ErasedColumn>],
    entities: &'a mut Vec<Entity>,
    touched: Vec<u32>,
}

impl Rows<'_> {
    fn swap(&mut self, a: u32, b: u32) {
        if a == b {
            return;
        }
        for column in self.columns.iter_mut() {
            column.swap(a as usize, b as usize);
        }
        self.entities.swap(a as usize, b as usize);
        self.touched.push(a);
        self.touched.push(b);
    }
}

impl Archetype {
    pub fn new(
        id: ArchetypeId,
        mask: Mask,
        columns: Vec<(ComponentId, Box<dyn ErasedColumn>)>,
        relation: Option<ComponentId>,
        increment: usize,
    ) -> Self {
        let mut column_of = Box::new([NO_COLUMN; MASK_TOTAL_BITS]);
        let mut ids = Vec::with_capacity(columns.len());
        let mut storage = Vec::with_capacity(columns.len());
        for (slot, (cid, column)) in columns.into_iter().enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            {
                column_of[cid.index()] = slot as u16;
            }
            ids.push(cid);
            storage.push(column);
        }
        Self {
            id,
            mask,
            ids,
            columns: storage,
            column_of,
            entities: Vec::new(),
            relation: relation.map(RelationIndex::new),
            increment: increment.max(1),
            edges: Edges::default(),
        }
    }

    #[inline]
    pub fn id(&self) -> ArchetypeId {
        self.id
    }

    #[inline]
    pub fn mask(&self) -> &Mask {
        &self.mask
    }

    #[inline]
    pub fn ids(&self) -> &[ComponentId] {
        &self.ids
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.entities.capacity()
    }

    #[inline]
    pub fn has(&self, id: ComponentId) -> bool {
        self.mask.get(id)
    }

    #[inline]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    #[inline]
    pub fn entity(&self, row: u32) -> Entity {
        self.entities[row as usize]
    }

    /// Bytes held by reserved column storage.
    pub fn memory_bytes(&self) -> usize {
        self.columns
            .iter()
            .map(|c| c.capacity() * c.item_size())
            .sum::<usize>()
            + self.entities.capacity() * std::mem::size_of::<Entity>()
    }

    /// Bytes per row.
    pub fn row_size(&self) -> usize {
        self.columns.iter().map(|c| c.item_size()).sum::<usize>() + std::mem::size_of::<Entity>()
    }

    #[inline]
    fn slot(&self, id: ComponentId) -> Option<usize> {
        match self.column_of[id.index()] {
            NO_COLUMN => None,
            slot => Some(slot as usize),
        }
    }

    #[inline]
    pub fn get(&self, id: ComponentId, row: u32) -> Option<ComponentRef<'_>> {
        let slot = self.slot(id)?;
        Some(ComponentRef::new(id, self.columns[slot].as_ref(), row as usize))
    }

    #[inline]
    pub fn get_mut(&mut self, id: ComponentId, row: u32) -> Option<ComponentMut<'_>> {
        let slot = self.slot(id)?;
        Some(ComponentMut::new(id, self.columns[slot].as_mut(), row as usize))
    }

    pub fn write_bytes(&mut self, id: ComponentId, row: u32, bytes: &[u8]) -> bool {
        match self.slot(id) {
            Some(slot) => {
                self.columns[slot].write_bytes(row as usize, bytes);
                true
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Relations
    // ------------------------------------------------------------------

    #[inline]
    pub fn relation(&self) -> Option<ComponentId> {
        self.relation.as_ref().map(RelationIndex::component)
    }

    #[inline]
    pub fn partitions(&self) -> usize {
        self.relation.as_ref().map_or(0, RelationIndex::partitions)
    }

    #[inline]
    pub fn target_of(&self, row: u32) -> Option<Entity> {
        self.relation.as_ref()?.target_of(row)
    }

    #[inline]
    pub fn rows_for_target(&self, target: Entity) -> Option<Range<u32>> {
        self.relation.as_ref()?.rows_for(target)
    }

    #[inline]
    pub fn has_target(&self, target: Entity) -> bool {
        self.rows_for_target(target).is_some()
    }

    /// Targets and their row ranges. Plain archetypes report one zero-target run.
    fn runs(&self) -> Vec<(Option<Entity>, Range<u32>)> {
        match &self.relation {
            Some(index) => index.blocks().map(|(t, r)| (Some(t), r)).collect(),
            #[allow(clippy::cast_possible_truncation)]
            None => vec![(None, 0..self.len() as u32)],
        }
    }

    /// Runs `op` on the relation index with a row swapper, then reports
    /// every row whose occupant changed.
    fn with_index<R>(
        &mut self,
        on_move: &mut dyn FnMut(Entity, u32),
        op: impl FnOnce(&mut RelationIndex, &mut dyn FnMut(u32, u32)) -> R,
    ) -> Option<R> {
        let index = self.relation.as_mut()?;
        let mut rows = Rows {
            columns: &mut self.columns,
            entities: &mut self.entities,
            touched: Vec::new(),
        };
        let out = op(index, &mut |a, b| rows.swap(a, b));
        let touched = rows.touched;
        for row in touched {
            if let Some(&e) = self.entities.get(row as usize) {
                on_move(e, row);
            }
        }
        Some(out)
    }

    // ------------------------------------------------------------------
    // Growth
    // ------------------------------------------------------------------

    /// Makes room for `additional` rows, growing in whole increments.
    pub fn reserve(&mut self, additional: usize) {
        let needed = self.len() + additional;
        if needed <= self.capacity() {
            return;
        }
        let target = needed.div_ceil(self.increment) * self.increment;
        let extra = target - self.len();
        for column in &mut self.columns {
            column.reserve_exact(extra);
        }
        self.entities.reserve_exact(extra);
    }

    // ------------------------------------------------------------------
    // Row management
    // ------------------------------------------------------------------

    /// Appends zeroed rows for `entities`, filed under `target` when this
    /// archetype holds a relation. Every row whose occupant changed,
    /// including the new ones, is reported through `on_move`.
    pub fn alloc(
        &mut self,
        entities: &[Entity],
        target: Entity,
        on_move: &mut dyn FnMut(Entity, u32),
    ) -> Range<u32> {
        self.reserve(entities.len());
        for column in &mut self.columns {
            column.push_zeroed(entities.len());
        }
        self.entities.extend_from_slice(entities);
        #[allow(clippy::cast_possible_truncation)]
        let n = entities.len() as u32;
        self.file_tail(n, target, on_move)
    }

    /// Copies row `row` of `src` into a new row here.
    pub fn push_from(
        &mut self,
        src: &Archetype,
        row: u32,
        target: Entity,
        on_move: &mut dyn FnMut(Entity, u32),
    ) -> u32 {
        self.reserve(1);
        for (cid, column) in self.ids.iter().zip(self.columns.iter_mut()) {
            match src.slot(*cid) {
                Some(s) => column.push_from(src.columns[s].as_ref(), row as usize),
                None => column.push_zeroed(1),
            }
        }
        self.entities.push(src.entity(row));
        self.file_tail(1, target, on_move).start
    }

    /// Copies every row of `src` here. `src` is left untouched.
    pub fn extend_from(
        &mut self,
        src: &Archetype,
        rule: TargetRule,
        on_move: &mut dyn FnMut(Entity, u32),
    ) -> usize {
        self.reserve(src.len());
        let keep = self.relation().is_some() && self.relation() == src.relation();
        for (src_target, rows) in src.runs() {
            let n = rows.end - rows.start;
            if n == 0 {
                continue;
            }
            let range = rows.start as usize..rows.end as usize;
            for (cid, column) in self.ids.iter().zip(self.columns.iter_mut()) {
                match src.slot(*cid) {
                    Some(s) => column.extend_from(src.columns[s].as_ref(), range.clone()),
                    None => column.push_zeroed(n as usize),
                }
            }
            self.entities.extend_from_slice(&src.entities[range]);
            let target = match rule {
                TargetRule::Set(t) => t,
                TargetRule::Keep if keep => src_target.unwrap_or(Entity::ZERO),
                TargetRule::Keep => Entity::ZERO,
            };
            self.file_tail(n, target, on_move);
        }
        src.len()
    }

    fn file_tail(&mut self, n: u32, target: Entity, on_move: &mut dyn FnMut(Entity, u32)) -> Range<u32> {
        #[allow(clippy::cast_possible_truncation)]
        let len = self.len() as u32;
        let fresh = len - n..len;
        let range = self
            .with_index(on_move, |index, swap| index.insert(target, n, swap))
            .unwrap_or(fresh);
        for row in range.clone() {
            on_move(self.entities[row as usize], row);
        }
        range
    }

    /// Removes `row`, keeping storage dense.
    pub fn remove_row(&mut self, row: u32, on_move: &mut dyn FnMut(Entity, u32)) {
        if self.relation.is_some() {
            let removed = self.entity(row);
            let mut report = |e: Entity, r: u32| {
                if e != removed {
                    on_move(e, r);
                }
            };
            self.with_index(&mut report, |index, swap| index.detach(row, swap));
            self.truncate(self.len() - 1);
            return;
        }

        let r = row as usize;
        for column in &mut self.columns {
            column.swap_remove(r);
        }
        self.entities.swap_remove(r);
        if let Some(&moved) = self.entities.get(r) {
            on_move(moved, row);
        }
    }

    /// Moves `row` into the block for `target`. Returns its new row.
    pub fn set_target(&mut self, row: u32, target: Entity, on_move: &mut dyn FnMut(Entity, u32)) -> u32 {
        let new_row = self
            .with_index(on_move, |index, swap| index.set_target(row, target, swap))
            .unwrap_or(row);
        on_move(self.entities[new_row as usize], new_row);
        new_row
    }

    /// Moves every row related to `from` under `to`.
    pub fn retarget(&mut self, from: Entity, to: Entity, on_move: &mut dyn FnMut(Entity, u32)) {
        self.with_index(on_move, |index, swap| index.retarget(from, to, swap));
    }

    /// Files every row under `target` without moving any.
    pub fn retarget_all(&mut self, target: Entity) {
        let len = self.len();
        if let Some(index) = self.relation.as_mut() {
            #[allow(clippy::cast_possible_truncation)]
            index.collapse(target, len as u32);
        }
    }

    fn truncate(&mut self, len: usize) {
        for column in &mut self.columns {
            column.truncate(len);
        }
        self.entities.truncate(len);
    }

    /// Drops all rows. Capacity is kept.
    pub fn clear(&mut self) {
        self.truncate(0);
        if let Some(index) = self.relation.as_mut() {
            index.clear();
        }
    }
}
