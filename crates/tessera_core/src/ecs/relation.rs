//! # Relation Partitions
//!
//! Rows of an archetype that holds a relation component are grouped by
//! target entity into contiguous blocks:
//!
//! ```text
//! rows:    [ a a a | b b | c c c c ]
//! blocks:    P:0..3  Q:3..5  R:5..9
//! ```
//!
//! Blocks are laid out back to back from row 0, so iterating one target is a
//! plain range scan. Rows change blocks by swaps only; the index never owns
//! data, it calls back into the archetype to swap two rows.

use std::collections::HashMap;
use std::ops::Range;

use super::component::ComponentId;
use super::entity::Entity;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Block {
    target: Entity,
    start: u32,
    len: u32,
}

impl Block {
    #[inline]
    const fn end(&self) -> u32 {
        self.start + self.len
    }
}

/// Target → row-range index for one archetype.
#[derive(Debug)]
pub(crate) struct RelationIndex {
    component: ComponentId,
    blocks: Vec<Block>,
    lookup: HashMap<Entity, usize>,
}

impl RelationIndex {
    pub fn new(component: ComponentId) -> Self {
        Self {
            component,
            blocks: Vec::new(),
            lookup: HashMap::new(),
        }
    }

    #[inline]
    pub fn component(&self) -> ComponentId {
        self.component
    }

    /// Number of non-empty blocks.
    #[inline]
    pub fn partitions(&self) -> usize {
        self.blocks.len()
    }

    /// Rows related to `target`.
    #[inline]
    pub fn rows_for(&self, target: Entity) -> Option<Range<u32>> {
        self.lookup.get(&target).map(|&k| {
            let block = self.blocks[k];
            block.start..block.end()
        })
    }

    /// Target of the block containing `row`.
    pub fn target_of(&self, row: u32) -> Option<Entity> {
        let k = self.block_of(row)?;
        Some(self.blocks[k].target)
    }

    /// Every block as `(target, rows)`, in row order.
    pub fn blocks(&self) -> impl Iterator<Item = (Entity, Range<u32>)> + '_ {
        self.blocks.iter().map(|b| (b.target, b.start..b.end()))
    }

    fn block_of(&self, row: u32) -> Option<usize> {
        let k = self.blocks.partition_point(|b| b.end() <= row);
        (k < self.blocks.len() && self.blocks[k].start <= row).then_some(k)
    }

    /// Files `n` freshly appended rows under `target`.
    ///
    /// The rows must sit at the very end of the archetype. Later blocks are
    /// shifted right by swapping their leading rows past their end, so the
    /// free region travels left until it reaches the end of `target`'s
    /// block. Returns where the fresh rows ended up.
    pub fn insert(&mut self, target: Entity, n: u32, swap: &mut dyn FnMut(u32, u32)) -> Range<u32> {
        let total: u32 = self.blocks.last().map_or(0, Block::end);
        if n == 0 {
            return total..total;
        }
        let Some(&k) = self.lookup.get(&target) else {
            self.lookup.insert(target, self.blocks.len());
            self.blocks.push(Block {
                target,
                start: total,
                len: n,
            });
            return total..total + n;
        };

        for j in (k + 1..self.blocks.len()).rev() {
            let Block { start, len, .. } = self.blocks[j];
            let offset = n.max(len);
            for i in 0..n.min(len) {
                swap(start + i, start + offset + i);
            }
            self.blocks[j].start += n;
        }

        let block = &mut self.blocks[k];
        let end = block.end();
        block.len += n;
        end..end + n
    }

    /// Drops the last `count` rows of the block for `target`.
    ///
    /// The dropped rows are swapped to the very end of the archetype, where
    /// the caller truncates (or re-files) them. Empty blocks are removed.
    pub fn remove_tail(&mut self, target: Entity, count: u32, swap: &mut dyn FnMut(u32, u32)) {
        let Some(&k) = self.lookup.get(&target) else {
            return;
        };
        debug_assert!(count <= self.blocks[k].len, "removing more rows than the block holds");
        if count == 0 {
            return;
        }

        let mut hole = self.blocks[k].end() - count;
        for j in k + 1..self.blocks.len() {
            let len = self.blocks[j].len;
            let offset = count.max(len);
            for i in 0..count.min(len) {
                swap(hole + i, hole + offset + i);
            }
            self.blocks[j].start -= count;
            hole += len;
        }

        self.blocks[k].len -= count;
        if self.blocks[k].len == 0 {
            self.blocks.remove(k);
            self.lookup.remove(&target);
            for (j, block) in self.blocks.iter().enumerate().skip(k) {
                self.lookup.insert(block.target, j);
            }
        }
    }

    /// Takes `row` out of its block; afterwards it is the last row of the
    /// archetype and belongs to no block.
    pub fn detach(&mut self, row: u32, swap: &mut dyn FnMut(u32, u32)) -> Option<Entity> {
        let k = self.block_of(row)?;
        let block = self.blocks[k];
        let last = block.end() - 1;
        if row != last {
            swap(row, last);
        }
        self.remove_tail(block.target, 1, swap);
        Some(block.target)
    }

    /// Moves `row` into the block for `target`. Returns the row's new index.
    pub fn set_target(&mut self, row: u32, target: Entity, swap: &mut dyn FnMut(u32, u32)) -> u32 {
        if self.target_of(row) == Some(target) {
            return row;
        }
        self.detach(row, swap);
        self.insert(target, 1, swap).start
    }

    /// Moves every row of `from` into the block for `to`.
    pub fn retarget(&mut self, from: Entity, to: Entity, swap: &mut dyn FnMut(u32, u32)) {
        if from == to {
            return;
        }
        let Some(&k) = self.lookup.get(&from) else {
            return;
        };
        if !self.lookup.contains_key(&to) {
            self.lookup.remove(&from);
            self.lookup.insert(to, k);
            self.blocks[k].target = to;
            return;
        }
        let len = self.blocks[k].len;
        self.remove_tail(from, len, swap);
        self.insert(to, len, swap);
    }

    /// Re-files all `len` rows under one target without moving any.
    pub fn collapse(&mut self, target: Entity, len: u32) {
        self.clear();
        if len > 0 {
            self.blocks.push(Block {
                target,
                start: 0,
                len,
            });
            self.lookup.insert(target, 0);
        }
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
        self.lookup.clear();
    }

    #[cfg(test)]
    fn check(&self) {
        let mut next = 0;
        for (j, block) in self.blocks.iter().enumerate() {
            assert_eq!(block.start, next, "blocks must be back to back");
            assert!(block.len > 0, "empty block left behind");
            assert_eq!(self.lookup.get(&block.target), Some(&j));
            next = block.end();
        }
        assert_eq!(self.lookup.len(), self.blocks.len());
    }
}
