//! # World Statistics
//!
//! Snapshot of storage usage, returned by [`World::stats`](crate::World::stats).

use std::fmt;

use super::archetype::ArchetypeId;
use super::component::ComponentId;

/// Entity slot usage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct EntityStats {
    /// Live entities.
    pub used: usize,
    /// Slots ever issued.
    pub total: usize,
    /// Freed slots waiting for reuse.
    pub recycled: usize,
    /// Reserved slot capacity.
    pub capacity: usize,
}

/// Usage of one archetype.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchetypeStats {
    /// Archetype id.
    pub id: ArchetypeId,
    /// Component ids, ascending.
    pub components: Vec<ComponentId>,
    /// Component type names, in the same order.
    pub component_names: Vec<&'static str>,
    /// Rows in use.
    pub size: usize,
    /// Rows reserved.
    pub capacity: usize,
    /// Bytes reserved.
    pub memory_bytes: usize,
    /// Bytes per row.
    pub memory_per_entity: usize,
    /// Relation component, if any.
    pub relation: Option<ComponentId>,
    /// Non-empty relation partitions.
    pub partitions: usize,
}

/// Snapshot of a world.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorldStats {
    /// Entity slot usage.
    pub entities: EntityStats,
    /// Registered component types.
    pub component_count: usize,
    /// Per-archetype usage, in id order.
    pub archetypes: Vec<ArchetypeStats>,
    /// Registered cached filters.
    pub cached_filters: usize,
    /// Stored resources.
    pub resources: usize,
    /// Open query cursors.
    pub open_queries: usize,
    /// Bytes reserved across all archetypes.
    pub memory_bytes: usize,
}

impl WorldStats {
    /// Number of archetypes.
    #[must_use]
    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    /// Number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.used
    }

    /// Row counts per archetype.
    #[must_use]
    pub fn per_archetype_counts(&self) -> Vec<(ArchetypeId, usize)> {
        self.archetypes.iter().map(|a| (a.id, a.size)).collect()
    }
}

impl fmt::Display for EntityStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Entities -- Used: {}, Recycled: {}, Total: {}, Capacity: {}",
            self.used, self.recycled, self.total, self.capacity
        )
    }
}

impl fmt::Display for ArchetypeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Archetype {} -- Components: {}, Size: {}, Capacity: {}, Memory: {:.1} kB ({} B/entity)",
            self.id,
            self.components.len(),
            self.size,
            self.capacity,
            kib(self.memory_bytes),
            self.memory_per_entity,
        )?;
        if let Some(relation) = self.relation {
            write!(f, ", Relation: {relation} ({} targets)", self.partitions)?;
        }
        if !self.component_names.is_empty() {
            write!(f, "\n  Components: {}", self.component_names.join(", "))?;
        }
        Ok(())
    }
}

impl fmt::Display for WorldStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "World -- Components: {}, Archetypes: {}, Filters: {}, Resources: {}, Memory: {:.1} kB, Locked: {}",
            self.component_count,
            self.archetypes.len(),
            self.cached_filters,
            self.resources,
            kib(self.memory_bytes),
            self.open_queries > 0,
        )?;
        writeln!(f, "{}", self.entities)?;
        for archetype in &self.archetypes {
            writeln!(f, "{archetype}")?;
        }
        Ok(())
    }
}

#[allow(clippy::cast_precision_loss)]
fn kib(bytes: usize) -> f64 {
    bytes as f64 / 1024.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_mentions_counts() {
        let stats = WorldStats {
            entities: EntityStats {
                used: 3,
                total: 4,
                recycled: 1,
                capacity: 128,
            },
            component_count: 2,
            archetypes: vec![ArchetypeStats {
                id: ArchetypeId::EMPTY,
                components: Vec::new(),
                component_names: Vec::new(),
                size: 3,
                capacity: 128,
                memory_bytes: 1024,
                memory_per_entity: 8,
                relation: None,
                partitions: 0,
            }],
            cached_filters: 0,
            resources: 0,
            open_queries: 0,
            memory_bytes: 1024,
        };
        let text = stats.to_string();
        assert!(text.contains("Used: 3"));
        assert!(text.contains("Archetypes: 1"));
        assert!(text.contains("Memory: 1.0 kB"));
        assert_eq!(stats.entity_count(), 3);
        assert_eq!(stats.per_archetype_counts(), vec![(ArchetypeId::EMPTY, 3)]);
    }
}
