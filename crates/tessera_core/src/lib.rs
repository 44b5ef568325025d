//! # TESSERA Core Engine
//!
//! Archetype-based Entity Component System with:
//! - Generational entity handles that detect stale references
//! - Dense per-archetype column storage for cache-friendly iteration
//! - Entity relations partitioned by target for O(1) target lookups
//! - Composable filters with a registration cache
//! - Batch operations that move whole archetypes at once
//!
//! ## Architecture Rules
//!
//! 1. **Components are plain data** - every component is `bytemuck::Pod`
//! 2. **Structure is locked while iterating** - open queries refuse
//!    structural changes with [`EcsError::WorldLocked`]
//! 3. **Contract violations panic** - runtime states come back as `Err`
//!
//! ## Example
//!
//! ```rust
//! use bytemuck::{Pod, Zeroable};
//! use tessera_core::{Filter, World};
//!
//! #[derive(Clone, Copy, Pod, Zeroable)]
//! #[repr(C)]
//! struct Health(u32);
//!
//! let mut world = World::default();
//! let health = world.component_id::<Health>();
//! world.batch().new_entities(1_000, &[health]).unwrap();
//! assert_eq!(world.query(&Filter::all(&[health])).count(), 1_000);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod ecs;
pub mod error;

pub use config::WorldConfig;
pub use ecs::{
    ArchetypeId, ArchetypeStats, Batch, Cache, CachedFilter, Component, ComponentId,
    ComponentInfo, ComponentMut, ComponentRef, ComponentValue, Dispatch, Entity, EntityEvent,
    EntityStats, EventKind, EventLog, Filter, Listener, Mask, MaskFilter, Query, QueryState,
    Relations, ResourceId, Subscription, World, WorldStats, MASK_TOTAL_BITS,
};
pub use error::{EcsError, EcsResult};
