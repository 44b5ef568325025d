//! # Entity Component System
//!
//! An archetype ECS: entities with the same component set share one table
//! whose columns are dense arrays of plain-old-data values.
//!
//! ## Design Philosophy
//!
//! - Component ids are small integers and component sets are 256-bit masks
//! - Archetype transitions are memoized per component in a graph
//! - Rows holding a relation component are grouped by target entity, so a
//!   query for one target visits a single contiguous range
//! - Queries are cursors that lock the world against structural changes
//!   instead of borrowing it

mod archetype;
mod batch;
mod cache;
mod component;
mod entity;
mod event;
mod filter;
mod graph;
mod lock;
mod mask;
mod query;
mod relation;
mod relations;
mod resource;
mod stats;
mod storage;
mod world;

pub use archetype::ArchetypeId;
pub use batch::Batch;
pub use cache::{Cache, CachedFilter};
pub use component::{Component, ComponentId, ComponentInfo, ComponentValue};
pub use entity::Entity;
pub use event::{Dispatch, EntityEvent, EventKind, EventLog, Listener, Subscription};
pub use filter::{Filter, MaskFilter};
pub use mask::{Mask, MaskIter, MASK_TOTAL_BITS};
pub use query::{Query, QueryState};
pub use relations::Relations;
pub use resource::ResourceId;
pub use stats::{ArchetypeStats, EntityStats, WorldStats};
pub use storage::{ComponentMut, ComponentRef};
pub use world::World;
