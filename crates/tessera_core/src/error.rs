//! # ECS Error Types
//!
//! All errors that can occur in the entity-component world.
//!
//! Runtime states (`NotAlive`, `RelationTargetNotAlive`, `WorldLocked`) are
//! returned as `Err`. Everything else reports a broken caller contract and
//! is raised as a panic carrying the same message.

use thiserror::Error;

use crate::ecs::{ComponentId, Entity};

/// Errors that can occur in the entity-component world.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// The entity handle is stale or was never issued.
    #[error("entity {entity} is not alive")]
    NotAlive {
        /// The offending handle.
        entity: Entity,
    },

    /// The component id was not registered in this world.
    #[error("invalid component id {id}: not registered in this world")]
    InvalidComponentId {
        /// The raw id.
        id: u8,
    },

    /// A fixed-size id space is exhausted.
    #[error("capacity exceeded: at most {limit} {what} per world")]
    CapacityExceeded {
        /// What ran out.
        what: &'static str,
        /// The limit.
        limit: usize,
    },

    /// The same component id was given twice in one request.
    #[error("duplicate component id {id}")]
    DuplicateComponent {
        /// The repeated id.
        id: ComponentId,
    },

    /// Adding a present component or removing an absent one.
    #[error("invalid transition for component id {id}: {reason}")]
    InvalidTransition {
        /// The component involved.
        id: ComponentId,
        /// What was wrong with the request.
        reason: &'static str,
    },

    /// A structural change was attempted while a query is open.
    #[error("world is locked by {open} open query cursor(s)")]
    WorldLocked {
        /// Number of open cursors at the time of the call.
        open: usize,
    },

    /// Access to a component the entity does not have.
    #[error("component id {id} is not present on the entity")]
    MissingComponent {
        /// The requested component.
        id: ComponentId,
    },

    /// The relation target is neither alive nor the zero entity.
    #[error("relation target {target} is not alive")]
    RelationTargetNotAlive {
        /// The rejected target.
        target: Entity,
    },

    /// A relation exchange that neither adds nor removes a component.
    #[error("exchange adds and removes nothing but sets relation {relation}; use set_relation")]
    EmptyExchange {
        /// The relation whose target was to be set.
        relation: ComponentId,
    },

    /// A relation operation was given a plain component id.
    #[error("component id {id} is not a relation component")]
    NotARelation {
        /// The offending id.
        id: ComponentId,
    },

    /// A typed access used a type that does not match the component id.
    #[error("component id {id} does not store values of type {requested}")]
    TypeMismatch {
        /// The component id.
        id: ComponentId,
        /// Name of the requested type.
        requested: &'static str,
    },

    /// The cached filter handle was unregistered or never issued.
    #[error("cached filter {0} is not registered")]
    UnknownFilter(u32),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for ECS operations.
pub type EcsResult<T> = Result<T, EcsError>;

/// Raises a contract violation.
#[cold]
#[track_caller]
pub(crate) fn fatal(err: EcsError) -> ! {
    panic!("{err}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_offender() {
        let err = EcsError::WorldLocked { open: 2 };
        assert_eq!(err.to_string(), "world is locked by 2 open query cursor(s)");

        let err = EcsError::InvalidComponentId { id: 7 };
        assert!(err.to_string().contains("component id 7"));
    }

    #[test]
    #[should_panic(expected = "duplicate component id")]
    fn test_fatal_panics_with_message() {
        fatal(EcsError::DuplicateComponent {
            id: ComponentId::from_raw(3),
        });
    }
}
