//! # World Configuration
//!
//! Storage growth parameters, loadable from TOML.
//!
//! ```toml
//! initial_capacity = 1024
//! capacity_increment = 128
//! relation_capacity_increment = 8
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EcsError, EcsResult};

/// Growth parameters for a [`World`](crate::World).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Entity slots reserved up front.
    pub initial_capacity: usize,
    /// Archetype columns grow in multiples of this many rows.
    pub capacity_increment: usize,
    /// Growth step for archetypes holding a relation component.
    ///
    /// Zero means "same as `capacity_increment`".
    pub relation_capacity_increment: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 128,
            capacity_increment: 128,
            relation_capacity_increment: 0,
        }
    }
}

impl WorldConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of entity slots reserved up front.
    #[must_use]
    pub const fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// Sets the archetype growth step.
    #[must_use]
    pub const fn with_capacity_increment(mut self, increment: usize) -> Self {
        self.capacity_increment = increment;
        self
    }

    /// Sets the growth step for relation archetypes.
    #[must_use]
    pub const fn with_relation_capacity_increment(mut self, increment: usize) -> Self {
        self.relation_capacity_increment = increment;
        self
    }

    /// Parses a configuration from TOML text and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidConfig`] on malformed input or invalid values.
    pub fn from_toml_str(text: &str) -> EcsResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| EcsError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidConfig`] if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> EcsResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| EcsError::InvalidConfig(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Checks the values.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidConfig`] if `capacity_increment` is zero.
    pub fn validate(&self) -> EcsResult<()> {
        if self.capacity_increment == 0 {
            return Err(EcsError::InvalidConfig(
                "capacity_increment must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Effective growth step for relation archetypes.
    #[inline]
    #[must_use]
    pub const fn relation_increment(&self) -> usize {
        if self.relation_capacity_increment == 0 {
            self.capacity_increment
        } else {
            self.relation_capacity_increment
        }
    }
}
