//! Entity-to-DIT resolution
//!
//! Maps application-level entity names ("person", "people") onto the
//! configured base DN, the source that holds it, and whether the name asks for
//! one entry or many.

use std::collections::HashMap;

use crate::config::{DirectoryConfig, DitLocation};
use crate::error::{DirectoryError, DirectoryResult};

/// Whether an entity name refers to one entry or a list of entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// The singular name was used; `find` yields at most one entry.
    Singular,
    /// The plural name was used; `find` yields every match.
    Plural,
}

impl Cardinality {
    /// Check if this is the plural form.
    pub fn is_plural(self) -> bool {
        self == Cardinality::Plural
    }
}

/// Where and how to query for an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution<'a> {
    /// Subtree root to search.
    pub base_dn: &'a str,
    /// Source identifier holding the subtree.
    pub source: &'a str,
    /// Singular or plural lookup.
    pub cardinality: Cardinality,
}

/// Resolves entity names against the configured DIT locations.
#[derive(Debug, Clone)]
pub struct SchemaResolver {
    locations: Vec<DitLocation>,
    index: HashMap<String, (usize, Cardinality)>,
}

impl SchemaResolver {
    /// Build a resolver over locations in declaration order.
    ///
    /// When a name appears in more than one location the earliest declaration
    /// wins, matching a first-match scan of the list.
    pub fn new(locations: Vec<DitLocation>) -> Self {
        let mut index = HashMap::with_capacity(locations.len() * 2);
        for (position, location) in locations.iter().enumerate() {
            index
                .entry(location.singular.clone())
                .or_insert((position, Cardinality::Singular));
            index
                .entry(location.plural.clone())
                .or_insert((position, Cardinality::Plural));
        }

        Self { locations, index }
    }

    /// Build a resolver from the `dit` section of a configuration.
    pub fn from_config(config: &DirectoryConfig) -> Self {
        Self::new(config.dit.clone())
    }

    /// Resolve an entity name to its location, source and cardinality.
    pub fn resolve(&self, entity: &str) -> DirectoryResult<Resolution<'_>> {
        let (position, cardinality) =
            self.index
                .get(entity)
                .copied()
                .ok_or_else(|| DirectoryError::EntityNotFound {
                    entity: entity.to_string(),
                })?;
        let location = &self.locations[position];

        Ok(Resolution {
            base_dn: &location.base_dn,
            source: &location.source,
            cardinality,
        })
    }

    /// Configured locations in declaration order.
    pub fn locations(&self) -> &[DitLocation] {
        &self.locations
    }
}
