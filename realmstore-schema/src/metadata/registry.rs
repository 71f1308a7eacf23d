use std::collections::{HashMap, HashSet};

use itertools::Itertools;
use log::trace;

use crate::MetadataError;
use crate::metadata::types::{Cardinality, EntityType, Navigation, Relation, TableName};
use crate::wire::ID_KEY;

/// Source of entity metadata. The loader only ever consumes it.
pub trait MetadataProvider: Send + Sync {
    fn entity_type(&self, name: &str) -> Option<&'static EntityType>;

    fn require(&self, name: &str) -> Result<&'static EntityType, MetadataError> {
        self.entity_type(name)
            .ok_or_else(|| MetadataError::UnknownEntityType { name: name.into() })
    }

    fn table_name(&self, name: &str) -> Result<TableName, MetadataError> {
        Ok(self.require(name)?.table)
    }

    fn primary_key_column(&self, name: &str) -> Result<&'static str, MetadataError> {
        Ok(self.require(name)?.primary_key)
    }

    fn navigations(&self, name: &str) -> Result<&'static [Navigation], MetadataError> {
        Ok(self.require(name)?.navigations)
    }
}

/// Explicit registry of statically declared entity types.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    types: HashMap<&'static str, &'static EntityType>,
}

impl EntityRegistry {
    /// Registers and validates all types at once, so that a broken model fails before any query runs.
    pub fn new(types: &[&'static EntityType]) -> Result<Self, MetadataError> {
        let mut registry = Self::default();
        for entity in types {
            if registry.types.insert(entity.name, entity).is_some() {
                return Err(MetadataError::DuplicateEntityType { name: entity.name });
            }
        }

        registry.validate()?;
        trace!("Registered {} entity types", registry.types.len());
        Ok(registry)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// All registered types, sorted by name.
    pub fn entity_types(&self) -> Vec<&'static EntityType> {
        self.types
            .values()
            .copied()
            .sorted_by_key(|entity| entity.name)
            .collect_vec()
    }

    fn validate(&self) -> Result<(), MetadataError> {
        for entity in self.entity_types() {
            self.validate_entity(entity)?;
        }
        Ok(())
    }

    fn validate_entity(&self, entity: &'static EntityType) -> Result<(), MetadataError> {
        let mut members = HashSet::new();
        members.insert(ID_KEY);

        let names = entity
            .columns
            .iter()
            .map(|column| column.name)
            .chain(entity.navigations.iter().map(|navigation| navigation.name));
        for name in names {
            if !members.insert(name) {
                return Err(MetadataError::DuplicateMember {
                    entity: entity.name,
                    member: name,
                });
            }
        }

        if let Some(column) = entity.order_by {
            if entity.columns.iter().all(|c| c.column != column) && column != entity.primary_key {
                return Err(MetadataError::UnknownOrderColumn {
                    entity: entity.name,
                    column,
                });
            }
        }

        // surfaces unknown names in the navigation order
        entity.ordered_navigations()?;

        for navigation in entity.navigations {
            validate_navigation(entity, navigation)?;
            if !self.types.contains_key(navigation.target) {
                return Err(MetadataError::UnknownTarget {
                    entity: entity.name,
                    navigation: navigation.name,
                    target: navigation.target,
                });
            }
        }

        Ok(())
    }
}

impl MetadataProvider for EntityRegistry {
    fn entity_type(&self, name: &str) -> Option<&'static EntityType> {
        self.types.get(name).copied()
    }
}

/// Checks the foreign key information a navigation needs, independent of any registry.
pub fn validate_navigation(entity: &EntityType, navigation: &Navigation) -> Result<(), MetadataError> {
    match (navigation.relation, navigation.cardinality) {
        (Relation::ManyToMany(_), Cardinality::ToOne) => Err(MetadataError::ManyToManyNotCollection {
            entity: entity.name,
            navigation: navigation.name,
        }),
        (Relation::ManyToMany(_), Cardinality::ToMany) => Ok(()),
        (Relation::Owned | Relation::Referenced, _) if navigation.foreign_key.is_none() => {
            Err(MetadataError::MissingForeignKey {
                entity: entity.name,
                navigation: navigation.name,
            })
        }
        _ => Ok(()),
    }
}
