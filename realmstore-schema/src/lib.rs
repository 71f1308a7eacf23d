use thiserror::Error;

/// Raised before any query runs, whenever the entity metadata cannot describe a loadable graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetadataError {
    #[error("Unknown entity type {name}")]
    UnknownEntityType { name: String },

    #[error("Entity type {name} is registered twice")]
    DuplicateEntityType { name: &'static str },

    #[error("Entity type {entity} declares the member {member} more than once")]
    DuplicateMember { entity: &'static str, member: &'static str },

    #[error("Navigation {entity}.{navigation} targets the unknown entity type {target}")]
    UnknownTarget {
        entity: &'static str,
        navigation: &'static str,
        target: &'static str,
    },

    #[error("Navigation {entity}.{navigation} is missing its foreign key column")]
    MissingForeignKey {
        entity: &'static str,
        navigation: &'static str,
    },

    #[error("Navigation {entity}.{navigation} is many-to-many, but not a collection")]
    ManyToManyNotCollection {
        entity: &'static str,
        navigation: &'static str,
    },

    #[error("Entity type {entity} is ordered by the unknown column {column}")]
    UnknownOrderColumn { entity: &'static str, column: &'static str },

    #[error("Entity type {entity} lists the unknown navigation {navigation} in its navigation order")]
    UnknownOrderedNavigation {
        entity: &'static str,
        navigation: &'static str,
    },

    #[error("Owned navigation chain {chain} loops back into entity type {entity}")]
    OwnedCycle { chain: String, entity: &'static str },

    #[error("Owned navigation chain {chain} exceeds the maximum depth of {max_depth}")]
    RecursionLimit { chain: String, max_depth: usize },
}

pub mod metadata;
pub mod query;
pub mod wire;
