//! Statically declared entity metadata: one [`types::EntityType`] literal per entity type, collected
//! into an [`registry::EntityRegistry`] that validates the model up front.

pub mod registry;
pub mod types;


pub use registry::{EntityRegistry, MetadataProvider};
pub use types::{Cardinality, Column, ColumnType, EntityType, IdentityScope, JoinTable, Navigation, Relation, TableName};
