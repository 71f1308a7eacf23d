//! Loads persisted MMORPG aggregates (accounts, characters, inventories, guilds) as object graphs,
//! one JSON document per root row, while sharing configuration objects across loads.

pub use realmstore_schema as schema;

pub mod graph;
pub mod loader;
pub mod model;
pub mod resolver;
pub mod rows;

pub use graph::{Entity, GraphObject, ObjectRef, Value};
pub use loader::{GraphLoader, LoadAll, LoadError, LoaderSettings, PayloadError, PayloadErrorKind};
pub use resolver::{ConfigurationResolver, IdentityConflict};
