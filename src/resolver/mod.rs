//! Identity caches. Within one identity scope there is at most one object per id.

use realmstore_schema::metadata::IdentityScope;
use thiserror::Error;
use uuid::Uuid;

use crate::graph::ObjectRef;

mod configuration;
mod instance;

#[cfg(test)]
mod tests;

pub use configuration::{ConfigurationResolver, Population};
pub use instance::InstanceResolver;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Configuration object {id} is already registered as a different {entity} instance")]
pub struct IdentityConflict {
    pub id: Uuid,
    pub entity: &'static str,
}

/// Everything one load call resolves against: its own instance cache, the configuration objects the
/// current row is populating, and the process wide configuration cache.
pub struct LoadScope<'l> {
    instance: InstanceResolver,
    configuration: &'l ConfigurationResolver,
    population: Option<Population<'l>>,
}

impl<'l> LoadScope<'l> {
    pub fn new(configuration: &'l ConfigurationResolver) -> Self {
        Self {
            instance: InstanceResolver::default(),
            configuration,
            population: None,
        }
    }

    /// Looks up an id for a reference marker.
    pub fn resolve(&self, scope: IdentityScope, id: Uuid) -> Option<ObjectRef> {
        match scope {
            IdentityScope::Instance => self.instance.resolve(id),
            IdentityScope::Configuration => self
                .population
                .as_ref()
                .and_then(|population| population.resolve(id))
                .or_else(|| self.configuration.resolve(id)),
        }
    }

    /// Looks up an id for an inline object. Configuration lookups happen under the population lock,
    /// so no other load can create the same object concurrently.
    pub fn resolve_inline(&mut self, scope: IdentityScope, id: Uuid) -> Option<ObjectRef> {
        if scope == IdentityScope::Configuration && self.population.is_none() {
            self.population = Some(self.configuration.begin_population());
        }
        self.resolve(scope, id)
    }

    /// Registers a freshly created inline object. Configuration objects stay private to this load
    /// until [`LoadScope::finish_row`].
    pub fn register(&mut self, object: ObjectRef) {
        match object.scope() {
            IdentityScope::Instance => self.instance.register(object),
            IdentityScope::Configuration => self
                .population
                .get_or_insert_with(|| self.configuration.begin_population())
                .stage(object),
        }
    }

    pub fn finish_row(&mut self) {
        if let Some(population) = self.population.take() {
            population.publish();
        }
    }

    /// Drops the configuration objects staged by a failed row.
    pub fn abandon_row(&mut self) {
        self.population = None;
    }

    pub fn instance(&self) -> &InstanceResolver {
        &self.instance
    }
}
